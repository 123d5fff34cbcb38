//! Backend connection settings, read from `INFRASCOPE_*` environment variables.

#![forbid(unsafe_code)]

use std::time::Duration;

use infrascope_core::DEFAULT_PAGE_SIZE;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub base_url: String,
    /// Sent as the `SIGNOZ-API-KEY` header when set.
    pub token: Option<String>,
    pub timeout: Duration,
    pub page_size: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            token: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl ApiConfig {
    /// Defaults overridden by `INFRASCOPE_URL`, `INFRASCOPE_TOKEN`,
    /// `INFRASCOPE_TIMEOUT_SECS` and `INFRASCOPE_PAGE_SIZE`. Unparsable values fall back
    /// to the defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let d = Self::default();
        let base_url = get("INFRASCOPE_URL").filter(|s| !s.is_empty()).unwrap_or(d.base_url);
        let token = get("INFRASCOPE_TOKEN").filter(|s| !s.is_empty());
        let timeout = get("INFRASCOPE_TIMEOUT_SECS")
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(d.timeout);
        let page_size = get("INFRASCOPE_PAGE_SIZE")
            .and_then(|s| s.parse::<u32>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(d.page_size);
        Self { base_url, token, timeout, page_size }
    }
}
