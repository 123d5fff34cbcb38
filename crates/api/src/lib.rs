//! Infrascope backend API façade.
//!
//! This crate defines the stable trait and wire types the orchestration layer and CLI
//! depend on. `HttpApi` talks to a live backend; `MockApi` is an in-memory backend
//! used by tests and demos.

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

use infrascope_core::{AttributeKey, EntityRow, K8sCategory};
use infrascope_core::payload::QueryPayload;

pub mod config;
pub mod http;
pub mod mock;
pub mod query_range;

pub use config::ApiConfig;
pub use http::HttpApi;
pub use mock::MockApi;
pub use query_range::{BuilderQuery, DataSource, LogRecord, Point, QueryRangeRequest, QueryRangeResponse, Series};

/// Message shown when a failed request carries no backend error text.
pub const FALLBACK_ERROR: &str = "Something went wrong";

/// API errors; serializable so they can be cached in fetch snapshots or sent over a wire.
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize, PartialEq)]
pub enum ApiError {
    #[error("transport: {0}")]
    Transport(String),
    #[error("status {code}: {message}")]
    Status { code: u16, message: String },
    #[error("decode: {0}")]
    Decode(String),
    /// The backend answered with an explicit error message.
    #[error("{0}")]
    Backend(String),
    #[error("config: {0}")]
    Config(String),
}

impl ApiError {
    /// Text suitable for inline display: the backend's own message when there is one,
    /// the generic fallback otherwise.
    pub fn display_message(&self) -> String {
        match self {
            Self::Backend(m) if !m.is_empty() => m.clone(),
            Self::Status { message, .. } if !message.is_empty() => message.clone(),
            _ => FALLBACK_ERROR.to_string(),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Resolve `path` below `base`, keeping any path prefix `base` carries:
/// `https://host/signoz` + `/api/v1/pods/list` is `https://host/signoz/api/v1/pods/list`.
pub fn join_path(base: &url::Url, path: &str) -> Result<url::Url, url::ParseError> {
    let mut dir = base.clone();
    if !dir.path().ends_with('/') {
        let with_slash = format!("{}/", dir.path());
        dir.set_path(&with_slash);
    }
    dir.join(path.trim_start_matches('/'))
}

/// `{ records, total }` body of a list response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ListData {
    #[serde(default)]
    pub records: Vec<EntityRow>,
    #[serde(default)]
    pub total: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ListPayload {
    #[serde(default)]
    pub data: ListData,
}

/// Envelope of an entity list response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ListResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default)]
    pub payload: Option<ListPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ListResponse {
    pub fn ok(data: ListData) -> Self {
        Self { status: Some("success".into()), payload: Some(ListPayload { data }), error: None }
    }

    pub fn records(&self) -> &[EntityRow] {
        self.payload.as_ref().map(|p| p.data.records.as_slice()).unwrap_or(&[])
    }

    pub fn total(&self) -> u64 {
        self.payload.as_ref().map(|p| p.data.total).unwrap_or(0)
    }

    /// An envelope that reports failure in-band.
    pub fn is_error(&self) -> bool {
        self.status.as_deref() == Some("error") || (self.payload.is_none() && self.error.is_some())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct AttributeKeysPayload {
    #[serde(default)]
    pub attribute_keys: Vec<AttributeKey>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AttributeKeysResponse {
    #[serde(default)]
    pub payload: Option<AttributeKeysPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Declarative backend surface.
#[async_trait::async_trait]
pub trait InfraApi: Send + Sync {
    /// Paginated, sorted, optionally grouped entity list.
    async fn list(&self, category: K8sCategory, payload: &QueryPayload) -> ApiResult<ListResponse>;

    /// Raw logs/traces/events and metric queries.
    async fn query_range(&self, request: &QueryRangeRequest) -> ApiResult<QueryRangeResponse>;

    /// Dimensions the category's list can be grouped by.
    async fn attribute_keys(&self, category: K8sCategory) -> ApiResult<Vec<AttributeKey>>;
}

#[async_trait::async_trait]
impl<T: InfraApi + ?Sized> InfraApi for std::sync::Arc<T> {
    async fn list(&self, category: K8sCategory, payload: &QueryPayload) -> ApiResult<ListResponse> {
        (**self).list(category, payload).await
    }

    async fn query_range(&self, request: &QueryRangeRequest) -> ApiResult<QueryRangeResponse> {
        (**self).query_range(request).await
    }

    async fn attribute_keys(&self, category: K8sCategory) -> ApiResult<Vec<AttributeKey>> {
        (**self).attribute_keys(category).await
    }
}
