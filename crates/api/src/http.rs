//! HTTP implementation of [`InfraApi`] over reqwest.

#![forbid(unsafe_code)]

use std::time::Instant;

use metrics::{counter, histogram};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use infrascope_core::payload::QueryPayload;
use infrascope_core::{AttributeKey, K8sCategory};

use crate::{
    join_path, ApiConfig, ApiError, ApiResult, AttributeKeysResponse, InfraApi, ListResponse, QueryRangeRequest,
    QueryRangeResponse,
};

const API_KEY_HEADER: &str = "SIGNOZ-API-KEY";
const QUERY_RANGE_PATH: &str = "/api/v4/query_range";

pub struct HttpApi {
    client: reqwest::Client,
    base: url::Url,
    token: Option<String>,
}

impl HttpApi {
    pub fn new(cfg: &ApiConfig) -> ApiResult<Self> {
        let base = url::Url::parse(&cfg.base_url)
            .map_err(|e| ApiError::Config(format!("invalid base url {}: {}", cfg.base_url, e)))?;
        let client = reqwest::Client::builder()
            .timeout(cfg.timeout)
            .build()
            .map_err(|e| ApiError::Config(e.to_string()))?;
        Ok(Self { client, base, token: cfg.token.clone() })
    }

    fn url(&self, path: &str) -> ApiResult<url::Url> {
        join_path(&self.base, path).map_err(|e| ApiError::Config(format!("joining {}: {}", path, e)))
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(t) => req.header(API_KEY_HEADER, t),
            None => req,
        }
    }

    async fn send<T: DeserializeOwned>(&self, op: &'static str, req: reqwest::RequestBuilder) -> ApiResult<T> {
        let t0 = Instant::now();
        let resp = self.authed(req).send().await.map_err(|e| {
            counter!("api_errors_total", 1u64, "op" => op);
            warn!(op, error = %e, "api: transport error");
            ApiError::Transport(e.to_string())
        })?;
        let status = resp.status();
        let bytes = resp.bytes().await.map_err(|e| ApiError::Transport(e.to_string()))?;
        histogram!("api_request_ms", t0.elapsed().as_secs_f64() * 1000.0, "op" => op);
        if !status.is_success() {
            counter!("api_errors_total", 1u64, "op" => op);
            let message = backend_error(&bytes).unwrap_or_default();
            warn!(op, status = status.as_u16(), message = %message, "api: request failed");
            return Err(ApiError::Status { code: status.as_u16(), message });
        }
        debug!(op, took_ms = %t0.elapsed().as_millis(), bytes = bytes.len(), "api: response");
        serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(&self, op: &'static str, path: &str, body: &B) -> ApiResult<T> {
        let url = self.url(path)?;
        self.send(op, self.client.post(url).json(body)).await
    }
}

/// `error` field of a JSON error body, if any.
fn backend_error(bytes: &[u8]) -> Option<String> {
    let v: serde_json::Value = serde_json::from_slice(bytes).ok()?;
    match v.get("error")? {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Object(o) => o.get("message").and_then(|m| m.as_str()).map(str::to_string),
        _ => None,
    }
}

fn attribute_keys_path(category: K8sCategory) -> String {
    category.list_path().replace("/list", "/attribute_keys")
}

#[async_trait::async_trait]
impl InfraApi for HttpApi {
    async fn list(&self, category: K8sCategory, payload: &QueryPayload) -> ApiResult<ListResponse> {
        let t0 = Instant::now();
        debug!(category = %category, limit = payload.limit, offset = payload.offset, group_by = payload.group_by.len(), "api: list start");
        let resp: ListResponse = self.post("list", category.list_path(), payload).await?;
        if resp.is_error() {
            return Err(ApiError::Backend(resp.error.unwrap_or_default()));
        }
        info!(category = %category, records = resp.records().len(), total = resp.total(), took_ms = %t0.elapsed().as_millis(), "api: list ok");
        Ok(resp)
    }

    async fn query_range(&self, request: &QueryRangeRequest) -> ApiResult<QueryRangeResponse> {
        let resp: QueryRangeResponse = self.post("query_range", QUERY_RANGE_PATH, request).await?;
        if resp.payload.is_none() {
            if let Some(e) = resp.error {
                return Err(ApiError::Backend(e));
            }
        }
        debug!(rows = resp.list().len(), series = resp.series().len(), "api: query_range ok");
        Ok(resp)
    }

    async fn attribute_keys(&self, category: K8sCategory) -> ApiResult<Vec<AttributeKey>> {
        let mut url = self.url(&attribute_keys_path(category))?;
        url.query_pairs_mut()
            .append_pair("dataSource", "metrics")
            .append_pair("aggregateAttribute", category.aggregate_attribute())
            .append_pair("aggregateOperator", "noop")
            .append_pair("searchText", "")
            .append_pair("tagType", "");
        let resp: AttributeKeysResponse = self.send("attribute_keys", self.client.get(url)).await?;
        match resp.payload {
            Some(p) => Ok(p.attribute_keys),
            None => Err(ApiError::Backend(resp.error.unwrap_or_default())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_error_reads_string_or_object() {
        assert_eq!(backend_error(br#"{"error":"bad filter"}"#).as_deref(), Some("bad filter"));
        assert_eq!(backend_error(br#"{"error":{"message":"nope"}}"#).as_deref(), Some("nope"));
        assert_eq!(backend_error(b"not json"), None);
    }

    #[test]
    fn attribute_keys_path_follows_list_path() {
        assert_eq!(attribute_keys_path(K8sCategory::Volumes), "/api/v1/pvcs/attribute_keys");
    }
}
