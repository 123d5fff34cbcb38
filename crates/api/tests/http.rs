//! HttpApi against a fake backend.

use std::time::Duration;

use infrascope_api::{ApiConfig, ApiError, BuilderQuery, DataSource, HttpApi, InfraApi, QueryRangeRequest};
use infrascope_core::payload::QueryPayload;
use infrascope_core::{FilterTree, K8sCategory, TimeRange};
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn cfg(server: &MockServer) -> ApiConfig {
    ApiConfig {
        base_url: server.uri(),
        token: Some("secret".into()),
        timeout: Duration::from_secs(5),
        page_size: 10,
    }
}

fn payload() -> QueryPayload {
    QueryPayload { filters: FilterTree::default(), order_by: None, group_by: Vec::new(), limit: 10, offset: 20, start: 1, end: 2 }
}

#[tokio::test]
async fn list_posts_payload_and_decodes_records() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/pods/list"))
        .and(header("SIGNOZ-API-KEY", "secret"))
        .and(body_partial_json(serde_json::json!({ "limit": 10, "offset": 20, "orderBy": null })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "success",
            "payload": { "data": { "records": [
                { "podUID": "u-1", "meta": { "k8s_pod_name": "api-0" } }
            ], "total": 21 } }
        })))
        .mount(&server)
        .await;

    let api = HttpApi::new(&cfg(&server)).expect("client");
    let resp = api.list(K8sCategory::Pods, &payload()).await.expect("list");
    assert_eq!(resp.total(), 21);
    assert_eq!(resp.records()[0].field_str("podUID"), Some("u-1"));
}

#[tokio::test]
async fn list_error_status_carries_backend_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/nodes/list"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({ "error": "invalid orderBy column" })))
        .mount(&server)
        .await;

    let api = HttpApi::new(&cfg(&server)).expect("client");
    let err = api.list(K8sCategory::Nodes, &payload()).await.expect_err("should fail");
    assert_eq!(err, ApiError::Status { code: 400, message: "invalid orderBy column".into() });
    assert_eq!(err.display_message(), "invalid orderBy column");
}

#[tokio::test]
async fn in_band_error_is_reported_as_backend_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/jobs/list"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "status": "error", "error": "clickhouse timeout" })))
        .mount(&server)
        .await;

    let api = HttpApi::new(&cfg(&server)).expect("client");
    let err = api.list(K8sCategory::Jobs, &payload()).await.expect_err("should fail");
    assert_eq!(err, ApiError::Backend("clickhouse timeout".into()));
}

#[tokio::test]
async fn attribute_keys_queries_by_aggregate_attribute() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/pods/attribute_keys"))
        .and(query_param("aggregateAttribute", "k8s.pod.cpu.usage"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "payload": { "attributeKeys": [ { "key": "k8s_namespace_name", "dataType": "string", "type": "resource" } ] }
        })))
        .mount(&server)
        .await;

    let api = HttpApi::new(&cfg(&server)).expect("client");
    let keys = api.attribute_keys(K8sCategory::Pods).await.expect("keys");
    assert_eq!(keys.len(), 1);
    assert_eq!(keys[0].key, "k8s_namespace_name");
}

#[tokio::test]
async fn base_url_path_prefix_is_kept() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/signoz/api/v1/pods/list"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "success",
            "payload": { "data": { "records": [], "total": 0 } }
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/signoz/api/v4/query_range"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "payload": { "data": { "newResult": { "data": { "result": [
                { "queryName": "A", "series": [ { "labels": { "k8s_pod_name": "api-0" }, "values": [ { "timestamp": 1, "value": "0.5" } ] } ] }
            ] } } } }
        })))
        .mount(&server)
        .await;

    for base in [format!("{}/signoz/", server.uri()), format!("{}/signoz", server.uri())] {
        let api = HttpApi::new(&ApiConfig { base_url: base.clone(), ..cfg(&server) }).expect("client");
        let resp = api.list(K8sCategory::Pods, &payload()).await.expect("list under prefix");
        assert_eq!(resp.total(), 0, "{}", base);
        let req = QueryRangeRequest::list(TimeRange::from_ms(0, 1), BuilderQuery::raw_list(DataSource::Metrics, FilterTree::default(), 0));
        let range = api.query_range(&req).await.expect("query_range under prefix");
        assert_eq!(range.series()[0].values[0].as_f64(), Some(0.5));
    }
}

#[test]
fn invalid_base_url_is_a_config_error() {
    let cfg = ApiConfig { base_url: "not a url".into(), ..ApiConfig::default() };
    assert!(matches!(HttpApi::new(&cfg), Err(ApiError::Config(_))));
}
