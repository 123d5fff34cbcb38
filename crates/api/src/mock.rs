//! In-memory backend for tests and demos.
//!
//! Evaluates list payloads and query-range requests against canned rows: equality and
//! set filters, ordering, group-by aggregation, offset/limit, and the `id` keyset
//! cursor. Calls are recorded so tests can assert on what was sent.

#![forbid(unsafe_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use infrascope_core::payload::QueryPayload;
use infrascope_core::{AttributeKey, EntityRow, FilterItem, FilterOp, FilterOperator, FilterTree, K8sCategory, SortOrder, ID_KEY};

use crate::{
    ApiError, ApiResult, DataSource, InfraApi, ListData, ListResponse, LogRecord, QueryRangeRequest, QueryRangeResponse,
    Series,
};

#[derive(Default)]
pub struct MockApi {
    pub lists: HashMap<K8sCategory, Vec<EntityRow>>,
    /// Log/event rows; served newest first by id.
    pub logs: Vec<LogRecord>,
    /// Metric series, matched on their labels.
    pub series: Vec<Series>,
    pub attribute_keys: Vec<AttributeKey>,
    /// When set, every list call fails with this error.
    pub list_error: Option<ApiError>,
    delays: Mutex<VecDeque<Duration>>,
    calls: Mutex<Vec<(K8sCategory, QueryPayload)>>,
    range_calls: Mutex<Vec<QueryRangeRequest>>,
}

impl MockApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(mut self, category: K8sCategory, rows: Vec<EntityRow>) -> Self {
        self.lists.insert(category, rows);
        self
    }

    pub fn with_logs(mut self, logs: Vec<LogRecord>) -> Self {
        self.logs = logs;
        self
    }

    pub fn with_series(mut self, series: Vec<Series>) -> Self {
        self.series = series;
        self
    }

    /// Delay the next list call by `d`; queued delays apply in call order.
    pub fn push_delay(&self, d: Duration) {
        lock(&self.delays).push_back(d);
    }

    pub fn calls(&self) -> Vec<(K8sCategory, QueryPayload)> {
        lock(&self.calls).clone()
    }

    pub fn range_calls(&self) -> Vec<QueryRangeRequest> {
        lock(&self.range_calls).clone()
    }

    fn evaluate_list(&self, category: K8sCategory, p: &QueryPayload) -> ListData {
        let rows = self.lists.get(&category).cloned().unwrap_or_default();
        let mut matched: Vec<EntityRow> = rows.into_iter().filter(|r| tree_matches(&p.filters, |k| row_value(r, k))).collect();
        if let Some(ob) = &p.order_by {
            matched.sort_by(|a, b| {
                let ord = compare_json(a.field(&ob.column_name), b.field(&ob.column_name));
                match ob.order {
                    SortOrder::Asc => ord,
                    SortOrder::Desc => ord.reverse(),
                }
            });
        }
        if !p.group_by.is_empty() {
            matched = aggregate(matched, &p.group_by);
        }
        let total = matched.len() as u64;
        let records = matched.into_iter().skip(p.offset as usize).take(p.limit as usize).collect();
        ListData { records, total }
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

fn row_value(r: &EntityRow, key: &str) -> Option<String> {
    if let Some(v) = r.meta_value(key) {
        return Some(v.to_string());
    }
    r.field(key).map(json_string)
}

fn log_value(r: &LogRecord, key: &str) -> Option<String> {
    if let Some(v) = r.data.get(key) {
        return Some(json_string(v));
    }
    ["resources_string", "attributes_string"]
        .iter()
        .filter_map(|m| r.data.get(*m).and_then(|v| v.get(key)))
        .map(json_string)
        .next()
}

fn json_string(v: &serde_json::Value) -> String {
    v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string())
}

fn item_matches(item: &FilterItem, actual: Option<String>) -> bool {
    let want = item.value_string();
    match item.op {
        FilterOperator::Eq => actual.as_deref() == Some(want.as_str()),
        FilterOperator::Ne => actual.as_deref() != Some(want.as_str()),
        FilterOperator::In => actual.map(|a| want.split(',').any(|w| w == a)).unwrap_or(false),
        FilterOperator::NotIn => actual.map(|a| !want.split(',').any(|w| w == a)).unwrap_or(true),
        FilterOperator::Lt => actual.map(|a| a < want).unwrap_or(false),
        FilterOperator::Gt => actual.map(|a| a > want).unwrap_or(false),
        FilterOperator::Le => actual.map(|a| a <= want).unwrap_or(false),
        FilterOperator::Ge => actual.map(|a| a >= want).unwrap_or(false),
        FilterOperator::Contains => actual.map(|a| a.contains(&want)).unwrap_or(false),
        FilterOperator::Exists => actual.is_some(),
        FilterOperator::NotExists => actual.is_none(),
        // Not evaluated by the mock.
        _ => true,
    }
}

fn tree_matches(tree: &FilterTree, get: impl Fn(&str) -> Option<String>) -> bool {
    if tree.items.is_empty() {
        return true;
    }
    let mut results = tree.items.iter().map(|i| item_matches(i, get(&i.key.key)));
    match tree.op {
        FilterOp::And => results.all(|b| b),
        FilterOp::Or => results.any(|b| b),
    }
}

fn compare_json(a: Option<&serde_json::Value>, b: Option<&serde_json::Value>) -> std::cmp::Ordering {
    match (a.and_then(|v| v.as_f64()), b.and_then(|v| v.as_f64())) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(std::cmp::Ordering::Equal),
        _ => a.map(json_string).cmp(&b.map(json_string)),
    }
}

/// One row per distinct combination of group values, in first-seen order. The group
/// row carries only the grouped dimensions in `meta` and a member count.
fn aggregate(rows: Vec<EntityRow>, group_by: &[AttributeKey]) -> Vec<EntityRow> {
    let mut order: Vec<Vec<Option<String>>> = Vec::new();
    let mut counts: HashMap<Vec<Option<String>>, u64> = HashMap::new();
    for r in &rows {
        let key: Vec<Option<String>> = group_by.iter().map(|g| r.meta_value(&g.key).map(str::to_string)).collect();
        let c = counts.entry(key.clone()).or_insert(0);
        if *c == 0 {
            order.push(key);
        }
        *c += 1;
    }
    order
        .into_iter()
        .map(|key| {
            let mut row = EntityRow::default();
            for (g, v) in group_by.iter().zip(&key) {
                if let Some(v) = v {
                    row.meta.insert(g.key.clone(), v.clone());
                }
            }
            let n = counts.get(&key).copied().unwrap_or(0);
            row.fields.insert("count".into(), serde_json::json!(n));
            row
        })
        .collect()
}

#[async_trait::async_trait]
impl InfraApi for MockApi {
    async fn list(&self, category: K8sCategory, payload: &QueryPayload) -> ApiResult<ListResponse> {
        lock(&self.calls).push((category, payload.clone()));
        let delay = lock(&self.delays).pop_front();
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
        if let Some(e) = &self.list_error {
            return Err(e.clone());
        }
        Ok(ListResponse::ok(self.evaluate_list(category, payload)))
    }

    async fn query_range(&self, request: &QueryRangeRequest) -> ApiResult<QueryRangeResponse> {
        lock(&self.range_calls).push(request.clone());
        let Some(q) = request.first_query() else {
            return Err(ApiError::Backend("no builder query".into()));
        };
        if q.data_source == DataSource::Metrics {
            let series = self
                .series
                .iter()
                .filter(|s| tree_matches(&q.filters, |k| s.labels.get(k).cloned()))
                .cloned()
                .collect();
            return Ok(QueryRangeResponse::from_series(series));
        }
        let mut rows: Vec<LogRecord> = self
            .logs
            .iter()
            .filter(|r| tree_matches(&q.filters, |k| if k == ID_KEY { r.id().map(str::to_string) } else { log_value(r, k) }))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.id().cmp(&a.id()));
        let size = if q.page_size == 0 { rows.len() } else { q.page_size as usize };
        let list = rows.into_iter().skip(q.offset as usize).take(size).collect();
        Ok(QueryRangeResponse::from_list(list))
    }

    async fn attribute_keys(&self, _category: K8sCategory) -> ApiResult<Vec<AttributeKey>> {
        Ok(self.attribute_keys.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use infrascope_core::filters::eq_item;
    use infrascope_core::OrderBy;

    fn pod(uid: &str, ns: &str, cpu: f64) -> EntityRow {
        let mut r = EntityRow::default();
        r.meta.insert("k8s_pod_name".into(), format!("pod-{}", uid));
        r.meta.insert("k8s_namespace_name".into(), ns.into());
        r.fields.insert("podUID".into(), serde_json::json!(uid));
        r.fields.insert("cpu".into(), serde_json::json!(cpu));
        r
    }

    fn payload(filters: FilterTree, group_by: Vec<AttributeKey>) -> QueryPayload {
        QueryPayload {
            filters,
            order_by: Some(OrderBy::new("cpu", SortOrder::Desc)),
            group_by,
            limit: 10,
            offset: 0,
            start: 0,
            end: 1,
        }
    }

    #[tokio::test]
    async fn list_filters_sorts_and_groups() {
        let api = MockApi::new().with_rows(
            K8sCategory::Pods,
            vec![pod("a", "prod", 0.1), pod("b", "dev", 0.9), pod("c", "prod", 0.5)],
        );
        let resp = api
            .list(K8sCategory::Pods, &payload(FilterTree::new(vec![eq_item("k8s_namespace_name", "prod")]), vec![]))
            .await
            .unwrap();
        let uids: Vec<_> = resp.records().iter().map(|r| r.field_str("podUID").unwrap()).collect();
        assert_eq!(uids, vec!["c", "a"]);
        assert_eq!(resp.total(), 2);

        let grouped = api
            .list(K8sCategory::Pods, &payload(FilterTree::default(), vec![AttributeKey::resource("k8s_namespace_name")]))
            .await
            .unwrap();
        assert_eq!(grouped.total(), 2);
        assert_eq!(grouped.records()[0].meta_value("k8s_namespace_name"), Some("dev"));
        assert_eq!(grouped.records()[1].field("count"), Some(&serde_json::json!(2)));
        assert_eq!(api.calls().len(), 2);
    }
}
