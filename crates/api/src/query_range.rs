//! Query-range request/response types used by the detail drawer's sub-views.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use infrascope_core::{AttributeKey, FilterTree, OrderBy, SortOrder, TimeRange};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    Logs,
    Traces,
    Metrics,
}

/// One builder query of a composite query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BuilderQuery {
    pub query_name: String,
    pub data_source: DataSource,
    pub aggregate_operator: String,
    #[serde(default)]
    pub aggregate_attribute: Option<AttributeKey>,
    pub filters: FilterTree,
    pub expression: String,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub group_by: Vec<AttributeKey>,
    #[serde(default)]
    pub order_by: Vec<OrderBy>,
    #[serde(default)]
    pub page_size: u32,
    #[serde(default)]
    pub offset: u32,
    #[serde(default)]
    pub limit: Option<u32>,
}

impl BuilderQuery {
    /// Raw list query (no aggregation) over logs or traces.
    pub fn raw_list(data_source: DataSource, filters: FilterTree, page_size: u32) -> Self {
        let order_by = match data_source {
            DataSource::Logs => vec![OrderBy::new("timestamp", SortOrder::Desc), OrderBy::new("id", SortOrder::Desc)],
            _ => vec![OrderBy::new("timestamp", SortOrder::Desc)],
        };
        Self {
            query_name: "A".into(),
            data_source,
            aggregate_operator: "noop".into(),
            aggregate_attribute: None,
            filters,
            expression: "A".into(),
            disabled: false,
            group_by: Vec::new(),
            order_by,
            page_size,
            offset: 0,
            limit: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CompositeQuery {
    pub query_type: String,
    pub panel_type: String,
    pub builder_queries: BTreeMap<String, BuilderQuery>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QueryRangeRequest {
    /// Milliseconds since epoch.
    pub start: i64,
    pub end: i64,
    pub step: u32,
    pub composite_query: CompositeQuery,
}

impl QueryRangeRequest {
    /// List-panel request with a single builder query.
    pub fn list(time: TimeRange, query: BuilderQuery) -> Self {
        let mut builder_queries = BTreeMap::new();
        builder_queries.insert(query.query_name.clone(), query);
        Self {
            start: time.start_ms(),
            end: time.end_ms(),
            step: 60,
            composite_query: CompositeQuery { query_type: "builder".into(), panel_type: "list".into(), builder_queries },
        }
    }

    /// The single builder query of a list request.
    pub fn first_query(&self) -> Option<&BuilderQuery> {
        self.composite_query.builder_queries.values().next()
    }
}

/// One raw row of a list result (a log line, a span, an event).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct LogRecord {
    #[serde(default)]
    pub timestamp: serde_json::Value,
    #[serde(default)]
    pub data: serde_json::Map<String, serde_json::Value>,
}

impl LogRecord {
    /// Opaque row id used as the keyset cursor.
    pub fn id(&self) -> Option<&str> {
        self.data.get("id").and_then(|v| v.as_str())
    }

    pub fn body(&self) -> Option<&str> {
        self.data.get("body").and_then(|v| v.as_str())
    }
}

/// One sample of a time series. The backend sends values as strings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Point {
    /// Milliseconds since epoch.
    pub timestamp: i64,
    pub value: serde_json::Value,
}

impl Point {
    pub fn new(timestamp: i64, value: f64) -> Self {
        Self { timestamp, value: serde_json::Value::String(value.to_string()) }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match &self.value {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }
}

/// A graph-panel series: its label set and samples in time order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Series {
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub values: Vec<Point>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct QueryResult {
    #[serde(default, rename = "queryName")]
    pub query_name: String,
    /// Rows of a list panel.
    #[serde(default)]
    pub list: Option<Vec<LogRecord>>,
    /// Series of a graph panel.
    #[serde(default)]
    pub series: Option<Vec<Series>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ResultData {
    #[serde(default)]
    pub result: Vec<QueryResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct NewResult {
    #[serde(default)]
    pub data: ResultData,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct QueryRangeData {
    #[serde(default)]
    pub new_result: NewResult,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct QueryRangePayload {
    #[serde(default)]
    pub data: QueryRangeData,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct QueryRangeResponse {
    #[serde(default)]
    pub payload: Option<QueryRangePayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueryRangeResponse {
    pub fn from_list(list: Vec<LogRecord>) -> Self {
        Self::from_result(QueryResult { query_name: "A".into(), list: Some(list), series: None })
    }

    pub fn from_series(series: Vec<Series>) -> Self {
        Self::from_result(QueryResult { query_name: "A".into(), list: None, series: Some(series) })
    }

    fn from_result(result: QueryResult) -> Self {
        Self {
            payload: Some(QueryRangePayload {
                data: QueryRangeData { new_result: NewResult { data: ResultData { result: vec![result] } } },
            }),
            error: None,
        }
    }

    /// Rows of the first result's list, or empty.
    pub fn list(&self) -> &[LogRecord] {
        self.payload
            .as_ref()
            .and_then(|p| p.data.new_result.data.result.first())
            .and_then(|r| r.list.as_deref())
            .unwrap_or(&[])
    }

    /// Series of the first result, or empty.
    pub fn series(&self) -> &[Series] {
        self.payload
            .as_ref()
            .and_then(|p| p.data.new_result.data.result.first())
            .and_then(|r| r.series.as_deref())
            .unwrap_or(&[])
    }
}
