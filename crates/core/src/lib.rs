//! Infrascope core types: filter trees, list query payloads and entity rows.
//!
//! Everything in this crate is plain data plus pure functions. Network access and
//! state orchestration live in `infrascope_api` and `infrascope-store`.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub mod categories;
pub mod columns;
pub mod filters;
pub mod payload;

pub use categories::K8sCategory;

/// Page size used by list views unless the caller configures another one.
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Page size of the nested drill-down table under an expanded group row.
pub const DRILL_DOWN_PAGE_SIZE: u32 = 10;

/// Key of the pagination filter used by the logs/events keyset pager.
pub const ID_KEY: &str = "id";

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("invalid json for `{param}`: {source}")]
    InvalidJson {
        param: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("unknown category: {0}")]
    UnknownCategory(String),
    #[error("validation: {0}")]
    Validation(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

/// Boolean combinator of a filter tree.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum FilterOp {
    #[default]
    #[serde(rename = "AND", alias = "and")]
    And,
    #[serde(rename = "OR", alias = "or")]
    Or,
}

/// Comparison operator of a single filter item.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum FilterOperator {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "in", alias = "IN")]
    In,
    #[serde(rename = "nin", alias = "NOT_IN", alias = "not in")]
    NotIn,
    #[serde(rename = "like", alias = "LIKE")]
    Like,
    #[serde(rename = "nlike", alias = "NOT_LIKE")]
    NotLike,
    #[serde(rename = "contains", alias = "CONTAINS")]
    Contains,
    #[serde(rename = "ncontains", alias = "NOT_CONTAINS")]
    NotContains,
    #[serde(rename = "exists", alias = "EXISTS")]
    Exists,
    #[serde(rename = "nexists", alias = "NOT_EXISTS")]
    NotExists,
    #[serde(rename = "regex", alias = "REGEX")]
    Regex,
    #[serde(rename = "nregex", alias = "NOT_REGEX")]
    NotRegex,
}

impl FilterOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::In => "in",
            Self::NotIn => "nin",
            Self::Like => "like",
            Self::NotLike => "nlike",
            Self::Contains => "contains",
            Self::NotContains => "ncontains",
            Self::Exists => "exists",
            Self::NotExists => "nexists",
            Self::Regex => "regex",
            Self::NotRegex => "nregex",
        }
    }
}

impl std::str::FromStr for FilterOperator {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(serde_json::Value::String(s.to_string()))
            .map_err(|_| CoreError::Validation(format!("unknown filter operator: {}", s)))
    }
}

/// Dimension referenced by a filter item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "camelCase")]
pub struct FilterKey {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    #[serde(default, rename = "type")]
    pub r#type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl FilterKey {
    pub fn named(key: impl Into<String>) -> Self {
        Self { key: key.into(), ..Self::default() }
    }

    /// Resource-typed string key, the shape used for Kubernetes identity dimensions.
    pub fn resource(key: impl Into<String>) -> Self {
        let key = key.into();
        let id = format!("{}--string--resource--false", key);
        Self { key, data_type: Some("string".into()), r#type: Some("resource".into()), id: Some(id) }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FilterItem {
    #[serde(default)]
    pub id: String,
    pub key: FilterKey,
    pub op: FilterOperator,
    #[serde(default)]
    pub value: serde_json::Value,
}

impl FilterItem {
    /// New item with a fresh random id.
    pub fn new(key: FilterKey, op: FilterOperator, value: impl Into<serde_json::Value>) -> Self {
        Self { id: uuid::Uuid::new_v4().to_string(), key, op, value: value.into() }
    }

    pub fn key_name(&self) -> &str {
        &self.key.key
    }

    /// Value rendered as a plain string (arrays joined by `,`).
    pub fn value_string(&self) -> String {
        match &self.value {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Null => String::new(),
            serde_json::Value::Array(vs) => vs
                .iter()
                .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
                .collect::<Vec<_>>()
                .join(","),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct FilterTree {
    #[serde(default)]
    pub op: FilterOp,
    #[serde(default)]
    pub items: Vec<FilterItem>,
}

impl FilterTree {
    pub fn new(items: Vec<FilterItem>) -> Self {
        Self { op: FilterOp::And, items }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct OrderBy {
    pub column_name: String,
    pub order: SortOrder,
}

impl OrderBy {
    pub fn new(column_name: impl Into<String>, order: SortOrder) -> Self {
        Self { column_name: column_name.into(), order }
    }
}

impl std::str::FromStr for OrderBy {
    type Err = CoreError;

    /// Parses `column` or `column:asc|desc` (default `desc`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (col, dir) = match s.split_once(':') {
            Some((c, d)) => (c, d),
            None => (s, "desc"),
        };
        if col.is_empty() {
            return Err(CoreError::Validation("empty order-by column".into()));
        }
        let order = match dir.to_ascii_lowercase().as_str() {
            "asc" | "ascend" => SortOrder::Asc,
            "desc" | "descend" => SortOrder::Desc,
            other => return Err(CoreError::Validation(format!("invalid sort direction: {}", other))),
        };
        Ok(Self::new(col, order))
    }
}

/// A groupable/filterable dimension as returned by key discovery.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "camelCase")]
pub struct AttributeKey {
    pub key: String,
    #[serde(default)]
    pub data_type: String,
    #[serde(default, rename = "type")]
    pub r#type: String,
}

impl AttributeKey {
    pub fn resource(key: impl Into<String>) -> Self {
        Self { key: key.into(), data_type: "string".into(), r#type: "resource".into() }
    }
}

/// Global time range in nanoseconds; payloads carry milliseconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct TimeRange {
    pub min_time_ns: i64,
    pub max_time_ns: i64,
}

impl TimeRange {
    pub fn from_ms(start_ms: i64, end_ms: i64) -> Self {
        Self { min_time_ns: start_ms.saturating_mul(1_000_000), max_time_ns: end_ms.saturating_mul(1_000_000) }
    }

    /// Range ending now and spanning `span`.
    pub fn last(span: chrono::Duration) -> Self {
        let end = chrono::Utc::now();
        let start = end - span;
        Self::from_ms(start.timestamp_millis(), end.timestamp_millis())
    }

    pub fn start_ms(&self) -> i64 {
        self.min_time_ns.div_euclid(1_000_000)
    }

    pub fn end_ms(&self) -> i64 {
        self.max_time_ns.div_euclid(1_000_000)
    }
}

/// Denormalized record returned by an entity list endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct EntityRow {
    /// Raw dimension values (`k8s_namespace_name`, `k8s_cluster_name`, ...).
    #[serde(default)]
    pub meta: BTreeMap<String, String>,
    /// Pre-formatted display fields and metrics.
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl EntityRow {
    pub fn meta_value(&self, key: &str) -> Option<&str> {
        self.meta.get(key).map(String::as_str)
    }

    pub fn field(&self, name: &str) -> Option<&serde_json::Value> {
        self.fields.get(name)
    }

    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(|v| v.as_str())
    }

    /// Field rendered for display; numbers are kept as-is, missing fields render as `-`.
    pub fn display_field(&self, name: &str) -> String {
        match self.fields.get(name) {
            Some(serde_json::Value::String(s)) if !s.is_empty() => s.clone(),
            Some(serde_json::Value::Number(n)) => n.to_string(),
            Some(serde_json::Value::Bool(b)) => b.to_string(),
            _ => "-".to_string(),
        }
    }
}

/// Result row of a group-by query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GroupedRow {
    /// Row key used for expansion state: the ordered group values as a JSON array, so
    /// `("eu-1", "prod")` and `("eu", "1-prod")` stay distinct.
    pub key: String,
    /// Group values joined with `-`, for display.
    #[serde(default)]
    pub label: String,
    /// The group's dimension values; only dimensions present on the row are recorded.
    pub grouped_by_meta: BTreeMap<String, String>,
    pub row: EntityRow,
}

impl GroupedRow {
    pub fn from_row(row: EntityRow, group_by: &[AttributeKey]) -> Self {
        let mut grouped_by_meta = BTreeMap::new();
        let mut values: Vec<Option<&str>> = Vec::with_capacity(group_by.len());
        for g in group_by {
            let v = row.meta.get(&g.key);
            if let Some(v) = v {
                grouped_by_meta.insert(g.key.clone(), v.clone());
            }
            values.push(v.map(String::as_str));
        }
        let label = values.iter().copied().map(Option::unwrap_or_default).collect::<Vec<_>>().join("-");
        let key = serde_json::to_string(&values).unwrap_or_else(|_| label.clone());
        Self { key, label, grouped_by_meta, row }
    }
}

pub mod prelude {
    pub use super::{
        AttributeKey, CoreError, CoreResult, EntityRow, FilterItem, FilterKey, FilterOp, FilterOperator,
        FilterTree, GroupedRow, K8sCategory, OrderBy, SortOrder, TimeRange,
    };
    pub use super::payload::QueryPayload;
}
