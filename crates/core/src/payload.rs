//! Query payload builder for entity list endpoints.
//!
//! Pure functions: the same inputs always produce equal payloads, which is what lets
//! the fetchers use the serialized payload as their cache key.

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    AttributeKey, FilterItem, FilterKey, FilterOperator, FilterTree, GroupedRow, K8sCategory, OrderBy, TimeRange,
    DRILL_DOWN_PAGE_SIZE,
};

/// Request body of an entity list endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QueryPayload {
    pub filters: FilterTree,
    pub order_by: Option<OrderBy>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub group_by: Vec<AttributeKey>,
    pub limit: u32,
    pub offset: u32,
    /// Milliseconds since epoch.
    pub start: i64,
    pub end: i64,
}

/// Inputs of the primary list query.
#[derive(Debug, Clone, PartialEq)]
pub struct ListQuery {
    pub filters: FilterTree,
    pub order_by: Option<OrderBy>,
    pub group_by: Vec<AttributeKey>,
    /// 1-based.
    pub page: u32,
    pub page_size: u32,
    pub time: TimeRange,
}

pub fn build_list_payload(q: &ListQuery) -> QueryPayload {
    let page = q.page.max(1);
    QueryPayload {
        filters: q.filters.clone(),
        order_by: q.order_by.clone(),
        group_by: q.group_by.clone(),
        limit: q.page_size,
        offset: (page - 1).saturating_mul(q.page_size),
        start: q.time.start_ms(),
        end: q.time.end_ms(),
    }
}

/// Filter tree selecting the members of one group: the parent's items verbatim followed
/// by one equality item per group-by key, in group-by order.
///
/// A dimension missing from the group row yields an empty-string value; it is passed
/// through as-is. Item ids are `key=value`, and an equality the parent already holds
/// (a promoted drill-down) is not added twice.
pub fn drill_down_filters(parent: &FilterTree, group_by: &[AttributeKey], row: &GroupedRow) -> FilterTree {
    let mut items = parent.items.clone();
    for g in group_by {
        let value = match row.grouped_by_meta.get(&g.key) {
            Some(v) => v.clone(),
            None => {
                debug!(key = %g.key, row = %row.label, "group row lacks dimension; filtering on empty value");
                String::new()
            }
        };
        let value = serde_json::Value::String(value);
        if items.iter().any(|i| i.key.key == g.key && i.op == FilterOperator::Eq && i.value == value) {
            continue;
        }
        items.push(FilterItem {
            id: format!("{}={}", g.key, value.as_str().unwrap_or_default()),
            key: FilterKey { key: g.key.clone(), data_type: None, r#type: None, id: None },
            op: FilterOperator::Eq,
            value,
        });
    }
    FilterTree { op: parent.op, items }
}

/// Payload of the nested drill-down table under an expanded group row.
pub fn build_drill_down_payload(
    parent: &FilterTree,
    order_by: Option<&OrderBy>,
    group_by: &[AttributeKey],
    row: &GroupedRow,
    time: TimeRange,
) -> QueryPayload {
    QueryPayload {
        filters: drill_down_filters(parent, group_by, row),
        order_by: order_by.cloned(),
        group_by: Vec::new(),
        limit: DRILL_DOWN_PAGE_SIZE,
        offset: 0,
        start: time.start_ms(),
        end: time.end_ms(),
    }
}

/// Cache key of a list request: category plus the serialized payload. With
/// `with_time = false` the time range is left out so that time changes alone do not
/// invalidate the entry.
pub fn cache_key(category: K8sCategory, payload: &QueryPayload, with_time: bool) -> String {
    let body = if with_time {
        serde_json::to_string(payload)
    } else {
        let mut p = payload.clone();
        p.start = 0;
        p.end = 0;
        serde_json::to_string(&p)
    };
    // Serializing plain data with string keys cannot fail.
    format!("{}:{}", category.query_key(), body.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{categories::K8S_NAMESPACE_NAME, filters::eq_item, EntityRow, SortOrder};

    fn query() -> ListQuery {
        ListQuery {
            filters: FilterTree::new(vec![eq_item("k8s_cluster_name", "eu-1")]),
            order_by: Some(OrderBy::new("cpu", SortOrder::Desc)),
            group_by: Vec::new(),
            page: 3,
            page_size: 10,
            time: TimeRange { min_time_ns: 1_700_000_000_123_456_789, max_time_ns: 1_700_000_900_999_999_999 },
        }
    }

    #[test]
    fn list_payload_is_deterministic() {
        let q = query();
        assert_eq!(build_list_payload(&q), build_list_payload(&q));
        assert_eq!(cache_key(K8sCategory::Pods, &build_list_payload(&q), true), cache_key(K8sCategory::Pods, &build_list_payload(&q), true));
    }

    #[test]
    fn list_payload_offsets_and_time() {
        let p = build_list_payload(&query());
        assert_eq!(p.limit, 10);
        assert_eq!(p.offset, 20);
        assert_eq!(p.start, 1_700_000_000_123);
        assert_eq!(p.end, 1_700_000_900_999);
        let json = serde_json::to_value(&p).unwrap();
        assert!(json.get("groupBy").is_none());
        assert_eq!(json["orderBy"]["columnName"], "cpu");
    }

    #[test]
    fn drill_down_appends_one_item_per_group_key() {
        let mut row = EntityRow::default();
        row.meta.insert(K8S_NAMESPACE_NAME.into(), "prod".into());
        let gb = vec![AttributeKey::resource(K8S_NAMESPACE_NAME), AttributeKey::resource("k8s_node_name")];
        let grouped = GroupedRow::from_row(row, &gb);
        let q = query();
        let p = build_drill_down_payload(&q.filters, q.order_by.as_ref(), &gb, &grouped, q.time);
        assert_eq!(p.limit, 10);
        assert_eq!(p.offset, 0);
        assert!(p.group_by.is_empty());
        assert_eq!(p.filters.items.len(), 3);
        assert_eq!(p.filters.items[0], q.filters.items[0]);
        assert_eq!(p.filters.items[1].value, serde_json::json!("prod"));
        // Absent dimension passes through as an empty value.
        assert_eq!(p.filters.items[2].key.key, "k8s_node_name");
        assert_eq!(p.filters.items[2].value, serde_json::json!(""));
    }

    #[test]
    fn drilling_into_a_promoted_group_keeps_item_ids_unique() {
        let mut row = EntityRow::default();
        row.meta.insert(K8S_NAMESPACE_NAME.into(), "prod".into());
        let gb = vec![AttributeKey::resource(K8S_NAMESPACE_NAME)];
        let grouped = GroupedRow::from_row(row, &gb);
        let promoted = drill_down_filters(&FilterTree::default(), &gb, &grouped);
        assert_eq!(promoted.items[0].id, "k8s_namespace_name=prod");

        let again = drill_down_filters(&promoted, &gb, &grouped);
        assert_eq!(again, promoted);
        let ids: std::collections::HashSet<_> = again.items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids.len(), again.items.len());
    }

    #[test]
    fn cache_key_without_time_ignores_range() {
        let mut q = query();
        let a = cache_key(K8sCategory::Pods, &build_list_payload(&q), false);
        q.time = TimeRange::from_ms(1, 2);
        let b = cache_key(K8sCategory::Pods, &build_list_payload(&q), false);
        assert_eq!(a, b);
        assert_ne!(a, cache_key(K8sCategory::Nodes, &build_list_payload(&q), false));
    }
}
