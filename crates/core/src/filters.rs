//! Filter tree helpers shared by the list, pager and drawer logic.

#![forbid(unsafe_code)]

use crate::{FilterItem, FilterKey, FilterOperator, FilterTree, ID_KEY};

/// Equality item on a resource dimension.
pub fn eq_item(key: &str, value: impl Into<serde_json::Value>) -> FilterItem {
    FilterItem::new(FilterKey::resource(key), FilterOperator::Eq, value)
}

/// Keyset pagination item: `id <op> value`.
pub fn id_item(op: FilterOperator, value: impl Into<serde_json::Value>) -> FilterItem {
    FilterItem {
        id: ID_KEY.to_string(),
        key: FilterKey { key: ID_KEY.to_string(), data_type: Some("string".into()), r#type: Some(String::new()), id: None },
        op,
        value: value.into(),
    }
}

/// Drop items that repeat an earlier item's key, operator and value. The first one wins.
pub fn dedup(items: Vec<FilterItem>) -> Vec<FilterItem> {
    let mut out: Vec<FilterItem> = Vec::with_capacity(items.len());
    for item in items {
        let dup = out.iter().any(|o| o.key.key == item.key.key && o.op == item.op && o.value == item.value);
        if !dup {
            out.push(item);
        }
    }
    out
}

/// Copy of `tree` without any `id` pagination filter.
pub fn without_id(tree: &FilterTree) -> FilterTree {
    FilterTree { op: tree.op, items: tree.items.iter().filter(|i| i.key.key != ID_KEY).cloned().collect() }
}

pub fn find_id(tree: &FilterTree) -> Option<&FilterItem> {
    tree.items.iter().find(|i| i.key.key == ID_KEY)
}

/// Split items into those whose key is one of `keys` and the rest, preserving order.
pub fn partition_by_keys<'a>(items: &'a [FilterItem], keys: &[&str]) -> (Vec<&'a FilterItem>, Vec<&'a FilterItem>) {
    items.iter().partition(|i| keys.contains(&i.key.key.as_str()))
}

/// Human-readable `key op value AND ...` rendering, used for logs and CLI output.
pub fn describe(tree: &FilterTree) -> String {
    if tree.items.is_empty() {
        return "(none)".to_string();
    }
    let joiner = match tree.op {
        crate::FilterOp::And => " AND ",
        crate::FilterOp::Or => " OR ",
    };
    tree.items
        .iter()
        .map(|i| format!("{} {} {}", i.key.key, i.op.as_str(), i.value_string()))
        .collect::<Vec<_>>()
        .join(joiner)
}

/// Parse a `key<op>value` expression, e.g. `k8s_namespace_name=prod` or `k8s_pod_name!=api`.
/// Two-character operators are tried first.
pub fn parse_expr(expr: &str) -> crate::CoreResult<FilterItem> {
    const OPS: [(&str, FilterOperator); 6] = [
        ("!=", FilterOperator::Ne),
        ("<=", FilterOperator::Le),
        (">=", FilterOperator::Ge),
        ("=", FilterOperator::Eq),
        ("<", FilterOperator::Lt),
        (">", FilterOperator::Gt),
    ];
    for (tok, op) in OPS {
        if let Some((k, v)) = expr.split_once(tok) {
            let k = k.trim();
            if k.is_empty() {
                break;
            }
            return Ok(FilterItem::new(FilterKey::resource(k), op, v.trim()));
        }
    }
    Err(crate::CoreError::Validation(format!("invalid filter expression: {}", expr)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_keeps_first_occurrence() {
        let a = eq_item("k8s_pod_name", "api");
        let mut b = eq_item("k8s_pod_name", "api");
        b.id = "other".into();
        let c = eq_item("k8s_pod_name", "web");
        let out = dedup(vec![a.clone(), b, c.clone()]);
        assert_eq!(out, vec![a, c]);
    }

    #[test]
    fn parse_expr_handles_two_char_operators() {
        let i = parse_expr("k8s_pod_name!=api").unwrap();
        assert_eq!(i.key.key, "k8s_pod_name");
        assert_eq!(i.op, FilterOperator::Ne);
        assert_eq!(i.value, serde_json::json!("api"));
        assert!(parse_expr("=x").is_err());
        assert!(parse_expr("novalue").is_err());
    }

    #[test]
    fn without_id_strips_pagination_filter() {
        let t = FilterTree::new(vec![eq_item("k8s_pod_name", "api"), id_item(FilterOperator::Lt, "abc")]);
        assert!(find_id(&t).is_some());
        let s = without_id(&t);
        assert_eq!(s.items.len(), 1);
        assert!(find_id(&s).is_none());
    }
}
