//! List view scenarios against the in-memory backend.

use std::sync::Arc;

use infrascope_api::{ApiError, MockApi};
use infrascope_core::categories::{K8S_CLUSTER_NAME, K8S_NAMESPACE_NAME, K8S_POD_NAME};
use infrascope_core::filters::eq_item;
use infrascope_core::{AttributeKey, EntityRow, FilterOperator, FilterTree, K8sCategory, OrderBy, SortOrder, TimeRange};
use infrascope_store::{DrillDownState, ListOutcome, ListView};

fn pod(uid: &str, ns: &str, cpu: f64) -> EntityRow {
    let mut r = EntityRow::default();
    r.meta.insert(K8S_POD_NAME.into(), format!("pod-{}", uid));
    r.meta.insert(K8S_NAMESPACE_NAME.into(), ns.into());
    r.meta.insert(K8S_CLUSTER_NAME.into(), "eu-1".into());
    r.fields.insert("podUID".into(), serde_json::json!(uid));
    r.fields.insert("podCPU".into(), serde_json::json!(cpu));
    r
}

/// 12 pods in `prod` followed by 3 in `dev`.
fn fleet() -> Vec<EntityRow> {
    let mut rows: Vec<EntityRow> = (0..12).map(|i| pod(&format!("p{:02}", i), "prod", i as f64)).collect();
    rows.extend((0..3).map(|i| pod(&format!("d{:02}", i), "dev", i as f64)));
    rows
}

fn time() -> TimeRange {
    TimeRange::from_ms(1_700_000_000_000, 1_700_000_900_000)
}

fn view(api: Arc<MockApi>) -> ListView {
    ListView::new(K8sCategory::Pods, api, 10, time())
}

fn ns_key() -> AttributeKey {
    AttributeKey::resource(K8S_NAMESPACE_NAME)
}

#[tokio::test]
async fn same_inputs_produce_equal_payloads_and_no_refetch() {
    let api = Arc::new(MockApi::new().with_rows(K8sCategory::Pods, fleet()));
    let mut v = view(api.clone());
    let (p1, k1) = v.primary_query();
    let (p2, k2) = v.primary_query();
    assert_eq!(p1, p2);
    assert_eq!(k1, k2);

    v.refresh();
    v.settle().await;
    v.refresh();
    v.settle().await;
    assert_eq!(api.calls().len(), 1);
    assert_eq!(v.outcome(), ListOutcome::Rows);
    assert_eq!(v.rows().len(), 10);
}

#[tokio::test]
async fn grouped_drill_down_fetches_group_members() {
    let api = Arc::new(MockApi::new().with_rows(K8sCategory::Pods, fleet()));
    let mut v = view(api.clone());
    v.set_filters(FilterTree::new(vec![eq_item(K8S_CLUSTER_NAME, "eu-1")]));
    v.set_order_by(Some(OrderBy::new("podCPU", SortOrder::Desc)));
    v.set_group_by(vec![ns_key()]);
    v.settle().await;

    let groups = v.grouped_rows();
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].label, "prod");

    assert!(v.click_row(0));
    assert_eq!(v.drill_down().state(), DrillDownState::Armed);
    assert_eq!(v.expanded_row_keys(), [groups[0].key.clone()]);
    v.settle().await;
    assert_eq!(v.drill_down().state(), DrillDownState::Loaded);

    let (_, payload) = api.calls().last().cloned().expect("drill-down call");
    assert_eq!(payload.limit, 10);
    assert_eq!(payload.offset, 0);
    assert!(payload.group_by.is_empty());
    assert_eq!(payload.order_by, Some(OrderBy::new("podCPU", SortOrder::Desc)));
    // Parent items first, then one equality per group-by key.
    assert_eq!(payload.filters.items.len(), 2);
    assert_eq!(payload.filters.items[0].key.key, K8S_CLUSTER_NAME);
    let last = &payload.filters.items[1];
    assert_eq!((last.key.key.as_str(), last.op, last.value_string()), (K8S_NAMESPACE_NAME, FilterOperator::Eq, "prod".to_string()));

    let snap = v.drill_down().snapshot();
    assert_eq!(snap.records().len(), 10);
    assert!(snap.records().iter().all(|r| r.meta_value(K8S_NAMESPACE_NAME) == Some("prod")));
    assert_eq!(snap.records()[0].field_str("podUID"), Some("p11"));
    assert!(v.drill_down().show_view_all());
}

#[tokio::test]
async fn clicking_an_expanded_group_collapses_it() {
    let api = Arc::new(MockApi::new().with_rows(K8sCategory::Pods, fleet()));
    let mut v = view(api);
    v.set_group_by(vec![ns_key()]);
    v.settle().await;
    v.click_row(1);
    v.settle().await;
    assert_eq!(v.selected_group_row().map(|g| g.label.as_str()), Some("dev"));
    assert!(!v.drill_down().show_view_all());

    v.click_row(1);
    assert!(v.expanded_row_keys().is_empty());
    assert_eq!(v.drill_down().state(), DrillDownState::Idle);
}

#[tokio::test]
async fn hyphenated_group_values_expand_distinct_groups() {
    let mut a = pod("a", "prod", 1.0);
    a.meta.insert(K8S_CLUSTER_NAME.into(), "eu-1".into());
    let mut b = pod("b", "1-prod", 2.0);
    b.meta.insert(K8S_CLUSTER_NAME.into(), "eu".into());
    let api = Arc::new(MockApi::new().with_rows(K8sCategory::Pods, vec![a, b]));
    let mut v = view(api);
    v.set_group_by(vec![AttributeKey::resource(K8S_CLUSTER_NAME), ns_key()]);
    v.settle().await;

    let groups = v.grouped_rows();
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].label, groups[1].label);
    assert_ne!(groups[0].key, groups[1].key);

    assert!(v.click_row(0));
    v.settle().await;
    // Expanding the second group replaces the first instead of collapsing it.
    assert!(v.click_row(1));
    assert_eq!(v.expanded_row_keys(), [groups[1].key.clone()]);
    assert_eq!(v.selected_group_row().map(|g| g.grouped_by_meta.get(K8S_CLUSTER_NAME).cloned()), Some(Some("eu".to_string())));
    assert_eq!(v.drill_down().state(), DrillDownState::Armed);
    v.settle().await;
    let snap = v.drill_down().snapshot();
    assert_eq!(snap.records().len(), 1);
    assert_eq!(snap.records()[0].field_str("podUID"), Some("b"));
}

#[tokio::test]
async fn view_all_promotes_drill_down_filters() {
    let api = Arc::new(MockApi::new().with_rows(K8sCategory::Pods, fleet()));
    let mut v = view(api);
    v.set_order_by(Some(OrderBy::new("podCPU", SortOrder::Asc)));
    v.set_group_by(vec![ns_key()]);
    v.settle().await;
    v.click_row(0);
    v.settle().await;
    let drill_filters = v.drill_down().filters().cloned().expect("armed");

    assert!(v.view_all());
    assert_eq!(v.filters(), &drill_filters);
    assert!(v.group_by().is_empty());
    assert!(v.order_by().is_none());
    assert_eq!(v.page(), 1);
    assert!(v.expanded_row_keys().is_empty());
    assert_eq!(v.drill_down().state(), DrillDownState::Idle);

    v.settle().await;
    assert_eq!(v.snapshot().total(), 12);
    assert!(!v.view_all());
}

#[tokio::test]
async fn leaf_and_group_selection_are_exclusive() {
    let api = Arc::new(MockApi::new().with_rows(K8sCategory::Pods, fleet()));
    let mut v = view(api);
    v.refresh();
    v.settle().await;

    assert!(v.click_row(2));
    assert_eq!(v.selected_row_uid(), Some("p02"));
    assert!(v.selected_group_row().is_none());
    v.settle().await;
    assert_eq!(v.selected_entity().and_then(|e| e.field_str("podUID").map(str::to_string)).as_deref(), Some("p02"));

    v.set_group_by(vec![ns_key()]);
    v.settle().await;
    v.click_row(0);
    assert!(v.selected_row_uid().is_none());
    assert_eq!(v.selected_group_row().map(|g| g.label.as_str()), Some("prod"));
    v.settle().await;

    // Leaves of the expanded group resolve against the nested list.
    assert!(v.select_nested_row(3));
    let nested = v.selected_entity().expect("nested selection");
    assert_eq!(nested.meta_value(K8S_NAMESPACE_NAME), Some("prod"));

    v.set_group_by(Vec::new());
    v.settle().await;
    v.click_row(0);
    assert!(v.selected_group_row().is_none());
    assert!(v.expanded_row_keys().is_empty());
    assert_eq!(v.drill_down().state(), DrillDownState::Idle);
}

#[tokio::test]
async fn rows_without_identifier_are_not_selectable() {
    let mut anon = pod("x", "prod", 1.0);
    anon.fields.remove("podUID");
    let api = Arc::new(MockApi::new().with_rows(K8sCategory::Pods, vec![anon]));
    let mut v = view(api);
    v.refresh();
    v.settle().await;
    assert!(!v.click_row(0));
    assert!(v.selected_row_uid().is_none());
    assert!(!v.click_row(5));
}

#[tokio::test]
async fn time_change_with_a_selected_leaf_does_not_refetch_the_list() {
    let api = Arc::new(MockApi::new().with_rows(K8sCategory::Pods, fleet()));
    let mut v = view(api.clone());
    v.refresh();
    v.settle().await;
    v.click_row(0);
    v.settle().await;
    let before = api.calls().len();

    v.set_time_range(TimeRange::from_ms(1_700_000_100_000, 1_700_000_950_000));
    v.settle().await;
    assert_eq!(api.calls().len(), before);

    v.close_detail();
    v.settle().await;
    assert_eq!(api.calls().len(), before + 1);
}

#[tokio::test]
async fn page_resets_on_filter_group_and_page_size_changes() {
    let api = Arc::new(MockApi::new().with_rows(K8sCategory::Pods, fleet()));
    let mut v = view(api);
    // The first filter set is the initial one and keeps the page.
    v.set_page(2);
    v.set_filters(FilterTree::new(vec![eq_item(K8S_CLUSTER_NAME, "eu-1")]));
    assert_eq!(v.page(), 2);
    v.set_filters(FilterTree::default());
    assert_eq!(v.page(), 1);

    v.set_page(2);
    v.set_group_by(vec![ns_key()]);
    assert_eq!(v.page(), 1);

    v.set_page(2);
    v.set_page_size(5);
    assert_eq!(v.page(), 1);

    v.set_group_by(Vec::new());
    v.settle().await;
    v.click_row(0);
    v.set_page(2);
    v.quick_filters_updated(FilterTree::new(vec![eq_item(K8S_NAMESPACE_NAME, "dev")]));
    assert_eq!(v.page(), 1);
    assert!(v.selected_row_uid().is_none());
    v.settle().await;
    assert_eq!(v.snapshot().total(), 3);
}

#[tokio::test]
async fn outcome_distinguishes_empty_states_and_errors() {
    let api = Arc::new(MockApi::new());
    let mut v = view(api);
    assert_eq!(v.outcome(), ListOutcome::Loading);
    v.refresh();
    v.settle().await;
    assert_eq!(v.outcome(), ListOutcome::NoData);
    v.set_filters(FilterTree::new(vec![eq_item(K8S_NAMESPACE_NAME, "nowhere")]));
    v.settle().await;
    assert_eq!(v.outcome(), ListOutcome::NoResultsForQuery);

    let mut failing = MockApi::new();
    failing.list_error = Some(ApiError::Backend("query timed out".into()));
    let mut v = view(Arc::new(failing));
    v.refresh();
    v.settle().await;
    assert_eq!(v.outcome(), ListOutcome::Error("query timed out".into()));

    let mut failing = MockApi::new();
    failing.list_error = Some(ApiError::Transport("connection refused".into()));
    let mut v = view(Arc::new(failing));
    v.refresh();
    v.settle().await;
    assert_eq!(v.outcome(), ListOutcome::Error("Something went wrong".into()));
}
