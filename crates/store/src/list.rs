//! Per-category list view: query inputs, selection, grouping and the two fetchers
//! (primary list and group drill-down).

#![forbid(unsafe_code)]

use std::sync::Arc;

use tracing::{debug, info, warn};

use infrascope_api::{InfraApi, FALLBACK_ERROR};
use infrascope_core::payload::{build_drill_down_payload, build_list_payload, cache_key, drill_down_filters, ListQuery, QueryPayload};
use infrascope_core::{AttributeKey, EntityRow, FilterTree, GroupedRow, K8sCategory, OrderBy, TimeRange};

use crate::drilldown::DrillDown;
use crate::fetcher::{FetchSnapshot, FetchStatus, Fetcher};
use crate::view_state::ViewState;

/// What the list area should render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListOutcome {
    Loading,
    Error(String),
    /// Empty result with active filters.
    NoResultsForQuery,
    /// Empty result and no filters: nothing is being reported for this category.
    NoData,
    Rows,
}

/// Row expansion and selection. A leaf selection and a group selection never coexist,
/// except for a leaf picked inside the expanded group's nested list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectionState {
    /// At most one key: expanding a group collapses any other.
    pub expanded_row_keys: Vec<String>,
    pub selected_row_uid: Option<String>,
    pub selected_group_row: Option<GroupedRow>,
}

pub struct ListView {
    category: K8sCategory,
    time: TimeRange,
    filters: FilterTree,
    filters_initialised: bool,
    order_by: Option<OrderBy>,
    group_by: Vec<AttributeKey>,
    page: u32,
    page_size: u32,
    selection: SelectionState,
    primary: Fetcher,
    drill: DrillDown,
}

impl ListView {
    /// Nothing is fetched until the first [`ListView::refresh`] or input change.
    pub fn new(category: K8sCategory, api: Arc<dyn InfraApi>, page_size: u32, time: TimeRange) -> Self {
        Self {
            category,
            time,
            filters: FilterTree::default(),
            filters_initialised: false,
            order_by: None,
            group_by: Vec::new(),
            page: 1,
            page_size: page_size.max(1),
            selection: SelectionState::default(),
            primary: Fetcher::new("list", Arc::clone(&api), category),
            drill: DrillDown::new(api, category),
        }
    }

    /// Restore list inputs from a shared view state. Drawer parameters are left to
    /// [`crate::DetailDrawer::open`].
    pub fn from_view_state(api: Arc<dyn InfraApi>, page_size: u32, time: TimeRange, state: &ViewState) -> Self {
        let mut v = Self::new(state.category_or_default(), api, page_size, time);
        if let Some(f) = &state.filters {
            v.filters = f.clone();
        }
        v.group_by = state.group_by.clone().unwrap_or_default();
        v.order_by = state.order_by.clone();
        v.page = state.current_page.unwrap_or(1).max(1);
        v.selection.selected_row_uid = state.selected.clone();
        v
    }

    /// Write the list's inputs into `state`, keeping drawer parameters as they are.
    pub fn write_view_state(&self, state: &mut ViewState) {
        state.category = Some(self.category);
        state.filters = Some(self.filters.clone());
        state.group_by = Some(self.group_by.clone());
        state.order_by = self.order_by.clone();
        state.current_page = Some(self.page);
        state.selected = self.selection.selected_row_uid.clone();
    }

    pub fn category(&self) -> K8sCategory {
        self.category
    }

    pub fn filters(&self) -> &FilterTree {
        &self.filters
    }

    pub fn order_by(&self) -> Option<&OrderBy> {
        self.order_by.as_ref()
    }

    pub fn group_by(&self) -> &[AttributeKey] {
        &self.group_by
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn time(&self) -> TimeRange {
        self.time
    }

    pub fn selection(&self) -> &SelectionState {
        &self.selection
    }

    pub fn expanded_row_keys(&self) -> &[String] {
        &self.selection.expanded_row_keys
    }

    pub fn selected_row_uid(&self) -> Option<&str> {
        self.selection.selected_row_uid.as_deref()
    }

    pub fn selected_group_row(&self) -> Option<&GroupedRow> {
        self.selection.selected_group_row.as_ref()
    }

    pub fn drill_down(&self) -> &DrillDown {
        &self.drill
    }

    pub fn snapshot(&self) -> Arc<FetchSnapshot> {
        self.primary.snapshot()
    }

    pub fn list_query(&self) -> ListQuery {
        ListQuery {
            filters: self.filters.clone(),
            order_by: self.order_by.clone(),
            group_by: self.group_by.clone(),
            page: self.page,
            page_size: self.page_size,
            time: self.time,
        }
    }

    /// Payload and cache key of the primary list. With a leaf selected the key leaves
    /// the time range out.
    pub fn primary_query(&self) -> (QueryPayload, String) {
        let payload = build_list_payload(&self.list_query());
        let key = cache_key(self.category, &payload, self.selection.selected_row_uid.is_none());
        (payload, key)
    }

    fn drill_query(&self, row: &GroupedRow) -> (QueryPayload, String) {
        let payload = build_drill_down_payload(&self.filters, self.order_by.as_ref(), &self.group_by, row, self.time);
        let key = cache_key(self.category, &payload, true);
        (payload, key)
    }

    /// Push current inputs to both fetchers; unchanged keys issue nothing.
    pub fn refresh(&mut self) {
        self.primary.set_query(Some(self.primary_query()));
        if let Some(row) = self.selection.selected_group_row.clone() {
            let (payload, key) = self.drill_query(&row);
            self.drill.update(payload, key);
        }
    }

    pub fn set_filters(&mut self, filters: FilterTree) {
        if self.filters_initialised {
            self.page = 1;
        }
        self.filters_initialised = true;
        self.filters = filters;
        self.refresh();
    }

    /// Quick-filter edits reset pagination and any selection.
    pub fn quick_filters_updated(&mut self, filters: FilterTree) {
        self.filters_initialised = true;
        self.filters = filters;
        self.page = 1;
        self.clear_selection();
        self.refresh();
    }

    /// `None` clears the sort.
    pub fn set_order_by(&mut self, order_by: Option<OrderBy>) {
        self.order_by = order_by;
        self.refresh();
    }

    pub fn set_page(&mut self, page: u32) {
        self.page = page.max(1);
        self.refresh();
    }

    pub fn set_page_size(&mut self, page_size: u32) {
        self.page_size = page_size.max(1);
        self.page = 1;
        self.refresh();
    }

    pub fn set_group_by(&mut self, group_by: Vec<AttributeKey>) {
        self.group_by = group_by;
        self.page = 1;
        self.selection.expanded_row_keys.clear();
        self.selection.selected_group_row = None;
        self.drill.disarm();
        self.refresh();
    }

    /// Resolve group-by names against discovered keys; unknown names are skipped.
    pub fn set_group_by_names(&mut self, names: &[String], available: &[AttributeKey]) {
        let keys = names
            .iter()
            .filter_map(|n| {
                let found = available.iter().find(|k| &k.key == n).cloned();
                if found.is_none() {
                    warn!(key = %n, category = %self.category, "list: unknown group-by key skipped");
                }
                found
            })
            .collect();
        self.set_group_by(keys);
    }

    pub fn set_time_range(&mut self, time: TimeRange) {
        self.time = time;
        self.refresh();
    }

    fn clear_selection(&mut self) {
        self.selection = SelectionState::default();
        self.drill.disarm();
    }

    pub fn rows(&self) -> Vec<EntityRow> {
        self.primary.snapshot().records().to_vec()
    }

    pub fn grouped_rows(&self) -> Vec<GroupedRow> {
        self.primary.snapshot().records().iter().cloned().map(|r| GroupedRow::from_row(r, &self.group_by)).collect()
    }

    /// Click on row `index` of the primary list. Ungrouped: select the leaf (rows without
    /// an identifier are ignored). Grouped: toggle the group's expansion and arm the
    /// drill-down. Returns whether anything changed.
    pub fn click_row(&mut self, index: usize) -> bool {
        let snap = self.primary.snapshot();
        let Some(row) = snap.records().get(index).cloned() else {
            return false;
        };
        if self.group_by.is_empty() {
            let Some(uid) = self.category.uid_of(&row) else {
                warn!(category = %self.category, index, "list: row has no identifier; not selectable");
                return false;
            };
            debug!(category = %self.category, uid = %uid, "list: select row");
            self.selection.selected_group_row = None;
            self.selection.expanded_row_keys.clear();
            self.drill.disarm();
            self.selection.selected_row_uid = Some(uid);
            self.refresh();
            return true;
        }

        let group = GroupedRow::from_row(row, &self.group_by);
        if self.selection.expanded_row_keys.first() == Some(&group.key) {
            debug!(row = %group.label, "list: collapse group");
            self.selection.expanded_row_keys.clear();
            self.selection.selected_group_row = None;
            self.drill.disarm();
            return true;
        }
        debug!(row = %group.label, "list: expand group");
        self.selection.selected_row_uid = None;
        self.selection.expanded_row_keys = vec![group.key.clone()];
        let (payload, key) = self.drill_query(&group);
        self.selection.selected_group_row = Some(group.clone());
        self.drill.arm(group, payload, key);
        self.primary.set_query(Some(self.primary_query()));
        true
    }

    /// Select a leaf in the expanded group's nested list.
    pub fn select_nested_row(&mut self, index: usize) -> bool {
        let snap = self.drill.snapshot();
        let Some(uid) = snap.records().get(index).and_then(|r| self.category.uid_of(r)) else {
            return false;
        };
        self.selection.selected_row_uid = Some(uid);
        self.primary.set_query(Some(self.primary_query()));
        true
    }

    /// Replace the list with the selected group's members: drill-down filters become the
    /// list filters and grouping and sorting are cleared.
    pub fn view_all(&mut self) -> bool {
        let Some(row) = self.selection.selected_group_row.take() else {
            return false;
        };
        self.filters = drill_down_filters(&self.filters, &self.group_by, &row);
        self.filters_initialised = true;
        self.group_by.clear();
        self.order_by = None;
        self.page = 1;
        self.selection.expanded_row_keys.clear();
        self.drill.disarm();
        info!(category = %self.category, group = %row.label, "list: view all");
        self.refresh();
        true
    }

    /// Drop the leaf selection (drawer closed).
    pub fn close_detail(&mut self) {
        self.selection.selected_row_uid = None;
        self.refresh();
    }

    /// Entity behind the current selection, looked up in the nested list when grouped.
    pub fn selected_entity(&self) -> Option<EntityRow> {
        let uid = self.selection.selected_row_uid.as_deref()?;
        let snap = if self.group_by.is_empty() { self.primary.snapshot() } else { self.drill.snapshot() };
        snap.records().iter().find(|r| self.category.uid_of(r).as_deref() == Some(uid)).cloned()
    }

    pub fn outcome(&self) -> ListOutcome {
        let s = self.primary.snapshot();
        match s.status {
            FetchStatus::Idle | FetchStatus::Loading => ListOutcome::Loading,
            FetchStatus::Error => ListOutcome::Error(s.error.clone().unwrap_or_else(|| FALLBACK_ERROR.to_string())),
            FetchStatus::Fetching | FetchStatus::Ready => {
                if !s.records().is_empty() {
                    ListOutcome::Rows
                } else if self.filters.is_empty() {
                    ListOutcome::NoData
                } else {
                    ListOutcome::NoResultsForQuery
                }
            }
        }
    }

    /// Apply arrived responses without waiting.
    pub fn poll(&mut self) -> bool {
        let a = self.primary.poll();
        let b = self.drill.poll();
        a || b
    }

    /// Wait for the latest primary and drill-down requests.
    pub async fn settle(&mut self) {
        self.primary.settle().await;
        self.drill.settle().await;
    }
}
