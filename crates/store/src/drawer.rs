//! Detail drawer: per sub-view filter trees seeded from the selected entity, kept in
//! sync with the shareable view state.
//!
//! Identity filters ("primary" items) come from the entity and survive every user
//! edit; everything else is taken from the edit. The logs keyset cursor is carried
//! through as the last item.

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use infrascope_api::query_range::CompositeQuery;
use infrascope_api::{
    join_path, ApiResult, BuilderQuery, DataSource, InfraApi, LogRecord, QueryRangeRequest, QueryRangeResponse, Series,
};
use infrascope_core::categories::{K8S_CLUSTER_NAME, K8S_OBJECT_KIND, K8S_OBJECT_NAME};
use infrascope_core::filters::{dedup, eq_item, find_id, without_id};
use infrascope_core::{AttributeKey, CoreError, EntityRow, FilterTree, K8sCategory, TimeRange, DEFAULT_PAGE_SIZE, ID_KEY};

use crate::view_state::ViewState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DrawerView {
    #[default]
    Metrics,
    Logs,
    Traces,
    Events,
}

impl DrawerView {
    pub const ALL: [DrawerView; 4] = [DrawerView::Metrics, DrawerView::Logs, DrawerView::Traces, DrawerView::Events];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Metrics => "metrics",
            Self::Logs => "logs",
            Self::Traces => "traces",
            Self::Events => "events",
        }
    }
}

impl std::fmt::Display for DrawerView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DrawerView {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|v| v.as_str() == lower)
            .ok_or_else(|| CoreError::Validation(format!("unknown drawer view: {}", s)))
    }
}

const EVENT_KEYS: [&str; 2] = [K8S_OBJECT_KIND, K8S_OBJECT_NAME];

/// Logs/traces explorer hand-off.
#[derive(Debug, Clone, PartialEq)]
pub struct ExplorerQuery {
    pub data_source: DataSource,
    pub composite_query: CompositeQuery,
    pub start_ms: i64,
    pub end_ms: i64,
}

impl ExplorerQuery {
    pub fn path(&self) -> &'static str {
        match self.data_source {
            DataSource::Traces => "/traces-explorer",
            _ => "/logs/logs-explorer",
        }
    }

    /// Explorer link under `base`; a path prefix on `base` is kept.
    pub fn url(&self, base: &url::Url) -> Result<url::Url, url::ParseError> {
        let mut u = join_path(base, self.path())?;
        let composite = serde_json::to_string(&self.composite_query).unwrap_or_default();
        u.query_pairs_mut()
            .append_pair("compositeQuery", &composite)
            .append_pair("startTime", &self.start_ms.to_string())
            .append_pair("endTime", &self.end_ms.to_string());
        Ok(u)
    }
}

/// Rows of each sub-view. Failures stay local to their sub-view.
#[derive(Debug)]
pub struct DrawerData {
    pub metrics: ApiResult<Vec<Series>>,
    pub logs: ApiResult<Vec<LogRecord>>,
    pub traces: ApiResult<Vec<LogRecord>>,
    pub events: ApiResult<Vec<LogRecord>>,
}

#[derive(Debug, Clone)]
pub struct DetailDrawer {
    category: K8sCategory,
    entity: EntityRow,
    uid: String,
    view: DrawerView,
    logs: FilterTree,
    traces: FilterTree,
    events: FilterTree,
    global_time: TimeRange,
    time: TimeRange,
}

impl DetailDrawer {
    /// Open the drawer for `entity`, restoring sub-view filters persisted in `state`.
    /// Returns `None` when the entity has no stable identifier.
    pub fn open(category: K8sCategory, entity: EntityRow, global_time: TimeRange, state: &mut ViewState) -> Option<Self> {
        let uid = category.uid_of(&entity)?;
        let mut d = Self {
            category,
            uid: uid.clone(),
            view: state.view.unwrap_or_default(),
            logs: FilterTree::default(),
            traces: FilterTree::default(),
            events: FilterTree::default(),
            entity,
            global_time,
            time: global_time,
        };
        let seed = d.primary_filters();
        let events = state.events_filters.clone().unwrap_or_else(|| d.event_filters());
        d.logs = state.log_filters.clone().unwrap_or_else(|| seed.clone());
        d.traces = state.traces_filters.clone().unwrap_or(seed);
        d.events = events;
        state.category = Some(category);
        state.selected = Some(uid);
        info!(category = %category, uid = %d.uid, view = %d.view, "drawer: open");
        Some(d)
    }

    pub fn category(&self) -> K8sCategory {
        self.category
    }

    pub fn entity(&self) -> &EntityRow {
        &self.entity
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn view(&self) -> DrawerView {
        self.view
    }

    pub fn logs_filters(&self) -> &FilterTree {
        &self.logs
    }

    pub fn traces_filters(&self) -> &FilterTree {
        &self.traces
    }

    pub fn events_filters(&self) -> &FilterTree {
        &self.events
    }

    pub fn time(&self) -> TimeRange {
        self.time
    }

    /// The drawer's own time range; the list keeps the global one.
    pub fn set_time_range(&mut self, time: TimeRange) {
        self.time = time;
    }

    /// Identity equality filters of the entity, one per primary key. A dimension the
    /// row lacks filters on the empty string.
    pub fn primary_filters(&self) -> FilterTree {
        FilterTree::new(
            self.category
                .primary_keys()
                .iter()
                .map(|k| eq_item(k, self.entity.meta_value(k).unwrap_or_default()))
                .collect(),
        )
    }

    pub fn event_filters(&self) -> FilterTree {
        let name = self.entity.meta_value(self.category.name_key()).unwrap_or_default();
        FilterTree::new(vec![eq_item(K8S_OBJECT_KIND, self.category.event_kind()), eq_item(K8S_OBJECT_NAME, name)])
    }

    pub fn change_logs_filters(&mut self, incoming: &FilterTree, state: &mut ViewState) -> &FilterTree {
        let keys = self.category.primary_keys();
        let mut items: Vec<_> = self.logs.items.iter().filter(|i| keys.contains(&i.key.key.as_str())).cloned().collect();
        items.extend(
            incoming
                .items
                .iter()
                .filter(|i| i.key.key != ID_KEY && i.key.key != K8S_CLUSTER_NAME)
                .cloned(),
        );
        if let Some(cursor) = find_id(incoming) {
            items.push(cursor.clone());
        }
        self.logs = FilterTree::new(dedup(items));
        state.log_filters = Some(self.logs.clone());
        state.view = Some(DrawerView::Logs);
        debug!(items = self.logs.items.len(), "drawer: logs filters changed");
        &self.logs
    }

    pub fn change_traces_filters(&mut self, incoming: &FilterTree, state: &mut ViewState) -> &FilterTree {
        let keys = self.category.primary_keys();
        let name_key = self.category.name_key();
        let mut items: Vec<_> = self.traces.items.iter().filter(|i| keys.contains(&i.key.key.as_str())).cloned().collect();
        items.extend(incoming.items.iter().filter(|i| i.key.key != name_key).cloned());
        self.traces = FilterTree::new(dedup(items));
        state.traces_filters = Some(self.traces.clone());
        state.view = Some(DrawerView::Traces);
        debug!(items = self.traces.items.len(), "drawer: traces filters changed");
        &self.traces
    }

    pub fn change_events_filters(&mut self, incoming: &FilterTree, state: &mut ViewState) -> &FilterTree {
        let mut items: Vec<_> =
            self.events.items.iter().filter(|i| EVENT_KEYS.contains(&i.key.key.as_str())).cloned().collect();
        items.extend(incoming.items.iter().filter(|i| !EVENT_KEYS.contains(&i.key.key.as_str())).cloned());
        self.events = FilterTree::new(dedup(items));
        state.events_filters = Some(self.events.clone());
        state.view = Some(DrawerView::Events);
        debug!(items = self.events.items.len(), "drawer: events filters changed");
        &self.events
    }

    /// Switch tabs. Persisted sub-view filters are blanked, so every tab starts again
    /// from its seed filters.
    pub fn switch_view(&mut self, view: DrawerView, state: &mut ViewState) {
        self.view = view;
        self.logs = self.primary_filters();
        self.traces = self.primary_filters();
        self.events = self.event_filters();
        state.view = Some(view);
        state.blank_drawer_filters();
        debug!(view = %view, "drawer: switch view");
    }

    /// Remove the drawer's parameters from `state` and go back to the metrics tab with
    /// the global time range.
    pub fn close(&mut self, state: &mut ViewState) {
        state.selected = None;
        state.view = None;
        state.blank_drawer_filters();
        self.view = DrawerView::Metrics;
        self.time = self.global_time;
        info!(category = %self.category, uid = %self.uid, "drawer: close");
    }

    pub fn explorer_query(&self) -> Option<ExplorerQuery> {
        let (data_source, filters) = match self.view {
            DrawerView::Logs => (DataSource::Logs, without_id(&self.logs)),
            DrawerView::Traces => (DataSource::Traces, self.traces.clone()),
            _ => return None,
        };
        let req = QueryRangeRequest::list(self.time, BuilderQuery::raw_list(data_source, filters, DEFAULT_PAGE_SIZE));
        Some(ExplorerQuery {
            data_source,
            composite_query: req.composite_query,
            start_ms: req.start,
            end_ms: req.end,
        })
    }

    pub fn logs_request(&self, page_size: u32) -> QueryRangeRequest {
        QueryRangeRequest::list(self.time, BuilderQuery::raw_list(DataSource::Logs, self.logs.clone(), page_size))
    }

    pub fn traces_request(&self, page_size: u32) -> QueryRangeRequest {
        QueryRangeRequest::list(self.time, BuilderQuery::raw_list(DataSource::Traces, self.traces.clone(), page_size))
    }

    /// Kubernetes events are stored as logs.
    pub fn events_request(&self, page_size: u32) -> QueryRangeRequest {
        QueryRangeRequest::list(self.time, BuilderQuery::raw_list(DataSource::Logs, self.events.clone(), page_size))
    }

    /// Time series of the category's headline metric for this entity.
    pub fn metrics_request(&self) -> QueryRangeRequest {
        let mut q = BuilderQuery::raw_list(DataSource::Metrics, self.primary_filters(), 0);
        q.aggregate_operator = "avg".into();
        q.aggregate_attribute = Some(AttributeKey {
            key: self.category.aggregate_attribute().to_string(),
            data_type: "float64".into(),
            r#type: "Gauge".into(),
        });
        q.order_by.clear();
        let mut req = QueryRangeRequest::list(self.time, q);
        req.composite_query.panel_type = "graph".into();
        req
    }

    /// Fetch all four sub-views concurrently.
    pub async fn load(&self, api: &dyn InfraApi, page_size: u32) -> DrawerData {
        let (metrics, logs, traces, events) = (
            self.metrics_request(),
            self.logs_request(page_size),
            self.traces_request(page_size),
            self.events_request(page_size),
        );
        let (metrics, logs, traces, events) = futures::join!(
            api.query_range(&metrics),
            api.query_range(&logs),
            api.query_range(&traces),
            api.query_range(&events),
        );
        let rows = |r: ApiResult<QueryRangeResponse>| r.map(|resp| resp.list().to_vec());
        DrawerData {
            metrics: metrics.map(|resp| resp.series().to_vec()),
            logs: rows(logs),
            traces: rows(traces),
            events: rows(events),
        }
    }
}
