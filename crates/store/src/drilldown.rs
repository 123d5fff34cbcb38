//! Nested list under an expanded group row.

#![forbid(unsafe_code)]

use std::sync::Arc;

use tracing::debug;

use infrascope_api::InfraApi;
use infrascope_core::payload::QueryPayload;
use infrascope_core::{FilterTree, GroupedRow, K8sCategory, DRILL_DOWN_PAGE_SIZE};

use crate::fetcher::{FetchSnapshot, FetchStatus, Fetcher};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrillDownState {
    /// No group selected; the fetcher is disabled.
    Idle,
    /// A group row was selected and its request is in flight.
    Armed,
    /// The latest request for the selected group completed (with rows or an error).
    Loaded,
}

pub struct DrillDown {
    state: DrillDownState,
    row: Option<GroupedRow>,
    fetcher: Fetcher,
}

impl DrillDown {
    pub fn new(api: Arc<dyn InfraApi>, category: K8sCategory) -> Self {
        Self { state: DrillDownState::Idle, row: None, fetcher: Fetcher::new("drill_down", api, category) }
    }

    pub fn state(&self) -> DrillDownState {
        self.state
    }

    pub fn row(&self) -> Option<&GroupedRow> {
        self.row.as_ref()
    }

    pub fn snapshot(&self) -> Arc<FetchSnapshot> {
        self.fetcher.snapshot()
    }

    /// Filters of the nested query, once armed.
    pub fn filters(&self) -> Option<&FilterTree> {
        self.fetcher.payload().map(|p| &p.filters)
    }

    /// Select `row` and fetch its members. Always issues a request, even when the key
    /// matches the previous selection.
    pub fn arm(&mut self, row: GroupedRow, payload: QueryPayload, key: String) {
        debug!(row = %row.label, "drill-down: arm");
        self.row = Some(row);
        self.state = DrillDownState::Armed;
        if !self.fetcher.set_query(Some((payload, key))) {
            self.fetcher.refetch();
        }
    }

    /// Inputs changed (time range, parent filters) while a group is selected.
    pub fn update(&mut self, payload: QueryPayload, key: String) {
        if self.state == DrillDownState::Idle {
            return;
        }
        if self.fetcher.set_query(Some((payload, key))) {
            self.state = DrillDownState::Armed;
        }
    }

    pub fn disarm(&mut self) {
        if self.state != DrillDownState::Idle {
            debug!("drill-down: disarm");
        }
        self.state = DrillDownState::Idle;
        self.row = None;
        self.fetcher.set_query(None);
    }

    /// "View All" is offered when the group holds more rows than the nested table shows.
    pub fn show_view_all(&self) -> bool {
        self.state == DrillDownState::Loaded && self.snapshot().total() > u64::from(DRILL_DOWN_PAGE_SIZE)
    }

    pub fn poll(&mut self) -> bool {
        let changed = self.fetcher.poll();
        self.advance();
        changed
    }

    pub async fn settle(&mut self) {
        self.fetcher.settle().await;
        self.advance();
    }

    fn advance(&mut self) {
        if self.state != DrillDownState::Armed {
            return;
        }
        let s = self.fetcher.snapshot();
        if s.seq == self.fetcher.issued() && matches!(s.status, FetchStatus::Ready | FetchStatus::Error) {
            self.state = DrillDownState::Loaded;
        }
    }
}
