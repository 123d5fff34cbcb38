//! Cache-keyed list fetcher with sequence-tagged requests.
//!
//! A fetcher owns one logical query. Changing its cache key issues a request; every
//! request carries a monotonically increasing sequence number and a response is only
//! applied when its number is the latest one issued, so a slow superseded request can
//! never overwrite newer state. Snapshots are published through an `ArcSwap` and the
//! applied sequence number through a `watch` channel.

#![forbid(unsafe_code)]

use std::collections::VecDeque;
use std::sync::Arc;

use arc_swap::ArcSwap;
use rustc_hash::FxHashMap;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use infrascope_api::{ApiResult, InfraApi, ListResponse};
use infrascope_core::payload::QueryPayload;
use infrascope_core::K8sCategory;

/// Completed responses kept per fetcher so returning to a recent key shows data at once.
const CACHE_CAP: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    /// Disabled: no payload, no data.
    Idle,
    /// First request for this key, nothing to show yet.
    Loading,
    /// Request in flight while previous data is shown.
    Fetching,
    Ready,
    Error,
}

#[derive(Debug, Clone)]
pub struct FetchSnapshot {
    pub status: FetchStatus,
    pub key: Option<String>,
    pub data: Option<Arc<ListResponse>>,
    pub error: Option<String>,
    /// Sequence number of the request this snapshot reflects (0 before any request).
    pub seq: u64,
}

impl FetchSnapshot {
    fn idle() -> Self {
        Self { status: FetchStatus::Idle, key: None, data: None, error: None, seq: 0 }
    }

    pub fn is_loading(&self) -> bool {
        self.status == FetchStatus::Loading
    }

    pub fn is_fetching(&self) -> bool {
        matches!(self.status, FetchStatus::Loading | FetchStatus::Fetching)
    }

    pub fn is_error(&self) -> bool {
        self.status == FetchStatus::Error
    }

    pub fn records(&self) -> &[infrascope_core::EntityRow] {
        self.data.as_deref().map(ListResponse::records).unwrap_or(&[])
    }

    pub fn total(&self) -> u64 {
        self.data.as_deref().map(ListResponse::total).unwrap_or(0)
    }
}

struct Completed {
    seq: u64,
    key: String,
    result: ApiResult<ListResponse>,
}

pub struct Fetcher {
    name: &'static str,
    api: Arc<dyn InfraApi>,
    category: K8sCategory,
    key: Option<String>,
    payload: Option<QueryPayload>,
    issued: u64,
    snap: Arc<ArcSwap<FetchSnapshot>>,
    seq_tx: watch::Sender<u64>,
    seq_rx: watch::Receiver<u64>,
    done_tx: mpsc::UnboundedSender<Completed>,
    done_rx: mpsc::UnboundedReceiver<Completed>,
    cache: FxHashMap<String, Arc<ListResponse>>,
    cache_order: VecDeque<String>,
}

impl Fetcher {
    pub fn new(name: &'static str, api: Arc<dyn InfraApi>, category: K8sCategory) -> Self {
        let (seq_tx, seq_rx) = watch::channel(0u64);
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        Self {
            name,
            api,
            category,
            key: None,
            payload: None,
            issued: 0,
            snap: Arc::new(ArcSwap::from_pointee(FetchSnapshot::idle())),
            seq_tx,
            seq_rx,
            done_tx,
            done_rx,
            cache: FxHashMap::default(),
            cache_order: VecDeque::new(),
        }
    }

    pub fn snapshot(&self) -> Arc<FetchSnapshot> {
        self.snap.load_full()
    }

    /// Receiver of the sequence number of each applied response.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.seq_rx.clone()
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn payload(&self) -> Option<&QueryPayload> {
        self.payload.as_ref()
    }

    pub fn is_enabled(&self) -> bool {
        self.payload.is_some()
    }

    /// Latest sequence number issued.
    pub fn issued(&self) -> u64 {
        self.issued
    }

    /// Declarative input: a new key issues a request, the same key does nothing, `None`
    /// disables the fetcher. Returns whether a request was issued.
    pub fn set_query(&mut self, query: Option<(QueryPayload, String)>) -> bool {
        match query {
            None => {
                if self.payload.is_some() || self.key.is_some() {
                    debug!(fetcher = self.name, "fetch: disabled");
                }
                self.payload = None;
                self.key = None;
                // Outstanding responses become stale.
                self.issued += 1;
                self.snap.store(Arc::new(FetchSnapshot { seq: self.issued, ..FetchSnapshot::idle() }));
                false
            }
            Some((payload, key)) => {
                if self.key.as_deref() == Some(key.as_str()) {
                    // Same cache key: keep the payload current (time may have moved) but
                    // do not refetch.
                    self.payload = Some(payload);
                    return false;
                }
                self.payload = Some(payload);
                self.key = Some(key);
                self.issue();
                true
            }
        }
    }

    /// Imperative refetch of the current query, even when the key has not changed.
    /// Returns false when the fetcher is disabled.
    pub fn refetch(&mut self) -> bool {
        if self.payload.is_none() {
            return false;
        }
        self.issue();
        true
    }

    fn issue(&mut self) {
        let (Some(payload), Some(key)) = (self.payload.clone(), self.key.clone()) else { return };
        self.issued += 1;
        let seq = self.issued;
        let prev = self.snapshot();
        let cached = self.cache.get(&key).cloned();
        let shown = cached.or_else(|| prev.data.clone());
        let status = if shown.is_some() { FetchStatus::Fetching } else { FetchStatus::Loading };
        self.snap.store(Arc::new(FetchSnapshot { status, key: Some(key.clone()), data: shown, error: None, seq }));
        metrics::counter!("fetch_requests_total", 1u64, "fetcher" => self.name);
        debug!(fetcher = self.name, seq, category = %self.category, limit = payload.limit, offset = payload.offset, "fetch: issue");

        let api = Arc::clone(&self.api);
        let tx = self.done_tx.clone();
        let category = self.category;
        tokio::spawn(async move {
            let result = api.list(category, &payload).await;
            // Receiver gone means the fetcher was dropped; nothing left to update.
            let _ = tx.send(Completed { seq, key, result });
        });
    }

    fn apply(&mut self, done: Completed) -> bool {
        if done.seq != self.issued {
            metrics::counter!("fetch_stale_discarded_total", 1u64, "fetcher" => self.name);
            debug!(fetcher = self.name, seq = done.seq, latest = self.issued, "fetch: discard superseded response");
            return false;
        }
        let snap = match done.result {
            Ok(resp) => {
                let data = Arc::new(resp);
                self.remember(done.key.clone(), Arc::clone(&data));
                FetchSnapshot { status: FetchStatus::Ready, key: Some(done.key), data: Some(data), error: None, seq: done.seq }
            }
            Err(e) => {
                metrics::counter!("fetch_errors_total", 1u64, "fetcher" => self.name);
                warn!(fetcher = self.name, seq = done.seq, error = %e, "fetch: request failed");
                FetchSnapshot {
                    status: FetchStatus::Error,
                    key: Some(done.key),
                    data: None,
                    error: Some(e.display_message()),
                    seq: done.seq,
                }
            }
        };
        self.snap.store(Arc::new(snap));
        let _ = self.seq_tx.send(done.seq);
        true
    }

    fn remember(&mut self, key: String, data: Arc<ListResponse>) {
        if self.cache.insert(key.clone(), data).is_none() {
            self.cache_order.push_back(key);
            if self.cache_order.len() > CACHE_CAP {
                if let Some(old) = self.cache_order.pop_front() {
                    self.cache.remove(&old);
                }
            }
        }
    }

    /// Apply every response that has already arrived. Returns whether the snapshot changed.
    pub fn poll(&mut self) -> bool {
        let mut changed = false;
        while let Ok(done) = self.done_rx.try_recv() {
            changed |= self.apply(done);
        }
        changed
    }

    /// Wait until the latest issued request has been applied. Returns immediately when
    /// nothing is in flight.
    pub async fn settle(&mut self) {
        self.poll();
        while self.in_flight() {
            match self.done_rx.recv().await {
                Some(done) => {
                    self.apply(done);
                }
                None => break,
            }
        }
    }

    pub fn in_flight(&self) -> bool {
        let s = self.snapshot();
        s.seq == self.issued && matches!(s.status, FetchStatus::Loading | FetchStatus::Fetching)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use infrascope_api::MockApi;
    use infrascope_core::payload::cache_key;
    use infrascope_core::FilterTree;

    fn payload(offset: u32) -> QueryPayload {
        QueryPayload { filters: FilterTree::default(), order_by: None, group_by: Vec::new(), limit: 10, offset, start: 0, end: 1 }
    }

    fn q(offset: u32) -> Option<(QueryPayload, String)> {
        let p = payload(offset);
        let k = cache_key(K8sCategory::Pods, &p, true);
        Some((p, k))
    }

    #[tokio::test]
    async fn disabled_fetcher_issues_nothing() {
        let api = Arc::new(MockApi::new());
        let mut f = Fetcher::new("test", api.clone(), K8sCategory::Pods);
        assert!(!f.set_query(None));
        f.settle().await;
        assert_eq!(f.snapshot().status, FetchStatus::Idle);
        assert!(!f.refetch());
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn same_key_does_not_refetch_but_refetch_does() {
        let api = Arc::new(MockApi::new());
        let mut f = Fetcher::new("test", api.clone(), K8sCategory::Pods);
        assert!(f.set_query(q(0)));
        f.settle().await;
        assert!(!f.set_query(q(0)));
        assert!(f.refetch());
        f.settle().await;
        assert_eq!(api.calls().len(), 2);
        assert_eq!(f.snapshot().status, FetchStatus::Ready);
    }
}
