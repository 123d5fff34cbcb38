//! Keyset (cursor) pagination over log-like results using an `id` filter.

#![forbid(unsafe_code)]

use tracing::debug;

use infrascope_api::{BuilderQuery, DataSource, LogRecord, QueryRangeRequest};
use infrascope_core::filters::{id_item, without_id};
use infrascope_core::{FilterItem, FilterOperator, FilterTree, TimeRange};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Older rows: `id < cursor`.
    Next,
    /// Newer rows: `id > cursor`.
    Prev,
}

impl Direction {
    pub fn operator(self) -> FilterOperator {
        match self {
            Self::Next => FilterOperator::Lt,
            Self::Prev => FilterOperator::Gt,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    pub id: String,
    pub direction: Direction,
}

impl Cursor {
    pub fn to_filter(&self) -> FilterItem {
        id_item(self.direction.operator(), self.id.clone())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct KeysetPager {
    page: u32,
    page_size: u32,
    filters: FilterTree,
    cursor: Option<Cursor>,
    has_reached_end: bool,
}

impl KeysetPager {
    pub fn new(page_size: u32, filters: FilterTree) -> Self {
        Self { page: 1, page_size: page_size.max(1), filters: without_id(&filters), cursor: None, has_reached_end: false }
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Current filters, including the cursor item once paging has started.
    pub fn filters(&self) -> &FilterTree {
        &self.filters
    }

    pub fn cursor(&self) -> Option<&Cursor> {
        self.cursor.as_ref()
    }

    pub fn has_reached_end(&self) -> bool {
        self.has_reached_end
    }

    pub fn can_next(&self) -> bool {
        !self.has_reached_end
    }

    pub fn can_prev(&self) -> bool {
        self.page > 1
    }

    /// Record a fetched page. A page shorter than `page_size` marks the end.
    pub fn on_results(&mut self, rows: &[LogRecord]) {
        self.has_reached_end = rows.len() < self.page_size as usize;
    }

    /// Move past the last row of `rows`. Returns the new filter tree, or `None` when
    /// there is nothing to page from.
    pub fn handle_next(&mut self, rows: &[LogRecord]) -> Option<FilterTree> {
        if self.has_reached_end {
            return None;
        }
        let id = rows.last()?.id()?.to_string();
        self.page += 1;
        self.set_cursor(Cursor { id, direction: Direction::Next });
        debug!(page = self.page, "pager: next");
        Some(self.filters.clone())
    }

    /// Move before the first row of `rows`.
    pub fn handle_prev(&mut self, rows: &[LogRecord]) -> Option<FilterTree> {
        if self.page <= 1 {
            return None;
        }
        let id = rows.first()?.id()?.to_string();
        self.page -= 1;
        self.has_reached_end = false;
        self.set_cursor(Cursor { id, direction: Direction::Prev });
        debug!(page = self.page, "pager: prev");
        Some(self.filters.clone())
    }

    /// Back to page 1 with new base filters; any cursor item in `filters` is dropped.
    pub fn reset(&mut self, filters: &FilterTree) {
        self.page = 1;
        self.has_reached_end = false;
        self.cursor = None;
        self.filters = without_id(filters);
    }

    fn set_cursor(&mut self, cursor: Cursor) {
        let mut tree = without_id(&self.filters);
        tree.items.push(cursor.to_filter());
        self.filters = tree;
        self.cursor = Some(cursor);
    }

    pub fn request(&self, data_source: DataSource, time: TimeRange) -> QueryRangeRequest {
        QueryRangeRequest::list(time, BuilderQuery::raw_list(data_source, self.filters.clone(), self.page_size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use infrascope_core::filters::{eq_item, find_id};

    fn rec(id: &str) -> LogRecord {
        let mut data = serde_json::Map::new();
        data.insert("id".into(), serde_json::json!(id));
        LogRecord { timestamp: serde_json::json!(0), data }
    }

    fn page(ids: &[&str]) -> Vec<LogRecord> {
        ids.iter().map(|i| rec(i)).collect()
    }

    #[test]
    fn next_then_prev_keeps_a_single_cursor() {
        let mut p = KeysetPager::new(3, FilterTree::new(vec![eq_item("k8s_pod_name", "api-0")]));
        let rows = page(&["c", "b", "a"]);
        p.on_results(&rows);
        let next = p.handle_next(&rows).expect("next");
        assert_eq!(p.page(), 2);
        let cur = find_id(&next).expect("cursor");
        assert_eq!(cur.op, FilterOperator::Lt);
        assert_eq!(cur.value, serde_json::json!("a"));

        let rows2 = page(&["9", "8", "7"]);
        p.on_results(&rows2);
        let prev = p.handle_prev(&rows2).expect("prev");
        assert_eq!(p.page(), 1);
        assert_eq!(prev.items.iter().filter(|i| i.key.key == "id").count(), 1);
        let cur = find_id(&prev).expect("cursor");
        assert_eq!(cur.op, FilterOperator::Gt);
        assert_eq!(cur.value, serde_json::json!("9"));
        assert_eq!(prev.items.len(), 2);
        assert_eq!(p.cursor(), Some(&Cursor { id: "9".into(), direction: Direction::Prev }));
    }

    #[test]
    fn short_page_stops_next_and_page_one_stops_prev() {
        let mut p = KeysetPager::new(10, FilterTree::new(vec![eq_item("k8s_pod_name", "api-0")]));
        let before = p.filters().clone();
        let rows = page(&["b", "a"]);
        assert!(p.handle_prev(&rows).is_none());
        assert_eq!(p.filters(), &before);
        p.on_results(&rows);
        assert!(p.has_reached_end());
        assert!(p.handle_next(&rows).is_none());
        assert_eq!(p.page(), 1);
        assert_eq!(p.filters(), &before);
        assert!(p.cursor().is_none());
    }

    #[test]
    fn stopped_next_leaves_an_existing_cursor_untouched() {
        let mut p = KeysetPager::new(2, FilterTree::new(vec![eq_item("k8s_pod_name", "api-0")]));
        let full = page(&["b", "a"]);
        p.on_results(&full);
        p.handle_next(&full).expect("next");
        let before = p.filters().clone();
        let cursor = p.cursor().cloned();

        // Empty page while more may follow: nothing to page from.
        assert!(p.handle_next(&[]).is_none());
        assert_eq!(p.filters(), &before);

        let short = page(&["9"]);
        p.on_results(&short);
        assert!(p.handle_next(&short).is_none());
        assert_eq!(p.page(), 2);
        assert_eq!(p.filters(), &before);
        assert_eq!(p.cursor().cloned(), cursor);
        assert_eq!(find_id(p.filters()).map(|i| i.value.clone()), Some(serde_json::json!("a")));
    }

    #[test]
    fn empty_rows_are_a_no_op() {
        let mut p = KeysetPager::new(2, FilterTree::default());
        assert!(p.handle_next(&[]).is_none());
        assert_eq!(p.page(), 1);
        assert!(p.filters().is_empty());
    }

    #[test]
    fn reset_drops_cursor() {
        let mut p = KeysetPager::new(1, FilterTree::default());
        let rows = page(&["x"]);
        p.on_results(&rows);
        let tree = p.handle_next(&rows).expect("next");
        p.reset(&tree);
        assert_eq!(p.page(), 1);
        assert!(find_id(p.filters()).is_none());
        assert!(p.cursor().is_none());
    }
}
