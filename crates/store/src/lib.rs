//! Infrascope store: the stateful side of the list pages.
//!
//! `ListView` owns the list inputs and two fetchers (primary list and group
//! drill-down); `DetailDrawer` owns the selected entity's sub-view filters; `KeysetPager`
//! pages logs and events; `ViewState` is the shareable URL form of all of it.

#![forbid(unsafe_code)]

pub mod drawer;
pub mod drilldown;
pub mod fetcher;
pub mod list;
pub mod pager;
pub mod view_state;

pub use drawer::{DetailDrawer, DrawerData, DrawerView, ExplorerQuery};
pub use drilldown::{DrillDown, DrillDownState};
pub use fetcher::{FetchSnapshot, FetchStatus, Fetcher};
pub use list::{ListOutcome, ListView, SelectionState};
pub use pager::{Cursor, Direction, KeysetPager};
pub use view_state::ViewState;
