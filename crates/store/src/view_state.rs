//! Shareable view state, encoded as URL query parameters.
//!
//! Filter, group-by and order-by parameters carry JSON. `decode` is lenient: a
//! malformed parameter is logged and treated as absent so a hand-edited link still
//! opens with defaults. `decode_strict` reports the first malformed parameter instead.

#![forbid(unsafe_code)]

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;
use url::form_urlencoded;

use infrascope_core::{AttributeKey, CoreError, CoreResult, FilterTree, K8sCategory, OrderBy};

use crate::drawer::DrawerView;

pub const CATEGORY: &str = "category";
pub const VIEW: &str = "view";
pub const FILTERS: &str = "filters";
pub const GROUP_BY: &str = "groupBy";
pub const ORDER_BY: &str = "orderBy";
pub const CURRENT_PAGE: &str = "currentPage";
pub const LOG_FILTERS: &str = "logFilters";
pub const TRACES_FILTERS: &str = "tracesFilters";
pub const EVENTS_FILTERS: &str = "eventsFilters";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewState {
    pub category: Option<K8sCategory>,
    pub view: Option<DrawerView>,
    /// Selected entity identifier, stored under the category's selection parameter.
    pub selected: Option<String>,
    pub filters: Option<FilterTree>,
    pub group_by: Option<Vec<AttributeKey>>,
    pub order_by: Option<OrderBy>,
    pub current_page: Option<u32>,
    pub log_filters: Option<FilterTree>,
    pub traces_filters: Option<FilterTree>,
    pub events_filters: Option<FilterTree>,
    /// Parameters this codec does not own, passed through unchanged.
    pub extra: Vec<(String, String)>,
}

impl ViewState {
    pub fn category_or_default(&self) -> K8sCategory {
        self.category.unwrap_or(K8sCategory::Pods)
    }

    pub fn is_drawer_open(&self) -> bool {
        self.selected.is_some()
    }

    /// Blank the three drawer filter parameters (they encode as `null`).
    pub fn blank_drawer_filters(&mut self) {
        self.log_filters = None;
        self.traces_filters = None;
        self.events_filters = None;
    }

    pub fn encode(&self) -> String {
        let mut out = form_urlencoded::Serializer::new(String::new());
        if let Some(c) = self.category {
            out.append_pair(CATEGORY, c.as_str());
        }
        if let Some(v) = self.view {
            out.append_pair(VIEW, v.as_str());
        }
        if let Some(uid) = &self.selected {
            out.append_pair(self.category_or_default().selection_param(), uid);
        }
        append_json(&mut out, FILTERS, self.filters.as_ref());
        append_json(&mut out, GROUP_BY, self.group_by.as_ref());
        append_json(&mut out, ORDER_BY, self.order_by.as_ref());
        if let Some(p) = self.current_page {
            out.append_pair(CURRENT_PAGE, &p.to_string());
        }
        // With a drawer view active the sub-view params are always present, blank or not.
        for (name, tree) in [
            (LOG_FILTERS, &self.log_filters),
            (TRACES_FILTERS, &self.traces_filters),
            (EVENTS_FILTERS, &self.events_filters),
        ] {
            match tree {
                Some(t) => append_json(&mut out, name, Some(t)),
                None if self.view.is_some() => {
                    out.append_pair(name, "null");
                }
                None => {}
            }
        }
        for (k, v) in &self.extra {
            out.append_pair(k, v);
        }
        out.finish()
    }

    /// Lenient decode: malformed parameters are dropped with a warning.
    pub fn decode(query: &str) -> Self {
        Self::decode_with(query, |param, raw, err| {
            warn!(param, value = %raw, error = %err, "view state: ignoring malformed parameter");
            Ok(())
        })
        .unwrap_or_default()
    }

    pub fn decode_strict(query: &str) -> CoreResult<Self> {
        Self::decode_with(query, |_, _, err| Err(err))
    }

    fn decode_with(query: &str, mut on_error: impl FnMut(&str, &str, CoreError) -> CoreResult<()>) -> CoreResult<Self> {
        let query = query.strip_prefix('?').unwrap_or(query);
        let mut state = ViewState::default();
        let mut selections: Vec<(String, String)> = Vec::new();
        for (k, v) in form_urlencoded::parse(query.as_bytes()) {
            let (k, v) = (k.into_owned(), v.into_owned());
            match k.as_str() {
                CATEGORY => match v.parse::<K8sCategory>() {
                    Ok(c) => state.category = Some(c),
                    Err(e) => on_error(CATEGORY, &v, e)?,
                },
                VIEW => match v.parse::<DrawerView>() {
                    Ok(view) => state.view = Some(view),
                    Err(e) => on_error(VIEW, &v, e)?,
                },
                FILTERS => state.filters = parse_json(FILTERS, &v, &mut on_error)?,
                GROUP_BY => state.group_by = parse_json(GROUP_BY, &v, &mut on_error)?,
                ORDER_BY => state.order_by = parse_json(ORDER_BY, &v, &mut on_error)?,
                CURRENT_PAGE => match v.parse::<u32>() {
                    Ok(p) if p >= 1 => state.current_page = Some(p),
                    _ => on_error(CURRENT_PAGE, &v, CoreError::Validation(format!("invalid page: {}", v)))?,
                },
                LOG_FILTERS => state.log_filters = parse_json(LOG_FILTERS, &v, &mut on_error)?,
                TRACES_FILTERS => state.traces_filters = parse_json(TRACES_FILTERS, &v, &mut on_error)?,
                EVENTS_FILTERS => state.events_filters = parse_json(EVENTS_FILTERS, &v, &mut on_error)?,
                other if K8sCategory::ALL.iter().any(|c| c.selection_param() == other) => selections.push((k.clone(), v)),
                _ => state.extra.push((k.clone(), v)),
            }
        }
        // Only the active category's selection parameter selects anything.
        let param = state.category_or_default().selection_param();
        for (k, v) in selections {
            if k == param && !v.is_empty() {
                state.selected = Some(v);
            } else {
                state.extra.push((k, v));
            }
        }
        Ok(state)
    }
}

fn append_json<T: Serialize>(out: &mut form_urlencoded::Serializer<'_, String>, name: &str, value: Option<&T>) {
    let Some(v) = value else { return };
    match serde_json::to_string(v) {
        Ok(s) => {
            out.append_pair(name, &s);
        }
        Err(e) => warn!(param = name, error = %e, "view state: failed to encode parameter"),
    }
}

fn parse_json<T: DeserializeOwned>(
    param: &str,
    raw: &str,
    on_error: &mut impl FnMut(&str, &str, CoreError) -> CoreResult<()>,
) -> CoreResult<Option<T>> {
    if raw.is_empty() || raw == "null" {
        return Ok(None);
    }
    match serde_json::from_str(raw) {
        Ok(v) => Ok(Some(v)),
        Err(source) => {
            on_error(param, raw, CoreError::InvalidJson { param: param.to_string(), source })?;
            Ok(None)
        }
    }
}
