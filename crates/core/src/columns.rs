//! Built-in list columns per entity category.
//!
//! This module provides:
//! - Column specs (label, row source, width) for each category's list table
//! - The grouped variant used when the list is aggregated by one or more dimensions
//! - Rendering of a row into display cells

#![forbid(unsafe_code)]

use crate::{categories::*, AttributeKey, EntityRow, GroupedRow, K8sCategory};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ColumnKind {
    /// A value from `row.meta`.
    Meta(&'static str),
    /// A pre-formatted field of the row.
    Field(&'static str),
    /// Group values of a grouped row, joined with `/`.
    Group,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ColumnSpec {
    pub kind: ColumnKind,
    pub label: &'static str,
    pub width: usize,
    /// Column name accepted by the backend's `orderBy`, when sortable.
    pub sort_key: Option<&'static str>,
}

fn col(kind: ColumnKind, label: &'static str, width: usize) -> ColumnSpec {
    ColumnSpec { kind, label, width, sort_key: None }
}

fn sortable(kind: ColumnKind, label: &'static str, width: usize, sort_key: &'static str) -> ColumnSpec {
    ColumnSpec { kind, label, width, sort_key: Some(sort_key) }
}

/// Full column set for a category's ungrouped list.
pub fn columns_for(category: K8sCategory) -> Vec<ColumnSpec> {
    use ColumnKind::*;
    let mut cols = vec![col(Meta(category.name_key()), name_label(category), 36)];
    match category {
        K8sCategory::Pods => {
            cols.push(col(Meta(K8S_NAMESPACE_NAME), "Namespace", 20));
            cols.push(sortable(Field("podCPU"), "CPU", 10, "cpu"));
            cols.push(sortable(Field("podCPURequest"), "CPU Req", 10, "cpu_request"));
            cols.push(sortable(Field("podMemory"), "Memory", 12, "memory"));
            cols.push(sortable(Field("restartCount"), "Restarts", 9, "restarts"));
        }
        K8sCategory::Nodes => {
            cols.push(col(Meta(K8S_CLUSTER_NAME), "Cluster", 20));
            cols.push(sortable(Field("nodeCPUUsage"), "CPU", 10, "cpu"));
            cols.push(sortable(Field("nodeCPUAllocatable"), "CPU Alloc", 10, "cpu_allocatable"));
            cols.push(sortable(Field("nodeMemoryUsage"), "Memory", 12, "memory"));
        }
        K8sCategory::Namespaces => {
            cols.push(col(Meta(K8S_CLUSTER_NAME), "Cluster", 20));
            cols.push(sortable(Field("cpuUsage"), "CPU", 10, "cpu"));
            cols.push(sortable(Field("memoryUsage"), "Memory", 12, "memory"));
        }
        K8sCategory::Clusters => {
            cols.push(sortable(Field("cpuUsage"), "CPU", 10, "cpu"));
            cols.push(sortable(Field("cpuAllocatable"), "CPU Alloc", 10, "cpu_allocatable"));
            cols.push(sortable(Field("memoryUsage"), "Memory", 12, "memory"));
        }
        K8sCategory::Deployments | K8sCategory::StatefulSets | K8sCategory::DaemonSets => {
            cols.push(col(Meta(K8S_NAMESPACE_NAME), "Namespace", 20));
            cols.push(sortable(Field("availablePods"), "Available", 10, "available_pods"));
            cols.push(sortable(Field("desiredPods"), "Desired", 10, "desired_pods"));
            cols.push(sortable(Field("cpuUsage"), "CPU", 10, "cpu"));
            cols.push(sortable(Field("memoryUsage"), "Memory", 12, "memory"));
        }
        K8sCategory::Jobs => {
            cols.push(col(Meta(K8S_NAMESPACE_NAME), "Namespace", 20));
            cols.push(sortable(Field("successfulPods"), "Successful", 10, "successful_pods"));
            cols.push(sortable(Field("failedPods"), "Failed", 8, "failed_pods"));
            cols.push(sortable(Field("activePods"), "Active", 8, "active_pods"));
        }
        K8sCategory::Volumes => {
            cols.push(col(Meta(K8S_NAMESPACE_NAME), "Namespace", 20));
            cols.push(sortable(Field("volumeCapacity"), "Capacity", 12, "capacity"));
            cols.push(sortable(Field("volumeUsage"), "Used", 12, "usage"));
            cols.push(sortable(Field("volumeAvailable"), "Available", 12, "available"));
        }
    }
    cols
}

/// Columns for a grouped list: a leading group column, then the metric columns.
/// Identity columns are dropped since a group row aggregates many entities.
pub fn grouped_columns_for(category: K8sCategory, group_by: &[AttributeKey]) -> Vec<ColumnSpec> {
    if group_by.is_empty() {
        return columns_for(category);
    }
    let mut cols = vec![col(ColumnKind::Group, "Group", 36)];
    cols.extend(columns_for(category).into_iter().filter(|c| !matches!(c.kind, ColumnKind::Meta(_))));
    cols
}

fn name_label(category: K8sCategory) -> &'static str {
    match category {
        K8sCategory::Pods => "Pod",
        K8sCategory::Nodes => "Node",
        K8sCategory::Namespaces => "Namespace",
        K8sCategory::Clusters => "Cluster",
        K8sCategory::Deployments => "Deployment",
        K8sCategory::StatefulSets => "StatefulSet",
        K8sCategory::DaemonSets => "DaemonSet",
        K8sCategory::Jobs => "Job",
        K8sCategory::Volumes => "PVC",
    }
}

/// Render one row into display cells following `cols`.
pub fn render_row(cols: &[ColumnSpec], row: &EntityRow) -> Vec<String> {
    cols.iter()
        .map(|c| match c.kind {
            ColumnKind::Meta(k) => row.meta_value(k).filter(|s| !s.is_empty()).unwrap_or("-").to_string(),
            ColumnKind::Field(f) => row.display_field(f),
            ColumnKind::Group => String::new(),
        })
        .collect()
}

/// Render a grouped row; the group column shows the group values in group-by order.
pub fn render_grouped_row(cols: &[ColumnSpec], row: &GroupedRow, group_by: &[AttributeKey]) -> Vec<String> {
    let group = group_by
        .iter()
        .map(|g| row.grouped_by_meta.get(&g.key).map(String::as_str).unwrap_or("-"))
        .collect::<Vec<_>>()
        .join("/");
    let mut cells = render_row(cols, &row.row);
    for (cell, spec) in cells.iter_mut().zip(cols) {
        if spec.kind == ColumnKind::Group {
            *cell = group.clone();
        }
    }
    cells
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grouped_columns_lead_with_group_and_drop_identity() {
        let cols = grouped_columns_for(K8sCategory::Pods, &[AttributeKey::resource(K8S_NAMESPACE_NAME)]);
        assert_eq!(cols[0].kind, ColumnKind::Group);
        assert!(cols.iter().all(|c| !matches!(c.kind, ColumnKind::Meta(_))));
        assert_eq!(grouped_columns_for(K8sCategory::Pods, &[]), columns_for(K8sCategory::Pods));
    }

    #[test]
    fn render_grouped_row_shows_values_in_group_by_order() {
        let mut row = EntityRow::default();
        row.meta.insert(K8S_NAMESPACE_NAME.into(), "prod".into());
        row.meta.insert(K8S_CLUSTER_NAME.into(), "eu-1".into());
        row.fields.insert("podCPU".into(), serde_json::json!(0.5));
        let gb = vec![AttributeKey::resource(K8S_CLUSTER_NAME), AttributeKey::resource(K8S_NAMESPACE_NAME)];
        let grouped = GroupedRow::from_row(row, &gb);
        let cols = grouped_columns_for(K8sCategory::Pods, &gb);
        let cells = render_grouped_row(&cols, &grouped, &gb);
        assert_eq!(cells[0], "eu-1/prod");
        assert_eq!(cells[1], "0.5");
    }
}
