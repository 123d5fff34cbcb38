//! Kubernetes entity categories and their per-category constants.
//!
//! Each category knows its list endpoint, how a row exposes its stable identity, which
//! URL parameter carries the selection, and the identity dimensions that seed the
//! detail drawer's logs/traces/events filters.

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

use crate::{CoreError, EntityRow};

// Dimension keys (underscore form used by the list and logs/traces queries).
pub const K8S_POD_NAME: &str = "k8s_pod_name";
pub const K8S_NODE_NAME: &str = "k8s_node_name";
pub const K8S_NAMESPACE_NAME: &str = "k8s_namespace_name";
pub const K8S_CLUSTER_NAME: &str = "k8s_cluster_name";
pub const K8S_DEPLOYMENT_NAME: &str = "k8s_deployment_name";
pub const K8S_STATEFULSET_NAME: &str = "k8s_statefulset_name";
pub const K8S_DAEMONSET_NAME: &str = "k8s_daemonset_name";
pub const K8S_JOB_NAME: &str = "k8s_job_name";
pub const K8S_PVC_NAME: &str = "k8s_persistentvolumeclaim_name";

// Event object dimensions.
pub const K8S_OBJECT_KIND: &str = "k8s.object.kind";
pub const K8S_OBJECT_NAME: &str = "k8s.object.name";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum K8sCategory {
    Pods,
    Nodes,
    Namespaces,
    Clusters,
    Deployments,
    StatefulSets,
    DaemonSets,
    Jobs,
    Volumes,
}

/// Where a row's stable identifier lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Identity {
    Field(&'static str),
    Meta(&'static str),
}

impl K8sCategory {
    pub const ALL: [K8sCategory; 9] = [
        Self::Pods,
        Self::Nodes,
        Self::Namespaces,
        Self::Clusters,
        Self::Deployments,
        Self::StatefulSets,
        Self::DaemonSets,
        Self::Jobs,
        Self::Volumes,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pods => "pods",
            Self::Nodes => "nodes",
            Self::Namespaces => "namespaces",
            Self::Clusters => "clusters",
            Self::Deployments => "deployments",
            Self::StatefulSets => "statefulsets",
            Self::DaemonSets => "daemonsets",
            Self::Jobs => "jobs",
            Self::Volumes => "volumes",
        }
    }

    /// Path of the entity list endpoint, relative to the backend base URL.
    pub fn list_path(&self) -> &'static str {
        match self {
            Self::Pods => "/api/v1/pods/list",
            Self::Nodes => "/api/v1/nodes/list",
            Self::Namespaces => "/api/v1/namespaces/list",
            Self::Clusters => "/api/v1/clusters/list",
            Self::Deployments => "/api/v1/deployments/list",
            Self::StatefulSets => "/api/v1/statefulsets/list",
            Self::DaemonSets => "/api/v1/daemonsets/list",
            Self::Jobs => "/api/v1/jobs/list",
            Self::Volumes => "/api/v1/pvcs/list",
        }
    }

    /// Cache key prefix for list queries of this category.
    pub fn query_key(&self) -> &'static str {
        match self {
            Self::Pods => "podList",
            Self::Nodes => "nodeList",
            Self::Namespaces => "namespaceList",
            Self::Clusters => "clusterList",
            Self::Deployments => "deploymentList",
            Self::StatefulSets => "statefulSetList",
            Self::DaemonSets => "daemonSetList",
            Self::Jobs => "jobList",
            Self::Volumes => "volumeList",
        }
    }

    pub fn identity(&self) -> Identity {
        match self {
            Self::Pods => Identity::Field("podUID"),
            Self::Nodes => Identity::Field("nodeUID"),
            Self::Namespaces => Identity::Field("namespaceName"),
            Self::Clusters => Identity::Meta(K8S_CLUSTER_NAME),
            Self::Deployments => Identity::Field("deploymentName"),
            Self::StatefulSets => Identity::Field("statefulSetName"),
            Self::DaemonSets => Identity::Field("daemonSetName"),
            Self::Jobs => Identity::Field("jobName"),
            Self::Volumes => Identity::Field("persistentVolumeClaimName"),
        }
    }

    /// Stable identifier of a row, if the backend supplied one.
    pub fn uid_of(&self, row: &EntityRow) -> Option<String> {
        let v = match self.identity() {
            Identity::Field(f) => row.field_str(f),
            Identity::Meta(m) => row.meta_value(m),
        };
        v.filter(|s| !s.is_empty()).map(str::to_string)
    }

    /// URL parameter holding the selected row's identifier.
    pub fn selection_param(&self) -> &'static str {
        match self {
            Self::Pods => "podUID",
            Self::Nodes => "nodeUID",
            Self::Namespaces => "namespaceUID",
            Self::Clusters => "clusterName",
            Self::Deployments => "deploymentUID",
            Self::StatefulSets => "statefulsetUID",
            Self::DaemonSets => "daemonSetUID",
            Self::Jobs => "jobUID",
            Self::Volumes => "volumeUID",
        }
    }

    /// Dimension holding the entity's own name.
    pub fn name_key(&self) -> &'static str {
        match self {
            Self::Pods => K8S_POD_NAME,
            Self::Nodes => K8S_NODE_NAME,
            Self::Namespaces => K8S_NAMESPACE_NAME,
            Self::Clusters => K8S_CLUSTER_NAME,
            Self::Deployments => K8S_DEPLOYMENT_NAME,
            Self::StatefulSets => K8S_STATEFULSET_NAME,
            Self::DaemonSets => K8S_DAEMONSET_NAME,
            Self::Jobs => K8S_JOB_NAME,
            Self::Volumes => K8S_PVC_NAME,
        }
    }

    /// Identity dimensions seeding the drawer's logs/traces filters. These are never
    /// removed by user edits.
    pub fn primary_keys(&self) -> &'static [&'static str] {
        match self {
            Self::Pods => &[K8S_POD_NAME, K8S_CLUSTER_NAME, K8S_NAMESPACE_NAME],
            Self::Nodes => &[K8S_NODE_NAME, K8S_CLUSTER_NAME],
            Self::Namespaces => &[K8S_NAMESPACE_NAME, K8S_CLUSTER_NAME],
            Self::Clusters => &[K8S_CLUSTER_NAME],
            Self::Deployments => &[K8S_DEPLOYMENT_NAME, K8S_NAMESPACE_NAME],
            Self::StatefulSets => &[K8S_STATEFULSET_NAME, K8S_NAMESPACE_NAME],
            Self::DaemonSets => &[K8S_DAEMONSET_NAME, K8S_NAMESPACE_NAME],
            Self::Jobs => &[K8S_JOB_NAME, K8S_NAMESPACE_NAME],
            Self::Volumes => &[K8S_PVC_NAME, K8S_NAMESPACE_NAME],
        }
    }

    /// `k8s.object.kind` value of this entity's Kubernetes events.
    pub fn event_kind(&self) -> &'static str {
        match self {
            Self::Pods => "Pod",
            Self::Nodes => "Node",
            Self::Namespaces => "Namespace",
            Self::Clusters => "Cluster",
            Self::Deployments => "Deployment",
            Self::StatefulSets => "StatefulSet",
            Self::DaemonSets => "DaemonSet",
            Self::Jobs => "Job",
            Self::Volumes => "PersistentVolumeClaim",
        }
    }

    /// Metric used to discover group-by keys for this category.
    pub fn aggregate_attribute(&self) -> &'static str {
        match self {
            Self::Pods
            | Self::Namespaces
            | Self::Deployments
            | Self::StatefulSets
            | Self::DaemonSets => "k8s.pod.cpu.usage",
            Self::Nodes | Self::Clusters => "k8s.node.cpu.usage",
            Self::Jobs => "k8s.job.desired_successful_pods",
            Self::Volumes => "k8s.volume.capacity",
        }
    }
}

impl std::fmt::Display for K8sCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for K8sCategory {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        let wanted = lower.trim_end_matches('s');
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().trim_end_matches('s') == wanted)
            .ok_or_else(|| CoreError::UnknownCategory(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_singular_and_plural() {
        assert_eq!("pods".parse::<K8sCategory>().unwrap(), K8sCategory::Pods);
        assert_eq!("Pod".parse::<K8sCategory>().unwrap(), K8sCategory::Pods);
        assert_eq!("statefulset".parse::<K8sCategory>().unwrap(), K8sCategory::StatefulSets);
        assert!("services".parse::<K8sCategory>().is_err());
    }

    #[test]
    fn uid_resolution_prefers_backend_identity() {
        let mut row = EntityRow::default();
        row.fields.insert("podUID".into(), serde_json::json!("uid-1"));
        assert_eq!(K8sCategory::Pods.uid_of(&row).as_deref(), Some("uid-1"));

        let mut cluster = EntityRow::default();
        cluster.meta.insert(K8S_CLUSTER_NAME.into(), "prod-eu".into());
        assert_eq!(K8sCategory::Clusters.uid_of(&cluster).as_deref(), Some("prod-eu"));

        // No identifier means the row cannot be selected.
        assert_eq!(K8sCategory::Nodes.uid_of(&EntityRow::default()), None);
    }
}
