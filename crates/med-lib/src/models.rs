//! Core data models for collected Kubernetes resources

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::StatusError;
use crate::status::{DeploymentStatus, PodStatus};

/// Resource kind for pods
pub const KIND_POD: &str = "Pod";

/// Resource kind for deployments
pub const KIND_DEPLOYMENT: &str = "Deployment";

/// Identity of a Kubernetes resource
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRef {
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl ResourceRef {
    pub fn new(kind: impl Into<String>, name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            namespace: namespace.into(),
            labels: BTreeMap::new(),
        }
    }

    /// Shorthand for a namespaced pod reference
    pub fn pod(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self::new(KIND_POD, name, namespace)
    }

    /// Shorthand for a namespaced deployment reference
    pub fn deployment(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self::new(KIND_DEPLOYMENT, name, namespace)
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// True when kind, name and namespace all match (labels are ignored)
    pub fn same_identity(&self, other: &ResourceRef) -> bool {
        self.kind == other.kind && self.name == other.name && self.namespace == other.namespace
    }
}

impl std::fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

/// Point-in-time collected state of one resource
///
/// `status` is the flat dotted-key encoding produced by collectors
/// (`phase`, `container.0.state`, `condition.1.reason`, ...). Use
/// [`ResourceSnapshot::pod_status`] or [`ResourceSnapshot::deployment_status`]
/// for the typed view instead of reading indexed keys directly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    pub resource: ResourceRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub logs: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub status: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related: Vec<ResourceRef>,
}

impl ResourceSnapshot {
    pub fn new(resource: ResourceRef) -> Self {
        Self {
            resource,
            ..Default::default()
        }
    }

    pub fn with_status(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.status.insert(key.into(), value.into());
        self
    }

    pub fn with_event(mut self, event: impl Into<String>) -> Self {
        self.events.push(event.into());
        self
    }

    pub fn with_logs(mut self, container: &str, logs: &str) -> Self {
        self.logs.push(format_container_logs(container, logs));
        self
    }

    pub fn is_kind(&self, kind: &str) -> bool {
        self.resource.kind == kind
    }

    /// Typed view of a pod's status map
    pub fn pod_status(&self) -> PodStatus {
        PodStatus::from_status_map(&self.status)
    }

    /// Typed view of a deployment's status map
    pub fn deployment_status(&self) -> Result<DeploymentStatus, StatusError> {
        DeploymentStatus::from_status_map(&self.status)
    }
}

/// Prefix a container's log blob with its name header
pub fn format_container_logs(container: &str, logs: &str) -> String {
    format!("=== Logs for container: {} ===\n{}", container, logs)
}
