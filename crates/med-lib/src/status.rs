//! Typed views over the flat status map
//!
//! Collectors flatten nested Kubernetes status structures into dotted keys
//! indexed by position (`container.0.state`, `condition.2.type`). This module
//! translates that encoding into ordered per-container and per-condition
//! records so rule engines never split key strings themselves.
//!
//! Indices are scanned contiguously from zero:
//! - a container index ends the scan when no `container.<i>.*` key exists
//! - a condition index ends the scan when `condition.<i>.type` is missing

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::StatusError;

const CONTAINER_PREFIX: &str = "container";
const CONDITION_PREFIX: &str = "condition";

/// Lifecycle state of a container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
    Waiting,
    Running,
    Terminated,
    #[serde(untagged)]
    Other(String),
}

impl ContainerState {
    pub fn parse(value: &str) -> Self {
        match value {
            "waiting" => ContainerState::Waiting,
            "running" => ContainerState::Running,
            "terminated" => ContainerState::Terminated,
            other => ContainerState::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ContainerState::Waiting => "waiting",
            ContainerState::Running => "running",
            ContainerState::Terminated => "terminated",
            ContainerState::Other(s) => s,
        }
    }
}

/// Status of one container within a pod
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerStatus {
    pub name: Option<String>,
    pub state: Option<ContainerState>,
    pub reason: Option<String>,
    pub message: Option<String>,
    pub ready: Option<bool>,
    pub restart_count: Option<u32>,
    pub exit_code: Option<i32>,
    pub started_at: Option<String>,
}

impl ContainerStatus {
    pub fn is_waiting(&self) -> bool {
        self.state == Some(ContainerState::Waiting)
    }
}

/// A pod or deployment condition
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub condition_type: String,
    pub status: Option<String>,
    pub reason: Option<String>,
    pub message: Option<String>,
}

impl Condition {
    pub fn new(condition_type: impl Into<String>) -> Self {
        Self {
            condition_type: condition_type.into(),
            ..Default::default()
        }
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// True when the condition has the given type and status `False`
    pub fn is_false(&self, condition_type: &str) -> bool {
        self.condition_type == condition_type && self.status.as_deref() == Some("False")
    }
}

/// Typed pod status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodStatus {
    pub phase: Option<String>,
    pub host_ip: Option<String>,
    pub pod_ip: Option<String>,
    pub start_time: Option<String>,
    pub containers: Vec<ContainerStatus>,
    pub conditions: Vec<Condition>,
}

impl PodStatus {
    /// Build the typed view from a flat status map
    pub fn from_status_map(map: &BTreeMap<String, String>) -> Self {
        let mut containers = Vec::new();
        for index in 0.. {
            let prefix = format!("{}.{}.", CONTAINER_PREFIX, index);
            if !has_prefix(map, &prefix) {
                break;
            }
            let field = |name: &str| non_empty(map, &format!("{}{}", prefix, name));
            containers.push(ContainerStatus {
                name: field("name"),
                state: field("state").map(|s| ContainerState::parse(&s)),
                reason: field("reason"),
                message: field("message"),
                ready: field("ready").and_then(|v| v.parse().ok()),
                restart_count: field("restartCount").and_then(|v| v.parse().ok()),
                exit_code: field("exitCode").and_then(|v| v.parse().ok()),
                started_at: field("startedAt"),
            });
        }

        Self {
            phase: non_empty(map, "phase"),
            host_ip: non_empty(map, "hostIP"),
            pod_ip: non_empty(map, "podIP"),
            start_time: non_empty(map, "startTime"),
            containers,
            conditions: parse_conditions(map),
        }
    }

    /// Flatten back into the dotted-key encoding collectors exchange
    pub fn to_status_map(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        insert_opt(&mut map, "phase".to_string(), &self.phase);
        insert_opt(&mut map, "hostIP".to_string(), &self.host_ip);
        insert_opt(&mut map, "podIP".to_string(), &self.pod_ip);
        insert_opt(&mut map, "startTime".to_string(), &self.start_time);

        for (i, container) in self.containers.iter().enumerate() {
            let key = |name: &str| format!("{}.{}.{}", CONTAINER_PREFIX, i, name);
            insert_opt(&mut map, key("name"), &container.name);
            insert_opt(
                &mut map,
                key("state"),
                &container.state.as_ref().map(|s| s.as_str().to_string()),
            );
            insert_opt(&mut map, key("reason"), &container.reason);
            insert_opt(&mut map, key("message"), &container.message);
            insert_opt(&mut map, key("ready"), &container.ready.map(|v| v.to_string()));
            insert_opt(
                &mut map,
                key("restartCount"),
                &container.restart_count.map(|v| v.to_string()),
            );
            insert_opt(&mut map, key("exitCode"), &container.exit_code.map(|v| v.to_string()));
            insert_opt(&mut map, key("startedAt"), &container.started_at);
        }

        write_conditions(&mut map, &self.conditions);
        map
    }
}

/// Typed deployment status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentStatus {
    pub replicas: Option<u32>,
    pub ready_replicas: Option<u32>,
    pub available_replicas: Option<u32>,
    pub unavailable_replicas: Option<u32>,
    pub updated_replicas: Option<u32>,
    pub conditions: Vec<Condition>,
}

impl DeploymentStatus {
    /// Build the typed view, rejecting replica counts that are not unsigned integers
    pub fn from_status_map(map: &BTreeMap<String, String>) -> Result<Self, StatusError> {
        Ok(Self {
            replicas: parse_count(map, "replicas")?,
            ready_replicas: parse_count(map, "readyReplicas")?,
            available_replicas: parse_count(map, "availableReplicas")?,
            unavailable_replicas: parse_count(map, "unavailableReplicas")?,
            updated_replicas: parse_count(map, "updatedReplicas")?,
            conditions: parse_conditions(map),
        })
    }

    pub fn to_status_map(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        let counts = [
            ("replicas", self.replicas),
            ("readyReplicas", self.ready_replicas),
            ("availableReplicas", self.available_replicas),
            ("unavailableReplicas", self.unavailable_replicas),
            ("updatedReplicas", self.updated_replicas),
        ];
        for (key, value) in counts {
            insert_opt(&mut map, key.to_string(), &value.map(|v| v.to_string()));
        }
        write_conditions(&mut map, &self.conditions);
        map
    }

    pub fn condition(&self, condition_type: &str) -> Option<&Condition> {
        self.conditions
            .iter()
            .find(|c| c.condition_type == condition_type)
    }
}

fn parse_conditions(map: &BTreeMap<String, String>) -> Vec<Condition> {
    let mut conditions = Vec::new();
    for index in 0.. {
        let key = |name: &str| format!("{}.{}.{}", CONDITION_PREFIX, index, name);
        let Some(condition_type) = map.get(&key("type")) else {
            break;
        };
        conditions.push(Condition {
            condition_type: condition_type.clone(),
            status: map.get(&key("status")).cloned(),
            reason: non_empty(map, &key("reason")),
            message: non_empty(map, &key("message")),
        });
    }
    conditions
}

fn write_conditions(map: &mut BTreeMap<String, String>, conditions: &[Condition]) {
    for (i, condition) in conditions.iter().enumerate() {
        let key = |name: &str| format!("{}.{}.{}", CONDITION_PREFIX, i, name);
        map.insert(key("type"), condition.condition_type.clone());
        insert_opt(map, key("status"), &condition.status);
        insert_opt(map, key("reason"), &condition.reason);
        insert_opt(map, key("message"), &condition.message);
    }
}

fn parse_count(map: &BTreeMap<String, String>, key: &str) -> Result<Option<u32>, StatusError> {
    match map.get(key).map(|v| v.trim()) {
        None | Some("") => Ok(None),
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|_| StatusError::InvalidNumber {
                key: key.to_string(),
                value: value.to_string(),
            }),
    }
}

fn has_prefix(map: &BTreeMap<String, String>, prefix: &str) -> bool {
    map.range(prefix.to_string()..)
        .next()
        .is_some_and(|(k, _)| k.starts_with(prefix))
}

fn non_empty(map: &BTreeMap<String, String>, key: &str) -> Option<String> {
    map.get(key).filter(|v| !v.is_empty()).cloned()
}

fn insert_opt(map: &mut BTreeMap<String, String>, key: String, value: &Option<String>) {
    if let Some(value) = value {
        map.insert(key, value.clone());
    }
}
