//! Resource collection
//!
//! Produces [`ResourceSnapshot`]s either from the live cluster through the
//! Kubernetes API or from JSON/YAML snapshot files.

use anyhow::{bail, Context, Result};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Event, Pod};
use kube::api::{Api, ListParams, LogParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, warn};

use med_lib::status::{Condition, ContainerState, ContainerStatus, DeploymentStatus, PodStatus};
use med_lib::{format_container_logs, ResourceRef, ResourceSnapshot};

/// What to collect
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Pod(String),
    Selector(String),
    Deployment(String),
}

/// Options for one collection pass
#[derive(Debug, Clone)]
pub struct CollectionOptions {
    pub namespace: String,
    pub target: Target,
    pub include_events: bool,
    pub include_logs: bool,
    pub tail_lines: Option<i64>,
    pub since_seconds: Option<i64>,
    /// Upper bound on pods gathered for a selector or deployment
    pub limit: u32,
}

/// Collects snapshots from a live cluster
pub struct KubeCollector {
    client: kube::Client,
}

impl KubeCollector {
    /// Connect using an explicit kubeconfig, or the inferred in-cluster/default config
    pub async fn connect(kubeconfig: Option<&str>) -> Result<Self> {
        let config = match kubeconfig {
            Some(path) => {
                let kubeconfig = Kubeconfig::read_from(path)
                    .with_context(|| format!("Failed to read kubeconfig {}", path))?;
                kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                    .await
                    .context("Invalid kubeconfig")?
            }
            None => kube::Config::infer()
                .await
                .context("Failed to infer Kubernetes configuration")?,
        };
        let client = kube::Client::try_from(config).context("Failed to create Kubernetes client")?;
        Ok(Self { client })
    }

    pub async fn collect(&self, options: &CollectionOptions) -> Result<Vec<ResourceSnapshot>> {
        if options.namespace.is_empty() {
            bail!("namespace is required");
        }

        match &options.target {
            Target::Pod(name) => {
                let pod = self
                    .pods(options)
                    .get(name)
                    .await
                    .with_context(|| format!("Failed to get pod {}", name))?;
                Ok(vec![self.pod_snapshot(&pod, options).await?])
            }
            Target::Selector(selector) => {
                let pods = self.list_pods(selector, options).await?;
                let mut snapshots = Vec::with_capacity(pods.len());
                for pod in &pods {
                    snapshots.push(self.pod_snapshot(pod, options).await?);
                }
                Ok(snapshots)
            }
            Target::Deployment(name) => self.deployment_snapshots(name, options).await,
        }
    }

    fn pods(&self, options: &CollectionOptions) -> Api<Pod> {
        Api::namespaced(self.client.clone(), &options.namespace)
    }

    async fn list_pods(&self, selector: &str, options: &CollectionOptions) -> Result<Vec<Pod>> {
        let params = ListParams::default().labels(selector).limit(options.limit);
        let pods = self
            .pods(options)
            .list(&params)
            .await
            .with_context(|| format!("Failed to list pods with selector {}", selector))?;
        if pods.items.is_empty() {
            bail!("no pods found with selector {}", selector);
        }
        Ok(pods.items)
    }

    async fn pod_snapshot(&self, pod: &Pod, options: &CollectionOptions) -> Result<ResourceSnapshot> {
        let mut snapshot = ResourceSnapshot::new(pod_ref(pod));
        snapshot.status = pod_status(pod).to_status_map();
        snapshot.manifest = manifest(pod);

        if options.include_events {
            match self.events(&snapshot.resource).await {
                Ok(events) => snapshot.events = events,
                Err(err) => warn!(
                    event = "events_unavailable",
                    resource = %snapshot.resource,
                    error = %err,
                    "Failed to collect events"
                ),
            }
        }

        if options.include_logs {
            snapshot.logs = self.logs(pod, options).await;
        }

        debug!(
            event = "snapshot_collected",
            resource = %snapshot.resource,
            events = snapshot.events.len(),
            logs = snapshot.logs.len(),
            "Collected pod snapshot"
        );
        Ok(snapshot)
    }

    async fn events(&self, resource: &ResourceRef) -> Result<Vec<String>> {
        let api: Api<Event> = Api::namespaced(self.client.clone(), &resource.namespace);
        let params = ListParams::default().fields(&event_field_selector(resource));
        let events = api.list(&params).await.context("Failed to list events")?;
        Ok(events.items.iter().map(format_event).collect())
    }

    /// Logs of every container then every init container; unavailable logs are skipped
    async fn logs(&self, pod: &Pod, options: &CollectionOptions) -> Vec<String> {
        let name = pod.metadata.name.clone().unwrap_or_default();
        let api = self.pods(options);
        let mut logs = Vec::new();

        for container in container_names(pod) {
            let params = LogParams {
                container: Some(container.clone()),
                tail_lines: options.tail_lines,
                since_seconds: options.since_seconds,
                ..LogParams::default()
            };
            match api.logs(&name, &params).await {
                Ok(text) if !text.is_empty() => logs.push(format_container_logs(&container, &text)),
                Ok(_) => {}
                Err(err) => debug!(
                    event = "logs_unavailable",
                    pod = %name,
                    container = %container,
                    error = %err,
                    "Skipping container logs"
                ),
            }
        }
        logs
    }

    /// The deployment itself followed by the pods its selector matches
    async fn deployment_snapshots(&self, name: &str, options: &CollectionOptions) -> Result<Vec<ResourceSnapshot>> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), &options.namespace);
        let deployment = api
            .get(name)
            .await
            .with_context(|| format!("Failed to get deployment {}", name))?;

        let mut snapshot = ResourceSnapshot::new(deployment_ref(&deployment));
        snapshot.status = deployment_status(&deployment).to_status_map();
        snapshot.manifest = manifest(&deployment);

        let mut snapshots = Vec::new();
        if let Some(selector) = selector_string(&deployment) {
            for pod in self.list_pods(&selector, options).await.unwrap_or_default() {
                let pod_snapshot = self.pod_snapshot(&pod, options).await?;
                snapshot.related.push(pod_snapshot.resource.clone());
                snapshots.push(pod_snapshot);
            }
        }
        snapshots.insert(0, snapshot);
        Ok(snapshots)
    }
}

fn pod_ref(pod: &Pod) -> ResourceRef {
    let mut resource = ResourceRef::pod(
        pod.metadata.name.clone().unwrap_or_default(),
        pod.metadata.namespace.clone().unwrap_or_default(),
    );
    resource.labels = pod.metadata.labels.clone().unwrap_or_default();
    resource
}

fn deployment_ref(deployment: &Deployment) -> ResourceRef {
    let mut resource = ResourceRef::deployment(
        deployment.metadata.name.clone().unwrap_or_default(),
        deployment.metadata.namespace.clone().unwrap_or_default(),
    );
    resource.labels = deployment.metadata.labels.clone().unwrap_or_default();
    resource
}

/// Manifest as YAML with server-managed bookkeeping removed
fn manifest<K: Clone + kube::Resource + serde::Serialize>(object: &K) -> Option<String> {
    let mut object = object.clone();
    object.meta_mut().managed_fields = None;
    serde_yaml::to_string(&object).ok()
}

fn event_field_selector(resource: &ResourceRef) -> String {
    format!(
        "involvedObject.name={},involvedObject.namespace={},involvedObject.kind={}",
        resource.name, resource.namespace, resource.kind
    )
}

/// `[<time>] <type> <reason>: <message> (count: <n>)`
pub fn format_event(event: &Event) -> String {
    let timestamp = event
        .last_timestamp
        .as_ref()
        .or(event.metadata.creation_timestamp.as_ref())
        .map(|t| t.0.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default();

    format!(
        "[{}] {} {}: {} (count: {})",
        timestamp,
        event.type_.as_deref().unwrap_or_default(),
        event.reason.as_deref().unwrap_or_default(),
        event.message.as_deref().unwrap_or_default(),
        event.count.unwrap_or_default()
    )
}

fn container_names(pod: &Pod) -> Vec<String> {
    let Some(spec) = &pod.spec else {
        return Vec::new();
    };
    spec.containers
        .iter()
        .chain(spec.init_containers.iter().flatten())
        .map(|c| c.name.clone())
        .collect()
}

/// Typed status view of a live pod
pub fn pod_status(pod: &Pod) -> PodStatus {
    let Some(status) = &pod.status else {
        return PodStatus::default();
    };

    let containers = status
        .container_statuses
        .iter()
        .flatten()
        .map(|cs| {
            let mut container = ContainerStatus {
                name: Some(cs.name.clone()),
                ready: Some(cs.ready),
                restart_count: u32::try_from(cs.restart_count).ok(),
                ..ContainerStatus::default()
            };
            let state = cs.state.as_ref();
            if let Some(waiting) = state.and_then(|s| s.waiting.as_ref()) {
                container.state = Some(ContainerState::Waiting);
                container.reason = waiting.reason.clone();
                container.message = waiting.message.clone();
            } else if let Some(running) = state.and_then(|s| s.running.as_ref()) {
                container.state = Some(ContainerState::Running);
                container.started_at = running.started_at.as_ref().map(|t| t.0.to_rfc3339());
            } else if let Some(terminated) = state.and_then(|s| s.terminated.as_ref()) {
                container.state = Some(ContainerState::Terminated);
                container.reason = terminated.reason.clone();
                container.message = terminated.message.clone();
                container.exit_code = Some(terminated.exit_code);
            }
            container
        })
        .collect();

    let conditions = status
        .conditions
        .iter()
        .flatten()
        .map(|c| Condition {
            condition_type: c.type_.clone(),
            status: Some(c.status.clone()),
            reason: c.reason.clone(),
            message: c.message.clone(),
        })
        .collect();

    PodStatus {
        phase: status.phase.clone(),
        host_ip: status.host_ip.clone(),
        pod_ip: status.pod_ip.clone(),
        start_time: status.start_time.as_ref().map(|t| t.0.to_rfc3339()),
        containers,
        conditions,
    }
}

/// Typed status view of a live deployment
pub fn deployment_status(deployment: &Deployment) -> DeploymentStatus {
    let Some(status) = &deployment.status else {
        return DeploymentStatus::default();
    };
    let count = |value: Option<i32>| value.and_then(|v| u32::try_from(v).ok());

    DeploymentStatus {
        replicas: count(status.replicas),
        ready_replicas: count(status.ready_replicas),
        available_replicas: count(status.available_replicas),
        unavailable_replicas: count(status.unavailable_replicas),
        updated_replicas: count(status.updated_replicas),
        conditions: status
            .conditions
            .iter()
            .flatten()
            .map(|c| Condition {
                condition_type: c.type_.clone(),
                status: Some(c.status.clone()),
                reason: c.reason.clone(),
                message: c.message.clone(),
            })
            .collect(),
    }
}

/// `matchLabels` of a deployment's selector as `k=v,k=v`
fn selector_string(deployment: &Deployment) -> Option<String> {
    let labels = deployment
        .spec
        .as_ref()?
        .selector
        .match_labels
        .as_ref()
        .filter(|labels| !labels.is_empty())?;
    Some(
        labels
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(","),
    )
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SnapshotFile {
    Many(Vec<ResourceSnapshot>),
    One(Box<ResourceSnapshot>),
}

/// Load snapshots from a JSON or YAML file holding one snapshot or a list
pub fn load_snapshots(path: &Path) -> Result<Vec<ResourceSnapshot>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read snapshot file {}", path.display()))?;

    let is_yaml = matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("yaml") | Some("yml")
    );
    let parsed: SnapshotFile = if is_yaml {
        serde_yaml::from_str(&content).context("Failed to parse YAML snapshot file")?
    } else {
        serde_json::from_str(&content).context("Failed to parse JSON snapshot file")?
    };

    Ok(match parsed {
        SnapshotFile::Many(snapshots) => snapshots,
        SnapshotFile::One(snapshot) => vec![*snapshot],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use k8s_openapi::api::apps::v1::{DeploymentCondition, DeploymentSpec, DeploymentStatus as K8sDeploymentStatus};
    use k8s_openapi::api::core::v1::{
        Container, ContainerState as K8sContainerState, ContainerStateTerminated,
        ContainerStateWaiting, ContainerStatus as K8sContainerStatus, PodCondition, PodSpec,
        PodStatus as K8sPodStatus,
    };
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, Time};
    use std::collections::BTreeMap;

    fn crashing_pod() -> Pod {
        let mut pod = Pod::default();
        pod.metadata.name = Some("web-1".to_string());
        pod.metadata.namespace = Some("prod".to_string());
        pod.spec = Some(PodSpec {
            containers: vec![Container {
                name: "web".to_string(),
                ..Container::default()
            }],
            init_containers: Some(vec![Container {
                name: "migrate".to_string(),
                ..Container::default()
            }]),
            ..PodSpec::default()
        });
        pod.status = Some(K8sPodStatus {
            phase: Some("Running".to_string()),
            pod_ip: Some("10.1.2.3".to_string()),
            container_statuses: Some(vec![
                K8sContainerStatus {
                    name: "web".to_string(),
                    ready: false,
                    restart_count: 7,
                    state: Some(K8sContainerState {
                        waiting: Some(ContainerStateWaiting {
                            reason: Some("CrashLoopBackOff".to_string()),
                            message: Some("back-off 5m0s".to_string()),
                        }),
                        ..K8sContainerState::default()
                    }),
                    ..K8sContainerStatus::default()
                },
                K8sContainerStatus {
                    name: "sidecar".to_string(),
                    state: Some(K8sContainerState {
                        terminated: Some(ContainerStateTerminated {
                            exit_code: 137,
                            reason: Some("OOMKilled".to_string()),
                            ..ContainerStateTerminated::default()
                        }),
                        ..K8sContainerState::default()
                    }),
                    ..K8sContainerStatus::default()
                },
            ]),
            conditions: Some(vec![PodCondition {
                type_: "Ready".to_string(),
                status: "False".to_string(),
                reason: Some("ContainersNotReady".to_string()),
                ..PodCondition::default()
            }]),
            ..K8sPodStatus::default()
        });
        pod
    }

    #[test]
    fn test_pod_status_flattening() {
        let map = pod_status(&crashing_pod()).to_status_map();

        assert_eq!(map["phase"], "Running");
        assert_eq!(map["podIP"], "10.1.2.3");
        assert_eq!(map["container.0.name"], "web");
        assert_eq!(map["container.0.state"], "waiting");
        assert_eq!(map["container.0.reason"], "CrashLoopBackOff");
        assert_eq!(map["container.0.restartCount"], "7");
        assert_eq!(map["container.1.state"], "terminated");
        assert_eq!(map["container.1.exitCode"], "137");
        assert_eq!(map["condition.0.type"], "Ready");
        assert_eq!(map["condition.0.status"], "False");
    }

    #[test]
    fn test_collected_pod_feeds_analyzer() {
        let mut snapshot = ResourceSnapshot::new(pod_ref(&crashing_pod()));
        snapshot.status = pod_status(&crashing_pod()).to_status_map();

        let report = med_lib::DiagnosticEngine::default().diagnose("", vec![snapshot]);
        assert_eq!(report.findings[0].title, "Container in CrashLoopBackOff");
    }

    #[test]
    fn test_container_names_include_init_containers() {
        assert_eq!(container_names(&crashing_pod()), ["web", "migrate"]);
        assert!(container_names(&Pod::default()).is_empty());
    }

    #[test]
    fn test_format_event() {
        let mut event = Event::default();
        event.type_ = Some("Warning".to_string());
        event.reason = Some("BackOff".to_string());
        event.message = Some("Back-off restarting failed container".to_string());
        event.count = Some(4);
        event.last_timestamp = Some(Time(Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap()));

        assert_eq!(
            format_event(&event),
            "[2024-03-01 09:30:00] Warning BackOff: Back-off restarting failed container (count: 4)"
        );
    }

    #[test]
    fn test_format_event_falls_back_to_creation_time() {
        let mut event = Event::default();
        event.metadata.creation_timestamp =
            Some(Time(Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap()));
        event.reason = Some("Scheduled".to_string());

        assert_eq!(format_event(&event), "[2024-03-01 08:00:00]  Scheduled:  (count: 0)");
    }

    #[test]
    fn test_event_field_selector() {
        assert_eq!(
            event_field_selector(&ResourceRef::pod("web-1", "prod")),
            "involvedObject.name=web-1,involvedObject.namespace=prod,involvedObject.kind=Pod"
        );
    }

    #[test]
    fn test_deployment_status_and_selector() {
        let mut deployment = Deployment::default();
        deployment.spec = Some(DeploymentSpec {
            selector: LabelSelector {
                match_labels: Some(BTreeMap::from([
                    ("app".to_string(), "web".to_string()),
                    ("tier".to_string(), "frontend".to_string()),
                ])),
                ..LabelSelector::default()
            },
            ..DeploymentSpec::default()
        });
        deployment.status = Some(K8sDeploymentStatus {
            replicas: Some(3),
            unavailable_replicas: Some(2),
            conditions: Some(vec![DeploymentCondition {
                type_: "Progressing".to_string(),
                status: "False".to_string(),
                reason: Some("ProgressDeadlineExceeded".to_string()),
                ..DeploymentCondition::default()
            }]),
            ..K8sDeploymentStatus::default()
        });

        let status = deployment_status(&deployment);
        assert_eq!(status.replicas, Some(3));
        assert_eq!(status.unavailable_replicas, Some(2));
        assert_eq!(
            status.condition("Progressing").and_then(|c| c.reason.as_deref()),
            Some("ProgressDeadlineExceeded")
        );
        assert_eq!(selector_string(&deployment).as_deref(), Some("app=web,tier=frontend"));
    }

    #[test]
    fn test_load_single_json_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pod.json");
        std::fs::write(
            &path,
            r#"{"resource": {"kind": "Pod", "name": "web-1", "namespace": "prod"}, "status": {"phase": "Failed"}}"#,
        )
        .unwrap();

        let snapshots = load_snapshots(&path).unwrap();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].status["phase"], "Failed");
    }

    #[test]
    fn test_load_yaml_snapshot_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshots.yaml");
        std::fs::write(
            &path,
            "- resource: {kind: Pod, name: a, namespace: prod}\n- resource: {kind: Deployment, name: b, namespace: prod}\n",
        )
        .unwrap();

        let snapshots = load_snapshots(&path).unwrap();
        assert_eq!(snapshots.len(), 2);
        assert!(snapshots[1].is_kind("Deployment"));
    }

    #[test]
    fn test_load_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(load_snapshots(&path).is_err());
        assert!(load_snapshots(&dir.path().join("missing.json")).is_err());
    }
}
