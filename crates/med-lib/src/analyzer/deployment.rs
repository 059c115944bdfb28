//! Deployment rule engine

use crate::error::AnalyzerError;
use crate::finding::{DiagnosticInput, Finding, Severity, TemplateRef};
use crate::models::{ResourceSnapshot, KIND_DEPLOYMENT};
use crate::remediation::CommandTemplate;

use super::Analyzer;

/// Analyzes deployment issues like unavailable replicas and stalled rollouts
#[derive(Debug, Clone, Copy, Default)]
pub struct DeploymentAnalyzer;

impl Analyzer for DeploymentAnalyzer {
    fn name(&self) -> &str {
        "DeploymentAnalyzer"
    }

    fn description(&self) -> &str {
        "Analyzes deployment issues like unavailable replicas, rollout failures, etc."
    }

    fn analyze(
        &self,
        input: &DiagnosticInput,
        findings: &mut Vec<Finding>,
    ) -> Result<(), AnalyzerError> {
        for snapshot in input.snapshots_of_kind(KIND_DEPLOYMENT) {
            check_deployment(snapshot, findings)?;
        }
        Ok(())
    }
}

fn check_deployment(
    snapshot: &ResourceSnapshot,
    findings: &mut Vec<Finding>,
) -> Result<(), AnalyzerError> {
    let resource = &snapshot.resource;
    let status = snapshot
        .deployment_status()
        .map_err(|source| AnalyzerError::MalformedStatus {
            resource: resource.to_string(),
            source,
        })?;

    let rollout_status = format!(
        "kubectl rollout status deployment {} -n {}",
        resource.name, resource.namespace
    );

    let stalled = status.condition("Progressing").and_then(|c| {
        (c.reason.as_deref() == Some("ProgressDeadlineExceeded")).then_some(c)
    });
    if let Some(condition) = stalled {
        findings.push(
            Finding::builder(Severity::Error, "Deployment rollout stalled", resource)
                .description(format!(
                    "The deployment exceeded its progress deadline: {}",
                    condition.message.as_deref().unwrap_or_default()
                ))
                .steps([
                    "Check the rollout status and history",
                    "Inspect pods of the newest ReplicaSet for failures",
                    "Roll back or restart the deployment once the cause is fixed",
                ])
                .command(rollout_status.clone())
                .command(format!(
                    "kubectl rollout history deployment {} -n {}",
                    resource.name, resource.namespace
                ))
                .command(TemplateRef::new(CommandTemplate::RestartDeployment.id()))
                .build()?,
        );
    }

    if let Some(unavailable) = status.unavailable_replicas.filter(|n| *n > 0) {
        let desired = status.replicas.unwrap_or_default();
        let mut finding =
            Finding::builder(Severity::Warning, "Deployment has unavailable replicas", resource)
                .description(format!(
                    "{} of {} desired replicas are unavailable",
                    unavailable, desired
                ))
                .steps([
                    "Check the status of the deployment's pods",
                    "Check events for scheduling or image pull failures",
                    "Verify readiness probes succeed",
                ])
                .command(rollout_status)
                .command(format!(
                    "kubectl describe deployment {} -n {}",
                    resource.name, resource.namespace
                ));
        if let Some(app) = resource.labels.get("app") {
            finding = finding.command(format!(
                "kubectl get pods -n {} -l app={}",
                resource.namespace, app
            ));
        }
        findings.push(finding.build()?);
    }

    if status.replicas == Some(0) {
        findings.push(
            Finding::builder(Severity::Info, "Deployment scaled to zero", resource)
                .description("The deployment has no desired replicas and serves no traffic")
                .steps(["Scale the deployment up if it is expected to be running"])
                .command(
                    TemplateRef::new(CommandTemplate::ScaleDeployment.id())
                        .with_param("replicas", "1"),
                )
                .build()?,
        );
    }

    Ok(())
}
