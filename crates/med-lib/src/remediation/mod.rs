//! Remediation plan synthesis
//!
//! Turns a finished list of findings into one prioritized plan: human
//! steps grouped by severity band (errors first) and runnable commands in
//! the same band, finding and command order.

mod templates;

pub use templates::{fix_pod_resources, restart_deployment, scale_deployment, CommandTemplate};

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::TemplateError;
use crate::finding::{Finding, RemediationCommand, Severity, TemplateRef};
use crate::models::ResourceSnapshot;
use crate::observability::{DiagnosticMetrics, StructuredLogger};

const PLAN_TITLE: &str = "Remediation Plan";
const PLAN_DESCRIPTION: &str = "Steps to address the identified issues";

/// Kind of runnable command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandType {
    /// kubectl invocation
    Kubectl,
    /// helm invocation
    Helm,
    /// Kubernetes manifest snippet
    Yaml,
    /// Any other shell command
    Bash,
}

impl CommandType {
    /// Classify a literal command by its prefix
    pub fn classify(command: &str) -> Self {
        let command = command.trim();
        if command.starts_with("kubectl ") {
            CommandType::Kubectl
        } else if command.starts_with("helm ") {
            CommandType::Helm
        } else if command.starts_with("apiVersion:") || command.starts_with("kind:") {
            CommandType::Yaml
        } else {
            CommandType::Bash
        }
    }
}

impl std::fmt::Display for CommandType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandType::Kubectl => write!(f, "kubectl"),
            CommandType::Helm => write!(f, "helm"),
            CommandType::Yaml => write!(f, "yaml"),
            CommandType::Bash => write!(f, "bash"),
        }
    }
}

/// A command that can be executed to fix an issue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    #[serde(rename = "type")]
    pub command_type: CommandType,
    pub description: String,
    pub command: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub variables: BTreeMap<String, String>,
}

/// Prioritized steps and commands addressing all findings of one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemediationPlan {
    pub title: String,
    pub description: String,
    pub steps: Vec<String>,
    pub commands: Vec<Command>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub yaml_snippets: Vec<String>,
    pub findings: Vec<Finding>,
}

/// Builds remediation plans from findings
#[derive(Debug, Clone, Default)]
pub struct RemediationSynthesizer {
    logger: StructuredLogger,
    metrics: Option<DiagnosticMetrics>,
}

impl RemediationSynthesizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_metrics(mut self, metrics: DiagnosticMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Build a plan, or `None` when there is nothing to remediate
    pub fn synthesize(
        &self,
        findings: &[Finding],
        snapshots: &[ResourceSnapshot],
    ) -> Option<RemediationPlan> {
        if findings.is_empty() {
            return None;
        }

        let mut plan = RemediationPlan {
            title: PLAN_TITLE.to_string(),
            description: PLAN_DESCRIPTION.to_string(),
            steps: Vec::new(),
            commands: Vec::new(),
            yaml_snippets: Vec::new(),
            findings: findings.to_vec(),
        };

        for severity in Severity::ALL {
            let mut band = findings.iter().filter(|f| f.severity == severity).peekable();
            if band.peek().is_none() {
                continue;
            }
            plan.steps.push(band_header(severity).to_string());
            for finding in band {
                self.add_finding(&mut plan, finding, snapshots);
            }
        }

        self.logger
            .log_plan_generated(plan.steps.len(), plan.commands.len());
        if let Some(metrics) = &self.metrics {
            metrics.inc_plans_generated();
        }

        Some(plan)
    }

    fn add_finding(&self, plan: &mut RemediationPlan, finding: &Finding, snapshots: &[ResourceSnapshot]) {
        plan.steps
            .extend(finding.remediation.iter().map(|step| format!("  - {}", step)));

        for command in &finding.commands {
            match command {
                RemediationCommand::Literal(text) => {
                    let command_type = CommandType::classify(text);
                    if command_type == CommandType::Yaml {
                        plan.yaml_snippets.push(text.clone());
                    }
                    plan.commands.push(Command {
                        command_type,
                        description: format!("Remediation step for {}", finding.resource),
                        command: text.clone(),
                        variables: BTreeMap::new(),
                    });
                }
                RemediationCommand::Template(template) => {
                    match render_template(template, finding, snapshots) {
                        Ok(rendered) => plan.commands.push(Command {
                            command_type: CommandType::Kubectl,
                            description: format!(
                                "Apply {} template for {}",
                                template.id, finding.resource
                            ),
                            command: rendered,
                            variables: template.params.clone(),
                        }),
                        Err(err) => {
                            self.logger.log_template_skipped(
                                &template.id,
                                &finding.resource.to_string(),
                                &err.to_string(),
                            );
                            if let Some(metrics) = &self.metrics {
                                metrics.inc_template_skips();
                            }
                        }
                    }
                }
            }
        }
    }
}

fn band_header(severity: Severity) -> &'static str {
    match severity {
        Severity::Error => "Fix critical issues:",
        Severity::Warning => "Address warnings:",
        Severity::Info => "Consider improvements:",
    }
}

/// Resolve a template reference against the first snapshot matching the finding's resource
fn render_template(
    template: &TemplateRef,
    finding: &Finding,
    snapshots: &[ResourceSnapshot],
) -> Result<String, TemplateError> {
    let resolved = CommandTemplate::from_id(&template.id)
        .ok_or_else(|| TemplateError::Unknown(template.id.clone()))?;
    let snapshot = snapshots
        .iter()
        .find(|s| s.resource.same_identity(&finding.resource))
        .ok_or_else(|| TemplateError::NoMatchingResource(finding.resource.to_string()))?;
    resolved.render(&snapshot.resource, &template.params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ResourceRef;

    fn finding(severity: Severity, title: &str, resource: &ResourceRef) -> Finding {
        Finding::builder(severity, title, resource)
            .steps([format!("step for {}", title)])
            .command(format!("kubectl get {}", title))
            .build()
            .unwrap()
    }

    #[test]
    fn test_empty_findings_yield_no_plan() {
        assert!(RemediationSynthesizer::new().synthesize(&[], &[]).is_none());
    }

    #[test]
    fn test_classify_by_prefix() {
        assert_eq!(CommandType::classify("kubectl get pods"), CommandType::Kubectl);
        assert_eq!(CommandType::classify("  helm rollback web 2"), CommandType::Helm);
        assert_eq!(CommandType::classify("apiVersion: v1\nkind: Pod"), CommandType::Yaml);
        assert_eq!(CommandType::classify("kind: ConfigMap"), CommandType::Yaml);
        assert_eq!(CommandType::classify("curl -s localhost:8080"), CommandType::Bash);
        assert_eq!(CommandType::classify("kubectl"), CommandType::Bash);
    }

    #[test]
    fn test_steps_grouped_by_severity() {
        let pod = ResourceRef::pod("api", "default");
        let findings = vec![
            finding(Severity::Info, "i1", &pod),
            finding(Severity::Warning, "w1", &pod),
            finding(Severity::Error, "e1", &pod),
            finding(Severity::Error, "e2", &pod),
        ];
        let plan = RemediationSynthesizer::new()
            .synthesize(&findings, &[])
            .unwrap();

        assert_eq!(
            plan.steps,
            [
                "Fix critical issues:",
                "  - step for e1",
                "  - step for e2",
                "Address warnings:",
                "  - step for w1",
                "Consider improvements:",
                "  - step for i1",
            ]
        );
        let commands: Vec<_> = plan.commands.iter().map(|c| c.command.as_str()).collect();
        assert_eq!(
            commands,
            ["kubectl get e1", "kubectl get e2", "kubectl get w1", "kubectl get i1"]
        );
        assert_eq!(plan.commands[0].description, "Remediation step for Pod/api");
        assert_eq!(plan.findings, findings);
    }

    #[test]
    fn test_empty_bands_have_no_header() {
        let pod = ResourceRef::pod("api", "default");
        let plan = RemediationSynthesizer::new()
            .synthesize(&[finding(Severity::Warning, "w1", &pod)], &[])
            .unwrap();
        assert_eq!(plan.steps, ["Address warnings:", "  - step for w1"]);
    }

    #[test]
    fn test_template_rendered_against_matching_snapshot() {
        let web = ResourceRef::deployment("web", "prod");
        let snapshots = vec![
            ResourceSnapshot::new(ResourceRef::deployment("web", "staging")),
            ResourceSnapshot::new(web.clone()),
        ];
        let finding = Finding::builder(Severity::Info, "Deployment scaled to zero", &web)
            .command(TemplateRef::new("scale-deployment").with_param("replicas", "2"))
            .build()
            .unwrap();

        let plan = RemediationSynthesizer::new()
            .synthesize(&[finding], &snapshots)
            .unwrap();

        assert_eq!(plan.commands.len(), 1);
        let command = &plan.commands[0];
        assert_eq!(command.command_type, CommandType::Kubectl);
        assert_eq!(command.command, "kubectl scale deployment web -n prod --replicas=2");
        assert_eq!(
            command.description,
            "Apply scale-deployment template for Deployment/web"
        );
        assert_eq!(command.variables.get("replicas").map(String::as_str), Some("2"));
    }

    #[test]
    fn test_unresolvable_templates_are_skipped() {
        let web = ResourceRef::deployment("web", "prod");
        let finding = Finding::builder(Severity::Error, "Rollout stalled", &web)
            .command("template:unknown-template")
            .command("template:restart-deployment")
            .command("kubectl rollout status deployment web -n prod")
            .build()
            .unwrap();

        // No snapshot for the deployment: the restart template cannot resolve either
        let plan = RemediationSynthesizer::new()
            .synthesize(&[finding], &[])
            .unwrap();

        assert_eq!(plan.commands.len(), 1);
        assert_eq!(plan.commands[0].command, "kubectl rollout status deployment web -n prod");
    }

    #[test]
    fn test_manifest_snippets_collected() {
        let pod = ResourceRef::pod("api", "default");
        let manifest = "apiVersion: v1\nkind: LimitRange";
        let finding = Finding::builder(Severity::Warning, "No limits", &pod)
            .command(manifest)
            .build()
            .unwrap();
        let plan = RemediationSynthesizer::new()
            .synthesize(&[finding], &[])
            .unwrap();
        assert_eq!(plan.commands[0].command_type, CommandType::Yaml);
        assert_eq!(plan.yaml_snippets, [manifest]);
    }
}
