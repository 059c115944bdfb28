//! Pod rule engine
//!
//! Runs four independent passes over every `Pod` snapshot:
//! - container waiting-state classification
//! - event classification (OOM kills, evictions)
//! - log pattern scan (errors, connection failures)
//! - phase and condition scan (scheduling failures, failed pods)

use crate::error::{AnalyzerError, FindingError};
use crate::finding::{DiagnosticInput, Finding, Severity};
use crate::models::{ResourceSnapshot, KIND_POD};
use crate::status::PodStatus;

use super::Analyzer;

/// Characters of context kept before the first error match
const SNIPPET_BEFORE: usize = 50;

/// Characters of context kept after the first error match
const SNIPPET_AFTER: usize = 100;

/// Maximum lines in a snippet before it is collapsed
const SNIPPET_MAX_LINES: usize = 3;

const SNIPPET_ELLIPSIS: &str = "...";

const CONNECTION_PATTERNS: &[&str] = &["connection refused", "cannot connect", "dial tcp"];

/// Analyzes pod issues like CrashLoopBackOff, ImagePullBackOff, OOM kills
/// and scheduling failures
#[derive(Debug, Clone, Copy, Default)]
pub struct PodAnalyzer;

impl Analyzer for PodAnalyzer {
    fn name(&self) -> &str {
        "PodAnalyzer"
    }

    fn description(&self) -> &str {
        "Analyzes pod issues like CrashLoopBackOff, ImagePullBackOff, etc."
    }

    fn analyze(
        &self,
        input: &DiagnosticInput,
        findings: &mut Vec<Finding>,
    ) -> Result<(), AnalyzerError> {
        for snapshot in input.snapshots_of_kind(KIND_POD) {
            let status = snapshot.pod_status();

            check_container_states(snapshot, &status, findings)?;
            check_events(snapshot, findings)?;
            if !snapshot.logs.is_empty() {
                check_logs(snapshot, findings)?;
            }
            check_pod_status(snapshot, &status, findings)?;
        }
        Ok(())
    }
}

fn describe_pod(snapshot: &ResourceSnapshot) -> String {
    format!(
        "kubectl describe pod {} -n {}",
        snapshot.resource.name, snapshot.resource.namespace
    )
}

fn pod_logs(snapshot: &ResourceSnapshot) -> String {
    format!(
        "kubectl logs {} -n {}",
        snapshot.resource.name, snapshot.resource.namespace
    )
}

/// Classify containers stuck in a waiting state by their reason
fn check_container_states(
    snapshot: &ResourceSnapshot,
    status: &PodStatus,
    findings: &mut Vec<Finding>,
) -> Result<(), FindingError> {
    let resource = &snapshot.resource;

    for container in status.containers.iter().filter(|c| c.is_waiting()) {
        let (Some(name), Some(reason)) = (&container.name, &container.reason) else {
            continue;
        };
        let message = container.message.as_deref().unwrap_or_default();

        let finding = match reason.as_str() {
            "CrashLoopBackOff" => Finding::builder(
                Severity::Error,
                "Container in CrashLoopBackOff",
                resource,
            )
            .description(format!("Container {} is crash looping: {}", name, message))
            .steps([
                "Check container logs for errors",
                "Verify the container command is correct",
                "Check if container has appropriate resources",
                "Ensure configuration files exist and are correct",
            ])
            .command(format!(
                "kubectl logs {} -c {} -n {}",
                resource.name, name, resource.namespace
            ))
            .command(describe_pod(snapshot)),

            "ImagePullBackOff" | "ErrImagePull" => {
                Finding::builder(Severity::Error, "Image pull failure", resource)
                    .description(format!(
                        "Container {} cannot pull its image: {}",
                        name, message
                    ))
                    .steps([
                        "Verify the image name and tag are correct",
                        "Check if private registry requires authentication",
                        "Ensure image pull secrets are configured",
                        "Verify network connectivity to the registry",
                    ])
                    .command(describe_pod(snapshot))
            }

            "CreateContainerConfigError" => {
                Finding::builder(Severity::Error, "Container configuration error", resource)
                    .description(format!(
                        "Container {} has configuration errors: {}",
                        name, message
                    ))
                    .steps([
                        "Check if referenced ConfigMaps exist",
                        "Check if referenced Secrets exist",
                        "Verify volume mounts are correctly configured",
                        "Check container environment variables",
                    ])
                    .command(describe_pod(snapshot))
                    .command(format!("kubectl get configmaps -n {}", resource.namespace))
                    .command(format!("kubectl get secrets -n {}", resource.namespace))
            }

            // Not every waiting reason is diagnosable from status alone
            _ => continue,
        };

        findings.push(finding.build()?);
    }

    Ok(())
}

/// Look for OOM kills and evictions in the event stream
fn check_events(snapshot: &ResourceSnapshot, findings: &mut Vec<Finding>) -> Result<(), FindingError> {
    let resource = &snapshot.resource;

    for event in &snapshot.events {
        let lower = event.to_lowercase();

        if lower.contains("oomkilled") {
            findings.push(
                Finding::builder(
                    Severity::Error,
                    "Container terminated due to OOMKilled",
                    resource,
                )
                .description(format!(
                    "A container was terminated because it exceeded its memory limits: {}",
                    event
                ))
                .steps([
                    "Increase memory limits for the container",
                    "Optimize the application to use less memory",
                    "Check for memory leaks in the application",
                ])
                .command(describe_pod(snapshot))
                .command(format!(
                    "kubectl get pod {} -n {} -o yaml",
                    resource.name, resource.namespace
                ))
                .build()?,
            );
        }

        if lower.contains("evict") {
            findings.push(
                Finding::builder(Severity::Warning, "Pod was evicted", resource)
                    .description(format!("The pod was evicted from its node: {}", event))
                    .steps([
                        "Check node resource pressure (CPU, memory, disk)",
                        "Use node affinity to schedule on larger nodes",
                        "Add resource quotas to prevent resource exhaustion",
                    ])
                    .commands(["kubectl describe node <node-name>", "kubectl top nodes"])
                    .build()?,
            );
        }
    }

    Ok(())
}

/// Scan the concatenated container logs for errors and connection failures
fn check_logs(snapshot: &ResourceSnapshot, findings: &mut Vec<Finding>) -> Result<(), FindingError> {
    let resource = &snapshot.resource;
    let combined = snapshot.logs.join("\n");
    let lower = combined.to_lowercase();

    if lower.contains("exception") || lower.contains("error") {
        let snippet = extract_error_snippet(&combined);
        findings.push(
            Finding::builder(Severity::Warning, "Errors detected in logs", resource)
                .description(format!(
                    "The pod logs contain errors or exceptions: {}",
                    snippet
                ))
                .steps([
                    "Review application logs for detailed error information",
                    "Check application configuration",
                    "Verify external dependencies are available",
                ])
                .command(pod_logs(snapshot))
                .build()?,
        );
    }

    if CONNECTION_PATTERNS.iter().any(|p| lower.contains(p)) {
        findings.push(
            Finding::builder(Severity::Warning, "Connection issues detected", resource)
                .description("The logs show connection problems to other services")
                .steps([
                    "Verify the service endpoints are correct",
                    "Check network policies allow the connection",
                    "Ensure the target service is running",
                ])
                .commands([
                    format!("kubectl get svc -n {}", resource.namespace),
                    format!("kubectl get endpoints -n {}", resource.namespace),
                    format!("kubectl get networkpolicies -n {}", resource.namespace),
                ])
                .build()?,
        );
    }

    Ok(())
}

/// Inspect the pod phase and, for pending pods, its scheduling conditions
fn check_pod_status(
    snapshot: &ResourceSnapshot,
    status: &PodStatus,
    findings: &mut Vec<Finding>,
) -> Result<(), FindingError> {
    let resource = &snapshot.resource;
    let Some(phase) = status.phase.as_deref() else {
        return Ok(());
    };

    match phase {
        "Pending" => {
            for condition in status
                .conditions
                .iter()
                .filter(|c| c.is_false("PodScheduled"))
            {
                let message = condition.message.as_deref().unwrap_or_default();
                let mut finding = Finding::builder(Severity::Error, "Pod scheduling issues", resource)
                    .description(format!(
                        "The pod is in a Pending state and cannot be scheduled: {}",
                        message
                    ))
                    .steps([
                        "Check cluster resource capacity",
                        "Check node taints and affinities",
                        "Check resource requests and limits",
                    ]);

                if condition
                    .reason
                    .as_deref()
                    .is_some_and(|r| r.contains("Insufficient"))
                {
                    finding = finding.commands([
                        "kubectl get nodes",
                        "kubectl describe nodes <node-name>",
                        "kubectl top nodes",
                    ]);
                }

                findings.push(finding.build()?);
            }
        }
        "Failed" => {
            findings.push(
                Finding::builder(Severity::Error, "Pod failed", resource)
                    .description("The pod is in a Failed state")
                    .steps([
                        "Check pod logs for errors",
                        "Check pod events for issues",
                        "Check if containers are configured correctly",
                    ])
                    .command(pod_logs(snapshot))
                    .command(describe_pod(snapshot))
                    .build()?,
            );
        }
        _ => {}
    }

    Ok(())
}

/// Extract a short, line-aware excerpt around the first error or exception
///
/// The window starts up to 50 characters before the earliest match and ends
/// 100 characters after it. The look-back is clamped to the start of the
/// matching line, so text from earlier lines is never included even when it
/// falls within those 50 characters.
/// Windows longer than three lines keep the first two lines, an ellipsis
/// and the last line. Returns an empty string when nothing matches.
pub fn extract_error_snippet(logs: &str) -> String {
    // ASCII lowercasing keeps byte offsets aligned with `logs`
    let lower = logs.to_ascii_lowercase();
    let index = match (lower.find("error"), lower.find("exception")) {
        (Some(e), Some(x)) => e.min(x),
        (Some(i), None) | (None, Some(i)) => i,
        (None, None) => return String::new(),
    };

    let line_start = logs[..index].rfind('\n').map_or(0, |i| i + 1);
    let mut start = index.saturating_sub(SNIPPET_BEFORE).max(line_start);
    while !logs.is_char_boundary(start) {
        start -= 1;
    }
    let mut end = (index + SNIPPET_AFTER).min(logs.len());
    while !logs.is_char_boundary(end) {
        end += 1;
    }

    let lines: Vec<&str> = logs[start..end].split('\n').collect();
    if lines.len() > SNIPPET_MAX_LINES {
        [lines[0], lines[1], SNIPPET_ELLIPSIS, lines[lines.len() - 1]].join("\n")
    } else {
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snippet_empty_without_match() {
        assert_eq!(extract_error_snippet("all good\nstill good"), "");
    }

    #[test]
    fn test_snippet_skips_unrelated_leading_lines() {
        let snippet = extract_error_snippet("INFO startup\nERROR cannot open file\nretrying\ndone");
        assert!(snippet.contains("ERROR cannot open file"));
        assert!(!snippet.contains("INFO startup"));
    }

    #[test]
    fn test_snippet_keeps_same_line_context() {
        let logs = format!("{}Exception in thread main", "x".repeat(80));
        let snippet = extract_error_snippet(&logs);
        assert!(snippet.starts_with(&"x".repeat(50)));
        assert!(snippet.ends_with("Exception in thread main"));
    }

    #[test]
    fn test_snippet_collapses_long_windows() {
        let logs = "error: boom\na\nb\nc\nd\ne";
        assert_eq!(extract_error_snippet(logs), "error: boom\na\n...\ne");
    }

    #[test]
    fn test_snippet_picks_earliest_match() {
        let logs = "NullPointerException raised\nlater error";
        assert!(extract_error_snippet(logs).starts_with("NullPointerException"));
    }

    #[test]
    fn test_snippet_respects_char_boundaries() {
        let logs = format!("{}error ✗✗✗", "é".repeat(40));
        let snippet = extract_error_snippet(&logs);
        assert!(snippet.contains("error"));
    }
}
