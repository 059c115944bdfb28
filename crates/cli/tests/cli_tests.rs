//! CLI integration tests

use std::path::PathBuf;
use std::process::{Command, Output};

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// Run the binary with an isolated home directory and a clean K8SMED environment
fn run(args: &[&str], env: &[(&str, &str)]) -> Output {
    let home = tempfile::tempdir().expect("Failed to create temp home");
    let mut command = Command::new(env!("CARGO_BIN_EXE_kubectl-k8smed"));
    command
        .args(args)
        .env("HOME", home.path())
        .env("NO_COLOR", "1")
        .env_remove("OPENAI_API_KEY")
        .env_remove("RUST_LOG");
    for key in [
        "K8SMED_AI_PROVIDER",
        "K8SMED_AI_MODEL",
        "K8SMED_AI_ENDPOINT",
        "K8SMED_ANONYMIZE_DEFAULT",
        "K8SMED_OUTPUT_FORMAT",
        "K8SMED_KUBECONFIG",
        "K8SMED_LOG_FORMAT",
    ] {
        command.env_remove(key);
    }
    command.envs(env.iter().copied());
    command.output().expect("Failed to execute command")
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let output = run(&["--help"], &[]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(stdout.contains("Kubernetes first responder"), "Should show about text");
    for command in ["diagnose", "analyze", "analyzers", "config", "version"] {
        assert!(stdout.contains(command), "Should show {} command", command);
    }
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let output = run(&["--version"], &[]);
    assert!(output.status.success(), "CLI version should succeed");
    assert!(String::from_utf8_lossy(&output.stdout).contains("kubectl-k8smed"));

    let output = run(&["version"], &[]);
    assert!(output.status.success(), "version command should succeed");
    assert_eq!(
        String::from_utf8_lossy(&output.stdout).trim(),
        format!("K8sMed v{}", env!("CARGO_PKG_VERSION"))
    );
}

/// Test diagnose subcommand help
#[test]
fn test_diagnose_help() {
    let output = run(&["diagnose", "--help"], &[]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Diagnose help should succeed");
    for flag in ["--namespace", "--pod", "--selector", "--deployment", "--snapshot", "--parallel"] {
        assert!(stdout.contains(flag), "Should show {} option", flag);
    }
}

/// Test that diagnose requires a target
#[test]
fn test_diagnose_requires_target() {
    let output = run(&["diagnose", "why", "is", "it", "broken"], &[]);
    assert!(!output.status.success(), "Diagnose without a target should fail");
}

/// Test diagnose over a JSON snapshot file
#[test]
fn test_diagnose_snapshot_json_output() {
    let path = fixture("crashloop-pod.json");
    let output = run(
        &["diagnose", "checkout", "keeps", "restarting", "--snapshot", path.to_str().unwrap(), "-o", "json"],
        &[],
    );
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).expect("valid JSON report");
    assert_eq!(report["query"], "checkout keeps restarting");
    assert_eq!(report["findings"][0]["title"], "Container in CrashLoopBackOff");
    assert_eq!(report["findings"][0]["severity"], "error");
    assert_eq!(report["findings"][1]["title"], "Errors detected in logs");
    assert_eq!(report["plan"]["steps"][0], "Fix critical issues:");
    assert_eq!(
        report["plan"]["commands"][0]["command"],
        "kubectl logs checkout-5c7d8 -c checkout -n shop"
    );
}

/// Test diagnose over a YAML snapshot list with text output
#[test]
fn test_diagnose_snapshot_text_output() {
    let path = fixture("stalled-deployment.yaml");
    let output = run(&["diagnose", "--snapshot", path.to_str().unwrap()], &[]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert!(stdout.contains("[ERROR] Deployment rollout stalled (Deployment/checkout)"));
    assert!(stdout.contains("Pod scheduling issues"));
    assert!(stdout.contains("Remediation Plan"));
    assert!(stdout.contains("kubectl rollout restart deployment checkout -n shop"));
    assert!(stdout.contains("kubectl top nodes"));
}

/// Test that the configured output format applies when no flag is given
#[test]
fn test_diagnose_uses_configured_format() {
    let path = fixture("crashloop-pod.json");
    let output = run(
        &["diagnose", "--snapshot", path.to_str().unwrap()],
        &[("K8SMED_OUTPUT_FORMAT", "yaml")],
    );
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("title: Container in CrashLoopBackOff"));
}

/// Test analyzers listing
#[test]
fn test_analyzers_json() {
    let output = run(&["analyzers", "-o", "json"], &[]);
    assert!(output.status.success());

    let rows: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(rows[0]["name"], "PodAnalyzer");
    assert_eq!(rows[1]["name"], "DeploymentAnalyzer");
}

/// Test effective configuration output
#[test]
fn test_config_output() {
    let output = run(&["config"], &[("K8SMED_AI_MODEL", "gpt-4")]);
    assert!(output.status.success());

    let config: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(config["aiProvider"], "openai");
    assert_eq!(config["aiModel"], "gpt-4");
    assert_eq!(config["outputFormat"], "text");
}

/// Test that analyze reports a missing OpenAI key
#[test]
fn test_analyze_requires_api_key() {
    let output = run(&["analyze", "why", "is", "my", "pod", "pending"], &[]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success());
    assert!(stderr.contains("OPENAI_API_KEY"), "stderr: {}", stderr);
}

/// Test analyze against a local OpenAI-compatible server
#[test]
fn test_analyze_with_localai() {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("POST", "/v1/chat/completions")
        .match_body(mockito::Matcher::Regex("\\[NAMESPACE_NAME\\]".to_string()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"model": "llama3", "usage": {"total_tokens": 64},
                "choices": [{"message": {"role": "assistant", "content": "Check resource quotas."}, "finish_reason": "stop"}]}"#,
        )
        .create();
    let endpoint = format!("{}/v1/chat/completions", server.url());

    let output = run(
        &["analyze", "pods", "in", "namespace", "payments", "are", "pending", "--anonymize", "--explain"],
        &[("K8SMED_AI_PROVIDER", "localai"), ("K8SMED_AI_ENDPOINT", &endpoint)],
    );
    let stdout = String::from_utf8_lossy(&output.stdout);

    mock.assert();
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert!(stdout.contains("Check resource quotas."));
    assert!(stdout.contains("Model: llama3"));
    assert!(stdout.contains("Tokens used: 64"));
}
