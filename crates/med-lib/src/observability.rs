//! Observability for diagnostic runs
//!
//! Provides:
//! - Prometheus metrics (analyzer latency, findings by severity, failures,
//!   skipped templates, generated plans)
//! - Structured logging with tracing

use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, Encoder,
    HistogramVec, IntCounter, IntCounterVec, TextEncoder,
};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

use crate::finding::Severity;

/// Histogram buckets for analyzer latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[0.00001, 0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<DiagnosticMetricsInner> = OnceLock::new();

struct DiagnosticMetricsInner {
    analyzer_latency_seconds: HistogramVec,
    findings_total: IntCounterVec,
    analyzer_failures_total: IntCounterVec,
    template_skips_total: IntCounter,
    plans_generated_total: IntCounter,
}

impl DiagnosticMetricsInner {
    fn new() -> Self {
        Self {
            analyzer_latency_seconds: register_histogram_vec!(
                "k8smed_analyzer_latency_seconds",
                "Time spent running a single analyzer",
                &["analyzer"],
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register analyzer_latency_seconds"),

            findings_total: register_int_counter_vec!(
                "k8smed_findings_total",
                "Findings reported by analyzers",
                &["severity"]
            )
            .expect("Failed to register findings_total"),

            analyzer_failures_total: register_int_counter_vec!(
                "k8smed_analyzer_failures_total",
                "Analyzer passes that returned an error",
                &["analyzer"]
            )
            .expect("Failed to register analyzer_failures_total"),

            template_skips_total: register_int_counter!(
                "k8smed_template_skips_total",
                "Remediation template references that could not be rendered"
            )
            .expect("Failed to register template_skips_total"),

            plans_generated_total: register_int_counter!(
                "k8smed_plans_generated_total",
                "Remediation plans generated"
            )
            .expect("Failed to register plans_generated_total"),
        }
    }
}

/// Handle to the process-wide diagnostic metrics
///
/// Clones share the same underlying metrics.
#[derive(Clone)]
pub struct DiagnosticMetrics {
    _private: (),
}

impl Default for DiagnosticMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DiagnosticMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DiagnosticMetrics")
    }
}

impl DiagnosticMetrics {
    /// Create a metrics handle (registers global metrics on first call)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(DiagnosticMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &DiagnosticMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    pub fn observe_analyzer_latency(&self, analyzer: &str, duration_secs: f64) {
        self.inner()
            .analyzer_latency_seconds
            .with_label_values(&[analyzer])
            .observe(duration_secs);
    }

    pub fn inc_findings(&self, severity: Severity, count: u64) {
        self.inner()
            .findings_total
            .with_label_values(&[severity.as_str()])
            .inc_by(count);
    }

    pub fn inc_analyzer_failures(&self, analyzer: &str) {
        self.inner()
            .analyzer_failures_total
            .with_label_values(&[analyzer])
            .inc();
    }

    pub fn inc_template_skips(&self) {
        self.inner().template_skips_total.inc();
    }

    pub fn inc_plans_generated(&self) {
        self.inner().plans_generated_total.inc();
    }

    /// Render all registered metrics in the Prometheus text format
    pub fn gather_text(&self) -> String {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if encoder.encode(&prometheus::gather(), &mut buffer).is_err() {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

/// Structured logger for diagnostic events
///
/// Every event carries the `run` label so interleaved runs can be told apart.
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    run: String,
}

impl Default for StructuredLogger {
    fn default() -> Self {
        Self::new("k8smed")
    }
}

impl StructuredLogger {
    pub fn new(run: impl Into<String>) -> Self {
        Self { run: run.into() }
    }

    pub fn run(&self) -> &str {
        &self.run
    }

    pub fn log_run_started(&self, analyzers: usize, snapshots: usize) {
        info!(
            event = "diagnosis_started",
            run = %self.run,
            analyzers = analyzers,
            snapshots = snapshots,
            "Starting diagnostic run"
        );
    }

    pub fn log_analyzer_completed(&self, analyzer: &str, findings: usize, duration_secs: f64) {
        debug!(
            event = "analyzer_completed",
            run = %self.run,
            analyzer = %analyzer,
            findings = findings,
            duration_secs = duration_secs,
            "Analyzer completed"
        );
    }

    pub fn log_analyzer_failed(&self, analyzer: &str, kept_findings: usize, error: &str) {
        warn!(
            event = "analyzer_failed",
            run = %self.run,
            analyzer = %analyzer,
            kept_findings = kept_findings,
            error = %error,
            "Analyzer failed, continuing with remaining analyzers"
        );
    }

    pub fn log_run_completed(&self, findings: usize, failures: usize) {
        info!(
            event = "diagnosis_completed",
            run = %self.run,
            findings = findings,
            failures = failures,
            "Diagnostic run completed"
        );
    }

    pub fn log_template_skipped(&self, template: &str, resource: &str, reason: &str) {
        warn!(
            event = "template_skipped",
            run = %self.run,
            template = %template,
            resource = %resource,
            reason = %reason,
            "Skipping remediation template"
        );
    }

    pub fn log_plan_generated(&self, steps: usize, commands: usize) {
        info!(
            event = "plan_generated",
            run = %self.run,
            steps = steps,
            commands = commands,
            "Generated remediation plan"
        );
    }
}
