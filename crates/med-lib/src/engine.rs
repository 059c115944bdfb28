//! Diagnostic engine
//!
//! Drives every registered analyzer over one diagnostic context. Each
//! analyzer writes into its own staging list; staging lists are merged into
//! the context in registration order, so output is identical whether the
//! analyzers ran sequentially or on worker threads.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use crate::analyzer::{Analyzer, AnalyzerRegistry};
use crate::error::AnalyzerError;
use crate::finding::{DiagnosticContext, DiagnosticInput, Finding, Severity};
use crate::models::ResourceSnapshot;
use crate::observability::{DiagnosticMetrics, StructuredLogger};
use crate::remediation::{RemediationPlan, RemediationSynthesizer};

/// An analyzer that did not complete its pass
#[derive(Debug, Clone, Serialize)]
pub struct AnalyzerFailure {
    pub analyzer: String,
    #[serde(serialize_with = "serialize_display")]
    pub error: AnalyzerError,
}

/// Everything one diagnostic run produced
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticReport {
    pub query: String,
    pub started_at: DateTime<Utc>,
    pub analyzers: Vec<String>,
    pub findings: Vec<Finding>,
    pub failures: Vec<AnalyzerFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<RemediationPlan>,
}

impl DiagnosticReport {
    pub fn count(&self, severity: Severity) -> usize {
        self.findings.iter().filter(|f| f.severity == severity).count()
    }
}

/// Runs a registry of analyzers and synthesizes the remediation plan
#[derive(Debug, Clone)]
pub struct DiagnosticEngine {
    registry: AnalyzerRegistry,
    parallel: bool,
    logger: StructuredLogger,
    metrics: Option<DiagnosticMetrics>,
}

impl Default for DiagnosticEngine {
    fn default() -> Self {
        Self::new(AnalyzerRegistry::with_defaults())
    }
}

struct AnalyzerOutcome {
    staged: Vec<Finding>,
    result: Result<(), AnalyzerError>,
    elapsed_secs: f64,
}

impl DiagnosticEngine {
    pub fn new(registry: AnalyzerRegistry) -> Self {
        Self {
            registry,
            parallel: false,
            logger: StructuredLogger::default(),
            metrics: None,
        }
    }

    /// Run analyzers on scoped worker threads, one per analyzer
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_metrics(mut self, metrics: DiagnosticMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn registry(&self) -> &AnalyzerRegistry {
        &self.registry
    }

    /// Run every analyzer over `ctx`, appending findings in registration order
    ///
    /// Returns the analyzers that failed. Findings an analyzer staged before
    /// failing are kept.
    pub fn run(&self, ctx: &mut DiagnosticContext) -> Vec<AnalyzerFailure> {
        let analyzers = self.registry.all();
        self.logger
            .log_run_started(analyzers.len(), ctx.snapshots().len());

        let outcomes: Vec<AnalyzerOutcome> = if self.parallel {
            let input = ctx.input();
            std::thread::scope(|scope| {
                let handles: Vec<_> = analyzers
                    .iter()
                    .map(|analyzer| scope.spawn(move || run_analyzer(analyzer.as_ref(), input)))
                    .collect();
                handles
                    .into_iter()
                    .map(|handle| handle.join().unwrap_or_else(AnalyzerOutcome::panicked))
                    .collect()
            })
        } else {
            analyzers
                .iter()
                .map(|analyzer| run_analyzer(analyzer.as_ref(), ctx.input()))
                .collect()
        };

        let mut failures = Vec::new();
        for (analyzer, outcome) in analyzers.iter().zip(outcomes) {
            let name = analyzer.name();
            let staged = outcome.staged.len();
            if let Some(metrics) = &self.metrics {
                metrics.observe_analyzer_latency(name, outcome.elapsed_secs);
                for severity in Severity::ALL {
                    let count = outcome.staged.iter().filter(|f| f.severity == severity).count();
                    if count > 0 {
                        metrics.inc_findings(severity, count as u64);
                    }
                }
            }
            ctx.extend_findings(outcome.staged);

            match outcome.result {
                Ok(()) => self
                    .logger
                    .log_analyzer_completed(name, staged, outcome.elapsed_secs),
                Err(error) => {
                    self.logger
                        .log_analyzer_failed(name, staged, &error.to_string());
                    if let Some(metrics) = &self.metrics {
                        metrics.inc_analyzer_failures(name);
                    }
                    failures.push(AnalyzerFailure {
                        analyzer: name.to_string(),
                        error,
                    });
                }
            }
        }

        self.logger
            .log_run_completed(ctx.findings().len(), failures.len());
        failures
    }

    /// Full pipeline: snapshots to findings to plan
    pub fn diagnose(&self, query: impl Into<String>, snapshots: Vec<ResourceSnapshot>) -> DiagnosticReport {
        let started_at = Utc::now();
        let mut ctx = DiagnosticContext::new(query, snapshots);
        let failures = self.run(&mut ctx);

        let mut synthesizer = RemediationSynthesizer::new().with_logger(self.logger.clone());
        if let Some(metrics) = &self.metrics {
            synthesizer = synthesizer.with_metrics(metrics.clone());
        }
        let plan = synthesizer.synthesize(ctx.findings(), ctx.snapshots());

        let (input, findings) = ctx.into_parts();
        DiagnosticReport {
            query: input.query,
            started_at,
            analyzers: self.registry.names().into_iter().map(String::from).collect(),
            findings,
            failures,
            plan,
        }
    }
}

fn run_analyzer(analyzer: &dyn Analyzer, input: &DiagnosticInput) -> AnalyzerOutcome {
    let started = Instant::now();
    let mut staged = Vec::new();
    let result = catch_unwind(AssertUnwindSafe(|| analyzer.analyze(input, &mut staged)))
        .unwrap_or_else(|payload| Err(AnalyzerError::Panicked(panic_message(payload.as_ref()))));
    AnalyzerOutcome {
        staged,
        result,
        elapsed_secs: started.elapsed().as_secs_f64(),
    }
}

impl AnalyzerOutcome {
    fn panicked(payload: Box<dyn Any + Send>) -> Self {
        Self {
            staged: Vec::new(),
            result: Err(AnalyzerError::Panicked(panic_message(payload.as_ref()))),
            elapsed_secs: 0.0,
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn serialize_display<S: Serializer>(value: &AnalyzerError, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ResourceRef;

    struct Fixed {
        name: &'static str,
        titles: Vec<&'static str>,
        fail: bool,
    }

    impl Analyzer for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        fn description(&self) -> &str {
            "test analyzer"
        }

        fn analyze(
            &self,
            _input: &DiagnosticInput,
            findings: &mut Vec<Finding>,
        ) -> Result<(), AnalyzerError> {
            let resource = ResourceRef::pod("api", "default");
            for title in &self.titles {
                // Stagger completion so thread scheduling differs from registration order
                std::thread::sleep(std::time::Duration::from_millis(
                    (10 - self.titles.len() as u64).min(10),
                ));
                findings.push(Finding::builder(Severity::Warning, *title, &resource).build()?);
            }
            if self.fail {
                return Err(AnalyzerError::Other(format!("{} failed", self.name)));
            }
            Ok(())
        }
    }

    struct Panics;

    impl Analyzer for Panics {
        fn name(&self) -> &str {
            "Panics"
        }

        fn description(&self) -> &str {
            "always panics"
        }

        fn analyze(&self, _: &DiagnosticInput, _: &mut Vec<Finding>) -> Result<(), AnalyzerError> {
            panic!("boom");
        }
    }

    fn registry() -> AnalyzerRegistry {
        let mut registry = AnalyzerRegistry::new();
        registry.register(Fixed {
            name: "slow",
            titles: vec!["a1"],
            fail: false,
        });
        registry.register(Fixed {
            name: "failing",
            titles: vec!["b1", "b2"],
            fail: true,
        });
        registry.register(Fixed {
            name: "fast",
            titles: vec!["c1", "c2", "c3"],
            fail: false,
        });
        registry
    }

    fn titles(ctx: &DiagnosticContext) -> Vec<&str> {
        ctx.findings().iter().map(|f| f.title.as_str()).collect()
    }

    #[test]
    fn test_sequential_run_keeps_registration_order() {
        let engine = DiagnosticEngine::new(registry());
        let mut ctx = DiagnosticContext::new("q", vec![]);
        let failures = engine.run(&mut ctx);

        assert_eq!(titles(&ctx), ["a1", "b1", "b2", "c1", "c2", "c3"]);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].analyzer, "failing");
    }

    #[test]
    fn test_parallel_run_matches_sequential() {
        let mut sequential = DiagnosticContext::new("q", vec![]);
        DiagnosticEngine::new(registry()).run(&mut sequential);

        for _ in 0..5 {
            let mut parallel = DiagnosticContext::new("q", vec![]);
            let failures = DiagnosticEngine::new(registry())
                .parallel(true)
                .run(&mut parallel);
            assert_eq!(titles(&parallel), titles(&sequential));
            assert_eq!(failures.len(), 1);
        }
    }

    #[test]
    fn test_panicking_analyzer_is_recorded() {
        let mut registry = registry();
        registry.register(Panics);

        for parallel in [false, true] {
            let mut ctx = DiagnosticContext::new("q", vec![]);
            let failures = DiagnosticEngine::new(registry.clone())
                .parallel(parallel)
                .run(&mut ctx);

            assert_eq!(ctx.findings().len(), 6);
            let panicked = failures.iter().find(|f| f.analyzer == "Panics").unwrap();
            assert!(matches!(&panicked.error, AnalyzerError::Panicked(msg) if msg == "boom"));
        }
    }

    #[test]
    fn test_failure_serializes_as_message() {
        let failure = AnalyzerFailure {
            analyzer: "failing".to_string(),
            error: AnalyzerError::Other("failing failed".to_string()),
        };
        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json["error"], "failing failed");
    }

    #[test]
    fn test_diagnose_without_findings_has_no_plan() {
        let report = DiagnosticEngine::default().diagnose("anything wrong?", vec![]);
        assert!(report.findings.is_empty());
        assert!(report.plan.is_none());
        assert_eq!(report.analyzers, ["PodAnalyzer", "DeploymentAnalyzer"]);
    }
}
