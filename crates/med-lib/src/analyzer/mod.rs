//! Analyzers and the registry that holds them
//!
//! An analyzer inspects the read-only inputs of a diagnostic run and
//! reports findings. Analyzers never see each other's findings, so any set
//! of them can run over the same inputs in any order or in parallel.

mod deployment;
mod pod;


pub use deployment::DeploymentAnalyzer;
pub use pod::{extract_error_snippet, PodAnalyzer};

use std::sync::Arc;

use crate::error::AnalyzerError;
use crate::finding::{DiagnosticContext, DiagnosticInput, Finding};

/// A named rule engine over collected resources
pub trait Analyzer: Send + Sync {
    /// Stable name used as the registry key
    fn name(&self) -> &str;

    /// Human readable description
    fn description(&self) -> &str;

    /// Inspect `input` and push findings onto `findings`
    ///
    /// Findings pushed before an error is returned are kept by the caller.
    fn analyze(&self, input: &DiagnosticInput, findings: &mut Vec<Finding>)
        -> Result<(), AnalyzerError>;

    /// Run this analyzer directly against a context, appending its findings
    fn analyze_context(&self, ctx: &mut DiagnosticContext) -> Result<(), AnalyzerError> {
        let mut staged = Vec::new();
        let result = self.analyze(ctx.input(), &mut staged);
        ctx.extend_findings(staged);
        result
    }
}

/// Registry of analyzers keyed by name, iterated in registration order
#[derive(Clone, Default)]
pub struct AnalyzerRegistry {
    analyzers: Vec<Arc<dyn Analyzer>>,
}

impl AnalyzerRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in pod and deployment analyzers
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(PodAnalyzer);
        registry.register(DeploymentAnalyzer);
        registry
    }

    /// Register an analyzer, replacing any analyzer with the same name in place
    pub fn register<A: Analyzer + 'static>(&mut self, analyzer: A) {
        self.register_shared(Arc::new(analyzer));
    }

    pub fn register_shared(&mut self, analyzer: Arc<dyn Analyzer>) {
        match self
            .analyzers
            .iter_mut()
            .find(|existing| existing.name() == analyzer.name())
        {
            Some(slot) => *slot = analyzer,
            None => self.analyzers.push(analyzer),
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Analyzer>> {
        self.analyzers.iter().find(|a| a.name() == name).cloned()
    }

    /// All analyzers in registration order
    pub fn all(&self) -> &[Arc<dyn Analyzer>] {
        &self.analyzers
    }

    pub fn names(&self) -> Vec<&str> {
        self.analyzers.iter().map(|a| a.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.analyzers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.analyzers.is_empty()
    }
}

impl std::fmt::Debug for AnalyzerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalyzerRegistry")
            .field("analyzers", &self.names())
            .finish()
    }
}
