//! Diagnostic core for Kubernetes first response
//!
//! This crate turns collected resource snapshots into:
//! - Structured findings from independent rule engines (analyzers)
//! - A prioritized remediation plan with runnable commands
//!
//! It also carries the text anonymizer applied to free-text queries before
//! they leave the process. Nothing in this crate performs I/O.

pub mod analyzer;
pub mod anonymizer;
pub mod engine;
pub mod error;
pub mod finding;
pub mod models;
pub mod observability;
pub mod remediation;
pub mod status;

pub use analyzer::{Analyzer, AnalyzerRegistry, DeploymentAnalyzer, PodAnalyzer};
pub use anonymizer::Anonymizer;
pub use engine::{AnalyzerFailure, DiagnosticEngine, DiagnosticReport};
pub use error::{AnalyzerError, FindingError, StatusError, TemplateError};
pub use finding::{
    DiagnosticContext, DiagnosticInput, Finding, RemediationCommand, Severity, TemplateRef,
};
pub use models::*;
pub use observability::{DiagnosticMetrics, StructuredLogger};
pub use remediation::{Command, CommandTemplate, CommandType, RemediationPlan, RemediationSynthesizer};
