//! Error types for the diagnostic core
//!
//! Nothing in this crate is fatal to a diagnostic run: analyzer errors are
//! recorded per analyzer and template errors only drop a single command.

use thiserror::Error;

/// A status value that could not be interpreted
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StatusError {
    #[error("status key `{key}` has non-numeric value `{value}`")]
    InvalidNumber { key: String, value: String },
}

/// Failure of a single analyzer pass
#[derive(Debug, Clone, Error)]
pub enum AnalyzerError {
    /// The resource's status map could not be interpreted
    #[error("malformed status on {resource}: {source}")]
    MalformedStatus {
        resource: String,
        #[source]
        source: StatusError,
    },

    /// The analyzer panicked while running on a worker thread
    #[error("analyzer panicked: {0}")]
    Panicked(String),

    /// A finding could not be constructed
    #[error(transparent)]
    InvalidFinding(#[from] FindingError),

    /// Any other analyzer-specific failure
    #[error("{0}")]
    Other(String),
}

/// Invalid finding construction
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FindingError {
    #[error("finding title must not be empty")]
    EmptyTitle,
}

/// Failure to turn a template reference into a runnable command
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("unknown remediation template `{0}`")]
    Unknown(String),

    #[error("no collected resource matches {0}")]
    NoMatchingResource(String),

    #[error("template `{template}` applies to {expected}, not {actual}")]
    KindMismatch {
        template: &'static str,
        expected: &'static str,
        actual: String,
    },

    #[error("template `{template}` requires parameter `{parameter}`")]
    MissingParameter {
        template: &'static str,
        parameter: &'static str,
    },

    #[error("template `{template}` parameter `{parameter}` has invalid value `{value}`")]
    InvalidParameter {
        template: &'static str,
        parameter: &'static str,
        value: String,
    },
}
