//! Diagnostic findings and the per-run context that accumulates them

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use url::form_urlencoded;

use crate::error::FindingError;
use crate::models::{ResourceRef, ResourceSnapshot};

/// Marker distinguishing template references from literal commands
pub const TEMPLATE_MARKER: &str = "template:";

/// Finding severity, ordered by priority (error first)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl Severity {
    /// All severities in priority order
    pub const ALL: [Severity; 3] = [Severity::Error, Severity::Warning, Severity::Info];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to a named remediation template plus its parameters
///
/// Written as `template:<id>` or `template:<id>?key=value&key=value`, with
/// keys and values form-encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateRef {
    pub id: String,
    pub params: BTreeMap<String, String>,
}

impl TemplateRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    fn parse(reference: &str) -> Self {
        let (id, query) = reference.split_once('?').unwrap_or((reference, ""));
        Self {
            id: id.trim().to_string(),
            params: form_urlencoded::parse(query.as_bytes()).into_owned().collect(),
        }
    }
}

impl std::fmt::Display for TemplateRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", TEMPLATE_MARKER, self.id)?;
        if !self.params.is_empty() {
            let query = form_urlencoded::Serializer::new(String::new())
                .extend_pairs(&self.params)
                .finish();
            write!(f, "?{}", query)?;
        }
        Ok(())
    }
}

/// One remediation command attached to a finding
///
/// Serialized as a plain string so findings stay readable in JSON/YAML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RemediationCommand {
    /// A literal shell/CLI invocation or manifest snippet
    Literal(String),
    /// A reference to a typed remediation template
    Template(TemplateRef),
}

impl RemediationCommand {
    pub fn parse(command: &str) -> Self {
        match command.strip_prefix(TEMPLATE_MARKER) {
            Some(reference) => RemediationCommand::Template(TemplateRef::parse(reference)),
            None => RemediationCommand::Literal(command.to_string()),
        }
    }
}

impl From<String> for RemediationCommand {
    fn from(command: String) -> Self {
        RemediationCommand::parse(&command)
    }
}

impl From<&str> for RemediationCommand {
    fn from(command: &str) -> Self {
        RemediationCommand::parse(command)
    }
}

impl From<TemplateRef> for RemediationCommand {
    fn from(template: TemplateRef) -> Self {
        RemediationCommand::Template(template)
    }
}

impl From<RemediationCommand> for String {
    fn from(command: RemediationCommand) -> Self {
        match command {
            RemediationCommand::Literal(text) => text,
            RemediationCommand::Template(template) => template.to_string(),
        }
    }
}

/// One diagnostic observation tied to a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub resource: ResourceRef,
    #[serde(default)]
    pub remediation: Vec<String>,
    #[serde(default)]
    pub commands: Vec<RemediationCommand>,
}

impl Finding {
    pub fn builder(
        severity: Severity,
        title: impl Into<String>,
        resource: &ResourceRef,
    ) -> FindingBuilder {
        FindingBuilder {
            severity,
            title: title.into(),
            description: String::new(),
            resource: resource.clone(),
            remediation: Vec::new(),
            commands: Vec::new(),
        }
    }
}

/// Builder for [`Finding`]
#[derive(Debug, Clone)]
pub struct FindingBuilder {
    severity: Severity,
    title: String,
    description: String,
    resource: ResourceRef,
    remediation: Vec<String>,
    commands: Vec<RemediationCommand>,
}

impl FindingBuilder {
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn steps<I, S>(mut self, steps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.remediation.extend(steps.into_iter().map(Into::into));
        self
    }

    pub fn command(mut self, command: impl Into<RemediationCommand>) -> Self {
        self.commands.push(command.into());
        self
    }

    pub fn commands<I, C>(mut self, commands: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<RemediationCommand>,
    {
        self.commands.extend(commands.into_iter().map(Into::into));
        self
    }

    pub fn build(self) -> Result<Finding, FindingError> {
        if self.title.trim().is_empty() {
            return Err(FindingError::EmptyTitle);
        }
        Ok(Finding {
            severity: self.severity,
            title: self.title,
            description: self.description,
            resource: self.resource,
            remediation: self.remediation,
            commands: self.commands,
        })
    }
}

/// Read-only inputs of a diagnostic run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiagnosticInput {
    pub query: String,
    pub snapshots: Vec<ResourceSnapshot>,
}

impl DiagnosticInput {
    /// Snapshots of the given resource kind, in input order
    pub fn snapshots_of_kind<'a>(
        &'a self,
        kind: &'a str,
    ) -> impl Iterator<Item = &'a ResourceSnapshot> + 'a {
        self.snapshots.iter().filter(move |s| s.is_kind(kind))
    }
}

/// State of one diagnostic invocation
///
/// Findings can only be appended; their order is the order analyzers
/// reported them in.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticContext {
    input: DiagnosticInput,
    findings: Vec<Finding>,
}

impl DiagnosticContext {
    pub fn new(query: impl Into<String>, snapshots: Vec<ResourceSnapshot>) -> Self {
        Self {
            input: DiagnosticInput {
                query: query.into(),
                snapshots,
            },
            findings: Vec::new(),
        }
    }

    pub fn input(&self) -> &DiagnosticInput {
        &self.input
    }

    pub fn query(&self) -> &str {
        &self.input.query
    }

    pub fn snapshots(&self) -> &[ResourceSnapshot] {
        &self.input.snapshots
    }

    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    pub fn add_finding(&mut self, finding: Finding) {
        self.findings.push(finding);
    }

    pub(crate) fn extend_findings(&mut self, findings: impl IntoIterator<Item = Finding>) {
        self.findings.extend(findings);
    }

    pub fn into_parts(self) -> (DiagnosticInput, Vec<Finding>) {
        (self.input, self.findings)
    }
}
