//! Output formatting utilities

use anyhow::Result;
use clap::ValueEnum;
use colored::Colorize;
use med_lib::{DiagnosticReport, Finding, RemediationPlan, Severity};
use serde::Serialize;
use std::fmt::Write;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text (default)
    #[default]
    Text,
    /// JSON format
    Json,
    /// YAML format
    Yaml,
}

impl OutputFormat {
    /// Resolve the effective format: explicit flag first, then the configured name
    pub fn resolve(flag: Option<OutputFormat>, configured: &str) -> Self {
        flag.or_else(|| OutputFormat::from_str(configured, true).ok())
            .unwrap_or_default()
    }
}

/// Print a value as JSON or YAML
pub fn print_structured<T: Serialize>(value: &T, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(value)?),
        OutputFormat::Json | OutputFormat::Text => {
            println!("{}", serde_json::to_string_pretty(value)?)
        }
    }
    Ok(())
}

/// Print a table from a list of items
pub fn print_table<T: Tabled + Serialize>(items: &[T], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            if items.is_empty() {
                println!("{}", "No items found".yellow());
                return Ok(());
            }
            let table = Table::new(items).with(Style::rounded()).to_string();
            println!("{}", table);
            Ok(())
        }
        OutputFormat::Json | OutputFormat::Yaml => print_structured(&items, format),
    }
}

/// Print a diagnostic report in the requested format
pub fn print_report(report: &DiagnosticReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            print!("{}", render_report(report));
            Ok(())
        }
        _ => print_structured(report, format),
    }
}

/// Print a warning message
pub fn print_warning(message: &str) {
    eprintln!("{} {}", "⚠".yellow().bold(), message);
}

/// Color a severity label
pub fn color_severity(severity: Severity) -> String {
    let label = severity.as_str().to_uppercase();
    match severity {
        Severity::Error => label.red().bold().to_string(),
        Severity::Warning => label.yellow().bold().to_string(),
        Severity::Info => label.blue().bold().to_string(),
    }
}

/// Render a report as human-readable text
pub fn render_report(report: &DiagnosticReport) -> String {
    let mut out = String::new();

    if !report.query.is_empty() {
        let _ = writeln!(out, "{} {}", "Query:".bold(), report.query);
    }
    let _ = writeln!(out, "{} {}", "Analyzers:".bold(), report.analyzers.join(", "));
    let _ = writeln!(out, "{}", "=".repeat(60));

    if report.findings.is_empty() {
        let _ = writeln!(out, "{} No issues found", "✓".green().bold());
    } else {
        let _ = writeln!(
            out,
            "{} ({} errors, {} warnings, {} info)",
            "Findings".bold(),
            report.count(Severity::Error),
            report.count(Severity::Warning),
            report.count(Severity::Info)
        );
        for finding in &report.findings {
            render_finding(&mut out, finding);
        }
    }

    if !report.failures.is_empty() {
        let _ = writeln!(out, "\n{}", "Analyzer failures".red().bold());
        for failure in &report.failures {
            let _ = writeln!(out, "  {}: {}", failure.analyzer, failure.error);
        }
    }

    if let Some(plan) = &report.plan {
        render_plan(&mut out, plan);
    }

    out
}

fn render_finding(out: &mut String, finding: &Finding) {
    let _ = writeln!(
        out,
        "\n[{}] {} ({})",
        color_severity(finding.severity),
        finding.title.bold(),
        finding.resource.to_string().cyan()
    );
    if !finding.description.is_empty() {
        for line in finding.description.lines() {
            let _ = writeln!(out, "    {}", line);
        }
    }
}

fn render_plan(out: &mut String, plan: &RemediationPlan) {
    let _ = writeln!(out, "\n{}", plan.title.bold());
    let _ = writeln!(out, "{}", "=".repeat(60));
    let _ = writeln!(out, "{}", plan.description);

    for step in &plan.steps {
        let _ = writeln!(out, "{}", step);
    }

    if !plan.commands.is_empty() {
        let _ = writeln!(out, "\n{}", "Commands".bold());
        for command in &plan.commands {
            let _ = writeln!(out, "  # {} [{}]", command.description, command.command_type);
            let _ = writeln!(out, "  {}", command.command.green());
        }
    }
}
