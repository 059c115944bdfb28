//! Registered analyzer listing

use anyhow::Result;
use med_lib::AnalyzerRegistry;
use serde::Serialize;
use tabled::Tabled;

use crate::output::{print_table, OutputFormat};

/// Row for the analyzers table
#[derive(Debug, Tabled, Serialize)]
pub struct AnalyzerRow {
    #[tabled(rename = "Name")]
    pub name: String,
    #[tabled(rename = "Description")]
    pub description: String,
}

pub fn analyzer_rows(registry: &AnalyzerRegistry) -> Vec<AnalyzerRow> {
    registry
        .all()
        .iter()
        .map(|analyzer| AnalyzerRow {
            name: analyzer.name().to_string(),
            description: analyzer.description().to_string(),
        })
        .collect()
}

/// List the analyzers a diagnose run executes, in execution order
pub fn list_analyzers(format: OutputFormat) -> Result<()> {
    print_table(&analyzer_rows(&AnalyzerRegistry::with_defaults()), format)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_follow_registration_order() {
        let rows = analyzer_rows(&AnalyzerRegistry::with_defaults());
        let names: Vec<_> = rows.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["PodAnalyzer", "DeploymentAnalyzer"]);
        assert!(rows.iter().all(|r| !r.description.is_empty()));
    }
}
