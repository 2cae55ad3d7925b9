//! Analyze command - Extract files or directories into the code graph

use crate::output::{Output, OutputFormat, TableDisplay, TableOutput};
use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use std::path::Path;
use weave_core::WeaveConfig;
use weave_engine::AnalysisReport;

use super::{database_label, open_engine};

/// Report of one `weave analyze` run
#[derive(Debug, Serialize)]
pub struct AnalyzeResult {
    #[serde(flatten)]
    pub report: AnalysisReport,
    /// Database file, None when persistence is off
    pub database: Option<String>,
    /// False when the graph could not be written to the database
    pub persisted: bool,
}

impl TableDisplay for AnalyzeResult {
    fn to_table(&self) -> String {
        let report = &self.report;
        let mut output = format!(
            "{} {} files analyzed, {} skipped\n",
            "ANALYSIS:".cyan().bold(),
            report.files_analyzed,
            report.files_skipped
        );

        let rows = vec![
            vec!["Nodes created".to_string(), report.nodes_created.to_string()],
            vec!["Nodes updated".to_string(), report.nodes_updated.to_string()],
            vec![
                "Relationships found".to_string(),
                report.relationships_found.to_string(),
            ],
            vec![
                "Patterns identified".to_string(),
                report.patterns_identified.to_string(),
            ],
        ];
        output.push_str(&TableOutput::format_rows(&["Metric", "Value"], rows));
        output.push('\n');

        if !report.errors.is_empty() {
            output.push_str(&format!("\n{}\n", "ERRORS:".yellow().bold()));
            for error in &report.errors {
                output.push_str(&format!("  {} {}\n", "!".yellow(), error));
            }
        }

        match (&self.database, self.persisted) {
            (Some(path), true) => {
                output.push_str(&format!("\n{} {}", "Saved to".dimmed(), path.dimmed()))
            }
            (Some(path), false) => output.push_str(&format!(
                "\n{} {}",
                "Not saved to".red(),
                path.as_str().red()
            )),
            (None, _) => output.push_str(&format!("\n{}", "(persistence disabled)".dimmed())),
        }

        output
    }
}

/// Run the analyze command.
///
/// A persistence failure still prints the analysis report, then fails the
/// command so scripts notice the database is behind.
pub fn run(
    root: &Path,
    mut config: WeaveConfig,
    paths: &[String],
    no_persist: bool,
    format: OutputFormat,
) -> Result<()> {
    if no_persist {
        config.storage.persist = false;
    }
    let database = database_label(&config, root);
    let mut engine = open_engine(config, root)?;

    let (report, failure) = match engine.analyze_files(paths) {
        Ok(report) => (report, None),
        Err(err) => match err.report() {
            Some(report) => (report.clone(), Some(err)),
            None => return Err(err.into()),
        },
    };

    let result = AnalyzeResult {
        report,
        database,
        persisted: failure.is_none(),
    };
    Output::new(result, format).render()?;

    match failure {
        Some(err) => Err(anyhow::Error::new(err).context("Analysis results were not saved")),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(persisted: bool) -> AnalyzeResult {
        AnalyzeResult {
            report: AnalysisReport {
                files_analyzed: 3,
                files_skipped: 1,
                nodes_created: 12,
                errors: vec!["Broken.cs: unreadable".to_string()],
                ..Default::default()
            },
            database: Some(".weave/graph.duckdb".to_string()),
            persisted,
        }
    }

    #[test]
    fn test_table_lists_errors() {
        colored::control::set_override(false);
        let table = result(true).to_table();
        assert!(table.starts_with("ANALYSIS: 3 files analyzed, 1 skipped"));
        assert!(table.contains("Broken.cs: unreadable"));
        assert!(table.contains("Saved to"));
        assert!(result(false).to_table().contains("Not saved to"));
    }

    #[test]
    fn test_json_flattens_report() {
        let value = serde_json::to_value(result(true)).unwrap();
        assert_eq!(value["files_analyzed"], 3);
        assert_eq!(value["persisted"], true);
    }
}
