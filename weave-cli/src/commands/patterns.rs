//! Patterns command - List recognized patterns of one type

use crate::output::{Output, OutputFormat, TableDisplay, TableOutput};
use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use std::path::Path;
use weave_core::{CodePattern, WeaveConfig};

use super::open_engine;

#[derive(Debug, Serialize)]
pub struct PatternList {
    pub pattern_type: String,
    pub patterns: Vec<CodePattern>,
}

/// The template field that names a pattern's subject.
fn subject(pattern: &CodePattern) -> String {
    ["entity_name", "page_name"]
        .iter()
        .find_map(|key| pattern.template_data.get(*key).and_then(|v| v.as_str()))
        .unwrap_or("-")
        .to_string()
}

impl TableDisplay for PatternList {
    fn to_table(&self) -> String {
        let mut output = format!(
            "{} {} ({} found)\n",
            "PATTERNS:".cyan().bold(),
            self.pattern_type.yellow(),
            self.patterns.len()
        );

        if self.patterns.is_empty() {
            output.push_str(
                &format!("  No patterns of type '{}'.", self.pattern_type)
                    .dimmed()
                    .to_string(),
            );
            return output;
        }

        let rows = self
            .patterns
            .iter()
            .map(|p| {
                vec![
                    p.pattern_id.clone(),
                    subject(p),
                    p.nodes.len().to_string(),
                    p.relationships.len().to_string(),
                    p.files.join(", "),
                    format!("{:.2}", p.similarity_score),
                ]
            })
            .collect();
        output.push_str(&TableOutput::format_rows(
            &["Pattern", "Subject", "Nodes", "Edges", "Files", "Score"],
            rows,
        ));
        output
    }
}

pub fn run(root: &Path, config: WeaveConfig, pattern_type: &str, format: OutputFormat) -> Result<()> {
    let engine = open_engine(config, root)?;
    let list = PatternList {
        pattern_type: pattern_type.to_string(),
        patterns: engine
            .find_patterns_by_type(pattern_type)
            .into_iter()
            .cloned()
            .collect(),
    };
    Output::new(list, format).render()
}

#[cfg(test)]
mod tests {
    use super::*;
    use weave_core::types::Metadata;

    #[test]
    fn test_rows_show_subject() {
        colored::control::set_override(false);
        let mut template_data = Metadata::new();
        template_data.insert("entity_name".into(), "Customer".into());
        let list = PatternList {
            pattern_type: "database_crud".to_string(),
            patterns: vec![CodePattern {
                pattern_id: "crud_customer".to_string(),
                pattern_type: "database_crud".to_string(),
                files: vec!["Logic/CustomerManager.cs".to_string()],
                nodes: Vec::new(),
                relationships: Vec::new(),
                template_data,
                similarity_score: 0.8,
            }],
        };

        let table = list.to_table();
        assert!(table.contains("crud_customer"));
        assert!(table.contains("Customer"));
        assert!(table.contains("0.80"));
    }

    #[test]
    fn test_empty_list() {
        colored::control::set_override(false);
        let list = PatternList {
            pattern_type: "wizard".to_string(),
            patterns: Vec::new(),
        };
        assert!(list.to_table().contains("No patterns of type 'wizard'."));
    }
}
