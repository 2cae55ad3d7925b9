//! Summary command - Node and relationship histograms of the stored graph

use crate::output::{Output, OutputFormat, TableDisplay, TableOutput};
use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use weave_core::WeaveConfig;

use super::open_engine;

#[derive(Debug, Serialize)]
pub struct GraphSummaryView {
    pub node_types: BTreeMap<String, usize>,
    pub relationship_types: BTreeMap<String, usize>,
    pub pattern_count: usize,
}

impl TableDisplay for GraphSummaryView {
    fn to_table(&self) -> String {
        let mut output = String::new();

        output.push_str(&format!("{}\n", "NODES:".cyan().bold()));
        output.push_str(&TableOutput::format_counts("Type", &self.node_types));
        output.push_str(&format!("\n\n{}\n", "RELATIONSHIPS:".cyan().bold()));
        output.push_str(&TableOutput::format_counts("Type", &self.relationship_types));
        output.push_str(&format!(
            "\n\n{} {}",
            "Patterns:".dimmed(),
            self.pattern_count
        ));

        output
    }
}

pub fn run(root: &Path, config: WeaveConfig, format: OutputFormat) -> Result<()> {
    let engine = open_engine(config, root)?;
    let view = GraphSummaryView {
        node_types: engine.node_type_summary(),
        relationship_types: engine.relationship_type_summary(),
        pattern_count: engine.patterns().len(),
    };
    Output::new(view, format).render()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_graph_table() {
        colored::control::set_override(false);
        let view = GraphSummaryView {
            node_types: BTreeMap::new(),
            relationship_types: BTreeMap::new(),
            pattern_count: 0,
        };
        let table = view.to_table();
        assert!(table.contains("NODES:"));
        assert!(table.contains("(no results)"));
        assert!(table.ends_with("Patterns: 0"));
    }
}
