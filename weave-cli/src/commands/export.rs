//! Export command - Write the full graph document as JSON
//!
//! Without `--output` the document is printed to stdout regardless of the
//! selected format, since it is only meaningful as JSON.

use crate::output::{JsonOutput, Output, OutputConfig, OutputFormat, SuccessMessage};
use anyhow::Result;
use std::path::{Path, PathBuf};
use weave_core::WeaveConfig;
use weave_engine::ExportDestination;

use super::open_engine;

pub fn run(root: &Path, config: WeaveConfig, output: Option<&str>, format: OutputFormat) -> Result<()> {
    let engine = open_engine(config, root)?;

    let Some(output) = output else {
        let document = engine.export_graph(&ExportDestination::Memory)?;
        println!(
            "{}",
            JsonOutput::format(&document, &OutputConfig::new(OutputFormat::Json))
        );
        return Ok(());
    };

    let path = PathBuf::from(output);
    let document = engine.export_graph(&ExportDestination::File(path.clone()))?;
    tracing::info!("Exported graph to {}", path.display());

    Output::new(
        SuccessMessage::new(format!(
            "Exported {} nodes, {} relationships and {} patterns to {}",
            document.summary.total_nodes(),
            document.summary.total_relationships(),
            document.patterns.len(),
            path.display()
        )),
        format,
    )
    .render()
}
