//! Full-graph export document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::graph::CodeGraph;
use crate::types::{CodeNode, CodePattern, CodeRelationship};

/// Both histograms of the graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSummary {
    pub node_types: BTreeMap<String, usize>,
    pub relationship_types: BTreeMap<String, usize>,
}

impl GraphSummary {
    pub fn of(graph: &CodeGraph) -> Self {
        Self {
            node_types: graph.node_type_summary(),
            relationship_types: graph.relationship_type_summary(),
        }
    }

    pub fn total_nodes(&self) -> usize {
        self.node_types.values().sum()
    }

    pub fn total_relationships(&self) -> usize {
        self.relationship_types.values().sum()
    }
}

/// Serialized snapshot of nodes, relationships, patterns and summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphDocument {
    pub nodes: Vec<CodeNode>,
    pub relationships: Vec<CodeRelationship>,
    pub patterns: Vec<CodePattern>,
    pub summary: GraphSummary,
    pub generated_at: DateTime<Utc>,
}

impl GraphDocument {
    /// Snapshot the graph. Works on an empty graph.
    pub fn build(graph: &CodeGraph, patterns: &[CodePattern]) -> Self {
        Self {
            nodes: graph.nodes().cloned().collect(),
            relationships: graph.relationships().to_vec(),
            patterns: patterns.to_vec(),
            summary: GraphSummary::of(graph),
            generated_at: Utc::now(),
        }
    }
}

/// Export a document to JSON.
pub fn export(document: &GraphDocument, pretty: bool) -> Result<String, serde_json::Error> {
    if pretty {
        serde_json::to_string_pretty(document)
    } else {
        serde_json::to_string(document)
    }
}
