//! Per-kind element extraction.
//!
//! Each extractor is a pure function of `(file_path, content)` producing nodes
//! and intra-file relationships. Extraction is heuristic and line/token based;
//! anything it does not recognize contributes nothing rather than failing.
//! Deduplication within a file is the extractor's job, across files it is the
//! graph store's.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::types::{CodeNode, CodeRelationship};

pub mod csharp;
pub mod markup;
pub mod schema;

mod text;

/// Confidence assigned to inferred database-access edges.
pub const DB_ACCESS_CONFIDENCE: f64 = 0.8;

/// Nodes and relationships extracted from one file.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub nodes: Vec<CodeNode>,
    pub relationships: Vec<CodeRelationship>,
    seen: HashSet<String>,
}

impl Extraction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node unless one with the same id was already extracted from
    /// this file. Returns whether the node was added.
    pub fn push_node(&mut self, node: CodeNode) -> bool {
        if self.seen.insert(node.id.clone()) {
            self.nodes.push(node);
            true
        } else {
            false
        }
    }

    pub fn push_relationship(&mut self, relationship: CodeRelationship) {
        self.relationships.push(relationship);
    }

    pub fn has_node(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut CodeNode> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.relationships.is_empty()
    }
}

/// Capability interface for one source kind. A grammar-based parser can be
/// dropped in behind this without touching the graph or pattern layers.
pub trait Extractor: Send + Sync {
    fn kind(&self) -> SourceKind;

    fn extract(&self, file_path: &str, content: &str) -> Extraction;
}

/// The three families of source artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Application code (`.cs`)
    Procedural,
    /// Page/view markup (`.aspx`, `.ascx`, `.master`)
    Markup,
    /// Schema definitions (`.sql`)
    Schema,
}

impl SourceKind {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim_start_matches('.').to_lowercase().as_str() {
            "cs" => Some(SourceKind::Procedural),
            "aspx" | "ascx" | "master" => Some(SourceKind::Markup),
            "sql" => Some(SourceKind::Schema),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Procedural => "procedural",
            SourceKind::Markup => "markup",
            SourceKind::Schema => "schema",
        }
    }
}

/// Routes content to the extractor for its source kind.
pub struct ExtractorRegistry {
    extractors: Vec<Box<dyn Extractor>>,
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self {
            extractors: vec![
                Box::new(csharp::CSharpExtractor),
                Box::new(markup::MarkupExtractor),
                Box::new(schema::SchemaExtractor),
            ],
        }
    }
}

impl ExtractorRegistry {
    /// Replace the extractor registered for `extractor.kind()`.
    pub fn register(&mut self, extractor: Box<dyn Extractor>) {
        let kind = extractor.kind();
        self.extractors.retain(|e| e.kind() != kind);
        self.extractors.push(extractor);
    }

    pub fn get(&self, kind: SourceKind) -> Option<&dyn Extractor> {
        self.extractors
            .iter()
            .find(|e| e.kind() == kind)
            .map(|e| e.as_ref())
    }

    /// Extract from a file, choosing the extractor by extension.
    /// Returns `None` when no extractor handles the extension.
    pub fn extract(&self, file_path: &str, content: &str) -> Option<Extraction> {
        let kind = SourceKind::from_path(Path::new(file_path))?;
        let extractor = self.get(kind)?;
        Some(extractor.extract(file_path, content))
    }
}
