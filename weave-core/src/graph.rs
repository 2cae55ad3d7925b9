//! In-memory graph store.
//!
//! Nodes live in an insertion-ordered map keyed by id, so iteration follows
//! first-encounter order and re-analysis replaces a node in place. Edges are
//! kept in an append-only list and mirrored into a petgraph `DiGraph` whose
//! vertices are endpoints. Vertices are created on demand for forward
//! references and wildcards, so no referential integrity is required at
//! insert time.
//!
//! ```text
//! Extraction -> CodeGraph (upsert nodes, append edges) -> recognizers / export
//! ```

use indexmap::IndexMap;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::{BTreeMap, HashMap};

use crate::extract::Extraction;
use crate::types::{CodeNode, CodeRelationship, Endpoint, NodeKind, RelationshipType};

/// Counts from merging one extraction into the graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// Ids seen for the first time.
    pub nodes_created: usize,
    /// Ids that already existed and were replaced.
    pub nodes_updated: usize,
    pub relationships_added: usize,
}

/// Directed property graph of code elements.
#[derive(Debug, Default, Clone)]
pub struct CodeGraph {
    nodes: IndexMap<String, CodeNode>,
    relationships: Vec<CodeRelationship>,
    /// Vertex weight is the endpoint, edge weight the index into `relationships`.
    graph: DiGraph<Endpoint, usize>,
    vertices: HashMap<Endpoint, NodeIndex>,
}

impl CodeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a graph from stored records, preserving their order.
    pub fn from_parts(nodes: Vec<CodeNode>, relationships: Vec<CodeRelationship>) -> Self {
        let mut graph = Self::new();
        for node in nodes {
            graph.upsert_node(node);
        }
        for relationship in relationships {
            graph.add_edge(relationship);
        }
        graph
    }

    /// Insert or replace a node by id. Returns `true` when the id is new.
    ///
    /// A database object located in a source file is never displaced by a
    /// `"database"` placeholder for the same id, in either arrival order.
    /// Metadata keys only the placeholder carries are kept.
    pub fn upsert_node(&mut self, node: CodeNode) -> bool {
        let endpoint = Endpoint::node(node.id.as_str());
        let is_new = match self.nodes.get_mut(&node.id) {
            None => {
                self.nodes.insert(node.id.clone(), node);
                true
            }
            Some(existing) => {
                match (existing.is_synthetic(), node.is_synthetic()) {
                    (false, true) => merge_metadata(existing, node),
                    (true, false) => {
                        let placeholder = std::mem::replace(existing, node);
                        merge_metadata(existing, placeholder);
                    }
                    _ => *existing = node,
                }
                false
            }
        };
        self.vertex(endpoint);
        is_new
    }

    /// Append an edge. Never deduplicates. Returns its index.
    pub fn add_edge(&mut self, relationship: CodeRelationship) -> usize {
        let idx = self.relationships.len();
        let source = self.vertex(relationship.source.clone());
        let target = self.vertex(relationship.target.clone());
        self.graph.add_edge(source, target, idx);
        self.relationships.push(relationship);
        idx
    }

    /// Merge one file's extraction.
    pub fn ingest(&mut self, extraction: Extraction) -> IngestStats {
        let mut stats = IngestStats::default();
        for node in extraction.nodes {
            if self.upsert_node(node) {
                stats.nodes_created += 1;
            } else {
                stats.nodes_updated += 1;
            }
        }
        for relationship in extraction.relationships {
            self.add_edge(relationship);
            stats.relationships_added += 1;
        }
        stats
    }

    fn vertex(&mut self, endpoint: Endpoint) -> NodeIndex {
        if let Some(&idx) = self.vertices.get(&endpoint) {
            return idx;
        }
        let idx = self.graph.add_node(endpoint.clone());
        self.vertices.insert(endpoint, idx);
        idx
    }

    pub fn node(&self, id: &str) -> Option<&CodeNode> {
        self.nodes.get(id)
    }

    /// First-encounter position of a node. Stable across replacement.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.nodes.get_index_of(id)
    }

    /// Nodes in first-encounter order.
    pub fn nodes(&self) -> impl Iterator<Item = &CodeNode> {
        self.nodes.values()
    }

    pub fn nodes_of_kind(&self, kind: NodeKind) -> impl Iterator<Item = &CodeNode> {
        self.nodes.values().filter(move |n| n.kind == kind)
    }

    /// Edges in insertion order.
    pub fn relationships(&self) -> &[CodeRelationship] {
        &self.relationships
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn relationship_count(&self) -> usize {
        self.relationships.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.relationships.is_empty()
    }

    /// Edges whose resolved source or target is `id`, in insertion order.
    /// Wildcards that happen to match `id` are not adjacency.
    pub fn incident(&self, id: &str) -> Vec<&CodeRelationship> {
        self.incident_any([id])
    }

    /// Union of `incident` over several ids, each edge once, insertion order.
    pub fn incident_any<'a>(&self, ids: impl IntoIterator<Item = &'a str>) -> Vec<&CodeRelationship> {
        let mut edges: Vec<usize> = Vec::new();
        for id in ids {
            let Some(&idx) = self.vertices.get(&Endpoint::node(id)) else {
                continue;
            };
            edges.extend(
                self.graph
                    .edges_directed(idx, Direction::Outgoing)
                    .chain(self.graph.edges_directed(idx, Direction::Incoming))
                    .map(|e| *e.weight()),
            );
        }
        edges.sort_unstable();
        edges.dedup();
        edges.into_iter().map(|i| &self.relationships[i]).collect()
    }

    /// Edges whose source is exactly this wildcard pattern.
    pub fn from_wildcard(&self, pattern: &str) -> Vec<&CodeRelationship> {
        let Some(&idx) = self.vertices.get(&Endpoint::wildcard(pattern)) else {
            return Vec::new();
        };
        let mut edges: Vec<usize> = self
            .graph
            .edges_directed(idx, Direction::Outgoing)
            .map(|e| *e.weight())
            .collect();
        edges.sort_unstable();
        edges.into_iter().map(|i| &self.relationships[i]).collect()
    }

    /// Existing nodes one hop from `id` in either direction, first-seen order.
    pub fn neighbors(&self, id: &str) -> Vec<&CodeNode> {
        let mut seen = Vec::new();
        for rel in self.incident(id) {
            for endpoint in [&rel.source, &rel.target] {
                let Some(other) = endpoint.as_node() else {
                    continue;
                };
                if other == id || seen.iter().any(|n: &&CodeNode| n.id == other) {
                    continue;
                }
                if let Some(node) = self.nodes.get(other) {
                    seen.push(node);
                }
            }
        }
        seen
    }

    /// Nodes an endpoint refers to: the node itself, or every wildcard match.
    pub fn resolve(&self, endpoint: &Endpoint) -> Vec<&CodeNode> {
        match endpoint {
            Endpoint::Node(id) => self.nodes.get(id).into_iter().collect(),
            Endpoint::Wildcard(_) => self
                .nodes
                .values()
                .filter(|n| endpoint.matches(&n.id))
                .collect(),
        }
    }

    /// Edges with a resolved endpoint that names no stored node. These are
    /// legal forward references; consumers needing integrity can filter them.
    pub fn dangling(&self) -> Vec<&CodeRelationship> {
        self.relationships
            .iter()
            .filter(|r| {
                [&r.source, &r.target]
                    .iter()
                    .any(|e| e.as_node().is_some_and(|id| !self.nodes.contains_key(id)))
            })
            .collect()
    }

    /// Node counts keyed by kind.
    pub fn node_type_summary(&self) -> BTreeMap<String, usize> {
        let mut summary = BTreeMap::new();
        for node in self.nodes.values() {
            *summary.entry(node.kind.as_str().to_string()).or_insert(0) += 1;
        }
        summary
    }

    /// Edge counts keyed by relationship type.
    pub fn relationship_type_summary(&self) -> BTreeMap<String, usize> {
        let mut summary = BTreeMap::new();
        for rel in &self.relationships {
            *summary
                .entry(rel.relationship_type.as_str().to_string())
                .or_insert(0) += 1;
        }
        summary
    }

    pub fn count_relationships(&self, rel_type: RelationshipType) -> usize {
        self.relationships
            .iter()
            .filter(|r| r.relationship_type == rel_type)
            .count()
    }
}

/// Fill `into` with the metadata keys it lacks.
fn merge_metadata(into: &mut CodeNode, from: CodeNode) {
    for (key, value) in from.metadata {
        into.metadata.entry(key).or_insert(value);
    }
}
