//! Weave core - code relationship graph construction.
//!
//! This crate turns application code, page markup and SQL schema files into a
//! directed property graph of code elements, and derives reusable patterns
//! from it.
//!
//! # Features
//!
//! - **Heuristic extraction**: C#, ASPX/ASCX/Master markup and SQL schema
//! - **Graph store**: id-keyed upsert of nodes, append-only typed edges,
//!   unresolved wildcard endpoints kept distinct from real nodes
//! - **Pattern recognition**: CRUD grouping by `*Manager` classes, page grouping
//! - **Export**: JSON document with nodes, edges, patterns and histograms
//!
//! # Usage
//!
//! ```no_run
//! use weave_core::{extract::ExtractorRegistry, graph::CodeGraph, patterns};
//!
//! let registry = ExtractorRegistry::default();
//! let mut graph = CodeGraph::new();
//! if let Some(extraction) = registry.extract("CustomerManager.cs", "class CustomerManager {}") {
//!     graph.ingest(extraction);
//! }
//! let found = patterns::recognize_all(&patterns::default_recognizers(), &graph);
//! assert_eq!(found[0].pattern_id, "crud_customer");
//! ```

pub mod config;
pub mod error;
pub mod export;
pub mod extract;
pub mod graph;
pub mod patterns;
pub mod scanner;
pub mod types;

pub use config::WeaveConfig;
pub use error::{ConfigError, ScanError};
pub use export::{GraphDocument, GraphSummary};
pub use graph::{CodeGraph, IngestStats};
pub use types::{CodeNode, CodePattern, CodeRelationship, Endpoint, NodeKind, RelationshipType};
