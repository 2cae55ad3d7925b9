//! Weave engine - analysis sessions over the code relationship graph.
//!
//! This library provides:
//! - The [`Engine`] facade implementing the operation contract
//!   (analyze, summaries, pattern lookup, export, named dispatch)
//! - Storage layer (DuckDB-based durable mirror with cross-session reload)
//! - Collaborator traits for pattern ranking and schema introspection

pub mod engine;
pub mod error;
pub mod introspect;
pub mod ranking;
pub mod storage;

pub use engine::{AnalysisReport, Engine, ExportDestination};
pub use error::{EngineError, EngineResult};
pub use introspect::{SchemaSource, TableSchema};
pub use ranking::{PatternRanker, RankedPattern, RankingQuery};
pub use storage::{GraphMirror, Mirror};
