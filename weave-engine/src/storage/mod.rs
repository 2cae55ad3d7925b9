//! Storage layer for weave.
//!
//! Provides the DuckDB-backed durable mirror of the graph with:
//! - Schema management and version check
//! - Transactional batch writes (node upsert, edge append, pattern replace)
//! - Graph reload for cross-session recall

mod mirror;
mod schema;

pub use mirror::{GraphMirror, Mirror, MirrorStats, PersistBatch};
pub use schema::SCHEMA_VERSION;
