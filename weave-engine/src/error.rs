//! Error types for the engine facade.

use thiserror::Error;

use crate::engine::AnalysisReport;
use crate::introspect::SchemaError;
use crate::ranking::RankingError;

/// Call-level failures of engine operations.
///
/// Per-file problems never show up here; they are collected in the
/// `errors` list of the analysis report.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The durable mirror rejected a write. The in-memory graph kept the
    /// work described by `report`, and it stays queued for the next write.
    #[error("Failed to persist graph: {cause:#}")]
    Persistence {
        #[source]
        cause: anyhow::Error,
        report: Box<AnalysisReport>,
    },

    /// The mirror could not be opened or read.
    #[error("Failed to open graph store: {0:#}")]
    Storage(#[source] anyhow::Error),

    /// Unknown operation or bad arguments at the dispatch boundary.
    #[error("{message}")]
    InvalidRequest { message: String },

    #[error("Failed to write export to {path}: {source}")]
    Export {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Serialize(#[from] serde_json::Error),

    #[error(transparent)]
    Ranking(#[from] RankingError),

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

impl EngineError {
    pub fn invalid_request(message: impl Into<String>) -> Self {
        EngineError::InvalidRequest {
            message: message.into(),
        }
    }

    /// The report of work kept in memory despite the failure, if any.
    pub fn report(&self) -> Option<&AnalysisReport> {
        match self {
            EngineError::Persistence { report, .. } => Some(report),
            _ => None,
        }
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
