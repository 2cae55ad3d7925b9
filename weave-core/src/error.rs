//! Error types for weave-core.

use thiserror::Error;

/// Per-file failures while discovering or reading sources.
///
/// These are recovered by the caller: the message ends up in the analysis
/// report and the remaining files are still processed.
#[derive(Error, Debug)]
pub enum ScanError {
    /// Path does not exist.
    #[error("File not found: {path}")]
    NotFound {
        /// Path as given by the caller.
        path: String,
    },

    /// Content is not valid UTF-8.
    #[error("Failed to decode {path}: {message}")]
    Decode {
        /// File that failed to decode.
        path: String,
        /// Decoder diagnostic.
        message: String,
    },

    /// File exceeds the configured size limit.
    #[error("File too large: {path} ({size} bytes exceeds limit of {limit})")]
    TooLarge {
        path: String,
        size: u64,
        limit: u64,
    },

    /// Any other I/O failure while reading.
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Directory traversal failure.
    #[error("Failed to walk {path}: {message}")]
    Walk {
        path: String,
        message: String,
    },
}

/// Failures while loading `.weaverc.toml` in strict mode.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {message}")]
    Parse {
        path: String,
        /// TOML diagnostic, including the offending location.
        message: String,
    },
}
