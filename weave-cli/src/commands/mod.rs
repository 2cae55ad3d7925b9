//! Command implementations for the weave CLI
//!
//! Each command module provides a `run` function that executes the command logic.

pub mod analyze;
pub mod call;
pub mod export;
pub mod patterns;
pub mod summary;

use std::path::Path;

use anyhow::{Context, Result};
use weave_core::WeaveConfig;
use weave_engine::Engine;

/// Open an engine for the project rooted at `root`, reloading the stored
/// graph when persistence is enabled.
pub(crate) fn open_engine(config: WeaveConfig, root: &Path) -> Result<Engine> {
    let database = config.database_path(root);
    let persist = config.storage.persist;
    tracing::debug!(
        "Opening engine at {} (persist: {})",
        root.display(),
        persist
    );
    Engine::open(config, root)
        .with_context(|| format!("Failed to open graph database at {}", database.display()))
}

/// Database location reported in command output, or None when not persisting.
pub(crate) fn database_label(config: &WeaveConfig, root: &Path) -> Option<String> {
    config
        .storage
        .persist
        .then(|| config.database_path(root).display().to_string())
}
