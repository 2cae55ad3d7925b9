//! Configuration loading from `.weaverc.toml`.
//!
//! Configuration is optional. Without a config file every section falls back
//! to its defaults.
//!
//! # Example Configuration
//!
//! ```toml
//! [analysis]
//! supported_extensions = [".cs", ".aspx", ".sql"]
//! exclude_patterns = ["bin/", "obj/", "packages/"]
//! max_file_size_mb = 10
//!
//! [pattern_matching]
//! similarity_threshold = 0.7
//! max_patterns_returned = 5
//!
//! [storage]
//! database = ".weave/graph.duckdb"
//! persist = true
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Name of the configuration file looked up in the project root.
pub const CONFIG_FILE_NAME: &str = ".weaverc.toml";

/// Exclusions that apply no matter what the config file says.
const ALWAYS_EXCLUDED: &[&str] = &[".git/", ".weave/"];

/// Root configuration structure loaded from `.weaverc.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WeaveConfig {
    /// What to analyze.
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// Settings handed to the external pattern ranker.
    #[serde(default)]
    pub pattern_matching: PatternMatchingConfig,

    /// Durable mirror location.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// File selection for analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Recognized extensions, with or without the leading dot.
    #[serde(default = "default_supported_extensions")]
    pub supported_extensions: Vec<String>,

    /// Path prefixes to skip. A prefix matches at any path-component boundary,
    /// so `bin/` excludes both `bin/x.cs` and `Web/bin/x.cs`.
    #[serde(default = "default_exclude_patterns")]
    pub exclude_patterns: Vec<String>,

    /// Files larger than this are skipped with an error entry.
    #[serde(default = "default_max_file_size_mb")]
    pub max_file_size_mb: u64,
}

fn default_supported_extensions() -> Vec<String> {
    [".cs", ".aspx", ".ascx", ".master", ".sql"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_exclude_patterns() -> Vec<String> {
    ["bin/", "obj/", "packages/", ".git/"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_max_file_size_mb() -> u64 {
    10
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            supported_extensions: default_supported_extensions(),
            exclude_patterns: default_exclude_patterns(),
            max_file_size_mb: default_max_file_size_mb(),
        }
    }
}

/// Consumed only by the ranking collaborator; the engine never filters on these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternMatchingConfig {
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,

    #[serde(default = "default_max_patterns_returned")]
    pub max_patterns_returned: usize,
}

fn default_similarity_threshold() -> f64 {
    0.7
}

fn default_max_patterns_returned() -> usize {
    5
}

impl Default for PatternMatchingConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            max_patterns_returned: default_max_patterns_returned(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Database file, relative to the project root unless absolute.
    #[serde(default = "default_database")]
    pub database: String,

    /// Whether analysis results are mirrored to the database at all.
    #[serde(default = "default_persist")]
    pub persist: bool,
}

fn default_database() -> String {
    ".weave/graph.duckdb".to_string()
}

fn default_persist() -> bool {
    true
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: default_database(),
            persist: default_persist(),
        }
    }
}

impl WeaveConfig {
    /// Load configuration from `.weaverc.toml` in the given directory.
    ///
    /// A missing file yields defaults. Read and parse errors are logged as
    /// warnings and also yield defaults.
    pub fn load(root: &Path) -> Self {
        match Self::load_strict(root) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("{}; using default configuration", e);
                Self::default()
            }
        }
    }

    /// Like [`WeaveConfig::load`], but read and parse errors are returned.
    pub fn load_strict(root: &Path) -> Result<Self, ConfigError> {
        let config_path = root.join(CONFIG_FILE_NAME);
        if !config_path.exists() {
            return Ok(Self::default());
        }

        let display = config_path.display().to_string();
        let content = std::fs::read_to_string(&config_path).map_err(|source| ConfigError::Read {
            path: display.clone(),
            source,
        })?;
        Self::from_toml_str(&content).map_err(|message| ConfigError::Parse {
            path: display,
            message,
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    /// Normalized extensions: lower-case, no leading dot.
    pub fn extensions(&self) -> Vec<String> {
        self.analysis
            .supported_extensions
            .iter()
            .map(|e| e.trim_start_matches('.').to_lowercase())
            .filter(|e| !e.is_empty())
            .collect()
    }

    pub fn is_supported(&self, path: &Path) -> bool {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return false;
        };
        let ext = ext.to_lowercase();
        self.extensions().iter().any(|e| *e == ext)
    }

    /// Exclusion prefixes, configured ones first, built-ins appended.
    pub fn exclude_patterns(&self) -> Vec<String> {
        let mut patterns = self.analysis.exclude_patterns.clone();
        for default in ALWAYS_EXCLUDED {
            if !patterns.iter().any(|p| p == default) {
                patterns.push(default.to_string());
            }
        }
        patterns
    }

    /// Whether a path (relative to the scan root when walking a directory)
    /// falls under an exclusion prefix.
    pub fn is_excluded(&self, path: &str) -> bool {
        let path = path.replace('\\', "/");
        let path = path.trim_start_matches("./");
        self.exclude_patterns().iter().any(|pattern| {
            let pattern = pattern.replace('\\', "/");
            let pattern = pattern.trim_start_matches("./");
            !pattern.is_empty()
                && (path.starts_with(pattern) || path.contains(&format!("/{}", pattern)))
        })
    }

    pub fn max_file_size_bytes(&self) -> u64 {
        self.analysis.max_file_size_mb.saturating_mul(1024 * 1024)
    }

    /// Resolve the database path against the project root.
    pub fn database_path(&self, root: &Path) -> PathBuf {
        let db = Path::new(&self.storage.database);
        if db.is_absolute() {
            db.to_path_buf()
        } else {
            root.join(db)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = WeaveConfig::default();
        assert_eq!(config.extensions(), vec!["cs", "aspx", "ascx", "master", "sql"]);
        assert_eq!(config.analysis.max_file_size_mb, 10);
        assert_eq!(config.pattern_matching.similarity_threshold, 0.7);
        assert_eq!(config.pattern_matching.max_patterns_returned, 5);
        assert!(config.storage.persist);
    }

    #[test]
    fn test_parse_partial_config() {
        let config = WeaveConfig::from_toml_str(
            r#"
[analysis]
supported_extensions = ["CS", ".sql"]

[pattern_matching]
max_patterns_returned = 3
"#,
        )
        .unwrap();

        assert_eq!(config.extensions(), vec!["cs", "sql"]);
        assert_eq!(config.analysis.exclude_patterns, default_exclude_patterns());
        assert_eq!(config.pattern_matching.max_patterns_returned, 3);
        assert_eq!(config.pattern_matching.similarity_threshold, 0.7);
    }

    #[test]
    fn test_is_supported() {
        let config = WeaveConfig::default();
        assert!(config.is_supported(Path::new("Pages/Default.ASPX")));
        assert!(config.is_supported(Path::new("a/b/Repo.cs")));
        assert!(!config.is_supported(Path::new("site.css")));
        assert!(!config.is_supported(Path::new("Makefile")));
    }

    #[test]
    fn test_exclusion_matches_component_boundaries() {
        let config = WeaveConfig::default();
        assert!(config.is_excluded("bin/Debug/App.cs"));
        assert!(config.is_excluded("Web/obj/Gen.cs"));
        assert!(config.is_excluded("./packages/x.sql"));
        assert!(config.is_excluded(".weave/cache.sql"));
        assert!(!config.is_excluded("cabin/Room.cs"));
        assert!(!config.is_excluded("src/Binder.cs"));
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let config = WeaveConfig::load(dir.path());
        assert_eq!(config.analysis.max_file_size_mb, 10);
    }

    #[test]
    fn test_load_invalid_file() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "[analysis\nbroken").unwrap();

        let config = WeaveConfig::load(dir.path());
        assert_eq!(config.analysis.max_file_size_mb, 10);

        let err = WeaveConfig::load_strict(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_database_path() {
        let config = WeaveConfig::default();
        assert_eq!(
            config.database_path(Path::new("/proj")),
            PathBuf::from("/proj/.weave/graph.duckdb")
        );
    }
}
