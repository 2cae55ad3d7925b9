//! Source discovery and reading.
//!
//! Paths given to an analysis call may be files or directories. Directories
//! are walked with the `ignore` crate (honoring `.gitignore` and
//! `.weaveignore`) in sorted order so repeated runs see files in the same
//! sequence. Every candidate is then filtered by extension and by the
//! configured exclusion prefixes.

use ignore::WalkBuilder;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use crate::config::WeaveConfig;
use crate::error::ScanError;
use crate::extract::SourceKind;

/// Custom ignore file honored alongside `.gitignore`.
pub const IGNORE_FILE_NAME: &str = ".weaveignore";

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// A source file ready for extraction.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SourceFile {
    /// Path as used in node ids, with `/` separators.
    pub path: String,

    pub kind: SourceKind,

    pub content: String,

    pub size_bytes: u64,
}

/// Outcome of expanding the caller's paths into candidate files.
#[derive(Debug, Default)]
pub struct Discovery {
    /// Files to read, in processing order.
    pub files: Vec<String>,

    /// Paths passed over because of extension or exclusion rules.
    pub skipped: Vec<String>,

    /// Paths that could not be visited at all.
    pub errors: Vec<ScanError>,
}


/// Expand files and directories into the list of files to analyze.
pub fn discover<S: AsRef<str>>(paths: &[S], config: &WeaveConfig) -> Discovery {
    let mut discovery = Discovery::default();
    let mut seen = HashSet::new();

    for raw in paths {
        let raw = raw.as_ref();
        let path = Path::new(raw);

        if !path.exists() {
            discovery.errors.push(ScanError::NotFound {
                path: raw.to_string(),
            });
            continue;
        }

        if path.is_dir() {
            walk_directory(path, config, &mut discovery, &mut seen);
        } else {
            let normalized = normalize(raw);
            if config.is_excluded(&normalized) || !config.is_supported(path) {
                discovery.skipped.push(normalized);
            } else if seen.insert(normalized.clone()) {
                discovery.files.push(normalized);
            }
        }
    }

    discovery
}

fn walk_directory(
    root: &Path,
    config: &WeaveConfig,
    discovery: &mut Discovery,
    seen: &mut HashSet<String>,
) {
    let mut builder = WalkBuilder::new(root);
    builder
        .hidden(false) // let the exclusion list decide
        .git_ignore(true)
        .git_global(false)
        .git_exclude(true)
        .require_git(false)
        .add_custom_ignore_filename(IGNORE_FILE_NAME)
        .sort_by_file_path(|a, b| a.cmp(b));

    for entry in builder.build() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                discovery.errors.push(ScanError::Walk {
                    path: root.display().to_string(),
                    message: e.to_string(),
                });
                continue;
            }
        };
        if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
            continue;
        }

        let full = normalize(&entry.path().to_string_lossy());
        let relative = entry
            .path()
            .strip_prefix(root)
            .map(|p| normalize(&p.to_string_lossy()))
            .unwrap_or_else(|_| full.clone());

        if config.is_excluded(&relative) || !config.is_supported(entry.path()) {
            tracing::debug!("Skipping {}", full);
            discovery.skipped.push(full);
        } else if seen.insert(full.clone()) {
            discovery.files.push(full);
        }
    }
}

/// Read a discovered file, enforcing the size limit and decoding as UTF-8.
pub fn read_source(path: &str, config: &WeaveConfig) -> Result<SourceFile, ScanError> {
    let kind = SourceKind::from_path(Path::new(path)).ok_or_else(|| ScanError::Decode {
        path: path.to_string(),
        message: "no extractor for this file type".to_string(),
    })?;

    let metadata = fs::metadata(path).map_err(|e| io_error(path, e))?;
    let limit = config.max_file_size_bytes();
    if metadata.len() > limit {
        return Err(ScanError::TooLarge {
            path: path.to_string(),
            size: metadata.len(),
            limit,
        });
    }

    let bytes = fs::read(path).map_err(|e| io_error(path, e))?;
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(&bytes[..]);
    let content = std::str::from_utf8(bytes)
        .map_err(|e| ScanError::Decode {
            path: path.to_string(),
            message: e.to_string(),
        })?
        .to_string();

    Ok(SourceFile {
        path: normalize(path),
        kind,
        content,
        size_bytes: metadata.len(),
    })
}

fn io_error(path: &str, source: std::io::Error) -> ScanError {
    if source.kind() == ErrorKind::NotFound {
        ScanError::NotFound {
            path: path.to_string(),
        }
    } else {
        ScanError::Io {
            path: path.to_string(),
            source,
        }
    }
}

/// Lexical form used in node ids: `/` separators, no `.` segments and no
/// repeated separators. `..` is kept so the path still names the same file.
fn normalize(path: &str) -> String {
    let unified = path.replace('\\', "/");
    let root = if unified.starts_with("//") {
        "//"
    } else if unified.starts_with('/') {
        "/"
    } else {
        ""
    };
    let joined = unified
        .split('/')
        .filter(|part| !part.is_empty() && *part != ".")
        .collect::<Vec<_>>()
        .join("/");
    if root.is_empty() && joined.is_empty() {
        ".".to_string()
    } else {
        format!("{}{}", root, joined)
    }
}
