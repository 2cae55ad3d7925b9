//! GraphMirror - DuckDB-backed durable copy of the code graph.

use anyhow::{Context, Result};
use duckdb::{params, Connection};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use weave_core::types::Metadata;
use weave_core::{CodeGraph, CodeNode, CodePattern, CodeRelationship, Endpoint, NodeKind, RelationshipType};

use super::schema::{SCHEMA_SQL, SCHEMA_VERSION};

/// Work accumulated since the last successful write.
#[derive(Debug, Default)]
pub struct PersistBatch<'a> {
    /// Changed nodes with their first-encounter position.
    pub nodes: Vec<(usize, &'a CodeNode)>,
    /// Edges appended since the last write.
    pub relationships: &'a [CodeRelationship],
    /// The complete current pattern set.
    pub patterns: &'a [CodePattern],
}

/// Durable storage the engine writes through to.
pub trait Mirror: Send {
    /// Write one batch atomically: all of it or none of it.
    fn persist(&self, batch: &PersistBatch<'_>) -> Result<()>;

    /// Rebuild the graph from what was persisted.
    fn load_graph(&self) -> Result<CodeGraph>;
}

/// Row counts of the mirror.
#[derive(Debug, Clone, Serialize)]
pub struct MirrorStats {
    pub node_count: usize,
    pub relationship_count: usize,
    pub pattern_count: usize,
    pub type_counts: BTreeMap<String, usize>,
}

/// DuckDB mirror of nodes, relationships and patterns.
pub struct GraphMirror {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl GraphMirror {
    /// Open or create a mirror database file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create database directory: {:?}", parent))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {:?}", path))?;
        let mirror = Self {
            conn: Arc::new(Mutex::new(conn)),
            path: Some(path.to_path_buf()),
        };
        mirror.init_schema()?;
        Ok(mirror)
    }

    /// Open a throwaway in-memory mirror.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        let mirror = Self {
            conn: Arc::new(Mutex::new(conn)),
            path: None,
        };
        mirror.init_schema()?;
        Ok(mirror)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Acquire the connection lock. A poisoned mutex is recovered: the
    /// connection itself is still usable.
    fn acquire_conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        match self.conn.lock() {
            Ok(guard) => Ok(guard),
            Err(poisoned) => {
                tracing::warn!("Recovering from poisoned database mutex");
                Ok(poisoned.into_inner())
            }
        }
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.acquire_conn()?;

        let stored_version: Option<String> = conn
            .query_row(
                "SELECT value FROM weave_metadata WHERE key = 'schema_version'",
                [],
                |row| row.get(0),
            )
            .ok();
        if let Some(version) = stored_version.filter(|v| v != SCHEMA_VERSION) {
            anyhow::bail!(
                "Database schema {} is incompatible with {}.\n\
                 Delete the database file and analyze again.",
                version,
                SCHEMA_VERSION
            );
        }

        conn.execute_batch(SCHEMA_SQL)
            .context("Failed to initialize schema")?;

        conn.execute(
            "INSERT OR REPLACE INTO weave_metadata (key, value) VALUES ('schema_version', ?)",
            params![SCHEMA_VERSION],
        )
        .context("Failed to set schema version")?;

        Ok(())
    }

    /// Get a node by id.
    pub fn get_node(&self, id: &str) -> Result<Option<CodeNode>> {
        let conn = self.acquire_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, type, name, file_path, line_number, metadata FROM code_nodes WHERE id = ?",
        )?;
        let mut rows = stmt.query(params![id])?;
        match rows.next()? {
            Some(row) => node_from_row(row),
            None => Ok(None),
        }
    }

    /// Stored pattern ids, sorted.
    pub fn pattern_ids(&self) -> Result<Vec<String>> {
        let conn = self.acquire_conn()?;
        let mut stmt = conn.prepare("SELECT pattern_id FROM code_patterns ORDER BY pattern_id")?;
        let mut rows = stmt.query([])?;
        let mut ids = Vec::new();
        while let Some(row) = rows.next()? {
            ids.push(row.get(0)?);
        }
        Ok(ids)
    }

    /// Get mirror statistics.
    pub fn stats(&self) -> Result<MirrorStats> {
        let conn = self.acquire_conn()?;

        let node_count: usize =
            conn.query_row("SELECT COUNT(*) FROM code_nodes", [], |row| row.get(0))?;
        let relationship_count: usize =
            conn.query_row("SELECT COUNT(*) FROM code_relationships", [], |row| row.get(0))?;
        let pattern_count: usize =
            conn.query_row("SELECT COUNT(*) FROM code_patterns", [], |row| row.get(0))?;

        let mut type_counts = BTreeMap::new();
        let mut stmt = conn.prepare("SELECT type, COUNT(*) FROM code_nodes GROUP BY type")?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let type_name: String = row.get(0)?;
            let count: usize = row.get(1)?;
            type_counts.insert(type_name, count);
        }

        Ok(MirrorStats {
            node_count,
            relationship_count,
            pattern_count,
            type_counts,
        })
    }

    /// When the mirror was last written, RFC 3339.
    pub fn last_write(&self) -> Result<Option<String>> {
        let conn = self.acquire_conn()?;
        let mut stmt = conn.prepare("SELECT value FROM weave_metadata WHERE key = 'last_write'")?;
        let mut rows = stmt.query([])?;
        match rows.next()? {
            Some(row) => Ok(row.get(0)?),
            None => Ok(None),
        }
    }
}

impl Mirror for GraphMirror {
    fn persist(&self, batch: &PersistBatch<'_>) -> Result<()> {
        let mut conn = self.acquire_conn()?;
        let tx = conn.transaction().context("Failed to begin transaction")?;

        {
            let mut stmt = tx.prepare(
                r#"INSERT OR REPLACE INTO code_nodes
                   (id, ordinal, type, name, file_path, line_number, metadata)
                   VALUES (?, ?, ?, ?, ?, ?, ?)"#,
            )?;
            for (ordinal, node) in &batch.nodes {
                let metadata = serde_json::to_string(&node.metadata)
                    .context("Failed to serialize node metadata")?;
                stmt.execute(params![
                    node.id,
                    *ordinal as i64,
                    node.kind.as_str(),
                    node.name,
                    node.file_path,
                    node.line_number,
                    metadata,
                ])
                .with_context(|| format!("Failed to upsert node: {}", node.id))?;
            }
        }

        {
            let mut stmt = tx.prepare(
                r#"INSERT INTO code_relationships
                   (source_id, source_resolved, target_id, target_resolved, type, metadata, confidence)
                   VALUES (?, ?, ?, ?, ?, ?, ?)"#,
            )?;
            for rel in batch.relationships {
                let metadata = serde_json::to_string(&rel.metadata)
                    .context("Failed to serialize relationship metadata")?;
                stmt.execute(params![
                    rel.source.key(),
                    rel.source.is_resolved(),
                    rel.target.key(),
                    rel.target.is_resolved(),
                    rel.relationship_type.as_str(),
                    metadata,
                    rel.confidence,
                ])
                .with_context(|| {
                    format!("Failed to insert relationship: {} -> {}", rel.source, rel.target)
                })?;
            }
        }

        // Patterns are a full recomputation: drop the ones that vanished,
        // upsert the rest.
        let current: HashSet<&str> = batch.patterns.iter().map(|p| p.pattern_id.as_str()).collect();
        let stale: Vec<String> = {
            let mut stmt = tx.prepare("SELECT pattern_id FROM code_patterns")?;
            let mut rows = stmt.query([])?;
            let mut stale = Vec::new();
            while let Some(row) = rows.next()? {
                let id: String = row.get(0)?;
                if !current.contains(id.as_str()) {
                    stale.push(id);
                }
            }
            stale
        };
        for id in &stale {
            tx.execute("DELETE FROM code_patterns WHERE pattern_id = ?", params![id])
                .with_context(|| format!("Failed to delete pattern: {}", id))?;
        }
        {
            let mut stmt = tx.prepare(
                r#"INSERT OR REPLACE INTO code_patterns
                   (pattern_id, pattern_type, files, node_ids, template_data, similarity_score)
                   VALUES (?, ?, ?, ?, ?, ?)"#,
            )?;
            for pattern in batch.patterns {
                let node_ids: Vec<&str> = pattern.nodes.iter().map(|n| n.id.as_str()).collect();
                stmt.execute(params![
                    pattern.pattern_id,
                    pattern.pattern_type,
                    serde_json::to_string(&pattern.files)?,
                    serde_json::to_string(&node_ids)?,
                    serde_json::to_string(&pattern.template_data)?,
                    pattern.similarity_score,
                ])
                .with_context(|| format!("Failed to upsert pattern: {}", pattern.pattern_id))?;
            }
        }

        tx.execute(
            "INSERT OR REPLACE INTO weave_metadata (key, value) VALUES ('last_write', ?)",
            params![chrono::Utc::now().to_rfc3339()],
        )
        .context("Failed to record write time")?;

        tx.commit().context("Failed to commit graph batch")?;

        tracing::debug!(
            "persist: {} nodes, {} relationships, {} patterns ({} stale removed)",
            batch.nodes.len(),
            batch.relationships.len(),
            batch.patterns.len(),
            stale.len()
        );
        Ok(())
    }

    fn load_graph(&self) -> Result<CodeGraph> {
        let conn = self.acquire_conn()?;

        let mut stmt = conn.prepare(
            "SELECT id, type, name, file_path, line_number, metadata FROM code_nodes ORDER BY ordinal",
        )?;
        let mut rows = stmt.query([])?;
        let mut nodes = Vec::new();
        while let Some(row) = rows.next()? {
            if let Some(node) = node_from_row(row)? {
                nodes.push(node);
            }
        }

        let mut stmt = conn.prepare(
            r#"SELECT source_id, source_resolved, target_id, target_resolved, type, metadata, confidence
               FROM code_relationships ORDER BY id"#,
        )?;
        let mut rows = stmt.query([])?;
        let mut relationships = Vec::new();
        while let Some(row) = rows.next()? {
            let type_name: String = row.get(4)?;
            let Some(relationship_type) = RelationshipType::parse(&type_name) else {
                tracing::warn!("Skipping relationship with unknown type: {}", type_name);
                continue;
            };
            let source = endpoint(row.get(0)?, row.get(1)?);
            let target = endpoint(row.get(2)?, row.get(3)?);
            let metadata: Option<String> = row.get(5)?;
            let mut rel = CodeRelationship::new(source, target, relationship_type)
                .with_confidence(row.get(6)?);
            rel.metadata = parse_metadata(metadata.as_deref())?;
            relationships.push(rel);
        }

        tracing::info!(
            "load_graph: {} nodes, {} relationships",
            nodes.len(),
            relationships.len()
        );
        Ok(CodeGraph::from_parts(nodes, relationships))
    }
}

fn endpoint(id: String, resolved: bool) -> Endpoint {
    if resolved {
        Endpoint::Node(id)
    } else {
        Endpoint::Wildcard(id)
    }
}

fn parse_metadata(text: Option<&str>) -> Result<Metadata> {
    match text {
        Some(text) if !text.is_empty() => {
            serde_json::from_str(text).context("Failed to parse stored metadata")
        }
        _ => Ok(Metadata::new()),
    }
}

fn node_from_row(row: &duckdb::Row<'_>) -> Result<Option<CodeNode>> {
    let id: String = row.get(0)?;
    let type_name: String = row.get(1)?;
    let Some(kind) = NodeKind::parse(&type_name) else {
        tracing::warn!("Skipping node {} with unknown type: {}", id, type_name);
        return Ok(None);
    };
    let metadata: Option<String> = row.get(5)?;
    Ok(Some(CodeNode {
        id,
        name: row.get(2)?,
        kind,
        file_path: row.get(3)?,
        line_number: row.get(4)?,
        metadata: parse_metadata(metadata.as_deref())?,
    }))
}
