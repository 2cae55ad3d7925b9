//! The engine facade: owns one analysis session.
//!
//! An [`Engine`] holds the in-memory graph, the current pattern set and an
//! optional durable mirror. Every mutating call runs scan, extract, upsert,
//! recognize and persist, in that order. The in-memory state is
//! authoritative for the life of the process: if the mirror write fails the
//! work is kept and retried with the next write.
//!
//! The engine is not internally synchronized. A concurrent host must
//! serialize mutating calls, e.g. by holding it in a `Mutex`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use weave_core::export::{self, GraphDocument};
use weave_core::extract::{Extraction, Extractor, ExtractorRegistry};
use weave_core::patterns::{default_recognizers, recognize_all, PatternFeatures, PatternRecognizer};
use weave_core::scanner::{discover, read_source};
use weave_core::{CodeGraph, CodePattern, WeaveConfig};

use crate::error::{EngineError, EngineResult};
use crate::introspect::{schema_extraction, SchemaSource};
use crate::ranking::{apply_ranking, PatternRanker, RankedPattern, RankingError, RankingQuery};
use crate::storage::{GraphMirror, Mirror, PersistBatch};

/// Outcome of one analysis call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub files_analyzed: usize,
    /// Files passed over by extension or exclusion rules.
    pub files_skipped: usize,
    /// Node ids seen for the first time.
    pub nodes_created: usize,
    /// Existing node ids replaced by re-extraction.
    pub nodes_updated: usize,
    pub relationships_found: usize,
    /// Size of the recomputed pattern set.
    pub patterns_identified: usize,
    /// One message per file that could not be analyzed.
    pub errors: Vec<String>,
}

impl AnalysisReport {
    fn absorb(&mut self, extraction: Extraction, graph: &mut CodeGraph, dirty: &mut HashSet<String>) {
        dirty.extend(extraction.nodes.iter().map(|n| n.id.clone()));
        let stats = graph.ingest(extraction);
        self.nodes_created += stats.nodes_created;
        self.nodes_updated += stats.nodes_updated;
        self.relationships_found += stats.relationships_added;
    }
}

/// Where `export_graph` sends the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportDestination {
    /// Only return it.
    Memory,
    /// Also write pretty JSON to this path.
    File(PathBuf),
}

/// One analysis session.
pub struct Engine {
    config: WeaveConfig,
    registry: ExtractorRegistry,
    recognizers: Vec<Box<dyn PatternRecognizer>>,
    graph: CodeGraph,
    patterns: Vec<CodePattern>,
    mirror: Option<Box<dyn Mirror>>,
    ranker: Option<Box<dyn PatternRanker>>,
    /// Node ids changed since the last successful mirror write.
    dirty_nodes: HashSet<String>,
    /// Relationships before this index are in the mirror.
    persisted_edges: usize,
}

impl Engine {
    /// Memory-only engine.
    pub fn new(config: WeaveConfig) -> Self {
        Self {
            config,
            registry: ExtractorRegistry::default(),
            recognizers: default_recognizers(),
            graph: CodeGraph::new(),
            patterns: Vec::new(),
            mirror: None,
            ranker: None,
            dirty_nodes: HashSet::new(),
            persisted_edges: 0,
        }
    }

    /// Engine writing through to `mirror`. Existing mirror content is not
    /// loaded; use [`Engine::open`] for that.
    pub fn with_mirror(config: WeaveConfig, mirror: impl Mirror + 'static) -> Self {
        let mut engine = Self::new(config);
        engine.mirror = Some(Box::new(mirror));
        engine
    }

    /// Open the configured database under `root` and reload what earlier
    /// sessions stored. With `storage.persist = false` this is [`Engine::new`].
    pub fn open(config: WeaveConfig, root: &Path) -> EngineResult<Self> {
        if !config.storage.persist {
            return Ok(Self::new(config));
        }
        let path = config.database_path(root);
        let mirror = GraphMirror::open(&path).map_err(EngineError::Storage)?;
        tracing::debug!("Opened graph store at {}", path.display());
        Self::restore(config, mirror)
    }

    /// Engine over `mirror`, seeded with its stored graph.
    pub fn restore(config: WeaveConfig, mirror: impl Mirror + 'static) -> EngineResult<Self> {
        let graph = mirror.load_graph().map_err(EngineError::Storage)?;
        let mut engine = Self::with_mirror(config, mirror);
        engine.persisted_edges = graph.relationship_count();
        engine.graph = graph;
        engine.recompute_patterns();
        Ok(engine)
    }

    pub fn config(&self) -> &WeaveConfig {
        &self.config
    }

    pub fn graph(&self) -> &CodeGraph {
        &self.graph
    }

    pub fn patterns(&self) -> &[CodePattern] {
        &self.patterns
    }

    /// Replace the extractor for one source kind.
    pub fn register_extractor(&mut self, extractor: Box<dyn Extractor>) {
        self.registry.register(extractor);
    }

    /// Add a recognizer that runs after the default ones.
    pub fn add_recognizer(&mut self, recognizer: Box<dyn PatternRecognizer>) {
        self.recognizers.push(recognizer);
    }

    pub fn set_ranker(&mut self, ranker: Box<dyn PatternRanker>) {
        self.ranker = Some(ranker);
    }

    /// Whether some work has not reached the mirror yet.
    pub fn has_pending_writes(&self) -> bool {
        self.mirror.is_some()
            && (!self.dirty_nodes.is_empty() || self.persisted_edges < self.graph.relationship_count())
    }

    /// Analyze files and directories, then recompute patterns and persist.
    ///
    /// Missing or unreadable files are reported in `errors` and skipped. A
    /// mirror failure is returned as [`EngineError::Persistence`] with the
    /// in-memory effects kept.
    pub fn analyze_files<S: AsRef<str>>(&mut self, paths: &[S]) -> EngineResult<AnalysisReport> {
        let mut report = AnalysisReport::default();
        let discovery = discover(paths, &self.config);
        report.files_skipped = discovery.skipped.len();
        for error in &discovery.errors {
            tracing::warn!("{}", error);
            report.errors.push(error.to_string());
        }

        for path in &discovery.files {
            let source = match read_source(path, &self.config) {
                Ok(source) => source,
                Err(e) => {
                    tracing::warn!("{}", e);
                    report.errors.push(e.to_string());
                    continue;
                }
            };
            let Some(extractor) = self.registry.get(source.kind) else {
                tracing::debug!("No extractor for {}", path);
                report.files_skipped += 1;
                continue;
            };

            let extraction = extractor.extract(&source.path, &source.content);
            tracing::debug!(
                "{} ({} bytes): {} nodes, {} relationships",
                path,
                source.size_bytes,
                extraction.nodes.len(),
                extraction.relationships.len()
            );
            report.absorb(extraction, &mut self.graph, &mut self.dirty_nodes);
            report.files_analyzed += 1;
        }

        report.patterns_identified = self.recompute_patterns();
        tracing::info!(
            "Analyzed {} files: {} new nodes, {} relationships, {} patterns, {} errors",
            report.files_analyzed,
            report.nodes_created,
            report.relationships_found,
            report.patterns_identified,
            report.errors.len()
        );

        self.flush(report)
    }

    /// Fold tables reported by a schema source into the graph.
    pub fn ingest_schema(&mut self, source: &dyn SchemaSource) -> EngineResult<AnalysisReport> {
        let tables = source.tables()?;
        let mut report = AnalysisReport::default();
        report.absorb(schema_extraction(&tables), &mut self.graph, &mut self.dirty_nodes);
        report.patterns_identified = self.recompute_patterns();
        tracing::info!(
            "Ingested {} tables: {} new nodes, {} relationships",
            tables.len(),
            report.nodes_created,
            report.relationships_found
        );
        self.flush(report)
    }

    /// Re-run every recognizer over the whole graph. Returns the count.
    pub fn recompute_patterns(&mut self) -> usize {
        self.patterns = recognize_all(&self.recognizers, &self.graph);
        self.patterns.len()
    }

    /// Write pending work to the mirror, if there is one.
    pub fn flush_pending(&mut self) -> EngineResult<()> {
        self.flush(AnalysisReport::default()).map(|_| ())
    }

    fn flush(&mut self, report: AnalysisReport) -> EngineResult<AnalysisReport> {
        let Some(mirror) = &self.mirror else {
            return Ok(report);
        };

        let mut nodes: Vec<(usize, &weave_core::CodeNode)> = self
            .dirty_nodes
            .iter()
            .filter_map(|id| Some((self.graph.position(id)?, self.graph.node(id)?)))
            .collect();
        nodes.sort_by_key(|(position, _)| *position);
        let batch = PersistBatch {
            nodes,
            relationships: &self.graph.relationships()[self.persisted_edges..],
            patterns: &self.patterns,
        };

        match mirror.persist(&batch) {
            Ok(()) => {
                self.dirty_nodes.clear();
                self.persisted_edges = self.graph.relationship_count();
                Ok(report)
            }
            Err(cause) => {
                tracing::error!("Graph store write failed, keeping work in memory: {:#}", cause);
                Err(EngineError::Persistence {
                    cause,
                    report: Box::new(report),
                })
            }
        }
    }

    /// Node counts keyed by kind.
    pub fn node_type_summary(&self) -> BTreeMap<String, usize> {
        self.graph.node_type_summary()
    }

    /// Relationship counts keyed by type.
    pub fn relationship_type_summary(&self) -> BTreeMap<String, usize> {
        self.graph.relationship_type_summary()
    }

    /// Patterns whose type equals `pattern_type` exactly.
    pub fn find_patterns_by_type(&self, pattern_type: &str) -> Vec<&CodePattern> {
        self.patterns
            .iter()
            .filter(|p| p.pattern_type == pattern_type)
            .collect()
    }

    /// Snapshot the whole graph. Never mutates state.
    pub fn export_graph(&self, destination: &ExportDestination) -> EngineResult<GraphDocument> {
        let document = GraphDocument::build(&self.graph, &self.patterns);
        if let ExportDestination::File(path) = destination {
            let text = export::export(&document, true)?;
            let io_error = |source| EngineError::Export {
                path: path.display().to_string(),
                source,
            };
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(io_error)?;
            }
            std::fs::write(path, text).map_err(io_error)?;
            tracing::info!("Graph data exported to {}", path.display());
        }
        Ok(document)
    }

    /// Ask the ranking collaborator which patterns fit a description.
    pub fn find_similar_patterns(
        &self,
        description: &str,
        pattern_type: Option<&str>,
    ) -> EngineResult<Vec<RankedPattern>> {
        let ranker = self.ranker.as_ref().ok_or(RankingError::Unavailable)?;
        let query = RankingQuery::from_config(
            description,
            pattern_type.map(str::to_string),
            &self.config.pattern_matching,
        );

        let candidates: Vec<&CodePattern> = self
            .patterns
            .iter()
            .filter(|p| pattern_type.map_or(true, |t| p.pattern_type == t))
            .collect();
        let features: Vec<PatternFeatures> = candidates
            .iter()
            .map(|p| PatternFeatures::from_pattern(p))
            .collect();

        let ranked = ranker.rank(&query, &features)?;
        tracing::debug!("{} ranked {} of {} patterns", ranker.name(), ranked.len(), features.len());
        Ok(apply_ranking(&query, &candidates, ranked))
    }

    /// Run a named operation with JSON arguments, returning a JSON result.
    ///
    /// | Operation | Arguments |
    /// |---|---|
    /// | `analyze_files` / `analyze_specific_files` | `file_paths: [string]` |
    /// | `get_node_types_summary` | |
    /// | `get_relationship_types_summary` | |
    /// | `find_patterns_by_type` | `pattern_type: string` |
    /// | `export_graph` / `export_graph_data` | `output_path?: string` |
    /// | `find_similar_patterns` | `description: string`, `pattern_type?: string` |
    pub fn dispatch(&mut self, operation: &str, arguments: &Value) -> EngineResult<Value> {
        match operation {
            "analyze_files" | "analyze_specific_files" => {
                let paths = string_list(arguments, "file_paths")?;
                let report = self.analyze_files(&paths)?;
                Ok(serde_json::to_value(report)?)
            }
            "get_node_types_summary" => Ok(json!(self.node_type_summary())),
            "get_relationship_types_summary" => Ok(json!(self.relationship_type_summary())),
            "find_patterns_by_type" => {
                let pattern_type = required_str(arguments, "pattern_type")?;
                Ok(serde_json::to_value(self.find_patterns_by_type(pattern_type))?)
            }
            "export_graph" | "export_graph_data" => {
                let destination = match optional_str(arguments, "output_path")? {
                    Some(path) => ExportDestination::File(PathBuf::from(path)),
                    None => ExportDestination::Memory,
                };
                Ok(serde_json::to_value(self.export_graph(&destination)?)?)
            }
            "find_similar_patterns" => {
                let description = required_str(arguments, "description")?;
                let pattern_type = optional_str(arguments, "pattern_type")?;
                Ok(serde_json::to_value(
                    self.find_similar_patterns(description, pattern_type)?,
                )?)
            }
            other => Err(EngineError::invalid_request(format!(
                "Unknown operation: {}",
                other
            ))),
        }
    }
}

fn optional_str<'a>(arguments: &'a Value, key: &str) -> EngineResult<Option<&'a str>> {
    match arguments.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(_) => Err(EngineError::invalid_request(format!(
            "Argument '{}' must be a string",
            key
        ))),
    }
}

fn required_str<'a>(arguments: &'a Value, key: &str) -> EngineResult<&'a str> {
    optional_str(arguments, key)?
        .ok_or_else(|| EngineError::invalid_request(format!("Missing argument: {}", key)))
}

fn string_list(arguments: &Value, key: &str) -> EngineResult<Vec<String>> {
    let invalid = || EngineError::invalid_request(format!("Argument '{}' must be a list of strings", key));
    let items = match arguments.get(key) {
        None | Some(Value::Null) => {
            return Err(EngineError::invalid_request(format!("Missing argument: {}", key)))
        }
        Some(Value::Array(items)) => items,
        Some(_) => return Err(invalid()),
    };
    items
        .iter()
        .map(|v| v.as_str().map(str::to_string).ok_or_else(invalid))
        .collect()
}
