//! Engine sessions against real and failing mirrors.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::json;
use tempfile::tempdir;
use weave_core::patterns::PatternFeatures;
use weave_core::{CodeGraph, WeaveConfig};
use weave_engine::introspect::{ColumnSchema, ForeignKeySchema};
use weave_engine::ranking::RankingResult;
use weave_engine::storage::PersistBatch;
use weave_engine::{
    Engine, EngineError, GraphMirror, Mirror, PatternRanker, RankingQuery, TableSchema,
};

const MANAGER: &str = r#"
namespace Shop.Logic
{
    public class OrderManager
    {
        public DataTable GetOrders()
        {
            var cmd = new SqlCommand("sp_GetOrders", conn);
            return Fill(cmd.ExecuteReader());
        }
    }
}
"#;

const PAGE: &str = r#"<%@ Page Language="C#" CodeBehind="Orders.aspx.cs" Inherits="Shop.Web.Orders" %>
<asp:GridView ID="gvOrders" runat="server" />
"#;

const PROCS: &str = r#"
CREATE PROCEDURE dbo.sp_GetOrders
AS
    SELECT o.OrderID FROM Orders o JOIN Customers c ON c.CustomerID = o.CustomerID
GO
"#;

fn project(root: &Path) {
    fs::create_dir_all(root.join("Logic")).unwrap();
    fs::create_dir_all(root.join("Web")).unwrap();
    fs::create_dir_all(root.join("Db")).unwrap();
    fs::create_dir_all(root.join("bin")).unwrap();
    fs::write(root.join("Logic/OrderManager.cs"), MANAGER).unwrap();
    fs::write(root.join("Web/Orders.aspx"), PAGE).unwrap();
    fs::write(root.join("Db/procs.sql"), PROCS).unwrap();
    fs::write(root.join("bin/Generated.cs"), "class Generated {}").unwrap();
    fs::write(root.join("README.md"), "# shop").unwrap();
}

fn root_arg(root: &Path) -> Vec<String> {
    vec![root.to_string_lossy().to_string()]
}

#[test]
fn test_directory_analysis() {
    let dir = tempdir().unwrap();
    project(dir.path());

    let mut engine = Engine::new(WeaveConfig::default());
    let report = engine.analyze_files(&root_arg(dir.path())).unwrap();

    assert_eq!(report.files_analyzed, 3);
    assert_eq!(report.files_skipped, 2);
    assert!(report.errors.is_empty());
    assert_eq!(report.patterns_identified, 2);

    let nodes = engine.node_type_summary();
    assert_eq!(nodes.get("stored_procedure"), Some(&1));
    assert_eq!(nodes.get("table"), Some(&2));
    assert_eq!(nodes.get("page"), Some(&1));

    let rels = engine.relationship_type_summary();
    assert_eq!(rels.get("database_access"), Some(&1));
    assert_eq!(rels.get("depends_on"), Some(&2));
    assert_eq!(rels.get("codebehind"), Some(&1));
}

#[test]
fn test_cross_session_recall() {
    let dir = tempdir().unwrap();
    project(dir.path());
    let config = WeaveConfig::default();

    let (summary, relationships, pattern_ids) = {
        let mut engine = Engine::open(config.clone(), dir.path()).unwrap();
        engine.analyze_files(&root_arg(dir.path())).unwrap();
        assert!(!engine.has_pending_writes());
        let ids: Vec<String> = engine.patterns().iter().map(|p| p.pattern_id.clone()).collect();
        (
            engine.node_type_summary(),
            engine.relationship_type_summary(),
            ids,
        )
    };

    {
        let engine = Engine::open(config.clone(), dir.path()).unwrap();
        assert_eq!(engine.node_type_summary(), summary);
        assert_eq!(engine.relationship_type_summary(), relationships);
        let ids: Vec<String> = engine.patterns().iter().map(|p| p.pattern_id.clone()).collect();
        assert_eq!(ids, pattern_ids);
    }

    let mirror = GraphMirror::open(config.database_path(dir.path())).unwrap();
    let mut stored = mirror.pattern_ids().unwrap();
    stored.sort();
    let mut expected = pattern_ids.clone();
    expected.sort();
    assert_eq!(stored, expected);
}

#[test]
fn test_persist_disabled_keeps_memory_only() {
    let dir = tempdir().unwrap();
    project(dir.path());
    let mut config = WeaveConfig::default();
    config.storage.persist = false;

    let mut engine = Engine::open(config.clone(), dir.path()).unwrap();
    engine.analyze_files(&root_arg(dir.path())).unwrap();
    assert!(!config.database_path(dir.path()).exists());
}

/// Mirror that fails while `fail` is set.
struct FlakyMirror {
    inner: Arc<GraphMirror>,
    fail: Arc<AtomicBool>,
}

impl Mirror for FlakyMirror {
    fn persist(&self, batch: &PersistBatch<'_>) -> anyhow::Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("disk full");
        }
        self.inner.persist(batch)
    }

    fn load_graph(&self) -> anyhow::Result<CodeGraph> {
        self.inner.load_graph()
    }
}

#[test]
fn test_persistence_failure_keeps_memory_and_retries() {
    let dir = tempdir().unwrap();
    project(dir.path());

    let inner = Arc::new(GraphMirror::open_in_memory().unwrap());
    let fail = Arc::new(AtomicBool::new(true));
    let mut engine = Engine::with_mirror(
        WeaveConfig::default(),
        FlakyMirror {
            inner: inner.clone(),
            fail: fail.clone(),
        },
    );

    let err = engine.analyze_files(&root_arg(dir.path())).unwrap_err();
    assert!(matches!(err, EngineError::Persistence { .. }));
    assert!(err.to_string().contains("disk full"));
    let report = err.report().unwrap();
    assert_eq!(report.files_analyzed, 3);

    // memory is authoritative
    let nodes_in_memory = engine.graph().node_count();
    assert_eq!(nodes_in_memory, report.nodes_created);
    assert_eq!(engine.patterns().len(), 2);
    assert!(engine.has_pending_writes());
    assert_eq!(inner.stats().unwrap().node_count, 0);

    fail.store(false, Ordering::SeqCst);
    engine.flush_pending().unwrap();
    assert!(!engine.has_pending_writes());

    let stats = inner.stats().unwrap();
    assert_eq!(stats.node_count, nodes_in_memory);
    assert_eq!(stats.relationship_count, engine.graph().relationship_count());
    assert_eq!(stats.pattern_count, 2);
}

#[test]
fn test_schema_ingestion() {
    let mut engine = Engine::new(WeaveConfig::default());
    let tables = vec![TableSchema {
        name: "Invoices".to_string(),
        schema: Some("dbo".to_string()),
        columns: vec![ColumnSchema {
            name: "InvoiceID".to_string(),
            data_type: "int".to_string(),
            nullable: false,
            is_primary_key: true,
        }],
        foreign_keys: vec![ForeignKeySchema {
            column: "OrderID".to_string(),
            referenced_table: "Orders".to_string(),
            referenced_column: "OrderID".to_string(),
        }],
        related_procedures: vec!["sp_GetInvoices".to_string()],
    }];

    let report = engine.ingest_schema(&tables).unwrap();
    assert_eq!(report.nodes_created, 3);
    assert_eq!(report.relationships_found, 2);
    assert_eq!(engine.relationship_type_summary().get("foreign_key"), Some(&1));
}

/// Scores a pattern by the share of its name tokens found in the description.
struct TokenOverlap;

impl PatternRanker for TokenOverlap {
    fn rank(
        &self,
        query: &RankingQuery,
        candidates: &[PatternFeatures],
    ) -> RankingResult<Vec<(String, f64)>> {
        let description = query.description.to_lowercase();
        let mut scored: Vec<(String, f64)> = candidates
            .iter()
            .map(|c| {
                let hits = c
                    .name_tokens
                    .iter()
                    .filter(|t| description.contains(t.as_str()))
                    .count();
                let score = hits as f64 / c.name_tokens.len().max(1) as f64;
                (c.pattern_id.clone(), score)
            })
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        Ok(scored)
    }

    fn name(&self) -> &str {
        "token-overlap"
    }
}

#[test]
fn test_similar_patterns_through_ranker() {
    let dir = tempdir().unwrap();
    project(dir.path());
    let mut config = WeaveConfig::default();
    config.pattern_matching.similarity_threshold = 0.5;

    let mut engine = Engine::new(config);
    engine.analyze_files(&root_arg(dir.path())).unwrap();
    engine.set_ranker(Box::new(TokenOverlap));

    let results = engine
        .find_similar_patterns("order manager that gets orders", Some("database_crud"))
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].pattern.pattern_id, "crud_order");
    assert_eq!(results[0].pattern.similarity_score, results[0].score);

    let via_dispatch = engine
        .dispatch(
            "find_similar_patterns",
            &json!({"description": "order manager that gets orders"}),
        )
        .unwrap();
    assert!(!via_dispatch.as_array().unwrap().is_empty());
}
