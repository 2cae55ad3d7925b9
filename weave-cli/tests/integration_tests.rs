//! Integration tests for the weave CLI
//!
//! Runs the binary against small projects in temp directories.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

// ============================================================================
// Test Utilities
// ============================================================================

/// Run weave with the given args inside `dir`
fn run_weave(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_weave"))
        .current_dir(dir)
        .env_remove("WEAVE_CONFIG_DIR")
        .env_remove("RUST_LOG")
        .args(args)
        .output()
        .expect("Failed to execute weave command")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

fn json(output: &Output) -> serde_json::Value {
    serde_json::from_str(&stdout(output)).expect("stdout is not JSON")
}

/// A web project with one manager class, one page and one procedure script
fn setup_sample_project(dir: &Path) {
    fs::create_dir_all(dir.join("Logic")).unwrap();
    fs::create_dir_all(dir.join("Web")).unwrap();
    fs::create_dir_all(dir.join("Db")).unwrap();

    fs::write(
        dir.join("Logic/CustomerManager.cs"),
        r#"
namespace Shop.Logic
{
    public class CustomerManager
    {
        public DataTable GetCustomers()
        {
            var cmd = new SqlCommand("sp_GetCustomers", conn);
            return Fill(cmd);
        }

        public void SaveCustomer(int id)
        {
            var cmd = new SqlCommand("sp_SaveCustomer", conn);
            cmd.ExecuteNonQuery();
        }
    }
}
"#,
    )
    .unwrap();

    fs::write(
        dir.join("Web/Customers.aspx"),
        r#"<%@ Page Language="C#" CodeBehind="Customers.aspx.cs" Inherits="Shop.Web.Customers" %>
<asp:GridView ID="gvCustomers" runat="server" />
<asp:Button ID="btnSave" runat="server" Text="Save" />
"#,
    )
    .unwrap();

    fs::write(
        dir.join("Db/customers.sql"),
        r#"
CREATE PROCEDURE dbo.sp_GetCustomers
AS
    SELECT CustomerID, Name FROM Customers
GO
"#,
    )
    .unwrap();
}

fn analyzed_project() -> TempDir {
    let dir = TempDir::new().unwrap();
    setup_sample_project(dir.path());
    let output = run_weave(dir.path(), &["analyze", ".", "--format", "json"]);
    assert!(output.status.success(), "analyze failed: {}", stderr(&output));
    dir
}

// ============================================================================
// Commands
// ============================================================================

#[test]
fn test_no_command_prints_help() {
    let dir = TempDir::new().unwrap();
    let output = run_weave(dir.path(), &[]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("Usage"));
}

#[test]
fn test_analyze_reports_counts() {
    let dir = TempDir::new().unwrap();
    setup_sample_project(dir.path());

    let output = run_weave(dir.path(), &["analyze", ".", "--format", "json"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let report = json(&output);
    assert_eq!(report["files_analyzed"], 3);
    assert_eq!(report["patterns_identified"], 2);
    assert_eq!(report["persisted"], true);
    assert!(dir.path().join(".weave/graph.duckdb").exists());
}

#[test]
fn test_analyze_no_persist() {
    let dir = TempDir::new().unwrap();
    setup_sample_project(dir.path());

    let output = run_weave(dir.path(), &["analyze", "Logic", "--no-persist", "--format", "json"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(json(&output)["files_analyzed"], 1);
    assert!(!dir.path().join(".weave").exists());
}

#[test]
fn test_dotted_and_plain_paths_share_ids() {
    let dir = TempDir::new().unwrap();
    setup_sample_project(dir.path());

    let output = run_weave(
        dir.path(),
        &[
            "analyze",
            "./Logic/CustomerManager.cs",
            "Logic/CustomerManager.cs",
            "--no-persist",
            "--format",
            "json",
        ],
    );
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let report = json(&output);
    assert_eq!(report["files_analyzed"], 1);
    assert_eq!(report["nodes_updated"], 0);
}

#[test]
fn test_summary_reads_stored_graph() {
    let dir = analyzed_project();

    let output = run_weave(dir.path(), &["summary", "--format", "json"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let summary = json(&output);
    assert_eq!(summary["node_types"]["class"], 1);
    assert_eq!(summary["node_types"]["method"], 2);
    assert_eq!(summary["node_types"]["page"], 1);
    assert_eq!(summary["relationship_types"]["database_access"], 2);
    assert_eq!(summary["pattern_count"], 2);
}

#[test]
fn test_summary_table() {
    let dir = analyzed_project();

    let output = run_weave(dir.path(), &["summary"]);
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("NODES:"));
    assert!(text.contains("RELATIONSHIPS:"));
    assert!(text.contains("stored_procedure"));
}

#[test]
fn test_patterns_by_type() {
    let dir = analyzed_project();

    let output = run_weave(dir.path(), &["patterns", "database_crud", "--format", "json"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let list = json(&output);
    let patterns = list["patterns"].as_array().unwrap();
    assert_eq!(patterns.len(), 1);
    assert_eq!(patterns[0]["pattern_id"], "crud_customer");
    assert_eq!(patterns[0]["template_data"]["table_name"], "Customers");

    let output = run_weave(dir.path(), &["patterns", "wizard"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("No patterns of type 'wizard'."));
}

#[test]
fn test_export_to_file() {
    let dir = analyzed_project();

    let output = run_weave(dir.path(), &["export", "--output", "out/graph.json"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("SUCCESS:"));

    let content = fs::read_to_string(dir.path().join("out/graph.json")).unwrap();
    let document: serde_json::Value = serde_json::from_str(&content).unwrap();
    assert_eq!(document["patterns"].as_array().unwrap().len(), 2);
    assert!(document["summary"]["node_types"].is_object());
}

#[test]
fn test_export_to_stdout() {
    let dir = analyzed_project();

    let output = run_weave(dir.path(), &["export"]);
    assert!(output.status.success());
    let document = json(&output);
    assert!(!document["nodes"].as_array().unwrap().is_empty());
    assert!(document["generated_at"].is_string());
}

#[test]
fn test_call_operation() {
    let dir = analyzed_project();

    let output = run_weave(
        dir.path(),
        &[
            "call",
            "find_patterns_by_type",
            "--args",
            r#"{"pattern_type": "aspx_page"}"#,
        ],
    );
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let patterns = json(&output);
    assert_eq!(patterns[0]["pattern_id"], "page_customers");
    assert_eq!(patterns[0]["template_data"]["control_count"], 2);
}

#[test]
fn test_call_unknown_operation_fails() {
    let dir = TempDir::new().unwrap();
    let output = run_weave(dir.path(), &["call", "drop_everything"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Unknown operation: drop_everything"));
}

// ============================================================================
// Configuration
// ============================================================================

#[test]
fn test_config_dir_and_custom_database() {
    let project = TempDir::new().unwrap();
    setup_sample_project(project.path());
    let state = TempDir::new().unwrap();
    fs::write(
        state.path().join(".weaverc.toml"),
        "[storage]\ndatabase = \"graphs/shop.duckdb\"\n",
    )
    .unwrap();

    let config_dir = state.path().to_string_lossy().to_string();
    let output = run_weave(
        project.path(),
        &["--config-dir", &config_dir, "analyze", ".", "--quiet"],
    );
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(state.path().join("graphs/shop.duckdb").exists());
    assert!(!project.path().join(".weave").exists());
}

#[test]
fn test_strict_rejects_broken_config() {
    let dir = TempDir::new().unwrap();
    setup_sample_project(dir.path());
    fs::write(dir.path().join(".weaverc.toml"), "[storage\npersist = ").unwrap();

    let strict = run_weave(dir.path(), &["--strict", "summary"]);
    assert!(!strict.status.success());

    let lenient = run_weave(dir.path(), &["summary", "--format", "json"]);
    assert!(lenient.status.success(), "stderr: {}", stderr(&lenient));
}
