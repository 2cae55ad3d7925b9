//! Schema introspection collaborator.
//!
//! Database connectivity lives outside the engine. A [`SchemaSource`]
//! reports tables as plain records and the engine folds them into the graph
//! as `table` nodes, `foreign_key` edges and procedure `depends_on` edges.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use weave_core::extract::Extraction;
use weave_core::types::{procedure_id, table_id};
use weave_core::{CodeNode, CodeRelationship, Endpoint, RelationshipType};

/// Error type for introspection.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// The source could not be reached
    #[error("schema source unavailable: {0}")]
    Unavailable(String),

    /// The source answered with something unusable
    #[error("schema query failed: {0}")]
    Query(String),
}

/// Result type for introspection.
pub type SchemaResult<T> = Result<T, SchemaError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    pub data_type: String,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub is_primary_key: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKeySchema {
    pub column: String,
    pub referenced_table: String,
    pub referenced_column: String,
}

/// One table as reported by the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub columns: Vec<ColumnSchema>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKeySchema>,
    /// Procedures known to read or write this table.
    #[serde(default)]
    pub related_procedures: Vec<String>,
}

/// Thin query interface over a live database.
pub trait SchemaSource: Send + Sync {
    fn tables(&self) -> SchemaResult<Vec<TableSchema>>;
}

/// A fixed list of tables, e.g. read from a JSON dump.
impl SchemaSource for Vec<TableSchema> {
    fn tables(&self) -> SchemaResult<Vec<TableSchema>> {
        Ok(self.clone())
    }
}

/// Fold table records into graph elements.
pub fn schema_extraction(tables: &[TableSchema]) -> Extraction {
    let mut out = Extraction::new();

    // all declared tables first, so a table only seen as a foreign key
    // target does not shadow its full record
    for table in tables {
        let columns: Vec<Value> = table
            .columns
            .iter()
            .map(|c| {
                json!({
                    "name": c.name,
                    "data_type": c.data_type,
                    "nullable": c.nullable,
                    "is_primary_key": c.is_primary_key,
                })
            })
            .collect();
        let primary_key: Vec<&str> = table
            .columns
            .iter()
            .filter(|c| c.is_primary_key)
            .map(|c| c.name.as_str())
            .collect();
        let mut node = CodeNode::table(&table.name)
            .with_meta("columns", columns)
            .with_meta("primary_key", primary_key)
            .with_meta("source", "introspection");
        if let Some(schema) = &table.schema {
            node = node.with_meta("schema", schema.as_str());
        }
        out.push_node(node);
    }

    for table in tables {
        let id = table_id(&table.name);
        for fk in &table.foreign_keys {
            out.push_node(CodeNode::table(&fk.referenced_table));
            out.push_relationship(
                CodeRelationship::new(
                    Endpoint::node(id.as_str()),
                    Endpoint::node(table_id(&fk.referenced_table)),
                    RelationshipType::ForeignKey,
                )
                .with_meta("column", fk.column.as_str())
                .with_meta("referenced_column", fk.referenced_column.as_str()),
            );
        }
        for procedure in &table.related_procedures {
            out.push_node(CodeNode::stored_procedure(procedure));
            out.push_relationship(
                CodeRelationship::new(
                    Endpoint::node(procedure_id(procedure)),
                    Endpoint::node(id.as_str()),
                    RelationshipType::DependsOn,
                )
                .with_meta("source", "introspection"),
            );
        }
    }

    out
}
