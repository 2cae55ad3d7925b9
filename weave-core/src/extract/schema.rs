//! Schema-definition extractor for `.sql` files.
//!
//! Keywords match case-insensitively; identifiers keep the case they were
//! written in. A procedure body runs until `GO` or the next `CREATE`/`ALTER`
//! of a schema object, and table references inside it become `depends_on`
//! edges.

use once_cell::sync::Lazy;
use regex::Regex;

use super::text::split_qualified;
use super::{Extraction, Extractor, SourceKind};
use crate::types::{table_id, CodeNode, CodeRelationship, Endpoint, NodeKind, RelationshipType};

/// Confidence of procedure→table edges inferred from DML text.
pub const DEPENDS_ON_CONFIDENCE: f64 = 0.9;

/// `[dbo].[Name]`, `dbo.Name`, `Name`, `#temp`, `@var`.
const IDENT: &str = r"((?:\[[^\]]+\]|[#@]?\w+)(?:\s*\.\s*(?:\[[^\]]+\]|\w+)){0,3})";

static CREATE_PROC_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)\b(CREATE|ALTER)\s+(?:OR\s+ALTER\s+)?PROC(?:EDURE)?\s+{}",
        IDENT
    ))
    .unwrap()
});

static CREATE_TABLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"(?i)\bCREATE\s+TABLE\s+{}", IDENT)).unwrap());

static ALTER_TABLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"(?i)\bALTER\s+TABLE\s+{}", IDENT)).unwrap());

static OTHER_OBJECT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:CREATE|ALTER)\s+(?:OR\s+ALTER\s+)?(?:VIEW|FUNCTION|TRIGGER|INDEX|TYPE|SCHEMA)\b")
        .unwrap()
});

static TABLE_REF_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)\b(DELETE\s+FROM|FROM|JOIN|UPDATE|INSERT\s+INTO)\s+{}",
        IDENT
    ))
    .unwrap()
});

static REFERENCES_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"(?i)\bREFERENCES\s+{}", IDENT)).unwrap());

static GO_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^\s*GO\s*$").unwrap());

/// Words that follow a DML keyword without being a table.
const NOT_TABLES: &[&str] = &[
    "select", "set", "where", "statistics", "openjson", "openquery", "openrowset", "values",
    "dual", "cascade", "no",
];

/// Schema extractor.
pub struct SchemaExtractor;

#[derive(Debug, Clone)]
enum Current {
    None,
    Procedure(String),
    Table(String),
}

impl Extractor for SchemaExtractor {
    fn kind(&self) -> SourceKind {
        SourceKind::Schema
    }

    fn extract(&self, file_path: &str, content: &str) -> Extraction {
        let mut out = Extraction::new();
        let mut current = Current::None;
        let cleaned = strip_sql_noise(content);

        for (idx, line) in cleaned.lines().enumerate() {
            let line_number = idx as u32 + 1;

            if GO_RE.is_match(line) {
                current = Current::None;
                continue;
            }

            if let Some(caps) = CREATE_PROC_RE.captures(line) {
                let (schema, name) = split_qualified(&caps[2]);
                if !name.is_empty() {
                    let mut node = CodeNode::stored_procedure_at(&name, file_path, line_number)
                        .with_meta("statement", caps[1].to_lowercase());
                    if let Some(schema) = schema {
                        node = node.with_meta("schema", schema);
                    }
                    let id = node.id.clone();
                    if !out.push_node(node.clone()) {
                        if let Some(existing) = out.node_mut(&id) {
                            *existing = node;
                        }
                    }
                    current = Current::Procedure(id);
                }
            } else if let Some(caps) = CREATE_TABLE_RE.captures(line) {
                let (schema, name) = split_qualified(&caps[1]);
                current = if is_table_name(&name) {
                    let mut node = CodeNode::table(&name);
                    node.file_path = file_path.to_string();
                    node.line_number = line_number;
                    node.metadata.remove("database_object");
                    if let Some(schema) = schema {
                        node = node.with_meta("schema", schema);
                    }
                    let id = node.id.clone();
                    if !out.push_node(node.clone()) {
                        if let Some(existing) = out.node_mut(&id) {
                            *existing = node;
                        }
                    }
                    Current::Table(id)
                } else {
                    Current::None
                };
            } else if let Some(caps) = ALTER_TABLE_RE.captures(line) {
                let (_, name) = split_qualified(&caps[1]);
                current = if is_table_name(&name) {
                    Current::Table(table_id(&name))
                } else {
                    Current::None
                };
            } else if OTHER_OBJECT_RE.is_match(line) {
                current = Current::None;
            }

            for caps in TABLE_REF_RE.captures_iter(line) {
                let (_, name) = split_qualified(&caps[2]);
                if !is_table_name(&name) {
                    continue;
                }
                let operation = match caps[1].split_whitespace().next().map(|k| k.to_lowercase()) {
                    Some(k) if k == "from" => "select".to_string(),
                    Some(k) => k,
                    None => continue,
                };

                out.push_node(CodeNode::table(&name));
                if let Current::Procedure(proc_id) = &current {
                    out.push_relationship(
                        CodeRelationship::new(
                            Endpoint::node(proc_id.as_str()),
                            Endpoint::node(table_id(&name)),
                            RelationshipType::DependsOn,
                        )
                        .with_confidence(DEPENDS_ON_CONFIDENCE)
                        .with_meta("operation", operation)
                        .with_meta("line_number", line_number),
                    );
                }
            }

            if let Current::Table(owner) = &current {
                for caps in REFERENCES_RE.captures_iter(line) {
                    let (_, name) = split_qualified(&caps[1]);
                    if !is_table_name(&name) {
                        continue;
                    }
                    out.push_node(CodeNode::table(&name));
                    out.push_relationship(
                        CodeRelationship::new(
                            Endpoint::node(owner.as_str()),
                            Endpoint::node(table_id(&name)),
                            RelationshipType::ForeignKey,
                        )
                        .with_meta("line_number", line_number),
                    );
                }
            }
        }

        out
    }
}

fn is_table_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('#')
        && !name.starts_with('@')
        && !NOT_TABLES.contains(&name.to_lowercase().as_str())
}

/// Drop `--` and `/* */` comments and blank out string literals, keeping
/// line breaks so line numbers survive.
fn strip_sql_noise(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    let mut chars = content.chars().peekable();
    let mut in_block = false;
    let mut in_line = false;
    let mut in_string = false;

    while let Some(c) = chars.next() {
        if c == '\n' {
            in_line = false;
            out.push('\n');
            continue;
        }
        if in_line {
            continue;
        }
        if in_block {
            if c == '*' && chars.peek() == Some(&'/') {
                chars.next();
                in_block = false;
            }
            out.push(' ');
            continue;
        }
        if in_string {
            if c == '\'' {
                if chars.peek() == Some(&'\'') {
                    chars.next();
                } else {
                    in_string = false;
                    out.push('\'');
                    continue;
                }
            }
            out.push(' ');
            continue;
        }
        match c {
            '-' if chars.peek() == Some(&'-') => in_line = true,
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                in_block = true;
                out.push(' ');
            }
            '\'' => {
                in_string = true;
                out.push('\'');
            }
            _ => out.push(c),
        }
    }
    out
}
