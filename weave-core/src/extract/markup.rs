//! Page/view markup extractor for `.aspx`, `.ascx` and `.master` files.
//!
//! Works on the whole document rather than line by line because server
//! control tags routinely span several lines.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

use super::text::{page_stem, sibling_path, LineIndex};
use super::{Extraction, Extractor, SourceKind, DB_ACCESS_CONFIDENCE};
use crate::types::{
    node_id, procedure_id, CodeNode, CodeRelationship, Endpoint, NodeKind, RelationshipType,
};

static DIRECTIVE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<%@\s*(Page|Control|Master)\b(.*?)%>").unwrap());


static REGISTER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<%@\s*Register\b.*?\bTagPrefix\s*=\s*"(\w+)".*?%>"#).unwrap()
});

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<(\w+):(\w+)\b([^>]*)>").unwrap());

/// One `name="value"` pair; the name starts the input or follows whitespace.
static ATTR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?:^|\s)([\w:.-]+)\s*=\s*"([^"]*)""#).unwrap());

static COMMAND_ATTR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)(?:^|\s)(Select|Insert|Update|Delete)Command\s*=\s*"([^"]+)""#).unwrap()
});

static PROC_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:(?i:exec(?:ute)?)\s+)?(?:\[?\w+\]?\.)?\[?((?:sp|usp)_\w+)\]?").unwrap()
});

static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:\[?\w+\]?\.)?\[?(\w+)\]?\s*$").unwrap());

/// Markup extractor. Always yields exactly one page node per file.
pub struct MarkupExtractor;

impl Extractor for MarkupExtractor {
    fn kind(&self) -> SourceKind {
        SourceKind::Markup
    }

    fn extract(&self, file_path: &str, content: &str) -> Extraction {
        let mut out = Extraction::new();
        let lines = LineIndex::new(content);

        let stem = page_stem(file_path);
        let page_type = std::path::Path::new(file_path)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("aspx")
            .to_lowercase();
        let mut page = CodeNode::new(NodeKind::Page, file_path, &stem, stem.as_str(), 1)
            .with_meta("page_type", page_type);

        let directive = DIRECTIVE_RE.captures(content);
        let mut codebehind = None;
        if let Some(caps) = &directive {
            let attributes = &caps[2];
            page = page.with_meta("directive", caps[1].to_string());
            for (key, attr) in [
                ("inherits", "Inherits"),
                ("master_page_file", "MasterPageFile"),
                ("language", "Language"),
            ] {
                if let Some(value) = attribute(attributes, attr) {
                    page = page.with_meta(key, value);
                }
            }
            codebehind = attribute(attributes, "CodeBehind")
                .or_else(|| attribute(attributes, "CodeFile"))
                .map(str::to_string);
        }
        if let Some(cb) = &codebehind {
            page = page.with_meta("codebehind", cb.as_str());
        }

        let page_id = page.id.clone();
        out.push_node(page);

        if let Some(cb) = codebehind {
            let target = format!("{}:class:*", sibling_path(file_path, &cb));
            out.push_relationship(
                CodeRelationship::new(
                    Endpoint::node(page_id.as_str()),
                    Endpoint::wildcard(target),
                    RelationshipType::Codebehind,
                )
                .with_meta("codebehind_file", cb),
            );
        }

        let mut prefixes: HashSet<String> = HashSet::from(["asp".to_string()]);
        for caps in REGISTER_RE.captures_iter(content) {
            prefixes.insert(caps[1].to_lowercase());
        }

        for caps in TAG_RE.captures_iter(content) {
            let prefix = &caps[1];
            if !prefixes.contains(&prefix.to_lowercase()) {
                continue;
            }
            let control_type = &caps[2];
            let attributes = &caps[3];
            let Some(control_id) = attribute(attributes, "ID").map(str::to_string) else {
                continue;
            };
            let line = caps.get(0).map(|m| lines.line_of(m.start())).unwrap_or(1);

            let node = CodeNode::new(NodeKind::Control, file_path, &control_id, control_id.as_str(), line)
                .with_meta("control_type", control_type)
                .with_meta("tag_prefix", prefix);
            let control_node_id = node.id.clone();
            if !out.push_node(node) {
                continue;
            }
            out.push_relationship(CodeRelationship::contains(
                &page_id,
                &control_node_id,
                "page_contains_control",
            ));

            if let Some(ds) = attribute(attributes, "DataSourceID") {
                let target = node_id(file_path, NodeKind::Control, ds);
                out.push_relationship(
                    CodeRelationship::new(
                        Endpoint::node(control_node_id.as_str()),
                        Endpoint::node(target),
                        RelationshipType::References,
                    )
                    .with_meta("attribute", "DataSourceID")
                    .with_meta("line_number", line),
                );
            }

            for cmd in COMMAND_ATTR_RE.captures_iter(attributes) {
                let operation = cmd[1].to_lowercase();
                let Some(procedure) = command_procedure(attributes, &cmd[1], &cmd[2]) else {
                    continue;
                };
                out.push_node(CodeNode::stored_procedure(&procedure));
                out.push_relationship(
                    CodeRelationship::new(
                        Endpoint::node(control_node_id.as_str()),
                        Endpoint::node(procedure_id(&procedure)),
                        RelationshipType::DatabaseAccess,
                    )
                    .with_confidence(DB_ACCESS_CONFIDENCE)
                    .with_meta("operation", operation)
                    .with_meta("line_number", line),
                );
            }
        }

        out
    }
}

/// The first non-empty value of attribute `name`, compared case-insensitively.
fn attribute<'a>(attributes: &'a str, name: &str) -> Option<&'a str> {
    ATTR_RE
        .captures_iter(attributes)
        .filter(|c| c[1].eq_ignore_ascii_case(name))
        .filter_map(|c| c.get(2))
        .map(|m| m.as_str())
        .find(|value| !value.is_empty())
}

/// The procedure named by a `<Op>Command` attribute: anything with the
/// `sp_`/`usp_` prefix, or a bare identifier when `<Op>CommandType` says
/// it is a stored procedure.
fn command_procedure(attributes: &str, operation: &str, command: &str) -> Option<String> {
    if let Some(caps) = PROC_NAME_RE.captures(command) {
        return Some(caps[1].to_string());
    }
    let command_type = attribute(attributes, &format!("{}CommandType", operation))?;
    if !command_type.eq_ignore_ascii_case("StoredProcedure") {
        return None;
    }
    IDENTIFIER_RE.captures(command).map(|c| c[1].to_string())
}
