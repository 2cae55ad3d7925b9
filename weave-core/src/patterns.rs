//! Pattern recognition over the accumulated graph.
//!
//! Recognizers are batch passes: they read the whole node/edge set and emit
//! patterns in the order their defining nodes appear. Nothing is cached
//! between runs, so the same graph always yields the same list.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::graph::CodeGraph;
use crate::types::{
    node_id, CodeNode, CodePattern, CodeRelationship, Metadata, NodeKind, RelationshipType,
    PATTERN_ASPX_PAGE, PATTERN_DATABASE_CRUD,
};

/// Class-name suffix that marks a data-access manager.
pub const MANAGER_SUFFIX: &str = "Manager";

pub const CRUD_SIMILARITY: f64 = 0.8;
pub const PAGE_SIMILARITY: f64 = 0.7;

/// A batch pass producing patterns from the current graph.
pub trait PatternRecognizer: Send + Sync {
    /// Pattern type this recognizer emits.
    fn pattern_type(&self) -> &'static str;

    fn recognize(&self, graph: &CodeGraph) -> Vec<CodePattern>;
}

/// The default recognizer set, in run order.
pub fn default_recognizers() -> Vec<Box<dyn PatternRecognizer>> {
    vec![Box::new(CrudRecognizer), Box::new(PageRecognizer)]
}

/// Run every recognizer and make pattern ids unique within the run.
///
/// Each pattern is tagged with the type of the recognizer that produced it.
pub fn recognize_all(
    recognizers: &[Box<dyn PatternRecognizer>],
    graph: &CodeGraph,
) -> Vec<CodePattern> {
    let mut patterns: Vec<CodePattern> = recognizers
        .iter()
        .flat_map(|r| {
            let pattern_type = r.pattern_type();
            r.recognize(graph).into_iter().map(move |mut pattern| {
                pattern.pattern_type = pattern_type.to_string();
                pattern
            })
        })
        .collect();
    dedupe_ids(&mut patterns);
    patterns
}

/// Suffix colliding ids with `_2`, `_3`, ... in encounter order.
fn dedupe_ids(patterns: &mut [CodePattern]) {
    let mut taken: HashSet<String> = HashSet::new();
    let mut counters: HashMap<String, usize> = HashMap::new();
    for pattern in patterns.iter_mut() {
        if taken.insert(pattern.pattern_id.clone()) {
            continue;
        }
        let base = pattern.pattern_id.clone();
        let counter = counters.entry(base.clone()).or_insert(1);
        loop {
            *counter += 1;
            let candidate = format!("{}_{}", base, counter);
            if taken.insert(candidate.clone()) {
                pattern.pattern_id = candidate;
                break;
            }
        }
    }
}

/// Groups `*Manager` classes by entity name.
pub struct CrudRecognizer;

impl PatternRecognizer for CrudRecognizer {
    fn pattern_type(&self) -> &'static str {
        PATTERN_DATABASE_CRUD
    }

    fn recognize(&self, graph: &CodeGraph) -> Vec<CodePattern> {
        let mut groups: IndexMap<String, Vec<&CodeNode>> = IndexMap::new();
        for class in graph.nodes_of_kind(NodeKind::Class) {
            let Some(entity) = class.name.strip_suffix(MANAGER_SUFFIX) else {
                continue;
            };
            if entity.is_empty() {
                continue;
            }
            groups.entry(entity.to_string()).or_default().push(class);
        }

        groups
            .into_iter()
            .map(|(entity, classes)| crud_pattern(graph, &entity, &classes))
            .collect()
    }
}

fn crud_pattern(graph: &CodeGraph, entity: &str, classes: &[&CodeNode]) -> CodePattern {
    let mut members: Vec<&CodeNode> = classes.to_vec();
    let mut methods: Vec<&CodeNode> = Vec::new();
    let mut relationships: Vec<CodeRelationship> = Vec::new();

    for class in classes {
        for rel in graph.incident(&class.id) {
            if rel.relationship_type != RelationshipType::Contains
                || rel.source.as_node() != Some(class.id.as_str())
            {
                continue;
            }
            let Some(child) = rel.target.as_node().and_then(|id| graph.node(id)) else {
                continue;
            };
            if child.kind == NodeKind::Method && !methods.iter().any(|m| m.id == child.id) {
                methods.push(child);
            }
        }
    }
    members.extend(methods.iter().copied());

    // Database access attributed to a manager method, or to "some method"
    // of a manager class when the call site was outside any method.
    let mut procedures: Vec<&CodeNode> = Vec::new();
    let mut wildcard_edges: Vec<&CodeRelationship> = Vec::new();
    for class in classes {
        if let Some(qualifier) = class
            .id
            .strip_prefix(&format!("{}:class:", class.file_path))
        {
            let pattern = node_id(&class.file_path, NodeKind::Method, &format!("{}:*", qualifier));
            wildcard_edges.extend(graph.from_wildcard(&pattern));
        }
    }
    let method_edges = graph
        .incident_any(methods.iter().map(|m| m.id.as_str()))
        .into_iter()
        .filter(|rel| methods.iter().any(|m| rel.source.as_node() == Some(m.id.as_str())));
    for rel in method_edges.chain(wildcard_edges.iter().copied()) {
        if rel.relationship_type != RelationshipType::DatabaseAccess {
            continue;
        }
        if let Some(proc) = rel.target.as_node().and_then(|id| graph.node(id)) {
            if !procedures.iter().any(|p| p.id == proc.id) {
                procedures.push(proc);
            }
        }
    }
    members.extend(procedures.iter().copied());

    let member_ids: Vec<&str> = members.iter().map(|n| n.id.as_str()).collect();
    relationships.extend(graph.incident_any(member_ids.iter().copied()).into_iter().cloned());
    // wildcard-sourced edges are only incident when their target is a member
    relationships.extend(
        wildcard_edges
            .into_iter()
            .filter(|rel| !rel.target.as_node().is_some_and(|t| member_ids.contains(&t)))
            .cloned(),
    );

    let mut template = Metadata::new();
    template.insert("entity_name".into(), entity.into());
    template.insert("table_name".into(), pluralize(entity).into());
    template.insert("primary_key".into(), format!("{}ID", entity).into());
    template.insert(
        "manager_class".into(),
        format!("{}{}", entity, MANAGER_SUFFIX).into(),
    );
    template.insert("methods".into(), unique_names(&methods));
    template.insert("stored_procedures".into(), unique_names(&procedures));

    CodePattern {
        pattern_id: format!("crud_{}", entity.to_lowercase()),
        pattern_type: PATTERN_DATABASE_CRUD.to_string(),
        files: member_files(&members),
        nodes: members.into_iter().cloned().collect(),
        relationships,
        template_data: template,
        similarity_score: CRUD_SIMILARITY,
    }
}

/// Groups each page with the nodes one hop away from it.
pub struct PageRecognizer;

impl PatternRecognizer for PageRecognizer {
    fn pattern_type(&self) -> &'static str {
        PATTERN_ASPX_PAGE
    }

    fn recognize(&self, graph: &CodeGraph) -> Vec<CodePattern> {
        let mut patterns = Vec::new();
        for page in graph.nodes_of_kind(NodeKind::Page) {
            let related = graph.neighbors(&page.id);
            if related.is_empty() {
                continue;
            }

            let control_count = related
                .iter()
                .filter(|n| n.kind == NodeKind::Control)
                .count();
            let mut template = Metadata::new();
            template.insert("page_name".into(), page.name.as_str().into());
            template.insert("control_count".into(), control_count.into());
            if let Some(cb) = page.meta_str("codebehind") {
                template.insert("codebehind".into(), cb.into());
            }

            let mut nodes = vec![page];
            nodes.extend(related);
            patterns.push(CodePattern {
                pattern_id: format!("page_{}", page.name.to_lowercase()),
                pattern_type: PATTERN_ASPX_PAGE.to_string(),
                files: member_files(&nodes),
                relationships: graph.incident(&page.id).into_iter().cloned().collect(),
                nodes: nodes.into_iter().cloned().collect(),
                template_data: template,
                similarity_score: PAGE_SIMILARITY,
            });
        }
        patterns
    }
}

/// English plural by suffix convention.
pub fn pluralize(word: &str) -> String {
    let lower = word.to_lowercase();
    if let Some(stem) = word.strip_suffix('y').or_else(|| word.strip_suffix('Y')) {
        let before = stem.chars().last();
        if before.is_some_and(|c| c.is_ascii_alphabetic() && !"aeiouAEIOU".contains(c)) {
            return format!("{}ies", stem);
        }
    }
    if ["s", "x", "z", "ch", "sh"].iter().any(|s| lower.ends_with(s)) {
        return format!("{}es", word);
    }
    format!("{}s", word)
}

fn unique_names(nodes: &[&CodeNode]) -> Value {
    let mut names: Vec<&str> = Vec::new();
    for node in nodes {
        if !names.contains(&node.name.as_str()) {
            names.push(&node.name);
        }
    }
    Value::from(names)
}

/// Distinct real files of the members, in member order.
fn member_files(nodes: &[&CodeNode]) -> Vec<String> {
    let mut files: Vec<String> = Vec::new();
    for node in nodes {
        if !node.is_synthetic() && !files.contains(&node.file_path) {
            files.push(node.file_path.clone());
        }
    }
    files
}

/// What a ranking collaborator gets to see of one pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternFeatures {
    pub pattern_id: String,
    pub pattern_type: String,
    /// Lower-cased words from member names, split at case changes.
    pub name_tokens: Vec<String>,
    pub node_kinds: BTreeMap<String, usize>,
    pub file_count: usize,
    pub relationship_count: usize,
    pub template_data: Metadata,
}

impl PatternFeatures {
    pub fn from_pattern(pattern: &CodePattern) -> Self {
        let mut tokens: Vec<String> = Vec::new();
        let mut node_kinds = BTreeMap::new();
        for node in &pattern.nodes {
            *node_kinds.entry(node.kind.as_str().to_string()).or_insert(0) += 1;
            for token in tokenize(&node.name) {
                if !tokens.contains(&token) {
                    tokens.push(token);
                }
            }
        }
        Self {
            pattern_id: pattern.pattern_id.clone(),
            pattern_type: pattern.pattern_type.clone(),
            name_tokens: tokens,
            node_kinds,
            file_count: pattern.files.len(),
            relationship_count: pattern.relationships.len(),
            template_data: pattern.template_data.clone(),
        }
    }
}

/// Split an identifier into lower-case words: `GetCustomerByID` gives
/// `get, customer, by, id`; `sp_GetOrders` gives `sp, get, orders`.
pub fn tokenize(name: &str) -> Vec<String> {
    let chars: Vec<char> = name.chars().collect();
    let mut words = Vec::new();
    let mut current = String::new();
    for (i, &c) in chars.iter().enumerate() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            continue;
        }
        let prev = i.checked_sub(1).map(|p| chars[p]);
        let next = chars.get(i + 1).copied();
        let boundary = c.is_uppercase()
            && prev.is_some_and(|p| {
                p.is_lowercase()
                    || p.is_ascii_digit()
                    || (p.is_uppercase() && next.is_some_and(|n| n.is_lowercase()))
            });
        if boundary && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        current.extend(c.to_lowercase());
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}
