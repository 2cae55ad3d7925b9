//! Data model for the code relationship graph.
//!
//! Nodes are structural elements pulled out of source artifacts, relationships
//! are typed and confidence-weighted edges between them, and patterns are
//! derived clusters of both.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Open mapping of kind-specific attributes.
pub type Metadata = serde_json::Map<String, Value>;

/// Synthetic file path for schema objects with no originating source file.
pub const DATABASE_SENTINEL: &str = "database";

/// Pattern type emitted by the CRUD recognizer.
pub const PATTERN_DATABASE_CRUD: &str = "database_crud";

/// Pattern type emitted by the page recognizer.
pub const PATTERN_ASPX_PAGE: &str = "aspx_page";

/// Kinds of structural elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Namespace,
    /// Class, struct or record
    Class,
    Method,
    Property,
    Field,
    StoredProcedure,
    Table,
    /// Markup page, user control or master page
    Page,
    /// Server control declared in markup
    Control,
    Interface,
    Enum,
    Constant,
    Event,
    Delegate,
}

impl NodeKind {
    pub const ALL: [NodeKind; 14] = [
        NodeKind::Namespace,
        NodeKind::Class,
        NodeKind::Method,
        NodeKind::Property,
        NodeKind::Field,
        NodeKind::StoredProcedure,
        NodeKind::Table,
        NodeKind::Page,
        NodeKind::Control,
        NodeKind::Interface,
        NodeKind::Enum,
        NodeKind::Constant,
        NodeKind::Event,
        NodeKind::Delegate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Namespace => "namespace",
            NodeKind::Class => "class",
            NodeKind::Method => "method",
            NodeKind::Property => "property",
            NodeKind::Field => "field",
            NodeKind::StoredProcedure => "stored_procedure",
            NodeKind::Table => "table",
            NodeKind::Page => "page",
            NodeKind::Control => "control",
            NodeKind::Interface => "interface",
            NodeKind::Enum => "enum",
            NodeKind::Constant => "constant",
            NodeKind::Event => "event",
            NodeKind::Delegate => "delegate",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let s = s.to_lowercase();
        NodeKind::ALL.into_iter().find(|k| k.as_str() == s)
    }

    /// Segment used between the file path and the qualifier in node ids.
    pub fn id_segment(&self) -> &'static str {
        match self {
            NodeKind::StoredProcedure => "procedure",
            other => other.as_str(),
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Types of directed relationships between elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    /// Class→base class, interface→base interface
    Inheritance,
    /// Class→interface
    Implements,
    MethodCall,
    /// Method or control→stored procedure
    DatabaseAccess,
    PropertyAccess,
    /// Page→code-behind class
    #[serde(rename = "codebehind", alias = "codebehind-link", alias = "codebehind_link")]
    Codebehind,
    /// Namespace→class, class→method, page→control
    Contains,
    References,
    Uses,
    /// Procedure→table
    DependsOn,
    /// Table→referenced table
    ForeignKey,
    Composition,
    Aggregation,
}

impl RelationshipType {
    pub const ALL: [RelationshipType; 13] = [
        RelationshipType::Inheritance,
        RelationshipType::Implements,
        RelationshipType::MethodCall,
        RelationshipType::DatabaseAccess,
        RelationshipType::PropertyAccess,
        RelationshipType::Codebehind,
        RelationshipType::Contains,
        RelationshipType::References,
        RelationshipType::Uses,
        RelationshipType::DependsOn,
        RelationshipType::ForeignKey,
        RelationshipType::Composition,
        RelationshipType::Aggregation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipType::Inheritance => "inheritance",
            RelationshipType::Implements => "implements",
            RelationshipType::MethodCall => "method_call",
            RelationshipType::DatabaseAccess => "database_access",
            RelationshipType::PropertyAccess => "property_access",
            RelationshipType::Codebehind => "codebehind",
            RelationshipType::Contains => "contains",
            RelationshipType::References => "references",
            RelationshipType::Uses => "uses",
            RelationshipType::DependsOn => "depends_on",
            RelationshipType::ForeignKey => "foreign_key",
            RelationshipType::Composition => "composition",
            RelationshipType::Aggregation => "aggregation",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "codebehind-link" | "codebehind_link" => Some(RelationshipType::Codebehind),
            other => RelationshipType::ALL
                .into_iter()
                .find(|t| t.as_str() == other),
        }
    }
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Build a node id from its file, kind and qualifying path.
pub fn node_id(file_path: &str, kind: NodeKind, qualifier: &str) -> String {
    format!("{}:{}:{}", file_path, kind.id_segment(), qualifier)
}

/// Id of a stored procedure in the database namespace.
pub fn procedure_id(name: &str) -> String {
    node_id(DATABASE_SENTINEL, NodeKind::StoredProcedure, name)
}

/// Id of a table in the database namespace.
pub fn table_id(name: &str) -> String {
    node_id(DATABASE_SENTINEL, NodeKind::Table, name)
}

/// A structural element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeNode {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub file_path: String,
    /// 1-based line, 0 for synthetic objects
    pub line_number: u32,
    #[serde(default)]
    pub metadata: Metadata,
}

impl CodeNode {
    /// Create a node whose id is derived from `(file_path, kind, qualifier)`.
    pub fn new(
        kind: NodeKind,
        file_path: &str,
        qualifier: &str,
        name: impl Into<String>,
        line_number: u32,
    ) -> Self {
        Self {
            id: node_id(file_path, kind, qualifier),
            name: name.into(),
            kind,
            file_path: file_path.to_string(),
            line_number,
            metadata: Metadata::new(),
        }
    }

    /// A stored procedure referenced from code, with no known source location.
    pub fn stored_procedure(name: &str) -> Self {
        Self::new(NodeKind::StoredProcedure, DATABASE_SENTINEL, name, name, 0)
            .with_meta("database_object", true)
    }

    /// A stored procedure defined in a schema file. The id stays in the
    /// database namespace so references from code resolve to it.
    pub fn stored_procedure_at(name: &str, file_path: &str, line_number: u32) -> Self {
        Self {
            file_path: file_path.to_string(),
            line_number,
            ..Self::stored_procedure(name)
        }
    }

    /// A table referenced from code or schema, with no known source location.
    pub fn table(name: &str) -> Self {
        Self::new(NodeKind::Table, DATABASE_SENTINEL, name, name, 0)
            .with_meta("database_object", true)
    }

    pub fn with_meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Look up a string metadata value.
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }

    pub fn is_synthetic(&self) -> bool {
        self.file_path == DATABASE_SENTINEL
    }
}

/// One end of a relationship: a concrete node id, or an unresolved pattern
/// standing for "some node matching this".
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "EndpointRepr", into = "EndpointRepr")]
pub enum Endpoint {
    Node(String),
    Wildcard(String),
}

#[derive(Serialize, Deserialize)]
struct EndpointRepr {
    resolved: bool,
    id: String,
}

impl From<EndpointRepr> for Endpoint {
    fn from(repr: EndpointRepr) -> Self {
        if repr.resolved {
            Endpoint::Node(repr.id)
        } else {
            Endpoint::Wildcard(repr.id)
        }
    }
}

impl From<Endpoint> for EndpointRepr {
    fn from(endpoint: Endpoint) -> Self {
        let resolved = endpoint.is_resolved();
        EndpointRepr {
            resolved,
            id: endpoint.into_key(),
        }
    }
}

impl Endpoint {
    pub fn node(id: impl Into<String>) -> Self {
        Endpoint::Node(id.into())
    }

    pub fn wildcard(pattern: impl Into<String>) -> Self {
        Endpoint::Wildcard(pattern.into())
    }

    /// Node id or wildcard pattern, as stored.
    pub fn key(&self) -> &str {
        match self {
            Endpoint::Node(id) | Endpoint::Wildcard(id) => id,
        }
    }

    pub fn into_key(self) -> String {
        match self {
            Endpoint::Node(id) | Endpoint::Wildcard(id) => id,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Endpoint::Node(_))
    }

    /// The concrete node id, if this endpoint is resolved.
    pub fn as_node(&self) -> Option<&str> {
        match self {
            Endpoint::Node(id) => Some(id),
            Endpoint::Wildcard(_) => None,
        }
    }

    /// Whether `node_id` is (or could be) the element this endpoint refers to.
    pub fn matches(&self, node_id: &str) -> bool {
        match self {
            Endpoint::Node(id) => id == node_id,
            Endpoint::Wildcard(pattern) => wildcard_match(pattern, node_id),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Node(id) => write!(f, "{}", id),
            Endpoint::Wildcard(pattern) => write!(f, "~{}", pattern),
        }
    }
}

/// Glob match where `*` stands for any run of characters.
pub fn wildcard_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == text;
    }

    let first = parts[0];
    let last = parts[parts.len() - 1];
    if text.len() < first.len() + last.len() || !text.starts_with(first) || !text.ends_with(last)
    {
        return false;
    }

    let mut rest = &text[first.len()..text.len() - last.len()];
    for middle in &parts[1..parts.len() - 1] {
        match rest.find(middle) {
            Some(pos) => rest = &rest[pos + middle.len()..],
            None => return false,
        }
    }
    true
}

/// A directed, typed, confidence-weighted edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeRelationship {
    pub source: Endpoint,
    pub target: Endpoint,
    pub relationship_type: RelationshipType,
    #[serde(default)]
    pub metadata: Metadata,
    /// In [0, 1]; structural edges carry 1.0
    pub confidence: f64,
}

impl CodeRelationship {
    pub fn new(source: Endpoint, target: Endpoint, relationship_type: RelationshipType) -> Self {
        Self {
            source,
            target,
            relationship_type,
            metadata: Metadata::new(),
            confidence: 1.0,
        }
    }

    /// Structural containment between two concrete nodes.
    pub fn contains(parent_id: &str, child_id: &str, scope: &str) -> Self {
        Self::new(
            Endpoint::node(parent_id),
            Endpoint::node(child_id),
            RelationshipType::Contains,
        )
        .with_meta("scope", scope)
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn with_meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Whether either endpoint refers to `node_id`. Wildcards do not count.
    pub fn touches(&self, node_id: &str) -> bool {
        self.source.as_node() == Some(node_id) || self.target.as_node() == Some(node_id)
    }
}

/// A derived, named cluster of nodes and the edges among them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodePattern {
    pub pattern_id: String,
    pub pattern_type: String,
    pub files: Vec<String>,
    pub nodes: Vec<CodeNode>,
    pub relationships: Vec<CodeRelationship>,
    pub template_data: Metadata,
    pub similarity_score: f64,
}
