//! Heuristic C# extractor.
//!
//! One forward pass over the file. Each line has its comments and literal
//! contents blanked, then is cut into chunks at `{`, `}` and `;`. Chunks feed
//! two consumers: a declaration accumulator that may span lines (Allman braces,
//! wrapped signatures, attributes on their own line), and the database-access
//! detector, which runs per chunk against the scope stack as it stands there.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::HashSet;

use super::text::{skip_balanced, split_top_level};
use super::{Extraction, Extractor, SourceKind, DB_ACCESS_CONFIDENCE};
use crate::types::{
    node_id, procedure_id, CodeNode, CodeRelationship, Endpoint, NodeKind, RelationshipType,
};

/// Confidence of base-list edges; the base is matched by simple name only.
const BASE_CONFIDENCE: f64 = 0.9;

/// How many lines apart a data-access call and a procedure name may be.
const DB_WINDOW: u32 = 3;

/// A type reference: `Dictionary<string, List<int>>[]?`.
const TYPE_PATTERN: &str = r"[A-Za-z_][\w.]*(?:\s*<[\w<>\[\],.?\s]*>)?(?:\[[,\s]*\])*\??";

const METHOD_MODIFIERS: &str = "public|private|protected|internal|static|async|virtual|override|abstract|sealed|extern|unsafe|new|partial|readonly";

const MEMBER_MODIFIERS: &str = "public|private|protected|internal|static|virtual|override|abstract|sealed|new|readonly|required|volatile|const|extern|unsafe";

static NAMESPACE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^namespace\s+([A-Za-z_][\w.]*)$").unwrap());

static TYPE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^((?:(?:public|private|protected|internal|static|abstract|sealed|partial|unsafe|new|readonly|ref|file)\s+)*)(class|struct|interface|enum|record(?:\s+class|\s+struct)?)\s+([A-Za-z_]\w*)(.*)$",
    )
    .unwrap()
});

static METHOD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"^((?:(?:{})\s+)*)(?:({})\s+)?([A-Za-z_][\w.]*)\s*(?:<[^()]*>)?\s*\(",
        METHOD_MODIFIERS, TYPE_PATTERN
    ))
    .unwrap()
});

static PROPERTY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"^((?:(?:{})\s+)*)({})\s+([A-Za-z_][\w.]*)$",
        MEMBER_MODIFIERS, TYPE_PATTERN
    ))
    .unwrap()
});

static PROPERTY_EXPR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"^((?:(?:{})\s+)*)({})\s+([A-Za-z_][\w.]*)\s*=>",
        MEMBER_MODIFIERS, TYPE_PATTERN
    ))
    .unwrap()
});

static FIELD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"^((?:(?:{})\s+)*)({})\s+([A-Za-z_]\w*)\s*(?:=.*)?$",
        MEMBER_MODIFIERS, TYPE_PATTERN
    ))
    .unwrap()
});

static EVENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"^((?:(?:{})\s+)*)event\s+({})\s+([A-Za-z_]\w*)",
        MEMBER_MODIFIERS, TYPE_PATTERN
    ))
    .unwrap()
});

static DELEGATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"^((?:(?:{})\s+)*)delegate\s+({})\s+([A-Za-z_]\w*)",
        MEMBER_MODIFIERS, TYPE_PATTERN
    ))
    .unwrap()
});

static ACCESSOR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:(?:public|private|protected|internal)\s+)*(?:get|set|init|add|remove)\b")
        .unwrap()
});

static ATTRIBUTES_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?:\[[^\]]*\]\s*)+").unwrap());

static DB_API_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(SqlCommand|SqlConnection|SqlDataAdapter|ExecuteNonQuery|ExecuteScalar|ExecuteReader|CommandText|StoredProcedure)\b",
    )
    .unwrap()
});

static PROC_LITERAL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:(?i:exec(?:ute)?)\s+)?(?:\[?\w+\]?\.)?\[?((?:sp|usp)_\w+)\]?").unwrap()
});

/// Words that can sit where the regexes expect a type but never are one.
const NON_TYPES: &[&str] = &[
    "return", "new", "await", "else", "throw", "case", "goto", "yield", "using", "lock", "if",
    "while", "for", "foreach", "switch", "catch", "do", "try", "finally", "public", "private",
    "protected", "internal", "static", "async", "virtual", "override", "abstract", "sealed",
    "extern", "unsafe", "partial", "readonly", "required", "volatile", "const", "event",
    "delegate", "class", "struct", "interface", "enum", "record", "namespace", "operator",
    "implicit", "explicit", "var",
];

const NON_NAMES: &[&str] = &[
    "if", "for", "foreach", "while", "switch", "catch", "using", "lock", "return", "nameof",
    "typeof", "sizeof", "base", "this", "default", "checked", "unchecked", "fixed", "new",
    "operator", "when", "get", "set", "init",
];

/// Procedural-code extractor for `.cs` files.
pub struct CSharpExtractor;

impl Extractor for CSharpExtractor {
    fn kind(&self) -> SourceKind {
        SourceKind::Procedural
    }

    fn extract(&self, file_path: &str, content: &str) -> Extraction {
        let mut scan = Scan::new(file_path);
        let mut in_block_comment = false;

        for (idx, raw) in content.lines().enumerate() {
            let line = idx as u32 + 1;
            let clean = clean_line(raw, &mut in_block_comment);

            let mut start = 0;
            for (pos, c) in clean.code.char_indices() {
                let term = match c {
                    '{' => Terminator::Open,
                    '}' => Terminator::Close,
                    ';' => Terminator::Semi,
                    _ => continue,
                };
                scan.chunk(&clean, start, pos, line, Some(term));
                start = pos + 1;
            }
            scan.chunk(&clean, start, clean.code.len(), line, None);
        }

        scan.out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Terminator {
    Open,
    Close,
    Semi,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScopeKind {
    Namespace,
    Type(NodeKind),
    Method,
    Property,
    /// `Type Name {` that becomes a property once an accessor shows up
    PropertyCandidate,
    Block,
}

#[derive(Debug, Clone)]
struct Scope {
    kind: ScopeKind,
    id: String,
    name: String,
    /// Dotted namespace path, or the type path for nested types
    qualified: String,
    line: u32,
    modifiers: String,
    type_name: String,
}

impl Scope {
    fn block() -> Self {
        Self {
            kind: ScopeKind::Block,
            id: String::new(),
            name: String::new(),
            qualified: String::new(),
            line: 0,
            modifiers: String::new(),
            type_name: String::new(),
        }
    }
}

struct ApiMention {
    line: u32,
    member: String,
    api: String,
}

struct ProcLiteral {
    name: String,
    line: u32,
    member: String,
    source: Endpoint,
}

struct Scan<'a> {
    file: &'a str,
    out: Extraction,
    stack: Vec<Scope>,
    /// `namespace X;` applies to the rest of the file
    file_namespace: Option<Scope>,
    decl: String,
    decl_line: u32,
    /// Expression-bodied member whose `=> ...` body is being read
    expr_member: Option<String>,
    api_mentions: Vec<ApiMention>,
    pending_literals: Vec<ProcLiteral>,
    emitted: HashSet<(String, u32)>,
}

impl<'a> Scan<'a> {
    fn new(file: &'a str) -> Self {
        Self {
            file,
            out: Extraction::new(),
            stack: Vec::new(),
            file_namespace: None,
            decl: String::new(),
            decl_line: 0,
            expr_member: None,
            api_mentions: Vec::new(),
            pending_literals: Vec::new(),
            emitted: HashSet::new(),
        }
    }

    fn chunk(&mut self, clean: &CleanLine, start: usize, end: usize, line: u32, term: Option<Terminator>) {
        let text = &clean.code[start..end];
        let literals: Vec<&str> = clean
            .literals
            .iter()
            .filter(|(pos, _)| *pos >= start && *pos < end)
            .map(|(_, lit)| lit.as_str())
            .collect();

        self.append_decl(text, line);
        self.expr_member = self.expression_member();
        self.scan_db(text, &literals, line);

        if let Some(term) = term {
            self.expr_member = None;
            let decl = std::mem::take(&mut self.decl);
            let text = ATTRIBUTES_RE.replace(decl.trim(), "");
            self.on_segment(text.trim(), term, self.decl_line);
        }
    }

    fn append_decl(&mut self, text: &str, line: u32) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        if ATTRIBUTES_RE.replace(self.decl.trim(), "").trim().is_empty() {
            self.decl_line = line;
        }
        if !self.decl.is_empty() {
            self.decl.push(' ');
        }
        self.decl.push_str(text);
    }

    fn on_segment(&mut self, text: &str, term: Terminator, line: u32) {
        if !text.is_empty() {
            if let Some(idx) = self.stack.len().checked_sub(1) {
                if self.stack[idx].kind == ScopeKind::PropertyCandidate {
                    if ACCESSOR_RE.is_match(text) {
                        self.confirm_property(idx);
                    } else {
                        self.stack[idx].kind = ScopeKind::Block;
                    }
                }
            }
        }

        let opened = if text.is_empty() {
            None
        } else {
            self.declare(text, term, line)
        };

        match term {
            Terminator::Open => self.stack.push(opened.unwrap_or_else(Scope::block)),
            Terminator::Close => {
                self.stack.pop();
            }
            Terminator::Semi => {}
        }
    }

    /// Recognize a declaration. Returns the scope it opens when followed by `{`.
    fn declare(&mut self, text: &str, term: Terminator, line: u32) -> Option<Scope> {
        let innermost = self.stack.last().map(|s| s.kind);
        let in_code = matches!(
            innermost,
            Some(ScopeKind::Method | ScopeKind::Property | ScopeKind::Block)
        );

        if !in_code {
            if let Some(caps) = NAMESPACE_RE.captures(text) {
                return self.declare_namespace(&caps[1], term, line);
            }
            if let Some(caps) = TYPE_RE.captures(text) {
                let scope = self.declare_type(&caps[1], &caps[2], &caps[3], &caps[4], line);
                return (term == Terminator::Open).then_some(scope);
            }
            if let Some(caps) = DELEGATE_RE.captures(text) {
                if is_type_name(&caps[2]) {
                    self.declare_member(NodeKind::Delegate, &caps[1], &caps[2], &caps[3], line);
                }
                return None;
            }
        }

        let Some(ScopeKind::Type(owner_kind)) = innermost else {
            return None;
        };
        if owner_kind == NodeKind::Enum {
            return None;
        }

        if let Some(caps) = EVENT_RE.captures(text) {
            if is_type_name(&caps[2]) {
                self.declare_member(NodeKind::Event, &caps[1], &caps[2], &caps[3], line);
            }
            return None;
        }

        if let Some(caps) = METHOD_RE.captures(text) {
            let return_type = caps.get(2).map(|m| m.as_str());
            let name = last_segment(&caps[3]);
            if let Some(scope) = self.declare_method(&caps[1], return_type, name, line) {
                return (term == Terminator::Open).then_some(scope);
            }
            return None;
        }

        match term {
            Terminator::Open => {
                let caps = PROPERTY_RE.captures(text)?;
                if !is_type_name(&caps[2]) {
                    return None;
                }
                Some(Scope {
                    kind: ScopeKind::PropertyCandidate,
                    name: last_segment(&caps[3]).to_string(),
                    line,
                    modifiers: caps[1].to_string(),
                    type_name: caps[2].to_string(),
                    ..Scope::block()
                })
            }
            Terminator::Semi | Terminator::Close => {
                if let Some(caps) = PROPERTY_EXPR_RE.captures(text) {
                    if is_type_name(&caps[2]) {
                        let name = last_segment(&caps[3]);
                        self.declare_member(NodeKind::Property, &caps[1], &caps[2], name, line);
                    }
                } else if let Some(caps) = FIELD_RE.captures(text) {
                    if owner_kind != NodeKind::Interface && is_type_name(&caps[2]) {
                        let kind = if has_modifier(&caps[1], "const") {
                            NodeKind::Constant
                        } else {
                            NodeKind::Field
                        };
                        self.declare_member(kind, &caps[1], &caps[2], &caps[3], line);
                    }
                }
                None
            }
        }
    }

    fn declare_namespace(&mut self, name: &str, term: Terminator, line: u32) -> Option<Scope> {
        let parent = self.current_namespace().cloned();
        let qualified = match &parent {
            Some(p) => format!("{}.{}", p.qualified, name),
            None => name.to_string(),
        };
        let node = CodeNode::new(NodeKind::Namespace, self.file, &qualified, name, line);
        let scope = Scope {
            kind: ScopeKind::Namespace,
            id: node.id.clone(),
            name: name.to_string(),
            qualified,
            line,
            ..Scope::block()
        };

        if self.out.push_node(node) {
            if let Some(parent) = &parent {
                self.out.push_relationship(CodeRelationship::contains(
                    &parent.id,
                    &scope.id,
                    "namespace_contains_namespace",
                ));
            }
        }

        match term {
            Terminator::Open => Some(scope),
            _ => {
                self.file_namespace = Some(scope);
                None
            }
        }
    }

    fn declare_type(
        &mut self,
        modifiers: &str,
        keyword: &str,
        name: &str,
        rest: &str,
        line: u32,
    ) -> Scope {
        let keyword = keyword.split_whitespace().next().unwrap_or(keyword);
        let kind = match keyword {
            "interface" => NodeKind::Interface,
            "enum" => NodeKind::Enum,
            _ => NodeKind::Class,
        };

        let outer = self.innermost_type().cloned();
        let qualified = match &outer {
            Some(o) => format!("{}.{}", o.qualified, name),
            None => name.to_string(),
        };
        let namespace = self.current_namespace().map(|n| n.qualified.clone());

        let node = CodeNode::new(kind, self.file, &qualified, name, line)
            .with_meta("namespace", namespace.map(Value::String).unwrap_or(Value::Null))
            .with_meta("access_modifier", access_modifier(modifiers))
            .with_meta("is_static", has_modifier(modifiers, "static"))
            .with_meta("is_abstract", has_modifier(modifiers, "abstract"))
            .with_meta("is_partial", has_modifier(modifiers, "partial"))
            .with_meta("declared_as", keyword);
        let id = node.id.clone();

        if self.out.push_node(node) {
            let parent = outer
                .as_ref()
                .filter(|o| self.stack.last().map(|s| s.id.as_str()) == Some(o.id.as_str()))
                .map(|o| (o.id.clone(), type_kind(o)))
                .or_else(|| {
                    self.current_namespace()
                        .map(|n| (n.id.clone(), NodeKind::Namespace))
                });
            if let Some((parent_id, parent_kind)) = parent {
                let scope = format!("{}_contains_{}", parent_kind, kind);
                self.out
                    .push_relationship(CodeRelationship::contains(&parent_id, &id, &scope));
            }
            if kind != NodeKind::Enum {
                self.declare_bases(&id, kind, rest);
            }
        }

        Scope {
            kind: ScopeKind::Type(kind),
            id,
            name: name.to_string(),
            qualified,
            line,
            modifiers: modifiers.to_string(),
            ..Scope::block()
        }
    }

    fn declare_bases(&mut self, id: &str, kind: NodeKind, rest: &str) {
        for (i, base) in parse_bases(rest).into_iter().enumerate() {
            let (rel_type, target_kind) = if kind == NodeKind::Interface {
                (RelationshipType::Inheritance, NodeKind::Interface)
            } else if i == 0 && !looks_like_interface(&base) {
                (RelationshipType::Inheritance, NodeKind::Class)
            } else {
                (RelationshipType::Implements, NodeKind::Interface)
            };
            let pattern = format!("*:{}:{}", target_kind.id_segment(), base);
            self.out.push_relationship(
                CodeRelationship::new(Endpoint::node(id), Endpoint::wildcard(pattern), rel_type)
                    .with_confidence(BASE_CONFIDENCE)
                    .with_meta("base_name", base.as_str()),
            );
        }
    }

    fn declare_method(
        &mut self,
        modifiers: &str,
        return_type: Option<&str>,
        name: &str,
        line: u32,
    ) -> Option<Scope> {
        let owner = self.innermost_type()?.clone();
        if NON_NAMES.contains(&name) {
            return None;
        }
        let is_constructor = match return_type {
            Some(ty) if !is_type_name(ty) => return None,
            Some(_) => false,
            None if name == owner.name => true,
            None => return None,
        };

        let qualifier = format!("{}:{}", owner.qualified, name);
        let mut node = CodeNode::new(NodeKind::Method, self.file, &qualifier, name, line)
            .with_meta("class", owner.name.as_str())
            .with_meta("access_modifier", access_modifier(modifiers))
            .with_meta("is_static", has_modifier(modifiers, "static"))
            .with_meta("is_async", has_modifier(modifiers, "async"))
            .with_meta("is_constructor", is_constructor);
        if let Some(ty) = return_type {
            node = node.with_meta("return_type", ty);
        }
        let id = node.id.clone();

        if self.out.push_node(node) {
            let scope = format!("{}_contains_method", type_kind(&owner));
            self.out
                .push_relationship(CodeRelationship::contains(&owner.id, &id, &scope));
        } else if let Some(existing) = self.out.node_mut(&id) {
            let count = existing
                .metadata
                .get("overloads")
                .and_then(Value::as_u64)
                .unwrap_or(1);
            existing
                .metadata
                .insert("overloads".to_string(), Value::from(count + 1));
        }

        Some(Scope {
            kind: ScopeKind::Method,
            id,
            name: name.to_string(),
            qualified: qualifier,
            line,
            modifiers: modifiers.to_string(),
            ..Scope::block()
        })
    }

    /// Properties, fields, constants, events and delegates.
    fn declare_member(
        &mut self,
        kind: NodeKind,
        modifiers: &str,
        type_name: &str,
        name: &str,
        line: u32,
    ) -> Option<String> {
        let owner = self.innermost_type().cloned();
        let (owner_id, owner_kind, owner_path) = match &owner {
            Some(o) => (o.id.clone(), type_kind(o), o.qualified.clone()),
            None => {
                let ns = self.current_namespace()?;
                (ns.id.clone(), NodeKind::Namespace, ns.qualified.clone())
            }
        };

        let qualifier = format!("{}:{}", owner_path, name);
        let mut node = CodeNode::new(kind, self.file, &qualifier, name, line)
            .with_meta("access_modifier", access_modifier(modifiers))
            .with_meta("is_static", has_modifier(modifiers, "static"))
            .with_meta("value_type", type_name.trim());
        if let Some(o) = &owner {
            node = node.with_meta("class", o.name.as_str());
        }
        let id = node.id.clone();

        if self.out.push_node(node) {
            let scope = format!("{}_contains_{}", owner_kind, kind);
            self.out
                .push_relationship(CodeRelationship::contains(&owner_id, &id, &scope));
        }
        Some(id)
    }

    fn confirm_property(&mut self, idx: usize) {
        let candidate = self.stack[idx].clone();
        let id = self.declare_member(
            NodeKind::Property,
            &candidate.modifiers,
            &candidate.type_name,
            &candidate.name,
            candidate.line,
        );
        let scope = &mut self.stack[idx];
        match id {
            Some(id) => {
                scope.kind = ScopeKind::Property;
                scope.id = id;
            }
            None => scope.kind = ScopeKind::Block,
        }
    }

    fn current_namespace(&self) -> Option<&Scope> {
        self.stack
            .iter()
            .rev()
            .find(|s| s.kind == ScopeKind::Namespace)
            .or(self.file_namespace.as_ref())
    }

    fn innermost_type(&self) -> Option<&Scope> {
        self.stack
            .iter()
            .rev()
            .find(|s| matches!(s.kind, ScopeKind::Type(_)))
    }

    /// Id of the member whose declaration is pending, when it is
    /// expression-bodied: `DataTable Get() => ...` or `int Count => ...`.
    fn expression_member(&self) -> Option<String> {
        let owner = match self.stack.last() {
            Some(scope) if matches!(scope.kind, ScopeKind::Type(kind) if kind != NodeKind::Enum) => {
                scope
            }
            _ => return None,
        };
        let decl = ATTRIBUTES_RE.replace(self.decl.trim(), "");
        let (header, _) = decl.split_once("=>")?;

        if let Some(caps) = METHOD_RE.captures(header) {
            let name = last_segment(&caps[3]);
            let valid = match caps.get(2) {
                Some(ty) => is_type_name(ty.as_str()),
                None => name == owner.name,
            };
            if !valid || NON_NAMES.contains(&name) {
                return None;
            }
            let qualifier = format!("{}:{}", owner.qualified, name);
            return Some(node_id(self.file, NodeKind::Method, &qualifier));
        }

        let caps = PROPERTY_EXPR_RE.captures(&decl)?;
        if !is_type_name(&caps[2]) {
            return None;
        }
        let qualifier = format!("{}:{}", owner.qualified, last_segment(&caps[3]));
        Some(node_id(self.file, NodeKind::Property, &qualifier))
    }

    /// Source endpoint for a data-access edge at the current position, plus
    /// the key that scopes the proximity window.
    fn db_source(&self) -> (Endpoint, String) {
        if let Some(id) = &self.expr_member {
            return (Endpoint::node(id.as_str()), id.clone());
        }
        for scope in self.stack.iter().rev() {
            match scope.kind {
                ScopeKind::Method | ScopeKind::Property => {
                    return (Endpoint::node(scope.id.as_str()), scope.id.clone());
                }
                ScopeKind::Type(_) => {
                    let pattern = format!("{}:method:{}:*", self.file, scope.qualified);
                    return (Endpoint::wildcard(pattern.clone()), pattern);
                }
                _ => {}
            }
        }
        let pattern = format!("{}:*", self.file);
        (Endpoint::wildcard(pattern.clone()), pattern)
    }

    fn scan_db(&mut self, code: &str, literals: &[&str], line: u32) {
        self.api_mentions.retain(|m| m.line + DB_WINDOW >= line);
        self.pending_literals.retain(|p| p.line + DB_WINDOW >= line);

        let (source, member) = self.db_source();

        if let Some(caps) = DB_API_RE.captures(code) {
            let api = caps[1].to_string();
            let (matched, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending_literals)
                .into_iter()
                .partition(|p| p.member == member);
            self.pending_literals = rest;
            for literal in matched {
                self.emit_db(literal.source, &literal.name, literal.line, &api);
            }
            self.api_mentions.push(ApiMention { line, member: member.clone(), api });
        }

        for literal in literals {
            let Some(caps) = PROC_LITERAL_RE.captures(literal) else {
                continue;
            };
            let name = caps[1].to_string();
            let api = self
                .api_mentions
                .iter()
                .rev()
                .find(|m| m.member == member)
                .map(|m| m.api.clone());
            match api {
                Some(api) => self.emit_db(source.clone(), &name, line, &api),
                None => self.pending_literals.push(ProcLiteral {
                    name,
                    line,
                    member: member.clone(),
                    source: source.clone(),
                }),
            }
        }
    }

    fn emit_db(&mut self, source: Endpoint, procedure: &str, line: u32, api: &str) {
        if !self.emitted.insert((procedure.to_string(), line)) {
            return;
        }
        self.out.push_node(CodeNode::stored_procedure(procedure));
        self.out.push_relationship(
            CodeRelationship::new(
                source,
                Endpoint::node(procedure_id(procedure)),
                RelationshipType::DatabaseAccess,
            )
            .with_confidence(DB_ACCESS_CONFIDENCE)
            .with_meta("line_number", line)
            .with_meta("api", api),
        );
    }
}

fn type_kind(scope: &Scope) -> NodeKind {
    match scope.kind {
        ScopeKind::Type(kind) => kind,
        _ => NodeKind::Class,
    }
}

fn has_modifier(modifiers: &str, word: &str) -> bool {
    modifiers.split_whitespace().any(|m| m == word)
}

/// `protected internal`, `public`, ... or `default` when none is written.
fn access_modifier(modifiers: &str) -> String {
    let access: Vec<&str> = modifiers
        .split_whitespace()
        .filter(|m| matches!(*m, "public" | "private" | "protected" | "internal"))
        .collect();
    if access.is_empty() {
        "default".to_string()
    } else {
        access.join(" ")
    }
}

fn is_type_name(type_name: &str) -> bool {
    let head = type_name.split(['<', '[', '?']).next().unwrap_or("").trim();
    !head.is_empty() && !NON_TYPES.contains(&head)
}

fn last_segment(name: &str) -> &str {
    name.rsplit('.').next().unwrap_or(name)
}

/// `IRepository` style names.
fn looks_like_interface(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next() == Some('I') && chars.next().is_some_and(|c| c.is_ascii_uppercase())
}

/// Simple names from a base list: `<T> : Base<T>, IFoo where T : new()`.
fn parse_bases(rest: &str) -> Vec<String> {
    let mut s = rest.trim_start();
    if s.starts_with('<') {
        s = skip_balanced(s, '<', '>').trim_start();
    }
    if s.starts_with('(') {
        s = skip_balanced(s, '(', ')').trim_start();
    }
    let Some(list) = s.strip_prefix(':') else {
        return Vec::new();
    };
    let list = match list.find(" where ") {
        Some(pos) => &list[..pos],
        None => list,
    };

    split_top_level(list, ',')
        .into_iter()
        .filter_map(|base| {
            let base = base.split(['<', '(']).next()?.trim();
            let base = last_segment(base);
            let valid = !base.is_empty()
                && base.chars().all(|c| c.is_alphanumeric() || c == '_')
                && base != "where";
            valid.then(|| base.to_string())
        })
        .collect()
}

/// A source line with comments removed and literal contents blanked.
/// `literals` holds `(offset in code, content)` for string literals.
struct CleanLine {
    code: String,
    literals: Vec<(usize, String)>,
}

fn clean_line(line: &str, in_block_comment: &mut bool) -> CleanLine {
    let mut code = String::with_capacity(line.len());
    let mut literals = Vec::new();

    if !*in_block_comment && line.trim_start().starts_with('#') {
        return CleanLine { code, literals };
    }

    let chars: Vec<char> = line.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        if *in_block_comment {
            if c == '*' && next == Some('/') {
                *in_block_comment = false;
                code.push_str("  ");
                i += 2;
            } else {
                code.push(' ');
                i += 1;
            }
            continue;
        }

        match c {
            '/' if next == Some('/') => break,
            '/' if next == Some('*') => {
                *in_block_comment = true;
                code.push_str("  ");
                i += 2;
            }
            '"' => {
                let verbatim = (i >= 1 && chars[i - 1] == '@')
                    || (i >= 2 && chars[i - 1] == '$' && chars[i - 2] == '@');
                let offset = code.len();
                code.push('"');
                i += 1;
                let mut content = String::new();
                while i < chars.len() {
                    let ch = chars[i];
                    if verbatim && ch == '"' && chars.get(i + 1) == Some(&'"') {
                        content.push('"');
                        code.push_str("  ");
                        i += 2;
                    } else if !verbatim && ch == '\\' && i + 1 < chars.len() {
                        content.push(chars[i + 1]);
                        code.push_str("  ");
                        i += 2;
                    } else if ch == '"' {
                        code.push('"');
                        i += 1;
                        break;
                    } else {
                        content.push(ch);
                        code.push(' ');
                        i += 1;
                    }
                }
                literals.push((offset, content));
            }
            '\'' => {
                let close = if next == Some('\\') {
                    (i + 3..chars.len().min(i + 10)).find(|&j| chars[j] == '\'')
                } else if chars.get(i + 2) == Some(&'\'') {
                    Some(i + 2)
                } else {
                    None
                };
                match close {
                    Some(end) => {
                        code.push('\'');
                        for _ in i + 1..end {
                            code.push(' ');
                        }
                        code.push('\'');
                        i = end + 1;
                    }
                    None => {
                        code.push(c);
                        i += 1;
                    }
                }
            }
            _ => {
                code.push(c);
                i += 1;
            }
        }
    }

    CleanLine { code, literals }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(content: &str) -> Extraction {
        CSharpExtractor.extract("App/CustomerManager.cs", content)
    }

    fn nodes_of(extraction: &Extraction, kind: NodeKind) -> Vec<&CodeNode> {
        extraction.nodes.iter().filter(|n| n.kind == kind).collect()
    }

    fn rels_of(extraction: &Extraction, rel_type: RelationshipType) -> Vec<&CodeRelationship> {
        extraction
            .relationships
            .iter()
            .filter(|r| r.relationship_type == rel_type)
            .collect()
    }

    #[test]
    fn test_namespace_class_method() {
        let extraction = extract(
            r#"namespace App.BusinessLogic { class CustomerManager { public List<Customer> GetCustomers() { return null; } } }"#,
        );

        assert_eq!(nodes_of(&extraction, NodeKind::Namespace).len(), 1);
        assert_eq!(nodes_of(&extraction, NodeKind::Class).len(), 1);
        assert_eq!(nodes_of(&extraction, NodeKind::Method).len(), 1);
        assert_eq!(extraction.nodes.len(), 3);

        let contains = rels_of(&extraction, RelationshipType::Contains);
        assert_eq!(contains.len(), 2);
        assert_eq!(
            contains[0].source,
            Endpoint::node("App/CustomerManager.cs:namespace:App.BusinessLogic")
        );
        assert_eq!(
            contains[0].target,
            Endpoint::node("App/CustomerManager.cs:class:CustomerManager")
        );
        assert_eq!(
            contains[1].target,
            Endpoint::node("App/CustomerManager.cs:method:CustomerManager:GetCustomers")
        );
        assert_eq!(extraction.relationships.len(), 2);
    }

    #[test]
    fn test_allman_style_and_metadata() {
        let extraction = extract(
            r#"
using System;

namespace App.Data
{
    /// <summary>Customers.</summary>
    [Serializable]
    public partial class CustomerManager
    {
        private readonly string _connection;

        public CustomerManager(string connection)
        {
            _connection = connection;
        }

        public static async Task<int> CountAsync(
            int region)
        {
            if (region > 0)
            {
                return 1;
            }
            return 0;
        }

        internal void Reset() => _count = 0;
    }
}
"#,
        );

        let class = &nodes_of(&extraction, NodeKind::Class)[0];
        assert_eq!(class.line_number, 8);
        assert_eq!(class.meta_str("namespace"), Some("App.Data"));
        assert_eq!(class.meta_str("access_modifier"), Some("public"));
        assert_eq!(class.metadata["is_partial"], true);

        let methods = nodes_of(&extraction, NodeKind::Method);
        let names: Vec<&str> = methods.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["CustomerManager", "CountAsync", "Reset"]);

        assert_eq!(methods[0].metadata["is_constructor"], true);
        assert_eq!(methods[1].metadata["is_static"], true);
        assert_eq!(methods[1].metadata["is_async"], true);
        assert_eq!(methods[1].line_number, 17);
        assert_eq!(methods[2].meta_str("access_modifier"), Some("internal"));

        let fields = nodes_of(&extraction, NodeKind::Field);
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].name, "_connection");
    }

    #[test]
    fn test_every_method_contained_by_its_class() {
        let extraction = extract(
            r#"
public class A {
    public void One() { }
    public class B {
        void Two() { }
    }
    void Three() { }
}
"#,
        );

        for method in nodes_of(&extraction, NodeKind::Method) {
            assert!(
                extraction.relationships.iter().any(|r| {
                    r.relationship_type == RelationshipType::Contains
                        && r.target.as_node() == Some(method.id.as_str())
                }),
                "no container for {}",
                method.id
            );
        }
        assert!(extraction
            .nodes
            .iter()
            .any(|n| n.id == "App/CustomerManager.cs:method:A.B:Two"));
        assert!(extraction
            .nodes
            .iter()
            .any(|n| n.id == "App/CustomerManager.cs:method:A:Three"));
    }

    #[test]
    fn test_control_flow_is_not_a_method() {
        let extraction = extract(
            r#"
class Repo {
    void Load() {
        if (ready) { Save(); }
        foreach (var x in items) { Console.WriteLine(x); }
        return Helper(1);
    }
}
"#,
        );
        let methods = nodes_of(&extraction, NodeKind::Method);
        assert_eq!(methods.len(), 1);
        assert_eq!(methods[0].name, "Load");
    }

    #[test]
    fn test_overloads_share_one_node() {
        let extraction = extract(
            r#"
class Repo {
    public void Save(int id) { }
    public void Save(string name) { }
}
"#,
        );
        let methods = nodes_of(&extraction, NodeKind::Method);
        assert_eq!(methods.len(), 1);
        assert_eq!(methods[0].metadata["overloads"], 2);
        assert_eq!(rels_of(&extraction, RelationshipType::Contains).len(), 1);
    }

    #[test]
    fn test_properties_and_accessors() {
        let extraction = extract(
            r#"
public class Customer
{
    public int Id { get; set; }
    public string Name
    {
        get { return _name; }
        set { _name = value; }
    }
    public string Display => Name;
    public const int MaxLength = 50;
    public event EventHandler Changed;
}
"#,
        );
        let props: Vec<&str> = nodes_of(&extraction, NodeKind::Property)
            .iter()
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(props, vec!["Id", "Name", "Display"]);
        assert_eq!(nodes_of(&extraction, NodeKind::Constant)[0].name, "MaxLength");
        assert_eq!(nodes_of(&extraction, NodeKind::Event)[0].name, "Changed");
        assert!(nodes_of(&extraction, NodeKind::Method).is_empty());
    }

    #[test]
    fn test_interfaces_enums_and_bases() {
        let extraction = extract(
            r#"
namespace App;

public interface IRepository<T> : IDisposable
{
    T Find(int id);
}

public enum Status { Active, Closed }

public class CustomerRepository : RepositoryBase<Customer>, IRepository<Customer>
{
}
"#,
        );

        let ns = &nodes_of(&extraction, NodeKind::Namespace)[0];
        assert_eq!(ns.name, "App");
        assert_eq!(nodes_of(&extraction, NodeKind::Interface)[0].name, "IRepository");
        assert_eq!(nodes_of(&extraction, NodeKind::Enum)[0].name, "Status");

        let find = &nodes_of(&extraction, NodeKind::Method)[0];
        assert_eq!(find.id, "App/CustomerManager.cs:method:IRepository:Find");

        let inheritance = rels_of(&extraction, RelationshipType::Inheritance);
        let targets: Vec<&str> = inheritance.iter().map(|r| r.target.key()).collect();
        assert_eq!(targets, vec!["*:interface:IDisposable", "*:class:RepositoryBase"]);

        let implements = rels_of(&extraction, RelationshipType::Implements);
        assert_eq!(implements.len(), 1);
        assert_eq!(implements[0].target, Endpoint::wildcard("*:interface:IRepository"));
        assert!(!implements[0].target.is_resolved());

        // file-scoped namespace contains all three types
        assert_eq!(
            rels_of(&extraction, RelationshipType::Contains)
                .iter()
                .filter(|r| r.source.key() == ns.id)
                .count(),
            3
        );
    }

    #[test]
    fn test_database_access_from_enclosing_method() {
        let extraction = extract(
            r#"
public class CustomerManager
{
    public DataTable GetCustomers()
    {
        using (var conn = new SqlConnection(_cs))
        {
            var cmd = new SqlCommand("sp_GetCustomers", conn);
            cmd.CommandType = CommandType.StoredProcedure;
            return Fill(cmd);
        }
    }

    public void Delete(int id)
    {
        var cmd = new SqlCommand("usp_DeleteCustomer", conn); cmd.ExecuteNonQuery();
    }
}
"#,
        );

        let db = rels_of(&extraction, RelationshipType::DatabaseAccess);
        assert_eq!(db.len(), 2);
        assert_eq!(
            db[0].source,
            Endpoint::node("App/CustomerManager.cs:method:CustomerManager:GetCustomers")
        );
        assert_eq!(db[0].target, Endpoint::node("database:procedure:sp_GetCustomers"));
        assert_eq!(db[0].confidence, DB_ACCESS_CONFIDENCE);
        assert_eq!(db[0].metadata["line_number"], 8);
        assert_eq!(
            db[1].source,
            Endpoint::node("App/CustomerManager.cs:method:CustomerManager:Delete")
        );

        let procs = nodes_of(&extraction, NodeKind::StoredProcedure);
        assert_eq!(procs.len(), 2);
        assert!(procs.iter().all(|p| p.file_path == "database" && p.line_number == 0));
    }

    #[test]
    fn test_procedure_name_before_api_call() {
        let extraction = extract(
            r#"
class OrderManager {
    void Save() {
        string proc = "usp_SaveOrder";
        var x = 1;
        var cmd = new SqlCommand(proc, conn);
    }
}
"#,
        );
        let db = rels_of(&extraction, RelationshipType::DatabaseAccess);
        assert_eq!(db.len(), 1);
        assert_eq!(db[0].target, Endpoint::node("database:procedure:usp_SaveOrder"));
        assert_eq!(db[0].metadata["line_number"], 4);
    }

    #[test]
    fn test_database_access_outside_method_uses_wildcard() {
        let extraction = extract(
            r#"
class Queries {
    private SqlCommand _cmd = new SqlCommand("sp_Warmup");
}
"#,
        );
        let db = rels_of(&extraction, RelationshipType::DatabaseAccess);
        assert_eq!(db.len(), 1);
        assert_eq!(
            db[0].source,
            Endpoint::wildcard("App/CustomerManager.cs:method:Queries:*")
        );
    }

    #[test]
    fn test_expression_bodied_members_own_their_database_access() {
        let extraction = extract(
            r#"
class OrderManager {
    public DataTable Get() => Fill(new SqlCommand("sp_GetOrders"));
    public DataTable Recent =>
        Fill(new SqlCommand("sp_GetRecentOrders"));
    private SqlCommand _warmup = new SqlCommand("sp_Warmup");
}
"#,
        );

        let methods = nodes_of(&extraction, NodeKind::Method);
        assert_eq!(methods.len(), 1);
        let properties = nodes_of(&extraction, NodeKind::Property);
        assert_eq!(properties.len(), 1);

        let db = rels_of(&extraction, RelationshipType::DatabaseAccess);
        assert_eq!(db.len(), 3);
        assert_eq!(db[0].source, Endpoint::node(methods[0].id.as_str()));
        assert_eq!(db[0].source.key(), "App/CustomerManager.cs:method:OrderManager:Get");
        assert_eq!(db[1].source, Endpoint::node(properties[0].id.as_str()));
        assert_eq!(
            db[2].source,
            Endpoint::wildcard("App/CustomerManager.cs:method:OrderManager:*")
        );
    }

    #[test]
    fn test_no_database_access_without_api() {
        let extraction = extract(
            r#"
class Labels {
    string Title() { return "sp_NotAProcedureCall"; }
}
"#,
        );
        assert!(rels_of(&extraction, RelationshipType::DatabaseAccess).is_empty());
        assert!(nodes_of(&extraction, NodeKind::StoredProcedure).is_empty());
    }

    #[test]
    fn test_comments_and_strings_do_not_open_scopes() {
        let extraction = extract(
            r#"
class A {
    // class Fake { void Nope() { } }
    /* class AlsoFake {
       } */
    string s = "{ not a brace }";
    char c = '{';
    void Real() { }
}
"#,
        );
        let classes = nodes_of(&extraction, NodeKind::Class);
        assert_eq!(classes.len(), 1);
        let methods = nodes_of(&extraction, NodeKind::Method);
        assert_eq!(methods.len(), 1);
        assert_eq!(methods[0].id, "App/CustomerManager.cs:method:A:Real");
    }

    #[test]
    fn test_malformed_input_is_ignored() {
        let extraction = extract("class { void ( } } } namespace ;;; {{");
        assert!(nodes_of(&extraction, NodeKind::Method).is_empty());
        let extraction = extract("");
        assert!(extraction.is_empty());
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let content = r#"namespace N { public class OrderManager { public void Save() { } } }"#;
        let a = extract(content);
        let b = extract(content);
        let ids_a: Vec<&str> = a.nodes.iter().map(|n| n.id.as_str()).collect();
        let ids_b: Vec<&str> = b.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids_a, ids_b);
        assert_eq!(a.relationships, b.relationships);
    }

    #[test]
    fn test_parse_bases() {
        assert_eq!(parse_bases(" : Base, IFoo"), vec!["Base", "IFoo"]);
        assert_eq!(parse_bases("<T> : Sys.Base<T> where T : new()"), vec!["Base"]);
        assert_eq!(parse_bases("(string Name) : Entity(Name)"), vec!["Entity"]);
        assert!(parse_bases("").is_empty());
    }

    #[test]
    fn test_access_modifier() {
        assert_eq!(access_modifier("protected internal static "), "protected internal");
        assert_eq!(access_modifier("static "), "default");
    }
}
