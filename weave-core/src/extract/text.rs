//! Small text utilities shared by the extractors.

use std::path::Path;

/// Maps byte offsets to 1-based line numbers.
pub(crate) struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    pub(crate) fn new(content: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(content.match_indices('\n').map(|(i, _)| i + 1));
        Self { starts }
    }

    pub(crate) fn line_of(&self, offset: usize) -> u32 {
        match self.starts.binary_search(&offset) {
            Ok(i) => i as u32 + 1,
            Err(i) => i as u32,
        }
    }
}

/// `Pages/Customer.List.aspx` -> `Customer`.
pub(crate) fn page_stem(file_path: &str) -> String {
    let file_name = Path::new(file_path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(file_path);
    file_name
        .split('.')
        .next()
        .unwrap_or(file_name)
        .to_string()
}

/// Resolve `relative` against the directory of `file_path`, using `/`.
pub(crate) fn sibling_path(file_path: &str, relative: &str) -> String {
    let relative = relative.replace('\\', "/");
    let relative = relative.trim_start_matches("~/");
    let file_path = file_path.replace('\\', "/");
    match Path::new(&file_path).parent().and_then(|p| p.to_str()) {
        Some(parent) if !parent.is_empty() => format!("{}/{}", parent, relative),
        _ => relative.to_string(),
    }
}

/// Split a possibly bracketed, schema-qualified identifier into
/// `(schema, name)`: `[dbo].[Customers]` -> `(Some("dbo"), "Customers")`.
pub(crate) fn split_qualified(identifier: &str) -> (Option<String>, String) {
    let parts: Vec<String> = identifier
        .split('.')
        .map(|p| p.trim().trim_matches(|c| c == '[' || c == ']' || c == '"' || c == '`'))
        .filter(|p| !p.is_empty())
        .map(|p| p.to_string())
        .collect();
    match parts.len() {
        0 => (None, String::new()),
        1 => (None, parts[0].clone()),
        n => (Some(parts[n - 2].clone()), parts[n - 1].clone()),
    }
}

/// Split on `sep` where it is not nested inside `<>`, `()` or `[]`.
pub(crate) fn split_top_level(s: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '<' | '(' | '[' => depth += 1,
            '>' | ')' | ']' => depth -= 1,
            c if c == sep && depth <= 0 => {
                parts.push(&s[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts
}

/// Return the text after the balanced group that `s` starts with.
/// An unbalanced group consumes everything.
pub(crate) fn skip_balanced(s: &str, open: char, close: char) -> &str {
    let mut depth = 0;
    for (i, c) in s.char_indices() {
        if c == open {
            depth += 1;
        } else if c == close {
            depth -= 1;
            if depth == 0 {
                return &s[i + c.len_utf8()..];
            }
        }
    }
    ""
}
