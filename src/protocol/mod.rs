//! Compact indentation-based text protocol for model turns
//!
//! Structured plan data has to survive round-trips through free-text model
//! output. JSON is token-hungry and brittle under minor formatting drift, so
//! plan data rides a compact `key: value` format instead.
//!
//! # Format
//!
//! ```text
//! title: Daily Report
//! enabled: true
//! count: 42
//! tags: urgent,daily
//! workflow:
//!   name: Daily Report
//!   nodes:
//!     - name: Schedule
//!       type: scheduleTrigger
//!       position:
//!         - 0
//!         - 0
//! ```
//!
//! Rules:
//! - a document is a sequence of `key: value` lines; nesting is expressed by
//!   a consistent two-space indent step
//! - scalars are auto-typed: `true`/`false`, `null`, numeric literals, and
//!   everything else is a string (no quoting)
//! - short homogeneous primitive arrays (2–5 items) are written inline,
//!   comma-separated; all other arrays as `- ` item blocks
//! - an object item in a `- ` block carries its first key inline after the
//!   dash; the remaining keys follow at the dash's indent + 2
//!
//! `parse(&format(v))` deep-equals `v` for any acyclic tree of objects,
//! arrays and primitive leaves whose strings are single-line, comma-free,
//! trimmed, and not lexically `true`/`false`/`null`/numeric. Parsing never
//! panics and never returns a partial document: callers get either a full
//! [`serde_json::Value`] or a [`ParseFailure`] listing every problem found.

use serde_json::{Map, Value};

const INDENT: usize = 2;
const INLINE_MAX: usize = 5;

/// A single structured parse error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    /// 1-based line number in the input
    pub line: usize,
    /// What went wrong at that line
    pub message: String,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

/// Parse failure carrying every error found in the input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseFailure {
    pub errors: Vec<ParseError>,
}

impl ParseFailure {
    fn single(line: usize, message: impl Into<String>) -> Self {
        Self {
            errors: vec![ParseError {
                line,
                message: message.into(),
            }],
        }
    }
}

impl std::fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "protocol parse failed: ")?;
        for (i, e) in self.errors.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}", e)?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseFailure {}

/// One significant input line
#[derive(Debug, Clone)]
struct Line {
    number: usize,
    indent: usize,
    content: String,
}

/// Parse a protocol document into a JSON value
pub fn parse(input: &str) -> std::result::Result<Value, ParseFailure> {
    let mut lines = Vec::new();
    let mut errors = Vec::new();

    for (i, raw) in input.lines().enumerate() {
        let number = i + 1;
        if raw.trim().is_empty() {
            continue;
        }
        if raw.contains('\t') {
            errors.push(ParseError {
                line: number,
                message: "tabs are not allowed; indent with spaces".to_string(),
            });
            continue;
        }
        let indent = raw.len() - raw.trim_start_matches(' ').len();
        if indent % INDENT != 0 {
            errors.push(ParseError {
                line: number,
                message: format!("indent of {} is not a multiple of {}", indent, INDENT),
            });
            continue;
        }
        lines.push(Line {
            number,
            indent,
            content: raw.trim_start().trim_end().to_string(),
        });
    }

    if !errors.is_empty() {
        return Err(ParseFailure { errors });
    }
    if lines.is_empty() {
        return Err(ParseFailure::single(1, "empty document"));
    }
    if lines[0].indent != 0 {
        return Err(ParseFailure::single(
            lines[0].number,
            "document must start at indent 0",
        ));
    }

    let mut cursor = 0;
    let value = parse_block(&mut lines, &mut cursor, 0)?;

    if cursor < lines.len() {
        return Err(ParseFailure::single(
            lines[cursor].number,
            "trailing content after document",
        ));
    }

    Ok(value)
}

/// Parse either an object or an array starting at the given indent
fn parse_block(
    lines: &mut Vec<Line>,
    cursor: &mut usize,
    indent: usize,
) -> std::result::Result<Value, ParseFailure> {
    let first = &lines[*cursor];
    if first.content == "-" || first.content.starts_with("- ") {
        parse_array(lines, cursor, indent)
    } else {
        parse_object(lines, cursor, indent)
    }
}

fn parse_object(
    lines: &mut Vec<Line>,
    cursor: &mut usize,
    indent: usize,
) -> std::result::Result<Value, ParseFailure> {
    let mut map = Map::new();

    while *cursor < lines.len() {
        let line = lines[*cursor].clone();
        if line.indent < indent {
            break;
        }
        if line.indent > indent {
            return Err(ParseFailure::single(line.number, "unexpected indent"));
        }
        if line.content == "-" || line.content.starts_with("- ") {
            return Err(ParseFailure::single(
                line.number,
                "list item where a key was expected",
            ));
        }

        let (key, rest) = split_pair(&line.content).ok_or_else(|| {
            ParseFailure::single(line.number, "expected a 'key: value' line")
        })?;
        if key.is_empty() {
            return Err(ParseFailure::single(line.number, "empty key"));
        }
        *cursor += 1;

        let value = if rest.is_empty() {
            // Nested block, or null when nothing follows
            match lines.get(*cursor) {
                Some(next) if next.indent > indent => {
                    let child_indent = next.indent;
                    parse_block(lines, cursor, child_indent)?
                }
                _ => Value::Null,
            }
        } else {
            let v = value_token(rest);
            // Scalars must not have deeper children
            if let Some(next) = lines.get(*cursor) {
                if next.indent > indent {
                    return Err(ParseFailure::single(
                        next.number,
                        "unexpected indent under a scalar value",
                    ));
                }
            }
            v
        };

        map.insert(key.to_string(), value);
    }

    Ok(Value::Object(map))
}

fn parse_array(
    lines: &mut Vec<Line>,
    cursor: &mut usize,
    indent: usize,
) -> std::result::Result<Value, ParseFailure> {
    let mut items = Vec::new();

    while *cursor < lines.len() {
        let line = lines[*cursor].clone();
        if line.indent < indent {
            break;
        }
        if line.indent > indent {
            return Err(ParseFailure::single(line.number, "unexpected indent"));
        }

        if line.content == "-" {
            // Bare dash: the item is the nested block beneath it
            *cursor += 1;
            let item = match lines.get(*cursor) {
                Some(next) if next.indent > indent => {
                    let child_indent = next.indent;
                    parse_block(lines, cursor, child_indent)?
                }
                _ => Value::Null,
            };
            items.push(item);
        } else if let Some(rest) = line.content.strip_prefix("- ") {
            if looks_like_pair(rest) {
                // Object item with its first key inline after the dash:
                // rewrite the line as that pair and parse an object at +2.
                lines[*cursor] = Line {
                    number: line.number,
                    indent: indent + INDENT,
                    content: rest.to_string(),
                };
                items.push(parse_object(lines, cursor, indent + INDENT)?);
            } else {
                *cursor += 1;
                if let Some(next) = lines.get(*cursor) {
                    if next.indent > indent {
                        return Err(ParseFailure::single(
                            next.number,
                            "unexpected indent under a scalar list item",
                        ));
                    }
                }
                items.push(scalar_token(rest));
            }
        } else {
            return Err(ParseFailure::single(
                line.number,
                "expected a '- ' list item",
            ));
        }
    }

    Ok(Value::Array(items))
}

/// Split `key: value` at the first pair-forming colon; `value` may be empty
fn split_pair(content: &str) -> Option<(&str, &str)> {
    let idx = pair_colon(content)?;
    let key = content[..idx].trim();
    let rest = content[idx + 1..].trim();
    Some((key, rest))
}

/// A line forms a pair when a colon is followed by a space or ends the line.
/// This keeps `http://example.com` and `12:30` intact as scalar strings.
fn pair_colon(content: &str) -> Option<usize> {
    let bytes = content.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        if b == b':' && (i + 1 == bytes.len() || bytes[i + 1] == b' ') {
            return Some(i);
        }
    }
    None
}

fn looks_like_pair(content: &str) -> bool {
    match pair_colon(content) {
        Some(idx) => !content[..idx].trim().is_empty(),
        None => false,
    }
}

/// A value position: inline comma-separated lists become arrays
fn value_token(token: &str) -> Value {
    if token.contains(',') {
        Value::Array(token.split(',').map(|p| scalar_token(p.trim())).collect())
    } else {
        scalar_token(token)
    }
}

/// Auto-type a single scalar token
fn scalar_token(token: &str) -> Value {
    match token {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        "null" => return Value::Null,
        "[]" => return Value::Array(Vec::new()),
        _ => {}
    }
    if let Ok(n) = token.parse::<i64>() {
        return Value::Number(n.into());
    }
    if looks_numeric(token) {
        if let Ok(f) = token.parse::<f64>() {
            if let Some(n) = serde_json::Number::from_f64(f) {
                return Value::Number(n);
            }
        }
    }
    Value::String(token.to_string())
}

/// Restrict float detection to plain decimal literals so tokens such as
/// `1e5` or `nan` stay strings.
fn looks_numeric(token: &str) -> bool {
    let rest = token.strip_prefix('-').unwrap_or(token);
    !rest.is_empty()
        && rest.chars().all(|c| c.is_ascii_digit() || c == '.')
        && rest.chars().filter(|&c| c == '.').count() <= 1
        && !rest.starts_with('.')
        && !rest.ends_with('.')
}

/// Pull a protocol document out of free-form model output.
///
/// Models wrap documents in markdown fences or preface them with prose more
/// often than not. If the text contains a fenced block, its body is the
/// document; otherwise the whole trimmed text is.
pub fn strip_fences(text: &str) -> &str {
    let trimmed = text.trim();
    if let Some(start) = trimmed.find("```") {
        let after_ticks = &trimmed[start + 3..];
        // Skip an optional language tag on the fence line
        let body_start = after_ticks.find('\n').map(|i| i + 1).unwrap_or(0);
        let body = &after_ticks[body_start..];
        if let Some(end) = body.find("```") {
            return body[..end].trim();
        }
        return body.trim();
    }
    trimmed
}

/// Format a JSON value as a protocol document
pub fn format(value: &Value) -> String {
    let mut out = String::new();
    match value {
        Value::Object(map) => write_object(map, 0, &mut out),
        Value::Array(items) => write_array(items, 0, &mut out),
        other => {
            out.push_str(&scalar_text(other));
            out.push('\n');
        }
    }
    out
}

fn write_object(map: &Map<String, Value>, indent: usize, out: &mut String) {
    let pad = " ".repeat(indent);
    for (key, value) in map {
        match value {
            Value::Object(child) if !child.is_empty() => {
                out.push_str(&pad);
                out.push_str(key);
                out.push_str(":\n");
                write_object(child, indent + INDENT, out);
            }
            Value::Array(items) if items.is_empty() => {
                out.push_str(&pair_line(&pad, key, "[]"));
            }
            Value::Array(items) if inline_eligible(items) => {
                let joined: Vec<String> = items.iter().map(scalar_text).collect();
                out.push_str(&pair_line(&pad, key, &joined.join(",")));
            }
            Value::Array(items) => {
                out.push_str(&pad);
                out.push_str(key);
                out.push_str(":\n");
                write_array(items, indent + INDENT, out);
            }
            other => {
                out.push_str(&pair_line(&pad, key, &scalar_text(other)));
            }
        }
    }
}

fn pair_line(pad: &str, key: &str, value: &str) -> String {
    if value.is_empty() {
        format!("{}{}:\n", pad, key)
    } else {
        format!("{}{}: {}\n", pad, key, value)
    }
}

fn write_array(items: &[Value], indent: usize, out: &mut String) {
    let pad = " ".repeat(indent);
    for item in items {
        match item {
            Value::Object(map) if !map.is_empty() => {
                let mut entries = map.iter();
                let (first_key, first_value) = entries.next().unwrap();
                if is_primitive(first_value) {
                    // First pair inline after the dash, the rest at +2
                    out.push_str(&pad);
                    out.push_str("- ");
                    out.push_str(first_key);
                    out.push_str(": ");
                    out.push_str(&scalar_text(first_value));
                    out.push('\n');
                    let mut rest = Map::new();
                    for (k, v) in entries {
                        rest.insert(k.clone(), v.clone());
                    }
                    write_object(&rest, indent + INDENT, out);
                } else {
                    out.push_str(&pad);
                    out.push_str("-\n");
                    write_object(map, indent + INDENT, out);
                }
            }
            Value::Array(inner) if inner.is_empty() => {
                out.push_str(&pad);
                out.push_str("- []\n");
            }
            Value::Array(inner) => {
                out.push_str(&pad);
                out.push_str("-\n");
                write_array(inner, indent + INDENT, out);
            }
            other => {
                out.push_str(&pad);
                out.push_str("- ");
                out.push_str(&scalar_text(other));
                out.push('\n');
            }
        }
    }
}

/// Arrays of 2–5 same-typed primitives are written inline. Single-element
/// arrays stay in block form so they parse back as arrays, not scalars.
fn inline_eligible(items: &[Value]) -> bool {
    if items.len() < 2 || items.len() > INLINE_MAX {
        return false;
    }
    if !items.iter().all(is_primitive) {
        return false;
    }
    let same_kind = items
        .windows(2)
        .all(|w| std::mem::discriminant(&w[0]) == std::mem::discriminant(&w[1]));
    if !same_kind {
        return false;
    }
    items.iter().all(|v| {
        let s = scalar_text(v);
        !s.contains(',') && !s.contains('\n')
    })
}

fn is_primitive(value: &Value) -> bool {
    matches!(
        value,
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_)
    )
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        // Containers never reach here through format()
        other => other.to_string(),
    }
}
