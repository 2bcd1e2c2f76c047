//! Command Validation
//!
//! Every translated command is validated before it can be confirmed. The
//! checks are per backend kind:
//! - SQL: labels and code fences stripped, camel-case identifiers quoted,
//!   a single SELECT/INSERT/UPDATE/DELETE statement required
//! - Kubernetes: the command must invoke `kubectl` and may only name the
//!   session's own `--context`
//! - MongoDB: one JSON command document running a read or write command
//! - Cloud: the command must be non-empty
//!
//! # Validation Strategy
//! - Literals, quoted identifiers and comments are scanned as opaque segments
//!   so keywords or semicolons inside them never count
//! - Conservative approach: anything not recognised is rejected with the
//!   offending command in the message

use regex::Regex;

use crate::engine::context::QuoteStyle;
use crate::error::{ParleyError, Result};

/// Statements a translated SQL command may start with
const ALLOWED_SQL_KEYWORDS: &[&str] = &["SELECT", "INSERT", "UPDATE", "DELETE"];

/// Database commands a translated MongoDB command may run
const ALLOWED_MONGO_COMMANDS: &[&str] =
    &["find", "aggregate", "count", "distinct", "insert", "update", "delete"];

/// Aggregation stages that write to a collection
const MONGO_WRITE_STAGES: &[&str] = &["$out", "$merge"];

/// Bare camel-case identifier (e.g. `userId`, `createdAt2`)
const CAMEL_CASE_PATTERN: &str = r"\b[a-z]+[A-Z][A-Za-z0-9]*\b";

/// Validate a translated SQL command, returning the text to execute
///
/// The returned command differs from the input only by the removed label
/// and fences and by identifier quoting.
pub fn validate_sql(raw: &str, quote: QuoteStyle) -> Result<String> {
    let stripped = strip_sql_labels(raw);
    if stripped.is_empty() {
        return Err(ParleyError::translation("SQL query is empty"));
    }

    let quoted = quote_camel_case(&stripped, quote)?;
    let code = code_only(&quoted);

    let first_word = leading_keyword(&quoted);
    if !ALLOWED_SQL_KEYWORDS.contains(&first_word.as_str()) {
        return Err(ParleyError::translation(format!(
            "Only SELECT, INSERT, UPDATE and DELETE statements are supported, got:\n\n{quoted}"
        )));
    }

    // only a trailing separator is allowed
    let trimmed_for_check = code.trim().trim_end_matches(';').trim_end();
    if trimmed_for_check.contains(';') {
        return Err(ParleyError::translation(
            "Multi-statement queries are not supported; ask for one statement at a time",
        ));
    }

    Ok(quoted)
}

/// First word of the statement outside comments and literals, uppercased
#[must_use]
pub fn leading_keyword(sql: &str) -> String {
    code_only(sql)
        .split(|c: char| c.is_whitespace() || c == '(')
        .find(|w| !w.is_empty())
        .map(str::to_uppercase)
        .unwrap_or_default()
}

/// Validate a translated kubectl command
pub fn validate_kubectl(raw: &str) -> Result<String> {
    let command = strip_code_markers(raw);
    let program = command.split_whitespace().next().unwrap_or_default();

    if program != "kubectl" {
        return Err(ParleyError::translation(format!(
            "Kubernetes commands must start with kubectl, got: {command}"
        )));
    }

    Ok(command.to_string())
}

/// Validate a kubectl command for a session pinned to `context`
///
/// An explicit `--context` naming another cluster is rejected; a command
/// without one is checked against the current context when it runs.
pub fn validate_kubectl_in(raw: &str, context: &str) -> Result<String> {
    let command = validate_kubectl(raw)?;
    if let Some(other) = kubectl_contexts(&command).into_iter().find(|c| *c != context) {
        return Err(ParleyError::translation(format!(
            "This session is checked against context '{context}' but the command targets '{other}'"
        )));
    }
    Ok(command)
}

/// Values of every `--context` flag in a kubectl command
#[must_use]
pub fn kubectl_contexts(command: &str) -> Vec<&str> {
    let mut found = Vec::new();
    let mut words = command.split_whitespace();
    while let Some(word) = words.next() {
        let value = if word == "--context" {
            words.next()
        } else {
            word.strip_prefix("--context=")
        };
        if let Some(value) = value {
            found.push(value.trim_matches(|c| c == '\'' || c == '"'));
        }
    }
    found
}

/// Validate a translated MongoDB command document, returning it as compact JSON
pub fn validate_mongo(raw: &str) -> Result<String> {
    let text = strip_code_markers(raw);
    if text.is_empty() {
        return Err(ParleyError::translation("MongoDB command is empty"));
    }

    let value: serde_json::Value = serde_json::from_str(text).map_err(|e| {
        ParleyError::translation(format!("MongoDB commands must be one JSON document ({e}), got:\n\n{text}"))
    })?;

    // the command name is the first key
    let name = match value.as_object().and_then(|doc| doc.keys().next()) {
        Some(name) => name.as_str(),
        None => {
            return Err(ParleyError::translation(format!(
                "MongoDB commands must be a non-empty JSON object, got:\n\n{text}"
            )))
        }
    };
    if !ALLOWED_MONGO_COMMANDS.contains(&name) {
        return Err(ParleyError::translation(format!(
            "Only find, aggregate, count, distinct, insert, update and delete commands are supported, got: {name}"
        )));
    }
    if name == "aggregate" && mentions_key(&value, MONGO_WRITE_STAGES) {
        return Err(ParleyError::translation(
            "Aggregations that write with $out or $merge are not supported",
        ));
    }

    serde_json::to_string(&value)
        .map_err(|e| ParleyError::translation(format!("Could not re-encode MongoDB command: {e}")))
}

fn mentions_key(value: &serde_json::Value, keys: &[&str]) -> bool {
    match value {
        serde_json::Value::Object(map) => {
            map.iter().any(|(k, v)| keys.contains(&k.as_str()) || mentions_key(v, keys))
        }
        serde_json::Value::Array(items) => items.iter().any(|v| mentions_key(v, keys)),
        _ => false,
    }
}

/// Validate a translated cloud CLI command
pub fn validate_cloud(raw: &str) -> Result<String> {
    let command = strip_code_markers(raw);
    if command.is_empty() {
        return Err(ParleyError::translation("Cloud command is empty"));
    }
    Ok(command.to_string())
}

/// Language tags a model may put after an opening fence
const FENCE_TAGS: &[&str] = &[
    "sql", "mysql", "postgresql", "postgres", "psql", "pgsql", "sqlite", "json", "bash", "sh", "shell",
    "console",
];

/// Remove a leading `Query:` label and surrounding code fences or backticks
fn strip_sql_labels(raw: &str) -> String {
    let unwrapped = strip_code_markers(raw);
    let unlabelled = match unwrapped.get(..6) {
        Some(label) if label.eq_ignore_ascii_case("query:") => strip_code_markers(&unwrapped[6..]),
        _ => unwrapped,
    };
    unlabelled.to_string()
}

/// Strip a fence pair (opening fence may carry a language tag) or a pair of
/// single backticks wrapping the whole text
///
/// Works on one line (` ```sql SELECT 1``` `) as well as on a fenced block.
pub fn strip_code_markers(raw: &str) -> &str {
    let mut text = raw.trim();

    if let Some(rest) = text.strip_prefix("```") {
        let tag_end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        let tag = &rest[..tag_end];
        text = if tag.is_empty() || FENCE_TAGS.iter().any(|t| t.eq_ignore_ascii_case(tag)) {
            &rest[tag_end..]
        } else {
            rest
        };
        text = text.trim();
        text = text.strip_suffix("```").unwrap_or(text).trim();
    } else if let Some(rest) = text.strip_suffix("```") {
        text = rest.trim();
    }

    // a statement never starts with a quoted identifier
    if text.len() >= 2 && text.starts_with('`') && text.ends_with('`') && !text.starts_with("``") {
        text = text[1..text.len() - 1].trim();
    }

    text
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SegmentKind {
    /// Plain SQL text
    Code,
    /// String literal or quoted identifier, delimiters included
    Quoted,
    /// `--` or `/* */` comment, delimiters included
    Comment,
}

/// Split SQL into code, quoted and comment segments
///
/// Handles:
/// - String literals: 'it''s' (doubled quote escape)
/// - Quoted identifiers: "name" and `name`
/// - Line comments: -- comment
/// - Block comments: /* comment */
///
/// An unterminated literal or comment runs to the end of input.
fn segments(sql: &str) -> Vec<(SegmentKind, &str)> {
    let bytes = sql.as_bytes();
    let mut out = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            q @ (b'\'' | b'"' | b'`') => {
                push(&mut out, sql, SegmentKind::Code, start, i);
                let open = i;
                i += 1;
                loop {
                    match bytes.get(i) {
                        None => break,
                        Some(&b) if b == q => {
                            // doubled delimiter is an escape
                            if bytes.get(i + 1) == Some(&q) {
                                i += 2;
                                continue;
                            }
                            i += 1;
                            break;
                        }
                        Some(_) => i += 1,
                    }
                }
                push(&mut out, sql, SegmentKind::Quoted, open, i);
                start = i;
            }
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                push(&mut out, sql, SegmentKind::Code, start, i);
                let open = i;
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
                push(&mut out, sql, SegmentKind::Comment, open, i);
                start = i;
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                push(&mut out, sql, SegmentKind::Code, start, i);
                let open = i;
                i += 2;
                while i < bytes.len() && !(bytes[i - 1] == b'*' && bytes[i] == b'/' && i > open + 2) {
                    i += 1;
                }
                i = (i + 1).min(bytes.len());
                push(&mut out, sql, SegmentKind::Comment, open, i);
                start = i;
            }
            _ => i += 1,
        }
    }
    push(&mut out, sql, SegmentKind::Code, start, bytes.len());

    out
}

fn push<'a>(
    out: &mut Vec<(SegmentKind, &'a str)>,
    sql: &'a str,
    kind: SegmentKind,
    from: usize,
    to: usize,
) {
    if to > from {
        out.push((kind, &sql[from..to]));
    }
}

/// Code segments only; comments become a space and quoted text an empty literal
fn code_only(sql: &str) -> String {
    segments(sql)
        .into_iter()
        .map(|(kind, text)| match kind {
            SegmentKind::Code => text,
            SegmentKind::Comment => " ",
            SegmentKind::Quoted => " '' ",
        })
        .collect()
}

/// Quote bare camel-case identifiers outside literals, quotes and comments
pub fn quote_camel_case(sql: &str, quote: QuoteStyle) -> Result<String> {
    let pattern = Regex::new(CAMEL_CASE_PATTERN).map_err(|e| {
        ParleyError::translation(format!("Invalid identifier pattern: {e}"))
    })?;

    let mut result = String::with_capacity(sql.len() + 8);
    for (kind, text) in segments(sql) {
        match kind {
            SegmentKind::Code => {
                let replaced = pattern.replace_all(text, |caps: &regex::Captures<'_>| {
                    quote.quote(&caps[0])
                });
                result.push_str(&replaced);
            }
            SegmentKind::Quoted | SegmentKind::Comment => result.push_str(text),
        }
    }

    Ok(result)
}
