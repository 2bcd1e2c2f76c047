//! Result formatting
//!
//! Raw backend output becomes a fixed-width text table. Two input shapes are
//! understood:
//! - JSON array of records: headers come from the first record's keys, in order
//! - Columnar text (`kubectl`, `az -o table`): the first non-empty line is the
//!   header and every line is split on whitespace
//!
//! Cells wider than [`MAX_CELL_WIDTH`] display columns are truncated with `…`.

use serde_json::{Map, Value};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::error::{ParleyError, Result};

/// Widest a cell may render, in terminal columns
pub const MAX_CELL_WIDTH: usize = 40;

/// Rendered in place of an empty result
pub const NO_ROWS: &str = "(no rows)";

const COLUMN_GAP: &str = "  ";

/// Format output whose shape is not known up front
///
/// JSON arrays and objects take the record path; anything else is treated
/// as columnar text.
pub fn auto(raw: &[u8]) -> Result<String> {
    let text = decode(raw)?;
    if text.trim().is_empty() {
        return Ok(NO_ROWS.to_string());
    }

    match serde_json::from_str::<Value>(text) {
        Ok(value @ (Value::Array(_) | Value::Object(_))) => json_value_table(value),
        _ => Ok(columnar_table(text)),
    }
}

/// Format output that must be JSON
pub fn json_table(raw: &[u8]) -> Result<String> {
    let text = decode(raw)?;
    let value: Value = serde_json::from_str(text)
        .map_err(|e| ParleyError::format(format!("Output is not valid JSON: {e}")))?;
    json_value_table(value)
}

fn decode(raw: &[u8]) -> Result<&str> {
    std::str::from_utf8(raw)
        .map_err(|e| ParleyError::format(format!("Output is not valid UTF-8: {e}")))
}

fn json_value_table(value: Value) -> Result<String> {
    match value {
        Value::Array(items) if items.is_empty() => Ok(NO_ROWS.to_string()),
        Value::Array(items) if items.iter().all(Value::is_object) => {
            let records: Vec<Map<String, Value>> = items
                .into_iter()
                .filter_map(|item| match item {
                    Value::Object(map) => Some(map),
                    _ => None,
                })
                .collect();
            Ok(records_table(&records))
        }
        Value::Array(items) => {
            let rows = items.iter().map(|v| vec![cell_text(v)]).collect();
            Ok(render(&["value".to_string()], rows))
        }
        Value::Object(map) => Ok(records_table(std::slice::from_ref(&map))),
        other => Err(ParleyError::format(format!(
            "Expected a JSON array or object, got {}",
            json_type_name(&other)
        ))),
    }
}

/// Table from JSON records
///
/// Headers are the first record's keys; a record missing a key renders a
/// blank cell and keys absent from the first record are not shown.
#[must_use]
pub fn records_table(records: &[Map<String, Value>]) -> String {
    let Some(first) = records.first() else {
        return NO_ROWS.to_string();
    };

    let headers: Vec<String> = first.keys().cloned().collect();
    let rows = records
        .iter()
        .map(|record| {
            headers.iter().map(|h| record.get(h).map(cell_text).unwrap_or_default()).collect()
        })
        .collect();

    render(&headers, rows)
}

/// Table from whitespace-aligned text
///
/// Rows whose field count differs from the header pass through unpadded.
/// A single line with nothing under it is returned as-is, since CLIs print
/// status messages ("No resources found") on their own.
#[must_use]
pub fn columnar_table(text: &str) -> String {
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());
    let Some(header_line) = lines.next() else {
        return NO_ROWS.to_string();
    };

    let rows: Vec<Vec<String>> =
        lines.map(|l| l.split_whitespace().map(str::to_string).collect()).collect();
    if rows.is_empty() {
        return header_line.trim().to_string();
    }

    let headers: Vec<String> = header_line.split_whitespace().map(str::to_string).collect();
    render(&headers, rows)
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

const fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Truncate to `MAX_CELL_WIDTH` display columns, ending in `…`
#[must_use]
pub fn truncate_cell(cell: &str) -> String {
    // newlines would break the row layout
    let flat = cell.replace(['\n', '\r'], " ");
    if flat.width() <= MAX_CELL_WIDTH {
        return flat;
    }

    let mut out = String::new();
    let mut used = 0;
    for ch in flat.chars() {
        let w = ch.width().unwrap_or(0);
        if used + w > MAX_CELL_WIDTH - 1 {
            break;
        }
        out.push(ch);
        used += w;
    }
    out.push('…');
    out
}

fn pad(cell: &str, width: usize) -> String {
    let fill = width.saturating_sub(cell.width());
    format!("{cell}{}", " ".repeat(fill))
}

fn render(headers: &[String], rows: Vec<Vec<String>>) -> String {
    let headers: Vec<String> = headers.iter().map(|h| truncate_cell(h)).collect();
    let rows: Vec<Vec<String>> =
        rows.into_iter().map(|r| r.iter().map(|c| truncate_cell(c)).collect()).collect();

    let mut widths: Vec<usize> = headers.iter().map(|h| h.width()).collect();
    for row in rows.iter().filter(|r| r.len() == headers.len()) {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.width());
        }
    }

    let line = |cells: &[String]| -> String {
        let joined = if cells.len() == widths.len() {
            cells.iter().zip(&widths).map(|(c, w)| pad(c, *w)).collect::<Vec<_>>().join(COLUMN_GAP)
        } else {
            cells.join(COLUMN_GAP)
        };
        joined.trim_end().to_string()
    };

    let separator: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();

    let mut out = vec![line(&headers), line(&separator)];
    out.extend(rows.iter().map(|r| line(r)));
    out.join("\n")
}
