//! Turns a successful result into printable lines.
//!
//! The strategy comes from the command's [`ResultFormat`]; failures never
//! reach this module.

pub mod text;

use crate::commands::{LineFormatter, ResultFormat};
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::Value;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// A result whose shape does not fit its formatter.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("expected {expected} result, got {found}")]
    UnexpectedShape {
        expected: &'static str,
        found: &'static str,
    },
    #[error("unexpected {formatter} data: {source}")]
    Table {
        formatter: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode result: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Render `result` with the strategy named by `format`.
pub fn render(format: ResultFormat, result: &Value) -> Result<Vec<String>, RenderError> {
    match format {
        ResultFormat::RawJson => Ok(raw_json(result)?.lines().map(str::to_string).collect()),
        ResultFormat::LineList => line_list(result),
        ResultFormat::SplitText => split_text(result),
        ResultFormat::Named(formatter) => named(formatter, result),
    }
}

/// Pretty-print with four-space indentation; object keys come out sorted.
pub fn raw_json(result: &Value) -> Result<String, RenderError> {
    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
    sorted(result).serialize(&mut ser)?;
    String::from_utf8(buf).map_err(|e| RenderError::Encode(serde::ser::Error::custom(e)))
}

/// Rebuild `value` with every object's keys in order.
fn sorted(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(entries.into_iter().map(|(k, v)| (k.clone(), sorted(v))).collect())
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
        other => other.clone(),
    }
}

fn line_list(result: &Value) -> Result<Vec<String>, RenderError> {
    let items = result.as_array().ok_or(RenderError::UnexpectedShape {
        expected: "a list",
        found: kind(result),
    })?;
    Ok(items
        .iter()
        .map(|item| match item {
            Value::String(line) => line.clone(),
            other => other.to_string(),
        })
        .collect())
}

fn split_text(result: &Value) -> Result<Vec<String>, RenderError> {
    let text = result.as_str().ok_or(RenderError::UnexpectedShape {
        expected: "a string",
        found: kind(result),
    })?;
    Ok(text.split('\n').map(str::to_string).collect())
}

fn named(formatter: LineFormatter, result: &Value) -> Result<Vec<String>, RenderError> {
    let lines = match formatter {
        LineFormatter::Groups => text::groups_lines(result),
        LineFormatter::Sessions => text::sessions_lines(result),
        LineFormatter::Peers => text::peers_lines(result, now_secs()),
    };
    lines.map_err(|source| RenderError::Table {
        formatter: formatter_name(formatter),
        source,
    })
}

fn formatter_name(formatter: LineFormatter) -> &'static str {
    match formatter {
        LineFormatter::Groups => "groups",
        LineFormatter::Peers => "peers",
        LineFormatter::Sessions => "sessions",
    }
}

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}
