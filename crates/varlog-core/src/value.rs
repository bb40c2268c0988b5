// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Value model helpers over [`serde_json::Value`].
//!
//! The variable store holds one [`Value`] per root. Objects keep insertion
//! order (`serde_json/preserve_order`), so a root always re-serializes with
//! the same key and element order it was written with.
//!
//! Roots cross the host boundary as plain strings ([`encode_scalar`] /
//! [`decode_scalar`]); everything below a root is navigated in memory.

use serde_json::{Map, Number, Value};
use thiserror::Error;

use crate::path::Segment;

/// Structural failure while navigating or mutating a root.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MutationError {
    /// A string key was used to address into an array.
    #[error("cannot address key `{key}` inside an array")]
    KeyOnArray {
        /// Offending key.
        key: String,
    },
    /// `push`/`pop` found an existing value that is not an array.
    #[error("target is not an array (found {found})")]
    NotAnArray {
        /// Runtime type name of the value found at the path.
        found: &'static str,
    },
    /// `pop` found nothing at the path.
    #[error("no array at path to remove from")]
    MissingTarget,
    /// The op addressed nothing (empty path).
    #[error("empty path")]
    EmptyPath,
}

/// Decodes a stored root string into a value.
///
/// Strings starting with `{` or `[` are parsed as JSON (falling back to the
/// raw string when they do not parse), decimal-looking strings become
/// numbers, `true`/`false`/`null` map to their JSON counterparts and anything
/// else stays a string.
pub fn decode_scalar(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return serde_json::from_str(trimmed).unwrap_or_else(|_| Value::String(raw.to_string()));
    }
    match trimmed {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        "null" => return Value::Null,
        _ => {}
    }
    if is_decimal(trimmed) {
        if let Some(n) = parse_number(trimmed) {
            return n;
        }
    }
    Value::String(raw.to_string())
}

/// Encodes a root value for the host's string storage.
pub fn encode_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

/// `-?digits(.digits)?`
pub fn is_decimal(s: &str) -> bool {
    let body = s.strip_prefix('-').unwrap_or(s);
    let mut parts = body.splitn(2, '.');
    let int_part = parts.next().unwrap_or_default();
    let frac_ok = parts
        .next()
        .map_or(true, |f| !f.is_empty() && f.bytes().all(|b| b.is_ascii_digit()));
    !int_part.is_empty() && int_part.bytes().all(|b| b.is_ascii_digit()) && frac_ok
}

/// Parses a decimal literal, preferring an integer representation.
pub fn parse_number(s: &str) -> Option<Value> {
    if !s.contains('.') {
        if let Ok(i) = s.parse::<i64>() {
            return Some(Value::Number(Number::from(i)));
        }
    }
    s.parse::<f64>().ok().map(number_value)
}

/// Wraps an `f64`, storing integral values as integers so `60` never
/// round-trips as `60.0`. Non-finite input becomes `null`.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
pub fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 9.0e15 {
        return Value::Number(Number::from(n as i64));
    }
    Number::from_f64(n).map_or(Value::Null, Value::Number)
}

/// Numeric view of a value; numeric strings count.
pub fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) if is_decimal(s.trim()) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Runtime type name used by type locks and advisories.
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Structural equality where `1` and `1.0` compare equal.
pub fn deep_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(l, r)| deep_eq(l, r))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x
                    .iter()
                    .all(|(k, v)| y.get(k).is_some_and(|other| deep_eq(v, other)))
        }
        _ => a == b,
    }
}

/// Compact single-line rendering for advisories and atom descriptions.
pub fn display(value: &Value) -> String {
    match value {
        Value::String(s) => format!("\"{s}\""),
        other => other.to_string(),
    }
}

/// Stringified form used for enum membership checks.
pub fn enum_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Reads the value under `segments` inside `root`.
pub fn get_at<'a>(root: &'a Value, segments: &[Segment]) -> Option<&'a Value> {
    let mut cur = root;
    for seg in segments {
        cur = match (cur, seg) {
            (Value::Object(map), seg) => map.get(&seg.to_string())?,
            (Value::Array(items), Segment::Index(i)) => items.get(*i)?,
            _ => return None,
        };
    }
    Some(cur)
}

/// Returns a mutable slot for `segments`, creating intermediate containers.
///
/// Missing or scalar intermediates are replaced by an array when the next
/// segment is an index and by an object otherwise. Arrays are padded with
/// `null` up to the requested index.
pub fn slot_at<'a>(
    root: &'a mut Value,
    segments: &[Segment],
) -> Result<&'a mut Value, MutationError> {
    let mut cur = root;
    for seg in segments {
        if !matches!(cur, Value::Object(_) | Value::Array(_)) {
            *cur = match seg {
                Segment::Index(_) => Value::Array(Vec::new()),
                Segment::Key(_) => Value::Object(Map::new()),
            };
        }
        cur = match (cur, seg) {
            (Value::Object(map), seg) => map.entry(seg.to_string()).or_insert(Value::Null),
            (Value::Array(items), Segment::Index(i)) => {
                if items.len() <= *i {
                    items.resize(*i + 1, Value::Null);
                }
                &mut items[*i]
            }
            (Value::Array(_), Segment::Key(key)) => {
                return Err(MutationError::KeyOnArray { key: key.clone() })
            }
            // Scalars were replaced above.
            (_, _) => return Err(MutationError::EmptyPath),
        };
    }
    Ok(cur)
}

/// Removes the value under `segments`, splicing arrays. Returns the removed
/// value, or `None` when nothing was there.
pub fn remove_at(root: &mut Value, segments: &[Segment]) -> Option<Value> {
    let (leaf, parent) = segments.split_last()?;
    let container = get_at_mut(root, parent)?;
    match (container, leaf) {
        (Value::Object(map), leaf) => map.shift_remove(&leaf.to_string()),
        (Value::Array(items), Segment::Index(i)) if *i < items.len() => Some(items.remove(*i)),
        _ => None,
    }
}

fn get_at_mut<'a>(root: &'a mut Value, segments: &[Segment]) -> Option<&'a mut Value> {
    let mut cur = root;
    for seg in segments {
        cur = match (cur, seg) {
            (Value::Object(map), seg) => map.get_mut(&seg.to_string())?,
            (Value::Array(items), Segment::Index(i)) => items.get_mut(*i)?,
            _ => return None,
        };
    }
    Some(cur)
}
