// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Path language: dotted and bracketed addressing into the variable store.
//!
//! `hero.stats.hp`, `inv[0].name`, `inv.0.name` and `map["key.with.dots"]` are
//! all valid paths. Parsing is total: every input produces some (possibly
//! empty) segment list. The normalized form joins segments with `.` and is the
//! canonical key for rule lookups and WAL storage.

use std::fmt;

/// Literal segment used by rule patterns for "any array index here".
pub const INDEX_WILDCARD: &str = "[*]";

/// Literal segment used by rule patterns for "any key here".
pub const KEY_WILDCARD: &str = "*";

/// One addressing step.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Segment {
    /// Object key.
    Key(String),
    /// Array index (any all-digit segment).
    Index(usize),
}

impl Segment {
    /// Returns the index when this segment addresses an array element.
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Self::Index(i) => Some(*i),
            Self::Key(_) => None,
        }
    }

    fn from_raw(raw: &str) -> Self {
        if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(i) = raw.parse::<usize>() {
                return Self::Index(i);
            }
        }
        Self::Key(raw.to_string())
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(k) => f.write_str(k),
            Self::Index(i) => write!(f, "{i}"),
        }
    }
}

/// Splits a path string into segments.
///
/// Empty segments (`a..b`, leading dots) are dropped. A bare `*` inside
/// brackets becomes the [`INDEX_WILDCARD`] literal so patterns such as
/// `items[*].name` survive normalization.
pub fn split(path: &str) -> Vec<Segment> {
    let mut out = Vec::new();
    let mut buf = String::new();
    let mut chars = path.chars().peekable();

    let flush = |buf: &mut String, out: &mut Vec<Segment>| {
        let trimmed = buf.trim();
        if !trimmed.is_empty() {
            out.push(Segment::from_raw(trimmed));
        }
        buf.clear();
    };

    while let Some(c) = chars.next() {
        match c {
            '.' => flush(&mut buf, &mut out),
            '[' => {
                flush(&mut buf, &mut out);
                while chars.peek().is_some_and(|c| c.is_whitespace()) {
                    chars.next();
                }
                let quote = match chars.peek().copied() {
                    Some(q @ ('"' | '\'')) => {
                        chars.next();
                        Some(q)
                    }
                    _ => None,
                };
                let mut key = String::new();
                if let Some(q) = quote {
                    while let Some(c) = chars.next() {
                        if c == '\\' {
                            if let Some(next) = chars.next() {
                                key.push(next);
                            }
                            continue;
                        }
                        if c == q {
                            break;
                        }
                        key.push(c);
                    }
                    // Anything between the closing quote and `]` is discarded.
                    for c in chars.by_ref() {
                        if c == ']' {
                            break;
                        }
                    }
                    if !key.is_empty() {
                        out.push(Segment::from_raw(&key));
                    }
                } else {
                    for c in chars.by_ref() {
                        if c == ']' {
                            break;
                        }
                        key.push(c);
                    }
                    let key = key.trim();
                    if key == KEY_WILDCARD {
                        out.push(Segment::Key(INDEX_WILDCARD.to_string()));
                    } else if !key.is_empty() {
                        out.push(Segment::from_raw(key));
                    }
                }
            }
            _ => buf.push(c),
        }
    }
    flush(&mut buf, &mut out);
    out
}

/// Joins segments into the canonical dotted form.
pub fn join(segments: &[Segment]) -> String {
    let mut out = String::new();
    for (i, seg) in segments.iter().enumerate() {
        if i > 0 {
            out.push('.');
        }
        out.push_str(&seg.to_string());
    }
    out
}

/// Canonical form of a path: `a[0].b` and `a.0.b` both become `a.0.b`.
pub fn normalize(path: &str) -> String {
    join(&split(path))
}

/// Normalized parent path and final segment, or `None` for an empty path.
pub fn parent_and_leaf(segments: &[Segment]) -> Option<(String, &Segment)> {
    let (leaf, parent) = segments.split_last()?;
    Some((join(parent), leaf))
}
