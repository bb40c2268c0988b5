// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Block DSL parser.
//!
//! A block body is read line by line:
//!
//! ```text
//! # comment
//! $schema hero               schema capture (body follows)
//!   name: ""
//!   stats: {hp: 0, mp: 0}
//! $range=[0,100] $step=5 hero.stats.hp   constraint line
//! hero.stats.hp: +10         data line (inline value)
//! hero.bag:                  data line (multi-line value follows)
//!   - rope
//! ```
//!
//! Inline values use a small grammar (first match wins): `null` deletes,
//! `(n)` sets a number, `+n`/`-n` increments, `+"s"`/`+[..]` push,
//! `-"s"`/`-[..]` pop, then numbers, quoted strings, booleans, flow
//! literals and finally raw text.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::document::{
    find_top_level_colon, parse_document, parse_flow, strip_inline_comment, strip_quotes, unescape,
};
use crate::path::normalize;
use crate::rule::{RuleEntry, RuleRecord, TypeLock};
use crate::value::{is_decimal, parse_number};

/// Mutation kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpKind {
    /// Store a value.
    Set,
    /// Add a signed delta to a number.
    Inc,
    /// Append items to an array.
    Push,
    /// Remove items (deep equality) from an array.
    Pop,
    /// Remove a key or array index.
    Del,
}

impl OpKind {
    /// Lowercase name as persisted.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Set => "set",
            Self::Inc => "inc",
            Self::Push => "push",
            Self::Pop => "pop",
            Self::Del => "del",
        }
    }
}

/// One parsed mutation instruction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Op {
    /// Normalized target path.
    pub path: String,
    /// What to do.
    pub kind: OpKind,
    /// Payload for `set`, `push` and `pop`. An array payload on `push`/`pop`
    /// lists the individual items.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Signed amount for `inc`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<f64>,
    /// Parse advisory; the op still runs with its best-effort value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl Op {
    fn new(path: &str, kind: OpKind, value: Option<Value>) -> Self {
        Self {
            path: path.to_string(),
            kind,
            value,
            delta: None,
            warning: None,
        }
    }

    fn inc(path: &str, delta: f64) -> Self {
        Self {
            delta: Some(delta),
            ..Self::new(path, OpKind::Inc, None)
        }
    }

    fn with_warning(mut self, warning: String) -> Self {
        self.warning = Some(warning);
        self
    }
}

/// Rules and ops declared by one block, in source order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParsedBlock {
    /// Schema and constraint rules.
    pub rules: Vec<RuleEntry>,
    /// Mutations.
    pub ops: Vec<Op>,
    /// Problems with rule declarations (unparseable or missing `$schema`
    /// bodies). Op-level warnings live on [`Op::warning`].
    pub warnings: Vec<String>,
}

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

/// Parses the inner text of one block.
pub fn parse_block(inner: &str) -> ParsedBlock {
    let lines: Vec<&str> = inner.lines().collect();
    let mut out = ParsedBlock::default();
    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            i += 1;
            continue;
        }
        let indent = indent_of(line);

        if let Some(rest) = schema_directive(trimmed) {
            i += 1;
            let (path, inline_body) = split_schema_header(rest);
            let body = if inline_body.is_empty() {
                let (captured, next) = capture_schema_body(&lines, i, indent);
                i = next;
                captured
            } else {
                inline_body.to_string()
            };
            parse_schema(&path, &body, &mut out);
            continue;
        }

        if trimmed.starts_with('$') {
            i += 1;
            if let Some(entry) = parse_constraint_line(trimmed) {
                out.rules.push(entry);
            } else {
                tracing::debug!(line = trimmed, "ignoring directive line without a path");
            }
            continue;
        }

        if indent == 0 {
            if let Some(colon) = find_top_level_colon(trimmed, false) {
                let path = normalize(trimmed[..colon].trim());
                let rhs = strip_inline_comment(trimmed.get(colon + 1..).unwrap_or_default()).trim();
                i += 1;
                if path.is_empty() {
                    continue;
                }
                if rhs.is_empty() {
                    let (captured, next) = capture_indented(&lines, i, 0);
                    i = next;
                    if let Some(op) = multi_line_op(&path, &captured) {
                        out.ops.push(op);
                    }
                } else {
                    out.ops.extend(parse_inline(&path, rhs));
                }
                continue;
            }
        }

        tracing::debug!(line = trimmed, "ignoring unrecognized line");
        i += 1;
    }
    out
}

fn schema_directive(trimmed: &str) -> Option<&str> {
    let rest = trimmed.strip_prefix("$schema")?;
    if rest.is_empty() || rest.starts_with(char::is_whitespace) {
        Some(rest.trim())
    } else {
        None
    }
}

/// `stats {hp: 0}` → (`stats`, `{hp: 0}`); `{hp: 0}` → (``, `{hp: 0}`).
fn split_schema_header(rest: &str) -> (String, &str) {
    if rest.starts_with('{') || rest.starts_with('[') {
        return (String::new(), rest);
    }
    match rest.find(char::is_whitespace) {
        Some(ws) => (normalize(&rest[..ws]), rest[ws..].trim()),
        None => (normalize(rest), ""),
    }
}

/// Collects lines after `start` indented deeper than `parent_indent`; the
/// first captured line fixes the base indentation and the capture ends at
/// the first non-blank line below it. Blank lines inside are kept.
fn capture_indented(lines: &[&str], start: usize, parent_indent: usize) -> (String, usize) {
    let mut base: Option<usize> = None;
    let mut captured: Vec<&str> = Vec::new();
    let mut i = start;
    while i < lines.len() {
        let line = lines[i];
        if line.trim().is_empty() {
            captured.push(line);
            i += 1;
            continue;
        }
        let indent = indent_of(line);
        let floor = base.unwrap_or(parent_indent + 1);
        if indent < floor {
            break;
        }
        base.get_or_insert(indent);
        captured.push(line);
        i += 1;
    }
    while captured.last().is_some_and(|l| l.trim().is_empty()) {
        captured.pop();
        i -= 1;
    }
    (captured.join("\n"), i)
}

/// Captures a `$schema` body. The first non-blank line fixes the base
/// indentation, which may equal the header's. A body flush with the header
/// ends at the next `$` line, or after one balanced flow literal when it
/// opens with `{`/`[`.
fn capture_schema_body(lines: &[&str], start: usize, header_indent: usize) -> (String, usize) {
    let Some(first) = (start..lines.len()).find(|&j| !lines[j].trim().is_empty()) else {
        return (String::new(), start);
    };
    let base = indent_of(lines[first]);
    if base > header_indent {
        return capture_indented(lines, start, header_indent);
    }
    if lines[first].trim_start().starts_with(['{', '[']) {
        let mut depth = 0_i32;
        let mut quote: Option<char> = None;
        for (j, line) in lines.iter().enumerate().skip(first) {
            depth += bracket_delta(line, &mut quote);
            if depth <= 0 {
                return (lines[first..=j].join("\n"), j + 1);
            }
        }
        return (lines[first..].join("\n"), lines.len());
    }
    let mut end = first;
    while end < lines.len() {
        let line = lines[end];
        if !line.trim().is_empty()
            && (indent_of(line) < base || line.trim_start().starts_with('$'))
        {
            break;
        }
        end += 1;
    }
    while end > first && lines[end - 1].trim().is_empty() {
        end -= 1;
    }
    (lines[first..end].join("\n"), end)
}

/// Net bracket depth change of `line`, skipping quoted text. `quote` carries
/// an open quote across lines.
fn bracket_delta(line: &str, quote: &mut Option<char>) -> i32 {
    let mut delta = 0;
    let mut escaped = false;
    for c in line.chars() {
        if let Some(q) = *quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                *quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => *quote = Some(c),
            '[' | '{' => delta += 1,
            ']' | '}' => delta -= 1,
            _ => {}
        }
    }
    delta
}

fn multi_line_op(path: &str, body: &str) -> Option<Op> {
    if body.trim().is_empty() {
        tracing::debug!(path, "data line has no value");
        return None;
    }
    Some(match parse_document(body) {
        Ok(value) => Op::new(path, OpKind::Set, Some(value)),
        Err(err) => Op::new(path, OpKind::Set, Some(Value::String(body.trim().to_string())))
            .with_warning(format!("{path}: could not parse multi-line value ({err}); stored as text")),
    })
}

fn parse_paren_number(s: &str) -> Option<Value> {
    let inner = s.strip_prefix('(')?.strip_suffix(')')?.trim();
    let unsigned = inner.strip_prefix('+').unwrap_or(inner);
    if is_decimal(unsigned) {
        parse_number(unsigned)
    } else {
        None
    }
}

fn parse_signed_delta(s: &str) -> Option<f64> {
    let (sign, body) = match s.as_bytes().first()? {
        b'+' => (1.0, &s[1..]),
        b'-' => (-1.0, &s[1..]),
        _ => return None,
    };
    if body.starts_with('-') || !is_decimal(body) {
        return None;
    }
    body.parse::<f64>().ok().map(|v| sign * v)
}

/// Applies the inline-value grammar to the right-hand side of a data line.
pub fn parse_inline(path: &str, raw: &str) -> Vec<Op> {
    let text = raw.trim();
    if text == "null" {
        return vec![Op::new(path, OpKind::Del, None)];
    }
    if let Some(n) = parse_paren_number(text) {
        return vec![Op::new(path, OpKind::Set, Some(n))];
    }
    if let Some(delta) = parse_signed_delta(text) {
        return vec![Op::inc(path, delta)];
    }
    for (prefix, kind) in [('+', OpKind::Push), ('-', OpKind::Pop)] {
        let Some(rest) = text.strip_prefix(prefix) else {
            continue;
        };
        let rest = rest.trim_start();
        if let Some(body) = strip_quotes(rest) {
            return vec![Op::new(path, kind, Some(Value::String(unescape(body))))];
        }
        if rest.starts_with('[') {
            return vec![match parse_flow(rest) {
                Ok(Value::Array(items)) => Op::new(path, kind, Some(Value::Array(items))),
                Ok(_) | Err(_) => Op::new(path, OpKind::Set, Some(Value::String(text.to_string())))
                    .with_warning(format!(
                        "{path}: malformed {} list `{text}`; stored as text",
                        kind.as_str()
                    )),
            }];
        }
    }
    if is_decimal(text) {
        if let Some(n) = parse_number(text) {
            return vec![Op::new(path, OpKind::Set, Some(n))];
        }
    }
    if let Some(body) = strip_quotes(text) {
        return vec![Op::new(path, OpKind::Set, Some(Value::String(unescape(body))))];
    }
    match text {
        "true" => return vec![Op::new(path, OpKind::Set, Some(Value::Bool(true)))],
        "false" => return vec![Op::new(path, OpKind::Set, Some(Value::Bool(false)))],
        _ => {}
    }
    if text.starts_with('{') || text.starts_with('[') {
        return vec![match parse_flow(text) {
            Ok(value) => Op::new(path, OpKind::Set, Some(value)),
            Err(err) => Op::new(path, OpKind::Set, Some(Value::String(text.to_string())))
                .with_warning(format!("{path}: malformed literal ({err}); stored as text")),
        }];
    }
    vec![Op::new(path, OpKind::Set, Some(Value::String(text.to_string())))]
}

/// Splits `$a $b=[1, 2] path` into directive tokens and the trailing path,
/// keeping bracketed directive arguments whole.
fn split_directive_tokens(line: &str) -> (Vec<String>, String) {
    let mut tokens = Vec::new();
    let mut rest = line.trim_start();
    while rest.starts_with('$') {
        let mut depth = 0i32;
        let mut end = rest.len();
        for (i, c) in rest.char_indices() {
            match c {
                '[' | '{' => depth += 1,
                ']' | '}' => depth -= 1,
                c if c.is_whitespace() && depth <= 0 => {
                    end = i;
                    break;
                }
                _ => {}
            }
        }
        tokens.push(rest[..end].to_string());
        rest = rest[end..].trim_start();
    }
    (tokens, rest.trim().to_string())
}

fn parse_bound(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() {
        None
    } else {
        s.parse::<f64>().ok().filter(|v| v.is_finite())
    }
}

/// Parses a constraint line into one merged rule, or `None` without a path.
pub fn parse_constraint_line(line: &str) -> Option<RuleEntry> {
    let (tokens, path) = split_directive_tokens(line);
    let path = normalize(&path);
    if path.is_empty() {
        return None;
    }
    let mut rule = RuleRecord::default();
    for token in &tokens {
        let (name, arg) = token.split_once('=').map_or((token.as_str(), ""), |(n, a)| (n, a));
        match name.trim() {
            "$ro" => rule.ro = true,
            "$range" => {
                let inner = arg.trim().trim_start_matches('[').trim_end_matches(']');
                let mut parts = inner.splitn(2, [',', '，']);
                let a = parts.next().and_then(parse_bound);
                let b = parts.next().and_then(parse_bound);
                match (a, b) {
                    (Some(a), Some(b)) => {
                        rule.min = Some(a.min(b));
                        rule.max = Some(a.max(b));
                    }
                    (a, b) => {
                        rule.min = a;
                        rule.max = b;
                    }
                }
            }
            "$step" => {
                if let Some(step) = parse_bound(arg) {
                    rule.step = Some(step.abs());
                }
            }
            "$enum" => {
                let inner = arg.trim().trim_start_matches('{').trim_end_matches('}');
                let values: Vec<String> = inner
                    .split([',', '，', ';', '；'])
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(|v| strip_quotes(v).map_or_else(|| v.to_string(), unescape))
                    .collect();
                if !values.is_empty() {
                    rule.enum_values = Some(values);
                }
            }
            other => tracing::debug!(directive = other, "unknown directive"),
        }
    }
    Some(RuleEntry { path, rule })
}

fn child_path(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{parent}.{key}")
    }
}

fn parse_schema(path: &str, body: &str, out: &mut ParsedBlock) {
    let label = if path.is_empty() { "<root>" } else { path };
    if body.trim().is_empty() {
        out.warnings
            .push(format!("{label}: $schema has no body; no rules declared"));
        return;
    }
    let parsed = if body.trim_start().starts_with('{') || body.trim_start().starts_with('[') {
        parse_flow(body.trim()).or_else(|_| parse_document(body))
    } else {
        parse_document(body)
    };
    match parsed {
        Ok(template) => synthesize_rules(path, &template, &mut out.rules),
        Err(err) => out
            .warnings
            .push(format!("{label}: could not parse $schema body ({err}); no rules declared")),
    }
}

/// Walks a schema template and emits rules for every node.
pub fn synthesize_rules(path: &str, template: &Value, rules: &mut Vec<RuleEntry>) {
    let mut push = |path: &str, rule: RuleRecord| {
        if !path.is_empty() {
            rules.push(RuleEntry {
                path: path.to_string(),
                rule,
            });
        }
    };
    match template {
        Value::Object(map) if map.is_empty() => push(
            path,
            RuleRecord {
                type_lock: Some(TypeLock::Object),
                object_ext: true,
                ..RuleRecord::default()
            },
        ),
        Value::Object(map) if map.contains_key("*") => {
            push(
                path,
                RuleRecord {
                    type_lock: Some(TypeLock::Object),
                    object_ext: true,
                    has_wildcard: true,
                    ..RuleRecord::default()
                },
            );
            recurse_object(path, map, rules);
        }
        Value::Object(map) => {
            push(
                path,
                RuleRecord {
                    type_lock: Some(TypeLock::Object),
                    allowed_keys: Some(map.keys().cloned().collect()),
                    ..RuleRecord::default()
                },
            );
            recurse_object(path, map, rules);
        }
        Value::Array(items) => {
            push(
                path,
                RuleRecord {
                    type_lock: Some(TypeLock::Array),
                    array_grow: true,
                    ..RuleRecord::default()
                },
            );
            if let Some(first) = items.first() {
                synthesize_rules(&child_path(path, "[*]"), first, rules);
            }
        }
        Value::String(_) => push(path, locked(TypeLock::String)),
        Value::Number(_) => push(path, locked(TypeLock::Number)),
        Value::Bool(_) => push(path, locked(TypeLock::Boolean)),
        Value::Null => {}
    }
}

fn recurse_object(path: &str, map: &Map<String, Value>, rules: &mut Vec<RuleEntry>) {
    for (key, value) in map {
        synthesize_rules(&child_path(path, key), value, rules);
    }
}

fn locked(lock: TypeLock) -> RuleRecord {
    RuleRecord {
        type_lock: Some(lock),
        ..RuleRecord::default()
    }
}
