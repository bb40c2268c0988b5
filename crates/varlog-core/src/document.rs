// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Structural documents: the indentation-based map/sequence/scalar notation
//! used by `$schema` bodies and multi-line values, plus its inline "flow"
//! form (`{hp: 0, tags: [a, "b"]}`), which also accepts plain JSON.
//!
//! Only the subset the DSL needs is supported: block mappings, block
//! sequences, flow collections, quoted and plain scalars, and `|` / `>`
//! block strings. Comments start at a `#` preceded by whitespace.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::value::{is_decimal, parse_number};

/// Failure to parse a structural document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentError {
    /// A block-structure problem on a given (1-based) line.
    #[error("line {line}: {message}")]
    Syntax {
        /// Line within the captured block.
        line: usize,
        /// What went wrong.
        message: String,
    },
    /// A flow collection or quoted string never closed.
    #[error("unterminated {what}")]
    Unterminated {
        /// Kind of construct left open.
        what: &'static str,
    },
    /// Unexpected character inside a flow value.
    #[error("unexpected `{found}` at offset {offset}")]
    Unexpected {
        /// Character found.
        found: char,
        /// Character offset in the flow text.
        offset: usize,
    },
    /// Flow value ended where more input was required.
    #[error("unexpected end of input")]
    UnexpectedEnd,
    /// Characters left over after a complete flow value.
    #[error("trailing characters at offset {offset}")]
    Trailing {
        /// Character offset of the first leftover character.
        offset: usize,
    },
}

/// Parses an indented block document.
pub fn parse_document(text: &str) -> Result<Value, DocumentError> {
    let lines: Vec<Line> = text
        .lines()
        .enumerate()
        .filter_map(|(i, raw)| Line::new(i + 1, raw))
        .collect();
    if lines.is_empty() {
        return Ok(Value::Null);
    }
    let mut parser = BlockParser { lines, pos: 0 };
    let first_indent = parser.lines[0].indent;
    let value = parser.node(first_indent)?;
    if let Some(line) = parser.lines.get(parser.pos) {
        return Err(DocumentError::Syntax {
            line: line.number,
            message: "unexpected dedent or trailing content".into(),
        });
    }
    Ok(value)
}

/// Parses a flow value (`{...}`, `[...]`, quoted or plain scalar).
pub fn parse_flow(text: &str) -> Result<Value, DocumentError> {
    let mut flow = FlowParser {
        chars: text.chars().collect(),
        pos: 0,
    };
    flow.skip_ws();
    let value = flow.value()?;
    flow.skip_ws();
    if flow.pos < flow.chars.len() {
        return Err(DocumentError::Trailing { offset: flow.pos });
    }
    Ok(value)
}

/// Resolves an unquoted scalar: `null`/`~`/empty, booleans, numbers, or a
/// string. Quoted input is unquoted and unescaped.
pub fn parse_plain_scalar(text: &str) -> Value {
    let s = text.trim();
    match s {
        "" | "~" | "null" | "Null" | "NULL" => return Value::Null,
        "true" | "True" | "TRUE" => return Value::Bool(true),
        "false" | "False" | "FALSE" => return Value::Bool(false),
        _ => {}
    }
    if let Some(body) = strip_quotes(s) {
        return Value::String(unescape(body));
    }
    if is_decimal(s) {
        if let Some(n) = parse_number(s) {
            return n;
        }
    }
    if looks_like_float(s) {
        if let Ok(f) = s.parse::<f64>() {
            return crate::value::number_value(f);
        }
    }
    Value::String(s.to_string())
}

fn looks_like_float(s: &str) -> bool {
    s.bytes().any(|b| b.is_ascii_digit())
        && s
            .bytes()
            .all(|b| b.is_ascii_digit() || matches!(b, b'+' | b'-' | b'.' | b'e' | b'E'))
}

/// Body of a `"..."` or `'...'` literal, if `s` is exactly one.
pub fn strip_quotes(s: &str) -> Option<&str> {
    let first = s.chars().next()?;
    if (first == '"' || first == '\'') && s.len() >= 2 && s.ends_with(first) {
        let body = &s[1..s.len() - 1];
        if quoted_body_is_closed(body, first) {
            return Some(body);
        }
    }
    None
}

fn quoted_body_is_closed(body: &str, quote: char) -> bool {
    let mut escaped = false;
    for c in body.chars() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == quote {
            return false;
        }
    }
    !escaped
}

/// Decodes backslash escapes (`\n`, `\t`, `\r`, `\"`, `\'`, `\\`, `\uXXXX`).
/// Unknown escapes keep the escaped character.
pub fn unescape(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('b') => out.push('\u{8}'),
            Some('f') => out.push('\u{c}'),
            Some('0') => out.push('\0'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(decoded) => out.push(decoded),
                    None => {
                        out.push_str("\\u");
                        out.push_str(&hex);
                    }
                }
            }
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Cuts a trailing `# comment` (a `#` at the start or after whitespace,
/// outside quotes) and trailing whitespace.
pub fn strip_inline_comment(s: &str) -> &str {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut prev_ws = true;
    for (i, c) in s.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' && q == '"' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
        } else if c == '"' || c == '\'' {
            quote = Some(c);
        } else if c == '#' && prev_ws {
            return s[..i].trim_end();
        }
        prev_ws = c.is_whitespace();
    }
    s.trim_end()
}

/// Byte offset of the first `:` outside quotes and brackets.
///
/// With `require_space`, the colon must be followed by whitespace or end the
/// string (block mappings); without it any colon counts (DSL data lines).
pub fn find_top_level_colon(s: &str, require_space: bool) -> Option<usize> {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut depth = 0usize;
    let mut iter = s.char_indices().peekable();
    while let Some((i, c)) = iter.next() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '[' | '{' | '(' => depth += 1,
            ']' | '}' | ')' => depth = depth.saturating_sub(1),
            ':' if depth == 0 => {
                let next_ok = iter.peek().map_or(true, |(_, n)| n.is_whitespace());
                if !require_space || next_ok {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Bracket depth after scanning `s` (quotes respected); zero means balanced.
fn open_depth(s: &str) -> i64 {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut depth = 0i64;
    for c in s.chars() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '[' | '{' => depth += 1,
            ']' | '}' => depth -= 1,
            _ => {}
        }
    }
    depth
}

#[derive(Debug, Clone)]
struct Line {
    number: usize,
    indent: usize,
    text: String,
    raw: String,
}

impl Line {
    fn new(number: usize, raw: &str) -> Option<Self> {
        let indent = raw.len() - raw.trim_start().len();
        let body = raw.trim_start();
        let text = strip_inline_comment(body);
        if text.is_empty() {
            return None;
        }
        Some(Self {
            number,
            indent,
            text: text.to_string(),
            raw: body.trim_end().to_string(),
        })
    }

    fn is_sequence_item(&self) -> bool {
        self.text == "-" || self.text.starts_with("- ")
    }

    fn is_mapping_entry(&self) -> bool {
        let t = self.text.as_str();
        !t.starts_with('{')
            && !t.starts_with('[')
            && strip_quotes(t).is_none()
            && find_top_level_colon(t, true).is_some()
    }
}

struct BlockParser {
    lines: Vec<Line>,
    pos: usize,
}

impl BlockParser {
    fn node(&mut self, indent: usize) -> Result<Value, DocumentError> {
        let Some(line) = self.lines.get(self.pos) else {
            return Ok(Value::Null);
        };
        if line.is_sequence_item() {
            self.sequence(indent)
        } else if line.is_mapping_entry() {
            self.mapping(indent)
        } else {
            let text = line.text.clone();
            self.pos += 1;
            self.inline(&text, indent)
        }
    }

    fn mapping(&mut self, indent: usize) -> Result<Value, DocumentError> {
        let mut map = Map::new();
        while let Some(line) = self.lines.get(self.pos) {
            if line.indent < indent {
                break;
            }
            if line.indent > indent || !line.is_mapping_entry() {
                return Err(DocumentError::Syntax {
                    line: line.number,
                    message: "expected `key: value` at mapping indentation".into(),
                });
            }
            let text = line.text.clone();
            let colon = find_top_level_colon(&text, true).unwrap_or(text.len());
            let raw_key = text[..colon].trim();
            let key = strip_quotes(raw_key).map_or_else(|| raw_key.to_string(), unescape);
            let rest = text.get(colon + 1..).unwrap_or_default().trim().to_string();
            self.pos += 1;
            let value = if rest.is_empty() {
                self.nested_or_null(indent, true)?
            } else {
                self.inline(&rest, indent)?
            };
            map.insert(key, value);
        }
        Ok(Value::Object(map))
    }

    fn sequence(&mut self, indent: usize) -> Result<Value, DocumentError> {
        let mut items = Vec::new();
        while let Some(line) = self.lines.get(self.pos) {
            if line.indent < indent || (line.indent == indent && !line.is_sequence_item()) {
                break;
            }
            if line.indent > indent {
                return Err(DocumentError::Syntax {
                    line: line.number,
                    message: "unexpected indentation inside sequence".into(),
                });
            }
            let rest = line.text[1..].trim_start().to_string();
            if rest.is_empty() {
                self.pos += 1;
                items.push(self.nested_or_null(indent, false)?);
                continue;
            }
            let content_indent = indent + (line.text.len() - rest.len());
            let inner = Line {
                number: line.number,
                indent: content_indent,
                raw: rest.clone(),
                text: rest,
            };
            if inner.is_mapping_entry() || inner.is_sequence_item() {
                self.lines[self.pos] = inner;
                items.push(self.node(content_indent)?);
            } else {
                self.pos += 1;
                items.push(self.inline(&inner.text, indent)?);
            }
        }
        Ok(Value::Array(items))
    }

    /// Value for `key:` / `-` with nothing after it: a more-indented child
    /// block, a same-indent sequence under a mapping key, or `null`.
    fn nested_or_null(&mut self, indent: usize, allow_same_seq: bool) -> Result<Value, DocumentError> {
        match self.lines.get(self.pos) {
            Some(next) if next.indent > indent => {
                let child = next.indent;
                self.node(child)
            }
            Some(next) if allow_same_seq && next.indent == indent && next.is_sequence_item() => {
                self.sequence(indent)
            }
            _ => Ok(Value::Null),
        }
    }

    fn inline(&mut self, text: &str, indent: usize) -> Result<Value, DocumentError> {
        if text == "|" || text == ">" || text.starts_with("|-") || text.starts_with(">-") {
            return Ok(self.block_string(text, indent));
        }
        if text.starts_with('{') || text.starts_with('[') {
            let mut buf = text.to_string();
            while open_depth(&buf) > 0 {
                match self.lines.get(self.pos) {
                    Some(next) if next.indent > indent => {
                        buf.push(' ');
                        buf.push_str(&next.text);
                        self.pos += 1;
                    }
                    _ => break,
                }
            }
            return parse_flow(&buf);
        }
        Ok(parse_plain_scalar(text))
    }

    fn block_string(&mut self, header: &str, indent: usize) -> Value {
        let mut parts = Vec::new();
        while let Some(next) = self.lines.get(self.pos) {
            if next.indent <= indent {
                break;
            }
            parts.push(next.raw.clone());
            self.pos += 1;
        }
        let sep = if header.starts_with('|') { "\n" } else { " " };
        Value::String(parts.join(sep))
    }
}

struct FlowParser {
    chars: Vec<char>,
    pos: usize,
}

impl FlowParser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn value(&mut self) -> Result<Value, DocumentError> {
        self.skip_ws();
        match self.peek() {
            None => Err(DocumentError::UnexpectedEnd),
            Some('{') => self.object(),
            Some('[') => self.array(),
            Some(q @ ('"' | '\'')) => self.quoted(q).map(Value::String),
            Some(_) => {
                let start = self.pos;
                let bare = self.bare(&[',', ']', '}']);
                if bare.trim().is_empty() {
                    let found = self.peek().unwrap_or(' ');
                    return Err(DocumentError::Unexpected {
                        found,
                        offset: start,
                    });
                }
                Ok(parse_plain_scalar(&bare))
            }
        }
    }

    fn bare(&mut self, stops: &[char]) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if stops.contains(&c) {
                break;
            }
            out.push(c);
            self.pos += 1;
        }
        out
    }

    fn quoted(&mut self, quote: char) -> Result<String, DocumentError> {
        self.pos += 1;
        let mut body = String::new();
        loop {
            let c = self.peek().ok_or(DocumentError::Unterminated { what: "string" })?;
            self.pos += 1;
            if c == '\\' {
                let next = self.peek().ok_or(DocumentError::Unterminated { what: "string" })?;
                body.push('\\');
                body.push(next);
                self.pos += 1;
            } else if c == quote {
                if quote == '\'' && self.peek() == Some('\'') {
                    body.push('\'');
                    self.pos += 1;
                    continue;
                }
                return Ok(unescape(&body));
            } else {
                body.push(c);
            }
        }
    }

    fn object(&mut self) -> Result<Value, DocumentError> {
        self.pos += 1;
        let mut map = Map::new();
        loop {
            self.skip_ws();
            match self.peek() {
                None => return Err(DocumentError::Unterminated { what: "object" }),
                Some('}') => {
                    self.pos += 1;
                    return Ok(Value::Object(map));
                }
                Some(_) => {}
            }
            let key = match self.peek() {
                Some(q @ ('"' | '\'')) => self.quoted(q)?,
                _ => {
                    let start = self.pos;
                    let raw = self.bare(&[':', ',', '}']);
                    let key = raw.trim().to_string();
                    if key.is_empty() {
                        return Err(DocumentError::Unexpected {
                            found: self.peek().unwrap_or(' '),
                            offset: start,
                        });
                    }
                    key
                }
            };
            self.skip_ws();
            let value = if self.peek() == Some(':') {
                self.pos += 1;
                self.skip_ws();
                if matches!(self.peek(), Some(',' | '}')) {
                    Value::Null
                } else {
                    self.value()?
                }
            } else {
                Value::Null
            };
            map.insert(key, value);
            self.skip_ws();
            match self.peek() {
                Some(',') => self.pos += 1,
                Some('}') => {}
                Some(found) => {
                    return Err(DocumentError::Unexpected {
                        found,
                        offset: self.pos,
                    })
                }
                None => return Err(DocumentError::Unterminated { what: "object" }),
            }
        }
    }

    fn array(&mut self) -> Result<Value, DocumentError> {
        self.pos += 1;
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            match self.peek() {
                None => return Err(DocumentError::Unterminated { what: "array" }),
                Some(']') => {
                    self.pos += 1;
                    return Ok(Value::Array(items));
                }
                Some(_) => {}
            }
            items.push(self.value()?);
            self.skip_ws();
            match self.peek() {
                Some(',') => self.pos += 1,
                Some(']') => {}
                Some(found) => {
                    return Err(DocumentError::Unexpected {
                        found,
                        offset: self.pos,
                    })
                }
                None => return Err(DocumentError::Unterminated { what: "array" }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]
    use super::*;
    use serde_json::json;

    #[test]
    fn flow_accepts_bare_keys_and_json() {
        assert_eq!(parse_flow("{hp: 0, mp: 0}").unwrap(), json!({"hp": 0, "mp": 0}));
        assert_eq!(
            parse_flow(r#"{"a": [1, "two", true, null]}"#).unwrap(),
            json!({"a": [1, "two", true, null]})
        );
        assert_eq!(parse_flow("[a, 'b c', 2.5,]").unwrap(), json!(["a", "b c", 2.5]));
    }

    #[test]
    fn flow_reports_unterminated_and_trailing_input() {
        assert_eq!(
            parse_flow("[1, 2").unwrap_err(),
            DocumentError::Unterminated { what: "array" }
        );
        assert!(matches!(
            parse_flow("[1] x").unwrap_err(),
            DocumentError::Trailing { .. }
        ));
        assert!(parse_flow("[1,,2]").is_err());
    }

    #[test]
    fn block_mapping_with_nested_sequence() {
        let doc = "hero:\n  name: Aria\n  tags:\n    - brave\n    - \"quick # not comment\"\n  hp: 10 # comment\n";
        assert_eq!(
            parse_document(doc).unwrap(),
            json!({"hero": {"name": "Aria", "tags": ["brave", "quick # not comment"], "hp": 10}})
        );
    }

    #[test]
    fn sequence_of_mappings() {
        let doc = "- name: sword\n  dmg: 3\n- name: shield\n";
        assert_eq!(
            parse_document(doc).unwrap(),
            json!([{"name": "sword", "dmg": 3}, {"name": "shield"}])
        );
    }

    #[test]
    fn empty_values_and_wildcard_keys() {
        let doc = "bag: {}\nlist: []\n*:\n  level: 1\n";
        assert_eq!(
            parse_document(doc).unwrap(),
            json!({"bag": {}, "list": [], "*": {"level": 1}})
        );
    }

    #[test]
    fn multi_line_flow_value_is_joined() {
        let doc = "stats: {hp: 0,\n  mp: 0}\n";
        assert_eq!(parse_document(doc).unwrap(), json!({"stats": {"hp": 0, "mp": 0}}));
    }

    #[test]
    fn literal_block_string() {
        let doc = "note: |\n  line one\n  line two\n";
        assert_eq!(parse_document(doc).unwrap(), json!({"note": "line one\nline two"}));
    }

    #[test]
    fn bad_indentation_is_a_syntax_error() {
        let doc = "a: 1\n   b: 2\n";
        assert!(matches!(
            parse_document(doc).unwrap_err(),
            DocumentError::Syntax { line: 2, .. }
        ));
    }

    #[test]
    fn comments_respect_quotes() {
        assert_eq!(strip_inline_comment("5 # five"), "5");
        assert_eq!(strip_inline_comment("\"a # b\""), "\"a # b\"");
        assert_eq!(strip_inline_comment("a#b"), "a#b");
    }

    #[test]
    fn colon_search_skips_quotes_and_brackets() {
        assert_eq!(find_top_level_colon("a[\"x:y\"]: 1", false), Some(8));
        assert_eq!(find_top_level_colon("time 12:30", true), None);
        assert_eq!(find_top_level_colon("key: v", true), Some(3));
    }

    #[test]
    fn unescape_decodes_standard_escapes() {
        assert_eq!(unescape(r"a\nb\tA\\"), "a\nb\tA\\");
    }
}
