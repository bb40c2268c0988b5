// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Rule records and the wildcard-aware rule table.
//!
//! Keys are normalized path patterns. A pattern segment may be `*` (any key
//! or index) or `[*]` (any array index). Lookup for a concrete path tries,
//! in order:
//!
//! 1. the exact path;
//! 2. every pattern with `k` segments replaced by `*`, for `k = 1..=N`;
//!    among patterns with the same `k`, wildcards in later segments win
//!    (longest concrete prefix first);
//! 3. each all-digit segment replaced by `[*]`, right to left.
//!
//! The first hit wins.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::path::{INDEX_WILDCARD, KEY_WILDCARD};

/// Segment count above which `*` substitution is skipped (2^N candidates).
const MAX_WILDCARD_SEGMENTS: usize = 16;

/// Shape a node is locked to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeLock {
    /// JSON object.
    Object,
    /// JSON array.
    Array,
    /// String scalar.
    String,
    /// Numeric scalar.
    Number,
    /// Boolean scalar.
    Boolean,
    /// Explicit null.
    Null,
}

impl TypeLock {
    /// Name matching [`crate::value::type_name`].
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Object => "object",
            Self::Array => "array",
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Null => "null",
        }
    }
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_false(b: &bool) -> bool {
    !*b
}

/// Constraints attached to one path pattern.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleRecord {
    /// Required runtime shape for `set`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_lock: Option<TypeLock>,
    /// Closed schema: the only keys the object may gain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_keys: Option<Vec<String>>,
    /// Open schema: any key may be added.
    #[serde(default, skip_serializing_if = "is_false")]
    pub object_ext: bool,
    /// The array may grow through `push`.
    #[serde(default, skip_serializing_if = "is_false")]
    pub array_grow: bool,
    /// The schema declared a `*` template key.
    #[serde(default, skip_serializing_if = "is_false")]
    pub has_wildcard: bool,
    /// Read-only against `set`/`inc`.
    #[serde(default, skip_serializing_if = "is_false")]
    pub ro: bool,
    /// Lower numeric bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    /// Upper numeric bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    /// Largest magnitude a single `inc` may move the value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<f64>,
    /// Allowed values (compared as strings).
    #[serde(default, rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
}

impl RuleRecord {
    /// Overlays every field `other` sets onto `self`.
    pub fn merge(&mut self, other: &Self) {
        if other.type_lock.is_some() {
            self.type_lock = other.type_lock;
        }
        if other.allowed_keys.is_some() {
            self.allowed_keys.clone_from(&other.allowed_keys);
        }
        self.object_ext |= other.object_ext;
        self.array_grow |= other.array_grow;
        self.has_wildcard |= other.has_wildcard;
        self.ro |= other.ro;
        if other.min.is_some() {
            self.min = other.min;
        }
        if other.max.is_some() {
            self.max = other.max;
        }
        if let Some(step) = other.step.filter(|s| s.is_finite()) {
            self.step = Some(step.abs());
        }
        if other.enum_values.is_some() {
            self.enum_values.clone_from(&other.enum_values);
        }
    }

    /// True when the record constrains nothing.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// A rule declared at a path by `$schema` or a directive line.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RuleEntry {
    /// Normalized path pattern.
    pub path: String,
    /// Declared constraints.
    pub rule: RuleRecord,
}

/// Pattern → rule mapping owned by one engine.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleTable {
    rules: BTreeMap<String, RuleRecord>,
}

impl RuleTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges `rule` onto whatever is already registered at `pattern`.
    pub fn set_rule(&mut self, pattern: &str, rule: &RuleRecord) {
        self.rules
            .entry(pattern.to_string())
            .or_default()
            .merge(rule);
    }

    /// Removes the rule at `pattern`; returns whether one existed.
    pub fn clear_rule(&mut self, pattern: &str) -> bool {
        self.rules.remove(pattern).is_some()
    }

    /// Removes every rule.
    pub fn clear_all(&mut self) {
        self.rules.clear();
    }

    /// Registers a batch of entries in order.
    pub fn register(&mut self, entries: &[RuleEntry]) {
        for entry in entries {
            self.set_rule(&entry.path, &entry.rule);
        }
    }

    /// Rule registered at exactly `pattern`.
    pub fn get(&self, pattern: &str) -> Option<&RuleRecord> {
        self.rules.get(pattern)
    }

    /// Number of registered patterns.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// True when no rules are registered.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Iterates patterns in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &RuleRecord)> {
        self.rules.iter()
    }

    /// Resolves the rule governing a concrete normalized path.
    pub fn lookup(&self, path: &str) -> Option<&RuleRecord> {
        if self.rules.is_empty() || path.is_empty() {
            return None;
        }
        if let Some(rule) = self.rules.get(path) {
            return Some(rule);
        }
        let segments: Vec<&str> = path.split('.').collect();
        let n = segments.len();

        if n <= MAX_WILDCARD_SEGMENTS {
            for k in 1..=n {
                for positions in wildcard_positions(n, k) {
                    let candidate = substitute(&segments, &positions, KEY_WILDCARD);
                    if let Some(rule) = self.rules.get(&candidate) {
                        return Some(rule);
                    }
                }
            }
        }

        for i in (0..n).rev() {
            let seg = segments[i];
            if !seg.is_empty() && seg.bytes().all(|b| b.is_ascii_digit()) {
                let candidate = substitute(&segments, &[i], INDEX_WILDCARD);
                if let Some(rule) = self.rules.get(&candidate) {
                    return Some(rule);
                }
            }
        }
        None
    }
}

fn substitute(segments: &[&str], positions: &[usize], with: &str) -> String {
    segments
        .iter()
        .enumerate()
        .map(|(i, s)| if positions.contains(&i) { with } else { *s })
        .collect::<Vec<_>>()
        .join(".")
}

/// All `k`-subsets of `0..n`, ordered so that subsets with wildcards further
/// right come first (descending-sorted position vectors, compared
/// lexicographically, largest first).
fn wildcard_positions(n: usize, k: usize) -> Vec<Vec<usize>> {
    fn walk(start: usize, n: usize, k: usize, cur: &mut Vec<usize>, out: &mut Vec<Vec<usize>>) {
        if cur.len() == k {
            let mut desc = cur.clone();
            desc.reverse();
            out.push(desc);
            return;
        }
        for i in start..n {
            cur.push(i);
            walk(i + 1, n, k, cur, out);
            cur.pop();
        }
    }
    let mut out = Vec::new();
    walk(0, n, k, &mut Vec::with_capacity(k), &mut out);
    out.sort_by(|a, b| b.cmp(a));
    out
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]
    use super::*;

    fn rule_min(min: f64) -> RuleRecord {
        RuleRecord {
            min: Some(min),
            ..RuleRecord::default()
        }
    }

    #[test]
    fn exact_match_wins_over_wildcards() {
        let mut table = RuleTable::new();
        table.set_rule("a.b", &rule_min(1.0));
        table.set_rule("a.*", &rule_min(2.0));
        assert_eq!(table.lookup("a.b").unwrap().min, Some(1.0));
        assert_eq!(table.lookup("a.c").unwrap().min, Some(2.0));
    }

    #[test]
    fn merge_stores_step_as_a_finite_magnitude() {
        let mut table = RuleTable::new();
        let step = |s: f64| RuleRecord {
            step: Some(s),
            ..RuleRecord::default()
        };
        table.set_rule("hp", &step(-3.0));
        assert_eq!(table.get("hp").unwrap().step, Some(3.0));
        table.set_rule("hp", &step(f64::INFINITY));
        assert_eq!(table.get("hp").unwrap().step, Some(3.0));
    }

    #[test]
    fn fewer_wildcards_are_preferred() {
        let mut table = RuleTable::new();
        table.set_rule("*.*.c", &rule_min(2.0));
        table.set_rule("a.*.c", &rule_min(1.0));
        assert_eq!(table.lookup("a.b.c").unwrap().min, Some(1.0));
    }

    #[test]
    fn rightmost_wildcard_breaks_ties() {
        let mut table = RuleTable::new();
        table.set_rule("*.b.c", &rule_min(1.0));
        table.set_rule("a.b.*", &rule_min(2.0));
        assert_eq!(table.lookup("a.b.c").unwrap().min, Some(2.0));
    }

    #[test]
    fn index_wildcard_matches_numeric_segments_only() {
        let mut table = RuleTable::new();
        table.set_rule("inv.[*].name", &rule_min(3.0));
        assert_eq!(table.lookup("inv.4.name").unwrap().min, Some(3.0));
        assert!(table.lookup("inv.x.name").is_none());
    }

    #[test]
    fn set_rule_merges_directives() {
        let mut table = RuleTable::new();
        table.set_rule("hp", &rule_min(0.0));
        table.set_rule(
            "hp",
            &RuleRecord {
                ro: true,
                ..RuleRecord::default()
            },
        );
        let rule = table.get("hp").unwrap();
        assert!(rule.ro);
        assert_eq!(rule.min, Some(0.0));
    }

    #[test]
    fn clear_rule_and_clear_all() {
        let mut table = RuleTable::new();
        table.set_rule("a", &rule_min(0.0));
        table.set_rule("b", &rule_min(0.0));
        assert!(table.clear_rule("a"));
        assert!(!table.clear_rule("a"));
        table.clear_all();
        assert!(table.is_empty());
    }

    #[test]
    fn serializes_with_camel_case_and_enum_key() {
        let mut table = RuleTable::new();
        table.set_rule(
            "mood",
            &RuleRecord {
                type_lock: Some(TypeLock::String),
                enum_values: Some(vec!["calm".into()]),
                array_grow: false,
                ..RuleRecord::default()
            },
        );
        let json = serde_json::to_string(&table).unwrap();
        assert_eq!(json, r#"{"mood":{"typeLock":"string","enum":["calm"]}}"#);
        let back: RuleTable = serde_json::from_str(&json).unwrap();
        assert_eq!(back, table);
    }

    #[test]
    fn wildcard_positions_order() {
        assert_eq!(wildcard_positions(3, 1), vec![vec![2], vec![1], vec![0]]);
        assert_eq!(
            wildcard_positions(3, 2),
            vec![vec![2, 1], vec![2, 0], vec![1, 0]]
        );
    }
}
