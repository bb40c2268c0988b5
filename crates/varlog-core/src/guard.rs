// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Rule guard: decides whether an op may run and with what value.
//!
//! Checks run in a fixed order and the first rejection wins:
//!
//! 1. closed schema (parent `allowedKeys`)
//! 2. implicit object lock on the parent
//! 3. type lock (`set`)
//! 4. array growth (`push`)
//! 5. read-only (`set`, `inc`)
//! 6. range clamp (`set`, corrective)
//! 7. enum membership (`set`)
//! 8. step and range clamps (`inc`, corrective)
//!
//! Corrections never reject; they rewrite the value and leave a note.

use serde_json::Value;

use crate::dsl::OpKind;
use crate::path::{parent_and_leaf, split};
use crate::rule::{RuleRecord, RuleTable, TypeLock};
use crate::value::{as_f64, display, enum_key, number_value, type_name};

/// Outcome of [`validate`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GuardVerdict {
    /// Whether the op may run.
    pub allow: bool,
    /// Replacement payload (for `inc`, the final next value).
    pub value: Option<Value>,
    /// Rejection reason.
    pub reason: Option<String>,
    /// Corrections applied on the way through.
    pub notes: Vec<String>,
}

impl GuardVerdict {
    fn allow(value: Option<Value>, notes: Vec<String>) -> Self {
        Self {
            allow: true,
            value,
            reason: None,
            notes,
        }
    }

    fn reject(reason: impl Into<String>) -> Self {
        Self {
            allow: false,
            value: None,
            reason: Some(reason.into()),
            notes: Vec::new(),
        }
    }
}

/// Validates one op against `table`.
///
/// `path` must be normalized. `current` is the value presently stored at the
/// path (`None` when absent); it decides whether the op would create a key.
pub fn validate(
    table: &RuleTable,
    kind: OpKind,
    path: &str,
    payload: Option<&Value>,
    current: Option<&Value>,
) -> GuardVerdict {
    let creates_key = current.is_none();
    let segments = split(path);

    if let Some((parent, leaf)) = parent_and_leaf(&segments) {
        let parent_rule = if parent.is_empty() {
            None
        } else {
            table.lookup(&parent)
        };
        if let Some(parent_rule) = parent_rule {
            let leaf = leaf.to_string();
            if let Some(allowed) = &parent_rule.allowed_keys {
                let listed = allowed.iter().any(|k| *k == leaf);
                let adds = matches!(kind, OpKind::Set | OpKind::Push | OpKind::Inc);
                if adds && creates_key && !listed {
                    return GuardVerdict::reject(format!(
                        "{path}: field not in schema (allowed: {})",
                        allowed.join(", ")
                    ));
                }
                if kind == OpKind::Del && listed {
                    return GuardVerdict::reject(format!(
                        "{path}: template field cannot be deleted"
                    ));
                }
            }
            let implicitly_locked = parent_rule.type_lock == Some(TypeLock::Object)
                && !parent_rule.object_ext
                && parent_rule.allowed_keys.is_none()
                && !parent_rule.has_wildcard;
            if implicitly_locked && creates_key && kind != OpKind::Del {
                return GuardVerdict::reject(format!("{path}: parent structure is locked"));
            }
        }
    }

    let unconstrained = RuleRecord::default();
    let rule = table.lookup(path).unwrap_or(&unconstrained);

    match kind {
        OpKind::Set => validate_set(rule, path, payload),
        OpKind::Inc => validate_inc(rule, path, payload, current),
        OpKind::Push if rule.type_lock == Some(TypeLock::Array) && !rule.array_grow => {
            GuardVerdict::reject(format!("{path}: array cannot grow"))
        }
        OpKind::Push | OpKind::Pop | OpKind::Del => {
            GuardVerdict::allow(payload.cloned(), Vec::new())
        }
    }
}

fn validate_set(rule: &RuleRecord, path: &str, payload: Option<&Value>) -> GuardVerdict {
    let mut value = payload.cloned().unwrap_or(Value::Null);

    if let Some(lock) = rule.type_lock {
        match coerce_to_lock(lock, value) {
            Ok(coerced) => value = coerced,
            Err(actual) => {
                return GuardVerdict::reject(format!(
                    "{path}: type mismatch (expected {}, got {actual})",
                    lock.as_str()
                ))
            }
        }
    }

    if rule.ro {
        return GuardVerdict::reject(format!("{path}: read-only"));
    }

    let mut notes = Vec::new();
    if let Some(n) = as_f64(&value) {
        let clamped = clamp(n, rule.min, rule.max);
        if clamped != n {
            notes.push(format!(
                "{path}: {} clamped to {}",
                display(&value),
                display(&number_value(clamped))
            ));
            value = number_value(clamped);
        }
    }

    if let Some(allowed) = &rule.enum_values {
        let key = enum_key(&value);
        if !allowed.iter().any(|v| *v == key) {
            return GuardVerdict::reject(format!(
                "{path}: {} not in allowed values [{}]",
                display(&value),
                allowed.join(", ")
            ));
        }
    }

    GuardVerdict::allow(Some(value), notes)
}

fn validate_inc(
    rule: &RuleRecord,
    path: &str,
    payload: Option<&Value>,
    current: Option<&Value>,
) -> GuardVerdict {
    if rule.ro {
        return GuardVerdict::reject(format!("{path}: read-only"));
    }
    let mut notes = Vec::new();
    let mut delta = payload.and_then(as_f64).unwrap_or(0.0);
    if let Some(step) = rule.step.map(f64::abs).filter(|s| s.is_finite()) {
        let limited = delta.clamp(-step, step);
        if limited != delta {
            notes.push(format!(
                "{path}: change {} limited to step {}",
                fmt_delta(delta),
                fmt_delta(limited)
            ));
            delta = limited;
        }
    }
    let base = current.and_then(as_f64).unwrap_or(0.0);
    let raw_next = base + delta;
    let next = clamp(raw_next, rule.min, rule.max);
    if next != raw_next {
        notes.push(format!(
            "{path}: {} clamped to {}",
            display(&number_value(raw_next)),
            display(&number_value(next))
        ));
    }
    GuardVerdict::allow(Some(number_value(next)), notes)
}

/// Coerces `value` into the locked shape or returns its actual type name.
fn coerce_to_lock(lock: TypeLock, value: Value) -> Result<Value, &'static str> {
    let actual = type_name(&value);
    if actual == lock.as_str() {
        return Ok(value);
    }
    if lock == TypeLock::Number {
        if let (Value::String(_), Some(n)) = (&value, as_f64(&value)) {
            return Ok(number_value(n));
        }
    }
    Err(actual)
}

fn clamp(n: f64, min: Option<f64>, max: Option<f64>) -> f64 {
    let mut out = n;
    if let Some(min) = min {
        out = out.max(min);
    }
    if let Some(max) = max {
        out = out.min(max);
    }
    out
}

/// `+10`, `-2.5`
pub(crate) fn fmt_delta(delta: f64) -> String {
    let shown = display(&number_value(delta));
    if delta >= 0.0 {
        format!("+{shown}")
    } else {
        shown
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]
    use super::*;
    use crate::rule::RuleEntry;
    use serde_json::json;

    fn table(entries: &[(&str, RuleRecord)]) -> RuleTable {
        let mut t = RuleTable::new();
        t.register(
            &entries
                .iter()
                .map(|(p, r)| RuleEntry {
                    path: (*p).to_string(),
                    rule: r.clone(),
                })
                .collect::<Vec<_>>(),
        );
        t
    }

    fn closed(keys: &[&str]) -> RuleRecord {
        RuleRecord {
            type_lock: Some(TypeLock::Object),
            allowed_keys: Some(keys.iter().map(|k| (*k).to_string()).collect()),
            ..RuleRecord::default()
        }
    }

    #[test]
    fn unconstrained_paths_pass_through() {
        let v = validate(&RuleTable::new(), OpKind::Set, "a.b", Some(&json!(1)), None);
        assert!(v.allow);
        assert_eq!(v.value, Some(json!(1)));
        let inc = validate(&RuleTable::new(), OpKind::Inc, "n", Some(&json!(2)), Some(&json!(5)));
        assert_eq!(inc.value, Some(json!(7)));
    }

    #[test]
    fn closed_schema_rejects_new_keys_and_protects_template_fields() {
        let t = table(&[("stats", closed(&["hp", "mp"]))]);
        let atk = validate(&t, OpKind::Set, "stats.atk", Some(&json!(5)), None);
        assert!(!atk.allow);
        assert!(atk.reason.unwrap().contains("field not in schema"));

        let inc_new = validate(&t, OpKind::Inc, "stats.atk", Some(&json!(1)), None);
        assert!(!inc_new.allow);

        assert!(validate(&t, OpKind::Set, "stats.hp", Some(&json!(10)), Some(&json!(0))).allow);
        let del = validate(&t, OpKind::Del, "stats.hp", None, Some(&json!(0)));
        assert!(del.reason.unwrap().contains("template field cannot be deleted"));
    }

    #[test]
    fn step_magnitude_ignores_sign_and_non_finite_values() {
        let negative = RuleRecord {
            step: Some(-3.0),
            ..RuleRecord::default()
        };
        let v = validate_inc(&negative, "hp", Some(&json!(5)), Some(&json!(10)));
        assert_eq!(v.value, Some(json!(13)));
        assert_eq!(v.notes, vec!["hp: change +5 limited to step +3".to_string()]);

        let nan = RuleRecord {
            step: Some(f64::NAN),
            ..RuleRecord::default()
        };
        let v = validate_inc(&nan, "hp", Some(&json!(5)), Some(&json!(10)));
        assert_eq!(v.value, Some(json!(15)));
        assert!(v.notes.is_empty());
    }

    #[test]
    fn implicit_object_lock() {
        let t = table(&[(
            "cfg",
            RuleRecord {
                type_lock: Some(TypeLock::Object),
                ..RuleRecord::default()
            },
        )]);
        let v = validate(&t, OpKind::Set, "cfg.x", Some(&json!(1)), None);
        assert_eq!(v.reason.as_deref(), Some("cfg.x: parent structure is locked"));
        assert!(validate(&t, OpKind::Set, "cfg.x", Some(&json!(1)), Some(&json!(0))).allow);
    }

    #[test]
    fn type_lock_coerces_numeric_strings() {
        let t = table(&[(
            "hp",
            RuleRecord {
                type_lock: Some(TypeLock::Number),
                ..RuleRecord::default()
            },
        )]);
        let ok = validate(&t, OpKind::Set, "hp", Some(&json!("12")), None);
        assert_eq!(ok.value, Some(json!(12)));
        let bad = validate(&t, OpKind::Set, "hp", Some(&json!("lots")), None);
        assert!(bad.reason.unwrap().contains("expected number, got string"));
    }

    #[test]
    fn locked_array_cannot_grow() {
        let locked = RuleRecord {
            type_lock: Some(TypeLock::Array),
            ..RuleRecord::default()
        };
        let t = table(&[("bag", locked)]);
        assert!(!validate(&t, OpKind::Push, "bag", Some(&json!("x")), Some(&json!([]))).allow);
        assert!(validate(&t, OpKind::Pop, "bag", Some(&json!("x")), Some(&json!([]))).allow);
    }

    #[test]
    fn read_only_blocks_set_and_inc() {
        let t = table(&[(
            "id",
            RuleRecord {
                ro: true,
                ..RuleRecord::default()
            },
        )]);
        assert!(!validate(&t, OpKind::Set, "id", Some(&json!(1)), None).allow);
        assert!(!validate(&t, OpKind::Inc, "id", Some(&json!(1)), Some(&json!(1))).allow);
        assert!(validate(&t, OpKind::Del, "id", None, Some(&json!(1))).allow);
    }

    #[test]
    fn set_is_clamped_into_range() {
        let t = table(&[(
            "hp",
            RuleRecord {
                min: Some(0.0),
                max: Some(100.0),
                ..RuleRecord::default()
            },
        )]);
        let high = validate(&t, OpKind::Set, "hp", Some(&json!(150)), None);
        assert_eq!(high.value, Some(json!(100)));
        assert_eq!(high.notes.len(), 1);
        let low = validate(&t, OpKind::Set, "hp", Some(&json!(-10)), None);
        assert_eq!(low.value, Some(json!(0)));
    }

    #[test]
    fn enum_membership() {
        let t = table(&[(
            "mood",
            RuleRecord {
                enum_values: Some(vec!["friendly".into(), "hostile".into()]),
                ..RuleRecord::default()
            },
        )]);
        assert!(validate(&t, OpKind::Set, "mood", Some(&json!("hostile")), None).allow);
        let v = validate(&t, OpKind::Set, "mood", Some(&json!("curious")), None);
        assert!(v.reason.unwrap().contains("friendly, hostile"));
    }

    #[test]
    fn increment_applies_step_then_range() {
        let step_only = table(&[(
            "hp",
            RuleRecord {
                step: Some(3.0),
                ..RuleRecord::default()
            },
        )]);
        let v = validate(&step_only, OpKind::Inc, "hp", Some(&json!(5)), Some(&json!(10)));
        assert_eq!(v.value, Some(json!(13)));
        assert_eq!(v.notes.len(), 1);

        let both = table(&[(
            "hp",
            RuleRecord {
                step: Some(3.0),
                min: Some(0.0),
                max: Some(12.0),
                ..RuleRecord::default()
            },
        )]);
        let v = validate(&both, OpKind::Inc, "hp", Some(&json!(5)), Some(&json!(10)));
        assert_eq!(v.value, Some(json!(12)));
        assert_eq!(v.notes.len(), 2);
    }

    #[test]
    fn increment_defaults_missing_value_to_zero() {
        let t = table(&[("hp", RuleRecord { max: Some(100.0), ..RuleRecord::default() })]);
        let v = validate(&t, OpKind::Inc, "hp", Some(&json!(-4)), None);
        assert_eq!(v.value, Some(json!(-4)));
    }
}
