// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Op executor: guards and applies ops against the variable store.
//!
//! Each op reads its root from the host, mutates it in memory and writes it
//! straight back, so later ops in the same floor observe earlier ones.
//! Index deletes run first (see [`execution_order`]) so that removing
//! several elements of one array never shifts a pending target.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dsl::{Op, OpKind};
use crate::guard::{fmt_delta, validate};
use crate::host::VariableStore;
use crate::path::{join, split, Segment};
use crate::rule::RuleTable;
use crate::value::{
    as_f64, decode_scalar, deep_eq, display, encode_scalar, get_at, number_value, remove_at,
    slot_at, type_name, MutationError,
};

/// Recorded outcome of one applied op.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Atom {
    /// `"<floor>:<idx>"`.
    pub atom_id: String,
    /// Floor the op came from.
    pub floor: u64,
    /// Position of the op in the floor's source order.
    pub idx: usize,
    /// Normalized target path.
    pub path: String,
    /// Op kind.
    pub op: OpKind,
    /// Value before the op (`null` when absent).
    pub old_value: Value,
    /// Value after the op (`null` when removed).
    pub new_value: Value,
    /// Effective change for `inc`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<f64>,
    /// Human-readable description.
    pub semantic: String,
    /// Application time (ms).
    pub timestamp: u64,
}

/// Everything one execution pass produced.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Execution {
    /// One atom per applied op, in execution order.
    pub atoms: Vec<Atom>,
    /// Rejections and structural failures.
    pub errors: Vec<String>,
    /// Guard corrections.
    pub notes: Vec<String>,
}

/// Indices into `ops` in the order they must run: index deletes grouped by
/// parent array (groups in first-seen order, descending index, duplicates
/// dropped), then every other op in source order.
pub fn execution_order(ops: &[Op]) -> Vec<usize> {
    let mut groups: Vec<(String, Vec<(usize, usize)>)> = Vec::new();
    let mut rest = Vec::new();
    for (i, op) in ops.iter().enumerate() {
        let segments = split(&op.path);
        let index_target = match (op.kind, segments.split_last()) {
            (OpKind::Del, Some((Segment::Index(idx), parent))) => Some((join(parent), *idx)),
            _ => None,
        };
        let Some((parent, idx)) = index_target else {
            rest.push(i);
            continue;
        };
        match groups.iter_mut().find(|(p, _)| *p == parent) {
            Some((_, members)) => {
                if !members.iter().any(|(_, existing)| *existing == idx) {
                    members.push((i, idx));
                }
            }
            None => groups.push((parent, vec![(i, idx)])),
        }
    }
    let mut order = Vec::with_capacity(ops.len());
    for (_, mut members) in groups {
        members.sort_by(|a, b| b.1.cmp(&a.1));
        order.extend(members.into_iter().map(|(i, _)| i));
    }
    order.extend(rest);
    order
}

/// Applies ops to one variable store under one rule table.
pub struct Executor<'a, V: VariableStore> {
    vars: &'a mut V,
    rules: &'a RuleTable,
}

impl<'a, V: VariableStore> Executor<'a, V> {
    /// Binds an executor to a store and a rule table.
    pub fn new(vars: &'a mut V, rules: &'a RuleTable) -> Self {
        Self { vars, rules }
    }

    /// Runs `ops` for `floor` in [`execution_order`].
    pub fn run(&mut self, floor: u64, ops: &[Op], timestamp: u64) -> Execution {
        let mut out = Execution::default();
        for idx in execution_order(ops) {
            let op = &ops[idx];
            match self.apply(op) {
                Ok(Applied::Changed {
                    old_value,
                    new_value,
                    notes,
                }) => {
                    out.notes.extend(notes);
                    let delta = (op.kind == OpKind::Inc).then(|| {
                        as_f64(&new_value).unwrap_or(0.0) - as_f64(&old_value).unwrap_or(0.0)
                    });
                    let path = join(&split(&op.path));
                    let semantic = describe(op, &path, &old_value, &new_value, delta);
                    out.atoms.push(Atom {
                        atom_id: format!("{floor}:{idx}"),
                        floor,
                        idx,
                        path,
                        op: op.kind,
                        old_value,
                        new_value,
                        delta,
                        semantic,
                        timestamp,
                    });
                }
                Ok(Applied::Unchanged) => {}
                Ok(Applied::Rejected(reason)) => out.errors.push(reason),
                Err(err) => out.errors.push(format!("{}: {err}", op.path)),
            }
        }
        out
    }

    /// Replays `ops` with no atoms; failures are logged at debug and dropped.
    pub fn replay(&mut self, floor: u64, ops: &[Op]) {
        for idx in execution_order(ops) {
            match self.apply(&ops[idx]) {
                Ok(Applied::Rejected(reason)) => {
                    tracing::debug!(floor, idx, reason = %reason, "replay dropped op");
                }
                Err(err) => tracing::debug!(floor, idx, %err, "replay dropped op"),
                Ok(_) => {}
            }
        }
    }

    fn apply(&mut self, op: &Op) -> Result<Applied, MutationError> {
        let segments = split(&op.path);
        let Some((root_seg, rest)) = segments.split_first() else {
            return Err(MutationError::EmptyPath);
        };
        let path = join(&segments);
        let root_key = root_seg.to_string();
        let root_val = self.vars.get_scalar(&root_key).map(|raw| decode_scalar(&raw));
        let current = match &root_val {
            Some(root) => get_at(root, rest),
            None => None,
        };

        let payload = match op.kind {
            OpKind::Inc => Some(number_value(op.delta.unwrap_or(0.0))),
            _ => op.value.clone(),
        };
        let verdict = validate(self.rules, op.kind, &path, payload.as_ref(), current);
        if !verdict.allow {
            return Ok(Applied::Rejected(
                verdict.reason.unwrap_or_else(|| format!("{path}: rejected")),
            ));
        }
        let old_value = current.cloned();
        let value = verdict.value.unwrap_or(Value::Null);
        let mut root = root_val.unwrap_or(Value::Null);

        match op.kind {
            OpKind::Set | OpKind::Inc => *target(&mut root, rest)? = value,
            OpKind::Push => {
                let items = into_items(value);
                let slot = target(&mut root, rest)?;
                if slot.is_null() {
                    *slot = Value::Array(items);
                } else if let Value::Array(existing) = slot {
                    existing.extend(items);
                } else {
                    return Err(MutationError::NotAnArray {
                        found: type_name(slot),
                    });
                }
            }
            OpKind::Pop => {
                if old_value.is_none() {
                    return Err(MutationError::MissingTarget);
                }
                let items = into_items(value);
                match target(&mut root, rest)? {
                    Value::Array(existing) => {
                        existing.retain(|e| !items.iter().any(|item| deep_eq(e, item)));
                    }
                    other => {
                        return Err(MutationError::NotAnArray {
                            found: type_name(other),
                        })
                    }
                }
            }
            OpKind::Del => {
                let Some(old_value) = old_value else {
                    return Ok(Applied::Unchanged);
                };
                if rest.is_empty() {
                    self.vars.remove_scalar(&root_key);
                } else {
                    remove_at(&mut root, rest);
                    self.vars.set_scalar(&root_key, encode_scalar(&root));
                }
                return Ok(Applied::Changed {
                    old_value,
                    new_value: Value::Null,
                    notes: verdict.notes,
                });
            }
        }

        self.vars.set_scalar(&root_key, encode_scalar(&root));
        let new_value = if rest.is_empty() {
            root
        } else {
            get_at(&root, rest).cloned().unwrap_or(Value::Null)
        };
        Ok(Applied::Changed {
            old_value: old_value.unwrap_or(Value::Null),
            new_value,
            notes: verdict.notes,
        })
    }
}

enum Applied {
    Changed {
        old_value: Value,
        new_value: Value,
        notes: Vec<String>,
    },
    Unchanged,
    Rejected(String),
}

fn target<'v>(root: &'v mut Value, rest: &[Segment]) -> Result<&'v mut Value, MutationError> {
    if rest.is_empty() {
        Ok(root)
    } else {
        slot_at(root, rest)
    }
}

fn into_items(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        other => vec![other],
    }
}

fn describe(op: &Op, path: &str, old: &Value, new: &Value, delta: Option<f64>) -> String {
    let listed = || match &op.value {
        Some(Value::Array(items)) => items.iter().map(display).collect::<Vec<_>>().join(", "),
        Some(v) => display(v),
        None => String::new(),
    };
    match op.kind {
        OpKind::Set if old.is_null() => format!("{path} = {}", display(new)),
        OpKind::Set => format!("{path}: {} -> {}", display(old), display(new)),
        OpKind::Inc => format!(
            "{path}: {} -> {} ({})",
            display(&number_value(as_f64(old).unwrap_or(0.0))),
            display(new),
            fmt_delta(delta.unwrap_or(0.0))
        ),
        OpKind::Push => format!("{path}: pushed {}", listed()),
        OpKind::Pop => format!("{path}: removed {}", listed()),
        OpKind::Del => format!("{path}: deleted (was {})", display(old)),
    }
}

/// Decoded view of every root except `exclude`.
pub fn snapshot<V: VariableStore>(vars: &V, exclude: &str) -> BTreeMap<String, Value> {
    vars.scalar_keys()
        .into_iter()
        .filter(|k| k != exclude)
        .filter_map(|k| vars.get_scalar(&k).map(|raw| (k, decode_scalar(&raw))))
        .collect()
}
