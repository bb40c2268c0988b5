// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Table rendering for human output.

use std::collections::BTreeMap;

use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde_json::Value;
use varlog_core::{ApplyOutcome, Op, RuleEntry};

fn table(header: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header.to_vec());
    table
}

/// One row per atom, rejection and note across floors.
pub fn outcomes(rows: &[(u64, ApplyOutcome)]) -> Table {
    let mut t = table(&["floor", "kind", "detail"]);
    for (floor, outcome) in rows {
        if outcome.skipped {
            t.add_row(vec![floor.to_string(), "skipped".into(), String::new()]);
        }
        for atom in &outcome.atoms {
            t.add_row(vec![
                floor.to_string(),
                atom.op.as_str().to_string(),
                atom.semantic.clone(),
            ]);
        }
        for err in &outcome.errors {
            t.add_row(vec![floor.to_string(), "rejected".into(), err.clone()]);
        }
        for note in &outcome.notes {
            t.add_row(vec![floor.to_string(), "note".into(), note.clone()]);
        }
    }
    t
}

/// Root → JSON value.
pub fn state(vars: &BTreeMap<String, Value>) -> Table {
    let mut t = table(&["root", "value"]);
    for (root, value) in vars {
        t.add_row(vec![root.clone(), value.to_string()]);
    }
    t
}

/// Parsed rules.
pub fn rules(entries: &[RuleEntry]) -> Table {
    let mut t = table(&["path", "rule"]);
    for entry in entries {
        let rule = serde_json::to_string(&entry.rule).unwrap_or_default();
        t.add_row(vec![entry.path.clone(), rule]);
    }
    t
}

/// Parsed ops.
pub fn ops(ops: &[Op]) -> Table {
    let mut t = table(&["path", "op", "value", "warning"]);
    for op in ops {
        let value = match (&op.value, op.delta) {
            (Some(v), _) => v.to_string(),
            (None, Some(d)) => d.to_string(),
            (None, None) => String::new(),
        };
        t.add_row(vec![
            op.path.clone(),
            op.kind.as_str().to_string(),
            value,
            op.warning.clone().unwrap_or_default(),
        ]);
    }
    t
}
