// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The engine: apply floors, restore to a floor, trim history.
//!
//! # Apply
//!
//! [`Engine::apply_floor`] is idempotent per floor. The block signature of
//! the text is compared with the one last applied for that floor:
//!
//! - no blocks: the floor is retracted (WAL record, applied signature and
//!   advisory output cleared); state is left alone until the host restores;
//! - unchanged signature: nothing happens and the outcome is `skipped`;
//! - otherwise the blocks are parsed, the WAL record written, rules
//!   registered and ops executed.
//!
//! # Restore
//!
//! [`Engine::restore_to_floor`] rebuilds variables and rules from the nearest
//! checkpoint at or before the target plus a silent replay of the WAL.
//! Replay consults only persisted records, so the result is a pure function
//! of the ledger.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::block::{compute_signature, extract_blocks};
use crate::config::EngineConfig;
use crate::dsl::{parse_block, Op};
use crate::error::EngineError;
use crate::executor::{snapshot, Atom, Executor};
use crate::host::{MetadataStore, VariableStore};
use crate::ledger::{now_ms, Checkpoint, FloorRecord, Ledger};
use crate::path::split;
use crate::rule::{RuleEntry, RuleRecord, RuleTable};
use crate::value::get_at;

/// Result of [`Engine::apply_floor`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ApplyOutcome {
    /// Applied ops, in execution order.
    pub atoms: Vec<Atom>,
    /// Rejected ops and structural failures.
    pub errors: Vec<String>,
    /// Guard corrections and parse warnings.
    pub notes: Vec<String>,
    /// The floor was already applied with identical blocks.
    pub skipped: bool,
}

/// Result of [`Engine::restore_to_floor`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreOutcome {
    /// Restore completed.
    pub ok: bool,
    /// Checkpoint floor replay started from, if any.
    pub used_checkpoint: Option<u64>,
    /// WAL records replayed.
    pub replayed: usize,
}

/// Result of [`Engine::trim_from_floor`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrimOutcome {
    /// Trim completed.
    pub ok: bool,
    /// WAL records removed.
    pub wal_removed: usize,
    /// Checkpoints removed.
    pub checkpoints_removed: usize,
}

/// State mutation engine bound to one conversation's stores.
#[derive(Debug)]
pub struct Engine<V, M> {
    config: EngineConfig,
    vars: V,
    meta: M,
}

impl<V, M> Engine<V, M> {
    /// Binds an engine to host stores.
    pub fn new(config: EngineConfig, vars: V, meta: M) -> Self {
        Self { config, vars, meta }
    }

    /// Active configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Variable store.
    pub fn vars(&self) -> &V {
        &self.vars
    }

    /// Metadata store.
    pub fn meta(&self) -> &M {
        &self.meta
    }

    /// Releases the host stores.
    pub fn into_parts(self) -> (V, M) {
        (self.vars, self.meta)
    }
}

impl<V, M> Engine<V, M>
where
    V: VariableStore,
    M: MetadataStore,
{
    fn load_ledger(&self) -> Result<Ledger, EngineError> {
        Ok(Ledger::load(self.meta.metadata(), &self.config)?)
    }

    fn commit(&mut self, ledger: &mut Ledger) -> Result<(), EngineError> {
        ledger.store(self.meta.metadata_mut(), &self.config)?;
        self.meta.request_save();
        Ok(())
    }

    /// Applies the blocks found in `text` as floor `floor`.
    pub fn apply_floor(&mut self, floor: u64, text: &str) -> Result<ApplyOutcome, EngineError> {
        let mut ledger = self.load_ledger()?;
        let tag = self.config.block_tag.clone();
        let signature = compute_signature(text, &tag);

        if signature.is_empty() {
            let had_record = ledger.wal.floors.remove(&floor).is_some();
            let had_applied = ledger.applied.remove(&floor).is_some();
            if had_record || had_applied {
                tracing::debug!(floor, "floor retracted");
            }
            self.write_advisory(&[]);
            self.commit(&mut ledger)?;
            return Ok(ApplyOutcome::default());
        }

        if ledger.applied.get(&floor) == Some(&signature) {
            tracing::debug!(floor, "floor unchanged; skipping");
            return Ok(ApplyOutcome {
                skipped: true,
                ..ApplyOutcome::default()
            });
        }

        let mut rules: Vec<RuleEntry> = Vec::new();
        let mut ops: Vec<Op> = Vec::new();
        let mut warnings: Vec<String> = Vec::new();
        for inner in extract_blocks(text, &tag) {
            let parsed = parse_block(inner);
            rules.extend(parsed.rules);
            ops.extend(parsed.ops);
            warnings.extend(parsed.warnings);
        }
        let ts = now_ms();
        warnings.extend(ops.iter().filter_map(|op| op.warning.clone()));

        ledger.rules.register(&rules);
        let execution = Executor::new(&mut self.vars, &ledger.rules).run(floor, &ops, ts);
        tracing::debug!(
            floor,
            rules = rules.len(),
            ops = ops.len(),
            atoms = execution.atoms.len(),
            rejected = execution.errors.len(),
            "floor applied"
        );

        ledger.wal.floors.insert(
            floor,
            FloorRecord {
                signature: signature.clone(),
                rules,
                ops,
                ts,
            },
        );
        ledger.applied.insert(floor, signature);

        if self.config.checkpoint_due(floor) {
            // Checkpoints are immutable; trim the floor to retake one.
            if ledger.checkpoints.points.contains_key(&floor) {
                tracing::debug!(floor, "checkpoint already taken; keeping it");
            } else {
                ledger.checkpoints.points.insert(
                    floor,
                    Checkpoint {
                        vars: self.raw_snapshot(),
                        rules: ledger.rules.clone(),
                        ts,
                    },
                );
                tracing::info!(floor, "checkpoint taken");
            }
        }

        let mut notes = warnings;
        notes.extend(execution.notes);
        let outcome = ApplyOutcome {
            atoms: execution.atoms,
            errors: execution.errors,
            notes,
            skipped: false,
        };
        self.write_advisory(&advisory_lines(floor, &outcome));
        self.commit(&mut ledger)?;
        Ok(outcome)
    }

    /// Rebuilds variables and rules as of `target`. A negative target resets
    /// both to empty.
    pub fn restore_to_floor(&mut self, target: i64) -> Result<RestoreOutcome, EngineError> {
        let mut ledger = self.load_ledger()?;
        self.clear_vars();

        let Ok(target) = u64::try_from(target) else {
            ledger.rules.clear_all();
            ledger.applied.clear();
            self.commit(&mut ledger)?;
            tracing::info!("state reset");
            return Ok(RestoreOutcome {
                ok: true,
                used_checkpoint: None,
                replayed: 0,
            });
        };

        let (used_checkpoint, first_floor) = match ledger.checkpoints.latest_at_or_before(target) {
            Some((cp_floor, checkpoint)) => {
                for (root, raw) in &checkpoint.vars {
                    if *root != self.config.advisory_root {
                        self.vars.set_scalar(root, raw.clone());
                    }
                }
                ledger.rules = checkpoint.rules.clone();
                (Some(cp_floor), cp_floor.checked_add(1))
            }
            None => {
                ledger.rules = RuleTable::new();
                (None, Some(0))
            }
        };

        let mut replayed = 0;
        if let Some(first) = first_floor.filter(|f| *f <= target) {
            let records: Vec<(u64, FloorRecord)> = ledger
                .wal
                .range(first..=target)
                .map(|(f, r)| (*f, r.clone()))
                .collect();
            for (floor, record) in records {
                ledger.rules.register(&record.rules);
                Executor::new(&mut self.vars, &ledger.rules).replay(floor, &record.ops);
                replayed += 1;
            }
        }

        ledger.applied.retain(|floor, _| *floor <= target);
        self.commit(&mut ledger)?;
        tracing::info!(floor = target, ?used_checkpoint, replayed, "state restored");
        Ok(RestoreOutcome {
            ok: true,
            used_checkpoint,
            replayed,
        })
    }

    /// Drops WAL records, checkpoints and applied signatures at or after
    /// `floor`. Variables are untouched; follow with a restore.
    pub fn trim_from_floor(&mut self, floor: u64) -> Result<TrimOutcome, EngineError> {
        let mut ledger = self.load_ledger()?;
        let wal_removed = ledger.wal.trim_from(floor);
        let checkpoints_removed = ledger.checkpoints.trim_from(floor);
        ledger.applied.retain(|f, _| *f < floor);
        self.commit(&mut ledger)?;
        tracing::info!(floor, wal_removed, checkpoints_removed, "history trimmed");
        Ok(TrimOutcome {
            ok: true,
            wal_removed,
            checkpoints_removed,
        })
    }

    /// Current rule table.
    pub fn rules(&self) -> Result<RuleTable, EngineError> {
        Ok(self.load_ledger()?.rules)
    }

    /// Merges `rule` onto `pattern` (normalized first).
    pub fn set_rule(&mut self, pattern: &str, rule: &RuleRecord) -> Result<(), EngineError> {
        let mut ledger = self.load_ledger()?;
        ledger.rules.set_rule(&crate::path::normalize(pattern), rule);
        self.commit(&mut ledger)
    }

    /// Removes the rule at `pattern`; returns whether one existed.
    pub fn clear_rule(&mut self, pattern: &str) -> Result<bool, EngineError> {
        let mut ledger = self.load_ledger()?;
        let removed = ledger.rules.clear_rule(&crate::path::normalize(pattern));
        self.commit(&mut ledger)?;
        Ok(removed)
    }

    /// Removes every rule.
    pub fn clear_all_rules(&mut self) -> Result<(), EngineError> {
        let mut ledger = self.load_ledger()?;
        ledger.rules.clear_all();
        self.commit(&mut ledger)
    }

    /// Value at `path`, decoded from its root.
    pub fn value_at(&self, path: &str) -> Option<Value> {
        let segments = split(path);
        let (root, rest) = segments.split_first()?;
        let decoded = crate::value::decode_scalar(&self.vars.get_scalar(&root.to_string())?);
        get_at(&decoded, rest).cloned()
    }

    /// Every root except the advisory root, decoded.
    pub fn snapshot_vars(&self) -> BTreeMap<String, Value> {
        snapshot(&self.vars, &self.config.advisory_root)
    }

    /// BLAKE3 hex digest of [`Engine::snapshot_vars`] as canonical JSON
    /// (roots in sorted order).
    pub fn state_digest(&self) -> String {
        let map: Map<String, Value> = self.snapshot_vars().into_iter().collect();
        let canonical = Value::Object(map).to_string();
        hex::encode(blake3::hash(canonical.as_bytes()).as_bytes())
    }

    /// Floors with a WAL record, ascending.
    pub fn wal_floors(&self) -> Result<Vec<u64>, EngineError> {
        Ok(self.load_ledger()?.wal.floors.keys().copied().collect())
    }

    /// Floors with a checkpoint, ascending.
    pub fn checkpoint_floors(&self) -> Result<Vec<u64>, EngineError> {
        Ok(self.load_ledger()?.checkpoints.points.keys().copied().collect())
    }

    /// Advisory text from the last apply, if any.
    pub fn advisory(&self) -> Option<String> {
        self.vars.get_scalar(&self.config.advisory_root)
    }

    fn raw_snapshot(&self) -> BTreeMap<String, String> {
        self.vars
            .scalar_keys()
            .into_iter()
            .filter(|k| *k != self.config.advisory_root)
            .filter_map(|k| self.vars.get_scalar(&k).map(|raw| (k, raw)))
            .collect()
    }

    fn clear_vars(&mut self) {
        for key in self.vars.scalar_keys() {
            if key != self.config.advisory_root {
                self.vars.remove_scalar(&key);
            }
        }
    }

    fn write_advisory(&mut self, lines: &[String]) {
        let root = self.config.advisory_root.clone();
        if lines.is_empty() {
            self.vars.remove_scalar(&root);
        } else {
            self.vars.set_scalar(&root, lines.join("\n"));
        }
    }
}

fn advisory_lines(floor: u64, outcome: &ApplyOutcome) -> Vec<String> {
    if outcome.errors.is_empty() && outcome.notes.is_empty() {
        return Vec::new();
    }
    let mut lines = vec![format!("[varlog] floor {floor}")];
    lines.extend(outcome.errors.iter().map(|e| format!("- rejected: {e}")));
    lines.extend(outcome.notes.iter().map(|n| format!("- note: {n}")));
    lines
}
