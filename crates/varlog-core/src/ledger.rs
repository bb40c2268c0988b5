// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Persisted history: WAL floor records, checkpoints, the rule table and the
//! applied-signature map, all living in the host metadata object.
//!
//! Layout (slot names come from [`EngineConfig`]):
//!
//! ```text
//! <rule_table_slot>: { <pattern>: RuleRecord }
//! <applied_slot>:    { <floor>: signature }
//! extensions.<namespace>.<log_key>:        { floors: { <floor>: FloorRecord } }
//! extensions.<namespace>.<checkpoint_key>: { every: n, points: { <floor>: Checkpoint } }
//! ```
//!
//! Missing or `null` slots read as empty. Anything else that fails to decode
//! is reported as [`LedgerError`] and fails the whole call.

use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::config::EngineConfig;
use crate::dsl::Op;
use crate::rule::{RuleEntry, RuleTable};
use crate::value::type_name;

/// Unreadable or wrong-shaped persisted state.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// A slot on the way to the target held a non-object value.
    #[error("metadata slot `{slot}` is a {found}, expected an object")]
    WrongShape {
        /// Dotted slot path.
        slot: String,
        /// Runtime type found there.
        found: &'static str,
    },
    /// The slot exists but does not decode.
    #[error("metadata slot `{slot}` is corrupt: {source}")]
    Corrupt {
        /// Dotted slot path.
        slot: String,
        /// Decoder error.
        #[source]
        source: serde_json::Error,
    },
}

/// Milliseconds since the Unix epoch (0 if the clock is before it).
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

/// WAL entry for one floor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FloorRecord {
    /// Block signature the record was parsed from.
    pub signature: String,
    /// Rules declared by the floor, in source order.
    #[serde(default)]
    pub rules: Vec<RuleEntry>,
    /// Ops declared by the floor, in source order.
    #[serde(default)]
    pub ops: Vec<Op>,
    /// Write time (ms).
    #[serde(default)]
    pub ts: u64,
}

/// Write-ahead log keyed by floor.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FloorLog {
    /// Records by floor.
    #[serde(default)]
    pub floors: BTreeMap<u64, FloorRecord>,
}

impl FloorLog {
    /// Records in `range`, ascending.
    pub fn range(&self, range: RangeInclusive<u64>) -> impl Iterator<Item = (&u64, &FloorRecord)> {
        self.floors.range(range)
    }

    /// Drops records at or after `floor`; returns how many were removed.
    pub fn trim_from(&mut self, floor: u64) -> usize {
        self.floors.split_off(&floor).len()
    }
}

/// Full snapshot of variables and rules after a floor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Raw root strings, as the variable store held them.
    pub vars: BTreeMap<String, String>,
    /// Rule table at that point.
    #[serde(default)]
    pub rules: RuleTable,
    /// Capture time (ms).
    #[serde(default)]
    pub ts: u64,
}

/// Periodic checkpoints keyed by floor.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckpointLog {
    /// Interval the log was written with.
    #[serde(default)]
    pub every: u64,
    /// Checkpoints by floor.
    #[serde(default)]
    pub points: BTreeMap<u64, Checkpoint>,
}

impl CheckpointLog {
    /// Greatest checkpoint at or before `floor`.
    pub fn latest_at_or_before(&self, floor: u64) -> Option<(u64, &Checkpoint)> {
        self.points
            .range(..=floor)
            .next_back()
            .map(|(f, cp)| (*f, cp))
    }

    /// Drops checkpoints at or after `floor`; returns how many were removed.
    pub fn trim_from(&mut self, floor: u64) -> usize {
        self.points.split_off(&floor).len()
    }
}

/// Every persisted structure, loaded at the start of a call and stored at
/// the end.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Ledger {
    /// Active rule table.
    pub rules: RuleTable,
    /// Floor → applied signature.
    pub applied: BTreeMap<u64, String>,
    /// WAL.
    pub wal: FloorLog,
    /// Checkpoints.
    pub checkpoints: CheckpointLog,
}

impl Ledger {
    /// Reads every slot from `meta`.
    pub fn load(meta: &Map<String, Value>, cfg: &EngineConfig) -> Result<Self, LedgerError> {
        Ok(Self {
            rules: read_slot(meta, &[&cfg.rule_table_slot])?,
            applied: read_slot(meta, &[&cfg.applied_slot])?,
            wal: read_slot(meta, &["extensions", &cfg.namespace, &cfg.log_key])?,
            checkpoints: read_slot(meta, &["extensions", &cfg.namespace, &cfg.checkpoint_key])?,
        })
    }

    /// Writes every slot into `meta`.
    pub fn store(&mut self, meta: &mut Map<String, Value>, cfg: &EngineConfig) -> Result<(), LedgerError> {
        self.checkpoints.every = cfg.checkpoint_every;
        write_slot(meta, &[&cfg.rule_table_slot], &self.rules)?;
        write_slot(meta, &[&cfg.applied_slot], &self.applied)?;
        write_slot(meta, &["extensions", &cfg.namespace, &cfg.log_key], &self.wal)?;
        write_slot(
            meta,
            &["extensions", &cfg.namespace, &cfg.checkpoint_key],
            &self.checkpoints,
        )
    }
}

fn read_slot<T>(meta: &Map<String, Value>, path: &[&str]) -> Result<T, LedgerError>
where
    T: DeserializeOwned + Default,
{
    let Some((leaf, parents)) = path.split_last() else {
        return Ok(T::default());
    };
    let mut cur = meta;
    for (depth, key) in parents.iter().enumerate() {
        match cur.get(*key) {
            None | Some(Value::Null) => return Ok(T::default()),
            Some(Value::Object(next)) => cur = next,
            Some(other) => {
                return Err(LedgerError::WrongShape {
                    slot: path[..=depth].join("."),
                    found: type_name(other),
                })
            }
        }
    }
    match cur.get(*leaf) {
        None | Some(Value::Null) => Ok(T::default()),
        Some(value) => T::deserialize(value).map_err(|source| LedgerError::Corrupt {
            slot: path.join("."),
            source,
        }),
    }
}

fn write_slot<T>(meta: &mut Map<String, Value>, path: &[&str], value: &T) -> Result<(), LedgerError>
where
    T: Serialize,
{
    let Some((leaf, parents)) = path.split_last() else {
        return Ok(());
    };
    let mut cur = meta;
    for (depth, key) in parents.iter().enumerate() {
        let slot = cur
            .entry((*key).to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if slot.is_null() {
            *slot = Value::Object(Map::new());
        }
        cur = match slot {
            Value::Object(next) => next,
            other => {
                return Err(LedgerError::WrongShape {
                    slot: path[..=depth].join("."),
                    found: type_name(other),
                })
            }
        };
    }
    let encoded = serde_json::to_value(value).map_err(|source| LedgerError::Corrupt {
        slot: path.join("."),
        source,
    })?;
    cur.insert((*leaf).to_string(), encoded);
    Ok(())
}
