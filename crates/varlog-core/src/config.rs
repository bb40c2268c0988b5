// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Engine configuration.

use serde::{Deserialize, Serialize};

/// Tunables and storage slot names. Missing fields take their defaults, so a
/// partial JSON config is valid.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Tag name delimiting DSL blocks (`<state> ... </state>`).
    pub block_tag: String,
    /// Checkpoint after floors divisible by this; `0` disables checkpoints.
    pub checkpoint_every: u64,
    /// Namespace under `extensions` holding the WAL and checkpoints.
    pub namespace: String,
    /// WAL key inside the namespace.
    pub log_key: String,
    /// Checkpoint key inside the namespace.
    pub checkpoint_key: String,
    /// Top-level metadata slot for the rule table.
    pub rule_table_slot: String,
    /// Top-level metadata slot for applied signatures.
    pub applied_slot: String,
    /// Variable root that receives the advisory text.
    pub advisory_root: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            block_tag: "state".into(),
            checkpoint_every: 50,
            namespace: "varlog".into(),
            log_key: "wal".into(),
            checkpoint_key: "checkpoints".into(),
            rule_table_slot: "varlog_rules".into(),
            applied_slot: "varlog_applied".into(),
            advisory_root: "varlog_advisory".into(),
        }
    }
}

impl EngineConfig {
    /// True when a checkpoint is due after applying `floor`.
    pub fn checkpoint_due(&self, floor: u64) -> bool {
        self.checkpoint_every != 0 && floor % self.checkpoint_every == 0
    }
}
