// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Transcript input and persisted state files.

use std::fs;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use varlog_core::{MemoryMetadata, MemoryVariables};

/// A message in a transcript: bare text (floor = position) or an explicit
/// `{floor, text}` pair.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Entry {
    Text(String),
    Floor { floor: u64, text: String },
}

/// Accepted transcript shapes: a JSON array of entries or
/// `{"messages": [...]}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Transcript {
    List(Vec<Entry>),
    Wrapped { messages: Vec<Entry> },
}

/// Reads `path` (`-` for stdin).
pub fn read_input(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("read stdin")?;
        return Ok(buf);
    }
    fs::read_to_string(path).with_context(|| format!("read {}", path.display()))
}

/// Loads a transcript as `(floor, text)` pairs in file order.
pub fn load_transcript(path: &Path) -> Result<Vec<(u64, String)>> {
    let raw = read_input(path)?;
    let parsed: Transcript = serde_json::from_str(&raw)
        .with_context(|| format!("parse transcript {}", path.display()))?;
    let entries = match parsed {
        Transcript::List(entries) | Transcript::Wrapped { messages: entries } => entries,
    };
    Ok(entries
        .into_iter()
        .zip(0_u64..)
        .map(|(entry, position)| match entry {
            Entry::Text(text) => (position, text),
            Entry::Floor { floor, text } => (floor, text),
        })
        .collect())
}

/// Both host stores as one JSON document.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct StateFile {
    /// Raw variable roots.
    #[serde(default)]
    pub vars: MemoryVariables,
    /// Metadata object (WAL, checkpoints, rules, applied map).
    #[serde(default)]
    pub meta: Map<String, Value>,
}

impl StateFile {
    /// Loads `path`, or an empty state when it does not exist yet.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parse state {}", path.display()))
    }

    /// Splits into engine hosts.
    pub fn into_hosts(self) -> (MemoryVariables, MemoryMetadata) {
        (self.vars, MemoryMetadata::from_map(self.meta))
    }

    /// Rebuilds from engine hosts.
    pub fn from_hosts(vars: MemoryVariables, meta: MemoryMetadata) -> Self {
        Self {
            vars,
            meta: meta.into_map(),
        }
    }

    /// Writes pretty JSON to `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_json::to_vec_pretty(self)?;
        fs::write(path, data).with_context(|| format!("write {}", path.display()))
    }
}
