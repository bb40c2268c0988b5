// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Host ports: the two stores the engine persists through.
//!
//! The host owns durability. The engine only mutates these in memory and
//! calls [`MetadataStore::request_save`] once per mutating call.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Flat per-root string storage.
pub trait VariableStore {
    /// Stored string for `root`, if any.
    fn get_scalar(&self, root: &str) -> Option<String>;
    /// Stores `raw` under `root`.
    fn set_scalar(&mut self, root: &str, raw: String);
    /// Removes `root`.
    fn remove_scalar(&mut self, root: &str);
    /// Every stored root name.
    fn scalar_keys(&self) -> Vec<String>;
}

/// Structured metadata object (WAL, checkpoints, rule table, applied map).
pub trait MetadataStore {
    /// Read access to the metadata object.
    fn metadata(&self) -> &Map<String, Value>;
    /// Write access to the metadata object.
    fn metadata_mut(&mut self) -> &mut Map<String, Value>;
    /// Asks the host to flush both stores.
    fn request_save(&mut self);
}

/// In-memory [`VariableStore`] backed by an ordered map. Serializes as a
/// plain `{root: raw}` object.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemoryVariables {
    roots: BTreeMap<String, String>,
}

impl MemoryVariables {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store holding `roots`.
    pub fn from_roots(roots: BTreeMap<String, String>) -> Self {
        Self { roots }
    }

    /// Borrow the raw root strings.
    pub fn roots(&self) -> &BTreeMap<String, String> {
        &self.roots
    }
}

impl VariableStore for MemoryVariables {
    fn get_scalar(&self, root: &str) -> Option<String> {
        self.roots.get(root).cloned()
    }

    fn set_scalar(&mut self, root: &str, raw: String) {
        self.roots.insert(root.to_string(), raw);
    }

    fn remove_scalar(&mut self, root: &str) {
        self.roots.remove(root);
    }

    fn scalar_keys(&self) -> Vec<String> {
        self.roots.keys().cloned().collect()
    }
}

/// In-memory [`MetadataStore`] that counts save requests.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MemoryMetadata {
    data: Map<String, Value>,
    save_requests: usize,
}

impl MemoryMetadata {
    /// Empty metadata object.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps existing metadata (e.g. loaded from disk).
    pub fn from_map(data: Map<String, Value>) -> Self {
        Self {
            data,
            save_requests: 0,
        }
    }

    /// Number of [`MetadataStore::request_save`] calls so far.
    pub fn save_requests(&self) -> usize {
        self.save_requests
    }

    /// Consumes the store and returns the metadata object.
    pub fn into_map(self) -> Map<String, Value> {
        self.data
    }
}

impl MetadataStore for MemoryMetadata {
    fn metadata(&self) -> &Map<String, Value> {
        &self.data
    }

    fn metadata_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.data
    }

    fn request_save(&mut self) {
        self.save_requests += 1;
    }
}
