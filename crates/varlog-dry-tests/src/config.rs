// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! In-memory config store fake.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use varlog_config::{ConfigError, ConfigStore};

/// [`ConfigStore`] that keeps blobs in memory and counts calls.
///
/// Clones share state, so a test can hand one clone to
/// [`varlog_config::EngineSettings`] and inspect the other.
///
/// ```
/// use varlog_config::{EngineSettings, ENGINE_KEY};
/// use varlog_core::EngineConfig;
/// use varlog_dry_tests::InMemoryConfigStore;
///
/// let store = InMemoryConfigStore::new();
/// let settings = EngineSettings::new(store.clone());
/// settings.save(&EngineConfig::default()).unwrap();
/// assert_eq!(store.save_count(), 1);
/// assert!(store.contains_key(ENGINE_KEY));
/// ```
#[derive(Clone, Default)]
pub struct InMemoryConfigStore {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    data: HashMap<String, Vec<u8>>,
    load_count: usize,
    save_count: usize,
    fail_on_load: bool,
    fail_on_save: bool,
}

impl InMemoryConfigStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with a JSON value under `key`.
    pub fn with_json(key: &str, value: &serde_json::Value) -> Self {
        let store = Self::new();
        store.with(|inner| {
            inner
                .data
                .insert(key.to_string(), value.to_string().into_bytes());
        });
        store
    }

    fn with<R>(&self, f: impl FnOnce(&mut Inner) -> R) -> R {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }

    /// Makes every subsequent load fail.
    pub fn set_fail_on_load(&self, fail: bool) {
        self.with(|inner| inner.fail_on_load = fail);
    }

    /// Makes every subsequent save fail.
    pub fn set_fail_on_save(&self, fail: bool) {
        self.with(|inner| inner.fail_on_save = fail);
    }

    /// Load attempts so far, failed ones included.
    pub fn load_count(&self) -> usize {
        self.with(|inner| inner.load_count)
    }

    /// Save attempts so far, failed ones included.
    pub fn save_count(&self) -> usize {
        self.with(|inner| inner.save_count)
    }

    /// Whether a blob is stored under `key`.
    pub fn contains_key(&self, key: &str) -> bool {
        self.with(|inner| inner.data.contains_key(key))
    }
}

impl ConfigStore for InMemoryConfigStore {
    fn load_raw(&self, key: &str) -> Result<Vec<u8>, ConfigError> {
        self.with(|inner| {
            inner.load_count += 1;
            if inner.fail_on_load {
                return Err(ConfigError::Other("simulated load failure".into()));
            }
            inner.data.get(key).cloned().ok_or(ConfigError::NotFound)
        })
    }

    fn save_raw(&self, key: &str, data: &[u8]) -> Result<(), ConfigError> {
        self.with(|inner| {
            inner.save_count += 1;
            if inner.fail_on_save {
                return Err(ConfigError::Other("simulated save failure".into()));
            }
            inner.data.insert(key.to_string(), data.to_vec());
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]
    use super::*;

    #[test]
    fn counts_failed_attempts_and_stores_nothing() {
        let store = InMemoryConfigStore::new();
        store.set_fail_on_save(true);
        assert!(store.save_raw("k", b"v").is_err());
        assert_eq!(store.save_count(), 1);
        assert!(!store.contains_key("k"));
    }

    #[test]
    fn clones_share_state() {
        let a = InMemoryConfigStore::new();
        let b = a.clone();
        a.save_raw("k", b"v").unwrap();
        assert_eq!(b.load_raw("k").unwrap(), b"v");
        b.set_fail_on_load(true);
        assert!(matches!(a.load_raw("k"), Err(ConfigError::Other(_))));
    }

    #[test]
    fn missing_key_is_not_found() {
        let store = InMemoryConfigStore::with_json("engine", &serde_json::json!({}));
        assert!(matches!(store.load_raw("other"), Err(ConfigError::NotFound)));
        assert_eq!(store.load_raw("engine").unwrap(), b"{}");
    }
}
