// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Persisted engine settings for varlog tools.
//!
//! A [`ConfigStore`] holds raw JSON blobs by key. [`EngineSettings`] reads
//! the `engine` blob into an [`EngineConfig`], checks it, and layers
//! command-line [`Overrides`] on top.
#![forbid(unsafe_code)]

use thiserror::Error;
use varlog_core::EngineConfig;

/// Store key of the engine configuration blob.
pub const ENGINE_KEY: &str = "engine";

/// Storage port for raw config blobs.
pub trait ConfigStore {
    /// Loads the blob stored under `key`; [`ConfigError::NotFound`] when absent.
    fn load_raw(&self, key: &str) -> Result<Vec<u8>, ConfigError>;
    /// Persists `data` under `key`.
    fn save_raw(&self, key: &str, data: &[u8]) -> Result<(), ConfigError>;
}

/// Config load/save failure.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Nothing stored under the key.
    #[error("not found")]
    NotFound,
    /// Underlying I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Blob is not valid JSON for an engine configuration.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
    /// The configuration parsed but cannot drive an engine.
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: &'static str,
    },
    /// Store-specific failure.
    #[error("other: {0}")]
    Other(String),
}

/// Command-line overrides applied after loading.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Overrides {
    /// Replaces `block_tag`.
    pub block_tag: Option<String>,
    /// Replaces `checkpoint_every`.
    pub checkpoint_every: Option<u64>,
}

impl Overrides {
    /// Applies every set override to `config`.
    pub fn apply(&self, config: &mut EngineConfig) {
        if let Some(tag) = &self.block_tag {
            config.block_tag.clone_from(tag);
        }
        if let Some(every) = self.checkpoint_every {
            config.checkpoint_every = every;
        }
    }
}

/// Rejects configurations whose tag or slot names are unusable.
pub fn check(config: &EngineConfig) -> Result<(), ConfigError> {
    let tag = &config.block_tag;
    if tag.is_empty() {
        return Err(ConfigError::Invalid {
            field: "block_tag",
            reason: "must not be empty",
        });
    }
    if tag.chars().any(|c| c.is_whitespace() || c == '<' || c == '>' || c == '/') {
        return Err(ConfigError::Invalid {
            field: "block_tag",
            reason: "must not contain whitespace, '<', '>' or '/'",
        });
    }
    let slots = [
        ("namespace", &config.namespace),
        ("log_key", &config.log_key),
        ("checkpoint_key", &config.checkpoint_key),
        ("rule_table_slot", &config.rule_table_slot),
        ("applied_slot", &config.applied_slot),
        ("advisory_root", &config.advisory_root),
    ];
    for (field, value) in slots {
        if value.is_empty() {
            return Err(ConfigError::Invalid {
                field,
                reason: "must not be empty",
            });
        }
    }
    if config.log_key == config.checkpoint_key {
        return Err(ConfigError::Invalid {
            field: "checkpoint_key",
            reason: "must differ from log_key",
        });
    }
    if config.rule_table_slot == config.applied_slot {
        return Err(ConfigError::Invalid {
            field: "applied_slot",
            reason: "must differ from rule_table_slot",
        });
    }
    Ok(())
}

/// Engine configuration access over a [`ConfigStore`].
pub struct EngineSettings<S> {
    store: S,
}

impl<S: ConfigStore> EngineSettings<S> {
    /// Wraps `store`.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Stored configuration; `Ok(None)` when missing or empty.
    pub fn load(&self) -> Result<Option<EngineConfig>, ConfigError> {
        let bytes = match self.store.load_raw(ENGINE_KEY) {
            Ok(bytes) if bytes.is_empty() => return Ok(None),
            Ok(bytes) => bytes,
            Err(ConfigError::NotFound) => return Ok(None),
            Err(err) => return Err(err),
        };
        let config: EngineConfig = serde_json::from_slice(&bytes)?;
        check(&config)?;
        Ok(Some(config))
    }

    /// Stored configuration with `overrides` applied. A missing, unreadable
    /// or invalid blob yields the defaults; the latter two are logged.
    pub fn resolve(&self, overrides: &Overrides) -> EngineConfig {
        let mut config = match self.load() {
            Ok(Some(config)) => config,
            Ok(None) => EngineConfig::default(),
            Err(err) => {
                tracing::warn!(key = ENGINE_KEY, %err, "engine config unusable; using defaults");
                EngineConfig::default()
            }
        };
        overrides.apply(&mut config);
        config
    }

    /// Checks `config` and stores it as pretty JSON.
    pub fn save(&self, config: &EngineConfig) -> Result<(), ConfigError> {
        check(config)?;
        let data = serde_json::to_vec_pretty(config)?;
        self.store.save_raw(ENGINE_KEY, &data)?;
        tracing::debug!(key = ENGINE_KEY, "engine config saved");
        Ok(())
    }
}
