// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

#![allow(missing_docs)]
#![allow(clippy::unwrap_used, clippy::expect_used)]

use serde_json::json;
use varlog_config::{ConfigError, ConfigStore, EngineSettings, Overrides, ENGINE_KEY};
use varlog_core::EngineConfig;
use varlog_dry_tests::InMemoryConfigStore;

#[test]
fn missing_and_empty_blobs_resolve_to_defaults() {
    let store = InMemoryConfigStore::new();
    let settings = EngineSettings::new(store.clone());
    assert!(settings.load().unwrap().is_none());
    assert_eq!(settings.resolve(&Overrides::default()), EngineConfig::default());

    store.save_raw(ENGINE_KEY, b"").unwrap();
    assert!(settings.load().unwrap().is_none());
}

#[test]
fn partial_blob_keeps_remaining_defaults() {
    let store = InMemoryConfigStore::with_json(ENGINE_KEY, &json!({"block_tag": "vars"}));
    let config = EngineSettings::new(store).load().unwrap().unwrap();
    assert_eq!(config.block_tag, "vars");
    assert_eq!(config.checkpoint_every, 50);
}

#[test]
fn overrides_win_over_stored_values() {
    let store = InMemoryConfigStore::with_json(
        ENGINE_KEY,
        &json!({"block_tag": "vars", "checkpoint_every": 5}),
    );
    let config = EngineSettings::new(store).resolve(&Overrides {
        block_tag: Some("mem".into()),
        checkpoint_every: None,
    });
    assert_eq!(config.block_tag, "mem");
    assert_eq!(config.checkpoint_every, 5);
}

#[test]
fn failing_or_invalid_store_falls_back_to_defaults() {
    let store = InMemoryConfigStore::with_json(ENGINE_KEY, &json!({"block_tag": "vars"}));
    store.set_fail_on_load(true);
    let settings = EngineSettings::new(store.clone());
    assert!(matches!(settings.load(), Err(ConfigError::Other(_))));
    assert_eq!(settings.resolve(&Overrides::default()).block_tag, "state");
    assert_eq!(store.load_count(), 2);

    let invalid = InMemoryConfigStore::with_json(ENGINE_KEY, &json!({"block_tag": ""}));
    let settings = EngineSettings::new(invalid);
    assert!(matches!(
        settings.load(),
        Err(ConfigError::Invalid { field: "block_tag", .. })
    ));
    assert_eq!(settings.resolve(&Overrides::default()), EngineConfig::default());
}

#[test]
fn save_checks_before_writing() {
    let store = InMemoryConfigStore::new();
    let settings = EngineSettings::new(store.clone());
    let bad = EngineConfig {
        advisory_root: String::new(),
        ..EngineConfig::default()
    };
    assert!(settings.save(&bad).is_err());
    assert_eq!(store.save_count(), 0);

    let good = EngineConfig {
        checkpoint_every: 7,
        ..EngineConfig::default()
    };
    settings.save(&good).unwrap();
    assert!(store.contains_key(ENGINE_KEY));
    assert_eq!(settings.load().unwrap(), Some(good));

    store.set_fail_on_save(true);
    assert!(settings.save(&EngineConfig::default()).is_err());
    assert_eq!(store.save_count(), 2);
}
