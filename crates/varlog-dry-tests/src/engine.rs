// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Engine builder for tests.

use varlog_core::{
    Engine, EngineConfig, MemoryMetadata, MemoryVariables, RuleRecord, VariableStore,
};

/// Engine over the in-memory hosts.
pub type TestEngine = Engine<MemoryVariables, MemoryMetadata>;

/// Builds a [`TestEngine`] with seeded variables and rules.
///
/// ```
/// use varlog_dry_tests::EngineTestBuilder;
///
/// let engine = EngineTestBuilder::new()
///     .checkpoint_every(10)
///     .with_var("hp", "50")
///     .build();
/// assert_eq!(engine.value_at("hp"), Some(serde_json::json!(50)));
/// ```
pub struct EngineTestBuilder {
    config: EngineConfig,
    vars: MemoryVariables,
    rules: Vec<(String, RuleRecord)>,
}

impl Default for EngineTestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineTestBuilder {
    /// Default configuration, empty stores.
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            vars: MemoryVariables::new(),
            rules: Vec::new(),
        }
    }

    /// Replaces the whole configuration.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the checkpoint interval (`0` disables checkpoints).
    pub fn checkpoint_every(mut self, every: u64) -> Self {
        self.config.checkpoint_every = every;
        self
    }

    /// Sets the block tag.
    pub fn block_tag(mut self, tag: &str) -> Self {
        self.config.block_tag = tag.to_string();
        self
    }

    /// Seeds a raw root string.
    pub fn with_var(mut self, root: &str, raw: &str) -> Self {
        self.vars.set_scalar(root, raw.to_string());
        self
    }

    /// Seeds a rule, registered through the engine after construction.
    pub fn with_rule(mut self, pattern: &str, rule: RuleRecord) -> Self {
        self.rules.push((pattern.to_string(), rule));
        self
    }

    /// Builds the engine.
    ///
    /// # Panics
    /// Panics if seeding a rule fails, which cannot happen on fresh metadata.
    #[allow(clippy::expect_used)]
    pub fn build(self) -> TestEngine {
        let mut engine = Engine::new(self.config, self.vars, MemoryMetadata::new());
        for (pattern, rule) in &self.rules {
            engine
                .set_rule(pattern, rule)
                .expect("seeding a rule into fresh metadata");
        }
        engine
    }
}
