// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Message builders and floor scripts.

use varlog_core::{ApplyOutcome, EngineError, MetadataStore, VariableStore};

use crate::engine::TestEngine;

/// Wraps `body` in `<state>` tags.
pub fn state_block(body: &str) -> String {
    tagged_block("state", body)
}

/// Wraps `body` in `<tag>` tags.
pub fn tagged_block(tag: &str, body: &str) -> String {
    format!("<{tag}>\n{body}\n</{tag}>")
}

/// A chat message: prose followed by one `<state>` block.
pub fn message(prose: &str, body: &str) -> String {
    format!("{prose}\n\n{}", state_block(body))
}

/// Ordered list of `(floor, text)` to feed an engine.
#[derive(Clone, Debug, Default)]
pub struct FloorScript {
    floors: Vec<(u64, String)>,
}

impl FloorScript {
    /// Empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a floor whose text is one `<state>` block around `body`.
    pub fn block(mut self, floor: u64, body: &str) -> Self {
        self.floors.push((floor, state_block(body)));
        self
    }

    /// Adds a floor with verbatim text.
    pub fn raw(mut self, floor: u64, text: &str) -> Self {
        self.floors.push((floor, text.to_string()));
        self
    }

    /// Floors in insertion order.
    pub fn floors(&self) -> &[(u64, String)] {
        &self.floors
    }

    /// Highest floor in the script.
    pub fn last_floor(&self) -> Option<u64> {
        self.floors.iter().map(|(f, _)| *f).max()
    }

    /// Applies every floor in order and returns the outcomes.
    pub fn apply<V, M>(
        &self,
        engine: &mut varlog_core::Engine<V, M>,
    ) -> Result<Vec<ApplyOutcome>, EngineError>
    where
        V: VariableStore,
        M: MetadataStore,
    {
        self.floors
            .iter()
            .map(|(floor, text)| engine.apply_floor(*floor, text))
            .collect()
    }

    /// Fresh default engine with the whole script applied.
    pub fn run(&self) -> Result<TestEngine, EngineError> {
        let mut engine = crate::EngineTestBuilder::new().build();
        self.apply(&mut engine)?;
        Ok(engine)
    }
}
