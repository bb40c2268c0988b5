// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Shared test doubles and fixtures for varlog crates.
#![forbid(unsafe_code)]
//!
//! - [`config`] - in-memory config store fake
//! - [`engine`] - engine builder over the in-memory hosts
//! - [`fixtures`] - block/message builders and floor scripts

pub mod config;
pub mod engine;
pub mod fixtures;

pub use config::InMemoryConfigStore;
pub use engine::{EngineTestBuilder, TestEngine};
pub use fixtures::{message, state_block, tagged_block, FloorScript};
