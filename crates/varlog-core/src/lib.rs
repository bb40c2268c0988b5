// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! varlog-core: state mutation engine for DSL blocks embedded in message text.
//!
//! Text flows one way: blocks are extracted, parsed into rules and ops,
//! guarded, applied to the variable store and recorded in a per-floor WAL
//! with periodic checkpoints. Restore runs the other way: checkpoint plus WAL
//! replay reproduces the state for any floor.
//!
//! ```
//! use varlog_core::{Engine, EngineConfig, MemoryMetadata, MemoryVariables};
//!
//! let mut engine = Engine::new(
//!     EngineConfig::default(),
//!     MemoryVariables::new(),
//!     MemoryMetadata::new(),
//! );
//! engine.apply_floor(3, "<state>hp: 50</state>")?;
//! engine.apply_floor(7, "<state>hp: +10</state>")?;
//! assert_eq!(engine.value_at("hp"), Some(serde_json::json!(60)));
//!
//! engine.restore_to_floor(5)?;
//! assert_eq!(engine.value_at("hp"), Some(serde_json::json!(50)));
//! # Ok::<(), varlog_core::EngineError>(())
//! ```
#![forbid(unsafe_code)]
#![allow(
    clippy::must_use_candidate,
    clippy::return_self_not_must_use,
    clippy::missing_const_for_fn,
    clippy::module_name_repetitions,
    clippy::float_cmp
)]

pub mod block;
pub mod config;
pub mod document;
pub mod dsl;
mod engine;
mod error;
pub mod executor;
pub mod guard;
pub mod host;
pub mod ledger;
pub mod path;
pub mod rule;
pub mod value;

/// Block extraction and change signatures.
pub use block::{compute_signature, extract_blocks, find_block_spans, BlockSpan};
/// Engine configuration.
pub use config::EngineConfig;
/// Structural document parsing.
pub use document::{parse_document, parse_flow, DocumentError};
/// DSL parsing.
pub use dsl::{parse_block, Op, OpKind, ParsedBlock};
/// Engine entry points and outcomes.
pub use engine::{ApplyOutcome, Engine, RestoreOutcome, TrimOutcome};
/// Hard failures.
pub use error::EngineError;
/// Atoms.
pub use executor::Atom;
/// Guard verdicts.
pub use guard::{validate, GuardVerdict};
/// Host ports and in-memory hosts.
pub use host::{MemoryMetadata, MemoryVariables, MetadataStore, VariableStore};
/// Persisted history.
pub use ledger::{Checkpoint, CheckpointLog, FloorLog, FloorRecord, LedgerError};
/// Paths.
pub use path::{normalize, split, Segment};
/// Rules.
pub use rule::{RuleEntry, RuleRecord, RuleTable, TypeLock};
/// Value helpers.
pub use value::MutationError;
