// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Hard failures of an engine call.
//!
//! Per-op problems (parse warnings, guard rejections, structural failures)
//! are never errors; they come back as advisories on the outcome.

use thiserror::Error;

use crate::ledger::LedgerError;

/// Failure that aborts a whole engine call.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Persisted state in the metadata store is unreadable.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}
