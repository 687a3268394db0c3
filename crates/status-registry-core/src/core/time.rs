// crates/status-registry-core/src/core/time.rs
// ============================================================================
// Module: Status Registry Time Model
// Description: Canonical timestamp representation for registry records.
// Purpose: Keep record timestamps explicit and replayable.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Registry records never read wall-clock time themselves. Runtime services
//! obtain timestamps from an injected clock, which keeps tests deterministic.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Time Values
// ============================================================================

/// Canonical timestamp used in registry records and audit provenance.
///
/// # Invariants
/// - Values are explicitly provided by callers; the core never reads wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Creates a timestamp from unix epoch milliseconds.
    #[must_use]
    pub const fn from_unix_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns the timestamp as unix epoch milliseconds.
    #[must_use]
    pub const fn as_unix_millis(self) -> i64 {
        self.0
    }
}
