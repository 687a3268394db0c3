// crates/status-registry-core/src/runtime/clock.rs
// ============================================================================
// Module: Runtime Clock
// Description: Injectable time source for registry timestamps.
// Purpose: Keep record timestamps deterministic under test.
// Dependencies: crate::core::time
// ============================================================================

//! ## Overview
//! Services read time only through [`Clock`]. Production uses [`SystemClock`];
//! tests use [`FixedClock`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use crate::core::Timestamp;

// ============================================================================
// SECTION: Clock
// ============================================================================

/// Source of record timestamps.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> Timestamp;
}

/// Wall-clock time source.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
        Timestamp::from_unix_millis(i64::try_from(now.as_millis()).unwrap_or(i64::MAX))
    }
}

/// Clock pinned to a single instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub Timestamp);

impl Clock for FixedClock {
    fn now(&self) -> Timestamp {
        self.0
    }
}
