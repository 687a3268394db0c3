// crates/status-registry-core/src/core/hashing.rs
// ============================================================================
// Module: Status Registry Hashing
// Description: SHA-256 digests rendered as lowercase hex.
// Purpose: Derive registry identifiers and integrity checksums.
// Dependencies: sha2, hex
// ============================================================================

//! ## Overview
//! Registry identifiers, publish receipts, and stored revision snapshots all
//! use SHA-256 over raw bytes, rendered as lowercase hex.

// ============================================================================
// SECTION: Imports
// ============================================================================

use sha2::Digest;
use sha2::Sha256;

// ============================================================================
// SECTION: Hashing Helpers
// ============================================================================

/// Hashes raw bytes with SHA-256 and returns the lowercase hex digest.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
