// crates/status-registry-core/src/core/bitstring.rs
// ============================================================================
// Module: Status Bitstring
// Description: Fixed-length bit array backing a published status list.
// Purpose: Hold per-credential status bits with MSB-first byte layout.
// Dependencies: bitvec
// ============================================================================

//! ## Overview
//! Index 0 is the left-most (most significant) bit of the first byte, which
//! matches the W3C bitstring layout. The raw byte form pads the final byte
//! with zero bits.

// ============================================================================
// SECTION: Imports
// ============================================================================

use bitvec::order::Msb0;
use bitvec::vec::BitVec;

// ============================================================================
// SECTION: Bitstring
// ============================================================================

/// Fixed-length status bit array.
///
/// # Invariants
/// - Length changes only through [`StatusBitstring::truncate`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatusBitstring {
    /// Bit storage, MSB-first within each byte.
    bits: BitVec<u8, Msb0>,
}

impl StatusBitstring {
    /// Creates a zeroed bitstring of `len` bits.
    #[must_use]
    pub fn zeroed(len: usize) -> Self {
        Self {
            bits: BitVec::repeat(false, len),
        }
    }

    /// Builds a bitstring from raw bytes, using every bit of every byte.
    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            bits: BitVec::from_vec(bytes),
        }
    }

    /// Builds a bitstring from individual bit values.
    #[must_use]
    pub fn from_bools(values: &[bool]) -> Self {
        Self {
            bits: values.iter().copied().collect(),
        }
    }

    /// Returns the length in bits.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    /// Returns true when the bitstring has no bits.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Returns the bit at `index`, or `None` when out of range.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<bool> {
        self.bits.get(index).map(|bit| *bit)
    }

    /// Sets the bit at `index`. Returns false when out of range.
    pub fn set(&mut self, index: usize, value: bool) -> bool {
        if index >= self.bits.len() {
            return false;
        }
        self.bits.set(index, value);
        true
    }

    /// Shortens the bitstring to `len` bits; no-op when already shorter.
    pub fn truncate(&mut self, len: usize) {
        self.bits.truncate(len);
    }

    /// Returns the positions of all set bits in ascending order.
    #[must_use]
    pub fn set_indexes(&self) -> Vec<u64> {
        self.bits.iter_ones().map(|index| index as u64).collect()
    }

    /// Returns the raw bytes, zero-padding the final byte.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bits = self.bits.clone();
        bits.set_uninitialized(false);
        bits.into_vec()
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
