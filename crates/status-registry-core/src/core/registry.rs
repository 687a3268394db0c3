// crates/status-registry-core/src/core/registry.rs
// ============================================================================
// Module: Status Registry Record
// Description: Durable allocation state of one status list version.
// Purpose: Encode capacity, fill frontier, lifecycle, and invariants.
// Dependencies: serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! A [`StatusRegistry`] records which bit positions of one status list
//! version have been handed out. Positions `[0, write_cursor)` form an
//! unbroken allocated prefix; positions allocated out of order live in
//! `additional_used_indexes`. Records are mutated only through
//! compare-and-swap writes keyed on `row_version`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::core::identifiers::IdentifierError;
use crate::core::identifiers::RegistryId;
use crate::core::identifiers::RegistryUri;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Enums
// ============================================================================

/// Status list flavor published for a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RegistryType {
    /// W3C Bitstring Status List.
    BitstringStatusList,
    /// Status List 2021 with revocation purpose.
    StatusList2021Revocation,
    /// Status List 2021 with suspension purpose.
    StatusList2021Suspension,
}

impl RegistryType {
    /// Returns the stable wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BitstringStatusList => "BitstringStatusList",
            Self::StatusList2021Revocation => "StatusList2021Revocation",
            Self::StatusList2021Suspension => "StatusList2021Suspension",
        }
    }
}

impl fmt::Display for RegistryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RegistryType {
    type Err = IdentifierError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "BitstringStatusList" => Ok(Self::BitstringStatusList),
            "StatusList2021Revocation" => Ok(Self::StatusList2021Revocation),
            "StatusList2021Suspension" => Ok(Self::StatusList2021Suspension),
            other => Err(IdentifierError::UnknownType(other.to_string())),
        }
    }
}

/// Lifecycle state of a registry version.
///
/// # Invariants
/// - Transitions only move forward: `Active -> Full -> Deprecated` or
///   `Active -> Deprecated`. Nothing leaves `Deprecated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistryState {
    /// Accepting allocations.
    Active,
    /// Utilization reached the threshold; readable and publishable only.
    Full,
    /// Superseded by a newer version.
    Deprecated,
}

impl RegistryState {
    /// Returns the stable label used in storage and audit events.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Full => "full",
            Self::Deprecated => "deprecated",
        }
    }

    /// Returns true when a transition from `self` to `next` is permitted.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Active | Self::Full, Self::Deprecated)
                | (Self::Active, Self::Full | Self::Active)
                | (Self::Full, Self::Full)
                | (Self::Deprecated, Self::Deprecated)
        )
    }
}

impl FromStr for RegistryState {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "active" => Ok(Self::Active),
            "full" => Ok(Self::Full),
            "deprecated" => Ok(Self::Deprecated),
            other => Err(format!("unknown registry state: {other}")),
        }
    }
}

// ============================================================================
// SECTION: Invariant Violations
// ============================================================================

/// Registry invariant violations detected on construction or write.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    /// Capacity must be at least one bit.
    #[error("registry size must be at least 1")]
    SizeZero,
    /// Capacity exceeds the codec maximum.
    #[error("registry size {size} exceeds maximum {max}")]
    SizeTooLarge {
        /// Requested size.
        size: u64,
        /// Maximum supported size.
        max: u64,
    },
    /// Write cursor exceeds capacity.
    #[error("write cursor {cursor} exceeds size {size}")]
    CursorBeyondSize {
        /// Write cursor.
        cursor: u64,
        /// Capacity.
        size: u64,
    },
    /// Threshold outside 1..=100.
    #[error("threshold percentage {0} outside 1..=100")]
    ThresholdOutOfRange(u8),
    /// Out-of-order index overlaps the allocated prefix.
    #[error("additional index {index} is not beyond write cursor {cursor}")]
    IndexOverlapsPrefix {
        /// Offending index.
        index: u64,
        /// Write cursor.
        cursor: u64,
    },
    /// Out-of-order index beyond capacity.
    #[error("index {index} outside capacity {size}")]
    IndexOutOfCapacity {
        /// Offending index.
        index: u64,
        /// Capacity.
        size: u64,
    },
    /// Versions start at 1.
    #[error("registry version must be at least 1")]
    VersionZero,
}

// ============================================================================
// SECTION: Registry Record
// ============================================================================

/// Exclusive maintenance hold taken by reconciliation.
///
/// # Invariants
/// - While present, the allocator refuses to hand out indices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceHold {
    /// Identifier of the job holding the registry.
    pub holder: String,
    /// Time the hold was acquired.
    pub acquired_at: Timestamp,
}

/// Durable allocation record for one status list version.
///
/// # Invariants
/// - `1 <= size <= MAX_BITSTRING_BITS` and `write_cursor <= size`.
/// - Every entry in `additional_used_indexes` is `> write_cursor` and `< size`.
/// - `row_version` increases by one on every persisted write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRegistry {
    /// Primary key of this version.
    pub registry_id: RegistryId,
    /// Logical address shared by all versions.
    pub uri: RegistryUri,
    /// Version number of this list under `uri`.
    pub version: u64,
    /// Bit capacity fixed at creation.
    pub size: u64,
    /// End of the unbroken allocated prefix.
    pub write_cursor: u64,
    /// Indices allocated out of order beyond the prefix.
    pub additional_used_indexes: BTreeSet<u64>,
    /// Lifecycle state.
    pub state: RegistryState,
    /// Utilization percentage that marks the registry full.
    pub threshold_percentage: u8,
    /// Storage backend label passed through to the publisher.
    pub storage_type: String,
    /// Whether the published list is encrypted.
    pub encrypted: bool,
    /// Owning account reference.
    pub owner_ref: String,
    /// Creation time.
    pub created_at: Timestamp,
    /// Free-form provenance metadata.
    pub metadata: BTreeMap<String, Value>,
    /// Active maintenance hold, if any.
    pub maintenance: Option<MaintenanceHold>,
    /// Optimistic concurrency token.
    pub row_version: u64,
}

impl StatusRegistry {
    /// Creates a fresh `Active` registry version with an empty allocation state.
    ///
    /// # Errors
    ///
    /// Returns [`InvariantViolation`] when size, threshold, or version are invalid.
    pub fn new(
        uri: RegistryUri,
        version: u64,
        size: u64,
        threshold_percentage: u8,
        created_at: Timestamp,
    ) -> Result<Self, InvariantViolation> {
        let registry = Self {
            registry_id: RegistryId::derive(&uri, version),
            owner_ref: uri.owner().to_string(),
            uri,
            version,
            size,
            write_cursor: 0,
            additional_used_indexes: BTreeSet::new(),
            state: RegistryState::Active,
            threshold_percentage,
            storage_type: String::new(),
            encrypted: false,
            created_at,
            metadata: BTreeMap::new(),
            maintenance: None,
            row_version: 1,
        };
        registry.validate()?;
        Ok(registry)
    }

    /// Returns the registry type carried by the URI.
    #[must_use]
    pub const fn registry_type(&self) -> RegistryType {
        self.uri.registry_type()
    }

    /// Returns the publication address of this version.
    #[must_use]
    pub fn resource_uri(&self) -> String {
        self.uri.resource_uri(self.version)
    }

    /// Returns the number of allocated indices.
    #[must_use]
    pub fn used_count(&self) -> u64 {
        self.write_cursor.saturating_add(self.additional_used_indexes.len() as u64)
    }

    /// Returns true once utilization meets the threshold percentage.
    #[must_use]
    pub fn threshold_reached(&self) -> bool {
        u128::from(self.used_count()) * 100
            >= u128::from(self.threshold_percentage) * u128::from(self.size)
    }

    /// Returns the floor of the utilization percentage.
    #[must_use]
    pub fn utilization_percent(&self) -> u64 {
        if self.size == 0 {
            return 100;
        }
        let percent = u128::from(self.used_count()) * 100 / u128::from(self.size);
        u64::try_from(percent).unwrap_or(u64::MAX)
    }

    /// Returns true when `index` has been handed out.
    #[must_use]
    pub fn is_allocated(&self, index: u64) -> bool {
        index < self.write_cursor || self.additional_used_indexes.contains(&index)
    }

    /// Claims the index at the write cursor and advances past it.
    ///
    /// Out-of-order entries that become contiguous with the new cursor are
    /// folded into the prefix. Returns `None` when the cursor is at capacity.
    pub fn claim_next(&mut self) -> Option<u64> {
        let candidate = self.write_cursor;
        if candidate >= self.size {
            return None;
        }
        self.write_cursor = candidate + 1;
        self.absorb_contiguous();
        Some(candidate)
    }

    /// Folds out-of-order entries adjacent to the cursor into the prefix.
    pub fn absorb_contiguous(&mut self) {
        while self.additional_used_indexes.remove(&self.write_cursor) {
            self.write_cursor += 1;
        }
        let cursor = self.write_cursor;
        self.additional_used_indexes.retain(|index| *index > cursor);
    }

    /// Validates the record invariants.
    ///
    /// # Errors
    ///
    /// Returns the first [`InvariantViolation`] found.
    pub fn validate(&self) -> Result<(), InvariantViolation> {
        if self.version == 0 {
            return Err(InvariantViolation::VersionZero);
        }
        if self.size == 0 {
            return Err(InvariantViolation::SizeZero);
        }
        if self.size > crate::core::codec::MAX_BITSTRING_BITS {
            return Err(InvariantViolation::SizeTooLarge {
                size: self.size,
                max: crate::core::codec::MAX_BITSTRING_BITS,
            });
        }
        if !(1 ..= 100).contains(&self.threshold_percentage) {
            return Err(InvariantViolation::ThresholdOutOfRange(self.threshold_percentage));
        }
        if self.write_cursor > self.size {
            return Err(InvariantViolation::CursorBeyondSize {
                cursor: self.write_cursor,
                size: self.size,
            });
        }
        for index in &self.additional_used_indexes {
            if *index <= self.write_cursor {
                return Err(InvariantViolation::IndexOverlapsPrefix {
                    index: *index,
                    cursor: self.write_cursor,
                });
            }
            if *index >= self.size {
                return Err(InvariantViolation::IndexOutOfCapacity {
                    index: *index,
                    size: self.size,
                });
            }
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, reason = "Test-only assertions are permitted.")]

    use super::InvariantViolation;
    use super::RegistryState;
    use super::RegistryType;
    use super::StatusRegistry;
    use crate::core::identifiers::RegistryUri;
    use crate::core::time::Timestamp;

    fn registry(size: u64, threshold: u8) -> StatusRegistry {
        let uri = RegistryUri::new("did:example:1", "list", RegistryType::BitstringStatusList)
            .expect("uri");
        StatusRegistry::new(uri, 1, size, threshold, Timestamp::from_unix_millis(0))
            .expect("registry")
    }

    #[test]
    fn claim_next_absorbs_out_of_order_entries() {
        let mut record = registry(10, 100);
        record.write_cursor = 2;
        record.additional_used_indexes.extend([3, 4, 7]);
        assert_eq!(record.claim_next(), Some(2));
        assert_eq!(record.write_cursor, 5);
        assert_eq!(record.additional_used_indexes.iter().copied().collect::<Vec<_>>(), vec![7]);
        assert!(record.validate().is_ok());
    }

    #[test]
    fn claim_next_stops_at_capacity() {
        let mut record = registry(2, 100);
        assert_eq!(record.claim_next(), Some(0));
        assert_eq!(record.claim_next(), Some(1));
        assert_eq!(record.claim_next(), None);
        assert_eq!(record.write_cursor, 2);
    }

    #[test]
    fn threshold_uses_prefix_and_additional_indexes() {
        let mut record = registry(10, 80);
        record.write_cursor = 6;
        assert!(!record.threshold_reached());
        record.additional_used_indexes.insert(9);
        assert!(!record.threshold_reached());
        record.additional_used_indexes.insert(8);
        assert!(record.threshold_reached());
        assert_eq!(record.utilization_percent(), 80);
    }

    #[test]
    fn validate_rejects_broken_invariants() {
        let mut record = registry(10, 80);
        record.write_cursor = 4;
        record.additional_used_indexes.insert(3);
        assert!(matches!(record.validate(), Err(InvariantViolation::IndexOverlapsPrefix { .. })));
        record.additional_used_indexes.clear();
        record.additional_used_indexes.insert(10);
        assert!(matches!(record.validate(), Err(InvariantViolation::IndexOutOfCapacity { .. })));
        let uri = RegistryUri::new("did:example:1", "list", RegistryType::BitstringStatusList)
            .expect("uri");
        assert!(matches!(
            StatusRegistry::new(uri.clone(), 1, 0, 50, Timestamp::from_unix_millis(0)),
            Err(InvariantViolation::SizeZero)
        ));
        assert!(matches!(
            StatusRegistry::new(uri, 1, 10, 0, Timestamp::from_unix_millis(0)),
            Err(InvariantViolation::ThresholdOutOfRange(0))
        ));
    }

    #[test]
    fn deprecated_is_terminal() {
        assert!(RegistryState::Active.can_transition_to(RegistryState::Full));
        assert!(RegistryState::Full.can_transition_to(RegistryState::Deprecated));
        assert!(!RegistryState::Deprecated.can_transition_to(RegistryState::Active));
        assert!(!RegistryState::Full.can_transition_to(RegistryState::Active));
    }
}
