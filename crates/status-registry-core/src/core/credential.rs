// crates/status-registry-core/src/core/credential.rs
// ============================================================================
// Module: Issued Credential Reference
// Description: Issuance-side record linking a credential to a status index.
// Purpose: Carry the only credential fields the allocator core depends on.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! The issuance collaborator owns credential storage. The allocator needs only
//! the registry link, the committed index, and retry bookkeeping.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::CredentialId;
use crate::core::identifiers::RegistryId;

// ============================================================================
// SECTION: Credential Reference
// ============================================================================

/// Status allocation fields of an issued credential.
///
/// # Invariants
/// - `status_index` is `None` until an allocation commits.
/// - `status_registry_id` is set whenever `status_index` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedCredentialReference {
    /// Credential identifier.
    pub credential_id: CredentialId,
    /// Registry version holding the credential's bit.
    pub status_registry_id: Option<RegistryId>,
    /// Committed bit position.
    pub status_index: Option<u64>,
    /// Failed allocation attempts so far.
    pub retry_count: u32,
    /// Last allocation error message.
    pub last_error: Option<String>,
}

impl IssuedCredentialReference {
    /// Creates a reference that has not been allocated yet.
    #[must_use]
    pub const fn pending(credential_id: CredentialId) -> Self {
        Self {
            credential_id,
            status_registry_id: None,
            status_index: None,
            retry_count: 0,
            last_error: None,
        }
    }

    /// Creates a reference already bound to an index.
    #[must_use]
    pub const fn allocated(credential_id: CredentialId, registry_id: RegistryId, index: u64) -> Self {
        Self {
            credential_id,
            status_registry_id: Some(registry_id),
            status_index: Some(index),
            retry_count: 0,
            last_error: None,
        }
    }

    /// Binds the credential to a committed index.
    pub fn commit(&mut self, registry_id: RegistryId, index: u64) {
        self.status_registry_id = Some(registry_id);
        self.status_index = Some(index);
        self.last_error = None;
    }

    /// Records a failed allocation attempt.
    pub fn record_failure(&mut self, error: impl Into<String>) {
        self.retry_count = self.retry_count.saturating_add(1);
        self.last_error = Some(error.into());
    }

    /// Returns true when the credential holds an index.
    #[must_use]
    pub const fn is_allocated(&self) -> bool {
        self.status_index.is_some()
    }
}
