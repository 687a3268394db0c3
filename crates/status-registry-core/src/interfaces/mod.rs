// crates/status-registry-core/src/interfaces/mod.rs
// ============================================================================
// Module: Status Registry Interfaces
// Description: Backend-agnostic storage, ledger, and publisher contracts.
// Purpose: Define the seams the allocator and reconciliation depend on.
// Dependencies: crate::core, thiserror
// ============================================================================

//! ## Overview
//! The allocator never talks to a database or ledger directly. Registry
//! records go through [`StatusRegistryStore`], whose writes are
//! compare-and-swap on `row_version`; issued credential links go through
//! [`IssuanceLedger`]; published bitstrings go through [`RegistryPublisher`].
//! Implementations must fail closed on missing or invalid data.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::CredentialId;
use crate::core::EncodedBlob;
use crate::core::IssuedCredentialReference;
use crate::core::RegistryId;
use crate::core::RegistryUri;
use crate::core::StatusRegistry;

// ============================================================================
// SECTION: Store Errors
// ============================================================================

/// Registry store and ledger errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
/// - Only `Busy` and `Io` are transient.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Store I/O error.
    #[error("registry store io error: {0}")]
    Io(String),
    /// Store is locked by another writer; retry later.
    #[error("registry store busy: {0}")]
    Busy(String),
    /// Compare-and-swap or uniqueness conflict.
    #[error("registry store conflict: {0}")]
    Conflict(String),
    /// Referenced record does not exist.
    #[error("registry store record not found: {0}")]
    NotFound(String),
    /// Store data is corrupted or fails integrity checks.
    #[error("registry store corruption: {0}")]
    Corrupt(String),
    /// Store data version is incompatible.
    #[error("registry store version mismatch: {0}")]
    VersionMismatch(String),
    /// Write rejected because it would break a registry invariant.
    #[error("registry store invalid data: {0}")]
    Invalid(String),
    /// Store reported an error.
    #[error("registry store error: {0}")]
    Store(String),
}

impl StoreError {
    /// Returns true when retrying the same operation may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Busy(_) | Self::Io(_))
    }
}

// ============================================================================
// SECTION: Registry Store
// ============================================================================

/// Durable storage for status registry records.
///
/// Every mutation is a compare-and-swap against the caller's observed
/// `row_version`, so two writers can never both persist from the same snapshot.
pub trait StatusRegistryStore {
    /// Inserts a new registry version.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when the identifier or the
    /// `(uri, version)` pair already exists, and [`StoreError::Invalid`] when
    /// the record violates an invariant.
    fn create(&self, record: &StatusRegistry) -> Result<StatusRegistry, StoreError>;

    /// Loads a registry version by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn load(&self, registry_id: &RegistryId) -> Result<Option<StatusRegistry>, StoreError>;

    /// Loads the highest version stored under a logical URI.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn load_latest(&self, uri: &RegistryUri) -> Result<Option<StatusRegistry>, StoreError>;

    /// Lists every version under a logical URI in ascending version order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn list_versions(&self, uri: &RegistryUri) -> Result<Vec<StatusRegistry>, StoreError>;

    /// Persists `record` if the stored row still has `expected_row_version`.
    ///
    /// Returns the stored record with its incremented `row_version`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] on a row version mismatch,
    /// [`StoreError::NotFound`] when the row is missing, and
    /// [`StoreError::Invalid`] for invariant or lifecycle violations.
    fn compare_and_swap(
        &self,
        expected_row_version: u64,
        record: &StatusRegistry,
    ) -> Result<StatusRegistry, StoreError>;

    /// Atomically persists `previous` (compare-and-swap) and inserts `next`.
    ///
    /// Returns the stored successor.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when the predecessor changed or the
    /// successor version already exists; nothing is written in that case.
    fn rotate(
        &self,
        expected_row_version: u64,
        previous: &StatusRegistry,
        next: &StatusRegistry,
    ) -> Result<StatusRegistry, StoreError>;

    /// Reports store readiness.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store is unavailable.
    fn readiness(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

// ============================================================================
// SECTION: Issuance Ledger
// ============================================================================

/// Issuance-side storage of credential status links.
pub trait IssuanceLedger {
    /// Inserts or replaces a credential reference.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when another credential already holds
    /// the same registry index.
    fn upsert(&self, reference: &IssuedCredentialReference) -> Result<(), StoreError>;

    /// Loads a credential reference.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn get(
        &self,
        credential_id: &CredentialId,
    ) -> Result<Option<IssuedCredentialReference>, StoreError>;

    /// Lists every credential reference bound to a registry version.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the ledger cannot be read.
    fn references_for(
        &self,
        registry_id: &RegistryId,
    ) -> Result<Vec<IssuedCredentialReference>, StoreError>;
}

// ============================================================================
// SECTION: Registry Publisher
// ============================================================================

/// Publisher adapter errors.
///
/// # Invariants
/// - `Unavailable` is transient and retried at the call site.
/// - `Conflict` means the resource moved past the expected revision; the
///   caller must resolve again before publishing.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PublisherError {
    /// Publisher could not be reached.
    #[error("publisher unavailable: {0}")]
    Unavailable(String),
    /// Resource revision did not match the expected revision.
    #[error("publisher revision conflict: {0}")]
    Conflict(String),
    /// Publisher refused the resource.
    #[error("publisher rejected resource: {0}")]
    Rejected(String),
}

/// A resolved, previously published bitstring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedResource {
    /// Address the resource was resolved from.
    pub resource_uri: String,
    /// Encoded bitstring.
    pub blob: EncodedBlob,
    /// Bit length recorded in resource metadata, when the publisher keeps one.
    pub declared_length: Option<u64>,
    /// Publisher-assigned revision.
    pub revision: u64,
}

/// Acknowledgement returned after publishing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishReceipt {
    /// Address the resource was published under.
    pub resource_uri: String,
    /// Publisher-assigned revision.
    pub revision: u64,
    /// SHA-256 hex digest of the encoded payload.
    pub checksum: String,
}

/// Narrow publication boundary (for example a DID-linked resource).
pub trait RegistryPublisher {
    /// Resolves the latest resource published under `resource_uri`.
    ///
    /// # Errors
    ///
    /// Returns [`PublisherError`] when the publisher cannot be queried.
    fn resolve(&self, resource_uri: &str) -> Result<Option<PublishedResource>, PublisherError>;

    /// Publishes `blob` under `resource_uri`.
    ///
    /// With `expected_revision` set, the write only succeeds when the current
    /// revision equals it; `Some(0)` means nothing is published yet. `None`
    /// publishes unconditionally.
    ///
    /// # Errors
    ///
    /// Returns [`PublisherError::Conflict`] when the revision moved and
    /// another [`PublisherError`] when publication fails.
    fn publish(
        &self,
        resource_uri: &str,
        blob: &EncodedBlob,
        declared_length: u64,
        expected_revision: Option<u64>,
    ) -> Result<PublishReceipt, PublisherError>;
}

// ============================================================================
// SECTION: Write Validation
// ============================================================================

/// Checks a compare-and-swap write against the currently stored row.
///
/// Shared by every [`StatusRegistryStore`] backend so the same rules hold
/// regardless of storage: row versions must match, identity and capacity are
/// immutable, lifecycle only moves forward, and record invariants hold.
///
/// # Errors
///
/// Returns [`StoreError::Conflict`] on a row version mismatch and
/// [`StoreError::Invalid`] for every other violation.
pub fn check_registry_write(
    current: &StatusRegistry,
    expected_row_version: u64,
    next: &StatusRegistry,
) -> Result<(), StoreError> {
    if current.row_version != expected_row_version {
        return Err(StoreError::Conflict(format!(
            "registry {} row version is {}, expected {expected_row_version}",
            current.registry_id, current.row_version
        )));
    }
    if current.registry_id != next.registry_id
        || current.uri != next.uri
        || current.version != next.version
    {
        return Err(StoreError::Invalid("registry identity is immutable".to_string()));
    }
    if current.size != next.size {
        return Err(StoreError::Invalid("registry size is immutable".to_string()));
    }
    if !current.state.can_transition_to(next.state) {
        return Err(StoreError::Invalid(format!(
            "illegal registry transition {} -> {}",
            current.state.as_str(),
            next.state.as_str()
        )));
    }
    next.validate().map_err(|err| StoreError::Invalid(err.to_string()))
}
