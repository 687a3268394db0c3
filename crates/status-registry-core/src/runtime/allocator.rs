// crates/status-registry-core/src/runtime/allocator.rs
// ============================================================================
// Module: Status Registry Allocator
// Description: Unique status index allocation, rotation, and publication.
// Purpose: Hand out bit positions without duplicates under concurrent writers.
// Dependencies: crate::{core, interfaces, runtime}, thiserror
// ============================================================================

//! ## Overview
//! [`AllocatorService`] is the single path through which status indices are
//! handed out. Every allocation loads the registry, claims the index at the
//! write cursor, and persists the advanced cursor with a compare-and-swap on
//! `row_version`. A lost race reloads and retries with jittered backoff until
//! the attempt budget or the deadline runs out.
//!
//! Indices are never reclaimed: once a cursor advance is persisted, the index
//! is spent even if the caller fails to record it.
//!
//! Publication helpers live here as well so that status flips are checked
//! against the allocation state before anything reaches the publisher. Each
//! publish is conditional on the revision that was resolved; a revision
//! conflict resolves the bitstring again before retrying.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::core::CodecError;
use crate::core::EncodedBlob;
use crate::core::Encoding;
use crate::core::InvariantViolation;
use crate::core::IssuedCredentialReference;
use crate::core::RegistryId;
use crate::core::RegistryState;
use crate::core::RegistryUri;
use crate::core::StatusBitstring;
use crate::core::StatusRegistry;
use crate::core::codec;
use crate::interfaces::IssuanceLedger;
use crate::interfaces::PublishReceipt;
use crate::interfaces::PublisherError;
use crate::interfaces::RegistryPublisher;
use crate::interfaces::StatusRegistryStore;
use crate::interfaces::StoreError;
use crate::runtime::audit::NoopAuditSink;
use crate::runtime::audit::RegistryAuditEvent;
use crate::runtime::audit::RegistryAuditSink;
use crate::runtime::clock::Clock;
use crate::runtime::clock::SystemClock;
use crate::runtime::retry::RetryPolicy;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Allocator tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocatorConfig {
    /// Retry schedule for compare-and-swap conflicts and transient store errors.
    pub retry: RetryPolicy,
    /// Overall deadline for one allocation call (milliseconds).
    pub timeout_ms: u64,
    /// Rotate automatically when the latest version is full.
    pub auto_rotate: bool,
    /// Text encoding used when publishing bitstrings.
    pub encoding: Encoding,
    /// Retry schedule for publisher outages.
    pub publish_retry: RetryPolicy,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            timeout_ms: 5_000,
            auto_rotate: false,
            encoding: Encoding::default(),
            publish_retry: RetryPolicy::default(),
        }
    }
}

impl AllocatorConfig {
    /// Returns the allocation deadline as a duration.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

// ============================================================================
// SECTION: Requests and Results
// ============================================================================

/// Parameters for creating the first version of a registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRegistryRequest {
    /// Logical registry URI.
    pub uri: RegistryUri,
    /// Bit capacity.
    pub size: u64,
    /// Utilization percentage that marks the registry full.
    pub threshold_percentage: u8,
    /// Storage backend label passed through to the publisher.
    pub storage_type: String,
    /// Whether the published list is encrypted.
    pub encrypted: bool,
    /// Initial metadata.
    pub metadata: BTreeMap<String, Value>,
}

impl CreateRegistryRequest {
    /// Builds a request with empty storage label and metadata.
    #[must_use]
    pub fn new(uri: RegistryUri, size: u64, threshold_percentage: u8) -> Self {
        Self {
            uri,
            size,
            threshold_percentage,
            storage_type: String::new(),
            encrypted: false,
            metadata: BTreeMap::new(),
        }
    }
}

/// A committed allocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    /// Registry version the index belongs to.
    pub registry_id: RegistryId,
    /// Version number of that registry.
    pub version: u64,
    /// Allocated bit position.
    pub index: u64,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Boundary outcome for an allocation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// The same request may succeed later.
    TryAgain,
    /// The registry has no capacity left; an operator must rotate.
    RegistryExhausted,
    /// The request cannot succeed without intervention.
    Fatal,
}

/// Allocation errors.
///
/// # Invariants
/// - Capacity and uniqueness failures are always surfaced, never coerced.
#[derive(Debug, Error)]
pub enum AllocationError {
    /// Capacity exhausted or threshold crossed.
    #[error("status registry {0} is full")]
    RegistryFull(String),
    /// Concurrent writers won every attempt within the budget.
    #[error("allocation conflict on status registry {registry_id} after {attempts} attempts")]
    AllocationConflict {
        /// Registry identifier.
        registry_id: String,
        /// Attempts consumed.
        attempts: u32,
    },
    /// Registry is held by a maintenance job.
    #[error("status registry {0} is under maintenance")]
    RegistryLocked(String),
    /// Registry does not exist.
    #[error("status registry not found: {0}")]
    RegistryNotFound(String),
    /// Registry already exists.
    #[error("status registry already exists: {0}")]
    RegistryExists(String),
    /// Request violates a registry invariant.
    #[error(transparent)]
    Invalid(#[from] InvariantViolation),
    /// Registry store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Issuance ledger failure.
    #[error("issuance ledger error: {0}")]
    Ledger(StoreError),
}

impl AllocationError {
    /// Maps the error to the outcome exposed to issuance callers.
    #[must_use]
    pub const fn disposition(&self) -> Disposition {
        match self {
            Self::RegistryFull(_) => Disposition::RegistryExhausted,
            Self::AllocationConflict {
                ..
            }
            | Self::RegistryLocked(_) => Disposition::TryAgain,
            Self::Store(err) | Self::Ledger(err) => {
                if err.is_transient() || matches!(err, StoreError::Conflict(_)) {
                    Disposition::TryAgain
                } else {
                    Disposition::Fatal
                }
            }
            Self::RegistryNotFound(_) | Self::RegistryExists(_) | Self::Invalid(_) => {
                Disposition::Fatal
            }
        }
    }

    /// Returns true when the allocation loop should reload and retry.
    const fn is_retryable(&self) -> bool {
        match self {
            Self::Store(err) => err.is_transient() || matches!(err, StoreError::Conflict(_)),
            _ => false,
        }
    }
}

/// Publication and status update errors.
#[derive(Debug, Error)]
pub enum PublicationError {
    /// Registry does not exist.
    #[error("status registry not found: {0}")]
    RegistryNotFound(String),
    /// Index was never handed out by the allocator.
    #[error("index {index} of status registry {registry_id} was never allocated")]
    IndexNotAllocated {
        /// Registry identifier.
        registry_id: String,
        /// Rejected index.
        index: u64,
    },
    /// Published bitstring could not be decoded or encoded.
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// Publisher stayed unavailable through every retry.
    #[error("publisher unavailable: {0}")]
    PublisherUnavailable(String),
    /// Publisher rejected the resource.
    #[error("publisher rejected resource: {0}")]
    PublisherRejected(String),
    /// Concurrent publishers moved the resource on every attempt.
    #[error("publisher revision conflict: {0}")]
    PublisherConflict(String),
    /// Registry store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<PublisherError> for PublicationError {
    fn from(err: PublisherError) -> Self {
        match err {
            PublisherError::Unavailable(message) => Self::PublisherUnavailable(message),
            PublisherError::Rejected(message) => Self::PublisherRejected(message),
            PublisherError::Conflict(message) => Self::PublisherConflict(message),
        }
    }
}

// ============================================================================
// SECTION: Allocator Service
// ============================================================================

/// Allocator over an injected registry store, issuance ledger, and publisher.
pub struct AllocatorService<S, L, P> {
    /// Registry record store.
    store: S,
    /// Issuance ledger for credential links.
    ledger: L,
    /// Bitstring publisher.
    publisher: P,
    /// Allocator tuning.
    config: AllocatorConfig,
    /// Audit sink.
    audit: Arc<dyn RegistryAuditSink>,
    /// Time source for new records.
    clock: Arc<dyn Clock>,
}

impl<S, L, P> AllocatorService<S, L, P>
where
    S: StatusRegistryStore,
    L: IssuanceLedger,
    P: RegistryPublisher,
{
    /// Creates an allocator with a no-op audit sink and the system clock.
    #[must_use]
    pub fn new(store: S, ledger: L, publisher: P, config: AllocatorConfig) -> Self {
        Self {
            store,
            ledger,
            publisher,
            config,
            audit: Arc::new(NoopAuditSink),
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the audit sink.
    #[must_use]
    pub fn with_audit(mut self, audit: Arc<dyn RegistryAuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Replaces the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Returns the registry store.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Returns the issuance ledger.
    #[must_use]
    pub const fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Returns the publisher.
    #[must_use]
    pub const fn publisher(&self) -> &P {
        &self.publisher
    }

    /// Returns the allocator configuration.
    #[must_use]
    pub const fn config(&self) -> &AllocatorConfig {
        &self.config
    }

    // ------------------------------------------------------------------------
    // Registry lifecycle
    // ------------------------------------------------------------------------

    /// Creates version 1 of a registry.
    ///
    /// # Errors
    ///
    /// Returns [`AllocationError::RegistryExists`] when any version exists and
    /// [`AllocationError::Invalid`] for a zero size or out-of-range threshold.
    pub fn create_registry(
        &self,
        request: CreateRegistryRequest,
    ) -> Result<StatusRegistry, AllocationError> {
        if self.store.load_latest(&request.uri)?.is_some() {
            return Err(AllocationError::RegistryExists(request.uri.to_string()));
        }
        let mut registry = StatusRegistry::new(
            request.uri,
            1,
            request.size,
            request.threshold_percentage,
            self.clock.now(),
        )?;
        registry.storage_type = request.storage_type;
        registry.encrypted = request.encrypted;
        registry.metadata = request.metadata;
        let stored = match self.store.create(&registry) {
            Ok(stored) => stored,
            Err(StoreError::Conflict(_)) => {
                return Err(AllocationError::RegistryExists(registry.uri.to_string()));
            }
            Err(err) => return Err(err.into()),
        };
        self.audit.record(&RegistryAuditEvent::for_registry(
            self.clock.now(),
            "registry_created",
            &stored,
        ));
        Ok(stored)
    }

    /// Creates the next version of a registry and deprecates the current one.
    ///
    /// When another writer rotated first, the newer version is returned
    /// instead of rotating twice.
    ///
    /// # Errors
    ///
    /// Returns [`AllocationError`] when the registry is missing, held, or
    /// conflicts persist through the retry budget.
    pub fn rotate(&self, uri: &RegistryUri) -> Result<RegistryId, AllocationError> {
        self.rotate_record(uri, None).map(|registry| registry.registry_id)
    }

    /// Rotation returning the stored successor.
    ///
    /// `observed_version` is the version the caller found full. When the
    /// latest version is already newer, it is returned without rotating.
    fn rotate_record(
        &self,
        uri: &RegistryUri,
        observed_version: Option<u64>,
    ) -> Result<StatusRegistry, AllocationError> {
        let policy = self.config.retry;
        let mut attempt = 1;
        loop {
            let latest = self
                .store
                .load_latest(uri)?
                .ok_or_else(|| AllocationError::RegistryNotFound(uri.to_string()))?;
            if let Some(observed) = observed_version
                && latest.version > observed
            {
                return Ok(latest);
            }
            if latest.maintenance.is_some() {
                return Err(AllocationError::RegistryLocked(latest.registry_id.to_string()));
            }
            let mut previous = latest.clone();
            previous.state = RegistryState::Deprecated;
            let mut next = StatusRegistry::new(
                uri.clone(),
                latest.version + 1,
                latest.size,
                latest.threshold_percentage,
                self.clock.now(),
            )?;
            next.storage_type.clone_from(&latest.storage_type);
            next.encrypted = latest.encrypted;
            next.owner_ref.clone_from(&latest.owner_ref);
            next.metadata
                .insert("rotatedFrom".to_string(), Value::String(latest.registry_id.to_string()));
            match self.store.rotate(latest.row_version, &previous, &next) {
                Ok(stored) => {
                    self.audit.record(
                        &RegistryAuditEvent::for_registry(
                            self.clock.now(),
                            "registry_rotated",
                            &stored,
                        )
                        .with_detail(format!("previous={}", latest.registry_id)),
                    );
                    return Ok(stored);
                }
                Err(err) if err.is_transient() || matches!(err, StoreError::Conflict(_)) => {
                    if let Some(current) = self.store.load_latest(uri)?
                        && current.version > latest.version
                    {
                        return Ok(current);
                    }
                    if !policy.allows_retry(attempt) {
                        return Err(AllocationError::AllocationConflict {
                            registry_id: latest.registry_id.to_string(),
                            attempts: attempt,
                        });
                    }
                    thread::sleep(policy.delay_after(attempt));
                    attempt += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    // ------------------------------------------------------------------------
    // Allocation
    // ------------------------------------------------------------------------

    /// Allocates the next free index of a registry version.
    ///
    /// # Errors
    ///
    /// Returns [`AllocationError::RegistryFull`] when the registry is full or
    /// becomes full on load, [`AllocationError::RegistryLocked`] during
    /// maintenance, and [`AllocationError::AllocationConflict`] when the
    /// retry budget or deadline is exhausted.
    pub fn allocate(&self, registry_id: &RegistryId) -> Result<u64, AllocationError> {
        let policy = self.config.retry;
        let deadline = Instant::now() + self.config.timeout();
        let mut attempt = 1;
        loop {
            match self.try_allocate(registry_id, attempt) {
                Ok(index) => return Ok(index),
                Err(err) if err.is_retryable() => {
                    let now = Instant::now();
                    if !policy.allows_retry(attempt) || now >= deadline {
                        self.audit.record(
                            &RegistryAuditEvent::new(self.clock.now(), "allocation_conflict")
                                .with_attempts(attempt)
                                .with_detail(err.to_string()),
                        );
                        return Err(AllocationError::AllocationConflict {
                            registry_id: registry_id.to_string(),
                            attempts: attempt,
                        });
                    }
                    thread::sleep(policy.delay_after(attempt).min(deadline - now));
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// One load/claim/persist pass.
    fn try_allocate(&self, registry_id: &RegistryId, attempt: u32) -> Result<u64, AllocationError> {
        let mut registry = self
            .store
            .load(registry_id)?
            .ok_or_else(|| AllocationError::RegistryNotFound(registry_id.to_string()))?;
        if registry.maintenance.is_some() {
            return Err(AllocationError::RegistryLocked(registry_id.to_string()));
        }
        if registry.state != RegistryState::Active {
            return Err(AllocationError::RegistryFull(registry_id.to_string()));
        }
        let expected = registry.row_version;
        if registry.threshold_reached() {
            return Err(self.mark_full(registry, expected));
        }
        let Some(index) = registry.claim_next() else {
            return Err(self.mark_full(registry, expected));
        };
        if registry.threshold_reached() {
            registry.state = RegistryState::Full;
        }
        let stored = self.store.compare_and_swap(expected, &registry)?;
        self.audit.record(
            &RegistryAuditEvent::for_registry(self.clock.now(), "index_allocated", &stored)
                .with_index(index)
                .with_attempts(attempt),
        );
        if stored.state == RegistryState::Full {
            self.audit.record(&RegistryAuditEvent::for_registry(
                self.clock.now(),
                "registry_full",
                &stored,
            ));
        }
        Ok(index)
    }

    /// Persists an `Active` registry that is already at its threshold as `Full`.
    ///
    /// Returns the error for the caller: `RegistryFull`, or the store error
    /// when the transition itself lost a race.
    fn mark_full(&self, mut registry: StatusRegistry, expected: u64) -> AllocationError {
        registry.state = RegistryState::Full;
        match self.store.compare_and_swap(expected, &registry) {
            Ok(stored) => {
                self.audit.record(
                    &RegistryAuditEvent::for_registry(self.clock.now(), "registry_full", &stored)
                        .with_detail("threshold reached on load"),
                );
                AllocationError::RegistryFull(stored.registry_id.to_string())
            }
            Err(err) => AllocationError::Store(err),
        }
    }

    /// Allocates from the latest version of a registry.
    ///
    /// With `auto_rotate` enabled a full latest version is rotated once and
    /// the allocation is retried on the successor.
    ///
    /// # Errors
    ///
    /// Returns [`AllocationError`] as for [`Self::allocate`] and
    /// [`Self::rotate`].
    pub fn allocate_latest(&self, uri: &RegistryUri) -> Result<Allocation, AllocationError> {
        let latest = self
            .store
            .load_latest(uri)?
            .ok_or_else(|| AllocationError::RegistryNotFound(uri.to_string()))?;
        match self.allocate(&latest.registry_id) {
            Ok(index) => Ok(Allocation {
                registry_id: latest.registry_id,
                version: latest.version,
                index,
            }),
            Err(AllocationError::RegistryFull(_)) if self.config.auto_rotate => {
                let successor = self.rotate_record(uri, Some(latest.version))?;
                let index = self.allocate(&successor.registry_id)?;
                Ok(Allocation {
                    registry_id: successor.registry_id,
                    version: successor.version,
                    index,
                })
            }
            Err(err) => Err(err),
        }
    }

    /// Allocates an index for a credential and records it in the ledger.
    ///
    /// A reference that already holds an index is re-persisted without a new
    /// allocation. On failure the reference's retry count and last error are
    /// updated (and persisted on a best-effort basis) before returning.
    ///
    /// # Errors
    ///
    /// Returns [`AllocationError`] from allocation or
    /// [`AllocationError::Ledger`] when the link cannot be stored.
    pub fn allocate_for_credential(
        &self,
        reference: &mut IssuedCredentialReference,
        uri: &RegistryUri,
    ) -> Result<Allocation, AllocationError> {
        let existing = reference.status_registry_id.clone().zip(reference.status_index);
        let allocation = match existing {
            Some((registry_id, index)) => {
                let registry = self
                    .store
                    .load(&registry_id)?
                    .ok_or_else(|| AllocationError::RegistryNotFound(registry_id.to_string()))?;
                Allocation {
                    registry_id: registry.registry_id,
                    version: registry.version,
                    index,
                }
            }
            None => match self.allocate_latest(uri) {
                Ok(allocation) => allocation,
                Err(err) => {
                    reference.record_failure(err.to_string());
                    if let Err(ledger_err) = self.ledger.upsert(reference) {
                        self.audit.record(
                            &RegistryAuditEvent::for_uri(
                                self.clock.now(),
                                "ledger_write_failed",
                                uri,
                            )
                            .with_detail(format!("failure not recorded: {ledger_err}")),
                        );
                    }
                    return Err(err);
                }
            },
        };
        reference.commit(allocation.registry_id.clone(), allocation.index);
        if let Err(err) = self.ledger.upsert(reference) {
            reference.record_failure(err.to_string());
            return Err(AllocationError::Ledger(err));
        }
        Ok(allocation)
    }

    // ------------------------------------------------------------------------
    // Publication
    // ------------------------------------------------------------------------

    /// Encodes the current status bitstring of a registry version.
    ///
    /// # Errors
    ///
    /// Returns [`PublicationError`] when the registry is missing or the
    /// published bitstring cannot be decoded.
    pub fn encode_registry(&self, registry_id: &RegistryId) -> Result<EncodedBlob, PublicationError> {
        let registry = self.load_for_publication(registry_id)?;
        let (bits, _) = self.current_bits(&registry)?;
        Ok(codec::encode(&bits, self.config.encoding)?)
    }

    /// Publishes the current status bitstring of a registry version.
    ///
    /// # Errors
    ///
    /// Returns [`PublicationError`] when encoding or publication fails.
    pub fn publish(&self, registry_id: &RegistryId) -> Result<PublishReceipt, PublicationError> {
        let registry = self.load_for_publication(registry_id)?;
        let receipt = self.publish_bits(&registry, |_| Ok(()))?;
        self.audit.record(
            &RegistryAuditEvent::for_registry(self.clock.now(), "registry_published", &registry)
                .with_detail(format!("revision={}", receipt.revision)),
        );
        Ok(receipt)
    }

    /// Sets (`revoked = true`) or clears the status bit of an allocated index
    /// and publishes the result.
    ///
    /// # Errors
    ///
    /// Returns [`PublicationError::IndexNotAllocated`] for indices the
    /// allocator never handed out, or any publication failure.
    pub fn update_status(
        &self,
        registry_id: &RegistryId,
        index: u64,
        revoked: bool,
    ) -> Result<PublishReceipt, PublicationError> {
        let registry = self.load_for_publication(registry_id)?;
        let not_allocated = || PublicationError::IndexNotAllocated {
            registry_id: registry_id.to_string(),
            index,
        };
        if !registry.is_allocated(index) {
            return Err(not_allocated());
        }
        let position = usize::try_from(index).map_err(|_| not_allocated())?;
        let receipt = self.publish_bits(&registry, |bits| {
            if bits.set(position, revoked) { Ok(()) } else { Err(not_allocated()) }
        })?;
        self.audit.record(
            &RegistryAuditEvent::for_registry(self.clock.now(), "status_updated", &registry)
                .with_index(index)
                .with_detail(if revoked { "set" } else { "cleared" }),
        );
        Ok(receipt)
    }

    /// Loads a registry for publication.
    fn load_for_publication(
        &self,
        registry_id: &RegistryId,
    ) -> Result<StatusRegistry, PublicationError> {
        self.store
            .load(registry_id)?
            .ok_or_else(|| PublicationError::RegistryNotFound(registry_id.to_string()))
    }

    /// Returns the published bitstring and its revision, or a zeroed list at
    /// revision 0 when nothing is published yet.
    fn current_bits(
        &self,
        registry: &StatusRegistry,
    ) -> Result<(StatusBitstring, u64), PublicationError> {
        match self.publisher.resolve(&registry.resource_uri())? {
            Some(resource) => {
                Ok((codec::decode_exact(&resource.blob, registry.size)?, resource.revision))
            }
            None => {
                let len = usize::try_from(registry.size)
                    .map_err(|_| CodecError::TooLarge {
                        max_bits: codec::MAX_BITSTRING_BITS,
                    })?;
                Ok((StatusBitstring::zeroed(len), 0))
            }
        }
    }

    /// Resolves, mutates, and republishes the bitstring against the resolved
    /// revision.
    ///
    /// A revision conflict means another writer published in between; the
    /// bitstring is resolved again so that writer's bits survive.
    fn publish_bits<F>(
        &self,
        registry: &StatusRegistry,
        mutate: F,
    ) -> Result<PublishReceipt, PublicationError>
    where
        F: Fn(&mut StatusBitstring) -> Result<(), PublicationError>,
    {
        let policy = self.config.retry;
        let mut attempt = 1;
        loop {
            let (mut bits, revision) = self.current_bits(registry)?;
            mutate(&mut bits)?;
            let blob = codec::encode(&bits, self.config.encoding)?;
            match self.publish_with_retry(registry, &blob, revision) {
                Err(PublicationError::PublisherConflict(message))
                    if policy.allows_retry(attempt) =>
                {
                    self.audit.record(
                        &RegistryAuditEvent::for_registry(
                            self.clock.now(),
                            "publish_conflict",
                            registry,
                        )
                        .with_attempts(attempt)
                        .with_detail(message),
                    );
                    thread::sleep(policy.delay_after(attempt));
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    /// Publishes with backoff on [`PublisherError::Unavailable`].
    fn publish_with_retry(
        &self,
        registry: &StatusRegistry,
        blob: &EncodedBlob,
        expected_revision: u64,
    ) -> Result<PublishReceipt, PublicationError> {
        let policy = self.config.publish_retry;
        let resource_uri = registry.resource_uri();
        let mut attempt = 1;
        loop {
            let published =
                self.publisher.publish(&resource_uri, blob, registry.size, Some(expected_revision));
            match published {
                Ok(receipt) => return Ok(receipt),
                Err(PublisherError::Unavailable(message)) if policy.allows_retry(attempt) => {
                    self.audit.record(
                        &RegistryAuditEvent::for_registry(
                            self.clock.now(),
                            "publish_retry",
                            registry,
                        )
                        .with_attempts(attempt)
                        .with_detail(message),
                    );
                    thread::sleep(policy.delay_after(attempt));
                    attempt += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}
