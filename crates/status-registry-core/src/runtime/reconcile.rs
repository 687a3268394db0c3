// crates/status-registry-core/src/runtime/reconcile.rs
// ============================================================================
// Module: Status Registry Reconciliation
// Description: Rebuild allocation state from issued credential records.
// Purpose: Recover or migrate registries without reusing issued indices.
// Dependencies: crate::{core, interfaces, runtime}, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Reconciliation rebuilds a registry's `write_cursor` and
//! `additional_used_indexes` from the indices that issued credentials
//! actually hold. The issuance ledger is the preferred source; when it is
//! unreachable, the set bits of the published bitstring plus caller-supplied
//! indices are used instead.
//!
//! The rebuilt prefix is the longest unbroken run that starts at the lowest
//! observed index (not at zero). Every index below that anchor is treated as
//! part of the prefix and is never handed out again.
//!
//! A run holds the registry's maintenance hold from the first read until the
//! rebuilt state is written, so live allocation cannot interleave with it.
//! A hold older than the hold TTL belongs to a crashed run and is taken over;
//! an operator can also clear a named holder with
//! [`ReconciliationEngine::break_hold`].
//!
//! # Invariants
//! - Running reconciliation twice on unchanged inputs yields identical
//!   allocation state.
//! - Batch runs never abort on a single failing item.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::core::CapacityEstimate;
use crate::core::CapacitySource;
use crate::core::CodecError;
use crate::core::CredentialId;
use crate::core::DEFAULT_CAPACITY_BITS;
use crate::core::InvariantViolation;
use crate::core::MaintenanceHold;
use crate::core::RegistryId;
use crate::core::RegistryState;
use crate::core::RegistryUri;
use crate::core::StatusRegistry;
use crate::core::codec;
use crate::interfaces::IssuanceLedger;
use crate::interfaces::PublisherError;
use crate::interfaces::RegistryPublisher;
use crate::interfaces::StatusRegistryStore;
use crate::interfaces::StoreError;
use crate::runtime::audit::NoopAuditSink;
use crate::runtime::audit::RegistryAuditEvent;
use crate::runtime::audit::RegistryAuditSink;
use crate::runtime::clock::Clock;
use crate::runtime::clock::SystemClock;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default maintenance hold owner.
const DEFAULT_HOLDER: &str = "reconciliation";
/// Default age after which a maintenance hold is considered abandoned (15 minutes).
pub const DEFAULT_HOLD_TTL_MS: u64 = 15 * 60 * 1_000;
/// Default threshold for registries created by migration.
const DEFAULT_MIGRATION_THRESHOLD: u8 = 80;

/// Metadata key: system the registry was migrated from.
pub const META_MIGRATED_FROM: &str = "migratedFrom";
/// Metadata key: number of source records consulted.
pub const META_SOURCE_RECORD_COUNT: &str = "sourceRecordCount";
/// Metadata key: index source used by the last run.
pub const META_RECONCILED_SOURCE: &str = "reconciledSource";
/// Metadata key: time of the last run (unix milliseconds).
pub const META_RECONCILED_AT: &str = "reconciledAt";
/// Metadata key: how the capacity of a migrated registry was determined.
pub const META_CAPACITY_SOURCE: &str = "capacitySource";

// ============================================================================
// SECTION: Types
// ============================================================================

/// Where reconciled indices came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexSource {
    /// Issued credential records in the issuance ledger.
    Ledger,
    /// Set bits of the published bitstring plus supplemental indices.
    PublishedBitstring,
}

impl IndexSource {
    /// Returns the stable label written to metadata.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ledger => "ledger",
            Self::PublishedBitstring => "published_bitstring",
        }
    }
}

/// Kind of inconsistency found in the source records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MismatchKind {
    /// Two credentials claim the same index.
    Duplicate,
    /// Index lies outside the registry capacity.
    OutOfCapacity,
}

/// A per-index inconsistency recorded during reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationMismatch {
    /// Mismatch kind.
    pub kind: MismatchKind,
    /// Offending index.
    pub index: u64,
    /// Credential that carried the index, when known.
    pub credential_id: Option<CredentialId>,
}

/// Reconciliation request for one registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileRequest {
    /// Logical registry URI.
    pub uri: RegistryUri,
    /// Version to reconcile; the latest when `None`.
    pub version: Option<u64>,
    /// Out-of-band indices used with the published bitstring fallback.
    pub supplemental_indexes: Vec<u64>,
    /// Provenance label recorded as `migratedFrom`.
    pub migrated_from: Option<String>,
}

impl ReconcileRequest {
    /// Builds a request for the latest version of `uri`.
    #[must_use]
    pub const fn new(uri: RegistryUri) -> Self {
        Self {
            uri,
            version: None,
            supplemental_indexes: Vec::new(),
            migrated_from: None,
        }
    }
}

/// Migration request: ensure a registry exists, then reconcile it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationRequest {
    /// Logical registry URI.
    pub uri: RegistryUri,
    /// Capacity for the registry if it must be created.
    pub size: Option<u64>,
    /// Threshold for the registry if it must be created.
    pub threshold_percentage: u8,
    /// Source system label recorded as `migratedFrom`.
    pub migrated_from: String,
    /// Out-of-band indices used with the published bitstring fallback.
    pub supplemental_indexes: Vec<u64>,
}

impl MigrationRequest {
    /// Builds a request with an inferred size and the default threshold.
    #[must_use]
    pub fn new(uri: RegistryUri, migrated_from: impl Into<String>) -> Self {
        Self {
            uri,
            size: None,
            threshold_percentage: DEFAULT_MIGRATION_THRESHOLD,
            migrated_from: migrated_from.into(),
            supplemental_indexes: Vec::new(),
        }
    }
}

/// Result of reconciling one registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileOutcome {
    /// Reconciled registry version.
    pub registry_id: RegistryId,
    /// Version number.
    pub version: u64,
    /// Rebuilt write cursor.
    pub write_cursor: u64,
    /// Rebuilt out-of-order indices.
    pub additional_used_indexes: BTreeSet<u64>,
    /// Index source used.
    pub source: IndexSource,
    /// Number of source records consulted.
    pub source_record_count: u64,
    /// Inconsistencies found and excluded.
    pub mismatches: Vec<ReconciliationMismatch>,
    /// True when the rebuilt cursor is lower than the stored one.
    pub cursor_reset: bool,
}

/// Batch pacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Items per batch.
    pub batch_size: usize,
    /// Pause between batches (milliseconds).
    pub inter_batch_delay_ms: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            inter_batch_delay_ms: 250,
        }
    }
}

/// A batch item that failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchItemFailure {
    /// Registry URI of the item.
    pub uri: String,
    /// Error message.
    pub error: String,
}

/// Summary of a batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    /// Successful outcomes in input order.
    pub outcomes: Vec<ReconcileOutcome>,
    /// Failed items in input order.
    pub failures: Vec<BatchItemFailure>,
    /// Number of batches executed.
    pub batches: usize,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Reconciliation errors.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Registry does not exist.
    #[error("status registry not found: {0}")]
    RegistryNotFound(String),
    /// Registry is already held by another maintenance job.
    #[error("status registry {registry_id} is held by {holder}")]
    RegistryLocked {
        /// Registry identifier.
        registry_id: String,
        /// Current holder.
        holder: String,
    },
    /// Neither the ledger nor the published bitstring could be read.
    #[error("no index source available: {0}")]
    SourcesUnavailable(String),
    /// Published bitstring could not be decoded.
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// Registry record would violate an invariant.
    #[error(transparent)]
    Invalid(#[from] InvariantViolation),
    /// Registry store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

// ============================================================================
// SECTION: Allocation Rebuild
// ============================================================================

/// Rebuilds `(write_cursor, additional_used_indexes)` from observed indices.
///
/// Indices are deduplicated and sorted. The prefix is the longest run
/// `run[i] == run[0] + i` starting at the lowest index; the cursor is one
/// past its end and every other index is additional. No indices yields a
/// zero cursor.
#[must_use]
pub fn rebuild_allocation(indexes: &[u64]) -> (u64, BTreeSet<u64>) {
    let sorted: BTreeSet<u64> = indexes.iter().copied().collect();
    let Some(first) = sorted.first().copied() else {
        return (0, BTreeSet::new());
    };
    let mut cursor = first;
    for index in &sorted {
        if *index != cursor {
            break;
        }
        cursor += 1;
    }
    let additional = sorted.into_iter().filter(|index| *index > cursor).collect();
    (cursor, additional)
}

/// Indices gathered from one source.
struct CollectedIndexes {
    /// Source used.
    source: IndexSource,
    /// In-capacity indices (may repeat).
    indexes: Vec<u64>,
    /// Records consulted.
    record_count: u64,
    /// Excluded entries.
    mismatches: Vec<ReconciliationMismatch>,
}

// ============================================================================
// SECTION: Reconciliation Engine
// ============================================================================

/// Offline reconciliation and migration engine.
pub struct ReconciliationEngine<S, L, P> {
    /// Registry record store.
    store: S,
    /// Issuance ledger.
    ledger: L,
    /// Publisher used for the bitstring fallback.
    publisher: P,
    /// Audit sink.
    audit: Arc<dyn RegistryAuditSink>,
    /// Time source.
    clock: Arc<dyn Clock>,
    /// Maintenance hold owner label.
    holder: String,
    /// Capacity used when a migrated registry's size cannot be inferred.
    default_capacity: u64,
    /// Age in milliseconds after which another run may take over a hold.
    hold_ttl_ms: u64,
}

impl<S, L, P> ReconciliationEngine<S, L, P>
where
    S: StatusRegistryStore,
    L: IssuanceLedger,
    P: RegistryPublisher,
{
    /// Creates an engine with a no-op audit sink and the system clock.
    #[must_use]
    pub fn new(store: S, ledger: L, publisher: P) -> Self {
        Self {
            store,
            ledger,
            publisher,
            audit: Arc::new(NoopAuditSink),
            clock: Arc::new(SystemClock),
            holder: DEFAULT_HOLDER.to_string(),
            default_capacity: DEFAULT_CAPACITY_BITS,
            hold_ttl_ms: DEFAULT_HOLD_TTL_MS,
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

    /// Replaces the maintenance hold owner label.
    #[must_use]
    pub fn with_holder(mut self, holder: impl Into<String>) -> Self {
        self.holder = holder.into();
        self
    }

    /// Replaces the fallback capacity used by migration.
    #[must_use]
    pub const fn with_default_capacity(mut self, bits: u64) -> Self {
        self.default_capacity = bits;
        self
    }

    /// Replaces the age after which an existing hold is taken over.
    #[must_use]
    pub const fn with_hold_ttl_ms(mut self, hold_ttl_ms: u64) -> Self {
        self.hold_ttl_ms = hold_ttl_ms;
        self
    }

    /// Clears the maintenance hold of `holder` on a registry version.
    ///
    /// Used to recover a registry whose reconciliation run died before it
    /// could release its hold. A registry without a hold is returned as is.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::RegistryLocked`] when a different holder owns
    /// the hold and [`ReconcileError::Store`] when the compare-and-swap fails.
    pub fn break_hold(
        &self,
        uri: &RegistryUri,
        version: Option<u64>,
        holder: &str,
    ) -> Result<StatusRegistry, ReconcileError> {
        let registry = self.resolve(uri, version)?;
        let Some(hold) = &registry.maintenance else {
            return Ok(registry);
        };
        if hold.holder != holder {
            return Err(ReconcileError::RegistryLocked {
                registry_id: registry.registry_id.to_string(),
                holder: hold.holder.clone(),
            });
        }
        let mut released = registry.clone();
        released.maintenance = None;
        let stored = self.store.compare_and_swap(registry.row_version, &released)?;
        self.audit.record(
            &RegistryAuditEvent::for_registry(self.clock.now(), "hold_broken", &stored)
                .with_detail(format!("holder={holder}")),
        );
        Ok(stored)
    }

    /// Reconciles the latest version of `uri`.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError`] as for [`Self::reconcile_with`].
    pub fn reconcile(&self, uri: &RegistryUri) -> Result<ReconcileOutcome, ReconcileError> {
        self.reconcile_with(&ReconcileRequest::new(uri.clone()))
    }

    /// Reconciles one registry version under a maintenance hold.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::RegistryLocked`] when another job holds the
    /// registry, [`ReconcileError::SourcesUnavailable`] when no index source
    /// can be read, and [`ReconcileError::Store`] for store failures,
    /// including a lost compare-and-swap on hold acquisition.
    pub fn reconcile_with(
        &self,
        request: &ReconcileRequest,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let registry = self.resolve(&request.uri, request.version)?;
        let held = self.acquire_hold(registry)?;
        match self.rebuild(&held, request) {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                self.release_hold(&held);
                Err(err)
            }
        }
    }

    /// Creates the registry when missing, then reconciles it.
    ///
    /// Without an explicit size the capacity is inferred from the published
    /// resource and recorded as advisory (`capacitySource`).
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError`] when creation or reconciliation fails.
    pub fn migrate(&self, request: &MigrationRequest) -> Result<ReconcileOutcome, ReconcileError> {
        if self.store.load_latest(&request.uri)?.is_none() {
            self.create_for_migration(request)?;
        }
        self.reconcile_with(&ReconcileRequest {
            uri: request.uri.clone(),
            version: None,
            supplemental_indexes: request.supplemental_indexes.clone(),
            migrated_from: Some(request.migrated_from.clone()),
        })
    }

    /// Reconciles many registries in paced batches.
    #[must_use]
    pub fn reconcile_batch(&self, requests: &[ReconcileRequest], config: &BatchConfig) -> BatchReport {
        self.run_batches(requests, config, |request| {
            (request.uri.to_string(), self.reconcile_with(request))
        })
    }

    /// Migrates many registries in paced batches.
    #[must_use]
    pub fn migrate_batch(&self, requests: &[MigrationRequest], config: &BatchConfig) -> BatchReport {
        self.run_batches(requests, config, |request| (request.uri.to_string(), self.migrate(request)))
    }

    /// Runs `item` over `items` in chunks, pausing between chunks.
    fn run_batches<T, F>(&self, items: &[T], config: &BatchConfig, item: F) -> BatchReport
    where
        F: Fn(&T) -> (String, Result<ReconcileOutcome, ReconcileError>),
    {
        let mut report = BatchReport::default();
        let delay = Duration::from_millis(config.inter_batch_delay_ms);
        for (position, chunk) in items.chunks(config.batch_size.max(1)).enumerate() {
            if position > 0 && !delay.is_zero() {
                thread::sleep(delay);
            }
            report.batches += 1;
            for entry in chunk {
                match item(entry) {
                    (_, Ok(outcome)) => report.outcomes.push(outcome),
                    (uri, Err(err)) => {
                        let mut event = RegistryAuditEvent::new(
                            self.clock.now(),
                            "batch_item_failed",
                        )
                        .with_detail(err.to_string());
                        event.uri = Some(uri.clone());
                        self.audit.record(&event);
                        report.failures.push(BatchItemFailure {
                            uri,
                            error: err.to_string(),
                        });
                    }
                }
            }
        }
        report
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    /// Loads the requested version, or the latest.
    fn resolve(
        &self,
        uri: &RegistryUri,
        version: Option<u64>,
    ) -> Result<StatusRegistry, ReconcileError> {
        let found = match version {
            Some(version) => {
                self.store.list_versions(uri)?.into_iter().find(|record| record.version == version)
            }
            None => self.store.load_latest(uri)?,
        };
        found.ok_or_else(|| ReconcileError::RegistryNotFound(uri.to_string()))
    }

    /// Takes the maintenance hold with a compare-and-swap.
    ///
    /// A hold at least `hold_ttl_ms` old is taken over; a younger one (or one
    /// stamped in the future) locks the registry.
    fn acquire_hold(&self, registry: StatusRegistry) -> Result<StatusRegistry, ReconcileError> {
        let now = self.clock.now();
        if let Some(hold) = &registry.maintenance {
            let age = now.as_unix_millis().saturating_sub(hold.acquired_at.as_unix_millis());
            let age_ms = u64::try_from(age).unwrap_or(0);
            if age_ms < self.hold_ttl_ms {
                return Err(ReconcileError::RegistryLocked {
                    registry_id: registry.registry_id.to_string(),
                    holder: hold.holder.clone(),
                });
            }
            self.audit.record(
                &RegistryAuditEvent::for_registry(now, "hold_expired", &registry)
                    .with_detail(format!("holder={} age_ms={age_ms}", hold.holder)),
            );
        }
        let mut held = registry.clone();
        held.maintenance = Some(MaintenanceHold {
            holder: self.holder.clone(),
            acquired_at: now,
        });
        let stored = self.store.compare_and_swap(registry.row_version, &held)?;
        self.audit.record(&RegistryAuditEvent::for_registry(
            self.clock.now(),
            "reconcile_started",
            &stored,
        ));
        Ok(stored)
    }

    /// Drops the maintenance hold after a failed run.
    fn release_hold(&self, held: &StatusRegistry) {
        let mut released = held.clone();
        released.maintenance = None;
        if let Err(err) = self.store.compare_and_swap(held.row_version, &released) {
            self.audit.record(
                &RegistryAuditEvent::for_registry(self.clock.now(), "hold_release_failed", held)
                    .with_detail(err.to_string()),
            );
        }
    }

    /// Collects indices, rebuilds the allocation, and writes it with the hold released.
    fn rebuild(
        &self,
        held: &StatusRegistry,
        request: &ReconcileRequest,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let collected = self.collect(held, &request.supplemental_indexes)?;
        let (write_cursor, additional_used_indexes) = rebuild_allocation(&collected.indexes);
        let mut next = held.clone();
        next.write_cursor = write_cursor;
        next.additional_used_indexes.clone_from(&additional_used_indexes);
        next.maintenance = None;
        if next.state == RegistryState::Active && next.threshold_reached() {
            next.state = RegistryState::Full;
        }
        if let Some(source) = &request.migrated_from {
            next.metadata.insert(META_MIGRATED_FROM.to_string(), Value::String(source.clone()));
        }
        next.metadata.insert(
            META_SOURCE_RECORD_COUNT.to_string(),
            Value::from(collected.record_count),
        );
        next.metadata.insert(
            META_RECONCILED_SOURCE.to_string(),
            Value::String(collected.source.as_str().to_string()),
        );
        next.metadata.insert(
            META_RECONCILED_AT.to_string(),
            Value::from(self.clock.now().as_unix_millis()),
        );
        next.validate()?;
        let stored = self.store.compare_and_swap(held.row_version, &next)?;

        let cursor_reset = write_cursor < held.write_cursor;
        if cursor_reset {
            self.audit.record(
                &RegistryAuditEvent::for_registry(self.clock.now(), "cursor_reset", &stored)
                    .with_detail(format!("previous_cursor={}", held.write_cursor)),
            );
        }
        for mismatch in &collected.mismatches {
            let kind = match mismatch.kind {
                MismatchKind::Duplicate => "duplicate",
                MismatchKind::OutOfCapacity => "out_of_capacity",
            };
            self.audit.record(
                &RegistryAuditEvent::for_registry(self.clock.now(), "reconcile_mismatch", &stored)
                    .with_index(mismatch.index)
                    .with_detail(kind),
            );
        }
        self.audit.record(
            &RegistryAuditEvent::for_registry(
                self.clock.now(),
                "reconcile_completed",
                &stored,
            )
            .with_detail(format!(
                "source={} records={}",
                collected.source.as_str(),
                collected.record_count
            )),
        );
        Ok(ReconcileOutcome {
            registry_id: stored.registry_id,
            version: stored.version,
            write_cursor,
            additional_used_indexes,
            source: collected.source,
            source_record_count: collected.record_count,
            mismatches: collected.mismatches,
            cursor_reset,
        })
    }

    /// Reads indices from the ledger, falling back to the published bitstring.
    fn collect(
        &self,
        registry: &StatusRegistry,
        supplemental: &[u64],
    ) -> Result<CollectedIndexes, ReconcileError> {
        match self.ledger.references_for(&registry.registry_id) {
            Ok(references) => {
                let mut owners: BTreeMap<u64, CredentialId> = BTreeMap::new();
                let mut collected = CollectedIndexes {
                    source: IndexSource::Ledger,
                    indexes: Vec::new(),
                    record_count: references.len() as u64,
                    mismatches: Vec::new(),
                };
                for reference in references {
                    let Some(index) = reference.status_index else {
                        continue;
                    };
                    if index >= registry.size {
                        collected.mismatches.push(ReconciliationMismatch {
                            kind: MismatchKind::OutOfCapacity,
                            index,
                            credential_id: Some(reference.credential_id),
                        });
                    } else if owners.contains_key(&index) {
                        collected.mismatches.push(ReconciliationMismatch {
                            kind: MismatchKind::Duplicate,
                            index,
                            credential_id: Some(reference.credential_id),
                        });
                    } else {
                        owners.insert(index, reference.credential_id);
                        collected.indexes.push(index);
                    }
                }
                Ok(collected)
            }
            Err(ledger_err) => {
                self.audit.record(
                    &RegistryAuditEvent::for_registry(
                        self.clock.now(),
                        "index_source_fallback",
                        registry,
                    )
                    .with_detail(ledger_err.to_string()),
                );
                self.collect_published(registry, supplemental, &ledger_err)
            }
        }
    }

    /// Collects set bits of the published bitstring plus supplemental indices.
    fn collect_published(
        &self,
        registry: &StatusRegistry,
        supplemental: &[u64],
        ledger_err: &StoreError,
    ) -> Result<CollectedIndexes, ReconcileError> {
        let resource = self.publisher.resolve(&registry.resource_uri()).map_err(
            |publisher_err: PublisherError| {
                ReconcileError::SourcesUnavailable(format!(
                    "ledger: {ledger_err}; publisher: {publisher_err}"
                ))
            },
        )?;
        let mut observed: BTreeSet<u64> = supplemental.iter().copied().collect();
        match resource {
            Some(resource) => observed.extend(codec::decode(&resource.blob)?.set_indexes()),
            None if supplemental.is_empty() => {
                return Err(ReconcileError::SourcesUnavailable(format!(
                    "ledger: {ledger_err}; publisher: no resource at {}",
                    registry.resource_uri()
                )));
            }
            None => {}
        }
        let mut collected = CollectedIndexes {
            source: IndexSource::PublishedBitstring,
            indexes: Vec::new(),
            record_count: observed.len() as u64,
            mismatches: Vec::new(),
        };
        for index in observed {
            if index >= registry.size {
                collected.mismatches.push(ReconciliationMismatch {
                    kind: MismatchKind::OutOfCapacity,
                    index,
                    credential_id: None,
                });
            } else {
                collected.indexes.push(index);
            }
        }
        Ok(collected)
    }

    /// Creates version 1 for a migration, inferring capacity when needed.
    fn create_for_migration(&self, request: &MigrationRequest) -> Result<(), ReconcileError> {
        let estimate = match request.size {
            Some(bits) => CapacityEstimate {
                bits,
                source: CapacitySource::Declared,
                fallback_reason: None,
            },
            None => self.infer_capacity(&request.uri),
        };
        if estimate.source == CapacitySource::Default {
            let mut event = RegistryAuditEvent::for_uri(
                self.clock.now(),
                "capacity_fallback",
                &request.uri,
            );
            event.detail = estimate.fallback_reason.clone();
            self.audit.record(&event);
        }
        let mut registry = StatusRegistry::new(
            request.uri.clone(),
            1,
            estimate.bits,
            request.threshold_percentage,
            self.clock.now(),
        )?;
        registry.metadata.insert(
            META_CAPACITY_SOURCE.to_string(),
            Value::String(estimate.source.as_str().to_string()),
        );
        match self.store.create(&registry) {
            Ok(stored) => {
                self.audit.record(&RegistryAuditEvent::for_registry(
                    self.clock.now(),
                    "registry_created",
                    &stored,
                ));
                Ok(())
            }
            Err(StoreError::Conflict(_)) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Estimates capacity from the published version-1 resource.
    fn infer_capacity(&self, uri: &RegistryUri) -> CapacityEstimate {
        let fallback = |reason: String| CapacityEstimate {
            bits: self.default_capacity,
            source: CapacitySource::Default,
            fallback_reason: Some(reason),
        };
        match self.publisher.resolve(&uri.resource_uri(1)) {
            Ok(Some(resource)) => {
                let estimate = codec::size_of(&resource.blob, resource.declared_length);
                if estimate.source == CapacitySource::Default {
                    CapacityEstimate {
                        bits: self.default_capacity,
                        ..estimate
                    }
                } else {
                    estimate
                }
            }
            Ok(None) => fallback("no published resource".to_string()),
            Err(err) => fallback(err.to_string()),
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::rebuild_allocation;

    #[test]
    fn rebuild_splits_prefix_and_additional() {
        let (cursor, additional) = rebuild_allocation(&[7, 0, 2, 1, 5, 2]);
        assert_eq!(cursor, 3);
        assert_eq!(additional.into_iter().collect::<Vec<_>>(), vec![5, 7]);
    }

    #[test]
    fn rebuild_anchors_run_at_lowest_index() {
        let (cursor, additional) = rebuild_allocation(&[3, 4, 5]);
        assert_eq!(cursor, 6);
        assert!(additional.is_empty());
    }

    #[test]
    fn rebuild_of_nothing_is_empty() {
        assert_eq!(rebuild_allocation(&[]), (0, std::collections::BTreeSet::new()));
    }
}
