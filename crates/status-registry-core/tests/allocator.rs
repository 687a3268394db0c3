// crates/status-registry-core/tests/allocator.rs
// ============================================================================
// Module: Allocator Tests
// Description: Allocation scenarios, capacity, rotation, and races.
// Purpose: Validate uniqueness and capacity under sequential and concurrent use.
// Dependencies: status-registry-core
// ============================================================================
//! ## Overview
//! Exercises `AllocatorService` against the in-memory store, including a
//! deterministic compare-and-swap race and a multi-threaded uniqueness run.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

mod common;

use std::collections::BTreeSet;
use std::sync::Mutex;
use std::thread;

use status_registry_core::AllocationError;
use status_registry_core::AllocatorConfig;
use status_registry_core::AllocatorService;
use status_registry_core::CredentialId;
use status_registry_core::Disposition;
use status_registry_core::InMemoryRegistryStore;
use status_registry_core::IssuanceLedger;
use status_registry_core::IssuedCredentialReference;
use status_registry_core::MaintenanceHold;
use status_registry_core::RegistryId;
use status_registry_core::RegistryState;
use status_registry_core::RegistryUri;
use status_registry_core::StatusRegistry;
use status_registry_core::StatusRegistryStore;
use status_registry_core::StoreError;

use crate::common::Backends;
use crate::common::NOW;
use crate::common::allocator;
use crate::common::create;
use crate::common::fast_config;
use crate::common::fast_retry;
use crate::common::uri;

/// Store wrapper that lets a competing writer win the next compare-and-swap.
struct RacingStore {
    /// Shared backing store.
    inner: InMemoryRegistryStore,
    /// Whether the competing write is still pending.
    race_pending: Mutex<bool>,
    /// Index claimed by the competitor.
    competitor_index: Mutex<Option<u64>>,
}

impl StatusRegistryStore for RacingStore {
    fn create(&self, record: &StatusRegistry) -> Result<StatusRegistry, StoreError> {
        self.inner.create(record)
    }

    fn load(&self, registry_id: &RegistryId) -> Result<Option<StatusRegistry>, StoreError> {
        self.inner.load(registry_id)
    }

    fn load_latest(&self, uri: &RegistryUri) -> Result<Option<StatusRegistry>, StoreError> {
        self.inner.load_latest(uri)
    }

    fn list_versions(&self, uri: &RegistryUri) -> Result<Vec<StatusRegistry>, StoreError> {
        self.inner.list_versions(uri)
    }

    fn compare_and_swap(
        &self,
        expected_row_version: u64,
        record: &StatusRegistry,
    ) -> Result<StatusRegistry, StoreError> {
        let mut pending = self.race_pending.lock().unwrap();
        if *pending {
            *pending = false;
            let mut competitor = self.inner.load(&record.registry_id)?.unwrap();
            let row_version = competitor.row_version;
            let index = competitor.claim_next().unwrap();
            self.inner.compare_and_swap(row_version, &competitor)?;
            *self.competitor_index.lock().unwrap() = Some(index);
        }
        drop(pending);
        self.inner.compare_and_swap(expected_row_version, record)
    }

    fn rotate(
        &self,
        expected_row_version: u64,
        previous: &StatusRegistry,
        next: &StatusRegistry,
    ) -> Result<StatusRegistry, StoreError> {
        self.inner.rotate(expected_row_version, previous, next)
    }
}

/// Store wrapper that rotates the registry on behalf of a competing writer
/// just before the second `load_latest`.
struct CompetingRotationStore {
    /// Shared backends the competitor writes through.
    backends: Backends,
    /// Number of `load_latest` calls seen.
    load_latest_calls: Mutex<u32>,
    /// Allocation taken by the competitor on the version it rotated to.
    competitor_allocation: Mutex<Option<(u64, u64)>>,
}

impl StatusRegistryStore for CompetingRotationStore {
    fn create(&self, record: &StatusRegistry) -> Result<StatusRegistry, StoreError> {
        self.backends.store.create(record)
    }

    fn load(&self, registry_id: &RegistryId) -> Result<Option<StatusRegistry>, StoreError> {
        self.backends.store.load(registry_id)
    }

    fn load_latest(&self, uri: &RegistryUri) -> Result<Option<StatusRegistry>, StoreError> {
        let mut calls = self.load_latest_calls.lock().unwrap();
        *calls += 1;
        if *calls == 2 {
            let (competitor, _sink) = allocator(&self.backends, fast_config());
            let successor = competitor.rotate(uri).unwrap();
            let index = competitor.allocate(&successor).unwrap();
            let version = self.backends.store.load(&successor)?.unwrap().version;
            *self.competitor_allocation.lock().unwrap() = Some((version, index));
        }
        drop(calls);
        self.backends.store.load_latest(uri)
    }

    fn list_versions(&self, uri: &RegistryUri) -> Result<Vec<StatusRegistry>, StoreError> {
        self.backends.store.list_versions(uri)
    }

    fn compare_and_swap(
        &self,
        expected_row_version: u64,
        record: &StatusRegistry,
    ) -> Result<StatusRegistry, StoreError> {
        self.backends.store.compare_and_swap(expected_row_version, record)
    }

    fn rotate(
        &self,
        expected_row_version: u64,
        previous: &StatusRegistry,
        next: &StatusRegistry,
    ) -> Result<StatusRegistry, StoreError> {
        self.backends.store.rotate(expected_row_version, previous, next)
    }
}

/// Verifies the size-10, threshold-80 scenario flips to Full after the 8th call.
#[test]
fn sequential_allocation_marks_full_at_threshold() {
    let backends = Backends::default();
    let (service, sink) = allocator(&backends, fast_config());
    let registry = create(&service, "employees", 10, 80);

    let first_six: Vec<u64> =
        (0 .. 6).map(|_| service.allocate(&registry.registry_id).unwrap()).collect();
    assert_eq!(first_six, vec![0, 1, 2, 3, 4, 5]);
    let stored = backends.store.load(&registry.registry_id).unwrap().unwrap();
    assert_eq!(stored.write_cursor, 6);
    assert_eq!(stored.utilization_percent(), 60);
    assert_eq!(stored.state, RegistryState::Active);

    assert_eq!(service.allocate(&registry.registry_id).unwrap(), 6);
    let stored = backends.store.load(&registry.registry_id).unwrap().unwrap();
    assert_eq!(stored.state, RegistryState::Active);

    assert_eq!(service.allocate(&registry.registry_id).unwrap(), 7);
    let stored = backends.store.load(&registry.registry_id).unwrap().unwrap();
    assert_eq!(stored.write_cursor, 8);
    assert_eq!(stored.state, RegistryState::Full);
    assert_eq!(sink.count("registry_full"), 1);

    let err = service.allocate(&registry.registry_id).unwrap_err();
    assert!(matches!(err, AllocationError::RegistryFull(_)));
    assert_eq!(err.disposition(), Disposition::RegistryExhausted);
}

/// Verifies a registry at `write_cursor == size` never yields an index.
#[test]
fn exhausted_registry_is_full_not_out_of_range() {
    let backends = Backends::default();
    let (service, _sink) = allocator(&backends, fast_config());
    let mut record = StatusRegistry::new(uri("exhausted"), 1, 4, 100, NOW).unwrap();
    record.write_cursor = 4;
    backends.store.create(&record).unwrap();

    for _ in 0 .. 3 {
        let err = service.allocate(&record.registry_id).unwrap_err();
        assert!(matches!(err, AllocationError::RegistryFull(_)));
    }
    let stored = backends.store.load(&record.registry_id).unwrap().unwrap();
    assert_eq!(stored.state, RegistryState::Full);
    assert_eq!(stored.write_cursor, 4);
}

/// Verifies an Active registry loaded above its threshold fails fast.
#[test]
fn active_registry_over_threshold_is_marked_full_on_load() {
    let backends = Backends::default();
    let (service, sink) = allocator(&backends, fast_config());
    let mut record = StatusRegistry::new(uri("legacy"), 1, 10, 50, NOW).unwrap();
    record.write_cursor = 5;
    backends.store.create(&record).unwrap();

    let err = service.allocate(&record.registry_id).unwrap_err();
    assert!(matches!(err, AllocationError::RegistryFull(_)));
    let stored = backends.store.load(&record.registry_id).unwrap().unwrap();
    assert_eq!(stored.state, RegistryState::Full);
    assert_eq!(stored.write_cursor, 5);
    assert_eq!(sink.count("index_allocated"), 0);
}

/// Verifies the cursor never decreases and absorbs out-of-order indices.
#[test]
fn write_cursor_is_monotonic_and_skips_additional_indexes() {
    let backends = Backends::default();
    let (service, _sink) = allocator(&backends, fast_config());
    let mut record = StatusRegistry::new(uri("gappy"), 1, 32, 100, NOW).unwrap();
    record.write_cursor = 2;
    record.additional_used_indexes = BTreeSet::from([3, 4, 9]);
    backends.store.create(&record).unwrap();

    let mut last_cursor = 2;
    let mut indexes = Vec::new();
    for _ in 0 .. 4 {
        indexes.push(service.allocate(&record.registry_id).unwrap());
        let stored = backends.store.load(&record.registry_id).unwrap().unwrap();
        assert!(stored.write_cursor >= last_cursor);
        assert!(stored.additional_used_indexes.iter().all(|index| *index > stored.write_cursor));
        last_cursor = stored.write_cursor;
    }
    assert_eq!(indexes, vec![2, 5, 6, 7]);
    assert_eq!(last_cursor, 8);
}

/// Verifies the losing writer of a race retries and takes the next index.
#[test]
fn racing_allocations_yield_consecutive_distinct_indexes() {
    let backends = Backends::default();
    let (setup, _sink) = allocator(&backends, fast_config());
    let registry = create(&setup, "race", 100, 100);
    for _ in 0 .. 6 {
        setup.allocate(&registry.registry_id).unwrap();
    }

    let racing = RacingStore {
        inner: backends.store.clone(),
        race_pending: Mutex::new(true),
        competitor_index: Mutex::new(None),
    };
    let service = AllocatorService::new(
        racing,
        backends.ledger.clone(),
        backends.publisher.clone(),
        fast_config(),
    );
    let index = service.allocate(&registry.registry_id).unwrap();

    assert_eq!(*service.store().competitor_index.lock().unwrap(), Some(6));
    assert_eq!(index, 7);
    let stored = backends.store.load(&registry.registry_id).unwrap().unwrap();
    assert_eq!(stored.write_cursor, 8);
}

/// Verifies concurrent allocators never hand out the same index.
#[test]
fn concurrent_allocators_produce_unique_indexes() {
    const THREADS: usize = 8;
    const PER_THREAD: usize = 25;
    let backends = Backends::default();
    let config = AllocatorConfig {
        retry: fast_retry(10_000),
        timeout_ms: 60_000,
        ..AllocatorConfig::default()
    };
    let (setup, _sink) = allocator(&backends, config);
    let registry = create(&setup, "concurrent", 1_000, 100);

    let handles: Vec<_> = (0 .. THREADS)
        .map(|_| {
            let backends = backends.clone();
            let registry_id = registry.registry_id.clone();
            thread::spawn(move || {
                let (service, _sink) = allocator(&backends, config);
                (0 .. PER_THREAD)
                    .map(|_| service.allocate(&registry_id).unwrap())
                    .collect::<Vec<u64>>()
            })
        })
        .collect();
    let all: Vec<u64> = handles.into_iter().flat_map(|handle| handle.join().unwrap()).collect();

    let distinct: BTreeSet<u64> = all.iter().copied().collect();
    assert_eq!(distinct.len(), THREADS * PER_THREAD);
    assert!(all.iter().all(|index| *index < 1_000));
    let stored = backends.store.load(&registry.registry_id).unwrap().unwrap();
    assert_eq!(stored.write_cursor, (THREADS * PER_THREAD) as u64);
}

/// Verifies an exhausted retry budget surfaces as an allocation conflict.
#[test]
fn conflict_after_retry_budget_is_try_again() {
    let backends = Backends::default();
    let (setup, _sink) = allocator(&backends, fast_config());
    let registry = create(&setup, "contended", 10, 100);
    let racing = RacingStore {
        inner: backends.store.clone(),
        race_pending: Mutex::new(true),
        competitor_index: Mutex::new(None),
    };
    let config = AllocatorConfig {
        retry: fast_retry(1),
        ..fast_config()
    };
    let service = AllocatorService::new(
        racing,
        backends.ledger.clone(),
        backends.publisher.clone(),
        config,
    );

    let err = service.allocate(&registry.registry_id).unwrap_err();
    assert!(matches!(err, AllocationError::AllocationConflict { attempts: 1, .. }));
    assert_eq!(err.disposition(), Disposition::TryAgain);
}

/// Verifies allocation fails fast while a maintenance hold is present.
#[test]
fn maintenance_hold_blocks_allocation() {
    let backends = Backends::default();
    let (service, _sink) = allocator(&backends, fast_config());
    let registry = create(&service, "held", 10, 100);
    let mut held = registry.clone();
    held.maintenance = Some(MaintenanceHold {
        holder: "job-1".to_string(),
        acquired_at: NOW,
    });
    backends.store.compare_and_swap(registry.row_version, &held).unwrap();

    let err = service.allocate(&registry.registry_id).unwrap_err();
    assert!(matches!(err, AllocationError::RegistryLocked(_)));
    assert_eq!(err.disposition(), Disposition::TryAgain);
}

/// Verifies registry creation rejects duplicates and invalid parameters.
#[test]
fn create_registry_validates_input() {
    let backends = Backends::default();
    let (service, sink) = allocator(&backends, fast_config());
    create(&service, "created", 10, 80);
    assert_eq!(sink.count("registry_created"), 1);

    let duplicate = service
        .create_registry(status_registry_core::CreateRegistryRequest::new(uri("created"), 10, 80))
        .unwrap_err();
    assert!(matches!(duplicate, AllocationError::RegistryExists(_)));
    let zero = service
        .create_registry(status_registry_core::CreateRegistryRequest::new(uri("zero"), 0, 80))
        .unwrap_err();
    assert!(matches!(zero, AllocationError::Invalid(_)));
    let threshold = service
        .create_registry(status_registry_core::CreateRegistryRequest::new(uri("pct"), 10, 101))
        .unwrap_err();
    assert!(matches!(threshold, AllocationError::Invalid(_)));
    assert_eq!(threshold.disposition(), Disposition::Fatal);
}

/// Verifies rotation deprecates the predecessor and starts a fresh version.
#[test]
fn rotate_creates_next_version_and_deprecates_previous() {
    let backends = Backends::default();
    let (service, sink) = allocator(&backends, fast_config());
    let registry = create(&service, "rotating", 4, 50);
    service.allocate(&registry.registry_id).unwrap();
    service.allocate(&registry.registry_id).unwrap();

    let next_id = service.rotate(&uri("rotating")).unwrap();
    let previous = backends.store.load(&registry.registry_id).unwrap().unwrap();
    let next = backends.store.load(&next_id).unwrap().unwrap();
    assert_eq!(previous.state, RegistryState::Deprecated);
    assert_eq!(next.version, 2);
    assert_eq!(next.size, 4);
    assert_eq!(next.threshold_percentage, 50);
    assert_eq!(next.write_cursor, 0);
    assert_eq!(next.state, RegistryState::Active);
    assert_eq!(next_id, RegistryId::derive(&uri("rotating"), 2));
    assert_eq!(sink.count("registry_rotated"), 1);
    assert_eq!(backends.store.list_versions(&uri("rotating")).unwrap().len(), 2);
}

/// Verifies `allocate_latest` rotates once when auto-rotation is enabled.
#[test]
fn allocate_latest_auto_rotates_full_registry() {
    let backends = Backends::default();
    let config = AllocatorConfig {
        auto_rotate: true,
        ..fast_config()
    };
    let (service, _sink) = allocator(&backends, config);
    create(&service, "auto", 2, 100);

    let first = service.allocate_latest(&uri("auto")).unwrap();
    let second = service.allocate_latest(&uri("auto")).unwrap();
    let third = service.allocate_latest(&uri("auto")).unwrap();
    assert_eq!((first.version, first.index), (1, 0));
    assert_eq!((second.version, second.index), (1, 1));
    assert_eq!((third.version, third.index), (2, 0));

    let (manual, _sink) = allocator(&backends, fast_config());
    let fourth = manual.allocate_latest(&uri("auto")).unwrap();
    assert_eq!((fourth.version, fourth.index), (2, 1));
    let err = manual.allocate_latest(&uri("auto")).unwrap_err();
    assert!(matches!(err, AllocationError::RegistryFull(_)));
}

/// Verifies auto-rotation adopts a successor another writer created after the
/// full version was observed instead of rotating again.
#[test]
fn allocate_latest_adopts_competing_rotation() {
    let backends = Backends::default();
    let (setup, _sink) = allocator(&backends, fast_config());
    let registry = create(&setup, "contested", 10, 80);
    for _ in 0 .. 8 {
        setup.allocate(&registry.registry_id).unwrap();
    }
    let store = CompetingRotationStore {
        backends: backends.clone(),
        load_latest_calls: Mutex::new(0),
        competitor_allocation: Mutex::new(None),
    };
    let config = AllocatorConfig {
        auto_rotate: true,
        ..fast_config()
    };
    let service = AllocatorService::new(
        store,
        backends.ledger.clone(),
        backends.publisher.clone(),
        config,
    );

    let allocation = service.allocate_latest(&uri("contested")).unwrap();
    assert_eq!(*service.store().competitor_allocation.lock().unwrap(), Some((2, 0)));
    assert_eq!((allocation.version, allocation.index), (2, 1));
    let versions = backends.store.list_versions(&uri("contested")).unwrap();
    assert_eq!(versions.len(), 2);
    let latest = backends.store.load_latest(&uri("contested")).unwrap().unwrap();
    assert_eq!(latest.version, 2);
    assert_eq!(latest.state, RegistryState::Active);
    let previous = backends.store.load(&registry.registry_id).unwrap().unwrap();
    assert_eq!(previous.state, RegistryState::Deprecated);
}

/// Verifies audit events carry the allocator clock's time.
#[test]
fn audit_events_use_service_clock() {
    let backends = Backends::default();
    let (service, sink) = allocator(&backends, fast_config());
    let registry = create(&service, "clocked", 10, 100);
    service.allocate(&registry.registry_id).unwrap();

    let events = sink.events();
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|event| event.timestamp_ms == NOW.as_unix_millis()));
}

/// Verifies credential allocation commits to the ledger and is idempotent.
#[test]
fn allocate_for_credential_commits_link() {
    let backends = Backends::default();
    let (service, _sink) = allocator(&backends, fast_config());
    let registry = create(&service, "creds", 10, 100);
    let mut reference = IssuedCredentialReference::pending(CredentialId::new("cred-1"));

    let allocation = service.allocate_for_credential(&mut reference, &uri("creds")).unwrap();
    assert_eq!(allocation.index, 0);
    assert_eq!(reference.status_index, Some(0));
    assert_eq!(reference.status_registry_id, Some(registry.registry_id.clone()));
    let stored = backends.ledger.get(&CredentialId::new("cred-1")).unwrap().unwrap();
    assert_eq!(stored, reference);

    let again = service.allocate_for_credential(&mut reference, &uri("creds")).unwrap();
    assert_eq!(again, allocation);
    let registry = backends.store.load(&registry.registry_id).unwrap().unwrap();
    assert_eq!(registry.write_cursor, 1);
}

/// Verifies failed credential allocation records the retry count and error.
#[test]
fn allocate_for_credential_records_failures() {
    let backends = Backends::default();
    let (service, _sink) = allocator(&backends, fast_config());
    create(&service, "tiny", 1, 100);
    let mut first = IssuedCredentialReference::pending(CredentialId::new("first"));
    service.allocate_for_credential(&mut first, &uri("tiny")).unwrap();

    let mut second = IssuedCredentialReference::pending(CredentialId::new("second"));
    let err = service.allocate_for_credential(&mut second, &uri("tiny")).unwrap_err();
    assert!(matches!(err, AllocationError::RegistryFull(_)));
    assert_eq!(second.retry_count, 1);
    assert!(second.last_error.as_deref().unwrap().contains("full"));
    assert!(second.status_index.is_none());
    let stored = backends.ledger.get(&CredentialId::new("second")).unwrap().unwrap();
    assert_eq!(stored.retry_count, 1);
}

/// Verifies a ledger outage after allocation keeps the index on the reference.
#[test]
fn ledger_outage_keeps_allocated_index_for_retry() {
    let backends = Backends::default();
    let (service, _sink) = allocator(&backends, fast_config());
    create(&service, "outage", 10, 100);
    backends.ledger.set_available(false);
    let mut reference = IssuedCredentialReference::pending(CredentialId::new("cred"));

    let err = service.allocate_for_credential(&mut reference, &uri("outage")).unwrap_err();
    assert!(matches!(err, AllocationError::Ledger(_)));
    assert_eq!(err.disposition(), Disposition::TryAgain);
    assert_eq!(reference.status_index, Some(0));
    assert_eq!(reference.retry_count, 1);

    backends.ledger.set_available(true);
    let allocation = service.allocate_for_credential(&mut reference, &uri("outage")).unwrap();
    assert_eq!(allocation.index, 0);
    let registry = backends.store.load_latest(&uri("outage")).unwrap().unwrap();
    assert_eq!(registry.write_cursor, 1);
}
