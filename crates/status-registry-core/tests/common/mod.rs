// crates/status-registry-core/tests/common/mod.rs
// ============================================================================
// Module: Common Test Fixtures
// Description: Shared fixtures for status registry integration tests.
// Purpose: Build allocators over in-memory backends and capture audit events.
// Dependencies: status-registry-core
// ============================================================================

//! ## Overview
//! Shared helpers: a capturing audit sink, registry URIs, fast retry
//! policies, and allocator/engine constructors over shared in-memory state.

#![allow(dead_code, reason = "Shared test helpers may be unused in some cases.")]
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::unwrap_in_result,
    reason = "Test fixtures favor direct unwraps for setup clarity."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;

use status_registry_core::AllocatorConfig;
use status_registry_core::AllocatorService;
use status_registry_core::CreateRegistryRequest;
use status_registry_core::InMemoryIssuanceLedger;
use status_registry_core::InMemoryPublisher;
use status_registry_core::InMemoryRegistryStore;
use status_registry_core::ReconciliationEngine;
use status_registry_core::RegistryAuditEvent;
use status_registry_core::RegistryAuditSink;
use status_registry_core::RegistryType;
use status_registry_core::RegistryUri;
use status_registry_core::RetryPolicy;
use status_registry_core::StatusRegistry;
use status_registry_core::Timestamp;
use status_registry_core::runtime::FixedClock;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Allocator over the in-memory backends.
pub type MemoryAllocator =
    AllocatorService<InMemoryRegistryStore, InMemoryIssuanceLedger, InMemoryPublisher>;

/// Reconciliation engine over the in-memory backends.
pub type MemoryEngine =
    ReconciliationEngine<InMemoryRegistryStore, InMemoryIssuanceLedger, InMemoryPublisher>;

/// Audit sink that keeps every event in memory.
#[derive(Default)]
pub struct CapturingAuditSink {
    /// Recorded events.
    events: Mutex<Vec<RegistryAuditEvent>>,
}

impl CapturingAuditSink {
    /// Returns recorded events.
    pub fn events(&self) -> Vec<RegistryAuditEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Returns recorded event names in order.
    pub fn names(&self) -> Vec<&'static str> {
        self.events().into_iter().map(|event| event.event).collect()
    }

    /// Counts events with the given name.
    pub fn count(&self, name: &str) -> usize {
        self.names().into_iter().filter(|event| *event == name).count()
    }
}

impl RegistryAuditSink for CapturingAuditSink {
    fn record(&self, event: &RegistryAuditEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

/// Shared in-memory backends.
#[derive(Clone, Default)]
pub struct Backends {
    /// Registry store.
    pub store: InMemoryRegistryStore,
    /// Issuance ledger.
    pub ledger: InMemoryIssuanceLedger,
    /// Publisher.
    pub publisher: InMemoryPublisher,
}

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Fixed creation timestamp.
pub const NOW: Timestamp = Timestamp::from_unix_millis(1_700_000_000_000);

/// Returns a registry URI with the given name.
pub fn uri(name: &str) -> RegistryUri {
    RegistryUri::new("did:example:issuer", name, RegistryType::BitstringStatusList).unwrap()
}

/// Retry policy with millisecond-scale delays.
pub fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay_ms: 0,
        max_delay_ms: 1,
    }
}

/// Allocator configuration with fast retries.
pub fn fast_config() -> AllocatorConfig {
    AllocatorConfig {
        retry: fast_retry(5),
        publish_retry: fast_retry(3),
        ..AllocatorConfig::default()
    }
}

/// Builds an allocator over `backends` with a capturing sink.
pub fn allocator(
    backends: &Backends,
    config: AllocatorConfig,
) -> (MemoryAllocator, Arc<CapturingAuditSink>) {
    let sink = Arc::new(CapturingAuditSink::default());
    let service = AllocatorService::new(
        backends.store.clone(),
        backends.ledger.clone(),
        backends.publisher.clone(),
        config,
    )
    .with_audit(sink.clone())
    .with_clock(Arc::new(FixedClock(NOW)));
    (service, sink)
}

/// Builds a reconciliation engine over `backends` with a capturing sink.
pub fn engine(backends: &Backends) -> (MemoryEngine, Arc<CapturingAuditSink>) {
    let sink = Arc::new(CapturingAuditSink::default());
    let engine = ReconciliationEngine::new(
        backends.store.clone(),
        backends.ledger.clone(),
        backends.publisher.clone(),
    )
    .with_audit(sink.clone())
    .with_clock(Arc::new(FixedClock(NOW)));
    (engine, sink)
}

/// Creates version 1 of `name` with the given capacity and threshold.
pub fn create(service: &MemoryAllocator, name: &str, size: u64, threshold: u8) -> StatusRegistry {
    service.create_registry(CreateRegistryRequest::new(uri(name), size, threshold)).unwrap()
}
