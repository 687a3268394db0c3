// crates/status-registry-core/tests/publication.rs
// ============================================================================
// Module: Publication Tests
// Description: Encoding, publishing, and status updates for registries.
// Purpose: Validate status flips only touch allocated indices.
// Dependencies: status-registry-core
// ============================================================================
//! ## Overview
//! Publishes registry bitstrings through the in-memory publisher and checks
//! the decoded results bit by bit.

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

use std::sync::Arc;
use std::sync::Barrier;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::thread;

use status_registry_core::AllocatorConfig;
use status_registry_core::AllocatorService;
use status_registry_core::EncodedBlob;
use status_registry_core::Encoding;
use status_registry_core::InMemoryPublisher;
use status_registry_core::PublicationError;
use status_registry_core::PublishReceipt;
use status_registry_core::PublishedResource;
use status_registry_core::PublisherError;
use status_registry_core::RegistryPublisher;
use status_registry_core::codec;
use status_registry_core::runtime::FixedClock;
use status_registry_core::sha256_hex;

use crate::common::Backends;
use crate::common::CapturingAuditSink;
use crate::common::NOW;
use crate::common::allocator;
use crate::common::create;
use crate::common::fast_config;
use crate::common::fast_retry;
use crate::common::uri;

/// Publisher wrapper that holds the first `gated` resolves at a barrier so
/// concurrent writers all read the same revision.
struct GatedPublisher {
    /// Shared backing publisher.
    inner: InMemoryPublisher,
    /// Rendezvous for the gated resolves.
    barrier: Barrier,
    /// Number of resolves still to gate.
    gated: usize,
    /// Resolves seen so far.
    resolves: AtomicUsize,
}

impl RegistryPublisher for GatedPublisher {
    fn resolve(&self, resource_uri: &str) -> Result<Option<PublishedResource>, PublisherError> {
        let resolved = self.inner.resolve(resource_uri)?;
        if self.resolves.fetch_add(1, Ordering::SeqCst) < self.gated {
            self.barrier.wait();
        }
        Ok(resolved)
    }

    fn publish(
        &self,
        resource_uri: &str,
        blob: &EncodedBlob,
        declared_length: u64,
        expected_revision: Option<u64>,
    ) -> Result<PublishReceipt, PublisherError> {
        self.inner.publish(resource_uri, blob, declared_length, expected_revision)
    }
}

/// Verifies an unpublished registry encodes as an all-zero list of `size` bits.
#[test]
fn encode_registry_defaults_to_zeroed_list() {
    let backends = Backends::default();
    let (service, _sink) = allocator(&backends, fast_config());
    let registry = create(&service, "fresh", 20, 100);

    let blob = service.encode_registry(&registry.registry_id).unwrap();
    assert_eq!(blob.encoding, Encoding::Base64Url);
    let bits = codec::decode(&blob).unwrap();
    assert_eq!(bits.len(), 24);
    assert!(bits.set_indexes().is_empty());
}

/// Verifies revocation sets and reinstatement clears one allocated bit.
#[test]
fn update_status_flips_allocated_bits() {
    let backends = Backends::default();
    let (service, sink) = allocator(&backends, fast_config());
    let registry = create(&service, "flips", 16, 100);
    for _ in 0 .. 4 {
        service.allocate(&registry.registry_id).unwrap();
    }

    service.update_status(&registry.registry_id, 1, true).unwrap();
    let receipt = service.update_status(&registry.registry_id, 3, true).unwrap();
    let resource = backends.publisher.resolve(&registry.resource_uri()).unwrap().unwrap();
    assert_eq!(receipt.revision, 2);
    assert_eq!(receipt.checksum, sha256_hex(resource.blob.payload.as_bytes()));
    assert_eq!(resource.declared_length, Some(16));
    assert_eq!(codec::decode_exact(&resource.blob, 16).unwrap().set_indexes(), vec![1, 3]);

    service.update_status(&registry.registry_id, 1, false).unwrap();
    let resource = backends.publisher.resolve(&registry.resource_uri()).unwrap().unwrap();
    assert_eq!(codec::decode_exact(&resource.blob, 16).unwrap().set_indexes(), vec![3]);
    assert_eq!(sink.count("status_updated"), 3);
}

/// Verifies indices the allocator never handed out are rejected.
#[test]
fn update_status_rejects_unallocated_index() {
    let backends = Backends::default();
    let (service, _sink) = allocator(&backends, fast_config());
    let registry = create(&service, "strict", 16, 100);
    service.allocate(&registry.registry_id).unwrap();

    let err = service.update_status(&registry.registry_id, 5, true).unwrap_err();
    assert!(matches!(err, PublicationError::IndexNotAllocated { index: 5, .. }));
    let err = service.update_status(&registry.registry_id, 99, true).unwrap_err();
    assert!(matches!(err, PublicationError::IndexNotAllocated { index: 99, .. }));
    assert!(backends.publisher.resolve(&registry.resource_uri()).unwrap().is_none());
}

/// Verifies deprecated registries stay addressable for status changes.
#[test]
fn deprecated_registry_accepts_status_updates() {
    let backends = Backends::default();
    let (service, _sink) = allocator(&backends, fast_config());
    let registry = create(&service, "old", 8, 100);
    service.allocate(&registry.registry_id).unwrap();
    service.rotate(&uri("old")).unwrap();

    service.update_status(&registry.registry_id, 0, true).unwrap();
    let resource = backends.publisher.resolve(&registry.resource_uri()).unwrap().unwrap();
    assert_eq!(codec::decode_exact(&resource.blob, 8).unwrap().set_indexes(), vec![0]);
}

/// Verifies publisher outages are retried and then surfaced.
#[test]
fn publish_retries_unavailable_publisher() {
    let backends = Backends::default();
    let (service, sink) = allocator(&backends, fast_config());
    let registry = create(&service, "flaky", 8, 100);

    backends.publisher.fail_next(2);
    let receipt = service.publish(&registry.registry_id).unwrap();
    assert_eq!(receipt.resource_uri, registry.resource_uri());
    assert_eq!(sink.count("publish_retry"), 2);
    assert_eq!(sink.count("registry_published"), 1);

    let config = AllocatorConfig {
        publish_retry: fast_retry(2),
        ..fast_config()
    };
    let (strict, _sink) = allocator(&backends, config);
    backends.publisher.fail_next(5);
    let err = strict.publish(&registry.registry_id).unwrap_err();
    assert!(matches!(err, PublicationError::PublisherUnavailable(_)));
}

/// Verifies the hex encoding is honored end to end.
#[test]
fn publish_uses_configured_encoding() {
    let backends = Backends::default();
    let config = AllocatorConfig {
        encoding: Encoding::Hex,
        ..fast_config()
    };
    let (service, _sink) = allocator(&backends, config);
    let registry = create(&service, "hex", 8, 100);
    service.allocate(&registry.registry_id).unwrap();
    service.update_status(&registry.registry_id, 0, true).unwrap();

    let resource = backends.publisher.resolve(&registry.resource_uri()).unwrap().unwrap();
    assert_eq!(resource.blob.encoding, Encoding::Hex);
    assert!(resource.blob.payload.chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(codec::decode(&resource.blob).unwrap().get(0), Some(true));
}

/// Verifies concurrent status updates that read the same revision both land.
#[test]
fn concurrent_status_updates_keep_every_bit() {
    let backends = Backends::default();
    let (setup, _sink) = allocator(&backends, fast_config());
    let registry = create(&setup, "concurrent", 16, 100);
    for _ in 0 .. 2 {
        setup.allocate(&registry.registry_id).unwrap();
    }
    let sink = Arc::new(CapturingAuditSink::default());
    let publisher = GatedPublisher {
        inner: backends.publisher.clone(),
        barrier: Barrier::new(2),
        gated: 2,
        resolves: AtomicUsize::new(0),
    };
    let service = AllocatorService::new(
        backends.store.clone(),
        backends.ledger.clone(),
        publisher,
        fast_config(),
    )
    .with_audit(sink.clone())
    .with_clock(Arc::new(FixedClock(NOW)));

    thread::scope(|scope| {
        let first = scope.spawn(|| service.update_status(&registry.registry_id, 0, true));
        let second = scope.spawn(|| service.update_status(&registry.registry_id, 1, true));
        first.join().unwrap().unwrap();
        second.join().unwrap().unwrap();
    });

    let resource = backends.publisher.resolve(&registry.resource_uri()).unwrap().unwrap();
    assert_eq!(codec::decode_exact(&resource.blob, 16).unwrap().set_indexes(), vec![0, 1]);
    assert_eq!(resource.revision, 2);
    assert_eq!(sink.count("publish_conflict"), 1);
    assert_eq!(sink.count("status_updated"), 2);
}
