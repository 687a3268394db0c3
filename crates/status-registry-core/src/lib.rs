// crates/status-registry-core/src/lib.rs
// ============================================================================
// Module: Status Registry Core Library
// Description: Public API surface for the status registry core.
// Purpose: Expose registry types, codec, interfaces, and runtime services.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! Status registry core assigns every issued credential a unique, durable bit
//! position inside a fixed-capacity status list, keeps the allocation frontier
//! consistent under concurrent writers, rebuilds that frontier from issued
//! credential records, and encodes the published bitstring. Storage and
//! publication are reached only through the traits in [`interfaces`].

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use core::*;

pub use interfaces::IssuanceLedger;
pub use interfaces::PublishReceipt;
pub use interfaces::PublishedResource;
pub use interfaces::PublisherError;
pub use interfaces::RegistryPublisher;
pub use interfaces::StatusRegistryStore;
pub use interfaces::StoreError;
pub use runtime::AllocationError;
pub use runtime::AllocatorConfig;
pub use runtime::AllocatorService;
pub use runtime::BatchConfig;
pub use runtime::BatchItemFailure;
pub use runtime::BatchReport;
pub use runtime::Clock;
pub use runtime::CreateRegistryRequest;
pub use runtime::DEFAULT_HOLD_TTL_MS;
pub use runtime::Disposition;
pub use runtime::InMemoryIssuanceLedger;
pub use runtime::InMemoryPublisher;
pub use runtime::InMemoryRegistryStore;
pub use runtime::MigrationRequest;
pub use runtime::PublicationError;
pub use runtime::ReconcileError;
pub use runtime::ReconcileOutcome;
pub use runtime::ReconcileRequest;
pub use runtime::ReconciliationEngine;
pub use runtime::RetryPolicy;
pub use runtime::SystemClock;
pub use runtime::audit::FileAuditSink;
pub use runtime::audit::NoopAuditSink;
pub use runtime::audit::RegistryAuditEvent;
pub use runtime::audit::RegistryAuditSink;
pub use runtime::audit::StderrAuditSink;
