// crates/status-registry-core/src/runtime/mod.rs
// ============================================================================
// Module: Status Registry Runtime
// Description: Allocator, reconciliation, and in-memory backends.
// Purpose: Execute registry operations against the injected interfaces.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! The runtime hosts the [`AllocatorService`] used by the issuance pipeline
//! and the [`ReconciliationEngine`] used by offline recovery jobs. Both are
//! explicit objects built around injected stores, ledgers, and publishers.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod allocator;
pub mod audit;
pub mod clock;
pub mod reconcile;
pub mod retry;
pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use allocator::Allocation;
pub use allocator::AllocationError;
pub use allocator::AllocatorConfig;
pub use allocator::AllocatorService;
pub use allocator::CreateRegistryRequest;
pub use allocator::Disposition;
pub use allocator::PublicationError;
pub use clock::Clock;
pub use clock::FixedClock;
pub use clock::SystemClock;
pub use reconcile::BatchConfig;
pub use reconcile::DEFAULT_HOLD_TTL_MS;
pub use reconcile::BatchItemFailure;
pub use reconcile::BatchReport;
pub use reconcile::IndexSource;
pub use reconcile::MigrationRequest;
pub use reconcile::MismatchKind;
pub use reconcile::ReconcileError;
pub use reconcile::ReconcileOutcome;
pub use reconcile::ReconcileRequest;
pub use reconcile::ReconciliationEngine;
pub use reconcile::ReconciliationMismatch;
pub use reconcile::rebuild_allocation;
pub use retry::RetryPolicy;
pub use store::InMemoryIssuanceLedger;
pub use store::InMemoryPublisher;
pub use store::InMemoryRegistryStore;
