// crates/status-registry-store-sqlite/src/lib.rs
// ============================================================================
// Module: SQLite Status Registry Store
// Description: Durable registry store and issuance ledger using SQLite WAL.
// Purpose: Persist registry allocation state across processes.
// Dependencies: status-registry-core, rusqlite
// ============================================================================

//! ## Overview
//! This crate provides a SQLite-backed [`StatusRegistryStore`] and
//! [`IssuanceLedger`]. Registry writes are compare-and-swap operations run
//! inside `BEGIN IMMEDIATE` transactions, so allocator processes sharing one
//! database file serialize on the registry row. Every write appends a hashed
//! snapshot to an append-only revision table.
//!
//! [`StatusRegistryStore`]: status_registry_core::StatusRegistryStore
//! [`IssuanceLedger`]: status_registry_core::IssuanceLedger

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::MAX_RECORD_BYTES;
pub use store::SqliteRegistryStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteStoreMode;
pub use store::SqliteSyncMode;
