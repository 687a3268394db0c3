// crates/status-registry-config/src/lib.rs
// ============================================================================
// Module: Status Registry Config Library
// Description: Canonical config model and validation.
// Purpose: Single source of truth for status-registry.toml semantics.
// Dependencies: status-registry-core, status-registry-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! `status-registry-config` defines the TOML configuration model for the
//! status registry allocator. Loading is strict and fail-closed; validated
//! sections convert into the runtime settings consumed by
//! `status-registry-core` and `status-registry-store-sqlite`.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
