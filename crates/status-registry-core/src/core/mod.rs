// crates/status-registry-core/src/core/mod.rs
// ============================================================================
// Module: Status Registry Core Types
// Description: Canonical registry, credential reference, and bitstring types.
// Purpose: Provide stable, serializable types shared by every registry surface.
// Dependencies: serde, bitvec, flate2, base64, hex, sha2
// ============================================================================

//! ## Overview
//! Core types define the status registry record and its invariants, the
//! issuance-side credential reference, identifiers, and the bitstring codec.
//! These types are the canonical source of truth for the storage backends and
//! runtime services.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod bitstring;
pub mod codec;
pub mod credential;
pub mod hashing;
pub mod identifiers;
pub mod registry;
pub mod time;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use bitstring::StatusBitstring;
pub use codec::CapacityEstimate;
pub use codec::CapacitySource;
pub use codec::CodecError;
pub use codec::DEFAULT_CAPACITY_BITS;
pub use codec::EncodedBlob;
pub use codec::Encoding;
pub use codec::MAX_BITSTRING_BITS;
pub use credential::IssuedCredentialReference;
pub use hashing::sha256_hex;
pub use identifiers::CredentialId;
pub use identifiers::IdentifierError;
pub use identifiers::RegistryId;
pub use identifiers::RegistryUri;
pub use registry::InvariantViolation;
pub use registry::MaintenanceHold;
pub use registry::RegistryState;
pub use registry::RegistryType;
pub use registry::StatusRegistry;
pub use time::Timestamp;
