// crates/status-registry-core/src/core/identifiers.rs
// ============================================================================
// Module: Status Registry Identifiers
// Description: Opaque registry/credential identifiers and the registry URI.
// Purpose: Provide strongly typed identifiers with stable wire forms.
// Dependencies: serde, crate::core::{hashing, registry}
// ============================================================================

//! ## Overview
//! Registries are addressed two ways: an opaque [`RegistryId`] primary key
//! (one per version) and a logical [`RegistryUri`] of the form
//! `{owner}?registryName={name}&registryType={type}` shared by every version
//! of the same list. Publication uses the per-version resource URI.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use thiserror::Error;

use crate::core::hashing::sha256_hex;
use crate::core::registry::RegistryType;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Query parameter carrying the registry name.
const PARAM_NAME: &str = "registryName";
/// Query parameter carrying the registry type.
const PARAM_TYPE: &str = "registryType";
/// Query parameter carrying the resource version on publication URIs.
const PARAM_VERSION: &str = "resourceVersion";
/// Hex characters kept from the derivation digest.
const REGISTRY_ID_HEX_LEN: usize = 32;
/// Characters that may not appear inside a registry name.
const RESERVED_NAME_CHARS: [char; 4] = ['?', '&', '=', '#'];

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Identifier parsing and validation errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentifierError {
    /// Identifier is structurally invalid.
    #[error("invalid registry uri: {0}")]
    InvalidUri(String),
    /// Registry type label is not recognized.
    #[error("unknown registry type: {0}")]
    UnknownType(String),
}

// ============================================================================
// SECTION: Identifier Types
// ============================================================================

/// Primary key of one status registry version.
///
/// # Invariants
/// - Opaque UTF-8 string; derived identifiers are 32 lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegistryId(String);

impl RegistryId {
    /// Creates a registry identifier from an existing value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derives the identifier for a registry URI and version.
    ///
    /// The same URI and version always derive the same identifier.
    #[must_use]
    pub fn derive(uri: &RegistryUri, version: u64) -> Self {
        let digest = sha256_hex(format!("{uri}#{version}").as_bytes());
        Self(digest[.. REGISTRY_ID_HEX_LEN].to_string())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RegistryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for RegistryId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Identifier of an issued credential (owned by the issuance collaborator).
///
/// # Invariants
/// - Opaque UTF-8 string; no normalization is applied.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CredentialId(String);

impl CredentialId {
    /// Creates a new credential identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CredentialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for CredentialId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

// ============================================================================
// SECTION: Registry URI
// ============================================================================

/// Logical registry address shared by all versions of one status list.
///
/// # Invariants
/// - `owner` is non-empty and contains no `?`, `#`, or whitespace.
/// - `name` is non-empty and contains no `?`, `&`, `=`, `#`, or whitespace.
/// - Serializes as its canonical string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegistryUri {
    /// Owner identifier (typically a DID).
    owner: String,
    /// Registry name, unique per owner and type.
    name: String,
    /// Registry type.
    registry_type: RegistryType,
}

impl RegistryUri {
    /// Builds a registry URI from its parts.
    ///
    /// # Errors
    ///
    /// Returns [`IdentifierError::InvalidUri`] when the owner or name is empty
    /// or contains reserved characters.
    pub fn new(
        owner: impl Into<String>,
        name: impl Into<String>,
        registry_type: RegistryType,
    ) -> Result<Self, IdentifierError> {
        let owner = owner.into();
        let name = name.into();
        if owner.is_empty() || owner.contains(['?', '#']) || owner.contains(char::is_whitespace) {
            return Err(IdentifierError::InvalidUri(format!("invalid owner: {owner:?}")));
        }
        if name.is_empty()
            || name.contains(RESERVED_NAME_CHARS)
            || name.contains(char::is_whitespace)
        {
            return Err(IdentifierError::InvalidUri(format!("invalid registry name: {name:?}")));
        }
        Ok(Self {
            owner,
            name,
            registry_type,
        })
    }

    /// Parses a per-version resource URI, returning the logical URI and the
    /// `resourceVersion` parameter when present.
    ///
    /// # Errors
    ///
    /// Returns [`IdentifierError`] when the URI is malformed.
    pub fn parse_resource(value: &str) -> Result<(Self, Option<u64>), IdentifierError> {
        let Some((owner, query)) = value.split_once('?') else {
            return Err(IdentifierError::InvalidUri("missing query".to_string()));
        };
        let mut name = None;
        let mut registry_type = None;
        let mut version = None;
        for pair in query.split('&') {
            let Some((key, raw)) = pair.split_once('=') else {
                return Err(IdentifierError::InvalidUri(format!("malformed parameter: {pair}")));
            };
            let slot_taken = match key {
                PARAM_NAME => name.replace(raw).is_some(),
                PARAM_TYPE => registry_type.replace(raw.parse::<RegistryType>()?).is_some(),
                PARAM_VERSION => version
                    .replace(raw.parse::<u64>().map_err(|_| {
                        IdentifierError::InvalidUri(format!("invalid resource version: {raw}"))
                    })?)
                    .is_some(),
                other => {
                    return Err(IdentifierError::InvalidUri(format!("unknown parameter: {other}")));
                }
            };
            if slot_taken {
                return Err(IdentifierError::InvalidUri(format!("duplicate parameter: {key}")));
            }
        }
        let Some(name) = name else {
            return Err(IdentifierError::InvalidUri("missing registryName".to_string()));
        };
        let Some(registry_type) = registry_type else {
            return Err(IdentifierError::InvalidUri("missing registryType".to_string()));
        };
        Ok((Self::new(owner, name, registry_type)?, version))
    }

    /// Returns the owner identifier.
    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Returns the registry name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the registry type.
    #[must_use]
    pub const fn registry_type(&self) -> RegistryType {
        self.registry_type
    }

    /// Returns the publication address for one registry version.
    #[must_use]
    pub fn resource_uri(&self, version: u64) -> String {
        format!("{self}&{PARAM_VERSION}={version}")
    }
}

impl fmt::Display for RegistryUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}?{PARAM_NAME}={}&{PARAM_TYPE}={}",
            self.owner,
            self.name,
            self.registry_type.as_str()
        )
    }
}

impl FromStr for RegistryUri {
    type Err = IdentifierError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match Self::parse_resource(value)? {
            (uri, None) => Ok(uri),
            (_, Some(_)) => Err(IdentifierError::InvalidUri(
                "resourceVersion is not part of a logical registry uri".to_string(),
            )),
        }
    }
}

impl Serialize for RegistryUri {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RegistryUri {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        value.parse().map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, reason = "Test-only assertions are permitted.")]

    use super::IdentifierError;
    use super::RegistryId;
    use super::RegistryUri;
    use crate::core::registry::RegistryType;

    fn sample_uri() -> RegistryUri {
        RegistryUri::new("did:cheqd:testnet:abc", "employees", RegistryType::BitstringStatusList)
            .expect("valid uri")
    }

    #[test]
    fn uri_display_and_parse_agree() {
        let uri = sample_uri();
        let text = uri.to_string();
        assert_eq!(
            text,
            "did:cheqd:testnet:abc?registryName=employees&registryType=BitstringStatusList"
        );
        assert_eq!(text.parse::<RegistryUri>().expect("parse"), uri);
    }

    #[test]
    fn resource_uri_carries_version() {
        let uri = sample_uri();
        let resource = uri.resource_uri(3);
        let (parsed, version) = RegistryUri::parse_resource(&resource).expect("parse resource");
        assert_eq!(parsed, uri);
        assert_eq!(version, Some(3));
        assert!(resource.parse::<RegistryUri>().is_err());
    }

    #[test]
    fn uri_rejects_reserved_characters_and_unknown_params() {
        assert!(RegistryUri::new("did:x", "a&b", RegistryType::BitstringStatusList).is_err());
        assert!(RegistryUri::new("", "a", RegistryType::BitstringStatusList).is_err());
        assert!(matches!(
            "did:x?registryName=a&registryType=Nope".parse::<RegistryUri>(),
            Err(IdentifierError::UnknownType(_))
        ));
        assert!("did:x?registryName=a&registryType=BitstringStatusList&extra=1"
            .parse::<RegistryUri>()
            .is_err());
        assert!("did:x?registryName=a&registryName=b&registryType=BitstringStatusList"
            .parse::<RegistryUri>()
            .is_err());
    }

    #[test]
    fn derived_registry_ids_are_stable_and_version_scoped() {
        let uri = sample_uri();
        let first = RegistryId::derive(&uri, 1);
        assert_eq!(first, RegistryId::derive(&uri, 1));
        assert_ne!(first, RegistryId::derive(&uri, 2));
        assert_eq!(first.as_str().len(), 32);
    }
}
