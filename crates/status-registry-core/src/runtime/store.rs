// crates/status-registry-core/src/runtime/store.rs
// ============================================================================
// Module: Status Registry In-Memory Backends
// Description: In-memory registry store, issuance ledger, and publisher.
// Purpose: Provide deterministic backends for tests and local tooling.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! In-memory implementations of [`StatusRegistryStore`], [`IssuanceLedger`],
//! and [`RegistryPublisher`]. Each is cheaply cloneable and shares state
//! across clones, so several allocator instances can race against one store
//! the same way separate processes race against a database. Writes follow
//! the same compare-and-swap rules as the durable backends.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use crate::core::CredentialId;
use crate::core::EncodedBlob;
use crate::core::IssuedCredentialReference;
use crate::core::RegistryId;
use crate::core::RegistryUri;
use crate::core::StatusRegistry;
use crate::core::sha256_hex;
use crate::interfaces::IssuanceLedger;
use crate::interfaces::PublishReceipt;
use crate::interfaces::PublishedResource;
use crate::interfaces::PublisherError;
use crate::interfaces::RegistryPublisher;
use crate::interfaces::StatusRegistryStore;
use crate::interfaces::StoreError;
use crate::interfaces::check_registry_write;

// ============================================================================
// SECTION: Registry Store
// ============================================================================

/// In-memory status registry store.
#[derive(Debug, Default, Clone)]
pub struct InMemoryRegistryStore {
    /// Registry records keyed by registry identifier.
    records: Arc<Mutex<BTreeMap<String, StatusRegistry>>>,
}

impl InMemoryRegistryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the record map.
    fn guard(&self) -> Result<MutexGuard<'_, BTreeMap<String, StatusRegistry>>, StoreError> {
        self.records
            .lock()
            .map_err(|_| StoreError::Store("registry store mutex poisoned".to_string()))
    }
}

/// Rejects an insert whose identifier or `(uri, version)` pair is taken.
fn ensure_insertable(
    records: &BTreeMap<String, StatusRegistry>,
    record: &StatusRegistry,
) -> Result<(), StoreError> {
    if records.contains_key(record.registry_id.as_str()) {
        return Err(StoreError::Conflict(format!(
            "registry {} already exists",
            record.registry_id
        )));
    }
    if records.values().any(|existing| existing.uri == record.uri && existing.version == record.version)
    {
        return Err(StoreError::Conflict(format!(
            "registry {} version {} already exists",
            record.uri, record.version
        )));
    }
    record.validate().map_err(|err| StoreError::Invalid(err.to_string()))
}

impl StatusRegistryStore for InMemoryRegistryStore {
    fn create(&self, record: &StatusRegistry) -> Result<StatusRegistry, StoreError> {
        let mut records = self.guard()?;
        ensure_insertable(&records, record)?;
        let mut stored = record.clone();
        stored.row_version = 1;
        records.insert(stored.registry_id.as_str().to_string(), stored.clone());
        drop(records);
        Ok(stored)
    }

    fn load(&self, registry_id: &RegistryId) -> Result<Option<StatusRegistry>, StoreError> {
        Ok(self.guard()?.get(registry_id.as_str()).cloned())
    }

    fn load_latest(&self, uri: &RegistryUri) -> Result<Option<StatusRegistry>, StoreError> {
        let records = self.guard()?;
        Ok(records.values().filter(|record| &record.uri == uri).max_by_key(|record| record.version).cloned())
    }

    fn list_versions(&self, uri: &RegistryUri) -> Result<Vec<StatusRegistry>, StoreError> {
        let mut versions: Vec<StatusRegistry> =
            self.guard()?.values().filter(|record| &record.uri == uri).cloned().collect();
        versions.sort_by_key(|record| record.version);
        Ok(versions)
    }

    fn compare_and_swap(
        &self,
        expected_row_version: u64,
        record: &StatusRegistry,
    ) -> Result<StatusRegistry, StoreError> {
        let mut records = self.guard()?;
        let current = records
            .get(record.registry_id.as_str())
            .ok_or_else(|| StoreError::NotFound(record.registry_id.to_string()))?;
        check_registry_write(current, expected_row_version, record)?;
        let mut stored = record.clone();
        stored.row_version = current.row_version + 1;
        records.insert(stored.registry_id.as_str().to_string(), stored.clone());
        drop(records);
        Ok(stored)
    }

    fn rotate(
        &self,
        expected_row_version: u64,
        previous: &StatusRegistry,
        next: &StatusRegistry,
    ) -> Result<StatusRegistry, StoreError> {
        if next.uri != previous.uri || next.version != previous.version + 1 {
            return Err(StoreError::Invalid(
                "successor must share the uri and follow the predecessor version".to_string(),
            ));
        }
        let mut records = self.guard()?;
        let current = records
            .get(previous.registry_id.as_str())
            .ok_or_else(|| StoreError::NotFound(previous.registry_id.to_string()))?;
        check_registry_write(current, expected_row_version, previous)?;
        ensure_insertable(&records, next)?;
        let mut deprecated = previous.clone();
        deprecated.row_version = current.row_version + 1;
        let mut successor = next.clone();
        successor.row_version = 1;
        records.insert(deprecated.registry_id.as_str().to_string(), deprecated);
        records.insert(successor.registry_id.as_str().to_string(), successor.clone());
        drop(records);
        Ok(successor)
    }
}

// ============================================================================
// SECTION: Issuance Ledger
// ============================================================================

/// In-memory issuance ledger.
///
/// # Invariants
/// - Through [`IssuanceLedger::upsert`], no two credentials share a
///   `(status_registry_id, status_index)` pair.
#[derive(Debug, Clone)]
pub struct InMemoryIssuanceLedger {
    /// Credential references keyed by credential identifier.
    references: Arc<Mutex<BTreeMap<String, IssuedCredentialReference>>>,
    /// Availability toggle used to simulate ledger outages.
    available: Arc<Mutex<bool>>,
}

impl Default for InMemoryIssuanceLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryIssuanceLedger {
    /// Creates an empty, available ledger.
    #[must_use]
    pub fn new() -> Self {
        Self {
            references: Arc::new(Mutex::new(BTreeMap::new())),
            available: Arc::new(Mutex::new(true)),
        }
    }

    /// Marks the ledger reachable or unreachable.
    pub fn set_available(&self, available: bool) {
        if let Ok(mut flag) = self.available.lock() {
            *flag = available;
        }
    }

    /// Inserts a reference without the uniqueness check.
    ///
    /// Models records imported from legacy systems, which may already carry
    /// duplicate or out-of-range indices.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Store`] when the ledger mutex is poisoned.
    pub fn import_unchecked(&self, reference: IssuedCredentialReference) -> Result<(), StoreError> {
        self.guard()?.insert(reference.credential_id.as_str().to_string(), reference);
        Ok(())
    }

    /// Locks the reference map after checking availability.
    fn guard(
        &self,
    ) -> Result<MutexGuard<'_, BTreeMap<String, IssuedCredentialReference>>, StoreError> {
        let available = self
            .available
            .lock()
            .map_err(|_| StoreError::Store("ledger mutex poisoned".to_string()))
            .map(|flag| *flag)?;
        if !available {
            return Err(StoreError::Io("issuance ledger unavailable".to_string()));
        }
        self.references.lock().map_err(|_| StoreError::Store("ledger mutex poisoned".to_string()))
    }
}

impl IssuanceLedger for InMemoryIssuanceLedger {
    fn upsert(&self, reference: &IssuedCredentialReference) -> Result<(), StoreError> {
        let mut references = self.guard()?;
        if let (Some(registry_id), Some(index)) =
            (&reference.status_registry_id, reference.status_index)
        {
            let taken = references.values().any(|existing| {
                existing.credential_id != reference.credential_id
                    && existing.status_registry_id.as_ref() == Some(registry_id)
                    && existing.status_index == Some(index)
            });
            if taken {
                return Err(StoreError::Conflict(format!(
                    "index {index} of registry {registry_id} already assigned"
                )));
            }
        }
        references.insert(reference.credential_id.as_str().to_string(), reference.clone());
        drop(references);
        Ok(())
    }

    fn get(
        &self,
        credential_id: &CredentialId,
    ) -> Result<Option<IssuedCredentialReference>, StoreError> {
        Ok(self.guard()?.get(credential_id.as_str()).cloned())
    }

    fn references_for(
        &self,
        registry_id: &RegistryId,
    ) -> Result<Vec<IssuedCredentialReference>, StoreError> {
        Ok(self
            .guard()?
            .values()
            .filter(|reference| reference.status_registry_id.as_ref() == Some(registry_id))
            .cloned()
            .collect())
    }
}

// ============================================================================
// SECTION: Publisher
// ============================================================================

/// In-memory registry publisher.
#[derive(Debug, Default, Clone)]
pub struct InMemoryPublisher {
    /// Published resources keyed by resource URI.
    resources: Arc<Mutex<BTreeMap<String, PublishedResource>>>,
    /// Number of upcoming publish calls that fail as unavailable.
    pending_failures: Arc<Mutex<u32>>,
}

impl InMemoryPublisher {
    /// Creates an empty publisher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` publish calls fail with
    /// [`PublisherError::Unavailable`].
    pub fn fail_next(&self, count: u32) {
        if let Ok(mut pending) = self.pending_failures.lock() {
            *pending = count;
        }
    }

    /// Seeds a resource as if it had been published earlier.
    ///
    /// # Errors
    ///
    /// Returns [`PublisherError::Unavailable`] when the mutex is poisoned.
    pub fn put(
        &self,
        resource_uri: &str,
        blob: EncodedBlob,
        declared_length: Option<u64>,
    ) -> Result<(), PublisherError> {
        let mut resources = self.guard()?;
        let revision = resources.get(resource_uri).map_or(1, |existing| existing.revision + 1);
        resources.insert(
            resource_uri.to_string(),
            PublishedResource {
                resource_uri: resource_uri.to_string(),
                blob,
                declared_length,
                revision,
            },
        );
        drop(resources);
        Ok(())
    }

    /// Locks the resource map.
    fn guard(&self) -> Result<MutexGuard<'_, BTreeMap<String, PublishedResource>>, PublisherError> {
        self.resources
            .lock()
            .map_err(|_| PublisherError::Unavailable("publisher mutex poisoned".to_string()))
    }
}

impl RegistryPublisher for InMemoryPublisher {
    fn resolve(&self, resource_uri: &str) -> Result<Option<PublishedResource>, PublisherError> {
        Ok(self.guard()?.get(resource_uri).cloned())
    }

    fn publish(
        &self,
        resource_uri: &str,
        blob: &EncodedBlob,
        declared_length: u64,
        expected_revision: Option<u64>,
    ) -> Result<PublishReceipt, PublisherError> {
        {
            let mut pending = self
                .pending_failures
                .lock()
                .map_err(|_| PublisherError::Unavailable("publisher mutex poisoned".to_string()))?;
            if *pending > 0 {
                *pending -= 1;
                return Err(PublisherError::Unavailable("publisher offline".to_string()));
            }
        }
        let mut resources = self.guard()?;
        let current = resources.get(resource_uri).map_or(0, |resource| resource.revision);
        if let Some(expected) = expected_revision
            && expected != current
        {
            return Err(PublisherError::Conflict(format!(
                "{resource_uri}: expected revision {expected}, found {current}"
            )));
        }
        let revision = current + 1;
        resources.insert(
            resource_uri.to_string(),
            PublishedResource {
                resource_uri: resource_uri.to_string(),
                blob: blob.clone(),
                declared_length: Some(declared_length),
                revision,
            },
        );
        drop(resources);
        Ok(PublishReceipt {
            resource_uri: resource_uri.to_string(),
            revision,
            checksum: sha256_hex(blob.payload.as_bytes()),
        })
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used, reason = "Test-only assertions are permitted.")]

    use super::InMemoryIssuanceLedger;
    use super::InMemoryPublisher;
    use super::InMemoryRegistryStore;
    use crate::core::CredentialId;
    use crate::core::Encoding;
    use crate::core::IssuedCredentialReference;
    use crate::core::RegistryState;
    use crate::core::RegistryType;
    use crate::core::RegistryUri;
    use crate::core::StatusBitstring;
    use crate::core::StatusRegistry;
    use crate::core::Timestamp;
    use crate::core::codec;
    use crate::interfaces::IssuanceLedger;
    use crate::interfaces::PublisherError;
    use crate::interfaces::RegistryPublisher;
    use crate::interfaces::StatusRegistryStore;
    use crate::interfaces::StoreError;

    fn registry(version: u64) -> StatusRegistry {
        let uri = RegistryUri::new("did:example:issuer", "employees", RegistryType::BitstringStatusList)
            .expect("uri");
        StatusRegistry::new(uri, version, 16, 80, Timestamp::from_unix_millis(0)).expect("registry")
    }

    #[test]
    fn compare_and_swap_rejects_stale_row_version() {
        let store = InMemoryRegistryStore::new();
        let stored = store.create(&registry(1)).expect("create");
        let mut first = stored.clone();
        first.write_cursor = 1;
        let mut second = stored.clone();
        second.write_cursor = 1;
        let written = store.compare_and_swap(stored.row_version, &first).expect("first write");
        assert_eq!(written.row_version, 2);
        let err = store.compare_and_swap(stored.row_version, &second).unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[test]
    fn duplicate_uri_version_is_a_conflict() {
        let store = InMemoryRegistryStore::new();
        store.create(&registry(1)).expect("create");
        assert!(matches!(store.create(&registry(1)), Err(StoreError::Conflict(_))));
    }

    #[test]
    fn rotate_writes_both_records_or_neither() {
        let store = InMemoryRegistryStore::new();
        let stored = store.create(&registry(1)).expect("create");
        let mut previous = stored.clone();
        previous.state = RegistryState::Deprecated;
        store.create(&registry(2)).expect("occupy successor slot");
        let err = store.rotate(stored.row_version, &previous, &registry(2)).unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        let reloaded = store.load(&stored.registry_id).expect("load").expect("present");
        assert_eq!(reloaded.state, RegistryState::Active);
    }

    #[test]
    fn ledger_rejects_shared_index_and_reports_outage() {
        let ledger = InMemoryIssuanceLedger::new();
        let registry_id = registry(1).registry_id;
        ledger
            .upsert(&IssuedCredentialReference::allocated(
                CredentialId::new("a"),
                registry_id.clone(),
                3,
            ))
            .expect("first");
        let err = ledger
            .upsert(&IssuedCredentialReference::allocated(CredentialId::new("b"), registry_id.clone(), 3))
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        ledger.set_available(false);
        let err = ledger.references_for(&registry_id).unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn publish_rejects_stale_expected_revision() {
        let publisher = InMemoryPublisher::new();
        let blob = codec::encode(&StatusBitstring::zeroed(16), Encoding::default()).expect("encode");
        let first = publisher.publish("res", &blob, 16, Some(0)).expect("first publish");
        assert_eq!(first.revision, 1);
        let err = publisher.publish("res", &blob, 16, Some(0)).unwrap_err();
        assert!(matches!(err, PublisherError::Conflict(_)));
        let second = publisher.publish("res", &blob, 16, Some(1)).expect("current revision");
        assert_eq!(second.revision, 2);
        let forced = publisher.publish("res", &blob, 16, None).expect("unconditional");
        assert_eq!(forced.revision, 3);
    }
}
