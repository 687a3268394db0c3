// crates/status-registry-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Status Registry Store
// Description: Durable StatusRegistryStore and IssuanceLedger backed by SQLite.
// Purpose: Persist registry records with compare-and-swap writes and history.
// Dependencies: status-registry-core, rusqlite, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Registry records are stored as JSON snapshots keyed by registry identifier
//! with a `UNIQUE (uri, version)` constraint. Each write runs in a
//! `BEGIN IMMEDIATE` transaction, re-reads the row, applies the shared
//! compare-and-swap rules, and appends a hashed snapshot to
//! `status_registry_revisions`. Loads verify the stored hash and fail closed
//! on corruption.
//!
//! Issued credential links live in `issued_credentials`; a partial unique
//! index on `(registry_id, status_index)` keeps two credentials from sharing
//! one bit.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use rusqlite::Connection;
use rusqlite::ErrorCode;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::TransactionBehavior;
use rusqlite::params;
use serde::Deserialize;
use status_registry_core::CredentialId;
use status_registry_core::IssuanceLedger;
use status_registry_core::IssuedCredentialReference;
use status_registry_core::RegistryId;
use status_registry_core::RegistryUri;
use status_registry_core::StatusRegistry;
use status_registry_core::StatusRegistryStore;
use status_registry_core::StoreError;
use status_registry_core::interfaces::check_registry_write;
use status_registry_core::sha256_hex;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum serialized registry or credential record accepted by the store.
pub const MAX_RECORD_BYTES: usize = 32 * 1024 * 1024;

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` registry store.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl SqliteStoreConfig {
    /// Builds a configuration with default pragmas for `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
#[derive(Debug, Error)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// Database is locked by another writer.
    #[error("sqlite store busy: {0}")]
    Busy(String),
    /// Compare-and-swap or uniqueness conflict.
    #[error("sqlite store conflict: {0}")]
    Conflict(String),
    /// Referenced row does not exist.
    #[error("sqlite store record not found: {0}")]
    NotFound(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Store corruption or hash mismatch.
    #[error("sqlite store corruption: {0}")]
    Corrupt(String),
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid store data.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
    /// Store payload exceeded configured size limits.
    #[error("sqlite store payload too large: {actual_bytes} bytes (max {max_bytes})")]
    TooLarge {
        /// Maximum allowed bytes.
        max_bytes: usize,
        /// Actual payload size in bytes.
        actual_bytes: usize,
    },
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) => Self::Io(message),
            SqliteStoreError::Busy(message) => Self::Busy(message),
            SqliteStoreError::Conflict(message) => Self::Conflict(message),
            SqliteStoreError::NotFound(message) => Self::NotFound(message),
            SqliteStoreError::Db(message) => Self::Store(message),
            SqliteStoreError::Corrupt(message) => Self::Corrupt(message),
            SqliteStoreError::VersionMismatch(message) => Self::VersionMismatch(message),
            SqliteStoreError::Invalid(message) => Self::Invalid(message),
            SqliteStoreError::TooLarge {
                max_bytes,
                actual_bytes,
            } => Self::Invalid(format!(
                "record exceeds size limit: {actual_bytes} bytes (max {max_bytes})"
            )),
        }
    }
}

impl From<StoreError> for SqliteStoreError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Io(message) => Self::Io(message),
            StoreError::Busy(message) => Self::Busy(message),
            StoreError::Conflict(message) => Self::Conflict(message),
            StoreError::NotFound(message) => Self::NotFound(message),
            StoreError::Corrupt(message) => Self::Corrupt(message),
            StoreError::VersionMismatch(message) => Self::VersionMismatch(message),
            StoreError::Invalid(message) => Self::Invalid(message),
            StoreError::Store(message) => Self::Db(message),
        }
    }
}

/// Classifies a `rusqlite` error.
fn db_error(error: &rusqlite::Error) -> SqliteStoreError {
    match error.sqlite_error_code() {
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => {
            SqliteStoreError::Busy(error.to_string())
        }
        Some(ErrorCode::ConstraintViolation) => SqliteStoreError::Conflict(error.to_string()),
        _ => SqliteStoreError::Db(error.to_string()),
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed status registry store and issuance ledger.
#[derive(Clone)]
pub struct SqliteRegistryStore {
    /// Shared `SQLite` connection guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
}

impl SqliteRegistryStore {
    /// Opens an `SQLite`-backed registry store.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or
    /// initialized.
    pub fn new(config: &SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        validate_store_path(&config.path)?;
        ensure_parent_dir(&config.path)?;
        let mut connection = open_connection(config)?;
        initialize_schema(&mut connection)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Locks the shared connection.
    fn guard(&self) -> Result<MutexGuard<'_, Connection>, SqliteStoreError> {
        self.connection.lock().map_err(|_| SqliteStoreError::Db("mutex poisoned".to_string()))
    }

    /// Returns the number of stored revisions for a registry.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the query fails.
    pub fn revision_count(&self, registry_id: &RegistryId) -> Result<u64, SqliteStoreError> {
        let count: i64 = self
            .guard()?
            .query_row(
                "SELECT COUNT(*) FROM status_registry_revisions WHERE registry_id = ?1",
                params![registry_id.as_str()],
                |row| row.get(0),
            )
            .map_err(|err| db_error(&err))?;
        u64::try_from(count).map_err(|_| SqliteStoreError::Corrupt("negative revision count".to_string()))
    }

    /// Inserts a new registry version.
    fn create_record(&self, record: &StatusRegistry) -> Result<StatusRegistry, SqliteStoreError> {
        record.validate().map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
        let mut stored = record.clone();
        stored.row_version = 1;
        let saved_at = unix_millis();
        let mut guard = self.guard()?;
        let tx = guard
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|err| db_error(&err))?;
        insert_record(&tx, &stored, saved_at)?;
        tx.commit().map_err(|err| db_error(&err))?;
        drop(guard);
        Ok(stored)
    }

    /// Compare-and-swap write of an existing registry version.
    fn swap_record(
        &self,
        expected_row_version: u64,
        record: &StatusRegistry,
    ) -> Result<StatusRegistry, SqliteStoreError> {
        let saved_at = unix_millis();
        let mut guard = self.guard()?;
        let tx = guard
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|err| db_error(&err))?;
        let current = load_record(&tx, record.registry_id.as_str())?
            .ok_or_else(|| SqliteStoreError::NotFound(record.registry_id.to_string()))?;
        check_registry_write(&current, expected_row_version, record)?;
        let mut stored = record.clone();
        stored.row_version = current.row_version + 1;
        update_record(&tx, current.row_version, &stored, saved_at)?;
        tx.commit().map_err(|err| db_error(&err))?;
        drop(guard);
        Ok(stored)
    }

    /// Deprecates `previous` and inserts `next` in one transaction.
    fn rotate_records(
        &self,
        expected_row_version: u64,
        previous: &StatusRegistry,
        next: &StatusRegistry,
    ) -> Result<StatusRegistry, SqliteStoreError> {
        if next.uri != previous.uri || next.version != previous.version + 1 {
            return Err(SqliteStoreError::Invalid(
                "successor must share the uri and follow the predecessor version".to_string(),
            ));
        }
        next.validate().map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
        let saved_at = unix_millis();
        let mut guard = self.guard()?;
        let tx = guard
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|err| db_error(&err))?;
        let current = load_record(&tx, previous.registry_id.as_str())?
            .ok_or_else(|| SqliteStoreError::NotFound(previous.registry_id.to_string()))?;
        check_registry_write(&current, expected_row_version, previous)?;
        let mut deprecated = previous.clone();
        deprecated.row_version = current.row_version + 1;
        update_record(&tx, current.row_version, &deprecated, saved_at)?;
        let mut successor = next.clone();
        successor.row_version = 1;
        insert_record(&tx, &successor, saved_at)?;
        tx.commit().map_err(|err| db_error(&err))?;
        drop(guard);
        Ok(successor)
    }

    /// Loads registry records matching a URI, ordered by version.
    fn query_versions(
        &self,
        uri: &RegistryUri,
        latest_only: bool,
    ) -> Result<Vec<StatusRegistry>, SqliteStoreError> {
        let sql = if latest_only {
            "SELECT registry_id, record_json, record_hash FROM status_registries WHERE uri = ?1 \
             ORDER BY version DESC LIMIT 1"
        } else {
            "SELECT registry_id, record_json, record_hash FROM status_registries WHERE uri = ?1 \
             ORDER BY version ASC"
        };
        let rows: Vec<(String, Vec<u8>, String)> = {
            let guard = self.guard()?;
            let mut statement = guard.prepare(sql).map_err(|err| db_error(&err))?;
            let mapped = statement
                .query_map(params![uri.to_string()], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
                })
                .map_err(|err| db_error(&err))?;
            mapped.collect::<Result<_, _>>().map_err(|err| db_error(&err))?
        };
        rows.iter()
            .map(|(registry_id, bytes, hash)| decode_record(registry_id, bytes, hash))
            .collect()
    }

    /// Inserts or replaces a credential reference.
    fn upsert_reference(
        &self,
        reference: &IssuedCredentialReference,
    ) -> Result<(), SqliteStoreError> {
        let bytes = serde_json::to_vec(reference)
            .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
        ensure_record_size(bytes.len())?;
        let status_index = reference.status_index.map(|index| to_i64(index, "status_index")).transpose()?;
        let registry_id = reference.status_registry_id.as_ref().map(RegistryId::as_str);
        let guard = self.guard()?;
        guard
            .execute(
                "INSERT INTO issued_credentials (credential_id, registry_id, status_index, \
                 reference_json, updated_at) VALUES (?1, ?2, ?3, ?4, ?5) ON CONFLICT(credential_id) \
                 DO UPDATE SET registry_id = excluded.registry_id, status_index = \
                 excluded.status_index, reference_json = excluded.reference_json, updated_at = \
                 excluded.updated_at",
                params![
                    reference.credential_id.as_str(),
                    registry_id,
                    status_index,
                    bytes,
                    unix_millis()
                ],
            )
            .map_err(|err| db_error(&err))?;
        drop(guard);
        Ok(())
    }

    /// Loads credential references matching a filter column.
    fn query_references(
        &self,
        sql: &str,
        key: &str,
    ) -> Result<Vec<IssuedCredentialReference>, SqliteStoreError> {
        let rows: Vec<Vec<u8>> = {
            let guard = self.guard()?;
            let mut statement = guard.prepare(sql).map_err(|err| db_error(&err))?;
            let mapped =
                statement.query_map(params![key], |row| row.get(0)).map_err(|err| db_error(&err))?;
            mapped.collect::<Result<_, _>>().map_err(|err| db_error(&err))?
        };
        rows.iter()
            .map(|bytes| {
                ensure_record_size(bytes.len())?;
                serde_json::from_slice(bytes).map_err(|err| SqliteStoreError::Invalid(err.to_string()))
            })
            .collect()
    }
}

impl StatusRegistryStore for SqliteRegistryStore {
    fn create(&self, record: &StatusRegistry) -> Result<StatusRegistry, StoreError> {
        self.create_record(record).map_err(StoreError::from)
    }

    fn load(&self, registry_id: &RegistryId) -> Result<Option<StatusRegistry>, StoreError> {
        let guard = self.guard()?;
        let record = load_record(&guard, registry_id.as_str())?;
        drop(guard);
        Ok(record)
    }

    fn load_latest(&self, uri: &RegistryUri) -> Result<Option<StatusRegistry>, StoreError> {
        Ok(self.query_versions(uri, true)?.into_iter().next())
    }

    fn list_versions(&self, uri: &RegistryUri) -> Result<Vec<StatusRegistry>, StoreError> {
        Ok(self.query_versions(uri, false)?)
    }

    fn compare_and_swap(
        &self,
        expected_row_version: u64,
        record: &StatusRegistry,
    ) -> Result<StatusRegistry, StoreError> {
        self.swap_record(expected_row_version, record).map_err(StoreError::from)
    }

    fn rotate(
        &self,
        expected_row_version: u64,
        previous: &StatusRegistry,
        next: &StatusRegistry,
    ) -> Result<StatusRegistry, StoreError> {
        self.rotate_records(expected_row_version, previous, next).map_err(StoreError::from)
    }

    fn readiness(&self) -> Result<(), StoreError> {
        let guard = self.guard()?;
        guard
            .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get::<_, i64>(0))
            .map_err(|err| StoreError::from(db_error(&err)))?;
        drop(guard);
        Ok(())
    }
}

impl IssuanceLedger for SqliteRegistryStore {
    fn upsert(&self, reference: &IssuedCredentialReference) -> Result<(), StoreError> {
        self.upsert_reference(reference).map_err(StoreError::from)
    }

    fn get(
        &self,
        credential_id: &CredentialId,
    ) -> Result<Option<IssuedCredentialReference>, StoreError> {
        Ok(self
            .query_references(
                "SELECT reference_json FROM issued_credentials WHERE credential_id = ?1",
                credential_id.as_str(),
            )?
            .into_iter()
            .next())
    }

    fn references_for(
        &self,
        registry_id: &RegistryId,
    ) -> Result<Vec<IssuedCredentialReference>, StoreError> {
        Ok(self.query_references(
            "SELECT reference_json FROM issued_credentials WHERE registry_id = ?1 ORDER BY \
             credential_id",
            registry_id.as_str(),
        )?)
    }
}

// ============================================================================
// SECTION: Record Helpers
// ============================================================================

/// Serializes a registry record and returns its bytes and digest.
fn encode_record(record: &StatusRegistry) -> Result<(Vec<u8>, String), SqliteStoreError> {
    let bytes =
        serde_json::to_vec(record).map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
    ensure_record_size(bytes.len())?;
    let hash = sha256_hex(&bytes);
    Ok((bytes, hash))
}

/// Verifies and deserializes a stored registry record.
fn decode_record(
    registry_id: &str,
    bytes: &[u8],
    hash: &str,
) -> Result<StatusRegistry, SqliteStoreError> {
    ensure_record_size(bytes.len())?;
    if sha256_hex(bytes) != hash {
        return Err(SqliteStoreError::Corrupt(format!("hash mismatch for registry {registry_id}")));
    }
    let record: StatusRegistry =
        serde_json::from_slice(bytes).map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
    if record.registry_id.as_str() != registry_id {
        return Err(SqliteStoreError::Invalid(
            "registry_id mismatch between key and payload".to_string(),
        ));
    }
    Ok(record)
}

/// Loads one registry record through `connection` (or an open transaction).
fn load_record(
    connection: &Connection,
    registry_id: &str,
) -> Result<Option<StatusRegistry>, SqliteStoreError> {
    let row: Option<(Vec<u8>, String)> = connection
        .query_row(
            "SELECT record_json, record_hash FROM status_registries WHERE registry_id = ?1",
            params![registry_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .map_err(|err| db_error(&err))?;
    row.map(|(bytes, hash)| decode_record(registry_id, &bytes, &hash)).transpose()
}

/// Inserts a registry row and its first revision.
fn insert_record(
    connection: &Connection,
    record: &StatusRegistry,
    saved_at: i64,
) -> Result<(), SqliteStoreError> {
    let (bytes, hash) = encode_record(record)?;
    let version = to_i64(record.version, "version")?;
    let row_version = to_i64(record.row_version, "row_version")?;
    connection
        .execute(
            "INSERT INTO status_registries (registry_id, uri, version, row_version, record_json, \
             record_hash, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.registry_id.as_str(),
                record.uri.to_string(),
                version,
                row_version,
                bytes,
                hash,
                saved_at
            ],
        )
        .map_err(|err| db_error(&err))?;
    append_revision(connection, record.registry_id.as_str(), row_version, &bytes, &hash, saved_at)
}

/// Replaces a registry row guarded by its current row version.
fn update_record(
    connection: &Connection,
    current_row_version: u64,
    record: &StatusRegistry,
    saved_at: i64,
) -> Result<(), SqliteStoreError> {
    let (bytes, hash) = encode_record(record)?;
    let row_version = to_i64(record.row_version, "row_version")?;
    let expected = to_i64(current_row_version, "row_version")?;
    let changed = connection
        .execute(
            "UPDATE status_registries SET row_version = ?1, record_json = ?2, record_hash = ?3, \
             updated_at = ?4 WHERE registry_id = ?5 AND row_version = ?6",
            params![row_version, bytes, hash, saved_at, record.registry_id.as_str(), expected],
        )
        .map_err(|err| db_error(&err))?;
    if changed != 1 {
        return Err(SqliteStoreError::Conflict(format!(
            "registry {} changed concurrently",
            record.registry_id
        )));
    }
    append_revision(connection, record.registry_id.as_str(), row_version, &bytes, &hash, saved_at)
}

/// Appends a snapshot to the revision history.
fn append_revision(
    connection: &Connection,
    registry_id: &str,
    row_version: i64,
    bytes: &[u8],
    hash: &str,
    saved_at: i64,
) -> Result<(), SqliteStoreError> {
    connection
        .execute(
            "INSERT INTO status_registry_revisions (registry_id, row_version, record_json, \
             record_hash, saved_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![registry_id, row_version, bytes, hash, saved_at],
        )
        .map_err(|err| db_error(&err))?;
    Ok(())
}

/// Rejects oversized payloads.
const fn ensure_record_size(actual_bytes: usize) -> Result<(), SqliteStoreError> {
    if actual_bytes > MAX_RECORD_BYTES {
        return Err(SqliteStoreError::TooLarge {
            max_bytes: MAX_RECORD_BYTES,
            actual_bytes,
        });
    }
    Ok(())
}

/// Converts an unsigned column value to `SQLite`'s integer type.
fn to_i64(value: u64, field: &str) -> Result<i64, SqliteStoreError> {
    i64::try_from(value).map_err(|_| SqliteStoreError::Invalid(format!("{field} out of range")))
}

// ============================================================================
// SECTION: Connection Helpers
// ============================================================================

/// Ensures the parent directory for the store exists.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    let Some(parent) = path.parent() else {
        return Err(SqliteStoreError::Io("store path missing parent directory".to_string()));
    };
    std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))
}

/// Validates store paths for safety limits.
fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
    let path_string = path.display().to_string();
    if path_string.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteStoreError::Invalid("store path exceeds length limit".to_string()));
    }
    for component in path.components() {
        let name = component.as_os_str().to_string_lossy();
        if name.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(SqliteStoreError::Invalid(
                "store path contains an overlong component".to_string(),
            ));
        }
    }
    if path.is_dir() {
        return Err(SqliteStoreError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

/// Opens an `SQLite` connection with durable defaults.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection =
        Connection::open_with_flags(&config.path, flags).map_err(|err| db_error(&err))?;
    connection
        .busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))
        .map_err(|err| db_error(&err))?;
    connection.execute_batch("PRAGMA foreign_keys = ON;").map_err(|err| db_error(&err))?;
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(|err| db_error(&err))?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(|err| db_error(&err))?;
    Ok(connection)
}

/// Initializes the `SQLite` schema or validates the existing version.
fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(|err| db_error(&err))?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(|err| db_error(&err))?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(|err| db_error(&err))?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
                .map_err(|err| db_error(&err))?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS status_registries (
                    registry_id TEXT PRIMARY KEY,
                    uri TEXT NOT NULL,
                    version INTEGER NOT NULL,
                    row_version INTEGER NOT NULL,
                    record_json BLOB NOT NULL,
                    record_hash TEXT NOT NULL,
                    updated_at INTEGER NOT NULL,
                    UNIQUE (uri, version)
                );
                CREATE TABLE IF NOT EXISTS status_registry_revisions (
                    registry_id TEXT NOT NULL,
                    row_version INTEGER NOT NULL,
                    record_json BLOB NOT NULL,
                    record_hash TEXT NOT NULL,
                    saved_at INTEGER NOT NULL,
                    PRIMARY KEY (registry_id, row_version),
                    FOREIGN KEY (registry_id) REFERENCES status_registries(registry_id)
                );
                CREATE TABLE IF NOT EXISTS issued_credentials (
                    credential_id TEXT PRIMARY KEY,
                    registry_id TEXT,
                    status_index INTEGER,
                    reference_json BLOB NOT NULL,
                    updated_at INTEGER NOT NULL
                );
                CREATE UNIQUE INDEX IF NOT EXISTS idx_issued_credentials_slot
                    ON issued_credentials (registry_id, status_index)
                    WHERE registry_id IS NOT NULL AND status_index IS NOT NULL;
                CREATE INDEX IF NOT EXISTS idx_issued_credentials_registry
                    ON issued_credentials (registry_id);",
            )
            .map_err(|err| db_error(&err))?;
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(value) => {
            return Err(SqliteStoreError::VersionMismatch(format!(
                "unsupported schema version: {value}"
            )));
        }
    }
    tx.commit().map_err(|err| db_error(&err))?;
    Ok(())
}

/// Returns the current unix epoch in milliseconds.
fn unix_millis() -> i64 {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    i64::try_from(now.as_millis()).unwrap_or(i64::MAX)
}
