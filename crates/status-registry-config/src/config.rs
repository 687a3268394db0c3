// crates/status-registry-config/src/config.rs
// ============================================================================
// Module: Status Registry Configuration
// Description: Configuration loading and validation for the registry allocator.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: status-registry-core, status-registry-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! Every section has defaults, so an empty file is a valid configuration.
//! Unknown keys and out-of-range values are rejected rather than ignored.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;
use status_registry_core::AllocatorConfig;
use status_registry_core::BatchConfig;
use status_registry_core::DEFAULT_CAPACITY_BITS;
use status_registry_core::DEFAULT_HOLD_TTL_MS;
use status_registry_core::Encoding;
use status_registry_core::FileAuditSink;
use status_registry_core::IssuanceLedger;
use status_registry_core::MAX_BITSTRING_BITS;
use status_registry_core::NoopAuditSink;
use status_registry_core::ReconciliationEngine;
use status_registry_core::RegistryAuditSink;
use status_registry_core::RegistryPublisher;
use status_registry_core::RetryPolicy;
use status_registry_core::StatusRegistryStore;
use status_registry_core::StderrAuditSink;
use status_registry_store_sqlite::SqliteRegistryStore;
use status_registry_store_sqlite::SqliteStoreConfig;
use status_registry_store_sqlite::SqliteStoreMode;
use status_registry_store_sqlite::SqliteSyncMode;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "status-registry.toml";
/// Environment variable used to override the config path.
pub(crate) const CONFIG_ENV_VAR: &str = "STATUS_REGISTRY_CONFIG";
/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Upper bound on retry attempts for any retry schedule.
pub(crate) const MAX_RETRY_ATTEMPTS: u32 = 100;
/// Upper bound on any single backoff delay.
pub(crate) const MAX_BACKOFF_MS: u64 = 60_000;
/// Upper bound on the allocation deadline.
pub(crate) const MAX_TIMEOUT_MS: u64 = 600_000;
/// Upper bound on items per reconciliation batch.
pub(crate) const MAX_BATCH_SIZE: usize = 10_000;
/// Upper bound on the pause between reconciliation batches.
pub(crate) const MAX_INTER_BATCH_DELAY_MS: u64 = 600_000;
/// Upper bound on the maintenance hold TTL (24 hours).
pub(crate) const MAX_HOLD_TTL_MS: u64 = 24 * 60 * 60 * 1_000;

// ============================================================================
// SECTION: Root Config
// ============================================================================

/// Status registry configuration root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StatusRegistryConfig {
    /// Allocation retry and rotation settings.
    #[serde(default)]
    pub allocator: AllocationConfig,
    /// Bitstring encoding settings.
    #[serde(default)]
    pub codec: CodecConfig,
    /// Reconciliation batch pacing.
    #[serde(default)]
    pub reconciliation: ReconciliationConfig,
    /// Publisher retry settings.
    #[serde(default)]
    pub publisher: PublisherConfig,
    /// Registry store backend.
    #[serde(default)]
    pub store: RegistryStoreConfig,
    /// Audit event sink.
    #[serde(default)]
    pub audit: AuditConfig,
}

impl StatusRegistryConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// Resolution order: explicit `path`, then the `STATUS_REGISTRY_CONFIG`
    /// environment variable, then `status-registry.toml` in the working
    /// directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        Self::from_bytes(&bytes)
    }

    /// Parses and validates configuration from raw file bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the bytes are oversized, not UTF-8,
    /// malformed, or invalid.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ConfigError> {
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.allocator.validate()?;
        self.codec.validate()?;
        self.reconciliation.validate()?;
        self.publisher.validate()?;
        self.store.validate()?;
        self.audit.validate()
    }

    /// Returns the allocator runtime settings.
    #[must_use]
    pub const fn allocator_config(&self) -> AllocatorConfig {
        AllocatorConfig {
            retry: self.allocator.retry_policy(),
            timeout_ms: self.allocator.timeout_ms,
            auto_rotate: self.allocator.auto_rotate,
            encoding: self.codec.encoding,
            publish_retry: self.publisher.retry_policy(),
        }
    }

    /// Returns the reconciliation batch pacing.
    #[must_use]
    pub const fn batch_config(&self) -> BatchConfig {
        BatchConfig {
            batch_size: self.reconciliation.batch_size,
            inter_batch_delay_ms: self.reconciliation.inter_batch_delay_ms,
        }
    }

    /// Applies the codec fallback capacity and hold TTL to a reconciliation
    /// engine.
    #[must_use]
    pub fn configure_engine<S, L, P>(
        &self,
        engine: ReconciliationEngine<S, L, P>,
    ) -> ReconciliationEngine<S, L, P>
    where
        S: StatusRegistryStore,
        L: IssuanceLedger,
        P: RegistryPublisher,
    {
        engine
            .with_default_capacity(self.codec.default_capacity)
            .with_hold_ttl_ms(self.reconciliation.hold_ttl_ms)
    }
}

// ============================================================================
// SECTION: Allocator
// ============================================================================

/// Allocation retry and rotation settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AllocationConfig {
    /// Total allocation attempts including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Backoff before the second attempt (milliseconds).
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    /// Backoff ceiling (milliseconds).
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
    /// Deadline for one allocation call (milliseconds).
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Rotate automatically when the latest version is full.
    #[serde(default)]
    pub auto_rotate: bool,
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            timeout_ms: default_timeout_ms(),
            auto_rotate: false,
        }
    }
}

impl AllocationConfig {
    /// Validates allocation settings.
    fn validate(&self) -> Result<(), ConfigError> {
        validate_retry("allocator", self.max_attempts, self.backoff_base_ms, self.backoff_max_ms)?;
        if self.timeout_ms == 0 || self.timeout_ms > MAX_TIMEOUT_MS {
            return Err(ConfigError::Invalid(format!(
                "allocator.timeout_ms must be between 1 and {MAX_TIMEOUT_MS}"
            )));
        }
        Ok(())
    }

    /// Returns the retry schedule.
    const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay_ms: self.backoff_base_ms,
            max_delay_ms: self.backoff_max_ms,
        }
    }
}

// ============================================================================
// SECTION: Codec
// ============================================================================

/// Bitstring encoding settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CodecConfig {
    /// Text encoding for published bitstrings.
    #[serde(default)]
    pub encoding: Encoding,
    /// Capacity (bits) used when a migrated registry's size cannot be inferred.
    #[serde(default = "default_capacity")]
    pub default_capacity: u64,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            encoding: Encoding::default(),
            default_capacity: DEFAULT_CAPACITY_BITS,
        }
    }
}

impl CodecConfig {
    /// Validates codec settings.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.default_capacity == 0 || self.default_capacity > MAX_BITSTRING_BITS {
            return Err(ConfigError::Invalid(format!(
                "codec.default_capacity must be between 1 and {MAX_BITSTRING_BITS}"
            )));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Reconciliation
// ============================================================================

/// Reconciliation batch pacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReconciliationConfig {
    /// Registries per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Pause between batches (milliseconds).
    #[serde(default = "default_inter_batch_delay_ms")]
    pub inter_batch_delay_ms: u64,
    /// Age after which an abandoned maintenance hold is taken over (milliseconds).
    #[serde(default = "default_hold_ttl_ms")]
    pub hold_ttl_ms: u64,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            inter_batch_delay_ms: default_inter_batch_delay_ms(),
            hold_ttl_ms: default_hold_ttl_ms(),
        }
    }
}

impl ReconciliationConfig {
    /// Validates reconciliation settings.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 || self.batch_size > MAX_BATCH_SIZE {
            return Err(ConfigError::Invalid(format!(
                "reconciliation.batch_size must be between 1 and {MAX_BATCH_SIZE}"
            )));
        }
        if self.inter_batch_delay_ms > MAX_INTER_BATCH_DELAY_MS {
            return Err(ConfigError::Invalid(format!(
                "reconciliation.inter_batch_delay_ms must be at most {MAX_INTER_BATCH_DELAY_MS}"
            )));
        }
        if self.hold_ttl_ms == 0 || self.hold_ttl_ms > MAX_HOLD_TTL_MS {
            return Err(ConfigError::Invalid(format!(
                "reconciliation.hold_ttl_ms must be between 1 and {MAX_HOLD_TTL_MS}"
            )));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Publisher
// ============================================================================

/// Publisher retry settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PublisherConfig {
    /// Total publish attempts including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Backoff before the second attempt (milliseconds).
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    /// Backoff ceiling (milliseconds).
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
        }
    }
}

impl PublisherConfig {
    /// Validates publisher settings.
    fn validate(&self) -> Result<(), ConfigError> {
        validate_retry("publisher", self.max_attempts, self.backoff_base_ms, self.backoff_max_ms)
    }

    /// Returns the retry schedule.
    const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay_ms: self.backoff_base_ms,
            max_delay_ms: self.backoff_max_ms,
        }
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// Registry store backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RegistryStoreType {
    /// In-memory store (tests and single-process use).
    #[default]
    Memory,
    /// `SQLite`-backed durable store.
    Sqlite,
}

/// Registry store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegistryStoreConfig {
    /// Store backend type.
    #[serde(rename = "type", default)]
    pub store_type: RegistryStoreType,
    /// `SQLite` database path when using the sqlite backend.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_store_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` synchronous mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl Default for RegistryStoreConfig {
    fn default() -> Self {
        Self {
            store_type: RegistryStoreType::default(),
            path: None,
            busy_timeout_ms: default_store_busy_timeout_ms(),
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

impl RegistryStoreConfig {
    /// Validates store settings.
    fn validate(&self) -> Result<(), ConfigError> {
        match self.store_type {
            RegistryStoreType::Memory => {
                if self.path.is_some() {
                    return Err(ConfigError::Invalid(
                        "memory store must not set path".to_string(),
                    ));
                }
            }
            RegistryStoreType::Sqlite => {
                let Some(path) = &self.path else {
                    return Err(ConfigError::Invalid("sqlite store requires path".to_string()));
                };
                validate_store_path("store.path", path)?;
            }
        }
        Ok(())
    }

    /// Returns `SQLite` settings when the sqlite backend is selected.
    #[must_use]
    pub fn sqlite_config(&self) -> Option<SqliteStoreConfig> {
        match (self.store_type, &self.path) {
            (RegistryStoreType::Sqlite, Some(path)) => Some(SqliteStoreConfig {
                path: path.clone(),
                busy_timeout_ms: self.busy_timeout_ms,
                journal_mode: self.journal_mode,
                sync_mode: self.sync_mode,
            }),
            _ => None,
        }
    }

    /// Opens the `SQLite` store when the sqlite backend is selected.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] when the database cannot be opened.
    pub fn open_sqlite(&self) -> Result<Option<SqliteRegistryStore>, ConfigError> {
        self.sqlite_config()
            .map(|config| {
                SqliteRegistryStore::new(&config).map_err(|err| ConfigError::Io(err.to_string()))
            })
            .transpose()
    }
}

// ============================================================================
// SECTION: Audit
// ============================================================================

/// Audit sink selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuditSinkType {
    /// JSON lines on stderr.
    #[default]
    Stderr,
    /// JSON lines appended to a file.
    File,
    /// Discard audit events.
    None,
}

/// Audit sink configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuditConfig {
    /// Sink type.
    #[serde(default)]
    pub sink: AuditSinkType,
    /// Log file path for the file sink.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl AuditConfig {
    /// Validates audit settings.
    fn validate(&self) -> Result<(), ConfigError> {
        match (self.sink, &self.path) {
            (AuditSinkType::File, Some(path)) => validate_store_path("audit.path", path),
            (AuditSinkType::File, None) => {
                Err(ConfigError::Invalid("file audit sink requires path".to_string()))
            }
            (AuditSinkType::Stderr | AuditSinkType::None, Some(_)) => Err(ConfigError::Invalid(
                "audit.path is only valid for the file sink".to_string(),
            )),
            (AuditSinkType::Stderr | AuditSinkType::None, None) => Ok(()),
        }
    }

    /// Builds the configured audit sink.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the audit log cannot be opened.
    pub fn build_sink(&self) -> Result<Arc<dyn RegistryAuditSink>, ConfigError> {
        match (self.sink, &self.path) {
            (AuditSinkType::Stderr, _) => Ok(Arc::new(StderrAuditSink)),
            (AuditSinkType::None, _) => Ok(Arc::new(NoopAuditSink)),
            (AuditSinkType::File, Some(path)) => {
                let sink = FileAuditSink::new(path).map_err(|err| ConfigError::Io(err.to_string()))?;
                Ok(Arc::new(sink))
            }
            (AuditSinkType::File, None) => {
                Err(ConfigError::Invalid("file audit sink requires path".to_string()))
            }
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from the argument or environment defaults.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against security limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a configured file path.
fn validate_store_path(field: &str, path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.trim().is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in path.components() {
        if component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} component too long")));
        }
    }
    Ok(())
}

/// Validates one retry schedule.
fn validate_retry(
    section: &str,
    max_attempts: u32,
    backoff_base_ms: u64,
    backoff_max_ms: u64,
) -> Result<(), ConfigError> {
    if max_attempts == 0 || max_attempts > MAX_RETRY_ATTEMPTS {
        return Err(ConfigError::Invalid(format!(
            "{section}.max_attempts must be between 1 and {MAX_RETRY_ATTEMPTS}"
        )));
    }
    if backoff_max_ms > MAX_BACKOFF_MS {
        return Err(ConfigError::Invalid(format!(
            "{section}.backoff_max_ms must be at most {MAX_BACKOFF_MS}"
        )));
    }
    if backoff_base_ms > backoff_max_ms {
        return Err(ConfigError::Invalid(format!(
            "{section}.backoff_base_ms must not exceed backoff_max_ms"
        )));
    }
    Ok(())
}

/// Default attempts for allocation and publishing.
const fn default_max_attempts() -> u32 {
    5
}

/// Default first backoff.
const fn default_backoff_base_ms() -> u64 {
    10
}

/// Default backoff ceiling.
const fn default_backoff_max_ms() -> u64 {
    200
}

/// Default allocation deadline.
const fn default_timeout_ms() -> u64 {
    5_000
}

/// Default migration capacity.
const fn default_capacity() -> u64 {
    DEFAULT_CAPACITY_BITS
}

/// Default reconciliation batch size.
const fn default_batch_size() -> usize {
    50
}

/// Default pause between reconciliation batches.
const fn default_inter_batch_delay_ms() -> u64 {
    250
}

/// Default maintenance hold TTL.
const fn default_hold_ttl_ms() -> u64 {
    DEFAULT_HOLD_TTL_MS
}

/// Default `SQLite` busy timeout.
const fn default_store_busy_timeout_ms() -> u64 {
    5_000
}
