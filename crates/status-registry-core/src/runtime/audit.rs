// crates/status-registry-core/src/runtime/audit.rs
// ============================================================================
// Module: Registry Audit Logging
// Description: Structured audit events for allocation and reconciliation.
// Purpose: Emit JSON-lines audit logs without hard dependencies.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Every state-changing registry operation emits a [`RegistryAuditEvent`]
//! through a [`RegistryAuditSink`]. Sinks write one JSON object per line so
//! deployments can route events to their preferred logging pipeline.
//! Events never carry bitstring payloads.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use serde::Serialize;

use crate::core::RegistryUri;
use crate::core::StatusRegistry;
use crate::core::Timestamp;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Registry audit event payload.
#[derive(Debug, Clone, Serialize)]
pub struct RegistryAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch) from the emitting service's clock.
    pub timestamp_ms: i64,
    /// Registry version identifier when known.
    pub registry_id: Option<String>,
    /// Logical registry URI when known.
    pub uri: Option<String>,
    /// Registry version when known.
    pub version: Option<u64>,
    /// Write cursor after the operation.
    pub write_cursor: Option<u64>,
    /// Registry state after the operation.
    pub state: Option<&'static str>,
    /// Status index involved.
    pub index: Option<u64>,
    /// Attempts consumed.
    pub attempts: Option<u32>,
    /// Free-form detail (error text, counts).
    pub detail: Option<String>,
}

impl RegistryAuditEvent {
    /// Creates an event stamped at `at` with no subject.
    #[must_use]
    pub const fn new(at: Timestamp, event: &'static str) -> Self {
        Self {
            event,
            timestamp_ms: at.as_unix_millis(),
            registry_id: None,
            uri: None,
            version: None,
            write_cursor: None,
            state: None,
            index: None,
            attempts: None,
            detail: None,
        }
    }

    /// Creates an event describing a registry snapshot.
    #[must_use]
    pub fn for_registry(at: Timestamp, event: &'static str, registry: &StatusRegistry) -> Self {
        let mut audit = Self::new(at, event);
        audit.registry_id = Some(registry.registry_id.to_string());
        audit.uri = Some(registry.uri.to_string());
        audit.version = Some(registry.version);
        audit.write_cursor = Some(registry.write_cursor);
        audit.state = Some(registry.state.as_str());
        audit
    }

    /// Creates an event describing a logical URI.
    #[must_use]
    pub fn for_uri(at: Timestamp, event: &'static str, uri: &RegistryUri) -> Self {
        let mut audit = Self::new(at, event);
        audit.uri = Some(uri.to_string());
        audit
    }

    /// Attaches a status index.
    #[must_use]
    pub const fn with_index(mut self, index: u64) -> Self {
        self.index = Some(index);
        self
    }

    /// Attaches an attempt count.
    #[must_use]
    pub const fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = Some(attempts);
        self
    }

    /// Attaches detail text.
    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Audit sink for registry events.
pub trait RegistryAuditSink: Send + Sync {
    /// Record an audit event.
    fn record(&self, event: &RegistryAuditEvent);
}

/// Audit sink that logs JSON lines to stderr.
pub struct StderrAuditSink;

impl RegistryAuditSink for StderrAuditSink {
    fn record(&self, event: &RegistryAuditEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr(), "{payload}");
        }
    }
}

/// Audit sink that logs JSON lines to a file.
pub struct FileAuditSink {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
}

impl FileAuditSink {
    /// Opens the audit log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl RegistryAuditSink for FileAuditSink {
    fn record(&self, event: &RegistryAuditEvent) {
        if let Ok(payload) = serde_json::to_string(event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

/// No-op audit sink.
pub struct NoopAuditSink;

impl RegistryAuditSink for NoopAuditSink {
    fn record(&self, _event: &RegistryAuditEvent) {}
}

// ============================================================================
// SECTION: Tests
// ============================================================================
