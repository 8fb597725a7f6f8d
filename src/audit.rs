//! Audit trail for reference-data mutations
//!
//! Every write to the master emits an event to a pluggable sink. Sinks
//! must be cheap and infallible; a sink that needs durable delivery
//! should buffer internally.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Audit event ID
pub type EventId = Uuid;

/// One recorded mutation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event ID
    pub id: EventId,
    /// Wall-clock time the mutation was recorded
    pub at: DateTime<Utc>,
    /// Who performed the mutation
    pub actor: String,
    /// Operation name, e.g. "create_asset"
    pub operation: String,
    /// What was mutated, e.g. "asset 12" or "currency USD"
    pub subject: String,
    /// Operation-specific payload summary
    pub detail: Value,
}

impl AuditEvent {
    pub fn new(actor: &str, operation: &str, subject: impl Into<String>, detail: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            at: Utc::now(),
            actor: actor.to_string(),
            operation: operation.to_string(),
            subject: subject.into(),
            detail,
        }
    }
}

/// Destination for audit events
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

/// Sink that forwards events to the log
#[derive(Debug, Default)]
pub struct LogSink;

impl LogSink {
    pub fn new() -> Self {
        Self
    }
}

impl AuditSink for LogSink {
    fn record(&self, event: AuditEvent) {
        info!(
            "Audit [{}] {} {} by {}: {}",
            event.id, event.operation, event.subject, event.actor, event.detail
        );
    }
}

/// Sink that keeps events in memory, mainly for tests and inspection
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

impl AuditSink for MemorySink {
    fn record(&self, event: AuditEvent) {
        self.events.lock().unwrap().push(event);
    }
}
