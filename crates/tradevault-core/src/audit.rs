//! Access audit sink.
//!
//! Every denied or anomalous credential access produces one structured
//! record: tenant id, resource id, action, reason. Secret values never
//! appear here. Recording is synchronous and best-effort; a failing sink
//! must not fail the operation that triggered it, but dropped records are
//! counted so the loss itself stays observable.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::warn;

/// Log target carrying audit events, for subscriber-side routing.
pub const AUDIT_TARGET: &str = "tradevault::audit";

/// Denial reasons, stable for machine consumption.
pub mod reason {
    /// Row invisible under the current tenant context. Deliberately does
    /// not distinguish "does not exist" from "owned by another tenant".
    pub const NOT_FOUND_OR_NOT_OWNED: &str = "not_found_or_not_owned";
    /// The credential exists for this tenant but is switched off.
    pub const INACTIVE: &str = "inactive";
    /// The credential exists for this tenant but its expiry has passed.
    pub const EXPIRED: &str = "expired";
    /// The parent account check failed during create.
    pub const ACCOUNT_MISMATCH: &str = "account_mismatch";
}

/// The operation that was denied.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditAction {
    Read,
    Create,
    Update,
    Delete,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Read => "read",
            AuditAction::Create => "create",
            AuditAction::Update => "update",
            AuditAction::Delete => "delete",
        }
    }
}

/// One denied access attempt. Field-based so sinks can serialize it
/// without string parsing; carries identifiers only, never secrets.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DenialEvent {
    pub tenant_id: String,
    pub resource_id: String,
    pub action: AuditAction,
    pub reason: &'static str,
}

/// Failure raised by a sink that could not persist a record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("audit sink failure: {0}")]
pub struct SinkError(pub String);

/// Destination for denial records.
pub trait AuditSink: Send + Sync {
    fn record_denial(&self, event: &DenialEvent) -> Result<(), SinkError>;
}

/// Default sink: a structured `warn!` under [`AUDIT_TARGET`].
#[derive(Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record_denial(&self, event: &DenialEvent) -> Result<(), SinkError> {
        warn!(
            target: AUDIT_TARGET,
            tenant_id = %event.tenant_id,
            resource_id = %event.resource_id,
            action = event.action.as_str(),
            reason = event.reason,
            "credential access denied"
        );
        Ok(())
    }
}

/// In-memory sink for tests and embedders that surface denials in-process.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<DenialEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded events so far. A poisoned lock yields an empty list
    /// rather than a panic, matching the sink's own poison handling.
    pub fn events(&self) -> Vec<DenialEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record_denial(&self, event: &DenialEvent) -> Result<(), SinkError> {
        self.events
            .lock()
            .map_err(|_| SinkError("poisoned".into()))?
            .push(event.clone());
        Ok(())
    }
}

/// Wraps a sink with the best-effort contract: recording never fails the
/// triggering operation, and records lost to sink failures are counted.
pub struct Audit {
    sink: Arc<dyn AuditSink>,
    dropped: AtomicU64,
}

impl Audit {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self {
            sink,
            dropped: AtomicU64::new(0),
        }
    }

    pub fn denial(&self, event: DenialEvent) {
        if let Err(err) = self.sink.record_denial(&event) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            warn!(
                target: AUDIT_TARGET,
                error = %err,
                "audit record dropped"
            );
        }
    }

    /// Number of records the underlying sink failed to accept.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Default for Audit {
    fn default() -> Self {
        Self::new(Arc::new(TracingAuditSink))
    }
}

impl std::fmt::Debug for Audit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Audit")
            .field("dropped", &self.dropped())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingSink;

    impl AuditSink for FailingSink {
        fn record_denial(&self, _event: &DenialEvent) -> Result<(), SinkError> {
            Err(SinkError("disk full".into()))
        }
    }

    fn sample_event() -> DenialEvent {
        DenialEvent {
            tenant_id: "bob".into(),
            resource_id: "3f6b1a1e-0000-0000-0000-000000000000".into(),
            action: AuditAction::Read,
            reason: reason::NOT_FOUND_OR_NOT_OWNED,
        }
    }

    #[test]
    fn memory_sink_captures_events_in_order() {
        let sink = Arc::new(MemoryAuditSink::new());
        let audit = Audit::new(sink.clone());
        audit.denial(sample_event());

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].tenant_id, "bob");
        assert_eq!(events[0].reason, "not_found_or_not_owned");
        assert_eq!(audit.dropped(), 0);
    }

    #[test]
    fn memory_sink_survives_a_poisoned_lock() {
        let sink = Arc::new(MemoryAuditSink::new());
        let poisoner = sink.clone();
        let _ = std::panic::catch_unwind(move || {
            let _guard = poisoner.events.lock().unwrap();
            panic!("poison the sink lock");
        });

        assert!(sink.events().is_empty());
        assert!(sink.record_denial(&sample_event()).is_err());

        let audit = Audit::new(sink);
        audit.denial(sample_event());
        assert_eq!(audit.dropped(), 1);
    }

    #[test]
    fn sink_failure_is_counted_not_propagated() {
        let audit = Audit::new(Arc::new(FailingSink));
        audit.denial(sample_event());
        audit.denial(sample_event());
        assert_eq!(audit.dropped(), 2);
    }

    #[test]
    fn events_serialize_with_field_names() {
        let json = serde_json::to_value(sample_event()).expect("serialize");
        assert_eq!(json["action"], "read");
        assert_eq!(json["reason"], "not_found_or_not_owned");
        assert_eq!(json["tenant_id"], "bob");
    }
}
