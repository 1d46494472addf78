use tracing::info;

use partsage_core::audit::{AuditEvent, AuditSink};

/// Writes audit events to the `partsage::audit` tracing target.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        let metadata = serde_json::to_string(&event.metadata).unwrap_or_default();
        info!(
            target: "partsage::audit",
            event_name = "audit.event",
            event_id = %event.event_id,
            event_type = %event.event_type,
            category = ?event.category,
            outcome = ?event.outcome,
            actor = %event.actor,
            correlation_id = %event.correlation_id,
            conversation_id = event.conversation_id.as_deref().unwrap_or("-"),
            metadata = %metadata,
            "audit event"
        );
    }
}
