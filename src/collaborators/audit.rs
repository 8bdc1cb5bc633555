use crate::error::Result;

/// Audit log seam. Recording is best effort.
pub trait AuditSink: Send + Sync {
    fn record(&self, user_id: &str, action: &str, details: &serde_json::Value) -> Result<()>;
}

/// Writes audit records as structured log lines.
#[derive(Debug, Default, Clone)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, user_id: &str, action: &str, details: &serde_json::Value) -> Result<()> {
        tracing::info!(user = user_id, action, details = %details, "audit record");
        Ok(())
    }
}

/// Record through `sink`, logging and dropping any failure.
pub fn record_audit(sink: &dyn AuditSink, user_id: &str, action: &str, details: serde_json::Value) {
    if let Err(e) = sink.record(user_id, action, &details) {
        tracing::warn!(user = user_id, action, error = %e, "audit record dropped");
    }
}
