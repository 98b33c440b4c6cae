use crate::domain::repository::AuditRepository;
use crate::domain::types::AuditEvent;

/// Append-only security log. `record` never fails: a sink error is reported
/// through `tracing` and the calling flow carries on.
#[derive(Clone)]
pub struct AuditLog<R: AuditRepository> {
    pub repo: R,
}

impl<R: AuditRepository> AuditLog<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    pub async fn record(&self, event: AuditEvent) {
        tracing::info!(
            target: "audit",
            event_id = %event.id,
            event_type = event.event_type.as_str(),
            outcome = event.outcome.as_str(),
            subject_id = event.subject_id.map(|id| id.to_string()),
            ip = event.ip_address.as_deref(),
            metadata = %serde_json::Value::Object(
                event.metadata.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
            ),
            "security event"
        );
        if let Err(e) = self.repo.append(&event).await {
            tracing::error!(
                error = %e,
                event_type = event.event_type.as_str(),
                "failed to persist audit event"
            );
        }
    }
}
