/// Write-only audit sink. The storage backend is an external collaborator;
/// this emits the entry as a structured event and a counter, and can never
/// fail the primary operation.
pub(crate) fn record(
    actor_id: &str,
    action: &'static str,
    entity_type: &'static str,
    entity_id: &str,
    metadata: serde_json::Value,
) {
    metrics::counter!("audit_events_total", "action" => action).increment(1);
    tracing::info!(
        target: "audit",
        actor_id,
        action,
        entity_type,
        entity_id,
        metadata = %metadata,
        "audit event"
    );
}
