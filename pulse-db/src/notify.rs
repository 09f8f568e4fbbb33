//! `NOTIFY` senders for the three pub/sub channels in `spec.md` §6.
//!
//! Every payload is best-effort JSON; receivers re-scan rather than trust
//! it (`spec.md` §6), so a failed `NOTIFY` is logged and swallowed -- it
//! never blocks the caller's write path, since the fallback poll is the
//! correctness floor (`spec.md` §9).

use std::collections::HashSet;

use sqlx::PgPool;

use pulse_core::types::TenantId;

const TELEMETRY_INSERTED: &str = "telemetry_inserted";
const NEW_FLEET_ALERT: &str = "new_fleet_alert";
const NEW_DELIVERY_JOB: &str = "new_delivery_job";

async fn send(pool: &PgPool, channel: &str, payload: &str) {
    if let Err(err) = sqlx::query("SELECT pg_notify($1, $2)")
        .bind(channel)
        .bind(payload)
        .execute(pool)
        .await
    {
        tracing::warn!(%err, channel, "failed to send NOTIFY, fallback poll will cover it");
    }
}

/// `NOTIFY telemetry_inserted` with the distinct tenant ids touched by a
/// batch flush.
pub async fn telemetry_inserted(pool: &PgPool, tenant_ids: &HashSet<TenantId>) {
    let ids: Vec<&str> = tenant_ids.iter().map(TenantId::as_str).collect();
    let payload = serde_json::json!({ "tenant_ids": ids }).to_string();
    send(pool, TELEMETRY_INSERTED, &payload).await;
}

/// `NOTIFY new_fleet_alert`. Payload is empty -- receivers re-scan.
pub async fn new_fleet_alert(pool: &PgPool) {
    send(pool, NEW_FLEET_ALERT, "").await;
}

/// `NOTIFY new_delivery_job`. Payload is empty -- receivers re-scan.
pub async fn new_delivery_job(pool: &PgPool) {
    send(pool, NEW_DELIVERY_JOB, "").await;
}
