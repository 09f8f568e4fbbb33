//! `device_state` upsert (`spec.md` §3, §4.2).

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use pulse_core::domain::DeviceLiveness;
use pulse_core::types::{DeviceId, TenantId};

fn status_str(s: DeviceLiveness) -> &'static str {
    match s {
        DeviceLiveness::Online => "ONLINE",
        DeviceLiveness::Stale => "STALE",
        DeviceLiveness::Offline => "OFFLINE",
    }
}

/// Upsert the device's liveness row. `last_state_change_at` is stamped
/// only when `status` actually changes from the stored value -- expressed
/// as a single `CASE` in the `ON CONFLICT` clause so the transition check
/// and the write happen atomically.
pub async fn upsert_status(
    pool: &PgPool,
    tenant_id: &TenantId,
    device_id: &DeviceId,
    status: DeviceLiveness,
    last_heartbeat_at: Option<DateTime<Utc>>,
    last_telemetry_at: Option<DateTime<Utc>>,
    metrics: &serde_json::Value,
) -> sqlx::Result<()> {
    let now = Utc::now();
    let status = status_str(status);

    sqlx::query(
        "INSERT INTO device_state
            (tenant_id, device_id, status, last_heartbeat_at, last_telemetry_at,
             last_seen_at, last_state_change_at, latest_metrics)
         VALUES ($1, $2, $3, $4, $5, $6, $6, $7)
         ON CONFLICT (tenant_id, device_id) DO UPDATE SET
            status = EXCLUDED.status,
            last_heartbeat_at = COALESCE(EXCLUDED.last_heartbeat_at, device_state.last_heartbeat_at),
            last_telemetry_at = COALESCE(EXCLUDED.last_telemetry_at, device_state.last_telemetry_at),
            last_seen_at = EXCLUDED.last_seen_at,
            latest_metrics = EXCLUDED.latest_metrics,
            last_state_change_at = CASE
                WHEN device_state.status IS DISTINCT FROM EXCLUDED.status
                THEN EXCLUDED.last_seen_at
                ELSE device_state.last_state_change_at
            END",
    )
    .bind(tenant_id.as_str())
    .bind(device_id.as_str())
    .bind(status)
    .bind(last_heartbeat_at)
    .bind(last_telemetry_at)
    .bind(now)
    .bind(metrics)
    .execute(pool)
    .await?;

    Ok(())
}

/// One registered device as seen by an evaluation cycle.
pub struct RegisteredDevice {
    pub device_id: DeviceId,
    pub site_id: pulse_core::types::SiteId,
    pub active: bool,
    /// `metadata->>'device_type'`, used by maintenance-window scope matching.
    pub device_type: Option<String>,
}

/// All devices registered for a tenant, the driving list for one
/// evaluation cycle.
pub async fn registered_devices(
    pool: &PgPool,
    tenant_id: &TenantId,
) -> sqlx::Result<Vec<RegisteredDevice>> {
    use sqlx::Row;

    let rows = sqlx::query(
        "SELECT device_id, site_id, (status = 'ACTIVE') AS active,
                metadata->>'device_type' AS device_type
         FROM device_registry WHERE tenant_id = $1",
    )
    .bind(tenant_id.as_str())
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| RegisteredDevice {
            device_id: DeviceId::new(r.get::<String, _>("device_id")),
            site_id: pulse_core::types::SiteId::new(r.get::<String, _>("site_id")),
            active: r.get("active"),
            device_type: r.get("device_type"),
        })
        .collect())
}
