//! `device_registry` and `device_group_members` queries (`spec.md` §3, §4.1).

use chrono::Utc;
use sqlx::{PgPool, Row};

use pulse_core::domain::{DeviceRegistryEntry, RegistryStatus};
use pulse_core::types::{DeviceId, SiteId, TenantId};

fn parse_status(s: &str) -> RegistryStatus {
    match s {
        "REVOKED" => RegistryStatus::Revoked,
        "DELETED" => RegistryStatus::Deleted,
        _ => RegistryStatus::Active,
    }
}

fn status_str(s: RegistryStatus) -> &'static str {
    match s {
        RegistryStatus::Active => "ACTIVE",
        RegistryStatus::Revoked => "REVOKED",
        RegistryStatus::Deleted => "DELETED",
    }
}

/// Fetch one registry row by `(tenant_id, device_id)`. `None` if unregistered.
pub async fn find(
    pool: &PgPool,
    tenant_id: &TenantId,
    device_id: &DeviceId,
) -> sqlx::Result<Option<DeviceRegistryEntry>> {
    let row = sqlx::query(
        "SELECT tenant_id, device_id, site_id, status, provision_token_hash, metadata
         FROM device_registry WHERE tenant_id = $1 AND device_id = $2",
    )
    .bind(tenant_id.as_str())
    .bind(device_id.as_str())
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|row| DeviceRegistryEntry {
        tenant_id: TenantId::new(row.get::<String, _>("tenant_id")),
        device_id: DeviceId::new(row.get::<String, _>("device_id")),
        site_id: SiteId::new(row.get::<String, _>("site_id")),
        status: parse_status(&row.get::<String, _>("status")),
        provision_token_hash: row.get("provision_token_hash"),
        metadata: row.get("metadata"),
    }))
}

/// Auto-provision a device on first sight, when `AUTO_PROVISION` is enabled
/// (`spec.md` §4.1). Does nothing if the device already has a row.
pub async fn auto_provision(
    pool: &PgPool,
    tenant_id: &TenantId,
    device_id: &DeviceId,
    site_id: &SiteId,
) -> sqlx::Result<()> {
    sqlx::query(
        "INSERT INTO device_registry (tenant_id, device_id, site_id, status)
         VALUES ($1, $2, $3, 'ACTIVE')
         ON CONFLICT (tenant_id, device_id) DO NOTHING",
    )
    .bind(tenant_id.as_str())
    .bind(device_id.as_str())
    .bind(site_id.as_str())
    .execute(pool)
    .await?;
    Ok(())
}

/// Stamp `last_auth_at` after a successful ingest authorization. Operator
/// visibility only; never read back by ingest logic itself.
pub async fn touch_last_auth(
    pool: &PgPool,
    tenant_id: &TenantId,
    device_id: &DeviceId,
) -> sqlx::Result<()> {
    sqlx::query(
        "UPDATE device_registry SET last_auth_at = $3
         WHERE tenant_id = $1 AND device_id = $2",
    )
    .bind(tenant_id.as_str())
    .bind(device_id.as_str())
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(())
}

/// Distinct tenants with at least one registered device, the driving list
/// for the evaluator's per-cycle tenant scan.
pub async fn tenants_with_devices(pool: &PgPool) -> sqlx::Result<Vec<TenantId>> {
    let rows = sqlx::query("SELECT DISTINCT tenant_id FROM device_registry")
        .fetch_all(pool)
        .await?;
    Ok(rows
        .into_iter()
        .map(|r| TenantId::new(r.get::<String, _>("tenant_id")))
        .collect())
}

/// Return the set of `group_id`s a device belongs to, for rule scope
/// matching.
pub async fn group_ids_for_device(
    pool: &PgPool,
    tenant_id: &TenantId,
    device_id: &DeviceId,
) -> sqlx::Result<Vec<String>> {
    let rows = sqlx::query(
        "SELECT group_id FROM device_group_members WHERE tenant_id = $1 AND device_id = $2",
    )
    .bind(tenant_id.as_str())
    .bind(device_id.as_str())
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(|r| r.get("group_id")).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_strings() {
        for s in [RegistryStatus::Active, RegistryStatus::Revoked, RegistryStatus::Deleted] {
            assert_eq!(parse_status(status_str(s)), s);
        }
    }
}
