//! `alert_digest_settings` queries (`spec.md` §4.3 Non-goals note: digest
//! delivery itself is out of scope, but the settings a tenant configures
//! are still part of the schema and are exposed here for completeness).

use sqlx::{PgPool, Row};

use pulse_core::domain::AlertDigestSettings;
use pulse_core::types::TenantId;

/// Load one tenant's digest settings, `None` if the tenant has never set
/// any (callers should treat that as "digests disabled").
pub async fn load(pool: &PgPool, tenant_id: &TenantId) -> sqlx::Result<Option<AlertDigestSettings>> {
    let row = sqlx::query(
        "SELECT tenant_id, enabled, cadence_minutes, recipient
         FROM alert_digest_settings WHERE tenant_id = $1",
    )
    .bind(tenant_id.as_str())
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|row| AlertDigestSettings {
        tenant_id: TenantId::new(row.get::<String, _>("tenant_id")),
        enabled: row.get("enabled"),
        cadence_minutes: row.get("cadence_minutes"),
        recipient: row.get("recipient"),
    }))
}

/// Upsert a tenant's digest settings.
pub async fn upsert(pool: &PgPool, settings: &AlertDigestSettings) -> sqlx::Result<()> {
    sqlx::query(
        "INSERT INTO alert_digest_settings (tenant_id, enabled, cadence_minutes, recipient)
         VALUES ($1, $2, $3, $4)
         ON CONFLICT (tenant_id) DO UPDATE SET
            enabled = EXCLUDED.enabled,
            cadence_minutes = EXCLUDED.cadence_minutes,
            recipient = EXCLUDED.recipient",
    )
    .bind(settings.tenant_id.as_str())
    .bind(settings.enabled)
    .bind(settings.cadence_minutes)
    .bind(&settings.recipient)
    .execute(pool)
    .await?;
    Ok(())
}

/// Tenants with digests enabled whose last send (tracked by the caller via
/// a scheduling table elsewhere) is due -- this module only stores
/// preferences, so it simply returns every enabled tenant; cadence gating
/// happens in the caller.
pub async fn enabled_tenants(pool: &PgPool) -> sqlx::Result<Vec<TenantId>> {
    let rows = sqlx::query("SELECT tenant_id FROM alert_digest_settings WHERE enabled = true")
        .fetch_all(pool)
        .await?;
    Ok(rows
        .into_iter()
        .map(|r| TenantId::new(r.get::<String, _>("tenant_id")))
        .collect())
}
