//! `alert_maintenance_windows` queries (`spec.md` §4.2).

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

use pulse_core::domain::MaintenanceWindow;
use pulse_core::types::{SiteId, TenantId};

/// All enabled windows for a tenant whose absolute bounds currently hold
/// (`starts_at <= now` and `ends_at` null or in the future). Recurring
/// day-of-week/hour matching and site/device-type filtering are applied by
/// the caller (`pulse_evaluator::maintenance`) since they depend on `now`
/// in the tenant's evaluation context, not just the row.
pub async fn active_windows(pool: &PgPool, tenant_id: &TenantId) -> sqlx::Result<Vec<MaintenanceWindow>> {
    let now: DateTime<Utc> = Utc::now();
    let rows = sqlx::query(
        "SELECT enabled, starts_at, ends_at, recurring_days_of_week,
                recurring_hour_start, recurring_hour_end, site_ids, device_types
         FROM alert_maintenance_windows
         WHERE tenant_id = $1 AND enabled = true
           AND starts_at <= $2 AND (ends_at IS NULL OR ends_at > $2)",
    )
    .bind(tenant_id.as_str())
    .bind(now)
    .fetch_all(pool)
    .await?;

    let windows = rows
        .into_iter()
        .map(|row| {
            let site_ids: Vec<String> = row.get("site_ids");
            let hour_start: Option<i16> = row.get("recurring_hour_start");
            let hour_end: Option<i16> = row.get("recurring_hour_end");
            let days: Option<Vec<i16>> = row.get("recurring_days_of_week");
            MaintenanceWindow {
                tenant_id: tenant_id.clone(),
                enabled: row.get("enabled"),
                starts_at: row.get("starts_at"),
                ends_at: row.get("ends_at"),
                recurring_days_of_week: days.map(|d| d.into_iter().map(|v| v as u8).collect()),
                recurring_hour_range: match (hour_start, hour_end) {
                    (Some(s), Some(e)) => Some((s as u8, e as u8)),
                    _ => None,
                },
                site_ids: site_ids.into_iter().map(SiteId::new).collect(),
                device_types: row.get("device_types"),
            }
        })
        .collect();

    Ok(windows)
}
