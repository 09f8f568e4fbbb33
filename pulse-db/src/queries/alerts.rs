//! `fleet_alert` queries: the dedup/upsert contract, close contract, and
//! escalation sweep (`spec.md` §3, §4.2, §9).

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use pulse_core::domain::{AlertStatus, AlertType, FleetAlert};
use pulse_core::types::{AlertId, DeviceId, RuleId, SiteId, TenantId};

fn alert_type_str(t: AlertType) -> &'static str {
    match t {
        AlertType::NoHeartbeat => "NO_HEARTBEAT",
        AlertType::Threshold => "THRESHOLD",
        AlertType::Window => "WINDOW",
        AlertType::Anomaly => "ANOMALY",
        AlertType::NoTelemetry => "NO_TELEMETRY",
    }
}

fn parse_alert_type(s: &str) -> AlertType {
    match s {
        "NO_HEARTBEAT" => AlertType::NoHeartbeat,
        "WINDOW" => AlertType::Window,
        "ANOMALY" => AlertType::Anomaly,
        "NO_TELEMETRY" => AlertType::NoTelemetry,
        _ => AlertType::Threshold,
    }
}

/// Public wrapper over [`parse_alert_type`] for other query modules (e.g.
/// `integrations::enabled_routes_with_integrations`, which parses a route's
/// `alert_types` filter column).
#[must_use]
pub fn parse_alert_type_pub(s: &str) -> Option<AlertType> {
    Some(parse_alert_type(s))
}

fn parse_status(s: &str) -> AlertStatus {
    match s {
        "ACKNOWLEDGED" => AlertStatus::Acknowledged,
        "CLOSED" => AlertStatus::Closed,
        _ => AlertStatus::Open,
    }
}

/// `deduplicate_or_create_alert`: insert a new alert, or -- if a row with
/// the same `(tenant_id, fingerprint)` already exists with `status IN
/// (OPEN, ACKNOWLEDGED)` -- update severity/confidence/summary/details and
/// bump `trigger_count`, *without* touching `status` (spec §9: this is the
/// only alert-upsert path; `open_or_update_alert`'s status-overwriting
/// behavior from the original is deliberately not ported). Returns
/// `(alert_id, created)`.
#[allow(clippy::too_many_arguments)]
pub async fn deduplicate_or_create_alert(
    pool: &PgPool,
    tenant_id: &TenantId,
    site_id: &SiteId,
    device_id: &DeviceId,
    alert_type: AlertType,
    fingerprint: &str,
    severity: u8,
    confidence: f64,
    summary: &str,
    details: &serde_json::Value,
    rule_id: Option<&RuleId>,
) -> sqlx::Result<(AlertId, bool)> {
    let new_id = Uuid::new_v4();

    let row = sqlx::query(
        "INSERT INTO fleet_alert
            (id, tenant_id, site_id, device_id, alert_type, fingerprint,
             status, severity, confidence, summary, details, rule_id, trigger_count, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, 'OPEN', $7, $8, $9, $10, $11, 1, $12)
         ON CONFLICT (tenant_id, fingerprint)
            WHERE status IN ('OPEN', 'ACKNOWLEDGED')
         DO UPDATE SET
            severity = EXCLUDED.severity,
            confidence = EXCLUDED.confidence,
            summary = EXCLUDED.summary,
            details = EXCLUDED.details,
            trigger_count = fleet_alert.trigger_count + 1
         RETURNING id, (xmax = 0) AS created",
    )
    .bind(new_id)
    .bind(tenant_id.as_str())
    .bind(site_id.as_str())
    .bind(device_id.as_str())
    .bind(alert_type_str(alert_type))
    .bind(fingerprint)
    .bind(severity as i16)
    .bind(confidence)
    .bind(summary)
    .bind(details)
    .bind(rule_id.map(RuleId::as_str))
    .bind(Utc::now())
    .fetch_one(pool)
    .await?;

    let id: Uuid = row.get("id");
    let created: bool = row.get("created");
    Ok((AlertId::from_uuid(id), created))
}

/// Fetch the currently open/acknowledged alert for `(tenant_id,
/// fingerprint)`, if any -- used to check `silenced_until` before opening a
/// new occurrence (`spec.md` §4.2).
pub async fn find_open_by_fingerprint(
    pool: &PgPool,
    tenant_id: &TenantId,
    fingerprint: &str,
) -> sqlx::Result<Option<FleetAlert>> {
    let query = format!(
        "SELECT {ALERT_COLUMNS} FROM fleet_alert
         WHERE tenant_id = $1 AND fingerprint = $2 AND status IN ('OPEN', 'ACKNOWLEDGED')"
    );
    let row = sqlx::query(&query)
        .bind(tenant_id.as_str())
        .bind(fingerprint)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(row_to_alert))
}

/// Close contract: set `status = CLOSED`, `closed_at = now()` for every row
/// matching `(tenant_id, fingerprint)` currently `OPEN` or `ACKNOWLEDGED`.
/// A no-op if no such row exists.
pub async fn close_by_fingerprint(
    pool: &PgPool,
    tenant_id: &TenantId,
    fingerprint: &str,
) -> sqlx::Result<u64> {
    let result = sqlx::query(
        "UPDATE fleet_alert SET status = 'CLOSED', closed_at = now()
         WHERE tenant_id = $1 AND fingerprint = $2 AND status IN ('OPEN', 'ACKNOWLEDGED')",
    )
    .bind(tenant_id.as_str())
    .bind(fingerprint)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Escalation sweep: for a tenant, atomically escalate every `OPEN`,
/// unescalated, unsilenced alert whose rule's `escalation_minutes` has
/// elapsed since `created_at`. Severity decrements toward 0 and clamps
/// there (spec §9).
pub async fn escalate_sweep(pool: &PgPool, tenant_id: &TenantId) -> sqlx::Result<u64> {
    let now: DateTime<Utc> = Utc::now();
    let result = sqlx::query(
        "UPDATE fleet_alert fa SET
            severity = GREATEST(fa.severity - 1, 0),
            escalation_level = 1,
            escalated_at = $2
         FROM alert_rules ar
         WHERE fa.tenant_id = $1
           AND ar.tenant_id = fa.tenant_id
           AND ar.rule_id = fa.rule_id
           AND fa.status = 'OPEN'
           AND fa.escalation_level = 0
           AND (fa.silenced_until IS NULL OR fa.silenced_until <= $2)
           AND ar.escalation_minutes IS NOT NULL
           AND fa.created_at <= $2 - (ar.escalation_minutes * interval '1 minute')",
    )
    .bind(tenant_id.as_str())
    .bind(now)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

fn row_to_alert(row: sqlx::postgres::PgRow) -> FleetAlert {
    FleetAlert {
        id: AlertId::from_uuid(row.get("id")),
        tenant_id: TenantId::new(row.get::<String, _>("tenant_id")),
        site_id: SiteId::new(row.get::<String, _>("site_id")),
        device_id: DeviceId::new(row.get::<String, _>("device_id")),
        alert_type: parse_alert_type(&row.get::<String, _>("alert_type")),
        fingerprint: row.get("fingerprint"),
        status: parse_status(&row.get::<String, _>("status")),
        severity: row.get::<i16, _>("severity") as u8,
        confidence: row.get("confidence"),
        summary: row.get("summary"),
        details: row.get("details"),
        rule_id: row.get::<Option<String>, _>("rule_id").map(RuleId::new),
        trigger_count: row.get("trigger_count"),
        created_at: row.get("created_at"),
        closed_at: row.get("closed_at"),
        silenced_until: row.get("silenced_until"),
        acknowledged_by: row.get("acknowledged_by"),
        acknowledged_at: row.get("acknowledged_at"),
        escalation_level: row.get("escalation_level"),
        escalated_at: row.get("escalated_at"),
    }
}

const ALERT_COLUMNS: &str = "id, tenant_id, site_id, device_id, alert_type, fingerprint, status,
    severity, confidence, summary, details, rule_id, trigger_count, created_at,
    closed_at, silenced_until, acknowledged_by, acknowledged_at, escalation_level, escalated_at";

/// `OPEN` alerts created within `lookback_minutes`, bounded by `limit`
/// (dispatcher primary pass, `spec.md` §4.3).
pub async fn recent_open(
    pool: &PgPool,
    tenant_id: &TenantId,
    lookback_minutes: i64,
    limit: i64,
) -> sqlx::Result<Vec<FleetAlert>> {
    let query = format!(
        "SELECT {ALERT_COLUMNS} FROM fleet_alert
         WHERE tenant_id = $1 AND status = 'OPEN'
           AND created_at >= now() - ($2 * interval '1 minute')
         ORDER BY created_at ASC
         LIMIT $3"
    );
    let rows = sqlx::query(&query)
        .bind(tenant_id.as_str())
        .bind(lookback_minutes)
        .bind(limit)
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().map(row_to_alert).collect())
}

/// Recently escalated alerts (dispatcher escalation pass, `spec.md` §4.3).
pub async fn recently_escalated(
    pool: &PgPool,
    tenant_id: &TenantId,
    within_minutes: i64,
) -> sqlx::Result<Vec<FleetAlert>> {
    let query = format!(
        "SELECT {ALERT_COLUMNS} FROM fleet_alert
         WHERE tenant_id = $1 AND escalation_level > 0
           AND escalated_at >= now() - ($2 * interval '1 minute')
         ORDER BY escalated_at ASC"
    );
    let rows = sqlx::query(&query)
        .bind(tenant_id.as_str())
        .bind(within_minutes)
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().map(row_to_alert).collect())
}

/// Distinct tenants with at least one `OPEN` alert, used to bound the
/// dispatcher's per-cycle tenant scan.
pub async fn tenants_with_open_alerts(pool: &PgPool) -> sqlx::Result<Vec<TenantId>> {
    let rows = sqlx::query("SELECT DISTINCT tenant_id FROM fleet_alert WHERE status = 'OPEN'")
        .fetch_all(pool)
        .await?;
    Ok(rows
        .into_iter()
        .map(|r| TenantId::new(r.get::<String, _>("tenant_id")))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alert_type_round_trips() {
        for t in [
            AlertType::NoHeartbeat,
            AlertType::Threshold,
            AlertType::Window,
            AlertType::Anomaly,
            AlertType::NoTelemetry,
        ] {
            assert_eq!(parse_alert_type(alert_type_str(t)), t);
        }
    }

    #[test]
    fn status_round_trips() {
        for s in [AlertStatus::Open, AlertStatus::Acknowledged, AlertStatus::Closed] {
            let wire = match s {
                AlertStatus::Open => "OPEN",
                AlertStatus::Acknowledged => "ACKNOWLEDGED",
                AlertStatus::Closed => "CLOSED",
            };
            assert_eq!(parse_status(wire), s);
        }
    }
}
