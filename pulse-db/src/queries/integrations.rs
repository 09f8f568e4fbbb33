//! `integrations` and `integration_routes` queries (`spec.md` §3, §4.3, §4.4).

use sqlx::{PgPool, Row};

use pulse_core::domain::{DeliverOnEvent, Integration, IntegrationRoute, IntegrationSpec};
use pulse_core::types::{IntegrationId, RouteId, SiteId, TenantId};

fn deliver_on_from_strs(values: &[String]) -> Vec<DeliverOnEvent> {
    values
        .iter()
        .filter_map(|v| match v.as_str() {
            "OPEN" => Some(DeliverOnEvent::Open),
            "CLOSED" => Some(DeliverOnEvent::Closed),
            _ => None,
        })
        .collect()
}

/// Load one integration's full spec by `(tenant_id, integration_id)`,
/// `None` if absent, regardless of `enabled` (the delivery worker checks
/// `enabled` itself so it can record a distinct terminal-failure reason;
/// `spec.md` §4.4 step 3).
pub async fn load(
    pool: &PgPool,
    tenant_id: &TenantId,
    integration_id: &IntegrationId,
) -> sqlx::Result<Option<Integration>> {
    let row = sqlx::query(
        "SELECT integration_id, enabled, spec FROM integrations WHERE tenant_id = $1 AND integration_id = $2",
    )
    .bind(tenant_id.as_str())
    .bind(integration_id.as_str())
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };
    let spec: IntegrationSpec = match serde_json::from_value(row.get("spec")) {
        Ok(spec) => spec,
        Err(_) => return Ok(None),
    };
    Ok(Some(Integration {
        tenant_id: tenant_id.clone(),
        integration_id: IntegrationId::new(row.get::<String, _>("integration_id")),
        enabled: row.get("enabled"),
        spec,
    }))
}

/// Enabled routes for a tenant, joined to their enabled integration,
/// ordered by `priority` then `created_at` (`spec.md` §4.3 step 2).
pub async fn enabled_routes_with_integrations(
    pool: &PgPool,
    tenant_id: &TenantId,
) -> sqlx::Result<Vec<(IntegrationRoute, Integration)>> {
    let rows = sqlx::query(
        "SELECT
            r.route_id, r.integration_id, r.priority, r.created_at, r.min_severity,
            r.alert_types, r.site_ids, r.device_prefixes, r.deliver_on,
            i.spec AS integration_spec
         FROM integration_routes r
         JOIN integrations i ON i.tenant_id = r.tenant_id AND i.integration_id = r.integration_id
         WHERE r.tenant_id = $1 AND r.enabled = true AND i.enabled = true
         ORDER BY r.priority ASC, r.created_at ASC",
    )
    .bind(tenant_id.as_str())
    .fetch_all(pool)
    .await?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let integration_id = IntegrationId::new(row.get::<String, _>("integration_id"));
        let spec = match serde_json::from_value(row.get("integration_spec")) {
            Ok(spec) => spec,
            Err(_) => continue,
        };
        let alert_types_raw: Vec<String> = row.get("alert_types");
        let alert_types = alert_types_raw
            .iter()
            .filter_map(|s| super::alerts::parse_alert_type_pub(s))
            .collect();
        let site_ids: Vec<String> = row.get("site_ids");
        let deliver_on_raw: Vec<String> = row.get("deliver_on");

        let route = IntegrationRoute {
            tenant_id: tenant_id.clone(),
            route_id: RouteId::new(row.get::<String, _>("route_id")),
            integration_id: integration_id.clone(),
            enabled: true,
            priority: row.get("priority"),
            created_at: row.get("created_at"),
            min_severity: row.get::<Option<i16>, _>("min_severity").map(|v| v as u8),
            alert_types,
            site_ids: site_ids.into_iter().map(SiteId::new).collect(),
            device_prefixes: row.get("device_prefixes"),
            deliver_on: deliver_on_from_strs(&deliver_on_raw),
        };
        let integration = Integration {
            tenant_id: tenant_id.clone(),
            integration_id,
            enabled: true,
            spec,
        };
        out.push((route, integration));
    }

    Ok(out)
}
