//! `alert_rules` and `metric_mappings` queries (`spec.md` §3, §4.2).

use sqlx::{PgPool, Row};

use pulse_core::domain::{AlertRule, MetricMapping, RuleSpec};
use pulse_core::types::{RuleId, SiteId, TenantId};

/// All enabled rules for a tenant, parsed into their tagged-union
/// [`RuleSpec`] from the `spec` JSONB column.
pub async fn enabled_for_tenant(pool: &PgPool, tenant_id: &TenantId) -> sqlx::Result<Vec<AlertRule>> {
    let rows = sqlx::query(
        "SELECT rule_id, severity, site_ids, group_ids, spec, escalation_minutes
         FROM alert_rules WHERE tenant_id = $1 AND enabled = true",
    )
    .bind(tenant_id.as_str())
    .fetch_all(pool)
    .await?;

    let rules = rows
        .into_iter()
        .filter_map(|row| {
            let spec: RuleSpec = serde_json::from_value(row.get("spec")).ok()?;
            let site_ids: Vec<String> = row.get("site_ids");
            Some(AlertRule {
                tenant_id: tenant_id.clone(),
                rule_id: RuleId::new(row.get::<String, _>("rule_id")),
                enabled: true,
                severity: row.get::<i16, _>("severity") as u8,
                site_ids: site_ids.into_iter().map(SiteId::new).collect(),
                group_ids: row.get("group_ids"),
                spec,
                escalation_minutes: row.get("escalation_minutes"),
            })
        })
        .collect();

    Ok(rules)
}

/// Distinct tenant ids with at least one rule defined, used to bound the
/// evaluator's per-cycle tenant scan.
pub async fn tenants_with_rules(pool: &PgPool) -> sqlx::Result<Vec<TenantId>> {
    let rows = sqlx::query("SELECT DISTINCT tenant_id FROM alert_rules")
        .fetch_all(pool)
        .await?;
    Ok(rows
        .into_iter()
        .map(|r| TenantId::new(r.get::<String, _>("tenant_id")))
        .collect())
}

/// All metric mappings for a tenant, applied in order to produce
/// normalized metric names (`spec.md` §4.2).
pub async fn metric_mappings(pool: &PgPool, tenant_id: &TenantId) -> sqlx::Result<Vec<MetricMapping>> {
    let rows = sqlx::query(
        "SELECT raw_metric_name, normalized_metric_name, multiplier, offset_value
         FROM metric_mappings WHERE tenant_id = $1",
    )
    .bind(tenant_id.as_str())
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| MetricMapping {
            tenant_id: tenant_id.clone(),
            raw_metric_name: row.get("raw_metric_name"),
            normalized_metric_name: row.get("normalized_metric_name"),
            multiplier: row.get("multiplier"),
            offset: row.get("offset_value"),
        })
        .collect())
}
