//! One evaluation cycle across every tenant with registered devices
//! (`spec.md` §4.2): liveness, rule dispatch, alert upsert.
//!
//! The escalation sweep ([`crate::escalation::sweep`]) runs on its own
//! cadence, independent of this cycle.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::warn;

use pulse_core::domain::{AlertRule, FleetAlert, MetricMapping};
use pulse_core::types::{DeviceId, TenantId};

use crate::liveness;
use crate::maintenance;
use crate::rules;
use crate::windows::WindowRuntime;

/// Run one cycle across every tenant with at least one registered device.
/// A single tenant's failure is logged and does not stop the rest.
pub async fn run_once(pool: &PgPool, heartbeat_stale: chrono::Duration, windows: &WindowRuntime) {
    let tenants = match pulse_db::queries::registry::tenants_with_devices(pool).await {
        Ok(t) => t,
        Err(err) => {
            warn!(%err, "failed to list tenants for evaluation cycle");
            return;
        }
    };

    let mut live = HashSet::new();
    for tenant_id in tenants {
        match run_tenant(pool, &tenant_id, heartbeat_stale, windows).await {
            Ok(devices) => live.extend(devices.into_iter().map(|d| (tenant_id.clone(), d))),
            Err(err) => warn!(%err, %tenant_id, "evaluation cycle failed for tenant"),
        }
    }
    windows.retain_devices(&live);
}

async fn run_tenant(
    pool: &PgPool,
    tenant_id: &TenantId,
    heartbeat_stale: chrono::Duration,
    windows: &WindowRuntime,
) -> sqlx::Result<Vec<DeviceId>> {
    let now = Utc::now();
    let devices = pulse_db::queries::device_state::registered_devices(pool, tenant_id).await?;
    let rule_list = pulse_db::queries::rules::enabled_for_tenant(pool, tenant_id).await?;
    let mappings = pulse_db::queries::rules::metric_mappings(pool, tenant_id).await?;
    let maintenance_windows = pulse_db::queries::maintenance::active_windows(pool, tenant_id).await?;

    let mut opened_any = false;

    for device in &devices {
        let snapshot =
            pulse_db::queries::telemetry::latest_snapshot(pool, tenant_id, &device.device_id).await?;

        let liveness = liveness::classify(device.active, snapshot.last_heartbeat_at, now, heartbeat_stale);
        pulse_db::queries::device_state::upsert_status(
            pool,
            tenant_id,
            &device.device_id,
            liveness,
            snapshot.last_heartbeat_at,
            snapshot.last_telemetry_at,
            &serde_json::to_value(&snapshot.metrics).unwrap_or_default(),
        )
        .await?;

        liveness::sync_alert(pool, tenant_id, &device.site_id, &device.device_id, liveness).await?;

        let metrics = apply_mappings(&snapshot.metrics, &mappings);
        let in_maintenance = maintenance::in_maintenance(
            &maintenance_windows,
            &device.site_id,
            device.device_type.as_deref(),
            now,
        );

        let group_ids =
            pulse_db::queries::registry::group_ids_for_device(pool, tenant_id, &device.device_id).await?;

        for rule in &rule_list {
            if !rules::rule_in_scope(rule, &device.site_id, &group_ids) {
                continue;
            }
            let opened = dispatch_rule(
                pool,
                windows,
                tenant_id,
                &device.device_id,
                &device.site_id,
                rule,
                &metrics,
                in_maintenance,
                now,
            )
            .await?;
            opened_any = opened_any || opened;
        }
    }

    if opened_any {
        pulse_db::notify::new_fleet_alert(pool).await;
    }

    Ok(devices.into_iter().map(|d| d.device_id).collect())
}

/// Evaluate one rule for one device and open/close its alert. Returns
/// `true` if a brand-new alert row was created.
#[allow(clippy::too_many_arguments)]
async fn dispatch_rule(
    pool: &PgPool,
    windows: &WindowRuntime,
    tenant_id: &TenantId,
    device_id: &DeviceId,
    site_id: &pulse_core::types::SiteId,
    rule: &AlertRule,
    metrics: &HashMap<String, f64>,
    in_maintenance: bool,
    now: DateTime<Utc>,
) -> sqlx::Result<bool> {
    let fired = rules::fires(
        pool,
        windows,
        tenant_id,
        device_id,
        &rule.rule_id,
        &rule.spec,
        metrics,
        now,
    )
    .await?;

    let fingerprint = FleetAlert::rule_fingerprint(&rule.rule_id, device_id);

    if !fired {
        pulse_db::queries::alerts::close_by_fingerprint(pool, tenant_id, &fingerprint).await?;
        return Ok(false);
    }

    if in_maintenance {
        return Ok(false);
    }

    if let Some(existing) = pulse_db::queries::alerts::find_open_by_fingerprint(pool, tenant_id, &fingerprint).await? {
        if existing.is_silenced(now) {
            return Ok(false);
        }
    }

    let (_, created) = pulse_db::queries::alerts::deduplicate_or_create_alert(
        pool,
        tenant_id,
        site_id,
        device_id,
        rules::alert_type_for(&rule.spec),
        &fingerprint,
        rule.severity,
        1.0,
        &format!("rule {} fired for device {device_id}", rule.rule_id),
        &serde_json::json!({}),
        Some(&rule.rule_id),
    )
    .await?;

    Ok(created)
}

fn apply_mappings(raw: &HashMap<String, f64>, mappings: &[MetricMapping]) -> HashMap<String, f64> {
    let mut result = raw.clone();
    for mapping in mappings {
        if let Some(&value) = raw.get(&mapping.raw_metric_name) {
            result.insert(mapping.normalized_metric_name.clone(), mapping.apply(value));
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mapping_adds_normalized_metric_without_dropping_raw() {
        let mut raw = HashMap::new();
        raw.insert("temp_raw".to_owned(), 500.0);
        let mappings = vec![MetricMapping {
            tenant_id: pulse_core::types::TenantId::new("t1"),
            raw_metric_name: "temp_raw".into(),
            normalized_metric_name: "temp_c".into(),
            multiplier: 0.1,
            offset: -40.0,
        }];
        let result = apply_mappings(&raw, &mappings);
        assert_eq!(result.get("temp_raw"), Some(&500.0));
        assert!((result.get("temp_c").unwrap() - 10.0).abs() < 1e-9);
    }
}
