//! Per-device rule dispatch (`spec.md` §4.2): routes one [`AlertRule`] to
//! the matching `pulse-rules` fire check, fetching whatever SQL aggregate
//! that rule type needs along the way.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use pulse_core::domain::{AlertRule, Operator, RuleSpec};
use pulse_core::types::{DeviceId, RuleId, TenantId};
use pulse_rules::{anomaly, gap, threshold};

use crate::windows::WindowRuntime;

fn operator_sql(op: Operator) -> &'static str {
    match op {
        Operator::Gt => ">",
        Operator::Gte => ">=",
        Operator::Lt => "<",
        Operator::Lte => "<=",
        Operator::Eq => "=",
        Operator::Ne => "<>",
    }
}

/// `true` if `rule`'s scope (site and device-group filters) includes this
/// device. Empty lists mean "all" (`spec.md` §4.2).
#[must_use]
pub fn rule_in_scope(rule: &AlertRule, site_id: &pulse_core::types::SiteId, device_group_ids: &[String]) -> bool {
    let site_ok = rule.site_ids.is_empty() || rule.site_ids.contains(site_id);
    let group_ok = rule.group_ids.is_empty()
        || rule.group_ids.iter().any(|g| device_group_ids.iter().any(|d| d == g));
    site_ok && group_ok
}

/// Evaluate whether `rule` fires for `device_id` right now. `latest_metrics`
/// is the device's most recent telemetry sample, used by window and
/// anomaly rules for the current value.
pub async fn fires(
    pool: &PgPool,
    windows: &WindowRuntime,
    tenant_id: &TenantId,
    device_id: &DeviceId,
    rule_id: &RuleId,
    spec: &RuleSpec,
    latest_metrics: &HashMap<String, f64>,
    now: DateTime<Utc>,
) -> sqlx::Result<bool> {
    match spec {
        RuleSpec::Threshold { conditions, match_mode, duration_seconds } => {
            let mut results = Vec::with_capacity(conditions.len());
            for condition in conditions {
                let duration_minutes =
                    threshold::effective_duration_minutes(condition, *duration_seconds);
                let since = now - chrono::Duration::minutes(duration_minutes.max(0));
                let breached = pulse_db::queries::telemetry::continuously_breached(
                    pool,
                    tenant_id,
                    device_id,
                    &condition.metric_name,
                    operator_sql(condition.operator),
                    condition.threshold,
                    since,
                )
                .await?;
                results.push(breached);
            }
            Ok(threshold::combine(results.into_iter(), *match_mode))
        }
        RuleSpec::Window { metric_name, aggregation, window_seconds, operator, threshold: threshold_value } => {
            let Some(&value) = latest_metrics.get(metric_name) else {
                return Ok(false);
            };
            let result = windows.push_and_evaluate(
                tenant_id,
                device_id,
                rule_id,
                now,
                value,
                *window_seconds,
                *aggregation,
                *operator,
                *threshold_value,
            );
            Ok(result.unwrap_or(false))
        }
        RuleSpec::Anomaly { metric_name, window_minutes, min_samples, z_threshold } => {
            let Some(&latest) = latest_metrics.get(metric_name) else {
                return Ok(false);
            };
            let since = now - chrono::Duration::minutes(*window_minutes);
            let (mean, stddev, n) =
                pulse_db::queries::telemetry::mean_stddev(pool, tenant_id, device_id, metric_name, since)
                    .await?;
            Ok(anomaly::fires(mean, stddev, latest, n, *min_samples, *z_threshold))
        }
        RuleSpec::TelemetryGap { metric_name, gap_minutes } => {
            let since = now - chrono::Duration::minutes(*gap_minutes);
            let has_row = pulse_db::queries::telemetry::has_recent_row(
                pool,
                tenant_id,
                device_id,
                metric_name.as_deref(),
                since,
            )
            .await?;
            Ok(gap::fires(has_row))
        }
    }
}

/// Maps a [`RuleSpec`] to its [`pulse_core::domain::AlertType`].
#[must_use]
pub fn alert_type_for(spec: &RuleSpec) -> pulse_core::domain::AlertType {
    match spec {
        RuleSpec::Threshold { .. } => pulse_core::domain::AlertType::Threshold,
        RuleSpec::Window { .. } => pulse_core::domain::AlertType::Window,
        RuleSpec::Anomaly { .. } => pulse_core::domain::AlertType::Anomaly,
        RuleSpec::TelemetryGap { .. } => pulse_core::domain::AlertType::NoTelemetry,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_core::types::SiteId;

    fn rule(site_ids: Vec<&str>, group_ids: Vec<&str>) -> AlertRule {
        AlertRule {
            tenant_id: TenantId::new("t1"),
            rule_id: RuleId::new("r1"),
            enabled: true,
            severity: 3,
            site_ids: site_ids.into_iter().map(SiteId::new).collect(),
            group_ids: group_ids.into_iter().map(String::from).collect(),
            spec: RuleSpec::TelemetryGap { metric_name: None, gap_minutes: 10 },
            escalation_minutes: None,
        }
    }

    #[test]
    fn empty_scope_matches_everything() {
        let r = rule(vec![], vec![]);
        assert!(rule_in_scope(&r, &SiteId::new("any"), &[]));
    }

    #[test]
    fn site_scope_requires_membership() {
        let r = rule(vec!["site-1"], vec![]);
        assert!(rule_in_scope(&r, &SiteId::new("site-1"), &[]));
        assert!(!rule_in_scope(&r, &SiteId::new("site-2"), &[]));
    }

    #[test]
    fn group_scope_requires_membership() {
        let r = rule(vec![], vec!["group-a"]);
        assert!(rule_in_scope(&r, &SiteId::new("site-1"), &["group-a".to_owned()]));
        assert!(!rule_in_scope(&r, &SiteId::new("site-1"), &["group-b".to_owned()]));
    }

    #[test]
    fn alert_type_mapping() {
        assert_eq!(
            alert_type_for(&RuleSpec::Window {
                metric_name: "temp_c".into(),
                aggregation: pulse_core::domain::Aggregation::Avg,
                window_seconds: 60,
                operator: Operator::Gt,
                threshold: 1.0,
            }),
            pulse_core::domain::AlertType::Window
        );
    }
}
