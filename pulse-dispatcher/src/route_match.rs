//! Route-matching predicate (`spec.md` §4.3): does this [`IntegrationRoute`]
//! want this [`FleetAlert`] for this event?

use pulse_core::domain::{DeliverOnEvent, FleetAlert, IntegrationRoute};

/// `true` if `route` should receive `alert` for `event`.
#[must_use]
pub fn matches(route: &IntegrationRoute, alert: &FleetAlert, event: DeliverOnEvent) -> bool {
    if !route.deliver_on.contains(&event) {
        return false;
    }
    if let Some(min_severity) = route.min_severity {
        if alert.severity < min_severity {
            return false;
        }
    }
    if !route.alert_types.is_empty() && !route.alert_types.contains(&alert.alert_type) {
        return false;
    }
    if !route.site_ids.is_empty() && !route.site_ids.contains(&alert.site_id) {
        return false;
    }
    if !route.device_prefixes.is_empty() {
        let device_id = alert.device_id.as_str();
        if !route.device_prefixes.iter().any(|prefix| device_id.starts_with(prefix.as_str())) {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pulse_core::types::{AlertId, DeviceId, IntegrationId, RouteId, SiteId, TenantId};

    fn base_route() -> IntegrationRoute {
        IntegrationRoute {
            tenant_id: TenantId::new("t1"),
            route_id: RouteId::new("r1"),
            integration_id: IntegrationId::new("i1"),
            enabled: true,
            priority: 0,
            created_at: Utc::now(),
            min_severity: None,
            alert_types: vec![],
            site_ids: vec![],
            device_prefixes: vec![],
            deliver_on: vec![DeliverOnEvent::Open],
        }
    }

    fn base_alert() -> FleetAlert {
        FleetAlert {
            id: AlertId::new_v4(),
            tenant_id: TenantId::new("t1"),
            site_id: SiteId::new("site-1"),
            device_id: DeviceId::new("dev-1"),
            alert_type: pulse_core::domain::AlertType::Threshold,
            fingerprint: "RULE:r1:dev-1".into(),
            status: pulse_core::domain::AlertStatus::Open,
            severity: 3,
            confidence: 1.0,
            summary: "x".into(),
            details: serde_json::json!({}),
            rule_id: None,
            trigger_count: 1,
            created_at: Utc::now(),
            closed_at: None,
            silenced_until: None,
            acknowledged_by: None,
            acknowledged_at: None,
            escalation_level: 0,
            escalated_at: None,
        }
    }

    #[test]
    fn unscoped_route_matches_open_event() {
        let route = base_route();
        let alert = base_alert();
        assert!(matches(&route, &alert, DeliverOnEvent::Open));
        assert!(!matches(&route, &alert, DeliverOnEvent::Closed));
    }

    #[test]
    fn min_severity_skips_less_severe_alerts() {
        let mut route = base_route();
        route.min_severity = Some(4);
        let mut alert = base_alert();
        alert.severity = 3; // more severe than the floor -- skipped
        assert!(!matches(&route, &alert, DeliverOnEvent::Open));
        alert.severity = 4;
        assert!(matches(&route, &alert, DeliverOnEvent::Open));
        alert.severity = 5;
        assert!(matches(&route, &alert, DeliverOnEvent::Open));
    }

    #[test]
    fn alert_type_scope_requires_membership() {
        let mut route = base_route();
        route.alert_types = vec![pulse_core::domain::AlertType::Window];
        let alert = base_alert();
        assert!(!matches(&route, &alert, DeliverOnEvent::Open));
    }

    #[test]
    fn device_prefix_scope_matches_by_prefix() {
        let mut route = base_route();
        route.device_prefixes = vec!["dev-".into()];
        let alert = base_alert();
        assert!(matches(&route, &alert, DeliverOnEvent::Open));
        route.device_prefixes = vec!["sensor-".into()];
        assert!(!matches(&route, &alert, DeliverOnEvent::Open));
    }
}
