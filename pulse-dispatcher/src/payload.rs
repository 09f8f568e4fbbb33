//! Builds the [`DeliveryPayload`] handed to every transport (`spec.md` §6).

use pulse_core::domain::{DeliveryPayload, FleetAlert};

#[must_use]
pub fn build(alert: &FleetAlert, escalated: bool) -> DeliveryPayload {
    DeliveryPayload {
        alert_id: alert.id,
        site_id: alert.site_id.clone(),
        device_id: alert.device_id.clone(),
        alert_type: alert.alert_type,
        severity: alert.severity,
        confidence: alert.confidence,
        summary: alert.summary.clone(),
        status: alert.status,
        created_at: alert.created_at,
        details: alert.details.clone(),
        escalated: escalated.then_some(true),
        escalation_level: escalated.then_some(alert.escalation_level),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_core::domain::{AlertStatus, AlertType};
    use pulse_core::types::{AlertId, DeviceId, SiteId, TenantId};

    fn alert() -> FleetAlert {
        FleetAlert {
            id: AlertId::new_v4(),
            tenant_id: TenantId::new("t1"),
            site_id: SiteId::new("site-1"),
            device_id: DeviceId::new("dev-1"),
            alert_type: AlertType::NoHeartbeat,
            fingerprint: "NO_HEARTBEAT:dev-1".into(),
            status: AlertStatus::Open,
            severity: 4,
            confidence: 0.9,
            summary: "no heartbeat".into(),
            details: serde_json::json!({}),
            rule_id: None,
            trigger_count: 1,
            created_at: chrono::Utc::now(),
            closed_at: None,
            silenced_until: None,
            acknowledged_by: None,
            acknowledged_at: None,
            escalation_level: 1,
            escalated_at: None,
        }
    }

    #[test]
    fn non_escalated_payload_omits_escalation_fields() {
        let payload = build(&alert(), false);
        assert_eq!(payload.escalated, None);
        assert_eq!(payload.escalation_level, None);
    }

    #[test]
    fn escalated_payload_carries_level() {
        let payload = build(&alert(), true);
        assert_eq!(payload.escalated, Some(true));
        assert_eq!(payload.escalation_level, Some(1));
    }
}
