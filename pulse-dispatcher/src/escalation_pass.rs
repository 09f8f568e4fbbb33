//! Escalation dispatch pass (`spec.md` §4.3): re-fire routes for alerts that
//! escalated recently, skipping any route that already completed a delivery
//! since the escalation.

use sqlx::PgPool;
use tracing::warn;

use pulse_core::domain::DeliverOnEvent;

use crate::config::DispatcherConfig;
use crate::{payload, route_match};

/// Run one escalation pass across every tenant with at least one `OPEN`
/// alert. Returns the number of jobs newly inserted.
pub async fn run_once(pool: &PgPool, config: &DispatcherConfig) -> u64 {
    let tenants = match pulse_db::queries::alerts::tenants_with_open_alerts(pool).await {
        Ok(t) => t,
        Err(err) => {
            warn!(%err, "failed to list tenants with open alerts");
            return 0;
        }
    };

    let mut inserted = 0;
    for tenant_id in tenants {
        match run_tenant(pool, config, &tenant_id).await {
            Ok(count) => inserted += count,
            Err(err) => warn!(%err, %tenant_id, "escalation dispatch pass failed for tenant"),
        }
    }
    inserted
}

async fn run_tenant(
    pool: &PgPool,
    config: &DispatcherConfig,
    tenant_id: &pulse_core::types::TenantId,
) -> sqlx::Result<u64> {
    let alerts =
        pulse_db::queries::alerts::recently_escalated(pool, tenant_id, config.escalation_lookback_minutes)
            .await?;
    if alerts.is_empty() {
        return Ok(0);
    }

    let mut routes = pulse_db::queries::integrations::enabled_routes_with_integrations(pool, tenant_id).await?;
    routes.truncate(config.route_limit.max(0) as usize);
    if routes.is_empty() {
        return Ok(0);
    }

    let mut inserted = 0;
    for alert in &alerts {
        let Some(escalated_at) = alert.escalated_at else {
            continue;
        };
        for (route, _integration) in &routes {
            if !route_match::matches(route, alert, DeliverOnEvent::Open) {
                continue;
            }
            let already_delivered = pulse_db::queries::jobs::completed_job_exists_since(
                pool,
                tenant_id,
                alert.id,
                &route.route_id,
                escalated_at,
            )
            .await?;
            if already_delivered {
                continue;
            }

            let payload = serde_json::to_value(payload::build(alert, true))
                .unwrap_or_else(|_| serde_json::json!({}));
            // Escalation re-fires use a distinct `deliver_on_event` (CLOSED)
            // from the primary pass's OPEN job so the two inserts land on
            // different rows under the (tenant_id, alert_id, route_id,
            // deliver_on_event) unique index (spec.md §4.3) instead of the
            // escalation insert silently no-opping against the original.
            let created = pulse_db::queries::jobs::insert_pending(
                pool,
                tenant_id,
                alert.id,
                &route.integration_id,
                &route.route_id,
                DeliverOnEvent::Closed,
                &payload,
            )
            .await?;
            if created {
                inserted += 1;
            }
        }
    }

    if inserted > 0 {
        pulse_db::notify::new_delivery_job(pool).await;
    }

    Ok(inserted)
}
