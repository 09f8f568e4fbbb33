//! Escalation sweep (`spec.md` §4.2): run on [`crate::config::EvaluatorConfig::poll`]
//! cadence, independent of the per-device evaluation cycle.

use sqlx::PgPool;
use tracing::{info, warn};

/// Run one escalation sweep across every tenant with at least one rule
/// defined. Logs and continues past a single tenant's failure so one bad
/// row never stalls the sweep for the rest of the fleet.
pub async fn sweep(pool: &PgPool) {
    let tenants = match pulse_db::queries::rules::tenants_with_rules(pool).await {
        Ok(t) => t,
        Err(err) => {
            warn!(%err, "failed to list tenants for escalation sweep");
            return;
        }
    };

    for tenant_id in tenants {
        match pulse_db::queries::alerts::escalate_sweep(pool, &tenant_id).await {
            Ok(0) => {}
            Ok(count) => info!(%tenant_id, count, "escalated alerts"),
            Err(err) => warn!(%err, %tenant_id, "escalation sweep failed"),
        }
    }
}
