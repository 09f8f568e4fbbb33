//! Device liveness classification and the `NO_HEARTBEAT` alert it drives
//! (`spec.md` §4.2 steps 2-3).

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use pulse_core::domain::{AlertType, DeviceLiveness, FleetAlert};
use pulse_core::types::{DeviceId, SiteId, TenantId};

/// Classify a device's liveness from its registry status and last heartbeat.
/// Staleness is a strict `>` comparison: exactly `stale_after` is still
/// ONLINE (`spec.md` §8 boundary behavior).
#[must_use]
pub fn classify(
    registry_active: bool,
    last_heartbeat_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    stale_after: chrono::Duration,
) -> DeviceLiveness {
    if !registry_active {
        return DeviceLiveness::Stale;
    }
    match last_heartbeat_at {
        None => DeviceLiveness::Stale,
        Some(last) if now - last > stale_after => DeviceLiveness::Stale,
        Some(_) => DeviceLiveness::Online,
    }
}

/// Open/refresh or close the `NO_HEARTBEAT:<device_id>` alert to match the
/// device's current liveness.
pub async fn sync_alert(
    pool: &PgPool,
    tenant_id: &TenantId,
    site_id: &SiteId,
    device_id: &DeviceId,
    liveness: DeviceLiveness,
) -> sqlx::Result<()> {
    let fingerprint = FleetAlert::heartbeat_fingerprint(device_id);

    match liveness {
        DeviceLiveness::Online => {
            pulse_db::queries::alerts::close_by_fingerprint(pool, tenant_id, &fingerprint).await?;
        }
        DeviceLiveness::Stale | DeviceLiveness::Offline => {
            pulse_db::queries::alerts::deduplicate_or_create_alert(
                pool,
                tenant_id,
                site_id,
                device_id,
                AlertType::NoHeartbeat,
                &fingerprint,
                4,
                0.9,
                &format!("device {device_id} missed its heartbeat window"),
                &serde_json::json!({}),
                None,
            )
            .await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn inactive_registry_is_always_stale() {
        assert_eq!(
            classify(false, Some(t(0)), t(0), chrono::Duration::seconds(300)),
            DeviceLiveness::Stale
        );
    }

    #[test]
    fn missing_heartbeat_is_stale() {
        assert_eq!(
            classify(true, None, t(1000), chrono::Duration::seconds(300)),
            DeviceLiveness::Stale
        );
    }

    #[test]
    fn exactly_at_threshold_is_still_online() {
        let last = t(0);
        let now = last + chrono::Duration::seconds(300);
        assert_eq!(
            classify(true, Some(last), now, chrono::Duration::seconds(300)),
            DeviceLiveness::Online
        );
    }

    #[test]
    fn one_second_past_threshold_is_stale() {
        let last = t(0);
        let now = last + chrono::Duration::seconds(301);
        assert_eq!(
            classify(true, Some(last), now, chrono::Duration::seconds(300)),
            DeviceLiveness::Stale
        );
    }
}
