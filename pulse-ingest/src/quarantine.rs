//! Rejection accounting for inbound messages that fail the ingest pipeline
//! (`spec.md` §4.1, §7). Every rejection bumps a per-minute counter;
//! whether the raw payload is also mirrored to the quarantine log depends
//! on the polled [`crate::settings::RuntimeSettings`].

use sqlx::PgPool;

use pulse_core::types::{DeviceId, TenantId};
use pulse_core::IngestRejection;

use crate::settings::RuntimeSettings;

/// Stable machine-readable reason string for counters and logs.
#[must_use]
pub fn reason_str(rejection: IngestRejection) -> &'static str {
    match rejection {
        IngestRejection::BadTopicFormat => "BAD_TOPIC_FORMAT",
        IngestRejection::ParseError => "PARSE_ERROR",
        IngestRejection::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
        IngestRejection::TooManyMetrics => "TOO_MANY_METRICS",
        IngestRejection::MetricKeyTooLong => "METRIC_KEY_TOO_LONG",
        IngestRejection::MetricKeyInvalid => "METRIC_KEY_INVALID",
        IngestRejection::MissingSiteId => "MISSING_SITE_ID",
        IngestRejection::TenantMismatchTopicVsPayload => "TENANT_MISMATCH",
        IngestRejection::RateLimited => "RATE_LIMITED",
        IngestRejection::UnregisteredDevice => "UNREGISTERED_DEVICE",
        IngestRejection::DeviceRevoked => "DEVICE_REVOKED",
        IngestRejection::SiteMismatch => "SITE_MISMATCH",
        IngestRejection::TokenMissing => "TOKEN_MISSING",
        IngestRejection::TokenInvalid => "TOKEN_INVALID",
        IngestRejection::TokenNotSetInRegistry => "TOKEN_NOT_SET_IN_REGISTRY",
        IngestRejection::UnsupportedEnvelopeVersion => "UNSUPPORTED_ENVELOPE_VERSION",
    }
}

/// Bump the counter and, when enabled, mirror the raw payload to the
/// quarantine log. `tenant_id` is `None` when the topic itself could not be
/// parsed far enough to recover a tenant.
pub async fn record(
    pool: &PgPool,
    settings: &RuntimeSettings,
    tenant_id: Option<&TenantId>,
    device_id: Option<&DeviceId>,
    rejection: IngestRejection,
    raw_body: &str,
) {
    let reason = reason_str(rejection);

    if let Some(tenant_id) = tenant_id {
        if let Err(err) =
            pulse_db::queries::telemetry::bump_quarantine_counter(pool, tenant_id, reason).await
        {
            tracing::warn!(%err, reason, "failed to bump quarantine counter");
        }
    }

    if settings.store_rejects {
        let body = settings.mirror_rejects_to_raw.then_some(raw_body);
        if let Err(err) =
            pulse_db::queries::telemetry::store_quarantine_event(pool, tenant_id, device_id, reason, body)
                .await
        {
            tracing::warn!(%err, reason, "failed to store quarantine event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_strings_are_distinct() {
        let all = [
            IngestRejection::BadTopicFormat,
            IngestRejection::ParseError,
            IngestRejection::PayloadTooLarge,
            IngestRejection::TooManyMetrics,
            IngestRejection::MetricKeyTooLong,
            IngestRejection::MetricKeyInvalid,
            IngestRejection::MissingSiteId,
            IngestRejection::TenantMismatchTopicVsPayload,
            IngestRejection::RateLimited,
            IngestRejection::UnregisteredDevice,
            IngestRejection::DeviceRevoked,
            IngestRejection::SiteMismatch,
            IngestRejection::TokenMissing,
            IngestRejection::TokenInvalid,
            IngestRejection::TokenNotSetInRegistry,
            IngestRejection::UnsupportedEnvelopeVersion,
        ];
        let strs: std::collections::HashSet<_> = all.iter().copied().map(reason_str).collect();
        assert_eq!(strs.len(), all.len());
    }
}
