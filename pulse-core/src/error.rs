use thiserror::Error;

/// Top-level error type shared by every Pulse service.
///
/// Variants group by *handling*, not by call site, per the taxonomy in the
/// spec's error-handling design: an input rejection is counted and
/// quarantined, never propagated as a crash; transient/permanent split
/// drives delivery retry policy; `Config` and `Db` bubble up to a service's
/// outer loop, which logs and continues rather than unwinding the process.
#[derive(Debug, Error)]
pub enum PulseError {
    /// A message failed ingest validation; `IngestRejection` names the
    /// specific reason for counters/quarantine.
    #[error("input rejected: {0}")]
    Input(#[from] IngestRejection),

    /// A delivery attempt failed in a way that is worth retrying.
    #[error("transient failure: {0}")]
    Transient(String),

    /// A delivery attempt failed in a way retries cannot fix.
    #[error("permanent failure: {0}")]
    Permanent(String),

    /// Configuration could not be loaded or parsed.
    #[error("configuration error: {0}")]
    Config(String),

    /// A database operation failed. Carries the stringified cause rather
    /// than `sqlx::Error` directly so `pulse-core` stays free of I/O
    /// dependencies; `pulse-db` converts at the boundary.
    #[error("database error: {0}")]
    Db(String),

    /// A rule definition or evaluation input was invalid.
    #[error("rule error: {0}")]
    Rule(String),

    #[error("{0}")]
    Other(String),
}

/// Reasons an inbound telemetry message is rejected before being persisted.
///
/// Each variant corresponds to a per-minute `(bucket, tenant, reason)`
/// counter (spec §4.1, §7) and to a possible quarantine-log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum IngestRejection {
    #[error("topic does not match tenant/<tenant_id>/device/<device_id>/<msg_type>")]
    BadTopicFormat,
    #[error("payload is not valid JSON")]
    ParseError,
    #[error("payload exceeds the configured maximum size")]
    PayloadTooLarge,
    #[error("metrics map has more than 50 keys")]
    TooManyMetrics,
    #[error("a metric key exceeds 128 bytes")]
    MetricKeyTooLong,
    #[error("a metric key contains a control character")]
    MetricKeyInvalid,
    #[error("payload is missing site_id")]
    MissingSiteId,
    #[error("topic tenant_id and payload tenant_id disagree")]
    TenantMismatchTopicVsPayload,
    #[error("device exceeded its rate limit")]
    RateLimited,
    #[error("device is not registered")]
    UnregisteredDevice,
    #[error("device registry status is not ACTIVE")]
    DeviceRevoked,
    #[error("payload site_id does not match the registry site_id")]
    SiteMismatch,
    #[error("token enforcement is on but the payload carries no token")]
    TokenMissing,
    #[error("presented token does not hash to the registry's provision_token_hash")]
    TokenInvalid,
    #[error("registry row has no provision_token_hash set")]
    TokenNotSetInRegistry,
    #[error("payload declares an unsupported envelope version")]
    UnsupportedEnvelopeVersion,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ingest_rejection_converts_into_pulse_error() {
        let err: PulseError = IngestRejection::MissingSiteId.into();
        assert!(matches!(err, PulseError::Input(IngestRejection::MissingSiteId)));
        assert_eq!(err.to_string(), "input rejected: payload is missing site_id");
    }

    #[test]
    fn display_messages_are_stable() {
        assert_eq!(
            IngestRejection::RateLimited.to_string(),
            "device exceeded its rate limit"
        );
    }
}
