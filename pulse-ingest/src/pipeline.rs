//! The per-message ingest pipeline (`spec.md` §4.1): parse, validate,
//! rate-limit, authorize, then enqueue for batched persistence. Every
//! rejection short-circuits through [`crate::quarantine::record`] rather
//! than propagating -- a malformed or unauthorized message is counted, not
//! a process error.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use tokio::sync::RwLock;

use pulse_core::domain::{MsgType, TelemetryRecord};
use pulse_core::types::{DeviceId, SiteId, TenantId};
use pulse_core::IngestRejection;

use crate::auth_cache::AuthCache;
use crate::batch_writer::BatchWriter;
use crate::quarantine;
use crate::rate_limit::RateLimiter;
use crate::settings::RuntimeSettings;

const MAX_METRIC_KEYS: usize = 50;
const MAX_METRIC_KEY_LEN: usize = 128;
const SUPPORTED_ENVELOPE_VERSION: &str = "1";

/// Wire shape of an inbound telemetry/heartbeat payload (`spec.md` §6).
/// `tenant_id` and `version` are rarely present on the wire but are checked
/// for consistency when they are.
#[derive(Debug, Deserialize)]
struct InboundPayload {
    #[serde(default)]
    tenant_id: Option<String>,
    #[serde(default)]
    version: Option<String>,
    site_id: Option<String>,
    #[serde(default)]
    provision_token: Option<String>,
    #[serde(default)]
    seq: i64,
    #[serde(default)]
    metrics: HashMap<String, f64>,
}

/// Shared state every pipeline worker task reads and writes.
pub struct PipelineContext {
    pub pool: PgPool,
    pub auth_cache: AuthCache,
    pub rate_limiter: RateLimiter,
    pub batch_writer: Arc<BatchWriter>,
    pub settings: Arc<RwLock<RuntimeSettings>>,
    pub require_token: bool,
    pub auto_provision: bool,
}

struct ParsedTopic {
    tenant_id: TenantId,
    device_id: DeviceId,
    msg_type: MsgType,
}

fn parse_topic(topic: &str) -> Option<ParsedTopic> {
    let parts: Vec<&str> = topic.split('/').collect();
    if parts.len() != 5 || parts[0] != "tenant" || parts[2] != "device" {
        return None;
    }
    let msg_type = match parts[4] {
        "telemetry" => MsgType::Telemetry,
        "heartbeat" => MsgType::Heartbeat,
        _ => return None,
    };
    if parts[1].is_empty() || parts[3].is_empty() {
        return None;
    }
    Some(ParsedTopic {
        tenant_id: TenantId::new(parts[1]),
        device_id: DeviceId::new(parts[3]),
        msg_type,
    })
}

fn validate_metrics(metrics: &HashMap<String, f64>) -> Result<(), IngestRejection> {
    if metrics.len() > MAX_METRIC_KEYS {
        return Err(IngestRejection::TooManyMetrics);
    }
    for key in metrics.keys() {
        if key.len() > MAX_METRIC_KEY_LEN {
            return Err(IngestRejection::MetricKeyTooLong);
        }
        if key.chars().any(char::is_control) {
            return Err(IngestRejection::MetricKeyInvalid);
        }
    }
    Ok(())
}

fn hash_token(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    hex::encode(digest)
}

/// Process one inbound message. Never returns an error to the caller;
/// rejections are recorded through [`quarantine::record`] and the function
/// returns.
#[tracing::instrument(skip(ctx, raw_body), fields(topic))]
pub async fn process(ctx: &PipelineContext, topic: &str, raw_body: &[u8]) {
    let raw_text = String::from_utf8_lossy(raw_body);
    let settings = ctx.settings.read().await.clone();

    let Some(parsed_topic) = parse_topic(topic) else {
        quarantine::record(
            &ctx.pool,
            &settings,
            None,
            None,
            IngestRejection::BadTopicFormat,
            &raw_text,
        )
        .await;
        return;
    };

    if raw_body.len() > settings.max_payload_bytes {
        quarantine::record(
            &ctx.pool,
            &settings,
            Some(&parsed_topic.tenant_id),
            Some(&parsed_topic.device_id),
            IngestRejection::PayloadTooLarge,
            &raw_text,
        )
        .await;
        return;
    }

    let payload: InboundPayload = match serde_json::from_slice(raw_body) {
        Ok(p) => p,
        Err(_) => {
            quarantine::record(
                &ctx.pool,
                &settings,
                Some(&parsed_topic.tenant_id),
                Some(&parsed_topic.device_id),
                IngestRejection::ParseError,
                &raw_text,
            )
            .await;
            return;
        }
    };

    macro_rules! reject {
        ($reason:expr) => {{
            quarantine::record(
                &ctx.pool,
                &settings,
                Some(&parsed_topic.tenant_id),
                Some(&parsed_topic.device_id),
                $reason,
                &raw_text,
            )
            .await;
            return;
        }};
    }

    if let Err(reason) = validate_metrics(&payload.metrics) {
        reject!(reason);
    }

    if let Some(version) = &payload.version {
        if version != SUPPORTED_ENVELOPE_VERSION {
            reject!(IngestRejection::UnsupportedEnvelopeVersion);
        }
    }

    if let Some(payload_tenant) = &payload.tenant_id {
        if payload_tenant != parsed_topic.tenant_id.as_str() {
            reject!(IngestRejection::TenantMismatchTopicVsPayload);
        }
    }

    let Some(site_id_raw) = &payload.site_id else {
        reject!(IngestRejection::MissingSiteId);
    };
    let site_id = SiteId::new(site_id_raw.as_str());

    if !ctx
        .rate_limiter
        .allow(&parsed_topic.tenant_id, &parsed_topic.device_id)
    {
        reject!(IngestRejection::RateLimited);
    }

    let registry_entry = match ctx
        .auth_cache
        .get(&parsed_topic.tenant_id, &parsed_topic.device_id)
    {
        Some(entry) => Some(entry),
        None => {
            match pulse_db::queries::registry::find(
                &ctx.pool,
                &parsed_topic.tenant_id,
                &parsed_topic.device_id,
            )
            .await
            {
                Ok(Some(entry)) => {
                    ctx.auth_cache.put(
                        &parsed_topic.tenant_id,
                        &parsed_topic.device_id,
                        entry.clone(),
                    );
                    Some(entry)
                }
                Ok(None) => None,
                Err(err) => {
                    tracing::error!(%err, "registry lookup failed");
                    None
                }
            }
        }
    };

    let registry_entry = match registry_entry {
        Some(entry) => entry,
        None if ctx.auto_provision => {
            if let Err(err) = pulse_db::queries::registry::auto_provision(
                &ctx.pool,
                &parsed_topic.tenant_id,
                &parsed_topic.device_id,
                &site_id,
            )
            .await
            {
                tracing::error!(%err, "auto-provision failed");
                reject!(IngestRejection::UnregisteredDevice);
            }
            pulse_core::domain::DeviceRegistryEntry {
                tenant_id: parsed_topic.tenant_id.clone(),
                device_id: parsed_topic.device_id.clone(),
                site_id: site_id.clone(),
                status: pulse_core::domain::RegistryStatus::Active,
                provision_token_hash: None,
                metadata: serde_json::json!({}),
            }
        }
        None => reject!(IngestRejection::UnregisteredDevice),
    };

    if registry_entry.status != pulse_core::domain::RegistryStatus::Active {
        ctx.auth_cache
            .invalidate(&parsed_topic.tenant_id, &parsed_topic.device_id);
        reject!(IngestRejection::DeviceRevoked);
    }

    if registry_entry.site_id != site_id {
        reject!(IngestRejection::SiteMismatch);
    }

    if ctx.require_token {
        match (&payload.provision_token, &registry_entry.provision_token_hash) {
            (None, _) => reject!(IngestRejection::TokenMissing),
            (Some(_), None) => reject!(IngestRejection::TokenNotSetInRegistry),
            (Some(token), Some(expected_hash)) => {
                if &hash_token(token) != expected_hash {
                    reject!(IngestRejection::TokenInvalid);
                }
            }
        }
    }

    let record = TelemetryRecord {
        time: Utc::now(),
        tenant_id: parsed_topic.tenant_id.clone(),
        device_id: parsed_topic.device_id.clone(),
        site_id,
        msg_type: parsed_topic.msg_type,
        seq: payload.seq,
        metrics: payload.metrics,
    };
    ctx.batch_writer.enqueue(record);

    if let Err(err) =
        pulse_db::queries::registry::touch_last_auth(&ctx.pool, &parsed_topic.tenant_id, &parsed_topic.device_id)
            .await
    {
        tracing::warn!(%err, "failed to stamp last_auth_at");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_topic_accepts_well_formed_telemetry_topic() {
        let parsed = parse_topic("tenant/acme/device/dev-1/telemetry").unwrap();
        assert_eq!(parsed.tenant_id.as_str(), "acme");
        assert_eq!(parsed.device_id.as_str(), "dev-1");
        assert_eq!(parsed.msg_type, MsgType::Telemetry);
    }

    #[test]
    fn parse_topic_rejects_wrong_shape() {
        assert!(parse_topic("tenant/acme/device/dev-1").is_none());
        assert!(parse_topic("tenant/acme/devices/dev-1/telemetry").is_none());
        assert!(parse_topic("tenant/acme/device/dev-1/unknown").is_none());
        assert!(parse_topic("tenant//device/dev-1/telemetry").is_none());
    }

    #[test]
    fn validate_metrics_rejects_too_many_keys() {
        let metrics: HashMap<String, f64> =
            (0..51).map(|i| (format!("m{i}"), 1.0)).collect();
        assert_eq!(
            validate_metrics(&metrics),
            Err(IngestRejection::TooManyMetrics)
        );
    }

    #[test]
    fn validate_metrics_rejects_long_keys() {
        let mut metrics = HashMap::new();
        metrics.insert("x".repeat(129), 1.0);
        assert_eq!(
            validate_metrics(&metrics),
            Err(IngestRejection::MetricKeyTooLong)
        );
    }

    #[test]
    fn validate_metrics_rejects_control_chars() {
        let mut metrics = HashMap::new();
        metrics.insert("bad\u{0}key".to_owned(), 1.0);
        assert_eq!(
            validate_metrics(&metrics),
            Err(IngestRejection::MetricKeyInvalid)
        );
    }

    #[test]
    fn validate_metrics_accepts_reasonable_map() {
        let mut metrics = HashMap::new();
        metrics.insert("temp_c".to_owned(), 21.5);
        assert!(validate_metrics(&metrics).is_ok());
    }

    #[test]
    fn hash_token_is_deterministic() {
        assert_eq!(hash_token("secret"), hash_token("secret"));
        assert_ne!(hash_token("secret"), hash_token("other"));
    }
}
