//! Per-job dispatch (`spec.md` §4.4 steps 3-6): load the integration, send
//! by type, record the attempt, and resolve the job's next state.

use chrono::Utc;
use sqlx::PgPool;
use tracing::warn;

use pulse_core::domain::{DeliveryJob, DeliveryPayload, IntegrationSpec, JobStatus};
use pulse_transport::error::DeliveryError;
use pulse_transport::{email, mqtt, snmp, webhook};

use crate::config::WorkerConfig;

/// Dispatch one leased job to completion: send, record the attempt, and
/// transition the job row.
pub async fn handle_job(pool: &PgPool, config: &WorkerConfig, job: DeliveryJob) {
    let started_at = Utc::now();
    let attempt_no = job.attempts + 1;

    let integration = match pulse_db::queries::integrations::load(pool, &job.tenant_id, &job.integration_id).await {
        Ok(i) => i,
        Err(err) => {
            warn!(%err, job_id = %job.job_id, "failed to load integration for delivery job");
            finish(pool, config, &job, attempt_no, started_at, Err(DeliveryError::Other(err.to_string()))).await;
            return;
        }
    };

    let Some(integration) = integration else {
        finish(
            pool,
            config,
            &job,
            attempt_no,
            started_at,
            Err(DeliveryError::Configuration("integration not found".to_owned())),
        )
        .await;
        return;
    };
    if !integration.enabled {
        finish(
            pool,
            config,
            &job,
            attempt_no,
            started_at,
            Err(DeliveryError::Configuration("integration disabled".to_owned())),
        )
        .await;
        return;
    }

    let payload: DeliveryPayload = match serde_json::from_value(job.payload.clone()) {
        Ok(p) => p,
        Err(err) => {
            finish(
                pool,
                config,
                &job,
                attempt_no,
                started_at,
                Err(DeliveryError::Serialization(format!("malformed delivery payload: {err}"))),
            )
            .await;
            return;
        }
    };

    let result = send(config, &integration.spec, &job, &payload).await;
    finish(pool, config, &job, attempt_no, started_at, result).await;
}

async fn send(
    config: &WorkerConfig,
    spec: &IntegrationSpec,
    job: &DeliveryJob,
    payload: &DeliveryPayload,
) -> Result<(), DeliveryError> {
    let mode = config.core.mode;
    match spec {
        IntegrationSpec::Webhook { url, headers } => {
            let sender = webhook::WebhookSender::new(mode, config.timeout);
            sender.send(url, headers, &job.payload).await
        }
        IntegrationSpec::Snmp { host, port, credentials, oid_prefix } => {
            let target = snmp::SnmpTarget {
                host: host.as_str(),
                port: *port,
                credentials,
                oid_prefix: oid_prefix.as_str(),
            };
            let varbinds = vec![
                ("1".to_owned(), payload.alert_id.to_string()),
                ("2".to_owned(), payload.device_id.to_string()),
                ("3".to_owned(), payload.site_id.to_string()),
                ("4".to_owned(), payload.severity.to_string()),
                ("5".to_owned(), payload.summary.clone()),
            ];
            snmp::send_trap(target, mode, varbinds).await
        }
        IntegrationSpec::Email {
            smtp_host,
            smtp_port,
            tls,
            username,
            password,
            from_address,
            to_address,
        } => {
            let target = email::EmailTarget {
                smtp_host: smtp_host.as_str(),
                smtp_port: *smtp_port,
                tls: *tls,
                username: username.as_deref(),
                password: password.as_deref(),
                from_address: from_address.as_str(),
                to_address: to_address.as_str(),
            };
            let subject = format!("[pulse] {:?} alert on {}", payload.alert_type, payload.device_id);
            let body = format!(
                "{}\n\nseverity={} confidence={:.2}\ndetails={}",
                payload.summary, payload.severity, payload.confidence, payload.details
            );
            email::send(target, mode, &subject, &body).await
        }
        IntegrationSpec::Mqtt { broker_url, topic_template, qos, retain } => {
            let target = mqtt::MqttTarget {
                broker_url: broker_url.as_str(),
                qos: *qos,
                retain: *retain,
            };
            let topic = render_topic(topic_template, payload);
            let body = serde_json::to_vec(&job.payload)
                .map_err(|e| DeliveryError::Serialization(e.to_string()))?;
            mqtt::publish(target, mode, &topic, &body, config.timeout).await
        }
    }
}

fn render_topic(template: &str, payload: &DeliveryPayload) -> String {
    template
        .replace("{alert_id}", &payload.alert_id.to_string())
        .replace("{device_id}", payload.device_id.as_str())
        .replace("{site_id}", payload.site_id.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_core::domain::{AlertStatus, AlertType};
    use pulse_core::types::{AlertId, DeviceId, SiteId};

    fn payload() -> DeliveryPayload {
        DeliveryPayload {
            alert_id: AlertId::new_v4(),
            site_id: SiteId::new("site-1"),
            device_id: DeviceId::new("dev-1"),
            alert_type: AlertType::Threshold,
            severity: 3,
            confidence: 1.0,
            summary: "temp high".into(),
            status: AlertStatus::Open,
            created_at: chrono::Utc::now(),
            details: serde_json::json!({}),
            escalated: None,
            escalation_level: None,
        }
    }

    #[test]
    fn topic_template_substitutes_known_placeholders() {
        let p = payload();
        let topic = render_topic("alerts/{site_id}/{device_id}/{alert_id}", &p);
        assert_eq!(topic, format!("alerts/site-1/dev-1/{}", p.alert_id));
    }

    #[test]
    fn topic_template_leaves_unknown_placeholders_untouched() {
        let p = payload();
        let topic = render_topic("alerts/{unknown}", &p);
        assert_eq!(topic, "alerts/{unknown}");
    }
}

async fn finish(
    pool: &PgPool,
    config: &WorkerConfig,
    job: &DeliveryJob,
    attempt_no: i32,
    started_at: chrono::DateTime<Utc>,
    result: Result<(), DeliveryError>,
) {
    let finished_at = Utc::now();
    let latency_ms = (finished_at - started_at).num_milliseconds().max(0);
    let ok = result.is_ok();
    let http_status = match &result {
        Err(DeliveryError::HttpStatus(status)) => Some(i32::from(*status)),
        _ => None,
    };
    let error_reason = result.as_ref().err().map(DeliveryError::reason_code);

    if let Err(err) = pulse_db::queries::jobs::record_attempt(
        pool,
        job.job_id,
        attempt_no,
        ok,
        http_status,
        latency_ms,
        error_reason.as_deref(),
        started_at,
        finished_at,
    )
    .await
    {
        warn!(%err, job_id = %job.job_id, "failed to record delivery attempt");
    }

    let attempts_before = job.attempts;
    let new_status = if let Err(err) = result {
        // Every failure -- SSRF-blocked, 4xx, timeouts, whatever -- retries
        // with backoff up to WORKER_MAX_ATTEMPTS before failing the job;
        // spec.md §7 is explicit that 4xx is "still retried up to max
        // attempts" and that an SSRF rejection "also counts as a failure
        // attempt", and scenario S4 spells out "retry scheduled until max
        // attempts then FAILED" for the blocked case specifically.
        let delay = pulse_transport::backoff::delay_for(
            (attempts_before + 1).max(0) as u32,
            config.backoff_base_secs,
            config.backoff_max_secs,
        );
        pulse_db::queries::jobs::mark_retry_or_failed(
            pool,
            job.job_id,
            attempts_before,
            config.max_attempts,
            delay,
            &err.reason_code(),
        )
        .await
    } else {
        pulse_db::queries::jobs::mark_completed(pool, job.job_id)
            .await
            .map(|()| JobStatus::Completed)
    };

    if let Err(err) = new_status {
        warn!(%err, job_id = %job.job_id, "failed to update delivery job status");
    }
}
