//! `delivery_jobs` and `delivery_attempts` queries (`spec.md` §3, §4.3, §4.4).

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use pulse_core::domain::{DeliverOnEvent, DeliveryAttempt, DeliveryJob, JobStatus};
use pulse_core::types::{AlertId, IntegrationId, JobId, RouteId, TenantId};

fn deliver_on_str(e: DeliverOnEvent) -> &'static str {
    match e {
        DeliverOnEvent::Open => "OPEN",
        DeliverOnEvent::Closed => "CLOSED",
    }
}

fn parse_deliver_on(s: &str) -> DeliverOnEvent {
    match s {
        "CLOSED" => DeliverOnEvent::Closed,
        _ => DeliverOnEvent::Open,
    }
}

fn status_str(s: JobStatus) -> &'static str {
    match s {
        JobStatus::Pending => "PENDING",
        JobStatus::Processing => "PROCESSING",
        JobStatus::Completed => "COMPLETED",
        JobStatus::Failed => "FAILED",
    }
}

fn parse_status(s: &str) -> JobStatus {
    match s {
        "PROCESSING" => JobStatus::Processing,
        "COMPLETED" => JobStatus::Completed,
        "FAILED" => JobStatus::Failed,
        _ => JobStatus::Pending,
    }
}

fn row_to_job(row: sqlx::postgres::PgRow) -> DeliveryJob {
    DeliveryJob {
        job_id: JobId::from_uuid(row.get("job_id")),
        tenant_id: TenantId::new(row.get::<String, _>("tenant_id")),
        alert_id: AlertId::from_uuid(row.get("alert_id")),
        integration_id: IntegrationId::new(row.get::<String, _>("integration_id")),
        route_id: RouteId::new(row.get::<String, _>("route_id")),
        deliver_on_event: parse_deliver_on(&row.get::<String, _>("deliver_on_event")),
        status: parse_status(&row.get::<String, _>("status")),
        attempts: row.get("attempts"),
        next_run_at: row.get("next_run_at"),
        last_error: row.get("last_error"),
        payload: row.get("payload"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

const JOB_COLUMNS: &str = "job_id, tenant_id, alert_id, integration_id, route_id,
    deliver_on_event, status, attempts, next_run_at, last_error, payload, created_at, updated_at";

/// Insert a `PENDING` job for one (alert, route, event), `ON CONFLICT DO
/// NOTHING` against the full uniqueness key so repeated dispatcher passes
/// over the same open alerts are idempotent (`spec.md` §4.3, §8 round-trip
/// law). Returns `true` if a row was actually inserted.
#[allow(clippy::too_many_arguments)]
pub async fn insert_pending(
    pool: &PgPool,
    tenant_id: &TenantId,
    alert_id: AlertId,
    integration_id: &IntegrationId,
    route_id: &RouteId,
    deliver_on_event: DeliverOnEvent,
    payload: &serde_json::Value,
) -> sqlx::Result<bool> {
    let job_id = Uuid::new_v4();
    let now = Utc::now();
    let result = sqlx::query(
        "INSERT INTO delivery_jobs
            (job_id, tenant_id, alert_id, integration_id, route_id, deliver_on_event,
             status, attempts, next_run_at, payload, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, 'PENDING', 0, $7, $8, $7, $7)
         ON CONFLICT (tenant_id, alert_id, route_id, deliver_on_event) DO NOTHING",
    )
    .bind(job_id)
    .bind(tenant_id.as_str())
    .bind(alert_id.as_uuid())
    .bind(integration_id.as_str())
    .bind(route_id.as_str())
    .bind(deliver_on_str(deliver_on_event))
    .bind(now)
    .bind(payload)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// `true` iff a `COMPLETED` job exists for `(tenant, alert, route)` created
/// after `after` -- used by the dispatcher's escalation pass to avoid
/// re-firing a route that already completed since the escalation
/// (`spec.md` §4.3).
pub async fn completed_job_exists_since(
    pool: &PgPool,
    tenant_id: &TenantId,
    alert_id: AlertId,
    route_id: &RouteId,
    after: DateTime<Utc>,
) -> sqlx::Result<bool> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS (
            SELECT 1 FROM delivery_jobs
            WHERE tenant_id = $1 AND alert_id = $2 AND route_id = $3
              AND status = 'COMPLETED' AND created_at > $4
        )",
    )
    .bind(tenant_id.as_str())
    .bind(alert_id.as_uuid())
    .bind(route_id.as_str())
    .bind(after)
    .fetch_one(pool)
    .await?;
    Ok(exists)
}

/// Requeue jobs stuck in `PROCESSING` past `stuck_minutes` back to
/// `PENDING` (`spec.md` §4.4 step 1, §8 invariant 5).
pub async fn requeue_stuck(pool: &PgPool, stuck_minutes: i64) -> sqlx::Result<u64> {
    let result = sqlx::query(
        "UPDATE delivery_jobs SET status = 'PENDING', next_run_at = now(), updated_at = now()
         WHERE status = 'PROCESSING' AND updated_at < now() - ($1 * interval '1 minute')",
    )
    .bind(stuck_minutes)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Lease up to `batch_size` due `PENDING` jobs within one transaction using
/// `SELECT ... FOR UPDATE SKIP LOCKED`, then flip them to `PROCESSING`
/// before the caller commits (`spec.md` §4.4 step 2, §5). The lock is held
/// only for the lifetime of the returned transaction.
pub async fn lease_batch(
    tx: &mut Transaction<'_, Postgres>,
    batch_size: i64,
) -> sqlx::Result<Vec<DeliveryJob>> {
    let rows = sqlx::query(&format!(
        "SELECT {JOB_COLUMNS} FROM delivery_jobs
         WHERE status = 'PENDING' AND next_run_at <= now()
         ORDER BY next_run_at ASC
         LIMIT $1
         FOR UPDATE SKIP LOCKED"
    ))
    .bind(batch_size)
    .fetch_all(&mut **tx)
    .await?;

    let jobs: Vec<DeliveryJob> = rows.into_iter().map(row_to_job).collect();
    if jobs.is_empty() {
        return Ok(jobs);
    }

    let ids: Vec<Uuid> = jobs.iter().map(|j| j.job_id.as_uuid()).collect();
    sqlx::query("UPDATE delivery_jobs SET status = 'PROCESSING', updated_at = now() WHERE job_id = ANY($1)")
        .bind(&ids)
        .execute(&mut **tx)
        .await?;

    Ok(jobs)
}

/// Load one integration's spec by `(tenant_id, integration_id)`, `None` if
/// absent. Callers also check `enabled` themselves via
/// [`crate::queries::integrations`] when matching routes; this lookup is
/// used at delivery time and also reports whether the row is disabled.
pub async fn integration_enabled(
    pool: &PgPool,
    tenant_id: &TenantId,
    integration_id: &IntegrationId,
) -> sqlx::Result<Option<bool>> {
    let enabled: Option<bool> = sqlx::query_scalar(
        "SELECT enabled FROM integrations WHERE tenant_id = $1 AND integration_id = $2",
    )
    .bind(tenant_id.as_str())
    .bind(integration_id.as_str())
    .fetch_optional(pool)
    .await?;
    Ok(enabled)
}

/// Mark a job `COMPLETED`.
pub async fn mark_completed(pool: &PgPool, job_id: JobId) -> sqlx::Result<()> {
    sqlx::query(
        "UPDATE delivery_jobs SET status = 'COMPLETED', attempts = attempts + 1,
            last_error = NULL, updated_at = now()
         WHERE job_id = $1",
    )
    .bind(job_id.as_uuid())
    .execute(pool)
    .await?;
    Ok(())
}

/// Mark a job for retry: back to `PENDING` with `next_run_at` pushed out by
/// `delay`, or terminally `FAILED` if `attempts + 1 >= max_attempts`
/// (`spec.md` §4.4 step 6).
pub async fn mark_retry_or_failed(
    pool: &PgPool,
    job_id: JobId,
    attempts_before: i32,
    max_attempts: i32,
    delay: std::time::Duration,
    last_error: &str,
) -> sqlx::Result<JobStatus> {
    let next_attempts = attempts_before + 1;
    if next_attempts >= max_attempts {
        sqlx::query(
            "UPDATE delivery_jobs SET status = 'FAILED', attempts = $2, last_error = $3, updated_at = now()
             WHERE job_id = $1",
        )
        .bind(job_id.as_uuid())
        .bind(next_attempts)
        .bind(last_error)
        .execute(pool)
        .await?;
        Ok(JobStatus::Failed)
    } else {
        let next_run_at = Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default();
        sqlx::query(
            "UPDATE delivery_jobs SET status = 'PENDING', attempts = $2, next_run_at = $3,
                last_error = $4, updated_at = now()
             WHERE job_id = $1",
        )
        .bind(job_id.as_uuid())
        .bind(next_attempts)
        .bind(next_run_at)
        .bind(last_error)
        .execute(pool)
        .await?;
        Ok(JobStatus::Pending)
    }
}

/// Append an immutable delivery-attempt record.
#[allow(clippy::too_many_arguments)]
pub async fn record_attempt(
    pool: &PgPool,
    job_id: JobId,
    attempt_no: i32,
    ok: bool,
    http_status: Option<i32>,
    latency_ms: i64,
    error: Option<&str>,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
) -> sqlx::Result<()> {
    sqlx::query(
        "INSERT INTO delivery_attempts
            (job_id, attempt_no, ok, http_status, latency_ms, error, started_at, finished_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
    )
    .bind(job_id.as_uuid())
    .bind(attempt_no)
    .bind(ok)
    .bind(http_status)
    .bind(latency_ms)
    .bind(error)
    .bind(started_at)
    .bind(finished_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// All attempts logged for a job, oldest first. Test/audit helper.
pub async fn attempts_for_job(pool: &PgPool, job_id: JobId) -> sqlx::Result<Vec<DeliveryAttempt>> {
    let rows = sqlx::query(
        "SELECT job_id, attempt_no, ok, http_status, latency_ms, error, started_at, finished_at
         FROM delivery_attempts WHERE job_id = $1 ORDER BY attempt_no ASC",
    )
    .bind(job_id.as_uuid())
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| DeliveryAttempt {
            job_id: JobId::from_uuid(row.get("job_id")),
            attempt_no: row.get("attempt_no"),
            ok: row.get("ok"),
            http_status: row.get("http_status"),
            latency_ms: row.get("latency_ms"),
            error: row.get("error"),
            started_at: row.get("started_at"),
            finished_at: row.get("finished_at"),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deliver_on_round_trips() {
        for e in [DeliverOnEvent::Open, DeliverOnEvent::Closed] {
            assert_eq!(parse_deliver_on(deliver_on_str(e)), e);
        }
    }

    #[test]
    fn status_round_trips() {
        for s in [
            JobStatus::Pending,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            assert_eq!(parse_status(status_str(s)), s);
        }
    }
}
