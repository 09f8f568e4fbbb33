//! `telemetry` and quarantine queries (`spec.md` §3, §4.1, §4.2).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

use pulse_core::domain::{MsgType, TelemetryRecord};
use pulse_core::types::{DeviceId, SiteId, TenantId};

fn msg_type_str(t: MsgType) -> &'static str {
    match t {
        MsgType::Telemetry => "telemetry",
        MsgType::Heartbeat => "heartbeat",
    }
}

/// Multi-row parameterized insert, used for batches of ≤100 records
/// (`spec.md` §4.1). Larger batches use [`insert_copy`].
pub async fn insert_multi_row(pool: &PgPool, records: &[TelemetryRecord]) -> sqlx::Result<()> {
    if records.is_empty() {
        return Ok(());
    }

    let mut qb = sqlx::QueryBuilder::new(
        "INSERT INTO telemetry (time, tenant_id, device_id, site_id, msg_type, seq, metrics) ",
    );
    qb.push_values(records, |mut b, record| {
        b.push_bind(record.time)
            .push_bind(record.tenant_id.as_str())
            .push_bind(record.device_id.as_str())
            .push_bind(record.site_id.as_str())
            .push_bind(msg_type_str(record.msg_type))
            .push_bind(record.seq)
            .push_bind(serde_json::to_value(&record.metrics).unwrap_or_default());
    });
    qb.build().execute(pool).await?;
    Ok(())
}

/// `COPY`-based bulk load for large batches. `sqlx` has no native `COPY`
/// builder, so this drives the binary copy-in protocol directly through
/// the pool's raw connection.
pub async fn insert_copy(pool: &PgPool, records: &[TelemetryRecord]) -> sqlx::Result<()> {
    use std::fmt::Write as _;

    if records.is_empty() {
        return Ok(());
    }

    let mut conn = pool.acquire().await?;
    let mut copy_in = conn
        .copy_in_raw("COPY telemetry (time, tenant_id, device_id, site_id, msg_type, seq, metrics) FROM STDIN WITH (FORMAT csv)")
        .await?;

    let mut buf = String::new();
    for record in records {
        buf.clear();
        let metrics = serde_json::to_string(&record.metrics).unwrap_or_default();
        let _ = write!(
            buf,
            "{},{},{},{},{},{},\"{}\"\n",
            record.time.to_rfc3339(),
            record.tenant_id,
            record.device_id,
            record.site_id,
            msg_type_str(record.msg_type),
            record.seq,
            metrics.replace('"', "\"\""),
        );
        copy_in.send(buf.as_bytes()).await?;
    }
    copy_in.finish().await?;
    Ok(())
}

/// Per-device latest snapshot: most recent metrics map, and last
/// heartbeat/telemetry timestamps, used to seed an evaluation cycle.
pub struct LatestSnapshot {
    pub metrics: HashMap<String, f64>,
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    pub last_telemetry_at: Option<DateTime<Utc>>,
}

pub async fn latest_snapshot(
    pool: &PgPool,
    tenant_id: &TenantId,
    device_id: &DeviceId,
) -> sqlx::Result<LatestSnapshot> {
    let metrics_row = sqlx::query(
        "SELECT metrics FROM telemetry
         WHERE tenant_id = $1 AND device_id = $2
         ORDER BY time DESC LIMIT 1",
    )
    .bind(tenant_id.as_str())
    .bind(device_id.as_str())
    .fetch_optional(pool)
    .await?;

    let metrics = metrics_row
        .and_then(|r| serde_json::from_value(r.get("metrics")).ok())
        .unwrap_or_default();

    let last_heartbeat_at: Option<DateTime<Utc>> = sqlx::query_scalar(
        "SELECT max(time) FROM telemetry
         WHERE tenant_id = $1 AND device_id = $2 AND msg_type = 'heartbeat'",
    )
    .bind(tenant_id.as_str())
    .bind(device_id.as_str())
    .fetch_one(pool)
    .await?;

    let last_telemetry_at: Option<DateTime<Utc>> = sqlx::query_scalar(
        "SELECT max(time) FROM telemetry
         WHERE tenant_id = $1 AND device_id = $2 AND msg_type = 'telemetry'",
    )
    .bind(tenant_id.as_str())
    .bind(device_id.as_str())
    .fetch_one(pool)
    .await?;

    Ok(LatestSnapshot {
        metrics,
        last_heartbeat_at,
        last_telemetry_at,
    })
}

/// `true` iff `metric_name` was continuously past `operator(value, threshold)`
/// for the entire window `[since, now)`: zero rows violate the comparison
/// AND at least one row exists (`spec.md` §4.2 threshold dispatch).
///
/// `sql_op` must be one of `>`, `>=`, `<`, `<=`, `=`, `<>` -- the caller
/// picks it from [`pulse_core::domain::Operator`]; it is never user input.
pub async fn continuously_breached(
    pool: &PgPool,
    tenant_id: &TenantId,
    device_id: &DeviceId,
    metric_name: &str,
    sql_op: &str,
    threshold: f64,
    since: DateTime<Utc>,
) -> sqlx::Result<bool> {
    // `metric_name` is tenant-supplied rule data, not an operator literal --
    // bind it as a parameter rather than interpolate it, even though the
    // jsonb key-exists/extract operators read the same either way.
    let query = format!(
        "SELECT
            count(*) FILTER (WHERE NOT ((metrics->>$4)::double precision {sql_op} $5)) AS violations,
            count(*) AS total
         FROM telemetry
         WHERE tenant_id = $1 AND device_id = $2 AND time >= $3
           AND metrics ? $4"
    );
    let row = sqlx::query(&query)
        .bind(tenant_id.as_str())
        .bind(device_id.as_str())
        .bind(since)
        .bind(metric_name)
        .bind(threshold)
        .fetch_one(pool)
        .await?;

    let violations: i64 = row.get("violations");
    let total: i64 = row.get("total");
    Ok(violations == 0 && total > 0)
}

/// Mean and sample standard deviation of `metric_name` over
/// `[since, now)`, plus the sample count. Used by the anomaly (Z-score)
/// dispatch.
pub async fn mean_stddev(
    pool: &PgPool,
    tenant_id: &TenantId,
    device_id: &DeviceId,
    metric_name: &str,
    since: DateTime<Utc>,
) -> sqlx::Result<(f64, f64, i64)> {
    let row = sqlx::query(
        "SELECT
            avg((metrics->>$4)::double precision) AS mean,
            stddev_samp((metrics->>$4)::double precision) AS stddev,
            count(*) FILTER (WHERE metrics ? $4) AS n
         FROM telemetry
         WHERE tenant_id = $1 AND device_id = $2 AND time >= $3",
    )
    .bind(tenant_id.as_str())
    .bind(device_id.as_str())
    .bind(since)
    .bind(metric_name)
    .fetch_one(pool)
    .await?;

    let mean: Option<f64> = row.get("mean");
    let stddev: Option<f64> = row.get("stddev");
    let n: i64 = row.get("n");
    Ok((mean.unwrap_or(0.0), stddev.unwrap_or(0.0), n))
}

/// `true` iff no row exists for the device with the given metric present
/// since `since` (telemetry-gap dispatch). `metric_name = None` checks for
/// any row at all (gap on the device as a whole).
pub async fn has_recent_row(
    pool: &PgPool,
    tenant_id: &TenantId,
    device_id: &DeviceId,
    metric_name: Option<&str>,
    since: DateTime<Utc>,
) -> sqlx::Result<bool> {
    let exists: bool = match metric_name {
        Some(metric) => sqlx::query_scalar(
            "SELECT EXISTS (
                SELECT 1 FROM telemetry
                WHERE tenant_id = $1 AND device_id = $2 AND time >= $3
                  AND metrics ? $4
            )",
        )
        .bind(tenant_id.as_str())
        .bind(device_id.as_str())
        .bind(since)
        .bind(metric)
        .fetch_one(pool)
        .await?,
        None => {
            sqlx::query_scalar(
                "SELECT EXISTS (
                    SELECT 1 FROM telemetry
                    WHERE tenant_id = $1 AND device_id = $2 AND time >= $3
                )",
            )
            .bind(tenant_id.as_str())
            .bind(device_id.as_str())
            .bind(since)
            .fetch_one(pool)
            .await?
        }
    };
    Ok(exists)
}

/// Increment the per-minute `(bucket, tenant, reason)` quarantine counter.
pub async fn bump_quarantine_counter(
    pool: &PgPool,
    tenant_id: &TenantId,
    reason: &str,
) -> sqlx::Result<()> {
    sqlx::query(
        "INSERT INTO quarantine_counters_minute (bucket, tenant_id, reason, count)
         VALUES (date_trunc('minute', now()), $1, $2, 1)
         ON CONFLICT (bucket, tenant_id, reason)
         DO UPDATE SET count = quarantine_counters_minute.count + 1",
    )
    .bind(tenant_id.as_str())
    .bind(reason)
    .execute(pool)
    .await?;
    Ok(())
}

/// Mirror a rejected raw payload to the quarantine log (DEV mode only,
/// when `MIRROR_REJECTS_TO_RAW` is set -- callers gate this, not the query).
pub async fn store_quarantine_event(
    pool: &PgPool,
    tenant_id: Option<&TenantId>,
    device_id: Option<&DeviceId>,
    reason: &str,
    raw_body: Option<&str>,
) -> sqlx::Result<()> {
    sqlx::query(
        "INSERT INTO quarantine_events (tenant_id, device_id, reason, raw_body)
         VALUES ($1, $2, $3, $4)",
    )
    .bind(tenant_id.map(TenantId::as_str))
    .bind(device_id.map(DeviceId::as_str))
    .bind(reason)
    .bind(raw_body)
    .execute(pool)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn msg_type_maps_to_lowercase_wire_strings() {
        assert_eq!(msg_type_str(MsgType::Telemetry), "telemetry");
        assert_eq!(msg_type_str(MsgType::Heartbeat), "heartbeat");
    }
}
