//! Inline schema migrations, in the teacher's style
//! (`acteon_state_postgres::migrations`): one `CREATE TABLE IF NOT EXISTS`
//! per table, run at startup rather than through an external migration
//! tool (schema migration tooling is explicitly out of scope, `spec.md` §1).

use sqlx::PgPool;

/// Create every table and index the core services need, if not already
/// present. Safe to call on every startup.
///
/// # Errors
/// Returns the first `sqlx::Error` hit while executing any statement.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    for stmt in STATEMENTS {
        sqlx::query(stmt).execute(pool).await?;
    }
    Ok(())
}

const STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS device_registry (
        tenant_id TEXT NOT NULL,
        device_id TEXT NOT NULL,
        site_id TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'ACTIVE',
        provision_token_hash TEXT,
        metadata JSONB NOT NULL DEFAULT '{}'::jsonb,
        last_auth_at TIMESTAMPTZ,
        PRIMARY KEY (tenant_id, device_id)
    )",
    "CREATE TABLE IF NOT EXISTS device_group_members (
        tenant_id TEXT NOT NULL,
        device_id TEXT NOT NULL,
        group_id TEXT NOT NULL,
        PRIMARY KEY (tenant_id, device_id, group_id)
    )",
    "CREATE TABLE IF NOT EXISTS telemetry (
        time TIMESTAMPTZ NOT NULL,
        tenant_id TEXT NOT NULL,
        device_id TEXT NOT NULL,
        site_id TEXT NOT NULL,
        msg_type TEXT NOT NULL,
        seq BIGINT NOT NULL,
        metrics JSONB NOT NULL,
        ingested_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE INDEX IF NOT EXISTS telemetry_tenant_device_time_idx
        ON telemetry (tenant_id, device_id, time DESC)",
    "CREATE TABLE IF NOT EXISTS quarantine_events (
        id BIGSERIAL PRIMARY KEY,
        tenant_id TEXT,
        device_id TEXT,
        reason TEXT NOT NULL,
        raw_body TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE TABLE IF NOT EXISTS quarantine_counters_minute (
        bucket TIMESTAMPTZ NOT NULL,
        tenant_id TEXT NOT NULL,
        reason TEXT NOT NULL,
        count BIGINT NOT NULL DEFAULT 0,
        PRIMARY KEY (bucket, tenant_id, reason)
    )",
    "CREATE TABLE IF NOT EXISTS app_settings (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS device_state (
        tenant_id TEXT NOT NULL,
        device_id TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'OFFLINE',
        last_heartbeat_at TIMESTAMPTZ,
        last_telemetry_at TIMESTAMPTZ,
        last_seen_at TIMESTAMPTZ,
        last_state_change_at TIMESTAMPTZ,
        latest_metrics JSONB NOT NULL DEFAULT '{}'::jsonb,
        desired_state JSONB,
        reported_state JSONB,
        desired_version BIGINT NOT NULL DEFAULT 0,
        reported_version BIGINT NOT NULL DEFAULT 0,
        shadow_updated_at TIMESTAMPTZ,
        PRIMARY KEY (tenant_id, device_id)
    )",
    "CREATE TABLE IF NOT EXISTS alert_rules (
        tenant_id TEXT NOT NULL,
        rule_id TEXT NOT NULL,
        enabled BOOLEAN NOT NULL DEFAULT true,
        severity SMALLINT NOT NULL DEFAULT 3,
        site_ids TEXT[] NOT NULL DEFAULT '{}',
        group_ids TEXT[] NOT NULL DEFAULT '{}',
        spec JSONB NOT NULL,
        escalation_minutes BIGINT,
        PRIMARY KEY (tenant_id, rule_id)
    )",
    "CREATE TABLE IF NOT EXISTS metric_mappings (
        tenant_id TEXT NOT NULL,
        raw_metric_name TEXT NOT NULL,
        normalized_metric_name TEXT NOT NULL,
        multiplier DOUBLE PRECISION NOT NULL DEFAULT 1.0,
        offset_value DOUBLE PRECISION NOT NULL DEFAULT 0.0,
        PRIMARY KEY (tenant_id, raw_metric_name)
    )",
    "CREATE TABLE IF NOT EXISTS alert_maintenance_windows (
        id BIGSERIAL PRIMARY KEY,
        tenant_id TEXT NOT NULL,
        enabled BOOLEAN NOT NULL DEFAULT true,
        starts_at TIMESTAMPTZ NOT NULL,
        ends_at TIMESTAMPTZ,
        recurring_days_of_week SMALLINT[],
        recurring_hour_start SMALLINT,
        recurring_hour_end SMALLINT,
        site_ids TEXT[] NOT NULL DEFAULT '{}',
        device_types TEXT[] NOT NULL DEFAULT '{}'
    )",
    "CREATE TABLE IF NOT EXISTS fleet_alert (
        id UUID PRIMARY KEY,
        tenant_id TEXT NOT NULL,
        site_id TEXT NOT NULL,
        device_id TEXT NOT NULL,
        alert_type TEXT NOT NULL,
        fingerprint TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'OPEN',
        severity SMALLINT NOT NULL,
        confidence DOUBLE PRECISION NOT NULL DEFAULT 1.0,
        summary TEXT NOT NULL,
        details JSONB NOT NULL DEFAULT '{}'::jsonb,
        rule_id TEXT,
        trigger_count BIGINT NOT NULL DEFAULT 1,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        closed_at TIMESTAMPTZ,
        silenced_until TIMESTAMPTZ,
        acknowledged_by TEXT,
        acknowledged_at TIMESTAMPTZ,
        escalation_level INT NOT NULL DEFAULT 0,
        escalated_at TIMESTAMPTZ
    )",
    "CREATE UNIQUE INDEX IF NOT EXISTS fleet_alert_open_fingerprint_idx
        ON fleet_alert (tenant_id, fingerprint)
        WHERE status IN ('OPEN', 'ACKNOWLEDGED')",
    "CREATE INDEX IF NOT EXISTS fleet_alert_tenant_created_idx
        ON fleet_alert (tenant_id, status, created_at DESC)",
    "CREATE TABLE IF NOT EXISTS integrations (
        tenant_id TEXT NOT NULL,
        integration_id TEXT NOT NULL,
        enabled BOOLEAN NOT NULL DEFAULT true,
        spec JSONB NOT NULL,
        PRIMARY KEY (tenant_id, integration_id)
    )",
    "CREATE TABLE IF NOT EXISTS integration_routes (
        tenant_id TEXT NOT NULL,
        route_id TEXT NOT NULL,
        integration_id TEXT NOT NULL,
        enabled BOOLEAN NOT NULL DEFAULT true,
        priority INT NOT NULL DEFAULT 0,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        min_severity SMALLINT,
        alert_types TEXT[] NOT NULL DEFAULT '{}',
        site_ids TEXT[] NOT NULL DEFAULT '{}',
        device_prefixes TEXT[] NOT NULL DEFAULT '{}',
        deliver_on TEXT[] NOT NULL DEFAULT '{OPEN}',
        PRIMARY KEY (tenant_id, route_id)
    )",
    "CREATE TABLE IF NOT EXISTS delivery_jobs (
        job_id UUID PRIMARY KEY,
        tenant_id TEXT NOT NULL,
        alert_id UUID NOT NULL,
        integration_id TEXT NOT NULL,
        route_id TEXT NOT NULL,
        deliver_on_event TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'PENDING',
        attempts INT NOT NULL DEFAULT 0,
        next_run_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        last_error TEXT,
        payload JSONB NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE UNIQUE INDEX IF NOT EXISTS delivery_jobs_unique_idx
        ON delivery_jobs (tenant_id, alert_id, route_id, deliver_on_event)",
    "CREATE INDEX IF NOT EXISTS delivery_jobs_lease_idx
        ON delivery_jobs (status, next_run_at)",
    "CREATE TABLE IF NOT EXISTS delivery_attempts (
        job_id UUID NOT NULL,
        attempt_no INT NOT NULL,
        ok BOOLEAN NOT NULL,
        http_status INT,
        latency_ms BIGINT NOT NULL,
        error TEXT,
        started_at TIMESTAMPTZ NOT NULL,
        finished_at TIMESTAMPTZ NOT NULL,
        PRIMARY KEY (job_id, attempt_no)
    )",
    "CREATE TABLE IF NOT EXISTS alert_digest_settings (
        tenant_id TEXT PRIMARY KEY,
        enabled BOOLEAN NOT NULL DEFAULT false,
        cadence_minutes BIGINT NOT NULL DEFAULT 1440,
        recipient TEXT
    )",
];
