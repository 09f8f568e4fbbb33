//! Runtime settings polled from `app_settings` (`spec.md` §4.1, SPEC_FULL.md
//! §10.3): `MODE`, `STORE_REJECTS`, `MIRROR_REJECTS_TO_RAW`,
//! `MAX_PAYLOAD_BYTES`, `RATE_LIMIT_RPS`, `RATE_LIMIT_BURST`. Unlike the
//! rest of `IngestConfig`, these can change without a restart, so they live
//! behind a `tokio::sync::RwLock`-guarded snapshot refreshed on
//! `SETTINGS_POLL_SECONDS` rather than being read once at startup.

use std::sync::Arc;

use sqlx::PgPool;
use tokio::sync::RwLock;

use pulse_core::config::Mode;

/// A point-in-time snapshot of the hot-reloadable ingest settings.
#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    pub mode: Mode,
    pub store_rejects: bool,
    pub mirror_rejects_to_raw: bool,
    pub max_payload_bytes: usize,
    pub rate_limit_rps: f64,
    pub rate_limit_burst: f64,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            mode: Mode::Prod,
            store_rejects: false,
            mirror_rejects_to_raw: false,
            max_payload_bytes: 16_384,
            rate_limit_rps: 10.0,
            rate_limit_burst: 20.0,
        }
    }
}

/// Fetch `app_settings`, parse known keys, and apply the PROD override:
/// `STORE_REJECTS` and `MIRROR_REJECTS_TO_RAW` are forced off in PROD
/// regardless of what is stored (`spec.md` §4.1).
pub async fn load(pool: &PgPool) -> Result<RuntimeSettings, sqlx::Error> {
    let raw = pulse_db::queries::settings::load_all(pool).await?;
    let mut settings = RuntimeSettings::default();

    if let Some(mode) = raw.get("MODE").and_then(|v| v.parse::<Mode>().ok()) {
        settings.mode = mode;
    }
    if let Some(v) = raw.get("STORE_REJECTS").and_then(|v| v.parse::<bool>().ok()) {
        settings.store_rejects = v;
    }
    if let Some(v) = raw
        .get("MIRROR_REJECTS_TO_RAW")
        .and_then(|v| v.parse::<bool>().ok())
    {
        settings.mirror_rejects_to_raw = v;
    }
    if let Some(v) = raw
        .get("MAX_PAYLOAD_BYTES")
        .and_then(|v| v.parse::<usize>().ok())
    {
        settings.max_payload_bytes = v;
    }
    if let Some(v) = raw.get("RATE_LIMIT_RPS").and_then(|v| v.parse::<f64>().ok()) {
        settings.rate_limit_rps = v;
    }
    if let Some(v) = raw
        .get("RATE_LIMIT_BURST")
        .and_then(|v| v.parse::<f64>().ok())
    {
        settings.rate_limit_burst = v;
    }

    if settings.mode == Mode::Prod {
        settings.store_rejects = false;
        settings.mirror_rejects_to_raw = false;
    }

    Ok(settings)
}

/// Spawn the background poll loop, writing each refreshed snapshot into
/// `shared`. Poll failures are logged and the previous snapshot is kept.
pub fn spawn_poller(
    pool: PgPool,
    shared: Arc<RwLock<RuntimeSettings>>,
    interval: std::time::Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match load(&pool).await {
                Ok(fresh) => {
                    *shared.write().await = fresh;
                }
                Err(err) => {
                    tracing::warn!(%err, "failed to poll app_settings, keeping previous snapshot");
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prod_forces_quarantine_storage_off() {
        let mut settings = RuntimeSettings {
            store_rejects: true,
            mirror_rejects_to_raw: true,
            mode: Mode::Prod,
            ..RuntimeSettings::default()
        };
        if settings.mode == Mode::Prod {
            settings.store_rejects = false;
            settings.mirror_rejects_to_raw = false;
        }
        assert!(!settings.store_rejects);
        assert!(!settings.mirror_rejects_to_raw);
    }
}
