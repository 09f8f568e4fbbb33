//! `pulse-ingest` configuration: [`CoreConfig`] plus the ingest-specific
//! variables in `spec.md` §6. `MAX_PAYLOAD_BYTES` and `RATE_LIMIT_*` are
//! deliberately absent here -- they live in `app_settings` and are polled
//! at runtime (see [`crate::settings`]); this struct only carries what is
//! fixed for the lifetime of the process.

use std::time::Duration;

use pulse_core::config::{env_millis, env_parsed, env_seconds, CoreConfig};

/// Static, env-sourced configuration for the ingest binary.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub core: CoreConfig,
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_topic: String,
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub worker_count: usize,
    pub queue_size: usize,
    pub max_buffer_size: usize,
    pub auth_cache_ttl: Duration,
    pub auth_cache_max_size: usize,
    pub settings_poll: Duration,
    pub require_token: bool,
    pub auto_provision: bool,
}

impl IngestConfig {
    /// Load from the process environment.
    ///
    /// # Errors
    /// Propagates [`CoreConfig::from_env`]'s error if `DATABASE_URL` is unset.
    pub fn from_env() -> Result<Self, pulse_core::PulseError> {
        Ok(Self {
            core: CoreConfig::from_env()?,
            mqtt_host: std::env::var("MQTT_HOST").unwrap_or_else(|_| "localhost".to_owned()),
            mqtt_port: env_parsed("MQTT_PORT", 1883),
            mqtt_topic: std::env::var("MQTT_TOPIC")
                .unwrap_or_else(|_| "tenant/+/device/+/+".to_owned()),
            batch_size: env_parsed("BATCH_SIZE", 100),
            flush_interval: env_millis("FLUSH_INTERVAL_MS", 1_000),
            worker_count: env_parsed("INGEST_WORKER_COUNT", 4),
            queue_size: env_parsed("INGEST_QUEUE_SIZE", 1_000),
            max_buffer_size: env_parsed("MAX_BUFFER_SIZE", 10_000),
            auth_cache_ttl: env_seconds("AUTH_CACHE_TTL_SECONDS", 60),
            auth_cache_max_size: env_parsed("AUTH_CACHE_MAX_SIZE", 10_000),
            settings_poll: env_seconds("SETTINGS_POLL_SECONDS", 30),
            require_token: env_parsed("REQUIRE_TOKEN", true),
            auto_provision: env_parsed("AUTO_PROVISION", false),
        })
    }
}
