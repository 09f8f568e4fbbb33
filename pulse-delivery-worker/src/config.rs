//! `pulse-delivery-worker` configuration: [`CoreConfig`] plus the leasing,
//! retry, and timeout knobs from `spec.md` §4.4, §6.

use std::time::Duration;

use pulse_core::config::{env_parsed, env_seconds, CoreConfig};

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub core: CoreConfig,
    pub poll: Duration,
    pub batch_size: i64,
    pub timeout: Duration,
    pub max_attempts: i32,
    pub backoff_base_secs: u64,
    pub backoff_max_secs: u64,
    pub stuck_job_minutes: i64,
    pub worker_count: usize,
}

impl WorkerConfig {
    /// # Errors
    /// Propagates [`CoreConfig::from_env`]'s error if `DATABASE_URL` is unset.
    pub fn from_env() -> Result<Self, pulse_core::PulseError> {
        Ok(Self {
            core: CoreConfig::from_env()?,
            poll: env_seconds("WORKER_POLL_SECONDS", 5),
            batch_size: env_parsed("WORKER_BATCH_SIZE", 20),
            timeout: env_seconds("WORKER_TIMEOUT_SECONDS", 10),
            max_attempts: env_parsed("WORKER_MAX_ATTEMPTS", 5),
            backoff_base_secs: env_parsed("WORKER_BACKOFF_BASE_SECONDS", 10),
            backoff_max_secs: env_parsed("WORKER_BACKOFF_MAX_SECONDS", 600),
            stuck_job_minutes: env_parsed("STUCK_JOB_MINUTES", 10),
            worker_count: env_parsed("WORKER_COUNT", 4),
        })
    }
}
