//! `pulse-evaluator` configuration: [`CoreConfig`] plus `spec.md` §6's
//! evaluator-specific variables.

use std::time::Duration;

use pulse_core::config::{env_seconds, CoreConfig};

#[derive(Debug, Clone)]
pub struct EvaluatorConfig {
    pub core: CoreConfig,
    pub heartbeat_stale: Duration,
    /// Cadence of the escalation sweep (`spec.md` §4.2: "every ~60s").
    pub poll: Duration,
}

impl EvaluatorConfig {
    /// # Errors
    /// Propagates [`CoreConfig::from_env`]'s error if `DATABASE_URL` is unset.
    pub fn from_env() -> Result<Self, pulse_core::PulseError> {
        Ok(Self {
            core: CoreConfig::from_env()?,
            heartbeat_stale: env_seconds("HEARTBEAT_STALE_SECONDS", 300),
            poll: env_seconds("POLL_SECONDS", 60),
        })
    }
}
