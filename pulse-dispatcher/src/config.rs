//! `pulse-dispatcher` configuration: [`CoreConfig`] plus the dispatcher's
//! own bounds on its primary and escalation passes (`spec.md` §4.3, §6).

use pulse_core::config::{env_parsed, CoreConfig};

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub core: CoreConfig,
    /// How far back to scan `OPEN` alerts in the primary pass.
    pub alert_lookback_minutes: i64,
    /// Max alerts considered in one primary pass.
    pub alert_limit: i64,
    /// Max routes considered per tenant.
    pub route_limit: i64,
    /// Window for the escalation pass's "recently escalated" scan.
    pub escalation_lookback_minutes: i64,
}

impl DispatcherConfig {
    /// # Errors
    /// Propagates [`CoreConfig::from_env`]'s error if `DATABASE_URL` is unset.
    pub fn from_env() -> Result<Self, pulse_core::PulseError> {
        Ok(Self {
            core: CoreConfig::from_env()?,
            alert_lookback_minutes: env_parsed("ALERT_LOOKBACK_MINUTES", 60),
            alert_limit: env_parsed("ALERT_LIMIT", 500),
            route_limit: env_parsed("ROUTE_LIMIT", 100),
            escalation_lookback_minutes: env_parsed("ESCALATION_LOOKBACK_MINUTES", 5),
        })
    }
}
