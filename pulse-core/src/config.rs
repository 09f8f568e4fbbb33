//! Shared configuration loaded by every Pulse binary (`spec.md` §6).
//!
//! Each service embeds [`CoreConfig`] and layers its own variables on top
//! (see each binary's `config` module). Values come from the process
//! environment rather than a file: an unset variable falls back to its
//! documented default, and a value that fails to parse is logged with
//! `tracing::warn!` and replaced by the default rather than aborting
//! startup, mirroring the tolerant-default style of `acteon_server::config`.

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Ingest enforcement mode, polled at runtime from `app_settings` (see
/// [`crate::domain`] callers in `pulse-ingest`) but also read once at
/// startup as the initial value before the first poll completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Prod,
    Dev,
}

impl FromStr for Mode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PROD" => Ok(Self::Prod),
            "DEV" => Ok(Self::Dev),
            _ => Err(()),
        }
    }
}

/// Variables every binary reads: database connectivity and the handful of
/// timing knobs shared across services (`spec.md` §6).
#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub database_url: String,
    /// Separate connection string for the dedicated `LISTEN` connection, so
    /// it can bypass a transaction-pooling proxy in front of `database_url`.
    pub notify_database_url: String,
    pub mode: Mode,
    pub fallback_poll: Duration,
    pub debounce: Duration,
}

impl CoreConfig {
    /// Load from the process environment, applying documented defaults.
    ///
    /// # Errors
    /// Returns an error only when `DATABASE_URL` is entirely unset -- every
    /// other variable has a usable default.
    pub fn from_env() -> Result<Self, crate::error::PulseError> {
        let database_url = env::var("DATABASE_URL").map_err(|_| {
            crate::error::PulseError::Config("DATABASE_URL is not set".to_owned())
        })?;
        let notify_database_url =
            env::var("NOTIFY_DATABASE_URL").unwrap_or_else(|_| database_url.clone());
        let mode = env_parsed("MODE", Mode::Prod);
        let fallback_poll = env_seconds("FALLBACK_POLL_SECONDS", 30);
        let debounce = env_seconds("DEBOUNCE_SECONDS", 2);

        Ok(Self {
            database_url,
            notify_database_url,
            mode,
            fallback_poll,
            debounce,
        })
    }
}

/// Read an environment variable, parse it with `FromStr`, and fall back to
/// `default` (logging a warning) if the variable is unset or unparseable.
#[must_use]
pub fn env_parsed<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(key, raw, "could not parse env var, using default");
            default
        }),
        Err(_) => default,
    }
}

/// Like [`env_parsed`] for a `u64` count of seconds, returned as a [`Duration`].
#[must_use]
pub fn env_seconds(key: &str, default_secs: u64) -> Duration {
    Duration::from_secs(env_parsed(key, default_secs))
}

/// Like [`env_parsed`] for a `u64` count of milliseconds, returned as a [`Duration`].
#[must_use]
pub fn env_millis(key: &str, default_ms: u64) -> Duration {
    Duration::from_millis(env_parsed(key, default_ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_parses_case_insensitively() {
        assert_eq!("prod".parse::<Mode>().unwrap(), Mode::Prod);
        assert_eq!("DEV".parse::<Mode>().unwrap(), Mode::Dev);
        assert!("bogus".parse::<Mode>().is_err());
    }

    #[test]
    fn env_parsed_falls_back_on_missing_var() {
        // SAFETY (of intent, not memory): this key is not used elsewhere in
        // the test binary, so there is no cross-test interference.
        env::remove_var("PULSE_TEST_MISSING_VAR");
        let v: u64 = env_parsed("PULSE_TEST_MISSING_VAR", 42);
        assert_eq!(v, 42);
    }

    #[test]
    fn env_parsed_falls_back_on_unparseable_var() {
        env::set_var("PULSE_TEST_BAD_VAR", "not-a-number");
        let v: u64 = env_parsed("PULSE_TEST_BAD_VAR", 7);
        assert_eq!(v, 7);
        env::remove_var("PULSE_TEST_BAD_VAR");
    }

    #[test]
    fn env_seconds_reads_present_var() {
        env::set_var("PULSE_TEST_SECONDS", "15");
        assert_eq!(env_seconds("PULSE_TEST_SECONDS", 1), Duration::from_secs(15));
        env::remove_var("PULSE_TEST_SECONDS");
    }
}
