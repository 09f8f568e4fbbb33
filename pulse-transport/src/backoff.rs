//! Deterministic exponential backoff for delivery retries (`spec.md` §4.4).
//!
//! Grounded on `acteon_executor::retry::RetryStrategy::Exponential`, fixed
//! to no jitter: the spec recommends jitter but does not require it, and a
//! deterministic curve makes the retry-scheduling tests exact.

use std::time::Duration;

/// `delay = min(max_secs, base_secs * 2^(attempt - 1))`. `attempt` is
/// 1-based: the delay before the *first* retry, after attempt 1 failed, is
/// `delay_for(1, ..)`.
#[must_use]
pub fn delay_for(attempt: u32, base_secs: u64, max_secs: u64) -> Duration {
    let exponent = attempt.saturating_sub(1).min(62);
    let raw = (base_secs as f64) * 2f64.powi(exponent as i32);
    Duration::from_secs_f64(raw.min(max_secs as f64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_attempt_uses_base_delay() {
        assert_eq!(delay_for(1, 10, 300), Duration::from_secs(10));
    }

    #[test]
    fn doubles_each_attempt() {
        assert_eq!(delay_for(2, 10, 300), Duration::from_secs(20));
        assert_eq!(delay_for(3, 10, 300), Duration::from_secs(40));
        assert_eq!(delay_for(4, 10, 300), Duration::from_secs(80));
    }

    #[test]
    fn clamps_to_max() {
        assert_eq!(delay_for(10, 10, 300), Duration::from_secs(300));
    }

    #[test]
    fn attempt_zero_treated_as_first() {
        assert_eq!(delay_for(0, 10, 300), delay_for(1, 10, 300));
    }

    #[test]
    fn huge_attempt_numbers_do_not_overflow() {
        let d = delay_for(10_000, 1, 60);
        assert_eq!(d, Duration::from_secs(60));
    }
}
