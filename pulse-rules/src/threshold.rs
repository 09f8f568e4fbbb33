//! Multi-condition threshold dispatch (`spec.md` §4.2, "threshold /
//! multi-condition").
//!
//! The "continuously breached" check itself is a SQL aggregate
//! (`pulse_db::queries::telemetry::continuously_breached`) since it scans a
//! window of rows; this module only combines the resulting per-condition
//! booleans according to `match_mode`, and resolves the duration precedence
//! rule documented in `spec.md` §9.

use pulse_core::domain::{Condition, MatchMode};

/// Resolve the window (in minutes) a condition must have been continuously
/// breached for. A condition-level `duration_minutes` always wins over the
/// rule-level `duration_seconds`; if neither is set, the window is zero
/// (any single breaching sample fires).
#[must_use]
pub fn effective_duration_minutes(condition: &Condition, rule_duration_seconds: Option<i64>) -> i64 {
    condition
        .duration_minutes
        .or_else(|| rule_duration_seconds.map(|secs| (secs + 59) / 60))
        .unwrap_or(0)
}

/// Combine per-condition breach results by `match_mode`, short-circuiting
/// in both directions: `All` stops at the first `false`, `Any` stops at the
/// first `true`.
#[must_use]
pub fn combine(mut results: impl Iterator<Item = bool>, mode: MatchMode) -> bool {
    match mode {
        MatchMode::All => results.all(|breached| breached),
        MatchMode::Any => results.any(|breached| breached),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_core::domain::Operator;

    fn condition(duration_minutes: Option<i64>) -> Condition {
        Condition {
            metric_name: "temp_c".into(),
            operator: Operator::Gt,
            threshold: 40.0,
            duration_minutes,
        }
    }

    #[test]
    fn condition_duration_wins_over_rule_duration() {
        let c = condition(Some(5));
        assert_eq!(effective_duration_minutes(&c, Some(600)), 5);
    }

    #[test]
    fn falls_back_to_rule_duration_rounded_up() {
        let c = condition(None);
        assert_eq!(effective_duration_minutes(&c, Some(90)), 2);
    }

    #[test]
    fn zero_when_neither_set() {
        let c = condition(None);
        assert_eq!(effective_duration_minutes(&c, None), 0);
    }

    #[test]
    fn all_mode_short_circuits_on_false() {
        assert!(!combine([true, false, true].into_iter(), MatchMode::All));
        assert!(combine([true, true].into_iter(), MatchMode::All));
    }

    #[test]
    fn any_mode_short_circuits_on_true() {
        assert!(combine([false, true, false].into_iter(), MatchMode::Any));
        assert!(!combine([false, false].into_iter(), MatchMode::Any));
    }

    #[test]
    fn empty_results_all_is_vacuously_true_any_is_false() {
        assert!(combine(std::iter::empty(), MatchMode::All));
        assert!(!combine(std::iter::empty(), MatchMode::Any));
    }
}
