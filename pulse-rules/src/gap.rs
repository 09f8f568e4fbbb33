//! Telemetry-gap detection (`spec.md` §4.2, "telemetry_gap"). Row presence
//! is a SQL existence check (`pulse_db::queries::telemetry::has_recent_row`);
//! this module is the one-line fire rule, kept separate so the evaluator's
//! rule dispatch reads uniformly across all four rule types.

/// Fires iff no matching row was found within the gap window.
#[must_use]
pub fn fires(has_recent_row: bool) -> bool {
    !has_recent_row
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_on_absence() {
        assert!(fires(false));
        assert!(!fires(true));
    }
}
