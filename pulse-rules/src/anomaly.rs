//! Z-score anomaly detection (`spec.md` §4.2, "anomaly"). Mean and standard
//! deviation are computed by a SQL aggregate
//! (`pulse_db::queries::telemetry::mean_stddev`) over the lookback window;
//! this module only applies the statistical test.

/// `true` iff `sample_count >= min_samples`, `stddev > 0`, and the z-score
/// of `latest` against `(mean, stddev)` exceeds `z_threshold`.
///
/// Guards the `stddev == 0` divide-by-zero case by returning `false`
/// (`spec.md` §8 boundary behavior: "Anomaly with σ=0 returns no alert").
#[must_use]
pub fn fires(
    mean: f64,
    stddev: f64,
    latest: f64,
    sample_count: i64,
    min_samples: u32,
    z_threshold: f64,
) -> bool {
    if sample_count < i64::from(min_samples) || stddev <= 0.0 {
        return false;
    }
    z_score(mean, stddev, latest) > z_threshold
}

fn z_score(mean: f64, stddev: f64, latest: f64) -> f64 {
    (latest - mean).abs() / stddev
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_stddev_never_fires() {
        assert!(!fires(50.0, 0.0, 200.0, 100, 10, 2.0));
    }

    #[test]
    fn below_min_samples_never_fires() {
        assert!(!fires(50.0, 5.0, 70.0, 3, 10, 2.0));
    }

    #[test]
    fn fires_when_z_exceeds_threshold() {
        // z = |70 - 50| / 5 = 4.0 > 2.0
        assert!(fires(50.0, 5.0, 70.0, 20, 10, 2.0));
    }

    #[test]
    fn does_not_fire_within_threshold() {
        // z = |53 - 50| / 5 = 0.6 < 2.0
        assert!(!fires(50.0, 5.0, 53.0, 20, 10, 2.0));
    }
}
