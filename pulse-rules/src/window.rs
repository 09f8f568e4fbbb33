//! Sliding-window aggregation rules (`spec.md` §4.2, "window"). The ring
//! buffer is process-local per `(device_id, rule_id)`; `pulse-evaluator`
//! owns one [`WindowBuffer`] per key inside its `Runtime` and re-warms it
//! from live telemetry after a restart (`spec.md` §9 -- not a bug).

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use pulse_core::domain::{Aggregation, Operator};

const MIN_SAMPLES: usize = 2;

/// An in-process ring of `(timestamp, value)` samples for one rule on one
/// device.
#[derive(Debug, Clone, Default)]
pub struct WindowBuffer {
    samples: VecDeque<(DateTime<Utc>, f64)>,
}

impl WindowBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a new sample, then evict everything older than `window_seconds`
    /// relative to `now`.
    pub fn push_and_evict(&mut self, now: DateTime<Utc>, value: f64, window_seconds: i64) {
        self.samples.push_back((now, value));
        let cutoff = now - chrono::Duration::seconds(window_seconds);
        while self.samples.front().is_some_and(|(t, _)| *t < cutoff) {
            self.samples.pop_front();
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Apply `aggregation` to the buffered values and compare against
    /// `threshold` with `operator`. Requires at least two samples, per
    /// `spec.md` §4.2; returns `None` otherwise (rule does not fire).
    #[must_use]
    pub fn evaluate(&self, aggregation: Aggregation, operator: Operator, threshold: f64) -> Option<bool> {
        if self.samples.len() < MIN_SAMPLES {
            return None;
        }
        let values: Vec<f64> = self.samples.iter().map(|(_, v)| *v).collect();
        let aggregated = aggregation.apply(&values)?;
        Some(operator.compare(aggregated, threshold))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn evicts_samples_older_than_window() {
        let mut buf = WindowBuffer::new();
        buf.push_and_evict(t(0), 10.0, 60);
        buf.push_and_evict(t(30), 20.0, 60);
        buf.push_and_evict(t(120), 30.0, 60);
        // t(0) sample is now 120s old, outside a 60s window -- evicted.
        // t(30) sample is 90s old -- also evicted.
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn requires_at_least_two_samples() {
        let mut buf = WindowBuffer::new();
        buf.push_and_evict(t(0), 50.0, 300);
        assert_eq!(buf.evaluate(Aggregation::Avg, Operator::Gt, 40.0), None);
    }

    #[test]
    fn fires_when_aggregate_breaches_threshold() {
        let mut buf = WindowBuffer::new();
        buf.push_and_evict(t(0), 50.0, 300);
        buf.push_and_evict(t(10), 55.0, 300);
        assert_eq!(buf.evaluate(Aggregation::Avg, Operator::Gt, 40.0), Some(true));
        assert_eq!(buf.evaluate(Aggregation::Min, Operator::Gt, 52.0), Some(false));
    }
}
