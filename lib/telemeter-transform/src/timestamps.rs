use std::sync::atomic::{AtomicU64, Ordering};

use metrics_model::MetricFamily;

use crate::error::TransformError;
use crate::Transform;

const DRIFT_WINDOW_MS: i64 = 5 * 60 * 1000;

/// Counts of how far original timestamps had drifted from the ingest time,
/// accumulated across every family an [`OverwriteTimestamps`] instance has
/// processed. Exposed for the caller to report as gauges/counters.
#[derive(Debug, Default)]
pub struct DriftCounters {
    pub before_window: AtomicU64,
    pub within_window: AtomicU64,
    pub after_window: AtomicU64,
}

impl DriftCounters {
    pub fn snapshot(&self) -> (u64, u64, u64) {
        (
            self.before_window.load(Ordering::Relaxed),
            self.within_window.load(Ordering::Relaxed),
            self.after_window.load(Ordering::Relaxed),
        )
    }
}

/// Replaces every live metric's timestamp with a fixed ingest time,
/// recording how far the original timestamp (if any) had drifted from it.
pub struct OverwriteTimestamps<'a> {
    now_ms: i64,
    counters: &'a DriftCounters,
}

impl<'a> OverwriteTimestamps<'a> {
    pub fn new(now_ms: i64, counters: &'a DriftCounters) -> Self {
        OverwriteTimestamps { now_ms, counters }
    }
}

impl<'a> Transform for OverwriteTimestamps<'a> {
    fn apply(&self, family: &mut MetricFamily) -> Result<bool, TransformError> {
        for metric in family.metrics.iter_mut().flatten() {
            if let Some(original) = metric.timestamp_ms {
                let drift = original - self.now_ms;
                if drift < -DRIFT_WINDOW_MS {
                    self.counters.before_window.fetch_add(1, Ordering::Relaxed);
                } else if drift > DRIFT_WINDOW_MS {
                    self.counters.after_window.fetch_add(1, Ordering::Relaxed);
                } else {
                    self.counters.within_window.fetch_add(1, Ordering::Relaxed);
                }
            }
            metric.timestamp_ms = Some(self.now_ms);
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_model::{Metric, MetricType, MetricValue};

    #[test]
    fn stamps_every_metric_with_now() {
        let counters = DriftCounters::default();
        let transform = OverwriteTimestamps::new(10_000, &counters);
        let mut family = MetricFamily::new("up", MetricType::Gauge);
        family.metrics.push(Some(Metric {
            labels: vec![],
            value: MetricValue::Gauge(1.0),
            timestamp_ms: None,
        }));

        transform.apply(&mut family).unwrap();
        assert_eq!(family.metrics[0].as_ref().unwrap().timestamp_ms, Some(10_000));
    }

    #[test]
    fn counts_drift_outside_the_window() {
        let counters = DriftCounters::default();
        let now = 10 * 60 * 1000;
        let transform = OverwriteTimestamps::new(now, &counters);
        let mut family = MetricFamily::new("up", MetricType::Gauge);
        family.metrics.push(Some(Metric {
            labels: vec![],
            value: MetricValue::Gauge(1.0),
            timestamp_ms: Some(0),
        }));

        transform.apply(&mut family).unwrap();
        let (before, within, after) = counters.snapshot();
        assert_eq!((before, within, after), (1, 0, 0));
    }
}
