use metrics_model::MetricFamily;

use crate::error::TransformError;
use crate::Transform;

/// Compacts a family's metric slice, removing nullified slots while
/// preserving order.
pub struct PackMetrics;

impl Transform for PackMetrics {
    fn apply(&self, family: &mut MetricFamily) -> Result<bool, TransformError> {
        family.metrics.retain(|m| m.is_some());
        Ok(true)
    }
}

/// Sorts a family's metrics by timestamp ascending; stable for equal
/// timestamps. Metrics without a timestamp sort before every timestamped
/// one.
pub struct SortMetrics;

impl Transform for SortMetrics {
    fn apply(&self, family: &mut MetricFamily) -> Result<bool, TransformError> {
        family.metrics.sort_by_key(|slot| match slot {
            Some(metric) => (1u8, metric.timestamp_ms.unwrap_or(i64::MIN)),
            None => (0u8, i64::MIN),
        });
        Ok(true)
    }
}

/// Walks metrics in order; whenever a timestamp decreases relative to the
/// last seen one, nullifies that metric instead of erroring.
pub struct DropUnsorted;

impl Transform for DropUnsorted {
    fn apply(&self, family: &mut MetricFamily) -> Result<bool, TransformError> {
        let mut last_ts: Option<i64> = None;
        for slot in family.metrics.iter_mut() {
            let ts = match slot.as_ref().and_then(|m| m.timestamp_ms) {
                Some(ts) => ts,
                None => continue,
            };
            if let Some(prev) = last_ts {
                if ts < prev {
                    *slot = None;
                    continue;
                }
            }
            last_ts = Some(ts);
        }
        Ok(true)
    }
}

/// Walks metrics in order; errors with [`TransformError::Unsorted`] on the
/// first timestamp that decreases relative to the last seen one. When
/// `require_timestamp` is set, a metric with no timestamp at all errors
/// with [`TransformError::NoTimestamp`] instead of being skipped.
pub struct ErrorOnUnsorted {
    require_timestamp: bool,
}

impl ErrorOnUnsorted {
    pub fn new(require_timestamp: bool) -> Self {
        ErrorOnUnsorted { require_timestamp }
    }
}

impl Transform for ErrorOnUnsorted {
    fn apply(&self, family: &mut MetricFamily) -> Result<bool, TransformError> {
        let mut last_ts: Option<i64> = None;
        for slot in family.metrics.iter() {
            let metric = match slot {
                Some(m) => m,
                None => continue,
            };
            let ts = match metric.timestamp_ms {
                Some(ts) => ts,
                None => {
                    if self.require_timestamp {
                        return Err(TransformError::NoTimestamp {
                            family: family.name.clone(),
                        });
                    }
                    continue;
                }
            };
            if let Some(prev) = last_ts {
                if ts < prev {
                    return Err(TransformError::Unsorted {
                        family: family.name.clone(),
                    });
                }
            }
            last_ts = Some(ts);
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_model::{Metric, MetricType, MetricValue};

    fn metric_at(ts: Option<i64>) -> Option<Metric> {
        Some(Metric {
            labels: vec![],
            value: MetricValue::Gauge(1.0),
            timestamp_ms: ts,
        })
    }

    #[test]
    fn pack_removes_nullified_slots_preserving_order() {
        let mut family = MetricFamily::new("up", MetricType::Gauge);
        family.metrics.push(metric_at(Some(1)));
        family.metrics.push(None);
        family.metrics.push(metric_at(Some(2)));

        PackMetrics.apply(&mut family).unwrap();
        assert_eq!(family.metrics.len(), 2);
        assert_eq!(family.metrics[0].as_ref().unwrap().timestamp_ms, Some(1));
        assert_eq!(family.metrics[1].as_ref().unwrap().timestamp_ms, Some(2));
    }

    #[test]
    fn sort_orders_by_timestamp_ascending() {
        let mut family = MetricFamily::new("up", MetricType::Gauge);
        family.metrics.push(metric_at(Some(5)));
        family.metrics.push(metric_at(Some(1)));
        family.metrics.push(metric_at(Some(3)));

        SortMetrics.apply(&mut family).unwrap();
        let timestamps: Vec<_> = family
            .metrics
            .iter()
            .map(|m| m.as_ref().unwrap().timestamp_ms)
            .collect();
        assert_eq!(timestamps, vec![Some(1), Some(3), Some(5)]);
    }

    #[test]
    fn drop_unsorted_nullifies_regressions() {
        let mut family = MetricFamily::new("up", MetricType::Gauge);
        family.metrics.push(metric_at(Some(5)));
        family.metrics.push(metric_at(Some(2)));
        family.metrics.push(metric_at(Some(6)));

        DropUnsorted.apply(&mut family).unwrap();
        assert!(family.metrics[0].is_some());
        assert!(family.metrics[1].is_none());
        assert!(family.metrics[2].is_some());
    }

    #[test]
    fn error_on_unsorted_errors_on_regression() {
        let mut family = MetricFamily::new("up", MetricType::Gauge);
        family.metrics.push(metric_at(Some(5)));
        family.metrics.push(metric_at(Some(2)));

        let transform = ErrorOnUnsorted::new(false);
        assert_eq!(
            transform.apply(&mut family),
            Err(TransformError::Unsorted {
                family: "up".to_string()
            })
        );
    }

    #[test]
    fn error_on_unsorted_with_required_timestamp_rejects_missing_ones() {
        let mut family = MetricFamily::new("up", MetricType::Gauge);
        family.metrics.push(metric_at(None));

        let transform = ErrorOnUnsorted::new(true);
        assert_eq!(
            transform.apply(&mut family),
            Err(TransformError::NoTimestamp {
                family: "up".to_string()
            })
        );
    }
}
