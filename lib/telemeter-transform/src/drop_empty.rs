use metrics_model::MetricFamily;

use crate::error::TransformError;
use crate::Transform;

/// Keeps a family only if at least one of its metrics hasn't been nullified
/// by an earlier stage.
pub struct DropEmptyFamilies;

impl Transform for DropEmptyFamilies {
    fn apply(&self, family: &mut MetricFamily) -> Result<bool, TransformError> {
        Ok(family.live_count() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_model::MetricType;

    #[test]
    fn drops_a_family_with_no_live_metrics() {
        let mut family = MetricFamily::new("up", MetricType::Gauge);
        family.metrics.push(None);
        assert_eq!(DropEmptyFamilies.apply(&mut family), Ok(false));
    }

    #[test]
    fn keeps_a_family_with_at_least_one_live_metric() {
        let mut family = MetricFamily::new("up", MetricType::Gauge);
        family.metrics.push(Some(metrics_model::Metric {
            labels: vec![],
            value: metrics_model::MetricValue::Gauge(1.0),
            timestamp_ms: None,
        }));
        assert_eq!(DropEmptyFamilies.apply(&mut family), Ok(true));
    }
}
