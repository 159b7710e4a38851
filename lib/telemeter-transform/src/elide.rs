use metrics_model::MetricFamily;

use crate::error::TransformError;
use crate::Transform;

/// Drops the named labels from every metric. A metric left with no labels
/// is removed; a family left with no metrics is dropped.
pub struct Elide {
    names: Vec<String>,
}

impl Elide {
    pub fn new(names: Vec<String>) -> Self {
        Elide { names }
    }
}

impl Transform for Elide {
    fn apply(&self, family: &mut MetricFamily) -> Result<bool, TransformError> {
        for slot in family.metrics.iter_mut() {
            if let Some(metric) = slot {
                metric
                    .labels
                    .retain(|label| !self.names.iter().any(|name| name == &label.name));
                if metric.labels.is_empty() {
                    *slot = None;
                }
            }
        }
        Ok(family.live_count() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_model::{Label, Metric, MetricType, MetricValue};

    fn metric(labels: Vec<Label>) -> Option<Metric> {
        Some(Metric {
            labels,
            value: MetricValue::Gauge(1.0),
            timestamp_ms: Some(1),
        })
    }

    #[test]
    fn removes_the_named_label() {
        let transform = Elide::new(vec!["internal".to_string()]);
        let mut family = MetricFamily::new("up", MetricType::Gauge);
        family
            .metrics
            .push(metric(vec![Label::new("internal", "x"), Label::new("keep", "y")]));

        transform.apply(&mut family).unwrap();
        let metric = family.metrics[0].as_ref().unwrap();
        assert!(metric.label("internal").is_none());
        assert_eq!(metric.label("keep"), Some("y"));
    }

    #[test]
    fn drops_a_metric_left_with_no_labels() {
        let transform = Elide::new(vec!["only".to_string()]);
        let mut family = MetricFamily::new("up", MetricType::Gauge);
        family.metrics.push(metric(vec![Label::new("only", "x")]));

        let keep = transform.apply(&mut family).unwrap();
        assert!(!keep);
        assert_eq!(family.live_count(), 0);
    }
}
