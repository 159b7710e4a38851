use std::collections::BTreeMap;

use metrics_model::MetricFamily;

use crate::error::TransformError;
use crate::Transform;

/// Requires every metric in the family to carry each configured label with
/// exactly the configured value. Aborts the batch on the first metric that
/// doesn't.
pub struct RequiredLabels {
    required: BTreeMap<String, String>,
}

impl RequiredLabels {
    pub fn new(required: BTreeMap<String, String>) -> Self {
        RequiredLabels { required }
    }
}

impl Transform for RequiredLabels {
    fn apply(&self, family: &mut MetricFamily) -> Result<bool, TransformError> {
        for metric in family.metrics.iter().flatten() {
            for (name, value) in &self.required {
                match metric.label(name) {
                    None => {
                        return Err(TransformError::RequiredLabelMissing {
                            family: family.name.clone(),
                            label: name.clone(),
                        })
                    }
                    Some(found) if found != value => {
                        return Err(TransformError::RequiredLabelValueMismatch {
                            family: family.name.clone(),
                            label: name.clone(),
                        })
                    }
                    _ => {}
                }
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_model::{Label, MetricType, MetricValue};

    fn family_with(label_value: Option<&str>) -> MetricFamily {
        let mut family = MetricFamily::new("up", MetricType::Gauge);
        let labels = match label_value {
            Some(v) => vec![Label::new("_id", v)],
            None => vec![],
        };
        family.metrics.push(Some(metrics_model::Metric {
            labels,
            value: MetricValue::Gauge(1.0),
            timestamp_ms: Some(1),
        }));
        family
    }

    #[test]
    fn passes_when_every_metric_has_the_required_value() {
        let mut required = BTreeMap::new();
        required.insert("_id".to_string(), "cluster1".to_string());
        let transform = RequiredLabels::new(required);

        let mut family = family_with(Some("cluster1"));
        assert_eq!(transform.apply(&mut family), Ok(true));
    }

    #[test]
    fn errors_when_a_metric_is_missing_the_label() {
        let mut required = BTreeMap::new();
        required.insert("_id".to_string(), "cluster1".to_string());
        let transform = RequiredLabels::new(required);

        let mut family = family_with(None);
        assert_eq!(
            transform.apply(&mut family),
            Err(TransformError::RequiredLabelMissing {
                family: "up".to_string(),
                label: "_id".to_string(),
            })
        );
    }

    #[test]
    fn errors_when_the_value_does_not_match() {
        let mut required = BTreeMap::new();
        required.insert("_id".to_string(), "cluster1".to_string());
        let transform = RequiredLabels::new(required);

        let mut family = family_with(Some("cluster2"));
        assert_eq!(
            transform.apply(&mut family),
            Err(TransformError::RequiredLabelValueMismatch {
                family: "up".to_string(),
                label: "_id".to_string(),
            })
        );
    }
}
