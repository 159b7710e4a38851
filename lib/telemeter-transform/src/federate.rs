use metrics_model::MetricFamily;

use crate::error::TransformError;
use crate::Transform;

const MAX_NAME_BYTES: usize = 255;

/// How [`FederateSampleCheck`] reacts to an invalid sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnInvalidSample {
    /// Abort the batch (`ErrorInvalidFederateSamples`).
    Error,
    /// Silently nullify the offending metric, or drop the whole family for
    /// a family-level violation (`DropInvalid`).
    Drop,
}

/// Validates samples as a federation scrape would: timestamps present and
/// no older than `min_time_ms`, the family name and every label name/value
/// within 255 bytes, and each metric's value variant matching the family's
/// declared type.
pub struct FederateSampleCheck {
    min_time_ms: i64,
    on_invalid: OnInvalidSample,
}

impl FederateSampleCheck {
    pub fn new(min_time_ms: i64, on_invalid: OnInvalidSample) -> Self {
        FederateSampleCheck {
            min_time_ms,
            on_invalid,
        }
    }

    fn bad_name(&self, family: &MetricFamily) -> bool {
        family.name.is_empty() || family.name.len() > MAX_NAME_BYTES
    }

    fn bad_labels(metric: &metrics_model::Metric) -> bool {
        metric.labels.iter().any(|label| {
            label.name.is_empty()
                || label.name.len() > MAX_NAME_BYTES
                || label.value.is_empty()
                || label.value.len() > MAX_NAME_BYTES
        })
    }
}

impl Transform for FederateSampleCheck {
    fn apply(&self, family: &mut MetricFamily) -> Result<bool, TransformError> {
        if self.bad_name(family) {
            return match self.on_invalid {
                OnInvalidSample::Error => Err(TransformError::MetricNameTooLong {
                    family: family.name.clone(),
                }),
                OnInvalidSample::Drop => Ok(false),
            };
        }

        let declared_type = family.r#type;
        for slot in family.metrics.iter_mut() {
            let metric = match slot {
                Some(m) => m,
                None => continue,
            };

            let no_timestamp = metric.timestamp_ms.is_none();
            let too_old = metric
                .timestamp_ms
                .is_some_and(|ts| ts < self.min_time_ms);
            let wrong_type = !metric.value.matches_type(declared_type);
            let bad_labels = Self::bad_labels(metric);

            if !(no_timestamp || too_old || wrong_type || bad_labels) {
                continue;
            }

            match self.on_invalid {
                OnInvalidSample::Drop => *slot = None,
                OnInvalidSample::Error => {
                    if no_timestamp {
                        return Err(TransformError::NoTimestamp {
                            family: family.name.clone(),
                        });
                    }
                    if too_old {
                        return Err(TransformError::TimestampTooOld {
                            family: family.name.clone(),
                        });
                    }
                    if wrong_type {
                        return Err(TransformError::UnsupportedType {
                            family: family.name.clone(),
                        });
                    }
                    return Err(TransformError::LabelTooLong {
                        family: family.name.clone(),
                    });
                }
            }
        }

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_model::{Label, Metric, MetricType, MetricValue};

    fn family_with(metric: Metric) -> MetricFamily {
        let mut family = MetricFamily::new("up", MetricType::Gauge);
        family.metrics.push(Some(metric));
        family
    }

    #[test]
    fn errors_on_a_missing_timestamp() {
        let check = FederateSampleCheck::new(0, OnInvalidSample::Error);
        let mut family = family_with(Metric {
            labels: vec![],
            value: MetricValue::Gauge(1.0),
            timestamp_ms: None,
        });
        assert_eq!(
            check.apply(&mut family),
            Err(TransformError::NoTimestamp {
                family: "up".to_string()
            })
        );
    }

    #[test]
    fn errors_on_a_timestamp_older_than_the_floor() {
        let check = FederateSampleCheck::new(1_000, OnInvalidSample::Error);
        let mut family = family_with(Metric {
            labels: vec![],
            value: MetricValue::Gauge(1.0),
            timestamp_ms: Some(500),
        });
        assert_eq!(
            check.apply(&mut family),
            Err(TransformError::TimestampTooOld {
                family: "up".to_string()
            })
        );
    }

    #[test]
    fn drop_mode_nullifies_instead_of_erroring() {
        let check = FederateSampleCheck::new(1_000, OnInvalidSample::Drop);
        let mut family = family_with(Metric {
            labels: vec![],
            value: MetricValue::Gauge(1.0),
            timestamp_ms: Some(500),
        });
        let keep = check.apply(&mut family).unwrap();
        assert!(!keep);
        assert_eq!(family.live_count(), 0);
    }

    #[test]
    fn errors_when_the_value_does_not_match_the_declared_type() {
        let check = FederateSampleCheck::new(0, OnInvalidSample::Error);
        let mut family = MetricFamily::new("up", MetricType::Counter);
        family.metrics.push(Some(Metric {
            labels: vec![],
            value: MetricValue::Gauge(1.0),
            timestamp_ms: Some(1),
        }));
        assert_eq!(
            check.apply(&mut family),
            Err(TransformError::UnsupportedType {
                family: "up".to_string()
            })
        );
    }

    #[test]
    fn errors_on_an_oversized_label_value() {
        let check = FederateSampleCheck::new(0, OnInvalidSample::Error);
        let long_value = "x".repeat(300);
        let mut family = family_with(Metric {
            labels: vec![Label::new("job", long_value)],
            value: MetricValue::Gauge(1.0),
            timestamp_ms: Some(1),
        });
        assert_eq!(
            check.apply(&mut family),
            Err(TransformError::LabelTooLong {
                family: "up".to_string()
            })
        );
    }
}
