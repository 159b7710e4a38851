use std::collections::BTreeMap;

use metrics_model::{Metric, MetricFamily, METRIC_NAME_LABEL};

use crate::error::TransformError;
use crate::Transform;

/// A label-selector rule: every key must be present on the candidate metric
/// (the family name counts as the `__name__` label) with an equal value.
pub type Rule = BTreeMap<String, String>;

/// Retains metrics matching at least one configured selector rule and drops
/// the rest. A family left with no matching metrics is dropped entirely.
pub struct Whitelist {
    rules: Vec<Rule>,
}

impl Whitelist {
    pub fn new(rules: Vec<Rule>) -> Self {
        Whitelist { rules }
    }

    fn matches(&self, family_name: &str, metric: &Metric) -> bool {
        self.rules.iter().any(|rule| {
            rule.iter().all(|(name, value)| {
                if name == METRIC_NAME_LABEL {
                    family_name == value
                } else {
                    metric.label(name) == Some(value.as_str())
                }
            })
        })
    }
}

impl Transform for Whitelist {
    fn apply(&self, family: &mut MetricFamily) -> Result<bool, TransformError> {
        for slot in family.metrics.iter_mut() {
            let keep = match slot.as_ref() {
                Some(metric) => self.matches(&family.name, metric),
                None => continue,
            };
            if !keep {
                *slot = None;
            }
        }
        Ok(family.live_count() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_model::{Label, MetricType, MetricValue};

    fn metric(name: &str, value: f64) -> Option<Metric> {
        Some(Metric {
            labels: vec![Label::new("job", name)],
            value: MetricValue::Gauge(value),
            timestamp_ms: Some(1),
        })
    }

    #[test]
    fn drops_metrics_matching_no_rule() {
        let mut rule = Rule::new();
        rule.insert("job".to_string(), "keep-me".to_string());
        let whitelist = Whitelist::new(vec![rule]);

        let mut family = MetricFamily::new("up", MetricType::Gauge);
        family.metrics.push(metric("keep-me", 1.0));
        family.metrics.push(metric("drop-me", 2.0));

        let keep = whitelist.apply(&mut family).unwrap();
        assert!(keep);
        assert_eq!(family.live_count(), 1);
        assert_eq!(family.metrics[0].as_ref().unwrap().label("job"), Some("keep-me"));
    }

    #[test]
    fn drops_the_whole_family_when_nothing_matches() {
        let mut rule = Rule::new();
        rule.insert("job".to_string(), "only-this".to_string());
        let whitelist = Whitelist::new(vec![rule]);

        let mut family = MetricFamily::new("up", MetricType::Gauge);
        family.metrics.push(metric("something-else", 1.0));

        let keep = whitelist.apply(&mut family).unwrap();
        assert!(!keep);
    }

    #[test]
    fn matches_on_the_synthetic_metric_name_label() {
        let mut rule = Rule::new();
        rule.insert(METRIC_NAME_LABEL.to_string(), "up".to_string());
        let whitelist = Whitelist::new(vec![rule]);

        let mut family = MetricFamily::new("up", MetricType::Gauge);
        family.metrics.push(metric("anything", 1.0));

        let keep = whitelist.apply(&mut family).unwrap();
        assert!(keep);
        assert_eq!(family.live_count(), 1);
    }
}
