use std::sync::OnceLock;

use metrics_model::{Label as ModelLabel, MetricFamily};

use crate::error::TransformError;
use crate::Transform;

/// A source of labels to inject, resolved lazily the first time a family
/// with at least one live metric passes through.
pub trait LabelRetriever: Send + Sync {
    fn retrieve(&self) -> Vec<(String, String)>;
}

impl<F> LabelRetriever for F
where
    F: Fn() -> Vec<(String, String)> + Send + Sync,
{
    fn retrieve(&self) -> Vec<(String, String)> {
        (self)()
    }
}

/// Injects `(name, value)` pairs into every live metric in a family,
/// overwriting an existing label of the same name or appending a new one.
pub struct Label {
    fixed: Vec<(String, String)>,
    retriever: Option<Box<dyn LabelRetriever>>,
    resolved: OnceLock<Vec<(String, String)>>,
}

impl Label {
    /// A fixed set of labels, known up front.
    pub fn fixed(pairs: Vec<(String, String)>) -> Self {
        Label {
            fixed: pairs,
            retriever: None,
            resolved: OnceLock::new(),
        }
    }

    /// Labels resolved on demand, once, from `retriever`.
    pub fn lazy(retriever: Box<dyn LabelRetriever>) -> Self {
        Label {
            fixed: Vec::new(),
            retriever: Some(retriever),
            resolved: OnceLock::new(),
        }
    }

    fn pairs(&self) -> &[(String, String)] {
        match &self.retriever {
            None => &self.fixed,
            Some(retriever) => self.resolved.get_or_init(|| retriever.retrieve()),
        }
    }
}

impl Transform for Label {
    fn apply(&self, family: &mut MetricFamily) -> Result<bool, TransformError> {
        if family.live_count() == 0 {
            return Ok(true);
        }
        let pairs = self.pairs();
        if pairs.is_empty() {
            return Ok(true);
        }
        for metric in family.metrics.iter_mut().flatten() {
            for (name, value) in pairs {
                if let Some(existing) = metric.labels.iter_mut().find(|l| &l.name == name) {
                    existing.value = value.clone();
                } else {
                    metric
                        .labels
                        .push(ModelLabel::new(name.clone(), value.clone()));
                }
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_model::{Label as ModelLabelType, MetricType, MetricValue};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn family_with_metric() -> MetricFamily {
        let mut family = MetricFamily::new("up", MetricType::Gauge);
        family.metrics.push(Some(metrics_model::Metric {
            labels: vec![ModelLabelType::new("_id", "cluster1")],
            value: MetricValue::Gauge(1.0),
            timestamp_ms: Some(1),
        }));
        family
    }

    #[test]
    fn overwrites_an_existing_label() {
        let transform = Label::fixed(vec![("_id".to_string(), "cluster2".to_string())]);
        let mut family = family_with_metric();
        transform.apply(&mut family).unwrap();
        assert_eq!(
            family.metrics[0].as_ref().unwrap().label("_id"),
            Some("cluster2")
        );
    }

    #[test]
    fn appends_a_new_label() {
        let transform = Label::fixed(vec![("region".to_string(), "us-east".to_string())]);
        let mut family = family_with_metric();
        transform.apply(&mut family).unwrap();
        assert_eq!(
            family.metrics[0].as_ref().unwrap().label("region"),
            Some("us-east")
        );
    }

    #[test]
    fn retriever_is_resolved_at_most_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let retriever = move || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            vec![("injected".to_string(), "yes".to_string())]
        };
        let transform = Label::lazy(Box::new(retriever));

        let mut a = family_with_metric();
        let mut b = family_with_metric();
        transform.apply(&mut a).unwrap();
        transform.apply(&mut b).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(a.metrics[0].as_ref().unwrap().label("injected"), Some("yes"));
        assert_eq!(b.metrics[0].as_ref().unwrap().label("injected"), Some("yes"));
    }
}
