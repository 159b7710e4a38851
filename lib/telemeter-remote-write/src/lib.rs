//! Converts validated [`MetricFamily`] batches into a Prometheus
//! remote-write `WriteRequest`.

mod error;

pub use error::ConvertError;

use std::collections::BTreeMap;

use metrics_model::remote_proto::{Label, Sample, TimeSeries, WriteRequest};
use metrics_model::{MetricFamily, MetricType, METRIC_NAME_LABEL};

/// Converts `families` into a remote-write request. Every supported metric
/// becomes exactly one `TimeSeries` with one `Sample`: counter, gauge, and
/// untyped families carry a scalar value directly; histogram and summary
/// families aren't representable at this layer and are rejected with
/// [`ConvertError::UnsupportedType`]. Samples timestamped after `now_ms` are
/// rewritten to `now_ms`; the second return value is how many were capped.
pub fn convert(
    families: &[MetricFamily],
    now_ms: i64,
) -> Result<(WriteRequest, usize), ConvertError> {
    let mut timeseries = Vec::new();
    let mut future_capped = 0usize;

    for family in families {
        if !matches!(
            family.r#type,
            MetricType::Counter | MetricType::Gauge | MetricType::Untyped
        ) {
            return Err(ConvertError::UnsupportedType {
                family: family.name.clone(),
            });
        }

        for metric in family.metrics.iter().flatten() {
            let value = metric.value.scalar().ok_or_else(|| ConvertError::UnsupportedType {
                family: family.name.clone(),
            })?;

            let labels = dedup_and_sort_labels(&family.name, &metric.labels);

            let mut timestamp = metric.timestamp_ms.unwrap_or(now_ms);
            if timestamp > now_ms {
                timestamp = now_ms;
                future_capped += 1;
            }

            timeseries.push(TimeSeries {
                labels,
                samples: vec![Sample { value, timestamp }],
            });
        }
    }

    Ok((WriteRequest { timeseries }, future_capped))
}

/// Builds the label set for one series: `__name__` plus the metric's own
/// labels, deduplicated by name (first occurrence wins, empty names/values
/// skipped) and sorted ascending by name. A `BTreeMap` keyed on name gives
/// us both properties for free, and `__name__` sorts before ordinary
/// lowercase label names under byte ordering in every realistic case.
fn dedup_and_sort_labels(family_name: &str, metric_labels: &[metrics_model::Label]) -> Vec<Label> {
    let mut ordered = BTreeMap::new();
    ordered.insert(METRIC_NAME_LABEL.to_string(), family_name.to_string());
    for label in metric_labels {
        if label.name.is_empty() || label.value.is_empty() {
            continue;
        }
        ordered
            .entry(label.name.clone())
            .or_insert_with(|| label.value.clone());
    }
    ordered
        .into_iter()
        .map(|(name, value)| Label { name, value })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_model::{Label as ModelLabel, Metric, MetricValue};

    fn gauge_family(name: &str, metrics: Vec<Metric>) -> MetricFamily {
        MetricFamily {
            name: name.to_string(),
            help: None,
            r#type: MetricType::Gauge,
            metrics: metrics.into_iter().map(Some).collect(),
        }
    }

    #[test]
    fn emits_one_series_per_metric_with_name_label() {
        let family = gauge_family(
            "up",
            vec![Metric {
                labels: vec![ModelLabel::new("job", "api")],
                value: MetricValue::Gauge(1.0),
                timestamp_ms: Some(1_000),
            }],
        );
        let (request, capped) = convert(&[family], 10_000).unwrap();
        assert_eq!(capped, 0);
        assert_eq!(request.timeseries.len(), 1);
        let series = &request.timeseries[0];
        assert_eq!(series.labels[0].name, "__name__");
        assert_eq!(series.labels[0].value, "up");
        assert_eq!(series.samples[0].value, 1.0);
        assert_eq!(series.samples[0].timestamp, 1_000);
    }

    #[test]
    fn caps_future_timestamps_at_now() {
        let family = gauge_family(
            "up",
            vec![Metric {
                labels: vec![],
                value: MetricValue::Gauge(1.0),
                timestamp_ms: Some(20_000),
            }],
        );
        let (request, capped) = convert(&[family], 10_000).unwrap();
        assert_eq!(capped, 1);
        assert_eq!(request.timeseries[0].samples[0].timestamp, 10_000);
    }

    #[test]
    fn first_write_wins_on_duplicate_label_names() {
        let family = gauge_family(
            "up",
            vec![Metric {
                labels: vec![ModelLabel::new("job", "first"), ModelLabel::new("job", "second")],
                value: MetricValue::Gauge(1.0),
                timestamp_ms: Some(1),
            }],
        );
        let (request, _) = convert(&[family], 10_000).unwrap();
        let job_label = request.timeseries[0]
            .labels
            .iter()
            .find(|l| l.name == "job")
            .unwrap();
        assert_eq!(job_label.value, "first");
    }

    #[test]
    fn rejects_histogram_families() {
        let family = MetricFamily {
            name: "latency".to_string(),
            help: None,
            r#type: MetricType::Histogram,
            metrics: vec![],
        };
        assert_eq!(
            convert(&[family], 0),
            Err(ConvertError::UnsupportedType {
                family: "latency".to_string()
            })
        );
    }

    #[test]
    fn returns_an_empty_request_for_no_families() {
        let (request, capped) = convert(&[], 0).unwrap();
        assert!(request.timeseries.is_empty());
        assert_eq!(capped, 0);
    }
}
