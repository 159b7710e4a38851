//! Groups the line-level tokens from [`crate::line`] into [`MetricFamily`]
//! values, reassembling the bucket/quantile child series the Prometheus text
//! exposition format splits across multiple lines (`_bucket`, `_sum`,
//! `_count`, and bare `{quantile=...}` samples) back into single
//! [`crate::HistogramValue`]/[`crate::SummaryValue`] metrics.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use snafu::ResultExt;

use crate::line::{self, Line, MetricKind};
use crate::{
    HistogramBucket, HistogramValue, Label, Metric, MetricFamily, MetricType, MetricValue,
    SummaryQuantile, SummaryValue,
};

#[derive(Debug, snafu::Snafu, PartialEq)]
pub enum ParserError {
    #[snafu(display("{}, line: `{}`", kind, line))]
    WithLine {
        line: String,
        #[snafu(source)]
        kind: line::ErrorKind,
    },
    #[snafu(display("expected \"le\" tag for histogram metric"))]
    ExpectedLeTag,
    #[snafu(display("expected \"quantile\" tag for summary metric"))]
    ExpectedQuantileTag,
    #[snafu(display("error parsing label value: {}", error))]
    ParseLabelValue {
        #[snafu(source)]
        error: line::ErrorKind,
    },
    #[snafu(display("expected value in range [0, {}], found: {}", u64::MAX, value))]
    ValueOutOfRange { value: f64 },
}

#[derive(Debug, Clone, Eq, Hash, PartialEq)]
struct GroupKey {
    timestamp: Option<i64>,
    labels: BTreeMap<String, String>,
}

enum Building {
    Simple(MetricType, IndexMap<GroupKey, f64>),
    Histogram(IndexMap<GroupKey, HistogramValue>),
    Summary(IndexMap<GroupKey, SummaryValue>),
}

impl Building {
    fn new(kind: MetricKind) -> Self {
        match kind {
            MetricKind::Counter => Building::Simple(MetricType::Counter, IndexMap::new()),
            MetricKind::Gauge => Building::Simple(MetricType::Gauge, IndexMap::new()),
            MetricKind::Untyped => Building::Simple(MetricType::Untyped, IndexMap::new()),
            MetricKind::Histogram => Building::Histogram(IndexMap::new()),
            MetricKind::Summary => Building::Summary(IndexMap::new()),
        }
    }

    fn metric_type(&self) -> MetricType {
        match self {
            Building::Simple(t, _) => *t,
            Building::Histogram(_) => MetricType::Histogram,
            Building::Summary(_) => MetricType::Summary,
        }
    }

    /// `Ok(None)` on success, `Ok(Some(metric))` if the line belongs to a
    /// different family (the caller should close this group and start a new
    /// untyped one with the returned metric), `Err` on a malformed child line.
    fn try_push(
        &mut self,
        prefix_len: usize,
        metric: line::Metric,
    ) -> Result<Option<line::Metric>, ParserError> {
        let suffix = &metric.name[prefix_len..];
        let mut key = GroupKey {
            timestamp: metric.timestamp,
            labels: metric.labels,
        };

        match self {
            Building::Simple(_, values) => {
                if !suffix.is_empty() {
                    return Ok(Some(line::Metric {
                        name: metric.name,
                        timestamp: key.timestamp,
                        labels: key.labels,
                        value: metric.value,
                    }));
                }
                values.insert(key, metric.value);
            }
            Building::Histogram(values) => match suffix {
                "_bucket" => {
                    let bound = key.labels.remove("le").ok_or(ParserError::ExpectedLeTag)?;
                    let (_, bound) = line::Metric::parse_value(&bound)
                        .map_err(Into::into)
                        .context(ParseLabelValueSnafu)?;
                    let count = try_f64_to_u64(metric.value)?;
                    matching(values, key)
                        .buckets
                        .push(HistogramBucket {
                            upper_bound: bound,
                            cumulative_count: count,
                        });
                }
                "_sum" => matching(values, key).sample_sum = metric.value,
                "_count" => matching(values, key).sample_count = try_f64_to_u64(metric.value)?,
                _ => {
                    return Ok(Some(line::Metric {
                        name: metric.name,
                        timestamp: key.timestamp,
                        labels: key.labels,
                        value: metric.value,
                    }))
                }
            },
            Building::Summary(values) => match suffix {
                "" => {
                    let quantile = key
                        .labels
                        .remove("quantile")
                        .ok_or(ParserError::ExpectedQuantileTag)?;
                    let (_, quantile) = line::Metric::parse_value(&quantile)
                        .map_err(Into::into)
                        .context(ParseLabelValueSnafu)?;
                    matching(values, key).quantiles.push(SummaryQuantile {
                        quantile,
                        value: metric.value,
                    });
                }
                "_sum" => matching(values, key).sample_sum = metric.value,
                "_count" => matching(values, key).sample_count = try_f64_to_u64(metric.value)?,
                _ => {
                    return Ok(Some(line::Metric {
                        name: metric.name,
                        timestamp: key.timestamp,
                        labels: key.labels,
                        value: metric.value,
                    }))
                }
            },
        }
        Ok(None)
    }

    fn into_metrics(self) -> Vec<Option<Metric>> {
        match self {
            Building::Simple(t, values) => values
                .into_iter()
                .map(|(key, value)| {
                    let value = match t {
                        MetricType::Counter => MetricValue::Counter(value),
                        MetricType::Gauge => MetricValue::Gauge(value),
                        _ => MetricValue::Untyped(value),
                    };
                    Some(Metric {
                        labels: labels_from_map(key.labels),
                        value,
                        timestamp_ms: key.timestamp,
                    })
                })
                .collect(),
            Building::Histogram(values) => values
                .into_iter()
                .map(|(key, value)| {
                    Some(Metric {
                        labels: labels_from_map(key.labels),
                        value: MetricValue::Histogram(value),
                        timestamp_ms: key.timestamp,
                    })
                })
                .collect(),
            Building::Summary(values) => values
                .into_iter()
                .map(|(key, value)| {
                    Some(Metric {
                        labels: labels_from_map(key.labels),
                        value: MetricValue::Summary(value),
                        timestamp_ms: key.timestamp,
                    })
                })
                .collect(),
        }
    }
}

fn labels_from_map(map: BTreeMap<String, String>) -> Vec<Label> {
    map.into_iter().map(|(k, v)| Label::new(k, v)).collect()
}

fn matching<T: Default>(values: &mut IndexMap<GroupKey, T>, group: GroupKey) -> &mut T {
    // Assumes incoming metrics are already collated: a change in either
    // timestamp or labels starts a new group.
    if values.last().map_or(true, |(key, _)| *key != group) {
        values.insert(group.clone(), T::default());
    }
    values.last_mut().unwrap().1
}

fn try_f64_to_u64(f: f64) -> Result<u64, ParserError> {
    if (0.0..=u64::MAX as f64).contains(&f) {
        Ok(f as u64)
    } else {
        Err(ParserError::ValueOutOfRange { value: f })
    }
}

struct InProgress {
    name: String,
    help: Option<String>,
    building: Building,
}

impl InProgress {
    fn new(name: String, kind: MetricKind) -> Self {
        InProgress {
            name,
            help: None,
            building: Building::new(kind),
        }
    }

    fn new_untyped(metric: line::Metric) -> Self {
        let name = metric.name.clone();
        let mut building = Building::new(MetricKind::Untyped);
        building.try_push(name.len(), metric).ok();
        InProgress {
            name,
            help: None,
            building,
        }
    }

    fn try_push(&mut self, metric: line::Metric) -> Result<Option<line::Metric>, ParserError> {
        if !metric.name.starts_with(&self.name) {
            return Ok(Some(metric));
        }
        self.building.try_push(self.name.len(), metric)
    }

    fn finish(self) -> MetricFamily {
        MetricFamily {
            name: self.name,
            help: self.help,
            r#type: self.building.metric_type(),
            metrics: self.building.into_metrics(),
        }
    }
}

/// Parses Prometheus text exposition format into metric families, grouping
/// bucket/quantile child series back into single histogram/summary metrics.
pub fn parse_text(input: &str) -> Result<Vec<MetricFamily>, ParserError> {
    let mut groups: Vec<InProgress> = Vec::new();

    for raw_line in input.lines() {
        let parsed = Line::parse(raw_line).with_context(|_| WithLineSnafu {
            line: raw_line.to_owned(),
        })?;
        let Some(parsed) = parsed else { continue };
        match parsed {
            Line::Header(header) => {
                groups.push(InProgress::new(header.metric_name, header.kind));
            }
            Line::Metric(metric) => {
                let leftover = match groups.last_mut() {
                    Some(group) => group.try_push(metric)?,
                    None => Some(metric),
                };
                if let Some(metric) = leftover {
                    groups.push(InProgress::new_untyped(metric));
                }
            }
        }
    }

    Ok(groups.into_iter().map(InProgress::finish).collect())
}

/// Renders metric families back into Prometheus text exposition format,
/// the inverse of [`parse_text`]. Used to serve `/federate`.
pub fn write_text(families: &[MetricFamily]) -> String {
    let mut out = String::new();
    for family in families {
        if let Some(help) = &family.help {
            out.push_str(&format!("# HELP {} {}\n", family.name, escape_help(help)));
        }
        out.push_str(&format!("# TYPE {} {}\n", family.name, family.r#type.as_str()));
        for metric in family.metrics.iter().flatten() {
            write_metric(&mut out, &family.name, metric);
        }
    }
    out
}

fn write_metric(out: &mut String, family_name: &str, metric: &Metric) {
    match &metric.value {
        MetricValue::Counter(v) | MetricValue::Gauge(v) | MetricValue::Untyped(v) => {
            write_sample_line(out, family_name, &metric.labels, *v, metric.timestamp_ms);
        }
        MetricValue::Histogram(h) => {
            for bucket in &h.buckets {
                let mut labels = metric.labels.clone();
                labels.push(Label::new("le", format_bound(bucket.upper_bound)));
                write_sample_line(
                    out,
                    &format!("{family_name}_bucket"),
                    &labels,
                    bucket.cumulative_count as f64,
                    metric.timestamp_ms,
                );
            }
            write_sample_line(
                out,
                &format!("{family_name}_sum"),
                &metric.labels,
                h.sample_sum,
                metric.timestamp_ms,
            );
            write_sample_line(
                out,
                &format!("{family_name}_count"),
                &metric.labels,
                h.sample_count as f64,
                metric.timestamp_ms,
            );
        }
        MetricValue::Summary(s) => {
            for quantile in &s.quantiles {
                let mut labels = metric.labels.clone();
                labels.push(Label::new("quantile", format_bound(quantile.quantile)));
                write_sample_line(out, family_name, &labels, quantile.value, metric.timestamp_ms);
            }
            write_sample_line(
                out,
                &format!("{family_name}_sum"),
                &metric.labels,
                s.sample_sum,
                metric.timestamp_ms,
            );
            write_sample_line(
                out,
                &format!("{family_name}_count"),
                &metric.labels,
                s.sample_count as f64,
                metric.timestamp_ms,
            );
        }
    }
}

fn write_sample_line(out: &mut String, name: &str, labels: &[Label], value: f64, timestamp_ms: Option<i64>) {
    out.push_str(name);
    if !labels.is_empty() {
        out.push('{');
        for (i, label) in labels.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            out.push_str(&format!("{}=\"{}\"", label.name, escape_label_value(&label.value)));
        }
        out.push('}');
    }
    out.push(' ');
    out.push_str(&value.to_string());
    if let Some(ts) = timestamp_ms {
        out.push(' ');
        out.push_str(&ts.to_string());
    }
    out.push('\n');
}

fn format_bound(value: f64) -> String {
    if value.is_infinite() {
        if value.is_sign_positive() {
            "+Inf".to_string()
        } else {
            "-Inf".to_string()
        }
    } else {
        value.to_string()
    }
}

fn escape_help(help: &str) -> String {
    help.replace('\\', "\\\\").replace('\n', "\\n")
}

fn escape_label_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn groups_counter_family() {
        let input = r#"
# TYPE http_requests_total counter
http_requests_total{method="post",code="200"} 1027 1395066363000
http_requests_total{method="post",code="400"} 3 1395066363000
"#;
        let groups = parse_text(input).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].name, "http_requests_total");
        assert_eq!(groups[0].r#type, MetricType::Counter);
        assert_eq!(groups[0].metrics.len(), 2);
    }

    #[test]
    fn groups_histogram_buckets_into_one_metric() {
        let input = r#"
# TYPE http_request_duration_seconds histogram
http_request_duration_seconds_bucket{le="0.05"} 24054
http_request_duration_seconds_bucket{le="+Inf"} 144320
http_request_duration_seconds_sum 53423
http_request_duration_seconds_count 144320
"#;
        let groups = parse_text(input).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].metrics.len(), 1);
        let MetricValue::Histogram(h) = &groups[0].metrics[0].as_ref().unwrap().value else {
            panic!("expected histogram")
        };
        assert_eq!(h.buckets.len(), 2);
        assert_eq!(h.sample_count, 144320);
    }

    #[test]
    fn untyped_metric_without_header() {
        let input = "metric_without_timestamp_and_labels 12.47";
        let groups = parse_text(input).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].r#type, MetricType::Untyped);
    }

    #[test]
    fn propagates_parse_errors_with_line_context() {
        let input = r#"name{registry="default" content_type="html"} 1890"#;
        let error = parse_text(input).unwrap_err();
        assert!(matches!(error, ParserError::WithLine { .. }));
    }

    #[test]
    fn write_text_round_trips_a_gauge_with_labels() {
        let mut family = MetricFamily::new("up", MetricType::Gauge);
        family.metrics.push(Some(Metric {
            labels: vec![Label::new("job", "api")],
            value: MetricValue::Gauge(1.0),
            timestamp_ms: Some(1_000),
        }));

        let rendered = write_text(&[family]);
        assert!(rendered.contains("# TYPE up gauge"));
        assert!(rendered.contains(r#"up{job="api"} 1 1000"#));

        let parsed = parse_text(&rendered).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].metrics[0].as_ref().unwrap().label("job"), Some("api"));
    }

    #[test]
    fn write_text_expands_a_histogram_into_bucket_sum_count_lines() {
        let mut family = MetricFamily::new("latency", MetricType::Histogram);
        family.metrics.push(Some(Metric {
            labels: vec![],
            value: MetricValue::Histogram(HistogramValue {
                sample_count: 3,
                sample_sum: 4.5,
                buckets: vec![HistogramBucket {
                    upper_bound: f64::INFINITY,
                    cumulative_count: 3,
                }],
            }),
            timestamp_ms: None,
        }));

        let rendered = write_text(&[family]);
        assert!(rendered.contains(r#"latency_bucket{le="+Inf"} 3"#));
        assert!(rendered.contains("latency_sum 4.5"));
        assert!(rendered.contains("latency_count 3"));
    }
}
