//! Prometheus metric family types shared across the telemeter pipeline.
//!
//! A [`MetricFamily`] is the unit the transformer pipeline, validator and
//! remote-write converter all operate on: a name, a declared [`MetricType`],
//! and an ordered list of [`Metric`] samples whose value variant must match
//! the family's declared type.

use std::collections::BTreeMap;

mod delimited;
mod line;
mod text;

pub use delimited::{read_delimited, write_delimited, DelimitedError};
pub use line::ErrorKind as TextParseErrorKind;
pub use text::{parse_text, write_text, ParserError};

pub const METRIC_NAME_LABEL: &str = "__name__";

/// Generated wire types for the exposition-format `MetricFamily` protobuf,
/// used at the decode/encode boundary only; pipeline code works with the
/// richer [`MetricFamily`]/[`Metric`] types below.
pub mod proto {
    include!(concat!(env!("OUT_DIR"), "/telemeter.metrics.rs"));
}

/// Generated wire types for the Prometheus remote-write protobuf.
pub mod remote_proto {
    include!(concat!(env!("OUT_DIR"), "/telemeter.remote.rs"));
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum MetricType {
    Counter,
    Gauge,
    Histogram,
    Summary,
    Untyped,
}

impl MetricType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
            MetricType::Histogram => "histogram",
            MetricType::Summary => "summary",
            MetricType::Untyped => "untyped",
        }
    }

    fn from_proto(t: i32) -> Self {
        match proto::MetricType::try_from(t).unwrap_or(proto::MetricType::Untyped) {
            proto::MetricType::Counter => MetricType::Counter,
            proto::MetricType::Gauge => MetricType::Gauge,
            proto::MetricType::Summary => MetricType::Summary,
            proto::MetricType::Untyped => MetricType::Untyped,
            proto::MetricType::Histogram => MetricType::Histogram,
        }
    }

    fn to_proto(self) -> proto::MetricType {
        match self {
            MetricType::Counter => proto::MetricType::Counter,
            MetricType::Gauge => proto::MetricType::Gauge,
            MetricType::Summary => proto::MetricType::Summary,
            MetricType::Untyped => proto::MetricType::Untyped,
            MetricType::Histogram => proto::MetricType::Histogram,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label {
    pub name: String,
    pub value: String,
}

impl Label {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistogramBucket {
    pub upper_bound: f64,
    pub cumulative_count: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistogramValue {
    pub sample_count: u64,
    pub sample_sum: f64,
    pub buckets: Vec<HistogramBucket>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SummaryQuantile {
    pub quantile: f64,
    pub value: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SummaryValue {
    pub sample_count: u64,
    pub sample_sum: f64,
    pub quantiles: Vec<SummaryQuantile>,
}

/// The typed payload of a single sample. The active variant must agree with
/// the declared [`MetricType`] of the enclosing family: `Counter` families
/// hold only `Counter` values, and so on.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    Counter(f64),
    Gauge(f64),
    Untyped(f64),
    Histogram(HistogramValue),
    Summary(SummaryValue),
}

impl MetricValue {
    pub fn matches_type(&self, t: MetricType) -> bool {
        matches!(
            (self, t),
            (MetricValue::Counter(_), MetricType::Counter)
                | (MetricValue::Gauge(_), MetricType::Gauge)
                | (MetricValue::Untyped(_), MetricType::Untyped)
                | (MetricValue::Histogram(_), MetricType::Histogram)
                | (MetricValue::Summary(_), MetricType::Summary)
        )
    }

    /// The scalar reading a remote-write `Sample` would carry, for the types
    /// the remote-write converter supports (counter/gauge/untyped).
    pub fn scalar(&self) -> Option<f64> {
        match self {
            MetricValue::Counter(v) | MetricValue::Gauge(v) | MetricValue::Untyped(v) => Some(*v),
            MetricValue::Histogram(_) | MetricValue::Summary(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    pub labels: Vec<Label>,
    pub value: MetricValue,
    /// Milliseconds since the Unix epoch; `None` means the sample carried no
    /// explicit timestamp.
    pub timestamp_ms: Option<i64>,
}

impl Metric {
    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|l| l.name == name)
            .map(|l| l.value.as_str())
    }

    /// Removes duplicate label names, keeping the first occurrence, matching
    /// the "first write wins" policy used when materializing remote-write
    /// series.
    pub fn dedup_labels(&mut self) {
        let mut seen = BTreeMap::new();
        self.labels.retain(|l| {
            if l.name.is_empty() || l.value.is_empty() {
                return false;
            }
            if seen.contains_key(&l.name) {
                false
            } else {
                seen.insert(l.name.clone(), ());
                true
            }
        });
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricFamily {
    pub name: String,
    pub help: Option<String>,
    pub r#type: MetricType,
    pub metrics: Vec<Option<Metric>>,
}

impl MetricFamily {
    pub fn new(name: impl Into<String>, r#type: MetricType) -> Self {
        Self {
            name: name.into(),
            help: None,
            r#type,
            metrics: Vec::new(),
        }
    }

    /// Number of non-nullified metrics remaining in the family.
    pub fn live_count(&self) -> usize {
        self.metrics.iter().filter(|m| m.is_some()).count()
    }

    pub fn to_proto(&self) -> proto::MetricFamily {
        proto::MetricFamily {
            name: self.name.clone(),
            help: self.help.clone().unwrap_or_default(),
            r#type: self.r#type.to_proto() as i32,
            metric: self
                .metrics
                .iter()
                .flatten()
                .map(metric_to_proto)
                .collect(),
        }
    }

    pub fn from_proto(fam: proto::MetricFamily) -> Self {
        let r#type = MetricType::from_proto(fam.r#type);
        let metrics = fam
            .metric
            .into_iter()
            .map(|m| Some(metric_from_proto(m, r#type)))
            .collect();
        MetricFamily {
            name: fam.name,
            help: if fam.help.is_empty() {
                None
            } else {
                Some(fam.help)
            },
            r#type,
            metrics,
        }
    }
}

fn metric_to_proto(metric: &Metric) -> proto::Metric {
    let label = metric
        .labels
        .iter()
        .map(|l| proto::LabelPair {
            name: l.name.clone(),
            value: l.value.clone(),
        })
        .collect();
    let mut out = proto::Metric {
        label,
        timestamp_ms: metric.timestamp_ms.unwrap_or_default(),
        ..Default::default()
    };
    match &metric.value {
        MetricValue::Counter(v) => out.counter = Some(proto::Counter { value: *v }),
        MetricValue::Gauge(v) => out.gauge = Some(proto::Gauge { value: *v }),
        MetricValue::Untyped(v) => out.untyped = Some(proto::Untyped { value: *v }),
        MetricValue::Histogram(h) => {
            out.histogram = Some(proto::Histogram {
                sample_count: h.sample_count,
                sample_sum: h.sample_sum,
                bucket: h
                    .buckets
                    .iter()
                    .map(|b| proto::Bucket {
                        cumulative_count: b.cumulative_count,
                        upper_bound: b.upper_bound,
                    })
                    .collect(),
            })
        }
        MetricValue::Summary(s) => {
            out.summary = Some(proto::Summary {
                sample_count: s.sample_count,
                sample_sum: s.sample_sum,
                quantile: s
                    .quantiles
                    .iter()
                    .map(|q| proto::Quantile {
                        quantile: q.quantile,
                        value: q.value,
                    })
                    .collect(),
            })
        }
    }
    out
}

fn metric_from_proto(metric: proto::Metric, r#type: MetricType) -> Metric {
    let labels = metric
        .label
        .into_iter()
        .map(|l| Label::new(l.name, l.value))
        .collect();
    let value = match r#type {
        MetricType::Counter => MetricValue::Counter(metric.counter.map(|c| c.value).unwrap_or(0.0)),
        MetricType::Gauge => MetricValue::Gauge(metric.gauge.map(|g| g.value).unwrap_or(0.0)),
        MetricType::Untyped => MetricValue::Untyped(metric.untyped.map(|u| u.value).unwrap_or(0.0)),
        MetricType::Histogram => {
            MetricValue::Histogram(metric.histogram.map(histogram_from_proto).unwrap_or_default())
        }
        MetricType::Summary => {
            MetricValue::Summary(metric.summary.map(summary_from_proto).unwrap_or_default())
        }
    };
    Metric {
        labels,
        value,
        timestamp_ms: if metric.timestamp_ms == 0 {
            None
        } else {
            Some(metric.timestamp_ms)
        },
    }
}

fn histogram_from_proto(h: proto::Histogram) -> HistogramValue {
    HistogramValue {
        sample_count: h.sample_count,
        sample_sum: h.sample_sum,
        buckets: h
            .bucket
            .into_iter()
            .map(|b| HistogramBucket {
                upper_bound: b.upper_bound,
                cumulative_count: b.cumulative_count,
            })
            .collect(),
    }
}

fn summary_from_proto(s: proto::Summary) -> SummaryValue {
    SummaryValue {
        sample_count: s.sample_count,
        sample_sum: s.sample_sum,
        quantiles: s
            .quantile
            .into_iter()
            .map(|q| SummaryQuantile {
                quantile: q.quantile,
                value: q.value,
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proto_roundtrip_preserves_counter_family() {
        let mut family = MetricFamily::new("up", MetricType::Counter);
        family.metrics.push(Some(Metric {
            labels: vec![Label::new("job", "test")],
            value: MetricValue::Counter(1.0),
            timestamp_ms: Some(1000),
        }));

        let proto = family.to_proto();
        let back = MetricFamily::from_proto(proto);
        assert_eq!(back.name, "up");
        assert_eq!(back.r#type, MetricType::Counter);
        assert_eq!(back.metrics.len(), 1);
        assert_eq!(
            back.metrics[0].as_ref().unwrap().value,
            MetricValue::Counter(1.0)
        );
    }

    #[test]
    fn dedup_labels_keeps_first_and_drops_empty() {
        let mut metric = Metric {
            labels: vec![
                Label::new("a", "1"),
                Label::new("a", "2"),
                Label::new("b", ""),
                Label::new("", "x"),
                Label::new("c", "3"),
            ],
            value: MetricValue::Gauge(1.0),
            timestamp_ms: None,
        };
        metric.dedup_labels();
        assert_eq!(
            metric.labels,
            vec![Label::new("a", "1"), Label::new("c", "3")]
        );
    }
}
