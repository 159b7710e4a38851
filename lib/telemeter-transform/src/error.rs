#[derive(Debug, snafu::Snafu, PartialEq, Eq)]
pub enum TransformError {
    #[snafu(display("metric for family {family} has no timestamp"))]
    NoTimestamp { family: String },

    #[snafu(display("metrics for family {family} are not sorted by timestamp"))]
    Unsorted { family: String },

    #[snafu(display("metric for family {family} has a timestamp older than the minimum allowed"))]
    TimestampTooOld { family: String },

    #[snafu(display("metric for family {family} is missing required label {label}"))]
    RequiredLabelMissing { family: String, label: String },

    #[snafu(display(
        "metric for family {family} has required label {label} set to an unexpected value"
    ))]
    RequiredLabelValueMismatch { family: String, label: String },

    #[snafu(display("metric for family {family} does not match its declared type"))]
    UnsupportedType { family: String },

    #[snafu(display("metric family name exceeds the maximum length"))]
    MetricNameTooLong { family: String },

    #[snafu(display("a label on family {family} exceeds the maximum length"))]
    LabelTooLong { family: String },
}
