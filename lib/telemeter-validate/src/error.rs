#[derive(Debug, snafu::Snafu, PartialEq, Eq)]
pub enum ValidateError {
    #[snafu(display("request is not authenticated"))]
    Unauthenticated,

    #[snafu(display("authenticated client is missing the partition label {label}"))]
    MissingPartitionLabel { label: String },

    #[snafu(display("upload exceeds the {limit}-byte size limit"))]
    UploadTooLarge { limit: usize },
}
