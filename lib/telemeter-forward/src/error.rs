#[derive(Debug, snafu::Snafu)]
pub enum ForwardError {
    #[snafu(display("failed to obtain a bearer token: {reason}"))]
    Authentication { reason: String },

    #[snafu(display("forward request timed out"))]
    Timeout,

    #[snafu(display("forward request failed: {source}"))]
    NetworkError { source: reqwest::Error },

    #[snafu(display("upstream forward target returned {status}: {body_prefix}"))]
    Upstream { status: u16, body_prefix: String },

    #[snafu(display("failed to encode the write request: {source}"))]
    EncodeError { source: std::io::Error },
}
