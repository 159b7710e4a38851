/// Outcomes of a cluster authorization call, carrying enough information for
/// an ingress handler to map the failure directly onto an HTTP response.
#[derive(Debug, snafu::Snafu)]
pub enum AuthorizeError {
    #[snafu(display("cluster authorizer rejected the bearer token"))]
    Unauthorized,

    #[snafu(display("cluster {cluster_id} is not known to the authorizer"))]
    NotFound { cluster_id: String },

    #[snafu(display("cluster {cluster_id} is already owned by another account"))]
    Conflict { cluster_id: String },

    #[snafu(display("cluster authorizer is rate limiting this client"))]
    RateLimited,

    #[snafu(display("cluster authorizer returned an unparseable or empty response"))]
    BadUpstream,

    #[snafu(display("cluster authorizer returned {status}: {body_prefix}"))]
    Upstream { status: u16, body_prefix: String },

    #[snafu(display("cluster authorizer request timed out"))]
    Timeout,

    #[snafu(display("cluster authorizer request failed: {source}"))]
    NetworkError { source: reqwest::Error },
}

impl AuthorizeError {
    /// The HTTP status an ingress handler should reply with when this error
    /// reaches `/authorize`. `Retry-After: 300` is added by the caller
    /// alongside `RateLimited`.
    pub fn http_status(&self) -> u16 {
        match self {
            AuthorizeError::Unauthorized => 401,
            AuthorizeError::NotFound { .. } => 404,
            AuthorizeError::Conflict { .. } => 409,
            AuthorizeError::RateLimited => 429,
            AuthorizeError::BadUpstream => 502,
            AuthorizeError::Upstream { status, .. } => *status,
            AuthorizeError::Timeout => 504,
            AuthorizeError::NetworkError { .. } => 502,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, AuthorizeError::RateLimited)
    }
}
