//! Maps every library error this gateway can produce onto an HTTP response.
//!
//! Response bodies are plain text, matching the upstream Tollbooth-style
//! API this gateway fronts: callers are other services parsing a status
//! code and a short human-readable reason, not a JSON problem-details
//! shape. Every branch is logged at the appropriate level before the
//! response is built, with the request id attached so an operator can
//! correlate a client-visible failure with the structured log line that
//! explains it.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use uuid::Uuid;

use telemeter_auth::AuthorizeError;
use telemeter_jwt::VerifyError;
use telemeter_ratelimit::RateLimitError;
use telemeter_transform::TransformError;
use telemeter_validate::ValidateError;

/// Every way a request into this gateway can fail, already carrying enough
/// context to render the response body callers expect.
#[derive(Debug)]
pub enum GatewayError {
    Unauthenticated,
    /// The rhelemeter v2 PSK check failed: the secret header was absent or
    /// didn't match the configured secret. Distinct from `Unauthenticated`
    /// (401, "who are you") — this is "I know who's asking and they're not
    /// allowed in", which the spec surfaces as 403.
    Forbidden(String),
    /// A request is well-authenticated but asserts something about its
    /// payload that doesn't hold — e.g. the rhelemeter v2 subject-label
    /// assertion, where an authenticated client's time-series labels don't
    /// match the subject its certificate named.
    BadRequest(String),
    TokenVerification(VerifyError),
    Authorize(AuthorizeError),
    Validate(ValidateError),
    RateLimited(RateLimitError),
    Transform(TransformError),
    Decode(String),
    Forward { status: StatusCode, body: String },
    /// The rhelemeter receive path's body-size cap was exceeded. Unlike the
    /// v1 upload path's [`ValidateError::UploadTooLarge`] (reported as 500),
    /// this surfaces as 413.
    ReceiveBodyTooLarge,
    Internal(String),
}

impl GatewayError {
    fn request_id() -> Uuid {
        Uuid::new_v4()
    }

    fn status(&self) -> StatusCode {
        match self {
            GatewayError::Unauthenticated => StatusCode::UNAUTHORIZED,
            GatewayError::Forbidden(_) => StatusCode::FORBIDDEN,
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::TokenVerification(_) => StatusCode::UNAUTHORIZED,
            GatewayError::Authorize(e) => {
                StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            GatewayError::Validate(ValidateError::Unauthenticated) => StatusCode::UNAUTHORIZED,
            GatewayError::Validate(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::Transform(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::Decode(_) => StatusCode::BAD_REQUEST,
            GatewayError::Forward { status, .. } => *status,
            GatewayError::ReceiveBodyTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The literal text a caller should see in the response body. A few
    /// variants use fixed phrasing independent of whatever wording the
    /// originating library error's `Display` happens to use internally
    /// (which is still logged in full below) — the body is a contract
    /// other services parse, the log line is for a human.
    fn body_text(&self, request_id: Uuid) -> String {
        match self {
            GatewayError::Unauthenticated => "request is not authenticated".to_string(),
            GatewayError::Forbidden(reason) => reason.clone(),
            GatewayError::BadRequest(reason) => reason.clone(),
            GatewayError::TokenVerification(e) => e.to_string(),
            GatewayError::Authorize(e) => e.to_string(),
            GatewayError::Validate(ValidateError::UploadTooLarge { .. }) => {
                "incoming sample data is too long".to_string()
            }
            GatewayError::Validate(e) => e.to_string(),
            GatewayError::RateLimited(RateLimitError::WriteLimitReached { .. }) => {
                "write limit reached".to_string()
            }
            GatewayError::Transform(TransformError::RequiredLabelMissing { .. }) => {
                "a required label is missing from the metric".to_string()
            }
            GatewayError::Transform(e) => e.to_string(),
            GatewayError::Decode(reason) => reason.clone(),
            GatewayError::Forward { body, .. } => body.clone(),
            GatewayError::ReceiveBodyTooLarge => "request body exceeds the configured limit".to_string(),
            GatewayError::Internal(_) => format!("Internal server error, requestid={request_id}"),
        }
    }

    fn log(&self, request_id: Uuid) {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(request_id = %request_id, status = status.as_u16(), error = %self, "request failed");
        } else {
            tracing::warn!(request_id = %request_id, status = status.as_u16(), error = %self, "request rejected");
        }
    }
}

impl std::fmt::Display for GatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GatewayError::Unauthenticated => write!(f, "request is not authenticated"),
            GatewayError::Forbidden(reason) => write!(f, "{reason}"),
            GatewayError::BadRequest(reason) => write!(f, "{reason}"),
            GatewayError::TokenVerification(e) => write!(f, "{e}"),
            GatewayError::Authorize(e) => write!(f, "{e}"),
            GatewayError::Validate(e) => write!(f, "{e}"),
            GatewayError::RateLimited(e) => write!(f, "{e}"),
            GatewayError::Transform(e) => write!(f, "{e}"),
            GatewayError::Decode(reason) => write!(f, "failed to decode request body: {reason}"),
            GatewayError::Forward { status, body } => {
                write!(f, "forward target returned {status}: {body}")
            }
            GatewayError::ReceiveBodyTooLarge => write!(f, "request body exceeded the configured limit"),
            GatewayError::Internal(reason) => write!(f, "internal error: {reason}"),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let request_id = Self::request_id();
        self.log(request_id);
        let status = self.status();
        let mut response = self.body_text(request_id).into_response();
        *response.status_mut() = status;
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, header::HeaderValue::from_static("text/plain"));
        if matches!(status, StatusCode::TOO_MANY_REQUESTS) {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, header::HeaderValue::from_static("300"));
        }
        response
    }
}

impl From<VerifyError> for GatewayError {
    fn from(e: VerifyError) -> Self {
        GatewayError::TokenVerification(e)
    }
}

impl From<AuthorizeError> for GatewayError {
    fn from(e: AuthorizeError) -> Self {
        GatewayError::Authorize(e)
    }
}

impl From<ValidateError> for GatewayError {
    fn from(e: ValidateError) -> Self {
        GatewayError::Validate(e)
    }
}

impl From<RateLimitError> for GatewayError {
    fn from(e: RateLimitError) -> Self {
        GatewayError::RateLimited(e)
    }
}

impl From<TransformError> for GatewayError {
    fn from(e: TransformError) -> Self {
        GatewayError::Transform(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_body_says_write_limit_reached() {
        let err = GatewayError::RateLimited(RateLimitError::WriteLimitReached {
            partition: "tenant-1".to_string(),
        });
        assert_eq!(err.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(err.body_text(Uuid::nil()).contains("write limit reached"));
    }

    #[test]
    fn required_label_body_matches_the_documented_phrase() {
        let err = GatewayError::Transform(TransformError::RequiredLabelMissing {
            family: "up".to_string(),
            label: "cluster".to_string(),
        });
        assert!(err
            .body_text(Uuid::nil())
            .contains("a required label is missing from the metric"));
    }

    #[test]
    fn upload_too_large_body_matches_the_documented_phrase() {
        let err = GatewayError::Validate(ValidateError::UploadTooLarge { limit: 4096 });
        assert!(err
            .body_text(Uuid::nil())
            .contains("incoming sample data is too long"));
    }

    #[test]
    fn token_expired_body_matches_the_documented_phrase() {
        let err = GatewayError::TokenVerification(VerifyError::TokenExpired);
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        assert!(err.body_text(Uuid::nil()).contains("token has expired"));
    }

    #[test]
    fn forbidden_maps_to_403() {
        let err = GatewayError::Forbidden("client secret did not match".to_string());
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn bad_request_maps_to_400() {
        let err = GatewayError::BadRequest("subject label did not match the client certificate".to_string());
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
