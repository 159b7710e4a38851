//! The one piece of request middleware this gateway needs: pulling a
//! bearer token out of the `Authorization` header and, for `/upload`,
//! verifying it as a client JWT before the handler ever runs.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, Request};
use axum::middleware::Next;
use axum::response::Response;

use crate::error::GatewayError;
use crate::state::AppState;

/// Pulls the bearer token out of `Authorization: Bearer <token>` (or the
/// lowercase `bearer` scheme some clients send), rejecting the request if
/// the header is absent or doesn't use the bearer scheme.
pub fn extract_bearer(headers: &HeaderMap) -> Result<&str, GatewayError> {
    let value = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(GatewayError::Unauthenticated)?;
    value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))
        .map(str::trim)
        .ok_or(GatewayError::Unauthenticated)
}

/// Verifies the request's bearer token as a client JWT and attaches the
/// recovered [`telemeter_jwt::Client`] as a request extension, for
/// `/upload` to read with an `Extension` extractor.
pub async fn verify_jwt<B: Send + 'static>(
    State(state): State<Arc<AppState>>,
    mut req: Request<B>,
    next: Next<B>,
) -> Result<Response, GatewayError> {
    let token = extract_bearer(req.headers())?.to_string();
    let client = state.verifier.verify(&token)?;
    req.extensions_mut().insert(client);
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_a_token_from_the_bearer_scheme() {
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::AUTHORIZATION, "Bearer abc123".parse().unwrap());
        assert_eq!(extract_bearer(&headers).unwrap(), "abc123");
    }

    #[test]
    fn accepts_a_lowercase_bearer_scheme() {
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::AUTHORIZATION, "bearer abc123".parse().unwrap());
        assert_eq!(extract_bearer(&headers).unwrap(), "abc123");
    }

    #[test]
    fn rejects_a_missing_header() {
        let headers = HeaderMap::new();
        assert!(matches!(extract_bearer(&headers), Err(GatewayError::Unauthenticated)));
    }
}
