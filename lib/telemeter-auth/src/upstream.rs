use std::time::Duration;

use futures_util::StreamExt;
use serde::{Deserialize, Serialize};

use crate::error::AuthorizeError;
use crate::ClusterAuthorizer;

/// Upper bound on how much of an upstream response body is read, regardless
/// of status or content length, so a misbehaving Tollbooth can't hold a
/// connection open streaming an unbounded body at this client.
const MAX_BODY_BYTES: usize = 32 * 1024;

#[derive(Serialize)]
struct AuthorizeRequest<'a> {
    cluster_id: &'a str,
    authorization_token: &'a str,
}

#[derive(Deserialize)]
struct AuthorizeResponse {
    #[serde(default)]
    account_id: String,
}

/// Calls an upstream Tollbooth-compatible authorization service over HTTP.
pub struct UpstreamAuthorizer {
    client: reqwest::Client,
    url: String,
}

impl UpstreamAuthorizer {
    pub fn new(url: String, timeout: Duration) -> Result<Self, AuthorizeError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| AuthorizeError::NetworkError { source })?;
        Ok(UpstreamAuthorizer { client, url })
    }
}

#[async_trait::async_trait]
impl ClusterAuthorizer for UpstreamAuthorizer {
    async fn authorize_cluster(
        &self,
        token: &str,
        cluster_id: &str,
    ) -> Result<String, AuthorizeError> {
        let body = AuthorizeRequest {
            cluster_id,
            authorization_token: token,
        };

        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|source| {
                if source.is_timeout() {
                    AuthorizeError::Timeout
                } else {
                    AuthorizeError::NetworkError { source }
                }
            })?;

        let status = response.status();
        let is_json = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.contains("application/json"))
            .unwrap_or(false);

        let body_bytes = read_capped(response).await?;

        match status.as_u16() {
            200 | 201 => {
                if !is_json {
                    return Err(AuthorizeError::BadUpstream);
                }
                let parsed: AuthorizeResponse = serde_json::from_slice(&body_bytes)
                    .map_err(|_| AuthorizeError::BadUpstream)?;
                if parsed.account_id.is_empty() {
                    return Err(AuthorizeError::BadUpstream);
                }
                Ok(parsed.account_id)
            }
            401 => Err(AuthorizeError::Unauthorized),
            404 => Err(AuthorizeError::NotFound {
                cluster_id: cluster_id.to_owned(),
            }),
            409 => Err(AuthorizeError::Conflict {
                cluster_id: cluster_id.to_owned(),
            }),
            429 => Err(AuthorizeError::RateLimited),
            other => {
                let prefix_len = body_bytes.len().min(256);
                let body_prefix = String::from_utf8_lossy(&body_bytes[..prefix_len]).into_owned();
                Err(AuthorizeError::Upstream {
                    status: other,
                    body_prefix,
                })
            }
        }
    }
}

async fn read_capped(response: reqwest::Response) -> Result<Vec<u8>, AuthorizeError> {
    let mut stream = response.bytes_stream();
    let mut buf = Vec::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|source| AuthorizeError::NetworkError { source })?;
        buf.extend_from_slice(&chunk);
        if buf.len() >= MAX_BODY_BYTES {
            buf.truncate(MAX_BODY_BYTES);
            break;
        }
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_matches_the_wire_contract() {
        let request = AuthorizeRequest {
            cluster_id: "cluster-1",
            authorization_token: "tok",
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["cluster_id"], "cluster-1");
        assert_eq!(json["authorization_token"], "tok");
    }

    #[test]
    fn empty_account_id_is_rejected_by_the_response_shape() {
        let response: AuthorizeResponse = serde_json::from_str(r#"{"account_id":""}"#).unwrap();
        assert!(response.account_id.is_empty());
    }
}
