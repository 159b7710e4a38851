use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use metrics_model::remote_proto::WriteRequest;
use prost::Message;

use crate::authenticator::Authenticator;
use crate::error::ForwardError;

/// Upper bound on how much of an upstream response body is read before
/// closing the connection, regardless of status.
const MAX_BODY_BYTES: usize = 32 * 1024;

/// POSTs a snappy-compressed, protobuf-encoded remote-write request
/// upstream. Attaches a bearer token from the configured [`Authenticator`]
/// and retries exactly once, after invalidating that token, on a 401.
pub struct ForwardClient {
    http: reqwest::Client,
    url: String,
    tenant_id: Option<String>,
    authenticator: Arc<dyn Authenticator>,
}

impl ForwardClient {
    pub fn new(
        url: String,
        tenant_id: Option<String>,
        authenticator: Arc<dyn Authenticator>,
    ) -> Result<Self, ForwardError> {
        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|source| ForwardError::NetworkError { source })?;
        Ok(ForwardClient {
            http,
            url,
            tenant_id,
            authenticator,
        })
    }

    /// Forwards `request` upstream. A request with no series is a no-op —
    /// callers should log and skip calling this rather than making a
    /// pointless round trip.
    #[tracing::instrument(skip_all, fields(series = request.timeseries.len()))]
    pub async fn forward(&self, request: &WriteRequest) -> Result<(), ForwardError> {
        if request.timeseries.is_empty() {
            return Ok(());
        }

        let mut encoded = Vec::new();
        request
            .encode(&mut encoded)
            .map_err(|source| ForwardError::EncodeError {
                source: std::io::Error::new(std::io::ErrorKind::InvalidData, source),
            })?;
        let compressed = snap::raw::Encoder::new()
            .compress_vec(&encoded)
            .map_err(|source| ForwardError::EncodeError {
                source: std::io::Error::new(std::io::ErrorKind::InvalidData, source),
            })?;

        self.forward_compressed(&compressed).await
    }

    /// Forwards an already snappy-compressed, protobuf-encoded remote-write
    /// body verbatim, without decoding and re-encoding it. Used by the v2
    /// passthrough path, which only decodes a request far enough to run its
    /// label assertions and otherwise streams the client's bytes straight
    /// through.
    #[tracing::instrument(skip_all, fields(bytes = compressed.len()))]
    pub async fn forward_compressed(&self, compressed: &[u8]) -> Result<(), ForwardError> {
        let (status, body) = self.send_once(compressed).await?;
        if status == 401 {
            self.authenticator.invalidate().await;
            let (status, body) = self.send_once(compressed).await?;
            return Self::handle_status(status, body);
        }
        Self::handle_status(status, body)
    }

    async fn send_once(&self, body: &[u8]) -> Result<(u16, Vec<u8>), ForwardError> {
        let token = self.authenticator.token().await?;
        let mut request = self
            .http
            .post(&self.url)
            .header(reqwest::header::CONTENT_ENCODING, "snappy")
            .header(reqwest::header::CONTENT_TYPE, "application/x-protobuf")
            .header(reqwest::header::AUTHORIZATION, format!("Bearer {token}"))
            .body(body.to_vec());
        if let Some(tenant_id) = &self.tenant_id {
            request = request.header("THANOS-TENANT", tenant_id);
        }

        let response = request.send().await.map_err(|source| {
            if source.is_timeout() {
                ForwardError::Timeout
            } else {
                ForwardError::NetworkError { source }
            }
        })?;
        let status = response.status().as_u16();
        let body = read_capped(response).await?;
        Ok((status, body))
    }

    fn handle_status(status: u16, body: Vec<u8>) -> Result<(), ForwardError> {
        if (200..300).contains(&status) {
            return Ok(());
        }
        let prefix_len = body.len().min(256);
        Err(ForwardError::Upstream {
            status,
            body_prefix: String::from_utf8_lossy(&body[..prefix_len]).into_owned(),
        })
    }
}

async fn read_capped(response: reqwest::Response) -> Result<Vec<u8>, ForwardError> {
    let mut stream = response.bytes_stream();
    let mut buf = Vec::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|source| ForwardError::NetworkError { source })?;
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
    fn an_empty_write_request_has_no_series() {
        let request = WriteRequest { timeseries: vec![] };
        assert!(request.timeseries.is_empty());
    }
}
