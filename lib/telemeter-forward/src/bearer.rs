use std::collections::BTreeMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::authenticator::Authenticator;
use crate::error::ForwardError;

#[derive(Deserialize)]
struct AuthorizeResponse {
    token: String,
    #[serde(rename = "expiresInSeconds")]
    expires_in_seconds: i64,
    #[serde(default)]
    labels: BTreeMap<String, String>,
}

struct CachedToken {
    token: String,
    expires_at: Instant,
}

/// Calls the gateway's own `/authorize` endpoint with a static initial
/// bearer token to obtain a rotating JWT, caching it until
/// `expiresInSeconds - 15s`. A 401 from the forward target invalidates the
/// cache so the next call re-authorizes. Labels from the authorize response
/// are captured for injection via [`Self::label_retriever`].
pub struct BearerAuthenticator {
    http: reqwest::Client,
    authorize_url: String,
    initial_token: String,
    cached: Mutex<Option<CachedToken>>,
    labels: Arc<StdMutex<Vec<(String, String)>>>,
}

impl BearerAuthenticator {
    pub fn new(http: reqwest::Client, authorize_url: String, initial_token: String) -> Self {
        BearerAuthenticator {
            http,
            authorize_url,
            initial_token,
            cached: Mutex::new(None),
            labels: Arc::new(StdMutex::new(Vec::new())),
        }
    }

    /// A [`telemeter_transform::LabelRetriever`] reading the labels most
    /// recently returned by `/authorize`, for injection into series this
    /// client forwards.
    pub fn label_retriever(&self) -> impl telemeter_transform::LabelRetriever {
        LabelSnapshot(self.labels.clone())
    }

    async fn authorize(&self) -> Result<CachedToken, ForwardError> {
        let response = self
            .http
            .post(&self.authorize_url)
            .header(
                reqwest::header::AUTHORIZATION,
                format!("bearer {}", self.initial_token),
            )
            .send()
            .await
            .map_err(|source| {
                if source.is_timeout() {
                    ForwardError::Timeout
                } else {
                    ForwardError::NetworkError { source }
                }
            })?;

        if !response.status().is_success() {
            return Err(ForwardError::Authentication {
                reason: format!("authorize returned {}", response.status()),
            });
        }

        let parsed: AuthorizeResponse = response
            .json()
            .await
            .map_err(|source| ForwardError::NetworkError { source })?;

        *self
            .labels
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = parsed.labels.into_iter().collect();

        let ttl = Duration::from_secs(parsed.expires_in_seconds.max(0) as u64)
            .saturating_sub(Duration::from_secs(15));
        Ok(CachedToken {
            token: parsed.token,
            expires_at: Instant::now() + ttl,
        })
    }
}

#[async_trait]
impl Authenticator for BearerAuthenticator {
    async fn token(&self) -> Result<String, ForwardError> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Instant::now() {
                return Ok(token.token.clone());
            }
        }
        let fresh = self.authorize().await?;
        let token = fresh.token.clone();
        *cached = Some(fresh);
        Ok(token)
    }

    async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }
}

struct LabelSnapshot(Arc<StdMutex<Vec<(String, String)>>>);

impl telemeter_transform::LabelRetriever for LabelSnapshot {
    fn retrieve(&self) -> Vec<(String, String)> {
        self.0
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}
