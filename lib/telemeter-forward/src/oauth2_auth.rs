use std::time::{Duration, Instant};

use async_trait::async_trait;
use oauth2::basic::BasicClient;
use oauth2::{AuthUrl, ClientId, ClientSecret, Scope, TokenResponse, TokenUrl};
use tokio::sync::Mutex;

use crate::authenticator::Authenticator;
use crate::error::ForwardError;

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

/// OAuth2 client-credentials authenticator. The token endpoint is supplied
/// directly (discovered from the OIDC issuer by the caller); tokens are
/// cached until their reported expiry and refreshed transparently.
pub struct OAuth2Authenticator {
    client: BasicClient,
    scopes: Vec<Scope>,
    cached: Mutex<Option<CachedToken>>,
}

impl OAuth2Authenticator {
    pub fn new(
        client_id: String,
        client_secret: String,
        auth_url: String,
        token_url: String,
        scopes: Vec<String>,
    ) -> Result<Self, ForwardError> {
        let auth_url = AuthUrl::new(auth_url).map_err(|source| ForwardError::Authentication {
            reason: source.to_string(),
        })?;
        let token_url = TokenUrl::new(token_url).map_err(|source| ForwardError::Authentication {
            reason: source.to_string(),
        })?;
        let client = BasicClient::new(
            ClientId::new(client_id),
            Some(ClientSecret::new(client_secret)),
            auth_url,
            Some(token_url),
        );
        Ok(OAuth2Authenticator {
            client,
            scopes: scopes.into_iter().map(Scope::new).collect(),
            cached: Mutex::new(None),
        })
    }
}

#[async_trait]
impl Authenticator for OAuth2Authenticator {
    async fn token(&self) -> Result<String, ForwardError> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Instant::now() {
                return Ok(token.access_token.clone());
            }
        }

        let mut request = self.client.exchange_client_credentials();
        for scope in &self.scopes {
            request = request.add_scope(scope.clone());
        }
        let response = request
            .request_async(oauth2::reqwest::async_http_client)
            .await
            .map_err(|source| ForwardError::Authentication {
                reason: source.to_string(),
            })?;

        let ttl = response
            .expires_in()
            .unwrap_or(Duration::from_secs(3600))
            .saturating_sub(Duration::from_secs(15));
        let access_token = response.access_token().secret().clone();
        *cached = Some(CachedToken {
            access_token: access_token.clone(),
            expires_at: Instant::now() + ttl,
        });
        Ok(access_token)
    }

    async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }
}
