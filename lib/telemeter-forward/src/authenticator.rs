use async_trait::async_trait;

use crate::error::ForwardError;

/// A source of bearer tokens for the forward client: either an OAuth2
/// client-credentials exchange or the gateway's own rotating-bearer scheme.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Returns a valid bearer token, fetching or refreshing it as needed.
    async fn token(&self) -> Result<String, ForwardError>;

    /// Invalidates any cached token, forcing the next [`Authenticator::token`]
    /// call to re-authenticate. Called whenever the upstream responds 401.
    async fn invalidate(&self);
}
