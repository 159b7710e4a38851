//! Exchanges a client-supplied bearer token and cluster identifier for a
//! stable account subject, either against an upstream Tollbooth-style
//! registration service or, for local development, a deterministic stub.

mod error;
mod stub;
mod upstream;

pub use error::AuthorizeError;
pub use stub::StubAuthorizer;
pub use upstream::UpstreamAuthorizer;

/// `AuthorizeCluster(token, clusterID) -> subject`.
#[async_trait::async_trait]
pub trait ClusterAuthorizer: Send + Sync {
    async fn authorize_cluster(
        &self,
        token: &str,
        cluster_id: &str,
    ) -> Result<String, AuthorizeError>;
}
