use crate::error::AuthorizeError;
use crate::ClusterAuthorizer;

/// A local-testing stand-in for the upstream authorizer: derives a subject
/// from an FNV hash of the token instead of calling out to Tollbooth. Every
/// call is logged so it's obvious from the logs that authorization is not
/// actually being enforced.
#[derive(Debug, Default, Clone, Copy)]
pub struct StubAuthorizer;

#[async_trait::async_trait]
impl ClusterAuthorizer for StubAuthorizer {
    async fn authorize_cluster(
        &self,
        token: &str,
        cluster_id: &str,
    ) -> Result<String, AuthorizeError> {
        let subject = telemeter_hash::fnv64a_string(token);
        tracing::warn!(
            cluster_id,
            subject = %subject,
            "using stub cluster authorizer; upstream authorization is not enforced"
        );
        Ok(subject)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn is_deterministic_for_the_same_token() {
        let authorizer = StubAuthorizer;
        let a = authorizer.authorize_cluster("tok", "cluster-a").await.unwrap();
        let b = authorizer.authorize_cluster("tok", "cluster-b").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn differs_for_different_tokens() {
        let authorizer = StubAuthorizer;
        let a = authorizer.authorize_cluster("tok-a", "cluster-1").await.unwrap();
        let b = authorizer.authorize_cluster("tok-b", "cluster-1").await.unwrap();
        assert_ne!(a, b);
    }
}
