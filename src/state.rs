//! Builds the shared state both binaries hand to their handlers: the
//! signer/verifier pair, the cluster authorizer, the rate limiter, the
//! cluster-aware store, and the forward client, all assembled once at
//! startup from a parsed CLI config.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

use telemeter_auth::{ClusterAuthorizer, StubAuthorizer, UpstreamAuthorizer};
use telemeter_cluster::{ClusterStore, DispatchRateLimiter};
use telemeter_forward::{Authenticator, ForwardClient, ForwardError, OAuth2Authenticator};
use telemeter_jwt::{Signer, Verifier};
use telemeter_ratelimit::PartitionRateLimiter;
use telemeter_transform::DriftCounters;

/// Lets the cluster dispatcher re-apply the sending tenant's rate limit on
/// the receiving node, bounding the DOS amplification a forwarded batch
/// could otherwise cause across the cluster (see [`telemeter_cluster::DispatchRateLimiter`]).
struct RateLimiterBridge(Arc<PartitionRateLimiter>);

impl DispatchRateLimiter for RateLimiterBridge {
    fn allow(&self, partition_key: &str) -> bool {
        self.0.allow(partition_key).is_ok()
    }
}

use crate::config::GatewayConfig;

/// Issuer every token this gateway signs (and therefore verifies) carries.
pub const TOKEN_ISSUER: &str = "telemeter";
/// Audience clients present tokens with on `/upload`.
pub const TOKEN_AUDIENCE: &str = "telemeter-client";

/// A no-op [`Authenticator`] for forwarding to an upstream that doesn't
/// require its own bearer token — typical for a same-cluster Thanos
/// receiver behind a network boundary rather than a public endpoint.
struct NoopAuthenticator;

#[async_trait]
impl Authenticator for NoopAuthenticator {
    async fn token(&self) -> Result<String, ForwardError> {
        Ok(String::new())
    }

    async fn invalidate(&self) {}
}

/// Everything the `telemeter` v1 handlers need, built once at startup and
/// shared behind `Arc`s via axum's `State` extractor.
pub struct AppState {
    pub config: GatewayConfig,
    pub signer: Signer,
    pub verifier: Verifier,
    pub authorizer: Arc<dyn ClusterAuthorizer>,
    pub rate_limiter: Arc<PartitionRateLimiter>,
    pub store: Arc<ClusterStore>,
    pub forward: Option<Arc<ForwardClient>>,
    pub drift_counters: DriftCounters,
    /// `--whitelist` plus `--whitelist-file` entries, resolved once at
    /// startup so the upload path never touches the filesystem per request.
    pub whitelist: Vec<telemeter_transform::Rule>,
}

impl AppState {
    pub async fn build(config: GatewayConfig) -> anyhow::Result<Arc<Self>> {
        let (signer, verifier, signing_secret) = build_signing_keys(&config)?;
        let authorizer = build_authorizer(&config);
        let rate_limiter = Arc::new(PartitionRateLimiter::new(config.ratelimit));
        let cluster_secret = resolve_cluster_secret(&config, &signing_secret)?;
        let store = build_store(&config, cluster_secret, rate_limiter.clone()).await?;
        let forward = build_forward_client(&config)?;
        let whitelist = config.effective_whitelist()?;

        Ok(Arc::new(AppState {
            config,
            signer,
            verifier,
            authorizer,
            rate_limiter,
            store,
            forward,
            drift_counters: DriftCounters::default(),
            whitelist,
        }))
    }
}

fn build_signing_keys(config: &GatewayConfig) -> anyhow::Result<(Signer, Verifier, Vec<u8>)> {
    let secret = match &config.shared_key {
        Some(path) => std::fs::read(path)?,
        None => {
            tracing::warn!(
                "no --shared-key configured; generating an ephemeral signing secret. \
                 Tokens issued by this process will not verify against any other node \
                 and do not survive a restart — fine for a single-node deployment only."
            );
            rand::rng().random::<[u8; 32]>().to_vec()
        }
    };
    let signer = Signer::from_hmac_secret(&secret);
    let verifier = Verifier::with_hmac_secret(&secret, TOKEN_ISSUER.to_string(), vec![TOKEN_AUDIENCE.to_string()]);
    Ok((signer, verifier, secret))
}

/// Resolves the secret that encrypts and authenticates gossip traffic:
/// `--cluster-secret` if configured, otherwise the same secret backing
/// issued tokens (`--shared-key`, or the ephemeral one generated above).
/// Irrelevant for a single-node deployment, but resolved unconditionally
/// since it's cheap and keeps `build_store` from needing to know why.
fn resolve_cluster_secret(config: &GatewayConfig, signing_secret: &[u8]) -> anyhow::Result<Vec<u8>> {
    match &config.cluster_secret {
        Some(path) => Ok(std::fs::read(path)?),
        None => Ok(signing_secret.to_vec()),
    }
}

fn build_authorizer(config: &GatewayConfig) -> Arc<dyn ClusterAuthorizer> {
    match &config.authorize_url {
        Some(url) => match UpstreamAuthorizer::new(url.clone(), Duration::from_secs(30)) {
            Ok(authorizer) => Arc::new(authorizer),
            Err(error) => {
                tracing::error!(%error, "failed to build upstream authorizer, falling back to the stub");
                Arc::new(StubAuthorizer)
            }
        },
        None => {
            tracing::warn!("no --authorize URL configured; using the stub cluster authorizer");
            Arc::new(StubAuthorizer)
        }
    }
}

async fn build_store(
    config: &GatewayConfig,
    cluster_secret: Vec<u8>,
    rate_limiter: Arc<PartitionRateLimiter>,
) -> anyhow::Result<Arc<ClusterStore>> {
    let inner: Arc<dyn telemeter_cluster::Store> = match &config.storage_dir {
        Some(dir) => Arc::new(telemeter_cluster::DiskStore::new(dir.clone())),
        None => Arc::new(telemeter_cluster::MemoryStore::new(config.ttl)),
    };

    let self_name = config
        .member_name
        .clone()
        .unwrap_or_else(telemeter_cluster::Member::generated_name);

    match config.listen_cluster {
        Some(gossip_addr) => {
            let bridge: Arc<dyn DispatchRateLimiter> = Arc::new(RateLimiterBridge(rate_limiter));
            Ok(ClusterStore::join(
                inner,
                self_name,
                gossip_addr,
                config.join.clone(),
                cluster_secret,
                Some(bridge),
            )
            .await?)
        }
        None => Ok(ClusterStore::single_node(inner, self_name)),
    }
}

fn build_forward_client(config: &GatewayConfig) -> anyhow::Result<Option<Arc<ForwardClient>>> {
    let Some(url) = config.forward_url.clone() else {
        tracing::warn!("no --forward-url configured; uploaded batches will be accepted and stored, but never forwarded upstream");
        return Ok(None);
    };

    let authenticator: Arc<dyn Authenticator> = match (&config.client_id, &config.client_secret, &config.oidc_token_url) {
        (Some(id), Some(secret), Some(token_url)) => {
            let auth_url = config
                .oidc_issuer
                .clone()
                .unwrap_or_else(|| token_url.clone());
            Arc::new(OAuth2Authenticator::new(
                id.clone(),
                secret.clone(),
                auth_url,
                token_url.clone(),
                Vec::new(),
            )?)
        }
        _ => Arc::new(NoopAuthenticator),
    };

    let client = ForwardClient::new(url, config.tenant_id.clone(), authenticator)?;
    Ok(Some(Arc::new(client)))
}

/// Everything the `rhelemeter` v2 handlers need. No JWT exchange, no
/// cluster plane — just the client-info mapping used for PSK
/// authentication and a forward client for remote-write passthrough.
pub struct RhelemeterState {
    pub config: crate::config::RhelemeterConfig,
    pub client_info: Option<crate::config::ClientInfo>,
    pub forward: Option<Arc<ForwardClient>>,
}

impl RhelemeterState {
    pub fn build(config: crate::config::RhelemeterConfig) -> anyhow::Result<Arc<Self>> {
        let client_info = match &config.client_info_data_file {
            Some(path) => {
                let bytes = std::fs::read(path)?;
                Some(serde_json::from_slice(&bytes)?)
            }
            None => None,
        };

        let forward = match config.forward_url.clone() {
            Some(url) => {
                let client = ForwardClient::new(url, config.tenant_id.clone(), Arc::new(NoopAuthenticator))?;
                Some(Arc::new(client))
            }
            None => {
                tracing::warn!("no --forward-url configured; received batches will be accepted but never forwarded upstream");
                None
            }
        };

        Ok(Arc::new(RhelemeterState {
            config,
            client_info,
            forward,
        }))
    }
}
