use std::net::SocketAddr;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use metrics_model::MetricFamily;
use tokio::sync::mpsc;

use crate::forward::{self, ReceiveCounters};
use crate::gossip::{self, ClusterEvent, ClusterHandle};
use crate::membership::Member;
use crate::problem::{ProblemTracker, DEFAULT_EXPIRY};
use crate::protocol;
use crate::ring::HashRing;
use crate::store::{Store, StoreError};

/// The TCP port a member's reliable forward listener is reachable on,
/// relative to its gossip (UDP) port. Keeping the offset fixed means
/// membership only needs to gossip one address per member.
const FORWARD_PORT_OFFSET: u16 = 1;

fn forward_addr(gossip_addr: SocketAddr) -> SocketAddr {
    let mut addr = gossip_addr;
    addr.set_port(gossip_addr.port().wrapping_add(FORWARD_PORT_OFFSET));
    addr
}

/// Lets the dispatcher re-apply the sending tenant's rate limit on the
/// receiving side of a forward, bounding the DOS amplification a single
/// over-quota tenant can cause by fanning a batch out across the cluster
/// (worst case `limit x cluster_size` without this check). Defined here
/// rather than depending on `telemeter-ratelimit` directly so this crate
/// doesn't need to know which limiter implementation a deployment uses;
/// the binary crate supplies the adapter.
pub trait DispatchRateLimiter: Send + Sync {
    /// Non-blocking: `true` if `partition_key` may accept this batch now.
    fn allow(&self, partition_key: &str) -> bool;
}

/// Composes the local store with the ring, the failure tracker, and the
/// forward transport. Implements [`Store`] itself by delegating reads
/// straight to the inner store and routing writes through
/// [`ClusterStore::find_remote`], so a cluster is just another store from
/// the point of view of the code that writes metrics into it.
pub struct ClusterStore {
    inner: Arc<dyn Store>,
    ring: RwLock<HashRing>,
    problems: ProblemTracker,
    self_name: String,
    gossip: Option<ClusterHandle>,
}

impl ClusterStore {
    /// A cluster of exactly one node: every write is local and the ring
    /// never needs a rebuild.
    pub fn single_node(inner: Arc<dyn Store>, self_name: String) -> Arc<Self> {
        Arc::new(ClusterStore {
            inner,
            ring: RwLock::new(HashRing::build(vec![self_name.clone()])),
            problems: ProblemTracker::new(DEFAULT_EXPIRY),
            self_name,
            gossip: None,
        })
    }

    /// Joins (or starts) a gossip cluster: binds the gossip socket on
    /// `gossip_addr` and a TCP forward listener on `gossip_addr`'s port
    /// + 1, then spawns the membership-tracking and dispatcher tasks.
    /// `cluster_secret` encrypts and authenticates every gossip datagram;
    /// nodes with mismatched secrets can't join each other's membership.
    pub async fn join(
        inner: Arc<dyn Store>,
        self_name: String,
        gossip_addr: SocketAddr,
        seeds: Vec<SocketAddr>,
        cluster_secret: Vec<u8>,
        rate_limiter: Option<Arc<dyn DispatchRateLimiter>>,
    ) -> std::io::Result<Arc<Self>> {
        let identity = Member::new(self_name.clone(), gossip_addr);
        let (handle, events) = gossip::spawn(identity, gossip_addr, cluster_secret)?;
        for seed in &seeds {
            handle.join(*seed);
        }

        let store = Arc::new(ClusterStore {
            inner: inner.clone(),
            ring: RwLock::new(HashRing::build(vec![self_name.clone()])),
            problems: ProblemTracker::new(DEFAULT_EXPIRY),
            self_name,
            gossip: Some(handle),
        });

        tokio::spawn(track_membership(store.clone(), events));

        let counters = Arc::new(ReceiveCounters::default());
        let forward_rx = forward::spawn_receiver(forward_addr(gossip_addr), counters).await?;
        tokio::spawn(dispatch(inner, forward_rx, rate_limiter));

        Ok(store)
    }

    fn rebuild_ring_if_stale(&self) {
        let stale = self.ring.read().unwrap_or_else(|p| p.into_inner()).stale();
        if stale {
            self.rebuild_ring();
        }
    }

    fn rebuild_ring(&self) {
        if let Some(handle) = &self.gossip {
            let snapshot = handle.snapshot();
            let mut members: Vec<String> = snapshot.members.iter().map(|m| m.name.clone()).collect();
            members.push(self.self_name.clone());
            members.sort();
            members.dedup();
            *self.ring.write().unwrap_or_else(|p| p.into_inner()) = HashRing::build(members);
        }
    }

    /// Resolves the member a key forwards to, or `None` meaning "write
    /// locally": the ring is a singleton, the key's owner is flagged
    /// problematic, or the owner is this node.
    fn find_remote(&self, partition_key: &str) -> Option<String> {
        self.rebuild_ring_if_stale();
        let ring = self.ring.read().unwrap_or_else(|p| p.into_inner());
        if ring.member_count() <= 1 {
            return None;
        }
        let owner = ring.get_node(partition_key)?;
        if owner == self.self_name || self.problems.has_problems(owner) {
            return None;
        }
        Some(owner.to_string())
    }

    fn member_addr(&self, name: &str) -> Option<SocketAddr> {
        self.gossip.as_ref().and_then(|handle| {
            handle
                .snapshot()
                .members
                .iter()
                .find(|m| m.name == name)
                .and_then(|m| m.addr.parse().ok())
        })
    }

    /// This node's stable member name, for a startup log line.
    pub fn self_name(&self) -> &str {
        &self.self_name
    }

    /// The membership snapshot backing `/debug/cluster`.
    pub fn debug_snapshot(&self) -> crate::membership::MembershipSnapshot {
        match &self.gossip {
            Some(handle) => handle.snapshot(),
            None => crate::membership::MembershipSnapshot::single_node(self.self_name.clone()),
        }
    }
}

#[async_trait::async_trait]
impl Store for ClusterStore {
    #[tracing::instrument(skip_all, fields(partition = partition_key))]
    async fn write(&self, partition_key: &str, families: Vec<MetricFamily>) -> Result<(), StoreError> {
        let Some(owner) = self.find_remote(partition_key) else {
            return self.inner.write(partition_key, families).await;
        };

        let Some(addr) = self.member_addr(&owner) else {
            return self.inner.write(partition_key, families).await;
        };

        let proto_families: Vec<_> = families.iter().map(MetricFamily::to_proto).collect();
        let wire = protocol::encode(partition_key, &proto_families);

        match forward::send(forward_addr(addr), &wire).await {
            Ok(()) => {
                tracing::debug!(owner, partition = partition_key, "forwarded batch to owning node");
                Ok(())
            }
            Err(error) => {
                tracing::warn!(owner, %error, "forward failed, falling back to a local write");
                self.problems.problem_detected(&owner);
                self.inner.write(partition_key, families).await
            }
        }
    }

    async fn read_all(&self) -> Vec<(String, Vec<MetricFamily>)> {
        self.inner.read_all().await
    }
}

async fn track_membership(store: Arc<ClusterStore>, mut events: mpsc::UnboundedReceiver<ClusterEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            ClusterEvent::MemberUp(name) => tracing::info!(member = %name, "cluster member joined"),
            ClusterEvent::MemberDown(name) => tracing::info!(member = %name, "cluster member left"),
        }
        store.rebuild_ring();
    }
}

async fn dispatch(
    inner: Arc<dyn Store>,
    mut rx: mpsc::Receiver<protocol::MetricMessage>,
    rate_limiter: Option<Arc<dyn DispatchRateLimiter>>,
) {
    while let Some(message) = rx.recv().await {
        if let Some(limiter) = &rate_limiter {
            if !limiter.allow(&message.partition_key) {
                tracing::warn!(partition = message.partition_key, "forwarded batch rejected by the receiving node's rate limit");
                continue;
            }
        }
        let families: Vec<MetricFamily> = message.families.into_iter().map(MetricFamily::from_proto).collect();
        if let Err(error) = inner.write(&message.partition_key, families).await {
            tracing::error!(%error, partition = message.partition_key, "failed to apply a forwarded batch locally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use metrics_model::MetricType;

    #[tokio::test]
    async fn single_node_writes_are_always_local() {
        let inner = Arc::new(MemoryStore::new(Duration::from_secs(60)));
        let store = ClusterStore::single_node(inner.clone(), "only".to_string());
        store
            .write("tenant-1", vec![MetricFamily::new("up", MetricType::Gauge)])
            .await
            .unwrap();
        assert_eq!(inner.read_all().await.len(), 1);
    }

    #[tokio::test]
    async fn find_remote_is_none_for_a_singleton_ring() {
        let inner = Arc::new(MemoryStore::new(Duration::from_secs(60)));
        let store = ClusterStore::single_node(inner, "only".to_string());
        assert_eq!(store.find_remote("any-tenant"), None);
    }
}
