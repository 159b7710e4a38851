//! Gossip-formed cluster membership, consistent-hash routing, and the
//! reliable forward transport that together let a telemeter ingestion
//! deployment spread partitions across more than one node while each
//! node still answers `/federate` from whatever it holds locally.

mod cluster_store;
mod error;
mod forward;
mod gossip;
mod membership;
mod problem;
mod protocol;
mod ring;
mod secret_codec;
mod store;

pub use cluster_store::{ClusterStore, DispatchRateLimiter};
pub use error::ClusterError;
pub use gossip::{ClusterEvent, ClusterHandle};
pub use membership::{Member, MemberInfo, MembershipSnapshot};
pub use problem::ProblemTracker;
pub use ring::HashRing;
pub use store::{DiskStore, MemoryStore, Store, StoreError};
