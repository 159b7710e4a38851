use std::net::SocketAddr;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// A cluster member's identity: a stable name plus the gossip address it's
/// reachable at. `incarnation` lets a restarted process with the same name
/// supersede its own stale membership record, per SWIM's identity model
/// (`foca::Identity::win`/`renew`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub name: String,
    pub addr: SocketAddr,
    pub incarnation: u32,
}

impl Member {
    pub fn new(name: String, addr: SocketAddr) -> Self {
        Member {
            name,
            addr,
            incarnation: 0,
        }
    }

    /// `hostname` with a random 4-hex-digit suffix, used when no explicit
    /// member name is configured.
    pub fn generated_name() -> String {
        let host = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "telemeter".to_string());
        let suffix: u16 = rand::rng().random();
        format!("{host}-{suffix:04x}")
    }
}

impl foca::Identity for Member {
    /// Foca calls this to decide whether a gossiped identity update is
    /// actually this same member rebooted (same name/addr) rather than an
    /// unrelated member, in which case it should be allowed to take over
    /// the old incarnation rather than being treated as a conflicting peer.
    fn has_same_prefix(&self, other: &Self) -> bool {
        self.name == other.name && self.addr == other.addr
    }

    /// Bumps the incarnation so a restarted node's fresh announcement wins
    /// over any stale record still circulating in the gossip set.
    fn renew(&self) -> Option<Self> {
        Some(Member {
            name: self.name.clone(),
            addr: self.addr,
            incarnation: self.incarnation.wrapping_add(1),
        })
    }
}

/// One row of the `/debug/cluster` member listing.
#[derive(Debug, Clone, Serialize)]
pub struct MemberInfo {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Addr")]
    pub addr: String,
}

/// The point-in-time view `/debug/cluster` renders, published by the
/// gossip actor on every membership change so the HTTP handler never has
/// to round-trip through the actor's command channel.
#[derive(Debug, Clone, Serialize)]
pub struct MembershipSnapshot {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "ProtocolVersion")]
    pub protocol_version: u32,
    #[serde(rename = "Members")]
    pub members: Vec<MemberInfo>,
}

impl MembershipSnapshot {
    pub fn single_node(name: String) -> Self {
        MembershipSnapshot {
            protocol_version: 1,
            members: vec![],
            name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renew_bumps_the_incarnation() {
        let member = Member::new("a".to_string(), "127.0.0.1:7980".parse().unwrap());
        let renewed = member.renew().unwrap();
        assert_eq!(renewed.incarnation, 1);
        assert_eq!(renewed.name, member.name);
    }

    #[test]
    fn has_same_prefix_matches_on_name_and_addr_only() {
        let a = Member::new("a".to_string(), "127.0.0.1:7980".parse().unwrap());
        let b = Member {
            incarnation: 5,
            ..a.clone()
        };
        assert!(foca::Identity::has_same_prefix(&a, &b));
    }
}
