use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Virtual nodes placed per member on the ring, smoothing the distribution
/// of partition keys across a small membership.
const VNODES_PER_MEMBER: u32 = 128;

/// How long a built ring is trusted before [`HashRing::stale`] reports it
/// needs rebuilding, absent any membership change in the meantime.
pub const MAX_RING_AGE: Duration = Duration::from_secs(60);

/// A consistent-hash ring over cluster member names. Lookup walks the
/// successor of a key's hash on the ring, wrapping around to the first
/// entry past the maximum hash value.
#[derive(Debug, Clone, Default)]
pub struct HashRing {
    entries: BTreeMap<u64, String>,
    members: Vec<String>,
    built_at: Option<Instant>,
}

impl HashRing {
    /// Builds a ring from scratch over `members`, sorted for determinism so
    /// two nodes that agree on membership always agree on the ring.
    pub fn build(mut members: Vec<String>) -> Self {
        members.sort();
        let mut entries = BTreeMap::new();
        for name in &members {
            for vnode in 0..VNODES_PER_MEMBER {
                let key = format!("{name}#{vnode}");
                entries.insert(telemeter_hash::fnv64a(&key), name.clone());
            }
        }
        HashRing {
            entries,
            members,
            built_at: Some(Instant::now()),
        }
    }

    /// Whether this ring was built more than [`MAX_RING_AGE`] ago, i.e.
    /// whether the caller should rebuild even absent a membership event.
    pub fn stale(&self) -> bool {
        match self.built_at {
            None => true,
            Some(at) => at.elapsed() >= MAX_RING_AGE,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn members(&self) -> &[String] {
        &self.members
    }

    /// Returns the member owning `key`, or `None` if the ring has no
    /// members at all.
    pub fn get_node(&self, key: &str) -> Option<&str> {
        if self.entries.is_empty() {
            return None;
        }
        let hash = telemeter_hash::fnv64a(key);
        self.entries
            .range(hash..)
            .next()
            .or_else(|| self.entries.iter().next())
            .map(|(_, name)| name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_key_resolves_to_the_same_member_across_repeated_lookups() {
        let ring = HashRing::build(vec!["a".into(), "b".into(), "c".into()]);
        let first = ring.get_node("tenant-1").map(str::to_owned);
        for _ in 0..10 {
            assert_eq!(ring.get_node("tenant-1").map(str::to_owned), first);
        }
    }

    #[test]
    fn an_empty_ring_resolves_nothing() {
        let ring = HashRing::build(vec![]);
        assert_eq!(ring.get_node("tenant-1"), None);
    }

    #[test]
    fn a_singleton_ring_always_resolves_to_that_member() {
        let ring = HashRing::build(vec!["only".into()]);
        assert_eq!(ring.get_node("tenant-1"), Some("only"));
        assert_eq!(ring.get_node("tenant-2"), Some("only"));
    }

    #[test]
    fn distributes_keys_across_members_reasonably() {
        let ring = HashRing::build(vec!["a".into(), "b".into(), "c".into()]);
        let mut counts = std::collections::HashMap::new();
        for i in 0..3000 {
            let owner = ring.get_node(&format!("tenant-{i}")).unwrap();
            *counts.entry(owner.to_string()).or_insert(0u32) += 1;
        }
        assert_eq!(counts.len(), 3);
        for count in counts.values() {
            assert!(*count > 500, "member got too few keys: {count}");
        }
    }
}
