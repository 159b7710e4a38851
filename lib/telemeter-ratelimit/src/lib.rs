//! A token bucket per tenant partition key: one write allowed every
//! `interval`, no burst beyond that. Buckets are created lazily and never
//! evicted — bounded in number by the set of distinct tenants a process
//! ever sees, which is an acceptable footprint for the process lifetime.

mod error;

pub use error::RateLimitError;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};

type Bucket = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

/// Per-partition token bucket store. Insertion is synchronized with a
/// single mutex; each bucket manages its own concurrency once obtained, so
/// the lock is never held across the actual rate-limit check.
pub struct PartitionRateLimiter {
    buckets: Mutex<HashMap<String, Bucket>>,
    quota: Quota,
}

impl PartitionRateLimiter {
    /// `rate = 1 per interval`, `burst = 1`.
    pub fn new(interval: Duration) -> Self {
        PartitionRateLimiter {
            buckets: Mutex::new(HashMap::new()),
            quota: Quota::with_period(interval).expect("rate limit interval must be non-zero"),
        }
    }

    /// Returns `Ok(())` and consumes one token if `partition` may write now,
    /// or `Err(WriteLimitReached)` if its bucket is empty.
    pub fn allow(&self, partition: &str) -> Result<(), RateLimitError> {
        let bucket = {
            let mut buckets = self
                .buckets
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            buckets
                .entry(partition.to_string())
                .or_insert_with(|| Arc::new(RateLimiter::direct(self.quota)))
                .clone()
        };
        bucket
            .check()
            .map_err(|_| RateLimitError::WriteLimitReached {
                partition: partition.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_the_first_write_then_rejects_the_second() {
        let limiter = PartitionRateLimiter::new(Duration::from_secs(60));
        assert!(limiter.allow("tenant-a").is_ok());
        assert_eq!(
            limiter.allow("tenant-a"),
            Err(RateLimitError::WriteLimitReached {
                partition: "tenant-a".to_string()
            })
        );
    }

    #[test]
    fn tracks_partitions_independently() {
        let limiter = PartitionRateLimiter::new(Duration::from_secs(60));
        assert!(limiter.allow("tenant-a").is_ok());
        assert!(limiter.allow("tenant-b").is_ok());
    }
}
