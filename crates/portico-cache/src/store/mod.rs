//! Partition store owned by the proxy.
//!
//! Partitions are keyed by name and created lazily on first write, sized by
//! the rule that owns them. A store may be backed by a directory, in which
//! case partitions are persisted per install revision:
//!
//! ```text
//! {root}/{revision}/
//!   google-fonts-cache.json
//!   images-cache.json
//!   api-cache.json
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::ProxyResult;
use crate::rule::CacheRule;
use crate::types::{ProxyResponse, StoredResponse};

mod partition;
mod persist;

pub use partition::{CachePartition, PartitionStats};
pub use persist::{PartitionSnapshot, SnapshotEntry};

/// On-disk location of a persistent store.
#[derive(Debug, Clone)]
struct Backing {
    root: PathBuf,
    revision: String,
}

impl Backing {
    fn revision_dir(&self) -> PathBuf {
        self.root.join(&self.revision)
    }
}

/// Owner of every cache partition.
#[derive(Debug)]
pub struct CacheStore {
    partitions: RwLock<HashMap<String, Arc<CachePartition>>>,
    clock: Arc<dyn Clock>,
    backing: Option<Backing>,
}

impl CacheStore {
    /// Store without persistence, on the system clock.
    pub fn in_memory() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Store without persistence on a custom clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            partitions: RwLock::new(HashMap::new()),
            clock,
            backing: None,
        }
    }

    /// Open a persistent store for install `revision` under `root`.
    ///
    /// Partitions persisted by other revisions are superseded and removed.
    /// Partitions persisted by this revision are restored in LRU order and
    /// adopt the limits of the first rule that uses them. Snapshots that
    /// cannot be restored are skipped.
    pub async fn open(
        root: impl Into<PathBuf>,
        revision: &str,
        clock: Arc<dyn Clock>,
    ) -> ProxyResult<Self> {
        let backing = Backing {
            root: root.into(),
            revision: persist::encode_component(revision),
        };

        let removed = persist::remove_superseded(&backing.root, &backing.revision).await?;
        if removed > 0 {
            info!(revision = %backing.revision, removed, "discarded superseded cache revisions");
        }

        let mut partitions = HashMap::new();
        for snapshot in persist::load_snapshots(&backing.revision_dir()).await? {
            let name = snapshot.name.clone();
            match snapshot.restore().await {
                Ok(partition) => {
                    partitions.insert(name, Arc::new(partition));
                }
                Err(e) => {
                    warn!(partition = %name, error = %e, "invalid partition snapshot skipped");
                }
            }
        }
        debug!(
            revision = %backing.revision,
            partitions = partitions.len(),
            "opened cache store"
        );

        Ok(Self {
            partitions: RwLock::new(partitions),
            clock,
            backing: Some(backing),
        })
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Directory this store persists to, if any.
    pub fn revision_dir(&self) -> Option<PathBuf> {
        self.backing.as_ref().map(Backing::revision_dir)
    }

    /// Existing partition by name.
    pub async fn partition(&self, name: &str) -> Option<Arc<CachePartition>> {
        self.partitions.read().await.get(name).cloned()
    }

    /// Fresh entry for `key` in the rule's partition.
    ///
    /// Never creates a partition.
    pub async fn lookup(&self, rule: &CacheRule, key: &str) -> Option<StoredResponse> {
        let partition = self.partition(&rule.cache_name).await?;
        if let Err(e) = conform(&partition, rule).await {
            warn!(partition = %rule.cache_name, error = %e, "partition limits not applied");
        }
        partition.get_fresh(key, self.clock.now()).await
    }

    /// Store `response` under `key` in the rule's partition, creating the
    /// partition on first write. Returns the evicted key, if any.
    pub async fn insert(
        &self,
        rule: &CacheRule,
        key: &str,
        response: ProxyResponse,
    ) -> ProxyResult<Option<String>> {
        let partition = self.partition_for(rule).await?;
        let entry = StoredResponse {
            response,
            stored_at: self.clock.now(),
        };
        Ok(partition.put(key, entry).await)
    }

    async fn partition_for(&self, rule: &CacheRule) -> ProxyResult<Arc<CachePartition>> {
        if let Some(partition) = self.partition(&rule.cache_name).await {
            conform(&partition, rule).await?;
            return Ok(partition);
        }

        let mut partitions = self.partitions.write().await;
        if let Some(partition) = partitions.get(&rule.cache_name) {
            conform(partition, rule).await?;
            return Ok(Arc::clone(partition));
        }

        let partition = Arc::new(CachePartition::new(
            rule.cache_name.clone(),
            rule.max_entries,
            rule.max_age(),
        )?);
        partitions.insert(rule.cache_name.clone(), Arc::clone(&partition));
        debug!(partition = %rule.cache_name, max_entries = rule.max_entries, "created partition");

        Ok(partition)
    }

    /// Names of partitions created so far, sorted.
    pub async fn partition_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.partitions.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Stats for every partition, sorted by name.
    pub async fn stats(&self) -> Vec<(String, PartitionStats)> {
        let partitions = self.all_partitions().await;
        let mut result = Vec::with_capacity(partitions.len());
        for partition in partitions {
            result.push((partition.name().to_string(), partition.stats().await));
        }
        result
    }

    /// Remove every expired entry in every partition.
    pub async fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let mut removed = 0;
        for partition in self.all_partitions().await {
            removed += partition.sweep_expired(now).await;
        }
        if removed > 0 {
            debug!(removed, "swept expired entries");
        }
        removed
    }

    /// Write every partition to disk. No-op for in-memory stores.
    pub async fn flush(&self) -> ProxyResult<()> {
        let Some(backing) = &self.backing else {
            return Ok(());
        };

        let dir = backing.revision_dir();
        for partition in self.all_partitions().await {
            let snapshot = PartitionSnapshot::capture(&partition).await;
            persist::write_snapshot(&dir, &snapshot).await?;
        }
        debug!(dir = %dir.display(), "flushed cache store");
        Ok(())
    }

    /// Drop every partition, in memory and on disk.
    pub async fn clear(&self) -> ProxyResult<()> {
        self.partitions.write().await.clear();
        if let Some(backing) = &self.backing {
            persist::remove_dir(&backing.revision_dir()).await?;
        }
        Ok(())
    }

    async fn all_partitions(&self) -> Vec<Arc<CachePartition>> {
        let partitions = self.partitions.read().await;
        let mut all: Vec<Arc<CachePartition>> = partitions.values().cloned().collect();
        all.sort_by(|a, b| a.name().cmp(b.name()));
        all
    }
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

/// Apply the rule's limits to a partition restored under different ones.
async fn conform(partition: &CachePartition, rule: &CacheRule) -> ProxyResult<()> {
    let dropped = partition
        .set_limits(rule.max_entries, rule.max_age())
        .await?;
    if dropped > 0 {
        info!(partition = %rule.cache_name, dropped, "partition shrunk to rule limits");
    }
    Ok(())
}

/// Path of the persisted file for `partition` under `revision_dir`.
pub fn snapshot_path(revision_dir: &Path, partition: &str) -> PathBuf {
    persist::snapshot_path_impl(revision_dir, partition)
}
