//! A single named partition: LRU ordering plus age-based expiry.

use std::num::NonZeroUsize;
use std::time::Duration;

use chrono::{DateTime, Utc};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{ProxyError, ProxyResult};
use crate::types::StoredResponse;

/// Counters for one partition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
}

#[derive(Debug)]
struct PartitionInner {
    entries: LruCache<String, StoredResponse>,
    max_age: Duration,
    stats: PartitionStats,
}

/// Named key-value store of the most recent response per request URL.
///
/// Every lookup, promotion, expiry and insertion runs inside one critical
/// section, so concurrent requests for the same key never observe a
/// half-applied read-modify-write.
#[derive(Debug)]
pub struct CachePartition {
    name: String,
    inner: Mutex<PartitionInner>,
}

fn capacity_for(name: &str, max_entries: usize) -> ProxyResult<NonZeroUsize> {
    NonZeroUsize::new(max_entries).ok_or_else(|| ProxyError::Cache {
        message: format!("partition '{}' needs a capacity greater than 0", name),
    })
}

impl CachePartition {
    pub fn new(name: impl Into<String>, max_entries: usize, max_age: Duration) -> ProxyResult<Self> {
        let name = name.into();
        let capacity = capacity_for(&name, max_entries)?;

        Ok(Self {
            name,
            inner: Mutex::new(PartitionInner {
                entries: LruCache::new(capacity),
                max_age,
                stats: PartitionStats::default(),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn max_entries(&self) -> usize {
        self.inner.lock().await.entries.cap().get()
    }

    pub async fn max_age(&self) -> Duration {
        self.inner.lock().await.max_age
    }

    /// Adopt new limits. Shrinking drops least recently used entries first;
    /// returns how many were dropped.
    pub async fn set_limits(&self, max_entries: usize, max_age: Duration) -> ProxyResult<usize> {
        let capacity = capacity_for(&self.name, max_entries)?;
        let mut inner = self.inner.lock().await;
        inner.max_age = max_age;

        if inner.entries.cap() == capacity {
            return Ok(0);
        }

        let before = inner.entries.len();
        inner.entries.resize(capacity);
        let dropped = before - inner.entries.len();
        inner.stats.evictions += dropped as u64;
        debug!(partition = %self.name, max_entries, dropped, "partition resized");

        Ok(dropped)
    }

    /// Fresh entry for `key`, promoted to most recently used.
    ///
    /// An expired entry is removed and reported as a miss.
    pub async fn get_fresh(&self, key: &str, now: DateTime<Utc>) -> Option<StoredResponse> {
        let mut inner = self.inner.lock().await;

        let expired = inner
            .entries
            .peek(key)
            .map(|entry| entry.is_expired(now, inner.max_age));

        let Some(expired) = expired else {
            inner.stats.misses += 1;
            return None;
        };

        if expired {
            inner.entries.pop(key);
            inner.stats.expirations += 1;
            inner.stats.misses += 1;
            debug!(partition = %self.name, key, "expired entry removed");
            return None;
        }

        let entry = inner.entries.get(key).cloned();
        inner.stats.hits += 1;
        entry
    }

    /// Store `entry` under `key`.
    ///
    /// Replacing an existing key never evicts. Inserting a new key into a
    /// full partition evicts exactly the least recently used entry, whose key
    /// is returned.
    pub async fn put(&self, key: &str, entry: StoredResponse) -> Option<String> {
        let mut inner = self.inner.lock().await;

        let evicted = match inner.entries.push(key.to_string(), entry) {
            Some((old_key, _)) if old_key != key => Some(old_key),
            _ => None,
        };

        if let Some(evicted_key) = &evicted {
            inner.stats.evictions += 1;
            debug!(partition = %self.name, evicted = %evicted_key, "capacity eviction");
        }

        evicted
    }

    /// Remove `key`; returns whether it was present.
    pub async fn remove(&self, key: &str) -> bool {
        self.inner.lock().await.entries.pop(key).is_some()
    }

    /// Remove every expired entry; returns how many were dropped.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> usize {
        let mut inner = self.inner.lock().await;

        let max_age = inner.max_age;
        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now, max_age))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            inner.entries.pop(key);
        }
        inner.stats.expirations += expired.len() as u64;

        expired.len()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Whether `key` is stored, without touching recency.
    pub async fn contains(&self, key: &str) -> bool {
        self.inner.lock().await.entries.contains(key)
    }

    /// Keys from least to most recently used.
    pub async fn keys(&self) -> Vec<String> {
        let inner = self.inner.lock().await;
        inner.entries.iter().rev().map(|(k, _)| k.clone()).collect()
    }

    pub async fn stats(&self) -> PartitionStats {
        let inner = self.inner.lock().await;
        PartitionStats {
            entries: inner.entries.len(),
            ..inner.stats
        }
    }

    /// Entries from least to most recently used.
    pub(crate) async fn entries_lru_first(&self) -> Vec<(String, StoredResponse)> {
        let inner = self.inner.lock().await;
        inner
            .entries
            .iter()
            .rev()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}
