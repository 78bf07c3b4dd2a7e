//! Partition persistence: JSON snapshots with atomic replace.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, warn};

use crate::error::{ProxyError, ProxyResult};
use crate::types::StoredResponse;

use super::partition::CachePartition;

/// Serialized partition, entries ordered least to most recently used.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionSnapshot {
    pub name: String,
    pub max_entries: usize,
    pub max_age_seconds: u64,
    pub entries: Vec<SnapshotEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub key: String,

    #[serde(flatten)]
    pub stored: StoredResponse,
}

impl PartitionSnapshot {
    pub async fn capture(partition: &CachePartition) -> Self {
        let entries = partition
            .entries_lru_first()
            .await
            .into_iter()
            .map(|(key, stored)| SnapshotEntry { key, stored })
            .collect();

        Self {
            name: partition.name().to_string(),
            max_entries: partition.max_entries().await,
            max_age_seconds: partition.max_age().await.as_secs(),
            entries,
        }
    }

    /// Rebuild the partition, replaying entries so recency is preserved.
    pub async fn restore(self) -> ProxyResult<CachePartition> {
        let partition = CachePartition::new(
            self.name,
            self.max_entries,
            std::time::Duration::from_secs(self.max_age_seconds),
        )?;
        for entry in self.entries {
            partition.put(&entry.key, entry.stored).await;
        }
        Ok(partition)
    }
}

/// Encode `raw` as a single path component.
///
/// Bytes outside `[A-Za-z0-9_.-]` and a leading `.` become `%XX`, so distinct
/// names never share a file.
pub(crate) fn encode_component(raw: &str) -> String {
    if raw.is_empty() {
        return "%".to_string();
    }

    let mut encoded = String::with_capacity(raw.len());
    for (i, byte) in raw.bytes().enumerate() {
        let keep = byte.is_ascii_alphanumeric()
            || matches!(byte, b'-' | b'_')
            || (byte == b'.' && i > 0);
        if keep {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("%{:02X}", byte));
        }
    }
    encoded
}

pub(crate) fn snapshot_path_impl(revision_dir: &Path, partition: &str) -> PathBuf {
    revision_dir.join(format!("{}.json", encode_component(partition)))
}

pub(crate) async fn write_snapshot(
    revision_dir: &Path,
    snapshot: &PartitionSnapshot,
) -> ProxyResult<()> {
    fs::create_dir_all(revision_dir)
        .await
        .map_err(|e| ProxyError::Cache {
            message: format!("failed to create cache directory: {}", e),
        })?;

    let json = serde_json::to_string(snapshot).map_err(|e| ProxyError::Cache {
        message: format!("failed to serialize partition {}: {}", snapshot.name, e),
    })?;

    let path = snapshot_path_impl(revision_dir, &snapshot.name);
    write_atomic(&path, &json).await?;
    debug!(partition = %snapshot.name, entries = snapshot.entries.len(), "persisted partition");
    Ok(())
}

async fn write_atomic(path: &Path, content: &str) -> ProxyResult<()> {
    let temp_path = path.with_extension("tmp");

    fs::write(&temp_path, content)
        .await
        .map_err(|e| ProxyError::Cache {
            message: format!("failed to write temp file: {}", e),
        })?;

    fs::rename(&temp_path, path)
        .await
        .map_err(|e| ProxyError::Cache {
            message: format!("failed to rename temp file: {}", e),
        })?;

    Ok(())
}

/// Load every snapshot in `revision_dir`. Unreadable snapshots are skipped.
pub(crate) async fn load_snapshots(revision_dir: &Path) -> ProxyResult<Vec<PartitionSnapshot>> {
    let mut snapshots = Vec::new();

    if !revision_dir.exists() {
        return Ok(snapshots);
    }

    let mut dir = fs::read_dir(revision_dir)
        .await
        .map_err(|e| ProxyError::Cache {
            message: format!("failed to read cache directory: {}", e),
        })?;

    while let Some(entry) = dir.next_entry().await.map_err(|e| ProxyError::Cache {
        message: format!("failed to read directory entry: {}", e),
    })? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }

        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unreadable partition snapshot");
                continue;
            }
        };

        match serde_json::from_str::<PartitionSnapshot>(&content) {
            Ok(snapshot) => snapshots.push(snapshot),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "corrupt partition snapshot skipped");
            }
        }
    }

    snapshots.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(snapshots)
}

/// Remove revision directories under `root` other than `current`.
pub(crate) async fn remove_superseded(root: &Path, current: &str) -> ProxyResult<usize> {
    if !root.exists() {
        return Ok(0);
    }

    let mut dir = fs::read_dir(root).await.map_err(|e| ProxyError::Cache {
        message: format!("failed to read cache root: {}", e),
    })?;

    let mut removed = 0;
    while let Some(entry) = dir.next_entry().await.map_err(|e| ProxyError::Cache {
        message: format!("failed to read directory entry: {}", e),
    })? {
        let path = entry.path();
        if !path.is_dir() || entry.file_name().to_string_lossy() == current {
            continue;
        }
        remove_dir(&path).await?;
        removed += 1;
    }

    Ok(removed)
}

pub(crate) async fn remove_dir(path: &Path) -> ProxyResult<()> {
    if path.exists() {
        fs::remove_dir_all(path)
            .await
            .map_err(|e| ProxyError::Cache {
                message: format!("failed to remove {}: {}", path.display(), e),
            })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProxyResponse;
    use chrono::Utc;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_encode_component() {
        assert_eq!(encode_component("api-cache"), "api-cache");
        assert_eq!(encode_component("portico-0.3.0"), "portico-0.3.0");
        assert_eq!(encode_component("../etc/passwd"), "%2E.%2Fetc%2Fpasswd");
        assert_eq!(encode_component(".."), "%2E.");
        assert_eq!(encode_component(""), "%");
    }

    #[test]
    fn test_encode_component_keeps_names_distinct() {
        let names = ["a b", "a_b", "a%20b", "a/b", "a.b"];
        let encoded: std::collections::HashSet<String> =
            names.iter().map(|n| encode_component(n)).collect();
        assert_eq!(encoded.len(), names.len());
    }

    #[tokio::test]
    async fn test_snapshot_roundtrip_keeps_recency() {
        let temp_dir = TempDir::new().unwrap();
        let partition = CachePartition::new("images-cache", 3, Duration::from_secs(60)).unwrap();
        let now = Utc::now();
        for key in ["a", "b", "c"] {
            partition
                .put(
                    key,
                    StoredResponse {
                        response: ProxyResponse::new(200, key),
                        stored_at: now,
                    },
                )
                .await;
        }
        partition.get_fresh("a", now).await;

        let snapshot = PartitionSnapshot::capture(&partition).await;
        write_snapshot(temp_dir.path(), &snapshot).await.unwrap();

        let loaded = load_snapshots(temp_dir.path()).await.unwrap();
        assert_eq!(loaded.len(), 1);
        let restored = loaded.into_iter().next().unwrap().restore().await.unwrap();
        assert_eq!(restored.keys().await, vec!["b", "c", "a"]);
        assert_eq!(restored.max_entries().await, 3);
    }

    #[tokio::test]
    async fn test_atomic_write_leaves_no_temp_files() {
        let temp_dir = TempDir::new().unwrap();
        let partition = CachePartition::new("api-cache", 1, Duration::from_secs(60)).unwrap();
        let snapshot = PartitionSnapshot::capture(&partition).await;
        write_snapshot(temp_dir.path(), &snapshot).await.unwrap();

        let mut entries = fs::read_dir(temp_dir.path()).await.unwrap();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            let name = entry.file_name();
            assert!(!name.to_string_lossy().ends_with(".tmp"));
        }
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_skipped() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("broken.json"), "{not json")
            .await
            .unwrap();

        let loaded = load_snapshots(temp_dir.path()).await.unwrap();
        assert!(loaded.is_empty());
    }
}
