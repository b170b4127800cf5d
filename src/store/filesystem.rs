//! Filesystem-based artifact storage.

use crate::core::error::{StoreError, StoreResult};
use crate::core::record::ResultRef;
use crate::core::types::ScanId;
use crate::store::traits::{blob_key, result_ref, BlobStore};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{PoisonError, RwLock};

/// Sidecar metadata written next to each artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactMeta {
    /// Scan the artifact belongs to.
    pub scan_id: ScanId,
    /// Reference handed to the record store.
    pub result: ResultRef,
    /// When the artifact was written.
    pub stored_at: DateTime<Utc>,
}

/// Filesystem-based artifact storage.
///
/// # Directory Structure
///
/// ```text
/// results/
/// ├── data/
/// │   └── {key}.result        # Artifact bytes
/// └── meta/
///     └── {key}.json          # ArtifactMeta
/// ```
#[derive(Debug)]
pub struct FilesystemBlobStore {
    base_path: PathBuf,
    index: RwLock<HashMap<String, ArtifactMeta>>,
}

impl FilesystemBlobStore {
    /// Opens a store at `base_path`, creating the directories if needed and
    /// loading any existing metadata.
    pub fn new(base_path: impl Into<PathBuf>) -> StoreResult<Self> {
        let base_path = base_path.into();
        std::fs::create_dir_all(base_path.join("data"))?;
        std::fs::create_dir_all(base_path.join("meta"))?;

        let store = Self {
            base_path,
            index: RwLock::new(HashMap::new()),
        };
        store.load_index()?;
        Ok(store)
    }

    /// Returns the artifact directory.
    pub fn data_dir(&self) -> PathBuf {
        self.base_path.join("data")
    }

    /// Returns the metadata directory.
    pub fn meta_dir(&self) -> PathBuf {
        self.base_path.join("meta")
    }

    fn data_path(&self, key: &str) -> PathBuf {
        self.data_dir().join(format!("{key}.result"))
    }

    fn meta_path(&self, key: &str) -> PathBuf {
        self.meta_dir().join(format!("{key}.json"))
    }

    /// Returns the metadata of every stored artifact.
    pub fn list(&self) -> Vec<ArtifactMeta> {
        let mut metas: Vec<_> = self
            .index
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        metas.sort_by(|a, b| b.stored_at.cmp(&a.stored_at));
        metas
    }

    fn load_index(&self) -> StoreResult<()> {
        let mut index = self.index.write().unwrap_or_else(PoisonError::into_inner);
        for entry in std::fs::read_dir(self.meta_dir())?.filter_map(Result::ok) {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            let parsed = std::fs::read_to_string(&path)
                .ok()
                .and_then(|content| serde_json::from_str::<ArtifactMeta>(&content).ok());
            match parsed {
                Some(meta) => {
                    index.insert(meta.result.key.clone(), meta);
                }
                None => tracing::warn!(path = %path.display(), "Skipping unreadable artifact metadata"),
            }
        }
        tracing::debug!(count = index.len(), "Loaded artifact index");
        Ok(())
    }
}

#[async_trait]
impl BlobStore for FilesystemBlobStore {
    async fn save(&self, scan_id: &ScanId, bytes: &[u8]) -> StoreResult<ResultRef> {
        let result = result_ref(blob_key(scan_id), bytes);
        let meta = ArtifactMeta {
            scan_id: scan_id.clone(),
            result: result.clone(),
            stored_at: Utc::now(),
        };
        let content = serde_json::to_string_pretty(&meta).map_err(|e| StoreError::Serialization {
            message: e.to_string(),
        })?;

        tokio::fs::write(self.data_path(&result.key), bytes).await?;
        tokio::fs::write(self.meta_path(&result.key), content).await?;

        self.index
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(result.key.clone(), meta);

        tracing::info!(
            scan_id = %scan_id,
            key = %result.key,
            size = result.size,
            "Artifact stored"
        );
        Ok(result)
    }

    async fn load(&self, result: &ResultRef) -> StoreResult<Vec<u8>> {
        let data = match tokio::fs::read(self.data_path(&result.key)).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound {
                    kind: "artifact",
                    id: result.key.clone(),
                })
            }
            Err(e) => return Err(e.into()),
        };

        let actual = blake3::hash(&data).to_hex().to_string();
        if actual != result.blake3 {
            return Err(StoreError::IntegrityCheckFailed {
                expected: result.blake3.clone(),
                actual,
            });
        }
        Ok(data)
    }

    async fn delete(&self, result: &ResultRef) -> StoreResult<()> {
        self.index
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&result.key);

        for path in [self.data_path(&result.key), self.meta_path(&result.key)] {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        tracing::info!(key = %result.key, "Artifact deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_filesystem_store_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let store = FilesystemBlobStore::new(temp_dir.path()).unwrap();
        let scan_id = ScanId::new();

        let result = store.save(&scan_id, b"Host,Risk\n").await.unwrap();
        assert_eq!(result.size, 10);
        assert_eq!(store.load(&result).await.unwrap(), b"Host,Risk\n");
        assert!(store.data_dir().join(format!("{}.result", result.key)).exists());
        assert_eq!(store.list().len(), 1);

        store.delete(&result).await.unwrap();
        assert!(store.list().is_empty());
        assert!(store.load(&result).await.unwrap_err().is_not_found());
        // Deleting twice is fine.
        store.delete(&result).await.unwrap();
    }

    #[tokio::test]
    async fn test_index_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let scan_id = ScanId::new();
        let result = {
            let store = FilesystemBlobStore::new(temp_dir.path()).unwrap();
            store.save(&scan_id, b"payload").await.unwrap()
        };

        let reopened = FilesystemBlobStore::new(temp_dir.path()).unwrap();
        let metas = reopened.list();
        assert_eq!(metas.len(), 1);
        assert_eq!(metas[0].scan_id, scan_id);
        assert_eq!(reopened.load(&result).await.unwrap(), b"payload");
    }

    #[tokio::test]
    async fn test_tampered_artifact_fails_integrity() {
        let temp_dir = TempDir::new().unwrap();
        let store = FilesystemBlobStore::new(temp_dir.path()).unwrap();
        let result = store.save(&ScanId::new(), b"original").await.unwrap();

        std::fs::write(store.data_dir().join(format!("{}.result", result.key)), b"altered").unwrap();
        assert!(matches!(
            store.load(&result).await,
            Err(StoreError::IntegrityCheckFailed { .. })
        ));
    }
}
