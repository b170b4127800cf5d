//! In-memory store implementations.

use crate::core::error::{StoreError, StoreResult};
use crate::core::record::{ResultRef, ScanRecord, ScannerRecord};
use crate::core::types::{ScanId, ScannerId};
use crate::store::traits::{blob_key, result_ref, BlobStore, RecordStore};

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct Records {
    scanners: HashMap<ScannerId, ScannerRecord>,
    scans: HashMap<ScanId, ScanRecord>,
}

/// A record store held entirely in memory.
///
/// Operations take a short synchronous lock and never yield while holding
/// it, so each call is atomic with respect to the others.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: RwLock<Records>,
}

impl MemoryRecordStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of scan records.
    pub fn scan_count(&self) -> usize {
        read(&self.records).scans.len()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn get_scanner(&self, id: &ScannerId) -> StoreResult<ScannerRecord> {
        read(&self.records)
            .scanners
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::scanner_not_found(id))
    }

    async fn get_scan(&self, id: &ScanId) -> StoreResult<ScanRecord> {
        read(&self.records)
            .scans
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::scan_not_found(id))
    }

    async fn save_scanner(&self, record: &ScannerRecord) -> StoreResult<()> {
        let mut records = write(&self.records);
        if records
            .scanners
            .values()
            .any(|s| s.name == record.name && s.id != record.id)
        {
            return Err(StoreError::Conflict {
                kind: "scanner",
                name: record.name.clone(),
            });
        }
        records.scanners.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn save_scan(&self, record: &ScanRecord) -> StoreResult<()> {
        let mut records = write(&self.records);
        if !records.scanners.contains_key(&record.scanner_id) {
            return Err(StoreError::MissingOwner {
                scanner_id: record.scanner_id.to_string(),
            });
        }
        if records
            .scans
            .values()
            .any(|s| s.name == record.name && s.id != record.id)
        {
            return Err(StoreError::Conflict {
                kind: "scan",
                name: record.name.clone(),
            });
        }
        records.scans.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn delete_scanner(&self, id: &ScannerId) -> StoreResult<Vec<ScanRecord>> {
        let mut records = write(&self.records);
        if records.scanners.remove(id).is_none() {
            return Err(StoreError::scanner_not_found(id));
        }
        let owned: Vec<ScanId> = records
            .scans
            .values()
            .filter(|s| &s.scanner_id == id)
            .map(|s| s.id.clone())
            .collect();
        Ok(owned
            .iter()
            .filter_map(|scan_id| records.scans.remove(scan_id))
            .collect())
    }

    async fn delete_scan(&self, id: &ScanId) -> StoreResult<ScanRecord> {
        write(&self.records)
            .scans
            .remove(id)
            .ok_or_else(|| StoreError::scan_not_found(id))
    }

    async fn list_scanners(&self) -> StoreResult<Vec<ScannerRecord>> {
        let mut scanners: Vec<_> = read(&self.records).scanners.values().cloned().collect();
        scanners.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.name.cmp(&b.name)));
        Ok(scanners)
    }

    async fn scans_for(&self, owner: &ScannerId) -> StoreResult<Vec<ScanRecord>> {
        let mut scans: Vec<_> = read(&self.records)
            .scans
            .values()
            .filter(|s| &s.scanner_id == owner)
            .cloned()
            .collect();
        scans.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.name.cmp(&b.name)));
        Ok(scans)
    }
}

/// An artifact store held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored artifacts.
    pub fn len(&self) -> usize {
        read(&self.blobs).len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        read(&self.blobs).is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn save(&self, scan_id: &ScanId, bytes: &[u8]) -> StoreResult<ResultRef> {
        let result = result_ref(blob_key(scan_id), bytes);
        write(&self.blobs).insert(result.key.clone(), bytes.to_vec());
        Ok(result)
    }

    async fn load(&self, result: &ResultRef) -> StoreResult<Vec<u8>> {
        let bytes = read(&self.blobs)
            .get(&result.key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                kind: "artifact",
                id: result.key.clone(),
            })?;
        let actual = blake3::hash(&bytes).to_hex().to_string();
        if actual != result.blake3 {
            return Err(StoreError::IntegrityCheckFailed {
                expected: result.blake3.clone(),
                actual,
            });
        }
        Ok(bytes)
    }

    async fn delete(&self, result: &ResultRef) -> StoreResult<()> {
        write(&self.blobs).remove(&result.key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded() -> (MemoryRecordStore, ScannerRecord) {
        let store = MemoryRecordStore::new();
        let scanner = ScannerRecord::new("ns", "nessus");
        store.save_scanner(&scanner).await.unwrap();
        (store, scanner)
    }

    #[tokio::test]
    async fn test_save_and_get_scan() {
        let (store, scanner) = seeded().await;
        let scan = ScanRecord::new(scanner.id.clone(), "nightly", "10.0.0.1");
        store.save_scan(&scan).await.unwrap();

        assert_eq!(store.get_scan(&scan.id).await.unwrap(), scan);
        assert_eq!(store.scans_for(&scanner.id).await.unwrap().len(), 1);
        assert!(store.get_scan(&ScanId::new()).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_unique_names() {
        let (store, scanner) = seeded().await;
        let dup = ScannerRecord::new("ns", "burp_suite");
        assert!(matches!(
            store.save_scanner(&dup).await,
            Err(StoreError::Conflict { kind: "scanner", .. })
        ));

        let a = ScanRecord::new(scanner.id.clone(), "same", "t");
        let b = ScanRecord::new(scanner.id.clone(), "same", "t");
        store.save_scan(&a).await.unwrap();
        assert!(matches!(
            store.save_scan(&b).await,
            Err(StoreError::Conflict { kind: "scan", .. })
        ));
        // Re-saving the same record is not a conflict.
        store.save_scan(&a).await.unwrap();
    }

    #[tokio::test]
    async fn test_scan_requires_owner() {
        let store = MemoryRecordStore::new();
        let orphan = ScanRecord::new(ScannerId::new(), "orphan", "t");
        assert!(matches!(
            store.save_scan(&orphan).await,
            Err(StoreError::MissingOwner { .. })
        ));
    }

    #[tokio::test]
    async fn test_delete_scanner_cascades() {
        let (store, scanner) = seeded().await;
        let other = ScannerRecord::new("bs", "burp_suite");
        store.save_scanner(&other).await.unwrap();

        for name in ["a", "b"] {
            store
                .save_scan(&ScanRecord::new(scanner.id.clone(), name, "t"))
                .await
                .unwrap();
        }
        store
            .save_scan(&ScanRecord::new(other.id.clone(), "c", "t"))
            .await
            .unwrap();

        let removed = store.delete_scanner(&scanner.id).await.unwrap();
        assert_eq!(removed.len(), 2);
        assert_eq!(store.scan_count(), 1);
        assert_eq!(store.list_scanners().await.unwrap(), vec![other]);
        assert!(store.delete_scanner(&scanner.id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_blob_store_roundtrip_and_integrity() {
        let blobs = MemoryBlobStore::new();
        let id = ScanId::new();
        let result = blobs.save(&id, b"RESULT_CSV").await.unwrap();
        assert_eq!(blobs.load(&result).await.unwrap(), b"RESULT_CSV");

        let tampered = ResultRef {
            blake3: "0".repeat(64),
            ..result.clone()
        };
        assert!(matches!(
            blobs.load(&tampered).await,
            Err(StoreError::IntegrityCheckFailed { .. })
        ));

        blobs.delete(&result).await.unwrap();
        assert!(blobs.is_empty());
        assert!(blobs.load(&result).await.unwrap_err().is_not_found());
    }
}
