//! Store trait definitions.

use crate::core::error::StoreResult;
use crate::core::record::{ResultRef, ScanRecord, ScannerRecord};
use crate::core::types::{ScanId, ScannerId};

use async_trait::async_trait;
use std::fmt::Debug;

/// Persistent storage of scanner and scan records.
///
/// The store is the single source of truth for scan status. It offers no
/// transactions; the state machine reads a record immediately before acting
/// and writes it immediately after.
///
/// # Example Implementation
///
/// ```rust,ignore
/// use scanpilot::store::RecordStore;
/// use async_trait::async_trait;
///
/// #[derive(Debug)]
/// struct PgStore { pool: sqlx::PgPool }
///
/// #[async_trait]
/// impl RecordStore for PgStore {
///     async fn get_scan(&self, id: &ScanId) -> StoreResult<ScanRecord> {
///         // SELECT ... WHERE id = $1, mapping "no rows" to StoreError::NotFound
///         todo!()
///     }
///     // ...
/// }
/// ```
#[async_trait]
pub trait RecordStore: Send + Sync + Debug {
    /// Loads a scanner record.
    ///
    /// Returns `StoreError::NotFound` if it does not exist.
    async fn get_scanner(&self, id: &ScannerId) -> StoreResult<ScannerRecord>;

    /// Loads a scan record.
    ///
    /// Returns `StoreError::NotFound` if it does not exist.
    async fn get_scan(&self, id: &ScanId) -> StoreResult<ScanRecord>;

    /// Inserts or replaces a scanner record.
    ///
    /// Fails with `StoreError::Conflict` if another scanner has the same name.
    async fn save_scanner(&self, record: &ScannerRecord) -> StoreResult<()>;

    /// Inserts or replaces a scan record.
    ///
    /// Fails with `StoreError::Conflict` if another scan has the same name,
    /// and with `StoreError::MissingOwner` if its scanner does not exist.
    async fn save_scan(&self, record: &ScanRecord) -> StoreResult<()>;

    /// Deletes a scanner and every scan it owns.
    ///
    /// # Returns
    ///
    /// The removed scans, so their artifacts can be cleaned up.
    async fn delete_scanner(&self, id: &ScannerId) -> StoreResult<Vec<ScanRecord>>;

    /// Deletes a scan.
    ///
    /// # Returns
    ///
    /// The removed record.
    async fn delete_scan(&self, id: &ScanId) -> StoreResult<ScanRecord>;

    /// Lists every scanner, oldest first.
    async fn list_scanners(&self) -> StoreResult<Vec<ScannerRecord>>;

    /// Lists the scans owned by `owner`, oldest first.
    async fn scans_for(&self, owner: &ScannerId) -> StoreResult<Vec<ScanRecord>>;
}

/// Storage of retrieved result artifacts.
#[async_trait]
pub trait BlobStore: Send + Sync + Debug {
    /// Stores the artifact of `scan_id`, replacing any earlier one.
    async fn save(&self, scan_id: &ScanId, bytes: &[u8]) -> StoreResult<ResultRef>;

    /// Loads an artifact, verifying its digest.
    async fn load(&self, result: &ResultRef) -> StoreResult<Vec<u8>>;

    /// Deletes an artifact. Deleting a missing artifact is not an error.
    async fn delete(&self, result: &ResultRef) -> StoreResult<()>;
}

/// Builds a [`ResultRef`] for `bytes` stored under `key`.
pub(crate) fn result_ref(key: String, bytes: &[u8]) -> ResultRef {
    ResultRef {
        key,
        size: bytes.len() as u64,
        blake3: blake3::hash(bytes).to_hex().to_string(),
    }
}

/// Derives a filename-safe blob key from a scan id.
///
/// ASCII alphanumerics and `-` are kept, every other byte becomes `_` plus
/// two hex digits, so distinct ids never share a key.
pub(crate) fn blob_key(scan_id: &ScanId) -> String {
    let mut key = String::with_capacity(scan_id.as_str().len());
    for b in scan_id.as_str().bytes() {
        if b.is_ascii_alphanumeric() || b == b'-' {
            key.push(char::from(b));
        } else {
            key.push_str(&format!("_{b:02x}"));
        }
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_ref_digest() {
        let r = result_ref("k".into(), b"RESULT_CSV");
        assert_eq!(r.size, 10);
        assert_eq!(r.blake3, blake3::hash(b"RESULT_CSV").to_hex().to_string());
        assert_eq!(r.blake3.len(), 64);
    }

    #[test]
    fn test_blob_key_is_filename_safe() {
        assert_eq!(blob_key(&ScanId::from("../etc/passwd")), "_2e_2e_2fetc_2fpasswd");
        let id = ScanId::new();
        assert_eq!(blob_key(&id), id.as_str());
    }

    #[test]
    fn test_blob_keys_of_distinct_ids_differ() {
        let keys: std::collections::HashSet<String> = ["a.b", "a_b", "a/b", "a_2eb", "ab"]
            .into_iter()
            .map(|id| blob_key(&ScanId::from(id)))
            .collect();
        assert_eq!(keys.len(), 5);
        assert_eq!(blob_key(&ScanId::from("a_b")), "a_5fb");
    }
}
