//! Record and artifact storage.
//!
//! The state machine persists through two seams:
//!
//! - [`RecordStore`] holds scanner and scan records
//! - [`BlobStore`] holds retrieved result artifacts
//!
//! In-memory implementations of both are provided for tests and embedded
//! use, plus a filesystem artifact store with a JSON metadata sidecar and a
//! BLAKE3 integrity check on every load.

pub mod filesystem;
pub mod memory;
pub mod traits;

pub use filesystem::{ArtifactMeta, FilesystemBlobStore};
pub use memory::{MemoryBlobStore, MemoryRecordStore};
pub use traits::{BlobStore, RecordStore};

use std::sync::Arc;

/// An arc-wrapped record store for shared ownership.
pub type ArcRecordStore = Arc<dyn RecordStore>;

/// An arc-wrapped blob store for shared ownership.
pub type ArcBlobStore = Arc<dyn BlobStore>;
