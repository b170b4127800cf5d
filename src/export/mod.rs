//! Multi-phase asynchronous result retrieval.
//!
//! Some engines cannot return an artifact from a single call. They are asked
//! for an export, polled by token until the export is ready, and then the
//! content is downloaded. The progress of that exchange is persisted on the
//! scan record so that a suspended wait resumes on the same token.

pub mod retriever;
pub mod session;

pub use retriever::{ExportApi, ExportFormat, ExportRetriever, ExportStatus};
pub use session::{ExportCheckpoint, ExportPhase, ExportProgress, ExportToken, NoopCheckpoint};
