//! Core types and traits for the scanpilot library.
//!
//! This module provides the fundamental building blocks used throughout
//! the library:
//!
//! - [`types`] - Statuses, identifiers, triggers and actions
//! - [`record`] - Persisted scanner and scan records
//! - [`traits`] - The `Backend` trait and the types crossing it
//! - [`schema`] - Per-backend configuration schemas
//! - [`error`] - Structured error types

pub mod error;
pub mod record;
pub mod schema;
pub mod traits;
pub mod types;

pub use error::{
    BackendError, BackendResult, CommandError, ConfigError, DispatchError, LifecycleError,
    LifecycleResult, StoreError, StoreResult,
};
pub use record::{AutomationFlags, ResultRef, ScanRecord, ScannerRecord};
pub use schema::{ConfigField, ConfigSchema, FieldKind, Settings};
pub use traits::{
    ArcBackend, Backend, Capabilities, JobPoll, JobRequest, RetrievalContext, RetrieveOutcome,
};
pub use types::{Action, BackendKind, JobHandle, ScanId, ScanStatus, ScannerId, Trigger};
