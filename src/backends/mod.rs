//! Scanning backend implementations.
//!
//! This module contains implementations of the `Backend` trait for the
//! supported scanning engines, and the registry that maps backend kinds to
//! them.
//!
//! ## Available Backends
//!
//! - [`mock`] - A scripted backend for testing
//! - [`nessus`] - Nessus REST API with CSV export (requires `nessus` feature)
//! - [`burp`] - Burp Suite REST API (requires `burp` feature)
//!
//! ## Implementing a Custom Backend
//!
//! Implement the `Backend` trait and register a descriptor for it:
//!
//! ```rust,ignore
//! use scanpilot::backends::{BackendDescriptor, BackendRegistry};
//! use std::sync::Arc;
//!
//! let registry = BackendRegistry::builder()
//!     .with_builtin()
//!     .register(BackendDescriptor::new("openvas", "OpenVAS", |record, http| {
//!         Ok(Arc::new(OpenVasBackend::from_record(record, http)?) as _)
//!     }))
//!     .build();
//! ```

pub mod mock;
pub mod registry;

#[cfg(any(feature = "nessus", feature = "burp"))]
mod http;

#[cfg(feature = "nessus")]
pub mod nessus;

#[cfg(feature = "burp")]
pub mod burp;

// Re-exports
pub use mock::{MockBackend, MockExportApi};
pub use registry::{BackendDescriptor, BackendFactory, BackendRegistry, BackendRegistryBuilder};

#[cfg(feature = "nessus")]
pub use nessus::{NessusBackend, NessusConfig};

#[cfg(feature = "burp")]
pub use burp::{BurpBackend, BurpConfig};
