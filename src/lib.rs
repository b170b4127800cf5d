//! # Scanpilot
//!
//! Drives vulnerability scans on remote engines through their lifecycle,
//! with pluggable backends, a periodic automation sweep and structured
//! audit logging.
//!
//! ## Overview
//!
//! Scanpilot keeps a persisted record for every scan and moves it through a
//! fixed set of statuses by calling the engine's API:
//!
//! - Register scanners (a configured connection to one engine) and scans
//! - Let the sweep create, start, poll and retrieve scans automatically
//! - Issue manual commands, one at a time or in batches
//! - Collect result artifacts once they are retrieved
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use scanpilot::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let orchestrator = Orchestrator::builder()
//!         .with_config(AutomationConfig::from_file("scanpilot.toml")?)
//!         .build()?;
//!
//!     let scanner = ScannerRecord::new("lab nessus", "nessus")
//!         .with_setting("api_url", "https://nessus.lab:8834")
//!         .with_setting("access_key", "...")
//!         .with_setting("secret_key", "...");
//!     let scanner_id = orchestrator.register_scanner(scanner).await?;
//!
//!     let scan = ScanRecord::new(scanner_id, "weekly", "10.0.0.0/24")
//!         .with_automation(AutomationFlags::all());
//!     let scan_id = orchestrator.add_scan(scan).await?;
//!
//!     let running = orchestrator.start();
//!     // ... the sweep drives the scan to RETRIEVED ...
//!     running.shutdown().await;
//!
//!     let csv = orchestrator.scan_result(&scan_id).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `default` - Includes both HTTP backends
//! - `nessus` - Tenable Nessus backend
//! - `burp` - Burp Suite Enterprise backend
//!
//! ## Architecture
//!
//! - **Core**: Records, statuses, the backend trait and error handling
//! - **Backends**: Engine integrations and the registry that builds them
//! - **Export**: Resumable request/poll/download retrieval
//! - **Lifecycle**: Guards and transition functions
//! - **Store**: Record and artifact persistence
//! - **Dispatch**: Task queue and worker pool
//! - **Automation**: The periodic sweep
//! - **Commands**: Manual and batch commands
//! - **Orchestrator**: The facade tying it together
//! - **Audit**: Structured logging of transitions and commands

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod audit;
pub mod automation;
pub mod backends;
pub mod commands;
pub mod config;
pub mod core;
pub mod dispatch;
pub mod export;
pub mod lifecycle;
pub mod orchestrator;
pub mod store;

// Re-export commonly used types at the crate root
pub use crate::core::{
    Action, AutomationFlags, Backend, BackendError, Capabilities, CommandError, ConfigError,
    LifecycleError, ScanId, ScanRecord, ScanStatus, ScannerId, ScannerRecord, StoreError, Trigger,
};

pub use crate::backends::{BackendDescriptor, BackendRegistry};
pub use crate::commands::{BatchReport, CommandCode, CommandService, TargetType};
pub use crate::config::AutomationConfig;
pub use crate::lifecycle::{ScanLifecycle, Transition};
pub use crate::orchestrator::{Orchestrator, RunningOrchestrator};

/// Prelude module for convenient imports.
///
/// ```rust
/// use scanpilot::prelude::*;
/// ```
pub mod prelude {
    pub use crate::core::{
        Action, AutomationFlags, Backend, BackendError, Capabilities, CommandError, ConfigError,
        JobHandle, JobPoll, JobRequest, LifecycleError, RetrievalContext, RetrieveOutcome, ScanId,
        ScanRecord, ScanStatus, ScannerId, ScannerRecord, StoreError, Trigger,
    };
    pub use crate::backends::{BackendDescriptor, BackendRegistry, MockBackend};
    pub use crate::commands::{BatchReport, CommandCode, CommandService, TargetType};
    pub use crate::config::{AutomationConfig, ExportConfig, HttpSettings};
    pub use crate::lifecycle::{ScanLifecycle, Transition};
    pub use crate::orchestrator::{Orchestrator, RunningOrchestrator};
    pub use crate::store::{BlobStore, FilesystemBlobStore, MemoryBlobStore, MemoryRecordStore, RecordStore};
}
