//! The scan state machine.
//!
//! Every transition follows the same discipline: load the record, check the
//! guard, persist the mutex status, call the backend, reload the record and
//! apply the outcome only if nobody else moved it in the meantime.

mod guards;
mod machine;

pub use guards::Guards;
pub use machine::{ScanLifecycle, StoreCheckpoint};

use crate::core::types::ScanStatus;

/// Result of invoking a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The status moved.
    Applied {
        /// Status before the action.
        from: ScanStatus,
        /// Status after the action.
        to: ScanStatus,
    },
    /// The action ran but the status stays (a poll saw a running job).
    Unchanged {
        /// The current status.
        status: ScanStatus,
    },
    /// The guard failed; nothing was done.
    Rejected {
        /// Status the guard was checked against.
        status: ScanStatus,
    },
    /// The remote call completed but the record had moved on, so the
    /// outcome was discarded.
    Superseded {
        /// Status this execution expected to find.
        expected: ScanStatus,
        /// Status actually found.
        found: ScanStatus,
    },
}

impl Transition {
    /// Returns `true` if the status moved.
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }

    /// Returns `true` if the guard failed.
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }

    /// Returns the status the record was left in, as far as this execution
    /// knows.
    pub fn status(&self) -> ScanStatus {
        match *self {
            Self::Applied { to, .. } => to,
            Self::Unchanged { status } | Self::Rejected { status } => status,
            Self::Superseded { found, .. } => found,
        }
    }
}
