//! Error types for the scanpilot library.
//!
//! Backend faults are classified so the state machine can tell a transient
//! remote failure from a malformed response. Nothing in this crate panics on
//! these paths; every failure is returned as a `Result` value.

use crate::core::types::{ScanId, ScanStatus};

use thiserror::Error;

/// Errors raised inside a backend implementation.
///
/// These never cross the backend boundary: every `Backend` operation logs
/// them and translates them into the sentinel the state machine expects.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The request never produced a response (DNS, connect, timeout, TLS).
    #[error("transport failure talking to '{backend}': {message}")]
    Transport {
        /// Backend that was being contacted.
        backend: String,
        /// Description of the failure.
        message: String,
    },

    /// The remote answered with a non-success HTTP status.
    #[error("'{backend}' answered {status} to {operation}")]
    Status {
        /// Backend that answered.
        backend: String,
        /// HTTP status code.
        status: u16,
        /// Operation being performed (e.g. "create", "export status").
        operation: String,
    },

    /// The response was missing an expected field or could not be parsed.
    #[error("malformed response from '{backend}': {details}")]
    Protocol {
        /// Backend that answered.
        backend: String,
        /// What was wrong with the response.
        details: String,
    },

    /// The scanner record cannot be turned into a working backend.
    #[error("backend configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// The operation is only possible once the job has been created.
    #[error("scan has no backend job handle")]
    MissingJobHandle,
}

impl BackendError {
    /// Returns `true` for timeouts, network faults and non-success statuses.
    ///
    /// Poll treats these as "still running"; create/start/retrieve treat
    /// them as a failed step.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Status { .. })
    }

    /// Creates a `Transport` error.
    pub fn transport(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            backend: backend.into(),
            message: message.into(),
        }
    }

    /// Creates a `Status` error.
    pub fn status(backend: impl Into<String>, status: u16, operation: impl Into<String>) -> Self {
        Self::Status {
            backend: backend.into(),
            status,
            operation: operation.into(),
        }
    }

    /// Creates a `Protocol` error.
    pub fn protocol(backend: impl Into<String>, details: impl Into<String>) -> Self {
        Self::Protocol {
            backend: backend.into(),
            details: details.into(),
        }
    }
}

/// Errors from validating or loading configuration.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    /// A required field was absent or null.
    #[error("missing required field '{field}'")]
    MissingField {
        /// Field name.
        field: String,
    },

    /// A field had the wrong JSON type.
    #[error("field '{field}' must be {expected}")]
    InvalidType {
        /// Field name.
        field: String,
        /// Human-readable expected type.
        expected: &'static str,
    },

    /// A field is not part of the schema.
    #[error("unknown field '{field}'")]
    UnknownField {
        /// Field name.
        field: String,
    },

    /// No backend is registered for the discriminant.
    #[error("no backend registered for kind '{kind}'")]
    UnknownBackend {
        /// The unregistered discriminant.
        kind: String,
    },

    /// A configuration file could not be read or parsed.
    #[error("invalid configuration: {message}")]
    Invalid {
        /// What went wrong.
        message: String,
    },
}

impl ConfigError {
    /// Creates an `Invalid` error.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }
}

/// Errors from the record and blob stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The record does not exist (deleted, or never created).
    #[error("{kind} '{id}' not found")]
    NotFound {
        /// Record kind ("scan", "scanner", "artifact").
        kind: &'static str,
        /// The id that was looked up.
        id: String,
    },

    /// Saving would violate a unique name.
    #[error("{kind} name '{name}' is already taken")]
    Conflict {
        /// Record kind.
        kind: &'static str,
        /// The duplicated name.
        name: String,
    },

    /// A scan references a scanner that does not exist.
    #[error("scanner '{scanner_id}' does not exist")]
    MissingOwner {
        /// The dangling owner id.
        scanner_id: String,
    },

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Metadata could not be encoded or decoded.
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of the failure.
        message: String,
    },

    /// Stored artifact bytes no longer match their digest.
    #[error("artifact integrity check failed: expected {expected}, got {actual}")]
    IntegrityCheckFailed {
        /// Digest recorded at save time.
        expected: String,
        /// Digest of the bytes read back.
        actual: String,
    },
}

impl StoreError {
    /// Creates a `NotFound` error for a scan.
    pub fn scan_not_found(id: impl ToString) -> Self {
        Self::NotFound {
            kind: "scan",
            id: id.to_string(),
        }
    }

    /// Creates a `NotFound` error for a scanner.
    pub fn scanner_not_found(id: impl ToString) -> Self {
        Self::NotFound {
            kind: "scanner",
            id: id.to_string(),
        }
    }

    /// Returns `true` if the record is missing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Errors returned by the state-machine transition functions.
///
/// A failed guard is not an error; it is reported as
/// [`Transition::Rejected`](crate::lifecycle::Transition::Rejected).
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// The scan (or its scanner) disappeared before the action ran.
    #[error("record not found: {0}")]
    NotFound(StoreError),

    /// The store failed for another reason.
    #[error("store error: {0}")]
    Store(StoreError),

    /// The scanner's backend could not be instantiated.
    #[error("backend unavailable: {0}")]
    Backend(#[from] BackendError),

    /// The scanner's backend kind is not registered.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A record handed in for storage would bypass the transitions.
    #[error("{kind} '{id}' rejected: {reason}")]
    InvalidRecord {
        /// Record kind.
        kind: &'static str,
        /// The record id.
        id: String,
        /// What is wrong with it.
        reason: &'static str,
    },
}

impl From<StoreError> for LifecycleError {
    fn from(err: StoreError) -> Self {
        if err.is_not_found() {
            Self::NotFound(err)
        } else {
            Self::Store(err)
        }
    }
}

impl LifecycleError {
    pub(crate) fn invalid_record(kind: &'static str, id: impl ToString, reason: &'static str) -> Self {
        Self::InvalidRecord {
            kind,
            id: id.to_string(),
            reason,
        }
    }

    /// Returns `true` if the record was deleted between dispatch and execution.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Errors from the task dispatcher.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    /// The worker pool has shut down and no longer accepts work.
    #[error("task queue is closed")]
    Closed,
}

/// Errors from manual command submission.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The guard for the command failed against the current status.
    #[error("scan '{scan_id}' cannot {command} while {status}")]
    Rejected {
        /// Target scan.
        scan_id: ScanId,
        /// Command name.
        command: &'static str,
        /// Status observed when the guard was checked.
        status: ScanStatus,
    },

    /// The command has no meaning for the target type.
    #[error("command {command} does not apply to a {target}")]
    NotApplicable {
        /// Command code.
        command: &'static str,
        /// Target type.
        target: &'static str,
    },

    /// The command code is not one of the known codes.
    #[error("unknown command code '{0}'")]
    UnknownCommand(String),

    /// The target type is neither "scan" nor "scanner".
    #[error("unknown target type '{0}'")]
    UnknownTarget(String),

    /// Looking up or deleting records failed.
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// The task could not be enqueued.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

impl CommandError {
    /// Returns true if the target record does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Lifecycle(e) if e.is_not_found())
    }
}

impl From<StoreError> for CommandError {
    fn from(err: StoreError) -> Self {
        Self::Lifecycle(err.into())
    }
}

/// A specialized `Result` type for backend internals.
pub type BackendResult<T> = Result<T, BackendError>;

/// A specialized `Result` type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// A specialized `Result` type for transition functions.
pub type LifecycleResult<T> = Result<T, LifecycleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_is_transient() {
        assert!(BackendError::transport("nessus", "connection refused").is_transient());
        assert!(BackendError::status("nessus", 503, "poll").is_transient());
        assert!(!BackendError::protocol("nessus", "missing info.status").is_transient());
        assert!(!BackendError::MissingJobHandle.is_transient());
    }

    #[test]
    fn test_store_not_found_maps_to_lifecycle_not_found() {
        let err: LifecycleError = StoreError::scan_not_found("abc").into();
        assert!(err.is_not_found());

        let err: LifecycleError = StoreError::Conflict {
            kind: "scan",
            name: "dup".into(),
        }
        .into();
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_error_display() {
        let err = BackendError::status("burp_suite", 500, "create");
        assert_eq!(err.to_string(), "'burp_suite' answered 500 to create");

        let err = ConfigError::InvalidType {
            field: "default_policy_id".into(),
            expected: "an integer",
        };
        assert!(err.to_string().contains("default_policy_id"));
    }
}
