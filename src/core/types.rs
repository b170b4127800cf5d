//! Core types used throughout the scanpilot library.
//!
//! This module defines scan statuses, record identifiers, the backend
//! discriminant and the action vocabulary shared by the sweeper, the
//! dispatcher and the command surface.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// The lifecycle status of a scan.
///
/// Every status has its own two-letter persisted code. `Creating`,
/// `Starting` and `Retrieving` are mutex states: they are written right
/// before a remote call and replaced by the same execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScanStatus {
    /// Nothing has happened on the scanning engine yet.
    #[default]
    #[serde(rename = "NW")]
    New,
    /// Create call in flight.
    #[serde(rename = "CR")]
    Creating,
    /// Job exists on the engine but has not been launched.
    #[serde(rename = "CD")]
    Created,
    /// Launch call in flight.
    #[serde(rename = "ST")]
    Starting,
    /// Job is running; the sweeper polls it every period.
    #[serde(rename = "IP")]
    InProgress,
    /// Job is paused and can be resumed.
    #[serde(rename = "PD")]
    Paused,
    /// Job was terminated with no intention of resuming.
    #[serde(rename = "SP")]
    Stopped,
    /// Job completed; results not retrieved yet.
    #[serde(rename = "FI")]
    Finished,
    /// Retrieval in flight.
    #[serde(rename = "RG")]
    Retrieving,
    /// Result retrieved and stored.
    #[serde(rename = "RD")]
    Retrieved,
    /// A step failed. Resting state with no automatic recovery.
    #[serde(rename = "ER")]
    Errors,
}

impl ScanStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [ScanStatus; 11] = [
        Self::New,
        Self::Creating,
        Self::Created,
        Self::Starting,
        Self::InProgress,
        Self::Paused,
        Self::Stopped,
        Self::Finished,
        Self::Retrieving,
        Self::Retrieved,
        Self::Errors,
    ];

    /// Returns the persisted two-letter code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::New => "NW",
            Self::Creating => "CR",
            Self::Created => "CD",
            Self::Starting => "ST",
            Self::InProgress => "IP",
            Self::Paused => "PD",
            Self::Stopped => "SP",
            Self::Finished => "FI",
            Self::Retrieving => "RG",
            Self::Retrieved => "RD",
            Self::Errors => "ER",
        }
    }

    /// Parses a persisted two-letter code.
    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.code() == code)
    }

    /// Returns the human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::New => "New",
            Self::Creating => "Creating",
            Self::Created => "Created",
            Self::Starting => "Starting",
            Self::InProgress => "In progress",
            Self::Paused => "Paused",
            Self::Stopped => "Stopped",
            Self::Finished => "Finished",
            Self::Retrieving => "Retrieving",
            Self::Retrieved => "Retrieved",
            Self::Errors => "Error occurred",
        }
    }

    /// Returns `true` for the in-flight states.
    pub fn is_mutex(&self) -> bool {
        matches!(self, Self::Creating | Self::Starting | Self::Retrieving)
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Creates a new random id.
            pub fn new() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            /// Returns the id as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

record_id!(
    /// Unique identifier of a scanner record.
    ScannerId
);

record_id!(
    /// Unique identifier of a scan record.
    ScanId
);

/// Backend-type discriminant, e.g. `"nessus"` or `"burp_suite"`.
///
/// Kept open-ended so new integrations register without touching an enum.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BackendKind(pub String);

impl BackendKind {
    /// Creates a backend kind.
    pub fn new(kind: impl Into<String>) -> Self {
        Self(kind.into())
    }

    /// Returns the discriminant as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BackendKind {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Opaque identifier of a job on the remote engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobHandle(pub String);

impl JobHandle {
    /// Creates a job handle.
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    /// Returns the handle as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who asked for an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trigger {
    /// The periodic sweep.
    Automatic,
    /// A user or API caller.
    Manual,
}

impl Trigger {
    /// Returns `true` for sweep-dispatched actions.
    pub fn is_auto(&self) -> bool {
        matches!(self, Self::Automatic)
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Automatic => f.write_str("automatic"),
            Self::Manual => f.write_str("manual"),
        }
    }
}

/// A lifecycle action that can be dispatched for a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Create the job on the engine.
    Create,
    /// Launch a created job.
    Start,
    /// Pause a running job.
    Pause,
    /// Resume a paused job.
    Resume,
    /// Stop a running job.
    Stop,
    /// Fetch the result artifact.
    Retrieve,
    /// Query the remote job status.
    Poll,
}

impl Action {
    /// Returns the lower-case action name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Start => "start",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Stop => "stop",
            Self::Retrieve => "retrieve",
            Self::Poll => "poll",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Self::Create),
            "start" => Ok(Self::Start),
            "pause" => Ok(Self::Pause),
            "resume" => Ok(Self::Resume),
            "stop" => Ok(Self::Stop),
            "retrieve" => Ok(Self::Retrieve),
            "poll" => Ok(Self::Poll),
            other => Err(format!("unknown action '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_are_distinct() {
        let mut codes: Vec<_> = ScanStatus::ALL.iter().map(|s| s.code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), ScanStatus::ALL.len());
        assert_ne!(ScanStatus::Stopped.code(), ScanStatus::Starting.code());
    }

    #[test]
    fn test_status_code_roundtrip_and_serde() {
        for status in ScanStatus::ALL {
            assert_eq!(ScanStatus::from_code(status.code()), Some(status));
        }
        assert_eq!(ScanStatus::from_code("XX"), None);

        let json = serde_json::to_string(&ScanStatus::InProgress).unwrap();
        assert_eq!(json, "\"IP\"");
    }

    #[test]
    fn test_mutex_states() {
        let mutex: Vec<_> = ScanStatus::ALL.into_iter().filter(|s| s.is_mutex()).collect();
        assert_eq!(
            mutex,
            vec![ScanStatus::Creating, ScanStatus::Starting, ScanStatus::Retrieving]
        );
    }

    #[test]
    fn test_ids_are_unique_and_transparent() {
        let a = ScanId::new();
        let b = ScanId::new();
        assert_ne!(a, b);

        let json = serde_json::to_string(&ScannerId::from("s-1")).unwrap();
        assert_eq!(json, "\"s-1\"");
    }

    #[test]
    fn test_action_parse() {
        assert_eq!("retrieve".parse::<Action>(), Ok(Action::Retrieve));
        assert!("launch".parse::<Action>().is_err());
    }
}
