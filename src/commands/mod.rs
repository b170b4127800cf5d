//! Manual commands.
//!
//! Users act on scans one at a time through [`CommandService::submit`] or
//! in bulk through [`CommandService::batch`]. Commands skip the automation
//! flags but not the guards: each is checked against the persisted status
//! before it is queued, and again when it runs.

mod service;

pub use service::CommandService;

use crate::core::error::CommandError;
use crate::core::types::Action;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Two-letter batch command codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandCode {
    /// Create the remote job.
    #[serde(rename = "CR")]
    Create,
    /// Launch the remote job.
    #[serde(rename = "ST")]
    Start,
    /// Pause the remote job.
    #[serde(rename = "PS")]
    Pause,
    /// Resume the remote job.
    #[serde(rename = "RS")]
    Resume,
    /// Stop the remote job.
    #[serde(rename = "SP")]
    Stop,
    /// Fetch the result artifact.
    #[serde(rename = "RT")]
    Retrieve,
    /// Delete the record.
    #[serde(rename = "DL")]
    Delete,
}

impl CommandCode {
    /// Returns the two-letter code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Create => "CR",
            Self::Start => "ST",
            Self::Pause => "PS",
            Self::Resume => "RS",
            Self::Stop => "SP",
            Self::Retrieve => "RT",
            Self::Delete => "DL",
        }
    }

    /// Returns the lifecycle action, or `None` for delete.
    pub fn action(&self) -> Option<Action> {
        match self {
            Self::Create => Some(Action::Create),
            Self::Start => Some(Action::Start),
            Self::Pause => Some(Action::Pause),
            Self::Resume => Some(Action::Resume),
            Self::Stop => Some(Action::Stop),
            Self::Retrieve => Some(Action::Retrieve),
            Self::Delete => None,
        }
    }
}

impl fmt::Display for CommandCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for CommandCode {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CR" => Ok(Self::Create),
            "ST" => Ok(Self::Start),
            "PS" => Ok(Self::Pause),
            "RS" => Ok(Self::Resume),
            "SP" => Ok(Self::Stop),
            "RT" => Ok(Self::Retrieve),
            "DL" => Ok(Self::Delete),
            other => Err(CommandError::UnknownCommand(other.to_string())),
        }
    }
}

/// What a batch command's ids refer to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    /// Scan records.
    Scan,
    /// Scanner records.
    Scanner,
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scan => f.write_str("scan"),
            Self::Scanner => f.write_str("scanner"),
        }
    }
}

impl FromStr for TargetType {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scan" => Ok(Self::Scan),
            "scanner" => Ok(Self::Scanner),
            other => Err(CommandError::UnknownTarget(other.to_string())),
        }
    }
}

/// Per-id outcome of a batch command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    /// The command.
    pub command: CommandCode,
    /// What the ids referred to.
    pub target: TargetType,
    /// Ids the command was accepted for.
    pub succeeded: Vec<String>,
    /// Ids that exist but the command could not apply to.
    pub unsuccessful: Vec<String>,
    /// Ids with no record.
    pub missing: Vec<String>,
}

impl BatchReport {
    fn new(command: CommandCode, target: TargetType) -> Self {
        Self {
            command,
            target,
            succeeded: Vec::new(),
            unsuccessful: Vec::new(),
            missing: Vec::new(),
        }
    }

    /// Returns true if every id succeeded.
    pub fn all_succeeded(&self) -> bool {
        self.unsuccessful.is_empty() && self.missing.is_empty()
    }
}
