//! Persisted export sub-state.

use crate::core::error::StoreResult;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque handle returned by the engine when an export is requested.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExportToken(pub String);

impl ExportToken {
    /// Creates an export token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the token as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExportToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where an export currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportPhase {
    /// The export was requested and a token obtained.
    Requested,
    /// The export status is being polled.
    Polling,
    /// The engine reported the export ready.
    Ready,
    /// The export content is being downloaded.
    Downloading,
}

impl ExportPhase {
    /// Returns `true` once the engine has reported the export ready.
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready | Self::Downloading)
    }
}

/// Export progress stored on the scan record between attempts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportProgress {
    /// Token identifying the export on the engine.
    pub token: ExportToken,
    /// Current phase.
    pub phase: ExportPhase,
    /// Status polls performed so far, across all attempts.
    pub attempts: u32,
    /// When the export was requested.
    pub requested_at: DateTime<Utc>,
    /// When this progress was last written.
    pub updated_at: DateTime<Utc>,
}

impl ExportProgress {
    /// Progress for a freshly requested export.
    pub fn requested(token: ExportToken) -> Self {
        let now = Utc::now();
        Self {
            token,
            phase: ExportPhase::Requested,
            attempts: 0,
            requested_at: now,
            updated_at: now,
        }
    }

    /// Moves to `phase`, stamping the update time.
    pub fn advance(&mut self, phase: ExportPhase) {
        self.phase = phase;
        self.updated_at = Utc::now();
    }
}

/// Sink through which an export driver persists its progress.
///
/// `None` clears the stored progress.
#[async_trait]
pub trait ExportCheckpoint: Send + Sync + fmt::Debug {
    /// Stores (or clears) the export progress.
    async fn save(&self, progress: Option<&ExportProgress>) -> StoreResult<()>;
}

/// A checkpoint that stores nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCheckpoint;

#[async_trait]
impl ExportCheckpoint for NoopCheckpoint {
    async fn save(&self, _progress: Option<&ExportProgress>) -> StoreResult<()> {
        Ok(())
    }
}
