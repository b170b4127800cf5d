//! Core traits for the scanpilot library.
//!
//! This module defines the `Backend` trait that every scanning-engine
//! integration implements, together with the request and outcome types that
//! cross the backend boundary.

use crate::core::schema::Settings;
use crate::core::types::JobHandle;
use crate::export::{ExportCheckpoint, ExportProgress, NoopCheckpoint};

use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// What a backend variant can do, as seen by the guard predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Create also launches the job; there is no separate start step.
    pub fused_create: bool,
    /// Running jobs can be paused.
    pub pause: bool,
    /// Paused jobs can be resumed.
    pub resume: bool,
    /// Running jobs can be stopped.
    pub stop: bool,
    /// A manual create may be issued again from ERRORS.
    pub recreate_from_errors: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            fused_create: false,
            pause: false,
            resume: false,
            stop: false,
            recreate_from_errors: true,
        }
    }
}

impl Capabilities {
    /// Capabilities of a backend with a distinct launch step.
    pub fn two_step() -> Self {
        Self::default()
    }

    /// Capabilities of a backend whose create also launches the job.
    pub fn fused() -> Self {
        Self {
            fused_create: true,
            ..Self::default()
        }
    }

    /// Enables pause, resume and stop.
    pub fn with_job_control(mut self) -> Self {
        self.pause = true;
        self.resume = true;
        self.stop = true;
        self
    }

    /// Sets whether a manual create is permitted from ERRORS.
    pub fn with_recreate_from_errors(mut self, allowed: bool) -> Self {
        self.recreate_from_errors = allowed;
        self
    }
}

/// Everything a backend needs to create a job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRequest {
    /// Name to give the remote job.
    pub name: String,
    /// Targets (hosts or URLs).
    pub targets: Vec<String>,
    /// Backend-specific scan options.
    pub options: Settings,
}

impl JobRequest {
    /// Creates a request with no options.
    pub fn new(name: impl Into<String>, targets: Vec<String>) -> Self {
        Self {
            name: name.into(),
            targets,
            options: Settings::new(),
        }
    }

    /// Sets the scan options.
    pub fn with_options(mut self, options: Settings) -> Self {
        self.options = options;
        self
    }

    /// Returns an integer option, if present and not null.
    pub fn option_i64(&self, key: &str) -> Option<i64> {
        self.options.get(key).and_then(|v| v.as_i64())
    }
}

/// Remote status reported by a poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPoll {
    /// The job completed.
    Done,
    /// The job is still running, or its status could not be fetched.
    Running,
    /// The job failed, or the response was malformed.
    Failed,
}

/// Result of a retrieval attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetrieveOutcome {
    /// The artifact content.
    Retrieved(Vec<u8>),
    /// The export is not ready yet and the wait was suspended.
    Pending,
    /// Retrieval failed for good.
    Failed,
}

/// Context handed to [`Backend::retrieve_job`].
///
/// Carries the export progress persisted by a previous, suspended attempt
/// and the sink through which new progress is recorded.
#[derive(Debug, Clone)]
pub struct RetrievalContext {
    /// Progress left by a suspended earlier attempt.
    pub resume: Option<ExportProgress>,
    /// Where export progress is persisted.
    pub checkpoint: Arc<dyn ExportCheckpoint>,
    /// Cancels an in-progress export wait.
    pub cancel: CancellationToken,
    /// Interval between export status polls.
    pub poll_interval: Duration,
    /// Total time one attempt may wait for the export to become ready.
    pub max_wait: Option<Duration>,
}

impl RetrievalContext {
    /// Creates a context that persists nothing and waits without a budget.
    pub fn detached() -> Self {
        Self {
            resume: None,
            checkpoint: Arc::new(NoopCheckpoint),
            cancel: CancellationToken::new(),
            poll_interval: Duration::from_secs(10),
            max_wait: None,
        }
    }

    /// Sets the progress to resume from.
    pub fn with_resume(mut self, progress: Option<ExportProgress>) -> Self {
        self.resume = progress;
        self
    }

    /// Sets the checkpoint sink.
    pub fn with_checkpoint(mut self, checkpoint: Arc<dyn ExportCheckpoint>) -> Self {
        self.checkpoint = checkpoint;
        self
    }

    /// Sets the cancellation token.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Sets the export poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the wait budget.
    pub fn with_max_wait(mut self, max_wait: Option<Duration>) -> Self {
        self.max_wait = max_wait;
        self
    }
}

/// The capability contract for one scanning-engine integration.
///
/// Each backend kind (Nessus, Burp Suite, ...) implements this trait once.
///
/// # Implementation Notes
///
/// - Implementations must be `Send + Sync` for use in async contexts.
/// - Operations never return raw transport errors. They log the
///   [`BackendError`](crate::core::error::BackendError) and translate it into
///   the return value the state machine expects.
/// - Backends perform remote I/O only. Persistence belongs to the state
///   machine; export progress goes through the [`RetrievalContext`] sink.
///
/// # Example Implementation
///
/// ```rust,ignore
/// use scanpilot::prelude::*;
/// use async_trait::async_trait;
///
/// #[derive(Debug)]
/// struct Echo;
///
/// #[async_trait]
/// impl Backend for Echo {
///     fn kind(&self) -> &str { "echo" }
///     fn name(&self) -> &str { "echo" }
///     fn capabilities(&self) -> Capabilities { Capabilities::fused() }
///
///     async fn create_job(&self, request: &JobRequest) -> Option<JobHandle> {
///         Some(JobHandle::new(request.name.clone()))
///     }
///     async fn start_job(&self, _handle: &JobHandle) -> bool { false }
///     async fn poll_job(&self, _handle: &JobHandle) -> JobPoll { JobPoll::Done }
///     async fn retrieve_job(&self, handle: &JobHandle, _ctx: &RetrievalContext) -> RetrieveOutcome {
///         RetrieveOutcome::Retrieved(handle.as_str().as_bytes().to_vec())
///     }
/// }
/// ```
#[async_trait]
pub trait Backend: Send + Sync + Debug {
    /// Returns the backend-type discriminant, e.g. `"nessus"`.
    fn kind(&self) -> &str;

    /// Returns the name of the scanner this instance was built for.
    fn name(&self) -> &str;

    /// Returns what this backend supports.
    fn capabilities(&self) -> Capabilities;

    /// Creates a job on the engine.
    ///
    /// Returns the new job handle, or `None` if creation failed. Fused
    /// backends also launch the job here.
    async fn create_job(&self, request: &JobRequest) -> Option<JobHandle>;

    /// Launches a created job. Returns `true` on success.
    ///
    /// Never called for fused backends.
    async fn start_job(&self, handle: &JobHandle) -> bool;

    /// Queries the job's remote status.
    ///
    /// Transport faults must be reported as [`JobPoll::Running`]; only a
    /// remote failure or a malformed response is [`JobPoll::Failed`].
    async fn poll_job(&self, handle: &JobHandle) -> JobPoll;

    /// Fetches the finished job's artifact.
    async fn retrieve_job(&self, handle: &JobHandle, ctx: &RetrievalContext) -> RetrieveOutcome;

    /// Pauses a running job. Returns `true` on success.
    async fn pause_job(&self, _handle: &JobHandle) -> bool {
        false
    }

    /// Resumes a paused job. Returns `true` on success.
    async fn resume_job(&self, _handle: &JobHandle) -> bool {
        false
    }

    /// Stops a running job. Returns `true` on success.
    async fn stop_job(&self, _handle: &JobHandle) -> bool {
        false
    }
}

/// An arc-wrapped backend for shared ownership.
pub type ArcBackend = Arc<dyn Backend>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_capability_presets() {
        let two_step = Capabilities::two_step();
        assert!(!two_step.fused_create);
        assert!(!two_step.pause && !two_step.resume && !two_step.stop);
        assert!(two_step.recreate_from_errors);

        let fused = Capabilities::fused().with_job_control().with_recreate_from_errors(false);
        assert!(fused.fused_create);
        assert!(fused.pause && fused.resume && fused.stop);
        assert!(!fused.recreate_from_errors);
    }

    #[test]
    fn test_job_request_options() {
        let mut options = Settings::new();
        options.insert("policy_id".into(), json!(7));
        options.insert("label".into(), json!("x"));
        let request = JobRequest::new("nightly", vec!["10.0.0.1".into()]).with_options(options);

        assert_eq!(request.option_i64("policy_id"), Some(7));
        assert_eq!(request.option_i64("label"), None);
        assert_eq!(request.option_i64("absent"), None);
    }

    #[test]
    fn test_detached_context_defaults() {
        let ctx = RetrievalContext::detached();
        assert!(ctx.resume.is_none());
        assert_eq!(ctx.poll_interval, Duration::from_secs(10));
        assert!(ctx.max_wait.is_none());
        assert!(!ctx.cancel.is_cancelled());
    }
}
