//! The export driver: request, poll, download.

use crate::core::error::BackendResult;
use crate::core::traits::{RetrievalContext, RetrieveOutcome};
use crate::core::types::JobHandle;
use crate::export::session::{ExportPhase, ExportProgress, ExportToken};

use async_trait::async_trait;
use std::fmt::Debug;
use tokio::time::Instant;

/// Format an export is requested in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    /// Comma-separated values.
    #[default]
    Csv,
}

impl ExportFormat {
    /// Returns the wire name of the format.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
        }
    }
}

/// Status of a requested export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportStatus {
    /// The content can be downloaded.
    Ready,
    /// The engine is still preparing the content.
    NotReady,
}

/// Remote calls of an asynchronous export.
///
/// Errors are returned as-is; the [`ExportRetriever`] decides which of them
/// are retried.
#[async_trait]
pub trait ExportApi: Send + Sync + Debug {
    /// Requests an export of the job's results.
    async fn request_export(&self, handle: &JobHandle, format: ExportFormat) -> BackendResult<ExportToken>;

    /// Queries whether the export is ready.
    async fn export_status(&self, token: &ExportToken) -> BackendResult<ExportStatus>;

    /// Downloads the export content.
    async fn download_export(&self, token: &ExportToken) -> BackendResult<Vec<u8>>;
}

/// Drives one retrieval through the export phases.
///
/// Status polls run on the context's fixed interval with no attempt limit.
/// Transient failures while polling are retried on the same schedule. When
/// the context's wait budget elapses or its token is cancelled the driver
/// returns [`RetrieveOutcome::Pending`] with the progress checkpointed, so a
/// later call with that progress resumes on the same token.
#[derive(Debug)]
pub struct ExportRetriever<'a, A: ExportApi + ?Sized> {
    api: &'a A,
    backend: &'a str,
    format: ExportFormat,
}

impl<'a, A: ExportApi + ?Sized> ExportRetriever<'a, A> {
    /// Creates a driver over `api`. `backend` is used for logging.
    pub fn new(api: &'a A, backend: &'a str) -> Self {
        Self {
            api,
            backend,
            format: ExportFormat::default(),
        }
    }

    /// Sets the requested format.
    pub fn with_format(mut self, format: ExportFormat) -> Self {
        self.format = format;
        self
    }

    /// Runs the retrieval to completion, suspension or failure.
    pub async fn run(&self, handle: &JobHandle, ctx: &RetrievalContext) -> RetrieveOutcome {
        let mut progress = match ctx.resume.clone() {
            Some(progress) => {
                tracing::info!(
                    backend = %self.backend,
                    job = %handle,
                    token = %progress.token,
                    attempts = progress.attempts,
                    "Resuming export"
                );
                progress
            }
            None => match self.api.request_export(handle, self.format).await {
                Ok(token) => {
                    tracing::debug!(backend = %self.backend, job = %handle, token = %token, "Export requested");
                    let progress = ExportProgress::requested(token);
                    self.checkpoint(ctx, Some(&progress)).await;
                    progress
                }
                Err(e) => {
                    tracing::error!(backend = %self.backend, job = %handle, error = %e, "Export request failed");
                    return RetrieveOutcome::Failed;
                }
            },
        };

        let deadline = ctx.max_wait.map(|budget| Instant::now() + budget);

        while !progress.phase.is_ready() {
            tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => {
                    return self.suspend(ctx, &progress, "cancelled").await;
                }
                _ = tokio::time::sleep(ctx.poll_interval) => {}
            }

            progress.attempts += 1;
            tracing::debug!(
                backend = %self.backend,
                token = %progress.token,
                attempt = progress.attempts,
                "Export progress: poll attempt"
            );

            match self.api.export_status(&progress.token).await {
                Ok(ExportStatus::Ready) => progress.advance(ExportPhase::Ready),
                Ok(ExportStatus::NotReady) => progress.advance(ExportPhase::Polling),
                Err(e) if e.is_transient() => {
                    tracing::debug!(
                        backend = %self.backend,
                        token = %progress.token,
                        error = %e,
                        "Export status unavailable, retrying"
                    );
                    progress.advance(ExportPhase::Polling);
                }
                Err(e) => {
                    tracing::error!(
                        backend = %self.backend,
                        token = %progress.token,
                        error = %e,
                        "Export status malformed"
                    );
                    self.checkpoint(ctx, None).await;
                    return RetrieveOutcome::Failed;
                }
            }
            self.checkpoint(ctx, Some(&progress)).await;

            // Budget is checked after the poll: every run polls at least once.
            if !progress.phase.is_ready() && deadline.is_some_and(|d| Instant::now() + ctx.poll_interval > d) {
                return self.suspend(ctx, &progress, "wait budget elapsed").await;
            }
        }

        progress.advance(ExportPhase::Downloading);
        self.checkpoint(ctx, Some(&progress)).await;

        match self.api.download_export(&progress.token).await {
            Ok(bytes) => {
                tracing::info!(
                    backend = %self.backend,
                    token = %progress.token,
                    size = bytes.len(),
                    attempts = progress.attempts,
                    "Export downloaded"
                );
                RetrieveOutcome::Retrieved(bytes)
            }
            Err(e) => {
                tracing::error!(backend = %self.backend, token = %progress.token, error = %e, "Export download failed");
                self.checkpoint(ctx, None).await;
                RetrieveOutcome::Failed
            }
        }
    }

    async fn suspend(&self, ctx: &RetrievalContext, progress: &ExportProgress, reason: &str) -> RetrieveOutcome {
        tracing::info!(
            backend = %self.backend,
            token = %progress.token,
            attempts = progress.attempts,
            reason,
            "Export wait suspended"
        );
        self.checkpoint(ctx, Some(progress)).await;
        RetrieveOutcome::Pending
    }

    async fn checkpoint(&self, ctx: &RetrievalContext, progress: Option<&ExportProgress>) {
        if let Err(e) = ctx.checkpoint.save(progress).await {
            tracing::warn!(backend = %self.backend, error = %e, "Failed to persist export progress");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::mock::MockExportApi;
    use crate::core::error::{BackendError, StoreResult};
    use crate::export::session::ExportCheckpoint;

    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    #[derive(Debug, Default)]
    struct RecordingCheckpoint {
        saved: Mutex<Vec<Option<ExportProgress>>>,
    }

    impl RecordingCheckpoint {
        fn last(&self) -> Option<Option<ExportProgress>> {
            self.saved.lock().unwrap().last().cloned()
        }
    }

    #[async_trait]
    impl ExportCheckpoint for RecordingCheckpoint {
        async fn save(&self, progress: Option<&ExportProgress>) -> StoreResult<()> {
            self.saved.lock().unwrap().push(progress.cloned());
            Ok(())
        }
    }

    fn context(checkpoint: Arc<RecordingCheckpoint>) -> RetrievalContext {
        RetrievalContext::detached()
            .with_checkpoint(checkpoint)
            .with_poll_interval(Duration::from_secs(10))
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_until_ready_then_downloads() {
        let api = MockExportApi::new("T1", b"RESULT_CSV".to_vec())
            .with_statuses([ExportStatus::NotReady, ExportStatus::NotReady, ExportStatus::Ready]);
        let checkpoint = Arc::new(RecordingCheckpoint::default());
        let started = Instant::now();

        let outcome = ExportRetriever::new(&api, "mock")
            .run(&JobHandle::new("7"), &context(checkpoint.clone()))
            .await;

        assert_eq!(outcome, RetrieveOutcome::Retrieved(b"RESULT_CSV".to_vec()));
        assert_eq!(api.request_count(), 1);
        assert_eq!(api.status_count(), 3);
        assert_eq!(api.download_count(), 1);
        assert!(started.elapsed() >= Duration::from_secs(30));

        let last = checkpoint.last().flatten().unwrap();
        assert_eq!(last.phase, ExportPhase::Downloading);
        assert_eq!(last.attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_status_errors_are_retried() {
        let api = MockExportApi::new("T1", b"csv".to_vec())
            .with_status_error(BackendError::status("mock", 503, "export status"))
            .with_statuses([ExportStatus::Ready]);
        let checkpoint = Arc::new(RecordingCheckpoint::default());

        let outcome = ExportRetriever::new(&api, "mock")
            .run(&JobHandle::new("7"), &context(checkpoint))
            .await;

        assert_eq!(outcome, RetrieveOutcome::Retrieved(b"csv".to_vec()));
        assert_eq!(api.status_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_suspends_and_resume_reuses_token() {
        let api = MockExportApi::new("T1", b"csv".to_vec()).with_statuses([
            ExportStatus::NotReady,
            ExportStatus::NotReady,
            ExportStatus::NotReady,
            ExportStatus::Ready,
        ]);
        let checkpoint = Arc::new(RecordingCheckpoint::default());
        let ctx = context(checkpoint.clone()).with_max_wait(Some(Duration::from_secs(25)));

        let first = ExportRetriever::new(&api, "mock").run(&JobHandle::new("7"), &ctx).await;
        assert_eq!(first, RetrieveOutcome::Pending);
        assert_eq!(api.status_count(), 2);
        assert_eq!(api.download_count(), 0);

        let saved = checkpoint.last().flatten().unwrap();
        assert_eq!(saved.token, ExportToken::new("T1"));
        assert_eq!(saved.phase, ExportPhase::Polling);

        let resumed = ctx.clone().with_resume(Some(saved)).with_max_wait(None);
        let second = ExportRetriever::new(&api, "mock").run(&JobHandle::new("7"), &resumed).await;
        assert_eq!(second, RetrieveOutcome::Retrieved(b"csv".to_vec()));
        assert_eq!(api.request_count(), 1);
        assert_eq!(api.status_count(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_shorter_than_interval_still_polls() {
        let api = MockExportApi::new("T1", b"csv".to_vec())
            .with_statuses([ExportStatus::NotReady, ExportStatus::Ready]);
        let checkpoint = Arc::new(RecordingCheckpoint::default());
        let ctx = context(checkpoint.clone()).with_max_wait(Some(Duration::from_secs(5)));

        let first = ExportRetriever::new(&api, "mock").run(&JobHandle::new("7"), &ctx).await;
        assert_eq!(first, RetrieveOutcome::Pending);
        assert_eq!(api.status_count(), 1);

        let saved = checkpoint.last().flatten().unwrap();
        assert_eq!(saved.attempts, 1);
        let resumed = ctx.clone().with_resume(Some(saved));
        let second = ExportRetriever::new(&api, "mock").run(&JobHandle::new("7"), &resumed).await;
        assert_eq!(second, RetrieveOutcome::Retrieved(b"csv".to_vec()));
        assert_eq!(api.request_count(), 1);
        assert_eq!(api.status_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_suspends() {
        let api = MockExportApi::new("T1", b"csv".to_vec());
        let checkpoint = Arc::new(RecordingCheckpoint::default());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let ctx = context(checkpoint.clone()).with_cancel(cancel);

        let outcome = ExportRetriever::new(&api, "mock").run(&JobHandle::new("7"), &ctx).await;

        assert_eq!(outcome, RetrieveOutcome::Pending);
        assert_eq!(api.status_count(), 0);
        assert_eq!(checkpoint.last().flatten().unwrap().phase, ExportPhase::Requested);
    }

    #[tokio::test(start_paused = true)]
    async fn test_download_failure_clears_progress() {
        let api = MockExportApi::new("T1", b"csv".to_vec())
            .with_statuses([ExportStatus::Ready])
            .with_download_error(BackendError::status("mock", 500, "export download"));
        let checkpoint = Arc::new(RecordingCheckpoint::default());

        let outcome = ExportRetriever::new(&api, "mock")
            .run(&JobHandle::new("7"), &context(checkpoint.clone()))
            .await;

        assert_eq!(outcome, RetrieveOutcome::Failed);
        assert_eq!(checkpoint.last(), Some(None));
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_failure_is_hard() {
        let api = MockExportApi::new("T1", b"csv".to_vec())
            .with_request_error(BackendError::transport("mock", "connection refused"));
        let checkpoint = Arc::new(RecordingCheckpoint::default());

        let outcome = ExportRetriever::new(&api, "mock")
            .run(&JobHandle::new("7"), &context(checkpoint.clone()))
            .await;

        assert_eq!(outcome, RetrieveOutcome::Failed);
        assert_eq!(api.status_count(), 0);
        assert!(checkpoint.last().is_none());
    }
}
