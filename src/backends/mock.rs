//! Mock backend for testing.
//!
//! This module provides a scripted in-process backend that can be used in
//! tests and demos to drive scans through their lifecycle without a real
//! scanning engine.

use crate::core::error::{BackendError, BackendResult};
use crate::core::traits::{Backend, Capabilities, JobPoll, JobRequest, RetrievalContext, RetrieveOutcome};
use crate::core::types::JobHandle;
use crate::export::{ExportApi, ExportFormat, ExportRetriever, ExportStatus, ExportToken};

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Backend-type discriminant of the mock backend.
pub const KIND: &str = "mock";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A mock backend for testing purposes.
///
/// Each operation pops the next scripted result from its queue and falls
/// back to a default once the queue is empty. Every call is counted.
///
/// # Examples
///
/// ```rust
/// use scanpilot::backends::MockBackend;
/// use scanpilot::core::{Capabilities, JobPoll};
/// use std::time::Duration;
///
/// // Two-step backend whose first poll says "running", then "done"
/// let backend = MockBackend::new()
///     .with_polls([JobPoll::Running])
///     .with_latency(Duration::from_millis(50));
///
/// // Fused backend that never allows a re-create from ERRORS
/// let fused = MockBackend::new()
///     .with_capabilities(Capabilities::fused().with_recreate_from_errors(false));
/// ```
#[derive(Debug)]
pub struct MockBackend {
    /// Name of this backend instance.
    name: String,
    /// Reported capabilities.
    capabilities: Capabilities,
    /// Scripted create results.
    creates: Mutex<VecDeque<Option<JobHandle>>>,
    /// Scripted start results.
    starts: Mutex<VecDeque<bool>>,
    /// Scripted poll results.
    polls: Mutex<VecDeque<JobPoll>>,
    /// Poll result once the script is exhausted.
    default_poll: JobPoll,
    /// Scripted retrieve results.
    retrieves: Mutex<VecDeque<RetrieveOutcome>>,
    /// Artifact returned once the retrieve script is exhausted.
    artifact: Vec<u8>,
    /// Export exchange used for retrieval instead of the script.
    export: Option<MockExportApi>,
    /// Result of pause, resume and stop.
    control_result: bool,
    /// Simulated latency for every remote call.
    latency: Option<Duration>,
    /// The most recent create request.
    last_request: Mutex<Option<JobRequest>>,
    create_count: AtomicU64,
    start_count: AtomicU64,
    poll_count: AtomicU64,
    retrieve_count: AtomicU64,
    control_count: AtomicU64,
}

impl MockBackend {
    /// Creates a two-step mock backend that succeeds at everything.
    pub fn new() -> Self {
        Self {
            name: KIND.to_string(),
            capabilities: Capabilities::two_step(),
            creates: Mutex::new(VecDeque::new()),
            starts: Mutex::new(VecDeque::new()),
            polls: Mutex::new(VecDeque::new()),
            default_poll: JobPoll::Done,
            retrieves: Mutex::new(VecDeque::new()),
            artifact: b"mock result".to_vec(),
            export: None,
            control_result: true,
            latency: None,
            last_request: Mutex::new(None),
            create_count: AtomicU64::new(0),
            start_count: AtomicU64::new(0),
            poll_count: AtomicU64::new(0),
            retrieve_count: AtomicU64::new(0),
            control_count: AtomicU64::new(0),
        }
    }

    /// Sets the name of this backend.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the reported capabilities.
    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Queues create results; `None` is a failed create.
    pub fn with_creates(self, results: impl IntoIterator<Item = Option<&'static str>>) -> Self {
        lock(&self.creates).extend(results.into_iter().map(|r| r.map(JobHandle::new)));
        self
    }

    /// Queues start results.
    pub fn with_starts(self, results: impl IntoIterator<Item = bool>) -> Self {
        lock(&self.starts).extend(results);
        self
    }

    /// Queues poll results.
    pub fn with_polls(self, results: impl IntoIterator<Item = JobPoll>) -> Self {
        lock(&self.polls).extend(results);
        self
    }

    /// Sets the poll result used once the script is exhausted.
    pub fn with_default_poll(mut self, poll: JobPoll) -> Self {
        self.default_poll = poll;
        self
    }

    /// Queues retrieve results.
    pub fn with_retrieves(self, results: impl IntoIterator<Item = RetrieveOutcome>) -> Self {
        lock(&self.retrieves).extend(results);
        self
    }

    /// Sets the artifact returned once the retrieve script is exhausted.
    pub fn with_artifact(mut self, artifact: impl Into<Vec<u8>>) -> Self {
        self.artifact = artifact.into();
        self
    }

    /// Retrieves through an export exchange instead of the script.
    pub fn with_export(mut self, export: MockExportApi) -> Self {
        self.export = Some(export);
        self
    }

    /// Sets the result of pause, resume and stop.
    pub fn with_control_result(mut self, result: bool) -> Self {
        self.control_result = result;
        self
    }

    /// Sets the simulated latency for remote calls.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Returns the number of create calls.
    pub fn create_count(&self) -> u64 {
        self.create_count.load(Ordering::Relaxed)
    }

    /// Returns the number of start calls.
    pub fn start_count(&self) -> u64 {
        self.start_count.load(Ordering::Relaxed)
    }

    /// Returns the number of poll calls.
    pub fn poll_count(&self) -> u64 {
        self.poll_count.load(Ordering::Relaxed)
    }

    /// Returns the number of retrieve calls.
    pub fn retrieve_count(&self) -> u64 {
        self.retrieve_count.load(Ordering::Relaxed)
    }

    /// Returns the number of pause, resume and stop calls.
    pub fn control_count(&self) -> u64 {
        self.control_count.load(Ordering::Relaxed)
    }

    /// Returns the most recent create request.
    pub fn last_request(&self) -> Option<JobRequest> {
        lock(&self.last_request).clone()
    }

    /// Returns the export exchange, if one is configured.
    pub fn export(&self) -> Option<&MockExportApi> {
        self.export.as_ref()
    }

    async fn delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for MockBackend {
    fn kind(&self) -> &str {
        KIND
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    async fn create_job(&self, request: &JobRequest) -> Option<JobHandle> {
        let n = self.create_count.fetch_add(1, Ordering::Relaxed) + 1;
        *lock(&self.last_request) = Some(request.clone());
        self.delay().await;

        let scripted = lock(&self.creates).pop_front();
        scripted.unwrap_or_else(|| Some(JobHandle::new(format!("mock-job-{n}"))))
    }

    async fn start_job(&self, _handle: &JobHandle) -> bool {
        self.start_count.fetch_add(1, Ordering::Relaxed);
        self.delay().await;
        let scripted = lock(&self.starts).pop_front();
        scripted.unwrap_or(true)
    }

    async fn poll_job(&self, _handle: &JobHandle) -> JobPoll {
        self.poll_count.fetch_add(1, Ordering::Relaxed);
        self.delay().await;
        let scripted = lock(&self.polls).pop_front();
        scripted.unwrap_or(self.default_poll)
    }

    async fn retrieve_job(&self, handle: &JobHandle, ctx: &RetrievalContext) -> RetrieveOutcome {
        self.retrieve_count.fetch_add(1, Ordering::Relaxed);
        self.delay().await;

        if let Some(export) = &self.export {
            return ExportRetriever::new(export, &self.name).run(handle, ctx).await;
        }
        let scripted = lock(&self.retrieves).pop_front();
        scripted.unwrap_or_else(|| RetrieveOutcome::Retrieved(self.artifact.clone()))
    }

    async fn pause_job(&self, _handle: &JobHandle) -> bool {
        self.control().await
    }

    async fn resume_job(&self, _handle: &JobHandle) -> bool {
        self.control().await
    }

    async fn stop_job(&self, _handle: &JobHandle) -> bool {
        self.control().await
    }
}

impl MockBackend {
    async fn control(&self) -> bool {
        self.control_count.fetch_add(1, Ordering::Relaxed);
        self.delay().await;
        self.control_result
    }
}

/// A scripted export exchange.
///
/// Status polls pop the scripted results and report ready once the script
/// is exhausted. Errors are one-shot.
#[derive(Debug)]
pub struct MockExportApi {
    token: String,
    content: Vec<u8>,
    statuses: Mutex<VecDeque<BackendResult<ExportStatus>>>,
    request_error: Mutex<Option<BackendError>>,
    download_error: Mutex<Option<BackendError>>,
    request_count: AtomicU64,
    status_count: AtomicU64,
    download_count: AtomicU64,
}

impl MockExportApi {
    /// Creates an exchange that hands out `token` and downloads `content`.
    pub fn new(token: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            token: token.into(),
            content: content.into(),
            statuses: Mutex::new(VecDeque::new()),
            request_error: Mutex::new(None),
            download_error: Mutex::new(None),
            request_count: AtomicU64::new(0),
            status_count: AtomicU64::new(0),
            download_count: AtomicU64::new(0),
        }
    }

    /// Queues status results.
    pub fn with_statuses(self, statuses: impl IntoIterator<Item = ExportStatus>) -> Self {
        lock(&self.statuses).extend(statuses.into_iter().map(Ok));
        self
    }

    /// Queues a failed status poll.
    pub fn with_status_error(self, error: BackendError) -> Self {
        lock(&self.statuses).push_back(Err(error));
        self
    }

    /// Fails the next export request.
    pub fn with_request_error(self, error: BackendError) -> Self {
        *lock(&self.request_error) = Some(error);
        self
    }

    /// Fails the next download.
    pub fn with_download_error(self, error: BackendError) -> Self {
        *lock(&self.download_error) = Some(error);
        self
    }

    /// Returns the number of export requests.
    pub fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }

    /// Returns the number of status polls.
    pub fn status_count(&self) -> u64 {
        self.status_count.load(Ordering::Relaxed)
    }

    /// Returns the number of downloads.
    pub fn download_count(&self) -> u64 {
        self.download_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ExportApi for MockExportApi {
    async fn request_export(&self, _handle: &JobHandle, _format: ExportFormat) -> BackendResult<ExportToken> {
        self.request_count.fetch_add(1, Ordering::Relaxed);
        let scripted = lock(&self.request_error).take();
        match scripted {
            Some(e) => Err(e),
            None => Ok(ExportToken::new(self.token.clone())),
        }
    }

    async fn export_status(&self, _token: &ExportToken) -> BackendResult<ExportStatus> {
        self.status_count.fetch_add(1, Ordering::Relaxed);
        let scripted = lock(&self.statuses).pop_front();
        scripted.unwrap_or(Ok(ExportStatus::Ready))
    }

    async fn download_export(&self, _token: &ExportToken) -> BackendResult<Vec<u8>> {
        self.download_count.fetch_add(1, Ordering::Relaxed);
        let scripted = lock(&self.download_error).take();
        match scripted {
            Some(e) => Err(e),
            None => Ok(self.content.clone()),
        }
    }
}
