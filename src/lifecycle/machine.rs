//! Transition functions.

use crate::audit::{self, TransitionAuditEvent};
use crate::backends::BackendRegistry;
use crate::config::{ExportConfig, HttpSettings};
use crate::core::error::{LifecycleResult, StoreResult};
use crate::core::record::{ScanRecord, ScannerRecord};
use crate::core::traits::{ArcBackend, JobPoll, JobRequest, RetrievalContext, RetrieveOutcome};
use crate::core::types::{Action, JobHandle, ScanId, ScanStatus, Trigger};
use crate::export::{ExportCheckpoint, ExportProgress};
use crate::lifecycle::{Guards, Transition};
use crate::store::{ArcBlobStore, ArcRecordStore};

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// A scan with the scanner that owns it and a backend built for that
/// scanner.
struct Loaded {
    scan: ScanRecord,
    scanner: ScannerRecord,
    backend: ArcBackend,
}

impl Loaded {
    fn guards(&self) -> Guards {
        Guards::new(self.backend.capabilities())
    }
}

/// Persists export progress onto a scan that is still being retrieved.
#[derive(Debug)]
pub struct StoreCheckpoint {
    records: ArcRecordStore,
    scan_id: ScanId,
}

impl StoreCheckpoint {
    /// Creates a checkpoint writing to `scan_id` in `records`.
    pub fn new(records: ArcRecordStore, scan_id: ScanId) -> Self {
        Self { records, scan_id }
    }
}

#[async_trait]
impl ExportCheckpoint for StoreCheckpoint {
    async fn save(&self, progress: Option<&ExportProgress>) -> StoreResult<()> {
        let mut scan = self.records.get_scan(&self.scan_id).await?;
        if scan.status != ScanStatus::Retrieving {
            tracing::debug!(
                scan_id = %self.scan_id,
                status = scan.status.code(),
                "Scan left RETRIEVING, dropping export checkpoint"
            );
            return Ok(());
        }
        scan.export = progress.cloned();
        self.records.save_scan(&scan).await
    }
}

/// The scan state machine.
///
/// One callable per transition. Each takes a scan id and a trigger, and is
/// safe to invoke more than once for the same scan: the guard re-check
/// against the persisted status plus the mutex status written before the
/// remote call make a duplicate invocation a rejected no-op.
///
/// # Example
///
/// ```rust,ignore
/// let lifecycle = ScanLifecycle::new(records, blobs, Arc::new(BackendRegistry::builtin()));
/// match lifecycle.create(&scan_id, Trigger::Manual).await? {
///     Transition::Applied { to, .. } => println!("now {to}"),
///     Transition::Rejected { status } => println!("cannot create while {status}"),
///     other => println!("{other:?}"),
/// }
/// ```
#[derive(Debug, Clone)]
pub struct ScanLifecycle {
    records: ArcRecordStore,
    blobs: ArcBlobStore,
    registry: Arc<BackendRegistry>,
    http: HttpSettings,
    export: ExportConfig,
    cancel: CancellationToken,
}

impl ScanLifecycle {
    /// Creates a state machine over the given stores and registry.
    pub fn new(records: ArcRecordStore, blobs: ArcBlobStore, registry: Arc<BackendRegistry>) -> Self {
        Self {
            records,
            blobs,
            registry,
            http: HttpSettings::default(),
            export: ExportConfig::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Sets the HTTP settings handed to backend factories.
    pub fn with_http(mut self, http: HttpSettings) -> Self {
        self.http = http;
        self
    }

    /// Sets the export wait settings.
    pub fn with_export(mut self, export: ExportConfig) -> Self {
        self.export = export;
        self
    }

    /// Sets the token that suspends in-progress export waits.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Returns the record store.
    pub fn records(&self) -> &ArcRecordStore {
        &self.records
    }

    /// Returns the blob store.
    pub fn blobs(&self) -> &ArcBlobStore {
        &self.blobs
    }

    /// Returns the backend registry.
    pub fn registry(&self) -> &Arc<BackendRegistry> {
        &self.registry
    }

    /// Returns the HTTP settings.
    pub fn http(&self) -> &HttpSettings {
        &self.http
    }

    async fn load(&self, id: &ScanId) -> LifecycleResult<Loaded> {
        let scan = self.records.get_scan(id).await?;
        let scanner = self.records.get_scanner(&scan.scanner_id).await?;
        let backend = self.registry.instantiate(&scanner, &self.http)?;
        Ok(Loaded { scan, scanner, backend })
    }

    /// Checks the guard of `action` against the persisted status.
    ///
    /// # Returns
    ///
    /// Whether the guard passes, and the status it was checked against.
    pub async fn check(&self, id: &ScanId, action: Action, trigger: Trigger) -> LifecycleResult<(bool, ScanStatus)> {
        let loaded = self.load(id).await?;
        let status = loaded.scan.status;
        Ok((loaded.guards().allows(action, status, trigger), status))
    }

    /// Runs the transition for `action`.
    pub async fn execute(&self, id: &ScanId, action: Action, trigger: Trigger) -> LifecycleResult<Transition> {
        match action {
            Action::Create => self.create(id, trigger).await,
            Action::Start => self.start(id, trigger).await,
            Action::Pause => self.pause(id, trigger).await,
            Action::Resume => self.resume(id, trigger).await,
            Action::Stop => self.stop(id, trigger).await,
            Action::Retrieve => self.retrieve(id, trigger).await,
            Action::Poll => self.poll(id).await,
        }
    }

    fn reject(&self, scan: &ScanRecord, action: Action, trigger: Trigger) -> Transition {
        tracing::debug!(
            scan_id = %scan.id,
            action = %action,
            trigger = %trigger,
            status = scan.status.code(),
            "Guard rejected action"
        );
        Transition::Rejected { status: scan.status }
    }

    /// Writes the mutex status. Must run before any remote call.
    async fn enter(&self, scan: &mut ScanRecord, mutex: ScanStatus) -> LifecycleResult<()> {
        scan.status = mutex;
        self.records.save_scan(scan).await?;
        Ok(())
    }

    /// Reloads the record after a remote call. The inner `Err` carries the
    /// superseded transition when another writer has moved the status away
    /// from `expected`.
    async fn reload(
        &self,
        id: &ScanId,
        expected: ScanStatus,
        action: Action,
    ) -> LifecycleResult<Result<ScanRecord, Transition>> {
        let scan = self.records.get_scan(id).await?;
        if scan.status == expected {
            return Ok(Ok(scan));
        }
        tracing::warn!(
            scan_id = %id,
            action = %action,
            expected = expected.code(),
            found = scan.status.code(),
            "Record changed during remote call, discarding outcome"
        );
        Ok(Err(Transition::Superseded {
            expected,
            found: scan.status,
        }))
    }

    async fn commit(
        &self,
        loaded: &Loaded,
        scan: &ScanRecord,
        action: Action,
        trigger: Trigger,
        from: ScanStatus,
    ) -> LifecycleResult<Transition> {
        self.records.save_scan(scan).await?;

        let event = TransitionAuditEvent::new(scan, loaded.scanner.backend.as_str(), action, trigger, from);
        audit::emit_transition(&event);

        if scan.status == ScanStatus::Errors {
            tracing::warn!(
                scan_id = %scan.id,
                action = %action,
                backend = %loaded.backend.name(),
                "Scan moved to ERRORS"
            );
        } else {
            tracing::info!(
                scan_id = %scan.id,
                action = %action,
                from = from.code(),
                to = scan.status.code(),
                "Scan transitioned"
            );
        }
        Ok(Transition::Applied { from, to: scan.status })
    }

    /// Persists ERRORS for an action that needs a job handle the record
    /// does not have.
    async fn fail_without_handle(
        &self,
        loaded: &Loaded,
        action: Action,
        trigger: Trigger,
    ) -> LifecycleResult<Transition> {
        tracing::error!(scan_id = %loaded.scan.id, action = %action, "Scan has no job handle");
        let from = loaded.scan.status;
        let mut scan = loaded.scan.clone();
        scan.status = ScanStatus::Errors;
        self.commit(loaded, &scan, action, trigger, from).await
    }

    /// Creates the job on the engine.
    ///
    /// NEW (or, manually, FINISHED/ERRORS) → CREATING → CREATED, or
    /// IN_PROGRESS for backends that launch on create. ERRORS on failure,
    /// with the previous job handle left in place.
    pub async fn create(&self, id: &ScanId, trigger: Trigger) -> LifecycleResult<Transition> {
        let loaded = self.load(id).await?;
        let from = loaded.scan.status;
        if !loaded.guards().can_create(from, trigger) {
            return Ok(self.reject(&loaded.scan, Action::Create, trigger));
        }

        let mut scan = loaded.scan.clone();
        self.enter(&mut scan, ScanStatus::Creating).await?;

        let request = JobRequest::new(scan.name.clone(), scan.target_list()).with_options(scan.options.clone());
        let created = loaded.backend.create_job(&request).await;

        let mut scan = match self.reload(id, ScanStatus::Creating, Action::Create).await? {
            Ok(scan) => scan,
            Err(superseded) => {
                if let Some(handle) = created {
                    tracing::warn!(scan_id = %id, job = %handle, "Discarding remotely created job");
                }
                return Ok(superseded);
            }
        };

        match created {
            Some(handle) => {
                scan.job_handle = Some(handle);
                scan.export = None;
                scan.ended_at = None;
                if loaded.backend.capabilities().fused_create {
                    scan.status = ScanStatus::InProgress;
                    scan.started_at = Some(Utc::now());
                } else {
                    scan.status = ScanStatus::Created;
                }
            }
            None => scan.status = ScanStatus::Errors,
        }
        self.commit(&loaded, &scan, Action::Create, trigger, from).await
    }

    /// Launches a created job.
    ///
    /// CREATED → STARTING → IN_PROGRESS with the start timestamp set, or
    /// ERRORS with it untouched.
    pub async fn start(&self, id: &ScanId, trigger: Trigger) -> LifecycleResult<Transition> {
        let loaded = self.load(id).await?;
        let from = loaded.scan.status;
        if !loaded.guards().can_start(from, trigger) {
            return Ok(self.reject(&loaded.scan, Action::Start, trigger));
        }
        let Some(handle) = loaded.scan.job_handle.clone() else {
            return self.fail_without_handle(&loaded, Action::Start, trigger).await;
        };

        let mut scan = loaded.scan.clone();
        self.enter(&mut scan, ScanStatus::Starting).await?;

        let started = loaded.backend.start_job(&handle).await;

        let mut scan = match self.reload(id, ScanStatus::Starting, Action::Start).await? {
            Ok(scan) => scan,
            Err(superseded) => return Ok(superseded),
        };
        if started {
            scan.status = ScanStatus::InProgress;
            scan.started_at = Some(Utc::now());
            scan.ended_at = None;
        } else {
            scan.status = ScanStatus::Errors;
        }
        self.commit(&loaded, &scan, Action::Start, trigger, from).await
    }

    /// Pauses a running job. IN_PROGRESS → PAUSED, or ERRORS.
    pub async fn pause(&self, id: &ScanId, trigger: Trigger) -> LifecycleResult<Transition> {
        self.control(id, trigger, Action::Pause).await
    }

    /// Resumes a paused job. PAUSED → IN_PROGRESS, or ERRORS.
    pub async fn resume(&self, id: &ScanId, trigger: Trigger) -> LifecycleResult<Transition> {
        self.control(id, trigger, Action::Resume).await
    }

    /// Stops a running job. IN_PROGRESS → STOPPED with the end timestamp
    /// set, or ERRORS.
    pub async fn stop(&self, id: &ScanId, trigger: Trigger) -> LifecycleResult<Transition> {
        self.control(id, trigger, Action::Stop).await
    }

    async fn control(&self, id: &ScanId, trigger: Trigger, action: Action) -> LifecycleResult<Transition> {
        let loaded = self.load(id).await?;
        let from = loaded.scan.status;
        if !loaded.guards().allows(action, from, trigger) {
            return Ok(self.reject(&loaded.scan, action, trigger));
        }
        let Some(handle) = loaded.scan.job_handle.clone() else {
            return self.fail_without_handle(&loaded, action, trigger).await;
        };

        let (succeeded, target) = match action {
            Action::Pause => (loaded.backend.pause_job(&handle).await, ScanStatus::Paused),
            Action::Resume => (loaded.backend.resume_job(&handle).await, ScanStatus::InProgress),
            _ => (loaded.backend.stop_job(&handle).await, ScanStatus::Stopped),
        };

        let mut scan = match self.reload(id, from, action).await? {
            Ok(scan) => scan,
            Err(superseded) => return Ok(superseded),
        };
        if succeeded {
            scan.status = target;
            if target == ScanStatus::Stopped {
                scan.ended_at = Some(Utc::now());
            }
        } else {
            scan.status = ScanStatus::Errors;
        }
        self.commit(&loaded, &scan, action, trigger, from).await
    }

    /// Queries the remote job status.
    ///
    /// A no-op unless IN_PROGRESS. Moves to FINISHED (with the end
    /// timestamp) when the engine reports completion, to ERRORS when it
    /// reports failure, and otherwise leaves the record untouched.
    pub async fn poll(&self, id: &ScanId) -> LifecycleResult<Transition> {
        let loaded = self.load(id).await?;
        let from = loaded.scan.status;
        if !loaded.guards().can_poll(from) {
            return Ok(self.reject(&loaded.scan, Action::Poll, Trigger::Automatic));
        }
        let Some(handle) = loaded.scan.job_handle.clone() else {
            return self.fail_without_handle(&loaded, Action::Poll, Trigger::Automatic).await;
        };

        let poll = loaded.backend.poll_job(&handle).await;
        if poll == JobPoll::Running {
            tracing::debug!(scan_id = %id, job = %handle, "Scan still in progress");
            return Ok(Transition::Unchanged { status: from });
        }

        let mut scan = match self.reload(id, ScanStatus::InProgress, Action::Poll).await? {
            Ok(scan) => scan,
            Err(superseded) => return Ok(superseded),
        };
        if poll == JobPoll::Done {
            scan.status = ScanStatus::Finished;
            scan.ended_at = Some(Utc::now());
        } else {
            scan.status = ScanStatus::Errors;
        }
        self.commit(&loaded, &scan, Action::Poll, Trigger::Automatic, from).await
    }

    /// Fetches and stores the result artifact.
    ///
    /// FINISHED (or, manually, RETRIEVED) → RETRIEVING → RETRIEVED with the
    /// result reference set. A suspended export wait goes back to FINISHED
    /// with its progress kept for the next attempt. ERRORS on failure.
    pub async fn retrieve(&self, id: &ScanId, trigger: Trigger) -> LifecycleResult<Transition> {
        let loaded = self.load(id).await?;
        let from = loaded.scan.status;
        if !loaded.guards().can_retrieve(from, trigger) {
            return Ok(self.reject(&loaded.scan, Action::Retrieve, trigger));
        }
        let Some(handle) = loaded.scan.job_handle.clone() else {
            return self.fail_without_handle(&loaded, Action::Retrieve, trigger).await;
        };

        let mut scan = loaded.scan.clone();
        let previous = scan.result.take();
        self.enter(&mut scan, ScanStatus::Retrieving).await?;
        if let Some(previous) = previous {
            if let Err(e) = self.blobs.delete(&previous).await {
                tracing::warn!(scan_id = %id, key = %previous.key, error = %e, "Failed to delete previous artifact");
            }
        }

        let ctx = self.retrieval_context(id, scan.export.clone());
        let outcome = loaded.backend.retrieve_job(&handle, &ctx).await;

        let mut scan = match self.reload(id, ScanStatus::Retrieving, Action::Retrieve).await? {
            Ok(scan) => scan,
            Err(superseded) => return Ok(superseded),
        };
        match outcome {
            RetrieveOutcome::Retrieved(bytes) => match self.blobs.save(id, &bytes).await {
                Ok(result) => {
                    scan.result = Some(result);
                    scan.export = None;
                    scan.status = ScanStatus::Retrieved;
                }
                Err(e) => {
                    tracing::error!(scan_id = %id, error = %e, "Failed to store artifact");
                    scan.export = None;
                    scan.status = ScanStatus::Errors;
                }
            },
            RetrieveOutcome::Pending => {
                tracing::info!(
                    scan_id = %id,
                    token = ?scan.export.as_ref().map(|p| p.token.as_str()),
                    "Retrieval suspended, will resume"
                );
                scan.status = ScanStatus::Finished;
            }
            RetrieveOutcome::Failed => {
                scan.export = None;
                scan.status = ScanStatus::Errors;
            }
        }
        self.commit(&loaded, &scan, Action::Retrieve, trigger, from).await
    }

    fn retrieval_context(&self, id: &ScanId, resume: Option<ExportProgress>) -> RetrievalContext {
        RetrievalContext::detached()
            .with_resume(resume)
            .with_checkpoint(Arc::new(StoreCheckpoint::new(self.records.clone(), id.clone())))
            .with_cancel(self.cancel.child_token())
            .with_poll_interval(self.export.poll_interval)
            .with_max_wait(self.export.max_wait)
    }

    /// Loads the stored artifact of a RETRIEVED scan.
    pub async fn result(&self, id: &ScanId) -> LifecycleResult<Option<Vec<u8>>> {
        let scan = self.records.get_scan(id).await?;
        match (&scan.status, &scan.result) {
            (ScanStatus::Retrieved, Some(result)) => Ok(Some(self.blobs.load(result).await?)),
            _ => Ok(None),
        }
    }

    /// Returns the job handle of a scan, if it has one.
    pub async fn job_handle(&self, id: &ScanId) -> LifecycleResult<Option<JobHandle>> {
        Ok(self.records.get_scan(id).await?.job_handle)
    }
}
