//! The orchestrator facade.

use crate::automation::{SweepReport, Sweeper};
use crate::backends::BackendRegistry;
use crate::commands::CommandService;
use crate::config::AutomationConfig;
use crate::core::error::{ConfigError, LifecycleError, LifecycleResult, StoreResult};
use crate::core::record::{ScanRecord, ScannerRecord};
use crate::core::types::{ScanId, ScanStatus, ScannerId};
use crate::dispatch::WorkerPool;
use crate::lifecycle::ScanLifecycle;
use crate::store::{ArcBlobStore, ArcRecordStore, MemoryBlobStore, MemoryRecordStore};

use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Builder for creating an [`Orchestrator`].
#[derive(Debug, Default)]
pub struct OrchestratorBuilder {
    records: Option<ArcRecordStore>,
    blobs: Option<ArcBlobStore>,
    registry: Option<BackendRegistry>,
    config: AutomationConfig,
}

impl OrchestratorBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the record store. Defaults to an in-memory store.
    pub fn with_records(mut self, records: ArcRecordStore) -> Self {
        self.records = Some(records);
        self
    }

    /// Sets the artifact store. Defaults to an in-memory store.
    pub fn with_blobs(mut self, blobs: ArcBlobStore) -> Self {
        self.blobs = Some(blobs);
        self
    }

    /// Sets the backend registry. Defaults to the built-in backends.
    pub fn with_registry(mut self, registry: BackendRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Sets the configuration.
    pub fn with_config(mut self, config: AutomationConfig) -> Self {
        self.config = config;
        self
    }

    /// Builds the orchestrator.
    pub fn build(self) -> Result<Orchestrator, ConfigError> {
        self.config.validate()?;

        let registry = self.registry.unwrap_or_else(BackendRegistry::builtin);
        if registry.is_empty() {
            return Err(ConfigError::invalid("at least one backend must be registered"));
        }

        let records = self.records.unwrap_or_else(|| Arc::new(MemoryRecordStore::new()));
        let blobs = self.blobs.unwrap_or_else(|| Arc::new(MemoryBlobStore::new()));
        let lifecycle = ScanLifecycle::new(records, blobs, Arc::new(registry))
            .with_http(self.config.http.clone())
            .with_export(self.config.export.clone());

        Ok(Orchestrator {
            lifecycle,
            config: self.config,
        })
    }
}

/// Artifacts collected for a set of scans.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultBatch {
    /// Artifacts of the scans that have one.
    pub results: Vec<(ScanId, Vec<u8>)>,
    /// Scans that do not exist or have not been retrieved.
    pub missing: Vec<ScanId>,
}

/// Owns the stores, registry and state machine, and manages records.
///
/// Automation does not run until [`start`](Self::start) is called.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    lifecycle: ScanLifecycle,
    config: AutomationConfig,
}

impl Orchestrator {
    /// Creates a new builder.
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    /// Returns the state machine.
    pub fn lifecycle(&self) -> &ScanLifecycle {
        &self.lifecycle
    }

    /// Returns the backend registry.
    pub fn registry(&self) -> &BackendRegistry {
        self.lifecycle.registry()
    }

    /// Returns the configuration.
    pub fn config(&self) -> &AutomationConfig {
        &self.config
    }

    /// Validates and stores a new scanner.
    ///
    /// # Errors
    ///
    /// [`LifecycleError::InvalidRecord`] if a scanner with the same id
    /// already exists; use [`update_scanner`](Self::update_scanner) for that.
    pub async fn register_scanner(&self, scanner: ScannerRecord) -> LifecycleResult<ScannerId> {
        match self.lifecycle.records().get_scanner(&scanner.id).await {
            Ok(_) => return Err(LifecycleError::invalid_record("scanner", &scanner.id, "id already exists")),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }
        self.registry().validate_scanner(&scanner)?;
        self.lifecycle.records().save_scanner(&scanner).await?;
        tracing::info!(
            scanner_id = %scanner.id,
            backend = %scanner.backend,
            name = %scanner.name,
            "Scanner registered"
        );
        Ok(scanner.id)
    }

    /// Validates and replaces an existing scanner.
    pub async fn update_scanner(&self, scanner: ScannerRecord) -> LifecycleResult<()> {
        self.lifecycle.records().get_scanner(&scanner.id).await?;
        self.registry().validate_scanner(&scanner)?;
        self.lifecycle.records().save_scanner(&scanner).await?;
        tracing::info!(scanner_id = %scanner.id, "Scanner updated");
        Ok(())
    }

    /// Validates and stores a new scan.
    ///
    /// # Errors
    ///
    /// [`LifecycleError::InvalidRecord`] if the id is taken, or if the record
    /// is not a fresh NEW scan: lifecycle state only ever comes from
    /// transitions.
    pub async fn add_scan(&self, scan: ScanRecord) -> LifecycleResult<ScanId> {
        let reason = if scan.status != ScanStatus::New {
            Some("status must be NEW")
        } else if scan.job_handle.is_some() {
            Some("job handle must be empty")
        } else if scan.result.is_some() {
            Some("result must be empty")
        } else if scan.export.is_some() {
            Some("export progress must be empty")
        } else {
            None
        };
        if let Some(reason) = reason {
            return Err(LifecycleError::invalid_record("scan", &scan.id, reason));
        }

        match self.lifecycle.records().get_scan(&scan.id).await {
            Ok(_) => return Err(LifecycleError::invalid_record("scan", &scan.id, "id already exists")),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }

        let scanner = self.lifecycle.records().get_scanner(&scan.scanner_id).await?;
        self.registry().validate_scan_options(&scanner.backend, &scan.options)?;
        self.lifecycle.records().save_scan(&scan).await?;
        tracing::info!(scan_id = %scan.id, scanner_id = %scanner.id, name = %scan.name, "Scan added");
        Ok(scan.id)
    }

    /// Applies the editable fields of `edit` to the stored scan with the
    /// same id.
    ///
    /// Name, target, notes, automation flags and options are taken from
    /// `edit`. Owner, status, job handle, result, export progress and
    /// timestamps stay as stored.
    ///
    /// # Returns
    ///
    /// The record as saved.
    pub async fn update_scan(&self, edit: ScanRecord) -> LifecycleResult<ScanRecord> {
        let mut scan = self.lifecycle.records().get_scan(&edit.id).await?;
        let scanner = self.lifecycle.records().get_scanner(&scan.scanner_id).await?;
        self.registry().validate_scan_options(&scanner.backend, &edit.options)?;

        scan.name = edit.name;
        scan.target = edit.target;
        scan.notes = edit.notes;
        scan.automation = edit.automation;
        scan.options = edit.options;
        self.lifecycle.records().save_scan(&scan).await?;
        tracing::info!(scan_id = %scan.id, status = scan.status.code(), "Scan updated");
        Ok(scan)
    }

    /// Returns a scan record.
    pub async fn scan(&self, id: &ScanId) -> LifecycleResult<ScanRecord> {
        Ok(self.lifecycle.records().get_scan(id).await?)
    }

    /// Returns the artifact of a retrieved scan.
    pub async fn scan_result(&self, id: &ScanId) -> LifecycleResult<Option<Vec<u8>>> {
        self.lifecycle.result(id).await
    }

    /// Collects the artifacts of several scans.
    pub async fn results_for(&self, ids: &[ScanId]) -> LifecycleResult<ResultBatch> {
        let mut batch = ResultBatch::default();
        for id in ids {
            match self.lifecycle.result(id).await {
                Ok(Some(bytes)) => batch.results.push((id.clone(), bytes)),
                Ok(None) => batch.missing.push(id.clone()),
                Err(e) if e.is_not_found() => batch.missing.push(id.clone()),
                Err(e) => return Err(e),
            }
        }
        Ok(batch)
    }

    /// Spawns the worker pool and the sweep loop. Must be called from
    /// within a tokio runtime.
    pub fn start(&self) -> RunningOrchestrator {
        let cancel = CancellationToken::new();
        let lifecycle = self.lifecycle.clone().with_cancel(cancel.child_token());

        let pool = Arc::new(WorkerPool::spawn(
            lifecycle.clone(),
            self.config.max_concurrent_tasks,
            cancel.child_token(),
        ));
        let sweeper = Sweeper::new(&lifecycle, pool.clone()).with_interval(self.config.sweep_interval);
        let commands = CommandService::new(lifecycle, pool.clone());

        let sweep_loop = tokio::spawn({
            let sweeper = sweeper.clone();
            let cancel = cancel.child_token();
            async move { sweeper.run(cancel).await }
        });

        tracing::info!(
            max_concurrent_tasks = self.config.max_concurrent_tasks,
            sweep_interval_secs = self.config.sweep_interval.as_secs(),
            "Orchestrator started"
        );
        RunningOrchestrator {
            orchestrator: self.clone(),
            pool,
            sweeper,
            commands,
            cancel,
            sweep_loop: Mutex::new(Some(sweep_loop)),
        }
    }
}

/// Handle to a started [`Orchestrator`].
#[derive(Debug)]
pub struct RunningOrchestrator {
    orchestrator: Orchestrator,
    pool: Arc<WorkerPool>,
    sweeper: Sweeper,
    commands: CommandService,
    cancel: CancellationToken,
    sweep_loop: Mutex<Option<JoinHandle<()>>>,
}

impl RunningOrchestrator {
    /// Returns the orchestrator.
    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Returns the manual command service.
    pub fn commands(&self) -> &CommandService {
        &self.commands
    }

    /// Returns the worker pool.
    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Runs a sweep now, outside the periodic schedule.
    pub async fn sweep_once(&self) -> StoreResult<SweepReport> {
        self.sweeper.sweep_once().await
    }

    /// Stops the sweep loop, suspends export waits and drains the worker
    /// pool.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let sweep_loop = self
            .sweep_loop
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(sweep_loop) = sweep_loop {
            if let Err(e) = sweep_loop.await {
                tracing::error!(error = %e, "Sweep loop panicked");
            }
        }
        self.pool.shutdown().await;
        tracing::info!("Orchestrator stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{BackendDescriptor, MockBackend};
    use crate::commands::{CommandCode, TargetType};
    use crate::core::record::AutomationFlags;
    use crate::core::schema::{ConfigField, ConfigSchema};
    use crate::core::types::JobHandle;

    fn registry(backend: Arc<MockBackend>) -> BackendRegistry {
        BackendRegistry::builder()
            .register(
                BackendDescriptor::shared("mock", "Mock", backend)
                    .with_scanner_schema(ConfigSchema::new([ConfigField::string("host", "Host")]))
                    .with_scan_schema(ConfigSchema::new([ConfigField::optional_integer("depth", "Depth")])),
            )
            .build()
    }

    fn orchestrator(backend: Arc<MockBackend>) -> Orchestrator {
        Orchestrator::builder().with_registry(registry(backend)).build().unwrap()
    }

    fn scanner() -> ScannerRecord {
        ScannerRecord::new("lab", "mock").with_setting("host", "lab.local")
    }

    #[test]
    fn test_build_rejects_empty_registry() {
        let err = Orchestrator::builder()
            .with_registry(BackendRegistry::builder().build())
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[tokio::test]
    async fn test_register_scanner_validates_settings() {
        let orch = orchestrator(Arc::new(MockBackend::new()));

        let err = orch
            .register_scanner(ScannerRecord::new("bare", "mock"))
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::Config(ConfigError::MissingField { .. })));

        let err = orch
            .register_scanner(ScannerRecord::new("odd", "openvas"))
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::Config(ConfigError::UnknownBackend { .. })));

        let id = orch.register_scanner(scanner()).await.unwrap();
        let mut updated = orch.lifecycle().records().get_scanner(&id).await.unwrap();
        updated.notes = "moved racks".into();
        orch.update_scanner(updated).await.unwrap();
    }

    #[tokio::test]
    async fn test_add_scan_validates_owner_and_options() {
        let orch = orchestrator(Arc::new(MockBackend::new()));
        let scanner_id = orch.register_scanner(scanner()).await.unwrap();

        let orphan = ScanRecord::new(ScannerId::from("ghost"), "orphan", "t");
        assert!(orch.add_scan(orphan).await.unwrap_err().is_not_found());

        let bad = ScanRecord::new(scanner_id.clone(), "bad", "t").with_option("depth", "deep");
        assert!(matches!(
            orch.add_scan(bad).await.unwrap_err(),
            LifecycleError::Config(ConfigError::InvalidType { .. })
        ));

        let ok = ScanRecord::new(scanner_id, "ok", "t").with_option("depth", 3);
        let id = orch.add_scan(ok).await.unwrap();
        assert_eq!(orch.scan(&id).await.unwrap().status, ScanStatus::New);
    }

    #[tokio::test]
    async fn test_add_scan_rejects_lifecycle_state_and_taken_ids() {
        let orch = orchestrator(Arc::new(MockBackend::new()));
        let lab = scanner();
        let scanner_id = orch.register_scanner(lab.clone()).await.unwrap();

        let retrieved = ScanRecord::new(scanner_id.clone(), "done", "t").with_status(ScanStatus::Retrieved);
        let creating = ScanRecord::new(scanner_id.clone(), "busy", "t").with_status(ScanStatus::Creating);
        let handled = ScanRecord::new(scanner_id.clone(), "handled", "t").with_job_handle("42");
        for scan in [retrieved, creating, handled] {
            let err = orch.add_scan(scan).await.unwrap_err();
            assert!(matches!(err, LifecycleError::InvalidRecord { kind: "scan", .. }), "{err}");
        }

        let id = orch.add_scan(ScanRecord::new(scanner_id.clone(), "first", "t")).await.unwrap();
        let mut twin = ScanRecord::new(scanner_id, "second", "t");
        twin.id = id.clone();
        let err = orch.add_scan(twin).await.unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidRecord { reason: "id already exists", .. }));
        assert_eq!(orch.scan(&id).await.unwrap().name, "first");

        assert!(matches!(
            orch.register_scanner(lab).await.unwrap_err(),
            LifecycleError::InvalidRecord { kind: "scanner", .. }
        ));
    }

    #[tokio::test]
    async fn test_update_scan_keeps_lifecycle_fields() {
        let orch = orchestrator(Arc::new(MockBackend::new()));
        let scanner_id = orch.register_scanner(scanner()).await.unwrap();
        let id = orch.add_scan(ScanRecord::new(scanner_id.clone(), "weekly", "10.0.0.1")).await.unwrap();

        let created = orch.scan(&id).await.unwrap().with_status(ScanStatus::Created).with_job_handle("42");
        orch.lifecycle().records().save_scan(&created).await.unwrap();

        let mut edit = ScanRecord::new(scanner_id.clone(), "weekly dmz", "10.0.0.1,10.0.0.2")
            .with_notes("dmz added")
            .with_automation(AutomationFlags::all())
            .with_option("depth", 2);
        edit.id = id.clone();
        let saved = orch.update_scan(edit).await.unwrap();

        assert_eq!(saved, orch.scan(&id).await.unwrap());
        assert_eq!(saved.name, "weekly dmz");
        assert_eq!(saved.target_list(), vec!["10.0.0.1".to_string(), "10.0.0.2".to_string()]);
        assert_eq!(saved.notes, "dmz added");
        assert_eq!(saved.automation, AutomationFlags::all());
        assert_eq!(saved.status, ScanStatus::Created);
        assert_eq!(saved.job_handle, Some(JobHandle::new("42")));
        assert_eq!(saved.created_at, created.created_at);

        let mut bad = ScanRecord::new(scanner_id.clone(), "weekly", "t").with_option("depth", "deep");
        bad.id = id.clone();
        assert!(matches!(
            orch.update_scan(bad).await.unwrap_err(),
            LifecycleError::Config(ConfigError::InvalidType { .. })
        ));
        assert!(orch
            .update_scan(ScanRecord::new(scanner_id, "ghost", "t"))
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_sweeps_drive_scan_to_retrieved() {
        let backend = Arc::new(MockBackend::new().with_artifact(b"findings".to_vec()));
        let orch = orchestrator(backend.clone());
        let scanner_id = orch.register_scanner(scanner()).await.unwrap();
        let id = orch
            .add_scan(ScanRecord::new(scanner_id, "full", "10.0.0.0/24").with_automation(AutomationFlags::all()))
            .await
            .unwrap();

        let running = orch.start();
        let expected = [
            ScanStatus::Created,
            ScanStatus::InProgress,
            ScanStatus::Finished,
            ScanStatus::Retrieved,
        ];
        for status in expected {
            running.sweep_once().await.unwrap();
            running.pool().wait_idle().await;
            assert_eq!(orch.scan(&id).await.unwrap().status, status);
        }

        let report = running.sweep_once().await.unwrap();
        assert_eq!(report.dispatched.total(), 0);

        assert_eq!(orch.scan_result(&id).await.unwrap(), Some(b"findings".to_vec()));
        let batch = orch.results_for(&[id.clone(), ScanId::from("nope")]).await.unwrap();
        assert_eq!(batch.results, vec![(id, b"findings".to_vec())]);
        assert_eq!(batch.missing, vec![ScanId::from("nope")]);

        assert_eq!(backend.last_request().unwrap().targets, vec!["10.0.0.0/24".to_string()]);
        running.shutdown().await;
    }

    #[tokio::test]
    async fn test_manual_commands_through_running_handle() {
        let backend = Arc::new(MockBackend::new());
        let orch = orchestrator(backend.clone());
        let scanner_id = orch.register_scanner(scanner()).await.unwrap();
        let id = orch
            .add_scan(ScanRecord::new(scanner_id.clone(), "manual", "t"))
            .await
            .unwrap();

        let running = orch.start();
        let report = running
            .commands()
            .batch(CommandCode::Create, TargetType::Scan, &[id.to_string()])
            .await;
        assert!(report.all_succeeded());
        running.pool().wait_idle().await;
        assert_eq!(orch.scan(&id).await.unwrap().status, ScanStatus::Created);

        let report = running
            .commands()
            .batch(CommandCode::Delete, TargetType::Scanner, &[scanner_id.to_string()])
            .await;
        assert!(report.all_succeeded());
        assert!(orch.scan(&id).await.unwrap_err().is_not_found());
        running.shutdown().await;
    }
}
