//! Manual command submission.

use crate::audit::{self, DeletionAuditEvent};
use crate::commands::{BatchReport, CommandCode, TargetType};
use crate::core::error::CommandError;
use crate::core::record::ScanRecord;
use crate::core::types::{Action, ScanId, ScanStatus, ScannerId, Trigger};
use crate::dispatch::{ArcTaskQueue, Task};
use crate::lifecycle::ScanLifecycle;

use chrono::Utc;

/// Accepts manual commands and queues them for execution.
#[derive(Debug, Clone)]
pub struct CommandService {
    lifecycle: ScanLifecycle,
    queue: ArcTaskQueue,
}

impl CommandService {
    /// Creates a service that checks guards through `lifecycle` and queues
    /// work on `queue`.
    pub fn new(lifecycle: ScanLifecycle, queue: ArcTaskQueue) -> Self {
        Self { lifecycle, queue }
    }

    /// Checks the guard of `action` as a manual command and queues it.
    ///
    /// The guard runs again when the task executes, so a command accepted
    /// here can still turn into a no-op if the scan moves first.
    ///
    /// # Returns
    ///
    /// The status the guard was checked against.
    ///
    /// # Errors
    ///
    /// [`CommandError::Rejected`] if the guard fails, nothing is queued.
    pub async fn submit(&self, id: &ScanId, action: Action) -> Result<ScanStatus, CommandError> {
        let (allowed, status) = self.lifecycle.check(id, action, Trigger::Manual).await?;
        if !allowed {
            tracing::info!(scan_id = %id, action = %action, status = status.code(), "Manual command rejected");
            return Err(CommandError::Rejected {
                scan_id: id.clone(),
                command: action.as_str(),
                status,
            });
        }

        self.queue.enqueue(Task::manual(id.clone(), action))?;
        tracing::debug!(scan_id = %id, action = %action, "Manual command queued");
        Ok(status)
    }

    /// Deletes a scan record and its stored artifact.
    pub async fn delete_scan(&self, id: &ScanId) -> Result<ScanRecord, CommandError> {
        let scan = self.lifecycle.records().delete_scan(id).await?;
        self.delete_artifact(&scan).await;

        audit::emit_record_deleted(&DeletionAuditEvent {
            timestamp: Utc::now(),
            kind: "scan".into(),
            id: scan.id.to_string(),
            name: scan.name.clone(),
            cascaded_scans: 0,
        });
        Ok(scan)
    }

    /// Deletes a scanner record along with its scans and their artifacts.
    ///
    /// # Returns
    ///
    /// The scans removed with it.
    pub async fn delete_scanner(&self, id: &ScannerId) -> Result<Vec<ScanRecord>, CommandError> {
        let scanner = self.lifecycle.records().get_scanner(id).await?;
        let scans = self.lifecycle.records().delete_scanner(id).await?;
        for scan in &scans {
            self.delete_artifact(scan).await;
        }

        audit::emit_record_deleted(&DeletionAuditEvent {
            timestamp: Utc::now(),
            kind: "scanner".into(),
            id: scanner.id.to_string(),
            name: scanner.name,
            cascaded_scans: scans.len(),
        });
        Ok(scans)
    }

    async fn delete_artifact(&self, scan: &ScanRecord) {
        let Some(result) = &scan.result else {
            return;
        };
        if let Err(e) = self.lifecycle.blobs().delete(result).await {
            tracing::warn!(scan_id = %scan.id, key = %result.key, error = %e, "Failed to delete artifact");
        }
    }

    /// Applies `command` to every id in `ids`.
    ///
    /// Ids without a record are reported in `missing`. Ids whose record
    /// exists but that the command cannot apply to are reported in
    /// `unsuccessful`; for scanner targets that is every command but
    /// delete.
    pub async fn batch(&self, command: CommandCode, target: TargetType, ids: &[String]) -> BatchReport {
        let mut report = BatchReport::new(command, target);

        for id in ids {
            let outcome = match (target, command.action()) {
                (TargetType::Scan, Some(action)) => self.submit(&ScanId::from(id.as_str()), action).await.map(|_| ()),
                (TargetType::Scan, None) => self.delete_scan(&ScanId::from(id.as_str())).await.map(|_| ()),
                (TargetType::Scanner, None) => self.delete_scanner(&ScannerId::from(id.as_str())).await.map(|_| ()),
                (TargetType::Scanner, Some(_)) => {
                    match self.lifecycle.records().get_scanner(&ScannerId::from(id.as_str())).await {
                        Ok(_) => Err(CommandError::NotApplicable {
                            command: command.code(),
                            target: "scanner",
                        }),
                        Err(e) => Err(e.into()),
                    }
                }
            };

            match outcome {
                Ok(()) => report.succeeded.push(id.clone()),
                Err(e) if e.is_not_found() => report.missing.push(id.clone()),
                Err(e) => {
                    tracing::debug!(id = %id, command = %command, error = %e, "Batch command not applied");
                    report.unsuccessful.push(id.clone());
                }
            }
        }

        audit::emit_batch_command(&report);
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{BackendDescriptor, BackendRegistry, MockBackend};
    use crate::core::error::DispatchError;
    use crate::core::record::ScannerRecord;
    use crate::dispatch::TaskQueue;
    use crate::store::{BlobStore, MemoryBlobStore, MemoryRecordStore, RecordStore};
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Default)]
    struct RecordingQueue {
        tasks: Mutex<Vec<Task>>,
    }

    impl TaskQueue for RecordingQueue {
        fn enqueue(&self, task: Task) -> Result<(), DispatchError> {
            self.tasks.lock().unwrap().push(task);
            Ok(())
        }
    }

    struct Fixture {
        service: CommandService,
        queue: Arc<RecordingQueue>,
        records: Arc<MemoryRecordStore>,
        blobs: Arc<MemoryBlobStore>,
        scanner: ScannerRecord,
    }

    impl Fixture {
        async fn new() -> Self {
            let registry = BackendRegistry::builder()
                .register(BackendDescriptor::shared("mock", "Mock", Arc::new(MockBackend::new())))
                .build();
            let records = Arc::new(MemoryRecordStore::new());
            let blobs = Arc::new(MemoryBlobStore::new());
            let scanner = ScannerRecord::new("cmd scanner", "mock");
            records.save_scanner(&scanner).await.unwrap();

            let lifecycle = ScanLifecycle::new(records.clone(), blobs.clone(), Arc::new(registry));
            let queue = Arc::new(RecordingQueue::default());
            Self {
                service: CommandService::new(lifecycle, queue.clone()),
                queue,
                records,
                blobs,
                scanner,
            }
        }

        async fn scan(&self, name: &str, status: ScanStatus) -> ScanRecord {
            let scan = ScanRecord::new(self.scanner.id.clone(), name, "10.0.0.1").with_status(status);
            self.records.save_scan(&scan).await.unwrap();
            scan
        }
    }

    #[tokio::test]
    async fn test_submit_queues_manual_task() {
        let fx = Fixture::new().await;
        let scan = fx.scan("a", ScanStatus::Finished).await;

        let status = fx.service.submit(&scan.id, Action::Create).await.unwrap();
        assert_eq!(status, ScanStatus::Finished);
        assert_eq!(
            fx.queue.tasks.lock().unwrap().as_slice(),
            &[Task::manual(scan.id, Action::Create)]
        );
    }

    #[tokio::test]
    async fn test_submit_rejected_queues_nothing() {
        let fx = Fixture::new().await;
        let scan = fx.scan("a", ScanStatus::InProgress).await;

        let err = fx.service.submit(&scan.id, Action::Start).await.unwrap_err();
        assert!(matches!(
            err,
            CommandError::Rejected { command: "start", status: ScanStatus::InProgress, .. }
        ));
        assert!(fx.queue.tasks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_batch_separates_missing_from_rejected() {
        let fx = Fixture::new().await;
        let ready = fx.scan("ready", ScanStatus::Finished).await;
        let busy = fx.scan("busy", ScanStatus::Retrieving).await;

        let ids = vec![ready.id.to_string(), busy.id.to_string(), "nope".to_string()];
        let report = fx.service.batch(CommandCode::Retrieve, TargetType::Scan, &ids).await;

        assert_eq!(report.succeeded, vec![ready.id.to_string()]);
        assert_eq!(report.unsuccessful, vec![busy.id.to_string()]);
        assert_eq!(report.missing, vec!["nope".to_string()]);
        assert!(!report.all_succeeded());
    }

    #[tokio::test]
    async fn test_batch_delete_scanner_cascades_to_artifacts() {
        let fx = Fixture::new().await;
        let mut scan = fx.scan("done", ScanStatus::Retrieved).await;
        scan.result = Some(fx.blobs.save(&scan.id, b"report").await.unwrap());
        fx.records.save_scan(&scan).await.unwrap();
        fx.scan("other", ScanStatus::New).await;

        let ids = vec![fx.scanner.id.to_string()];
        let report = fx.service.batch(CommandCode::Delete, TargetType::Scanner, &ids).await;

        assert_eq!(report.succeeded, ids);
        assert_eq!(fx.records.scan_count(), 0);
        assert!(fx.blobs.is_empty());
        assert!(fx.records.get_scanner(&fx.scanner.id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_batch_non_delete_on_scanner_is_unsuccessful() {
        let fx = Fixture::new().await;
        let ids = vec![fx.scanner.id.to_string(), "ghost".to_string()];
        let report = fx.service.batch(CommandCode::Start, TargetType::Scanner, &ids).await;

        assert!(report.succeeded.is_empty());
        assert_eq!(report.unsuccessful, vec![fx.scanner.id.to_string()]);
        assert_eq!(report.missing, vec!["ghost".to_string()]);
    }

    #[tokio::test]
    async fn test_batch_delete_scans() {
        let fx = Fixture::new().await;
        let scan = fx.scan("gone", ScanStatus::Errors).await;

        let ids = vec![scan.id.to_string(), scan.id.to_string()];
        let report = fx.service.batch(CommandCode::Delete, TargetType::Scan, &ids).await;
        assert_eq!(report.succeeded, vec![scan.id.to_string()]);
        assert_eq!(report.missing, vec![scan.id.to_string()]);
    }
}
