//! Background worker pool for dispatched tasks.

use crate::core::error::DispatchError;
use crate::dispatch::task::{Task, TaskQueue};
use crate::lifecycle::{ScanLifecycle, Transition};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
struct Counters {
    active: AtomicU64,
    pending: AtomicU64,
    completed: AtomicU64,
}

/// Runs tasks against a [`ScanLifecycle`] with bounded concurrency.
///
/// An unbounded channel feeds a dispatcher loop that spawns one tokio task
/// per unit of work, holding a semaphore permit for its duration. Units for
/// different scans run concurrently; nothing here serializes units for the
/// same scan.
#[derive(Debug)]
pub struct WorkerPool {
    sender: mpsc::UnboundedSender<Task>,
    counters: Arc<Counters>,
    max_concurrent: usize,
    cancel: CancellationToken,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Spawns the dispatcher loop. Must be called from within a tokio
    /// runtime.
    ///
    /// Cancelling `cancel` stops the pool from taking queued work; units
    /// already running are awaited.
    pub fn spawn(lifecycle: ScanLifecycle, max_concurrent: usize, cancel: CancellationToken) -> Self {
        let max_concurrent = max_concurrent.max(1);
        let (sender, receiver) = mpsc::unbounded_channel();
        let counters = Arc::new(Counters::default());

        let dispatcher = tokio::spawn(dispatch_loop(
            lifecycle,
            receiver,
            Arc::new(Semaphore::new(max_concurrent)),
            counters.clone(),
            cancel.clone(),
        ));

        Self {
            sender,
            counters,
            max_concurrent,
            cancel,
            dispatcher: Mutex::new(Some(dispatcher)),
        }
    }

    /// Returns the maximum number of concurrently running units.
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Returns the number of units currently running.
    pub fn active_count(&self) -> u64 {
        self.counters.active.load(Ordering::SeqCst)
    }

    /// Returns the number of units accepted but not yet started.
    pub fn pending_count(&self) -> u64 {
        self.counters.pending.load(Ordering::SeqCst)
    }

    /// Returns the number of units that have finished.
    pub fn completed_count(&self) -> u64 {
        self.counters.completed.load(Ordering::SeqCst)
    }

    /// Returns true if every running slot is taken.
    pub fn is_full(&self) -> bool {
        self.active_count() >= self.max_concurrent as u64
    }

    /// Waits until no unit is pending or running.
    pub async fn wait_idle(&self) {
        while self.pending_count() > 0 || self.active_count() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Stops taking work and waits for running units to finish.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let dispatcher = self
            .dispatcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(dispatcher) = dispatcher {
            if let Err(e) = dispatcher.await {
                tracing::error!(error = %e, "Dispatcher loop panicked");
            }
        }
        tracing::info!(
            completed = self.completed_count(),
            dropped = self.pending_count(),
            "Worker pool stopped"
        );
    }
}

impl TaskQueue for WorkerPool {
    fn enqueue(&self, task: Task) -> Result<(), DispatchError> {
        if self.cancel.is_cancelled() {
            return Err(DispatchError::Closed);
        }
        self.counters.pending.fetch_add(1, Ordering::SeqCst);
        self.sender.send(task).map_err(|_| {
            self.counters.pending.fetch_sub(1, Ordering::SeqCst);
            DispatchError::Closed
        })
    }
}

async fn dispatch_loop(
    lifecycle: ScanLifecycle,
    mut receiver: mpsc::UnboundedReceiver<Task>,
    semaphore: Arc<Semaphore>,
    counters: Arc<Counters>,
    cancel: CancellationToken,
) {
    let mut running = JoinSet::new();

    loop {
        let task = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            task = receiver.recv() => match task {
                Some(task) => task,
                None => break,
            },
        };

        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            permit = semaphore.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        counters.active.fetch_add(1, Ordering::SeqCst);
        counters.pending.fetch_sub(1, Ordering::SeqCst);

        let lifecycle = lifecycle.clone();
        let counters = counters.clone();
        running.spawn(async move {
            let _permit = permit;
            run_task(&lifecycle, &task).await;
            counters.completed.fetch_add(1, Ordering::SeqCst);
            counters.active.fetch_sub(1, Ordering::SeqCst);
        });

        while let Some(joined) = running.try_join_next() {
            log_join(joined);
        }
    }

    receiver.close();
    if !running.is_empty() {
        tracing::info!(in_flight = running.len(), "Draining in-flight tasks");
    }
    while let Some(joined) = running.join_next().await {
        log_join(joined);
    }
}

fn log_join(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        tracing::error!(error = %e, "Task panicked");
    }
}

async fn run_task(lifecycle: &ScanLifecycle, task: &Task) {
    match lifecycle.execute(&task.scan_id, task.action, task.trigger).await {
        Ok(Transition::Rejected { status }) if task.trigger.is_auto() => {
            tracing::debug!(
                scan_id = %task.scan_id,
                action = %task.action,
                status = status.code(),
                "Automatic task no longer applicable"
            );
        }
        Ok(Transition::Rejected { status }) => {
            tracing::warn!(
                scan_id = %task.scan_id,
                action = %task.action,
                status = status.code(),
                "Manual task rejected"
            );
        }
        Ok(transition) => {
            tracing::debug!(
                scan_id = %task.scan_id,
                action = %task.action,
                status = transition.status().code(),
                "Task finished"
            );
        }
        Err(e) if e.is_not_found() => {
            tracing::warn!(
                scan_id = %task.scan_id,
                action = %task.action,
                error = %e,
                "Skipping task for missing record"
            );
        }
        Err(e) => {
            tracing::error!(scan_id = %task.scan_id, action = %task.action, error = %e, "Task failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{BackendDescriptor, BackendRegistry, MockBackend};
    use crate::core::record::{ScanRecord, ScannerRecord};
    use crate::core::types::{Action, ScanId, ScanStatus};
    use crate::store::{MemoryBlobStore, MemoryRecordStore, RecordStore};

    async fn setup(backend: Arc<MockBackend>) -> (ScanLifecycle, Arc<MemoryRecordStore>, ScanId) {
        let registry = BackendRegistry::builder()
            .register(BackendDescriptor::shared("mock", "Mock", backend))
            .build();
        let records = Arc::new(MemoryRecordStore::new());
        let scanner = ScannerRecord::new("pool scanner", "mock");
        records.save_scanner(&scanner).await.unwrap();
        let scan = ScanRecord::new(scanner.id.clone(), "pool scan", "10.0.0.1");
        records.save_scan(&scan).await.unwrap();

        let lifecycle = ScanLifecycle::new(records.clone(), Arc::new(MemoryBlobStore::new()), Arc::new(registry));
        (lifecycle, records, scan.id)
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_create_calls_backend_once() {
        let backend = Arc::new(MockBackend::new().with_latency(Duration::from_millis(100)));
        let (lifecycle, records, scan_id) = setup(backend.clone()).await;
        let pool = WorkerPool::spawn(lifecycle, 4, CancellationToken::new());

        pool.enqueue(Task::automatic(scan_id.clone(), Action::Create)).unwrap();
        pool.enqueue(Task::automatic(scan_id.clone(), Action::Create)).unwrap();
        pool.wait_idle().await;

        assert_eq!(backend.create_count(), 1);
        assert_eq!(records.get_scan(&scan_id).await.unwrap().status, ScanStatus::Created);
        assert_eq!(pool.completed_count(), 2);
        pool.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_record_is_skipped() {
        let backend = Arc::new(MockBackend::new());
        let (lifecycle, _records, _) = setup(backend.clone()).await;
        let pool = WorkerPool::spawn(lifecycle, 1, CancellationToken::new());

        pool.enqueue(Task::manual(ScanId::from("missing"), Action::Start)).unwrap();
        pool.wait_idle().await;

        assert_eq!(backend.start_count(), 0);
        assert_eq!(pool.completed_count(), 1);
        pool.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_drains_running_and_closes_queue() {
        let backend = Arc::new(MockBackend::new().with_latency(Duration::from_secs(5)));
        let (lifecycle, records, scan_id) = setup(backend.clone()).await;
        let pool = WorkerPool::spawn(lifecycle, 1, CancellationToken::new());

        pool.enqueue(Task::automatic(scan_id.clone(), Action::Create)).unwrap();
        while pool.active_count() == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert!(pool.is_full());

        pool.shutdown().await;
        assert_eq!(pool.active_count(), 0);
        assert_eq!(records.get_scan(&scan_id).await.unwrap().status, ScanStatus::Created);
        assert_eq!(
            pool.enqueue(Task::automatic(scan_id, Action::Poll)),
            Err(DispatchError::Closed)
        );
    }
}
