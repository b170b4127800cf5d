//! The periodic automation sweep.

use crate::audit;
use crate::automation::decide::decide;
use crate::backends::BackendRegistry;
use crate::config::HttpSettings;
use crate::core::error::StoreResult;
use crate::core::record::ScannerRecord;
use crate::core::types::Action;
use crate::dispatch::{ArcTaskQueue, Task};
use crate::lifecycle::{Guards, ScanLifecycle};
use crate::store::ArcRecordStore;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Number of tasks dispatched per action in one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchCounts {
    /// Create tasks.
    pub create: usize,
    /// Start tasks.
    pub start: usize,
    /// Poll tasks.
    pub poll: usize,
    /// Retrieve tasks.
    pub retrieve: usize,
}

impl DispatchCounts {
    fn record(&mut self, action: Action) {
        match action {
            Action::Create => self.create += 1,
            Action::Start => self.start += 1,
            Action::Poll => self.poll += 1,
            Action::Retrieve => self.retrieve += 1,
            Action::Pause | Action::Resume | Action::Stop => {}
        }
    }

    /// Returns the total number of dispatched tasks.
    pub fn total(&self) -> usize {
        self.create + self.start + self.poll + self.retrieve
    }
}

/// Summary of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Scanners visited.
    pub scanners: usize,
    /// Scans visited.
    pub scans: usize,
    /// Tasks dispatched.
    pub dispatched: DispatchCounts,
    /// Ids of scanners skipped because their backend is unavailable.
    pub skipped_scanners: Vec<String>,
    /// Tasks the queue refused.
    pub enqueue_failures: usize,
}

/// Walks every scan and dispatches the one action each is due for.
///
/// A sweep only reads the record store and enqueues tasks; remote calls
/// happen later, in whatever executes the queue.
#[derive(Debug, Clone)]
pub struct Sweeper {
    records: ArcRecordStore,
    registry: Arc<BackendRegistry>,
    http: HttpSettings,
    queue: ArcTaskQueue,
    interval: Duration,
}

impl Sweeper {
    /// Creates a sweeper over the stores and registry of `lifecycle`.
    pub fn new(lifecycle: &ScanLifecycle, queue: ArcTaskQueue) -> Self {
        Self {
            records: lifecycle.records().clone(),
            registry: lifecycle.registry().clone(),
            http: lifecycle.http().clone(),
            queue,
            interval: Duration::from_secs(60),
        }
    }

    /// Sets the sweep period.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Returns the sweep period.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    fn guards_for(&self, scanner: &ScannerRecord) -> Option<Guards> {
        match self.registry.instantiate(scanner, &self.http) {
            Ok(backend) => Some(Guards::new(backend.capabilities())),
            Err(e) => {
                tracing::warn!(
                    scanner_id = %scanner.id,
                    backend = %scanner.backend,
                    error = %e,
                    "Skipping scanner"
                );
                None
            }
        }
    }

    /// Runs one sweep.
    ///
    /// # Errors
    ///
    /// Only a failure to list scanners aborts the sweep. A scanner whose
    /// scans cannot be listed is skipped.
    pub async fn sweep_once(&self) -> StoreResult<SweepReport> {
        let mut report = SweepReport::default();

        for scanner in self.records.list_scanners().await? {
            report.scanners += 1;

            let Some(guards) = self.guards_for(&scanner) else {
                report.skipped_scanners.push(scanner.id.to_string());
                continue;
            };

            let scans = match self.records.scans_for(&scanner.id).await {
                Ok(scans) => scans,
                Err(e) => {
                    tracing::warn!(scanner_id = %scanner.id, error = %e, "Failed to list scans");
                    report.skipped_scanners.push(scanner.id.to_string());
                    continue;
                }
            };

            for scan in scans {
                report.scans += 1;
                let Some(action) = decide(&scan, &guards) else {
                    continue;
                };
                match self.queue.enqueue(Task::automatic(scan.id.clone(), action)) {
                    Ok(()) => report.dispatched.record(action),
                    Err(e) => {
                        tracing::warn!(scan_id = %scan.id, action = %action, error = %e, "Failed to enqueue task");
                        report.enqueue_failures += 1;
                    }
                }
            }
        }

        audit::emit_sweep_completed(&report);
        Ok(report)
    }

    /// Sweeps every period until `cancel` fires. The first sweep runs one
    /// period after the call.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(interval_secs = self.interval.as_secs(), "Automation sweep started");
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep_once().await {
                        tracing::error!(error = %e, "Sweep failed");
                    }
                }
            }
        }
        tracing::info!("Automation sweep stopped");
    }
}
