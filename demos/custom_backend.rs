//! Custom backend example demonstrating how to plug a new engine in.
//!
//! This example shows how to:
//! - Implement the Backend trait for an in-process engine
//! - Register it with a settings schema and a factory
//! - Drive a scan with manual commands
//!
//! Run with: cargo run --example custom_backend

use async_trait::async_trait;
use scanpilot::core::{ConfigField, ConfigSchema};
use scanpilot::prelude::*;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// An engine that reports completion after a fixed number of polls.
#[derive(Debug)]
struct CountdownBackend {
    name: String,
    polls_until_done: u64,
    polls: AtomicU64,
}

impl CountdownBackend {
    fn from_record(record: &ScannerRecord) -> Result<Self, BackendError> {
        let polls_until_done = record.setting_i64("polls_until_done").unwrap_or(2).max(0) as u64;
        Ok(Self {
            name: record.name.clone(),
            polls_until_done,
            polls: AtomicU64::new(0),
        })
    }
}

#[async_trait]
impl Backend for CountdownBackend {
    fn kind(&self) -> &str {
        "countdown"
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::two_step()
    }

    async fn create_job(&self, request: &JobRequest) -> Option<JobHandle> {
        tracing::info!(backend = %self.name, targets = ?request.targets, "Creating countdown job");
        Some(JobHandle::new(format!("countdown-{}", request.name)))
    }

    async fn start_job(&self, _handle: &JobHandle) -> bool {
        true
    }

    async fn poll_job(&self, _handle: &JobHandle) -> JobPoll {
        let n = self.polls.fetch_add(1, Ordering::Relaxed) + 1;
        if n >= self.polls_until_done {
            JobPoll::Done
        } else {
            JobPoll::Running
        }
    }

    async fn retrieve_job(&self, handle: &JobHandle, _ctx: &RetrievalContext) -> RetrieveOutcome {
        RetrieveOutcome::Retrieved(format!("host,finding\n{handle},none\n").into_bytes())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("=== Custom Backend Example ===\n");

    // The factory runs for every action, so backend state is rebuilt from
    // the record each time. Share one instance to keep the poll counter.
    let shared: Arc<CountdownBackend> = Arc::new(CountdownBackend::from_record(
        &ScannerRecord::new("countdown", "countdown").with_setting("polls_until_done", 2),
    )?);
    let registry = BackendRegistry::builder()
        .register(
            BackendDescriptor::new("countdown", "Countdown", move |_, _| Ok(shared.clone() as _)).with_scanner_schema(
                ConfigSchema::new([ConfigField::optional_integer("polls_until_done", "Polls until done")]),
            ),
        )
        .build();

    let orchestrator = Orchestrator::builder()
        .with_registry(registry)
        .with_config(AutomationConfig::new().with_sweep_interval(Duration::from_secs(3600)))
        .build()?;

    let scanner_id = orchestrator
        .register_scanner(ScannerRecord::new("countdown", "countdown").with_setting("polls_until_done", 2))
        .await?;
    let scan_id = orchestrator
        .add_scan(ScanRecord::new(scanner_id, "demo", "192.0.2.10\n192.0.2.11"))
        .await?;

    let running = orchestrator.start();

    println!("=== Manual create and start ===");
    for action in [Action::Create, Action::Start] {
        running.commands().submit(&scan_id, action).await?;
        running.pool().wait_idle().await;
        println!("{action}: {}", orchestrator.scan(&scan_id).await?.status);
    }

    println!("\n=== Starting again is rejected ===");
    match running.commands().submit(&scan_id, Action::Start).await {
        Err(e) => println!("Rejected: {e}"),
        Ok(_) => println!("Unexpectedly accepted"),
    }

    println!("\n=== Sweeping until finished ===");
    while orchestrator.scan(&scan_id).await?.status == ScanStatus::InProgress {
        let report = running.sweep_once().await?;
        running.pool().wait_idle().await;
        println!("Polled {} scan(s): {}", report.dispatched.poll, orchestrator.scan(&scan_id).await?.status);
    }

    running.commands().submit(&scan_id, Action::Retrieve).await?;
    running.pool().wait_idle().await;

    if let Some(result) = orchestrator.scan_result(&scan_id).await? {
        println!("\nResult:\n{}", String::from_utf8_lossy(&result));
    }

    running.shutdown().await;
    println!("=== Example Complete ===");
    Ok(())
}
