//! Automation loop example.
//!
//! Loads the automation settings from TOML, stores artifacts on disk and lets
//! the periodic sweep take a scan from NEW to RETRIEVED on its own, including
//! an export that needs several polls before it is ready.
//!
//! Run with: cargo run --example automation_loop

use scanpilot::backends::MockExportApi;
use scanpilot::export::ExportStatus;
use scanpilot::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const CONFIG: &str = r#"
sweep_interval_secs = 1
max_concurrent_tasks = 2

[export]
poll_interval_secs = 1
max_wait_secs = 2
"#;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,scanpilot=debug")))
        .init();

    let config = AutomationConfig::from_toml_str(CONFIG)?;
    let artifacts = tempfile::tempdir()?;

    let export = MockExportApi::new("T1", b"host,severity\n192.0.2.10,high\n".to_vec()).with_statuses([
        ExportStatus::NotReady,
        ExportStatus::NotReady,
        ExportStatus::NotReady,
    ]);
    let backend = Arc::new(MockBackend::new().with_export(export));
    let registry = BackendRegistry::builder()
        .register(BackendDescriptor::shared("mock", "Mock engine", backend))
        .build();

    let orchestrator = Orchestrator::builder()
        .with_registry(registry)
        .with_blobs(Arc::new(FilesystemBlobStore::new(artifacts.path())?))
        .with_config(config)
        .build()?;

    let scanner_id = orchestrator
        .register_scanner(ScannerRecord::new("mock engine", "mock"))
        .await?;
    let scan_id = orchestrator
        .add_scan(ScanRecord::new(scanner_id, "nightly", "192.0.2.0/24").with_automation(AutomationFlags::all()))
        .await?;

    let running = orchestrator.start();

    let mut last = ScanStatus::New;
    println!("{last}");
    while last != ScanStatus::Retrieved && last != ScanStatus::Errors {
        tokio::time::sleep(Duration::from_millis(200)).await;
        let scan = orchestrator.scan(&scan_id).await?;
        if scan.status != last {
            last = scan.status;
            match &scan.export {
                Some(progress) => println!("{last} (export {} after {} poll(s))", progress.token, progress.attempts),
                None => println!("{last}"),
            }
        }
    }

    running.shutdown().await;

    if let Some(csv) = orchestrator.scan_result(&scan_id).await? {
        println!("\nStored in {}:\n{}", artifacts.path().display(), String::from_utf8_lossy(&csv));
    }
    Ok(())
}
