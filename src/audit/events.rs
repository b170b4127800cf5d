//! Audit event types and emission functions.

use crate::automation::SweepReport;
use crate::commands::BatchReport;
use crate::core::record::ScanRecord;
use crate::core::types::{Action, ScanStatus, Trigger};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Base trait for audit events.
pub trait AuditEvent: Serialize {
    /// Returns the event type name.
    fn event_type(&self) -> &'static str;

    /// Returns the timestamp of the event.
    fn timestamp(&self) -> DateTime<Utc>;
}

/// Audit event for an applied status transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionAuditEvent {
    /// Timestamp of the event.
    pub timestamp: DateTime<Utc>,
    /// Scan that moved.
    pub scan_id: String,
    /// Owning scanner.
    pub scanner_id: String,
    /// Backend kind.
    pub backend: String,
    /// Action that caused the move.
    pub action: Action,
    /// Who asked for it.
    pub trigger: Trigger,
    /// Status before.
    pub from: ScanStatus,
    /// Status after.
    pub to: ScanStatus,
    /// Remote job handle after the transition.
    pub job_handle: Option<String>,
}

impl TransitionAuditEvent {
    /// Builds the event for `scan`, which is already in its new status.
    pub fn new(scan: &ScanRecord, backend: &str, action: Action, trigger: Trigger, from: ScanStatus) -> Self {
        Self {
            timestamp: Utc::now(),
            scan_id: scan.id.to_string(),
            scanner_id: scan.scanner_id.to_string(),
            backend: backend.to_string(),
            action,
            trigger,
            from,
            to: scan.status,
            job_handle: scan.job_handle.as_ref().map(|h| h.to_string()),
        }
    }
}

impl AuditEvent for TransitionAuditEvent {
    fn event_type(&self) -> &'static str {
        "scan_transition"
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Audit event for a completed sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepAuditEvent {
    /// Timestamp of the event.
    pub timestamp: DateTime<Utc>,
    /// The sweep's report.
    pub report: SweepReport,
}

impl AuditEvent for SweepAuditEvent {
    fn event_type(&self) -> &'static str {
        "sweep_completed"
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Audit event for a batch command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchAuditEvent {
    /// Timestamp of the event.
    pub timestamp: DateTime<Utc>,
    /// The batch's report.
    pub report: BatchReport,
}

impl AuditEvent for BatchAuditEvent {
    fn event_type(&self) -> &'static str {
        "batch_command"
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Audit event for a deleted record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionAuditEvent {
    /// Timestamp of the event.
    pub timestamp: DateTime<Utc>,
    /// "scan" or "scanner".
    pub kind: String,
    /// Record id.
    pub id: String,
    /// Record name.
    pub name: String,
    /// Scans removed along with a scanner.
    pub cascaded_scans: usize,
}

impl AuditEvent for DeletionAuditEvent {
    fn event_type(&self) -> &'static str {
        "record_deleted"
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Emits an audit event for an applied transition.
pub fn emit_transition(event: &TransitionAuditEvent) {
    tracing::info!(
        target: "scanpilot::audit",
        event_type = event.event_type(),
        scan_id = %event.scan_id,
        scanner_id = %event.scanner_id,
        backend = %event.backend,
        action = %event.action,
        trigger = %event.trigger,
        from = event.from.code(),
        to = event.to.code(),
        job_handle = ?event.job_handle,
        "Scan status changed"
    );
}

/// Emits an audit event for a completed sweep.
pub fn emit_sweep_completed(report: &SweepReport) {
    tracing::info!(
        target: "scanpilot::audit",
        event_type = "sweep_completed",
        scanners = report.scanners,
        scans = report.scans,
        create = report.dispatched.create,
        start = report.dispatched.start,
        poll = report.dispatched.poll,
        retrieve = report.dispatched.retrieve,
        skipped_scanners = ?report.skipped_scanners,
        enqueue_failures = report.enqueue_failures,
        "Sweep completed"
    );
}

/// Emits an audit event for a batch command.
pub fn emit_batch_command(report: &BatchReport) {
    tracing::info!(
        target: "scanpilot::audit",
        event_type = "batch_command",
        command = %report.command,
        target_type = %report.target,
        succeeded = ?report.succeeded,
        unsuccessful = ?report.unsuccessful,
        missing = ?report.missing,
        "Batch command processed"
    );
}

/// Emits an audit event for a deleted record.
pub fn emit_record_deleted(event: &DeletionAuditEvent) {
    tracing::info!(
        target: "scanpilot::audit",
        event_type = event.event_type(),
        kind = %event.kind,
        id = %event.id,
        name = %event.name,
        cascaded_scans = event.cascaded_scans,
        "Record deleted"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ScannerId;

    #[test]
    fn test_transition_event_from_record() {
        let scan = ScanRecord::new(ScannerId::from("s-1"), "nightly", "t")
            .with_status(ScanStatus::Created)
            .with_job_handle("42");
        let event = TransitionAuditEvent::new(&scan, "nessus", Action::Create, Trigger::Automatic, ScanStatus::New);

        assert_eq!(event.event_type(), "scan_transition");
        assert_eq!(event.to, ScanStatus::Created);
        assert_eq!(event.job_handle.as_deref(), Some("42"));

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["from"], "NW");
        assert_eq!(json["to"], "CD");
        assert_eq!(json["trigger"], "automatic");
        emit_transition(&event);
    }

    #[test]
    fn test_report_events_carry_reports() {
        let sweep = SweepReport {
            scanners: 2,
            dispatched: crate::automation::DispatchCounts {
                poll: 1,
                ..Default::default()
            },
            ..Default::default()
        };
        let event = SweepAuditEvent {
            timestamp: Utc::now(),
            report: sweep.clone(),
        };
        assert_eq!(event.event_type(), "sweep_completed");
        assert_eq!(serde_json::to_value(&event).unwrap()["report"]["dispatched"]["poll"], 1);
        emit_sweep_completed(&sweep);

        let batch = BatchReport {
            command: crate::commands::CommandCode::Delete,
            target: crate::commands::TargetType::Scanner,
            succeeded: vec!["s-1".into()],
            unsuccessful: Vec::new(),
            missing: vec!["s-2".into()],
        };
        let event = BatchAuditEvent {
            timestamp: Utc::now(),
            report: batch.clone(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["report"]["command"], "DL");
        assert_eq!(json["report"]["missing"][0], "s-2");
        emit_batch_command(&batch);
    }

    #[test]
    fn test_deletion_event_serializes() {
        let event = DeletionAuditEvent {
            timestamp: Utc::now(),
            kind: "scanner".into(),
            id: "s-1".into(),
            name: "ns".into(),
            cascaded_scans: 3,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["cascaded_scans"], 3);
        emit_record_deleted(&event);
    }
}
