//! Structured audit logging.
//!
//! This module provides functions for emitting structured audit events
//! using the `tracing` crate under the `scanpilot::audit` target. Events can
//! be captured by any tracing subscriber (JSON file, OpenTelemetry, etc.).

mod events;

pub use events::{
    emit_batch_command, emit_record_deleted, emit_sweep_completed, emit_transition, AuditEvent,
    BatchAuditEvent, DeletionAuditEvent, SweepAuditEvent, TransitionAuditEvent,
};
