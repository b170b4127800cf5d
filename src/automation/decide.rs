//! Per-scan dispatch decision.

use crate::core::record::ScanRecord;
use crate::core::types::{Action, ScanStatus, Trigger};
use crate::lifecycle::Guards;

/// Picks the one action the sweep should dispatch for `scan`, if any.
///
/// Creation, start and retrieval are gated by the scan's automation flags.
/// Polling is not: a running scan is always polled.
pub fn decide(scan: &ScanRecord, guards: &Guards) -> Option<Action> {
    let auto = Trigger::Automatic;
    let flags = scan.automation;
    match scan.status {
        ScanStatus::New if flags.auto_create && guards.can_create(scan.status, auto) => Some(Action::Create),
        ScanStatus::Created if flags.auto_start && guards.can_start(scan.status, auto) => Some(Action::Start),
        ScanStatus::Finished if flags.auto_retrieve && guards.can_retrieve(scan.status, auto) => {
            Some(Action::Retrieve)
        }
        ScanStatus::InProgress => Some(Action::Poll),
        _ => None,
    }
}
