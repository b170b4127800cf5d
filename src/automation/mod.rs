//! Periodic automation.
//!
//! The sweep turns each scan's persisted status and automation flags into
//! at most one dispatched task per period.
//!
//! | status        | flag            | task     |
//! |---------------|-----------------|----------|
//! | NEW           | `auto_create`   | create   |
//! | CREATED       | `auto_start`    | start    |
//! | FINISHED      | `auto_retrieve` | retrieve |
//! | IN_PROGRESS   | none            | poll     |

mod decide;
mod sweeper;

pub use decide::decide;
pub use sweeper::{DispatchCounts, SweepReport, Sweeper};
