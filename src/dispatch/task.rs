//! Units of dispatched work.

use crate::core::error::DispatchError;
use crate::core::types::{Action, ScanId, Trigger};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// One action to run against one scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Target scan.
    pub scan_id: ScanId,
    /// Transition to invoke.
    pub action: Action,
    /// Who asked for it.
    pub trigger: Trigger,
}

impl Task {
    /// Creates a task dispatched by the automation sweep.
    pub fn automatic(scan_id: ScanId, action: Action) -> Self {
        Self {
            scan_id,
            action,
            trigger: Trigger::Automatic,
        }
    }

    /// Creates a task submitted by a user.
    pub fn manual(scan_id: ScanId, action: Action) -> Self {
        Self {
            scan_id,
            action,
            trigger: Trigger::Manual,
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.action, self.scan_id, self.trigger)
    }
}

/// Accepts tasks for asynchronous execution.
///
/// Delivery is at-least-once and unordered across scan ids. Implementations
/// must not block; the returned `Ok` only means the task was accepted.
pub trait TaskQueue: Send + Sync + fmt::Debug {
    /// Hands a task to the queue.
    fn enqueue(&self, task: Task) -> Result<(), DispatchError>;
}

impl<Q: TaskQueue + ?Sized> TaskQueue for Arc<Q> {
    fn enqueue(&self, task: Task) -> Result<(), DispatchError> {
        (**self).enqueue(task)
    }
}

/// A shared task queue.
pub type ArcTaskQueue = Arc<dyn TaskQueue>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_constructors() {
        let id = ScanId::from("s-1");
        let auto = Task::automatic(id.clone(), Action::Poll);
        assert!(auto.trigger.is_auto());

        let manual = Task::manual(id, Action::Start);
        assert_eq!(manual.trigger, Trigger::Manual);
        assert_eq!(manual.to_string(), "start s-1 (manual)");
    }
}
