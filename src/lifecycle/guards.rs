//! Guard predicates.
//!
//! Each guard decides whether an action is legal from a status, given who
//! asked for it and what the backend supports.

use crate::core::traits::Capabilities;
use crate::core::types::{Action, ScanStatus, Trigger};

/// Guard predicates for one backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Guards {
    capabilities: Capabilities,
}

impl Guards {
    /// Creates the guards for a backend with `capabilities`.
    pub fn new(capabilities: Capabilities) -> Self {
        Self { capabilities }
    }

    /// Automatic: NEW. Manual: NEW, FINISHED, and ERRORS if the backend
    /// permits re-creating.
    pub fn can_create(&self, status: ScanStatus, trigger: Trigger) -> bool {
        match trigger {
            Trigger::Automatic => status == ScanStatus::New,
            Trigger::Manual => match status {
                ScanStatus::New | ScanStatus::Finished => true,
                ScanStatus::Errors => self.capabilities.recreate_from_errors,
                _ => false,
            },
        }
    }

    /// CREATED, unless the backend launches on create.
    pub fn can_start(&self, status: ScanStatus, _trigger: Trigger) -> bool {
        !self.capabilities.fused_create && status == ScanStatus::Created
    }

    /// IN_PROGRESS, if the backend can pause.
    pub fn can_pause(&self, status: ScanStatus, _trigger: Trigger) -> bool {
        self.capabilities.pause && status == ScanStatus::InProgress
    }

    /// PAUSED, if the backend can resume.
    pub fn can_resume(&self, status: ScanStatus, _trigger: Trigger) -> bool {
        self.capabilities.resume && status == ScanStatus::Paused
    }

    /// IN_PROGRESS, if the backend can stop.
    pub fn can_stop(&self, status: ScanStatus, _trigger: Trigger) -> bool {
        self.capabilities.stop && status == ScanStatus::InProgress
    }

    /// Automatic: FINISHED. Manual: FINISHED or RETRIEVED.
    pub fn can_retrieve(&self, status: ScanStatus, trigger: Trigger) -> bool {
        match trigger {
            Trigger::Automatic => status == ScanStatus::Finished,
            Trigger::Manual => matches!(status, ScanStatus::Finished | ScanStatus::Retrieved),
        }
    }

    /// IN_PROGRESS.
    pub fn can_poll(&self, status: ScanStatus) -> bool {
        status == ScanStatus::InProgress
    }

    /// Evaluates the guard of `action`.
    pub fn allows(&self, action: Action, status: ScanStatus, trigger: Trigger) -> bool {
        match action {
            Action::Create => self.can_create(status, trigger),
            Action::Start => self.can_start(status, trigger),
            Action::Pause => self.can_pause(status, trigger),
            Action::Resume => self.can_resume(status, trigger),
            Action::Stop => self.can_stop(status, trigger),
            Action::Retrieve => self.can_retrieve(status, trigger),
            Action::Poll => self.can_poll(status),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ScanStatus::*;

    fn allowed(guards: &Guards, action: Action, trigger: Trigger) -> Vec<ScanStatus> {
        ScanStatus::ALL
            .into_iter()
            .filter(|s| guards.allows(action, *s, trigger))
            .collect()
    }

    #[test]
    fn test_create_guard() {
        let guards = Guards::new(Capabilities::two_step());
        assert_eq!(allowed(&guards, Action::Create, Trigger::Automatic), vec![New]);
        assert_eq!(
            allowed(&guards, Action::Create, Trigger::Manual),
            vec![New, Finished, Errors]
        );

        let strict = Guards::new(Capabilities::two_step().with_recreate_from_errors(false));
        assert_eq!(allowed(&strict, Action::Create, Trigger::Manual), vec![New, Finished]);
    }

    #[test]
    fn test_start_guard_and_fused_backends() {
        let guards = Guards::new(Capabilities::two_step());
        assert_eq!(allowed(&guards, Action::Start, Trigger::Automatic), vec![Created]);
        assert_eq!(allowed(&guards, Action::Start, Trigger::Manual), vec![Created]);

        let fused = Guards::new(Capabilities::fused());
        assert!(allowed(&fused, Action::Start, Trigger::Manual).is_empty());
    }

    #[test]
    fn test_job_control_requires_capability() {
        let without = Guards::new(Capabilities::two_step());
        for action in [Action::Pause, Action::Resume, Action::Stop] {
            assert!(allowed(&without, action, Trigger::Manual).is_empty());
        }

        let with = Guards::new(Capabilities::two_step().with_job_control());
        assert_eq!(allowed(&with, Action::Pause, Trigger::Manual), vec![InProgress]);
        assert_eq!(allowed(&with, Action::Resume, Trigger::Manual), vec![Paused]);
        assert_eq!(allowed(&with, Action::Stop, Trigger::Manual), vec![InProgress]);
    }

    #[test]
    fn test_retrieve_and_poll_guards() {
        let guards = Guards::new(Capabilities::fused());
        assert_eq!(allowed(&guards, Action::Retrieve, Trigger::Automatic), vec![Finished]);
        assert_eq!(
            allowed(&guards, Action::Retrieve, Trigger::Manual),
            vec![Finished, Retrieved]
        );
        assert_eq!(allowed(&guards, Action::Poll, Trigger::Automatic), vec![InProgress]);
    }

    #[test]
    fn test_mutex_states_admit_nothing() {
        let guards = Guards::new(Capabilities::two_step().with_job_control());
        for status in [Creating, Starting, Retrieving] {
            for action in [
                Action::Create,
                Action::Start,
                Action::Pause,
                Action::Resume,
                Action::Stop,
                Action::Retrieve,
                Action::Poll,
            ] {
                for trigger in [Trigger::Automatic, Trigger::Manual] {
                    assert!(!guards.allows(action, status, trigger));
                }
            }
        }
    }
}
