//! Job status transitions accepted from the control channel.

use importd_common::{
    error::{ImportError, Result},
    types::{ControlAction, JobFailure, JobStatus},
};
use importd_store::JobPatch;

/// The outcome of validating a control action against a status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub from: JobStatus,
    pub to: JobStatus,
    /// Set when a paused or failed job re-enters `pending`, which is the
    /// condition for waking the worker without waiting for the next keepalive.
    pub requeued: bool,
    failure: Option<JobFailure>,
    clear_failure: bool,
}

impl Transition {
    pub fn patch(&self) -> JobPatch {
        let mut patch = JobPatch::status(self.to);
        if let Some(failure) = &self.failure {
            patch = patch.with_failure(failure.clone());
        }
        if self.clear_failure {
            patch = patch.clearing_failure();
        }
        patch
    }
}

pub fn transition(from: JobStatus, action: ControlAction) -> Result<Transition> {
    use JobStatus::*;

    let to = match (action, from) {
        (ControlAction::Pause, Processing | Pending | Preparing) => Paused,
        (ControlAction::Resume, Paused) => Pending,
        (ControlAction::Stop, status) if !status.is_terminal() => Failed,
        (ControlAction::Retry, Failed) => Pending,
        _ => return Err(ImportError::InvalidTransition { from, action }),
    };

    Ok(Transition {
        from,
        to,
        requeued: to == Pending && matches!(from, Paused | Failed),
        failure: (action == ControlAction::Stop).then_some(JobFailure::UserStopped),
        clear_failure: action == ControlAction::Retry,
    })
}

/// Every action that is legal from `status`.
pub fn allowed_actions(status: JobStatus) -> Vec<ControlAction> {
    [
        ControlAction::Pause,
        ControlAction::Resume,
        ControlAction::Stop,
        ControlAction::Retry,
    ]
    .into_iter()
    .filter(|action| transition(status, *action).is_ok())
    .collect()
}
