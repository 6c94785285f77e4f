use std::sync::Arc;

use importd_common::{
    error::{ImportError, Result},
    types::{ControlAction, JobStatus},
};
use importd_store::{JobStore, Precondition};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::lifecycle::transition;

const MAX_CAS_ATTEMPTS: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub status: JobStatus,
    pub requeued: bool,
}

impl ControlOutcome {
    fn applied(action: ControlAction, status: JobStatus, requeued: bool) -> Self {
        let message = match action {
            ControlAction::Pause => "import paused",
            ControlAction::Resume => "import resumed",
            ControlAction::Stop => "import stopped",
            ControlAction::Retry => "import queued for retry",
        };
        Self {
            success: true,
            message: Some(message.to_string()),
            status,
            requeued,
        }
    }

    fn rejected(status: JobStatus, reason: String) -> Self {
        Self {
            success: false,
            message: Some(reason),
            status,
            requeued: false,
        }
    }
}

/// Maps pause/resume/stop/retry onto compare-and-swap status writes.
///
/// Each attempt validates against the row it read and writes only if the row
/// version is unchanged; a concurrent writer forces a re-read, so the command
/// is judged against whatever status actually won the race.
#[derive(Clone)]
pub struct ControlChannel {
    jobs: Arc<dyn JobStore>,
}

impl ControlChannel {
    pub fn new(jobs: Arc<dyn JobStore>) -> Self {
        Self { jobs }
    }

    pub async fn apply(&self, job_id: &str, action: ControlAction) -> Result<ControlOutcome> {
        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let job = self.jobs.get(job_id).await?;
            let transition = match transition(job.status, action) {
                Ok(transition) => transition,
                Err(err @ ImportError::InvalidTransition { .. }) => {
                    info!(
                        job_id = %job_id,
                        action = %action,
                        status = %job.status,
                        "control action rejected"
                    );
                    return Ok(ControlOutcome::rejected(job.status, err.to_string()));
                }
                Err(err) => return Err(err),
            };

            match self
                .jobs
                .update(job_id, &transition.patch(), Precondition::Version(job.version))
                .await
            {
                Ok(updated) => {
                    info!(
                        job_id = %job_id,
                        action = %action,
                        from = %transition.from,
                        to = %updated.status,
                        "control action applied"
                    );
                    return Ok(ControlOutcome::applied(
                        action,
                        updated.status,
                        transition.requeued,
                    ));
                }
                Err(ImportError::Conflict { detail, .. }) => {
                    debug!(
                        job_id = %job_id,
                        action = %action,
                        attempt,
                        detail = %detail,
                        "job changed underneath control action, retrying"
                    );
                }
                Err(err) => return Err(err),
            }
        }

        Err(ImportError::Conflict {
            job_id: job_id.to_string(),
            detail: format!("{action} gave up after {MAX_CAS_ATTEMPTS} attempts"),
        })
    }
}
