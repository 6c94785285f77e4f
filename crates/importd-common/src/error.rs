use thiserror::Error;

use crate::types::{ControlAction, JobStatus};

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("job not found: {0}")]
    JobNotFound(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("cannot {action} a job that is {from}")]
    InvalidTransition {
        from: JobStatus,
        action: ControlAction,
    },
    #[error("job {job_id} was modified concurrently: {detail}")]
    Conflict { job_id: String, detail: String },
    #[error("access denied: {0}")]
    AccessDenied(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("internal error: {0}")]
    InternalError(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ImportError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::JobNotFound(_) => "NoSuchJob",
            Self::InvalidArgument(_) => "InvalidArgument",
            Self::InvalidTransition { .. } => "InvalidTransition",
            Self::Conflict { .. } => "Conflict",
            Self::AccessDenied(_) => "AccessDenied",
            Self::Transport(_) => "TransportError",
            Self::InternalError(_) => "InternalError",
            Self::Io(_) => "InternalError",
        }
    }
}

pub type Result<T> = std::result::Result<T, ImportError>;
