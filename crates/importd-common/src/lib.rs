pub mod error;
pub mod time;
pub mod types;

pub use error::{ImportError, Result};
pub use types::{
    ControlAction, Job, JobFailure, JobId, JobStatus, LogEntry, LogLevel, LogStream, NewLogEntry,
    NONCE_HEADER, ScheduleKind,
};
