use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type JobId = String;

/// Header carrying the shared observer nonce on API requests.
pub const NONCE_HEADER: &str = "x-import-nonce";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Preparing,
    #[serde(alias = "active")]
    Processing,
    Paused,
    Completed,
    Failed,
}

impl JobStatus {
    pub const ALL: [JobStatus; 6] = [
        JobStatus::Pending,
        JobStatus::Preparing,
        JobStatus::Processing,
        JobStatus::Paused,
        JobStatus::Completed,
        JobStatus::Failed,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Statuses the worker may pick up on its next invocation.
    pub fn is_runnable(self) -> bool {
        matches!(self, Self::Pending | Self::Preparing | Self::Processing)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Preparing => "preparing",
            Self::Processing => "processing",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Human-readable text shown next to the progress bar.
    pub fn label(self) -> &'static str {
        match self {
            Self::Pending => "Waiting to start",
            Self::Preparing => "Preparing import",
            Self::Processing => "Importing products",
            Self::Paused => "Paused",
            Self::Completed => "Import completed",
            Self::Failed => "Import failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlAction {
    Pause,
    Resume,
    Stop,
    Retry,
}

impl ControlAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Stop => "stop",
            Self::Retry => "retry",
        }
    }
}

impl fmt::Display for ControlAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleKind {
    #[default]
    OneShot,
    Recurring,
    Disabled,
}

/// Why a job ended up `failed`. Both variants surface as the same status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobFailure {
    UserStopped,
    Fatal { message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    #[serde(default)]
    pub label: Option<String>,
    pub status: JobStatus,
    pub total_items: u64,
    pub processed_items: u64,
    pub batch_size: u64,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    #[serde(default)]
    pub schedule_kind: ScheduleKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<JobFailure>,
    #[serde(default)]
    pub version: u64,
}

impl Job {
    pub fn new(batch_size: u64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            label: None,
            status: JobStatus::Pending,
            total_items: 0,
            processed_items: 0,
            batch_size,
            created_at: now,
            last_activity_at: now,
            schedule_kind: ScheduleKind::OneShot,
            failure: None,
            version: 0,
        }
    }

    pub fn remaining_items(&self) -> u64 {
        self.total_items.saturating_sub(self.processed_items)
    }

    pub fn is_stopped_by_user(&self) -> bool {
        matches!(self.failure, Some(JobFailure::UserStopped))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// Progress narration ("processing chunk 2 of 5") versus per-item outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStream {
    Narration,
    Outcome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: u64,
    pub job_id: JobId,
    pub level: LogLevel,
    pub stream: LogStream,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_key: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A log entry before the store has assigned its id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewLogEntry {
    pub job_id: JobId,
    pub level: LogLevel,
    pub stream: LogStream,
    pub message: String,
    pub item_key: Option<String>,
}

impl NewLogEntry {
    pub fn narration(
        job_id: impl Into<JobId>,
        level: LogLevel,
        message: impl Into<String>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            level,
            stream: LogStream::Narration,
            message: message.into(),
            item_key: None,
        }
    }

    pub fn outcome(
        job_id: impl Into<JobId>,
        level: LogLevel,
        item_key: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            level,
            stream: LogStream::Outcome,
            message: message.into(),
            item_key: Some(item_key.into()),
        }
    }

    pub fn into_entry(self, id: u64, created_at: DateTime<Utc>) -> LogEntry {
        LogEntry {
            id,
            job_id: self.job_id,
            level: self.level,
            stream: self.stream,
            message: self.message,
            item_key: self.item_key,
            created_at,
        }
    }
}
