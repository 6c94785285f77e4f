use async_trait::async_trait;
use chrono::{DateTime, Utc};
use importd_common::error::Result;
use importd_common::types::{
    Job, JobFailure, JobStatus, LogEntry, LogLevel, LogStream, NewLogEntry,
};

/// Field-level mutation of a job row.
///
/// `processed_items` only ever moves forward: the store keeps the larger of the
/// stored and the patched value, and clamps it to `total_items` once that is known.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobPatch {
    pub status: Option<JobStatus>,
    pub total_items: Option<u64>,
    pub processed_items: Option<u64>,
    pub last_activity_at: Option<DateTime<Utc>>,
    pub failure: Option<JobFailure>,
    pub clear_failure: bool,
}

impl JobPatch {
    pub fn status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn with_failure(mut self, failure: JobFailure) -> Self {
        self.failure = Some(failure);
        self
    }

    pub fn clearing_failure(mut self) -> Self {
        self.clear_failure = true;
        self
    }

    pub fn progress(processed_items: u64, at: DateTime<Utc>) -> Self {
        Self {
            processed_items: Some(processed_items),
            last_activity_at: Some(at),
            ..Self::default()
        }
    }

    pub fn apply(&self, job: &mut Job) {
        if let Some(status) = self.status {
            job.status = status;
        }
        if let Some(total) = self.total_items {
            job.total_items = total;
        }
        if let Some(processed) = self.processed_items {
            job.processed_items = job.processed_items.max(processed);
        }
        if job.total_items > 0 && job.processed_items > job.total_items {
            job.processed_items = job.total_items;
        }
        if let Some(at) = self.last_activity_at {
            job.last_activity_at = job.last_activity_at.max(at);
        }
        if self.clear_failure {
            job.failure = None;
        }
        if let Some(failure) = &self.failure {
            job.failure = Some(failure.clone());
        }
        job.version = job.version.wrapping_add(1);
    }
}

/// Guard evaluated atomically with an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    None,
    Version(u64),
    StatusIn(&'static [JobStatus]),
}

impl Precondition {
    pub fn check(&self, job: &Job) -> std::result::Result<(), String> {
        match self {
            Self::None => Ok(()),
            Self::Version(version) if job.version == *version => Ok(()),
            Self::Version(version) => Err(format!(
                "expected version {version}, found {}",
                job.version
            )),
            Self::StatusIn(statuses) if statuses.contains(&job.status) => Ok(()),
            Self::StatusIn(statuses) => Err(format!(
                "expected status in {statuses:?}, found {}",
                job.status
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    NewestFirst,
    OldestFirst,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogQuery {
    pub stream: Option<LogStream>,
    pub level: Option<LogLevel>,
    pub after_id: Option<u64>,
    pub limit: usize,
    pub order: SortOrder,
}

impl Default for LogQuery {
    fn default() -> Self {
        Self {
            stream: None,
            level: None,
            after_id: None,
            limit: usize::MAX,
            order: SortOrder::NewestFirst,
        }
    }
}

impl LogQuery {
    /// Newest item-outcome entries, the observer-facing log tail.
    pub fn outcome_tail(limit: usize) -> Self {
        Self {
            stream: Some(LogStream::Outcome),
            limit,
            ..Self::default()
        }
    }

    pub fn recent_errors(limit: usize) -> Self {
        Self {
            level: Some(LogLevel::Error),
            limit,
            ..Self::default()
        }
    }

    pub fn matches(&self, entry: &LogEntry) -> bool {
        self.stream.is_none_or(|stream| entry.stream == stream)
            && self.level.is_none_or(|level| entry.level == level)
            && self.after_id.is_none_or(|after| entry.id > after)
    }

    /// Orders and truncates entries that already passed `matches`.
    /// Input must be in insertion (ascending id) order.
    pub fn finish(&self, mut entries: Vec<LogEntry>) -> Vec<LogEntry> {
        if self.order == SortOrder::NewestFirst {
            entries.reverse();
        }
        entries.truncate(self.limit);
        entries
    }
}

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn insert(&self, job: Job) -> Result<Job>;
    async fn get(&self, job_id: &str) -> Result<Job>;
    async fn list(&self) -> Result<Vec<Job>>;
    /// Applies `patch` if `precondition` holds, returning the stored row.
    /// A failed precondition is reported as `ImportError::Conflict`.
    async fn update(
        &self,
        job_id: &str,
        patch: &JobPatch,
        precondition: Precondition,
    ) -> Result<Job>;
}

#[async_trait]
pub trait LogStore: Send + Sync {
    async fn append(&self, entry: NewLogEntry) -> Result<LogEntry>;
    async fn query(&self, job_id: &str, query: &LogQuery) -> Result<Vec<LogEntry>>;
    /// Counts entries matching the filter part of `query`; limit and order are ignored.
    async fn count(&self, job_id: &str, query: &LogQuery) -> Result<u64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn processed_items_never_move_backwards() {
        let mut job = Job::new(10);
        job.total_items = 100;
        JobPatch::progress(40, Utc::now()).apply(&mut job);
        JobPatch::progress(20, Utc::now()).apply(&mut job);
        assert_eq!(job.processed_items, 40);
    }

    #[test]
    fn processed_items_clamped_to_known_total() {
        let mut job = Job::new(10);
        job.total_items = 30;
        JobPatch::progress(45, Utc::now()).apply(&mut job);
        assert_eq!(job.processed_items, 30);
    }

    #[test]
    fn version_precondition_rejects_stale_reads() {
        let mut job = Job::new(10);
        let seen = job.version;
        JobPatch::status(JobStatus::Processing).apply(&mut job);
        assert!(Precondition::Version(seen).check(&job).is_err());
        assert!(Precondition::Version(job.version).check(&job).is_ok());
    }

    #[test]
    fn outcome_tail_filters_narration() {
        let narration = NewLogEntry::narration("job", LogLevel::Info, "processing chunk 1 of 2")
            .into_entry(1, Utc::now());
        let outcome = NewLogEntry::outcome("job", LogLevel::Success, "SKU-1", "created")
            .into_entry(2, Utc::now());
        let query = LogQuery::outcome_tail(50);
        assert!(!query.matches(&narration));
        assert!(query.matches(&outcome));
    }
}
