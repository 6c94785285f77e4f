//! Server side of the progress feed: one snapshot per poll.

use std::sync::Arc;

use importd_common::{
    error::Result,
    types::{ControlAction, JobFailure, JobId, JobStatus, LogEntry, LogLevel, LogStream},
};
use importd_store::{JobStore, LogQuery, LogStore};
use serde::{Deserialize, Serialize};

use crate::{lifecycle::allowed_actions, progress::ProgressStats};

#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub tail_window: usize,
    pub error_window: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            tail_window: 50,
            error_window: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressResponse {
    pub job_id: JobId,
    pub status: JobStatus,
    pub status_label: String,
    pub percentage: u8,
    pub processed_items: u64,
    pub total_items: u64,
    /// Newest item-outcome entries first.
    pub logs: Vec<LogEntry>,
    pub stats: ProgressStats,
    pub eta_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<JobFailure>,
    /// Latest error entries, filled in only for failed jobs.
    #[serde(default)]
    pub recent_errors: Vec<LogEntry>,
    #[serde(default)]
    pub allowed_actions: Vec<ControlAction>,
}

impl ProgressResponse {
    pub fn newest_log_id(&self) -> Option<u64> {
        self.logs.iter().map(|entry| entry.id).max()
    }
}

#[derive(Clone)]
pub struct ProgressFeed {
    jobs: Arc<dyn JobStore>,
    logs: Arc<dyn LogStore>,
    config: FeedConfig,
}

impl ProgressFeed {
    pub fn new(jobs: Arc<dyn JobStore>, logs: Arc<dyn LogStore>, config: FeedConfig) -> Self {
        Self { jobs, logs, config }
    }

    pub async fn get_progress(&self, job_id: &str) -> Result<ProgressResponse> {
        let job = self.jobs.get(job_id).await?;
        let logs = self
            .logs
            .query(job_id, &LogQuery::outcome_tail(self.config.tail_window))
            .await?;
        let item_errors = self
            .logs
            .count(
                job_id,
                &LogQuery {
                    stream: Some(LogStream::Outcome),
                    level: Some(LogLevel::Error),
                    ..LogQuery::default()
                },
            )
            .await?;
        let recent_errors = if job.status == JobStatus::Failed {
            self.logs
                .query(job_id, &LogQuery::recent_errors(self.config.error_window))
                .await?
        } else {
            Vec::new()
        };

        let stats = ProgressStats::for_job(&job, item_errors);
        Ok(ProgressResponse {
            job_id: job.id,
            status: job.status,
            status_label: job.status.label().to_string(),
            percentage: stats.percentage,
            processed_items: job.processed_items,
            total_items: job.total_items,
            logs,
            eta_text: stats.eta.to_string(),
            stats,
            failure: job.failure,
            recent_errors,
            allowed_actions: allowed_actions(job.status),
        })
    }
}

#[cfg(test)]
mod tests {
    use importd_common::types::{Job, NewLogEntry};
    use importd_store::{JobPatch, MemoryJobStore, MemoryLogStore, Precondition};

    use super::*;

    async fn seeded() -> (ProgressFeed, Arc<MemoryJobStore>, Arc<MemoryLogStore>, String) {
        let jobs = Arc::new(MemoryJobStore::new());
        let logs = Arc::new(MemoryLogStore::new());
        let mut job = Job::new(50);
        job.total_items = 100;
        let id = jobs.insert(job).await.unwrap().id;
        let feed = ProgressFeed::new(jobs.clone(), logs.clone(), FeedConfig::default());
        (feed, jobs, logs, id)
    }

    #[tokio::test]
    async fn tail_excludes_narration_and_caps_window() {
        let (feed, jobs, logs, id) = seeded().await;
        for index in 0..70 {
            logs.append(NewLogEntry::narration(id.clone(), LogLevel::Info, "chunk"))
                .await
                .unwrap();
            logs.append(NewLogEntry::outcome(
                id.clone(),
                LogLevel::Success,
                format!("SKU-{index}"),
                "created",
            ))
            .await
            .unwrap();
        }
        jobs.update(
            &id,
            &JobPatch::progress(70, chrono::Utc::now()),
            Precondition::None,
        )
        .await
        .unwrap();

        let response = feed.get_progress(&id).await.unwrap();
        assert_eq!(response.logs.len(), 50);
        assert!(response
            .logs
            .iter()
            .all(|entry| entry.stream == LogStream::Outcome));
        assert_eq!(response.logs[0].item_key.as_deref(), Some("SKU-69"));
        assert_eq!(response.newest_log_id(), Some(response.logs[0].id));
        assert_eq!(response.percentage, 70);
        assert!(response.recent_errors.is_empty());
    }

    #[tokio::test]
    async fn failed_job_surfaces_recent_errors() {
        let (feed, jobs, logs, id) = seeded().await;
        logs.append(NewLogEntry::outcome(id.clone(), LogLevel::Error, "SKU-1", "error: bad sku"))
            .await
            .unwrap();
        logs.append(NewLogEntry::narration(
            id.clone(),
            LogLevel::Error,
            "import failed: source file truncated",
        ))
        .await
        .unwrap();
        jobs.update(
            &id,
            &JobPatch::status(JobStatus::Failed).with_failure(JobFailure::Fatal {
                message: "source file truncated".to_string(),
            }),
            Precondition::None,
        )
        .await
        .unwrap();

        let response = feed.get_progress(&id).await.unwrap();
        assert_eq!(response.status, JobStatus::Failed);
        assert_eq!(response.status_label, "Import failed");
        assert_eq!(response.recent_errors.len(), 2);
        assert!(response.recent_errors[0].message.contains("truncated"));
        assert_eq!(response.allowed_actions, vec![ControlAction::Retry]);
    }

    #[tokio::test]
    async fn response_round_trips_through_json() {
        let (feed, _jobs, _logs, id) = seeded().await;
        let response = feed.get_progress(&id).await.unwrap();
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"], "pending");
        assert_eq!(json["stats"]["eta"]["unit"], "unknown");
        let decoded: ProgressResponse = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, response);
    }
}
