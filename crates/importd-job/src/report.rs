use std::sync::Arc;

use chrono::{DateTime, Utc};
use importd_common::{
    error::{ImportError, Result},
    time,
    types::{Job, LogEntry, LogLevel, LogStream},
};
use importd_store::{JobStore, LogQuery, LogStore, SortOrder};
use serde::{Deserialize, Serialize};

use crate::progress::ProgressStats;

/// Downloadable record of everything a job did to the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportReport {
    pub generated_at: DateTime<Utc>,
    pub job: Job,
    pub stats: ProgressStats,
    pub item_errors: u64,
    /// Every item outcome, oldest first.
    pub entries: Vec<LogEntry>,
}

impl ImportReport {
    pub fn file_name(&self) -> String {
        format!("import-{}.json", self.job.id)
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
            .map_err(|err| ImportError::InternalError(format!("failed to render report: {err}")))
    }
}

pub async fn build_report(
    jobs: &Arc<dyn JobStore>,
    logs: &Arc<dyn LogStore>,
    job_id: &str,
) -> Result<ImportReport> {
    let job = jobs.get(job_id).await?;
    let entries = logs
        .query(
            job_id,
            &LogQuery {
                stream: Some(LogStream::Outcome),
                order: SortOrder::OldestFirst,
                ..LogQuery::default()
            },
        )
        .await?;
    let item_errors = entries
        .iter()
        .filter(|entry| entry.level == LogLevel::Error)
        .count() as u64;

    Ok(ImportReport {
        generated_at: time::now(),
        stats: ProgressStats::for_job(&job, item_errors),
        job,
        item_errors,
        entries,
    })
}

#[cfg(test)]
mod tests {
    use importd_common::types::NewLogEntry;
    use importd_store::{MemoryJobStore, MemoryLogStore};

    use super::*;

    #[tokio::test]
    async fn report_lists_outcomes_oldest_first() {
        let jobs: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
        let logs: Arc<dyn LogStore> = Arc::new(MemoryLogStore::new());
        let mut job = Job::new(10);
        job.total_items = 3;
        let id = jobs.insert(job).await.unwrap().id;

        logs.append(NewLogEntry::narration(id.clone(), LogLevel::Info, "processing chunk 1 of 1"))
            .await
            .unwrap();
        logs.append(NewLogEntry::outcome(id.clone(), LogLevel::Success, "SKU-0", "created"))
            .await
            .unwrap();
        logs.append(NewLogEntry::outcome(
            id.clone(),
            LogLevel::Error,
            "SKU-1",
            "error: missing price",
        ))
            .await
            .unwrap();

        let report = build_report(&jobs, &logs, &id).await.unwrap();
        let keys: Vec<_> = report
            .entries
            .iter()
            .filter_map(|entry| entry.item_key.as_deref())
            .collect();
        assert_eq!(keys, vec!["SKU-0", "SKU-1"]);
        assert_eq!(report.item_errors, 1);
        assert_eq!(report.file_name(), format!("import-{id}.json"));

        let json: serde_json::Value = serde_json::from_slice(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["job"]["id"], id.as_str());
        assert_eq!(json["entries"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn report_for_unknown_job_is_not_found() {
        let jobs: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
        let logs: Arc<dyn LogStore> = Arc::new(MemoryLogStore::new());
        let err = build_report(&jobs, &logs, "missing").await.unwrap_err();
        assert!(matches!(err, ImportError::JobNotFound(_)));
    }
}
