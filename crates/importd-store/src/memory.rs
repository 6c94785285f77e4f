use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use chrono::Utc;
use importd_common::{
    error::{ImportError, Result},
    types::{Job, JobId, LogEntry, NewLogEntry},
};
use tokio::sync::RwLock;

use crate::traits::{JobPatch, JobStore, LogQuery, LogStore, Precondition};

#[derive(Debug, Clone, Default)]
pub struct MemoryJobStore {
    jobs: Arc<RwLock<HashMap<JobId, Job>>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert(&self, job: Job) -> Result<Job> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.id) {
            return Err(ImportError::InvalidArgument(format!(
                "job already exists: {}",
                job.id
            )));
        }
        jobs.insert(job.id.clone(), job.clone());
        Ok(job)
    }

    async fn get(&self, job_id: &str) -> Result<Job> {
        self.jobs
            .read()
            .await
            .get(job_id)
            .cloned()
            .ok_or_else(|| ImportError::JobNotFound(job_id.to_string()))
    }

    async fn list(&self) -> Result<Vec<Job>> {
        let mut jobs: Vec<Job> = self.jobs.read().await.values().cloned().collect();
        jobs.sort_by(|left, right| right.created_at.cmp(&left.created_at));
        Ok(jobs)
    }

    async fn update(
        &self,
        job_id: &str,
        patch: &JobPatch,
        precondition: Precondition,
    ) -> Result<Job> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| ImportError::JobNotFound(job_id.to_string()))?;
        precondition
            .check(job)
            .map_err(|detail| ImportError::Conflict {
                job_id: job_id.to_string(),
                detail,
            })?;
        patch.apply(job);
        Ok(job.clone())
    }
}

#[derive(Debug, Default)]
struct LogState {
    last_id: u64,
    entries: HashMap<JobId, Vec<LogEntry>>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryLogStore {
    state: Arc<RwLock<LogState>>,
}

impl MemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LogStore for MemoryLogStore {
    async fn append(&self, entry: NewLogEntry) -> Result<LogEntry> {
        let mut state = self.state.write().await;
        state.last_id += 1;
        let entry = entry.into_entry(state.last_id, Utc::now());
        state
            .entries
            .entry(entry.job_id.clone())
            .or_default()
            .push(entry.clone());
        Ok(entry)
    }

    async fn query(&self, job_id: &str, query: &LogQuery) -> Result<Vec<LogEntry>> {
        let state = self.state.read().await;
        let matched = state
            .entries
            .get(job_id)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|entry| query.matches(entry))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(query.finish(matched))
    }

    async fn count(&self, job_id: &str, query: &LogQuery) -> Result<u64> {
        let state = self.state.read().await;
        Ok(state
            .entries
            .get(job_id)
            .map(|entries| entries.iter().filter(|entry| query.matches(entry)).count() as u64)
            .unwrap_or(0))
    }
}
