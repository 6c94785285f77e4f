use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use importd_common::{
    error::{ImportError, Result},
    types::{Job, LogEntry, NewLogEntry},
};
use serde::de::DeserializeOwned;
use tokio::{
    fs::{self, OpenOptions},
    io::AsyncWriteExt,
    sync::Mutex,
};

use crate::traits::{JobPatch, JobStore, LogQuery, LogStore, Precondition};

const JOBS_DIR: &str = "jobs";
const LOGS_DIR: &str = "logs";

/// One JSON document per job under `<root>/jobs`, replaced atomically on write.
#[derive(Debug)]
pub struct FileJobStore {
    jobs_dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileJobStore {
    pub async fn new(root: impl AsRef<Path>) -> Result<Self> {
        let jobs_dir = root.as_ref().join(JOBS_DIR);
        fs::create_dir_all(&jobs_dir).await?;
        Ok(Self {
            jobs_dir,
            write_lock: Mutex::new(()),
        })
    }

    fn job_path(&self, job_id: &str) -> Result<PathBuf> {
        validate_file_id(job_id)?;
        Ok(self.jobs_dir.join(format!("{job_id}.json")))
    }

    async fn read_job(&self, job_id: &str) -> Result<Job> {
        let path = self.job_path(job_id)?;
        read_json_if_exists(&path)
            .await?
            .ok_or_else(|| ImportError::JobNotFound(job_id.to_string()))
    }

    async fn write_job(&self, job: &Job) -> Result<()> {
        let path = self.job_path(&job.id)?;
        let payload = serde_json::to_vec_pretty(job).map_err(|err| {
            ImportError::InternalError(format!("failed to serialize job {}: {err}", job.id))
        })?;
        let tmp_path = path.with_extension("tmp");
        fs::write(&tmp_path, payload).await?;
        fs::rename(&tmp_path, &path).await?;
        Ok(())
    }
}

#[async_trait]
impl JobStore for FileJobStore {
    async fn insert(&self, job: Job) -> Result<Job> {
        let _guard = self.write_lock.lock().await;
        if fs::try_exists(self.job_path(&job.id)?).await? {
            return Err(ImportError::InvalidArgument(format!(
                "job already exists: {}",
                job.id
            )));
        }
        self.write_job(&job).await?;
        Ok(job)
    }

    async fn get(&self, job_id: &str) -> Result<Job> {
        self.read_job(job_id).await
    }

    async fn list(&self) -> Result<Vec<Job>> {
        let mut jobs = Vec::new();
        let mut entries = fs::read_dir(&self.jobs_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            if let Some(job) = read_json_if_exists::<Job>(&path).await? {
                jobs.push(job);
            }
        }
        jobs.sort_by(|left, right| right.created_at.cmp(&left.created_at));
        Ok(jobs)
    }

    async fn update(
        &self,
        job_id: &str,
        patch: &JobPatch,
        precondition: Precondition,
    ) -> Result<Job> {
        let _guard = self.write_lock.lock().await;
        let mut job = self.read_job(job_id).await?;
        precondition
            .check(&job)
            .map_err(|detail| ImportError::Conflict {
                job_id: job_id.to_string(),
                detail,
            })?;
        patch.apply(&mut job);
        self.write_job(&job).await?;
        Ok(job)
    }
}

/// Append-only JSON lines, one file per job under `<root>/logs`.
#[derive(Debug)]
pub struct FileLogStore {
    logs_dir: PathBuf,
    last_id: Mutex<u64>,
}

impl FileLogStore {
    pub async fn new(root: impl AsRef<Path>) -> Result<Self> {
        let logs_dir = root.as_ref().join(LOGS_DIR);
        fs::create_dir_all(&logs_dir).await?;
        let last_id = scan_last_id(&logs_dir).await?;
        Ok(Self {
            logs_dir,
            last_id: Mutex::new(last_id),
        })
    }

    fn log_path(&self, job_id: &str) -> Result<PathBuf> {
        validate_file_id(job_id)?;
        Ok(self.logs_dir.join(format!("{job_id}.jsonl")))
    }

    async fn read_entries(&self, job_id: &str) -> Result<Vec<LogEntry>> {
        read_log_file(&self.log_path(job_id)?).await
    }
}

#[async_trait]
impl LogStore for FileLogStore {
    async fn append(&self, entry: NewLogEntry) -> Result<LogEntry> {
        let path = self.log_path(&entry.job_id)?;
        let mut last_id = self.last_id.lock().await;
        let entry = entry.into_entry(*last_id + 1, Utc::now());

        let mut line = serde_json::to_vec(&entry).map_err(|err| {
            ImportError::InternalError(format!("failed to serialize log entry: {err}"))
        })?;
        line.push(b'\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;

        *last_id = entry.id;
        Ok(entry)
    }

    async fn query(&self, job_id: &str, query: &LogQuery) -> Result<Vec<LogEntry>> {
        let matched = self
            .read_entries(job_id)
            .await?
            .into_iter()
            .filter(|entry| query.matches(entry))
            .collect();
        Ok(query.finish(matched))
    }

    async fn count(&self, job_id: &str, query: &LogQuery) -> Result<u64> {
        Ok(self
            .read_entries(job_id)
            .await?
            .iter()
            .filter(|entry| query.matches(entry))
            .count() as u64)
    }
}

async fn scan_last_id(logs_dir: &Path) -> Result<u64> {
    let mut last_id = 0;
    let mut entries = fs::read_dir(logs_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("jsonl") {
            continue;
        }
        if let Some(last) = read_log_file(&path).await?.last() {
            last_id = last_id.max(last.id);
        }
    }
    Ok(last_id)
}

async fn read_log_file(path: &Path) -> Result<Vec<LogEntry>> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(ImportError::Io(err)),
    };

    let mut entries = Vec::new();
    for line in bytes.split(|byte| *byte == b'\n') {
        if line.is_empty() {
            continue;
        }
        // A torn final line from an interrupted append is skipped.
        match serde_json::from_slice::<LogEntry>(line) {
            Ok(entry) => entries.push(entry),
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "skipping malformed log line")
            }
        }
    }
    Ok(entries)
}

async fn read_json_if_exists<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match fs::read(path).await {
        Ok(bytes) => serde_json::from_slice(&bytes).map(Some).map_err(|err| {
            ImportError::InternalError(format!("failed to parse {}: {err}", path.display()))
        }),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(ImportError::Io(err)),
    }
}

fn validate_file_id(job_id: &str) -> Result<()> {
    let valid = !job_id.is_empty()
        && job_id
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_');
    if valid {
        Ok(())
    } else {
        Err(ImportError::InvalidArgument(format!("invalid job id: {job_id}")))
    }
}

#[cfg(test)]
mod tests {
    use importd_common::types::{JobStatus, LogLevel};

    use super::*;

    #[tokio::test]
    async fn job_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileJobStore::new(dir.path()).await.unwrap();
        let mut job = Job::new(25);
        job.total_items = 100;
        let job = store.insert(job).await.unwrap();
        store
            .update(
                &job.id,
                &JobPatch::progress(40, Utc::now()),
                Precondition::None,
            )
            .await
            .unwrap();

        let reopened = FileJobStore::new(dir.path()).await.unwrap();
        let stored = reopened.get(&job.id).await.unwrap();
        assert_eq!(stored.processed_items, 40);
        assert_eq!(stored.status, JobStatus::Pending);
        assert_eq!(reopened.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn log_ids_continue_after_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileLogStore::new(dir.path()).await.unwrap();
        let first = store
            .append(NewLogEntry::outcome("job-1", LogLevel::Success, "SKU-1", "created"))
            .await
            .unwrap();

        let reopened = FileLogStore::new(dir.path()).await.unwrap();
        let second = reopened
            .append(NewLogEntry::outcome("job-1", LogLevel::Error, "SKU-2", "missing price"))
            .await
            .unwrap();
        assert!(second.id > first.id);

        let errors = reopened
            .query("job-1", &LogQuery::recent_errors(10))
            .await
            .unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].item_key.as_deref(), Some("SKU-2"));
    }

    #[tokio::test]
    async fn path_traversal_ids_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileJobStore::new(dir.path()).await.unwrap();
        let err = store.get("../etc/passwd").await.unwrap_err();
        assert!(matches!(err, ImportError::InvalidArgument(_)));
    }
}
