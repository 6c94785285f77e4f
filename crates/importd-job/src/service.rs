//! The operations an observer, a scheduler and the worker endpoint call.

use std::sync::Arc;

use importd_common::{
    error::{ImportError, Result},
    types::{ControlAction, Job, JobStatus, ScheduleKind},
};
use importd_store::{JobStore, LogStore};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::info;

use crate::{
    control::{ControlChannel, ControlOutcome},
    feed::{FeedConfig, ProgressFeed, ProgressResponse},
    keepalive::{KeepaliveConfig, KeepaliveDriver, KickstartAck},
    report::{ImportReport, build_report},
    trigger::{LocalWorkerTrigger, WorkerTrigger},
    worker::{ChunkProcessor, ImportWorker, WorkerTick},
};

#[derive(Debug, Clone, Default)]
pub struct ServiceConfig {
    pub keepalive: KeepaliveConfig,
    pub feed: FeedConfig,
}

fn default_batch_size() -> u64 {
    50
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewJob {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub total_items: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,
    #[serde(default)]
    pub schedule_kind: ScheduleKind,
    #[serde(default)]
    pub initial_status: Option<JobStatus>,
}

impl Default for NewJob {
    fn default() -> Self {
        Self {
            label: None,
            total_items: 0,
            batch_size: default_batch_size(),
            schedule_kind: ScheduleKind::default(),
            initial_status: None,
        }
    }
}

impl NewJob {
    fn into_job(self) -> Result<Job> {
        if self.batch_size == 0 {
            return Err(ImportError::InvalidArgument(
                "batch_size must be positive".to_string(),
            ));
        }
        let status = self.initial_status.unwrap_or(JobStatus::Pending);
        if !matches!(status, JobStatus::Pending | JobStatus::Preparing) {
            return Err(ImportError::InvalidArgument(format!(
                "jobs cannot be created as {status}"
            )));
        }
        let mut job = Job::new(self.batch_size);
        job.label = self.label;
        job.total_items = self.total_items;
        job.schedule_kind = self.schedule_kind;
        job.status = status;
        Ok(job)
    }
}

#[derive(Clone)]
pub struct ImportService {
    jobs: Arc<dyn JobStore>,
    logs: Arc<dyn LogStore>,
    feed: ProgressFeed,
    control: ControlChannel,
    keepalive: KeepaliveDriver,
    worker: ImportWorker,
}

impl ImportService {
    /// Wires every component over the given stores. Keepalive triggers run the
    /// in-process worker unless [`ImportService::with_trigger`] replaces them.
    pub fn new(
        jobs: Arc<dyn JobStore>,
        logs: Arc<dyn LogStore>,
        processor: Arc<dyn ChunkProcessor>,
        config: ServiceConfig,
    ) -> Self {
        let worker = ImportWorker::new(Arc::clone(&jobs), Arc::clone(&logs), processor);
        let trigger: Arc<dyn WorkerTrigger> = Arc::new(LocalWorkerTrigger::new(worker.clone()));
        Self {
            feed: ProgressFeed::new(Arc::clone(&jobs), Arc::clone(&logs), config.feed),
            control: ControlChannel::new(Arc::clone(&jobs)),
            keepalive: KeepaliveDriver::new(Arc::clone(&jobs), trigger, config.keepalive),
            worker,
            jobs,
            logs,
        }
    }

    pub fn with_trigger(mut self, trigger: Arc<dyn WorkerTrigger>) -> Self {
        self.keepalive = self.keepalive.with_trigger(trigger);
        self
    }

    pub async fn create_job(&self, request: NewJob) -> Result<Job> {
        let job = self.jobs.insert(request.into_job()?).await?;
        info!(
            job_id = %job.id,
            total_items = job.total_items,
            batch_size = job.batch_size,
            "import job created"
        );
        Ok(job)
    }

    pub async fn list_jobs(&self) -> Result<Vec<Job>> {
        self.jobs.list().await
    }

    pub async fn get_job(&self, job_id: &str) -> Result<Job> {
        self.jobs.get(job_id).await
    }

    pub async fn get_progress(&self, job_id: &str) -> Result<ProgressResponse> {
        self.feed.get_progress(job_id).await
    }

    /// Applies a control action and wakes the worker when the job was requeued.
    pub async fn control(&self, job_id: &str, action: ControlAction) -> Result<ControlOutcome> {
        let outcome = self.control.apply(job_id, action).await?;
        if outcome.requeued {
            self.keepalive.ping(job_id).await?;
        }
        Ok(outcome)
    }

    pub async fn kickstart(&self, job_id: &str) -> Result<KickstartAck> {
        self.keepalive.kickstart(job_id).await
    }

    pub async fn ping(&self, job_id: &str) -> Result<()> {
        self.keepalive.ping(job_id).await
    }

    pub async fn download_report(&self, job_id: &str) -> Result<ImportReport> {
        build_report(&self.jobs, &self.logs, job_id).await
    }

    /// Worker entry point: processes at most one chunk.
    pub async fn run_worker(&self, job_id: &str) -> Result<WorkerTick> {
        self.worker.run_once(job_id).await
    }

    pub async fn keepalive_tick(&self) -> Result<usize> {
        self.keepalive.tick().await
    }

    pub fn spawn_passive_keepalive(&self) -> JoinHandle<()> {
        self.keepalive.spawn_passive_loop()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use importd_store::{MemoryJobStore, MemoryLogStore};

    use super::*;
    use crate::worker::tests::ScriptedProcessor;

    fn service(total: u64) -> ImportService {
        ImportService::new(
            Arc::new(MemoryJobStore::new()),
            Arc::new(MemoryLogStore::new()),
            Arc::new(ScriptedProcessor::new(total)),
            ServiceConfig::default(),
        )
    }

    #[tokio::test]
    async fn create_job_validates_request() {
        let service = service(10);

        let err = service
            .create_job(NewJob {
                batch_size: 0,
                ..NewJob::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ImportError::InvalidArgument(_)));

        let err = service
            .create_job(NewJob {
                initial_status: Some(JobStatus::Completed),
                ..NewJob::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ImportError::InvalidArgument(_)));

        let job = service
            .create_job(NewJob {
                label: Some("spring-catalog.csv".to_string()),
                total_items: 10,
                ..NewJob::default()
            })
            .await
            .unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.batch_size, 50);
        assert_eq!(service.list_jobs().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn new_job_defaults_from_json() {
        let request: NewJob = serde_json::from_str(r#"{"total_items": 5}"#).unwrap();
        assert_eq!(request.batch_size, 50);
        assert_eq!(request.schedule_kind, ScheduleKind::OneShot);
        assert_eq!(request.initial_status, None);
    }

    #[tokio::test]
    async fn kickstart_drives_job_through_local_worker() {
        let service = service(100);
        let job = service
            .create_job(NewJob {
                total_items: 100,
                ..NewJob::default()
            })
            .await
            .unwrap();

        assert!(service.kickstart(&job.id).await.unwrap().acknowledged);
        for _ in 0..50 {
            if service.get_job(&job.id).await.unwrap().processed_items == 50 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let progress = service.get_progress(&job.id).await.unwrap();
        assert_eq!(progress.percentage, 50);
        assert_eq!(progress.status, JobStatus::Processing);
        assert_eq!(progress.logs.len(), 50);
    }

    #[tokio::test]
    async fn requeued_resume_wakes_worker() {
        let service = service(100);
        let job = service
            .create_job(NewJob {
                total_items: 100,
                ..NewJob::default()
            })
            .await
            .unwrap();
        service.run_worker(&job.id).await.unwrap();
        service.control(&job.id, ControlAction::Pause).await.unwrap();

        let outcome = service.control(&job.id, ControlAction::Resume).await.unwrap();
        assert!(outcome.requeued);
        for _ in 0..50 {
            if service.get_job(&job.id).await.unwrap().status == JobStatus::Completed {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(
            service.get_job(&job.id).await.unwrap().status,
            JobStatus::Completed
        );
    }
}
