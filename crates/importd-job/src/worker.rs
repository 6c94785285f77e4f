//! Chunked worker that advances a job one batch per invocation.
//!
//! The worker may be invoked repeatedly by keepalive pings, kickstarts and the
//! passive scheduler, possibly while a previous invocation is still running.
//! Status writes are compare-and-swap against the statuses the worker owns, and
//! progress writes only ever raise `processed_items`, so overlapping or stale
//! invocations never undo each other.

use std::sync::Arc;

use async_trait::async_trait;
use importd_common::{
    error::{ImportError, Result},
    time,
    types::{Job, JobFailure, JobStatus, LogLevel, NewLogEntry},
};
use importd_store::{JobPatch, JobStore, LogStore, Precondition};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::inflight::InFlightSet;

const RUNNABLE: &[JobStatus] = &[
    JobStatus::Pending,
    JobStatus::Preparing,
    JobStatus::Processing,
];
const PENDING: &[JobStatus] = &[JobStatus::Pending];
const PROCESSING: &[JobStatus] = &[JobStatus::Processing];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ItemOutcome {
    Created,
    Updated,
    Skipped { reason: String },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemResult {
    pub item_key: String,
    #[serde(flatten)]
    pub outcome: ItemOutcome,
}

impl ItemResult {
    fn log_entry(&self, job_id: &str) -> NewLogEntry {
        let (level, message) = match &self.outcome {
            ItemOutcome::Created => (LogLevel::Success, "created".to_string()),
            ItemOutcome::Updated => (LogLevel::Success, "updated".to_string()),
            ItemOutcome::Skipped { reason } => (LogLevel::Warning, format!("skipped: {reason}")),
            ItemOutcome::Failed { reason } => (LogLevel::Error, format!("error: {reason}")),
        };
        NewLogEntry::outcome(job_id, level, self.item_key.clone(), message)
    }
}

/// The import business logic. Parsing and catalog writes live behind this trait.
#[async_trait]
pub trait ChunkProcessor: Send + Sync {
    /// Counts the items in the job's source. Zero means there is nothing to import.
    async fn prepare(&self, job: &Job) -> Result<u64>;

    /// Processes up to `limit` items starting at `offset`. An `Err` is fatal for
    /// the whole job; per-item problems belong in `ItemOutcome::Failed`.
    async fn process_chunk(&self, job: &Job, offset: u64, limit: u64) -> Result<Vec<ItemResult>>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "tick", rename_all = "snake_case")]
pub enum WorkerTick {
    /// Another invocation for the same job is still running in this process.
    Busy,
    /// The job was not in a runnable status.
    Idle { status: JobStatus },
    Advanced { processed_items: u64, total_items: u64 },
    Completed { processed_items: u64 },
    Failed { message: String },
}

#[derive(Clone)]
pub struct ImportWorker {
    jobs: Arc<dyn JobStore>,
    logs: Arc<dyn LogStore>,
    processor: Arc<dyn ChunkProcessor>,
    in_flight: InFlightSet,
}

impl ImportWorker {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        logs: Arc<dyn LogStore>,
        processor: Arc<dyn ChunkProcessor>,
    ) -> Self {
        Self {
            jobs,
            logs,
            processor,
            in_flight: InFlightSet::default(),
        }
    }

    pub async fn run_once(&self, job_id: &str) -> Result<WorkerTick> {
        let Some(_claim) = self.in_flight.try_claim(job_id) else {
            debug!(job_id = %job_id, "worker already running for job");
            return Ok(WorkerTick::Busy);
        };

        let mut job = self.jobs.get(job_id).await?;
        if !job.status.is_runnable() {
            return Ok(WorkerTick::Idle { status: job.status });
        }

        if job.total_items == 0 {
            match self.prepare(job).await? {
                Ok(prepared) => job = prepared,
                Err(tick) => return Ok(tick),
            }
        }

        job = match self
            .jobs
            .update(
                job_id,
                &JobPatch::status(JobStatus::Processing),
                Precondition::StatusIn(RUNNABLE),
            )
            .await
        {
            Ok(job) => job,
            Err(ImportError::Conflict { .. }) => return self.idle(job_id).await,
            Err(err) => return Err(err),
        };

        if job.remaining_items() == 0 {
            return self.complete(&job).await;
        }

        self.process_next_chunk(job).await
    }

    /// Resolves the total item count. `Err(tick)` ends this invocation early.
    async fn prepare(&self, job: Job) -> Result<std::result::Result<Job, WorkerTick>> {
        let job_id = job.id.clone();
        let job = if job.status == JobStatus::Pending {
            match self
                .jobs
                .update(
                    &job_id,
                    &JobPatch::status(JobStatus::Preparing),
                    Precondition::StatusIn(PENDING),
                )
                .await
            {
                Ok(job) => job,
                Err(ImportError::Conflict { .. }) => return self.idle(&job_id).await.map(Err),
                Err(err) => return Err(err),
            }
        } else {
            job
        };

        let total = match self.processor.prepare(&job).await {
            Ok(total) => total,
            Err(err) => return self.fail(&job_id, err.to_string()).await.map(Err),
        };
        info!(job_id = %job_id, total_items = total, "import source prepared");

        if total == 0 {
            return self.complete(&job).await.map(Err);
        }

        let patch = JobPatch {
            total_items: Some(total),
            last_activity_at: Some(time::now()),
            ..JobPatch::default()
        };
        self.jobs
            .update(&job_id, &patch, Precondition::None)
            .await
            .map(Ok)
    }

    async fn process_next_chunk(&self, job: Job) -> Result<WorkerTick> {
        let offset = job.processed_items;
        let limit = job.batch_size.max(1).min(job.remaining_items());
        let chunk = offset / job.batch_size.max(1) + 1;
        let chunks = job.total_items.div_ceil(job.batch_size.max(1));

        self.logs
            .append(NewLogEntry::narration(
                job.id.clone(),
                LogLevel::Info,
                format!("processing chunk {chunk} of {chunks}"),
            ))
            .await?;

        let results = match self.processor.process_chunk(&job, offset, limit).await {
            Ok(results) => results,
            Err(err) => return self.fail(&job.id, err.to_string()).await,
        };
        if results.is_empty() {
            return self
                .fail(
                    &job.id,
                    format!(
                        "processor returned no items at offset {offset} of {}",
                        job.total_items
                    ),
                )
                .await;
        }

        let mut failed_items = 0usize;
        for result in &results {
            if matches!(result.outcome, ItemOutcome::Failed { .. }) {
                failed_items += 1;
            }
            self.logs.append(result.log_entry(&job.id)).await?;
        }

        let advanced = results.len().min(limit as usize) as u64;
        let job = self
            .jobs
            .update(
                &job.id,
                &JobPatch::progress(offset + advanced, time::now()),
                Precondition::None,
            )
            .await?;
        debug!(
            job_id = %job.id,
            chunk,
            chunks,
            processed_items = job.processed_items,
            failed_items,
            "chunk processed"
        );

        if job.remaining_items() == 0 {
            return self.complete(&job).await;
        }

        Ok(WorkerTick::Advanced {
            processed_items: job.processed_items,
            total_items: job.total_items,
        })
    }

    async fn complete(&self, job: &Job) -> Result<WorkerTick> {
        let precondition = if job.total_items == 0 {
            Precondition::StatusIn(RUNNABLE)
        } else {
            Precondition::StatusIn(PROCESSING)
        };
        match self
            .jobs
            .update(
                &job.id,
                &JobPatch::status(JobStatus::Completed),
                precondition,
            )
            .await
        {
            Ok(job) => {
                self.logs
                    .append(NewLogEntry::narration(
                        job.id.clone(),
                        LogLevel::Success,
                        format!("import completed: {} items processed", job.processed_items),
                    ))
                    .await?;
                info!(job_id = %job.id, processed_items = job.processed_items, "import completed");
                Ok(WorkerTick::Completed {
                    processed_items: job.processed_items,
                })
            }
            Err(ImportError::Conflict { .. }) => self.idle(&job.id).await,
            Err(err) => Err(err),
        }
    }

    async fn fail(&self, job_id: &str, message: String) -> Result<WorkerTick> {
        let patch = JobPatch::status(JobStatus::Failed).with_failure(JobFailure::Fatal {
            message: message.clone(),
        });
        match self
            .jobs
            .update(job_id, &patch, Precondition::StatusIn(RUNNABLE))
            .await
        {
            Ok(_) => {
                warn!(job_id = %job_id, error = %message, "import failed");
                self.logs
                    .append(NewLogEntry::narration(
                        job_id,
                        LogLevel::Error,
                        format!("import failed: {message}"),
                    ))
                    .await?;
                Ok(WorkerTick::Failed { message })
            }
            Err(ImportError::Conflict { .. }) => self.idle(job_id).await,
            Err(err) => Err(err),
        }
    }

    async fn idle(&self, job_id: &str) -> Result<WorkerTick> {
        let status = self.jobs.get(job_id).await?.status;
        debug!(job_id = %job_id, status = %status, "job left runnable status during worker run");
        Ok(WorkerTick::Idle { status })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::HashSet;

    use importd_common::types::ControlAction;
    use importd_store::{LogQuery, MemoryJobStore, MemoryLogStore};

    use super::*;
    use crate::{control::ControlChannel, progress::percentage};

    /// Emits `SKU-<n>` items, failing the indices listed in `failing`.
    pub(crate) struct ScriptedProcessor {
        pub total: u64,
        pub failing: HashSet<u64>,
        pub fatal_at: Option<u64>,
    }

    impl ScriptedProcessor {
        pub(crate) fn new(total: u64) -> Self {
            Self {
                total,
                failing: HashSet::new(),
                fatal_at: None,
            }
        }
    }

    #[async_trait]
    impl ChunkProcessor for ScriptedProcessor {
        async fn prepare(&self, _job: &Job) -> Result<u64> {
            Ok(self.total)
        }

        async fn process_chunk(
            &self,
            _job: &Job,
            offset: u64,
            limit: u64,
        ) -> Result<Vec<ItemResult>> {
            if self.fatal_at == Some(offset) {
                return Err(ImportError::InternalError("source file truncated".to_string()));
            }
            Ok((offset..(offset + limit).min(self.total))
                .map(|index| ItemResult {
                    item_key: format!("SKU-{index}"),
                    outcome: if self.failing.contains(&index) {
                        ItemOutcome::Failed {
                            reason: "missing price".to_string(),
                        }
                    } else {
                        ItemOutcome::Created
                    },
                })
                .collect())
        }
    }

    pub(crate) struct Fixture {
        pub jobs: Arc<MemoryJobStore>,
        pub logs: Arc<MemoryLogStore>,
        pub worker: ImportWorker,
    }

    pub(crate) fn fixture(processor: ScriptedProcessor) -> Fixture {
        let jobs = Arc::new(MemoryJobStore::new());
        let logs = Arc::new(MemoryLogStore::new());
        let worker = ImportWorker::new(jobs.clone(), logs.clone(), Arc::new(processor));
        Fixture { jobs, logs, worker }
    }

    async fn insert_job(fixture: &Fixture, total: u64, batch_size: u64) -> String {
        let mut job = Job::new(batch_size);
        job.total_items = total;
        fixture.jobs.insert(job).await.unwrap().id
    }

    #[tokio::test]
    async fn two_chunks_reach_completion() {
        let fixture = fixture(ScriptedProcessor::new(100));
        let id = insert_job(&fixture, 100, 50).await;

        let mut percentages = vec![percentage(0, 100)];
        let mut statuses = vec![fixture.jobs.get(&id).await.unwrap().status];
        loop {
            let tick = fixture.worker.run_once(&id).await.unwrap();
            let job = fixture.jobs.get(&id).await.unwrap();
            assert!(job.processed_items <= job.total_items);
            percentages.push(percentage(job.processed_items, job.total_items));
            if statuses.last() != Some(&job.status) {
                statuses.push(job.status);
            }
            if matches!(tick, WorkerTick::Completed { .. }) {
                break;
            }
        }

        assert_eq!(percentages, vec![0, 50, 100]);
        assert_eq!(
            statuses,
            vec![JobStatus::Pending, JobStatus::Processing, JobStatus::Completed]
        );
    }

    #[tokio::test]
    async fn unknown_total_is_prepared_first() {
        let fixture = fixture(ScriptedProcessor::new(30));
        let id = insert_job(&fixture, 0, 20).await;

        let tick = fixture.worker.run_once(&id).await.unwrap();
        assert_eq!(
            tick,
            WorkerTick::Advanced {
                processed_items: 20,
                total_items: 30
            }
        );
        let tick = fixture.worker.run_once(&id).await.unwrap();
        assert_eq!(tick, WorkerTick::Completed { processed_items: 30 });
    }

    #[tokio::test]
    async fn empty_source_completes_immediately() {
        let fixture = fixture(ScriptedProcessor::new(0));
        let id = insert_job(&fixture, 0, 20).await;

        let tick = fixture.worker.run_once(&id).await.unwrap();
        assert_eq!(tick, WorkerTick::Completed { processed_items: 0 });
        assert_eq!(
            fixture.jobs.get(&id).await.unwrap().status,
            JobStatus::Completed
        );
    }

    #[tokio::test]
    async fn item_failures_are_logged_without_halting() {
        let mut processor = ScriptedProcessor::new(100);
        processor.failing = (0..5).map(|index| index * 20).collect();
        let fixture = fixture(processor);
        let id = insert_job(&fixture, 100, 50).await;

        fixture.worker.run_once(&id).await.unwrap();
        fixture.worker.run_once(&id).await.unwrap();

        let job = fixture.jobs.get(&id).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        let errors = fixture
            .logs
            .count(&id, &LogQuery::recent_errors(usize::MAX))
            .await
            .unwrap();
        assert_eq!(errors, 5);
        let stats = crate::progress::ProgressStats::for_job(&job, errors);
        assert_eq!(stats.success_rate.percent, 95.0);
    }

    #[tokio::test]
    async fn processor_error_fails_the_job() {
        let mut processor = ScriptedProcessor::new(100);
        processor.fatal_at = Some(50);
        let fixture = fixture(processor);
        let id = insert_job(&fixture, 100, 50).await;

        fixture.worker.run_once(&id).await.unwrap();
        let tick = fixture.worker.run_once(&id).await.unwrap();
        assert!(matches!(tick, WorkerTick::Failed { .. }));

        let job = fixture.jobs.get(&id).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.processed_items, 50);
        assert!(matches!(job.failure, Some(JobFailure::Fatal { .. })));
    }

    #[tokio::test]
    async fn paused_job_resumes_from_its_offset() {
        let fixture = fixture(ScriptedProcessor::new(100));
        let id = insert_job(&fixture, 100, 40).await;
        let control = ControlChannel::new(fixture.jobs.clone());

        fixture.worker.run_once(&id).await.unwrap();
        control.apply(&id, ControlAction::Pause).await.unwrap();
        assert_eq!(
            fixture.worker.run_once(&id).await.unwrap(),
            WorkerTick::Idle {
                status: JobStatus::Paused
            }
        );

        let outcome = control.apply(&id, ControlAction::Resume).await.unwrap();
        assert_eq!(outcome.status, JobStatus::Pending);
        assert_eq!(fixture.jobs.get(&id).await.unwrap().processed_items, 40);

        let tick = fixture.worker.run_once(&id).await.unwrap();
        assert_eq!(
            tick,
            WorkerTick::Advanced {
                processed_items: 80,
                total_items: 100
            }
        );
        let latest = fixture
            .logs
            .query(&id, &LogQuery::outcome_tail(1))
            .await
            .unwrap();
        assert_eq!(latest[0].item_key.as_deref(), Some("SKU-79"));
    }

    #[tokio::test]
    async fn completed_job_ignores_late_stop() {
        let fixture = fixture(ScriptedProcessor::new(10));
        let id = insert_job(&fixture, 10, 10).await;
        let control = ControlChannel::new(fixture.jobs.clone());

        fixture.worker.run_once(&id).await.unwrap();
        let outcome = control.apply(&id, ControlAction::Stop).await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.status, JobStatus::Completed);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn overlapping_invocations_never_exceed_total() {
        let fixture = fixture(ScriptedProcessor::new(100));
        let id = insert_job(&fixture, 100, 10).await;

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let worker = fixture.worker.clone();
                let id = id.clone();
                tokio::spawn(async move { worker.run_once(&id).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        while fixture.jobs.get(&id).await.unwrap().status != JobStatus::Completed {
            fixture.worker.run_once(&id).await.unwrap();
        }
        let job = fixture.jobs.get(&id).await.unwrap();
        assert_eq!(job.processed_items, 100);
        let outcomes = fixture
            .logs
            .count(&id, &LogQuery::outcome_tail(usize::MAX))
            .await
            .unwrap();
        assert_eq!(outcomes, 100);
    }
}
