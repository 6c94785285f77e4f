//! Keeps the worker advancing without a persistent connection.
//!
//! Observers ping while they watch a job, a kickstart forces an immediate run,
//! and a passive loop re-triggers every runnable job on a fixed interval so a
//! job keeps moving after the last observer has gone away.

use std::{sync::Arc, time::Duration};

use importd_common::{
    error::Result,
    types::{JobStatus, ScheduleKind},
};
use importd_store::JobStore;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{inflight::InFlightSet, trigger::WorkerTrigger};

#[derive(Debug, Clone)]
pub struct KeepaliveConfig {
    pub passive_interval: Duration,
    /// Upper bound on one remote worker invocation. A job stays claimed until
    /// its invocation returns, so this is also the longest a hung endpoint can
    /// hold back the next keepalive for that job.
    pub trigger_timeout: Duration,
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            passive_interval: Duration::from_secs(30),
            trigger_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KickstartAck {
    pub acknowledged: bool,
}

#[derive(Clone)]
pub struct KeepaliveDriver {
    jobs: Arc<dyn JobStore>,
    trigger: Arc<dyn WorkerTrigger>,
    in_flight: InFlightSet,
    config: KeepaliveConfig,
}

impl KeepaliveDriver {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        trigger: Arc<dyn WorkerTrigger>,
        config: KeepaliveConfig,
    ) -> Self {
        Self {
            jobs,
            trigger,
            in_flight: InFlightSet::default(),
            config,
        }
    }

    pub fn with_trigger(self, trigger: Arc<dyn WorkerTrigger>) -> Self {
        Self { trigger, ..self }
    }

    /// Re-triggers the worker if the job can make progress. Never reports
    /// trigger failures to the caller.
    pub async fn ping(&self, job_id: &str) -> Result<()> {
        let job = self.jobs.get(job_id).await?;
        if job.status.is_runnable() {
            self.fire(job_id);
        }
        Ok(())
    }

    /// Forces an immediate worker run. Repeated kickstarts while a run is still
    /// in flight are acknowledged without stacking another invocation.
    pub async fn kickstart(&self, job_id: &str) -> Result<KickstartAck> {
        let job = self.jobs.get(job_id).await?;
        if !job.status.is_runnable() {
            debug!(
                job_id = %job_id,
                status = %job.status,
                "kickstart ignored for non-runnable job"
            );
            return Ok(KickstartAck {
                acknowledged: false,
            });
        }
        if self.fire(job_id) {
            info!(job_id = %job_id, "worker kickstarted");
        }
        Ok(KickstartAck { acknowledged: true })
    }

    /// One passive keepalive pass. Returns how many jobs were triggered.
    pub async fn tick(&self) -> Result<usize> {
        let mut triggered = 0;
        for job in self.jobs.list().await? {
            if job.schedule_kind == ScheduleKind::Disabled || !job.status.is_runnable() {
                continue;
            }
            if self.fire(&job.id) {
                triggered += 1;
            }
        }
        Ok(triggered)
    }

    pub fn spawn_passive_loop(&self) -> JoinHandle<()> {
        let driver = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(driver.config.passive_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match driver.tick().await {
                    Ok(0) => {}
                    Ok(triggered) => debug!(triggered, "passive keepalive triggered workers"),
                    Err(err) => warn!(error = %err, "passive keepalive pass failed"),
                }
            }
        })
    }

    pub fn is_in_flight(&self, job_id: &str) -> bool {
        self.in_flight.contains(job_id)
    }

    /// Spawns a trigger unless one is already running for the job.
    fn fire(&self, job_id: &str) -> bool {
        let Some(claim) = self.in_flight.try_claim(job_id) else {
            return false;
        };
        let trigger = Arc::clone(&self.trigger);
        let job_id = job_id.to_string();
        tokio::spawn(async move {
            let _claim = claim;
            if let Err(err) = trigger.invoke(&job_id).await {
                debug!(
                    job_id = %job_id,
                    error = %err,
                    "worker trigger failed, next keepalive will retry"
                );
            }
        });
        true
    }
}

/// Whether an observer should send its one kickstart for this session.
pub fn kickstart_eligible(
    status: JobStatus,
    total_items: u64,
    processed_items: u64,
    resumed_from_pause: bool,
) -> bool {
    (status == JobStatus::Pending && total_items > 0)
        || (resumed_from_pause && status == JobStatus::Pending && processed_items == 0)
}
