//! Background tasks that keep an [`ObserverSession`] in sync with a job.
//!
//! Three tasks run per observer: a progress poll, a keepalive ping and the
//! counter animation. Poll and ping share one shutdown channel, which the poll
//! task closes when it sees a terminal status. Stopping or dropping the
//! observer aborts every task.

use std::sync::{Arc, Mutex, MutexGuard};

use importd_common::{error::Result, types::ControlAction};
use importd_job::ControlOutcome;
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tracing::{debug, info};

use crate::{
    config::ObserverConfig,
    session::{ObserverSession, ObserverView},
    transport::FeedTransport,
};

type SharedSession = Arc<Mutex<ObserverSession>>;

fn lock(session: &SharedSession) -> MutexGuard<'_, ObserverSession> {
    match session.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

pub struct Observer {
    job_id: String,
    transport: Arc<dyn FeedTransport>,
    session: SharedSession,
    view: watch::Receiver<ObserverView>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Observer {
    pub fn spawn(
        job_id: impl Into<String>,
        transport: Arc<dyn FeedTransport>,
        config: ObserverConfig,
    ) -> Self {
        let job_id = job_id.into();
        let session = Arc::new(Mutex::new(ObserverSession::new(job_id.clone())));
        let (view_tx, view_rx) = watch::channel(lock(&session).view());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let ctx = TaskContext {
            job_id: job_id.clone(),
            transport: Arc::clone(&transport),
            session: Arc::clone(&session),
            view: Arc::new(view_tx),
            config,
        };

        let tasks = vec![
            tokio::spawn(ctx.clone().poll_loop(shutdown_tx.clone())),
            tokio::spawn(ctx.clone().ping_loop(shutdown_rx)),
            tokio::spawn(ctx.animation_loop()),
        ];
        info!(job_id = %job_id, "observer started");

        Self {
            job_id,
            transport,
            session,
            view: view_rx,
            shutdown: shutdown_tx,
            tasks,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn view(&self) -> ObserverView {
        self.view.borrow().clone()
    }

    /// Receiver that changes whenever the displayed state does.
    pub fn subscribe(&self) -> watch::Receiver<ObserverView> {
        self.view.clone()
    }

    /// Sends a control command and folds its outcome into the session.
    pub async fn control(&self, action: ControlAction) -> Result<ControlOutcome> {
        let outcome = self.transport.control(&self.job_id, action).await?;
        lock(&self.session).note_control(action, &outcome);
        Ok(outcome)
    }

    pub fn is_stopped(&self) -> bool {
        self.tasks.iter().all(JoinHandle::is_finished)
    }

    pub fn stop(&mut self) {
        self.shutdown.send_replace(true);
        for task in self.tasks.drain(..) {
            task.abort();
        }
        debug!(job_id = %self.job_id, "observer stopped");
    }
}

impl Drop for Observer {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

#[derive(Clone)]
struct TaskContext {
    job_id: String,
    transport: Arc<dyn FeedTransport>,
    session: SharedSession,
    view: Arc<watch::Sender<ObserverView>>,
    config: ObserverConfig,
}

impl TaskContext {
    fn publish(&self, session: &ObserverSession) {
        self.view.send_replace(session.view());
    }

    /// Fetches one snapshot and applies it. Returns `true` on the first
    /// terminal status.
    async fn refresh(&self) -> bool {
        let response = match self.transport.get_progress(&self.job_id).await {
            Ok(response) => response,
            Err(err) => {
                debug!(
                    job_id = %self.job_id,
                    error = %err,
                    "progress poll failed, retrying next tick"
                );
                return false;
            }
        };

        let outcome = {
            let mut session = lock(&self.session);
            let outcome = session.apply(&response);
            self.publish(&session);
            outcome
        };

        if outcome.kickstart {
            match self.transport.kickstart(&self.job_id).await {
                Ok(ack) => debug!(
                    job_id = %self.job_id,
                    acknowledged = ack.acknowledged,
                    "kickstart sent"
                ),
                Err(err) => debug!(job_id = %self.job_id, error = %err, "kickstart failed"),
            }
        }
        outcome.became_terminal
    }

    async fn poll_loop(self, shutdown: watch::Sender<bool>) {
        let mut ticker = time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if self.refresh().await {
                break;
            }
        }

        shutdown.send_replace(true);
        info!(job_id = %self.job_id, "job reached a terminal status, stopping poll and keepalive");

        time::sleep(self.config.terminal_refresh_delay).await;
        self.refresh().await;
        let mut session = lock(&self.session);
        session.mark_finished();
        self.publish(&session);
    }

    async fn ping_loop(self, mut shutdown: watch::Receiver<bool>) {
        // The first poll decides on the kickstart, so pinging starts one interval later.
        let start = time::Instant::now() + self.config.ping_interval;
        let mut ticker = time::interval_at(start, self.config.ping_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.transport.ping(&self.job_id).await {
                        debug!(job_id = %self.job_id, error = %err, "keepalive ping failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }

    async fn animation_loop(self) {
        let mut ticker = time::interval(self.config.animation_tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let mut session = lock(&self.session);
            if session.animate() {
                self.publish(&session);
            } else if session.is_finished() {
                break;
            }
        }
    }
}
