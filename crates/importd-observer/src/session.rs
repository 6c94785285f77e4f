//! Client-held reconciliation state for one observed job.
//!
//! Every feed response passes through [`ObserverSession::apply`]. Counters only
//! move forward, log batches are accepted only when strictly newer than what
//! is already shown, and the kickstart decision is made at most once.

use importd_common::types::{ControlAction, JobFailure, JobId, JobStatus, LogEntry};
use importd_job::{ControlOutcome, ProgressResponse, kickstart_eligible};
use serde::Serialize;

use crate::animation::AnimatedCounter;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub logs_applied: bool,
    pub status_changed: bool,
    /// First time this session saw a terminal status.
    pub became_terminal: bool,
    /// The caller should send this session's single kickstart now.
    pub kickstart: bool,
}

/// What a renderer shows right now.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ObserverView {
    pub job_id: JobId,
    pub status: Option<JobStatus>,
    pub status_label: String,
    pub percentage: u64,
    pub processed_items: u64,
    pub total_items: u64,
    pub eta_text: String,
    pub success_rate: Option<f64>,
    pub logs: Vec<LogEntry>,
    pub recent_errors: Vec<LogEntry>,
    pub failure: Option<JobFailure>,
    pub terminal: bool,
    /// The post-terminal refresh has been applied; nothing else will change.
    pub finished: bool,
}

#[derive(Debug, Clone)]
pub struct ObserverSession {
    job_id: JobId,
    last_seen_log_id: Option<u64>,
    percentage: AnimatedCounter,
    processed: AnimatedCounter,
    total: AnimatedCounter,
    status: Option<JobStatus>,
    status_label: String,
    eta_text: String,
    success_rate: Option<f64>,
    logs: Vec<LogEntry>,
    recent_errors: Vec<LogEntry>,
    failure: Option<JobFailure>,
    kickstarted: bool,
    resumed_from_pause: bool,
    terminal: bool,
    finished: bool,
}

impl ObserverSession {
    pub fn new(job_id: impl Into<JobId>) -> Self {
        Self {
            job_id: job_id.into(),
            last_seen_log_id: None,
            percentage: AnimatedCounter::default(),
            processed: AnimatedCounter::default(),
            total: AnimatedCounter::default(),
            status: None,
            status_label: String::new(),
            eta_text: String::new(),
            success_rate: None,
            logs: Vec::new(),
            recent_errors: Vec::new(),
            failure: None,
            kickstarted: false,
            resumed_from_pause: false,
            terminal: false,
            finished: false,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn last_seen_log_id(&self) -> Option<u64> {
        self.last_seen_log_id
    }

    pub fn status(&self) -> Option<JobStatus> {
        self.status
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn kickstarted(&self) -> bool {
        self.kickstarted
    }

    pub fn apply(&mut self, response: &ProgressResponse) -> ApplyOutcome {
        let mut outcome = ApplyOutcome::default();

        let newest = response
            .newest_log_id()
            .filter(|newest| self.last_seen_log_id.is_none_or(|seen| *newest > seen));
        if newest.is_some() {
            self.last_seen_log_id = newest;
            self.logs = response.logs.clone();
            outcome.logs_applied = true;
        }

        self.percentage
            .retarget(self.percentage.target().max(u64::from(response.percentage)));
        self.processed
            .retarget(self.processed.target().max(response.processed_items));
        if response.total_items > 0 {
            self.total.retarget(response.total_items);
        }

        // A late response from before the terminal transition must not revive the job.
        if !self.terminal && self.status != Some(response.status) {
            self.status = Some(response.status);
            self.status_label = response.status_label.clone();
            outcome.status_changed = true;
        }
        self.eta_text = response.eta_text.clone();
        self.success_rate = Some(response.stats.success_rate.percent);
        self.failure = response.failure.clone();
        if !response.recent_errors.is_empty() {
            self.recent_errors = response.recent_errors.clone();
        }

        if !self.terminal && response.status.is_terminal() {
            self.terminal = true;
            outcome.became_terminal = true;
        }

        if !self.kickstarted
            && !self.terminal
            && kickstart_eligible(
                response.status,
                response.total_items,
                response.processed_items,
                self.resumed_from_pause,
            )
        {
            self.kickstarted = true;
            outcome.kickstart = true;
        }

        outcome
    }

    /// Records the result of a control command this observer issued.
    ///
    /// A terminal session keeps its final status: polling has already stopped,
    /// so a job requeued by `retry` needs a fresh observer.
    pub fn note_control(&mut self, action: ControlAction, outcome: &ControlOutcome) {
        if !outcome.success || self.terminal {
            return;
        }
        if action == ControlAction::Resume && outcome.requeued {
            self.resumed_from_pause = true;
        }
        self.status = Some(outcome.status);
        self.status_label = outcome.status.label().to_string();
    }

    pub fn mark_finished(&mut self) {
        self.finished = true;
    }

    /// Advances every counter one unit. Returns `true` while anything moved.
    pub fn animate(&mut self) -> bool {
        let percentage = self.percentage.step();
        let processed = self.processed.step();
        let total = self.total.step();
        percentage || processed || total
    }

    pub fn is_settled(&self) -> bool {
        self.percentage.is_settled() && self.processed.is_settled() && self.total.is_settled()
    }

    pub fn view(&self) -> ObserverView {
        ObserverView {
            job_id: self.job_id.clone(),
            status: self.status,
            status_label: self.status_label.clone(),
            percentage: self.percentage.displayed(),
            processed_items: self.processed.displayed(),
            total_items: self.total.displayed(),
            eta_text: self.eta_text.clone(),
            success_rate: self.success_rate,
            logs: self.logs.clone(),
            recent_errors: self.recent_errors.clone(),
            failure: self.failure.clone(),
            terminal: self.terminal,
            finished: self.finished,
        }
    }
}
