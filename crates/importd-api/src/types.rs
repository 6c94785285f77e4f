use chrono::{DateTime, Utc};
use importd_common::types::ControlAction;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlRequest {
    pub action: ControlAction,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceInfo {
    pub version: String,
    pub uptime_seconds: u64,
    pub boot_time: DateTime<Utc>,
    pub jobs: JobCounts,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct JobCounts {
    pub total: usize,
    pub running: usize,
    pub paused: usize,
    pub completed: usize,
    pub failed: usize,
}
