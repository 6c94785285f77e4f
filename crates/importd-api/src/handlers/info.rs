use std::sync::Arc;

use axum::{Json, extract::State};
use importd_common::types::JobStatus;

use crate::{
    ImportSys,
    handlers::ApiError,
    types::{JobCounts, ServiceInfo},
};

pub async fn service_info(
    State(sys): State<Arc<ImportSys>>,
) -> Result<Json<ServiceInfo>, ApiError> {
    let jobs = sys.service().list_jobs().await?;
    let mut counts = JobCounts {
        total: jobs.len(),
        ..JobCounts::default()
    };
    for job in &jobs {
        match job.status {
            JobStatus::Pending | JobStatus::Preparing | JobStatus::Processing => {
                counts.running += 1
            }
            JobStatus::Paused => counts.paused += 1,
            JobStatus::Completed => counts.completed += 1,
            JobStatus::Failed => counts.failed += 1,
        }
    }

    Ok(Json(ServiceInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: sys.uptime_seconds(),
        boot_time: sys.boot_time(),
        jobs: counts,
    }))
}
