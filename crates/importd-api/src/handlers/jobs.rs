use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use importd_common::types::Job;
use importd_job::{ControlOutcome, KickstartAck, NewJob, ProgressResponse, WorkerTick};

use crate::{ImportSys, handlers::ApiError, types::ControlRequest};

pub async fn list_jobs(State(sys): State<Arc<ImportSys>>) -> Result<Json<Vec<Job>>, ApiError> {
    Ok(Json(sys.service().list_jobs().await?))
}

pub async fn create_job(
    State(sys): State<Arc<ImportSys>>,
    Json(payload): Json<NewJob>,
) -> Result<(StatusCode, Json<Job>), ApiError> {
    let job = sys.service().create_job(payload).await?;
    Ok((StatusCode::CREATED, Json(job)))
}

pub async fn get_job(
    State(sys): State<Arc<ImportSys>>,
    Path(job_id): Path<String>,
) -> Result<Json<Job>, ApiError> {
    Ok(Json(sys.service().get_job(&job_id).await?))
}

pub async fn get_progress(
    State(sys): State<Arc<ImportSys>>,
    Path(job_id): Path<String>,
) -> Result<Json<ProgressResponse>, ApiError> {
    Ok(Json(sys.service().get_progress(&job_id).await?))
}

pub async fn control_job(
    State(sys): State<Arc<ImportSys>>,
    Path(job_id): Path<String>,
    Json(payload): Json<ControlRequest>,
) -> Result<Json<ControlOutcome>, ApiError> {
    Ok(Json(sys.service().control(&job_id, payload.action).await?))
}

pub async fn kickstart_job(
    State(sys): State<Arc<ImportSys>>,
    Path(job_id): Path<String>,
) -> Result<Json<KickstartAck>, ApiError> {
    Ok(Json(sys.service().kickstart(&job_id).await?))
}

pub async fn ping_job(
    State(sys): State<Arc<ImportSys>>,
    Path(job_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    sys.service().ping(&job_id).await?;
    Ok(Json(serde_json::json!({})))
}

pub async fn download_report(
    State(sys): State<Arc<ImportSys>>,
    Path(job_id): Path<String>,
) -> Result<Response, ApiError> {
    let report = sys.service().download_report(&job_id).await?;
    let body = report.to_json()?;
    let disposition = format!("attachment; filename=\"{}\"", report.file_name());
    Ok((
        [
            (header::CONTENT_TYPE, "application/json".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}

/// Worker entry point used by remote keepalive triggers.
pub async fn run_worker(
    State(sys): State<Arc<ImportSys>>,
    Path(job_id): Path<String>,
) -> Result<Json<WorkerTick>, ApiError> {
    Ok(Json(sys.service().run_worker(&job_id).await?))
}
