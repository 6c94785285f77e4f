use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use tracing::warn;

use crate::ImportSys;

pub async fn health_live() -> impl IntoResponse {
    StatusCode::OK
}

pub async fn health_ready(State(sys): State<Arc<ImportSys>>) -> impl IntoResponse {
    match sys.service().list_jobs().await {
        Ok(_) => StatusCode::OK,
        Err(err) => {
            warn!(error = %err, "job store is not readable");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
