use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::{ImportSys, handlers, middleware::require_nonce};

pub fn import_router(sys: Arc<ImportSys>) -> Router {
    let jobs = Router::new()
        .route("/import/v1/info", get(handlers::info::service_info))
        .route(
            "/import/v1/jobs",
            get(handlers::jobs::list_jobs).post(handlers::jobs::create_job),
        )
        .route("/import/v1/jobs/{job_id}", get(handlers::jobs::get_job))
        .route(
            "/import/v1/jobs/{job_id}/progress",
            get(handlers::jobs::get_progress),
        )
        .route(
            "/import/v1/jobs/{job_id}/control",
            post(handlers::jobs::control_job),
        )
        .route(
            "/import/v1/jobs/{job_id}/kickstart",
            post(handlers::jobs::kickstart_job),
        )
        .route("/import/v1/jobs/{job_id}/ping", post(handlers::jobs::ping_job))
        .route(
            "/import/v1/jobs/{job_id}/report",
            get(handlers::jobs::download_report),
        )
        .route("/import/v1/jobs/{job_id}/run", post(handlers::jobs::run_worker))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&sys),
            require_nonce,
        ))
        .with_state(Arc::clone(&sys));

    Router::new()
        .route("/health/live", get(handlers::health::health_live))
        .route("/health/ready", get(handlers::health::health_ready))
        .with_state(sys)
        .merge(jobs)
        .layer(TraceLayer::new_for_http())
}
