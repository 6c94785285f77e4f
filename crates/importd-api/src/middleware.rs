use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use importd_common::{error::ImportError, types::NONCE_HEADER};
use tracing::debug;

use crate::{ImportSys, handlers::ApiError};

/// Rejects job requests whose nonce header does not match the configured one.
pub async fn require_nonce(
    State(sys): State<Arc<ImportSys>>,
    req: Request,
    next: Next,
) -> Response {
    let Some(expected) = sys.nonce() else {
        return next.run(req).await;
    };

    let provided = req
        .headers()
        .get(NONCE_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim);

    match provided {
        Some(value) if value == expected => next.run(req).await,
        Some(_) => {
            debug!(path = %req.uri().path(), "rejected request with stale nonce");
            json_error(ImportError::AccessDenied("nonce mismatch".to_string()))
        }
        None => json_error(ImportError::AccessDenied(format!(
            "missing {NONCE_HEADER} header"
        ))),
    }
}

fn json_error(error: ImportError) -> Response {
    ApiError(error).into_response()
}
