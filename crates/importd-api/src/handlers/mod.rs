pub mod health;
pub mod info;
pub mod jobs;

use axum::{Json, http::StatusCode, response::IntoResponse};
use importd_common::error::ImportError;

pub struct ApiError(pub ImportError);

impl From<ImportError> for ApiError {
    fn from(value: ImportError) -> Self {
        Self(value)
    }
}

pub(crate) fn status_for(error: &ImportError) -> StatusCode {
    match error {
        ImportError::JobNotFound(_) => StatusCode::NOT_FOUND,
        ImportError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        ImportError::AccessDenied(_) => StatusCode::FORBIDDEN,
        ImportError::Conflict { .. } | ImportError::InvalidTransition { .. } => {
            StatusCode::CONFLICT
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (
            status_for(&self.0),
            Json(serde_json::json!({
                "code": self.0.error_code(),
                "message": self.0.to_string(),
            })),
        )
            .into_response()
    }
}
