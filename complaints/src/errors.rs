use crate::store::StoreError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use uuid::Uuid;

#[derive(thiserror::Error, Debug)]
pub enum ComplaintError {
    #[error("complaint not found with id: {0}")]
    NotFound(Uuid),

    #[error("failed to add complaint: {0}")]
    CreationFailed(#[source] StoreError),

    #[error("failed to update complaint: {0}")]
    UpdateFailed(#[source] StoreError),

    #[error("unexpected error: {0}")]
    Unexpected(#[source] StoreError),
}

#[derive(Serialize)]
struct ApiErrorResponse {
    error_message: String,
}

impl IntoResponse for ComplaintError {
    fn into_response(self) -> Response {
        let status = match &self {
            ComplaintError::NotFound(_) => StatusCode::NOT_FOUND,
            ComplaintError::CreationFailed(_) | ComplaintError::UpdateFailed(_) => {
                StatusCode::BAD_REQUEST
            }
            ComplaintError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        // The cause of an internal error is logged, not exposed.
        let error_message = match &self {
            ComplaintError::Unexpected(cause) => {
                tracing::error!(error = %cause, "unexpected error handling complaint request");
                "an unexpected error occurred".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(ApiErrorResponse { error_message })).into_response()
    }
}
