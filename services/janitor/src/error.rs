//! Error types for the janitor service

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use inventory::InventoryError;

/// Result type for janitor handlers
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Error types for janitor handlers
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// A required query parameter was absent or empty
    #[error("{0} parameter is required")]
    MissingParameter(&'static str),

    /// A query parameter could not be parsed
    #[error("invalid {name} parameter: {value}")]
    InvalidParameter {
        /// Parameter name
        name: &'static str,
        /// Value as received
        value: String,
    },

    /// The request body could not be decoded
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// An inventory operation failed
    #[error(transparent)]
    Inventory(#[from] InventoryError),
}

impl From<JsonRejection> for ServiceError {
    fn from(rejection: JsonRejection) -> Self {
        ServiceError::InvalidRequest(rejection.body_text())
    }
}

impl ServiceError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::MissingParameter(_)
            | ServiceError::InvalidParameter { .. }
            | ServiceError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ServiceError::Inventory(error) if error.is_invalid_input() => StatusCode::BAD_REQUEST,
            ServiceError::Inventory(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, serde::Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, "Rejected request");
        }

        let body = ErrorResponse {
            error: self.to_string(),
        };
        (status, axum::Json(body)).into_response()
    }
}
