use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use railseat_core::CoreError;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    AuthenticationError(String),
    #[error("{0}")]
    ValidationError(String),
    #[error("{0}")]
    NotFoundError(String),
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl AppError {
    fn status_and_kind(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::AuthenticationError(_) => (StatusCode::UNAUTHORIZED, "unauthenticated"),
            AppError::ValidationError(_) => (StatusCode::BAD_REQUEST, "validation"),
            AppError::NotFoundError(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::Core(err) => {
                let status = match err {
                    CoreError::ValidationError(_) => StatusCode::BAD_REQUEST,
                    CoreError::NotFound(_) => StatusCode::NOT_FOUND,
                    CoreError::InsufficientSeats { .. } => StatusCode::CONFLICT,
                    CoreError::Timeout { .. } => StatusCode::SERVICE_UNAVAILABLE,
                    CoreError::StorageFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, err.kind())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, kind) = self.status_and_kind();

        let error_message = match &self {
            AppError::Core(CoreError::StorageFailure(err)) => {
                tracing::error!("Internal Server Error: {}", err);
                "Internal Server Error".to_string()
            }
            AppError::Core(CoreError::Timeout { .. }) => {
                "Seat inventory is busy, please try again".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": error_message,
            "kind": kind,
        }));

        (status, body).into_response()
    }
}
