use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Photo not found: {0}")]
    PhotoNotFound(String),

    #[error("Photo too large: {size} bytes (max {max})")]
    PhotoTooLarge { size: usize, max: usize },

    #[error("Photo storage error: {0}")]
    PhotoStorage(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ServerError::PhotoNotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            ServerError::PhotoTooLarge { .. } => {
                (StatusCode::PAYLOAD_TOO_LARGE, self.to_string())
            }
            ServerError::PhotoStorage(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Photo storage error".to_string())
            }
            ServerError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, axum::Json(body)).into_response()
    }
}
