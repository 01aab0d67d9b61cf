use axum::{extract::multipart::MultipartError, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PicbedError {
    #[error("{0}")]
    IO(#[from] std::io::Error),

    #[error("{0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Multipart(#[from] MultipartError),

    #[error("{0}")]
    Upstream(#[from] reqwest::Error),

    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),
}

impl IntoResponse for PicbedError {
    fn into_response(self) -> axum::response::Response {
        match self {
            PicbedError::IO(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            PicbedError::Json(e) => error_response(StatusCode::BAD_REQUEST, e.to_string()),
            PicbedError::Multipart(e) => error_response(StatusCode::BAD_REQUEST, e.to_string()),
            // Upstream detail goes to the forward log, never to the client.
            PicbedError::Upstream(_) => error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "forward request failed".to_string(),
            ),
            PicbedError::InvalidInput(e) => error_response(StatusCode::BAD_REQUEST, e),
            PicbedError::NotFound(e) => error_response(StatusCode::NOT_FOUND, e),
            PicbedError::Conflict(e) => error_response(StatusCode::BAD_REQUEST, e),
        }
    }
}

fn error_response(status: StatusCode, message: String) -> axum::response::Response {
    (status, Json(json!({ "error": message }))).into_response()
}
