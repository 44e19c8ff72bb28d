use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

use tomecast_core::MediaError;

use crate::auth::AuthError;
use crate::playback::PlaybackError;
use crate::transcoding::EngineError;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
    /// Size of the resource, reported back on 416 responses.
    pub range_size: Option<u64>,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            range_size: None,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn range_not_satisfiable(size: u64) -> Self {
        Self {
            range_size: Some(size),
            ..Self::new(StatusCode::RANGE_NOT_SATISFIABLE, "range not satisfiable")
        }
    }

    pub fn transcode_failed(message: impl Into<String>) -> Self {
        Self::internal(format!("transcode failed: {}", message.into()))
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let Some(size) = self.range_size {
            // 416 carries no body, only the resource size.
            let mut response = self.status.into_response();
            if let Ok(value) = HeaderValue::from_str(&format!("bytes */{size}")) {
                response.headers_mut().insert(header::CONTENT_RANGE, value);
            }
            return response;
        }

        let body = Json(json!({
            "error": {
                "message": self.message,
                "status": self.status.as_u16(),
            }
        }));

        (self.status, body).into_response()
    }
}

impl From<MediaError> for AppError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::NotFound(msg) => Self::not_found(msg),
            MediaError::InvalidInput(msg) => Self::bad_request(msg),
            MediaError::Internal(msg) => Self::internal(msg),
            _ => Self::internal(err.to_string()),
        }
    }
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::NotFound(_) => Self::not_found(err.to_string()),
            EngineError::InvalidState { .. } => Self::conflict(err.to_string()),
            EngineError::Io(_) => {
                tracing::error!(error = %err, "transcode engine I/O failure");
                Self::internal("transcode engine I/O failure")
            }
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingToken | AuthError::InvalidToken => Self::unauthorized(err.to_string()),
        }
    }
}

impl From<PlaybackError> for AppError {
    fn from(err: PlaybackError) -> Self {
        match err {
            PlaybackError::NotFound { .. } => Self::not_found(err.to_string()),
            PlaybackError::TranscodeFailed(msg) => Self::transcode_failed(msg),
            PlaybackError::Catalog(err) => err.into(),
            PlaybackError::Engine(err) => err.into(),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn json_body_shape() {
        let response = AppError::not_found("book not found").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"]["message"], "book not found");
        assert_eq!(body["error"]["status"], 404);
    }

    #[tokio::test]
    async fn unsatisfiable_range_has_content_range_and_no_body() {
        let response = AppError::range_not_satisfiable(1000).into_response();
        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes */1000");

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(bytes.is_empty());
    }

    #[test]
    fn engine_errors_map_to_statuses() {
        let id = uuid::Uuid::new_v4();
        assert_eq!(
            AppError::from(EngineError::NotFound(id)).status,
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::from(EngineError::InvalidState {
                id,
                status: tomecast_core::JobStatus::Running
            })
            .status,
            StatusCode::CONFLICT
        );
    }
}
