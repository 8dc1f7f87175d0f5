//! Error types shared by the broker adapter, the poller and the dashboard API.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

pub type Result<T, E = ViewerError> = std::result::Result<T, E>;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ViewerError {
    #[error("Topic '{0}' not found")]
    TopicNotFound(String),

    #[error("Topic '{0}' is not consumed by this viewer")]
    TopicNotTracked(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Failed to connect to broker: {0}")]
    Connection(String),

    #[error("Broker error: {0}")]
    Broker(String),

    #[error("Failed to disconnect from broker: {0}")]
    Disconnect(String),
}

impl ViewerError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ViewerError::TopicNotFound(_) | ViewerError::TopicNotTracked(_) => StatusCode::NOT_FOUND,
            ViewerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short headline shown by the UI above `details`.
    pub fn summary(&self) -> &'static str {
        match self {
            ViewerError::TopicNotFound(_) | ViewerError::TopicNotTracked(_) => "Topic not available",
            ViewerError::InvalidRequest(_) => "Invalid request",
            _ => "Failed to fetch Kafka messages",
        }
    }
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub details: String,
}

impl IntoResponse for ViewerError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.summary().to_string(),
            details: self.to_string(),
        };
        (self.status_code(), axum::Json(body)).into_response()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config error: {0} is required")]
    Missing(&'static str),

    #[error("Config error: {key} must be valid (got '{value}')")]
    Invalid { key: &'static str, value: String },
}
