use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use thiserror::Error;

use crate::types::ErrorResponse;

/// Shown to callers of the completion endpoint when the model provider fails.
pub const UPSTREAM_ERROR_MESSAGE: &str = "AIからの応答を取得できませんでした";

#[derive(Debug, Error)]
pub enum AppError {
    /// Bad or empty input. Surfaced immediately, never retried.
    #[error("{0}")]
    Validation(String),

    /// The model provider failed (timeout, rate limit, malformed response).
    #[error("upstream model call failed: {0}")]
    Upstream(String),

    /// The per-identity local store could not be opened.
    #[error("local session storage is unavailable: {0}")]
    StorageUnavailable(String),

    #[error("{0}")]
    Auth(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Message rendered to the client. Internal details stay in the logs.
    fn public_message(&self) -> String {
        match self {
            AppError::Upstream(_) => UPSTREAM_ERROR_MESSAGE.to_string(),
            AppError::StorageUnavailable(_) => "local history storage is unavailable".to_string(),
            AppError::Database(_) | AppError::Internal(_) => "internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: self.public_message(),
        })
    }
}
