use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Authorization error: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Storage limit exceeded: {0}")]
    StorageLimit(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Internal server error: {0}")]
    Internal(String),
}

#[derive(Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Auth(_) | AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::StorageLimit(_) => StatusCode::PAYMENT_REQUIRED,
            AppError::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            AppError::Database(_) => "database_error",
            AppError::Auth(_) => "auth_error",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Forbidden(_) => "forbidden",
            AppError::NotFound(_) => "not_found",
            AppError::BadRequest(_) => "bad_request",
            AppError::Validation(_) => "validation_error",
            AppError::StorageLimit(_) => "storage_limit",
            AppError::RateLimitExceeded => "rate_limit_exceeded",
            AppError::Internal(_) => "internal_error",
        }
    }

    /// Client-safe message. Database errors never leak their detail.
    fn public_message(&self) -> String {
        match self {
            AppError::Database(_) => "A database error occurred".to_string(),
            AppError::RateLimitExceeded => {
                "Too many requests, please try again later".to_string()
            }
            AppError::Auth(msg)
            | AppError::Unauthorized(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::BadRequest(msg)
            | AppError::Validation(msg)
            | AppError::StorageLimit(msg)
            | AppError::Internal(msg) => msg.clone(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            AppError::Database(e) => tracing::error!("Database error: {}", e),
            AppError::Internal(msg) => tracing::error!("Internal error: {}", msg),
            other => tracing::debug!("Request failed: {}", other),
        }

        let body = Json(ErrorResponse {
            error: self.label().to_string(),
            message: self.public_message(),
        });

        (self.status(), body).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
