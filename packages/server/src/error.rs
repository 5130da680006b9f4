use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use common::storage::StorageError;
use sea_orm::DbErr;
use serde::Serialize;

use crate::clients::engine::EngineError;
use crate::clients::paypal::PayPalError;

/// Structured error response returned by all endpoints on failure.
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorBody {
    /// Always `false`.
    pub success: bool,
    /// Machine-readable error code. One of: `VALIDATION_ERROR`, `UNAUTHORIZED`,
    /// `SESSION_EXPIRED`, `CSRF_MISMATCH`, `INVALID_CREDENTIALS`, `EMAIL_NOT_VERIFIED`,
    /// `NOT_FOUND`, `CONFLICT`, `EMAIL_TAKEN`, `INSUFFICIENT_CREDITS`, `UPSTREAM_ERROR`,
    /// `INTERNAL_ERROR`.
    #[schema(example = "VALIDATION_ERROR")]
    pub code: &'static str,
    /// Human-readable error description.
    #[schema(example = "run_id must be a positive integer")]
    pub error: String,
    /// Set on session failures to tell the client to drop its session.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub logout: bool,
}

/// Application-level error type.
#[derive(Debug)]
pub enum AppError {
    Validation(String),
    /// No session, or a callback without a valid bearer token.
    Unauthorized,
    SessionExpired,
    CsrfMismatch,
    InvalidCredentials,
    EmailNotVerified,
    NotFound(String),
    Conflict(String),
    EmailTaken,
    InsufficientCredits {
        balance: i64,
        required: i64,
    },
    /// The workflow engine or PayPal failed. The detail is logged, not returned.
    Upstream(String),
    Internal(String),
}

impl AppError {
    fn status_and_body(self) -> (StatusCode, ErrorBody) {
        let (status, code, error, logout) = match self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg, false),
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "Authentication required".into(),
                true,
            ),
            AppError::SessionExpired => (
                StatusCode::UNAUTHORIZED,
                "SESSION_EXPIRED",
                "Session expired, please log in again".into(),
                true,
            ),
            AppError::CsrfMismatch => (
                StatusCode::FORBIDDEN,
                "CSRF_MISMATCH",
                "Invalid CSRF token".into(),
                false,
            ),
            AppError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                "INVALID_CREDENTIALS",
                "Invalid email or password".into(),
                false,
            ),
            AppError::EmailNotVerified => (
                StatusCode::FORBIDDEN,
                "EMAIL_NOT_VERIFIED",
                "Please confirm your email address first".into(),
                false,
            ),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg, false),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg, false),
            AppError::EmailTaken => (
                StatusCode::CONFLICT,
                "EMAIL_TAKEN",
                "An account with this email already exists".into(),
                false,
            ),
            AppError::InsufficientCredits { balance, required } => (
                StatusCode::PAYMENT_REQUIRED,
                "INSUFFICIENT_CREDITS",
                format!("Not enough credits: {required} required, {balance} available"),
                false,
            ),
            AppError::Upstream(detail) => {
                tracing::error!("Upstream error: {}", detail);
                (
                    StatusCode::BAD_GATEWAY,
                    "UPSTREAM_ERROR",
                    "An external service is currently unavailable".into(),
                    false,
                )
            }
            AppError::Internal(detail) => {
                tracing::error!("Internal error: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An unexpected error occurred".into(),
                    false,
                )
            }
        };

        (
            status,
            ErrorBody {
                success: false,
                code,
                error,
                logout,
            },
        )
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = self.status_and_body();
        (status, Json(body)).into_response()
    }
}

impl From<DbErr> for AppError {
    fn from(err: DbErr) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::SizeLimitExceeded { limit, .. } => {
                AppError::Validation(format!("Image exceeds the maximum size of {limit} bytes"))
            }
            StorageError::NotFound(key) => AppError::NotFound(format!("Image '{key}' not found")),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        AppError::Upstream(err.to_string())
    }
}

impl From<PayPalError> for AppError {
    fn from(err: PayPalError) -> Self {
        AppError::Upstream(err.to_string())
    }
}
