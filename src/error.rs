use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::db::models::BookingStatus;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Webhook signature invalid: {0}")]
    SignatureInvalid(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Payment not found: {0}")]
    PaymentNotFound(String),

    #[error("Unhandled webhook event type: {0}")]
    UnknownEventType(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid booking transition from {from} to {to}")]
    InvalidTransition { from: BookingStatus, to: BookingStatus },

    #[error("Integration error: {0}")]
    Integration(String),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    code: String,
    message: String,
}

impl AppError {
    /// Errors that signal "already handled" or "not ours" rather than a fault.
    /// Webhook senders receive a 2xx for these so they do not retry.
    pub fn is_benign(&self) -> bool {
        matches!(
            self,
            AppError::PaymentNotFound(_) | AppError::UnknownEventType(_)
        )
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", self.to_string()),
            AppError::SignatureInvalid(msg) => {
                tracing::warn!("Rejected webhook with invalid signature: {}", msg);
                (StatusCode::BAD_REQUEST, "SIGNATURE_INVALID", msg.clone())
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::PaymentNotFound(msg) => (StatusCode::ACCEPTED, "PAYMENT_NOT_FOUND", msg.clone()),
            AppError::UnknownEventType(msg) => {
                (StatusCode::ACCEPTED, "UNHANDLED_EVENT_TYPE", msg.clone())
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, "INVALID_INPUT", msg.clone()),
            AppError::Validation(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "VALIDATION_ERROR",
                msg.clone(),
            ),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
            AppError::InvalidTransition { .. } => (
                StatusCode::CONFLICT,
                "INVALID_TRANSITION",
                self.to_string(),
            ),
            AppError::Integration(msg) => {
                tracing::error!("Integration error: {}", msg);
                (StatusCode::BAD_GATEWAY, "INTEGRATION_ERROR", msg.clone())
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "A database error occurred".to_string(),
                )
            }
            AppError::Request(e) => {
                tracing::error!("HTTP request error: {:?}", e);
                (
                    StatusCode::BAD_GATEWAY,
                    "EXTERNAL_REQUEST_FAILED",
                    "Failed to communicate with external service".to_string(),
                )
            }
            AppError::Config(msg) => {
                tracing::error!("Configuration error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "CONFIG_ERROR",
                    "Server configuration error".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message,
            },
        };

        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn benign_errors_are_acknowledged() {
        let resp = AppError::PaymentNotFound("pi_1".to_string()).into_response();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);

        let resp = AppError::UnknownEventType("charge.refunded".to_string()).into_response();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
    }

    #[test]
    fn invalid_transition_is_conflict() {
        let err = AppError::InvalidTransition {
            from: BookingStatus::Rejected,
            to: BookingStatus::Accepted,
        };
        assert!(!err.is_benign());
        assert_eq!(err.to_string(), "Invalid booking transition from rejected to accepted");
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
    }
}
