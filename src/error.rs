//! Error handling module
//!
//! Centralized error types and HTTP response conversion.

use std::collections::BTreeMap;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::domain::TransferError;
use crate::store::StoreError;
use crate::validation::ValidationErrors;

/// Application-wide Result type
pub type AppResult<T> = Result<T, AppError>;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Client errors (4xx)
    #[error("Unauthenticated")]
    Unauthenticated,

    #[error("The given data was invalid")]
    Validation(ValidationErrors),

    #[error("Not found: {0}")]
    NotFound(String),

    // Domain errors
    #[error(transparent)]
    Transfer(#[from] TransferError),

    // Server errors (5xx)
    #[error("Storage contention, retry the request")]
    Contention,

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InsufficientFunds {
                required,
                available,
                ..
            } => AppError::Transfer(TransferError::insufficient_funds(required, available)),
            err if err.is_retryable() => AppError::Contention,
            err => AppError::Store(err),
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::from(err).into()
    }
}

impl AppError {
    /// Domain error carried by this error, if any
    pub fn transfer_error(&self) -> Option<&TransferError> {
        match self {
            AppError::Transfer(err) => Some(err),
            _ => None,
        }
    }

    /// Whether the caller may retry the same request unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Contention)
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<BTreeMap<String, FieldError>>,
}

/// One entry of a validation error payload
#[derive(Debug, Serialize)]
pub struct FieldError {
    pub code: String,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, details) = match &self {
            // 401 Unauthorized
            AppError::Unauthenticated => (StatusCode::UNAUTHORIZED, "unauthenticated", None),

            // 422 Unprocessable Entity
            AppError::Validation(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "validation_failed", None)
            }

            // 404 Not Found
            AppError::NotFound(what) => (StatusCode::NOT_FOUND, "not_found", Some(what.clone())),

            // Domain errors - map to appropriate HTTP status
            AppError::Transfer(err) => {
                let status = match err {
                    TransferError::Forbidden => StatusCode::FORBIDDEN,
                    TransferError::InsufficientFunds { .. } => StatusCode::CONFLICT,
                    TransferError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
                    TransferError::InvalidRecipient
                    | TransferError::InvalidAmount(_)
                    | TransferError::SelfTransfer
                    | TransferError::OutboundLimitExceeded { .. }
                    | TransferError::InboundLimitExceeded { .. } => {
                        StatusCode::UNPROCESSABLE_ENTITY
                    }
                };
                (status, err.code(), None)
            }

            // 503 Service Unavailable
            AppError::Contention => {
                tracing::warn!("Transfer gave up after repeated lock contention");
                (StatusCode::SERVICE_UNAVAILABLE, "contention", None)
            }

            // 500 Internal Server Error
            AppError::Store(e) => {
                tracing::error!("Store error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
            }
        };

        let errors = match &self {
            AppError::Validation(fields) => Some(
                fields
                    .iter()
                    .map(|(field, err)| {
                        (
                            field.to_string(),
                            FieldError {
                                code: err.code().to_string(),
                                message: err.to_string(),
                            },
                        )
                    })
                    .collect(),
            ),
            _ => None,
        };

        let body = ErrorResponse {
            error: self.to_string(),
            error_code: error_code.to_string(),
            details,
            errors,
        };

        let mut response = (status, Json(body)).into_response();
        if status == StatusCode::SERVICE_UNAVAILABLE {
            response
                .headers_mut()
                .insert(axum::http::header::RETRY_AFTER, axum::http::HeaderValue::from_static("1"));
        }
        response
    }
}
