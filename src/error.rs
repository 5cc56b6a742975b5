//!
//! # Custom Error Handling
//!
//! This module defines `AppError`, the single error type flowing out of the flows,
//! stores and gates. Each variant maps onto one HTTP status through the
//! `actix_web::error::ResponseError` implementation.
//!
//! Internal causes (SQL errors, broker failures, signing failures) and the precise
//! reason a token was rejected are written to the server log only. The JSON body
//! sent to the client never carries them.

use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use serde_json::json;
use std::fmt;
use validator::ValidationErrors;

/// Represents all possible errors that can occur within the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    /// Malformed input such as a non-UUID identifier or a bad email address (HTTP 400).
    Validation { field: String, reason: String },
    /// Missing, invalid, expired or wrong-purpose token, or a failed membership check (HTTP 401).
    /// The reason is logged; the client only ever sees a generic message.
    Unauthorized(String),
    /// Authenticated but not permitted, e.g. a non-owner editing a workspace (HTTP 403).
    Forbidden(String),
    /// Unknown identity, workspace, invitation or membership (HTTP 404).
    NotFound(String),
    /// Uniqueness violation (HTTP 409).
    Conflict(String),
    /// Signing failure, queue publish failure, store unavailability (HTTP 500).
    Internal(String),
}

impl AppError {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        AppError::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AppError::Validation { field, reason } => {
                write!(f, "Validation Error: field '{}': {}", field, reason)
            }
            AppError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            AppError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not Found: {}", msg),
            AppError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            AppError::Internal(msg) => write!(f, "Internal Server Error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            AppError::Validation { field, reason } => json!({
                "error": "validation failed",
                "field": field,
                "reason": reason,
            }),
            AppError::Unauthorized(reason) => {
                log::warn!("request rejected as unauthorized: {}", reason);
                json!({ "error": "unauthorized" })
            }
            AppError::Internal(detail) => {
                log::error!("internal error: {}", detail);
                json!({ "error": "internal server error" })
            }
            AppError::Forbidden(msg) | AppError::NotFound(msg) | AppError::Conflict(msg) => {
                json!({ "error": msg })
            }
        };
        HttpResponse::build(self.status_code()).json(body)
    }
}

/// Converts `sqlx::Error` into `AppError`.
///
/// `RowNotFound` becomes `NotFound` and unique-constraint violations become `Conflict`.
/// Everything else is an internal error whose text stays in the server log.
impl From<sqlx::Error> for AppError {
    fn from(error: sqlx::Error) -> AppError {
        match &error {
            sqlx::Error::RowNotFound => AppError::NotFound("Record not found".into()),
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                AppError::Conflict("Record already exists".into())
            }
            _ => AppError::Internal(format!("database: {}", error)),
        }
    }
}

/// Converts `validator::ValidationErrors` into a single `AppError::Validation`
/// naming the first offending field.
impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> AppError {
        let first = errors
            .field_errors()
            .into_iter()
            .min_by_key(|(field, _)| *field)
            .map(|(field, errs)| {
                let reason = errs
                    .first()
                    .map(|e| {
                        e.message
                            .as_ref()
                            .map(|m| m.to_string())
                            .unwrap_or_else(|| e.code.to_string())
                    })
                    .unwrap_or_else(|| "invalid".to_string());
                (field.to_string(), reason)
            });

        match first {
            Some((field, reason)) => AppError::Validation { field, reason },
            None => AppError::validation("request", errors.to_string()),
        }
    }
}
