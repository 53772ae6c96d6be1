//! Typed errors and HTTP mapping.

use crate::response::Envelope;
use crate::service::ValidationResult;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value;
use thiserror::Error;

/// Bootstrap-time failures of the resource registry.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("resource with name {0} already exists")]
    AlreadyRegistered(String),
    #[error("resource with name {0} not found")]
    NotFound(String),
    #[error("field {field} not found in resource {resource}")]
    FieldNotFound { resource: String, field: String },
    #[error("route {path} of {resource} collides with resource {existing}")]
    RouteConflict {
        resource: String,
        existing: String,
        path: String,
    },
    #[error("invalid model {resource}: {reason}")]
    InvalidModel { resource: String, reason: String },
    #[error("migration of {resource} failed: {source}")]
    Migration {
        resource: String,
        #[source]
        source: Box<AppError>,
    },
}

/// Per-request failures. Every variant renders as the response envelope with
/// `success: false`; the status code carries the category.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("method not allowed")]
    MethodNotAllowed,
    #[error("authentication required")]
    Unauthorized,
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("validation failed")]
    Validation(ValidationResult),
    #[error("{0}")]
    BadRequest(String),
    #[error("internal: {0}")]
    Internal(String),
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Db(sqlx::Error::RowNotFound) => StatusCode::NOT_FOUND,
            AppError::Internal(_) | AppError::Db(_) | AppError::Serialization(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Machine-readable category, logged alongside failures.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::MethodNotAllowed => "method_not_allowed",
            AppError::Unauthorized => "unauthorized",
            AppError::Forbidden(_) => "forbidden",
            AppError::NotFound(_) => "not_found",
            AppError::Validation(_) => "validation_failed",
            AppError::BadRequest(_) => "bad_request",
            AppError::Db(sqlx::Error::RowNotFound) => "not_found",
            AppError::Internal(_) | AppError::Db(_) | AppError::Serialization(_) => "internal_error",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (message, data) = match self {
            AppError::Validation(result) => (
                "Validation failed".to_string(),
                serde_json::to_value(result).unwrap_or(Value::Null),
            ),
            AppError::Db(sqlx::Error::RowNotFound) => ("Instance not found".to_string(), Value::Null),
            err @ (AppError::Internal(_) | AppError::Db(_) | AppError::Serialization(_)) => {
                tracing::error!(error = %err, code = err.code(), "request failed");
                ("Internal server error".to_string(), Value::Null)
            }
            other => (other.to_string(), Value::Null),
        };
        (status, Json(Envelope::failure(message, data))).into_response()
    }
}
