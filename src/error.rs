use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// A single rule a candidate marker failed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Type must be one of: tree, cleanup, school")]
    InvalidType,

    #[error("Description is required and must be a non-empty string")]
    MissingDescription,

    #[error("Latitude must be a number between -90 and 90")]
    InvalidLatitude,

    #[error("Longitude must be a number between -180 and 180")]
    InvalidLongitude,

    #[error("User is required and must be a non-empty string")]
    MissingUser,
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Validation failed: {}", join_violations(.0))]
    Validation(Vec<ValidationError>),

    #[error("Marker not found")]
    NotFound,

    #[error("Failed to {action} marker: {source}")]
    Storage {
        action: &'static str,
        #[source]
        source: StorageError,
    },
}

fn join_violations(violations: &[ValidationError]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        match self {
            ServiceError::Validation(violations) => {
                let details: Vec<String> = violations.iter().map(ToString::to_string).collect();
                (
                    StatusCode::BAD_REQUEST,
                    Json(json!({ "error": "Validation failed", "details": details })),
                )
                    .into_response()
            }
            ServiceError::NotFound => (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": "Marker not found" })),
            )
                .into_response(),
            ServiceError::Storage { action, source } => {
                tracing::error!("Failed to {} marker: {}", action, source);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": format!("Failed to {} marker", action) })),
                )
                    .into_response()
            }
        }
    }
}
