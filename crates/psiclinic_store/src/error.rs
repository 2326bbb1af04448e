//! Error types for the clinic store

use psiclinic_common::{ClinicError, HttpStatusCode};
use thiserror::Error;

/// Errors that can occur when reading or writing clinic data
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("Store API error (status {status_code}): {message}")]
    ApiError { status_code: u16, message: String },

    #[error("Failed to parse store response: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Unique constraint hit, or a concurrent writer got there first.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Reservation token does not match for credit {0}")]
    TokenMismatch(String),

    /// The row exists but is not in a state that allows the write.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Store configuration error: {0}")]
    ConfigError(String),
}

impl HttpStatusCode for StoreError {
    fn status_code(&self) -> u16 {
        match self {
            StoreError::NotFound(_) => 404,
            StoreError::Conflict(_) | StoreError::TokenMismatch(_) | StoreError::InvalidState(_) => {
                409
            }
            _ => 500,
        }
    }
}

impl From<StoreError> for ClinicError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(msg) => ClinicError::NotFoundError(msg),
            StoreError::Conflict(_) | StoreError::TokenMismatch(_) | StoreError::InvalidState(_) => {
                ClinicError::ConflictError(err.to_string())
            }
            StoreError::ConfigError(msg) => ClinicError::ConfigError(msg),
            other => ClinicError::DatabaseError(other.to_string()),
        }
    }
}
