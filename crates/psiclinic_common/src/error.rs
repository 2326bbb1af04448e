// --- File: crates/psiclinic_common/src/error.rs ---
use std::fmt;
use thiserror::Error;

/// The base error type for the clinic backend.
///
/// Each crate keeps its own error enum and implements `From<CrateError> for ClinicError`,
/// so handlers can turn any failure into the shared JSON error body.
#[derive(Error, Debug)]
pub enum ClinicError {
    /// Error occurred during an HTTP request
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    /// Error occurred while parsing data
    #[error("Failed to parse data: {0}")]
    ParseError(String),

    /// Error occurred due to missing or invalid configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Error occurred during authentication or authorization
    #[error("Authentication error: {0}")]
    AuthError(String),

    /// Error occurred during validation
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Error occurred while reading or writing the clinic store
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Error occurred during external service call
    #[error("External service error: {service_name} - {message}")]
    ExternalServiceError {
        service_name: String,
        message: String,
    },

    /// Error occurred due to a conflict (e.g., resource already exists)
    #[error("Conflict: {0}")]
    ConflictError(String),

    /// Error occurred due to a resource not being found
    #[error("Not found: {0}")]
    NotFoundError(String),

    /// Error occurred due to a timeout
    #[error("Timeout: {0}")]
    TimeoutError(String),

    /// Error occurred due to an internal error
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// A trait for converting errors to HTTP status codes.
pub trait HttpStatusCode {
    /// Returns the HTTP status code for this error.
    fn status_code(&self) -> u16;
}

impl HttpStatusCode for ClinicError {
    fn status_code(&self) -> u16 {
        match self {
            ClinicError::HttpError(_) => 500,
            ClinicError::ParseError(_) => 400,
            ClinicError::ConfigError(_) => 500,
            ClinicError::AuthError(_) => 401,
            ClinicError::ValidationError(_) => 400,
            ClinicError::DatabaseError(_) => 500,
            ClinicError::ExternalServiceError { .. } => 502,
            ClinicError::ConflictError(_) => 409,
            ClinicError::NotFoundError(_) => 404,
            ClinicError::TimeoutError(_) => 504,
            ClinicError::InternalError(_) => 500,
        }
    }
}

/// Failure reported by an outbound provider adapter (payments, meetings, messaging).
///
/// Adapters convert their own error enums into this type so the workflow can hold
/// them behind `dyn` traits.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("{provider} request failed: {message}")]
    Transport { provider: String, message: String },

    #[error("{provider} returned HTTP {status_code}: {message}")]
    Api {
        provider: String,
        status_code: u16,
        message: String,
    },

    #[error("{provider} response could not be parsed: {message}")]
    Parse { provider: String, message: String },

    #[error("{provider} is not configured: {message}")]
    NotConfigured { provider: String, message: String },
}

impl ProviderError {
    pub fn provider(&self) -> &str {
        match self {
            ProviderError::Transport { provider, .. }
            | ProviderError::Api { provider, .. }
            | ProviderError::Parse { provider, .. }
            | ProviderError::NotConfigured { provider, .. } => provider,
        }
    }

    pub fn not_configured(provider: &str, message: impl fmt::Display) -> Self {
        ProviderError::NotConfigured {
            provider: provider.to_string(),
            message: message.to_string(),
        }
    }
}

impl HttpStatusCode for ProviderError {
    fn status_code(&self) -> u16 {
        match self {
            ProviderError::NotConfigured { .. } => 500,
            _ => 502,
        }
    }
}

impl From<ProviderError> for ClinicError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::NotConfigured { .. } => ClinicError::ConfigError(err.to_string()),
            other => ClinicError::ExternalServiceError {
                service_name: other.provider().to_string(),
                message: other.to_string(),
            },
        }
    }
}

// Common error conversions
impl From<reqwest::Error> for ClinicError {
    fn from(err: reqwest::Error) -> Self {
        ClinicError::HttpError(err.to_string())
    }
}

impl From<serde_json::Error> for ClinicError {
    fn from(err: serde_json::Error) -> Self {
        ClinicError::ParseError(err.to_string())
    }
}

impl From<std::io::Error> for ClinicError {
    fn from(err: std::io::Error) -> Self {
        ClinicError::InternalError(err.to_string())
    }
}

pub fn external_service_error<T: fmt::Display>(service_name: &str, message: T) -> ClinicError {
    ClinicError::ExternalServiceError {
        service_name: service_name.to_string(),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_errors_map_to_bad_gateway() {
        let err = ProviderError::Api {
            provider: "mercadopago".into(),
            status_code: 400,
            message: "invalid payer".into(),
        };
        assert_eq!(err.status_code(), 502);
        let clinic: ClinicError = err.into();
        assert_eq!(clinic.status_code(), 502);
        assert!(clinic.to_string().contains("mercadopago"));
    }

    #[test]
    fn unconfigured_provider_is_server_error() {
        let clinic: ClinicError = ProviderError::not_configured("twilio", "missing sender").into();
        assert_eq!(clinic.status_code(), 500);
    }
}
