// --- File: crates/psiclinic_zoom/src/error.rs ---
use psiclinic_common::{external_service_error, ClinicError, HttpStatusCode, ProviderError};
use thiserror::Error;

pub const PROVIDER: &str = "zoom";

#[derive(Error, Debug)]
pub enum ZoomError {
    #[error("Zoom API request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("Zoom API returned an error: {message} (Status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Failed to parse Zoom API response: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Zoom OAuth token request failed: {0}")]
    AuthError(String),

    #[error("Zoom configuration missing or incomplete: {0}")]
    ConfigError(String),
}

impl From<ZoomError> for ProviderError {
    fn from(err: ZoomError) -> Self {
        let provider = PROVIDER.to_string();
        match err {
            ZoomError::RequestError(e) => ProviderError::Transport {
                provider,
                message: e.to_string(),
            },
            ZoomError::ApiError {
                status_code,
                message,
            } => ProviderError::Api {
                provider,
                status_code,
                message,
            },
            ZoomError::ParseError(e) => ProviderError::Parse {
                provider,
                message: e.to_string(),
            },
            ZoomError::AuthError(message) => ProviderError::Api {
                provider,
                status_code: 401,
                message,
            },
            ZoomError::ConfigError(message) => ProviderError::NotConfigured { provider, message },
        }
    }
}

impl From<ZoomError> for ClinicError {
    fn from(err: ZoomError) -> Self {
        match err {
            ZoomError::ConfigError(msg) => ClinicError::ConfigError(msg),
            other => external_service_error("Zoom", other),
        }
    }
}

impl HttpStatusCode for ZoomError {
    fn status_code(&self) -> u16 {
        match self {
            ZoomError::ConfigError(_) => 500,
            _ => 502,
        }
    }
}
