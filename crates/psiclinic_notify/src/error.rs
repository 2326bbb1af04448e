// --- File: crates/psiclinic_notify/src/error.rs ---
use psiclinic_common::{external_service_error, ClinicError, HttpStatusCode, ProviderError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("{service} request failed: {source}")]
    RequestError {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{service} returned an error: {message} (Status: {status_code})")]
    ApiError {
        service: &'static str,
        status_code: u16,
        message: String,
    },

    #[error("Failed to parse {service} response: {source}")]
    ParseError {
        service: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Notification channel not configured: {0}")]
    ConfigError(String),
}

impl NotifyError {
    pub fn service(&self) -> &'static str {
        match self {
            NotifyError::RequestError { service, .. }
            | NotifyError::ApiError { service, .. }
            | NotifyError::ParseError { service, .. } => service,
            NotifyError::ConfigError(_) => "notify",
        }
    }
}

impl From<NotifyError> for ProviderError {
    fn from(err: NotifyError) -> Self {
        let provider = err.service().to_string();
        match err {
            NotifyError::RequestError { source, .. } => ProviderError::Transport {
                provider,
                message: source.to_string(),
            },
            NotifyError::ApiError {
                status_code,
                message,
                ..
            } => ProviderError::Api {
                provider,
                status_code,
                message,
            },
            NotifyError::ParseError { source, .. } => ProviderError::Parse {
                provider,
                message: source.to_string(),
            },
            NotifyError::ConfigError(message) => ProviderError::NotConfigured { provider, message },
        }
    }
}

impl From<NotifyError> for ClinicError {
    fn from(err: NotifyError) -> Self {
        match err {
            NotifyError::ConfigError(msg) => ClinicError::ConfigError(msg),
            other => external_service_error(other.service(), other),
        }
    }
}

impl HttpStatusCode for NotifyError {
    fn status_code(&self) -> u16 {
        match self {
            NotifyError::ConfigError(_) => 500,
            _ => 502,
        }
    }
}
