// --- File: crates/psiclinic_mercadopago/src/error.rs ---
use psiclinic_common::{external_service_error, ClinicError, HttpStatusCode, ProviderError};
use thiserror::Error;

pub const PROVIDER: &str = "mercadopago";

/// Mercado Pago specific error types.
#[derive(Error, Debug)]
pub enum MercadoPagoError {
    /// Transport failure talking to the API
    #[error("Mercado Pago API request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    /// Non-2xx answer from the API
    #[error("Mercado Pago API returned an error: {message} (Status: {status_code})")]
    ApiError { status_code: u16, message: String },

    /// Error parsing an API response
    #[error("Failed to parse Mercado Pago API response: {0}")]
    ParseError(#[from] serde_json::Error),

    /// Missing or incomplete configuration
    #[error("Mercado Pago configuration missing or incomplete: {0}")]
    ConfigError(String),

    /// Webhook signature verification failed
    #[error("Mercado Pago webhook signature verification failed: {0}")]
    WebhookSignatureError(String),
}

impl From<MercadoPagoError> for ClinicError {
    fn from(err: MercadoPagoError) -> Self {
        match err {
            MercadoPagoError::RequestError(e) => {
                external_service_error("Mercado Pago", format!("request error: {}", e))
            }
            MercadoPagoError::ApiError {
                status_code,
                message,
            } => external_service_error(
                "Mercado Pago",
                format!("Status: {}, Message: {}", status_code, message),
            ),
            MercadoPagoError::ParseError(e) => {
                external_service_error("Mercado Pago", format!("response parse error: {}", e))
            }
            MercadoPagoError::ConfigError(msg) => ClinicError::ConfigError(msg),
            MercadoPagoError::WebhookSignatureError(msg) => {
                ClinicError::AuthError(format!("Mercado Pago webhook signature error: {}", msg))
            }
        }
    }
}

impl From<MercadoPagoError> for ProviderError {
    fn from(err: MercadoPagoError) -> Self {
        let provider = PROVIDER.to_string();
        match err {
            MercadoPagoError::RequestError(e) => ProviderError::Transport {
                provider,
                message: e.to_string(),
            },
            MercadoPagoError::ApiError {
                status_code,
                message,
            } => ProviderError::Api {
                provider,
                status_code,
                message,
            },
            MercadoPagoError::ParseError(e) => ProviderError::Parse {
                provider,
                message: e.to_string(),
            },
            MercadoPagoError::ConfigError(message) => {
                ProviderError::NotConfigured { provider, message }
            }
            MercadoPagoError::WebhookSignatureError(message) => ProviderError::Api {
                provider,
                status_code: 401,
                message,
            },
        }
    }
}

impl HttpStatusCode for MercadoPagoError {
    fn status_code(&self) -> u16 {
        match self {
            MercadoPagoError::RequestError(_) => 502,
            MercadoPagoError::ApiError { .. } => 502,
            MercadoPagoError::ParseError(_) => 502,
            MercadoPagoError::ConfigError(_) => 500,
            MercadoPagoError::WebhookSignatureError(_) => 401,
        }
    }
}
