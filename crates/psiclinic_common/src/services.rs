// --- File: crates/psiclinic_common/src/services.rs ---
//! Service abstractions for external providers.
//!
//! The reconciliation workflow only talks to these traits. Production adapters
//! live in `psiclinic_mercadopago`, `psiclinic_zoom` and `psiclinic_notify`; tests
//! plug in in-memory fakes.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;

use crate::error::ProviderError;
use crate::models::PaymentStatus;

/// Type alias for a boxed future that returns a Result
pub type BoxFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Payment provider operations.
pub trait PaymentGateway: Send + Sync {
    /// Create a hosted-checkout preference.
    fn create_preference(
        &self,
        request: PreferenceRequest,
    ) -> BoxFuture<'_, PreferenceCreated, ProviderError>;

    /// Create an instant-transfer (PIX) payment.
    fn create_pix_payment(&self, request: PixRequest) -> BoxFuture<'_, PixCreated, ProviderError>;

    /// Fetch the authoritative state of a payment.
    fn get_payment(&self, payment_id: &str) -> BoxFuture<'_, ProviderPayment, ProviderError>;

    /// Refund a payment in full (`amount = None`) or partially.
    fn create_refund(
        &self,
        payment_id: &str,
        amount: Option<Decimal>,
        idempotency_key: &str,
    ) -> BoxFuture<'_, RefundCreated, ProviderError>;
}

/// Video meeting provider operations.
pub trait MeetingService: Send + Sync {
    fn create_meeting(&self, request: MeetingRequest)
        -> BoxFuture<'_, MeetingCreated, ProviderError>;
}

/// Outbound messaging.
pub trait NotificationService: Send + Sync {
    /// Send an HTML email.
    fn send_email(
        &self,
        to: &str,
        subject: &str,
        html: &str,
    ) -> BoxFuture<'_, NotificationResult, ProviderError>;

    /// Send an SMS notification.
    fn send_sms(&self, to: &str, body: &str) -> BoxFuture<'_, NotificationResult, ProviderError>;

    /// Send a WhatsApp message.
    fn send_whatsapp(
        &self,
        to: &str,
        body: &str,
    ) -> BoxFuture<'_, NotificationResult, ProviderError>;
}

/// Who pays. Only `email` is required by the provider.
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PayerInfo {
    #[cfg_attr(feature = "openapi", schema(example = "paciente@example.com"))]
    pub email: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    /// Brazilian taxpayer id, digits only.
    #[serde(default)]
    pub cpf: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreferenceRequest {
    pub external_reference: String,
    pub title: String,
    pub description: Option<String>,
    pub amount: Decimal,
    pub payer: PayerInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreferenceCreated {
    pub preference_id: String,
    pub init_point: String,
    pub sandbox_init_point: Option<String>,
    /// Provider response, passed through to the caller.
    pub raw: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PixRequest {
    pub external_reference: String,
    pub description: String,
    pub amount: Decimal,
    pub payer: PayerInfo,
    pub idempotency_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PixCreated {
    pub payment_id: String,
    pub status: PaymentStatus,
    pub status_detail: Option<String>,
    pub qr_code: Option<String>,
    pub qr_code_base64: Option<String>,
    pub ticket_url: Option<String>,
    pub raw: serde_json::Value,
}

/// A payment as the provider reports it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderPayment {
    pub id: String,
    pub status: PaymentStatus,
    /// Status string exactly as the provider sent it.
    pub raw_status: String,
    pub status_detail: Option<String>,
    pub external_reference: Option<String>,
    pub amount: Decimal,
    pub currency: Option<String>,
    pub payment_method: Option<String>,
    pub payer_email: Option<String>,
    pub raw: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundCreated {
    pub refund_id: String,
    pub status: String,
    pub amount: Decimal,
    pub raw: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeetingRequest {
    pub topic: String,
    pub start: DateTime<Utc>,
    pub duration_minutes: u32,
    pub agenda: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MeetingCreated {
    pub meeting_id: String,
    pub join_url: String,
    pub password: Option<String>,
    /// e.g. "zoom"
    pub platform: String,
}

/// Represents the result of a notification operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationResult {
    /// The provider id of the message.
    pub id: String,
    /// The provider status of the message.
    pub status: String,
}
