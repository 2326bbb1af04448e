// --- File: crates/psiclinic_mercadopago/src/client.rs ---
//! Thin async client for the Mercado Pago REST API.

use chrono::{Duration, Utc};
use psiclinic_common::services::{
    PayerInfo, PixCreated, PixRequest, PreferenceCreated, PreferenceRequest, ProviderPayment,
    RefundCreated,
};
use psiclinic_common::HTTP_CLIENT;
use psiclinic_config::MercadoPagoConfig;
use reqwest::{Client, RequestBuilder};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{error, info};

use crate::error::MercadoPagoError;
use crate::models::{
    ApiErrorBody, BackUrls, Identification, PaymentPayerBody, PaymentResponse, PixPaymentBody,
    PreferenceBody, PreferenceItem, PreferencePayer, PreferenceResponse, RefundBody,
    RefundResponse,
};
use crate::status::map_status;

const IDEMPOTENCY_HEADER: &str = "X-Idempotency-Key";
const EXPIRATION_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f%:z";

#[derive(Clone)]
pub struct MercadoPagoClient {
    config: MercadoPagoConfig,
    client: Client,
}

impl MercadoPagoClient {
    pub fn new(config: MercadoPagoConfig) -> Result<Self, MercadoPagoError> {
        Self::with_client(config, HTTP_CLIENT.clone())
    }

    pub fn with_client(config: MercadoPagoConfig, client: Client) -> Result<Self, MercadoPagoError> {
        if config.access_token.trim().is_empty() {
            return Err(MercadoPagoError::ConfigError(
                "mercadopago.access_token is empty".to_string(),
            ));
        }
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &MercadoPagoConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base_url.trim_end_matches('/'), path)
    }

    /// Sends the request and returns the parsed body plus the raw JSON.
    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        what: &str,
    ) -> Result<(T, Value), MercadoPagoError> {
        let response = request
            .bearer_auth(&self.config.access_token)
            .send()
            .await?;
        let status = response.status();
        let body_text = response.text().await?;

        if !status.is_success() {
            error!(
                "[Mercado Pago] {} failed. Status: {}, Body: {}",
                what, status, body_text
            );
            return Err(MercadoPagoError::ApiError {
                status_code: status.as_u16(),
                message: error_message(&body_text),
            });
        }

        let raw: Value = serde_json::from_str(&body_text)?;
        let parsed = serde_json::from_value(raw.clone())?;
        Ok((parsed, raw))
    }

    /// POST /checkout/preferences
    pub async fn create_preference(
        &self,
        request: &PreferenceRequest,
    ) -> Result<PreferenceCreated, MercadoPagoError> {
        let body = PreferenceBody {
            items: vec![PreferenceItem {
                id: request.external_reference.clone(),
                title: request.title.clone(),
                description: request.description.clone(),
                quantity: 1,
                currency_id: self.config.currency.clone(),
                unit_price: request.amount,
            }],
            payer: PreferencePayer {
                email: request.payer.email.clone(),
                name: request.payer.first_name.clone(),
                surname: request.payer.last_name.clone(),
                identification: identification(&request.payer),
            },
            external_reference: request.external_reference.clone(),
            notification_url: self.config.notification_url.clone(),
            back_urls: BackUrls {
                success: self.config.success_url.clone(),
                failure: self.config.failure_url.clone(),
                pending: self.config.pending_url.clone(),
            },
            auto_return: "approved".to_string(),
            statement_descriptor: self.config.statement_descriptor.clone(),
        };

        let (created, raw): (PreferenceResponse, Value) = self
            .send(
                self.client.post(self.url("/checkout/preferences")).json(&body),
                "create preference",
            )
            .await?;
        info!(
            "[Mercado Pago] Preference {} created for reference {}",
            created.id, request.external_reference
        );
        Ok(PreferenceCreated {
            preference_id: created.id,
            init_point: created.init_point,
            sandbox_init_point: created.sandbox_init_point,
            raw,
        })
    }

    /// POST /v1/payments with `payment_method_id = "pix"`.
    pub async fn create_pix_payment(
        &self,
        request: &PixRequest,
    ) -> Result<PixCreated, MercadoPagoError> {
        let expires_at = Utc::now() + Duration::minutes(self.config.pix_expiration_minutes);
        let body = PixPaymentBody {
            transaction_amount: request.amount,
            description: request.description.clone(),
            payment_method_id: "pix".to_string(),
            external_reference: request.external_reference.clone(),
            notification_url: self.config.notification_url.clone(),
            date_of_expiration: expires_at.format(EXPIRATION_FORMAT).to_string(),
            payer: PaymentPayerBody {
                email: request.payer.email.clone(),
                first_name: request.payer.first_name.clone(),
                last_name: request.payer.last_name.clone(),
                identification: identification(&request.payer),
            },
        };

        let (payment, raw): (PaymentResponse, Value) = self
            .send(
                self.client
                    .post(self.url("/v1/payments"))
                    .header(IDEMPOTENCY_HEADER, &request.idempotency_key)
                    .json(&body),
                "create PIX payment",
            )
            .await?;
        info!(
            "[Mercado Pago] PIX payment {} created for reference {} (status {})",
            payment.id, request.external_reference, payment.status
        );

        let transaction = payment
            .point_of_interaction
            .and_then(|p| p.transaction_data)
            .unwrap_or_default();
        Ok(PixCreated {
            status: map_status(&payment.status),
            payment_id: payment.id,
            status_detail: payment.status_detail,
            qr_code: transaction.qr_code,
            qr_code_base64: transaction.qr_code_base64,
            ticket_url: transaction.ticket_url,
            raw,
        })
    }

    /// GET /v1/payments/{id}
    pub async fn get_payment(&self, payment_id: &str) -> Result<ProviderPayment, MercadoPagoError> {
        let (payment, raw): (PaymentResponse, Value) = self
            .send(
                self.client.get(self.url(&format!("/v1/payments/{}", payment_id))),
                "get payment",
            )
            .await?;
        Ok(ProviderPayment {
            status: map_status(&payment.status),
            raw_status: payment.status,
            id: payment.id,
            status_detail: payment.status_detail,
            external_reference: payment.external_reference.filter(|r| !r.is_empty()),
            amount: payment.transaction_amount.unwrap_or(Decimal::ZERO),
            currency: payment.currency_id,
            payment_method: payment.payment_method_id,
            payer_email: payment.payer.and_then(|p| p.email),
            raw,
        })
    }

    /// POST /v1/payments/{id}/refunds. `amount = None` refunds in full.
    pub async fn create_refund(
        &self,
        payment_id: &str,
        amount: Option<Decimal>,
        idempotency_key: &str,
    ) -> Result<RefundCreated, MercadoPagoError> {
        let (refund, raw): (RefundResponse, Value) = self
            .send(
                self.client
                    .post(self.url(&format!("/v1/payments/{}/refunds", payment_id)))
                    .header(IDEMPOTENCY_HEADER, idempotency_key)
                    .json(&RefundBody { amount }),
                "create refund",
            )
            .await?;
        info!(
            "[Mercado Pago] Refund {} created for payment {}",
            refund.id, payment_id
        );
        Ok(RefundCreated {
            refund_id: refund.id,
            status: refund.status.unwrap_or_else(|| "approved".to_string()),
            amount: refund.amount.or(amount).unwrap_or(Decimal::ZERO),
            raw,
        })
    }
}

fn identification(payer: &PayerInfo) -> Option<Identification> {
    payer
        .cpf
        .as_ref()
        .map(|cpf| cpf.chars().filter(char::is_ascii_digit).collect::<String>())
        .filter(|digits| !digits.is_empty())
        .map(|number| Identification {
            kind: "CPF".to_string(),
            number,
        })
}

/// Picks the most useful message out of an API error body.
fn error_message(body: &str) -> String {
    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(parsed) => parsed
            .cause
            .iter()
            .find_map(|c| c.description.clone())
            .or(parsed.message)
            .or(parsed.error)
            .unwrap_or_else(|| body.to_string()),
        Err(_) => body.to_string(),
    }
}
