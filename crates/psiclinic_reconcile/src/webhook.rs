//! Mercado Pago payment notifications.
//!
//! The notification only carries an id; the payment itself is always re-fetched
//! from the provider. Every accepted invocation writes exactly one `mp_webhook`
//! audit row, whatever happens in between.

use psiclinic_common::PaymentStatus;
use psiclinic_mercadopago::verify_webhook_signature;
use psiclinic_store::AuditEntry;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::confirm::ConfirmOutcome;
use crate::error::ReconcileError;
use crate::reconcile::reconcile_payment;
use crate::state::ReconcileState;

pub const AUDIT_ACTION: &str = "mp_webhook";
const PAYMENT_TOPIC: &str = "payment";

/// Query string variants used by the provider (`?data.id=..&type=payment` or
/// the older `?id=..&topic=payment`).
#[cfg_attr(feature = "openapi", derive(utoipa::IntoParams))]
#[cfg_attr(feature = "openapi", into_params(parameter_in = Query))]
#[derive(Deserialize, Serialize, Debug, Default, Clone)]
pub struct WebhookQuery {
    #[serde(rename = "data.id")]
    pub data_id: Option<String>,
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub topic: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct WebhookRequest {
    pub body: Value,
    pub query: WebhookQuery,
    /// `x-signature` header
    pub signature: Option<String>,
    /// `x-request-id` header
    pub request_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WebhookOutcome {
    Ignored {
        topic: String,
    },
    Processed {
        provider_payment_id: String,
        status: PaymentStatus,
        matched: bool,
        confirmation: Option<ConfirmOutcome>,
        write_errors: usize,
    },
}

fn id_value(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl WebhookRequest {
    /// Payment id from `data.id` / `id` in the body, then in the query.
    pub fn payment_id(&self) -> Option<String> {
        id_value(self.body.get("data").and_then(|d| d.get("id")))
            .or_else(|| id_value(self.body.get("id")))
            .or_else(|| self.query.data_id.clone().filter(|s| !s.is_empty()))
            .or_else(|| self.query.id.clone().filter(|s| !s.is_empty()))
    }

    pub fn topic(&self) -> Option<String> {
        ["type", "topic"]
            .iter()
            .find_map(|key| self.body.get(*key).and_then(Value::as_str))
            .map(str::to_string)
            .or_else(|| self.query.kind.clone())
            .or_else(|| self.query.topic.clone())
    }
}

async fn audit(
    state: &ReconcileState,
    request: &WebhookRequest,
    payment_id: Option<&str>,
    details: Value,
) -> bool {
    let entry = AuditEntry::new(
        "payment",
        payment_id.map(str::to_string),
        AUDIT_ACTION,
        json!({
            "body": request.body,
            "query": request.query,
            "request_id": request.request_id,
            "result": details,
        }),
    );
    match state.store.append_audit(entry).await {
        Ok(()) => true,
        Err(e) => {
            error!(
                "[MP Webhook] Audit write for payment {:?} failed: {}",
                payment_id, e
            );
            false
        }
    }
}

/// Handles one inbound notification.
///
/// * bad signature (only when a secret is configured) -> `InvalidSignature`
/// * missing id -> `Validation`
/// * provider fetch failure -> `Provider`, so the provider redelivers
/// * store write failures -> success if the audit row was written
pub async fn handle_notification(
    state: &ReconcileState,
    request: WebhookRequest,
) -> Result<WebhookOutcome, ReconcileError> {
    let payment_id = request.payment_id();

    if let Some(secret) = state.config.mercadopago.webhook_secret.as_deref() {
        let signed_id = request.query.data_id.clone().or_else(|| payment_id.clone());
        verify_webhook_signature(
            request.signature.as_deref(),
            request.request_id.as_deref(),
            signed_id.as_deref(),
            secret,
            state.config.mercadopago.signature_tolerance_secs,
        )
        .map_err(|e| {
            warn!("[MP Webhook] Rejected notification for {:?}: {}", payment_id, e);
            ReconcileError::InvalidSignature(e.to_string())
        })?;
    }

    if let Some(topic) = request.topic().filter(|t| t != PAYMENT_TOPIC) {
        info!("[MP Webhook] Ignoring '{}' notification ({:?})", topic, payment_id);
        audit(
            state,
            &request,
            payment_id.as_deref(),
            json!({ "outcome": "ignored", "topic": topic }),
        )
        .await;
        return Ok(WebhookOutcome::Ignored { topic });
    }

    let Some(payment_id) = payment_id else {
        warn!("[MP Webhook] Notification without payment id: {}", request.body);
        audit(state, &request, None, json!({ "outcome": "missing_id" })).await;
        return Err(ReconcileError::validation("payment id is required"));
    };

    let payment = match state.payments.get_payment(&payment_id).await {
        Ok(p) => p,
        Err(e) => {
            error!("[MP Webhook] Fetching payment {} failed: {}", payment_id, e);
            audit(
                state,
                &request,
                Some(&payment_id),
                json!({ "outcome": "provider_error", "error": e.to_string() }),
            )
            .await;
            return Err(ReconcileError::Provider(e));
        }
    };
    info!(
        "[MP Webhook] Payment {} is {} (reference {:?})",
        payment.id, payment.raw_status, payment.external_reference
    );

    let report = reconcile_payment(state, &payment).await;
    for e in &report.errors {
        error!("[MP Webhook] Payment {}: {}", payment_id, e);
    }

    let audited = audit(
        state,
        &request,
        Some(&payment_id),
        json!({
            "outcome": "processed",
            "status": payment.raw_status,
            "external_reference": payment.external_reference,
            "matched": report.matched(),
            "inserted": report.inserted,
            "confirmation": report.confirmation,
            "errors": report.errors,
        }),
    )
    .await;

    if !report.errors.is_empty() && !audited {
        return Err(ReconcileError::Internal(format!(
            "payment {} could not be recorded",
            payment_id
        )));
    }

    Ok(WebhookOutcome::Processed {
        provider_payment_id: payment_id,
        status: payment.status,
        matched: report.matched(),
        confirmation: report.confirmation,
        write_errors: report.errors.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(body: Value, query: WebhookQuery) -> WebhookRequest {
        WebhookRequest {
            body,
            query,
            ..Default::default()
        }
    }

    #[test]
    fn payment_id_prefers_body_data_id() {
        let req = request(
            json!({ "type": "payment", "data": { "id": "111" }, "id": 999 }),
            WebhookQuery {
                data_id: Some("222".into()),
                ..Default::default()
            },
        );
        assert_eq!(req.payment_id().as_deref(), Some("111"));
        assert_eq!(req.topic().as_deref(), Some("payment"));
    }

    #[test]
    fn numeric_and_query_ids_are_accepted() {
        assert_eq!(
            request(json!({ "id": 12345 }), WebhookQuery::default())
                .payment_id()
                .as_deref(),
            Some("12345")
        );
        let query_only = request(
            Value::Null,
            WebhookQuery {
                id: Some("777".into()),
                topic: Some("merchant_order".into()),
                ..Default::default()
            },
        );
        assert_eq!(query_only.payment_id().as_deref(), Some("777"));
        assert_eq!(query_only.topic().as_deref(), Some("merchant_order"));
    }

    #[test]
    fn blank_ids_are_missing() {
        let req = request(json!({ "data": { "id": "  " } }), WebhookQuery::default());
        assert_eq!(req.payment_id(), None);
    }
}
