// --- File: crates/psiclinic_reconcile/src/handlers.rs ---
use axum::{
    body::Bytes,
    extract::{Multipart, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use psiclinic_common::HttpStatusCode;
use psiclinic_store::{Credit, CreditStatus};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::checkout::{
    create_pix_for_booking, create_pix_for_registration, create_preference_for_booking,
    create_preference_for_registration, CheckoutRequest, PixResponse, PreferenceResponse,
};
use crate::credits::{self, checkout_with_credit, CreditCheckout, CreditCheckoutRequest};
use crate::error::ReconcileError;
use crate::poll::{poll_payment_status, PollTick};
use crate::refunds::{
    parse_amount, record_manual_refund, refund_via_provider, ManualRefundRequest,
    ManualRefundResponse, ProofFile, RefundRequest, RefundResponse,
};
use crate::state::ReconcileState;
use crate::webhook::{handle_notification, WebhookQuery, WebhookRequest};

pub const SIGNATURE_HEADER: &str = "x-signature";
pub const REQUEST_ID_HEADER: &str = "x-request-id";

enum CheckoutTarget<'a> {
    Booking(&'a str),
    Registration(&'a str),
}

fn checkout_target(payload: &CheckoutRequest) -> Result<CheckoutTarget<'_>, ReconcileError> {
    let booking = payload.booking_id.as_deref().filter(|s| !s.trim().is_empty());
    let registration = payload
        .registration_id
        .as_deref()
        .filter(|s| !s.trim().is_empty());
    match (booking, registration) {
        (Some(b), None) => Ok(CheckoutTarget::Booking(b)),
        (None, Some(r)) => Ok(CheckoutTarget::Registration(r)),
        (Some(_), Some(_)) => Err(ReconcileError::validation(
            "send either booking_id or registration_id, not both",
        )),
        (None, None) => Err(ReconcileError::validation(
            "booking_id or registration_id is required",
        )),
    }
}

/// Creates a hosted-checkout preference for a booking or event registration.
#[axum::debug_handler]
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/mp-create-preference", // Path relative to /api
    request_body = CheckoutRequest,
    responses(
        (status = 200, description = "Preference created", body = PreferenceResponse),
        (status = 400, description = "Missing id or payer email"),
        (status = 404, description = "Booking, registration, service or event not found"),
        (status = 409, description = "Already paid"),
        (status = 502, description = "Mercado Pago error")
    ),
    tag = "Checkout"
))]
pub async fn create_preference_handler(
    State(state): State<Arc<ReconcileState>>,
    Json(payload): Json<CheckoutRequest>,
) -> Result<Json<PreferenceResponse>, ReconcileError> {
    let payer = payload.payer.clone();
    let response = match checkout_target(&payload)? {
        CheckoutTarget::Booking(id) => create_preference_for_booking(&state, id, payer).await?,
        CheckoutTarget::Registration(id) => {
            create_preference_for_registration(&state, id, payer).await?
        }
    };
    Ok(Json(response))
}

/// Creates a PIX payment and returns the QR code.
#[axum::debug_handler]
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/mp-create-pix", // Path relative to /api
    request_body = CheckoutRequest,
    responses(
        (status = 200, description = "PIX payment created", body = PixResponse),
        (status = 400, description = "Missing id or payer email"),
        (status = 404, description = "Booking, registration, service or event not found"),
        (status = 409, description = "Already paid"),
        (status = 502, description = "Mercado Pago error")
    ),
    tag = "Checkout"
))]
pub async fn create_pix_handler(
    State(state): State<Arc<ReconcileState>>,
    Json(payload): Json<CheckoutRequest>,
) -> Result<Json<PixResponse>, ReconcileError> {
    let payer = payload.payer.clone();
    let response = match checkout_target(&payload)? {
        CheckoutTarget::Booking(id) => create_pix_for_booking(&state, id, payer).await?,
        CheckoutTarget::Registration(id) => create_pix_for_registration(&state, id, payer).await?,
    };
    Ok(Json(response))
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|h| h.to_str().ok())
        .map(str::to_string)
}

/// Mercado Pago payment notifications. Replies `ok` once the payment is recorded.
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/mp-webhook", // Path relative to /api
    params(WebhookQuery),
    request_body(content_type = "application/json", description = "Notification body, e.g. {\"type\":\"payment\",\"data\":{\"id\":\"123\"}}"),
    responses(
        (status = 200, description = "Notification processed or ignored", content_type = "text/plain"),
        (status = 400, description = "No payment id", content_type = "text/plain"),
        (status = 401, description = "Invalid signature", content_type = "text/plain"),
        (status = 500, description = "Could not record the notification", content_type = "text/plain"),
        (status = 502, description = "Payment could not be fetched, retry later", content_type = "text/plain")
    ),
    tag = "Mercado Pago Webhooks"
))]
pub async fn webhook_handler(
    State(state): State<Arc<ReconcileState>>,
    Query(query): Query<WebhookQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let body = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or_else(|e| {
            warn!("[MP Webhook] Body is not JSON ({}), using query only", e);
            Value::Null
        })
    };
    debug!("[MP Webhook] Received body={} query={:?}", body, query);

    let request = WebhookRequest {
        body,
        query,
        signature: header(&headers, SIGNATURE_HEADER),
        request_id: header(&headers, REQUEST_ID_HEADER),
    };
    match handle_notification(&state, request).await {
        Ok(_) => (StatusCode::OK, "ok").into_response(),
        Err(e) => {
            let status =
                StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, e.to_string()).into_response()
        }
    }
}

/// One status check, reconciling the result the same way the webhook does.
#[axum::debug_handler]
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/mp-payment-status/{payment_id}", // Path relative to /api
    params(("payment_id" = String, Path, description = "Mercado Pago payment id")),
    responses(
        (status = 200, description = "Current payment status", body = PollTick),
        (status = 502, description = "Mercado Pago error")
    ),
    tag = "Checkout"
))]
pub async fn payment_status_handler(
    State(state): State<Arc<ReconcileState>>,
    Path(payment_id): Path<String>,
) -> Result<Json<PollTick>, ReconcileError> {
    Ok(Json(poll_payment_status(&state, &payment_id).await?))
}

#[axum::debug_handler]
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/mp-refund", // Path relative to /api
    request_body = RefundRequest,
    responses(
        (status = 200, description = "Refund created", body = RefundResponse),
        (status = 400, description = "Missing id, not approved or already refunded"),
        (status = 404, description = "Payment not found"),
        (status = 502, description = "Mercado Pago error")
    ),
    tag = "Refunds"
))]
pub async fn refund_handler(
    State(state): State<Arc<ReconcileState>>,
    Json(payload): Json<RefundRequest>,
) -> Result<Json<RefundResponse>, ReconcileError> {
    Ok(Json(refund_via_provider(&state, payload).await?))
}

fn parse_bool(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}

async fn read_manual_refund(
    payment_id: String,
    mut multipart: Multipart,
) -> Result<ManualRefundRequest, ReconcileError> {
    let mut request = ManualRefundRequest {
        payment_id,
        reason: String::new(),
        amount: None,
        currency: None,
        notify_payer: false,
        payer_email: None,
        proof: None,
        checksum_sha256: None,
    };
    let bad_form = |e: axum::extract::multipart::MultipartError| {
        ReconcileError::validation(format!("invalid form data: {}", e))
    };

    while let Some(field) = multipart.next_field().await.map_err(bad_form)? {
        let name = field.name().unwrap_or_default().to_string();
        if name == "proof" {
            let file_name = field.file_name().unwrap_or("comprovante").to_string();
            let content_type = field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();
            let bytes = field.bytes().await.map_err(bad_form)?;
            request.proof = Some(ProofFile {
                file_name,
                content_type,
                bytes: bytes.to_vec(),
            });
            continue;
        }
        let value = field.text().await.map_err(bad_form)?;
        let present = Some(value.trim().to_string()).filter(|v| !v.is_empty());
        match name.as_str() {
            "reason" => request.reason = value,
            "amount" => {
                request.amount = match present {
                    Some(raw) => Some(parse_amount(&raw)?),
                    None => None,
                }
            }
            "currency" => request.currency = present,
            "notify_payer" => request.notify_payer = parse_bool(&value),
            "payer_email" => request.payer_email = present,
            "checksum_sha256" => request.checksum_sha256 = present,
            other => debug!("[Manual Refund] Ignoring form field '{}'", other),
        }
    }
    Ok(request)
}

/// Records a refund made outside the provider, with a proof file.
///
/// Multipart fields: `reason`, `proof` (file), `checksum_sha256`, `amount`,
/// `currency`, `notify_payer`, `payer_email`.
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/payments/{payment_id}/manual-refund", // Path relative to /api
    params(("payment_id" = String, Path, description = "Local payment id or Mercado Pago payment id")),
    request_body(content_type = "multipart/form-data", description = "reason, proof file, checksum_sha256, amount, currency, notify_payer, payer_email"),
    responses(
        (status = 200, description = "Refund recorded", body = ManualRefundResponse),
        (status = 400, description = "Missing reason, proof too large or checksum mismatch"),
        (status = 404, description = "Payment not found")
    ),
    tag = "Refunds"
))]
pub async fn manual_refund_handler(
    State(state): State<Arc<ReconcileState>>,
    Path(payment_id): Path<String>,
    multipart: Multipart,
) -> Result<Json<ManualRefundResponse>, ReconcileError> {
    let request = read_manual_refund(payment_id, multipart).await?;
    Ok(Json(record_manual_refund(&state, request).await?))
}

// --- Credits ---

#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Deserialize, Debug, Default)]
pub struct ReserveCreditRequest {
    /// Generated when absent and returned in the response.
    #[serde(default)]
    pub reservation_token: Option<String>,
}

#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Deserialize, Debug)]
pub struct ConsumeCreditRequest {
    #[serde(default)]
    pub reservation_token: String,
    #[serde(default)]
    pub booking_id: String,
}

#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Deserialize, Debug)]
pub struct ReleaseCreditRequest {
    #[serde(default)]
    pub reservation_token: String,
}

#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Serialize, Debug, PartialEq)]
pub struct CreditResponse {
    pub credit_id: String,
    pub status: String,
    pub reservation_token: Option<String>,
    pub booking_id: Option<String>,
}

impl From<Credit> for CreditResponse {
    fn from(credit: Credit) -> Self {
        Self {
            reservation_token: match credit.status {
                CreditStatus::Reserved => credit.reservation_token,
                _ => None,
            },
            credit_id: credit.id,
            status: credit.status.to_string(),
            booking_id: credit.booking_id,
        }
    }
}

#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/credits/{credit_id}/reserve", // Path relative to /api
    params(("credit_id" = String, Path, description = "Credit id")),
    request_body = ReserveCreditRequest,
    responses(
        (status = 200, description = "Credit reserved", body = CreditResponse),
        (status = 404, description = "Credit not found"),
        (status = 409, description = "Credit is not available")
    ),
    tag = "Credits"
))]
pub async fn reserve_credit_handler(
    State(state): State<Arc<ReconcileState>>,
    Path(credit_id): Path<String>,
    payload: Option<Json<ReserveCreditRequest>>,
) -> Result<Json<CreditResponse>, ReconcileError> {
    let token = payload
        .and_then(|Json(p)| p.reservation_token)
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let credit = credits::reserve(&state, &credit_id, &token).await?;
    Ok(Json(credit.into()))
}

#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/credits/{credit_id}/consume", // Path relative to /api
    params(("credit_id" = String, Path, description = "Credit id")),
    request_body = ConsumeCreditRequest,
    responses(
        (status = 200, description = "Credit consumed", body = CreditResponse),
        (status = 404, description = "Credit not found"),
        (status = 409, description = "Not reserved or token mismatch")
    ),
    tag = "Credits"
))]
pub async fn consume_credit_handler(
    State(state): State<Arc<ReconcileState>>,
    Path(credit_id): Path<String>,
    Json(payload): Json<ConsumeCreditRequest>,
) -> Result<Json<CreditResponse>, ReconcileError> {
    let credit = credits::consume(
        &state,
        &credit_id,
        &payload.reservation_token,
        &payload.booking_id,
    )
    .await?;
    Ok(Json(credit.into()))
}

#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/credits/{credit_id}/release", // Path relative to /api
    params(("credit_id" = String, Path, description = "Credit id")),
    request_body = ReleaseCreditRequest,
    responses(
        (status = 200, description = "Credit available again", body = CreditResponse),
        (status = 404, description = "Credit not found"),
        (status = 409, description = "Not reserved or token mismatch")
    ),
    tag = "Credits"
))]
pub async fn release_credit_handler(
    State(state): State<Arc<ReconcileState>>,
    Path(credit_id): Path<String>,
    Json(payload): Json<ReleaseCreditRequest>,
) -> Result<Json<CreditResponse>, ReconcileError> {
    let credit = credits::release(&state, &credit_id, &payload.reservation_token).await?;
    Ok(Json(credit.into()))
}

#[axum::debug_handler]
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/checkout/credit", // Path relative to /api
    request_body = CreditCheckoutRequest,
    responses(
        (status = 200, description = "Booking paid with credit", body = CreditCheckout),
        (status = 400, description = "Credit does not cover the booking"),
        (status = 404, description = "Booking, service or credit not found"),
        (status = 409, description = "Booking not awaiting payment or credit unavailable")
    ),
    tag = "Credits"
))]
pub async fn credit_checkout_handler(
    State(state): State<Arc<ReconcileState>>,
    Json(payload): Json<CreditCheckoutRequest>,
) -> Result<Json<CreditCheckout>, ReconcileError> {
    Ok(Json(
        checkout_with_credit(&state, &payload.booking_id, &payload.credit_id).await?,
    ))
}

#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/health", // Path relative to /api
    responses((status = 200, description = "Service is up")),
    tag = "Health"
))]
pub async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
