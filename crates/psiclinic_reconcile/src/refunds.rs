//! Refunds: through the provider API, or recorded after a manual refund.

use chrono::Utc;
use psiclinic_common::{round_money, PaymentStatus};
use psiclinic_notify::templates::{refund_notice, RefundNotice};
use psiclinic_store::{AuditEntry, Payment, RefundRecord};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::{error, info, warn};

use crate::credits::CREDIT_METHOD;
use crate::error::ReconcileError;
use crate::state::ReconcileState;

#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Deserialize, Debug, Clone)]
pub struct RefundRequest {
    /// Local payment row id or provider payment id.
    #[serde(default)]
    pub payment_id: String,
    /// Partial amount; the full payment when absent.
    #[serde(default)]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<f64>))]
    pub amount: Option<Decimal>,
}

#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct RefundResponse {
    pub success: bool,
    pub refund_id: String,
    pub status: String,
    #[cfg_attr(feature = "openapi", schema(value_type = f64))]
    pub amount: Decimal,
}

async fn load_payment(state: &ReconcileState, payment_id: &str) -> Result<Payment, ReconcileError> {
    if payment_id.trim().is_empty() {
        return Err(ReconcileError::validation("payment_id is required"));
    }
    if let Some(p) = state.store.get_payment(payment_id).await? {
        return Ok(p);
    }
    state
        .store
        .find_payment_by_provider_id(payment_id)
        .await?
        .ok_or_else(|| ReconcileError::not_found(format!("payment {}", payment_id)))
}

fn refund_amount(requested: Option<Decimal>, payment: &Payment) -> Result<Decimal, ReconcileError> {
    let amount = round_money(requested.unwrap_or(payment.amount));
    if amount <= Decimal::ZERO {
        return Err(ReconcileError::validation("amount must be greater than zero"));
    }
    if amount > payment.amount {
        return Err(ReconcileError::validation(format!(
            "amount {} exceeds payment amount {}",
            amount, payment.amount
        )));
    }
    Ok(amount)
}

/// Only a settled, not yet refunded payment can be refunded.
fn require_refundable(payment: &Payment) -> Result<(), ReconcileError> {
    if payment.refund_id.is_some() || payment.status == PaymentStatus::Refunded {
        return Err(ReconcileError::PreconditionFailed(format!(
            "payment {} is already refunded",
            payment.id
        )));
    }
    if payment.status != PaymentStatus::Approved {
        return Err(ReconcileError::PreconditionFailed(format!(
            "payment {} is {}, only approved payments can be refunded",
            payment.id, payment.status
        )));
    }
    Ok(())
}

/// Refunds an approved payment through the provider.
///
/// Every precondition is checked before the provider is called.
pub async fn refund_via_provider(
    state: &ReconcileState,
    request: RefundRequest,
) -> Result<RefundResponse, ReconcileError> {
    let payment = load_payment(state, &request.payment_id).await?;
    require_refundable(&payment)?;
    if payment.method.as_deref() == Some(CREDIT_METHOD)
        || payment.provider_payment_id.starts_with("credit:")
    {
        return Err(ReconcileError::PreconditionFailed(format!(
            "payment {} was settled with credit and has no provider charge",
            payment.id
        )));
    }
    let amount = refund_amount(request.amount, &payment)?;
    let partial = (amount < payment.amount).then_some(amount);

    let idempotency_key = format!("refund-{}", payment.id);
    let refund = state
        .payments
        .create_refund(&payment.provider_payment_id, partial, &idempotency_key)
        .await
        .map_err(|e| {
            error!(
                "[Refund] Provider refund of payment {} failed: {}",
                payment.provider_payment_id, e
            );
            ReconcileError::Provider(e)
        })?;
    info!(
        "[Refund] Payment {} refunded at provider (refund {}, {})",
        payment.provider_payment_id, refund.refund_id, refund.amount
    );

    let record = RefundRecord {
        refund_id: Some(refund.refund_id.clone()),
        amount: refund.amount,
        status: refund.status.clone(),
        metadata: json!({ "source": "provider", "mp": refund.raw }),
    };
    if let Err(e) = state.store.record_refund(&payment.id, record).await {
        // The money already moved; the row is fixed by hand from the audit entry.
        error!(
            "[Refund] Refund {} done but payment {} not updated: {}",
            refund.refund_id, payment.id, e
        );
    }
    if let Err(e) = state
        .store
        .append_audit(AuditEntry::new(
            "payment",
            Some(payment.id.clone()),
            "mp_refund",
            json!({
                "provider_payment_id": payment.provider_payment_id,
                "refund_id": refund.refund_id,
                "amount": refund.amount,
                "status": refund.status,
            }),
        ))
        .await
    {
        warn!("[Refund] Audit for payment {} failed: {}", payment.id, e);
    }

    Ok(RefundResponse {
        success: true,
        refund_id: refund.refund_id,
        status: refund.status,
        amount: refund.amount,
    })
}

#[derive(Debug, Clone)]
pub struct ProofFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct ManualRefundRequest {
    pub payment_id: String,
    pub reason: String,
    pub amount: Option<Decimal>,
    pub currency: Option<String>,
    pub notify_payer: bool,
    pub payer_email: Option<String>,
    pub proof: Option<ProofFile>,
    /// Hex SHA-256 of the proof computed by the uploader.
    pub checksum_sha256: Option<String>,
}

#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ManualRefundResponse {
    pub success: bool,
    pub payment_id: String,
    #[cfg_attr(feature = "openapi", schema(value_type = f64))]
    pub amount: Decimal,
    pub currency: String,
    pub proof_path: String,
    pub checksum_sha256: String,
    pub notification: NotificationReport,
}

#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    Sent,
    Failed,
    Skipped,
}

#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct NotificationReport {
    pub requested: bool,
    pub status: NotificationStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
}

impl NotificationReport {
    fn skipped(requested: bool, reason: Option<String>) -> Self {
        Self {
            requested,
            status: NotificationStatus::Skipped,
            attempts: 0,
            last_error: reason,
        }
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Keeps `[A-Za-z0-9._-]`, everything else becomes `_`.
fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_start_matches('.');
    if trimmed.is_empty() {
        "comprovante".to_string()
    } else {
        trimmed.to_string()
    }
}

async fn payer_contact(state: &ReconcileState, payment: &Payment) -> (Option<String>, Option<String>) {
    if let Some(booking_id) = payment.booking_id.as_deref() {
        if let Ok(Some(b)) = state.store.get_booking(booking_id).await {
            return (b.patient_email, Some(b.patient_name));
        }
    }
    if let Some(registration_id) = payment.registration_id.as_deref() {
        if let Ok(Some(r)) = state.store.get_registration(registration_id).await {
            return (r.email, Some(r.name));
        }
    }
    (None, None)
}

/// Records a refund already made outside the provider API, with its proof.
pub async fn record_manual_refund(
    state: &ReconcileState,
    request: ManualRefundRequest,
) -> Result<ManualRefundResponse, ReconcileError> {
    let reason = request.reason.trim().to_string();
    if reason.is_empty() {
        return Err(ReconcileError::validation("reason is required"));
    }
    let proof = request
        .proof
        .ok_or_else(|| ReconcileError::validation("proof file is required"))?;
    let max_bytes = state.config.refunds.max_proof_bytes;
    if proof.bytes.is_empty() {
        return Err(ReconcileError::validation("proof file is empty"));
    }
    if proof.bytes.len() > max_bytes {
        return Err(ReconcileError::validation(format!(
            "proof file is {} bytes, limit is {}",
            proof.bytes.len(),
            max_bytes
        )));
    }
    let checksum = sha256_hex(&proof.bytes);
    if let Some(expected) = request.checksum_sha256.as_deref().map(str::trim) {
        if !expected.eq_ignore_ascii_case(&checksum) {
            return Err(ReconcileError::validation(format!(
                "proof checksum mismatch: expected {}, got {}",
                expected, checksum
            )));
        }
    }

    let payment = load_payment(state, &request.payment_id).await?;
    require_refundable(&payment)?;
    let amount = refund_amount(request.amount, &payment)?;
    let currency = request
        .currency
        .filter(|c| !c.trim().is_empty())
        .unwrap_or_else(|| state.config.mercadopago.currency.clone());

    let path = format!(
        "{}/{}-{}",
        payment.id,
        Utc::now().format("%Y%m%dT%H%M%S%3f"),
        sanitize_file_name(&proof.file_name)
    );
    let stored_path = state
        .store
        .upload_refund_proof(&path, &proof.content_type, proof.bytes)
        .await?;
    info!(
        "[Manual Refund] Proof for payment {} stored at {}",
        payment.id, stored_path
    );

    let mut metadata = json!({
        "source": "manual",
        "reason": reason,
        "amount": amount,
        "currency": currency,
        "proof_path": stored_path,
        "proof_file_name": proof.file_name,
        "checksum_sha256": checksum,
        "notification": { "requested": request.notify_payer, "status": "pending" },
    });
    state
        .store
        .record_refund(
            &payment.id,
            RefundRecord {
                refund_id: None,
                amount,
                status: "manual".to_string(),
                metadata: metadata.clone(),
            },
        )
        .await?;
    info!(
        "[Manual Refund] Payment {} marked refunded ({} {})",
        payment.id, amount, currency
    );

    let (stored_email, name) = payer_contact(state, &payment).await;
    let email = request
        .payer_email
        .filter(|e| !e.trim().is_empty())
        .or(stored_email);
    let notification = if !request.notify_payer {
        NotificationReport::skipped(false, None)
    } else {
        match (state.notifier.as_ref(), email) {
            (None, _) => NotificationReport::skipped(true, Some("email is not configured".into())),
            (_, None) => NotificationReport::skipped(true, Some("payer has no email".into())),
            (Some(_), Some(email)) => {
                let message = refund_notice(&RefundNotice {
                    name,
                    amount,
                    reason: reason.clone(),
                });
                notify_with_retry(state, &payment.id, &email, &message.subject, &message.html)
                    .await
            }
        }
    };

    metadata["notification"] = json!({
        "requested": notification.requested,
        "status": notification.status,
        "attempts": notification.attempts,
        "last_error": notification.last_error,
    });
    if let Err(e) = state
        .store
        .update_refund_metadata(&payment.id, metadata.clone())
        .await
    {
        warn!(
            "[Manual Refund] Notification outcome for payment {} not saved: {}",
            payment.id, e
        );
    }
    if let Err(e) = state
        .store
        .append_audit(AuditEntry::new(
            "payment",
            Some(payment.id.clone()),
            "manual_refund",
            metadata,
        ))
        .await
    {
        warn!("[Manual Refund] Audit for payment {} failed: {}", payment.id, e);
    }

    Ok(ManualRefundResponse {
        success: true,
        payment_id: payment.id,
        amount,
        currency,
        proof_path: stored_path,
        checksum_sha256: checksum,
        notification,
    })
}

async fn notify_with_retry(
    state: &ReconcileState,
    payment_id: &str,
    email: &str,
    subject: &str,
    html: &str,
) -> NotificationReport {
    let Some(notifier) = state.notifier.as_ref() else {
        return NotificationReport::skipped(true, Some("email is not configured".into()));
    };
    let max_attempts = state.config.refunds.notify_max_attempts.max(1);
    let delay = state.config.refunds.notify_retry_delay_ms;
    let mut last_error = None;

    for attempt in 1..=max_attempts {
        match notifier.send_email(email, subject, html).await {
            Ok(_) => {
                info!(
                    "[Manual Refund] Payer of payment {} notified (attempt {})",
                    payment_id, attempt
                );
                return NotificationReport {
                    requested: true,
                    status: NotificationStatus::Sent,
                    attempts: attempt,
                    last_error,
                };
            }
            Err(e) => {
                warn!(
                    "[Manual Refund] Notification for payment {} failed (attempt {}/{}): {}",
                    payment_id, attempt, max_attempts, e
                );
                last_error = Some(e.to_string());
                if attempt < max_attempts {
                    tokio::time::sleep(Duration::from_millis(delay * u64::from(attempt))).await;
                }
            }
        }
    }
    NotificationReport {
        requested: true,
        status: NotificationStatus::Failed,
        attempts: max_attempts,
        last_error,
    }
}

pub(crate) fn parse_amount(raw: &str) -> Result<Decimal, ReconcileError> {
    raw.trim()
        .replace(',', ".")
        .parse::<Decimal>()
        .map_err(|_| ReconcileError::validation(format!("invalid amount '{}'", raw)))
}
