//! Applies an authoritative provider payment to the local rows.
//!
//! Used by both the webhook and the status poller. Write failures are collected
//! instead of aborting, so the caller decides what to report.

use psiclinic_common::services::ProviderPayment;
use psiclinic_common::PaymentStatus;
use psiclinic_store::{AuditEntry, NewPayment, Payment, PaymentUpdate, StoreError};
use serde_json::json;
use tracing::{error, info, warn};

use crate::confirm::{confirm_target, ConfirmOutcome};
use crate::reference::PaymentTarget;
use crate::state::ReconcileState;

#[derive(Debug, Default)]
pub struct ReconcileReport {
    pub target: Option<PaymentTarget>,
    /// Local payment row id, when one exists or was created.
    pub payment_row_id: Option<String>,
    /// `true` when this call inserted the payment row.
    pub inserted: bool,
    pub confirmation: Option<ConfirmOutcome>,
    pub errors: Vec<String>,
}

impl ReconcileReport {
    pub fn matched(&self) -> bool {
        self.target.is_some()
    }
}

pub async fn reconcile_payment(state: &ReconcileState, payment: &ProviderPayment) -> ReconcileReport {
    let mut report = ReconcileReport {
        target: payment
            .external_reference
            .as_deref()
            .and_then(PaymentTarget::from_external_reference),
        ..Default::default()
    };

    upsert_payment_row(state, payment, &mut report).await;

    if report.target.is_none() {
        warn!(
            "[Reconcile] Payment {} has no usable external reference ({:?}); queued for manual review",
            payment.id, payment.external_reference
        );
        let entry = AuditEntry::new(
            "payment",
            report.payment_row_id.clone(),
            "payment_unmatched",
            json!({
                "provider_payment_id": payment.id,
                "status": payment.raw_status,
                "external_reference": payment.external_reference,
                "amount": payment.amount,
                "payer_email": payment.payer_email,
            }),
        );
        if let Err(e) = state.store.append_audit(entry).await {
            report
                .errors
                .push(format!("unmatched audit for payment {}: {}", payment.id, e));
        }
    }

    if payment.status == PaymentStatus::Approved {
        if let Some(target) = report.target.clone() {
            match confirm_target(state, &target, &payment.id).await {
                Ok(outcome) => report.confirmation = Some(outcome),
                Err(e) => {
                    error!(
                        "[Reconcile] Confirming {} for payment {} failed: {}",
                        target, payment.id, e
                    );
                    report.errors.push(format!("confirm {}: {}", target, e));
                }
            }
        }
    }

    report
}

/// Inserts or updates the payment row keyed by provider payment id.
async fn upsert_payment_row(
    state: &ReconcileState,
    payment: &ProviderPayment,
    report: &mut ReconcileReport,
) {
    let existing = match state.store.find_payment_by_provider_id(&payment.id).await {
        Ok(row) => row,
        Err(e) => {
            report
                .errors
                .push(format!("lookup payment {}: {}", payment.id, e));
            return;
        }
    };

    if let Some(row) = existing {
        update_existing(state, payment, row, report).await;
        return;
    }

    let new_row = NewPayment {
        booking_id: report
            .target
            .as_ref()
            .and_then(|t| t.booking_id())
            .map(str::to_string),
        registration_id: report
            .target
            .as_ref()
            .and_then(|t| t.registration_id())
            .map(str::to_string),
        provider_payment_id: payment.id.clone(),
        status: payment.status,
        amount: payment.amount,
        method: payment.payment_method.clone(),
        raw_payload: Some(payment.raw.clone()),
    };
    match state.store.insert_payment(new_row).await {
        Ok(row) => {
            info!(
                "[Reconcile] Payment {} recorded as {} (row {})",
                payment.id, payment.status, row.id
            );
            report.payment_row_id = Some(row.id);
            report.inserted = true;
        }
        Err(StoreError::Conflict(_)) => {
            // A concurrent delivery inserted it first.
            match state.store.find_payment_by_provider_id(&payment.id).await {
                Ok(Some(row)) => update_existing(state, payment, row, report).await,
                Ok(None) => report.errors.push(format!(
                    "payment {} conflicted on insert but is not readable",
                    payment.id
                )),
                Err(e) => report
                    .errors
                    .push(format!("lookup payment {}: {}", payment.id, e)),
            }
        }
        Err(e) => report
            .errors
            .push(format!("insert payment {}: {}", payment.id, e)),
    }
}

async fn update_existing(
    state: &ReconcileState,
    payment: &ProviderPayment,
    row: Payment,
    report: &mut ReconcileReport,
) {
    report.payment_row_id = Some(row.id.clone());
    if row.status == PaymentStatus::Refunded {
        info!(
            "[Reconcile] Payment {} (row {}) is refunded locally; leaving it untouched",
            payment.id, row.id
        );
        return;
    }

    let booking_id = report
        .target
        .as_ref()
        .and_then(|t| t.booking_id())
        .filter(|_| row.booking_id.is_none())
        .map(str::to_string);
    let registration_id = report
        .target
        .as_ref()
        .and_then(|t| t.registration_id())
        .filter(|_| row.registration_id.is_none())
        .map(str::to_string);
    if row.status == payment.status && booking_id.is_none() && registration_id.is_none() {
        return;
    }

    let update = PaymentUpdate {
        status: payment.status,
        raw_payload: Some(payment.raw.clone()),
        booking_id,
        registration_id,
        amount: None,
    };
    match state.store.update_payment_status(&row.id, update).await {
        Ok(_) => info!(
            "[Reconcile] Payment {} (row {}) {} -> {}",
            payment.id, row.id, row.status, payment.status
        ),
        Err(StoreError::InvalidState(msg)) => {
            info!("[Reconcile] Payment {} not updated: {}", payment.id, msg)
        }
        Err(e) => report
            .errors
            .push(format!("update payment {}: {}", payment.id, e)),
    }
}
