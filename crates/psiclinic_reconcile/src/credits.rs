//! Prepaid credit protocol and credit checkout.
//!
//! `reserve -> consume` or `reserve -> release`, each guarded by the caller's
//! reservation token. [`checkout_with_credit`] runs the whole saga and releases
//! the reservation on any failure before consumption.

use psiclinic_common::{round_money, PaymentStatus};
use psiclinic_store::{
    Booking, BookingStatus, Credit, CreditStatus, NewPayment, Payment, PaymentUpdate, StoreError,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::confirm::{confirm_booking, ConfirmOutcome};
use crate::error::ReconcileError;
use crate::state::ReconcileState;

pub const CREDIT_METHOD: &str = "credit";

/// Provider id recorded for a payment settled by credit.
pub fn credit_payment_id(credit_id: &str) -> String {
    format!("credit:{}", credit_id)
}

fn require(value: &str, field: &str) -> Result<(), ReconcileError> {
    if value.trim().is_empty() {
        return Err(ReconcileError::validation(format!("{} is required", field)));
    }
    Ok(())
}

pub async fn reserve(
    state: &ReconcileState,
    credit_id: &str,
    token: &str,
) -> Result<Credit, ReconcileError> {
    require(credit_id, "credit_id")?;
    require(token, "reservation_token")?;
    let credit = state.store.reserve_credit(credit_id, token).await.map_err(|e| {
        warn!("[Credits] Reserve of credit {} refused: {}", credit_id, e);
        e
    })?;
    info!("[Credits] Credit {} reserved", credit_id);
    Ok(credit)
}

pub async fn consume(
    state: &ReconcileState,
    credit_id: &str,
    token: &str,
    booking_id: &str,
) -> Result<Credit, ReconcileError> {
    require(credit_id, "credit_id")?;
    require(token, "reservation_token")?;
    require(booking_id, "booking_id")?;
    let credit = state
        .store
        .consume_credit(credit_id, token, booking_id)
        .await
        .map_err(|e| {
            warn!(
                "[Credits] Consume of credit {} for booking {} refused: {}",
                credit_id, booking_id, e
            );
            e
        })?;
    info!(
        "[Credits] Credit {} consumed by booking {}",
        credit_id, booking_id
    );
    Ok(credit)
}

pub async fn release(
    state: &ReconcileState,
    credit_id: &str,
    token: &str,
) -> Result<Credit, ReconcileError> {
    require(credit_id, "credit_id")?;
    require(token, "reservation_token")?;
    let credit = state.store.release_credit(credit_id, token).await.map_err(|e| {
        warn!("[Credits] Release of credit {} refused: {}", credit_id, e);
        e
    })?;
    info!("[Credits] Credit {} released", credit_id);
    Ok(credit)
}

#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Deserialize, Debug, Clone)]
pub struct CreditCheckoutRequest {
    #[serde(default)]
    pub booking_id: String,
    #[serde(default)]
    pub credit_id: String,
}

#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct CreditCheckout {
    pub booking_id: String,
    pub credit_id: String,
    /// Local payment row id.
    pub payment_id: String,
    pub confirmation: ConfirmOutcome,
    /// `true` when an earlier attempt had already consumed the credit.
    pub resumed: bool,
}

/// Pays a pending booking in full with one credit.
pub async fn checkout_with_credit(
    state: &ReconcileState,
    booking_id: &str,
    credit_id: &str,
) -> Result<CreditCheckout, ReconcileError> {
    require(booking_id, "booking_id")?;
    require(credit_id, "credit_id")?;

    let booking = state
        .store
        .get_booking(booking_id)
        .await?
        .ok_or_else(|| ReconcileError::not_found(format!("booking {}", booking_id)))?;
    let credit = state
        .store
        .get_credit(credit_id)
        .await?
        .ok_or_else(|| ReconcileError::not_found(format!("credit {}", credit_id)))?;

    if credit.status == CreditStatus::Consumed
        && credit.booking_id.as_deref() == Some(booking_id)
    {
        info!(
            "[Credits] Credit {} already consumed by booking {}; resuming",
            credit_id, booking_id
        );
        return resume(state, &booking, &credit).await;
    }

    if booking.status != BookingStatus::PendingPayment {
        return Err(ReconcileError::Conflict(format!(
            "booking {} is {:?}, not awaiting payment",
            booking_id, booking.status
        )));
    }
    let service = state
        .store
        .get_service(&booking.service_id)
        .await?
        .ok_or_else(|| ReconcileError::not_found(format!("service {}", booking.service_id)))?;
    let price = round_money(service.price);

    let token = Uuid::new_v4().to_string();
    let reserved = reserve(state, credit_id, &token).await?;

    if reserved.amount < price {
        compensate(state, credit_id, &token, None).await;
        return Err(ReconcileError::PreconditionFailed(format!(
            "credit {} covers {} but booking {} costs {}",
            credit_id, reserved.amount, booking_id, price
        )));
    }

    let payment = match record_credit_payment(state, &booking, &reserved, price).await {
        Ok(p) => p,
        Err(e) => {
            error!(
                "[Credits] Payment record for booking {} failed: {}",
                booking_id, e
            );
            compensate(state, credit_id, &token, None).await;
            return Err(e);
        }
    };

    if let Err(e) = consume(state, credit_id, &token, booking_id).await {
        compensate(state, credit_id, &token, Some(&payment)).await;
        return Err(e);
    }

    finish(state, &booking, credit_id, payment, false).await
}

async fn record_credit_payment(
    state: &ReconcileState,
    booking: &Booking,
    credit: &Credit,
    price: rust_decimal::Decimal,
) -> Result<Payment, ReconcileError> {
    let provider_id = credit_payment_id(&credit.id);
    let row = NewPayment {
        booking_id: Some(booking.id.clone()),
        registration_id: None,
        provider_payment_id: provider_id.clone(),
        status: PaymentStatus::Pending,
        amount: price,
        method: Some(CREDIT_METHOD.to_string()),
        raw_payload: Some(json!({
            "credit_id": credit.id,
            "credit_amount": credit.amount,
            "currency": credit.currency,
        })),
    };
    match state.store.insert_payment(row).await {
        Ok(p) => Ok(p),
        Err(StoreError::Conflict(_)) => {
            // Left behind by an earlier attempt that did not finish.
            let existing = state
                .store
                .find_payment_by_provider_id(&provider_id)
                .await?
                .ok_or_else(|| ReconcileError::not_found(format!("payment {}", provider_id)))?;
            let same_booking = existing.booking_id.as_deref() == Some(booking.id.as_str());
            if existing.status == PaymentStatus::Approved && !same_booking {
                return Err(ReconcileError::Conflict(format!(
                    "credit {} was already applied to another booking",
                    credit.id
                )));
            }
            if same_booking && existing.status != PaymentStatus::Cancelled {
                return Ok(existing);
            }
            // The reservation we hold makes any unsettled row for this credit stale.
            info!(
                "[Credits] Reusing {} payment row {} of credit {} for booking {}",
                existing.status, existing.id, credit.id, booking.id
            );
            let update = PaymentUpdate {
                status: PaymentStatus::Pending,
                raw_payload: None,
                booking_id: Some(booking.id.clone()),
                registration_id: None,
                amount: Some(price),
            };
            Ok(state.store.update_payment_status(&existing.id, update).await?)
        }
        Err(e) => Err(e.into()),
    }
}

/// Gives the reservation back. A payment row recorded by the failed attempt is
/// cancelled only once the credit is available again.
async fn compensate(
    state: &ReconcileState,
    credit_id: &str,
    token: &str,
    payment: Option<&Payment>,
) {
    if let Err(e) = release(state, credit_id, token).await {
        error!(
            "[Credits] Credit {} left reserved, release failed: {}",
            credit_id, e
        );
        return;
    }
    let Some(payment) = payment else {
        return;
    };
    let update = PaymentUpdate {
        status: PaymentStatus::Cancelled,
        raw_payload: None,
        booking_id: None,
        registration_id: None,
        amount: None,
    };
    if let Err(e) = state.store.update_payment_status(&payment.id, update).await {
        warn!(
            "[Credits] Payment row {} of released credit {} not cancelled: {}",
            payment.id, credit_id, e
        );
    }
}

async fn resume(
    state: &ReconcileState,
    booking: &Booking,
    credit: &Credit,
) -> Result<CreditCheckout, ReconcileError> {
    let provider_id = credit_payment_id(&credit.id);
    let payment = match state.store.find_payment_by_provider_id(&provider_id).await? {
        Some(p) => p,
        None => {
            let price = match state.store.get_service(&booking.service_id).await? {
                Some(service) => round_money(service.price),
                None => credit.amount,
            };
            record_credit_payment(state, booking, credit, price).await?
        }
    };
    finish(state, booking, &credit.id, payment, true).await
}

async fn finish(
    state: &ReconcileState,
    booking: &Booking,
    credit_id: &str,
    payment: Payment,
    resumed: bool,
) -> Result<CreditCheckout, ReconcileError> {
    if matches!(payment.status, PaymentStatus::Pending | PaymentStatus::Cancelled) {
        let update = PaymentUpdate {
            status: PaymentStatus::Approved,
            raw_payload: None,
            booking_id: Some(booking.id.clone()),
            registration_id: None,
            amount: None,
        };
        if let Err(e) = state.store.update_payment_status(&payment.id, update).await {
            warn!(
                "[Credits] Payment {} for booking {} not marked approved: {}",
                payment.id, booking.id, e
            );
        }
    }

    let confirmation = confirm_booking(state, &booking.id, &payment.provider_payment_id).await?;
    info!(
        "[Credits] Booking {} paid with credit {} ({:?})",
        booking.id, credit_id, confirmation
    );
    Ok(CreditCheckout {
        booking_id: booking.id.clone(),
        credit_id: credit_id.to_string(),
        payment_id: payment.id,
        confirmation,
        resumed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credit_payments_are_namespaced() {
        assert_eq!(credit_payment_id("c-9"), "credit:c-9");
    }
}
