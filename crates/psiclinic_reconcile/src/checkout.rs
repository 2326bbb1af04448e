//! Preference and PIX creation for bookings and event registrations.
//!
//! The charged amount always comes from the stored service or event price.

use psiclinic_common::services::{PayerInfo, PixRequest, PreferenceRequest};
use psiclinic_common::{round_money, PaymentStatus};
use psiclinic_store::{
    Booking, BookingStatus, EventRegistration, NewPayment, RegistrationPaymentStatus, StoreError,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::ReconcileError;
use crate::poll::spawn_watcher;
use crate::reference::PaymentTarget;
use crate::state::ReconcileState;

/// Body of `/mp-create-preference` and `/mp-create-pix`.
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Deserialize, Debug, Clone)]
pub struct CheckoutRequest {
    #[cfg_attr(feature = "openapi", schema(example = "2f6c1f0e-booking"))]
    pub booking_id: Option<String>,
    pub registration_id: Option<String>,
    #[serde(default)]
    pub payer: PayerInfo,
}

#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Serialize, Debug, Clone)]
pub struct PreferenceResponse {
    pub preference_id: String,
    pub init_point: String,
    pub sandbox_init_point: Option<String>,
    /// Provider response as received.
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub mp: Value,
}

#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Serialize, Debug, Clone)]
pub struct PixResponse {
    pub payment_id: String,
    pub status: PaymentStatus,
    pub status_detail: Option<String>,
    pub qr_code: Option<String>,
    pub qr_code_base64: Option<String>,
    pub ticket_url: Option<String>,
}

/// What is being paid for, resolved from the store.
struct Charge {
    target: PaymentTarget,
    title: String,
    amount: Decimal,
    default_email: Option<String>,
    default_name: Option<String>,
}

async fn booking_charge(state: &ReconcileState, booking_id: &str) -> Result<Charge, ReconcileError> {
    if booking_id.trim().is_empty() {
        return Err(ReconcileError::validation("booking_id is required"));
    }
    let booking: Booking = state
        .store
        .get_booking(booking_id)
        .await?
        .ok_or_else(|| ReconcileError::not_found(format!("booking {}", booking_id)))?;
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

    Ok(Charge {
        target: PaymentTarget::Booking(booking.id),
        title: service.name,
        amount: round_money(service.price),
        default_email: booking.patient_email,
        default_name: Some(booking.patient_name),
    })
}

async fn registration_charge(
    state: &ReconcileState,
    registration_id: &str,
) -> Result<Charge, ReconcileError> {
    if registration_id.trim().is_empty() {
        return Err(ReconcileError::validation("registration_id is required"));
    }
    let registration: EventRegistration = state
        .store
        .get_registration(registration_id)
        .await?
        .ok_or_else(|| ReconcileError::not_found(format!("registration {}", registration_id)))?;
    if registration.payment_status == RegistrationPaymentStatus::Paid {
        return Err(ReconcileError::Conflict(format!(
            "registration {} is already paid",
            registration_id
        )));
    }
    let event = state
        .store
        .get_event(&registration.event_id)
        .await?
        .ok_or_else(|| ReconcileError::not_found(format!("event {}", registration.event_id)))?;

    Ok(Charge {
        target: PaymentTarget::Registration(registration.id),
        title: event.title,
        amount: round_money(event.price),
        default_email: registration.email,
        default_name: Some(registration.name),
    })
}

/// Fills missing payer fields from the stored row.
fn payer_for(charge: &Charge, mut payer: PayerInfo) -> Result<PayerInfo, ReconcileError> {
    if payer.email.trim().is_empty() {
        payer.email = charge.default_email.clone().unwrap_or_default();
    }
    if payer.email.trim().is_empty() {
        return Err(ReconcileError::validation("payer.email is required"));
    }
    if payer.first_name.is_none() {
        payer.first_name = charge.default_name.clone();
    }
    Ok(payer)
}

async fn create_preference(
    state: &ReconcileState,
    charge: Charge,
    payer: PayerInfo,
) -> Result<PreferenceResponse, ReconcileError> {
    if charge.amount <= Decimal::ZERO {
        return Err(ReconcileError::PreconditionFailed(format!(
            "{} has no price to charge",
            charge.target
        )));
    }
    let payer = payer_for(&charge, payer)?;
    let request = PreferenceRequest {
        external_reference: charge.target.external_reference(),
        title: charge.title.clone(),
        description: Some(charge.title.clone()),
        amount: charge.amount,
        payer,
    };

    let created = state.payments.create_preference(request).await.map_err(|e| {
        error!("[Checkout] Preference for {} failed: {}", charge.target, e);
        ReconcileError::Provider(e)
    })?;
    info!(
        "[Checkout] Preference {} created for {} ({})",
        created.preference_id, charge.target, charge.amount
    );

    let saved = match &charge.target {
        PaymentTarget::Booking(id) => {
            state
                .store
                .set_booking_preference(id, &created.preference_id)
                .await
        }
        PaymentTarget::Registration(id) => {
            state
                .store
                .set_registration_preference(id, &created.preference_id)
                .await
        }
    };
    if let Err(e) = saved {
        warn!(
            "[Checkout] Preference {} not stored on {}: {}",
            created.preference_id, charge.target, e
        );
    }

    Ok(PreferenceResponse {
        preference_id: created.preference_id,
        init_point: created.init_point,
        sandbox_init_point: created.sandbox_init_point,
        mp: created.raw,
    })
}

pub async fn create_preference_for_booking(
    state: &ReconcileState,
    booking_id: &str,
    payer: PayerInfo,
) -> Result<PreferenceResponse, ReconcileError> {
    let charge = booking_charge(state, booking_id).await?;
    create_preference(state, charge, payer).await
}

pub async fn create_preference_for_registration(
    state: &ReconcileState,
    registration_id: &str,
    payer: PayerInfo,
) -> Result<PreferenceResponse, ReconcileError> {
    let charge = registration_charge(state, registration_id).await?;
    create_preference(state, charge, payer).await
}

async fn create_pix(
    state: &Arc<ReconcileState>,
    charge: Charge,
    payer: PayerInfo,
) -> Result<PixResponse, ReconcileError> {
    if charge.amount <= Decimal::ZERO {
        return Err(ReconcileError::PreconditionFailed(format!(
            "{} has no price to charge",
            charge.target
        )));
    }
    let payer = payer_for(&charge, payer)?;
    let request = PixRequest {
        external_reference: charge.target.external_reference(),
        description: charge.title.clone(),
        amount: charge.amount,
        payer,
        idempotency_key: Uuid::new_v4().to_string(),
    };

    let created = state.payments.create_pix_payment(request).await.map_err(|e| {
        error!("[Checkout] PIX for {} failed: {}", charge.target, e);
        ReconcileError::Provider(e)
    })?;
    info!(
        "[Checkout] PIX payment {} created for {} ({})",
        created.payment_id, charge.target, charge.amount
    );

    let row = NewPayment {
        booking_id: charge.target.booking_id().map(str::to_string),
        registration_id: charge.target.registration_id().map(str::to_string),
        provider_payment_id: created.payment_id.clone(),
        status: created.status,
        amount: charge.amount,
        method: Some("pix".to_string()),
        raw_payload: Some(json!({ "pix": created.raw })),
    };
    match state.store.insert_payment(row).await {
        Ok(_) => {}
        Err(StoreError::Conflict(_)) => info!(
            "[Checkout] Payment {} already recorded (webhook got there first)",
            created.payment_id
        ),
        Err(e) => warn!(
            "[Checkout] Payment {} not recorded for {}: {}",
            created.payment_id, charge.target, e
        ),
    }

    if state.config.checkout.watch_pix_payments && !created.status.is_terminal() {
        spawn_watcher(state, &created.payment_id);
    }

    Ok(PixResponse {
        payment_id: created.payment_id,
        status: created.status,
        status_detail: created.status_detail,
        qr_code: created.qr_code,
        qr_code_base64: created.qr_code_base64,
        ticket_url: created.ticket_url,
    })
}

pub async fn create_pix_for_booking(
    state: &Arc<ReconcileState>,
    booking_id: &str,
    payer: PayerInfo,
) -> Result<PixResponse, ReconcileError> {
    let charge = booking_charge(state, booking_id).await?;
    create_pix(state, charge, payer).await
}

pub async fn create_pix_for_registration(
    state: &Arc<ReconcileState>,
    registration_id: &str,
    payer: PayerInfo,
) -> Result<PixResponse, ReconcileError> {
    let charge = registration_charge(state, registration_id).await?;
    create_pix(state, charge, payer).await
}
