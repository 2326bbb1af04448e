//! The single confirmation path shared by the webhook, the poller and credit checkout.
//!
//! `pending_payment -> confirmed` is one conditional write. Only the caller that
//! wins it runs side effects (meeting creation, notifications), and each side
//! effect is best-effort: its failure is logged and never undoes the confirmation.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use psiclinic_common::services::MeetingRequest;
use psiclinic_notify::templates::{
    booking_confirmed_patient, booking_confirmed_professional, registration_confirmed,
    BookingNotice, RegistrationNotice, RenderedMessage,
};
use psiclinic_store::{
    AuditEntry, Booking, BookingStatus, MeetingInfo, Professional, RegistrationPaymentStatus,
    Service,
};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use crate::error::ReconcileError;
use crate::reference::PaymentTarget;
use crate::state::ReconcileState;

#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmOutcome {
    /// This call performed the transition and ran the side effects.
    Confirmed,
    /// Someone else already did; nothing was repeated.
    AlreadyConfirmed,
    /// The booking/registration was closed before the payment arrived.
    /// Left for manual review.
    NotConfirmable,
}

impl ConfirmOutcome {
    pub fn is_confirmed(self) -> bool {
        matches!(self, Self::Confirmed | Self::AlreadyConfirmed)
    }
}

pub async fn confirm_target(
    state: &ReconcileState,
    target: &PaymentTarget,
    provider_payment_id: &str,
) -> Result<ConfirmOutcome, ReconcileError> {
    match target {
        PaymentTarget::Booking(id) => confirm_booking(state, id, provider_payment_id).await,
        PaymentTarget::Registration(id) => {
            confirm_registration(state, id, provider_payment_id).await
        }
    }
}

/// Confirms a booking paid by `provider_payment_id`.
pub async fn confirm_booking(
    state: &ReconcileState,
    booking_id: &str,
    provider_payment_id: &str,
) -> Result<ConfirmOutcome, ReconcileError> {
    let won = state.store.confirm_booking_if_pending(booking_id).await?;
    if !won {
        return match state.store.get_booking(booking_id).await? {
            Some(booking)
                if matches!(booking.status, BookingStatus::Confirmed | BookingStatus::Completed) =>
            {
                info!(
                    "[Confirm] Booking {} already {:?}; payment {} changes nothing",
                    booking_id, booking.status, provider_payment_id
                );
                Ok(ConfirmOutcome::AlreadyConfirmed)
            }
            Some(booking) => {
                warn!(
                    "[Confirm] Payment {} arrived for booking {} in status {:?}; needs manual review",
                    provider_payment_id, booking_id, booking.status
                );
                audit_closed_target(
                    state,
                    "booking",
                    booking_id,
                    provider_payment_id,
                    json!(booking.status),
                )
                .await;
                Ok(ConfirmOutcome::NotConfirmable)
            }
            None => Err(ReconcileError::not_found(format!("booking {}", booking_id))),
        };
    }

    info!(
        "[Confirm] Booking {} confirmed by payment {}",
        booking_id, provider_payment_id
    );
    if let Err(e) = state
        .store
        .append_audit(AuditEntry::new(
            "booking",
            Some(booking_id.to_string()),
            "booking_confirmed",
            json!({ "provider_payment_id": provider_payment_id }),
        ))
        .await
    {
        warn!("[Confirm] Audit for booking {} failed: {}", booking_id, e);
    }

    run_booking_side_effects(state, booking_id).await;
    Ok(ConfirmOutcome::Confirmed)
}

/// Marks an event registration paid.
pub async fn confirm_registration(
    state: &ReconcileState,
    registration_id: &str,
    provider_payment_id: &str,
) -> Result<ConfirmOutcome, ReconcileError> {
    let won = state
        .store
        .confirm_registration_if_pending(registration_id, provider_payment_id)
        .await?;
    if !won {
        return match state.store.get_registration(registration_id).await? {
            Some(registration)
                if registration.payment_status == RegistrationPaymentStatus::Paid =>
            {
                info!(
                    "[Confirm] Registration {} already paid; payment {} changes nothing",
                    registration_id, provider_payment_id
                );
                Ok(ConfirmOutcome::AlreadyConfirmed)
            }
            Some(registration) => {
                warn!(
                    "[Confirm] Payment {} arrived for registration {} in status {:?}; needs manual review",
                    provider_payment_id, registration_id, registration.payment_status
                );
                audit_closed_target(
                    state,
                    "registration",
                    registration_id,
                    provider_payment_id,
                    json!(registration.payment_status),
                )
                .await;
                Ok(ConfirmOutcome::NotConfirmable)
            }
            None => Err(ReconcileError::not_found(format!(
                "registration {}",
                registration_id
            ))),
        };
    }

    info!(
        "[Confirm] Registration {} paid by payment {}",
        registration_id, provider_payment_id
    );

    let Some(notifier) = state.notifier.as_ref() else {
        return Ok(ConfirmOutcome::Confirmed);
    };
    let registration = match state.store.get_registration(registration_id).await {
        Ok(Some(r)) => r,
        Ok(None) => return Ok(ConfirmOutcome::Confirmed),
        Err(e) => {
            warn!(
                "[Confirm] Could not reload registration {} for notification: {}",
                registration_id, e
            );
            return Ok(ConfirmOutcome::Confirmed);
        }
    };
    let event = state
        .store
        .get_event(&registration.event_id)
        .await
        .ok()
        .flatten();
    let Some(email) = registration.email.as_deref() else {
        return Ok(ConfirmOutcome::Confirmed);
    };
    let message = registration_confirmed(&RegistrationNotice {
        name: registration.name.clone(),
        event_title: event
            .as_ref()
            .map(|e| e.title.clone())
            .unwrap_or_else(|| "evento".to_string()),
        amount: event.map(|e| e.price).unwrap_or_default(),
    });
    if let Err(e) = notifier.send_email(email, &message.subject, &message.html).await {
        warn!(
            "[Confirm] Registration {} email failed: {}",
            registration_id, e
        );
    }
    Ok(ConfirmOutcome::Confirmed)
}

async fn audit_closed_target(
    state: &ReconcileState,
    entity: &str,
    entity_id: &str,
    provider_payment_id: &str,
    status: serde_json::Value,
) {
    let entry = AuditEntry::new(
        entity,
        Some(entity_id.to_string()),
        &format!("payment_on_closed_{}", entity),
        json!({ "provider_payment_id": provider_payment_id, "status": status }),
    );
    if let Err(e) = state.store.append_audit(entry).await {
        warn!("[Confirm] Audit for {} {} failed: {}", entity, entity_id, e);
    }
}

async fn run_booking_side_effects(state: &ReconcileState, booking_id: &str) {
    let booking = match state.store.get_booking(booking_id).await {
        Ok(Some(b)) => b,
        Ok(None) => {
            warn!("[Confirm] Booking {} vanished after confirmation", booking_id);
            return;
        }
        Err(e) => {
            warn!(
                "[Confirm] Could not reload booking {} for side effects: {}",
                booking_id, e
            );
            return;
        }
    };
    let service = state
        .store
        .get_service(&booking.service_id)
        .await
        .unwrap_or_else(|e| {
            warn!("[Confirm] Service lookup for booking {} failed: {}", booking_id, e);
            None
        });
    let professional = state
        .store
        .get_professional(&booking.professional_id)
        .await
        .unwrap_or_else(|e| {
            warn!(
                "[Confirm] Professional lookup for booking {} failed: {}",
                booking_id, e
            );
            None
        });

    let meeting = create_meeting(state, &booking, service.as_ref(), professional.as_ref()).await;
    send_booking_notifications(state, &booking, service.as_ref(), professional.as_ref(), meeting)
        .await;
}

/// Booking date + time in the clinic zone, as UTC.
pub fn booking_start(booking: &Booking, time_zone: &str) -> Option<DateTime<Utc>> {
    let tz: Tz = time_zone.parse().ok()?;
    let local = NaiveDateTime::new(booking.date, booking.start_time()?);
    tz.from_local_datetime(&local)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

async fn create_meeting(
    state: &ReconcileState,
    booking: &Booking,
    service: Option<&Service>,
    professional: Option<&Professional>,
) -> Option<MeetingInfo> {
    if let Some(link) = booking.meeting_link.clone() {
        return Some(MeetingInfo {
            link,
            password: booking.meeting_password.clone(),
            platform: booking
                .meeting_platform
                .clone()
                .unwrap_or_else(|| "zoom".to_string()),
        });
    }
    let meetings = state.meetings.as_ref()?;
    let Some(start) = booking_start(booking, state.clinic_time_zone()) else {
        warn!(
            "[Confirm] Booking {} has an unusable date/time ({} {}); no meeting created",
            booking.id, booking.date, booking.time
        );
        return None;
    };

    let topic = match professional {
        Some(p) => format!("Consulta - {} com {}", booking.patient_name, p.name),
        None => format!("Consulta - {}", booking.patient_name),
    };
    let request = MeetingRequest {
        topic,
        start,
        duration_minutes: service.and_then(|s| s.duration_minutes).unwrap_or(0),
        agenda: service.map(|s| s.name.clone()),
    };
    match meetings.create_meeting(request).await {
        Ok(created) => {
            let info = MeetingInfo {
                link: created.join_url,
                password: created.password,
                platform: created.platform,
            };
            if let Err(e) = state.store.set_booking_meeting(&booking.id, info.clone()).await {
                warn!(
                    "[Confirm] Meeting {} created but not saved on booking {}: {}",
                    created.meeting_id, booking.id, e
                );
            }
            Some(info)
        }
        Err(e) => {
            warn!(
                "[Confirm] Meeting creation for booking {} failed, link to follow manually: {}",
                booking.id, e
            );
            None
        }
    }
}

async fn send_booking_notifications(
    state: &ReconcileState,
    booking: &Booking,
    service: Option<&Service>,
    professional: Option<&Professional>,
    meeting: Option<MeetingInfo>,
) {
    if state.notifier.is_none() {
        return;
    }
    let notice = BookingNotice {
        patient_name: booking.patient_name.clone(),
        professional_name: professional
            .map(|p| p.name.clone())
            .unwrap_or_else(|| "profissional".to_string()),
        service_name: service
            .map(|s| s.name.clone())
            .unwrap_or_else(|| "Consulta".to_string()),
        date: booking.date,
        time: booking.time.clone(),
        amount: booking
            .valor_consulta
            .or_else(|| service.map(|s| s.price))
            .unwrap_or_default(),
        meeting_link: meeting.as_ref().map(|m| m.link.clone()),
        meeting_password: meeting.and_then(|m| m.password),
    };

    let patient = booking_confirmed_patient(&notice);
    dispatch(
        state,
        &booking.id,
        "patient",
        booking.patient_email.as_deref(),
        booking.patient_phone.as_deref(),
        &patient,
    )
    .await;

    if let Some(professional) = professional {
        let message = booking_confirmed_professional(&notice);
        dispatch(
            state,
            &booking.id,
            "professional",
            professional.email.as_deref(),
            professional.phone.as_deref(),
            &message,
        )
        .await;
    }
}

/// Email and SMS go out independently; neither failure stops the other.
async fn dispatch(
    state: &ReconcileState,
    booking_id: &str,
    recipient: &str,
    email: Option<&str>,
    phone: Option<&str>,
    message: &RenderedMessage,
) {
    let Some(notifier) = state.notifier.as_ref() else {
        return;
    };
    if let Some(email) = email.filter(|e| !e.is_empty()) {
        if let Err(e) = notifier
            .send_email(email, &message.subject, &message.html)
            .await
        {
            warn!(
                "[Confirm] Email to {} for booking {} failed: {}",
                recipient, booking_id, e
            );
        }
    }
    if let Some(phone) = phone.filter(|p| !p.is_empty()) {
        if let Err(e) = notifier.send_sms(phone, &message.text).await {
            warn!(
                "[Confirm] SMS to {} for booking {} failed: {}",
                recipient, booking_id, e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use psiclinic_store::BookingStatus;

    fn booking(time: &str) -> Booking {
        Booking {
            id: "b-1".into(),
            professional_id: "p-1".into(),
            service_id: "s-1".into(),
            date: NaiveDate::from_ymd_opt(2026, 11, 3).unwrap(),
            time: time.into(),
            status: BookingStatus::PendingPayment,
            patient_name: "Ana".into(),
            patient_email: None,
            patient_phone: None,
            valor_consulta: None,
            valor_repasse_profissional: None,
            marketplace_preference_id: None,
            meeting_link: None,
            meeting_password: None,
            meeting_platform: None,
        }
    }

    #[test]
    fn start_is_converted_from_clinic_time() {
        let start = booking_start(&booking("14:00"), "America/Sao_Paulo").unwrap();
        assert_eq!(start, Utc.with_ymd_and_hms(2026, 11, 3, 17, 0, 0).unwrap());
    }

    #[test]
    fn bad_time_or_zone_yields_none() {
        assert!(booking_start(&booking("2pm"), "America/Sao_Paulo").is_none());
        assert!(booking_start(&booking("14:00"), "Nowhere/City").is_none());
    }
}
