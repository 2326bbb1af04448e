//! Row types for the clinic tables.
//!
//! Field names follow the column names of the hosted schema; a few Portuguese
//! column names are mapped with `serde(rename)`.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use psiclinic_common::PaymentStatus;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::StoreError;

pub const BOOKINGS: &str = "bookings";
pub const SERVICES: &str = "services";
pub const PROFESSIONALS: &str = "professionals";
pub const EVENTS: &str = "eventos";
pub const REGISTRATIONS: &str = "inscricoes_eventos";
pub const PAYMENTS: &str = "payments";
pub const CREDITS: &str = "credits";
pub const LOGS: &str = "logs";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    PendingPayment,
    Confirmed,
    CancelledByPatient,
    CancelledByProfessional,
    Completed,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: String,
    pub professional_id: String,
    pub service_id: String,
    pub date: NaiveDate,
    /// "HH:MM" or "HH:MM:SS", clinic local time.
    pub time: String,
    pub status: BookingStatus,
    pub patient_name: String,
    #[serde(default)]
    pub patient_email: Option<String>,
    #[serde(default)]
    pub patient_phone: Option<String>,
    #[serde(default)]
    pub valor_consulta: Option<Decimal>,
    #[serde(default)]
    pub valor_repasse_profissional: Option<Decimal>,
    #[serde(default)]
    pub marketplace_preference_id: Option<String>,
    #[serde(default)]
    pub meeting_link: Option<String>,
    #[serde(default)]
    pub meeting_password: Option<String>,
    #[serde(default)]
    pub meeting_platform: Option<String>,
}

impl Booking {
    pub fn start_time(&self) -> Option<NaiveTime> {
        NaiveTime::parse_from_str(&self.time, "%H:%M:%S")
            .or_else(|_| NaiveTime::parse_from_str(&self.time, "%H:%M"))
            .ok()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub id: String,
    pub name: String,
    pub price: Decimal,
    #[serde(default)]
    pub duration_minutes: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Professional {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    #[serde(rename = "titulo")]
    pub title: String,
    #[serde(rename = "valor")]
    pub price: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationPaymentStatus {
    #[default]
    Pending,
    Paid,
    Refunded,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRegistration {
    pub id: String,
    #[serde(rename = "evento_id")]
    pub event_id: String,
    #[serde(rename = "nome")]
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, rename = "telefone")]
    pub phone: Option<String>,
    #[serde(default)]
    pub payment_status: RegistrationPaymentStatus,
    #[serde(default)]
    pub payment_id: Option<String>,
    #[serde(default)]
    pub marketplace_preference_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: String,
    #[serde(default)]
    pub booking_id: Option<String>,
    #[serde(default, rename = "inscricao_id")]
    pub registration_id: Option<String>,
    #[serde(rename = "mp_payment_id")]
    pub provider_payment_id: String,
    pub status: PaymentStatus,
    pub amount: Decimal,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub raw_payload: Option<Value>,
    #[serde(default)]
    pub refund_id: Option<String>,
    #[serde(default)]
    pub refund_amount: Option<Decimal>,
    #[serde(default)]
    pub refund_status: Option<String>,
    #[serde(default)]
    pub refund_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub refund_metadata: Option<Value>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPayment {
    pub booking_id: Option<String>,
    #[serde(rename = "inscricao_id")]
    pub registration_id: Option<String>,
    #[serde(rename = "mp_payment_id")]
    pub provider_payment_id: String,
    pub status: PaymentStatus,
    pub amount: Decimal,
    pub method: Option<String>,
    pub raw_payload: Option<Value>,
}

/// Status write for an existing payment row. Links are only written when set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentUpdate {
    pub status: PaymentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_payload: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub booking_id: Option<String>,
    #[serde(
        rename = "inscricao_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub registration_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<Decimal>,
}

/// Refund fields written when a payment moves to `refunded`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundRecord {
    pub refund_id: Option<String>,
    pub amount: Decimal,
    pub status: String,
    pub metadata: Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeetingInfo {
    pub link: String,
    pub password: Option<String>,
    pub platform: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditStatus {
    Available,
    Reserved,
    Consumed,
    #[serde(other)]
    Other,
}

impl fmt::Display for CreditStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CreditStatus::Available => "available",
            CreditStatus::Reserved => "reserved",
            CreditStatus::Consumed => "consumed",
            CreditStatus::Other => "other",
        };
        f.write_str(s)
    }
}

/// Prepaid balance that can settle one booking.
///
/// `available -> reserved -> consumed`, or `reserved -> available` on release.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credit {
    pub id: String,
    #[serde(default)]
    pub patient_email: Option<String>,
    pub amount: Decimal,
    #[serde(default = "default_currency")]
    pub currency: String,
    pub status: CreditStatus,
    #[serde(default)]
    pub reservation_token: Option<String>,
    #[serde(default)]
    pub booking_id: Option<String>,
    #[serde(default)]
    pub reserved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub consumed_at: Option<DateTime<Utc>>,
}

fn default_currency() -> String {
    "BRL".to_string()
}

impl Credit {
    pub fn reserve(&mut self, token: &str, now: DateTime<Utc>) -> Result<(), StoreError> {
        if self.status != CreditStatus::Available {
            return Err(StoreError::Conflict(format!(
                "credit {} is {}",
                self.id, self.status
            )));
        }
        self.status = CreditStatus::Reserved;
        self.reservation_token = Some(token.to_string());
        self.reserved_at = Some(now);
        Ok(())
    }

    pub fn consume(
        &mut self,
        token: &str,
        booking_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.check_reservation(token)?;
        self.status = CreditStatus::Consumed;
        self.booking_id = Some(booking_id.to_string());
        self.consumed_at = Some(now);
        Ok(())
    }

    pub fn release(&mut self, token: &str) -> Result<(), StoreError> {
        self.check_reservation(token)?;
        self.status = CreditStatus::Available;
        self.reservation_token = None;
        self.reserved_at = None;
        Ok(())
    }

    fn check_reservation(&self, token: &str) -> Result<(), StoreError> {
        if self.status != CreditStatus::Reserved {
            return Err(StoreError::InvalidState(format!(
                "credit {} is {}, not reserved",
                self.id, self.status
            )));
        }
        if self.reservation_token.as_deref() != Some(token) {
            return Err(StoreError::TokenMismatch(self.id.clone()));
        }
        Ok(())
    }
}

/// One row of the audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub action: String,
    pub payload: Value,
}

impl AuditEntry {
    pub fn new(entity_type: &str, entity_id: Option<String>, action: &str, payload: Value) -> Self {
        Self {
            entity_type: entity_type.to_string(),
            entity_id,
            action: action.to_string(),
            payload,
        }
    }
}
