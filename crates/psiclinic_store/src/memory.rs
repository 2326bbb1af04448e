//! In-process store for tests and local development (`store.backend = "memory"`).
//!
//! Each operation runs under a single mutex, which gives the same
//! compare-and-set guarantees as the guarded PATCH requests of the PostgREST
//! store. Writes to a table can be made to fail with [`MemoryStore::fail_writes`].

use chrono::{DateTime, Utc};
use psiclinic_common::services::BoxFuture;
use psiclinic_common::PaymentStatus;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::future::ready;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::*;
use crate::repository::ClinicStore;

#[derive(Debug, Clone)]
pub struct AuditRecord {
    pub entry: AuditEntry,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct StoredProof {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Default)]
struct Tables {
    bookings: HashMap<String, Booking>,
    services: HashMap<String, Service>,
    professionals: HashMap<String, Professional>,
    events: HashMap<String, Event>,
    registrations: HashMap<String, EventRegistration>,
    payments: Vec<Payment>,
    credits: HashMap<String, Credit>,
    audit: Vec<AuditRecord>,
    proofs: HashMap<String, StoredProof>,
    failing: HashSet<String>,
}

impl Tables {
    fn writable(&self, table: &str) -> Result<(), StoreError> {
        if self.failing.contains(table) {
            return Err(StoreError::ApiError {
                status_code: 503,
                message: format!("writes to {table} are unavailable"),
            });
        }
        Ok(())
    }

    fn payment_mut(&mut self, id: &str) -> Result<&mut Payment, StoreError> {
        self.payments
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("payment {id}")))
    }

    fn credit_mut(&mut self, id: &str) -> Result<&mut Credit, StoreError> {
        self.credits
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("credit {id}")))
    }
}

fn done<'a, T: Send + 'a>(result: Result<T, StoreError>) -> BoxFuture<'a, T, StoreError> {
    Box::pin(ready(result))
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make every write to `table` fail until [`MemoryStore::restore_writes`] is called.
    pub fn fail_writes(&self, table: &str) {
        self.tables().failing.insert(table.to_string());
    }

    pub fn restore_writes(&self, table: &str) {
        self.tables().failing.remove(table);
    }

    // --- seeding ---

    pub fn insert_booking(&self, booking: Booking) {
        self.tables().bookings.insert(booking.id.clone(), booking);
    }

    pub fn insert_service(&self, service: Service) {
        self.tables().services.insert(service.id.clone(), service);
    }

    pub fn insert_professional(&self, professional: Professional) {
        self.tables()
            .professionals
            .insert(professional.id.clone(), professional);
    }

    pub fn insert_event(&self, event: Event) {
        self.tables().events.insert(event.id.clone(), event);
    }

    pub fn insert_registration(&self, registration: EventRegistration) {
        self.tables()
            .registrations
            .insert(registration.id.clone(), registration);
    }

    pub fn insert_credit(&self, credit: Credit) {
        self.tables().credits.insert(credit.id.clone(), credit);
    }

    /// Seeds a payment row as-is.
    pub fn insert_payment_row(&self, payment: Payment) {
        self.tables().payments.push(payment);
    }

    // --- inspection ---

    pub fn booking(&self, id: &str) -> Option<Booking> {
        self.tables().bookings.get(id).cloned()
    }

    pub fn registration(&self, id: &str) -> Option<EventRegistration> {
        self.tables().registrations.get(id).cloned()
    }

    pub fn credit(&self, id: &str) -> Option<Credit> {
        self.tables().credits.get(id).cloned()
    }

    pub fn payments(&self) -> Vec<Payment> {
        self.tables().payments.clone()
    }

    pub fn audit_log(&self) -> Vec<AuditRecord> {
        self.tables().audit.clone()
    }

    pub fn proof(&self, path: &str) -> Option<StoredProof> {
        self.tables().proofs.get(path).cloned()
    }
}

impl ClinicStore for MemoryStore {
    fn get_booking(&self, id: &str) -> BoxFuture<'_, Option<Booking>, StoreError> {
        done(Ok(self.tables().bookings.get(id).cloned()))
    }

    fn set_booking_preference(
        &self,
        id: &str,
        preference_id: &str,
    ) -> BoxFuture<'_, (), StoreError> {
        let mut tables = self.tables();
        let result = tables.writable(BOOKINGS).and_then(|_| {
            let booking = tables
                .bookings
                .get_mut(id)
                .ok_or_else(|| StoreError::NotFound(format!("booking {id}")))?;
            booking.marketplace_preference_id = Some(preference_id.to_string());
            Ok(())
        });
        done(result)
    }

    fn confirm_booking_if_pending(&self, id: &str) -> BoxFuture<'_, bool, StoreError> {
        let mut tables = self.tables();
        let result = tables.writable(BOOKINGS).map(|_| {
            match tables.bookings.get_mut(id) {
                Some(b) if b.status == BookingStatus::PendingPayment => {
                    b.status = BookingStatus::Confirmed;
                    true
                }
                _ => false,
            }
        });
        done(result)
    }

    fn set_booking_meeting(&self, id: &str, meeting: MeetingInfo) -> BoxFuture<'_, (), StoreError> {
        let mut tables = self.tables();
        let result = tables.writable(BOOKINGS).and_then(|_| {
            let booking = tables
                .bookings
                .get_mut(id)
                .ok_or_else(|| StoreError::NotFound(format!("booking {id}")))?;
            booking.meeting_link = Some(meeting.link);
            booking.meeting_password = meeting.password;
            booking.meeting_platform = Some(meeting.platform);
            Ok(())
        });
        done(result)
    }

    fn get_service(&self, id: &str) -> BoxFuture<'_, Option<Service>, StoreError> {
        done(Ok(self.tables().services.get(id).cloned()))
    }

    fn get_professional(&self, id: &str) -> BoxFuture<'_, Option<Professional>, StoreError> {
        done(Ok(self.tables().professionals.get(id).cloned()))
    }

    fn get_event(&self, id: &str) -> BoxFuture<'_, Option<Event>, StoreError> {
        done(Ok(self.tables().events.get(id).cloned()))
    }

    fn get_registration(&self, id: &str) -> BoxFuture<'_, Option<EventRegistration>, StoreError> {
        done(Ok(self.tables().registrations.get(id).cloned()))
    }

    fn set_registration_preference(
        &self,
        id: &str,
        preference_id: &str,
    ) -> BoxFuture<'_, (), StoreError> {
        let mut tables = self.tables();
        let result = tables.writable(REGISTRATIONS).and_then(|_| {
            let registration = tables
                .registrations
                .get_mut(id)
                .ok_or_else(|| StoreError::NotFound(format!("registration {id}")))?;
            registration.marketplace_preference_id = Some(preference_id.to_string());
            Ok(())
        });
        done(result)
    }

    fn confirm_registration_if_pending(
        &self,
        id: &str,
        provider_payment_id: &str,
    ) -> BoxFuture<'_, bool, StoreError> {
        let mut tables = self.tables();
        let result = tables.writable(REGISTRATIONS).map(|_| {
            match tables.registrations.get_mut(id) {
                Some(r) if r.payment_status == RegistrationPaymentStatus::Pending => {
                    r.payment_status = RegistrationPaymentStatus::Paid;
                    r.payment_id = Some(provider_payment_id.to_string());
                    true
                }
                _ => false,
            }
        });
        done(result)
    }

    fn get_payment(&self, id: &str) -> BoxFuture<'_, Option<Payment>, StoreError> {
        done(Ok(self
            .tables()
            .payments
            .iter()
            .find(|p| p.id == id)
            .cloned()))
    }

    fn find_payment_by_provider_id(
        &self,
        provider_payment_id: &str,
    ) -> BoxFuture<'_, Option<Payment>, StoreError> {
        done(Ok(self
            .tables()
            .payments
            .iter()
            .find(|p| p.provider_payment_id == provider_payment_id)
            .cloned()))
    }

    fn insert_payment(&self, payment: NewPayment) -> BoxFuture<'_, Payment, StoreError> {
        let mut tables = self.tables();
        let result = tables.writable(PAYMENTS).and_then(|_| {
            if tables
                .payments
                .iter()
                .any(|p| p.provider_payment_id == payment.provider_payment_id)
            {
                return Err(StoreError::Conflict(format!(
                    "payment {} already recorded",
                    payment.provider_payment_id
                )));
            }
            let row = Payment {
                id: Uuid::new_v4().to_string(),
                booking_id: payment.booking_id,
                registration_id: payment.registration_id,
                provider_payment_id: payment.provider_payment_id,
                status: payment.status,
                amount: payment.amount,
                method: payment.method,
                raw_payload: payment.raw_payload,
                refund_id: None,
                refund_amount: None,
                refund_status: None,
                refund_date: None,
                refund_metadata: None,
                created_at: Some(Utc::now()),
            };
            tables.payments.push(row.clone());
            Ok(row)
        });
        done(result)
    }

    fn update_payment_status(
        &self,
        id: &str,
        update: PaymentUpdate,
    ) -> BoxFuture<'_, Payment, StoreError> {
        let mut tables = self.tables();
        let result = tables.writable(PAYMENTS).and_then(|_| {
            let payment = tables.payment_mut(id)?;
            if payment.status == PaymentStatus::Refunded {
                return Err(StoreError::InvalidState(format!(
                    "payment {id} is already refunded"
                )));
            }
            payment.status = update.status;
            if update.raw_payload.is_some() {
                payment.raw_payload = update.raw_payload;
            }
            if update.booking_id.is_some() {
                payment.booking_id = update.booking_id;
            }
            if update.registration_id.is_some() {
                payment.registration_id = update.registration_id;
            }
            if let Some(amount) = update.amount {
                payment.amount = amount;
            }
            Ok(payment.clone())
        });
        done(result)
    }

    fn record_refund(&self, id: &str, refund: RefundRecord) -> BoxFuture<'_, Payment, StoreError> {
        let mut tables = self.tables();
        let result = tables.writable(PAYMENTS).and_then(|_| {
            let payment = tables.payment_mut(id)?;
            match payment.status {
                PaymentStatus::Approved => {}
                PaymentStatus::Refunded => {
                    return Err(StoreError::InvalidState(format!(
                        "payment {id} is already refunded"
                    )))
                }
                other => {
                    return Err(StoreError::InvalidState(format!(
                        "payment {id} is {other}; only approved payments can be refunded"
                    )))
                }
            }
            payment.status = PaymentStatus::Refunded;
            payment.refund_id = refund.refund_id;
            payment.refund_amount = Some(refund.amount);
            payment.refund_status = Some(refund.status);
            payment.refund_date = Some(Utc::now());
            payment.refund_metadata = Some(refund.metadata);
            Ok(payment.clone())
        });
        done(result)
    }

    fn update_refund_metadata(&self, id: &str, metadata: Value) -> BoxFuture<'_, (), StoreError> {
        let mut tables = self.tables();
        let result = tables.writable(PAYMENTS).and_then(|_| {
            tables.payment_mut(id)?.refund_metadata = Some(metadata);
            Ok(())
        });
        done(result)
    }

    fn get_credit(&self, id: &str) -> BoxFuture<'_, Option<Credit>, StoreError> {
        done(Ok(self.tables().credits.get(id).cloned()))
    }

    fn reserve_credit(&self, id: &str, token: &str) -> BoxFuture<'_, Credit, StoreError> {
        let mut tables = self.tables();
        let result = tables.writable(CREDITS).and_then(|_| {
            let credit = tables.credit_mut(id)?;
            credit.reserve(token, Utc::now())?;
            Ok(credit.clone())
        });
        done(result)
    }

    fn consume_credit(
        &self,
        id: &str,
        token: &str,
        booking_id: &str,
    ) -> BoxFuture<'_, Credit, StoreError> {
        let mut tables = self.tables();
        let result = tables.writable(CREDITS).and_then(|_| {
            let credit = tables.credit_mut(id)?;
            credit.consume(token, booking_id, Utc::now())?;
            Ok(credit.clone())
        });
        done(result)
    }

    fn release_credit(&self, id: &str, token: &str) -> BoxFuture<'_, Credit, StoreError> {
        let mut tables = self.tables();
        let result = tables.writable(CREDITS).and_then(|_| {
            let credit = tables.credit_mut(id)?;
            credit.release(token)?;
            Ok(credit.clone())
        });
        done(result)
    }

    fn append_audit(&self, entry: AuditEntry) -> BoxFuture<'_, (), StoreError> {
        let mut tables = self.tables();
        let result = tables.writable(LOGS).map(|_| {
            tables.audit.push(AuditRecord {
                entry,
                created_at: Utc::now(),
            });
        });
        done(result)
    }

    fn upload_refund_proof(
        &self,
        path: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> BoxFuture<'_, String, StoreError> {
        let mut tables = self.tables();
        let result = tables.writable("storage").and_then(|_| {
            if tables.proofs.contains_key(path) {
                return Err(StoreError::Conflict(format!("object {path} already exists")));
            }
            tables.proofs.insert(
                path.to_string(),
                StoredProof {
                    content_type: content_type.to_string(),
                    bytes,
                },
            );
            Ok(path.to_string())
        });
        done(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use serde_json::json;

    fn booking(id: &str) -> Booking {
        Booking {
            id: id.into(),
            professional_id: "p-1".into(),
            service_id: "s-1".into(),
            date: NaiveDate::from_ymd_opt(2026, 11, 3).unwrap(),
            time: "14:00".into(),
            status: BookingStatus::PendingPayment,
            patient_name: "Ana".into(),
            patient_email: Some("ana@example.com".into()),
            patient_phone: None,
            valor_consulta: None,
            valor_repasse_profissional: None,
            marketplace_preference_id: None,
            meeting_link: None,
            meeting_password: None,
            meeting_platform: None,
        }
    }

    fn new_payment(provider_id: &str) -> NewPayment {
        NewPayment {
            booking_id: Some("b-1".into()),
            registration_id: None,
            provider_payment_id: provider_id.into(),
            status: PaymentStatus::Pending,
            amount: Decimal::new(15000, 2),
            method: Some("pix".into()),
            raw_payload: None,
        }
    }

    #[tokio::test]
    async fn only_first_confirmation_wins() {
        let store = MemoryStore::new();
        store.insert_booking(booking("b-1"));

        assert!(store.confirm_booking_if_pending("b-1").await.unwrap());
        assert!(!store.confirm_booking_if_pending("b-1").await.unwrap());
        assert!(!store.confirm_booking_if_pending("missing").await.unwrap());
        assert_eq!(store.booking("b-1").unwrap().status, BookingStatus::Confirmed);
    }

    #[tokio::test]
    async fn duplicate_provider_id_is_a_conflict() {
        let store = MemoryStore::new();
        store.insert_payment(new_payment("mp-1")).await.unwrap();
        let err = store.insert_payment(new_payment("mp-1")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(store.payments().len(), 1);
    }

    fn refund_record(amount: Decimal) -> RefundRecord {
        RefundRecord {
            refund_id: Some("rf-1".into()),
            amount,
            status: "approved".into(),
            metadata: json!({}),
        }
    }

    #[tokio::test]
    async fn unsettled_payment_cannot_be_refunded() {
        let store = MemoryStore::new();
        let row = store.insert_payment(new_payment("mp-1")).await.unwrap();
        let err = store
            .record_refund(&row.id, refund_record(row.amount))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidState(_)));
        let stored = store.get_payment(&row.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Pending);
        assert!(stored.refund_id.is_none());
    }

    #[tokio::test]
    async fn refunded_payment_only_accepts_metadata() {
        let store = MemoryStore::new();
        let row = store
            .insert_payment(NewPayment {
                status: PaymentStatus::Approved,
                ..new_payment("mp-1")
            })
            .await
            .unwrap();
        store
            .record_refund(
                &row.id,
                RefundRecord {
                    refund_id: Some("rf-1".into()),
                    amount: row.amount,
                    status: "approved".into(),
                    metadata: json!({}),
                },
            )
            .await
            .unwrap();

        let update = PaymentUpdate {
            status: PaymentStatus::Approved,
            raw_payload: None,
            booking_id: None,
            registration_id: None,
            amount: None,
        };
        assert!(matches!(
            store.update_payment_status(&row.id, update).await,
            Err(StoreError::InvalidState(_))
        ));
        store
            .update_refund_metadata(&row.id, json!({"note": "ok"}))
            .await
            .unwrap();
        let stored = store.get_payment(&row.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Refunded);
        assert_eq!(stored.refund_metadata, Some(json!({"note": "ok"})));
    }

    #[tokio::test]
    async fn injected_failures_hit_only_that_table() {
        let store = MemoryStore::new();
        store.fail_writes(LOGS);
        let entry = AuditEntry::new("payment", None, "mp_webhook", json!({}));
        assert!(store.append_audit(entry.clone()).await.is_err());
        assert!(store.insert_payment(new_payment("mp-2")).await.is_ok());

        store.restore_writes(LOGS);
        store.append_audit(entry).await.unwrap();
        assert_eq!(store.audit_log().len(), 1);
    }
}
