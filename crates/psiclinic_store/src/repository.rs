//! The store abstraction used by the reconciliation workflow.
//!
//! Every conditional write is a single compare-and-set on the backing row, so
//! concurrent webhook deliveries and status polls cannot both win a transition.

use psiclinic_common::services::BoxFuture;
use serde_json::Value;

use crate::error::StoreError;
use crate::models::{
    AuditEntry, Booking, Credit, Event, EventRegistration, MeetingInfo, NewPayment, Payment,
    PaymentUpdate, Professional, RefundRecord, Service,
};

pub trait ClinicStore: Send + Sync {
    // --- bookings ---
    fn get_booking(&self, id: &str) -> BoxFuture<'_, Option<Booking>, StoreError>;

    /// Remember which checkout preference was issued for a booking.
    fn set_booking_preference(&self, id: &str, preference_id: &str)
        -> BoxFuture<'_, (), StoreError>;

    /// `pending_payment -> confirmed`. Returns `false` when the booking was not pending.
    fn confirm_booking_if_pending(&self, id: &str) -> BoxFuture<'_, bool, StoreError>;

    fn set_booking_meeting(&self, id: &str, meeting: MeetingInfo)
        -> BoxFuture<'_, (), StoreError>;

    // --- catalogue ---
    fn get_service(&self, id: &str) -> BoxFuture<'_, Option<Service>, StoreError>;

    fn get_professional(&self, id: &str) -> BoxFuture<'_, Option<Professional>, StoreError>;

    fn get_event(&self, id: &str) -> BoxFuture<'_, Option<Event>, StoreError>;

    // --- event registrations ---
    fn get_registration(&self, id: &str) -> BoxFuture<'_, Option<EventRegistration>, StoreError>;

    fn set_registration_preference(
        &self,
        id: &str,
        preference_id: &str,
    ) -> BoxFuture<'_, (), StoreError>;

    /// Marks the registration paid unless it already is. Returns whether this call did it.
    fn confirm_registration_if_pending(
        &self,
        id: &str,
        provider_payment_id: &str,
    ) -> BoxFuture<'_, bool, StoreError>;

    // --- payments ---
    fn get_payment(&self, id: &str) -> BoxFuture<'_, Option<Payment>, StoreError>;

    fn find_payment_by_provider_id(
        &self,
        provider_payment_id: &str,
    ) -> BoxFuture<'_, Option<Payment>, StoreError>;

    /// Fails with [`StoreError::Conflict`] when the provider id is already recorded.
    fn insert_payment(&self, payment: NewPayment) -> BoxFuture<'_, Payment, StoreError>;

    /// Fails with [`StoreError::InvalidState`] once the row is refunded.
    fn update_payment_status(&self, id: &str, update: PaymentUpdate)
        -> BoxFuture<'_, Payment, StoreError>;

    /// Moves an `approved` row to `refunded`. Any other status fails with
    /// [`StoreError::InvalidState`].
    fn record_refund(&self, id: &str, refund: RefundRecord) -> BoxFuture<'_, Payment, StoreError>;

    /// Replaces refund metadata; allowed on refunded rows.
    fn update_refund_metadata(&self, id: &str, metadata: Value) -> BoxFuture<'_, (), StoreError>;

    // --- credits ---
    fn get_credit(&self, id: &str) -> BoxFuture<'_, Option<Credit>, StoreError>;

    fn reserve_credit(&self, id: &str, token: &str) -> BoxFuture<'_, Credit, StoreError>;

    fn consume_credit(
        &self,
        id: &str,
        token: &str,
        booking_id: &str,
    ) -> BoxFuture<'_, Credit, StoreError>;

    fn release_credit(&self, id: &str, token: &str) -> BoxFuture<'_, Credit, StoreError>;

    // --- audit + files ---
    fn append_audit(&self, entry: AuditEntry) -> BoxFuture<'_, (), StoreError>;

    /// Stores a refund proof file and returns its object path.
    fn upload_refund_proof(
        &self,
        path: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> BoxFuture<'_, String, StoreError>;
}
