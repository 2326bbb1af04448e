// --- File: crates/psiclinic_reconcile/src/lib.rs ---
//! Booking-payment reconciliation.
//!
//! Checkout creates provider payments for pending bookings and event
//! registrations. The webhook and the status poller both feed provider state
//! through [`reconcile::reconcile_payment`], which confirms the target exactly
//! once through [`confirm`]. Credits and refunds sit beside that path.

pub mod checkout;
pub mod confirm;
pub mod credits;
#[cfg(feature = "openapi")]
pub mod doc;
pub mod error;
pub mod handlers;
pub mod poll;
pub mod reconcile;
pub mod reference;
pub mod refunds;
pub mod routes;
pub mod state;
pub mod webhook;

// Re-export for main backend
pub use confirm::{confirm_booking, confirm_registration, ConfirmOutcome};
pub use error::ReconcileError;
pub use poll::{poll_payment_status, spawn_watcher, watch_payment, PollTick, WatchOutcome};
pub use reference::PaymentTarget;
pub use routes::routes;
pub use state::ReconcileState;
pub use webhook::{handle_notification, WebhookOutcome, WebhookQuery, WebhookRequest};
