// --- File: crates/psiclinic_notify/src/lib.rs ---

pub mod email;
pub mod error;
pub mod service;
pub mod templates;
pub mod twilio;

pub use email::EmailSender;
pub use error::NotifyError;
pub use service::Notifier;
pub use templates::{BookingNotice, RefundNotice, RegistrationNotice, RenderedMessage};
pub use twilio::TwilioMessenger;
