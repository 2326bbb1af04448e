// --- File: crates/psiclinic_mercadopago/src/lib.rs ---

pub mod client;
pub mod error;
pub mod models;
pub mod service;
pub mod signature;
pub mod status;

pub use client::MercadoPagoClient;
pub use error::MercadoPagoError;
pub use service::MercadoPagoGateway;
pub use signature::{verify_webhook_signature, verify_webhook_signature_at};
pub use status::{map_status, rejection_message};
