// --- File: crates/psiclinic_zoom/src/lib.rs ---

pub mod client;
pub mod error;
pub mod service;

pub use client::ZoomClient;
pub use error::ZoomError;
pub use service::ZoomMeetingService;
