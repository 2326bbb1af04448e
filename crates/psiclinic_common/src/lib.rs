// --- File: crates/psiclinic_common/src/lib.rs ---

pub mod error; // Error handling
pub mod http; // HTTP utilities
pub mod logging; // Logging utilities
pub mod models; // Shared domain enums and money helpers
pub mod services; // Provider abstractions

pub use error::{external_service_error, ClinicError, HttpStatusCode, ProviderError};

pub use http::{
    client::{create_client, HTTP_CLIENT},
    IntoHttpResponse,
};

pub use logging::{init_from_config, log_error};

pub use models::{format_brl, round_money, PaymentStatus};
