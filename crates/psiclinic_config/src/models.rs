// --- File: crates/psiclinic_config/src/models.rs ---

use serde::{Deserialize, Serialize};

// --- General Server Config ---
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Origins allowed by the CORS layer. Empty means any origin.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

// --- Store Config ---
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Postgrest,
    Memory,
}

#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    /// Project URL, e.g. https://xyz.supabase.co
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub service_role_key: String, // Loaded via PSICLINIC_SECRET_STORE_SERVICE_ROLE_KEY or SUPABASE_SERVICE_ROLE_KEY
    #[serde(default = "default_proof_bucket")]
    pub proof_bucket: String,
}

fn default_proof_bucket() -> String {
    "refund-proofs".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            url: String::new(),
            service_role_key: String::new(),
            proof_bucket: default_proof_bucket(),
        }
    }
}

// --- Mercado Pago Config ---
// Holds non-secret Mercado Pago config. Access token and webhook secret come from env vars.
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MercadoPagoConfig {
    #[serde(default = "default_mp_api_base_url")]
    pub api_base_url: String,
    pub access_token: String,
    /// When set, webhook calls must carry a valid `x-signature` header.
    #[serde(default)]
    pub webhook_secret: Option<String>,
    #[serde(default)]
    pub notification_url: Option<String>,
    pub success_url: String,
    pub failure_url: String,
    pub pending_url: String,
    #[serde(default)]
    pub statement_descriptor: Option<String>,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_signature_tolerance_secs")]
    pub signature_tolerance_secs: i64,
    #[serde(default = "default_pix_expiration_minutes")]
    pub pix_expiration_minutes: i64,
}

fn default_mp_api_base_url() -> String {
    "https://api.mercadopago.com".to_string()
}

fn default_currency() -> String {
    "BRL".to_string()
}

fn default_signature_tolerance_secs() -> i64 {
    600
}

fn default_pix_expiration_minutes() -> i64 {
    30
}

// --- Zoom Config ---
// Server-to-server OAuth app. client_secret loaded via PSICLINIC_SECRET_ZOOM_CLIENT_SECRET.
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ZoomConfig {
    #[serde(default = "default_zoom_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_zoom_oauth_url")]
    pub oauth_url: String,
    pub account_id: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_zoom_user")]
    pub user_id: String,
    #[serde(default = "default_time_zone")]
    pub time_zone: String,
    #[serde(default = "default_meeting_minutes")]
    pub default_duration_minutes: u32,
}

fn default_zoom_api_base_url() -> String {
    "https://api.zoom.us/v2".to_string()
}

fn default_zoom_oauth_url() -> String {
    "https://zoom.us/oauth/token".to_string()
}

fn default_zoom_user() -> String {
    "me".to_string()
}

fn default_time_zone() -> String {
    "America/Sao_Paulo".to_string()
}

fn default_meeting_minutes() -> u32 {
    50
}

// --- Email Config ---
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EmailConfig {
    #[serde(default = "default_email_api_url")]
    pub api_url: String,
    pub api_key: String, // Loaded via PSICLINIC_SECRET_EMAIL_API_KEY or RESEND_API_KEY
    pub from: String,
}

fn default_email_api_url() -> String {
    "https://api.resend.com/emails".to_string()
}

// --- Twilio Config ---
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TwilioConfig {
    #[serde(default = "default_twilio_api_base_url")]
    pub api_base_url: String,
    pub account_sid: String,
    pub auth_token: String,
    pub from_number: String,
    /// Sender for WhatsApp messages, without the `whatsapp:` prefix.
    #[serde(default)]
    pub whatsapp_from: Option<String>,
}

fn default_twilio_api_base_url() -> String {
    "https://api.twilio.com/2010-04-01".to_string()
}

// --- Checkout Config ---
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CheckoutConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,
    /// Spawn a server-side status watcher after every PIX payment is created.
    #[serde(default = "default_true")]
    pub watch_pix_payments: bool,
}

fn default_poll_interval_secs() -> u64 {
    3
}

fn default_poll_timeout_secs() -> u64 {
    30 * 60
}

fn default_true() -> bool {
    true
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            poll_timeout_secs: default_poll_timeout_secs(),
            watch_pix_payments: true,
        }
    }
}

// --- Refund Config ---
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RefundConfig {
    #[serde(default = "default_max_proof_bytes")]
    pub max_proof_bytes: usize,
    #[serde(default = "default_notify_max_attempts")]
    pub notify_max_attempts: u32,
    #[serde(default = "default_notify_retry_delay_ms")]
    pub notify_retry_delay_ms: u64,
}

fn default_max_proof_bytes() -> usize {
    5 * 1024 * 1024
}

fn default_notify_max_attempts() -> u32 {
    3
}

fn default_notify_retry_delay_ms() -> u64 {
    500
}

impl Default for RefundConfig {
    fn default() -> Self {
        Self {
            max_proof_bytes: default_max_proof_bytes(),
            notify_max_attempts: default_notify_max_attempts(),
            notify_retry_delay_ms: default_notify_retry_delay_ms(),
        }
    }
}

// --- Logging Config ---
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct LoggingConfig {
    /// Filter directive used when RUST_LOG is unset, e.g. "info,psiclinic_reconcile=debug".
    #[serde(default)]
    pub level: Option<String>,
    /// When set, logs are also written to a daily-rolling file in this directory.
    #[serde(default)]
    pub directory: Option<String>,
}

// --- Unified App Configuration ---
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    // Server config is mandatory
    pub server: ServerConfig,

    // --- Runtime Flags (optional in config file, default to false) ---
    #[serde(default)]
    pub use_zoom: bool,
    #[serde(default)]
    pub use_email: bool,
    #[serde(default)]
    pub use_twilio: bool,

    #[serde(default)]
    pub store: StoreConfig,
    pub mercadopago: MercadoPagoConfig,

    // --- Optional Feature Configurations ---
    #[serde(default)]
    pub zoom: Option<ZoomConfig>,
    #[serde(default)]
    pub email: Option<EmailConfig>,
    #[serde(default)]
    pub twilio: Option<TwilioConfig>,

    #[serde(default)]
    pub checkout: CheckoutConfig,
    #[serde(default)]
    pub refunds: RefundConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Zoom section, only when the runtime flag is on.
    pub fn zoom_enabled(&self) -> Option<&ZoomConfig> {
        self.zoom.as_ref().filter(|_| self.use_zoom)
    }

    pub fn email_enabled(&self) -> Option<&EmailConfig> {
        self.email.as_ref().filter(|_| self.use_email)
    }

    pub fn twilio_enabled(&self) -> Option<&TwilioConfig> {
        self.twilio.as_ref().filter(|_| self.use_twilio)
    }
}
