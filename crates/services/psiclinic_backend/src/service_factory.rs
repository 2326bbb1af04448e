// --- File: crates/services/psiclinic_backend/src/service_factory.rs ---
//! Builds the reconciliation state from configuration.
//!
//! The store and Mercado Pago are mandatory. Zoom and the notifier are attached
//! only when their runtime flag is on and the section is present.
use psiclinic_config::AppConfig;
use psiclinic_mercadopago::{MercadoPagoClient, MercadoPagoError, MercadoPagoGateway};
use psiclinic_notify::Notifier;
use psiclinic_reconcile::ReconcileState;
use psiclinic_store::{build_store, StoreError};
use psiclinic_zoom::{ZoomClient, ZoomError, ZoomMeetingService};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum StartupError {
    #[error("store: {0}")]
    Store(#[from] StoreError),

    #[error("mercado pago: {0}")]
    MercadoPago(#[from] MercadoPagoError),

    #[error("zoom: {0}")]
    Zoom(#[from] ZoomError),
}

pub fn build_state(config: Arc<AppConfig>) -> Result<ReconcileState, StartupError> {
    let store = build_store(&config.store)?;

    let client = MercadoPagoClient::new(config.mercadopago.clone())?;
    info!("💳 Mercado Pago gateway ready ({})", config.mercadopago.api_base_url);
    if config.mercadopago.webhook_secret.is_none() {
        warn!("Webhook secret not configured; x-signature is not checked");
    }
    let mut state = ReconcileState::new(
        config.clone(),
        store,
        Arc::new(MercadoPagoGateway::new(client)),
    );

    match config.zoom_enabled() {
        Some(zoom) => {
            let client = ZoomClient::new(zoom.clone())?;
            state = state.with_meetings(Arc::new(ZoomMeetingService::new(client)));
            info!("📹 Zoom meetings enabled");
        }
        None if config.use_zoom => warn!("use_zoom is set but [zoom] is missing; meetings disabled"),
        None => info!("Zoom meetings disabled"),
    }

    match Notifier::from_config(&config) {
        Some(notifier) => {
            state = state.with_notifier(Arc::new(notifier));
            info!("✉️ Notifications enabled");
        }
        None => info!("Notifications disabled"),
    }

    Ok(state)
}
