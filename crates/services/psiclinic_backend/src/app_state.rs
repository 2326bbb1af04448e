// --- File: crates/services/psiclinic_backend/src/app_state.rs ---
use psiclinic_config::AppConfig;
use psiclinic_reconcile::ReconcileState;
use std::sync::Arc;

use crate::service_factory::{build_state, StartupError};

/// Application state shared by the router and the shutdown hook.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub reconcile: Arc<ReconcileState>,
}

impl AppState {
    /// Builds the store and providers selected by `config`.
    pub fn new(config: Arc<AppConfig>) -> Result<Self, StartupError> {
        let reconcile = Arc::new(build_state(config.clone())?);
        Ok(Self { config, reconcile })
    }

    /// Stops background payment watchers.
    pub fn shutdown(&self) {
        self.reconcile.cancel_watchers();
    }
}
