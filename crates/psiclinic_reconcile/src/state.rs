//! Shared state handed to every workflow function and handler.

use psiclinic_common::services::{MeetingService, NotificationService, PaymentGateway};
use psiclinic_config::AppConfig;
use psiclinic_store::ClinicStore;
use std::sync::Arc;
use tokio::sync::watch;

/// Time zone used to interpret booking dates when Zoom does not set one.
pub const DEFAULT_CLINIC_TIME_ZONE: &str = "America/Sao_Paulo";

pub struct ReconcileState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn ClinicStore>,
    pub payments: Arc<dyn PaymentGateway>,
    pub meetings: Option<Arc<dyn MeetingService>>,
    pub notifier: Option<Arc<dyn NotificationService>>,
    shutdown: watch::Sender<bool>,
}

impl ReconcileState {
    pub fn new(
        config: Arc<AppConfig>,
        store: Arc<dyn ClinicStore>,
        payments: Arc<dyn PaymentGateway>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            config,
            store,
            payments,
            meetings: None,
            notifier: None,
            shutdown,
        }
    }

    pub fn with_meetings(mut self, meetings: Arc<dyn MeetingService>) -> Self {
        self.meetings = Some(meetings);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationService>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Receiver that flips to `true` when background watchers must stop.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Stops every running payment watcher.
    pub fn cancel_watchers(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn clinic_time_zone(&self) -> &str {
        self.config
            .zoom
            .as_ref()
            .map(|z| z.time_zone.as_str())
            .unwrap_or(DEFAULT_CLINIC_TIME_ZONE)
    }
}
