//! Payment status polling.
//!
//! [`poll_payment_status`] is one tick: fetch from the provider, reconcile,
//! report. [`watch_payment`] repeats it on a fixed interval until the payment is
//! terminal, the timeout passes, or the shutdown signal fires.

use psiclinic_common::PaymentStatus;
use psiclinic_mercadopago::rejection_message;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{info, warn};

use crate::confirm::ConfirmOutcome;
use crate::error::ReconcileError;
use crate::reconcile::reconcile_payment;
use crate::state::ReconcileState;

pub const APPROVED_MESSAGE: &str = "Pagamento aprovado! Sua reserva está confirmada.";
pub const CANCELLED_MESSAGE: &str = "O pagamento foi cancelado ou expirou.";
pub const REFUNDED_MESSAGE: &str = "Este pagamento foi estornado.";
pub const CLOSED_BOOKING_MESSAGE: &str =
    "Pagamento aprovado, mas a reserva não está mais disponível. Nossa equipe entrará em contato.";

#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct PollTick {
    pub payment_id: String,
    pub status: PaymentStatus,
    pub status_detail: Option<String>,
    /// No further polling is useful.
    pub terminal: bool,
    /// The paid booking/registration is confirmed (by this tick or earlier).
    pub confirmed: bool,
    /// Message for the payer, when there is something to say.
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WatchOutcome {
    Finished(PollTick),
    Cancelled,
    TimedOut,
}

fn message_for(
    status: PaymentStatus,
    status_detail: Option<&str>,
    confirmation: Option<ConfirmOutcome>,
) -> Option<String> {
    match status {
        PaymentStatus::Pending => None,
        PaymentStatus::Approved if confirmation == Some(ConfirmOutcome::NotConfirmable) => {
            Some(CLOSED_BOOKING_MESSAGE.to_string())
        }
        PaymentStatus::Approved => Some(APPROVED_MESSAGE.to_string()),
        PaymentStatus::Rejected => Some(rejection_message(status_detail).to_string()),
        PaymentStatus::Cancelled => Some(CANCELLED_MESSAGE.to_string()),
        PaymentStatus::Refunded => Some(REFUNDED_MESSAGE.to_string()),
    }
}

/// One status check for a provider payment id.
pub async fn poll_payment_status(
    state: &ReconcileState,
    provider_payment_id: &str,
) -> Result<PollTick, ReconcileError> {
    if provider_payment_id.trim().is_empty() {
        return Err(ReconcileError::validation("payment id is required"));
    }
    let payment = state.payments.get_payment(provider_payment_id).await?;
    let report = reconcile_payment(state, &payment).await;
    for e in &report.errors {
        warn!("[Poll] Payment {}: {}", provider_payment_id, e);
    }

    let confirmed = report
        .confirmation
        .is_some_and(ConfirmOutcome::is_confirmed);
    Ok(PollTick {
        payment_id: payment.id.clone(),
        status: payment.status,
        message: message_for(
            payment.status,
            payment.status_detail.as_deref(),
            report.confirmation,
        ),
        status_detail: payment.status_detail,
        terminal: payment.status.is_terminal(),
        confirmed,
    })
}

/// Polls until terminal, timed out, or cancelled through `cancel`.
pub async fn watch_payment(
    state: Arc<ReconcileState>,
    provider_payment_id: String,
    interval: Duration,
    timeout: Duration,
    mut cancel: watch::Receiver<bool>,
) -> WatchOutcome {
    if *cancel.borrow() {
        return WatchOutcome::Cancelled;
    }
    let deadline = time::sleep_until(Instant::now() + timeout);
    tokio::pin!(deadline);
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            changed = cancel.changed() => {
                if changed.is_err() || *cancel.borrow() {
                    info!("[Poll] Watcher for payment {} cancelled", provider_payment_id);
                    return WatchOutcome::Cancelled;
                }
            }
            _ = &mut deadline => {
                info!("[Poll] Watcher for payment {} timed out", provider_payment_id);
                return WatchOutcome::TimedOut;
            }
            _ = ticker.tick() => {
                match poll_payment_status(&state, &provider_payment_id).await {
                    Ok(tick) if tick.terminal => {
                        info!(
                            "[Poll] Payment {} reached {}",
                            provider_payment_id, tick.status
                        );
                        return WatchOutcome::Finished(tick);
                    }
                    Ok(_) => {}
                    Err(e) => warn!("[Poll] Tick for payment {} failed: {}", provider_payment_id, e),
                }
            }
        }
    }
}

/// Starts a background watcher using the configured interval and timeout.
pub fn spawn_watcher(
    state: &Arc<ReconcileState>,
    provider_payment_id: &str,
) -> JoinHandle<WatchOutcome> {
    let checkout = &state.config.checkout;
    let interval = Duration::from_secs(checkout.poll_interval_secs.max(1));
    let timeout = Duration::from_secs(checkout.poll_timeout_secs);
    info!(
        "[Poll] Watching payment {} every {:?} for up to {:?}",
        provider_payment_id, interval, timeout
    );
    tokio::spawn(watch_payment(
        state.clone(),
        provider_payment_id.to_string(),
        interval,
        timeout,
        state.shutdown_signal(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_follow_status() {
        assert_eq!(message_for(PaymentStatus::Pending, None, None), None);
        assert_eq!(
            message_for(
                PaymentStatus::Approved,
                None,
                Some(ConfirmOutcome::Confirmed)
            )
            .as_deref(),
            Some(APPROVED_MESSAGE)
        );
        assert_eq!(
            message_for(
                PaymentStatus::Approved,
                None,
                Some(ConfirmOutcome::NotConfirmable)
            )
            .as_deref(),
            Some(CLOSED_BOOKING_MESSAGE)
        );
        assert_eq!(
            message_for(
                PaymentStatus::Rejected,
                Some("cc_rejected_insufficient_amount"),
                None
            )
            .as_deref(),
            Some("O cartão possui saldo insuficiente.")
        );
    }
}
