// --- File: crates/psiclinic_reconcile/src/routes.rs ---

use crate::handlers::{
    consume_credit_handler, create_pix_handler, create_preference_handler,
    credit_checkout_handler, health_handler, manual_refund_handler, payment_status_handler,
    refund_handler, release_credit_handler, reserve_credit_handler, webhook_handler,
};
use crate::state::ReconcileState;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// Room for the text fields and multipart framing around the proof file.
const FORM_OVERHEAD_BYTES: usize = 64 * 1024;

/// Creates a router containing all checkout, webhook, credit and refund routes.
pub fn routes(state: Arc<ReconcileState>) -> Router {
    let proof_limit = state.config.refunds.max_proof_bytes + FORM_OVERHEAD_BYTES;

    Router::new()
        .route("/mp-create-preference", post(create_preference_handler))
        .route("/mp-create-pix", post(create_pix_handler))
        // Server-to-server notifications from Mercado Pago
        .route("/mp-webhook", post(webhook_handler))
        .route("/mp-payment-status/{payment_id}", get(payment_status_handler))
        .route("/mp-refund", post(refund_handler))
        .route(
            "/payments/{payment_id}/manual-refund",
            post(manual_refund_handler).layer(DefaultBodyLimit::max(proof_limit)),
        )
        .route("/credits/{credit_id}/reserve", post(reserve_credit_handler))
        .route("/credits/{credit_id}/consume", post(consume_credit_handler))
        .route("/credits/{credit_id}/release", post(release_credit_handler))
        .route("/checkout/credit", post(credit_checkout_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}
