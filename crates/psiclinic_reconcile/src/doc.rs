// --- File: crates/psiclinic_reconcile/src/doc.rs ---
#![cfg(feature = "openapi")]
use utoipa::OpenApi;

use crate::checkout::{CheckoutRequest, PixResponse, PreferenceResponse};
use crate::confirm::ConfirmOutcome;
use crate::credits::{CreditCheckout, CreditCheckoutRequest};
use crate::handlers::{
    ConsumeCreditRequest, CreditResponse, ReleaseCreditRequest, ReserveCreditRequest,
};
use crate::poll::PollTick;
use crate::refunds::{
    ManualRefundResponse, NotificationReport, NotificationStatus, RefundRequest, RefundResponse,
};
use psiclinic_common::services::PayerInfo;
use psiclinic_common::PaymentStatus;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::create_preference_handler,
        crate::handlers::create_pix_handler,
        crate::handlers::webhook_handler,
        crate::handlers::payment_status_handler,
        crate::handlers::refund_handler,
        crate::handlers::manual_refund_handler,
        crate::handlers::reserve_credit_handler,
        crate::handlers::consume_credit_handler,
        crate::handlers::release_credit_handler,
        crate::handlers::credit_checkout_handler,
        crate::handlers::health_handler
    ),
    components(
        schemas(
            CheckoutRequest, PayerInfo, PreferenceResponse, PixResponse,
            PollTick, PaymentStatus, ConfirmOutcome,
            RefundRequest, RefundResponse,
            ManualRefundResponse, NotificationReport, NotificationStatus,
            ReserveCreditRequest, ConsumeCreditRequest, ReleaseCreditRequest, CreditResponse,
            CreditCheckoutRequest, CreditCheckout
        )
    ),
    tags(
        (name = "Checkout", description = "Mercado Pago preferences, PIX and status polling"),
        (name = "Mercado Pago Webhooks", description = "Server-to-server payment notifications"),
        (name = "Refunds", description = "Provider and manual refunds"),
        (name = "Credits", description = "Prepaid credit reservation and checkout"),
        (name = "Health", description = "Liveness")
    )
)]
pub struct ReconcileApiDoc;
