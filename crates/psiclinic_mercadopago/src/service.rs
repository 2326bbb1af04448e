use psiclinic_common::services::{
    BoxFuture, PaymentGateway, PixCreated, PixRequest, PreferenceCreated, PreferenceRequest,
    ProviderPayment, RefundCreated,
};
use psiclinic_common::ProviderError;
use rust_decimal::Decimal;

use crate::client::MercadoPagoClient;

/// Mercado Pago payment gateway implementation
pub struct MercadoPagoGateway {
    client: MercadoPagoClient,
}

impl MercadoPagoGateway {
    pub fn new(client: MercadoPagoClient) -> Self {
        Self { client }
    }
}

impl PaymentGateway for MercadoPagoGateway {
    fn create_preference(
        &self,
        request: PreferenceRequest,
    ) -> BoxFuture<'_, PreferenceCreated, ProviderError> {
        Box::pin(async move { Ok(self.client.create_preference(&request).await?) })
    }

    fn create_pix_payment(&self, request: PixRequest) -> BoxFuture<'_, PixCreated, ProviderError> {
        Box::pin(async move { Ok(self.client.create_pix_payment(&request).await?) })
    }

    fn get_payment(&self, payment_id: &str) -> BoxFuture<'_, ProviderPayment, ProviderError> {
        let payment_id = payment_id.to_string();
        Box::pin(async move { Ok(self.client.get_payment(&payment_id).await?) })
    }

    fn create_refund(
        &self,
        payment_id: &str,
        amount: Option<Decimal>,
        idempotency_key: &str,
    ) -> BoxFuture<'_, RefundCreated, ProviderError> {
        let payment_id = payment_id.to_string();
        let idempotency_key = idempotency_key.to_string();
        Box::pin(async move {
            Ok(self
                .client
                .create_refund(&payment_id, amount, &idempotency_key)
                .await?)
        })
    }
}
