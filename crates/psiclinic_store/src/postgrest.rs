//! PostgREST (Supabase) backed store.
//!
//! Tables are reached at `{url}/rest/v1/{table}` with the service-role key.
//! Conditional transitions are PATCH requests whose filters include the
//! expected current state; an empty representation means the guard failed.

use chrono::Utc;
use psiclinic_common::services::BoxFuture;
use psiclinic_common::HTTP_CLIENT;
use psiclinic_config::StoreConfig;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error};

use crate::error::StoreError;
use crate::models::*;
use crate::repository::ClinicStore;

#[derive(Deserialize)]
struct PostgrestErrorBody {
    message: Option<String>,
    error: Option<String>,
    code: Option<String>,
}

/// Postgres unique_violation
const UNIQUE_VIOLATION: &str = "23505";

fn eq(value: &str) -> String {
    format!("eq.{value}")
}

pub struct PostgrestStore {
    client: Client,
    rest_url: String,
    storage_url: String,
    api_key: String,
    proof_bucket: String,
}

impl PostgrestStore {
    pub fn new(config: &StoreConfig) -> Result<Self, StoreError> {
        Self::with_client(config, HTTP_CLIENT.clone())
    }

    pub fn with_client(config: &StoreConfig, client: Client) -> Result<Self, StoreError> {
        let base = config.url.trim_end_matches('/');
        if base.is_empty() {
            return Err(StoreError::ConfigError("store.url is not set".to_string()));
        }
        if config.service_role_key.is_empty() {
            return Err(StoreError::ConfigError(
                "store.service_role_key is not set".to_string(),
            ));
        }
        Ok(Self {
            client,
            rest_url: format!("{base}/rest/v1"),
            storage_url: format!("{base}/storage/v1"),
            api_key: config.service_role_key.clone(),
            proof_bucket: config.proof_bucket.clone(),
        })
    }

    fn table(&self, method: Method, table: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}/{}", self.rest_url, table))
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    async fn check(response: Response) -> Result<Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        error!(status = %status, body = %body, "Store request failed");

        let parsed: Option<PostgrestErrorBody> = serde_json::from_str(&body).ok();
        let unique_violation = parsed
            .as_ref()
            .and_then(|b| b.code.as_deref())
            .is_some_and(|code| code == UNIQUE_VIOLATION);
        let message = parsed
            .and_then(|b| b.message.or(b.error))
            .unwrap_or(body);

        if status == StatusCode::CONFLICT || unique_violation {
            return Err(StoreError::Conflict(message));
        }
        Err(StoreError::ApiError {
            status_code: status.as_u16(),
            message,
        })
    }

    async fn rows<T: DeserializeOwned>(response: Response) -> Result<Vec<T>, StoreError> {
        let response = Self::check(response).await?;
        let text = response.text().await?;
        Ok(serde_json::from_str(&text)?)
    }

    async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        filters: &[(&str, String)],
    ) -> Result<Vec<T>, StoreError> {
        let response = self
            .table(Method::GET, table)
            .query(&[("select", "*")])
            .query(filters)
            .send()
            .await?;
        Self::rows(response).await
    }

    async fn find_one<T: DeserializeOwned>(
        &self,
        table: &str,
        column: &str,
        value: &str,
    ) -> Result<Option<T>, StoreError> {
        let mut rows = self
            .select(table, &[(column, eq(value)), ("limit", "1".to_string())])
            .await?;
        Ok(rows.pop())
    }

    async fn insert_row<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        table: &str,
        body: &B,
    ) -> Result<T, StoreError> {
        let response = self
            .table(Method::POST, table)
            .header("Prefer", "return=representation")
            .json(body)
            .send()
            .await?;
        Self::rows(response)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::ApiError {
                status_code: 500,
                message: format!("insert into {table} returned no rows"),
            })
    }

    async fn patch_rows<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        table: &str,
        filters: &[(&str, String)],
        body: &B,
    ) -> Result<Vec<T>, StoreError> {
        let response = self
            .table(Method::PATCH, table)
            .header("Prefer", "return=representation")
            .query(filters)
            .json(body)
            .send()
            .await?;
        Self::rows(response).await
    }

    /// Explains why a guarded payment write matched no rows.
    async fn payment_guard_failure(&self, id: &str) -> StoreError {
        match self.find_one::<Payment>(PAYMENTS, "id", id).await {
            Ok(None) => StoreError::NotFound(format!("payment {id}")),
            Ok(Some(p)) if p.status == psiclinic_common::PaymentStatus::Refunded => {
                StoreError::InvalidState(format!("payment {id} is already refunded"))
            }
            Ok(Some(_)) => StoreError::Conflict(format!("payment {id} changed concurrently")),
            Err(err) => err,
        }
    }

    async fn refund_guard_failure(&self, id: &str) -> StoreError {
        match self.find_one::<Payment>(PAYMENTS, "id", id).await {
            Ok(Some(p))
                if !matches!(
                    p.status,
                    psiclinic_common::PaymentStatus::Approved
                        | psiclinic_common::PaymentStatus::Refunded
                ) =>
            {
                StoreError::InvalidState(format!(
                    "payment {id} is {}; only approved payments can be refunded",
                    p.status
                ))
            }
            _ => self.payment_guard_failure(id).await,
        }
    }

    /// Explains why a guarded credit write matched no rows by replaying the
    /// transition on the current row.
    async fn credit_guard_failure<F>(&self, id: &str, transition: F) -> StoreError
    where
        F: FnOnce(&mut Credit) -> Result<(), StoreError> + Send,
    {
        match self.find_one::<Credit>(CREDITS, "id", id).await {
            Ok(None) => StoreError::NotFound(format!("credit {id}")),
            Ok(Some(mut credit)) => match transition(&mut credit) {
                Err(err) => err,
                Ok(()) => StoreError::Conflict(format!("credit {id} changed concurrently")),
            },
            Err(err) => err,
        }
    }

    async fn guarded_credit_write<F>(
        &self,
        id: &str,
        filters: &[(&str, String)],
        body: Value,
        transition: F,
    ) -> Result<Credit, StoreError>
    where
        F: FnOnce(&mut Credit) -> Result<(), StoreError> + Send,
    {
        let mut rows: Vec<Credit> = self.patch_rows(CREDITS, filters, &body).await?;
        match rows.pop() {
            Some(credit) => Ok(credit),
            None => Err(self.credit_guard_failure(id, transition).await),
        }
    }
}

impl ClinicStore for PostgrestStore {
    fn get_booking(&self, id: &str) -> BoxFuture<'_, Option<Booking>, StoreError> {
        let id = id.to_string();
        Box::pin(async move { self.find_one(BOOKINGS, "id", &id).await })
    }

    fn set_booking_preference(
        &self,
        id: &str,
        preference_id: &str,
    ) -> BoxFuture<'_, (), StoreError> {
        let id = id.to_string();
        let body = json!({ "marketplace_preference_id": preference_id });
        Box::pin(async move {
            let rows: Vec<Booking> = self.patch_rows(BOOKINGS, &[("id", eq(&id))], &body).await?;
            if rows.is_empty() {
                return Err(StoreError::NotFound(format!("booking {id}")));
            }
            Ok(())
        })
    }

    fn confirm_booking_if_pending(&self, id: &str) -> BoxFuture<'_, bool, StoreError> {
        let id = id.to_string();
        Box::pin(async move {
            let rows: Vec<Booking> = self
                .patch_rows(
                    BOOKINGS,
                    &[("id", eq(&id)), ("status", eq("pending_payment"))],
                    &json!({ "status": BookingStatus::Confirmed }),
                )
                .await?;
            debug!(booking_id = %id, won = !rows.is_empty(), "Conditional booking confirmation");
            Ok(!rows.is_empty())
        })
    }

    fn set_booking_meeting(&self, id: &str, meeting: MeetingInfo) -> BoxFuture<'_, (), StoreError> {
        let id = id.to_string();
        Box::pin(async move {
            let body = json!({
                "meeting_link": meeting.link,
                "meeting_password": meeting.password,
                "meeting_platform": meeting.platform,
            });
            let rows: Vec<Booking> = self.patch_rows(BOOKINGS, &[("id", eq(&id))], &body).await?;
            if rows.is_empty() {
                return Err(StoreError::NotFound(format!("booking {id}")));
            }
            Ok(())
        })
    }

    fn get_service(&self, id: &str) -> BoxFuture<'_, Option<Service>, StoreError> {
        let id = id.to_string();
        Box::pin(async move { self.find_one(SERVICES, "id", &id).await })
    }

    fn get_professional(&self, id: &str) -> BoxFuture<'_, Option<Professional>, StoreError> {
        let id = id.to_string();
        Box::pin(async move { self.find_one(PROFESSIONALS, "id", &id).await })
    }

    fn get_event(&self, id: &str) -> BoxFuture<'_, Option<Event>, StoreError> {
        let id = id.to_string();
        Box::pin(async move { self.find_one(EVENTS, "id", &id).await })
    }

    fn get_registration(&self, id: &str) -> BoxFuture<'_, Option<EventRegistration>, StoreError> {
        let id = id.to_string();
        Box::pin(async move { self.find_one(REGISTRATIONS, "id", &id).await })
    }

    fn set_registration_preference(
        &self,
        id: &str,
        preference_id: &str,
    ) -> BoxFuture<'_, (), StoreError> {
        let id = id.to_string();
        let body = json!({ "marketplace_preference_id": preference_id });
        Box::pin(async move {
            let rows: Vec<EventRegistration> = self
                .patch_rows(REGISTRATIONS, &[("id", eq(&id))], &body)
                .await?;
            if rows.is_empty() {
                return Err(StoreError::NotFound(format!("registration {id}")));
            }
            Ok(())
        })
    }

    fn confirm_registration_if_pending(
        &self,
        id: &str,
        provider_payment_id: &str,
    ) -> BoxFuture<'_, bool, StoreError> {
        let id = id.to_string();
        let body = json!({
            "payment_status": RegistrationPaymentStatus::Paid,
            "payment_id": provider_payment_id,
        });
        Box::pin(async move {
            let rows: Vec<EventRegistration> = self
                .patch_rows(
                    REGISTRATIONS,
                    &[("id", eq(&id)), ("payment_status", eq("pending"))],
                    &body,
                )
                .await?;
            Ok(!rows.is_empty())
        })
    }

    fn get_payment(&self, id: &str) -> BoxFuture<'_, Option<Payment>, StoreError> {
        let id = id.to_string();
        Box::pin(async move { self.find_one(PAYMENTS, "id", &id).await })
    }

    fn find_payment_by_provider_id(
        &self,
        provider_payment_id: &str,
    ) -> BoxFuture<'_, Option<Payment>, StoreError> {
        let provider_payment_id = provider_payment_id.to_string();
        Box::pin(async move {
            self.find_one(PAYMENTS, "mp_payment_id", &provider_payment_id)
                .await
        })
    }

    fn insert_payment(&self, payment: NewPayment) -> BoxFuture<'_, Payment, StoreError> {
        Box::pin(async move { self.insert_row(PAYMENTS, &payment).await })
    }

    fn update_payment_status(
        &self,
        id: &str,
        update: PaymentUpdate,
    ) -> BoxFuture<'_, Payment, StoreError> {
        let id = id.to_string();
        Box::pin(async move {
            let mut body = serde_json::to_value(&update)?;
            if let Value::Object(map) = &mut body {
                map.insert("updated_at".to_string(), json!(Utc::now()));
            }
            let mut rows: Vec<Payment> = self
                .patch_rows(
                    PAYMENTS,
                    &[("id", eq(&id)), ("status", "neq.refunded".to_string())],
                    &body,
                )
                .await?;
            match rows.pop() {
                Some(payment) => Ok(payment),
                None => Err(self.payment_guard_failure(&id).await),
            }
        })
    }

    fn record_refund(&self, id: &str, refund: RefundRecord) -> BoxFuture<'_, Payment, StoreError> {
        let id = id.to_string();
        Box::pin(async move {
            let body = json!({
                "status": psiclinic_common::PaymentStatus::Refunded,
                "refund_id": refund.refund_id,
                "refund_amount": refund.amount,
                "refund_status": refund.status,
                "refund_date": Utc::now(),
                "refund_metadata": refund.metadata,
                "updated_at": Utc::now(),
            });
            let mut rows: Vec<Payment> = self
                .patch_rows(PAYMENTS, &[("id", eq(&id)), ("status", eq("approved"))], &body)
                .await?;
            match rows.pop() {
                Some(payment) => Ok(payment),
                None => Err(self.refund_guard_failure(&id).await),
            }
        })
    }

    fn update_refund_metadata(&self, id: &str, metadata: Value) -> BoxFuture<'_, (), StoreError> {
        let id = id.to_string();
        Box::pin(async move {
            let rows: Vec<Payment> = self
                .patch_rows(
                    PAYMENTS,
                    &[("id", eq(&id))],
                    &json!({ "refund_metadata": metadata }),
                )
                .await?;
            if rows.is_empty() {
                return Err(StoreError::NotFound(format!("payment {id}")));
            }
            Ok(())
        })
    }

    fn get_credit(&self, id: &str) -> BoxFuture<'_, Option<Credit>, StoreError> {
        let id = id.to_string();
        Box::pin(async move { self.find_one(CREDITS, "id", &id).await })
    }

    fn reserve_credit(&self, id: &str, token: &str) -> BoxFuture<'_, Credit, StoreError> {
        let id = id.to_string();
        let token = token.to_string();
        Box::pin(async move {
            let now = Utc::now();
            let body = json!({
                "status": CreditStatus::Reserved,
                "reservation_token": token,
                "reserved_at": now,
            });
            self.guarded_credit_write(
                &id,
                &[("id", eq(&id)), ("status", eq("available"))],
                body,
                |c| c.reserve(&token, now),
            )
            .await
        })
    }

    fn consume_credit(
        &self,
        id: &str,
        token: &str,
        booking_id: &str,
    ) -> BoxFuture<'_, Credit, StoreError> {
        let id = id.to_string();
        let token = token.to_string();
        let booking_id = booking_id.to_string();
        Box::pin(async move {
            let now = Utc::now();
            let body = json!({
                "status": CreditStatus::Consumed,
                "booking_id": booking_id,
                "consumed_at": now,
            });
            self.guarded_credit_write(
                &id,
                &[
                    ("id", eq(&id)),
                    ("status", eq("reserved")),
                    ("reservation_token", eq(&token)),
                ],
                body,
                |c| c.consume(&token, &booking_id, now),
            )
            .await
        })
    }

    fn release_credit(&self, id: &str, token: &str) -> BoxFuture<'_, Credit, StoreError> {
        let id = id.to_string();
        let token = token.to_string();
        Box::pin(async move {
            let body = json!({
                "status": CreditStatus::Available,
                "reservation_token": Value::Null,
                "reserved_at": Value::Null,
            });
            self.guarded_credit_write(
                &id,
                &[
                    ("id", eq(&id)),
                    ("status", eq("reserved")),
                    ("reservation_token", eq(&token)),
                ],
                body,
                |c| c.release(&token),
            )
            .await
        })
    }

    fn append_audit(&self, entry: AuditEntry) -> BoxFuture<'_, (), StoreError> {
        Box::pin(async move {
            let response = self
                .table(Method::POST, LOGS)
                .header("Prefer", "return=minimal")
                .json(&entry)
                .send()
                .await?;
            Self::check(response).await?;
            Ok(())
        })
    }

    fn upload_refund_proof(
        &self,
        path: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> BoxFuture<'_, String, StoreError> {
        let object_path = format!("{}/{}", self.proof_bucket, path.trim_start_matches('/'));
        let content_type = content_type.to_string();
        Box::pin(async move {
            let response = self
                .client
                .post(format!("{}/object/{}", self.storage_url, object_path))
                .header("apikey", &self.api_key)
                .bearer_auth(&self.api_key)
                .header(reqwest::header::CONTENT_TYPE, content_type)
                .header("x-upsert", "false")
                .body(bytes)
                .send()
                .await?;
            Self::check(response).await?;
            Ok(object_path)
        })
    }
}
