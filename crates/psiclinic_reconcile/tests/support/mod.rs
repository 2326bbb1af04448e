//! Fakes and fixtures shared by the workflow tests.
#![allow(dead_code)]

use chrono::NaiveDate;
use psiclinic_common::services::{
    BoxFuture, MeetingCreated, MeetingRequest, MeetingService, NotificationResult,
    NotificationService, PaymentGateway, PixCreated, PixRequest, PreferenceCreated,
    PreferenceRequest, ProviderPayment, RefundCreated,
};
use psiclinic_common::{PaymentStatus, ProviderError};
use psiclinic_config::{
    AppConfig, CheckoutConfig, LoggingConfig, MercadoPagoConfig, RefundConfig, ServerConfig,
    StoreConfig,
};
use psiclinic_reconcile::ReconcileState;
use psiclinic_store::{
    AuditEntry, Booking, BookingStatus, ClinicStore, Credit, CreditStatus, Event,
    EventRegistration, MeetingInfo, MemoryStore, NewPayment, Payment, PaymentUpdate,
    Professional, RefundRecord, RegistrationPaymentStatus, Service, StoreError,
};
use rust_decimal::Decimal;
use serde_json::json;
use std::collections::HashMap;
use std::future::ready;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn done<'a, T: Send + 'a>(result: Result<T, ProviderError>) -> BoxFuture<'a, T, ProviderError> {
    Box::pin(ready(result))
}

fn api_error(provider: &str, status_code: u16) -> ProviderError {
    ProviderError::Api {
        provider: provider.to_string(),
        status_code,
        message: "unavailable".to_string(),
    }
}

pub fn money(value: i64) -> Decimal {
    Decimal::new(value, 0)
}

// --- payment gateway ---

#[derive(Default)]
pub struct MockGateway {
    payments: Mutex<HashMap<String, ProviderPayment>>,
    /// Statuses handed out one per `get_payment` call before the stored one.
    scripted: Mutex<HashMap<String, Vec<PaymentStatus>>>,
    fail_get: Mutex<bool>,
    fail_refund: Mutex<bool>,
    pub get_calls: AtomicUsize,
    pub refund_calls: AtomicUsize,
    pub preference_calls: AtomicUsize,
    pub pix_calls: AtomicUsize,
    pub last_preference: Mutex<Option<PreferenceRequest>>,
    pub last_refund: Mutex<Option<(String, Option<Decimal>, String)>>,
}

impl MockGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_payment(&self, id: &str, status: PaymentStatus, reference: Option<&str>, amount: Decimal) {
        let payment = ProviderPayment {
            id: id.to_string(),
            status,
            raw_status: status.as_str().to_string(),
            status_detail: None,
            external_reference: reference.map(str::to_string),
            amount,
            currency: Some("BRL".to_string()),
            payment_method: Some("pix".to_string()),
            payer_email: Some("ana@example.com".to_string()),
            raw: json!({ "id": id, "status": status.as_str() }),
        };
        self.payments
            .lock()
            .unwrap()
            .insert(id.to_string(), payment);
    }

    pub fn script(&self, id: &str, statuses: Vec<PaymentStatus>) {
        self.scripted
            .lock()
            .unwrap()
            .insert(id.to_string(), statuses);
    }

    pub fn fail_get(&self, fail: bool) {
        *self.fail_get.lock().unwrap() = fail;
    }

    pub fn fail_refund(&self, fail: bool) {
        *self.fail_refund.lock().unwrap() = fail;
    }

    pub fn gets(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn refunds(&self) -> usize {
        self.refund_calls.load(Ordering::SeqCst)
    }
}

impl PaymentGateway for MockGateway {
    fn create_preference(
        &self,
        request: PreferenceRequest,
    ) -> BoxFuture<'_, PreferenceCreated, ProviderError> {
        self.preference_calls.fetch_add(1, Ordering::SeqCst);
        let created = PreferenceCreated {
            preference_id: format!("pref-{}", request.external_reference),
            init_point: "https://mp.example/init".to_string(),
            sandbox_init_point: None,
            raw: json!({ "id": format!("pref-{}", request.external_reference) }),
        };
        *self.last_preference.lock().unwrap() = Some(request);
        done(Ok(created))
    }

    fn create_pix_payment(&self, request: PixRequest) -> BoxFuture<'_, PixCreated, ProviderError> {
        let n = self.pix_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("pix-{}", n);
        self.set_payment(
            &id,
            PaymentStatus::Pending,
            Some(&request.external_reference),
            request.amount,
        );
        done(Ok(PixCreated {
            payment_id: id.clone(),
            status: PaymentStatus::Pending,
            status_detail: Some("pending_waiting_transfer".to_string()),
            qr_code: Some("000201...".to_string()),
            qr_code_base64: Some("iVBORw0KGgo=".to_string()),
            ticket_url: Some(format!("https://mp.example/pix/{}", id)),
            raw: json!({ "id": id }),
        }))
    }

    fn get_payment(&self, payment_id: &str) -> BoxFuture<'_, ProviderPayment, ProviderError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        if *self.fail_get.lock().unwrap() {
            return done(Err(api_error("mercadopago", 503)));
        }
        let mut payment = match self.payments.lock().unwrap().get(payment_id).cloned() {
            Some(p) => p,
            None => return done(Err(api_error("mercadopago", 404))),
        };
        if let Some(queue) = self.scripted.lock().unwrap().get_mut(payment_id) {
            if !queue.is_empty() {
                let status = queue.remove(0);
                payment.status = status;
                payment.raw_status = status.as_str().to_string();
            }
        }
        done(Ok(payment))
    }

    fn create_refund(
        &self,
        payment_id: &str,
        amount: Option<Decimal>,
        idempotency_key: &str,
    ) -> BoxFuture<'_, RefundCreated, ProviderError> {
        self.refund_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_refund.lock().unwrap() = Some((
            payment_id.to_string(),
            amount,
            idempotency_key.to_string(),
        ));
        if *self.fail_refund.lock().unwrap() {
            return done(Err(api_error("mercadopago", 400)));
        }
        let full = self
            .payments
            .lock()
            .unwrap()
            .get(payment_id)
            .map(|p| p.amount)
            .unwrap_or_default();
        done(Ok(RefundCreated {
            refund_id: format!("rf-{}", payment_id),
            status: "approved".to_string(),
            amount: amount.unwrap_or(full),
            raw: json!({ "id": format!("rf-{}", payment_id) }),
        }))
    }
}

// --- meetings ---

#[derive(Default)]
pub struct MockMeetings {
    pub calls: AtomicUsize,
    pub requests: Mutex<Vec<MeetingRequest>>,
    fail: Mutex<bool>,
}

impl MockMeetings {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }

    pub fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl MeetingService for MockMeetings {
    fn create_meeting(
        &self,
        request: MeetingRequest,
    ) -> BoxFuture<'_, MeetingCreated, ProviderError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.requests.lock().unwrap().push(request);
        if *self.fail.lock().unwrap() {
            return done(Err(api_error("zoom", 500)));
        }
        done(Ok(MeetingCreated {
            meeting_id: format!("{}", 9000 + n),
            join_url: format!("https://zoom.example/j/{}", 9000 + n),
            password: Some("abc12345".to_string()),
            platform: "zoom".to_string(),
        }))
    }
}

// --- notifications ---

#[derive(Default)]
pub struct MockNotifier {
    pub emails: Mutex<Vec<(String, String)>>,
    pub sms: Mutex<Vec<(String, String)>>,
    /// Number of upcoming email sends that fail.
    email_failures: Mutex<usize>,
    pub email_attempts: AtomicUsize,
}

impl MockNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_next_emails(&self, n: usize) {
        *self.email_failures.lock().unwrap() = n;
    }

    pub fn emails_to(&self, to: &str) -> Vec<String> {
        self.emails
            .lock()
            .unwrap()
            .iter()
            .filter(|(recipient, _)| recipient == to)
            .map(|(_, subject)| subject.clone())
            .collect()
    }
}

impl NotificationService for MockNotifier {
    fn send_email(
        &self,
        to: &str,
        subject: &str,
        _html: &str,
    ) -> BoxFuture<'_, NotificationResult, ProviderError> {
        self.email_attempts.fetch_add(1, Ordering::SeqCst);
        {
            let mut failures = self.email_failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return done(Err(api_error("email", 503)));
            }
        }
        self.emails
            .lock()
            .unwrap()
            .push((to.to_string(), subject.to_string()));
        done(Ok(NotificationResult {
            id: "em_1".to_string(),
            status: "sent".to_string(),
        }))
    }

    fn send_sms(&self, to: &str, body: &str) -> BoxFuture<'_, NotificationResult, ProviderError> {
        self.sms
            .lock()
            .unwrap()
            .push((to.to_string(), body.to_string()));
        done(Ok(NotificationResult {
            id: "SM1".to_string(),
            status: "queued".to_string(),
        }))
    }

    fn send_whatsapp(
        &self,
        to: &str,
        body: &str,
    ) -> BoxFuture<'_, NotificationResult, ProviderError> {
        self.send_sms(&format!("whatsapp:{}", to), body)
    }
}

// --- store ---

/// Memory store whose next `consume_credit` calls fail with a store error.
pub struct FlakyConsumeStore {
    inner: Arc<MemoryStore>,
    consume_failures: AtomicUsize,
}

impl FlakyConsumeStore {
    pub fn new(inner: Arc<MemoryStore>, consume_failures: usize) -> Arc<Self> {
        Arc::new(Self {
            inner,
            consume_failures: AtomicUsize::new(consume_failures),
        })
    }
}

impl ClinicStore for FlakyConsumeStore {
    fn get_booking(&self, id: &str) -> BoxFuture<'_, Option<Booking>, StoreError> {
        self.inner.get_booking(id)
    }

    fn set_booking_preference(
        &self,
        id: &str,
        preference_id: &str,
    ) -> BoxFuture<'_, (), StoreError> {
        self.inner.set_booking_preference(id, preference_id)
    }

    fn confirm_booking_if_pending(&self, id: &str) -> BoxFuture<'_, bool, StoreError> {
        self.inner.confirm_booking_if_pending(id)
    }

    fn set_booking_meeting(&self, id: &str, meeting: MeetingInfo) -> BoxFuture<'_, (), StoreError> {
        self.inner.set_booking_meeting(id, meeting)
    }

    fn get_service(&self, id: &str) -> BoxFuture<'_, Option<Service>, StoreError> {
        self.inner.get_service(id)
    }

    fn get_professional(&self, id: &str) -> BoxFuture<'_, Option<Professional>, StoreError> {
        self.inner.get_professional(id)
    }

    fn get_event(&self, id: &str) -> BoxFuture<'_, Option<Event>, StoreError> {
        self.inner.get_event(id)
    }

    fn get_registration(&self, id: &str) -> BoxFuture<'_, Option<EventRegistration>, StoreError> {
        self.inner.get_registration(id)
    }

    fn set_registration_preference(
        &self,
        id: &str,
        preference_id: &str,
    ) -> BoxFuture<'_, (), StoreError> {
        self.inner.set_registration_preference(id, preference_id)
    }

    fn confirm_registration_if_pending(
        &self,
        id: &str,
        provider_payment_id: &str,
    ) -> BoxFuture<'_, bool, StoreError> {
        self.inner.confirm_registration_if_pending(id, provider_payment_id)
    }

    fn get_payment(&self, id: &str) -> BoxFuture<'_, Option<Payment>, StoreError> {
        self.inner.get_payment(id)
    }

    fn find_payment_by_provider_id(
        &self,
        provider_payment_id: &str,
    ) -> BoxFuture<'_, Option<Payment>, StoreError> {
        self.inner.find_payment_by_provider_id(provider_payment_id)
    }

    fn insert_payment(&self, payment: NewPayment) -> BoxFuture<'_, Payment, StoreError> {
        self.inner.insert_payment(payment)
    }

    fn update_payment_status(
        &self,
        id: &str,
        update: PaymentUpdate,
    ) -> BoxFuture<'_, Payment, StoreError> {
        self.inner.update_payment_status(id, update)
    }

    fn record_refund(&self, id: &str, refund: RefundRecord) -> BoxFuture<'_, Payment, StoreError> {
        self.inner.record_refund(id, refund)
    }

    fn update_refund_metadata(
        &self,
        id: &str,
        metadata: serde_json::Value,
    ) -> BoxFuture<'_, (), StoreError> {
        self.inner.update_refund_metadata(id, metadata)
    }

    fn get_credit(&self, id: &str) -> BoxFuture<'_, Option<Credit>, StoreError> {
        self.inner.get_credit(id)
    }

    fn reserve_credit(&self, id: &str, token: &str) -> BoxFuture<'_, Credit, StoreError> {
        self.inner.reserve_credit(id, token)
    }

    fn consume_credit(
        &self,
        id: &str,
        token: &str,
        booking_id: &str,
    ) -> BoxFuture<'_, Credit, StoreError> {
        let failing = self
            .consume_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Box::pin(ready(Err(StoreError::Conflict(format!(
                "credit {} changed concurrently",
                id
            )))));
        }
        self.inner.consume_credit(id, token, booking_id)
    }

    fn release_credit(&self, id: &str, token: &str) -> BoxFuture<'_, Credit, StoreError> {
        self.inner.release_credit(id, token)
    }

    fn append_audit(&self, entry: AuditEntry) -> BoxFuture<'_, (), StoreError> {
        self.inner.append_audit(entry)
    }

    fn upload_refund_proof(
        &self,
        path: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> BoxFuture<'_, String, StoreError> {
        self.inner.upload_refund_proof(path, content_type, bytes)
    }
}

// --- fixtures ---

pub fn test_config() -> AppConfig {
    AppConfig {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            allowed_origins: vec![],
        },
        use_zoom: false,
        use_email: false,
        use_twilio: false,
        store: StoreConfig::default(),
        mercadopago: MercadoPagoConfig {
            api_base_url: "http://mp.invalid".to_string(),
            access_token: "TEST-token".to_string(),
            webhook_secret: None,
            notification_url: None,
            success_url: "https://clinic.example/ok".to_string(),
            failure_url: "https://clinic.example/fail".to_string(),
            pending_url: "https://clinic.example/pending".to_string(),
            statement_descriptor: None,
            currency: "BRL".to_string(),
            signature_tolerance_secs: 600,
            pix_expiration_minutes: 30,
        },
        zoom: None,
        email: None,
        twilio: None,
        checkout: CheckoutConfig {
            watch_pix_payments: false,
            ..CheckoutConfig::default()
        },
        refunds: RefundConfig {
            max_proof_bytes: 1024,
            notify_max_attempts: 3,
            notify_retry_delay_ms: 1,
        },
        logging: LoggingConfig::default(),
    }
}

pub fn booking(id: &str) -> Booking {
    Booking {
        id: id.to_string(),
        professional_id: "p-1".to_string(),
        service_id: "s-1".to_string(),
        date: NaiveDate::from_ymd_opt(2026, 11, 3).unwrap(),
        time: "14:00".to_string(),
        status: BookingStatus::PendingPayment,
        patient_name: "Ana Souza".to_string(),
        patient_email: Some("ana@example.com".to_string()),
        patient_phone: Some("+5511999990000".to_string()),
        valor_consulta: Some(money(150)),
        valor_repasse_profissional: None,
        marketplace_preference_id: None,
        meeting_link: None,
        meeting_password: None,
        meeting_platform: None,
    }
}

pub fn credit(id: &str, amount: Decimal) -> Credit {
    Credit {
        id: id.to_string(),
        patient_email: Some("ana@example.com".to_string()),
        amount,
        currency: "BRL".to_string(),
        status: CreditStatus::Available,
        reservation_token: None,
        booking_id: None,
        reserved_at: None,
        consumed_at: None,
    }
}

/// Store with booking `b-1` (pending, service `s-1` at 150), professional
/// `p-1`, event `e-1` at 80 and pending registration `r-1`.
pub fn seeded_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.insert_service(Service {
        id: "s-1".to_string(),
        name: "Psicoterapia individual".to_string(),
        price: money(150),
        duration_minutes: Some(50),
    });
    store.insert_professional(Professional {
        id: "p-1".to_string(),
        name: "Dra. Beatriz Lima".to_string(),
        email: Some("beatriz@example.com".to_string()),
        phone: None,
    });
    store.insert_booking(booking("b-1"));
    store.insert_event(Event {
        id: "e-1".to_string(),
        title: "Roda de conversa".to_string(),
        price: money(80),
    });
    store.insert_registration(EventRegistration {
        id: "r-1".to_string(),
        event_id: "e-1".to_string(),
        name: "Carlos".to_string(),
        email: Some("carlos@example.com".to_string()),
        phone: None,
        payment_status: RegistrationPaymentStatus::Pending,
        payment_id: None,
        marketplace_preference_id: None,
    });
    store
}

pub struct Harness {
    pub state: Arc<ReconcileState>,
    pub store: Arc<MemoryStore>,
    pub gateway: Arc<MockGateway>,
    pub meetings: Arc<MockMeetings>,
    pub notifier: Arc<MockNotifier>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: AppConfig) -> Self {
        let store = seeded_store();
        Self::build(config, store.clone(), store)
    }

    /// Workflow state backed by a store whose first `consume_failures`
    /// credit consumptions fail.
    pub fn with_flaky_consume(consume_failures: usize) -> Self {
        let store = seeded_store();
        let flaky = FlakyConsumeStore::new(store.clone(), consume_failures);
        Self::build(test_config(), store, flaky)
    }

    fn build(config: AppConfig, store: Arc<MemoryStore>, backend: Arc<dyn ClinicStore>) -> Self {
        let gateway = MockGateway::new();
        let meetings = MockMeetings::new();
        let notifier = MockNotifier::new();
        let state = ReconcileState::new(Arc::new(config), backend, gateway.clone())
            .with_meetings(meetings.clone())
            .with_notifier(notifier.clone());
        Self {
            state: Arc::new(state),
            store,
            gateway,
            meetings,
            notifier,
        }
    }

    pub fn audit_actions(&self, action: &str) -> usize {
        self.store
            .audit_log()
            .iter()
            .filter(|r| r.entry.action == action)
            .count()
    }
}
