use psiclinic_common::PaymentStatus;
use psiclinic_config::{StoreBackend, StoreConfig};
use psiclinic_store::{
    AuditEntry, ClinicStore, NewPayment, PostgrestStore, RefundRecord, StoreError,
};
use rust_decimal::Decimal;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const KEY: &str = "service-role-key";

fn store_for(server: &MockServer) -> PostgrestStore {
    let config = StoreConfig {
        backend: StoreBackend::Postgrest,
        url: format!("{}/", server.uri()),
        service_role_key: KEY.to_string(),
        proof_bucket: "refund-proofs".to_string(),
    };
    PostgrestStore::with_client(&config, reqwest::Client::new()).unwrap()
}

fn booking_row(status: &str) -> serde_json::Value {
    json!({
        "id": "b-1",
        "professional_id": "p-1",
        "service_id": "s-1",
        "date": "2026-11-03",
        "time": "14:00:00",
        "status": status,
        "patient_name": "Ana"
    })
}

fn credit_row(status: &str, token: Option<&str>) -> serde_json::Value {
    json!({
        "id": "c-1",
        "amount": 150.0,
        "currency": "BRL",
        "status": status,
        "reservation_token": token
    })
}

#[test]
fn rejects_missing_credentials() {
    let config = StoreConfig {
        backend: StoreBackend::Postgrest,
        url: "https://db.example".into(),
        service_role_key: String::new(),
        proof_bucket: "p".into(),
    };
    assert!(matches!(
        PostgrestStore::new(&config),
        Err(StoreError::ConfigError(_))
    ));
}

#[tokio::test]
async fn fetches_booking_with_service_role_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/bookings"))
        .and(query_param("id", "eq.b-1"))
        .and(header("apikey", KEY))
        .and(header("authorization", format!("Bearer {KEY}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([booking_row("pending_payment")])))
        .expect(1)
        .mount(&server)
        .await;

    let booking = store_for(&server).get_booking("b-1").await.unwrap().unwrap();
    assert_eq!(booking.patient_name, "Ana");
}

#[tokio::test]
async fn conditional_confirmation_reports_the_winner() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/bookings"))
        .and(query_param("id", "eq.b-1"))
        .and(query_param("status", "eq.pending_payment"))
        .and(body_partial_json(json!({"status": "confirmed"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([booking_row("confirmed")])))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/bookings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let store = store_for(&server);
    assert!(store.confirm_booking_if_pending("b-1").await.unwrap());
    assert!(!store.confirm_booking_if_pending("b-1").await.unwrap());
}

#[tokio::test]
async fn unique_violation_maps_to_conflict() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/payments"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "code": "23505",
            "message": "duplicate key value violates unique constraint \"payments_mp_payment_id_key\""
        })))
        .mount(&server)
        .await;

    let err = store_for(&server)
        .insert_payment(NewPayment {
            booking_id: Some("b-1".into()),
            registration_id: None,
            provider_payment_id: "123".into(),
            status: PaymentStatus::Pending,
            amount: Decimal::new(150, 0),
            method: None,
            raw_payload: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Conflict(msg) if msg.contains("duplicate key")));
}

#[tokio::test]
async fn failed_reserve_is_explained_from_current_row() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/credits"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/credits"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([credit_row("reserved", Some("other"))])),
        )
        .mount(&server)
        .await;

    let store = store_for(&server);
    assert!(matches!(
        store.reserve_credit("c-1", "mine").await,
        Err(StoreError::Conflict(_))
    ));
    assert!(matches!(
        store.consume_credit("c-1", "mine", "b-1").await,
        Err(StoreError::TokenMismatch(_))
    ));
}

#[tokio::test]
async fn refund_guard_reports_already_refunded() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/payments"))
        .and(query_param("status", "eq.approved"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/payments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": "pay-1",
            "mp_payment_id": "123",
            "status": "refunded",
            "amount": 150.0
        }])))
        .mount(&server)
        .await;

    let err = store_for(&server)
        .record_refund(
            "pay-1",
            RefundRecord {
                refund_id: Some("r".into()),
                amount: Decimal::new(150, 0),
                status: "approved".into(),
                metadata: json!({}),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidState(_)));
}

#[tokio::test]
async fn refund_guard_rejects_pending_payment() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/payments"))
        .and(query_param("status", "eq.approved"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/payments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": "pay-2",
            "mp_payment_id": "456",
            "status": "pending",
            "amount": 150.0
        }])))
        .mount(&server)
        .await;

    let err = store_for(&server)
        .record_refund(
            "pay-2",
            RefundRecord {
                refund_id: None,
                amount: Decimal::new(150, 0),
                status: "manual".into(),
                metadata: json!({}),
            },
        )
        .await
        .unwrap_err();
    match err {
        StoreError::InvalidState(msg) => assert!(msg.contains("pending")),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn audit_and_upload_hit_their_endpoints() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/logs"))
        .and(header("prefer", "return=minimal"))
        .and(body_partial_json(json!({"action": "mp_webhook"})))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/storage/v1/object/refund-proofs/pay-1/proof.pdf"))
        .and(header("content-type", "application/pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Key": "refund-proofs/pay-1/proof.pdf"})))
        .expect(1)
        .mount(&server)
        .await;

    let store = store_for(&server);
    store
        .append_audit(AuditEntry::new(
            "payment",
            Some("123".into()),
            "mp_webhook",
            json!({}),
        ))
        .await
        .unwrap();
    let path = store
        .upload_refund_proof("pay-1/proof.pdf", "application/pdf", b"%PDF".to_vec())
        .await
        .unwrap();
    assert_eq!(path, "refund-proofs/pay-1/proof.pdf");
}
