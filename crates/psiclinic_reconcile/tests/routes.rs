mod support;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use psiclinic_common::PaymentStatus;
use psiclinic_reconcile::refunds::sha256_hex;
use psiclinic_reconcile::routes;
use psiclinic_store::{BookingStatus, CreditStatus, Payment};
use serde_json::{json, Value};
use support::{credit, money, test_config, Harness};
use tower::ServiceExt;

fn app(h: &Harness) -> Router {
    routes(h.state.clone())
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn send(h: &Harness, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app(h).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, bytes.to_vec())
}

async fn send_json(h: &Harness, request: Request<Body>) -> (StatusCode, Value) {
    let (status, bytes) = send(h, request).await;
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

#[tokio::test]
async fn health_is_ok() {
    let h = Harness::new();
    let request = Request::get("/health").body(Body::empty()).unwrap();
    let (status, body) = send_json(&h, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn webhook_replies_ok_and_confirms() {
    let h = Harness::new();
    h.gateway
        .set_payment("mp-1", PaymentStatus::Approved, Some("b-1"), money(150));

    let request = post_json(
        "/mp-webhook",
        json!({ "type": "payment", "data": { "id": "mp-1" } }),
    );
    let (status, body) = send(&h, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"ok");
    assert_eq!(h.store.booking("b-1").unwrap().status, BookingStatus::Confirmed);
}

#[tokio::test]
async fn webhook_accepts_query_parameters_and_non_json_bodies() {
    let h = Harness::new();
    h.gateway
        .set_payment("mp-2", PaymentStatus::Approved, Some("b-1"), money(150));

    let request = Request::post("/mp-webhook?data.id=mp-2&type=payment")
        .body(Body::from("not json"))
        .unwrap();
    let (status, _) = send(&h, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(h.store.booking("b-1").unwrap().status, BookingStatus::Confirmed);
}

#[tokio::test]
async fn webhook_without_id_is_a_bad_request() {
    let h = Harness::new();
    let (status, body) = send(&h, post_json("/mp-webhook", json!({ "type": "payment" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let text = String::from_utf8(body).unwrap();
    assert!(!text.is_empty());
    assert!(serde_json::from_str::<Value>(&text).is_err());
}

#[tokio::test]
async fn webhook_with_bad_signature_is_unauthorized() {
    let mut config = test_config();
    config.mercadopago.webhook_secret = Some("whsec".into());
    let h = Harness::with_config(config);

    let request = Request::post("/mp-webhook")
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-signature", "ts=1,v1=deadbeef")
        .header("x-request-id", "req-1")
        .body(Body::from(
            json!({ "type": "payment", "data": { "id": "mp-3" } }).to_string(),
        ))
        .unwrap();
    let (status, _) = send(&h, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(h.gateway.gets(), 0);
}

#[tokio::test]
async fn webhook_provider_failure_is_a_bad_gateway() {
    let h = Harness::new();
    h.gateway.fail_get(true);
    let request = post_json("/mp-webhook", json!({ "type": "payment", "data": { "id": "mp-4" } }));
    let (status, body) = send(&h, request).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(String::from_utf8(body).unwrap().contains("mercadopago"));
}

#[tokio::test]
async fn preference_needs_exactly_one_target() {
    let h = Harness::new();
    let both = post_json(
        "/mp-create-preference",
        json!({ "booking_id": "b-1", "registration_id": "r-1" }),
    );
    assert_eq!(send(&h, both).await.0, StatusCode::BAD_REQUEST);

    let neither = post_json("/mp-create-preference", json!({}));
    assert_eq!(send(&h, neither).await.0, StatusCode::BAD_REQUEST);
    assert_eq!(
        h.gateway
            .preference_calls
            .load(std::sync::atomic::Ordering::SeqCst),
        0
    );
}

#[tokio::test]
async fn preference_for_registration_uses_event_price() {
    let h = Harness::new();
    let (status, body) = send_json(
        &h,
        post_json("/mp-create-preference", json!({ "registration_id": "r-1" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["preference_id"], "pref-EVENTO_r-1");
    let sent = h.gateway.last_preference.lock().unwrap().clone().unwrap();
    assert_eq!(sent.amount, money(80));
}

#[tokio::test]
async fn unknown_booking_is_not_found() {
    let h = Harness::new();
    let (status, _) = send(&h, post_json("/mp-create-pix", json!({ "booking_id": "nope" }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn pix_returns_the_qr_code() {
    let h = Harness::new();
    let (status, body) = send_json(&h, post_json("/mp-create-pix", json!({ "booking_id": "b-1" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["payment_id"], "pix-1");
    assert_eq!(body["status"], "pending");
    assert!(body["qr_code"].is_string());
}

#[tokio::test]
async fn payment_status_reports_the_tick() {
    let h = Harness::new();
    h.gateway
        .set_payment("mp-5", PaymentStatus::Approved, Some("b-1"), money(150));
    let request = Request::get("/mp-payment-status/mp-5")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send_json(&h, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "approved");
    assert_eq!(body["terminal"], true);
    assert_eq!(body["confirmed"], true);
}

fn payment_row(h: &Harness, provider_id: &str, status: PaymentStatus) -> String {
    let id = format!("row-{}", provider_id);
    h.store.insert_payment_row(Payment {
        id: id.clone(),
        booking_id: Some("b-1".into()),
        registration_id: None,
        provider_payment_id: provider_id.into(),
        status,
        amount: money(150),
        method: Some("pix".into()),
        raw_payload: None,
        refund_id: None,
        refund_amount: None,
        refund_status: None,
        refund_date: None,
        refund_metadata: None,
        created_at: None,
    });
    h.gateway
        .set_payment(provider_id, status, Some("b-1"), money(150));
    id
}

#[tokio::test]
async fn refund_of_pending_payment_is_refused() {
    let h = Harness::new();
    let id = payment_row(&h, "mp-6", PaymentStatus::Pending);
    let (status, _) = send(&h, post_json("/mp-refund", json!({ "payment_id": id }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(h.gateway.refunds(), 0);
}

#[tokio::test]
async fn refund_without_id_is_a_bad_request() {
    let h = Harness::new();
    let (status, _) = send(&h, post_json("/mp-refund", json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn refund_returns_the_provider_refund() {
    let h = Harness::new();
    let id = payment_row(&h, "mp-7", PaymentStatus::Approved);
    let (status, body) = send_json(&h, post_json("/mp-refund", json!({ "payment_id": id }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["refund_id"], "rf-mp-7");
}

#[tokio::test]
async fn credit_lifecycle_over_http() {
    let h = Harness::new();
    h.store.insert_credit(credit("c-1", money(150)));

    let (status, reserved) = send_json(&h, post_json("/credits/c-1/reserve", json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reserved["status"], "reserved");
    let token = reserved["reservation_token"].as_str().unwrap().to_string();

    let (status, _) = send_json(&h, post_json("/credits/c-1/reserve", json!({}))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let wrong = post_json(
        "/credits/c-1/consume",
        json!({ "reservation_token": "other", "booking_id": "b-1" }),
    );
    assert_eq!(send(&h, wrong).await.0, StatusCode::CONFLICT);

    let (status, released) = send_json(
        &h,
        post_json("/credits/c-1/release", json!({ "reservation_token": token })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(released["status"], "available");
    assert!(released["reservation_token"].is_null());

    let (status, _) = send(&h, post_json("/credits/missing/reserve", json!({}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn credit_reserve_without_body_generates_a_token() {
    let h = Harness::new();
    h.store.insert_credit(credit("c-1", money(150)));
    let request = Request::post("/credits/c-1/reserve").body(Body::empty()).unwrap();
    let (status, body) = send_json(&h, request).await;
    assert_eq!(status, StatusCode::OK);
    assert!(!body["reservation_token"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn credit_checkout_over_http() {
    let h = Harness::new();
    h.store.insert_credit(credit("c-1", money(150)));
    let (status, body) = send_json(
        &h,
        post_json("/checkout/credit", json!({ "booking_id": "b-1", "credit_id": "c-1" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["payment_id"].is_string());
    assert_eq!(h.store.credit("c-1").unwrap().status, CreditStatus::Consumed);
    assert_eq!(h.store.booking("b-1").unwrap().status, BookingStatus::Confirmed);

    let (status, _) = send(
        &h,
        post_json("/checkout/credit", json!({ "booking_id": "b-1" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

const BOUNDARY: &str = "psiclinic-test-boundary";

fn multipart(fields: &[(&str, &str)], file: Option<(&str, &[u8])>) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
    }
    if let Some((file_name, bytes)) = file {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"proof\"; filename=\"{}\"\r\nContent-Type: image/png\r\n\r\n",
                BOUNDARY, file_name
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn manual_refund_request(payment_id: &str, body: Vec<u8>) -> Request<Body> {
    Request::post(format!("/payments/{}/manual-refund", payment_id))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn manual_refund_accepts_a_multipart_proof() {
    let h = Harness::new();
    let id = payment_row(&h, "mp-8", PaymentStatus::Approved);
    let proof = b"\x89PNG proof image";
    let checksum = sha256_hex(proof);
    let body = multipart(
        &[
            ("reason", "Consulta cancelada pela clínica"),
            ("amount", "150,00"),
            ("notify_payer", "true"),
            ("checksum_sha256", &checksum),
        ],
        Some(("recibo.png", proof)),
    );

    let (status, response) = send_json(&h, manual_refund_request(&id, body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["success"], true);
    assert_eq!(response["checksum_sha256"], checksum.as_str());
    assert_eq!(response["notification"]["status"], "sent");

    let path = response["proof_path"].as_str().unwrap();
    let stored = h.store.proof(path).unwrap();
    assert_eq!(stored.content_type, "image/png");
    assert_eq!(stored.bytes, proof.to_vec());
    assert_eq!(h.store.payments()[0].status, PaymentStatus::Refunded);
}

#[tokio::test]
async fn manual_refund_without_proof_is_a_bad_request() {
    let h = Harness::new();
    let id = payment_row(&h, "mp-9", PaymentStatus::Approved);
    let body = multipart(&[("reason", "Duplicado")], None);
    let (status, _) = send(&h, manual_refund_request(&id, body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(h.store.payments()[0].status, PaymentStatus::Approved);
}
