// --- File: crates/psiclinic_mercadopago/src/signature.rs ---
//! Webhook `x-signature` verification.
//!
//! The header looks like `ts=1704908010,v1=618c8534...`. The signed manifest is
//! `id:{data.id};request-id:{x-request-id};ts:{ts};`, with absent parts left out,
//! hashed with HMAC-SHA256 under the webhook secret.

use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::{debug, warn};

use crate::error::MercadoPagoError;

type HmacSha256 = Hmac<Sha256>;

/// Timestamps above this are milliseconds.
const MILLIS_THRESHOLD: i64 = 100_000_000_000;

/// Parsed `x-signature` header.
#[derive(Debug, PartialEq, Eq)]
pub struct SignatureHeader<'a> {
    pub ts: &'a str,
    pub v1: Vec<&'a str>,
}

pub fn parse_signature_header(header: &str) -> Result<SignatureHeader<'_>, MercadoPagoError> {
    let mut ts = None;
    let mut v1 = Vec::new();

    for item in header.split(',') {
        if let Some((key, value)) = item.trim().split_once('=') {
            match key.trim() {
                "ts" => ts = Some(value.trim()),
                "v1" => v1.push(value.trim()),
                _ => {}
            }
        }
    }

    let ts = ts.ok_or_else(|| {
        MercadoPagoError::WebhookSignatureError("Missing 'ts' in x-signature".to_string())
    })?;
    if v1.is_empty() {
        return Err(MercadoPagoError::WebhookSignatureError(
            "Missing 'v1' in x-signature".to_string(),
        ));
    }
    Ok(SignatureHeader { ts, v1 })
}

/// Builds the string that Mercado Pago signs.
pub fn signature_manifest(data_id: Option<&str>, request_id: Option<&str>, ts: &str) -> String {
    let mut manifest = String::new();
    if let Some(id) = data_id.filter(|id| !id.is_empty()) {
        // Alphanumeric ids are signed lowercased.
        manifest.push_str(&format!("id:{};", id.to_lowercase()));
    }
    if let Some(request_id) = request_id.filter(|r| !r.is_empty()) {
        manifest.push_str(&format!("request-id:{};", request_id));
    }
    manifest.push_str(&format!("ts:{};", ts));
    manifest
}

pub fn compute_signature(secret: &str, manifest: &str) -> Result<String, MercadoPagoError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| {
        MercadoPagoError::WebhookSignatureError("Invalid webhook secret for HMAC".to_string())
    })?;
    mac.update(manifest.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Verifies a webhook signature against the current clock.
pub fn verify_webhook_signature(
    signature_header: Option<&str>,
    request_id: Option<&str>,
    data_id: Option<&str>,
    secret: &str,
    tolerance_secs: i64,
) -> Result<(), MercadoPagoError> {
    verify_webhook_signature_at(
        signature_header,
        request_id,
        data_id,
        secret,
        tolerance_secs,
        Utc::now().timestamp(),
    )
}

/// Same as [`verify_webhook_signature`] with an explicit `now` (unix seconds).
pub fn verify_webhook_signature_at(
    signature_header: Option<&str>,
    request_id: Option<&str>,
    data_id: Option<&str>,
    secret: &str,
    tolerance_secs: i64,
    now: i64,
) -> Result<(), MercadoPagoError> {
    let header = signature_header.ok_or_else(|| {
        MercadoPagoError::WebhookSignatureError("Missing x-signature header".to_string())
    })?;
    let parsed = parse_signature_header(header)?;

    let ts: i64 = parsed.ts.parse().map_err(|_| {
        MercadoPagoError::WebhookSignatureError("Invalid 'ts' in x-signature".to_string())
    })?;
    let ts_secs = if ts > MILLIS_THRESHOLD { ts / 1000 } else { ts };
    if (now - ts_secs).abs() > tolerance_secs {
        warn!(
            "[MP Webhook] Signature timestamp outside tolerance. Now: {}, Event: {}",
            now, ts_secs
        );
        return Err(MercadoPagoError::WebhookSignatureError(
            "Timestamp outside tolerance".to_string(),
        ));
    }

    let manifest = signature_manifest(data_id, request_id, parsed.ts);
    let expected = compute_signature(secret, &manifest)?;
    debug!("[MP Webhook] Signature manifest: '{}'", manifest);

    let matched = parsed.v1.iter().any(|provided| {
        constant_time_eq::constant_time_eq(
            expected.as_bytes(),
            provided.to_ascii_lowercase().as_bytes(),
        )
    });
    if matched {
        Ok(())
    } else {
        warn!("[MP Webhook] Signature mismatch for data.id {:?}", data_id);
        Err(MercadoPagoError::WebhookSignatureError(
            "Signature mismatch".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test";
    const NOW: i64 = 1_704_908_010;

    fn signed_header(data_id: Option<&str>, request_id: Option<&str>, ts: &str) -> String {
        let manifest = signature_manifest(data_id, request_id, ts);
        format!("ts={},v1={}", ts, compute_signature(SECRET, &manifest).unwrap())
    }

    #[test]
    fn manifest_omits_missing_parts() {
        assert_eq!(
            signature_manifest(Some("ABC123"), Some("req-1"), "10"),
            "id:abc123;request-id:req-1;ts:10;"
        );
        assert_eq!(signature_manifest(None, None, "10"), "ts:10;");
        assert_eq!(
            signature_manifest(Some("42"), None, "10"),
            "id:42;ts:10;"
        );
    }

    #[test]
    fn accepts_valid_signature() {
        let header = signed_header(Some("123"), Some("req-9"), &NOW.to_string());
        verify_webhook_signature_at(Some(&header), Some("req-9"), Some("123"), SECRET, 600, NOW)
            .unwrap();
    }

    #[test]
    fn accepts_millisecond_timestamps() {
        let ts = (NOW * 1000).to_string();
        let header = signed_header(Some("123"), None, &ts);
        verify_webhook_signature_at(Some(&header), None, Some("123"), SECRET, 600, NOW + 30)
            .unwrap();
    }

    #[test]
    fn rejects_tampered_id() {
        let header = signed_header(Some("123"), Some("req-9"), &NOW.to_string());
        let err =
            verify_webhook_signature_at(Some(&header), Some("req-9"), Some("124"), SECRET, 600, NOW)
                .unwrap_err();
        assert!(matches!(err, MercadoPagoError::WebhookSignatureError(_)));
    }

    #[test]
    fn rejects_stale_timestamp() {
        let header = signed_header(Some("123"), None, &NOW.to_string());
        assert!(verify_webhook_signature_at(
            Some(&header),
            None,
            Some("123"),
            SECRET,
            600,
            NOW + 601
        )
        .is_err());
    }

    #[test]
    fn rejects_missing_or_malformed_header() {
        assert!(verify_webhook_signature_at(None, None, Some("1"), SECRET, 600, NOW).is_err());
        assert!(parse_signature_header("v1=abc").is_err());
        assert!(parse_signature_header("ts=1").is_err());
        assert_eq!(
            parse_signature_header(" ts=5 , v1=aa,v1=bb").unwrap(),
            SignatureHeader {
                ts: "5",
                v1: vec!["aa", "bb"]
            }
        );
    }
}
