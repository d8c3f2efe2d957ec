//! Webhook signature verification tests

use hmac::{Hmac, Mac};
use sha2::Sha256;
use storefront::config::WhopConfig;
use storefront::payments::WhopClient;

type HmacSha256 = Hmac<Sha256>;

const TEST_SECRET: &str = "whsec_test123secret456";

fn test_client(secret: Option<&str>) -> WhopClient {
    WhopClient::new(&WhopConfig {
        api_key: "test_api_key".to_string(),
        default_product_id: Some("prod_test".to_string()),
        webhook_secret: secret.map(String::from),
    })
}

fn sign(payload: &[u8], secret: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

#[test]
fn valid_signature_is_accepted() {
    let client = test_client(Some(TEST_SECRET));
    let payload = br#"{"action":"payment.succeeded"}"#;
    let signature = sign(payload, TEST_SECRET);

    let result = client
        .verify_webhook_signature(payload, &signature)
        .expect("Verification should not error");
    assert!(result);
}

#[test]
fn wrong_secret_is_rejected() {
    let client = test_client(Some(TEST_SECRET));
    let payload = br#"{"action":"payment.succeeded"}"#;
    let signature = sign(payload, "whsec_other");

    assert!(!client.verify_webhook_signature(payload, &signature).unwrap());
}

#[test]
fn tampered_payload_is_rejected() {
    let client = test_client(Some(TEST_SECRET));
    let signature = sign(br#"{"action":"payment.succeeded"}"#, TEST_SECRET);

    let tampered = br#"{"action":"payment.succeeded","data":{"final_amount":0}}"#;
    assert!(!client.verify_webhook_signature(tampered, &signature).unwrap());
}

#[test]
fn malformed_signature_is_rejected() {
    let client = test_client(Some(TEST_SECRET));
    let payload = br#"{"action":"payment.succeeded"}"#;

    assert!(!client.verify_webhook_signature(payload, "").unwrap());
    assert!(!client.verify_webhook_signature(payload, "deadbeef").unwrap());
}

#[test]
fn verification_is_skipped_without_a_secret() {
    let client = test_client(None);
    let payload = br#"{"action":"payment.succeeded"}"#;

    assert!(client.verify_webhook_signature(payload, "anything").unwrap());
    assert!(!client.has_webhook_secret());
}
