//! Order/capture provider adapter (PayPal).
//!
//! Two-phase flow: an order is created with the amount fixed up front and a
//! short custom field carrying product id + truncated email for correlation;
//! a separate explicit capture call finalizes payment. The capture endpoint
//! is where order creation is triggered synchronously, so the caller must
//! recover addons/metadata from the stored checkout session - the capture
//! response alone is insufficient.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::config::PayPalConfig;
use crate::error::{provider_transport, AppError, Result};

use super::whop::classify_provider_error;
use super::PROVIDER_TIMEOUT_SECS;

/// PayPal caps custom_id at 127 chars; we keep well under it.
const CUSTOM_ID_MAX: usize = 120;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct OrderLink {
    rel: String,
    href: String,
}

#[derive(Debug, Deserialize)]
struct CreateOrderResponse {
    id: String,
    #[serde(default)]
    links: Vec<OrderLink>,
}

#[derive(Debug, Deserialize)]
struct CaptureResponse {
    status: String,
    #[serde(default)]
    payer: Option<CapturePayer>,
    #[serde(default)]
    purchase_units: Vec<CapturePurchaseUnit>,
}

#[derive(Debug, Deserialize)]
struct CapturePayer {
    #[serde(default)]
    email_address: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CapturePurchaseUnit {
    #[serde(default)]
    custom_id: Option<String>,
    #[serde(default)]
    payments: Option<CapturePayments>,
}

#[derive(Debug, Deserialize)]
struct CapturePayments {
    #[serde(default)]
    captures: Vec<CaptureDetail>,
}

#[derive(Debug, Deserialize)]
struct CaptureDetail {
    #[serde(default)]
    amount: Option<CaptureAmount>,
}

#[derive(Debug, Deserialize)]
struct CaptureAmount {
    #[serde(default)]
    value: Option<String>,
}

/// What the capture call yields. Addons never appear here; the reconciler
/// recovers them from the stored checkout session.
#[derive(Debug, Clone)]
pub struct PayPalCapture {
    pub status: String,
    pub payer_email: Option<String>,
    pub amount: Option<f64>,
    pub custom_id: Option<String>,
}

impl PayPalCapture {
    pub fn is_completed(&self) -> bool {
        self.status == "COMPLETED"
    }
}

#[derive(Debug, Clone)]
pub struct PayPalClient {
    client: Client,
    client_id: String,
    client_secret: String,
    api_base: String,
}

impl PayPalClient {
    pub fn new(config: &PayPalConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(PROVIDER_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        Self {
            client,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
        }
    }

    /// Short opaque correlation field: product id + truncated email.
    pub fn custom_id(product_id: &str, email: Option<&str>) -> String {
        let email = email.unwrap_or("");
        let mut custom = format!("{}|{}", product_id, email);
        custom.truncate(CUSTOM_ID_MAX);
        custom
    }

    /// Fetched per call: no in-process state is relied on across requests.
    async fn access_token(&self) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/v1/oauth2/token", self.api_base))
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| provider_transport("PayPal token", e))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(classify_provider_error(status, "PayPal", "token", &error_text));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| AppError::Provider(format!("PayPal token: malformed response: {}", e)))?;
        Ok(token.access_token)
    }

    /// Create an order with the amount fixed at creation time. Returns the
    /// provider order id and the buyer approval URL.
    pub async fn create_order(
        &self,
        amount: f64,
        custom_id: &str,
        return_url: &str,
        cancel_url: &str,
    ) -> Result<(String, String)> {
        let token = self.access_token().await?;
        let body = json!({
            "intent": "CAPTURE",
            "purchase_units": [{
                "amount": {
                    "currency_code": "USD",
                    "value": format!("{:.2}", amount),
                },
                "custom_id": custom_id,
            }],
            "application_context": {
                "return_url": return_url,
                "cancel_url": cancel_url,
                "user_action": "PAY_NOW",
            },
        });

        let response = self
            .client
            .post(format!("{}/v2/checkout/orders", self.api_base))
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await
            .map_err(|e| provider_transport("PayPal create order", e))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(classify_provider_error(status, "PayPal", "create order", &error_text));
        }

        let order: CreateOrderResponse = response.json().await.map_err(|e| {
            AppError::Provider(format!("PayPal create order: malformed response: {}", e))
        })?;

        let approve_url = order
            .links
            .iter()
            .find(|l| l.rel == "approve" || l.rel == "payer-action")
            .map(|l| l.href.clone())
            .ok_or_else(|| {
                AppError::Provider("PayPal create order: no approval link in response".into())
            })?;

        Ok((order.id, approve_url))
    }

    /// Explicit capture call that finalizes payment.
    pub async fn capture_order(&self, provider_order_id: &str) -> Result<PayPalCapture> {
        let token = self.access_token().await?;

        let response = self
            .client
            .post(format!(
                "{}/v2/checkout/orders/{}/capture",
                self.api_base, provider_order_id
            ))
            .bearer_auth(&token)
            .header("Content-Type", "application/json")
            .send()
            .await
            .map_err(|e| provider_transport("PayPal capture", e))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(classify_provider_error(status, "PayPal", "capture", &error_text));
        }

        let capture: CaptureResponse = response.json().await.map_err(|e| {
            AppError::Provider(format!("PayPal capture: malformed response: {}", e))
        })?;

        let unit = capture.purchase_units.first();
        let amount = unit
            .and_then(|u| u.payments.as_ref())
            .and_then(|p| p.captures.first())
            .and_then(|c| c.amount.as_ref())
            .and_then(|a| a.value.as_deref())
            .and_then(|v| v.parse::<f64>().ok());

        Ok(PayPalCapture {
            status: capture.status,
            payer_email: capture.payer.and_then(|p| p.email_address),
            amount,
            custom_id: unit.and_then(|u| u.custom_id.clone()),
        })
    }
}
