//! Dynamic-plan provider adapter (Whop).
//!
//! Price is not fixed per product at this provider, so every checkout first
//! creates a one-time plan priced at the server-computed amount, then a
//! checkout session against that plan. Both artifacts must be retired after
//! a successful payment - a live plan lets the buyer reuse the purchase URL
//! at the already-paid price.

use std::time::Duration;

use hmac::{Hmac, Mac};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::config::WhopConfig;
use crate::error::{msg, provider_transport, AppError, Result};

use super::PROVIDER_TIMEOUT_SECS;

type HmacSha256 = Hmac<Sha256>;

const API_BASE: &str = "https://api.whop.com/api/v2";

#[derive(Debug, Deserialize)]
struct CreatePlanResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct CreateCheckoutSessionResponse {
    id: String,
    purchase_url: String,
}

#[derive(Debug, Clone)]
pub struct WhopClient {
    client: Client,
    api_key: String,
    default_product_id: Option<String>,
    webhook_secret: Option<String>,
}

impl WhopClient {
    pub fn new(config: &WhopConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(PROVIDER_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_key: config.api_key.clone(),
            default_product_id: config.default_product_id.clone(),
            webhook_secret: config.webhook_secret.clone(),
        }
    }

    pub fn default_product_id(&self) -> Option<&str> {
        self.default_product_id.as_deref()
    }

    pub fn has_webhook_secret(&self) -> bool {
        self.webhook_secret.is_some()
    }

    /// Create a one-time plan priced at the server-computed amount.
    /// The plan is created hidden so it never shows up in the storefront's
    /// provider-side listing.
    pub async fn create_plan(
        &self,
        price: f64,
        provider_product_id: &str,
        metadata: &serde_json::Value,
    ) -> Result<String> {
        let body = json!({
            "plan_type": "one_time",
            "base_currency": "usd",
            "initial_price": price,
            "product_id": provider_product_id,
            "visibility": "hidden",
            "metadata": metadata,
        });

        let response = self
            .client
            .post(format!("{}/plans", API_BASE))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| provider_transport("Whop create plan", e))?;

        let plan: CreatePlanResponse = Self::parse_response(response, "create plan").await?;
        Ok(plan.id)
    }

    /// Create a checkout session against a plan, returning the provider's
    /// session id and the buyer-facing purchase URL.
    pub async fn create_checkout_session(
        &self,
        plan_id: &str,
        redirect_url: &str,
        metadata: &serde_json::Value,
    ) -> Result<(String, String)> {
        let body = json!({
            "plan_id": plan_id,
            "redirect_url": redirect_url,
            "metadata": metadata,
        });

        let response = self
            .client
            .post(format!("{}/checkout_sessions", API_BASE))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| provider_transport("Whop create checkout session", e))?;

        let session: CreateCheckoutSessionResponse =
            Self::parse_response(response, "create checkout session").await?;
        Ok((session.id, session.purchase_url))
    }

    /// Hide a plan (soft retirement). 404 counts as success.
    pub async fn archive_plan(&self, plan_id: &str) -> Result<()> {
        let response = self
            .client
            .post(format!("{}/plans/{}", API_BASE, plan_id))
            .bearer_auth(&self.api_key)
            .json(&json!({ "visibility": "archived" }))
            .send()
            .await
            .map_err(|e| provider_transport("Whop archive plan", e))?;
        Self::expect_gone_or_ok(response, "archive plan").await
    }

    /// Hard-delete a plan. 404 counts as success.
    pub async fn delete_plan(&self, plan_id: &str) -> Result<()> {
        let response = self
            .client
            .delete(format!("{}/plans/{}", API_BASE, plan_id))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| provider_transport("Whop delete plan", e))?;
        Self::expect_gone_or_ok(response, "delete plan").await
    }

    /// Delete a checkout session. 404 counts as success.
    pub async fn delete_checkout_session(&self, checkout_id: &str) -> Result<()> {
        let response = self
            .client
            .delete(format!("{}/checkout_sessions/{}", API_BASE, checkout_id))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| provider_transport("Whop delete checkout session", e))?;
        Self::expect_gone_or_ok(response, "delete checkout session").await
    }

    /// Retire both artifacts behind a purchase: archive the plan, fall back
    /// to a hard delete if archiving fails, then delete the checkout
    /// session. "Already gone" is success throughout.
    pub async fn retire_artifacts(
        &self,
        plan_id: Option<&str>,
        checkout_id: Option<&str>,
    ) -> Result<()> {
        if let Some(plan_id) = plan_id {
            if let Err(archive_err) = self.archive_plan(plan_id).await {
                tracing::warn!(
                    plan_id,
                    error = %archive_err,
                    "plan archive failed, falling back to delete"
                );
                self.delete_plan(plan_id).await?;
            }
        }
        if let Some(checkout_id) = checkout_id {
            self.delete_checkout_session(checkout_id).await?;
        }
        Ok(())
    }

    /// Verify the webhook HMAC (SHA-256 over the raw body, hex-encoded),
    /// comparing in constant time. Returns Ok(true) when no secret is
    /// configured - verification is opt-in.
    pub fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> Result<bool> {
        let Some(ref secret) = self.webhook_secret else {
            return Ok(true);
        };

        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|_| AppError::Internal(msg::INVALID_WEBHOOK_SECRET.into()))?;
        mac.update(payload);
        let expected = hex::encode(mac.finalize().into_bytes());

        let expected_bytes = expected.as_bytes();
        let provided_bytes = signature.as_bytes();

        // Length is not secret (always 64 hex chars for SHA-256), so a
        // non-constant-time length check is fine.
        if expected_bytes.len() != provided_bytes.len() {
            return Ok(false);
        }

        Ok(expected_bytes.ct_eq(provided_bytes).into())
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
        context: &str,
    ) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(classify_provider_error(status, "Whop", context, &error_text));
        }
        response
            .json()
            .await
            .map_err(|e| AppError::Provider(format!("Whop {}: malformed response: {}", context, e)))
    }

    async fn expect_gone_or_ok(response: reqwest::Response, context: &str) -> Result<()> {
        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            return Ok(());
        }
        let error_text = response.text().await.unwrap_or_default();
        Err(classify_provider_error(status, "Whop", context, &error_text))
    }
}

/// Map a provider HTTP status to the error taxonomy: 4xx is a rejection
/// (never retried), everything else is transport (retryable), with the
/// provider's error text passed through.
pub(super) fn classify_provider_error(
    status: StatusCode,
    provider: &str,
    context: &str,
    error_text: &str,
) -> AppError {
    let detail = format!("{} {}: {} {}", provider, context, status, error_text);
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        AppError::ProviderRejected(detail)
    } else if status.is_client_error() {
        AppError::ProviderRejected(detail)
    } else {
        AppError::Provider(detail)
    }
}

// ============ Webhook envelope ============

/// Push webhook envelope. Some deliveries carry `action`, others `type`;
/// both are accepted.
#[derive(Debug, Deserialize)]
pub struct WhopWebhookEvent {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(rename = "type", default)]
    pub event_type: Option<String>,
    pub data: WhopEventData,
}

impl WhopWebhookEvent {
    pub fn event_name(&self) -> &str {
        self.action
            .as_deref()
            .or(self.event_type.as_deref())
            .unwrap_or("")
    }
}

#[derive(Debug, Deserialize)]
pub struct WhopEventData {
    /// Membership/payment id, kept as provenance on the order.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub checkout_session_id: Option<String>,
    /// Async callbacks routinely omit fields the creation call had; the
    /// stored session metadata fills the gaps.
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_email: Option<String>,
    #[serde(default)]
    pub final_amount: Option<f64>,
    #[serde(default)]
    pub product_id: Option<String>,
}
