mod paypal;
mod whop;

pub use paypal::*;
pub use whop::*;

use std::str::FromStr;

use crate::config::Config;
use crate::error::{msg, AppError, Result};
use crate::id;
use crate::models::CheckoutSession;

/// Outbound provider calls are time-boxed; a timeout is retryable and
/// reported separately from a provider rejection.
pub const PROVIDER_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentProvider {
    /// Dynamic-plan provider: a one-time plan is created at the computed
    /// price, then a checkout session against it. Payment success arrives
    /// as a push webhook.
    Whop,
    /// Order/capture provider: the amount is fixed at order creation and a
    /// separate capture call finalizes payment synchronously.
    PayPal,
}

impl PaymentProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentProvider::Whop => "whop",
            PaymentProvider::PayPal => "paypal",
        }
    }
}

impl FromStr for PaymentProvider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "whop" => Ok(PaymentProvider::Whop),
            "paypal" => Ok(PaymentProvider::PayPal),
            other => Err(format!("Unknown payment provider: {}", other)),
        }
    }
}

/// Configured provider clients. Either provider may be absent; endpoints
/// that need a missing one answer "provider not configured".
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    pub whop: Option<WhopClient>,
    pub paypal: Option<PayPalClient>,
}

impl ProviderRegistry {
    pub fn from_config(config: &Config) -> Self {
        Self {
            whop: config.whop.as_ref().map(WhopClient::new),
            paypal: config.paypal.as_ref().map(PayPalClient::new),
        }
    }

    pub fn whop(&self) -> Result<&WhopClient> {
        self.whop
            .as_ref()
            .ok_or_else(|| AppError::Internal(msg::PROVIDER_NOT_CONFIGURED.into()))
    }

    pub fn paypal(&self) -> Result<&PayPalClient> {
        self.paypal
            .as_ref()
            .ok_or_else(|| AppError::Internal(msg::PROVIDER_NOT_CONFIGURED.into()))
    }

    /// Pick a provider when the request does not name one: use the only
    /// configured provider, or fail if both/neither are available.
    pub fn auto_detect(&self) -> Result<PaymentProvider> {
        match (&self.whop, &self.paypal) {
            (Some(_), None) => Ok(PaymentProvider::Whop),
            (None, Some(_)) => Ok(PaymentProvider::PayPal),
            (Some(_), Some(_)) => Err(AppError::BadRequest(
                "Multiple payment providers configured. Specify 'provider' (whop or paypal)."
                    .into(),
            )),
            (None, None) => Err(AppError::Internal(msg::PROVIDER_NOT_CONFIGURED.into())),
        }
    }

    /// Retire the provider-side artifacts behind a checkout session.
    ///
    /// Dynamic-plan artifacts are archived, falling back to a hard delete,
    /// with "already gone" treated as success. Order/capture artifacts lapse
    /// on the provider side and need no call.
    pub async fn retire_session(&self, session: &CheckoutSession) -> Result<()> {
        match session.provider.parse::<PaymentProvider>() {
            Ok(PaymentProvider::Whop) => {
                let client = self.whop()?;
                // A placeholder checkout id means the provider session was
                // never created; only the plan needs retiring.
                let checkout_id = if id::is_plan_placeholder(&session.checkout_id) {
                    None
                } else {
                    Some(session.checkout_id.as_str())
                };
                client
                    .retire_artifacts(session.secondary_id.as_deref(), checkout_id)
                    .await
            }
            Ok(PaymentProvider::PayPal) => Ok(()),
            Err(e) => Err(AppError::Internal(e)),
        }
    }
}
