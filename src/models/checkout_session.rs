use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Ephemeral purchase intent scoped to one provider transaction.
///
/// `checkout_id` is the provider's id, or a local `plan_<planId>` placeholder
/// until the dynamic-plan provider returns its real session id. The metadata
/// blob written at creation time is the source of truth for price and addons:
/// inbound payment events are reconciled against it, not trusted over it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub checkout_id: String,
    pub product_id: String,
    pub provider: String,
    /// Provider-specific secondary id (the plan id for dynamic-plan flows).
    pub secondary_id: Option<String>,
    pub metadata: serde_json::Value,
    /// Epoch ms.
    pub expires_at: i64,
    pub status: SessionStatus,
    pub created_at: i64,
    pub completed_at: Option<i64>,
    /// When the provider-side artifacts were successfully retired. Null
    /// means the sweeper still owes this session a retirement attempt.
    pub retired_at: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    Completed,
    Archived,
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SessionStatus::Pending),
            "completed" => Ok(SessionStatus::Completed),
            "archived" => Ok(SessionStatus::Archived),
            _ => Err(format!("Invalid session status: {}", s)),
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Pending => write!(f, "pending"),
            SessionStatus::Completed => write!(f, "completed"),
            SessionStatus::Archived => write!(f, "archived"),
        }
    }
}

/// Data required to open a checkout session.
#[derive(Debug, Clone)]
pub struct CreateCheckoutSession {
    pub checkout_id: String,
    pub product_id: String,
    pub provider: String,
    pub secondary_id: Option<String>,
    pub metadata: serde_json::Value,
    /// Time to live, ms. The system default is 15 minutes.
    pub ttl_ms: i64,
}

/// Typed view over the session metadata blob. Every field is optional
/// because provider callbacks routinely omit what the creation call knew.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub addons: Option<serde_json::Value>,
    /// Server-computed price. Wins over any amount in an inbound event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_time_minutes: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,
    /// Event sub-type, e.g. "tip" for tip payments against an existing order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_type: Option<String>,
    /// For tips: the order the tip applies to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
}

impl SessionMetadata {
    pub fn from_value(value: &serde_json::Value) -> Self {
        serde_json::from_value(value.clone()).unwrap_or_default()
    }

    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
