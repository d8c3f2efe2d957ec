use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Durable order record. At most one order may ever exist for a given
/// (provider, checkout_id) pair; the storage layer enforces this with a
/// unique index, which is the reconciler's correctness guarantee.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Human-shareable id (`ord_…`).
    pub id: String,
    pub product_id: String,
    /// Provenance: which provider and which checkout/session produced this
    /// order. Null for orders created outside the payment pipeline.
    pub provider: Option<String>,
    pub checkout_id: Option<String>,
    pub status: OrderStatus,
    /// Opaque payload: email, final amount, addons, provenance ids, tip
    /// fields.
    pub payload: serde_json::Value,
    pub delivery_time_minutes: i64,
    pub created_at: i64,
    pub delivered_at: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Paid,
    Delivered,
    Revision,
    Completed,
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "paid" => Ok(OrderStatus::Paid),
            "delivered" => Ok(OrderStatus::Delivered),
            "revision" => Ok(OrderStatus::Revision),
            "completed" => Ok(OrderStatus::Completed),
            _ => Err(format!("Invalid order status: {}", s)),
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Revision => "revision",
            OrderStatus::Completed => "completed",
        };
        write!(f, "{}", s)
    }
}

/// Data required to insert an order.
#[derive(Debug, Clone)]
pub struct CreateOrder {
    pub product_id: String,
    pub provider: Option<String>,
    pub checkout_id: Option<String>,
    pub status: OrderStatus,
    pub payload: serde_json::Value,
    pub delivery_time_minutes: i64,
}

/// Typed view over the order payload blob.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub addons: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkout_id: Option<String>,
    /// Provider-side membership/plan id for dynamic-plan purchases.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub membership_id: Option<String>,
    #[serde(default)]
    pub tip_paid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tip_amount: Option<f64>,
}

impl OrderPayload {
    pub fn from_value(value: &serde_json::Value) -> Self {
        serde_json::from_value(value.clone()).unwrap_or_default()
    }

    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
