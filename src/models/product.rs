use serde::{Deserialize, Serialize};

/// Read-only product snapshot consumed by the pricing engine and the
/// checkout flow. Products are managed by the admin CRUD surface; this
/// engine never mutates them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub price: f64,
    pub sale_price: Option<f64>,
    /// Ordered addon schema: each field offers a list of priced options.
    pub addons: Vec<AddonField>,
    /// Delivery mode: "instant" or an N-day string ("3-day", "3").
    pub delivery: String,
    /// The dynamic-plan provider's product id the one-time plans attach to.
    pub provider_product_id: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddonField {
    pub field: String,
    #[serde(default)]
    pub options: Vec<AddonOption>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddonOption {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub value: String,
    /// Kept loose on purpose: admin-entered schemas carry prices as numbers
    /// or strings, and a missing/non-numeric price counts as 0.
    #[serde(default)]
    pub price: serde_json::Value,
}

impl AddonOption {
    pub fn price_amount(&self) -> f64 {
        match &self.price {
            serde_json::Value::Number(n) => n.as_f64().unwrap_or(0.0),
            serde_json::Value::String(s) => s.trim().parse().unwrap_or(0.0),
            _ => 0.0,
        }
    }
}

impl Product {
    /// Delivery window in minutes derived from the delivery mode:
    /// instant maps to 60, "N-day" to N x 1440 (N defaults to 1 when the
    /// leading number is unparseable).
    pub fn delivery_minutes(&self) -> i64 {
        let delivery = self.delivery.trim();
        if delivery.eq_ignore_ascii_case("instant") || delivery.is_empty() {
            return 60;
        }
        let digits: String = delivery.chars().take_while(|c| c.is_ascii_digit()).collect();
        let days: i64 = digits.parse().unwrap_or(1).max(1);
        days * 1440
    }
}

/// Data required to create a product (seed fixtures and tests only).
#[derive(Debug, Clone, Deserialize)]
pub struct CreateProduct {
    pub name: String,
    pub price: f64,
    #[serde(default)]
    pub sale_price: Option<f64>,
    #[serde(default)]
    pub addons: Vec<AddonField>,
    #[serde(default = "default_delivery")]
    pub delivery: String,
    #[serde(default)]
    pub provider_product_id: Option<String>,
}

fn default_delivery() -> String {
    "instant".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(delivery: &str) -> Product {
        Product {
            id: "p1".to_string(),
            name: "Test".to_string(),
            price: 10.0,
            sale_price: None,
            addons: vec![],
            delivery: delivery.to_string(),
            provider_product_id: None,
            created_at: 0,
        }
    }

    #[test]
    fn delivery_minutes_instant() {
        assert_eq!(product("instant").delivery_minutes(), 60);
        assert_eq!(product("Instant").delivery_minutes(), 60);
        assert_eq!(product("").delivery_minutes(), 60);
    }

    #[test]
    fn delivery_minutes_n_day() {
        assert_eq!(product("3-day").delivery_minutes(), 3 * 1440);
        assert_eq!(product("7 day").delivery_minutes(), 7 * 1440);
        assert_eq!(product("2").delivery_minutes(), 2 * 1440);
    }

    #[test]
    fn delivery_minutes_unparseable_defaults_to_one_day() {
        assert_eq!(product("soon").delivery_minutes(), 1440);
        assert_eq!(product("-day").delivery_minutes(), 1440);
    }
}
