//! Prefixed ID generation for storefront entities.
//!
//! Order ids are human-shareable (`ord_` + 12 hex chars) and deliberately
//! short; everything else uses the full uuid. The `plan_` prefix marks a
//! locally generated placeholder checkout id used while the dynamic-plan
//! provider has not yet returned its own session id.

use uuid::Uuid;

/// Globally unique, human-shareable order id (e.g. `ord_a1b2c3d4e5f6`).
pub fn new_order_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("ord_{}", &hex[..12])
}

/// Internal row id for coupons and seed fixtures.
pub fn new_row_id() -> String {
    Uuid::new_v4().to_string()
}

/// Placeholder checkout id keyed on the provider plan, used to track the
/// session row before the provider's real checkout id is known.
pub fn plan_placeholder(plan_id: &str) -> String {
    format!("plan_{}", plan_id)
}

/// True if a checkout id is a local placeholder rather than a provider id.
pub fn is_plan_placeholder(checkout_id: &str) -> bool {
    checkout_id.starts_with("plan_")
}
