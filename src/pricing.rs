//! Authoritative server-side pricing.
//!
//! The computed price is the only price the system trusts: it is written
//! into the checkout session metadata at creation time and later reconciled
//! against whatever amount an inbound payment event claims.
//!
//! All functions are pure and take `now_ms` explicitly so coupon validity
//! windows are deterministic under test.

use serde::Deserialize;

use crate::error::{msg, AppError, Result};
use crate::models::{Coupon, CouponStatus, DiscountType, Product};

/// A buyer's addon selection: a field from the product's addon schema and
/// the chosen option (matched against the option's label or value).
#[derive(Debug, Clone, Deserialize)]
pub struct SelectedAddon {
    pub field: String,
    pub value: String,
}

/// Why a coupon did not apply. Rejections degrade to "no discount" - a
/// misbehaving coupon must never block a sale - but the reason is kept
/// explicit for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CouponRejection {
    Disabled,
    NotYetValid,
    Expired,
    UsageExhausted,
    BelowMinimum,
}

impl CouponRejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            CouponRejection::Disabled => "disabled",
            CouponRejection::NotYetValid => "not_yet_valid",
            CouponRejection::Expired => "expired",
            CouponRejection::UsageExhausted => "usage_exhausted",
            CouponRejection::BelowMinimum => "below_minimum",
        }
    }
}

fn round2(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

/// Base price: sale price if present, else the normal price. Hard failure
/// when the effective price is not a finite number >= 0.
pub fn base_price(product: &Product) -> Result<f64> {
    let price = product.sale_price.unwrap_or(product.price);
    if !price.is_finite() || price < 0.0 {
        return Err(AppError::BadRequest(msg::INVALID_PRODUCT_PRICE.into()));
    }
    Ok(price)
}

/// Sum of matched addon option prices. Selections that match nothing in the
/// product's schema contribute nothing.
pub fn addons_total(product: &Product, selections: &[SelectedAddon]) -> f64 {
    let mut total = 0.0;
    for selection in selections {
        let field = selection.field.trim();
        let value = selection.value.trim();

        let Some(addon_field) = product
            .addons
            .iter()
            .find(|a| a.field.trim().eq_ignore_ascii_case(field))
        else {
            continue;
        };

        let matched = addon_field.options.iter().find(|opt| {
            opt.label.trim().eq_ignore_ascii_case(value)
                || opt.value.trim().eq_ignore_ascii_case(value)
        });

        if let Some(option) = matched {
            total += option.price_amount();
        }
    }
    total
}

/// Eligibility gates, checked in order: status, validity window, usage cap,
/// minimum order amount.
pub fn check_coupon(
    coupon: &Coupon,
    order_total: f64,
    now_ms: i64,
) -> std::result::Result<(), CouponRejection> {
    if coupon.status != CouponStatus::Active {
        return Err(CouponRejection::Disabled);
    }
    if let Some(from) = coupon.valid_from {
        if now_ms < from {
            return Err(CouponRejection::NotYetValid);
        }
    }
    if let Some(until) = coupon.valid_until {
        if now_ms > until {
            return Err(CouponRejection::Expired);
        }
    }
    if coupon.max_uses > 0 && coupon.used_count >= coupon.max_uses {
        return Err(CouponRejection::UsageExhausted);
    }
    if order_total < coupon.min_order_amount {
        return Err(CouponRejection::BelowMinimum);
    }
    Ok(())
}

/// Discount for an eligible coupon, floored at zero.
pub fn apply_coupon(total: f64, coupon: &Coupon) -> f64 {
    let discount = match coupon.discount_type {
        DiscountType::Percentage => total * coupon.discount_value / 100.0,
        DiscountType::Fixed => coupon.discount_value.min(total),
    };
    (total - discount).max(0.0)
}

/// Full price computation: base + matched addons, optional coupon, rounded
/// to 2 decimal places. An ineligible coupon yields the same result as no
/// coupon at all.
pub fn compute_price(
    product: &Product,
    selections: &[SelectedAddon],
    coupon: Option<&Coupon>,
    now_ms: i64,
) -> Result<f64> {
    let mut total = base_price(product)? + addons_total(product, selections);

    if let Some(coupon) = coupon {
        match check_coupon(coupon, total, now_ms) {
            Ok(()) => {
                total = apply_coupon(total, coupon);
            }
            Err(reason) => {
                tracing::debug!(
                    code = %coupon.code,
                    reason = reason.as_str(),
                    "coupon not applied"
                );
            }
        }
    }

    Ok(round2(total.max(0.0)))
}
