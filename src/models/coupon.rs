use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Discount coupon. Managed by admin CRUD (out of scope); read-only in the
/// pricing engine. `used_count` is read for usage-cap checks but never
/// incremented here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Coupon {
    pub id: String,
    /// Unique, matched case-insensitively.
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: f64,
    pub min_order_amount: f64,
    /// 0 = unlimited.
    pub max_uses: i64,
    /// Validity window bounds, epoch ms. None = unbounded.
    pub valid_from: Option<i64>,
    pub valid_until: Option<i64>,
    pub status: CouponStatus,
    pub used_count: i64,
    pub created_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    Percentage,
    Fixed,
}

impl FromStr for DiscountType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "percentage" => Ok(DiscountType::Percentage),
            "fixed" => Ok(DiscountType::Fixed),
            _ => Err(format!("Invalid discount type: {}", s)),
        }
    }
}

impl fmt::Display for DiscountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscountType::Percentage => write!(f, "percentage"),
            DiscountType::Fixed => write!(f, "fixed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CouponStatus {
    Active,
    Disabled,
}

impl FromStr for CouponStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(CouponStatus::Active),
            "disabled" => Ok(CouponStatus::Disabled),
            _ => Err(format!("Invalid coupon status: {}", s)),
        }
    }
}

impl fmt::Display for CouponStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CouponStatus::Active => write!(f, "active"),
            CouponStatus::Disabled => write!(f, "disabled"),
        }
    }
}

/// Data required to create a coupon (seed fixtures and tests only).
#[derive(Debug, Clone, Deserialize)]
pub struct CreateCoupon {
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: f64,
    #[serde(default)]
    pub min_order_amount: f64,
    #[serde(default)]
    pub max_uses: i64,
    #[serde(default)]
    pub valid_from: Option<i64>,
    #[serde(default)]
    pub valid_until: Option<i64>,
}
