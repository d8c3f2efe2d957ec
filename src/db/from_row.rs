//! Row mapping trait and helpers for reducing boilerplate in queries.

use rusqlite::{Connection, OptionalExtension, Row, ToSql};

use crate::models::*;

/// Parse a string column into an enum type, converting parse errors to
/// rusqlite errors instead of panicking on corrupt data.
fn parse_enum<T: std::str::FromStr>(row: &Row, col: usize, col_name: &str) -> rusqlite::Result<T> {
    row.get::<_, String>(col)?.parse::<T>().map_err(|_| {
        rusqlite::Error::InvalidColumnType(col, col_name.to_string(), rusqlite::types::Type::Text)
    })
}

/// Parse a TEXT column holding JSON. Invalid JSON degrades to the provided
/// fallback rather than failing the whole row.
fn parse_json(row: &Row, col: usize, fallback: serde_json::Value) -> rusqlite::Result<serde_json::Value> {
    let raw: String = row.get(col)?;
    Ok(serde_json::from_str(&raw).unwrap_or(fallback))
}

/// Trait for constructing a type from a database row.
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

/// Query for a single optional result.
pub fn query_one<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Option<T>> {
    conn.query_row(sql, params, T::from_row)
        .optional()
        .map_err(Into::into)
}

/// Query for multiple results.
pub fn query_all<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, T::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ============ SQL SELECT Constants ============

pub const PRODUCT_COLS: &str =
    "id, name, price, sale_price, addons, delivery, provider_product_id, created_at";

pub const COUPON_COLS: &str = "id, code, discount_type, discount_value, min_order_amount, max_uses, valid_from, valid_until, status, used_count, created_at";

pub const SESSION_COLS: &str = "checkout_id, product_id, provider, secondary_id, metadata, expires_at, status, created_at, completed_at, retired_at";

pub const ORDER_COLS: &str = "id, product_id, provider, checkout_id, status, payload, delivery_time_minutes, created_at, delivered_at";

// ============ FromRow Implementations ============

impl FromRow for Product {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let addons_raw: String = row.get(4)?;
        // A malformed addon schema means "no addons", not a broken product.
        let addons: Vec<AddonField> = serde_json::from_str(&addons_raw).unwrap_or_default();
        Ok(Product {
            id: row.get(0)?,
            name: row.get(1)?,
            price: row.get(2)?,
            sale_price: row.get(3)?,
            addons,
            delivery: row.get(5)?,
            provider_product_id: row.get(6)?,
            created_at: row.get(7)?,
        })
    }
}

impl FromRow for Coupon {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Coupon {
            id: row.get(0)?,
            code: row.get(1)?,
            discount_type: parse_enum(row, 2, "discount_type")?,
            discount_value: row.get(3)?,
            min_order_amount: row.get(4)?,
            max_uses: row.get(5)?,
            valid_from: row.get(6)?,
            valid_until: row.get(7)?,
            status: parse_enum(row, 8, "status")?,
            used_count: row.get(9)?,
            created_at: row.get(10)?,
        })
    }
}

impl FromRow for CheckoutSession {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(CheckoutSession {
            checkout_id: row.get(0)?,
            product_id: row.get(1)?,
            provider: row.get(2)?,
            secondary_id: row.get(3)?,
            metadata: parse_json(row, 4, serde_json::json!({}))?,
            expires_at: row.get(5)?,
            status: parse_enum(row, 6, "status")?,
            created_at: row.get(7)?,
            completed_at: row.get(8)?,
            retired_at: row.get(9)?,
        })
    }
}

impl FromRow for Order {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Order {
            id: row.get(0)?,
            product_id: row.get(1)?,
            provider: row.get(2)?,
            checkout_id: row.get(3)?,
            status: parse_enum(row, 4, "status")?,
            payload: parse_json(row, 5, serde_json::json!({}))?,
            delivery_time_minutes: row.get(6)?,
            created_at: row.get(7)?,
            delivered_at: row.get(8)?,
        })
    }
}
