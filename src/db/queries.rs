use chrono::Utc;
use rusqlite::{params, Connection, ErrorCode};

use crate::error::Result;
use crate::id;
use crate::models::*;

use super::from_row::{
    query_all, query_one, COUPON_COLS, ORDER_COLS, PRODUCT_COLS, SESSION_COLS,
};

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

// ============ Products ============

/// Create a product (seed fixtures and tests; admin CRUD is out of scope).
pub fn create_product(conn: &Connection, input: &CreateProduct) -> Result<Product> {
    let product_id = id::new_row_id();
    let now = now_ms();
    let addons = serde_json::to_string(&input.addons)?;

    conn.execute(
        "INSERT INTO products (id, name, price, sale_price, addons, delivery, provider_product_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            &product_id,
            &input.name,
            input.price,
            input.sale_price,
            &addons,
            &input.delivery,
            &input.provider_product_id,
            now
        ],
    )?;

    Ok(Product {
        id: product_id,
        name: input.name.clone(),
        price: input.price,
        sale_price: input.sale_price,
        addons: input.addons.clone(),
        delivery: input.delivery.clone(),
        provider_product_id: input.provider_product_id.clone(),
        created_at: now,
    })
}

pub fn get_product_by_id(conn: &Connection, product_id: &str) -> Result<Option<Product>> {
    query_one(
        conn,
        &format!("SELECT {} FROM products WHERE id = ?1", PRODUCT_COLS),
        &[&product_id],
    )
}

// ============ Coupons ============

/// Create a coupon (seed fixtures and tests; admin CRUD is out of scope).
pub fn create_coupon(conn: &Connection, input: &CreateCoupon) -> Result<Coupon> {
    let coupon_id = id::new_row_id();
    let now = now_ms();
    let code = input.code.trim().to_string();

    conn.execute(
        "INSERT INTO coupons (id, code, discount_type, discount_value, min_order_amount, max_uses, valid_from, valid_until, status, used_count, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'active', 0, ?9)",
        params![
            &coupon_id,
            &code,
            input.discount_type.to_string(),
            input.discount_value,
            input.min_order_amount,
            input.max_uses,
            input.valid_from,
            input.valid_until,
            now
        ],
    )?;

    Ok(Coupon {
        id: coupon_id,
        code,
        discount_type: input.discount_type,
        discount_value: input.discount_value,
        min_order_amount: input.min_order_amount,
        max_uses: input.max_uses,
        valid_from: input.valid_from,
        valid_until: input.valid_until,
        status: CouponStatus::Active,
        used_count: 0,
        created_at: now,
    })
}

/// Case-insensitive coupon lookup (the column carries NOCASE collation).
pub fn get_coupon_by_code(conn: &Connection, code: &str) -> Result<Option<Coupon>> {
    let code = code.trim();
    query_one(
        conn,
        &format!("SELECT {} FROM coupons WHERE code = ?1", COUPON_COLS),
        &[&code],
    )
}

// ============ Checkout sessions ============

/// Open a pending session with `expires_at = now + ttl`.
pub fn open_checkout_session(
    conn: &Connection,
    input: &CreateCheckoutSession,
) -> Result<CheckoutSession> {
    let now = now_ms();
    let expires_at = now + input.ttl_ms;
    let metadata = serde_json::to_string(&input.metadata)?;

    conn.execute(
        "INSERT INTO checkout_sessions (checkout_id, product_id, provider, secondary_id, metadata, expires_at, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending', ?7)",
        params![
            &input.checkout_id,
            &input.product_id,
            &input.provider,
            &input.secondary_id,
            &metadata,
            expires_at,
            now
        ],
    )?;

    Ok(CheckoutSession {
        checkout_id: input.checkout_id.clone(),
        product_id: input.product_id.clone(),
        provider: input.provider.clone(),
        secondary_id: input.secondary_id.clone(),
        metadata: input.metadata.clone(),
        expires_at,
        status: SessionStatus::Pending,
        created_at: now,
        completed_at: None,
        retired_at: None,
    })
}

pub fn get_checkout_session(conn: &Connection, checkout_id: &str) -> Result<Option<CheckoutSession>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM checkout_sessions WHERE checkout_id = ?1",
            SESSION_COLS
        ),
        &[&checkout_id],
    )
}

/// Stored metadata blob for recovery when an inbound event is incomplete.
pub fn get_session_metadata(conn: &Connection, checkout_id: &str) -> Result<Option<serde_json::Value>> {
    Ok(get_checkout_session(conn, checkout_id)?.map(|s| s.metadata))
}

/// Re-key a placeholder session row to the provider's real checkout id.
/// Returns false if the placeholder row no longer exists.
pub fn rekey_checkout_session(conn: &Connection, old_id: &str, new_id: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE checkout_sessions SET checkout_id = ?2 WHERE checkout_id = ?1",
        params![old_id, new_id],
    )?;
    Ok(affected > 0)
}

/// Transition pending -> completed. Idempotent: returns false (not an error)
/// when the session is already completed or archived, or does not exist.
pub fn complete_checkout_session(conn: &Connection, checkout_id: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE checkout_sessions SET status = 'completed', completed_at = ?2
         WHERE checkout_id = ?1 AND status = 'pending'",
        params![checkout_id, now_ms()],
    )?;
    Ok(affected > 0)
}

/// Transition pending -> archived. Idempotent like `complete_checkout_session`.
pub fn archive_checkout_session(conn: &Connection, checkout_id: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE checkout_sessions SET status = 'archived' WHERE checkout_id = ?1 AND status = 'pending'",
        params![checkout_id],
    )?;
    Ok(affected > 0)
}

/// Record that the provider-side artifacts behind a session are gone.
/// Returns false when the session does not exist or is already marked.
pub fn mark_session_retired(conn: &Connection, checkout_id: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE checkout_sessions SET retired_at = ?2 WHERE checkout_id = ?1 AND retired_at IS NULL",
        params![checkout_id, now_ms()],
    )?;
    Ok(affected > 0)
}

/// Sessions the sweeper owes a retirement attempt, oldest first, bounded
/// batch: pending sessions past their expiry, plus completed sessions whose
/// post-payment retirement never succeeded.
pub fn list_sessions_needing_retirement(
    conn: &Connection,
    now: i64,
    limit: i64,
) -> Result<Vec<CheckoutSession>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM checkout_sessions
             WHERE (status = 'pending' AND expires_at < ?1)
                OR (status = 'completed' AND retired_at IS NULL)
             ORDER BY expires_at ASC LIMIT ?2",
            SESSION_COLS
        ),
        &[&now, &limit],
    )
}

// ============ Orders ============

/// Insert an order. Returns `None` when the (provider, checkout_id) unique
/// index rejects the insert - the payment event was already reconciled.
pub fn create_order(conn: &Connection, input: &CreateOrder) -> Result<Option<Order>> {
    let order_id = id::new_order_id();
    let now = now_ms();
    let payload = serde_json::to_string(&input.payload)?;

    let inserted = conn.execute(
        "INSERT INTO orders (id, product_id, provider, checkout_id, status, payload, delivery_time_minutes, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            &order_id,
            &input.product_id,
            &input.provider,
            &input.checkout_id,
            input.status.to_string(),
            &payload,
            input.delivery_time_minutes,
            now
        ],
    );

    match inserted {
        Ok(_) => Ok(Some(Order {
            id: order_id,
            product_id: input.product_id.clone(),
            provider: input.provider.clone(),
            checkout_id: input.checkout_id.clone(),
            status: input.status,
            payload: input.payload.clone(),
            delivery_time_minutes: input.delivery_time_minutes,
            created_at: now,
            delivered_at: None,
        })),
        Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

pub fn get_order_by_id(conn: &Connection, order_id: &str) -> Result<Option<Order>> {
    query_one(
        conn,
        &format!("SELECT {} FROM orders WHERE id = ?1", ORDER_COLS),
        &[&order_id],
    )
}

/// Primary dedupe lookup: an order already carrying this provider
/// checkout/session id.
pub fn find_order_by_checkout(
    conn: &Connection,
    provider: &str,
    checkout_id: &str,
) -> Result<Option<Order>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM orders WHERE provider = ?1 AND checkout_id = ?2",
            ORDER_COLS
        ),
        &[&provider, &checkout_id],
    )
}

/// Fallback dedupe heuristic: an order for the same product created since
/// `since_ms` whose payload contains the candidate email. Best-effort guard
/// for events that arrive without a correlation id.
pub fn find_recent_order_for_product_email(
    conn: &Connection,
    product_id: &str,
    email: &str,
    since_ms: i64,
) -> Result<Option<Order>> {
    // LIKE metacharacters in the email must match literally, not as
    // wildcards: a_b@example.com must not dedupe axb@example.com.
    let escaped = email
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    query_one(
        conn,
        &format!(
            "SELECT {} FROM orders
             WHERE product_id = ?1 AND created_at >= ?2
               AND payload LIKE '%' || ?3 || '%' ESCAPE '\\'
             ORDER BY created_at DESC LIMIT 1",
            ORDER_COLS
        ),
        &[&product_id, &since_ms, &escaped],
    )
}

/// Mark a tip as paid on an existing order. Returns the updated order, or
/// None if the order does not exist.
pub fn set_order_tip(conn: &Connection, order_id: &str, amount: f64) -> Result<Option<Order>> {
    let Some(mut order) = get_order_by_id(conn, order_id)? else {
        return Ok(None);
    };

    let mut payload = OrderPayload::from_value(&order.payload);
    payload.tip_paid = true;
    payload.tip_amount = Some(amount);
    order.payload = payload.to_value();

    conn.execute(
        "UPDATE orders SET payload = ?2 WHERE id = ?1",
        params![order_id, serde_json::to_string(&order.payload)?],
    )?;
    Ok(Some(order))
}

pub fn count_orders(conn: &Connection) -> Result<i64> {
    let count = conn.query_row("SELECT COUNT(*) FROM orders", [], |row| row.get(0))?;
    Ok(count)
}
