//! Test utilities and fixtures for storefront integration tests

#![allow(dead_code)]

use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;

pub use storefront::cache::TtlCache;
pub use storefront::db::{init_db, queries, AppState};
pub use storefront::models::*;
pub use storefront::payments::ProviderRegistry;
pub use storefront::pricing::SelectedAddon;
pub use storefront::reconcile::{process_payment, PaymentEvent, ReconcileOutcome};

/// Create an in-memory test database with schema initialized
pub fn setup_test_db() -> Connection {
    let conn = Connection::open_in_memory().expect("Failed to create in-memory database");
    init_db(&conn).expect("Failed to initialize schema");
    conn
}

/// Create a test product with a Speed/Rush addon (base 20.0, rush +5.0)
pub fn create_test_product(conn: &Connection, name: &str) -> Product {
    let input = CreateProduct {
        name: name.to_string(),
        price: 20.0,
        sale_price: None,
        addons: vec![AddonField {
            field: "Speed".to_string(),
            options: vec![AddonOption {
                label: "Rush".to_string(),
                value: "rush".to_string(),
                price: serde_json::json!(5.0),
            }],
        }],
        delivery: "2-day".to_string(),
        provider_product_id: None,
    };
    queries::create_product(conn, &input).expect("Failed to create test product")
}

/// Create an active percentage coupon
pub fn create_test_coupon(conn: &Connection, code: &str, percent: f64) -> Coupon {
    let input = CreateCoupon {
        code: code.to_string(),
        discount_type: DiscountType::Percentage,
        discount_value: percent,
        min_order_amount: 0.0,
        max_uses: 0,
        valid_from: None,
        valid_until: None,
    };
    queries::create_coupon(conn, &input).expect("Failed to create test coupon")
}

/// Open a pending checkout session with the given metadata and a 15 minute TTL
pub fn open_test_session(
    conn: &Connection,
    checkout_id: &str,
    product_id: &str,
    provider: &str,
    metadata: serde_json::Value,
) -> CheckoutSession {
    let input = CreateCheckoutSession {
        checkout_id: checkout_id.to_string(),
        product_id: product_id.to_string(),
        provider: provider.to_string(),
        secondary_id: None,
        metadata,
        ttl_ms: 15 * 60 * 1000,
    };
    queries::open_checkout_session(conn, &input).expect("Failed to open test session")
}

/// Open a pending session that is already expired
pub fn open_expired_session(
    conn: &Connection,
    checkout_id: &str,
    product_id: &str,
    provider: &str,
) -> CheckoutSession {
    let input = CreateCheckoutSession {
        checkout_id: checkout_id.to_string(),
        product_id: product_id.to_string(),
        provider: provider.to_string(),
        secondary_id: None,
        metadata: serde_json::json!({}),
        ttl_ms: -1000,
    };
    queries::open_checkout_session(conn, &input).expect("Failed to open expired session")
}

/// Create an AppState for testing with an in-memory database and no payment
/// providers configured.
///
/// The pool is capped at one connection: each connection to an in-memory
/// SQLite database is its own database, so a bigger pool would hand tests
/// and the code under test different databases.
pub fn create_test_app_state() -> AppState {
    let manager = SqliteConnectionManager::memory();
    let pool = Pool::builder().max_size(1).build(manager).unwrap();
    {
        let conn = pool.get().unwrap();
        init_db(&conn).unwrap();
    }

    AppState {
        db: pool,
        base_url: "http://localhost:3000".to_string(),
        success_page_url: "http://localhost:3000/thank-you".to_string(),
        session_ttl_ms: 15 * 60 * 1000,
        providers: ProviderRegistry::default(),
        product_cache: Arc::new(TtlCache::new(60_000)),
    }
}
