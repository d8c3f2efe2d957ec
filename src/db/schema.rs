use rusqlite::Connection;

/// Initialize the storefront schema. All timestamps are epoch milliseconds
/// (coupon validity windows arrive in ms and everything else follows suit).
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        -- Product snapshots (managed by the admin CRUD surface; read-only
        -- for the pricing engine and checkout flow)
        CREATE TABLE IF NOT EXISTS products (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            price REAL NOT NULL,
            sale_price REAL,
            addons TEXT NOT NULL DEFAULT '[]',
            delivery TEXT NOT NULL DEFAULT 'instant',
            provider_product_id TEXT,
            created_at INTEGER NOT NULL
        );

        -- Coupons (read-only here; used_count is read for cap checks but
        -- incremented elsewhere, if at all)
        CREATE TABLE IF NOT EXISTS coupons (
            id TEXT PRIMARY KEY,
            code TEXT NOT NULL COLLATE NOCASE UNIQUE,
            discount_type TEXT NOT NULL CHECK (discount_type IN ('percentage', 'fixed')),
            discount_value REAL NOT NULL,
            min_order_amount REAL NOT NULL DEFAULT 0,
            max_uses INTEGER NOT NULL DEFAULT 0,
            valid_from INTEGER,
            valid_until INTEGER,
            status TEXT NOT NULL DEFAULT 'active' CHECK (status IN ('active', 'disabled')),
            used_count INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL
        );

        -- Ephemeral checkout sessions. checkout_id is the provider's id, or
        -- a plan_<planId> placeholder until the provider returns one.
        CREATE TABLE IF NOT EXISTS checkout_sessions (
            checkout_id TEXT PRIMARY KEY,
            product_id TEXT NOT NULL,
            provider TEXT NOT NULL,
            secondary_id TEXT,
            metadata TEXT NOT NULL DEFAULT '{}',
            expires_at INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending' CHECK (status IN ('pending', 'completed', 'archived')),
            created_at INTEGER NOT NULL,
            completed_at INTEGER,
            retired_at INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_sessions_status_expires ON checkout_sessions(status, expires_at);
        CREATE INDEX IF NOT EXISTS idx_sessions_product ON checkout_sessions(product_id);

        -- Durable orders. The partial unique index on (provider, checkout_id)
        -- is the authoritative duplicate guard: a constraint violation on
        -- insert means the payment event was already reconciled.
        CREATE TABLE IF NOT EXISTS orders (
            id TEXT PRIMARY KEY,
            product_id TEXT NOT NULL,
            provider TEXT,
            checkout_id TEXT,
            status TEXT NOT NULL CHECK (status IN ('pending', 'paid', 'delivered', 'revision', 'completed')),
            payload TEXT NOT NULL DEFAULT '{}',
            delivery_time_minutes INTEGER NOT NULL DEFAULT 60,
            created_at INTEGER NOT NULL,
            delivered_at INTEGER
        );
        CREATE UNIQUE INDEX IF NOT EXISTS idx_orders_provider_checkout
            ON orders(provider, checkout_id) WHERE checkout_id IS NOT NULL;
        CREATE INDEX IF NOT EXISTS idx_orders_product_time ON orders(product_id, created_at DESC);
        "#,
    )?;
    Ok(())
}
