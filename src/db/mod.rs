mod schema;
pub mod queries;

mod from_row;
pub use from_row::FromRow;
pub use schema::init_db;

use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::cache::TtlCache;
use crate::models::Product;
use crate::payments::ProviderRegistry;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Application state shared across handlers and the cleanup sweeper.
#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    /// Base URL for provider return/cancel redirects.
    pub base_url: String,
    /// Where buyers land after a successful payment.
    pub success_page_url: String,
    /// Checkout session lifetime, ms.
    pub session_ttl_ms: i64,
    pub providers: ProviderRegistry,
    /// Best-effort product snapshot cache. May be empty at any time.
    pub product_cache: Arc<TtlCache<String, Product>>,
}

pub fn create_pool(database_path: &str) -> Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::file(database_path);
    Pool::builder().max_size(10).build(manager)
}
