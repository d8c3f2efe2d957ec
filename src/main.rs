use std::sync::Arc;

use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use storefront::cache::TtlCache;
use storefront::cleanup;
use storefront::config::Config;
use storefront::db::{self, queries, AppState};
use storefront::handlers;
use storefront::models::{AddonField, AddonOption, CreateCoupon, CreateProduct, DiscountType};
use storefront::payments::ProviderRegistry;

/// Product snapshots are safe to serve slightly stale.
const PRODUCT_CACHE_TTL_MS: i64 = 60_000;

#[derive(Parser, Debug)]
#[command(name = "storefront")]
#[command(about = "Order and payment reconciliation backend")]
struct Cli {
    /// Seed the database with dev data (product + coupon). Dev mode only.
    #[arg(long)]
    seed: bool,
}

fn seed_dev_data(conn: &rusqlite::Connection) {
    if queries::get_coupon_by_code(conn, "SAVE10")
        .expect("Failed to check for dev coupon")
        .is_some()
    {
        tracing::info!("Dev fixtures already present, skipping seed");
        return;
    }

    let product = queries::create_product(
        conn,
        &CreateProduct {
            name: "Logo design".to_string(),
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
        },
    )
    .expect("Failed to create dev product");

    queries::create_coupon(
        conn,
        &CreateCoupon {
            code: "SAVE10".to_string(),
            discount_type: DiscountType::Percentage,
            discount_value: 10.0,
            min_order_amount: 10.0,
            max_uses: 0,
            valid_from: None,
            valid_until: None,
        },
    )
    .expect("Failed to create dev coupon");

    tracing::info!(product_id = %product.id, "Dev fixtures seeded (product + coupon SAVE10)");
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "storefront=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    let pool = db::create_pool(&config.database_path).unwrap_or_else(|e| {
        eprintln!("Failed to create database pool: {}", e);
        std::process::exit(1);
    });
    {
        let conn = pool.get().expect("Failed to get db connection for init");
        db::init_db(&conn).expect("Failed to initialize database schema");
    }
    tracing::info!(path = %config.database_path, "Database ready");

    if cli.seed {
        if config.dev_mode {
            let conn = pool.get().expect("Failed to get db connection for seeding");
            seed_dev_data(&conn);
        } else {
            tracing::warn!("--seed ignored outside dev mode (set STOREFRONT_ENV=dev)");
        }
    }

    let state = AppState {
        db: pool,
        base_url: config.base_url.clone(),
        success_page_url: config.success_page_url.clone(),
        session_ttl_ms: config.session_ttl_secs * 1000,
        providers: ProviderRegistry::from_config(&config),
        product_cache: Arc::new(TtlCache::new(PRODUCT_CACHE_TTL_MS)),
    };

    if state.providers.whop.is_none() && state.providers.paypal.is_none() {
        tracing::warn!("No payment provider configured; checkout endpoints will fail");
    }

    if config.cleanup_interval_secs > 0 {
        cleanup::spawn_cleanup_task(state.clone(), config.cleanup_interval_secs);
        tracing::info!(
            interval_secs = config.cleanup_interval_secs,
            "Cleanup sweeper scheduled"
        );
    }

    let app = axum::Router::new()
        .merge(handlers::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            eprintln!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        });
    tracing::info!(%addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install ctrl-c handler");
    tracing::info!("Shutting down");
}
