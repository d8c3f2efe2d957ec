use std::env;

/// Credentials for the dynamic-plan provider (Whop).
#[derive(Debug, Clone)]
pub struct WhopConfig {
    pub api_key: String,
    /// Provider product the one-time plans are attached to.
    pub default_product_id: Option<String>,
    pub webhook_secret: Option<String>,
}

/// Credentials for the order/capture provider (PayPal).
#[derive(Debug, Clone)]
pub struct PayPalConfig {
    pub client_id: String,
    pub client_secret: String,
    /// API base, e.g. https://api-m.paypal.com or the sandbox host.
    pub api_base: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    pub base_url: String,
    /// Where buyers land after a successful payment.
    pub success_page_url: String,
    pub whop: Option<WhopConfig>,
    pub paypal: Option<PayPalConfig>,
    /// Seconds between cleanup sweeps (0 disables the timer).
    pub cleanup_interval_secs: u64,
    /// Checkout session lifetime in seconds.
    pub session_ttl_secs: i64,
    pub dev_mode: bool,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let dev_mode = env::var("STOREFRONT_ENV")
            .map(|v| v == "dev" || v == "development")
            .unwrap_or(false);

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);

        let base_url =
            env::var("BASE_URL").unwrap_or_else(|_| format!("http://{}:{}", host, port));

        let whop = env::var("WHOP_API_KEY").ok().map(|api_key| WhopConfig {
            api_key,
            default_product_id: env::var("WHOP_PRODUCT_ID").ok(),
            webhook_secret: env::var("WHOP_WEBHOOK_SECRET").ok(),
        });

        let paypal = match (env::var("PAYPAL_CLIENT_ID"), env::var("PAYPAL_CLIENT_SECRET")) {
            (Ok(client_id), Ok(client_secret)) => Some(PayPalConfig {
                client_id,
                client_secret,
                api_base: env::var("PAYPAL_API_BASE")
                    .unwrap_or_else(|_| "https://api-m.paypal.com".to_string()),
            }),
            _ => None,
        };

        Self {
            host,
            port,
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "storefront.db".to_string()),
            success_page_url: env::var("SUCCESS_PAGE_URL")
                .unwrap_or_else(|_| format!("{}/thank-you", base_url)),
            base_url,
            whop,
            paypal,
            cleanup_interval_secs: env::var("CLEANUP_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(24 * 60 * 60),
            session_ttl_secs: env::var("SESSION_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(15 * 60),
            dev_mode,
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
