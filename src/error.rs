use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Provider transport failure (5xx, connection reset, malformed
    /// response). Retryable by the caller.
    #[error("Provider error: {0}")]
    Provider(String),

    /// Outbound provider call exceeded its time box. Retryable, and kept
    /// distinct from Provider so callers can tell a slow provider from a
    /// broken one.
    #[error("Provider timeout: {0}")]
    ProviderTimeout(String),

    /// Provider understood the request and rejected it (bad plan id, auth
    /// failure). Never retried automatically.
    #[error("Provider rejected request: {0}")]
    ProviderRejected(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Centralized error message strings.
pub mod msg {
    pub const PRODUCT_NOT_FOUND: &str = "Product not found";
    pub const INVALID_PRODUCT_PRICE: &str = "Invalid product price";
    pub const SESSION_NOT_FOUND: &str = "Checkout session not found";
    pub const ORDER_NOT_FOUND: &str = "Order not found";
    pub const INVALID_PROVIDER: &str = "Invalid payment provider";
    pub const PROVIDER_NOT_CONFIGURED: &str = "Payment provider not configured";
    pub const INVALID_WEBHOOK_SECRET: &str = "Invalid webhook secret";
    pub const MISSING_SIGNATURE: &str = "Missing webhook signature";
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "Not found", Some(msg.clone())),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "Bad request", Some(msg.clone())),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized", None),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "Conflict", Some(msg.clone())),
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None)
            }
            AppError::Pool(e) => {
                tracing::error!("Pool error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None)
            }
            AppError::Json(e) => {
                tracing::error!("JSON error: {}", e);
                (StatusCode::BAD_REQUEST, "Invalid JSON", Some(e.to_string()))
            }
            AppError::Provider(msg) => {
                tracing::error!("Provider error: {}", msg);
                (StatusCode::BAD_GATEWAY, "Payment provider error", Some(msg.clone()))
            }
            AppError::ProviderTimeout(msg) => {
                tracing::error!("Provider timeout: {}", msg);
                (StatusCode::BAD_GATEWAY, "Payment provider timeout", Some(msg.clone()))
            }
            AppError::ProviderRejected(msg) => {
                (StatusCode::BAD_REQUEST, "Payment provider rejected request", Some(msg.clone()))
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Convenience for turning `Option<T>` lookups into 404s.
pub trait OptionExt<T> {
    fn or_not_found(self, msg: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn or_not_found(self, msg: &str) -> Result<T> {
        self.ok_or_else(|| AppError::NotFound(msg.to_string()))
    }
}

/// Map a reqwest failure to the transport taxonomy: timeouts are retryable
/// and reported separately from other transport errors.
pub fn provider_transport(context: &str, e: reqwest::Error) -> AppError {
    if e.is_timeout() {
        AppError::ProviderTimeout(format!("{}: {}", context, e))
    } else {
        AppError::Provider(format!("{}: {}", context, e))
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
