mod admin;
mod checkout;
mod webhook;

use axum::routing::{get, post};
use axum::Router;
use serde::Serialize;

use crate::db::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/checkout/create", post(checkout::create_checkout))
        .route("/checkout/capture", post(checkout::capture_checkout))
        .route("/webhook/payment", post(webhook::payment_webhook))
        .route("/admin/cleanup/run", post(admin::run_cleanup))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> axum::Json<HealthResponse> {
    axum::Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
