//! Checkout creation and synchronous capture.
//!
//! Creation is where the authoritative price is computed and frozen into
//! the session metadata; nothing downstream recomputes it. Capture is the
//! order/capture provider's synchronous completion path and funnels into
//! the same reconciler as the webhook.

use axum::extract::State;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::cleanup;
use crate::db::{queries, AppState};
use crate::error::{msg, AppError, OptionExt, Result};
use crate::extractors::Json;
use crate::id;
use crate::models::{CreateCheckoutSession, Order, Product, SessionMetadata};
use crate::payments::{PaymentProvider, PayPalClient};
use crate::pricing::{self, SelectedAddon};
use crate::reconcile::{self, PaymentEvent, ReconcileOutcome};

#[derive(Debug, Deserialize)]
pub struct CreateCheckoutRequest {
    pub product_id: String,
    #[serde(default)]
    pub selected_addons: Vec<SelectedAddon>,
    #[serde(default)]
    pub coupon_code: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateCheckoutResponse {
    pub checkout_url: String,
    pub checkout_id: String,
    /// Seconds until the session expires.
    pub expires_in: i64,
}

pub async fn create_checkout(
    State(state): State<AppState>,
    Json(req): Json<CreateCheckoutRequest>,
) -> Result<Json<CreateCheckoutResponse>> {
    let product = load_product(&state, &req.product_id)?;

    // A coupon that fails to load degrades to no discount; it must never
    // block a sale.
    let coupon = match req.coupon_code.as_deref().map(str::trim) {
        Some(code) if !code.is_empty() => {
            let conn = state.db.get()?;
            match queries::get_coupon_by_code(&conn, code) {
                Ok(coupon) => coupon,
                Err(e) => {
                    tracing::warn!(code, error = %e, "coupon lookup failed, ignoring coupon");
                    None
                }
            }
        }
        _ => None,
    };

    let price = pricing::compute_price(
        &product,
        &req.selected_addons,
        coupon.as_ref(),
        queries::now_ms(),
    )?;

    let provider = match req.provider.as_deref() {
        Some(name) => name
            .parse::<PaymentProvider>()
            .map_err(|_| AppError::BadRequest(msg::INVALID_PROVIDER.into()))?,
        None => state.providers.auto_detect()?,
    };

    tracing::info!(
        product_id = %product.id,
        provider = provider.as_str(),
        price,
        "creating checkout session"
    );

    let metadata = SessionMetadata {
        email: req.email.clone(),
        addons: Some(serde_json::to_value(
            req.selected_addons
                .iter()
                .map(|a| json!({ "field": a.field, "value": a.value }))
                .collect::<Vec<_>>(),
        )?),
        price: Some(price),
        delivery_time_minutes: Some(product.delivery_minutes()),
        product_id: Some(product.id.clone()),
        sub_type: None,
        order_id: None,
    };

    let response = match provider {
        PaymentProvider::Whop => create_whop_checkout(&state, &product, price, &metadata).await?,
        PaymentProvider::PayPal => {
            create_paypal_checkout(&state, &product, price, req.email.as_deref(), &metadata).await?
        }
    };
    Ok(Json(response))
}

// An unknown product is invalid checkout input, not a missing resource:
// this surface answers 400, not 404.
fn load_product(state: &AppState, product_id: &str) -> Result<Product> {
    if let Some(product) = state.product_cache.get(&product_id.to_string()) {
        return Ok(product);
    }
    let conn = state.db.get()?;
    let product = queries::get_product_by_id(&conn, product_id)?
        .ok_or_else(|| AppError::BadRequest(msg::PRODUCT_NOT_FOUND.into()))?;
    state.product_cache.set(product.id.clone(), product.clone());
    Ok(product)
}

/// Dynamic-plan flow: create a plan at the computed price, record the
/// session locally under a placeholder id, create the provider checkout
/// session, then re-key to the provider's real id. The placeholder row
/// guarantees the plan gets swept even if the second provider call fails
/// before any real session exists.
async fn create_whop_checkout(
    state: &AppState,
    product: &Product,
    price: f64,
    metadata: &SessionMetadata,
) -> Result<CreateCheckoutResponse> {
    let whop = state.providers.whop()?;

    let provider_product_id = product
        .provider_product_id
        .clone()
        .or_else(|| whop.default_product_id().map(String::from))
        .ok_or_else(|| AppError::Internal(msg::PROVIDER_NOT_CONFIGURED.into()))?;

    let metadata_value = metadata.to_value();
    let plan_id = whop
        .create_plan(price, &provider_product_id, &metadata_value)
        .await?;

    let placeholder = id::plan_placeholder(&plan_id);
    {
        let conn = state.db.get()?;
        queries::open_checkout_session(
            &conn,
            &CreateCheckoutSession {
                checkout_id: placeholder.clone(),
                product_id: product.id.clone(),
                provider: PaymentProvider::Whop.as_str().to_string(),
                secondary_id: Some(plan_id.clone()),
                metadata: metadata_value.clone(),
                ttl_ms: state.session_ttl_ms,
            },
        )?;
    }

    let session = whop
        .create_checkout_session(&plan_id, &state.success_page_url, &metadata_value)
        .await;

    let (checkout_id, purchase_url) = match session {
        Ok(pair) => pair,
        Err(e) => {
            // Best-effort rollback: retire the orphaned plan and archive the
            // placeholder row so the sweeper does not chase it forever.
            if let Err(retire_err) = whop.retire_artifacts(Some(&plan_id), None).await {
                tracing::warn!(plan_id, error = %retire_err, "failed to retire orphaned plan");
            }
            if let Ok(conn) = state.db.get() {
                if let Err(db_err) = queries::archive_checkout_session(&conn, &placeholder) {
                    tracing::warn!(error = %db_err, "failed to archive placeholder session");
                }
            }
            return Err(e);
        }
    };

    {
        let conn = state.db.get()?;
        if !queries::rekey_checkout_session(&conn, &placeholder, &checkout_id)? {
            tracing::warn!(checkout_id, "placeholder session vanished before re-key");
        }
    }

    Ok(CreateCheckoutResponse {
        checkout_url: purchase_url,
        checkout_id,
        expires_in: state.session_ttl_ms / 1000,
    })
}

/// Order/capture flow: the amount is fixed at order creation; the local
/// session row is keyed directly by the provider order id.
async fn create_paypal_checkout(
    state: &AppState,
    product: &Product,
    price: f64,
    email: Option<&str>,
    metadata: &SessionMetadata,
) -> Result<CreateCheckoutResponse> {
    let paypal = state.providers.paypal()?;

    let custom_id = PayPalClient::custom_id(&product.id, email);
    let return_url = format!("{}/checkout/return", state.base_url);
    let cancel_url = format!("{}/checkout/cancel", state.base_url);

    let (order_id, approve_url) = paypal
        .create_order(price, &custom_id, &return_url, &cancel_url)
        .await?;

    let conn = state.db.get()?;
    queries::open_checkout_session(
        &conn,
        &CreateCheckoutSession {
            checkout_id: order_id.clone(),
            product_id: product.id.clone(),
            provider: PaymentProvider::PayPal.as_str().to_string(),
            secondary_id: None,
            metadata: metadata.to_value(),
            ttl_ms: state.session_ttl_ms,
        },
    )?;

    Ok(CreateCheckoutResponse {
        checkout_url: approve_url,
        checkout_id: order_id,
        expires_in: state.session_ttl_ms / 1000,
    })
}

#[derive(Debug, Deserialize)]
pub struct CaptureRequest {
    pub provider_order_id: String,
}

#[derive(Debug, Serialize)]
pub struct CaptureResponse {
    pub order_id: String,
    pub status: String,
}

/// Synchronous completion path for the order/capture provider: capture the
/// approved order, then reconcile the result exactly like a webhook event.
pub async fn capture_checkout(
    State(state): State<AppState>,
    Json(req): Json<CaptureRequest>,
) -> Result<Json<CaptureResponse>> {
    let paypal = state.providers.paypal()?;

    let capture = paypal.capture_order(&req.provider_order_id).await?;
    if !capture.is_completed() {
        return Err(AppError::ProviderRejected(format!(
            "PayPal capture not completed: {}",
            capture.status
        )));
    }

    // The custom_id carries product|email from order creation; it is the
    // fallback when the local session row is gone.
    let (custom_product, custom_email) = capture
        .custom_id
        .as_deref()
        .and_then(|c| c.split_once('|'))
        .map(|(product, email)| {
            let email = (!email.is_empty()).then(|| email.to_string());
            (Some(product.to_string()), email)
        })
        .unwrap_or((None, None));

    let event = PaymentEvent {
        checkout_id: Some(req.provider_order_id.clone()),
        product_id: custom_product,
        email: capture.payer_email.clone().or(custom_email),
        amount: capture.amount,
        ..PaymentEvent::new()
    };

    let (order, created): (Order, bool) = {
        let conn = state.db.get()?;
        match reconcile::process_payment(&conn, PaymentProvider::PayPal, event)? {
            ReconcileOutcome::Created(order) => (order, true),
            ReconcileOutcome::Duplicate => {
                let order = queries::find_order_by_checkout(
                    &conn,
                    PaymentProvider::PayPal.as_str(),
                    &req.provider_order_id,
                )?
                .or_not_found(msg::ORDER_NOT_FOUND)?;
                (order, false)
            }
            ReconcileOutcome::TipApplied { order_id } => {
                let order = queries::get_order_by_id(&conn, &order_id)?
                    .or_not_found(msg::ORDER_NOT_FOUND)?;
                (order, false)
            }
            ReconcileOutcome::Unresolved(_) => {
                return Err(AppError::NotFound(msg::SESSION_NOT_FOUND.into()));
            }
        }
    };

    if created {
        // No provider call is needed to retire an order/capture artifact,
        // but the session still gets its retired stamp so the sweeper
        // stops owing it an attempt.
        cleanup::retire_after_payment(&state, &req.provider_order_id).await;
    }

    Ok(Json(CaptureResponse {
        order_id: order.id,
        status: order.status.to_string(),
    }))
}
