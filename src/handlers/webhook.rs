//! Push webhook intake for the dynamic-plan provider.
//!
//! The body is taken raw so the HMAC covers exactly the delivered bytes.
//! Unknown events and already-handled duplicates are acknowledged with 200
//! so the provider stops redelivering; only signature failures and storage
//! errors surface as non-2xx.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use serde_json::json;

use crate::cleanup;
use crate::db::AppState;
use crate::error::{AppError, Result};
use crate::extractors::Json;
use crate::payments::{PaymentProvider, WhopWebhookEvent};
use crate::reconcile::{self, PaymentEvent, ReconcileOutcome};

const SIGNATURE_HEADER: &str = "x-whop-signature";

pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>> {
    let whop = state.providers.whop()?;

    if whop.has_webhook_secret() {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or(AppError::Unauthorized)?;
        if !whop.verify_webhook_signature(&body, signature)? {
            tracing::warn!("webhook signature verification failed");
            return Err(AppError::Unauthorized);
        }
    }

    // Malformed payloads are acknowledged, not retried: redelivery of a body
    // we cannot parse will never succeed.
    let event: WhopWebhookEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(error = %e, "unparseable webhook payload, acknowledging");
            return Ok(Json(json!({ "received": true })));
        }
    };

    let name = event.event_name().to_string();
    if name != "payment.succeeded" && name != "membership.went_valid" {
        tracing::debug!(event = %name, "ignoring webhook event");
        return Ok(Json(json!({ "received": true })));
    }

    let data = event.data;
    let metadata = data
        .metadata
        .as_ref()
        .map(crate::models::SessionMetadata::from_value)
        .unwrap_or_default();

    let payment = PaymentEvent {
        checkout_id: data.checkout_session_id.clone(),
        secondary_id: data.id.clone(),
        product_id: metadata.product_id.clone(),
        email: data.email.or(data.user_email).or(metadata.email),
        amount: metadata.price.or(data.final_amount),
        addons: metadata.addons,
        sub_type: metadata.sub_type,
        tip_order_id: metadata.order_id,
        delivery_time_minutes: metadata.delivery_time_minutes,
    };

    let outcome = {
        let conn = state.db.get()?;
        reconcile::process_payment(&conn, PaymentProvider::Whop, payment)?
    };

    if let ReconcileOutcome::Created(ref order) = outcome {
        // Retire the plan and provider session behind the completed
        // purchase. Failure is non-fatal: the session stays unstamped and
        // the sweeper retries it.
        if let Some(ref checkout_id) = order.checkout_id {
            cleanup::retire_after_payment(&state, checkout_id).await;
        }
    }

    match outcome {
        ReconcileOutcome::Created(_)
        | ReconcileOutcome::Duplicate
        | ReconcileOutcome::TipApplied { .. } => Ok(Json(json!({ "received": true }))),
        ReconcileOutcome::Unresolved(reason) => {
            tracing::warn!(reason, "webhook event not reconciled");
            Ok(Json(json!({ "received": true, "reconciled": false })))
        }
    }
}
