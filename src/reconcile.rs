//! Payment-event reconciliation.
//!
//! Every confirmed payment - push webhook or synchronous capture - funnels
//! through [`process_payment`], which turns the event into exactly one order.
//! Replays and concurrent duplicates are absorbed in two layers: a read
//! check up front, and the (provider, checkout_id) unique index at insert
//! time for events that race past the read.

use rusqlite::Connection;

use crate::db::queries;
use crate::error::Result;
use crate::models::{CreateOrder, Order, OrderPayload, OrderStatus, SessionMetadata};
use crate::payments::PaymentProvider;

/// Fallback dedupe window for events that arrive without a correlation id:
/// a recent order for the same product and email counts as already handled.
const RECENT_ORDER_WINDOW_MS: i64 = 5 * 60 * 1000;

const DEFAULT_DELIVERY_MINUTES: i64 = 60;

/// A confirmed payment, normalized across providers. Everything except the
/// provider is optional: the reconciler fills gaps from the stored checkout
/// session before giving up.
#[derive(Debug, Clone, Default)]
pub struct PaymentEvent {
    pub checkout_id: Option<String>,
    /// Provider-side secondary id (membership / payment id), kept as
    /// provenance on the order.
    pub secondary_id: Option<String>,
    pub product_id: Option<String>,
    pub email: Option<String>,
    pub amount: Option<f64>,
    pub addons: Option<serde_json::Value>,
    pub sub_type: Option<String>,
    /// For tip payments: the order the tip applies to.
    pub tip_order_id: Option<String>,
    pub delivery_time_minutes: Option<i64>,
}

impl PaymentEvent {
    pub fn new() -> Self {
        Self::default()
    }
}

/// What reconciliation did with the event.
#[derive(Debug)]
pub enum ReconcileOutcome {
    /// A new order was created.
    Created(Order),
    /// The event was already reconciled; no new order.
    Duplicate,
    /// A tip was applied to an existing order.
    TipApplied { order_id: String },
    /// The event could not be tied to a product; nothing was created.
    Unresolved(&'static str),
}

/// Reconcile one confirmed payment event into at most one order.
///
/// Steps: dedupe, recover missing fields from the stored session metadata
/// (the stored price always wins over the event's claimed amount), handle
/// the tip sub-type, derive delivery time, insert, complete the session.
pub fn process_payment(
    conn: &Connection,
    provider: PaymentProvider,
    mut event: PaymentEvent,
) -> Result<ReconcileOutcome> {
    let provider_name = provider.as_str();

    // Layer one: read check against orders that already carry this
    // checkout id.
    if let Some(ref checkout_id) = event.checkout_id {
        if queries::find_order_by_checkout(conn, provider_name, checkout_id)?.is_some() {
            tracing::info!(provider = provider_name, checkout_id, "duplicate payment event");
            return Ok(ReconcileOutcome::Duplicate);
        }
    }

    // Recover what the event omitted from the session stored at creation.
    let session = match event.checkout_id {
        Some(ref checkout_id) => queries::get_checkout_session(conn, checkout_id)?,
        None => None,
    };
    if let Some(ref session) = session {
        let stored = SessionMetadata::from_value(&session.metadata);
        // The server-computed price is authoritative over whatever amount
        // the event claims.
        if stored.price.is_some() {
            event.amount = stored.price;
        }
        event.email = event.email.or(stored.email);
        event.addons = event.addons.or(stored.addons);
        event.sub_type = event.sub_type.or(stored.sub_type);
        event.tip_order_id = event.tip_order_id.or(stored.order_id);
        event.delivery_time_minutes = event.delivery_time_minutes.or(stored.delivery_time_minutes);
        event.product_id = event
            .product_id
            .take()
            .or(stored.product_id)
            .or_else(|| Some(session.product_id.clone()));
        if event.secondary_id.is_none() {
            event.secondary_id = session.secondary_id.clone();
        }
    }

    // Tip payments update an existing order instead of creating one.
    if event.sub_type.as_deref() == Some("tip") {
        return process_tip(conn, &event);
    }

    let Some(product_id) = event.product_id.clone() else {
        tracing::warn!(
            provider = provider_name,
            checkout_id = event.checkout_id.as_deref(),
            "payment event has no resolvable product"
        );
        return Ok(ReconcileOutcome::Unresolved("no resolvable product"));
    };

    // Layer one-b: without a checkout id there is no unique index to lean
    // on, so fall back to the recent-order heuristic.
    if event.checkout_id.is_none() {
        if let Some(ref email) = event.email {
            let since = queries::now_ms() - RECENT_ORDER_WINDOW_MS;
            if queries::find_recent_order_for_product_email(conn, &product_id, email, since)?
                .is_some()
            {
                tracing::info!(
                    provider = provider_name,
                    product_id,
                    "recent order matches uncorrelated event, treating as duplicate"
                );
                return Ok(ReconcileOutcome::Duplicate);
            }
        }
    }

    let delivery_time_minutes = match event.delivery_time_minutes {
        Some(minutes) if minutes > 0 => minutes,
        _ => match queries::get_product_by_id(conn, &product_id)? {
            Some(product) => product.delivery_minutes(),
            None => {
                tracing::warn!(product_id, "product missing, using default delivery time");
                DEFAULT_DELIVERY_MINUTES
            }
        },
    };

    let payload = OrderPayload {
        email: event.email.clone(),
        amount: event.amount,
        addons: event.addons.clone(),
        provider: Some(provider_name.to_string()),
        checkout_id: event.checkout_id.clone(),
        membership_id: event.secondary_id.clone(),
        tip_paid: false,
        tip_amount: None,
    };

    let input = CreateOrder {
        product_id,
        provider: Some(provider_name.to_string()),
        checkout_id: event.checkout_id.clone(),
        status: OrderStatus::Paid,
        payload: payload.to_value(),
        delivery_time_minutes,
    };

    // Layer two: a concurrent duplicate that raced past the read check is
    // rejected here by the unique index.
    let Some(order) = queries::create_order(conn, &input)? else {
        tracing::info!(
            provider = provider_name,
            checkout_id = event.checkout_id.as_deref(),
            "duplicate payment event caught at insert"
        );
        return Ok(ReconcileOutcome::Duplicate);
    };

    if let Some(ref checkout_id) = event.checkout_id {
        queries::complete_checkout_session(conn, checkout_id)?;
    }

    tracing::info!(
        order_id = %order.id,
        provider = provider_name,
        amount = event.amount,
        "order created from payment event"
    );
    Ok(ReconcileOutcome::Created(order))
}

fn process_tip(conn: &Connection, event: &PaymentEvent) -> Result<ReconcileOutcome> {
    let Some(ref order_id) = event.tip_order_id else {
        tracing::warn!("tip payment without a target order id");
        return Ok(ReconcileOutcome::Unresolved("tip without target order"));
    };

    let amount = event.amount.unwrap_or(0.0);
    let Some(order) = queries::set_order_tip(conn, order_id, amount)? else {
        tracing::warn!(order_id, "tip payment targets a missing order");
        return Ok(ReconcileOutcome::Unresolved("tip target order not found"));
    };

    if let Some(ref checkout_id) = event.checkout_id {
        queries::complete_checkout_session(conn, checkout_id)?;
    }

    tracing::info!(order_id = %order.id, amount, "tip applied to order");
    Ok(ReconcileOutcome::TipApplied { order_id: order.id })
}
