//! Reconciliation tests: one payment event yields exactly one order, replays
//! and races are absorbed, missing event fields are recovered from the
//! stored session metadata.

mod common;

use common::*;
use storefront::payments::PaymentProvider;

fn whop_event(checkout_id: &str) -> PaymentEvent {
    PaymentEvent {
        checkout_id: Some(checkout_id.to_string()),
        ..PaymentEvent::new()
    }
}

#[test]
fn payment_event_creates_exactly_one_order() {
    let conn = setup_test_db();
    let product = create_test_product(&conn, "Logo design");
    open_test_session(
        &conn,
        "ch_1",
        &product.id,
        "whop",
        serde_json::json!({ "price": 22.5, "email": "buyer@example.com", "product_id": product.id }),
    );

    let outcome = process_payment(&conn, PaymentProvider::Whop, whop_event("ch_1")).unwrap();
    let order = match outcome {
        ReconcileOutcome::Created(order) => order,
        other => panic!("expected Created, got {:?}", other),
    };

    assert_eq!(order.product_id, product.id);
    assert_eq!(order.status, OrderStatus::Paid);
    assert_eq!(order.checkout_id.as_deref(), Some("ch_1"));

    let payload = OrderPayload::from_value(&order.payload);
    assert_eq!(payload.amount, Some(22.5));
    assert_eq!(payload.email.as_deref(), Some("buyer@example.com"));

    // The session was consumed.
    let session = queries::get_checkout_session(&conn, "ch_1").unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(queries::count_orders(&conn).unwrap(), 1);
}

#[test]
fn replayed_event_is_a_duplicate() {
    let conn = setup_test_db();
    let product = create_test_product(&conn, "Logo design");
    open_test_session(
        &conn,
        "ch_replay",
        &product.id,
        "whop",
        serde_json::json!({ "price": 20.0, "product_id": product.id }),
    );

    let first = process_payment(&conn, PaymentProvider::Whop, whop_event("ch_replay")).unwrap();
    assert!(matches!(first, ReconcileOutcome::Created(_)));

    let second = process_payment(&conn, PaymentProvider::Whop, whop_event("ch_replay")).unwrap();
    assert!(matches!(second, ReconcileOutcome::Duplicate));

    assert_eq!(queries::count_orders(&conn).unwrap(), 1);
}

#[test]
fn stored_price_wins_over_event_amount() {
    let conn = setup_test_db();
    let product = create_test_product(&conn, "Logo design");
    open_test_session(
        &conn,
        "ch_price",
        &product.id,
        "whop",
        serde_json::json!({ "price": 22.5, "product_id": product.id }),
    );

    let mut event = whop_event("ch_price");
    // The provider claims a different amount; the stored price is what the
    // order must record.
    event.amount = Some(9.99);

    let outcome = process_payment(&conn, PaymentProvider::Whop, event).unwrap();
    let order = match outcome {
        ReconcileOutcome::Created(order) => order,
        other => panic!("expected Created, got {:?}", other),
    };
    let payload = OrderPayload::from_value(&order.payload);
    assert_eq!(payload.amount, Some(22.5));
}

#[test]
fn missing_fields_recovered_from_session_metadata() {
    let conn = setup_test_db();
    let product = create_test_product(&conn, "Logo design");
    open_test_session(
        &conn,
        "PAYPAL-ORDER-1",
        &product.id,
        "paypal",
        serde_json::json!({
            "price": 25.0,
            "email": "buyer@example.com",
            "addons": [{ "field": "Speed", "value": "Rush" }],
            "delivery_time_minutes": 2880,
            "product_id": product.id,
        }),
    );

    // A capture result carries neither product nor addons.
    let event = PaymentEvent {
        checkout_id: Some("PAYPAL-ORDER-1".to_string()),
        ..PaymentEvent::new()
    };

    let outcome = process_payment(&conn, PaymentProvider::PayPal, event).unwrap();
    let order = match outcome {
        ReconcileOutcome::Created(order) => order,
        other => panic!("expected Created, got {:?}", other),
    };

    assert_eq!(order.delivery_time_minutes, 2880);
    let payload = OrderPayload::from_value(&order.payload);
    assert_eq!(payload.email.as_deref(), Some("buyer@example.com"));
    assert!(payload.addons.is_some());
    assert_eq!(payload.amount, Some(25.0));
}

#[test]
fn uncorrelated_event_matching_recent_order_is_duplicate() {
    let conn = setup_test_db();
    let product = create_test_product(&conn, "Logo design");

    // First event creates the order.
    open_test_session(
        &conn,
        "ch_first",
        &product.id,
        "whop",
        serde_json::json!({ "price": 20.0, "email": "buyer@example.com", "product_id": product.id }),
    );
    let mut event = whop_event("ch_first");
    event.email = Some("buyer@example.com".to_string());
    let first = process_payment(&conn, PaymentProvider::Whop, event).unwrap();
    assert!(matches!(first, ReconcileOutcome::Created(_)));

    // Redelivery without any checkout id must fall back to the recent-order
    // heuristic.
    let event = PaymentEvent {
        product_id: Some(product.id.clone()),
        email: Some("buyer@example.com".to_string()),
        amount: Some(20.0),
        ..PaymentEvent::new()
    };
    let second = process_payment(&conn, PaymentProvider::Whop, event).unwrap();
    assert!(matches!(second, ReconcileOutcome::Duplicate));
    assert_eq!(queries::count_orders(&conn).unwrap(), 1);
}

#[test]
fn duplicate_caught_by_unique_index_at_insert() {
    let conn = setup_test_db();
    let product = create_test_product(&conn, "Logo design");

    // Simulate a racing event that already inserted an order for this
    // checkout id without going through the session at all.
    let existing = queries::create_order(
        &conn,
        &CreateOrder {
            product_id: product.id.clone(),
            provider: Some("whop".to_string()),
            checkout_id: Some("ch_race".to_string()),
            status: OrderStatus::Paid,
            payload: serde_json::json!({}),
            delivery_time_minutes: 60,
        },
    )
    .unwrap();
    assert!(existing.is_some());

    // Insert-level guard: a second insert for the same pair is refused.
    let clashing = queries::create_order(
        &conn,
        &CreateOrder {
            product_id: product.id.clone(),
            provider: Some("whop".to_string()),
            checkout_id: Some("ch_race".to_string()),
            status: OrderStatus::Paid,
            payload: serde_json::json!({}),
            delivery_time_minutes: 60,
        },
    )
    .unwrap();
    assert!(clashing.is_none());

    // And the reconciler reports Duplicate rather than erroring.
    let event = PaymentEvent {
        product_id: Some(product.id.clone()),
        ..whop_event("ch_race")
    };
    let outcome = process_payment(&conn, PaymentProvider::Whop, event).unwrap();
    assert!(matches!(outcome, ReconcileOutcome::Duplicate));
    assert_eq!(queries::count_orders(&conn).unwrap(), 1);
}

#[test]
fn tip_event_updates_existing_order_and_creates_none() {
    let conn = setup_test_db();
    let product = create_test_product(&conn, "Logo design");

    let order = queries::create_order(
        &conn,
        &CreateOrder {
            product_id: product.id.clone(),
            provider: Some("whop".to_string()),
            checkout_id: Some("ch_orig".to_string()),
            status: OrderStatus::Paid,
            payload: serde_json::json!({ "amount": 20.0 }),
            delivery_time_minutes: 60,
        },
    )
    .unwrap()
    .unwrap();

    open_test_session(
        &conn,
        "ch_tip",
        &product.id,
        "whop",
        serde_json::json!({ "price": 5.0, "sub_type": "tip", "order_id": order.id }),
    );

    let outcome = process_payment(&conn, PaymentProvider::Whop, whop_event("ch_tip")).unwrap();
    match outcome {
        ReconcileOutcome::TipApplied { order_id } => assert_eq!(order_id, order.id),
        other => panic!("expected TipApplied, got {:?}", other),
    }

    let updated = queries::get_order_by_id(&conn, &order.id).unwrap().unwrap();
    let payload = OrderPayload::from_value(&updated.payload);
    assert!(payload.tip_paid);
    assert_eq!(payload.tip_amount, Some(5.0));

    // No new order, tip session consumed.
    assert_eq!(queries::count_orders(&conn).unwrap(), 1);
    let session = queries::get_checkout_session(&conn, "ch_tip").unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
}

#[test]
fn tip_for_missing_order_is_unresolved() {
    let conn = setup_test_db();
    let product = create_test_product(&conn, "Logo design");
    open_test_session(
        &conn,
        "ch_tip_lost",
        &product.id,
        "whop",
        serde_json::json!({ "price": 5.0, "sub_type": "tip", "order_id": "ord_nope" }),
    );

    let outcome = process_payment(&conn, PaymentProvider::Whop, whop_event("ch_tip_lost")).unwrap();
    assert!(matches!(outcome, ReconcileOutcome::Unresolved(_)));
    assert_eq!(queries::count_orders(&conn).unwrap(), 0);
}

#[test]
fn event_without_resolvable_product_is_unresolved() {
    let conn = setup_test_db();

    let event = PaymentEvent {
        checkout_id: Some("ch_unknown".to_string()),
        email: Some("buyer@example.com".to_string()),
        amount: Some(20.0),
        ..PaymentEvent::new()
    };
    let outcome = process_payment(&conn, PaymentProvider::Whop, event).unwrap();
    assert!(matches!(outcome, ReconcileOutcome::Unresolved(_)));
    assert_eq!(queries::count_orders(&conn).unwrap(), 0);
}

#[test]
fn email_wildcards_do_not_over_match_in_the_dedupe_heuristic() {
    let conn = setup_test_db();
    let product = create_test_product(&conn, "Logo design");

    queries::create_order(
        &conn,
        &CreateOrder {
            product_id: product.id.clone(),
            provider: Some("whop".to_string()),
            checkout_id: Some("ch_1".to_string()),
            status: OrderStatus::Paid,
            payload: serde_json::json!({ "email": "axb@example.com" }),
            delivery_time_minutes: 60,
        },
    )
    .unwrap()
    .unwrap();

    let since = queries::now_ms() - 60_000;
    // An underscore is a LIKE wildcard; it must match literally here, so
    // a_b must not dedupe against the axb order.
    let miss = queries::find_recent_order_for_product_email(
        &conn,
        &product.id,
        "a_b@example.com",
        since,
    )
    .unwrap();
    assert!(miss.is_none());

    let hit = queries::find_recent_order_for_product_email(
        &conn,
        &product.id,
        "axb@example.com",
        since,
    )
    .unwrap();
    assert!(hit.is_some());
}

#[test]
fn delivery_minutes_fall_back_to_the_product() {
    let conn = setup_test_db();
    let product = create_test_product(&conn, "Logo design"); // 2-day

    open_test_session(
        &conn,
        "ch_delivery",
        &product.id,
        "whop",
        serde_json::json!({ "price": 20.0, "product_id": product.id }),
    );

    let outcome = process_payment(&conn, PaymentProvider::Whop, whop_event("ch_delivery")).unwrap();
    let order = match outcome {
        ReconcileOutcome::Created(order) => order,
        other => panic!("expected Created, got {:?}", other),
    };
    assert_eq!(order.delivery_time_minutes, 2 * 1440);
}
