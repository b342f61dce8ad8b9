mod common;

use axum::http::{Method, StatusCode};
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
use serde_json::{json, Value};

use common::{json_body, TestApp, TEST_CALLBACK_TOKEN};
use storefront_api::entities::payment_webhook_event;

/// Runs a user through checkout and returns the created order as JSON.
async fn place_order(app: &TestApp, user_id: i64, sku: &str) -> Value {
    let variant = app.seed_variant(sku, 10_000, 10).await;
    let address = app.seed_address_for_user(user_id, "Jakarta").await;

    let session = json_body(
        app.request_as_user(
            user_id,
            Method::POST,
            "/api/v1/checkout",
            Some(json!({ "items": [{ "variant_id": variant.id, "quantity": 1 }] })),
        )
        .await,
        StatusCode::CREATED,
    )
    .await;
    let session_id = session["id"].as_str().unwrap().to_string();

    app.request_as_user(
        user_id,
        Method::PUT,
        &format!("/api/v1/checkout/{session_id}/address"),
        Some(json!({ "address_id": address.id })),
    )
    .await;

    let confirm = json_body(
        app.request_as_user(
            user_id,
            Method::POST,
            &format!("/api/v1/checkout/{session_id}/confirm"),
            None,
        )
        .await,
        StatusCode::CREATED,
    )
    .await;
    confirm["order"].clone()
}

fn paid_event(event_id: &str, order: &Value) -> Value {
    json!({
        "id": event_id,
        "event": "invoice.paid",
        "external_id": order["external_id"],
        "amount": order["total"],
        "currency": order["currency"],
    })
}

async fn order_status(app: &TestApp, order: &Value) -> String {
    let id = order["id"].as_str().unwrap();
    let body = json_body(
        app.request_as_admin(Method::GET, &format!("/api/v1/orders/{id}"), None)
            .await,
        StatusCode::OK,
    )
    .await;
    body["status"].as_str().unwrap().to_string()
}

async fn ledger_row(app: &TestApp, event_id: &str) -> payment_webhook_event::Model {
    payment_webhook_event::Entity::find()
        .filter(payment_webhook_event::Column::ProviderEventId.eq(event_id))
        .one(&*app.state.db)
        .await
        .unwrap()
        .expect("ledger row exists")
}

#[tokio::test]
async fn wrong_callback_token_is_rejected_before_anything_is_recorded() {
    let app = TestApp::new().await;
    let order = place_order(&app, 42, "WH-001").await;

    let response = app
        .deliver_webhook("wrong-token", paid_event("evt-1", &order))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .request(
            Method::POST,
            "/api/v1/payments/webhook",
            &[],
            Some(paid_event("evt-1", &order)),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let recorded = payment_webhook_event::Entity::find()
        .count(&*app.state.db)
        .await
        .unwrap();
    assert_eq!(recorded, 0);
    assert_eq!(order_status(&app, &order).await, "PENDING_PAYMENT");
}

#[tokio::test]
async fn settlement_marks_the_order_and_its_payment_paid() {
    let app = TestApp::new().await;
    let order = place_order(&app, 42, "WH-002").await;

    let body = json_body(
        app.deliver_webhook(TEST_CALLBACK_TOKEN, paid_event("evt-10", &order))
            .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(body["status"], "ok");
    assert_eq!(order_status(&app, &order).await, "PAID");

    let row = ledger_row(&app, "evt-10").await;
    assert!(row.processed_at.is_some());
    assert!(row.failure_reason.is_none());

    let order_id = order["id"].as_str().unwrap();
    let attempts = json_body(
        app.request_as_admin(
            Method::GET,
            &format!("/api/v1/orders/{order_id}/payments"),
            None,
        )
        .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(attempts[0]["status"], "PAID");
}

#[tokio::test]
async fn redelivery_of_the_same_event_is_acknowledged_once() {
    let app = TestApp::new().await;
    let order = place_order(&app, 42, "WH-003").await;

    json_body(
        app.deliver_webhook(TEST_CALLBACK_TOKEN, paid_event("evt-20", &order))
            .await,
        StatusCode::OK,
    )
    .await;
    let body = json_body(
        app.deliver_webhook(TEST_CALLBACK_TOKEN, paid_event("evt-20", &order))
            .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(body["status"], "duplicate");

    let recorded = payment_webhook_event::Entity::find()
        .filter(payment_webhook_event::Column::ProviderEventId.eq("evt-20"))
        .count(&*app.state.db)
        .await
        .unwrap();
    assert_eq!(recorded, 1);
    assert_eq!(order_status(&app, &order).await, "PAID");
}

#[tokio::test]
async fn a_second_settlement_event_for_a_paid_order_is_a_noop_success() {
    let app = TestApp::new().await;
    let order = place_order(&app, 42, "WH-004").await;

    json_body(
        app.deliver_webhook(TEST_CALLBACK_TOKEN, paid_event("evt-30", &order))
            .await,
        StatusCode::OK,
    )
    .await;
    let body = json_body(
        app.deliver_webhook(TEST_CALLBACK_TOKEN, paid_event("evt-31", &order))
            .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(body["status"], "ok");
    assert_eq!(order_status(&app, &order).await, "PAID");
}

#[tokio::test]
async fn amount_mismatch_is_recorded_and_the_order_stays_untouched() {
    let app = TestApp::new().await;
    let order = place_order(&app, 42, "WH-005").await;

    let mut event = paid_event("evt-40", &order);
    event["amount"] = json!(1);

    let body = json_body(
        app.deliver_webhook(TEST_CALLBACK_TOKEN, event).await,
        StatusCode::BAD_REQUEST,
    )
    .await;
    assert_eq!(body["code"], "AMOUNT_MISMATCH");
    assert_eq!(order_status(&app, &order).await, "PENDING_PAYMENT");

    let row = ledger_row(&app, "evt-40").await;
    assert!(row.processed_at.is_none());
    assert_eq!(row.failure_reason.as_deref(), Some("AMOUNT_MISMATCH"));
}

#[tokio::test]
async fn currency_mismatch_is_recorded() {
    let app = TestApp::new().await;
    let order = place_order(&app, 42, "WH-006").await;

    let mut event = paid_event("evt-50", &order);
    event["currency"] = json!("USD");

    let body = json_body(
        app.deliver_webhook(TEST_CALLBACK_TOKEN, event).await,
        StatusCode::BAD_REQUEST,
    )
    .await;
    assert_eq!(body["code"], "CURRENCY_MISMATCH");
    assert_eq!(order_status(&app, &order).await, "PENDING_PAYMENT");
}

#[tokio::test]
async fn failure_events_fail_pending_orders_only() {
    let app = TestApp::new().await;
    let order = place_order(&app, 42, "WH-007").await;
    let external_id = order["external_id"].as_str().unwrap();

    let body = json_body(
        app.deliver_webhook(
            TEST_CALLBACK_TOKEN,
            json!({
                "id": "evt-60",
                "event": "invoice.expired",
                "external_id": external_id,
            }),
        )
        .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(body["status"], "ok");
    assert_eq!(order_status(&app, &order).await, "FAILED");

    let order_id = order["id"].as_str().unwrap();
    let attempts = json_body(
        app.request_as_admin(
            Method::GET,
            &format!("/api/v1/orders/{order_id}/payments"),
            None,
        )
        .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(attempts[0]["status"], "EXPIRED");
}

#[tokio::test]
async fn a_late_failure_never_regresses_a_paid_order() {
    let app = TestApp::new().await;
    let order = place_order(&app, 42, "WH-008").await;
    let external_id = order["external_id"].as_str().unwrap().to_string();

    json_body(
        app.deliver_webhook(TEST_CALLBACK_TOKEN, paid_event("evt-70", &order))
            .await,
        StatusCode::OK,
    )
    .await;

    let body = json_body(
        app.deliver_webhook(
            TEST_CALLBACK_TOKEN,
            json!({
                "id": "evt-71",
                "event": "payment.failed",
                "external_id": external_id,
            }),
        )
        .await,
        StatusCode::BAD_REQUEST,
    )
    .await;
    assert_eq!(body["code"], "INVALID_STATUS_TRANSITION");
    assert_eq!(order_status(&app, &order).await, "PAID");

    let row = ledger_row(&app, "evt-71").await;
    assert_eq!(
        row.failure_reason.as_deref(),
        Some("INVALID_STATUS_TRANSITION")
    );
}

#[tokio::test]
async fn unhandled_event_types_are_acknowledged_without_action() {
    let app = TestApp::new().await;
    let order = place_order(&app, 42, "WH-009").await;

    let body = json_body(
        app.deliver_webhook(
            TEST_CALLBACK_TOKEN,
            json!({
                "id": "evt-80",
                "event": "invoice.created",
                "external_id": order["external_id"],
            }),
        )
        .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(body["status"], "ignored");
    assert_eq!(order_status(&app, &order).await, "PENDING_PAYMENT");

    let row = ledger_row(&app, "evt-80").await;
    assert!(row.processed_at.is_some());
}

#[tokio::test]
async fn unknown_order_reference_is_a_processing_failure() {
    let app = TestApp::new().await;

    let body = json_body(
        app.deliver_webhook(
            TEST_CALLBACK_TOKEN,
            json!({
                "id": "evt-90",
                "event": "invoice.paid",
                "external_id": "ORD-DOES-NOT-EXIST",
                "amount": 1000,
                "currency": "IDR",
            }),
        )
        .await,
        StatusCode::BAD_REQUEST,
    )
    .await;
    assert_eq!(body["code"], "ORDER_NOT_FOUND");

    let row = ledger_row(&app, "evt-90").await;
    assert_eq!(row.failure_reason.as_deref(), Some("ORDER_NOT_FOUND"));
}

#[tokio::test]
async fn bad_token_wins_over_a_malformed_body() {
    let app = TestApp::new().await;

    // With no token the body must never be inspected, so even an empty
    // body answers 401, not 400.
    let response = app
        .request(Method::POST, "/api/v1/payments/webhook", &[], None)
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .request(
            Method::POST,
            "/api/v1/payments/webhook",
            &[("x-callback-token", "wrong-token")],
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn settlement_without_amount_or_currency_is_not_trusted() {
    let app = TestApp::new().await;
    let order = place_order(&app, 42, "WH-010").await;

    let body = json_body(
        app.deliver_webhook(
            TEST_CALLBACK_TOKEN,
            json!({
                "id": "evt-100",
                "event": "invoice.paid",
                "external_id": order["external_id"],
                "currency": order["currency"],
            }),
        )
        .await,
        StatusCode::BAD_REQUEST,
    )
    .await;
    assert_eq!(body["code"], "VALIDATION_ERROR");
    assert_eq!(order_status(&app, &order).await, "PENDING_PAYMENT");

    let row = ledger_row(&app, "evt-100").await;
    assert_eq!(row.failure_reason.as_deref(), Some("VALIDATION_ERROR"));

    let body = json_body(
        app.deliver_webhook(
            TEST_CALLBACK_TOKEN,
            json!({
                "id": "evt-101",
                "event": "invoice.paid",
                "external_id": order["external_id"],
                "amount": order["total"],
            }),
        )
        .await,
        StatusCode::BAD_REQUEST,
    )
    .await;
    assert_eq!(body["code"], "VALIDATION_ERROR");
    assert_eq!(order_status(&app, &order).await, "PENDING_PAYMENT");
}

#[tokio::test]
async fn reconfirming_a_settled_session_returns_the_paid_order() {
    let app = TestApp::new().await;
    let variant = app.seed_variant("WH-011", 10_000, 10).await;
    let address = app.seed_address_for_user(42, "Jakarta").await;

    let session = json_body(
        app.request_as_user(
            42,
            Method::POST,
            "/api/v1/checkout",
            Some(json!({ "items": [{ "variant_id": variant.id, "quantity": 1 }] })),
        )
        .await,
        StatusCode::CREATED,
    )
    .await;
    let session_id = session["id"].as_str().unwrap().to_string();

    app.request_as_user(
        42,
        Method::PUT,
        &format!("/api/v1/checkout/{session_id}/address"),
        Some(json!({ "address_id": address.id })),
    )
    .await;

    let first = json_body(
        app.request_as_user(
            42,
            Method::POST,
            &format!("/api/v1/checkout/{session_id}/confirm"),
            None,
        )
        .await,
        StatusCode::CREATED,
    )
    .await;

    json_body(
        app.deliver_webhook(TEST_CALLBACK_TOKEN, paid_event("evt-110", &first["order"]))
            .await,
        StatusCode::OK,
    )
    .await;

    // The order is paid; re-confirming must hand back the same order and
    // its settled attempt without asking the provider for a new invoice.
    let second = json_body(
        app.request_as_user(
            42,
            Method::POST,
            &format!("/api/v1/checkout/{session_id}/confirm"),
            None,
        )
        .await,
        StatusCode::CREATED,
    )
    .await;
    assert_eq!(second["order"]["id"], first["order"]["id"]);
    assert_eq!(second["order"]["status"], "PAID");
    assert_eq!(second["payment"]["status"], "PAID");
}

#[tokio::test]
async fn malformed_bodies_are_rejected() {
    let app = TestApp::new().await;

    let response = app
        .deliver_webhook(TEST_CALLBACK_TOKEN, json!({ "event": "invoice.paid" }))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
