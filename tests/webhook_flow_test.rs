mod common;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
};
use common::{TestApp, TEST_WEBHOOK_SECRET};
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde_json::{json, Value};
use storefront_api::{
    entities::{analytics_counter, AnalyticsCounter, OrderStatus, UserModel},
    services::payments::sign_payload,
};
use tower::ServiceExt;
use uuid::Uuid;

async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, Value) {
    let response = app
        .router()
        .oneshot(request)
        .await
        .expect("request failed");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("failed to read body");
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::String(
            String::from_utf8_lossy(&bytes).into_owned(),
        ))
    };
    (status, body)
}

fn authed(request: axum::http::request::Builder, user: &UserModel) -> axum::http::request::Builder {
    request
        .header("x-user-id", user.id.to_string())
        .header("x-user-email", user.email.clone())
}

fn signed_webhook_request(payload: &Value, secret: &str) -> Request<Body> {
    let body = payload.to_string();
    let ts = chrono::Utc::now().timestamp().to_string();
    let signature = sign_payload(secret, &ts, body.as_bytes());

    Request::builder()
        .method(Method::POST)
        .uri("/api/v1/payments/webhook")
        .header("content-type", "application/json")
        .header("x-gateway-signature", format!("t={},v1={}", ts, signature))
        .body(Body::from(body))
        .expect("failed to build request")
}

/// Drives checkout end to end and returns (order_id, session_id).
async fn checkout(app: &TestApp, user: &UserModel, product_id: Uuid, quantity: i32) -> (Uuid, String) {
    let add = authed(
        Request::builder()
            .method(Method::POST)
            .uri("/api/v1/cart/items")
            .header("content-type", "application/json"),
        user,
    )
    .body(Body::from(
        json!({"product_id": product_id, "quantity": quantity}).to_string(),
    ))
    .unwrap();
    let (status, _) = send(app, add).await;
    assert_eq!(status, StatusCode::OK);

    let create = authed(
        Request::builder().method(Method::POST).uri("/api/v1/orders"),
        user,
    )
    .body(Body::empty())
    .unwrap();
    let (status, body) = send(app, create).await;
    assert_eq!(status, StatusCode::CREATED);

    let order_id = Uuid::parse_str(body["order_id"].as_str().unwrap()).unwrap();
    let session_id = body["session_id"].as_str().unwrap().to_string();
    (order_id, session_id)
}

async fn order_status(app: &TestApp, order_id: Uuid) -> OrderStatus {
    app.state
        .services
        .order
        .get_order(order_id)
        .await
        .unwrap()
        .status
}

#[tokio::test]
async fn verified_notification_confirms_the_order() {
    let app = TestApp::new().await;
    let user = app.create_user("shopper@example.com", false).await;
    let beans = app.create_product("Espresso Beans", dec!(12.99), true).await;

    let (order_id, session_id) = checkout(&app, &user, beans.id, 2).await;
    assert_eq!(order_status(&app, order_id).await, OrderStatus::Pending);

    let payload = json!({
        "id": "evt_1",
        "type": "checkout.session.completed",
        "data": { "session_id": session_id },
    });
    let (status, _) = send(&app, signed_webhook_request(&payload, TEST_WEBHOOK_SECRET)).await;
    assert_eq!(status, StatusCode::OK);

    assert_eq!(order_status(&app, order_id).await, OrderStatus::Confirmed);
}

#[tokio::test]
async fn forged_signatures_are_rejected_without_state_change() {
    let app = TestApp::new().await;
    let user = app.create_user("shopper@example.com", false).await;
    let beans = app.create_product("Espresso Beans", dec!(12.99), true).await;

    let (order_id, session_id) = checkout(&app, &user, beans.id, 1).await;

    let payload = json!({
        "id": "evt_1",
        "type": "checkout.session.completed",
        "data": { "session_id": session_id },
    });
    let (status, _) = send(&app, signed_webhook_request(&payload, "wrong_secret")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        Request::builder()
            .method(Method::POST)
            .uri("/api/v1/payments/webhook")
            .header("content-type", "application/json")
            .body(Body::from(payload.to_string()))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(order_status(&app, order_id).await, OrderStatus::Pending);
}

#[tokio::test]
async fn uninteresting_events_are_acknowledged_and_ignored() {
    let app = TestApp::new().await;

    let payload = json!({
        "id": "evt_2",
        "type": "invoice.created",
        "data": {},
    });
    let (status, _) = send(&app, signed_webhook_request(&payload, TEST_WEBHOOK_SECRET)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn completed_event_without_correlation_is_a_client_error() {
    let app = TestApp::new().await;

    let payload = json!({
        "id": "evt_3",
        "type": "checkout.session.completed",
        "data": {},
    });
    let (status, _) = send(&app, signed_webhook_request(&payload, TEST_WEBHOOK_SECRET)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn notification_for_an_unknown_session_is_acknowledged() {
    let app = TestApp::new().await;

    let payload = json!({
        "id": "evt_4",
        "type": "checkout.session.completed",
        "data": { "session_id": "cs_ghost" },
    });
    let (status, _) = send(&app, signed_webhook_request(&payload, TEST_WEBHOOK_SECRET)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn redirect_and_notification_converge_on_one_confirmation() {
    let app = TestApp::new().await;
    let user = app.create_user("shopper@example.com", false).await;
    let beans = app.create_product("Espresso Beans", dec!(12.99), true).await;

    let (order_id, session_id) = checkout(&app, &user, beans.id, 2).await;

    // Browser returns first
    let redirect = Request::builder()
        .method(Method::GET)
        .uri(format!("/api/v1/orders/confirm?session_id={}", session_id))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, redirect).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "Confirmed");

    // Processor notification arrives later for the same session
    let payload = json!({
        "id": "evt_5",
        "type": "checkout.session.completed",
        "data": { "session_id": session_id },
    });
    let (status, _) = send(&app, signed_webhook_request(&payload, TEST_WEBHOOK_SECRET)).await;
    assert_eq!(status, StatusCode::OK);

    // Replayed redirect is harmless too
    let replay = Request::builder()
        .method(Method::GET)
        .uri(format!("/api/v1/orders/confirm?session_id={}", session_id))
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, replay).await;
    assert_eq!(status, StatusCode::OK);

    assert_eq!(order_status(&app, order_id).await, OrderStatus::Confirmed);

    // Exactly one confirmation's worth of order-count side effects
    let reached = common::wait_until(std::time::Duration::from_secs(5), || {
        let db = app.state.db.clone();
        async move {
            AnalyticsCounter::find()
                .filter(analytics_counter::Column::ProductId.eq(beans.id))
                .one(&*db)
                .await
                .unwrap()
                .map(|c| c.order_count == 2)
                .unwrap_or(false)
        }
    })
    .await;
    assert!(reached, "order counter never reached 2");

    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    let counter = AnalyticsCounter::find()
        .filter(analytics_counter::Column::ProductId.eq(beans.id))
        .one(&*app.state.db)
        .await
        .unwrap()
        .expect("counter missing");
    assert_eq!(counter.order_count, 2);
}

#[tokio::test]
async fn cart_endpoints_require_identity_headers() {
    let app = TestApp::new().await;

    let (status, _) = send(
        &app,
        Request::builder()
            .method(Method::GET)
            .uri("/api/v1/cart")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn product_views_dedup_per_browsing_session() {
    let app = TestApp::new().await;
    let beans = app.create_product("Espresso Beans", dec!(12.99), true).await;

    let view = |session: &'static str| {
        Request::builder()
            .method(Method::GET)
            .uri(format!("/api/v1/products/{}", beans.id))
            .header("x-session-id", session)
            .body(Body::empty())
            .unwrap()
    };

    let (status, _) = send(&app, view("sess-1")).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, view("sess-1")).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, view("sess-2")).await;
    assert_eq!(status, StatusCode::OK);

    let counter = AnalyticsCounter::find()
        .filter(analytics_counter::Column::ProductId.eq(beans.id))
        .one(&*app.state.db)
        .await
        .unwrap()
        .expect("counter missing");
    assert_eq!(counter.view_count, 2);
}

#[tokio::test]
async fn analytics_endpoints_are_admin_only() {
    let app = TestApp::new().await;
    let shopper = app.create_user("shopper@example.com", false).await;
    let admin = app.create_user("admin@example.com", true).await;

    let (status, _) = send(
        &app,
        authed(
            Request::builder().method(Method::GET).uri("/api/v1/analytics"),
            &shopper,
        )
        .body(Body::empty())
        .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(
        &app,
        authed(
            Request::builder()
                .method(Method::GET)
                .uri("/api/v1/analytics?sort=views_desc"),
            &admin,
        )
        .body(Body::empty())
        .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.is_array());
}
