mod common;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use comanda_hub::build_router;
use comanda_hub::models::order::OrderStatus;

use crate::common::TestContext;

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

fn rappi_payload(order_id: &str, status: &str) -> Value {
    json!({
        "event": "order.updated",
        "order": {
            "order_id": order_id,
            "status": status,
            "customer": {
                "name": "Ana Rojas",
                "phone": "+56 9 5555 0101",
                "address": "Av. Providencia 1234",
                "lat": -33.4263,
                "lng": -70.6173
            },
            "items": [
                { "name": "Completo italiano", "quantity": 2, "price": 3500 },
                { "name": "Bebida", "quantity": 1, "price": 1200 }
            ],
            "total": 8200
        }
    })
}

#[tokio::test]
async fn test_health() {
    let ctx = TestContext::new().await;
    let app = build_router(ctx.state.clone());

    let (status, body) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["database"], "ok");
    assert_eq!(body["tracking_active"], 0);
}

/// Webhook creates the order once; re-deliveries answer 200 with the same id
#[tokio::test]
async fn test_webhook_dedup() {
    let ctx = TestContext::new().await;
    let app = build_router(ctx.state.clone());

    let (status, created) = send(&app, Method::POST, "/webhooks/rappi", Some(rappi_payload("RP-1", "created"))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["result"], "created");
    assert_eq!(created["status"], "pending");

    let (status, again) = send(&app, Method::POST, "/webhooks/rappi", Some(rappi_payload("RP-1", "created"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again["result"], "duplicate");
    assert_eq!(again["order_id"], created["order_id"]);

    let (status, orders) = send(&app, Method::GET, "/orders", None).await;
    assert_eq!(status, StatusCode::OK);
    let orders = orders.as_array().unwrap();
    assert_eq!(orders.len(), 1);
    let total: f64 = orders[0]["total_amount"].as_str().unwrap().parse().unwrap();
    assert_eq!(total, 8200.0);
    assert_eq!(orders[0]["platform"], "rappi");
}

/// A re-delivery carrying a newer upstream status moves the order
#[tokio::test]
async fn test_webhook_status_sync() {
    let ctx = TestContext::new().await;
    let app = build_router(ctx.state.clone());

    let (_, created) = send(&app, Method::POST, "/webhooks/rappi", Some(rappi_payload("RP-2", "created"))).await;
    let (status, synced) = send(&app, Method::POST, "/webhooks/rappi", Some(rappi_payload("RP-2", "on_the_way"))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(synced["result"], "status_synced");
    assert_eq!(synced["status"], "delivering");

    let id = created["order_id"].as_i64().unwrap() as i32;
    let order = ctx.state.lifecycle.get_order(id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Delivering);
    assert_eq!(order.platform_status.as_deref(), Some("on_the_way"));
}

#[tokio::test]
async fn test_webhook_unknown_platform() {
    let ctx = TestContext::new().await;
    let app = build_router(ctx.state.clone());

    let (status, _) = send(&app, Method::POST, "/webhooks/glovo", Some(rappi_payload("G-1", "created"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_webhook_without_order_id() {
    let ctx = TestContext::new().await;
    let app = build_router(ctx.state.clone());

    let (status, _) = send(&app, Method::POST, "/webhooks/rappi", Some(json!({ "customer": { "name": "Ana" } }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

/// Accept over HTTP, then the "already processed" answer
#[tokio::test]
async fn test_accept_endpoint() {
    let ctx = TestContext::new().await;
    let order = ctx.seed_order("R-400").await;
    let app = build_router(ctx.state.clone());
    let uri = format!("/orders/{}/accept", order.id);

    let (status, body) = send(&app, Method::POST, &uri, Some(json!({ "preparation_time": 20 }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["status"], "preparing");
    assert_eq!(body["order"]["preparation_time"], 20);

    let (status, body) = send(&app, Method::POST, &uri, Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Order already processed");
    assert_eq!(body["currentStatus"], "preparing");
}

#[tokio::test]
async fn test_reject_endpoint() {
    let ctx = TestContext::new().await;
    let order = ctx.seed_order("R-401").await;
    let app = build_router(ctx.state.clone());

    let uri = format!("/orders/{}/reject", order.id);
    let (status, body) = send(&app, Method::POST, &uri, Some(json!({ "reason": "Sin stock" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "rejected");
    assert_eq!(body["order"]["rejection_reason"], "Sin stock");
}

#[tokio::test]
async fn test_update_status_endpoint() {
    let ctx = TestContext::new().await;
    let order = ctx.seed_order("R-402").await;
    let app = build_router(ctx.state.clone());
    let uri = format!("/orders/{}/status", order.id);

    let (status, body) = send(&app, Method::PATCH, &uri, Some(json!({ "status": "ready" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");

    let (status, _) = send(&app, Method::PATCH, &uri, Some(json!({ "status": "cooking" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, Method::PATCH, "/orders/9999/status", Some(json!({ "status": "ready" }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_orders_filters() {
    let ctx = TestContext::new().await;
    ctx.seed_order("R-403").await;
    ctx.seed_order_in("R-404", OrderStatus::Ready).await;
    let app = build_router(ctx.state.clone());

    let (status, body) = send(&app, Method::GET, "/orders?status=ready", None).await;
    assert_eq!(status, StatusCode::OK);
    let orders = body.as_array().unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0]["platform_order_id"], "R-404");

    let (status, _) = send(&app, Method::GET, "/orders?status=cooking", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_order_logs_endpoint() {
    let ctx = TestContext::new().await;
    let order = ctx.seed_order("R-405").await;
    let app = build_router(ctx.state.clone());

    let (status, body) = send(&app, Method::GET, &format!("/orders/{}/logs", order.id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["action"], "order_created");

    let (status, _) = send(&app, Method::GET, "/orders/9999", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_tracking_endpoints() {
    let ctx = TestContext::new().await;
    ctx.gateway.mark_unsupported("rappi");
    let order = ctx.seed_order_in("R-406", OrderStatus::Delivering).await;
    let app = build_router(ctx.state.clone());

    let (status, _) = send(&app, Method::GET, &format!("/tracking/{}", order.id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, Method::POST, &format!("/tracking/start/{}?interval_ms=10", order.id), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, Method::POST, &format!("/tracking/start/{}", order.id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tracking"]["source"], "simulated");

    let (status, body) = send(&app, Method::GET, &format!("/tracking/{}", order.id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["order_id"], order.id);

    let (status, body) = send(&app, Method::GET, "/tracking/locations", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["live"], true);

    let (status, body) = send(&app, Method::GET, &format!("/tracking/routes/{}", order.id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["route"]["restaurant_to_customer"]["simulated"], true);

    let (status, body) = send(&app, Method::POST, &format!("/tracking/stop/{}", order.id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["was_tracking"], true);

    let (status, body) = send(&app, Method::POST, &format!("/tracking/stop/{}", order.id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["was_tracking"], false);
}
