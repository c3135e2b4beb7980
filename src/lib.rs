// src/lib.rs

use axum::{
    routing::{get, patch, post},
    Router,
};
use sea_orm::DatabaseConnection;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use platforms::ingest::OrderIngestor;
use services::{
    delivery_tracking::DeliveryTrackingService, event_bus::EventBus, order_lifecycle::OrderLifecycleService,
};

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub lifecycle: OrderLifecycleService,
    pub tracking: DeliveryTrackingService,
    pub ingestor: OrderIngestor,
    pub events: EventBus,
}

pub mod config;
pub mod errors;
pub mod store;
pub mod platforms;
pub mod jobs;

pub mod entities {
    pub mod prelude;
    pub mod platforms;
    pub mod orders;
    pub mod order_logs;
    pub mod delivery_tracking;
}

pub mod models {
    pub mod order;
    pub mod tracking;
    pub mod event;
}

pub mod services {
    pub mod event_bus;
    pub mod route;
    pub mod order_lifecycle;
    pub mod delivery_tracking;
    pub mod automation;
}

pub mod handlers {
    pub mod orders;
    pub mod tracking;
    pub mod webhooks;
    pub mod dashboard_ws;
    pub mod health;
}

/// HTTP surface for the dashboard, platform webhooks and the event stream
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/orders", get(handlers::orders::list_orders))
        .route("/orders/{id}", get(handlers::orders::get_order))
        .route("/orders/{id}/logs", get(handlers::orders::get_order_logs))
        .route("/orders/{id}/accept", post(handlers::orders::accept_order))
        .route("/orders/{id}/reject", post(handlers::orders::reject_order))
        .route("/orders/{id}/status", patch(handlers::orders::update_order_status))
        .route("/tracking/locations", get(handlers::tracking::get_locations))
        .route("/tracking/routes", get(handlers::tracking::get_routes))
        .route("/tracking/routes/{order_id}", get(handlers::tracking::get_route))
        .route("/tracking/start/{order_id}", post(handlers::tracking::start_tracking))
        .route("/tracking/stop/{order_id}", post(handlers::tracking::stop_tracking))
        .route("/tracking/{order_id}", get(handlers::tracking::get_tracking))
        .route("/webhooks/{platform}", post(handlers::webhooks::receive_webhook))
        .route("/ws", get(handlers::dashboard_ws::dashboard_websocket))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
