//! Delivery tracking endpoints
//!
//! Start/stop here are manual overrides of the tracking automation.

use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde_json::{json, Value};

use crate::errors::AppError;
use crate::models::event::{DashboardEvent, TrackingNotice};
use crate::models::tracking::{OrderRoute, StartTrackingRequest, TrackedLocation, TrackingSnapshot};
use crate::AppState;

/// Shortest poll interval accepted from callers
const MIN_POLL_INTERVAL_MS: u64 = 1000;

/// GET /tracking/locations
pub async fn get_locations(State(state): State<AppState>) -> Result<Json<Vec<TrackedLocation>>, AppError> {
    Ok(Json(state.tracking.tracked_locations().await?))
}

/// GET /tracking/{orderId}
pub async fn get_tracking(
    State(state): State<AppState>,
    Path(order_id): Path<i32>,
) -> Result<Json<TrackingSnapshot>, AppError> {
    state
        .tracking
        .get_tracking_data(order_id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Order {} is not being tracked", order_id)))
}

/// POST /tracking/start/{orderId}?interval_ms=15000
pub async fn start_tracking(
    State(state): State<AppState>,
    Path(order_id): Path<i32>,
    Query(req): Query<StartTrackingRequest>,
) -> Result<Json<Value>, AppError> {
    if let Some(ms) = req.interval_ms {
        if ms < MIN_POLL_INTERVAL_MS {
            return Err(AppError::BadRequest(format!(
                "interval_ms must be at least {}",
                MIN_POLL_INTERVAL_MS
            )));
        }
    }

    let order = state.lifecycle.get_order(order_id).await?;
    let snapshot = state
        .tracking
        .start_tracking(
            order.id,
            &order.platform,
            &order.platform_order_id,
            req.interval_ms.map(Duration::from_millis),
        )
        .await?;

    state.events.publish(DashboardEvent::TrackingActivated(TrackingNotice {
        order_id: order.id,
        platform: order.platform.clone(),
        reason: "manual".to_string(),
    }));

    Ok(Json(json!({
        "success": true,
        "tracking": snapshot,
    })))
}

/// POST /tracking/stop/{orderId}
pub async fn stop_tracking(
    State(state): State<AppState>,
    Path(order_id): Path<i32>,
) -> Result<Json<Value>, AppError> {
    let order = state.lifecycle.get_order(order_id).await?;
    let was_tracking = state.tracking.stop_tracking(order.id).await?;

    if was_tracking {
        state.events.publish(DashboardEvent::TrackingDeactivated(TrackingNotice {
            order_id: order.id,
            platform: order.platform.clone(),
            reason: "manual".to_string(),
        }));
    }

    Ok(Json(json!({
        "success": true,
        "was_tracking": was_tracking,
    })))
}

/// GET /tracking/routes
pub async fn get_routes(State(state): State<AppState>) -> Result<Json<Vec<OrderRoute>>, AppError> {
    Ok(Json(state.tracking.get_all_routes().await?))
}

/// GET /tracking/routes/{orderId}
pub async fn get_route(
    State(state): State<AppState>,
    Path(order_id): Path<i32>,
) -> Result<Json<OrderRoute>, AppError> {
    Ok(Json(state.tracking.get_delivery_route(order_id).await?))
}
