//! Order endpoints used by the restaurant dashboard
//!
//! Accept/reject on an order that was already handled answers 400 with the
//! current status; that is an expected race between operators, not a failure.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde_json::{json, Value};

use crate::entities::order_logs;
use crate::errors::AppError;
use crate::models::order::{
    AcceptOrderRequest, Order, OrderListQuery, RejectOrderRequest, UpdateStatusRequest,
};
use crate::AppState;

/// GET /orders?status=ready,delivering&platform=rappi&limit=50
pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<OrderListQuery>,
) -> Result<Json<Vec<Order>>, AppError> {
    let filter = query.into_filter().map_err(AppError::BadRequest)?;
    let orders = state.lifecycle.list_orders(&filter).await?;
    Ok(Json(orders))
}

/// GET /orders/{id}
pub async fn get_order(State(state): State<AppState>, Path(id): Path<i32>) -> Result<Json<Order>, AppError> {
    Ok(Json(state.lifecycle.get_order(id).await?))
}

/// GET /orders/{id}/logs
pub async fn get_order_logs(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<Vec<order_logs::Model>>, AppError> {
    Ok(Json(state.lifecycle.order_logs(id).await?))
}

/// POST /orders/{id}/accept
pub async fn accept_order(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(req): Json<AcceptOrderRequest>,
) -> Result<Json<Value>, AppError> {
    let order = state.lifecycle.accept(id, req.preparation_time).await?;
    Ok(Json(json!({
        "success": true,
        "status": order.status,
        "order": order,
    })))
}

/// POST /orders/{id}/reject
pub async fn reject_order(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(req): Json<RejectOrderRequest>,
) -> Result<Json<Value>, AppError> {
    let order = state.lifecycle.reject(id, req.reason).await?;
    Ok(Json(json!({
        "success": true,
        "status": order.status,
        "order": order,
    })))
}

/// PATCH /orders/{id}/status
pub async fn update_order_status(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<Value>, AppError> {
    let order = state.lifecycle.update_status(id, &req.status).await?;
    Ok(Json(json!({
        "success": true,
        "status": order.status,
        "order": order,
    })))
}
