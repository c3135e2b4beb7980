use axum::{extract::State, Json};
use sea_orm::ConnectionTrait;
use serde_json::{json, Value};

use crate::AppState;

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let database = match state.db.execute_unprepared("SELECT 1").await {
        Ok(_) => "ok",
        Err(e) => {
            tracing::warn!("Health check database ping failed: {}", e);
            "unavailable"
        }
    };

    Json(json!({
        "status": "ok",
        "database": database,
        "tracking_active": state.tracking.active_count(),
        "dashboard_clients": state.events.subscriber_count(),
    }))
}
