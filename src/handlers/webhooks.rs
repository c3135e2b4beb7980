use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use tracing::info;

use crate::errors::AppError;
use crate::platforms::ingest::IngestOutcome;
use crate::AppState;

/// POST /webhooks/{platform}
///
/// Raw platform payload (webhook JSON, scraped card, parsed email). New
/// orders answer 201, re-deliveries 200.
pub async fn receive_webhook(
    State(state): State<AppState>,
    Path(platform): Path<String>,
    Json(payload): Json<Value>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let outcome = state.ingestor.ingest(&platform, &payload).await?;
    let order = outcome.order();

    info!(
        platform = %platform,
        order_id = order.id,
        result = outcome.label(),
        "Webhook processed"
    );

    let status = if matches!(outcome, IngestOutcome::Created(_)) {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };

    Ok((
        status,
        Json(json!({
            "success": true,
            "result": outcome.label(),
            "order_id": order.id,
            "status": order.status,
        })),
    ))
}
