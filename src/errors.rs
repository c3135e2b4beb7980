use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::DbErr;
use thiserror::Error;
use tracing::error;

use crate::models::order::OrderStatus;

/// Failures of the order lifecycle operations
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Order {0} not found")]
    NotFound(i32),
    /// Accept/reject on an order that already left `pending`
    #[error("Order already processed, current status = {current}")]
    InvalidTransition { current: OrderStatus },
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Invalid status: {0}")]
    InvalidStatus(String),
    #[error("Unknown platform: {0}")]
    UnknownPlatform(String),
    #[error("Store error: {0}")]
    Store(#[from] DbErr),
}

/// Failures talking to an upstream platform API
#[derive(Debug, Error)]
pub enum PlatformError {
    /// The platform exposes no API for this call (or none is configured)
    #[error("Operation not supported by platform {0}")]
    Unsupported(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Platform API error {status}: {body}")]
    Api { status: u16, body: String },
    #[error("Platform call timed out")]
    Timeout,
    #[error("Malformed platform response: {0}")]
    Malformed(String),
}

/// Failures of tracking operations invoked directly (not from a poll tick)
#[derive(Debug, Error)]
pub enum TrackingError {
    #[error("Order {0} not found")]
    OrderNotFound(i32),
    /// A stop (or a newer start) took over while this start was in flight
    #[error("Tracking for order {0} was stopped while starting")]
    Superseded(i32),
    #[error("Store error: {0}")]
    Store(#[from] DbErr),
    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),
}

/// Handler-facing error
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error(transparent)]
    Tracking(#[from] TrackingError),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Lifecycle(e) => match e {
                LifecycleError::NotFound(_) | LifecycleError::UnknownPlatform(_) => StatusCode::NOT_FOUND,
                LifecycleError::InvalidTransition { .. }
                | LifecycleError::InvalidInput(_)
                | LifecycleError::InvalidStatus(_) => StatusCode::BAD_REQUEST,
                LifecycleError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::Tracking(e) => match e {
                TrackingError::OrderNotFound(_) => StatusCode::NOT_FOUND,
                TrackingError::Superseded(_) => StatusCode::CONFLICT,
                TrackingError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
                TrackingError::Platform(_) => StatusCode::BAD_GATEWAY,
            },
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }

        let body = match &self {
            AppError::Lifecycle(LifecycleError::InvalidTransition { current }) => serde_json::json!({
                "error": "Order already processed",
                "currentStatus": current,
            }),
            _ => serde_json::json!({ "error": self.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let err = AppError::from(LifecycleError::InvalidTransition { current: OrderStatus::Preparing });
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);

        let err = AppError::from(LifecycleError::NotFound(3));
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);

        let err = AppError::from(LifecycleError::Store(DbErr::Custom("boom".into())));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        let err = AppError::from(TrackingError::Superseded(3));
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }
}
