//! Delivery tracking and route types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::order::OrderStatus;

/// WGS84 coordinate pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// Where a tracked position came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationSource {
    /// Reported by the platform's location API
    Platform,
    /// Interpolated locally because the platform exposes no location API
    Simulated,
}

/// Driver position as reported by a platform
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverLocation {
    pub position: LatLng,
    /// Platform-provided ETA, when it gives one
    pub estimated_arrival: Option<DateTime<Utc>>,
    pub driver_name: Option<String>,
}

/// Latest known tracking state for one order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingSnapshot {
    pub order_id: i32,
    pub platform: String,
    pub platform_order_id: String,
    pub driver: Option<LatLng>,
    pub customer: Option<LatLng>,
    pub estimated_arrival: Option<DateTime<Utc>>,
    pub driver_name: Option<String>,
    pub status: OrderStatus,
    pub source: LocationSource,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Computed path between two points (never persisted)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    pub coordinates: Vec<LatLng>,
    pub distance_km: f64,
    pub duration_min: f64,
    /// True when produced by the local fallback instead of the routing API
    pub simulated: bool,
}

/// Two-leg delivery route
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryRoute {
    pub driver_to_restaurant: Route,
    pub restaurant_to_customer: Route,
    pub total_distance_km: f64,
    pub total_duration_min: f64,
}

/// Route response enriched with the points it was computed from
#[derive(Debug, Clone, Serialize)]
pub struct OrderRoute {
    pub order_id: i32,
    pub restaurant: LatLng,
    pub driver: LatLng,
    pub customer: LatLng,
    pub route: DeliveryRoute,
}

/// Entry for GET /tracking/locations
#[derive(Debug, Clone, Serialize)]
pub struct TrackedLocation {
    #[serde(flatten)]
    pub snapshot: TrackingSnapshot,
    /// False when synthesized for an order with no live poll loop
    pub live: bool,
}

/// Body for POST /tracking/start/{orderId}
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StartTrackingRequest {
    pub interval_ms: Option<u64>,
}
