//! Route Service
//!
//! Driving routes from OpenRouteService, with a local straight-line
//! approximation whenever the API is unavailable. Callers always get a route.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use rand::Rng;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::tracking::{DeliveryRoute, LatLng, Route};

pub const DEFAULT_PROFILE: &str = "driving-car";

const EARTH_RADIUS_KM: f64 = 6371.0;
/// Urban delivery pace used for simulated durations
const MINUTES_PER_KM: f64 = 2.5;
const MIN_WAYPOINTS: usize = 3;
const MAX_WAYPOINTS: usize = 30;
const WAYPOINTS_PER_KM: f64 = 4.0;
/// Max jitter in degrees (~30 m), scaled down for very short routes
const WAYPOINT_JITTER_DEG: f64 = 0.0003;
const ROUTE_CACHE_TTL_SECS: u64 = 600;

#[derive(Debug, Error)]
enum RoutingFailure {
    #[error("no routing API key configured")]
    MissingApiKey,
    #[error("routing request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("routing API returned {0}")]
    Status(u16),
    #[error("routing response has no route")]
    Empty,
}

#[derive(Debug, Deserialize)]
struct DirectionsResponse {
    #[serde(default)]
    features: Vec<DirectionsFeature>,
}

#[derive(Debug, Deserialize)]
struct DirectionsFeature {
    geometry: DirectionsGeometry,
    properties: DirectionsProperties,
}

#[derive(Debug, Deserialize)]
struct DirectionsGeometry {
    /// `[lng, lat]` pairs (optionally with elevation)
    coordinates: Vec<Vec<f64>>,
}

#[derive(Debug, Deserialize)]
struct DirectionsProperties {
    #[serde(default)]
    summary: DirectionsSummary,
}

#[derive(Debug, Default, Deserialize)]
struct DirectionsSummary {
    /// Meters
    #[serde(default)]
    distance: f64,
    /// Seconds
    #[serde(default)]
    duration: f64,
}

#[derive(Clone)]
pub struct RouteService {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    cache: Arc<Cache<String, Route>>,
}

impl RouteService {
    pub fn new(api_key: Option<String>, base_url: String) -> Result<Self, reqwest::Error> {
        let cache = Cache::builder()
            .max_capacity(1000)
            .time_to_live(Duration::from_secs(ROUTE_CACHE_TTL_SECS))
            .build();

        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;

        Ok(Self {
            client,
            api_key,
            base_url,
            cache: Arc::new(cache),
        })
    }

    /// Route between two points. Never fails: API problems fall back to
    /// `simulated_route`.
    pub async fn get_route(&self, start: LatLng, end: LatLng, profile: &str) -> Route {
        let cache_key = format!(
            "{}:{:.5},{:.5}:{:.5},{:.5}",
            profile, start.lat, start.lng, end.lat, end.lng
        );

        if let Some(route) = self.cache.get(&cache_key).await {
            debug!("Route cache hit for {}", cache_key);
            return route;
        }

        match self.fetch_route(start, end, profile).await {
            Ok(route) => {
                self.cache.insert(cache_key, route.clone()).await;
                route
            }
            Err(RoutingFailure::MissingApiKey) => Self::simulated_route(start, end),
            Err(e) => {
                warn!(error = %e, "Routing API failed, using simulated route");
                Self::simulated_route(start, end)
            }
        }
    }

    /// Two independent legs: driver → restaurant and restaurant → customer
    pub async fn get_delivery_route(&self, restaurant: LatLng, driver: LatLng, customer: LatLng) -> DeliveryRoute {
        let (driver_to_restaurant, restaurant_to_customer) = tokio::join!(
            self.get_route(driver, restaurant, DEFAULT_PROFILE),
            self.get_route(restaurant, customer, DEFAULT_PROFILE),
        );

        DeliveryRoute {
            total_distance_km: driver_to_restaurant.distance_km + restaurant_to_customer.distance_km,
            total_duration_min: driver_to_restaurant.duration_min + restaurant_to_customer.duration_min,
            driver_to_restaurant,
            restaurant_to_customer,
        }
    }

    /// Great-circle route with interpolated, slightly jittered waypoints.
    /// Endpoints are exact.
    pub fn simulated_route(start: LatLng, end: LatLng) -> Route {
        let distance_km = haversine_km(start, end);
        let waypoints = ((distance_km * WAYPOINTS_PER_KM).ceil() as usize).clamp(MIN_WAYPOINTS, MAX_WAYPOINTS);
        let jitter = WAYPOINT_JITTER_DEG * distance_km.min(1.0);

        let mut rng = rand::thread_rng();
        let mut coordinates = Vec::with_capacity(waypoints + 2);
        coordinates.push(start);
        for i in 1..=waypoints {
            let t = i as f64 / (waypoints + 1) as f64;
            let mut point = interpolate(start, end, t);
            if jitter > 0.0 {
                point.lat += rng.gen_range(-jitter..=jitter);
                point.lng += rng.gen_range(-jitter..=jitter);
            }
            coordinates.push(point);
        }
        coordinates.push(end);

        Route {
            coordinates,
            distance_km,
            duration_min: distance_km * MINUTES_PER_KM,
            simulated: true,
        }
    }

    async fn fetch_route(&self, start: LatLng, end: LatLng, profile: &str) -> Result<Route, RoutingFailure> {
        let api_key = self.api_key.as_deref().ok_or(RoutingFailure::MissingApiKey)?;
        let url = format!("{}/v2/directions/{}", self.base_url.trim_end_matches('/'), profile);

        let response = self
            .client
            .get(&url)
            .header("accept", "application/geo+json")
            .query(&[
                ("api_key", api_key.to_string()),
                ("start", format!("{},{}", start.lng, start.lat)),
                ("end", format!("{},{}", end.lng, end.lat)),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(RoutingFailure::Status(response.status().as_u16()));
        }

        let data: DirectionsResponse = response.json().await?;
        let feature = data.features.into_iter().next().ok_or(RoutingFailure::Empty)?;

        let coordinates: Vec<LatLng> = feature
            .geometry
            .coordinates
            .iter()
            .filter(|c| c.len() >= 2)
            .map(|c| LatLng::new(c[1], c[0]))
            .collect();
        if coordinates.is_empty() {
            return Err(RoutingFailure::Empty);
        }

        Ok(Route {
            coordinates,
            distance_km: feature.properties.summary.distance / 1000.0,
            duration_min: feature.properties.summary.duration / 60.0,
            simulated: false,
        })
    }
}

/// Great-circle distance in kilometers
pub fn haversine_km(a: LatLng, b: LatLng) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();
    let h = (d_lat / 2.0).sin().powi(2) + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().atan2((1.0 - h).max(0.0).sqrt())
}

/// Linear interpolation, `t` in [0, 1]
pub fn interpolate(a: LatLng, b: LatLng, t: f64) -> LatLng {
    let t = t.clamp(0.0, 1.0);
    if t >= 1.0 {
        return b;
    }
    LatLng::new(a.lat + (b.lat - a.lat) * t, a.lng + (b.lng - a.lng) * t)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAZA: LatLng = LatLng { lat: -33.4378, lng: -70.6505 };
    const COSTANERA: LatLng = LatLng { lat: -33.4173, lng: -70.6065 };

    #[test]
    fn test_simulated_route_same_point() {
        let route = RouteService::simulated_route(PLAZA, PLAZA);
        assert_eq!(route.distance_km, 0.0);
        assert_eq!(route.duration_min, 0.0);
        assert!(route.coordinates.len() >= MIN_WAYPOINTS + 2);
        assert!(route.coordinates.iter().all(|p| *p == PLAZA));
        assert!(route.simulated);
    }

    #[test]
    fn test_simulated_route_shape() {
        let route = RouteService::simulated_route(PLAZA, COSTANERA);
        // ~4.6 km across Santiago
        assert!(route.distance_km > 4.0 && route.distance_km < 5.5, "{}", route.distance_km);
        assert!((route.duration_min - route.distance_km * 2.5).abs() < 1e-9);
        assert_eq!(route.coordinates.first(), Some(&PLAZA));
        assert_eq!(route.coordinates.last(), Some(&COSTANERA));
        assert!(route.coordinates.len() > MIN_WAYPOINTS + 2);
    }

    #[test]
    fn test_interpolate_clamps() {
        assert_eq!(interpolate(PLAZA, COSTANERA, 0.0), PLAZA);
        assert_eq!(interpolate(PLAZA, COSTANERA, 2.0), COSTANERA);
    }

    #[tokio::test]
    async fn test_get_route_without_key_is_simulated() {
        let service = RouteService::new(None, "http://127.0.0.1:9".to_string()).unwrap();
        let route = service.get_route(PLAZA, COSTANERA, DEFAULT_PROFILE).await;
        assert!(route.simulated);
    }

    #[tokio::test]
    async fn test_unreachable_api_falls_back() {
        let service = RouteService::new(Some("key".to_string()), "http://127.0.0.1:9".to_string()).unwrap();
        let route = service.get_route(PLAZA, COSTANERA, DEFAULT_PROFILE).await;
        assert!(route.simulated);
        assert_eq!(route.coordinates.last(), Some(&COSTANERA));
    }

    #[tokio::test]
    async fn test_delivery_route_sums_legs() {
        let service = RouteService::new(None, String::new()).unwrap();
        let driver = LatLng::new(-33.45, -70.66);
        let route = service.get_delivery_route(PLAZA, driver, COSTANERA).await;

        let expected = route.driver_to_restaurant.distance_km + route.restaurant_to_customer.distance_km;
        assert!((route.total_distance_km - expected).abs() < 1e-9);
        assert_eq!(route.driver_to_restaurant.coordinates.last(), Some(&PLAZA));
        assert_eq!(route.restaurant_to_customer.coordinates.first(), Some(&PLAZA));
    }
}
