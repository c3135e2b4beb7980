//! Outbound calls to platform partner APIs
//!
//! Only some platforms expose an API (and only when credentials are
//! configured). Calls against the others fail with `PlatformError::Unsupported`
//! so callers can pick their fallback.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::config::PlatformApiConfig;
use crate::errors::PlatformError;
use crate::models::order::OrderStatus;
use crate::models::tracking::{DriverLocation, LatLng};

/// Platforms that accept status pushes from the restaurant
const LIVE_STATUS_PLATFORMS: [&str; 1] = ["rappi"];

#[async_trait]
pub trait PlatformGateway: Send + Sync {
    /// Raw upstream status label for an order
    async fn fetch_order_status(&self, platform: &str, platform_order_id: &str) -> Result<String, PlatformError>;

    async fn fetch_driver_location(
        &self,
        platform: &str,
        platform_order_id: &str,
    ) -> Result<DriverLocation, PlatformError>;

    /// Mirror a local transition upstream
    async fn push_order_status(
        &self,
        platform: &str,
        platform_order_id: &str,
        status: OrderStatus,
        reason: Option<&str>,
    ) -> Result<(), PlatformError>;

    fn has_live_status_channel(&self, platform: &str) -> bool;
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    #[serde(alias = "state")]
    status: String,
}

#[derive(Debug, Deserialize)]
struct LocationResponse {
    #[serde(alias = "latitude")]
    lat: Option<f64>,
    #[serde(alias = "longitude", alias = "lon")]
    lng: Option<f64>,
    #[serde(alias = "eta")]
    estimated_arrival: Option<DateTime<Utc>>,
    driver_name: Option<String>,
}

#[derive(Clone)]
pub struct HttpPlatformGateway {
    client: Client,
    apis: HashMap<String, PlatformApiConfig>,
}

impl HttpPlatformGateway {
    pub fn new(apis: HashMap<String, PlatformApiConfig>, timeout: Duration) -> Result<Self, PlatformError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, apis })
    }

    fn api(&self, platform: &str) -> Result<&PlatformApiConfig, PlatformError> {
        self.apis
            .get(platform)
            .ok_or_else(|| PlatformError::Unsupported(platform.to_string()))
    }

    fn request(&self, method: reqwest::Method, api: &PlatformApiConfig, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}", api.base_url.trim_end_matches('/'), path);
        let builder = self.client.request(method, url).header("accept", "application/json");
        match api.api_key {
            Some(ref key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response, PlatformError> {
        let response = builder.send().await.map_err(from_reqwest)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(PlatformError::Api { status, body });
        }

        Ok(response)
    }
}

#[async_trait]
impl PlatformGateway for HttpPlatformGateway {
    async fn fetch_order_status(&self, platform: &str, platform_order_id: &str) -> Result<String, PlatformError> {
        let api = self.api(platform)?;
        let path = format!("orders/{}/status", platform_order_id);

        let response = self.send(self.request(reqwest::Method::GET, api, &path)).await?;
        let data: StatusResponse = response
            .json()
            .await
            .map_err(|e| PlatformError::Malformed(e.to_string()))?;

        debug!(platform, platform_order_id, status = %data.status, "Fetched upstream status");
        Ok(data.status)
    }

    async fn fetch_driver_location(
        &self,
        platform: &str,
        platform_order_id: &str,
    ) -> Result<DriverLocation, PlatformError> {
        let api = self.api(platform)?;
        let path = format!("orders/{}/tracking", platform_order_id);

        let response = self.send(self.request(reqwest::Method::GET, api, &path)).await?;
        let data: LocationResponse = response
            .json()
            .await
            .map_err(|e| PlatformError::Malformed(e.to_string()))?;

        match (data.lat, data.lng) {
            (Some(lat), Some(lng)) => Ok(DriverLocation {
                position: LatLng::new(lat, lng),
                estimated_arrival: data.estimated_arrival,
                driver_name: data.driver_name,
            }),
            _ => Err(PlatformError::Malformed("tracking response without coordinates".to_string())),
        }
    }

    async fn push_order_status(
        &self,
        platform: &str,
        platform_order_id: &str,
        status: OrderStatus,
        reason: Option<&str>,
    ) -> Result<(), PlatformError> {
        if !self.has_live_status_channel(platform) {
            return Err(PlatformError::Unsupported(platform.to_string()));
        }
        let api = self.api(platform)?;
        let path = format!("orders/{}/status", platform_order_id);

        let body = serde_json::json!({
            "status": status,
            "reason": reason,
        });
        self.send(self.request(reqwest::Method::PUT, api, &path).json(&body))
            .await?;

        Ok(())
    }

    fn has_live_status_channel(&self, platform: &str) -> bool {
        LIVE_STATUS_PLATFORMS.contains(&platform) && self.apis.contains_key(platform)
    }
}

fn from_reqwest(e: reqwest::Error) -> PlatformError {
    if e.is_timeout() {
        PlatformError::Timeout
    } else {
        PlatformError::Http(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway() -> HttpPlatformGateway {
        let mut apis = HashMap::new();
        apis.insert(
            "rappi".to_string(),
            PlatformApiConfig { base_url: "http://127.0.0.1:9".to_string(), api_key: None },
        );
        HttpPlatformGateway::new(apis, Duration::from_secs(1)).unwrap()
    }

    #[test]
    fn test_live_channel_requires_configured_api() {
        let gateway = gateway();
        assert!(gateway.has_live_status_channel("rappi"));
        assert!(!gateway.has_live_status_channel("ubereats"));
        assert!(!gateway.has_live_status_channel("pedidosya"));
    }

    #[tokio::test]
    async fn test_unconfigured_platform_is_unsupported() {
        let gateway = gateway();
        let result = gateway.fetch_driver_location("ubereats", "UE-1").await;
        assert!(matches!(result, Err(PlatformError::Unsupported(_))));

        let result = gateway
            .push_order_status("pedidosya", "PY-1", OrderStatus::Preparing, None)
            .await;
        assert!(matches!(result, Err(PlatformError::Unsupported(_))));
    }

    #[test]
    fn test_location_payload_aliases() {
        let data: LocationResponse =
            serde_json::from_str(r#"{"latitude": -33.4, "lon": -70.6, "eta": "2026-01-01T12:00:00Z"}"#).unwrap();
        assert_eq!(data.lat, Some(-33.4));
        assert_eq!(data.lng, Some(-70.6));
        assert!(data.estimated_arrival.is_some());
        assert!(data.driver_name.is_none());
    }
}
