//! Runtime configuration loaded from the environment (`.env` supported)

use std::collections::HashMap;
use std::env;
use std::time::Duration;

use crate::models::tracking::LatLng;

const ENV_DATABASE_URL: &str = "DATABASE_URL";
const ENV_BIND_ADDR: &str = "BIND_ADDR";
const ENV_RESTAURANT_LAT: &str = "RESTAURANT_LAT";
const ENV_RESTAURANT_LNG: &str = "RESTAURANT_LNG";
const ENV_ORS_API_KEY: &str = "OPENROUTESERVICE_API_KEY";
const ENV_ORS_BASE_URL: &str = "OPENROUTESERVICE_BASE_URL";
const ENV_RECONCILE_INTERVAL: &str = "RECONCILE_INTERVAL_SECS";
const ENV_RECONCILE_BATCH: &str = "RECONCILE_BATCH_SIZE";
const ENV_RECONCILE_STALE: &str = "RECONCILE_STALE_SECS";
const ENV_TRACKING_INTERVAL: &str = "TRACKING_AUTOMATION_INTERVAL_SECS";
const ENV_TRACKING_WINDOW: &str = "TRACKING_RECENT_WINDOW_SECS";
const ENV_TRACKING_POLL_MS: &str = "TRACKING_POLL_INTERVAL_MS";
const ENV_CLEANUP_INTERVAL: &str = "TRACKING_CLEANUP_INTERVAL_SECS";
const ENV_RETENTION_HOURS: &str = "TRACKING_RETENTION_HOURS";
const ENV_PLATFORM_TIMEOUT: &str = "PLATFORM_HTTP_TIMEOUT_SECS";
const ENV_AUTO_TRACK_READY: &str = "AUTO_TRACK_READY";

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
/// Plaza de Armas, Santiago
const DEFAULT_RESTAURANT: LatLng = LatLng { lat: -33.4378, lng: -70.6505 };
const DEFAULT_ORS_BASE_URL: &str = "https://api.openrouteservice.org";
const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 120;
const DEFAULT_RECONCILE_BATCH_SIZE: u64 = 10;
const DEFAULT_RECONCILE_STALE_SECS: i64 = 60;
const DEFAULT_TRACKING_INTERVAL_SECS: u64 = 30;
const DEFAULT_TRACKING_WINDOW_SECS: i64 = 300;
const DEFAULT_TRACKING_POLL_MS: u64 = 15_000;
const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 3600;
const DEFAULT_RETENTION_HOURS: i64 = 24;
const DEFAULT_PLATFORM_TIMEOUT_SECS: u64 = 10;

/// Platforms the hub ships adapters for
pub const KNOWN_PLATFORMS: [&str; 3] = ["rappi", "ubereats", "pedidosya"];

/// Partner API access for one platform
#[derive(Debug, Clone)]
pub struct PlatformApiConfig {
    pub base_url: String,
    pub api_key: Option<String>,
}

/// Timing knobs for the automation jobs
#[derive(Debug, Clone)]
pub struct AutomationConfig {
    pub reconcile_interval: Duration,
    pub reconcile_batch_size: u64,
    /// Orders untouched for at least this long are eligible for reconciliation
    pub reconcile_stale_after: chrono::Duration,
    pub tracking_interval: Duration,
    /// Only orders updated within this window trigger tracking changes
    pub tracking_recent_window: chrono::Duration,
    pub tracking_poll_interval: Duration,
    pub cleanup_interval: Duration,
    pub tracking_retention: chrono::Duration,
    /// Start tracking as soon as an order is ready, not only once delivering
    pub auto_track_ready: bool,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            reconcile_interval: Duration::from_secs(DEFAULT_RECONCILE_INTERVAL_SECS),
            reconcile_batch_size: DEFAULT_RECONCILE_BATCH_SIZE,
            reconcile_stale_after: chrono::Duration::seconds(DEFAULT_RECONCILE_STALE_SECS),
            tracking_interval: Duration::from_secs(DEFAULT_TRACKING_INTERVAL_SECS),
            tracking_recent_window: chrono::Duration::seconds(DEFAULT_TRACKING_WINDOW_SECS),
            tracking_poll_interval: Duration::from_millis(DEFAULT_TRACKING_POLL_MS),
            cleanup_interval: Duration::from_secs(DEFAULT_CLEANUP_INTERVAL_SECS),
            tracking_retention: chrono::Duration::hours(DEFAULT_RETENTION_HOURS),
            auto_track_ready: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: String,
    pub restaurant: LatLng,
    pub ors_api_key: Option<String>,
    pub ors_base_url: String,
    pub platform_timeout: Duration,
    pub platform_apis: HashMap<String, PlatformApiConfig>,
    pub automation: AutomationConfig,
}

impl AppConfig {
    /// Read configuration from environment variables, applying defaults
    pub fn from_env() -> Result<Self, String> {
        let database_url = env::var(ENV_DATABASE_URL).map_err(|_| format!("{} must be set", ENV_DATABASE_URL))?;

        let mut platform_apis = HashMap::new();
        for name in KNOWN_PLATFORMS {
            let prefix = name.to_uppercase();
            if let Some(base_url) = non_empty_var(&format!("{}_API_URL", prefix)) {
                platform_apis.insert(
                    name.to_string(),
                    PlatformApiConfig {
                        base_url,
                        api_key: non_empty_var(&format!("{}_API_KEY", prefix)),
                    },
                );
            }
        }

        let defaults = AutomationConfig::default();
        let automation = AutomationConfig {
            reconcile_interval: Duration::from_secs(parse_var(ENV_RECONCILE_INTERVAL, DEFAULT_RECONCILE_INTERVAL_SECS)),
            reconcile_batch_size: parse_var(ENV_RECONCILE_BATCH, DEFAULT_RECONCILE_BATCH_SIZE),
            reconcile_stale_after: chrono::Duration::seconds(parse_var(ENV_RECONCILE_STALE, DEFAULT_RECONCILE_STALE_SECS)),
            tracking_interval: Duration::from_secs(parse_var(ENV_TRACKING_INTERVAL, DEFAULT_TRACKING_INTERVAL_SECS)),
            tracking_recent_window: chrono::Duration::seconds(parse_var(ENV_TRACKING_WINDOW, DEFAULT_TRACKING_WINDOW_SECS)),
            tracking_poll_interval: Duration::from_millis(parse_var(ENV_TRACKING_POLL_MS, DEFAULT_TRACKING_POLL_MS)),
            cleanup_interval: Duration::from_secs(parse_var(ENV_CLEANUP_INTERVAL, DEFAULT_CLEANUP_INTERVAL_SECS)),
            tracking_retention: chrono::Duration::hours(parse_var(ENV_RETENTION_HOURS, DEFAULT_RETENTION_HOURS)),
            auto_track_ready: env::var(ENV_AUTO_TRACK_READY)
                .map(|v| v.to_lowercase() != "false")
                .unwrap_or(defaults.auto_track_ready),
        };

        Ok(Self {
            database_url,
            bind_addr: non_empty_var(ENV_BIND_ADDR).unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            restaurant: LatLng::new(
                parse_var(ENV_RESTAURANT_LAT, DEFAULT_RESTAURANT.lat),
                parse_var(ENV_RESTAURANT_LNG, DEFAULT_RESTAURANT.lng),
            ),
            ors_api_key: non_empty_var(ENV_ORS_API_KEY),
            ors_base_url: non_empty_var(ENV_ORS_BASE_URL).unwrap_or_else(|| DEFAULT_ORS_BASE_URL.to_string()),
            platform_timeout: Duration::from_secs(parse_var(ENV_PLATFORM_TIMEOUT, DEFAULT_PLATFORM_TIMEOUT_SECS)),
            platform_apis,
            automation,
        })
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_automation_defaults() {
        let config = AutomationConfig::default();
        assert_eq!(config.reconcile_interval, Duration::from_secs(120));
        assert_eq!(config.reconcile_batch_size, 10);
        assert_eq!(config.reconcile_stale_after, chrono::Duration::minutes(1));
        assert_eq!(config.tracking_interval, Duration::from_secs(30));
        assert_eq!(config.tracking_recent_window, chrono::Duration::minutes(5));
        assert_eq!(config.tracking_retention, chrono::Duration::hours(24));
    }

    #[test]
    fn test_parse_var_falls_back_on_garbage() {
        assert_eq!(parse_var("COMANDA_HUB_TEST_UNSET_VAR", 42u64), 42);
    }
}
