#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use sea_orm::{Database, DatabaseConnection, DbErr};
use sea_orm_migration::MigratorTrait;

use comanda_hub::config::AutomationConfig;
use comanda_hub::errors::PlatformError;
use comanda_hub::models::order::{Order, OrderCreateRequest, OrderItem, OrderStatus, ParsedField};
use comanda_hub::models::tracking::{DriverLocation, LatLng};
use comanda_hub::platforms::gateway::PlatformGateway;
use comanda_hub::platforms::ingest::OrderIngestor;
use comanda_hub::platforms::PlatformRegistry;
use comanda_hub::services::automation::AutomationService;
use comanda_hub::services::delivery_tracking::{DeliveryTrackingService, TrackingSettings};
use comanda_hub::services::event_bus::EventBus;
use comanda_hub::services::order_lifecycle::OrderLifecycleService;
use comanda_hub::services::route::RouteService;
use comanda_hub::store::{CreateOutcome, OrderStore};
use comanda_hub::AppState;

pub const RESTAURANT: LatLng = LatLng { lat: -33.4378, lng: -70.6505 };
pub const TEST_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Fresh in-memory database with the schema and seeded platforms
pub async fn setup_test_db() -> Result<DatabaseConnection, DbErr> {
    let db = Database::connect("sqlite::memory:").await?;
    migration::Migrator::up(&db, None).await?;
    Ok(db)
}

/// Platform gateway with canned answers and call counters
#[derive(Default)]
pub struct ScriptedGateway {
    /// platform_order_id -> raw upstream status
    pub statuses: Mutex<HashMap<String, String>>,
    pub location: Mutex<Option<LatLng>>,
    /// Added latency on every location fetch
    pub location_delay: Mutex<Option<Duration>>,
    /// Platforms answering `Unsupported` to every call
    pub unsupported: Mutex<HashSet<String>>,
    pub live_status: Mutex<HashSet<String>>,
    pub status_calls: AtomicUsize,
    pub location_calls: AtomicUsize,
    pub pushes: Mutex<Vec<(String, OrderStatus)>>,
}

impl ScriptedGateway {
    pub fn set_status(&self, platform_order_id: &str, status: &str) {
        self.statuses
            .lock()
            .insert(platform_order_id.to_string(), status.to_string());
    }

    pub fn set_location(&self, position: LatLng) {
        *self.location.lock() = Some(position);
    }

    pub fn set_location_delay(&self, delay: Duration) {
        *self.location_delay.lock() = Some(delay);
    }

    pub fn mark_unsupported(&self, platform: &str) {
        self.unsupported.lock().insert(platform.to_string());
    }

    pub fn location_calls(&self) -> usize {
        self.location_calls.load(Ordering::SeqCst)
    }

    fn check(&self, platform: &str) -> Result<(), PlatformError> {
        if self.unsupported.lock().contains(platform) {
            return Err(PlatformError::Unsupported(platform.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl PlatformGateway for ScriptedGateway {
    async fn fetch_order_status(&self, platform: &str, platform_order_id: &str) -> Result<String, PlatformError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        self.check(platform)?;
        self.statuses
            .lock()
            .get(platform_order_id)
            .cloned()
            .ok_or_else(|| PlatformError::Api { status: 404, body: "unknown order".to_string() })
    }

    async fn fetch_driver_location(
        &self,
        platform: &str,
        _platform_order_id: &str,
    ) -> Result<DriverLocation, PlatformError> {
        self.location_calls.fetch_add(1, Ordering::SeqCst);
        self.check(platform)?;
        let delay = *self.location_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let position = (*self.location.lock()).ok_or_else(|| PlatformError::Unsupported(platform.to_string()))?;
        Ok(DriverLocation {
            position,
            estimated_arrival: None,
            driver_name: Some("Carla".to_string()),
        })
    }

    async fn push_order_status(
        &self,
        platform: &str,
        platform_order_id: &str,
        status: OrderStatus,
        _reason: Option<&str>,
    ) -> Result<(), PlatformError> {
        self.check(platform)?;
        self.pushes.lock().push((platform_order_id.to_string(), status));
        Ok(())
    }

    fn has_live_status_channel(&self, platform: &str) -> bool {
        self.live_status.lock().contains(platform)
    }
}

/// Every service wired against one in-memory database
pub struct TestContext {
    pub state: AppState,
    pub store: OrderStore,
    pub gateway: Arc<ScriptedGateway>,
    pub automation: AutomationService,
}

impl TestContext {
    pub async fn new() -> Self {
        Self::with_config(test_automation_config()).await
    }

    pub async fn with_config(config: AutomationConfig) -> Self {
        let db = setup_test_db().await.expect("Failed to set up test DB");
        let gateway = Arc::new(ScriptedGateway::default());
        let dyn_gateway: Arc<dyn PlatformGateway> = gateway.clone();

        let store = OrderStore::new(db.clone());
        let events = EventBus::new();
        let registry = PlatformRegistry::with_defaults();
        let lifecycle = OrderLifecycleService::new(store.clone(), dyn_gateway.clone(), events.clone());
        let tracking = DeliveryTrackingService::new(
            store.clone(),
            dyn_gateway.clone(),
            RouteService::new(None, "http://127.0.0.1:9".to_string()).expect("Failed to build route client"),
            events.clone(),
            TrackingSettings {
                restaurant: RESTAURANT,
                poll_interval: config.tracking_poll_interval,
                retention: config.tracking_retention,
            },
        );
        let ingestor = OrderIngestor::new(registry.clone(), lifecycle.clone());
        let automation = AutomationService::new(
            store.clone(),
            lifecycle.clone(),
            tracking.clone(),
            dyn_gateway,
            registry,
            events.clone(),
            config,
        );

        Self {
            state: AppState {
                db,
                lifecycle,
                tracking,
                ingestor,
                events,
            },
            store,
            gateway,
            automation,
        }
    }

    /// Store a pending rappi order and return it
    pub async fn seed_order(&self, platform_order_id: &str) -> Order {
        let req = OrderCreateRequest {
            customer_name: ParsedField::Present("Ana Rojas".to_string()),
            customer_location: ParsedField::Present((-33.4173, -70.6065)),
            items: vec![OrderItem {
                name: "Completo italiano".to_string(),
                quantity: 2,
                price: rust_decimal::Decimal::new(3500, 0),
            }],
            ..OrderCreateRequest::new(platform_order_id)
        };

        match self
            .state
            .lifecycle
            .create_order("rappi", &req)
            .await
            .expect("Failed to seed order")
        {
            CreateOutcome::Created(order) => order,
            CreateOutcome::Duplicate(order) => panic!("Order {} already seeded", order.platform_order_id),
        }
    }

    /// Seed an order and force it to `status`
    pub async fn seed_order_in(&self, platform_order_id: &str, status: OrderStatus) -> Order {
        let order = self.seed_order(platform_order_id).await;
        if status == OrderStatus::Pending {
            return order;
        }
        self.state
            .lifecycle
            .update_status(order.id, status.as_str())
            .await
            .expect("Failed to set order status")
    }
}

pub fn test_automation_config() -> AutomationConfig {
    AutomationConfig {
        tracking_poll_interval: TEST_POLL_INTERVAL,
        reconcile_stale_after: chrono::Duration::zero(),
        ..AutomationConfig::default()
    }
}
