use std::sync::Arc;

use sea_orm::Database;
use sea_orm_migration::MigratorTrait;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use comanda_hub::config::AppConfig;
use comanda_hub::jobs::{
    status_reconciliation::start_status_reconciliation_job, tracking_automation::start_tracking_automation_job,
    tracking_cleanup::start_tracking_cleanup_job,
};
use comanda_hub::platforms::gateway::{HttpPlatformGateway, PlatformGateway};
use comanda_hub::platforms::ingest::OrderIngestor;
use comanda_hub::platforms::PlatformRegistry;
use comanda_hub::services::automation::AutomationService;
use comanda_hub::services::delivery_tracking::{DeliveryTrackingService, TrackingSettings};
use comanda_hub::services::event_bus::EventBus;
use comanda_hub::services::order_lifecycle::OrderLifecycleService;
use comanda_hub::services::route::RouteService;
use comanda_hub::store::OrderStore;
use comanda_hub::{build_router, AppState};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,comanda_hub=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env().expect("Invalid configuration");

    // Connect to database
    tracing::info!("Connecting to database...");
    let db = Database::connect(&config.database_url)
        .await
        .expect("Failed to connect to database");

    // Run migrations
    tracing::info!("Running migrations...");
    migration::Migrator::up(&db, None)
        .await
        .expect("Failed to run migrations");

    let store = OrderStore::new(db.clone());
    let events = EventBus::new();
    let registry = PlatformRegistry::with_defaults();
    let gateway: Arc<dyn PlatformGateway> = Arc::new(
        HttpPlatformGateway::new(config.platform_apis.clone(), config.platform_timeout)
            .expect("Failed to build platform HTTP client"),
    );
    let routes = RouteService::new(config.ors_api_key.clone(), config.ors_base_url.clone())
        .expect("Failed to build routing HTTP client");

    if config.ors_api_key.is_none() {
        tracing::warn!("OPENROUTESERVICE_API_KEY not set - routes will be simulated");
    }
    for name in registry.names() {
        if !config.platform_apis.contains_key(name) {
            tracing::info!(platform = name, "No partner API configured - status polling off, positions simulated");
        }
    }

    let lifecycle = OrderLifecycleService::new(store.clone(), gateway.clone(), events.clone());
    let tracking = DeliveryTrackingService::new(
        store.clone(),
        gateway.clone(),
        routes,
        events.clone(),
        TrackingSettings {
            restaurant: config.restaurant,
            poll_interval: config.automation.tracking_poll_interval,
            retention: config.automation.tracking_retention,
        },
    );
    let ingestor = OrderIngestor::new(registry.clone(), lifecycle.clone());
    let automation = AutomationService::new(
        store,
        lifecycle.clone(),
        tracking.clone(),
        gateway,
        registry,
        events.clone(),
        config.automation.clone(),
    );

    // Background jobs
    start_status_reconciliation_job(automation.clone()).await;
    start_tracking_automation_job(automation.clone()).await;
    start_tracking_cleanup_job(automation).await;

    let state = AppState {
        db,
        lifecycle,
        tracking: tracking.clone(),
        ingestor,
        events,
    };

    let app = build_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    tracking.stop_all().await;
    tracing::info!("Shutdown complete");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
