//! Inbound order ingestion
//!
//! Routes a raw payload to its platform adapter, dedups re-deliveries and
//! hands new orders to the lifecycle service. Dedup is two-layered: a TTL
//! cache of recently processed upstream ids answers quickly, and the unique
//! (platform, platform_order_id) index in the store is the durable boundary
//! that survives restarts.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use serde_json::Value;
use tracing::{debug, info};

use super::{PlatformAdapter, PlatformRegistry};
use crate::errors::LifecycleError;
use crate::models::order::{Order, OrderCreateRequest, OrderStatus};
use crate::services::order_lifecycle::{origins, OrderLifecycleService};
use crate::store::CreateOutcome;

const PROCESSED_CACHE_CAPACITY: u64 = 10_000;
const PROCESSED_CACHE_TTL_SECS: u64 = 24 * 3600;

#[derive(Debug, Clone)]
pub enum IngestOutcome {
    Created(Order),
    /// Already known, nothing changed
    Duplicate(Order),
    /// Already known, and the payload moved its status
    StatusSynced(Order),
}

impl IngestOutcome {
    pub fn order(&self) -> &Order {
        match self {
            IngestOutcome::Created(order) | IngestOutcome::Duplicate(order) | IngestOutcome::StatusSynced(order) => {
                order
            }
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            IngestOutcome::Created(_) => "created",
            IngestOutcome::Duplicate(_) => "duplicate",
            IngestOutcome::StatusSynced(_) => "status_synced",
        }
    }
}

#[derive(Clone)]
pub struct OrderIngestor {
    registry: PlatformRegistry,
    lifecycle: OrderLifecycleService,
    /// "platform:platform_order_id" → local order id
    processed: Arc<Cache<String, i32>>,
}

impl OrderIngestor {
    pub fn new(registry: PlatformRegistry, lifecycle: OrderLifecycleService) -> Self {
        let processed = Cache::builder()
            .max_capacity(PROCESSED_CACHE_CAPACITY)
            .time_to_live(Duration::from_secs(PROCESSED_CACHE_TTL_SECS))
            .build();

        Self {
            registry,
            lifecycle,
            processed: Arc::new(processed),
        }
    }

    pub async fn ingest(&self, platform: &str, payload: &Value) -> Result<IngestOutcome, LifecycleError> {
        let adapter = self
            .registry
            .get(platform)
            .ok_or_else(|| LifecycleError::UnknownPlatform(platform.to_string()))?;

        let req = adapter
            .normalize_order(payload)
            .map_err(|e| LifecycleError::InvalidInput(e.to_string()))?;

        let key = format!("{}:{}", adapter.name(), req.platform_order_id);

        if let Some(order_id) = self.processed.get(&key).await {
            debug!(key = %key, order_id, "Payload for already processed order");
            let order = self.lifecycle.get_order(order_id).await?;
            return self.sync_status(adapter.as_ref(), order, &req).await;
        }

        match self.lifecycle.create_order(adapter.name(), &req).await? {
            CreateOutcome::Created(order) => {
                self.processed.insert(key, order.id).await;
                Ok(IngestOutcome::Created(order))
            }
            CreateOutcome::Duplicate(order) => {
                self.processed.insert(key, order.id).await;
                self.sync_status(adapter.as_ref(), order, &req).await
            }
        }
    }

    /// Apply the payload's upstream status to a known order when it maps to a
    /// different stage
    async fn sync_status(
        &self,
        adapter: &dyn PlatformAdapter,
        order: Order,
        req: &OrderCreateRequest,
    ) -> Result<IngestOutcome, LifecycleError> {
        let Some(raw) = req.platform_status.clone().into_option() else {
            return Ok(IngestOutcome::Duplicate(order));
        };

        let mapped = adapter.map_status(&raw);
        if mapped == order.status || mapped == OrderStatus::Pending {
            return Ok(IngestOutcome::Duplicate(order));
        }

        info!(
            order_id = order.id,
            platform = adapter.name(),
            raw_status = %raw,
            new_status = %mapped,
            "Upstream status change received"
        );
        let updated = self
            .lifecycle
            .apply_status(order.id, mapped, Some(raw), origins::WEBHOOK)
            .await?;

        Ok(IngestOutcome::StatusSynced(updated))
    }
}
