//! Automation Service
//!
//! The scans run by the periodic jobs:
//! - status reconciliation: pull upstream status for stale active orders
//!   (covers missed webhooks)
//! - tracking lifecycle: start tracking for orders that became ready or
//!   delivering, stop it once they are delivered
//!
//! Every scan works on a fresh query result and contains failures per order,
//! so an overlapping or failed tick only costs redundant work.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::AutomationConfig;
use crate::errors::{LifecycleError, PlatformError, TrackingError};
use crate::models::event::{DashboardEvent, TrackingNotice};
use crate::models::order::{Order, OrderFilter, OrderStatus};
use crate::platforms::gateway::PlatformGateway;
use crate::platforms::PlatformRegistry;
use crate::services::delivery_tracking::DeliveryTrackingService;
use crate::services::event_bus::EventBus;
use crate::services::order_lifecycle::{origins, OrderLifecycleService};
use crate::store::OrderStore;

#[derive(Debug, Default, Clone, Serialize)]
pub struct ReconcileSummary {
    pub checked: usize,
    pub updated: usize,
    pub unsupported: usize,
    pub failed: usize,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct TrackingAutomationSummary {
    pub started_delivering: usize,
    pub stopped_delivered: usize,
    pub started_ready: usize,
    pub failed: usize,
}

enum ReconcileOutcome {
    Updated,
    Unchanged,
    Unsupported,
}

#[derive(Clone)]
pub struct AutomationService {
    store: OrderStore,
    lifecycle: OrderLifecycleService,
    tracking: DeliveryTrackingService,
    gateway: Arc<dyn PlatformGateway>,
    registry: PlatformRegistry,
    events: EventBus,
    config: AutomationConfig,
}

impl AutomationService {
    pub fn new(
        store: OrderStore,
        lifecycle: OrderLifecycleService,
        tracking: DeliveryTrackingService,
        gateway: Arc<dyn PlatformGateway>,
        registry: PlatformRegistry,
        events: EventBus,
        config: AutomationConfig,
    ) -> Self {
        Self {
            store,
            lifecycle,
            tracking,
            gateway,
            registry,
            events,
            config,
        }
    }

    pub fn config(&self) -> &AutomationConfig {
        &self.config
    }

    /// Reconcile a batch of stale active orders with their platforms.
    ///
    /// Every checked order is stamped whatever the outcome, so orders that
    /// keep failing or never change rotate behind the rest of the queue.
    pub async fn reconcile_statuses(&self) -> Result<ReconcileSummary, LifecycleError> {
        let filter = OrderFilter {
            statuses: OrderStatus::ACTIVE.to_vec(),
            updated_before: Some(Utc::now() - self.config.reconcile_stale_after),
            reconcile_order: true,
            limit: Some(self.config.reconcile_batch_size),
            ..Default::default()
        };
        let orders = self.lifecycle.list_orders(&filter).await?;

        let mut summary = ReconcileSummary {
            checked: orders.len(),
            ..Default::default()
        };

        let checked: Vec<i32> = orders.iter().map(|o| o.id).collect();

        for order in orders {
            match self.reconcile_order(&order).await {
                Ok(ReconcileOutcome::Updated) => summary.updated += 1,
                Ok(ReconcileOutcome::Unchanged) => {}
                Ok(ReconcileOutcome::Unsupported) => summary.unsupported += 1,
                Err(e) => {
                    summary.failed += 1;
                    warn!(
                        order_id = order.id,
                        platform = %order.platform,
                        error = %e,
                        "Status reconciliation failed for order"
                    );
                }
            }
        }

        self.store.mark_reconciled(&checked).await?;

        Ok(summary)
    }

    async fn reconcile_order(
        &self,
        order: &Order,
    ) -> Result<ReconcileOutcome, Box<dyn std::error::Error + Send + Sync>> {
        let raw = match self
            .gateway
            .fetch_order_status(&order.platform, &order.platform_order_id)
            .await
        {
            Ok(raw) => raw,
            Err(PlatformError::Unsupported(_)) => return Ok(ReconcileOutcome::Unsupported),
            Err(e) => return Err(e.into()),
        };

        let mapped = self.registry.map_status(&order.platform, &raw);

        // `Pending` is also the mapper's answer for labels it does not know
        if mapped == order.status || (mapped == OrderStatus::Pending && order.status != OrderStatus::Pending) {
            debug!(order_id = order.id, raw = %raw, local = %order.status, "Upstream status unchanged");
            return Ok(ReconcileOutcome::Unchanged);
        }

        self.lifecycle
            .apply_status(order.id, mapped, Some(raw), origins::RECONCILIATION)
            .await?;

        Ok(ReconcileOutcome::Updated)
    }

    /// Start/stop tracking for recently updated orders
    pub async fn run_tracking_automation(&self) -> Result<TrackingAutomationSummary, TrackingError> {
        let since = Utc::now() - self.config.tracking_recent_window;
        let interval = Some(self.config.tracking_poll_interval);
        let mut summary = TrackingAutomationSummary::default();

        for order in self.store.orders_without_tracking(OrderStatus::Delivering, since).await? {
            match self
                .tracking
                .start_tracking(order.id, &order.platform, &order.platform_order_id, interval)
                .await
            {
                Ok(_) => {
                    summary.started_delivering += 1;
                    self.notify_activated(&order, "delivering");
                }
                Err(e) => {
                    summary.failed += 1;
                    warn!(order_id = order.id, error = %e, "Failed to start tracking for delivering order");
                }
            }
        }

        // A tick may already have persisted `delivered` for an order whose
        // loop is still running, so live loops are checked too
        let mut delivered = self.store.delivered_with_active_tracking(since).await?;
        let recent_delivered = OrderFilter {
            statuses: vec![OrderStatus::Delivered],
            updated_after: Some(since),
            ..Default::default()
        };
        for order in self.store.list_orders(&recent_delivered).await? {
            if self.tracking.is_tracking(order.id) && !delivered.iter().any(|o| o.id == order.id) {
                delivered.push(order);
            }
        }

        for order in delivered {
            match self.tracking.auto_stop_tracking(order.id).await {
                Ok(true) => {
                    summary.stopped_delivered += 1;
                    self.events.publish(DashboardEvent::TrackingDeactivated(TrackingNotice {
                        order_id: order.id,
                        platform: order.platform.clone(),
                        reason: "delivered".to_string(),
                    }));
                }
                Ok(false) => {}
                Err(e) => {
                    summary.failed += 1;
                    warn!(order_id = order.id, error = %e, "Failed to stop tracking for delivered order");
                }
            }
        }

        if self.config.auto_track_ready {
            for order in self.store.orders_without_tracking(OrderStatus::Ready, since).await? {
                match self.tracking.auto_start_tracking(order.id).await {
                    Ok(true) => {
                        summary.started_ready += 1;
                        self.notify_activated(&order, "ready");
                    }
                    Ok(false) => {}
                    Err(e) => {
                        summary.failed += 1;
                        warn!(order_id = order.id, error = %e, "Failed to start tracking for ready order");
                    }
                }
            }
        }

        if summary.started_delivering + summary.stopped_delivered + summary.started_ready > 0 {
            info!(
                started_delivering = summary.started_delivering,
                stopped_delivered = summary.stopped_delivered,
                started_ready = summary.started_ready,
                active = self.tracking.active_count(),
                "Tracking automation applied changes"
            );
        }

        Ok(summary)
    }

    pub async fn cleanup_tracking(&self) -> Result<u64, TrackingError> {
        self.tracking.cleanup_old_tracking_data().await
    }

    fn notify_activated(&self, order: &Order, reason: &str) {
        self.events.publish(DashboardEvent::TrackingActivated(TrackingNotice {
            order_id: order.id,
            platform: order.platform.clone(),
            reason: reason.to_string(),
        }));
    }
}
