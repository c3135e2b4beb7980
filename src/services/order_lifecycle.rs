//! Order Lifecycle Service
//!
//! Owns every status change of an order. Accept and reject only apply to
//! pending orders; the transition itself is a guarded UPDATE so two operators
//! clicking at once produce one winner and one "already processed" answer.
//!
//! `apply_status` is permissive (kitchen staff can force any
//! stage) but keeps the confirmed/rejected stamps consistent with the status.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::entities::order_logs;
use crate::errors::LifecycleError;
use crate::models::event::{DashboardEvent, StatusChange};
use crate::models::order::{
    log_actions, Order, OrderCreateRequest, OrderFilter, OrderStatus, DEFAULT_PREPARATION_TIME,
    DEFAULT_REJECTION_REASON, MAX_PREPARATION_TIME, MIN_PREPARATION_TIME,
};
use crate::platforms::gateway::PlatformGateway;
use crate::services::event_bus::EventBus;
use crate::store::{CreateOutcome, LogEntry, OrderStore, StatusWrite};

/// Optimistic retries when another writer changes the status between read and write
const MAX_STATUS_WRITE_ATTEMPTS: usize = 3;

/// Who asked for a generic status change (recorded in the audit log)
pub mod origins {
    pub const MANUAL: &str = "manual";
    pub const WEBHOOK: &str = "webhook";
    pub const RECONCILIATION: &str = "reconciliation";
}

#[derive(Clone)]
pub struct OrderLifecycleService {
    store: OrderStore,
    gateway: Arc<dyn PlatformGateway>,
    events: EventBus,
}

impl OrderLifecycleService {
    pub fn new(store: OrderStore, gateway: Arc<dyn PlatformGateway>, events: EventBus) -> Self {
        Self { store, gateway, events }
    }

    /// Persist an adapter-normalized order for `platform_name` and announce it
    pub async fn create_order(
        &self,
        platform_name: &str,
        req: &OrderCreateRequest,
    ) -> Result<CreateOutcome, LifecycleError> {
        let platform = self
            .store
            .find_platform_by_name(platform_name)
            .await?
            .filter(|p| p.is_active)
            .ok_or_else(|| LifecycleError::UnknownPlatform(platform_name.to_string()))?;

        let outcome = self.store.create_order(&platform, req).await?;
        match outcome {
            CreateOutcome::Created(ref order) => {
                info!(
                    order_id = order.id,
                    platform = %order.platform,
                    platform_order_id = %order.platform_order_id,
                    total = %order.total_amount,
                    "New order received"
                );
                self.events.publish(DashboardEvent::NewOrder(order.clone()));
            }
            CreateOutcome::Duplicate(ref order) => {
                info!(
                    order_id = order.id,
                    platform_order_id = %order.platform_order_id,
                    "Order already stored, skipping duplicate"
                );
            }
        }

        Ok(outcome)
    }

    /// pending → preparing
    pub async fn accept(&self, id: i32, preparation_time: Option<i32>) -> Result<Order, LifecycleError> {
        let order = self.require_transition(id, OrderStatus::Preparing).await?;

        let minutes = preparation_time.unwrap_or(DEFAULT_PREPARATION_TIME);
        if !(MIN_PREPARATION_TIME..=MAX_PREPARATION_TIME).contains(&minutes) {
            return Err(LifecycleError::InvalidInput(format!(
                "preparation_time must be between {} and {} minutes",
                MIN_PREPARATION_TIME, MAX_PREPARATION_TIME
            )));
        }

        let write = StatusWrite {
            preparation_time: Some(minutes),
            confirmed_at: Some(Some(Utc::now())),
            ..StatusWrite::new(OrderStatus::Preparing)
        };
        let log = LogEntry {
            action: log_actions::CONFIRMED,
            details: serde_json::json!({ "preparation_time": minutes }),
        };

        let updated = self.guarded_transition(&order, &write, &log).await?;
        info!(order_id = id, preparation_time = minutes, "Order accepted");

        self.announce(&order, &updated);
        self.push_upstream(&updated, None).await;
        Ok(updated)
    }

    /// pending → rejected
    pub async fn reject(&self, id: i32, reason: Option<String>) -> Result<Order, LifecycleError> {
        let order = self.require_transition(id, OrderStatus::Rejected).await?;

        let reason = reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| DEFAULT_REJECTION_REASON.to_string());

        let write = StatusWrite {
            rejected_at: Some(Some(Utc::now())),
            rejection_reason: Some(Some(reason.clone())),
            ..StatusWrite::new(OrderStatus::Rejected)
        };
        let log = LogEntry {
            action: log_actions::REJECTED,
            details: serde_json::json!({ "reason": reason }),
        };

        let updated = self.guarded_transition(&order, &write, &log).await?;
        info!(order_id = id, reason = %reason, "Order rejected");

        self.announce(&order, &updated);
        self.push_upstream(&updated, Some(&reason)).await;
        Ok(updated)
    }

    /// Generic status change from the dashboard: validates the label only
    pub async fn update_status(&self, id: i32, status: &str) -> Result<Order, LifecycleError> {
        let next: OrderStatus = status
            .parse()
            .map_err(|_| LifecycleError::InvalidStatus(status.to_string()))?;

        self.apply_status(id, next, None, origins::MANUAL).await
    }

    /// Write `next` without consulting the transition table
    pub async fn apply_status(
        &self,
        id: i32,
        next: OrderStatus,
        platform_status: Option<String>,
        origin: &'static str,
    ) -> Result<Order, LifecycleError> {
        for _ in 0..MAX_STATUS_WRITE_ATTEMPTS {
            let current = self.store.find_order(id).await?.ok_or(LifecycleError::NotFound(id))?;

            let write = StatusWrite {
                platform_status: platform_status.clone(),
                ..stamps_for(&current, next)
            };
            let log = LogEntry {
                action: log_actions::STATUS_UPDATE,
                details: serde_json::json!({
                    "old_status": current.status,
                    "new_status": next,
                    "platform_status": platform_status,
                    "origin": origin,
                }),
            };

            if let Some(updated) = self.store.transition(id, Some(current.status), &write, &log).await? {
                info!(
                    order_id = id,
                    old_status = %current.status,
                    new_status = %next,
                    origin,
                    "Order status updated"
                );
                self.announce(&current, &updated);
                return Ok(updated);
            }
        }

        // Status kept moving under us; report what it is now
        let current = self.store.find_order(id).await?.ok_or(LifecycleError::NotFound(id))?;
        Err(LifecycleError::InvalidTransition { current: current.status })
    }

    pub async fn get_order(&self, id: i32) -> Result<Order, LifecycleError> {
        self.store.find_order(id).await?.ok_or(LifecycleError::NotFound(id))
    }

    pub async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>, LifecycleError> {
        Ok(self.store.list_orders(filter).await?)
    }

    pub async fn order_logs(&self, id: i32) -> Result<Vec<order_logs::Model>, LifecycleError> {
        self.get_order(id).await?;
        Ok(self.store.order_logs(id).await?)
    }

    async fn require_transition(&self, id: i32, next: OrderStatus) -> Result<Order, LifecycleError> {
        let order = self.store.find_order(id).await?.ok_or(LifecycleError::NotFound(id))?;
        if !order.status.can_transition_to(next) {
            return Err(LifecycleError::InvalidTransition { current: order.status });
        }
        Ok(order)
    }

    /// Apply `write` only if the order is still in the status it was read in
    async fn guarded_transition(
        &self,
        order: &Order,
        write: &StatusWrite,
        log: &LogEntry,
    ) -> Result<Order, LifecycleError> {
        match self.store.transition(order.id, Some(order.status), write, log).await? {
            Some(updated) => Ok(updated),
            None => {
                let current = self
                    .store
                    .find_order(order.id)
                    .await?
                    .ok_or(LifecycleError::NotFound(order.id))?;
                info!(order_id = order.id, current = %current.status, "Order already processed");
                Err(LifecycleError::InvalidTransition { current: current.status })
            }
        }
    }

    fn announce(&self, before: &Order, after: &Order) {
        if before.status == after.status {
            return;
        }
        self.events.publish(DashboardEvent::StatusChange(StatusChange {
            order_id: after.id,
            old_status: before.status,
            new_status: after.status,
            platform: after.platform.clone(),
            at: after.updated_at,
        }));
    }

    /// Best effort: the local transition stands whatever the platform answers
    async fn push_upstream(&self, order: &Order, reason: Option<&str>) {
        if !self.gateway.has_live_status_channel(&order.platform) {
            return;
        }

        if let Err(e) = self
            .gateway
            .push_order_status(&order.platform, &order.platform_order_id, order.status, reason)
            .await
        {
            warn!(
                order_id = order.id,
                platform = %order.platform,
                error = %e,
                "Upstream status sync failed"
            );
        }
    }
}

/// Stamp changes that keep `confirmed_at` / `rejected_at` / `rejection_reason`
/// consistent with `next`
fn stamps_for(current: &Order, next: OrderStatus) -> StatusWrite {
    let now = Utc::now();
    let mut write = StatusWrite::new(next);

    match next {
        OrderStatus::Rejected => {
            if current.rejected_at.is_none() {
                write.rejected_at = Some(Some(now));
            }
            if current.rejection_reason.is_none() {
                write.rejection_reason = Some(Some(DEFAULT_REJECTION_REASON.to_string()));
            }
            write.confirmed_at = Some(None);
        }
        OrderStatus::Pending => {
            write.rejected_at = Some(None);
            write.rejection_reason = Some(None);
        }
        _ => {
            write.rejected_at = Some(None);
            write.rejection_reason = Some(None);
            if current.confirmed_at.is_none() {
                write.confirmed_at = Some(Some(now));
            }
        }
    }

    write
}
