//! Order store
//!
//! Persistence boundary for orders, their audit log and delivery tracking
//! snapshots. Status transitions are conditional UPDATEs guarded by the
//! expected current status, so concurrent writers on the same order resolve to
//! exactly one winner.

use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::{Expr, OnConflict, Query},
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder, QuerySelect,
    Set, SqlErr, TransactionTrait,
};
use tracing::debug;

use crate::entities::{delivery_tracking, order_logs, orders, platforms, prelude::*};
use crate::models::order::{
    log_actions, Order, OrderCreateRequest, OrderFilter, OrderStatus, DEFAULT_PREPARATION_TIME,
};
use crate::models::tracking::TrackingSnapshot;

/// Result of persisting an adapter-normalized order
#[derive(Debug, Clone)]
pub enum CreateOutcome {
    Created(Order),
    /// Same (platform, platform_order_id) already stored
    Duplicate(Order),
}

impl CreateOutcome {
    pub fn order(&self) -> &Order {
        match self {
            CreateOutcome::Created(order) | CreateOutcome::Duplicate(order) => order,
        }
    }
}

/// Field writes applied together with a status change.
///
/// For the nullable stamps `None` keeps the stored value, `Some(None)` clears
/// it and `Some(Some(v))` sets it.
#[derive(Debug, Clone)]
pub struct StatusWrite {
    pub status: OrderStatus,
    pub platform_status: Option<String>,
    pub preparation_time: Option<i32>,
    pub confirmed_at: Option<Option<DateTime<Utc>>>,
    pub rejected_at: Option<Option<DateTime<Utc>>>,
    pub rejection_reason: Option<Option<String>>,
}

impl StatusWrite {
    pub fn new(status: OrderStatus) -> Self {
        Self {
            status,
            platform_status: None,
            preparation_time: None,
            confirmed_at: None,
            rejected_at: None,
            rejection_reason: None,
        }
    }
}

/// Audit row written in the same transaction as a status change
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub action: &'static str,
    pub details: serde_json::Value,
}

#[derive(Clone)]
pub struct OrderStore {
    db: DatabaseConnection,
}

impl OrderStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    pub async fn find_platform_by_name(&self, name: &str) -> Result<Option<platforms::Model>, DbErr> {
        Platforms::find()
            .filter(platforms::Column::Name.eq(name.trim().to_lowercase()))
            .one(&self.db)
            .await
    }

    pub async fn find_by_platform_ref(
        &self,
        platform_id: i32,
        platform_order_id: &str,
    ) -> Result<Option<Order>, DbErr> {
        let found = Orders::find()
            .filter(orders::Column::PlatformId.eq(platform_id))
            .filter(orders::Column::PlatformOrderId.eq(platform_order_id))
            .find_also_related(Platforms)
            .one(&self.db)
            .await?;

        Ok(found.map(into_order))
    }

    /// Insert a new pending order plus its `order_created` log row.
    ///
    /// Re-deliveries of an already stored upstream order return
    /// `CreateOutcome::Duplicate` with the existing row.
    pub async fn create_order(
        &self,
        platform: &platforms::Model,
        req: &OrderCreateRequest,
    ) -> Result<CreateOutcome, DbErr> {
        if let Some(existing) = self.find_by_platform_ref(platform.id, &req.platform_order_id).await? {
            return Ok(CreateOutcome::Duplicate(existing));
        }

        let now = Utc::now();
        let items = serde_json::to_value(&req.items).map_err(|e| DbErr::Custom(format!("Invalid items: {}", e)))?;
        let (lat, lng) = match req.customer_location.clone().into_option() {
            Some((lat, lng)) => (Some(lat), Some(lng)),
            None => (None, None),
        };

        let txn = self.db.begin().await?;

        let order = orders::ActiveModel {
            platform_id: Set(platform.id),
            platform_order_id: Set(req.platform_order_id.clone()),
            customer_name: Set(req.customer_name.clone().unwrap_or_default()),
            customer_phone: Set(req.customer_phone.clone().unwrap_or_default()),
            customer_address: Set(req.customer_address.clone().unwrap_or_default()),
            customer_lat: Set(lat),
            customer_lng: Set(lng),
            items: Set(items),
            total_amount: Set(req.resolved_total()),
            preparation_time: Set(DEFAULT_PREPARATION_TIME),
            status: Set(OrderStatus::Pending.to_string()),
            platform_status: Set(req.platform_status.clone().into_option()),
            confirmed_at: Set(None),
            rejected_at: Set(None),
            rejection_reason: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            reconciled_at: Set(now),
            ..Default::default()
        };

        let inserted = match order.insert(&txn).await {
            Ok(model) => model,
            Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                txn.rollback().await?;
                debug!(
                    platform = %platform.name,
                    platform_order_id = %req.platform_order_id,
                    "Concurrent insert won the race, returning stored order"
                );
                return match self.find_by_platform_ref(platform.id, &req.platform_order_id).await? {
                    Some(existing) => Ok(CreateOutcome::Duplicate(existing)),
                    None => Err(e),
                };
            }
            Err(e) => return Err(e),
        };

        insert_log(
            &txn,
            inserted.id,
            &LogEntry {
                action: log_actions::ORDER_CREATED,
                details: serde_json::json!({
                    "platform": platform.name,
                    "platform_order_id": req.platform_order_id,
                    "total_amount": inserted.total_amount,
                    "items": req.items.len(),
                }),
            },
            now,
        )
        .await?;

        txn.commit().await?;

        Ok(CreateOutcome::Created(Order::from_model(inserted, platform.name.clone())))
    }

    pub async fn find_order(&self, id: i32) -> Result<Option<Order>, DbErr> {
        let found = Orders::find_by_id(id)
            .find_also_related(Platforms)
            .one(&self.db)
            .await?;

        Ok(found.map(into_order))
    }

    pub async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>, DbErr> {
        let mut select = Orders::find().find_also_related(Platforms);

        if !filter.statuses.is_empty() {
            select = select.filter(orders::Column::Status.is_in(filter.statuses.iter().map(|s| s.as_str())));
        }
        if let Some(ref platform) = filter.platform {
            select = select.filter(platforms::Column::Name.eq(platform.as_str()));
        }
        if let Some(before) = filter.updated_before {
            select = select.filter(orders::Column::UpdatedAt.lt(before));
        }
        if let Some(after) = filter.updated_after {
            select = select.filter(orders::Column::UpdatedAt.gte(after));
        }

        select = if filter.reconcile_order {
            select
                .order_by_asc(orders::Column::ReconciledAt)
                .order_by_asc(orders::Column::UpdatedAt)
        } else {
            select.order_by_desc(orders::Column::CreatedAt)
        };

        let rows = select.limit(filter.limit).all(&self.db).await?;

        Ok(rows.into_iter().map(into_order).collect())
    }

    /// Apply a status change if the order is still in `expected` (any status
    /// when `expected` is None). Returns None when the guard did not match.
    pub async fn transition(
        &self,
        id: i32,
        expected: Option<OrderStatus>,
        write: &StatusWrite,
        log: &LogEntry,
    ) -> Result<Option<Order>, DbErr> {
        let now = Utc::now();
        let txn = self.db.begin().await?;

        let mut update = Orders::update_many()
            .col_expr(orders::Column::Status, Expr::value(write.status.as_str()))
            .col_expr(orders::Column::UpdatedAt, Expr::value(now))
            .filter(orders::Column::Id.eq(id));

        if let Some(expected) = expected {
            update = update.filter(orders::Column::Status.eq(expected.as_str()));
        }
        if let Some(ref platform_status) = write.platform_status {
            update = update.col_expr(orders::Column::PlatformStatus, Expr::value(platform_status.clone()));
        }
        if let Some(minutes) = write.preparation_time {
            update = update.col_expr(orders::Column::PreparationTime, Expr::value(minutes));
        }
        if let Some(confirmed_at) = write.confirmed_at {
            update = update.col_expr(orders::Column::ConfirmedAt, Expr::value(confirmed_at));
        }
        if let Some(rejected_at) = write.rejected_at {
            update = update.col_expr(orders::Column::RejectedAt, Expr::value(rejected_at));
        }
        if let Some(ref reason) = write.rejection_reason {
            update = update.col_expr(orders::Column::RejectionReason, Expr::value(reason.clone()));
        }

        let result = update.exec(&txn).await?;
        if result.rows_affected == 0 {
            txn.rollback().await?;
            return Ok(None);
        }

        insert_log(&txn, id, log, now).await?;
        txn.commit().await?;

        self.find_order(id).await
    }

    pub async fn order_logs(&self, order_id: i32) -> Result<Vec<order_logs::Model>, DbErr> {
        OrderLogs::find()
            .filter(order_logs::Column::OrderId.eq(order_id))
            .order_by_asc(order_logs::Column::Id)
            .all(&self.db)
            .await
    }

    /// Insert or refresh the persisted snapshot for an order
    pub async fn upsert_tracking(&self, snapshot: &TrackingSnapshot) -> Result<(), DbErr> {
        let now = Utc::now();
        let row = delivery_tracking::ActiveModel {
            order_id: Set(snapshot.order_id),
            platform: Set(snapshot.platform.clone()),
            driver_lat: Set(snapshot.driver.map(|p| p.lat)),
            driver_lng: Set(snapshot.driver.map(|p| p.lng)),
            estimated_arrival: Set(snapshot.estimated_arrival),
            status: Set(snapshot.status.to_string()),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        DeliveryTracking::insert(row)
            .on_conflict(
                OnConflict::column(delivery_tracking::Column::OrderId)
                    .update_columns([
                        delivery_tracking::Column::Platform,
                        delivery_tracking::Column::DriverLat,
                        delivery_tracking::Column::DriverLng,
                        delivery_tracking::Column::EstimatedArrival,
                        delivery_tracking::Column::Status,
                        delivery_tracking::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;

        Ok(())
    }

    pub async fn find_tracking(&self, order_id: i32) -> Result<Option<delivery_tracking::Model>, DbErr> {
        DeliveryTracking::find()
            .filter(delivery_tracking::Column::OrderId.eq(order_id))
            .one(&self.db)
            .await
    }

    /// Mark a snapshot as no longer polled, keeping the row for the cleanup sweep
    pub async fn retire_tracking(&self, order_id: i32, status: OrderStatus) -> Result<u64, DbErr> {
        let result = DeliveryTracking::update_many()
            .col_expr(delivery_tracking::Column::Status, Expr::value(status.as_str()))
            .col_expr(delivery_tracking::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(delivery_tracking::Column::OrderId.eq(order_id))
            .exec(&self.db)
            .await?;

        Ok(result.rows_affected)
    }

    /// Orders in `status`, updated at or after `since`, with no snapshot row
    pub async fn orders_without_tracking(
        &self,
        status: OrderStatus,
        since: DateTime<Utc>,
    ) -> Result<Vec<Order>, DbErr> {
        let tracked = Query::select()
            .column(delivery_tracking::Column::OrderId)
            .from(DeliveryTracking)
            .to_owned();

        let rows = Orders::find()
            .filter(orders::Column::Status.eq(status.as_str()))
            .filter(orders::Column::UpdatedAt.gte(since))
            .filter(orders::Column::Id.not_in_subquery(tracked))
            .find_also_related(Platforms)
            .order_by_asc(orders::Column::UpdatedAt)
            .all(&self.db)
            .await?;

        Ok(rows.into_iter().map(into_order).collect())
    }

    /// Delivered orders, updated at or after `since`, whose snapshot is not retired yet
    pub async fn delivered_with_active_tracking(&self, since: DateTime<Utc>) -> Result<Vec<Order>, DbErr> {
        let active = Query::select()
            .column(delivery_tracking::Column::OrderId)
            .from(DeliveryTracking)
            .and_where(delivery_tracking::Column::Status.ne(OrderStatus::Delivered.as_str()))
            .to_owned();

        let rows = Orders::find()
            .filter(orders::Column::Status.eq(OrderStatus::Delivered.as_str()))
            .filter(orders::Column::UpdatedAt.gte(since))
            .filter(orders::Column::Id.in_subquery(active))
            .find_also_related(Platforms)
            .order_by_asc(orders::Column::UpdatedAt)
            .all(&self.db)
            .await?;

        Ok(rows.into_iter().map(into_order).collect())
    }

    /// Stamp the orders a reconciliation pass just checked
    pub async fn mark_reconciled(&self, ids: &[i32]) -> Result<u64, DbErr> {
        if ids.is_empty() {
            return Ok(0);
        }

        let result = Orders::update_many()
            .col_expr(orders::Column::ReconciledAt, Expr::value(Utc::now()))
            .filter(orders::Column::Id.is_in(ids.iter().copied()))
            .exec(&self.db)
            .await?;

        Ok(result.rows_affected)
    }

    /// Purge snapshots last touched before `cutoff`
    pub async fn delete_tracking_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, DbErr> {
        let result = DeliveryTracking::delete_many()
            .filter(delivery_tracking::Column::UpdatedAt.lt(cutoff))
            .exec(&self.db)
            .await?;

        Ok(result.rows_affected)
    }
}

fn into_order((order, platform): (orders::Model, Option<platforms::Model>)) -> Order {
    Order::from_model(order, platform.map(|p| p.name).unwrap_or_default())
}

async fn insert_log<C: sea_orm::ConnectionTrait>(
    conn: &C,
    order_id: i32,
    log: &LogEntry,
    at: DateTime<Utc>,
) -> Result<(), DbErr> {
    order_logs::ActiveModel {
        order_id: Set(order_id),
        action: Set(log.action.to_string()),
        details: Set(Some(log.details.clone())),
        created_at: Set(at),
        ..Default::default()
    }
    .insert(conn)
    .await?;

    Ok(())
}
