mod common;

use std::time::Duration;

use chrono::Utc;
use sea_orm::{sea_query::Expr, ColumnTrait, EntityTrait, QueryFilter};

use comanda_hub::config::AutomationConfig;
use comanda_hub::entities::orders;
use comanda_hub::models::order::OrderStatus;
use comanda_hub::models::tracking::{LatLng, LocationSource};

use crate::common::{test_automation_config, TestContext};

const DRIVER: LatLng = LatLng { lat: -33.4301, lng: -70.6402 };

/// ready → tick starts tracking; delivered → tick stops it for good
#[tokio::test]
async fn test_tracking_follows_order_lifecycle() {
    let ctx = TestContext::new().await;
    ctx.gateway.set_location(DRIVER);
    let order = ctx.seed_order_in("R-300", OrderStatus::Ready).await;

    let summary = ctx.automation.run_tracking_automation().await.unwrap();
    assert_eq!(summary.started_ready, 1);
    assert_eq!(summary.failed, 0);

    let snapshot = ctx.state.tracking.get_tracking_data(order.id).unwrap();
    assert_eq!(snapshot.driver, Some(DRIVER));
    assert_eq!(snapshot.source, LocationSource::Platform);

    // Already tracked: a second tick changes nothing
    let summary = ctx.automation.run_tracking_automation().await.unwrap();
    assert_eq!(summary.started_ready + summary.started_delivering, 0);
    assert_eq!(ctx.state.tracking.active_count(), 1);

    ctx.state.lifecycle.update_status(order.id, "delivering").await.unwrap();
    ctx.state.lifecycle.update_status(order.id, "delivered").await.unwrap();
    // Let the loop persist a post-delivery tick before the scan runs
    tokio::time::sleep(Duration::from_millis(120)).await;

    let summary = ctx.automation.run_tracking_automation().await.unwrap();
    assert_eq!(summary.stopped_delivered, 1);
    assert!(!ctx.state.tracking.is_tracking(order.id));

    let calls = ctx.gateway.location_calls();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(ctx.gateway.location_calls(), calls);

    // Retired rows are not picked up again
    let summary = ctx.automation.run_tracking_automation().await.unwrap();
    assert_eq!(summary.stopped_delivered + summary.started_ready + summary.started_delivering, 0);
}

#[tokio::test]
async fn test_delivering_orders_start_without_ready_tracking() {
    let config = AutomationConfig {
        auto_track_ready: false,
        ..test_automation_config()
    };
    let ctx = TestContext::with_config(config).await;
    ctx.gateway.mark_unsupported("rappi");
    let ready = ctx.seed_order_in("R-301", OrderStatus::Ready).await;
    let delivering = ctx.seed_order_in("R-302", OrderStatus::Delivering).await;

    let summary = ctx.automation.run_tracking_automation().await.unwrap();
    assert_eq!(summary.started_delivering, 1);
    assert_eq!(summary.started_ready, 0);
    assert!(ctx.state.tracking.is_tracking(delivering.id));
    assert!(!ctx.state.tracking.is_tracking(ready.id));

    ctx.state.tracking.stop_all().await;
}

#[tokio::test]
async fn test_tracking_activation_is_broadcast() {
    let ctx = TestContext::new().await;
    ctx.gateway.mark_unsupported("rappi");
    let order = ctx.seed_order_in("R-303", OrderStatus::Delivering).await;
    let mut rx = ctx.state.events.subscribe();

    ctx.automation.run_tracking_automation().await.unwrap();

    let mut activated = false;
    while let Ok(event) = rx.try_recv() {
        let json = serde_json::to_value(&event).unwrap();
        if json["type"] == "trackingActivated" {
            assert_eq!(json["data"]["order_id"], order.id);
            assert_eq!(json["data"]["reason"], "delivering");
            activated = true;
        }
    }
    assert!(activated);

    ctx.state.tracking.stop_all().await;
}

/// Only orders updated within the recent window are picked up
#[tokio::test]
async fn test_tracking_automation_ignores_orders_outside_window() {
    let ctx = TestContext::new().await;
    ctx.gateway.mark_unsupported("rappi");
    let stale = ctx.seed_order_in("R-304", OrderStatus::Delivering).await;
    let fresh = ctx.seed_order_in("R-305", OrderStatus::Delivering).await;

    let long_ago = Utc::now() - ctx.automation.config().tracking_recent_window - chrono::Duration::minutes(1);
    orders::Entity::update_many()
        .col_expr(orders::Column::UpdatedAt, Expr::value(long_ago))
        .filter(orders::Column::Id.eq(stale.id))
        .exec(ctx.store.connection())
        .await
        .unwrap();

    let summary = ctx.automation.run_tracking_automation().await.unwrap();
    assert_eq!(summary.started_delivering, 1);
    assert!(ctx.state.tracking.is_tracking(fresh.id));
    assert!(!ctx.state.tracking.is_tracking(stale.id));

    ctx.state.tracking.stop_all().await;
}

/// Upstream moved the order while its webhook was lost
#[tokio::test]
async fn test_reconciliation_applies_upstream_status() {
    let ctx = TestContext::new().await;
    let order = ctx.seed_order_in("R-310", OrderStatus::Preparing).await;
    ctx.gateway.set_status("R-310", "ready_for_pickup");

    let summary = ctx.automation.reconcile_statuses().await.unwrap();
    assert_eq!(summary.checked, 1);
    assert_eq!(summary.updated, 1);

    let stored = ctx.state.lifecycle.get_order(order.id).await.unwrap();
    assert_eq!(stored.status, OrderStatus::Ready);
    assert_eq!(stored.platform_status.as_deref(), Some("ready_for_pickup"));

    let logs = ctx.state.lifecycle.order_logs(order.id).await.unwrap();
    let details = logs.last().unwrap().details.clone().unwrap();
    assert_eq!(details["origin"], "reconciliation");
}

#[tokio::test]
async fn test_reconciliation_skips_unchanged_and_unknown_labels() {
    let ctx = TestContext::new().await;
    let same = ctx.seed_order_in("R-311", OrderStatus::Preparing).await;
    let unknown = ctx.seed_order_in("R-312", OrderStatus::Ready).await;
    ctx.gateway.set_status("R-311", "in_preparation");
    ctx.gateway.set_status("R-312", "something_new");

    let summary = ctx.automation.reconcile_statuses().await.unwrap();
    assert_eq!(summary.checked, 2);
    assert_eq!(summary.updated, 0);
    assert_eq!(summary.failed, 0);

    let stored = ctx.state.lifecycle.get_order(unknown.id).await.unwrap();
    assert_eq!(stored.status, OrderStatus::Ready);
    let stored = ctx.state.lifecycle.get_order(same.id).await.unwrap();
    assert_eq!(stored.status, OrderStatus::Preparing);
}

/// One failing order does not stop the batch
#[tokio::test]
async fn test_reconciliation_contains_failures() {
    let ctx = TestContext::new().await;
    ctx.seed_order_in("R-313", OrderStatus::Preparing).await;
    let good = ctx.seed_order_in("R-314", OrderStatus::Preparing).await;
    // R-313 has no scripted status: the gateway answers 404
    ctx.gateway.set_status("R-314", "on_the_way");

    let summary = ctx.automation.reconcile_statuses().await.unwrap();
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.updated, 1);

    let stored = ctx.state.lifecycle.get_order(good.id).await.unwrap();
    assert_eq!(stored.status, OrderStatus::Delivering);
}

#[tokio::test]
async fn test_reconciliation_counts_unsupported_platforms() {
    let ctx = TestContext::new().await;
    ctx.gateway.mark_unsupported("rappi");
    ctx.seed_order("R-315").await;

    let summary = ctx.automation.reconcile_statuses().await.unwrap();
    assert_eq!(summary.unsupported, 1);
    assert_eq!(summary.updated, 0);
}

/// Terminal orders are never reconciled
#[tokio::test]
async fn test_reconciliation_ignores_terminal_orders() {
    let ctx = TestContext::new().await;
    ctx.seed_order_in("R-316", OrderStatus::Delivered).await;
    ctx.seed_order_in("R-317", OrderStatus::Rejected).await;

    let summary = ctx.automation.reconcile_statuses().await.unwrap();
    assert_eq!(summary.checked, 0);
    assert_eq!(ctx.gateway.status_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
}

/// A pass checks one batch, least recently checked first
#[tokio::test]
async fn test_reconciliation_batch_cap() {
    let config = AutomationConfig {
        reconcile_batch_size: 2,
        ..test_automation_config()
    };
    let ctx = TestContext::with_config(config).await;
    let mut seeded = Vec::new();
    for id in ["R-320", "R-321", "R-322"] {
        seeded.push(ctx.seed_order_in(id, OrderStatus::Preparing).await);
        ctx.gateway.set_status(id, "ready_for_pickup");
    }

    let summary = ctx.automation.reconcile_statuses().await.unwrap();
    assert_eq!(summary.checked, 2);
    assert_eq!(summary.updated, 2);

    let statuses = [
        ctx.state.lifecycle.get_order(seeded[0].id).await.unwrap().status,
        ctx.state.lifecycle.get_order(seeded[1].id).await.unwrap().status,
        ctx.state.lifecycle.get_order(seeded[2].id).await.unwrap().status,
    ];
    assert_eq!(statuses, [OrderStatus::Ready, OrderStatus::Ready, OrderStatus::Preparing]);

    // The unchecked order goes first on the next pass
    let summary = ctx.automation.reconcile_statuses().await.unwrap();
    assert_eq!(summary.checked, 2);
    assert_eq!(summary.updated, 1);
    let stored = ctx.state.lifecycle.get_order(seeded[2].id).await.unwrap();
    assert_eq!(stored.status, OrderStatus::Ready);
}

/// Orders whose lookups keep failing rotate behind the rest of the queue
#[tokio::test]
async fn test_reconciliation_rotates_past_failing_orders() {
    let ctx = TestContext::new().await;
    let batch = ctx.automation.config().reconcile_batch_size as usize;
    for n in 0..batch {
        // No scripted status: every lookup answers 404
        ctx.seed_order_in(&format!("R-33{}", n), OrderStatus::Preparing).await;
    }
    let newer = ctx.seed_order_in("R-340", OrderStatus::Preparing).await;
    ctx.gateway.set_status("R-340", "on_the_way");

    let summary = ctx.automation.reconcile_statuses().await.unwrap();
    assert_eq!(summary.checked, batch);
    assert_eq!(summary.failed, batch);
    assert_eq!(summary.updated, 0);

    let summary = ctx.automation.reconcile_statuses().await.unwrap();
    assert_eq!(summary.updated, 1);
    let stored = ctx.state.lifecycle.get_order(newer.id).await.unwrap();
    assert_eq!(stored.status, OrderStatus::Delivering);
}
