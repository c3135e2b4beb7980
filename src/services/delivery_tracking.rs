//! Delivery Tracking Service
//!
//! One poll loop per tracked order. Loops live in a map guarded together with
//! the snapshot map, and a loop only publishes a snapshot after re-checking its
//! cancel flag under that lock. Once `stop_tracking` returns, the order's loop
//! has exited and no further snapshot for it can appear.
//!
//! `start_tracking` claims the order under the same lock before its first
//! await. A stop (or a newer start) drops that claim, and a start that lost
//! its claim never registers a loop.
//!
//! Platforms without a location API get a simulated driver that moves along a
//! straight line (toward the restaurant while the order is being prepared,
//! then toward the customer) at the simulated-route pace.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rand::{rngs::StdRng, Rng, SeedableRng};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::errors::{PlatformError, TrackingError};
use crate::models::event::DashboardEvent;
use crate::models::order::{Order, OrderStatus};
use crate::models::tracking::{LatLng, LocationSource, OrderRoute, TrackedLocation, TrackingSnapshot};
use crate::platforms::gateway::PlatformGateway;
use crate::services::event_bus::EventBus;
use crate::services::route::{haversine_km, interpolate, RouteService};
use crate::store::OrderStore;

/// Persisted snapshot status meaning "no longer polled"
pub const RETIRED_STATUS: OrderStatus = OrderStatus::Delivered;

/// Simulated pace, same as the simulated routes
const SIMULATED_MINUTES_PER_KM: f64 = 2.5;
/// Max offset in degrees (~1 km) for positions we have to make up
const FALLBACK_OFFSET_DEG: f64 = 0.01;

#[derive(Debug, Clone)]
pub struct TrackingSettings {
    pub restaurant: LatLng,
    pub poll_interval: Duration,
    pub retention: chrono::Duration,
}

/// What a poll loop is following
#[derive(Debug, Clone)]
struct TrackingTarget {
    order_id: i32,
    platform: String,
    platform_order_id: String,
    customer: LatLng,
    started_at: DateTime<Utc>,
}

struct TrackingLoop {
    cancel: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct TrackingState {
    snapshots: HashMap<i32, TrackingSnapshot>,
    loops: HashMap<i32, TrackingLoop>,
    /// order_id -> generation of the start that owns it (starting or running)
    claims: HashMap<i32, u64>,
    next_generation: u64,
}

impl TrackingState {
    /// Drop the claim on `order_id`, detach its loop and flag it cancelled.
    /// Must run under the write lock so a concurrent tick cannot publish
    /// afterwards. Returns whether the order was claimed.
    fn detach(&mut self, order_id: i32) -> (bool, Option<JoinHandle<()>>) {
        let claimed = self.claims.remove(&order_id).is_some();
        self.snapshots.remove(&order_id);
        let handle = self.loops.remove(&order_id).map(|tracking_loop| {
            let _ = tracking_loop.cancel.send(true);
            tracking_loop.handle
        });
        (claimed, handle)
    }

    fn claim(&mut self, order_id: i32) -> u64 {
        self.next_generation += 1;
        self.claims.insert(order_id, self.next_generation);
        self.next_generation
    }

    fn holds(&self, order_id: i32, generation: u64) -> bool {
        self.claims.get(&order_id) == Some(&generation)
    }
}

struct TrackingInner {
    store: OrderStore,
    gateway: Arc<dyn PlatformGateway>,
    routes: RouteService,
    events: EventBus,
    settings: TrackingSettings,
    state: RwLock<TrackingState>,
}

#[derive(Clone)]
pub struct DeliveryTrackingService {
    inner: Arc<TrackingInner>,
}

impl DeliveryTrackingService {
    pub fn new(
        store: OrderStore,
        gateway: Arc<dyn PlatformGateway>,
        routes: RouteService,
        events: EventBus,
        settings: TrackingSettings,
    ) -> Self {
        Self {
            inner: Arc::new(TrackingInner {
                store,
                gateway,
                routes,
                events,
                settings,
                state: RwLock::new(TrackingState::default()),
            }),
        }
    }

    /// Start (or restart) the poll loop for an order.
    ///
    /// Fetches a first position right away, persists and publishes it, then
    /// polls every `interval` (service default when None). Fails with
    /// `Superseded` when a stop or another start for the same order lands
    /// before the loop is registered.
    pub async fn start_tracking(
        &self,
        order_id: i32,
        platform: &str,
        platform_order_id: &str,
        interval: Option<Duration>,
    ) -> Result<TrackingSnapshot, TrackingError> {
        let (generation, previous) = {
            let mut state = self.inner.state.write();
            let (_, previous) = state.detach(order_id);
            (state.claim(order_id), previous)
        };
        if let Some(handle) = previous {
            let _ = handle.await;
        }

        let (target, snapshot) = match self.first_snapshot(order_id, platform, platform_order_id, generation).await {
            Ok(first) => first,
            Err(e) => {
                self.inner.release(order_id, generation);
                return Err(e);
            }
        };

        let interval = interval
            .filter(|i| !i.is_zero())
            .unwrap_or(self.inner.settings.poll_interval);

        let registered = {
            let mut state = self.inner.state.write();
            if state.holds(order_id, generation) {
                let (cancel_tx, cancel_rx) = watch::channel(false);
                let handle = tokio::spawn(run_poll_loop(self.inner.clone(), target, interval, cancel_rx));
                state.snapshots.insert(order_id, snapshot.clone());
                state.loops.insert(order_id, TrackingLoop { cancel: cancel_tx, handle });
                true
            } else {
                false
            }
        };

        if !registered {
            // A stop landed while the first snapshot was being written; its
            // retire may have run before our upsert
            let stopped = !self.inner.state.read().claims.contains_key(&order_id);
            if stopped {
                self.inner.store.retire_tracking(order_id, RETIRED_STATUS).await?;
            }
            debug!(order_id, stopped, "Tracking start superseded");
            return Err(TrackingError::Superseded(order_id));
        }

        self.inner.events.publish(DashboardEvent::LocationUpdate(snapshot.clone()));

        info!(
            order_id,
            platform = %snapshot.platform,
            interval_ms = interval.as_millis() as u64,
            source = ?snapshot.source,
            "Tracking started"
        );

        Ok(snapshot)
    }

    /// Cancel the poll loop (or an in-flight start) and retire the persisted
    /// snapshot. Returns whether the order was tracked; stopping an untracked
    /// order is a no-op.
    pub async fn stop_tracking(&self, order_id: i32) -> Result<bool, TrackingError> {
        let was_tracking = self.halt_loop(order_id).await;
        self.inner.store.retire_tracking(order_id, RETIRED_STATUS).await?;

        if was_tracking {
            info!(order_id, "Tracking stopped");
        } else {
            debug!(order_id, "Stop requested for untracked order");
        }

        Ok(was_tracking)
    }

    /// Initial fetch and upsert for a claimed start. The upsert is skipped
    /// once the claim is lost.
    async fn first_snapshot(
        &self,
        order_id: i32,
        platform: &str,
        platform_order_id: &str,
        generation: u64,
    ) -> Result<(TrackingTarget, TrackingSnapshot), TrackingError> {
        let order = self
            .inner
            .store
            .find_order(order_id)
            .await?
            .ok_or(TrackingError::OrderNotFound(order_id))?;

        let target = TrackingTarget {
            order_id,
            platform: platform.trim().to_lowercase(),
            platform_order_id: platform_order_id.to_string(),
            customer: customer_position(&order, self.inner.settings.restaurant),
            started_at: Utc::now(),
        };

        let snapshot = match self.inner.observe(&order, &target).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(order_id, error = %e, "Initial location fetch failed, starting from simulated position");
                self.inner.simulate(&order, &target, Utc::now())
            }
        };

        if !self.inner.state.read().holds(order_id, generation) {
            debug!(order_id, "Tracking start superseded before first snapshot");
            return Err(TrackingError::Superseded(order_id));
        }
        self.inner.store.upsert_tracking(&snapshot).await?;

        Ok((target, snapshot))
    }

    /// Start tracking only if the order is `ready`
    pub async fn auto_start_tracking(&self, order_id: i32) -> Result<bool, TrackingError> {
        let order = self
            .inner
            .store
            .find_order(order_id)
            .await?
            .ok_or(TrackingError::OrderNotFound(order_id))?;

        if order.status != OrderStatus::Ready {
            debug!(order_id, status = %order.status, "Auto start skipped, order not ready");
            return Ok(false);
        }

        self.start_tracking(order_id, &order.platform, &order.platform_order_id, None)
            .await?;
        Ok(true)
    }

    /// Stop tracking only if the order is `delivered`
    pub async fn auto_stop_tracking(&self, order_id: i32) -> Result<bool, TrackingError> {
        let order = self
            .inner
            .store
            .find_order(order_id)
            .await?
            .ok_or(TrackingError::OrderNotFound(order_id))?;

        if order.status != OrderStatus::Delivered {
            debug!(order_id, status = %order.status, "Auto stop skipped, order not delivered");
            return Ok(false);
        }

        self.stop_tracking(order_id).await?;
        Ok(true)
    }

    /// Last successful poll for an order (in-memory, may lag one interval)
    pub fn get_tracking_data(&self, order_id: i32) -> Option<TrackingSnapshot> {
        self.inner.state.read().snapshots.get(&order_id).cloned()
    }

    pub fn get_all_tracking_data(&self) -> Vec<TrackingSnapshot> {
        let mut snapshots: Vec<_> = self.inner.state.read().snapshots.values().cloned().collect();
        snapshots.sort_by_key(|s| s.order_id);
        snapshots
    }

    pub fn is_tracking(&self, order_id: i32) -> bool {
        self.inner.state.read().loops.contains_key(&order_id)
    }

    pub fn active_count(&self) -> usize {
        self.inner.state.read().loops.len()
    }

    /// Live snapshots plus simulated entries for ready/delivering orders
    /// without a running loop
    pub async fn tracked_locations(&self) -> Result<Vec<TrackedLocation>, TrackingError> {
        let mut locations: Vec<TrackedLocation> = self
            .get_all_tracking_data()
            .into_iter()
            .map(|snapshot| TrackedLocation { snapshot, live: true })
            .collect();

        let filter = crate::models::order::OrderFilter {
            statuses: vec![OrderStatus::Ready, OrderStatus::Delivering],
            ..Default::default()
        };
        let now = Utc::now();
        for order in self.inner.store.list_orders(&filter).await? {
            if locations.iter().any(|l| l.snapshot.order_id == order.id) {
                continue;
            }
            let target = TrackingTarget {
                order_id: order.id,
                platform: order.platform.clone(),
                platform_order_id: order.platform_order_id.clone(),
                customer: customer_position(&order, self.inner.settings.restaurant),
                started_at: order.updated_at,
            };
            locations.push(TrackedLocation {
                snapshot: self.inner.simulate(&order, &target, now),
                live: false,
            });
        }

        Ok(locations)
    }

    /// Two-leg route for an order from the current (or made-up) driver position
    pub async fn get_delivery_route(&self, order_id: i32) -> Result<OrderRoute, TrackingError> {
        let order = self
            .inner
            .store
            .find_order(order_id)
            .await?
            .ok_or(TrackingError::OrderNotFound(order_id))?;

        Ok(self.route_for(&order).await)
    }

    /// Routes for every order with a live snapshot
    pub async fn get_all_routes(&self) -> Result<Vec<OrderRoute>, TrackingError> {
        let mut routes = Vec::new();
        for snapshot in self.get_all_tracking_data() {
            match self.inner.store.find_order(snapshot.order_id).await? {
                Some(order) => routes.push(self.route_for(&order).await),
                None => debug!(order_id = snapshot.order_id, "Tracked order no longer exists"),
            }
        }
        Ok(routes)
    }

    /// Purge persisted snapshots older than the retention window
    pub async fn cleanup_old_tracking_data(&self) -> Result<u64, TrackingError> {
        let cutoff = Utc::now() - self.inner.settings.retention;
        let deleted = self.inner.store.delete_tracking_older_than(cutoff).await?;
        if deleted > 0 {
            info!(deleted, cutoff = %cutoff, "Old tracking data removed");
        }
        Ok(deleted)
    }

    /// Cancel every loop (shutdown). Persisted rows are left as they are.
    pub async fn stop_all(&self) {
        let handles: Vec<_> = {
            let mut state = self.inner.state.write();
            let ids: Vec<i32> = state.claims.keys().copied().collect();
            ids.into_iter().filter_map(|id| state.detach(id).1).collect()
        };

        let count = handles.len();
        for handle in handles {
            let _ = handle.await;
        }
        info!(count, "All tracking loops stopped");
    }

    /// Drop the order's claim and wait for its loop to exit. Returns whether
    /// the order was running or starting.
    async fn halt_loop(&self, order_id: i32) -> bool {
        let (claimed, handle) = self.inner.state.write().detach(order_id);
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        claimed
    }

    async fn route_for(&self, order: &Order) -> OrderRoute {
        let restaurant = self.inner.settings.restaurant;
        let customer = customer_position(order, restaurant);
        let driver = self
            .get_tracking_data(order.id)
            .and_then(|s| s.driver)
            .unwrap_or_else(|| offset_point(restaurant, order.id as u64 ^ 0x5eed));

        let route = self.inner.routes.get_delivery_route(restaurant, driver, customer).await;
        OrderRoute {
            order_id: order.id,
            restaurant,
            driver,
            customer,
            route,
        }
    }
}

impl TrackingInner {
    /// Give up a claim that never got a loop
    fn release(&self, order_id: i32, generation: u64) {
        let mut state = self.state.write();
        if state.holds(order_id, generation) {
            state.claims.remove(&order_id);
        }
    }

    /// Fetch the driver from the platform, simulating when it has no location API
    async fn observe(&self, order: &Order, target: &TrackingTarget) -> Result<TrackingSnapshot, PlatformError> {
        match self
            .gateway
            .fetch_driver_location(&target.platform, &target.platform_order_id)
            .await
        {
            Ok(location) => {
                let now = Utc::now();
                let estimated_arrival = location
                    .estimated_arrival
                    .unwrap_or_else(|| now + minutes(haversine_km(location.position, target.customer) * SIMULATED_MINUTES_PER_KM));
                Ok(TrackingSnapshot {
                    order_id: target.order_id,
                    platform: target.platform.clone(),
                    platform_order_id: target.platform_order_id.clone(),
                    driver: Some(location.position),
                    customer: Some(target.customer),
                    estimated_arrival: Some(estimated_arrival),
                    driver_name: location.driver_name,
                    status: order.status,
                    source: LocationSource::Platform,
                    started_at: target.started_at,
                    updated_at: now,
                })
            }
            Err(PlatformError::Unsupported(_)) => Ok(self.simulate(order, target, Utc::now())),
            Err(e) => Err(e),
        }
    }

    fn simulate(&self, order: &Order, target: &TrackingTarget, now: DateTime<Utc>) -> TrackingSnapshot {
        let restaurant = self.settings.restaurant;
        let elapsed_min = (now - target.started_at).num_milliseconds().max(0) as f64 / 60_000.0;

        let (position, remaining_km) = match order.status {
            OrderStatus::Delivering => {
                let position = advance(restaurant, target.customer, elapsed_min);
                (position, haversine_km(position, target.customer))
            }
            OrderStatus::Delivered => (target.customer, 0.0),
            _ => {
                let origin = offset_point(restaurant, order.id as u64);
                let position = advance(origin, restaurant, elapsed_min);
                (
                    position,
                    haversine_km(position, restaurant) + haversine_km(restaurant, target.customer),
                )
            }
        };

        TrackingSnapshot {
            order_id: target.order_id,
            platform: target.platform.clone(),
            platform_order_id: target.platform_order_id.clone(),
            driver: Some(position),
            customer: Some(target.customer),
            estimated_arrival: Some(now + minutes(remaining_km * SIMULATED_MINUTES_PER_KM)),
            driver_name: None,
            status: order.status,
            source: LocationSource::Simulated,
            started_at: target.started_at,
            updated_at: now,
        }
    }

    /// One tick: re-read the order (its stage drives the simulation) and observe
    async fn poll(&self, target: &TrackingTarget) -> Result<TrackingSnapshot, TrackingError> {
        let order = self
            .store
            .find_order(target.order_id)
            .await?
            .ok_or(TrackingError::OrderNotFound(target.order_id))?;

        Ok(self.observe(&order, target).await?)
    }

    /// Publish a tick's snapshot unless the loop was cancelled meanwhile
    fn commit(&self, cancel: &watch::Receiver<bool>, snapshot: &TrackingSnapshot) -> bool {
        let mut state = self.state.write();
        if *cancel.borrow() {
            return false;
        }
        state.snapshots.insert(snapshot.order_id, snapshot.clone());
        true
    }
}

async fn run_poll_loop(
    inner: Arc<TrackingInner>,
    target: TrackingTarget,
    interval: Duration,
    mut cancel: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick fires immediately; the initial fetch already happened
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.changed() => break,
            _ = ticker.tick() => {}
        }

        let result = tokio::select! {
            _ = cancel.changed() => break,
            result = inner.poll(&target) => result,
        };

        match result {
            Ok(snapshot) => {
                if !inner.commit(&cancel, &snapshot) {
                    break;
                }
                if let Err(e) = inner.store.upsert_tracking(&snapshot).await {
                    warn!(order_id = target.order_id, error = %e, "Failed to persist tracking snapshot");
                }
                inner.events.publish(DashboardEvent::LocationUpdate(snapshot));
            }
            Err(e) => {
                warn!(order_id = target.order_id, platform = %target.platform, error = %e, "Location poll failed, skipping tick");
            }
        }
    }

    debug!(order_id = target.order_id, "Tracking loop exited");
}

/// Move from `from` toward `to` at the simulated pace
fn advance(from: LatLng, to: LatLng, elapsed_min: f64) -> LatLng {
    let leg_min = haversine_km(from, to) * SIMULATED_MINUTES_PER_KM;
    let progress = if leg_min <= f64::EPSILON { 1.0 } else { elapsed_min / leg_min };
    interpolate(from, to, progress)
}

/// Geocoded customer, or a stable made-up point near the restaurant
fn customer_position(order: &Order, restaurant: LatLng) -> LatLng {
    match order.customer_location() {
        Some((lat, lng)) => LatLng::new(lat, lng),
        None => offset_point(restaurant, (order.id as u64).wrapping_mul(31).wrapping_add(7)),
    }
}

/// Random offset around `origin`, seeded so the same order keeps the same point
fn offset_point(origin: LatLng, seed: u64) -> LatLng {
    let mut rng = StdRng::seed_from_u64(seed);
    LatLng::new(
        origin.lat + rng.gen_range(-FALLBACK_OFFSET_DEG..=FALLBACK_OFFSET_DEG),
        origin.lng + rng.gen_range(-FALLBACK_OFFSET_DEG..=FALLBACK_OFFSET_DEG),
    )
}

fn minutes(value: f64) -> chrono::Duration {
    chrono::Duration::milliseconds((value * 60_000.0).round() as i64)
}
