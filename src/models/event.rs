//! Dashboard push events
//!
//! Serialized as `{"type": "...", "data": {...}}` for WebSocket clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::order::{Order, OrderStatus};
use crate::models::tracking::TrackingSnapshot;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusChange {
    pub order_id: i32,
    pub old_status: OrderStatus,
    pub new_status: OrderStatus,
    pub platform: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingNotice {
    pub order_id: i32,
    pub platform: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum DashboardEvent {
    NewOrder(Order),
    StatusChange(StatusChange),
    LocationUpdate(TrackingSnapshot),
    TrackingActivated(TrackingNotice),
    TrackingDeactivated(TrackingNotice),
}

impl DashboardEvent {
    pub fn order_id(&self) -> i32 {
        match self {
            DashboardEvent::NewOrder(order) => order.id,
            DashboardEvent::StatusChange(change) => change.order_id,
            DashboardEvent::LocationUpdate(snapshot) => snapshot.order_id,
            DashboardEvent::TrackingActivated(notice) | DashboardEvent::TrackingDeactivated(notice) => {
                notice.order_id
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_shape() {
        let event = DashboardEvent::StatusChange(StatusChange {
            order_id: 7,
            old_status: OrderStatus::Pending,
            new_status: OrderStatus::Preparing,
            platform: "rappi".into(),
            at: Utc::now(),
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "statusChange");
        assert_eq!(json["data"]["order_id"], 7);
        assert_eq!(json["data"]["new_status"], "preparing");
    }
}
