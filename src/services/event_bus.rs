//! Dashboard event fan-out
//!
//! Lifecycle and tracking services publish here; WebSocket sessions (and tests)
//! subscribe. Publishing never fails: with no subscribers the event is dropped.

use tokio::sync::broadcast;
use tracing::trace;

use crate::models::event::DashboardEvent;

/// Buffered events per subscriber before it starts lagging
const EVENT_CHANNEL_CAPACITY: usize = 1000;

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<DashboardEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Broadcast an event to all current subscribers
    pub fn publish(&self, event: DashboardEvent) {
        trace!(order_id = event.order_id(), "Publishing dashboard event");
        // Ignore errors if no subscribers
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DashboardEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::event::TrackingNotice;

    #[tokio::test]
    async fn test_publish_reaches_every_subscriber() {
        let bus = EventBus::new();
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        bus.publish(DashboardEvent::TrackingActivated(TrackingNotice {
            order_id: 4,
            platform: "rappi".into(),
            reason: "manual".into(),
        }));

        assert_eq!(first.recv().await.unwrap().order_id(), 4);
        assert_eq!(second.recv().await.unwrap().order_id(), 4);
    }

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        let bus = EventBus::new();
        assert_eq!(bus.subscriber_count(), 0);
        bus.publish(DashboardEvent::TrackingDeactivated(TrackingNotice {
            order_id: 1,
            platform: "ubereats".into(),
            reason: "delivered".into(),
        }));
    }
}
