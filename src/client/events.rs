//! Cache invalidation events
//!
//! Views subscribe to the bus and re-read whatever they display when one of
//! their keys is invalidated.

use super::cache::QueryKey;
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Capacity of the broadcast channel; slow subscribers see `Lagged`
const BUS_CAPACITY: usize = 256;

/// Events published when cached reads go stale
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    /// One key was discarded
    Invalidated(QueryKey),
    /// Every entry was discarded (logout, identity change)
    Cleared,
}

/// Broadcast bus carrying [`CacheEvent`]s
#[derive(Clone)]
pub struct InvalidationBus {
    /// Broadcast channel for event subscriptions
    broadcast_tx: broadcast::Sender<CacheEvent>,
}

impl InvalidationBus {
    /// Create a new bus
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(BUS_CAPACITY);
        Self { broadcast_tx }
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.broadcast_tx.subscribe()
    }

    /// Emit an event to every current subscriber
    pub fn emit(&self, event: CacheEvent) {
        match &event {
            CacheEvent::Invalidated(key) => debug!("Cache invalidated: {}", key),
            CacheEvent::Cleared => debug!("Cache cleared"),
        }
        // no subscribers is not an error
        if self.broadcast_tx.send(event).is_err() {
            trace!("No cache subscribers");
        }
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.broadcast_tx.receiver_count()
    }
}

impl Default for InvalidationBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_events_in_order() {
        let bus = InvalidationBus::new();
        let mut rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        bus.emit(CacheEvent::Invalidated(QueryKey::Contract("c1".to_string())));
        bus.emit(CacheEvent::Cleared);

        assert_eq!(
            rx.recv().await.unwrap(),
            CacheEvent::Invalidated(QueryKey::Contract("c1".to_string()))
        );
        assert_eq!(rx.recv().await.unwrap(), CacheEvent::Cleared);
    }

    #[test]
    fn test_emit_without_subscribers() {
        InvalidationBus::default().emit(CacheEvent::Cleared);
    }
}
