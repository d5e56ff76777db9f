//! The broadcast bus distributing envelopes to gateway sessions.
//!
//! Built on `tokio::sync::broadcast`: publishing never blocks, and a
//! subscriber that falls more than the bus capacity behind has its oldest
//! pending messages dropped (for that subscriber only) instead of stalling
//! the publisher or its siblings.

use super::envelope::EventEnvelope;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Default bus capacity. Slow receivers that fall further behind than this
/// skip ahead and lose the overwritten messages.
pub const DEFAULT_BUS_CAPACITY: usize = 512;

/// Fan-out distribution point for [`EventEnvelope`]s. Cloneable; all clones
/// share one subscriber registry.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EventEnvelope>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Deliver `envelope` to every currently registered subscription.
    ///
    /// Never blocks. An empty subscriber set is not an error; the envelope
    /// is simply dropped.
    pub fn publish(&self, envelope: EventEnvelope) {
        if self.tx.send(envelope).is_err() {
            debug!("published event with no subscribers");
        }
    }

    /// Register a new subscription with its own output queue.
    pub fn subscribe(&self) -> BusSubscription {
        BusSubscription {
            rx: self.tx.subscribe(),
        }
    }

    /// Number of currently registered subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

/// One registered output queue on the bus.
///
/// Dropping the subscription (or calling [`cancel`](Self::cancel))
/// deregisters it.
pub struct BusSubscription {
    rx: broadcast::Receiver<EventEnvelope>,
}

impl BusSubscription {
    /// Receive the next envelope.
    ///
    /// Returns `None` once the bus has been dropped. If this subscriber
    /// lagged behind, the skipped messages are logged and reception resumes
    /// at the oldest retained one.
    pub async fn recv(&mut self) -> Option<EventEnvelope> {
        loop {
            match self.rx.recv().await {
                Ok(envelope) => return Some(envelope),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "bus subscriber lagged, dropping oldest events");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Deregister from the bus.
    pub fn cancel(self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::envelope::EventKind;
    use lnhub_sdk::objects::{NewAddressResponse, PeerEvent, PeerEventKind};

    fn address_event(n: u64) -> EventEnvelope {
        EventEnvelope::Address(NewAddressResponse {
            request_id: n.to_string(),
            node_id: 1,
            address: format!("bc1q{n}"),
        })
    }

    fn request_id(envelope: &EventEnvelope) -> String {
        match envelope {
            EventEnvelope::Address(a) => a.request_id.clone(),
            _ => String::new(),
        }
    }

    #[tokio::test]
    async fn single_publisher_order_is_preserved() {
        let bus = EventBus::new(64);
        let mut sub = bus.subscribe();
        for n in 0..32u64 {
            bus.publish(address_event(n));
        }
        for n in 0..32u64 {
            let envelope = sub.recv().await.unwrap();
            assert_eq!(request_id(&envelope), n.to_string());
        }
    }

    #[tokio::test]
    async fn subscribe_then_cancel_restores_count() {
        let bus = EventBus::new(8);
        let _keep = bus.subscribe();
        let before = bus.subscriber_count();
        let sub = bus.subscribe();
        assert_eq!(bus.subscriber_count(), before + 1);
        sub.cancel();
        assert_eq!(bus.subscriber_count(), before);
    }

    #[tokio::test]
    async fn full_subscriber_never_blocks_publisher_or_siblings() {
        let bus = EventBus::new(4);
        // This subscriber never consumes and will overflow immediately.
        let _slow = bus.subscribe();
        let mut fast = bus.subscribe();

        // Publish far more than capacity; publish must stay non-blocking.
        for n in 0..64u64 {
            bus.publish(address_event(n));
        }

        // The fast sibling still receives: it lags past the overwritten
        // prefix and resumes at the oldest retained message.
        let envelope = fast.recv().await.unwrap();
        assert_eq!(envelope.kind(), EventKind::Address);
        assert_eq!(request_id(&envelope), "60");
    }

    #[tokio::test]
    async fn peer_events_flow_through() {
        let bus = EventBus::default();
        let mut sub = bus.subscribe();
        bus.publish(EventEnvelope::Peer(PeerEvent {
            node_id: 1,
            pubkey: "02ab".into(),
            kind: PeerEventKind::Online,
        }));
        let envelope = sub.recv().await.unwrap();
        assert_eq!(envelope.kind(), EventKind::Peer);
    }
}
