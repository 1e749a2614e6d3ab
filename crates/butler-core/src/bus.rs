//! Broadcast event bus shared by both halves of the bridge
//!
//! Publishing is synchronous: the event is queued for every live subscriber
//! before `dispatch` returns, so a listener registered before a request is
//! emitted can never miss its responses. Each subscriber drains its own
//! unbounded queue, which keeps per-publisher ordering intact.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::error::{BridgeError, Result};
use crate::protocol::BridgeEvent;

/// Identity of a subscription, used to suppress echoes back to the publisher
pub type SubscriberId = u64;

/// Publish/subscribe channel between the host and page contexts
pub trait EventBus: Send + Sync {
    /// Deliver an event to every subscriber except `origin`
    fn dispatch(&self, origin: Option<SubscriberId>, event: BridgeEvent) -> Result<()>;

    /// Attach a new listener
    fn subscribe(&self) -> Result<Subscription>;

    /// Deliver an event to every subscriber
    fn publish(&self, event: BridgeEvent) -> Result<()> {
        self.dispatch(None, event)
    }
}

/// A listener attached to a bus
///
/// Dropping the subscription detaches it.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    receiver: mpsc::UnboundedReceiver<BridgeEvent>,
}

impl Subscription {
    pub const fn new(id: SubscriberId, receiver: mpsc::UnboundedReceiver<BridgeEvent>) -> Self {
        Self { id, receiver }
    }

    pub const fn id(&self) -> SubscriberId {
        self.id
    }

    /// Wait for the next event, returning `None` once the bus is gone
    pub async fn recv(&mut self) -> Option<BridgeEvent> {
        self.receiver.recv().await
    }

    /// Take an already queued event without waiting
    pub fn try_recv(&mut self) -> Option<BridgeEvent> {
        self.receiver.try_recv().ok()
    }
}

/// In-process bus
///
/// Cheap to clone; all clones share the same subscriber set.
#[derive(Clone, Default)]
pub struct LocalBus {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    next_id: AtomicU64,
    subscribers: DashMap<SubscriberId, mpsc::UnboundedSender<BridgeEvent>>,
    detached: AtomicBool,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tear the bus down, as when the host window goes away
    ///
    /// Current subscribers see their stream end and any further use fails
    /// with [`BridgeError::TransportUnavailable`].
    pub fn detach(&self) {
        self.inner.detached.store(true, Ordering::SeqCst);
        self.inner.subscribers.clear();
        tracing::debug!("event bus detached");
    }

    pub fn is_detached(&self) -> bool {
        self.inner.detached.load(Ordering::SeqCst)
    }

    /// Number of listeners that are still attached
    pub fn listener_count(&self) -> usize {
        self.inner
            .subscribers
            .iter()
            .filter(|entry| !entry.value().is_closed())
            .count()
    }
}

impl EventBus for LocalBus {
    fn dispatch(&self, origin: Option<SubscriberId>, event: BridgeEvent) -> Result<()> {
        if self.is_detached() {
            return Err(BridgeError::TransportUnavailable);
        }

        tracing::trace!(event = event.name(), request_id = ?event.request_id(), "dispatching bridge event");

        // Closed receivers are pruned on the way through
        self.inner.subscribers.retain(|id, sender| {
            if origin == Some(*id) {
                return !sender.is_closed();
            }
            sender.send(event.clone()).is_ok()
        });

        Ok(())
    }

    fn subscribe(&self) -> Result<Subscription> {
        if self.is_detached() {
            return Err(BridgeError::TransportUnavailable);
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::unbounded_channel();
        self.inner.subscribers.insert(id, sender);

        Ok(Subscription::new(id, receiver))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ReadyEvent, ResponseEvent};

    fn ready(version: &str) -> BridgeEvent {
        BridgeEvent::Ready(ReadyEvent {
            version: version.to_owned(),
        })
    }

    #[tokio::test]
    async fn every_subscriber_receives_published_events() {
        let bus = LocalBus::new();
        let mut first = bus.subscribe().unwrap();
        let mut second = bus.subscribe().unwrap();

        bus.publish(ready("1")).unwrap();

        assert_eq!(first.recv().await, Some(ready("1")));
        assert_eq!(second.recv().await, Some(ready("1")));
    }

    #[tokio::test]
    async fn events_arrive_in_publish_order() {
        let bus = LocalBus::new();
        let mut subscription = bus.subscribe().unwrap();

        for chunk in ["a", "ab", "abc"] {
            bus.publish(BridgeEvent::Response(ResponseEvent::progress("req-1".into(), chunk)))
                .unwrap();
        }

        for expected in ["a", "ab", "abc"] {
            let event = subscription.recv().await.unwrap();
            assert_eq!(
                event,
                BridgeEvent::Response(ResponseEvent::progress("req-1".into(), expected))
            );
        }
    }

    #[test]
    fn origin_does_not_receive_its_own_event() {
        let bus = LocalBus::new();
        let mut origin = bus.subscribe().unwrap();
        let mut other = bus.subscribe().unwrap();

        bus.dispatch(Some(origin.id()), ready("1")).unwrap();

        assert!(origin.try_recv().is_none());
        assert_eq!(other.try_recv(), Some(ready("1")));
    }

    #[test]
    fn dropped_subscriptions_are_pruned() {
        let bus = LocalBus::new();
        let kept = bus.subscribe().unwrap();
        let dropped = bus.subscribe().unwrap();
        assert_eq!(bus.listener_count(), 2);

        drop(dropped);
        bus.publish(ready("1")).unwrap();

        assert_eq!(bus.listener_count(), 1);
        drop(kept);
    }

    #[tokio::test]
    async fn detached_bus_rejects_use() {
        let bus = LocalBus::new();
        let mut subscription = bus.subscribe().unwrap();

        bus.detach();

        assert!(subscription.recv().await.is_none());
        assert!(matches!(bus.subscribe(), Err(BridgeError::TransportUnavailable)));
        assert!(matches!(bus.publish(ready("1")), Err(BridgeError::TransportUnavailable)));
    }
}
