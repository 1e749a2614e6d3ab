//! Table of requests awaiting their terminal event

use std::sync::Arc;
use std::time::Instant;

use butler_core::{BridgeEvent, CancelEvent, EventBus, RequestId};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

#[derive(Default)]
pub(crate) struct PendingTable {
    entries: Arc<DashMap<RequestId, Instant>>,
}

impl PendingTable {
    /// Reserve a correlation id that no pending request is using
    pub(crate) fn register(&self, bus: Arc<dyn EventBus>) -> PendingRequest {
        loop {
            let id = RequestId::generate();
            if let Entry::Vacant(slot) = self.entries.entry(id.clone()) {
                let started = Instant::now();
                slot.insert(started);
                return PendingRequest {
                    id,
                    started,
                    entries: Arc::clone(&self.entries),
                    bus,
                    state: State::Unsent,
                };
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Unsent,
    InFlight,
    Settled,
}

/// Entry for one in-flight request
///
/// Dropping it removes the entry. If the request was emitted but never
/// settled (timeout, or the caller abandoned the future) a cancel event is
/// published so a cooperative responder can stop early.
pub(crate) struct PendingRequest {
    id: RequestId,
    started: Instant,
    entries: Arc<DashMap<RequestId, Instant>>,
    bus: Arc<dyn EventBus>,
    state: State,
}

impl PendingRequest {
    pub(crate) const fn id(&self) -> &RequestId {
        &self.id
    }

    pub(crate) const fn started(&self) -> Instant {
        self.started
    }

    pub(crate) fn mark_sent(&mut self) {
        self.state = State::InFlight;
    }

    pub(crate) fn settle(&mut self) {
        self.state = State::Settled;
    }
}

impl Drop for PendingRequest {
    fn drop(&mut self) {
        self.entries.remove(&self.id);

        if self.state == State::InFlight {
            let cancel = BridgeEvent::Cancel(CancelEvent {
                request_id: self.id.clone(),
            });
            match self.bus.publish(cancel) {
                Ok(()) => tracing::debug!(request_id = %self.id, "abandoned request, sent cancel"),
                Err(e) => tracing::debug!(request_id = %self.id, error = %e, "could not send cancel"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use butler_core::LocalBus;

    use super::*;

    #[test]
    fn entries_are_removed_on_drop() {
        let bus: Arc<dyn EventBus> = Arc::new(LocalBus::new());
        let table = PendingTable::default();

        let first = table.register(Arc::clone(&bus));
        let second = table.register(Arc::clone(&bus));
        assert_ne!(first.id(), second.id());
        assert_eq!(table.len(), 2);

        drop(first);
        assert_eq!(table.len(), 1);
        drop(second);
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn unsettled_request_sends_cancel() {
        let bus = LocalBus::new();
        let mut spy = bus.subscribe().unwrap();
        let table = PendingTable::default();

        let mut sent = table.register(Arc::new(bus.clone()));
        sent.mark_sent();
        let id = sent.id().clone();
        drop(sent);

        let mut settled = table.register(Arc::new(bus.clone()));
        settled.mark_sent();
        settled.settle();
        drop(settled);

        drop(table.register(Arc::new(bus)));

        assert_eq!(spy.try_recv(), Some(BridgeEvent::Cancel(CancelEvent { request_id: id })));
        assert!(spy.try_recv().is_none());
    }
}
