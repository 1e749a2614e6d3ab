use std::sync::Arc;

use butler_core::{BridgeEvent, EventBus, RequestId, ResponseEvent};
use butler_telemetry::metrics;

/// Response sink for one request
///
/// Terminal methods consume the sink, so at most one terminal event can be
/// emitted per request. Emission failures are logged and otherwise ignored.
pub(crate) struct Reply {
    bus: Arc<dyn EventBus>,
    request_id: RequestId,
}

impl Reply {
    pub(crate) const fn new(bus: Arc<dyn EventBus>, request_id: RequestId) -> Self {
        Self { bus, request_id }
    }

    pub(crate) fn progress(&self, snapshot: &str) {
        metrics::record_progress("responder");
        self.emit(ResponseEvent::progress(self.request_id.clone(), snapshot));
    }

    pub(crate) fn complete(self, result: String) {
        self.emit(ResponseEvent::complete(self.request_id.clone(), result));
    }

    pub(crate) fn error(self, message: String) {
        self.emit(ResponseEvent::error(self.request_id.clone(), message));
    }

    fn emit(&self, response: ResponseEvent) {
        if let Err(e) = self.bus.publish(BridgeEvent::Response(response)) {
            tracing::warn!(request_id = %self.request_id, error = %e, "failed to emit response");
        }
    }
}
