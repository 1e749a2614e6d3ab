//! Metric names and the bridge's instruments
//!
//! Instruments come from the global meter, so they are no-ops until a meter
//! provider is installed.

use std::sync::OnceLock;
use std::time::Instant;

use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, Histogram};

pub const BRIDGE_REQUEST_COUNT: &str = "bridge.request.count";
pub const BRIDGE_REQUEST_DURATION: &str = "bridge.request.duration";
pub const BRIDGE_PROGRESS_COUNT: &str = "bridge.progress.count";

/// Instruments shared by the requester and the responder
pub struct BridgeInstruments {
    /// Requests by kind, side and outcome
    pub requests: Counter<u64>,
    /// Time from emission to terminal event, in seconds
    pub duration: Histogram<f64>,
    /// Progress events emitted or received
    pub progress: Counter<u64>,
}

/// Lazily created instruments
pub fn instruments() -> &'static BridgeInstruments {
    static INSTRUMENTS: OnceLock<BridgeInstruments> = OnceLock::new();
    INSTRUMENTS.get_or_init(|| {
        let meter = opentelemetry::global::meter("butler-bridge");
        BridgeInstruments {
            requests: meter
                .u64_counter(BRIDGE_REQUEST_COUNT)
                .with_description("Bridge requests by terminal outcome")
                .build(),
            duration: meter
                .f64_histogram(BRIDGE_REQUEST_DURATION)
                .with_unit("s")
                .with_description("Time until a request reached its terminal event")
                .build(),
            progress: meter
                .u64_counter(BRIDGE_PROGRESS_COUNT)
                .with_description("Streamed progress snapshots")
                .build(),
        }
    })
}

/// Record the end of a request
pub fn record_request(side: &'static str, kind: &str, outcome: &'static str, start: Instant) {
    let attributes = [
        KeyValue::new("side", side),
        KeyValue::new("kind", kind.to_owned()),
        KeyValue::new("outcome", outcome),
    ];

    let instruments = instruments();
    instruments.requests.add(1, &attributes);
    instruments.duration.record(start.elapsed().as_secs_f64(), &attributes);
}

/// Record one progress snapshot
pub fn record_progress(side: &'static str) {
    instruments().progress.add(1, &[KeyValue::new("side", side)]);
}
