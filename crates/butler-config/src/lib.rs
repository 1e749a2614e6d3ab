#![allow(clippy::must_use_candidate)]

pub mod duration;
mod env;
mod loader;
pub mod requester;
pub mod responder;
pub mod telemetry;
pub mod transport;

use serde::Deserialize;

pub use requester::*;
pub use responder::*;
pub use telemetry::TelemetryConfig;
pub use transport::*;

/// Top-level bridge configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Host-side requester defaults
    #[serde(default)]
    pub requester: RequesterConfig,
    /// Page-side responder settings
    #[serde(default)]
    pub responder: ResponderConfig,
    /// Wire transport endpoints
    #[serde(default)]
    pub transport: TransportConfig,
    /// Telemetry configuration
    #[serde(default)]
    pub telemetry: Option<TelemetryConfig>,
}
