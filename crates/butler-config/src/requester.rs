use std::time::Duration;

use serde::Deserialize;

/// Default time a requester waits for a terminal event
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Default sampling temperature sent with generate and chat requests
pub const DEFAULT_TEMPERATURE: f64 = 0.7;

/// Host-side requester defaults
///
/// Per-call options override these; nothing set on a call is persisted.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequesterConfig {
    /// Time to wait for a terminal event before giving up
    #[serde(default = "default_request_timeout", deserialize_with = "crate::duration::deserialize")]
    pub request_timeout: Duration,
    /// Sampling temperature used when a call does not specify one
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// System prompt prepended to generate requests
    #[serde(default)]
    pub system_prompt: Option<String>,
}

impl Default for RequesterConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            temperature: DEFAULT_TEMPERATURE,
            system_prompt: None,
        }
    }
}

const fn default_request_timeout() -> Duration {
    DEFAULT_REQUEST_TIMEOUT
}

const fn default_temperature() -> f64 {
    DEFAULT_TEMPERATURE
}
