use std::time::Duration;

/// Per-call options
///
/// Unset fields fall back to the requester's configured defaults for this
/// call only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
    /// Sampling temperature
    pub temperature: Option<f64>,
    /// Forwarded to the page, which currently does not enforce it
    pub max_tokens: Option<u32>,
    /// Time to wait for a terminal event
    pub request_timeout: Option<Duration>,
}

impl RequestOptions {
    pub const fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub const fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }
}
