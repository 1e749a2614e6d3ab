use std::time::Duration;

/// Bridge result type
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Remediation hints appended to a failed connection test
pub const CONNECTION_GUIDANCE: &str = "Please make sure that:\n\
    1. The browser supports the built-in AI API (e.g. Chrome 127+ with AI features enabled)\n\
    2. The matching browser extension or userscript (e.g. Tampermonkey) is installed and enabled\n\
    3. The page-side bridge is listening for \"zotero-ai-butler-request\" events";

/// Errors surfaced by either half of the bridge
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// The shared execution context (host window, socket) cannot be reached
    #[error("cannot access the shared browser context")]
    TransportUnavailable,

    /// No terminal event arrived within the configured window
    #[error("browser AI request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// The responder reported a failure for this request
    #[error("{0}")]
    Remote(String),

    /// The connection test failed
    #[error("browser AI connection failed: {reason}\n\n{guidance}", guidance = CONNECTION_GUIDANCE)]
    ConnectionFailed {
        /// Message of the underlying failure
        reason: String,
    },

    /// Failed to encode or decode an envelope
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Peer sent something that is not a bridge envelope
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Byte-stream transport failure
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Whether the failure was a requester-side timeout
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Short label used for log fields and metric attributes
    pub const fn outcome(&self) -> &'static str {
        match self {
            Self::TransportUnavailable => "transport_unavailable",
            Self::Timeout(_) => "timeout",
            Self::Remote(_) | Self::ConnectionFailed { .. } => "error",
            Self::Serialization(_) | Self::Protocol(_) => "protocol_error",
            Self::Io(_) => "io_error",
        }
    }
}
