use butler_core::RequestKind;

use crate::capability::{Availability, CapabilityError};

/// Prefix of failures caught outside a kind handler
const REQUEST_FAILED_PREFIX: &str = "Request failed: ";

/// Failures while serving a single request
#[derive(Debug, thiserror::Error)]
pub enum ResponderError {
    /// The capability is not ready to serve prompts
    #[error("Browser AI API is not available. Please ensure Chrome 127+ with AI features enabled.")]
    Unavailable(Availability),

    /// The availability probe itself failed
    #[error("availability check failed: {0}")]
    Probe(CapabilityError),

    /// Base64 content cannot be handed to the capability
    #[error("base64 PDF content cannot be processed by the browser AI, send extracted text instead")]
    UnsupportedInput,

    /// Payload does not match the request kind
    #[error("invalid {kind} payload: {source}")]
    InvalidPayload {
        kind: &'static str,
        source: serde_json::Error,
    },

    /// A chat request carried no messages
    #[error("conversation is empty")]
    EmptyConversation,

    #[error("Unknown request type: {0}")]
    UnknownKind(String),

    /// Session creation or prompting failed
    #[error(transparent)]
    Capability(#[from] CapabilityError),

    /// The requester gave up or the responder is shutting down
    #[error("request cancelled")]
    Cancelled,

    /// The capability panicked while serving the request
    #[error("{0}")]
    Panicked(String),
}

impl ResponderError {
    /// Message carried by the error event for a request of `kind`
    pub fn wire_message(&self, kind: &RequestKind) -> String {
        match self {
            Self::Unavailable(_) | Self::UnknownKind(_) | Self::Cancelled => self.to_string(),
            Self::Panicked(message) => format!("{REQUEST_FAILED_PREFIX}{message}"),
            _ => format!("{}{self}", failure_prefix(kind)),
        }
    }

    /// Short label used for log fields and metric attributes
    pub const fn outcome(&self) -> &'static str {
        match self {
            Self::Unavailable(_) | Self::Probe(_) => "unavailable",
            Self::UnsupportedInput | Self::InvalidPayload { .. } | Self::EmptyConversation | Self::UnknownKind(_) => {
                "invalid_request"
            }
            Self::Capability(_) => "error",
            Self::Cancelled => "cancelled",
            Self::Panicked(_) => "panicked",
        }
    }
}

fn failure_prefix(kind: &RequestKind) -> &'static str {
    match kind {
        RequestKind::Test => "Test failed: ",
        RequestKind::Generate => "Generation failed: ",
        RequestKind::Chat => "Chat failed: ",
        RequestKind::Other(_) => REQUEST_FAILED_PREFIX,
    }
}
