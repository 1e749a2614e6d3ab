//! Shared core of the Butler browser AI bridge
//!
//! Defines the event protocol exchanged between the host-side requester and
//! the page-side responder, the broadcast bus both halves talk through, and a
//! line-delimited JSON transport that carries the same envelopes over any
//! byte stream.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod bus;
pub mod error;
pub mod protocol;
pub mod transport;

pub use bus::{EventBus, LocalBus, SubscriberId, Subscription};
pub use error::{BridgeError, Result};
pub use protocol::{
    BridgeEvent, CancelEvent, ChatPayload, ConversationMessage, GeneratePayload, ReadyEvent, RequestEvent, RequestId,
    RequestKind, ResponseBody, ResponseEvent, Role, TestPayload,
};
