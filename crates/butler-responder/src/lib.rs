//! Page-side half of the Butler browser AI bridge
//!
//! A [`Responder`] listens for requests on the shared bus, checks that the
//! local [`Capability`] is ready, runs the prompt and answers with progress
//! snapshots and exactly one terminal event per request.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod capability;
mod error;
pub mod prompt;
mod reply;
mod responder;
mod scripted;

pub use capability::{Availability, Capability, CapabilityError, Session, SessionConfig, SnapshotStream};
pub use error::ResponderError;
pub use responder::Responder;
pub use scripted::{PromptRecord, ScriptedCapability};
