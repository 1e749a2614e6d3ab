//! Contract of the page-level AI inference engine
//!
//! The responder never talks to a model directly. It probes a [`Capability`],
//! opens one [`Session`] per request and releases it once the request has
//! reached its terminal event.

use std::fmt;
use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

/// Readiness reported by the capability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Availability {
    /// Usable immediately
    #[serde(alias = "readily", alias = "available")]
    Ready,
    /// Supported, but the model has to be downloaded first
    Downloadable,
    /// Model download in progress
    Downloading,
    /// Not supported on this device
    #[serde(alias = "no")]
    Unavailable,
}

impl Availability {
    /// Only immediate readiness counts as available
    pub const fn is_ready(self) -> bool {
        matches!(self, Self::Ready)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Downloadable => "downloadable",
            Self::Downloading => "downloading",
            Self::Unavailable => "unavailable",
        }
    }
}

impl fmt::Display for Availability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sampling parameters for a new session
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionConfig {
    pub temperature: f64,
    pub top_k: u32,
}

/// Failure raised by the capability or one of its sessions
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct CapabilityError {
    message: String,
}

impl CapabilityError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Stream of cumulative output snapshots
///
/// Each item is the full text generated so far.
pub type SnapshotStream = Pin<Box<dyn Stream<Item = Result<String, CapabilityError>> + Send>>;

/// Page-level inference engine
#[async_trait]
pub trait Capability: Send + Sync {
    /// Report whether the engine can serve prompts right now
    async fn probe_availability(&self) -> Result<Availability, CapabilityError>;

    /// Descriptive metadata returned by the connection test
    async fn metadata(&self) -> Result<serde_json::Value, CapabilityError> {
        let availability = self.probe_availability().await?;
        Ok(serde_json::json!({ "available": availability }))
    }

    /// Open a session with the given sampling parameters
    async fn create_session(&self, config: SessionConfig) -> Result<Box<dyn Session>, CapabilityError>;
}

/// A prompting session, owned by a single request
#[async_trait]
pub trait Session: Send {
    /// Prompt and wait for the whole answer
    async fn prompt(&mut self, text: &str) -> Result<String, CapabilityError>;

    /// Prompt and receive cumulative snapshots as they are produced
    async fn prompt_streaming(&mut self, text: &str) -> Result<SnapshotStream, CapabilityError>;

    /// Release the session's resources
    async fn destroy(&mut self) -> Result<(), CapabilityError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn availability_accepts_wire_aliases() {
        let parsed: Vec<Availability> =
            serde_json::from_str(r#"["readily", "available", "ready", "downloadable", "downloading", "no"]"#)
                .unwrap();

        assert_eq!(
            parsed,
            [
                Availability::Ready,
                Availability::Ready,
                Availability::Ready,
                Availability::Downloadable,
                Availability::Downloading,
                Availability::Unavailable,
            ]
        );
        assert_eq!(serde_json::to_string(&Availability::Ready).unwrap(), r#""ready""#);
    }

    #[test]
    fn only_ready_is_ready() {
        assert!(Availability::Ready.is_ready());
        assert!(!Availability::Downloadable.is_ready());
        assert!(!Availability::Downloading.is_ready());
        assert!(!Availability::Unavailable.is_ready());
    }
}
