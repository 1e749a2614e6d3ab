//! Deterministic capability for tests and local serving
//!
//! Replies with a fixed text or echoes the prompt back. Streaming splits the
//! reply into word-wise cumulative snapshots unless explicit snapshots are
//! configured.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream;

use crate::capability::{Availability, Capability, CapabilityError, Session, SessionConfig, SnapshotStream};

/// Prompt received by a scripted session, with the session's parameters
#[derive(Debug, Clone, PartialEq)]
pub struct PromptRecord {
    pub prompt: String,
    pub config: SessionConfig,
}

#[derive(Debug, Clone)]
enum Output {
    Echo,
    Fixed(String),
    Snapshots(Vec<String>),
}

#[derive(Debug, Clone)]
struct Script {
    output: Output,
    fail_after: Option<(usize, String)>,
    session_error: Option<String>,
    chunk_delay: Duration,
    panic_on_prompt: bool,
}

#[derive(Debug, Default)]
struct Stats {
    created: AtomicUsize,
    destroyed: AtomicUsize,
    last_prompt: Mutex<Option<PromptRecord>>,
}

/// Capability whose behavior is fixed up front
#[derive(Debug, Clone)]
pub struct ScriptedCapability {
    availability: Availability,
    probe_error: Option<String>,
    script: Script,
    stats: Arc<Stats>,
}

impl Default for ScriptedCapability {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedCapability {
    /// Ready capability that echoes every prompt
    pub fn new() -> Self {
        Self {
            availability: Availability::Ready,
            probe_error: None,
            script: Script {
                output: Output::Echo,
                fail_after: None,
                session_error: None,
                chunk_delay: Duration::ZERO,
                panic_on_prompt: false,
            },
            stats: Arc::default(),
        }
    }

    /// Answer every prompt with `text`
    #[must_use]
    pub fn with_reply(mut self, text: impl Into<String>) -> Self {
        self.script.output = Output::Fixed(text.into());
        self
    }

    /// Stream exactly these snapshots, the last one being the answer
    #[must_use]
    pub fn with_snapshots<I, S>(mut self, snapshots: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.script.output = Output::Snapshots(snapshots.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub const fn with_availability(mut self, availability: Availability) -> Self {
        self.availability = availability;
        self
    }

    /// Make the availability probe fail
    #[must_use]
    pub fn with_probe_error(mut self, message: impl Into<String>) -> Self {
        self.probe_error = Some(message.into());
        self
    }

    /// Make session creation fail
    #[must_use]
    pub fn with_session_error(mut self, message: impl Into<String>) -> Self {
        self.script.session_error = Some(message.into());
        self
    }

    /// Fail after `chunks` snapshots; one-shot prompts fail outright
    #[must_use]
    pub fn with_failure_after(mut self, chunks: usize, message: impl Into<String>) -> Self {
        self.script.fail_after = Some((chunks, message.into()));
        self
    }

    /// Wait this long before every snapshot, and before one-shot answers
    #[must_use]
    pub const fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.script.chunk_delay = delay;
        self
    }

    /// Panic while prompting
    #[must_use]
    pub const fn with_panic(mut self) -> Self {
        self.script.panic_on_prompt = true;
        self
    }

    pub fn sessions_created(&self) -> usize {
        self.stats.created.load(Ordering::SeqCst)
    }

    pub fn sessions_destroyed(&self) -> usize {
        self.stats.destroyed.load(Ordering::SeqCst)
    }

    /// Sessions created but not yet destroyed
    pub fn open_sessions(&self) -> usize {
        self.sessions_created().saturating_sub(self.sessions_destroyed())
    }

    /// Most recent prompt seen by any session
    pub fn last_prompt(&self) -> Option<PromptRecord> {
        self.stats
            .last_prompt
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Capability for ScriptedCapability {
    async fn probe_availability(&self) -> Result<Availability, CapabilityError> {
        match &self.probe_error {
            Some(message) => Err(CapabilityError::new(message.clone())),
            None => Ok(self.availability),
        }
    }

    async fn create_session(&self, config: SessionConfig) -> Result<Box<dyn Session>, CapabilityError> {
        if let Some(message) = &self.script.session_error {
            return Err(CapabilityError::new(message.clone()));
        }

        self.stats.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedSession {
            config,
            script: self.script.clone(),
            stats: Arc::clone(&self.stats),
            destroyed: false,
        }))
    }
}

struct ScriptedSession {
    config: SessionConfig,
    script: Script,
    stats: Arc<Stats>,
    destroyed: bool,
}

impl ScriptedSession {
    fn record(&self, text: &str) {
        *self
            .stats
            .last_prompt
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(PromptRecord {
            prompt: text.to_owned(),
            config: self.config,
        });
    }

    fn snapshots(&self, text: &str) -> Vec<String> {
        match &self.script.output {
            Output::Snapshots(snapshots) => snapshots.clone(),
            Output::Fixed(reply) => word_snapshots(reply),
            Output::Echo => word_snapshots(text),
        }
    }

    fn answer(&self, text: &str) -> String {
        match &self.script.output {
            Output::Snapshots(snapshots) => snapshots.last().cloned().unwrap_or_default(),
            Output::Fixed(reply) => reply.clone(),
            Output::Echo => text.to_owned(),
        }
    }

    fn check_usable(&self) -> Result<(), CapabilityError> {
        if self.destroyed {
            return Err(CapabilityError::new("session has been destroyed"));
        }
        assert!(!self.script.panic_on_prompt, "scripted capability panicked");
        Ok(())
    }
}

#[async_trait]
impl Session for ScriptedSession {
    async fn prompt(&mut self, text: &str) -> Result<String, CapabilityError> {
        self.check_usable()?;
        self.record(text);

        if !self.script.chunk_delay.is_zero() {
            tokio::time::sleep(self.script.chunk_delay).await;
        }
        if let Some((_, message)) = &self.script.fail_after {
            return Err(CapabilityError::new(message.clone()));
        }

        Ok(self.answer(text))
    }

    async fn prompt_streaming(&mut self, text: &str) -> Result<SnapshotStream, CapabilityError> {
        self.check_usable()?;
        self.record(text);

        let mut items: Vec<Result<String, CapabilityError>> = self.snapshots(text).into_iter().map(Ok).collect();
        if let Some((chunks, message)) = &self.script.fail_after {
            items.truncate(*chunks);
            items.push(Err(CapabilityError::new(message.clone())));
        }

        let delay = self.script.chunk_delay;
        let snapshots = stream::iter(items).then(move |item| async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            item
        });

        Ok(Box::pin(snapshots))
    }

    async fn destroy(&mut self) -> Result<(), CapabilityError> {
        if !self.destroyed {
            self.destroyed = true;
            self.stats.destroyed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// Cumulative prefixes of `text`, one per word
fn word_snapshots(text: &str) -> Vec<String> {
    let mut end = 0;
    text.split_inclusive(char::is_whitespace)
        .map(|piece| {
            end += piece.len();
            text[..end].to_owned()
        })
        .collect()
}
