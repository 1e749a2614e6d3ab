use std::sync::Arc;
use std::time::Duration;

use butler_config::RequesterConfig;
use butler_core::protocol::DEFAULT_ERROR_MESSAGE;
use butler_core::{
    BridgeError, BridgeEvent, ChatPayload, ConversationMessage, EventBus, GeneratePayload, RequestEvent, RequestId,
    RequestKind, ResponseBody, Result, Subscription, TestPayload,
};
use butler_telemetry::metrics;

use crate::options::RequestOptions;
use crate::pending::PendingTable;

/// User prompt sent with `generate` when the caller supplies none
pub const DEFAULT_USER_PROMPT: &str = "Please summarize the main content of this paper.";

/// Diagnostic payload of a connection test
pub const TEST_MESSAGE: &str = "Hello from Zotero AI Butler";

/// Callback receiving each progress snapshot
///
/// Every chunk is the full text generated so far, not a delta.
pub type ProgressFn<'a> = &'a mut (dyn FnMut(&str) + Send);

/// Host-side bridge to the page's AI capability
pub struct Requester {
    bus: Arc<dyn EventBus>,
    pending: PendingTable,
    default_timeout: Duration,
    temperature: f64,
    system_prompt: Option<String>,
}

impl Requester {
    /// Create a requester with default settings
    pub fn new(bus: Arc<dyn EventBus>) -> Self {
        Self::from_config(bus, &RequesterConfig::default())
    }

    pub fn from_config(bus: Arc<dyn EventBus>, config: &RequesterConfig) -> Self {
        Self {
            bus,
            pending: PendingTable::default(),
            default_timeout: config.request_timeout,
            temperature: config.temperature,
            system_prompt: config.system_prompt.clone(),
        }
    }

    /// Number of requests still waiting for a terminal event
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Summarize a paper
    ///
    /// Progress snapshots are delivered to `on_progress` when supplied, which
    /// also asks the page to stream.
    pub async fn generate(
        &self,
        content: &str,
        is_base64: bool,
        prompt: Option<&str>,
        options: &RequestOptions,
        on_progress: Option<ProgressFn<'_>>,
    ) -> Result<String> {
        let payload = GeneratePayload {
            system_prompt: self.system_prompt.clone(),
            user_prompt: Some(prompt.unwrap_or(DEFAULT_USER_PROMPT).to_owned()),
            content: content.to_owned(),
            is_base64,
            temperature: Some(options.temperature.unwrap_or(self.temperature)),
            max_tokens: options.max_tokens,
        };

        tracing::debug!(is_base64, content_len = content.len(), "generate request");

        self.send(
            RequestKind::Generate,
            serde_json::to_value(payload)?,
            self.timeout_for(options),
            on_progress,
        )
        .await
    }

    /// Continue a conversation about a paper
    pub async fn chat(
        &self,
        pdf_content: &str,
        is_base64: bool,
        conversation: &[ConversationMessage],
        options: &RequestOptions,
        on_progress: Option<ProgressFn<'_>>,
    ) -> Result<String> {
        let payload = ChatPayload {
            pdf_content: (!pdf_content.is_empty()).then(|| pdf_content.to_owned()),
            is_base64,
            conversation: conversation.to_vec(),
            temperature: Some(options.temperature.unwrap_or(self.temperature)),
            max_tokens: options.max_tokens,
        };

        tracing::debug!(messages = conversation.len(), "chat request");

        self.send(
            RequestKind::Chat,
            serde_json::to_value(payload)?,
            self.timeout_for(options),
            on_progress,
        )
        .await
    }

    /// Check that a page-side bridge with a ready capability is reachable
    ///
    /// Failures carry remediation guidance alongside the underlying message.
    pub async fn test_connection(&self, options: &RequestOptions) -> Result<String> {
        tracing::debug!("testing browser AI connection");

        let payload = TestPayload {
            message: TEST_MESSAGE.to_owned(),
        };

        let outcome = match serde_json::to_value(payload) {
            Ok(payload) => {
                self.send(RequestKind::Test, payload, self.timeout_for(options), None)
                    .await
            }
            Err(e) => Err(e.into()),
        };

        match outcome {
            Ok(result) => Ok(format!("Browser AI connection succeeded!\nResponse: {result}")),
            Err(e) => Err(BridgeError::ConnectionFailed { reason: e.to_string() }),
        }
    }

    fn timeout_for(&self, options: &RequestOptions) -> Duration {
        options.request_timeout.unwrap_or(self.default_timeout)
    }

    async fn send(
        &self,
        kind: RequestKind,
        payload: serde_json::Value,
        timeout: Duration,
        on_progress: Option<ProgressFn<'_>>,
    ) -> Result<String> {
        // Listener goes first so a responder answering synchronously is not missed
        let mut subscription = self.bus.subscribe()?;
        let mut pending = self.pending.register(Arc::clone(&self.bus));
        let request_id = pending.id().clone();
        let stream = on_progress.is_some();

        self.bus.publish(BridgeEvent::Request(RequestEvent {
            request_id: request_id.clone(),
            kind: kind.clone(),
            payload,
            stream,
        }))?;
        pending.mark_sent();

        tracing::debug!(
            %request_id,
            %kind,
            stream,
            timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            "sent request to browser AI bridge"
        );

        let outcome = tokio::time::timeout(timeout, await_terminal(&request_id, &mut subscription, on_progress))
            .await
            .unwrap_or(Err(BridgeError::Timeout(timeout)));
        drop(subscription);

        // A timed-out entry stays unsettled so dropping it signals cancellation
        if !outcome.as_ref().is_err_and(BridgeError::is_timeout) {
            pending.settle();
        }

        let label = outcome.as_ref().map_or_else(BridgeError::outcome, |_| "complete");
        metrics::record_request("requester", kind.as_str(), label, pending.started());

        match &outcome {
            Ok(result) => tracing::debug!(%request_id, result_len = result.len(), "request completed"),
            Err(e) => tracing::warn!(%request_id, error = %e, "request failed"),
        }

        outcome
    }
}

/// Drain matching events until the terminal one arrives
async fn await_terminal(
    request_id: &RequestId,
    subscription: &mut Subscription,
    mut on_progress: Option<ProgressFn<'_>>,
) -> Result<String> {
    let mut snapshot = String::new();

    while let Some(event) = subscription.recv().await {
        let BridgeEvent::Response(response) = event else {
            continue;
        };
        if response.request_id != *request_id {
            continue;
        }

        match response.body {
            ResponseBody::Progress { chunk } => {
                metrics::record_progress("requester");
                if let Some(callback) = on_progress.as_deref_mut() {
                    callback(&chunk);
                }
                snapshot = chunk;
            }
            ResponseBody::Complete { result } => {
                return Ok(result.filter(|r| !r.is_empty()).unwrap_or(snapshot));
            }
            ResponseBody::Error { error } => {
                let message = error
                    .filter(|e| !e.is_empty())
                    .unwrap_or_else(|| DEFAULT_ERROR_MESSAGE.to_owned());
                return Err(BridgeError::Remote(message));
            }
        }
    }

    // The bus went away underneath us
    Err(BridgeError::TransportUnavailable)
}
