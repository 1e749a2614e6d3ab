use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use butler_config::{DEFAULT_TEMPERATURE, ResponderConfig};
use butler_core::{
    BridgeEvent, ChatPayload, EventBus, GeneratePayload, ReadyEvent, RequestEvent, RequestId, RequestKind, Result,
};
use butler_telemetry::metrics;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::{FutureExt, StreamExt};
use serde::de::DeserializeOwned;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::capability::{Availability, Capability, Session, SessionConfig};
use crate::error::ResponderError;
use crate::prompt;
use crate::reply::Reply;

/// Page-side request handler
///
/// Every request it accepts ends in exactly one `complete` or `error`
/// event, whatever the capability does.
pub struct Responder {
    bus: Arc<dyn EventBus>,
    capability: Arc<dyn Capability>,
    top_k: u32,
    version: String,
    active: DashMap<RequestId, CancellationToken>,
}

impl Responder {
    pub fn new(bus: Arc<dyn EventBus>, capability: Arc<dyn Capability>) -> Self {
        Self::from_config(bus, capability, &ResponderConfig::default())
    }

    pub fn from_config(bus: Arc<dyn EventBus>, capability: Arc<dyn Capability>, config: &ResponderConfig) -> Self {
        Self {
            bus,
            capability,
            top_k: config.top_k,
            version: config.version.clone(),
            active: DashMap::new(),
        }
    }

    /// Number of requests currently being served
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Serve requests until `shutdown` fires or the bus goes away
    ///
    /// Announces readiness once listening. On shutdown every in-flight
    /// request is cancelled and its terminal event emitted before returning.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) -> Result<()> {
        let mut subscription = self.bus.subscribe()?;
        self.bus.publish(BridgeEvent::Ready(ReadyEvent {
            version: self.version.clone(),
        }))?;
        tracing::info!(version = %self.version, "browser AI bridge ready");

        let mut tasks = JoinSet::new();
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                event = subscription.recv() => match event {
                    Some(BridgeEvent::Request(request)) => self.accept(request, &mut tasks, &shutdown),
                    Some(BridgeEvent::Cancel(cancel)) => self.cancel(&cancel.request_id),
                    Some(_) => {}
                    None => {
                        tracing::debug!("event bus closed");
                        break;
                    }
                },
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => log_join(joined),
            }
        }

        shutdown.cancel();
        while let Some(joined) = tasks.join_next().await {
            log_join(joined);
        }

        tracing::info!("browser AI bridge stopped");
        Ok(())
    }

    fn accept(self: &Arc<Self>, request: RequestEvent, tasks: &mut JoinSet<()>, shutdown: &CancellationToken) {
        let token = shutdown.child_token();
        match self.active.entry(request.request_id.clone()) {
            Entry::Occupied(_) => {
                tracing::warn!(request_id = %request.request_id, "duplicate request id, ignoring");
                return;
            }
            Entry::Vacant(slot) => {
                slot.insert(token.clone());
            }
        }

        let span = tracing::info_span!(
            "bridge_request",
            request_id = %request.request_id,
            kind = %request.kind,
            stream = request.stream,
        );
        let this = Arc::clone(self);
        tasks.spawn(
            async move {
                let request_id = request.request_id.clone();
                this.handle(request, token).await;
                this.active.remove(&request_id);
            }
            .instrument(span),
        );
    }

    fn cancel(&self, request_id: &RequestId) {
        match self.active.get(request_id) {
            Some(token) => {
                token.cancel();
                tracing::debug!(%request_id, "request cancelled by requester");
            }
            None => tracing::trace!(%request_id, "cancel for unknown request"),
        }
    }

    /// Serve one request, emitting exactly one terminal event
    ///
    /// Progress events precede the terminal one. Failures, panics in the
    /// capability and cancellation all end in an `error` event. The session,
    /// if any, is released afterwards.
    pub async fn handle(&self, request: RequestEvent, cancel: CancellationToken) {
        let started = Instant::now();
        let RequestEvent {
            request_id,
            kind,
            payload,
            stream,
        } = request;
        tracing::debug!(%request_id, %kind, stream, "received request");

        let reply = Reply::new(Arc::clone(&self.bus), request_id.clone());
        let mut session = None;

        let outcome = {
            let work = AssertUnwindSafe(self.dispatch(&kind, payload, stream, &reply, &mut session)).catch_unwind();
            tokio::select! {
                biased;
                () = cancel.cancelled() => Err(ResponderError::Cancelled),
                caught = work => caught.unwrap_or_else(|panic| Err(ResponderError::Panicked(panic_message(&*panic)))),
            }
        };

        let label = match outcome {
            Ok(result) => {
                tracing::debug!(%request_id, result_len = result.len(), "request completed");
                reply.complete(result);
                "complete"
            }
            Err(e) => {
                tracing::warn!(%request_id, %kind, error = %e, "request failed");
                reply.error(e.wire_message(&kind));
                e.outcome()
            }
        };
        metrics::record_request("responder", kind.as_str(), label, started);

        if let Some(mut session) = session {
            release(&mut *session, &request_id).await;
        }
    }

    async fn dispatch(
        &self,
        kind: &RequestKind,
        payload: serde_json::Value,
        stream: bool,
        reply: &Reply,
        session: &mut Option<Box<dyn Session>>,
    ) -> std::result::Result<String, ResponderError> {
        match kind {
            RequestKind::Test => {
                self.ensure_ready().await?;
                let metadata = self.capability.metadata().await?;
                let pretty = serde_json::to_string_pretty(&metadata).unwrap_or_else(|_| metadata.to_string());
                Ok(format!("Browser AI is available!\nCapabilities: {pretty}"))
            }
            RequestKind::Generate => {
                let payload: GeneratePayload = parse_payload("generate", payload)?;
                self.ensure_ready().await?;
                let text = prompt::generate(&payload)?;
                self.invoke(&text, payload.temperature, stream, reply, session).await
            }
            RequestKind::Chat => {
                let payload: ChatPayload = parse_payload("chat", payload)?;
                self.ensure_ready().await?;
                let text = prompt::chat(&payload)?;
                self.invoke(&text, payload.temperature, stream, reply, session).await
            }
            RequestKind::Other(other) => Err(ResponderError::UnknownKind(other.clone())),
        }
    }

    async fn ensure_ready(&self) -> std::result::Result<Availability, ResponderError> {
        let availability = self
            .capability
            .probe_availability()
            .await
            .map_err(ResponderError::Probe)?;
        tracing::debug!(%availability, "probed capability");

        if availability.is_ready() {
            Ok(availability)
        } else {
            Err(ResponderError::Unavailable(availability))
        }
    }

    async fn invoke(
        &self,
        text: &str,
        temperature: Option<f64>,
        stream: bool,
        reply: &Reply,
        slot: &mut Option<Box<dyn Session>>,
    ) -> std::result::Result<String, ResponderError> {
        let config = SessionConfig {
            temperature: temperature.unwrap_or(DEFAULT_TEMPERATURE),
            top_k: self.top_k,
        };
        let session = slot.insert(self.capability.create_session(config).await?);

        if !stream {
            return Ok(session.prompt(text).await?);
        }

        let mut snapshots = session.prompt_streaming(text).await?;
        let mut latest = String::new();
        while let Some(snapshot) = snapshots.next().await {
            latest = snapshot?;
            reply.progress(&latest);
        }

        Ok(latest)
    }
}

fn parse_payload<T: DeserializeOwned>(
    kind: &'static str,
    payload: serde_json::Value,
) -> std::result::Result<T, ResponderError> {
    serde_json::from_value(payload).map_err(|source| ResponderError::InvalidPayload { kind, source })
}

async fn release(session: &mut dyn Session, request_id: &RequestId) {
    match session.destroy().await {
        Ok(()) => tracing::trace!(%request_id, "session released"),
        Err(e) => tracing::warn!(%request_id, error = %e, "failed to release session"),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "capability panicked".to_owned())
}

fn log_join(joined: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        tracing::error!(error = %e, "request task failed");
    }
}
