//! Event protocol exchanged across the context boundary
//!
//! Field names mirror the `CustomEvent` detail objects used by the page-side
//! userscript, so envelopes stay compatible with existing bridges.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Event carrying a request from the host to the page
pub const REQUEST_EVENT: &str = "zotero-ai-butler-request";
/// Event carrying progress and terminal responses back to the host
pub const RESPONSE_EVENT: &str = "zotero-ai-butler-response";
/// Informational announcement emitted once the page-side bridge has started
pub const READY_EVENT: &str = "zotero-ai-butler-bridge-ready";
/// Best-effort request to abandon an in-flight request
pub const CANCEL_EVENT: &str = "zotero-ai-butler-cancel";

/// Fallback message when an error event carries no text
pub const DEFAULT_ERROR_MESSAGE: &str = "Browser AI request failed";

/// Correlation id linking a request to its response events
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Generate a fresh id of the form `req-<unix millis>-<uuid>`
    pub fn generate() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);

        Self(format!("req-{millis}-{}", uuid::Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for RequestId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of work a request asks the page to perform
///
/// Unrecognized kinds are preserved so the responder can name them in its
/// error reply.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RequestKind {
    /// Connection diagnostic
    Test,
    /// Single-shot paper summary
    Generate,
    /// Conversation over a paper
    Chat,
    /// Anything else a peer might send
    Other(String),
}

impl RequestKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Test => "test",
            Self::Generate => "generate",
            Self::Chat => "chat",
            Self::Other(kind) => kind,
        }
    }
}

impl From<String> for RequestKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "test" => Self::Test,
            "generate" => Self::Generate,
            "chat" => Self::Chat,
            _ => Self::Other(value),
        }
    }
}

impl From<RequestKind> for String {
    fn from(value: RequestKind) -> Self {
        match value {
            RequestKind::Other(kind) => kind,
            known => known.as_str().to_owned(),
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request emitted by the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestEvent {
    pub request_id: RequestId,
    #[serde(rename = "type")]
    pub kind: RequestKind,
    /// Kind-specific payload, decoded by the responder
    #[serde(default)]
    pub payload: serde_json::Value,
    /// Whether the host wants progress events
    #[serde(default)]
    pub stream: bool,
}

/// Payload of a `generate` request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_prompt: Option<String>,
    pub content: String,
    #[serde(default)]
    pub is_base64: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Accepted for compatibility, not enforced by the page-side capability
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// Payload of a `chat` request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_content: Option<String>,
    #[serde(default)]
    pub is_base64: bool,
    #[serde(default)]
    pub conversation: Vec<ConversationMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// Payload of a `test` request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestPayload {
    pub message: String,
}

/// A single turn of a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
}

impl ConversationMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Speaker of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => f.write_str("user"),
            Self::Assistant => f.write_str("assistant"),
        }
    }
}

/// Response emitted by the page for a single request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEvent {
    pub request_id: RequestId,
    #[serde(flatten)]
    pub body: ResponseBody,
}

/// Body of a response, discriminated by the wire `type` field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ResponseBody {
    /// Cumulative snapshot of the text generated so far
    Progress {
        #[serde(default)]
        chunk: String,
    },
    /// Terminal success
    Complete {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<String>,
    },
    /// Terminal failure
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl ResponseEvent {
    pub fn progress(request_id: RequestId, chunk: impl Into<String>) -> Self {
        Self {
            request_id,
            body: ResponseBody::Progress { chunk: chunk.into() },
        }
    }

    pub fn complete(request_id: RequestId, result: impl Into<String>) -> Self {
        Self {
            request_id,
            body: ResponseBody::Complete {
                result: Some(result.into()),
            },
        }
    }

    pub fn error(request_id: RequestId, message: impl Into<String>) -> Self {
        Self {
            request_id,
            body: ResponseBody::Error {
                error: Some(message.into()),
            },
        }
    }

    /// Whether this event ends the request's lifecycle
    pub const fn is_terminal(&self) -> bool {
        !matches!(self.body, ResponseBody::Progress { .. })
    }
}

/// Announcement emitted once by the page-side bridge after startup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadyEvent {
    pub version: String,
}

/// Host-side notice that a pending request was abandoned
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelEvent {
    pub request_id: RequestId,
}

/// Every event that travels over the bus
///
/// Serializes as `{ "name": <event name>, "detail": { ... } }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", content = "detail")]
pub enum BridgeEvent {
    #[serde(rename = "zotero-ai-butler-request")]
    Request(RequestEvent),
    #[serde(rename = "zotero-ai-butler-response")]
    Response(ResponseEvent),
    #[serde(rename = "zotero-ai-butler-bridge-ready")]
    Ready(ReadyEvent),
    #[serde(rename = "zotero-ai-butler-cancel")]
    Cancel(CancelEvent),
}

impl BridgeEvent {
    /// Wire name of the event
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Request(_) => REQUEST_EVENT,
            Self::Response(_) => RESPONSE_EVENT,
            Self::Ready(_) => READY_EVENT,
            Self::Cancel(_) => CANCEL_EVENT,
        }
    }

    /// Correlation id carried by the event, if any
    pub const fn request_id(&self) -> Option<&RequestId> {
        match self {
            Self::Request(event) => Some(&event.request_id),
            Self::Response(event) => Some(&event.request_id),
            Self::Cancel(event) => Some(&event.request_id),
            Self::Ready(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_distinct() {
        let a = RequestId::generate();
        let b = RequestId::generate();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("req-"));
    }

    #[test]
    fn response_event_wire_shape() {
        let event = BridgeEvent::Response(ResponseEvent::progress("req-1".into(), "H"));
        insta::assert_snapshot!(
            serde_json::to_string(&event).unwrap(),
            @r#"{"name":"zotero-ai-butler-response","detail":{"requestId":"req-1","type":"progress","chunk":"H"}}"#
        );
    }

    #[test]
    fn request_event_wire_shape() {
        let event = BridgeEvent::Request(RequestEvent {
            request_id: "req-2".into(),
            kind: RequestKind::Test,
            payload: serde_json::json!({ "message": "ping" }),
            stream: false,
        });
        insta::assert_snapshot!(
            serde_json::to_string(&event).unwrap(),
            @r#"{"name":"zotero-ai-butler-request","detail":{"requestId":"req-2","type":"test","payload":{"message":"ping"},"stream":false}}"#
        );
    }

    #[test]
    fn unknown_kind_round_trips_by_name() {
        let raw = r#"{"requestId":"req-3","type":"translate","payload":{},"stream":true}"#;
        let event: RequestEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(event.kind, RequestKind::Other("translate".to_owned()));
        assert!(event.stream);

        let encoded = serde_json::to_value(&event).unwrap();
        assert_eq!(encoded["type"], "translate");
    }

    #[test]
    fn complete_without_result_decodes() {
        let raw = r#"{"requestId":"req-4","type":"complete"}"#;
        let event: ResponseEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(event.body, ResponseBody::Complete { result: None });
        assert!(event.is_terminal());
    }

    #[test]
    fn chat_payload_uses_camel_case() {
        let payload = ChatPayload {
            pdf_content: Some("paper".to_owned()),
            is_base64: false,
            conversation: vec![ConversationMessage::user("Hi")],
            temperature: Some(0.7),
            max_tokens: None,
        };

        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["pdfContent"], "paper");
        assert_eq!(value["isBase64"], false);
        assert_eq!(value["conversation"][0]["role"], "user");
        assert!(value.get("maxTokens").is_none());
    }

    #[test]
    fn event_names_match_constants() {
        let ready = BridgeEvent::Ready(ReadyEvent {
            version: "1.0.0".to_owned(),
        });
        let value = serde_json::to_value(&ready).unwrap();
        assert_eq!(value["name"], READY_EVENT);
        assert_eq!(ready.name(), READY_EVENT);
        assert!(ready.request_id().is_none());
    }
}
