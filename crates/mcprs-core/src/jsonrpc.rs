//! JSON-RPC 2.0 envelope types.
//!
//! These are the wire types the session engine reads and writes; they know nothing
//! about MCP method semantics. A [`JsonRpcMessage`] is exactly one of a request, a
//! response (success or error), or a notification, distinguished structurally per
//! [`utils::parse_message`] rather than by a discriminator field, matching how real
//! JSON-RPC 2.0 peers are observed to serialize messages on the wire.

use std::fmt;

use serde::{Deserialize, Serialize};

/// JSON-RPC request identifier: either a string or an integer, never null on the wire
/// (a null id is reserved for notifications, which carry no id field at all).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// String-valued id.
    String(String),
    /// Integer-valued id.
    Number(i64),
}

/// Alias kept distinct from [`RequestId`] at the type level for readability at call
/// sites that talk about "the id of this message" rather than "a request id" — they
/// are the same representation.
pub type MessageId = RequestId;

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{s}"),
            Self::Number(n) => write!(f, "{n}"),
        }
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

impl From<i32> for RequestId {
    fn from(n: i32) -> Self {
        Self::Number(i64::from(n))
    }
}

/// The literal JSON-RPC version marker. Serializes to `"2.0"` and rejects anything else
/// on deserialization so that malformed envelopes are caught at the parse boundary
/// rather than silently accepted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JsonRpcVersion;

impl Serialize for JsonRpcVersion {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str("2.0")
    }
}

impl<'de> Deserialize<'de> for JsonRpcVersion {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        if s == "2.0" {
            Ok(Self)
        } else {
            Err(serde::de::Error::custom(format!(
                "unsupported jsonrpc version: {s}"
            )))
        }
    }
}

/// A JSON-RPC request: expects a response correlated by `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: JsonRpcVersion,
    pub id: RequestId,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
    #[serde(rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

impl JsonRpcRequest {
    /// Build a new request, leaving `_meta` empty.
    #[must_use]
    pub fn new(id: RequestId, method: impl Into<String>, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            id,
            method: method.into(),
            params,
            meta: None,
        }
    }

    /// The progress token carried in `_meta.progressToken`, if any.
    #[must_use]
    pub fn progress_token(&self) -> Option<&serde_json::Value> {
        self.meta.as_ref()?.get("progressToken")
    }
}

/// A JSON-RPC notification: no `id`, no reply expected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: JsonRpcVersion,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
    #[serde(rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

impl JsonRpcNotification {
    /// Build a new notification, leaving `_meta` empty.
    #[must_use]
    pub fn new(method: impl Into<String>, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            method: method.into(),
            params,
            meta: None,
        }
    }
}

/// A JSON-RPC error object, embedded in an error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl JsonRpcError {
    #[must_use]
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

impl From<&crate::error::McpError> for JsonRpcError {
    fn from(err: &crate::error::McpError) -> Self {
        Self::new(err.jsonrpc_code(), err.message.clone())
    }
}

/// Success or error payload of a [`JsonRpcResponse`].
///
/// Untagged so that `result` and `error` remain mutually exclusive on the wire the way
/// the JSON-RPC 2.0 spec requires, rather than both being present as optional fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcResponsePayload {
    Success { result: serde_json::Value },
    Error { error: JsonRpcError },
}

/// A JSON-RPC response, correlated to a prior request by `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: JsonRpcVersion,
    pub id: RequestId,
    #[serde(flatten)]
    pub payload: JsonRpcResponsePayload,
}

impl JsonRpcResponse {
    /// Build a success response.
    #[must_use]
    pub fn success(id: RequestId, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            id,
            payload: JsonRpcResponsePayload::Success { result },
        }
    }

    /// Build an error response.
    #[must_use]
    pub fn error(id: RequestId, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            id,
            payload: JsonRpcResponsePayload::Error { error },
        }
    }

    /// True if this response carries an error payload.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self.payload, JsonRpcResponsePayload::Error { .. })
    }
}

/// Any JSON-RPC message that can travel over a [`Transport`](mcprs_transport) message.
///
/// Untagged union over the three message shapes; serde picks the right variant during
/// deserialization by trying each in order, which is why [`utils::parse_message`] sniffs
/// structure explicitly rather than relying solely on this derive for error messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcMessage {
    Request(JsonRpcRequest),
    Response(JsonRpcResponse),
    Notification(JsonRpcNotification),
}

impl JsonRpcMessage {
    /// The method name, for requests and notifications; `None` for responses.
    #[must_use]
    pub fn method(&self) -> Option<&str> {
        match self {
            Self::Request(r) => Some(&r.method),
            Self::Notification(n) => Some(&n.method),
            Self::Response(_) => None,
        }
    }

    /// The correlation id, for requests and responses; `None` for notifications.
    #[must_use]
    pub fn id(&self) -> Option<&RequestId> {
        match self {
            Self::Request(r) => Some(&r.id),
            Self::Response(r) => Some(&r.id),
            Self::Notification(_) => None,
        }
    }
}

/// Parsing and serialization helpers that give better error messages than a bare
/// `serde_json::from_slice::<JsonRpcMessage>` would, by sniffing which shape the raw
/// value has before committing to a variant.
pub mod utils {
    use super::{JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
    use crate::error::McpError;

    /// Parse a raw JSON-RPC message, classifying shape before deserializing so that a
    /// malformed request produces a parse error referencing `method`/`id`, not an opaque
    /// "data did not match any variant" message.
    pub fn parse_message(raw: &[u8]) -> Result<JsonRpcMessage, McpError> {
        let value: serde_json::Value =
            serde_json::from_slice(raw).map_err(|e| McpError::parse_error(e.to_string()))?;

        let has_method = value.get("method").is_some();
        let has_id = value.get("id").is_some();
        let has_error = value.get("error").is_some();
        let has_result = value.get("result").is_some();

        if has_method && has_id {
            let req: JsonRpcRequest =
                serde_json::from_value(value).map_err(|e| McpError::parse_error(e.to_string()))?;
            Ok(JsonRpcMessage::Request(req))
        } else if has_method {
            let note: JsonRpcNotification =
                serde_json::from_value(value).map_err(|e| McpError::parse_error(e.to_string()))?;
            Ok(JsonRpcMessage::Notification(note))
        } else if has_error || has_result {
            let resp: JsonRpcResponse =
                serde_json::from_value(value).map_err(|e| McpError::parse_error(e.to_string()))?;
            Ok(JsonRpcMessage::Response(resp))
        } else {
            Err(McpError::parse_error(
                "message has neither method, result, nor error",
            ))
        }
    }

    /// Serialize a message back to its wire form.
    pub fn serialize_message(message: &JsonRpcMessage) -> Result<Vec<u8>, McpError> {
        serde_json::to_vec(message).map_err(|e| McpError::new(crate::ErrorKind::Serialization, e.to_string()))
    }

    /// Extract the method name from a raw message without fully deserializing it, used
    /// by filters that only need to route on method and would otherwise pay to parse the
    /// whole envelope twice.
    #[must_use]
    pub fn extract_method(raw: &[u8]) -> Option<String> {
        let value: serde_json::Value = serde_json::from_slice(raw).ok()?;
        value
            .get("method")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_round_trips() {
        let req = JsonRpcRequest::new(RequestId::Number(1), "ping", None);
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"jsonrpc\":\"2.0\""));
        let parsed: JsonRpcRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.method, "ping");
    }

    #[test]
    fn notification_has_no_id_field() {
        let note = JsonRpcNotification::new("notifications/initialized", None);
        let json = serde_json::to_value(&note).unwrap();
        assert!(json.get("id").is_none());
    }

    #[test]
    fn success_and_error_are_mutually_exclusive() {
        let ok = JsonRpcResponse::success(RequestId::Number(1), serde_json::json!({"ok": true}));
        let json = serde_json::to_value(&ok).unwrap();
        assert!(json.get("result").is_some());
        assert!(json.get("error").is_none());

        let err = JsonRpcResponse::error(RequestId::Number(1), JsonRpcError::new(-32601, "nope"));
        let json = serde_json::to_value(&err).unwrap();
        assert!(json.get("error").is_some());
        assert!(json.get("result").is_none());
    }

    #[test]
    fn parse_message_classifies_request_notification_response() {
        let req = br#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#;
        assert!(matches!(
            utils::parse_message(req).unwrap(),
            JsonRpcMessage::Request(_)
        ));

        let note = br#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#;
        assert!(matches!(
            utils::parse_message(note).unwrap(),
            JsonRpcMessage::Notification(_)
        ));

        let resp = br#"{"jsonrpc":"2.0","id":1,"result":{}}"#;
        assert!(matches!(
            utils::parse_message(resp).unwrap(),
            JsonRpcMessage::Response(_)
        ));
    }

    #[test]
    fn parse_message_rejects_empty_object() {
        assert!(utils::parse_message(b"{}").is_err());
    }

    #[test]
    fn request_id_display_matches_variant() {
        assert_eq!(RequestId::Number(7).to_string(), "7");
        assert_eq!(RequestId::String("abc".into()).to_string(), "abc");
    }

    #[test]
    fn jsonrpc_version_rejects_wrong_value() {
        let bad = br#""1.0""#;
        let result: Result<JsonRpcVersion, _> = serde_json::from_slice(bad);
        assert!(result.is_err());
    }
}
