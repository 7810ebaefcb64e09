//! The `Message` type: a JSON-RPC 2.0 envelope normalized to a tagged Rust
//! variant, plus the codec that converts between that variant and wire
//! bytes. See `conduit_core::error` for the error codes the codec raises.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{McpError, RpcError};

/// JSON-RPC version literal. The only value ever observed on the wire.
pub const JSONRPC_VERSION: &str = "2.0";

/// A request or response identifier: either a string or a signed 64-bit
/// integer. Values that don't fit `i64` round-trip as strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        Self::Number(n)
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

/// Params as they are normalized for handlers: absent and empty params on
/// the wire both become an empty object, never `null`. Positional (array)
/// params are preserved for round-tripping but handlers written against the
/// MCP method surface only ever consume the keyed-map shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Params {
    Keyed(serde_json::Map<String, Value>),
    Positional(Vec<Value>),
}

impl Params {
    /// Normalize `None`/`null`/an empty object all to an empty keyed map.
    #[must_use]
    pub fn normalize(value: Option<Value>) -> Self {
        match value {
            None => Self::Keyed(serde_json::Map::new()),
            Some(Value::Null) => Self::Keyed(serde_json::Map::new()),
            Some(Value::Object(map)) => Self::Keyed(map),
            Some(Value::Array(items)) => Self::Positional(items),
            Some(other) => {
                // Anything else is not a valid JSON-RPC params shape; keep it
                // as a single-element positional list rather than panicking,
                // callers downstream will reject it with invalid_params.
                Self::Positional(vec![other])
            }
        }
    }

    /// View params as a keyed map, treating positional params as absent.
    #[must_use]
    pub fn as_object(&self) -> serde_json::Map<String, Value> {
        match self {
            Self::Keyed(map) => map.clone(),
            Self::Positional(_) => serde_json::Map::new(),
        }
    }

    /// Convert to a `serde_json::Value` for deserializing into a typed struct.
    #[must_use]
    pub fn into_value(self) -> Value {
        match self {
            Self::Keyed(map) => Value::Object(map),
            Self::Positional(items) => Value::Array(items),
        }
    }
}

impl Default for Params {
    fn default() -> Self {
        Self::Keyed(serde_json::Map::new())
    }
}

/// A JSON-RPC message, normalized to exactly one of the three shapes the
/// protocol defines. `jsonrpc: "2.0"` is implicit in this type and restored
/// by the codec on encode.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Request {
        id: RequestId,
        method: String,
        params: Params,
    },
    Response {
        id: RequestId,
        payload: ResponsePayload,
    },
    Notification {
        method: String,
        params: Params,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResponsePayload {
    Result(Value),
    Error(RpcError),
}

impl Message {
    #[must_use]
    pub fn request(id: impl Into<RequestId>, method: impl Into<String>, params: Option<Value>) -> Self {
        Self::Request {
            id: id.into(),
            method: method.into(),
            params: Params::normalize(params),
        }
    }

    #[must_use]
    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Self::Notification {
            method: method.into(),
            params: Params::normalize(params),
        }
    }

    #[must_use]
    pub fn response_ok(id: impl Into<RequestId>, result: Value) -> Self {
        Self::Response {
            id: id.into(),
            payload: ResponsePayload::Result(result),
        }
    }

    #[must_use]
    pub fn response_err(id: impl Into<RequestId>, error: impl Into<RpcError>) -> Self {
        Self::Response {
            id: id.into(),
            payload: ResponsePayload::Error(error.into()),
        }
    }

    #[must_use]
    pub fn method(&self) -> Option<&str> {
        match self {
            Self::Request { method, .. } | Self::Notification { method, .. } => Some(method),
            Self::Response { .. } => None,
        }
    }

    #[must_use]
    pub fn is_notification(&self) -> bool {
        matches!(self, Self::Notification { .. })
    }
}

// --- Wire (de)serialization -------------------------------------------------

/// On-the-wire shape. `id` is `Option` so parse errors without a recoverable
/// id can still be represented; `Message` itself never carries a missing id
/// on a Request/Response, the codec rejects those during decode.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireEnvelope {
    jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<WireId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<RpcError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum WireId {
    Number(i64),
    String(String),
}

impl From<RequestId> for WireId {
    fn from(id: RequestId) -> Self {
        match id {
            RequestId::Number(n) => Self::Number(n),
            RequestId::String(s) => Self::String(s),
        }
    }
}

impl From<WireId> for RequestId {
    fn from(id: WireId) -> Self {
        match id {
            WireId::Number(n) => Self::Number(n),
            WireId::String(s) => Self::String(s),
        }
    }
}

/// Encode a message to its wire JSON bytes. Key ordering is not guaranteed.
///
/// # Errors
/// Only fails if `result`/`error` payloads themselves contain non-serializable
/// values, which cannot happen for values already built from `serde_json::Value`.
pub fn encode(message: &Message) -> McpResultBytes {
    let envelope = match message.clone() {
        Message::Request { id, method, params } => WireEnvelope {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id.into()),
            method: Some(method),
            params: Some(params.into_value()),
            result: None,
            error: None,
        },
        Message::Notification { method, params } => WireEnvelope {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: None,
            method: Some(method),
            params: Some(params.into_value()),
            result: None,
            error: None,
        },
        Message::Response { id, payload } => {
            let (result, error) = match payload {
                ResponsePayload::Result(value) => (Some(value), None),
                ResponsePayload::Error(error) => (None, Some(error)),
            };
            WireEnvelope {
                jsonrpc: JSONRPC_VERSION.to_string(),
                id: Some(id.into()),
                method: None,
                params: None,
                result,
                error,
            }
        }
    };
    serde_json::to_vec(&envelope).map_err(McpError::from)
}

type McpResultBytes = Result<Vec<u8>, McpError>;

/// Decode wire bytes into a normalized [`Message`].
///
/// # Errors
/// Returns `-32700` for malformed JSON, `-32600` for a missing/wrong
/// `jsonrpc` field or a shape that is neither request, response, nor
/// notification.
pub fn decode(bytes: &[u8]) -> Result<Message, McpError> {
    let envelope: WireEnvelope = serde_json::from_slice(bytes)
        .map_err(|e| McpError::parse_error(format!("invalid JSON: {e}")))?;

    if envelope.jsonrpc != JSONRPC_VERSION {
        return Err(McpError::invalid_request(format!(
            "invalid jsonrpc version: {:?}",
            envelope.jsonrpc
        )));
    }

    match (envelope.id, envelope.method, envelope.result, envelope.error) {
        (Some(id), Some(method), None, None) => Ok(Message::Request {
            id: id.into(),
            method,
            params: Params::normalize(envelope.params),
        }),
        (None, Some(method), None, None) => Ok(Message::Notification {
            method,
            params: Params::normalize(envelope.params),
        }),
        (Some(id), None, Some(result), None) => Ok(Message::Response {
            id: id.into(),
            payload: ResponsePayload::Result(result),
        }),
        (Some(id), None, None, Some(error)) => Ok(Message::Response {
            id: id.into(),
            payload: ResponsePayload::Error(error),
        }),
        _ => Err(McpError::invalid_request(
            "message is neither a request, response, nor notification",
        )),
    }
}
