//! Unified error type for the conduit MCP runtime.
//!
//! A single `McpError` is used across every crate in this workspace. It
//! carries an [`ErrorKind`] classification that maps directly onto the
//! JSON-RPC 2.0 / MCP error codes in the protocol's external interface, so
//! a handler can construct one error value and have it serialize correctly
//! regardless of which transport or peer role produced it.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Result type alias used throughout the workspace.
pub type McpResult<T> = std::result::Result<T, McpError>;

/// Error classification. Each variant maps to exactly one JSON-RPC error
/// code via [`ErrorKind::code`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed JSON on the wire (-32700).
    ParseError,
    /// Envelope failed validation, e.g. wrong `jsonrpc` field (-32600).
    InvalidRequest,
    /// No handler registered for the method (-32601).
    MethodNotFound,
    /// Handler rejected the params, or a named entity (tool/uri/level) does not exist (-32602).
    InvalidParams,
    /// Handler panicked or returned an unstructured error (-32603).
    Internal,
    /// The worker pool rejected the request because it is shut down or full (-32000).
    ServerOverloaded,
    /// Strict-mode server refused to negotiate down to a client's requested version (-32001).
    UnsupportedProtocolVersion,
    /// A request other than `initialize` arrived before the session reached `ready` (-32002).
    RequestBeforeInitialization,
    /// The transport was closed; no further requests can be issued or delivered.
    TransportClosed,
    /// A request's deadline elapsed before a response arrived.
    Timeout,
    /// A client-side session transition was attempted that the state machine forbids.
    InvalidStateTransition,
}

impl ErrorKind {
    /// The JSON-RPC error code this kind serializes to.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::Internal => -32603,
            Self::ServerOverloaded => -32000,
            Self::UnsupportedProtocolVersion => -32001,
            Self::RequestBeforeInitialization => -32002,
            // The remaining kinds never reach the wire as JSON-RPC error objects;
            // they terminate local completion handles instead. -32603 is a
            // reasonable default if one is ever serialized anyway.
            Self::TransportClosed | Self::Timeout | Self::InvalidStateTransition => -32603,
        }
    }

    /// Build a kind from a JSON-RPC error code received from a peer.
    #[must_use]
    pub const fn from_code(code: i32) -> Self {
        match code {
            -32700 => Self::ParseError,
            -32600 => Self::InvalidRequest,
            -32601 => Self::MethodNotFound,
            -32602 => Self::InvalidParams,
            -32000 => Self::ServerOverloaded,
            -32001 => Self::UnsupportedProtocolVersion,
            -32002 => Self::RequestBeforeInitialization,
            _ => Self::Internal,
        }
    }
}

/// The workspace-wide error type.
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct McpError {
    /// Classification, used to pick a JSON-RPC code.
    pub kind: ErrorKind,
    /// Human-readable description.
    pub message: String,
    /// Optional structured detail, forwarded as the JSON-RPC error `data` field.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl McpError {
    /// Construct an error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            data: None,
        }
    }

    /// Attach structured data, surfaced as the JSON-RPC error `data` field.
    #[must_use]
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// The JSON-RPC error code for this error.
    #[must_use]
    pub const fn code(&self) -> i32 {
        self.kind.code()
    }

    /// Shorthand constructors matching the codes in the external interface.
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ParseError, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidRequest, message)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            ErrorKind::MethodNotFound,
            format!("Method not found: {method}"),
        )
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidParams, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    pub fn server_overloaded() -> Self {
        Self::new(ErrorKind::ServerOverloaded, "server overloaded")
    }

    pub fn unsupported_protocol_version(requested: &str, negotiated: &str) -> Self {
        Self::new(
            ErrorKind::UnsupportedProtocolVersion,
            format!("unsupported protocol version: requested {requested}, negotiated {negotiated}"),
        )
    }

    pub fn request_before_initialization(method: &str) -> Self {
        Self::new(
            ErrorKind::RequestBeforeInitialization,
            format!("request '{method}' issued before session was ready"),
        )
    }

    pub fn transport_closed() -> Self {
        Self::new(ErrorKind::TransportClosed, "transport closed")
    }

    pub fn timeout() -> Self {
        Self::new(ErrorKind::Timeout, "request timed out")
    }

    pub fn invalid_state_transition(from: &str, to: &str) -> Self {
        Self::new(
            ErrorKind::InvalidStateTransition,
            format!("invalid session state transition: {from} -> {to}"),
        )
    }
}

impl From<serde_json::Error> for McpError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_syntax() || err.is_eof() {
            Self::parse_error(err.to_string())
        } else {
            Self::invalid_params(err.to_string())
        }
    }
}

/// Minimal JSON-RPC error code/message/data tuple, the shape that actually
/// crosses the wire inside `Response::Error`. Distinct from [`McpError`] so
/// transport/runtime-local error kinds (timeout, transport-closed) never
/// accidentally get serialized as protocol errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl From<&McpError> for RpcError {
    fn from(err: &McpError) -> Self {
        Self {
            code: err.code(),
            message: err.message.clone(),
            data: err.data.clone(),
        }
    }
}

impl From<McpError> for RpcError {
    fn from(err: McpError) -> Self {
        Self::from(&err)
    }
}
