//! The `Transport` trait every wire implementation satisfies, and the
//! small set of types shared across stdio/HTTP+SSE/in-memory backends.

use async_trait::async_trait;
use conduit_core::Message;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Errors a transport can raise. Distinct from `conduit_core::McpError`
/// because these never cross the wire as JSON-RPC error objects; they
/// describe the channel itself failing, not a request being rejected.
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    #[error("connection closed")]
    Closed,
    #[error("send failed: {0}")]
    SendFailed(String),
    #[error("receive failed: {0}")]
    ReceiveFailed(String),
    #[error("message violates stdio framing: {0}")]
    FramingViolation(String),
    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportType {
    Stdio,
    Http,
    InMemory,
}

impl From<TransportType> for conduit_core::TransportType {
    fn from(value: TransportType) -> Self {
        match value {
            TransportType::Stdio => Self::Stdio,
            TransportType::Http => Self::Http,
            TransportType::InMemory => Self::InMemory,
        }
    }
}

/// Connection lifecycle. Transports with no explicit connect phase (stdio,
/// in-memory) move directly from `Disconnected` to `Connected`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
    Failed { reason: String },
}

/// Static properties of a transport, used by the server to decide which
/// protocol allowances apply (e.g. SSE keep-alive, HTTP response headers).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportCapabilities {
    pub max_message_size: Option<usize>,
    pub supports_bidirectional: bool,
    pub supports_multiple_sessions: bool,
}

impl TransportCapabilities {
    #[must_use]
    pub const fn stdio() -> Self {
        Self {
            max_message_size: Some(16 * 1024 * 1024),
            supports_bidirectional: true,
            supports_multiple_sessions: false,
        }
    }

    #[must_use]
    pub const fn http() -> Self {
        Self {
            max_message_size: Some(16 * 1024 * 1024),
            supports_bidirectional: true,
            supports_multiple_sessions: true,
        }
    }

    #[must_use]
    pub const fn in_memory() -> Self {
        Self {
            max_message_size: None,
            supports_bidirectional: true,
            supports_multiple_sessions: true,
        }
    }
}

/// One logical peer connection. A transport implementation produces and
/// consumes `Message`s for exactly one session; multi-session transports
/// (HTTP+SSE) create one `Transport` instance per accepted connection.
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    fn transport_type(&self) -> TransportType;

    fn capabilities(&self) -> &TransportCapabilities;

    async fn state(&self) -> TransportState;

    /// Send one message to the peer.
    async fn send(&self, message: Message) -> TransportResult<()>;

    /// Receive the next message from the peer, or `None` once the peer has
    /// closed the connection cleanly.
    async fn recv(&self) -> TransportResult<Option<Message>>;

    /// Close the transport. Idempotent: closing an already-closed
    /// transport is not an error.
    async fn close(&self) -> TransportResult<()>;

    async fn is_connected(&self) -> bool {
        matches!(self.state().await, TransportState::Connected)
    }
}
