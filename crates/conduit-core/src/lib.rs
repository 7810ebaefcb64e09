//! Core types shared by every crate in the conduit MCP workspace: the
//! JSON-RPC message envelope, the unified error type, per-request context,
//! and the small set of protocol-wide constants (supported versions, log
//! levels) that don't belong to any one layer.

pub mod context;
pub mod error;
pub mod message;

pub use context::{RequestContext, TransportType};
pub use error::{ErrorKind, McpError, McpResult, RpcError};
pub use message::{decode, encode, Message, Params, RequestId, ResponsePayload, JSONRPC_VERSION};

/// Protocol versions this runtime understands, newest first. The first
/// entry is offered whenever a peer doesn't constrain negotiation.
pub const SUPPORTED_VERSIONS: &[&str] = &["2025-06-18", "2025-03-26", "2024-11-05"];

/// The version offered by default and used when a client omits one.
pub const DEFAULT_PROTOCOL_VERSION: &str = SUPPORTED_VERSIONS[0];

/// RFC-5424 syslog severity levels, ordered most-severe first. `Ord`
/// follows declaration order, so `Level::Error < Level::Debug` holds and a
/// session's configured threshold can be compared directly against an
/// emitted level with `<=`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Emergency,
    Alert,
    Critical,
    Error,
    Warning,
    Notice,
    Info,
    Debug,
}

impl LogLevel {
    /// The default threshold a session starts with before `logging/setLevel`.
    #[must_use]
    pub const fn default_threshold() -> Self {
        Self::Error
    }

    /// Whether a message emitted at `self` should be delivered to a
    /// subscriber whose configured threshold is `threshold`.
    #[must_use]
    pub fn passes(self, threshold: Self) -> bool {
        self <= threshold
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Emergency => "emergency",
            Self::Alert => "alert",
            Self::Critical => "critical",
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Notice => "notice",
            Self::Info => "info",
            Self::Debug => "debug",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = McpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "emergency" => Ok(Self::Emergency),
            "alert" => Ok(Self::Alert),
            "critical" => Ok(Self::Critical),
            "error" => Ok(Self::Error),
            "warning" => Ok(Self::Warning),
            "notice" => Ok(Self::Notice),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            other => Err(McpError::invalid_params(format!("unknown log level: {other}"))),
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
