//! Per-request context threaded through handlers: which transport and
//! session a request arrived on, plus free-form metadata a server can
//! attach for its own use (tracing span fields, auth principal, etc).

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

/// Which transport a session is bound to. Determines framing and a few
/// protocol-level allowances (e.g. HTTP-only response headers).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportType {
    Stdio,
    Http,
    InMemory,
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Stdio => "stdio",
            Self::Http => "http",
            Self::InMemory => "in_memory",
        };
        f.write_str(s)
    }
}

/// Context attached to every inbound request as it is routed to a handler.
#[derive(Debug, Clone)]
pub struct RequestContext {
    session_id: String,
    transport: TransportType,
    metadata: BTreeMap<String, Value>,
}

impl RequestContext {
    #[must_use]
    pub fn new(session_id: impl Into<String>, transport: TransportType) -> Self {
        Self {
            session_id: session_id.into(),
            transport,
            metadata: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    #[must_use]
    pub fn transport(&self) -> TransportType {
        self.transport
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn metadata(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    pub fn set_metadata(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.metadata.insert(key.into(), value.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_round_trips_metadata() {
        let ctx = RequestContext::new("sess-1", TransportType::Http)
            .with_metadata("peer_addr", "127.0.0.1:1234");
        assert_eq!(ctx.session_id(), "sess-1");
        assert_eq!(ctx.transport(), TransportType::Http);
        assert_eq!(
            ctx.metadata("peer_addr"),
            Some(&Value::String("127.0.0.1:1234".to_string()))
        );
        assert_eq!(ctx.metadata("missing"), None);
    }

    #[test]
    fn set_metadata_overwrites() {
        let mut ctx = RequestContext::new("sess-1", TransportType::Stdio);
        ctx.set_metadata("k", 1);
        ctx.set_metadata("k", 2);
        assert_eq!(ctx.metadata("k"), Some(&Value::from(2)));
    }

    #[test]
    fn transport_display() {
        assert_eq!(TransportType::Stdio.to_string(), "stdio");
        assert_eq!(TransportType::Http.to_string(), "http");
        assert_eq!(TransportType::InMemory.to_string(), "in_memory");
    }
}
