//! Server configuration: protocol negotiation mode, worker pool sizing,
//! request deadlines, and declared capabilities.

use std::time::Duration;

use conduit_protocol::{Implementation, NegotiationMode, ServerCapabilities};

pub const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 64;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub server_info: Implementation,
    pub capabilities: ServerCapabilities,
    pub negotiation_mode: NegotiationMode,
    /// Bound on concurrently in-flight requests; enforced by a
    /// `tokio::sync::Semaphore` in the dispatch loop. A request that can't
    /// acquire a permit is rejected with `-32000` rather than queued
    /// unboundedly.
    pub max_concurrent_requests: usize,
    pub request_timeout: Duration,
    pub max_message_size: usize,
}

impl ServerConfig {
    #[must_use]
    pub fn builder(name: impl Into<String>, version: impl Into<String>) -> ServerConfigBuilder {
        ServerConfigBuilder::new(name, version)
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfigBuilder {
    server_info: Implementation,
    capabilities: ServerCapabilities,
    negotiation_mode: NegotiationMode,
    max_concurrent_requests: usize,
    request_timeout: Duration,
    max_message_size: usize,
}

impl ServerConfigBuilder {
    #[must_use]
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            server_info: Implementation {
                name: name.into(),
                version: version.into(),
                title: None,
            },
            capabilities: ServerCapabilities::default(),
            negotiation_mode: NegotiationMode::default(),
            max_concurrent_requests: DEFAULT_MAX_CONCURRENT_REQUESTS,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }

    #[must_use]
    pub fn capabilities(mut self, capabilities: ServerCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// A human-facing display name, distinct from the machine-readable
    /// `name`. Only surfaced to clients negotiating the newest protocol
    /// version; see `conduit_protocol::versioning::format_server_info`.
    #[must_use]
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.server_info.title = Some(title.into());
        self
    }

    #[must_use]
    pub fn negotiation_mode(mut self, mode: NegotiationMode) -> Self {
        self.negotiation_mode = mode;
        self
    }

    #[must_use]
    pub fn max_concurrent_requests(mut self, max: usize) -> Self {
        self.max_concurrent_requests = max;
        self
    }

    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    #[must_use]
    pub fn build(self) -> ServerConfig {
        ServerConfig {
            server_info: self.server_info,
            capabilities: self.capabilities,
            negotiation_mode: self.negotiation_mode,
            max_concurrent_requests: self.max_concurrent_requests,
            request_timeout: self.request_timeout,
            max_message_size: self.max_message_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_applies_defaults() {
        let config = ServerConfig::builder("demo", "0.1.0").build();
        assert_eq!(config.max_concurrent_requests, DEFAULT_MAX_CONCURRENT_REQUESTS);
        assert_eq!(config.request_timeout, DEFAULT_REQUEST_TIMEOUT);
        assert_eq!(config.negotiation_mode, NegotiationMode::Lenient);
    }

    #[test]
    fn builder_overrides_take_effect() {
        let config = ServerConfig::builder("demo", "0.1.0")
            .max_concurrent_requests(8)
            .request_timeout(Duration::from_secs(5))
            .negotiation_mode(NegotiationMode::Strict)
            .build();
        assert_eq!(config.max_concurrent_requests, 8);
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.negotiation_mode, NegotiationMode::Strict);
    }
}
