//! Client configuration: identity advertised during the handshake, the
//! capabilities this client declares, the protocol version to request, and
//! the deadline applied to every outgoing call. Builder shape mirrors
//! `conduit_server::config::ServerConfigBuilder`.

use std::time::Duration;

use conduit_protocol::{ClientCapabilities, Implementation};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub client_info: Implementation,
    pub capabilities: ClientCapabilities,
    /// Protocol version requested during `initialize`. `None` requests
    /// `conduit_core::DEFAULT_PROTOCOL_VERSION`.
    pub protocol_version: Option<String>,
    pub request_timeout: Duration,
}

impl ClientConfig {
    #[must_use]
    pub fn builder(name: impl Into<String>, version: impl Into<String>) -> ClientConfigBuilder {
        ClientConfigBuilder::new(name, version)
    }

    #[must_use]
    pub fn requested_version(&self) -> &str {
        self.protocol_version
            .as_deref()
            .unwrap_or(conduit_core::DEFAULT_PROTOCOL_VERSION)
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfigBuilder {
    client_info: Implementation,
    capabilities: ClientCapabilities,
    protocol_version: Option<String>,
    request_timeout: Duration,
}

impl ClientConfigBuilder {
    #[must_use]
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            client_info: Implementation {
                name: name.into(),
                version: version.into(),
                title: None,
            },
            capabilities: ClientCapabilities::default(),
            protocol_version: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    #[must_use]
    pub fn capabilities(mut self, capabilities: ClientCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    #[must_use]
    pub fn protocol_version(mut self, version: impl Into<String>) -> Self {
        self.protocol_version = Some(version.into());
        self
    }

    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn build(self) -> ClientConfig {
        ClientConfig {
            client_info: self.client_info,
            capabilities: self.capabilities,
            protocol_version: self.protocol_version,
            request_timeout: self.request_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_applies_defaults() {
        let config = ClientConfig::builder("demo-client", "0.1.0").build();
        assert_eq!(config.request_timeout, DEFAULT_REQUEST_TIMEOUT);
        assert_eq!(config.requested_version(), conduit_core::DEFAULT_PROTOCOL_VERSION);
    }

    #[test]
    fn builder_overrides_take_effect() {
        let config = ClientConfig::builder("demo-client", "0.1.0")
            .protocol_version("2024-11-05")
            .request_timeout(Duration::from_secs(5))
            .build();
        assert_eq!(config.requested_version(), "2024-11-05");
        assert_eq!(config.request_timeout, Duration::from_secs(5));
    }
}
