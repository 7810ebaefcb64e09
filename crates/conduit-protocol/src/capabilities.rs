//! Capability negotiation helpers. The MCP handshake is declarative, not
//! transactional: client and server each state what they support in
//! `initialize`, and the effective feature set is just the intersection.
//! This module gives that intersection a name so server/client code can ask
//! "is resource subscription usable on this session" instead of
//! hand-rolling the same `Option::is_some` checks everywhere.

use crate::types::{ClientCapabilities, ServerCapabilities};

/// The capability intersection in effect for one negotiated session.
#[derive(Debug, Clone)]
pub struct CapabilitySet {
    pub client: ClientCapabilities,
    pub server: ServerCapabilities,
}

impl CapabilitySet {
    #[must_use]
    pub fn new(client: ClientCapabilities, server: ServerCapabilities) -> Self {
        Self { client, server }
    }

    /// Resource subscription requires the server to advertise it; the
    /// client side of the feature has no capability flag of its own.
    #[must_use]
    pub fn resources_subscribe(&self) -> bool {
        self.server
            .resources
            .as_ref()
            .and_then(|r| r.subscribe)
            .unwrap_or(false)
    }

    #[must_use]
    pub fn tools_list_changed(&self) -> bool {
        self.server
            .tools
            .as_ref()
            .and_then(|t| t.list_changed)
            .unwrap_or(false)
    }

    #[must_use]
    pub fn prompts_list_changed(&self) -> bool {
        self.server
            .prompts
            .as_ref()
            .and_then(|p| p.list_changed)
            .unwrap_or(false)
    }

    #[must_use]
    pub fn resources_list_changed(&self) -> bool {
        self.server
            .resources
            .as_ref()
            .and_then(|r| r.list_changed)
            .unwrap_or(false)
    }

    #[must_use]
    pub fn logging(&self) -> bool {
        self.server.logging.is_some()
    }

    #[must_use]
    pub fn roots_list_changed(&self) -> bool {
        self.client
            .roots
            .as_ref()
            .and_then(|r| r.list_changed)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{LoggingCapability, ResourcesCapability};

    #[test]
    fn resources_subscribe_defaults_false_when_capability_absent() {
        let set = CapabilitySet::new(ClientCapabilities::default(), ServerCapabilities::default());
        assert!(!set.resources_subscribe());
    }

    #[test]
    fn resources_subscribe_true_when_advertised() {
        let server = ServerCapabilities {
            resources: Some(ResourcesCapability {
                subscribe: Some(true),
                list_changed: Some(true),
            }),
            ..Default::default()
        };
        let set = CapabilitySet::new(ClientCapabilities::default(), server);
        assert!(set.resources_subscribe());
        assert!(set.resources_list_changed());
    }

    #[test]
    fn logging_capability_presence() {
        let server = ServerCapabilities {
            logging: Some(LoggingCapability {}),
            ..Default::default()
        };
        let set = CapabilitySet::new(ClientCapabilities::default(), server);
        assert!(set.logging());
    }
}
