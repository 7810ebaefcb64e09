//! Protocol version negotiation.
//!
//! The server always knows the full set of versions it understands
//! ([`conduit_core::SUPPORTED_VERSIONS`]). A client states the version it
//! wants in `initialize`; the server either echoes it back (exact match) or
//! falls back to its own newest supported version, logging the fallback so
//! an operator can see when a peer is speaking an older dialect.
//!
//! Lenient mode (the default) always negotiates to something. Strict mode
//! is for deployments that would rather fail a handshake than silently
//! downgrade; it returns `-32001 unsupported_protocol_version` instead.

use conduit_core::{ErrorKind, McpError, SUPPORTED_VERSIONS};

use crate::types::{CallToolResult, Content, Implementation, ServerCapabilities};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationMode {
    Lenient,
    Strict,
}

impl Default for NegotiationMode {
    fn default() -> Self {
        Self::Lenient
    }
}

/// Negotiate a protocol version for a session given what the client asked
/// for. Returns the version to use, or an error in strict mode when the
/// client's request can't be honored exactly.
///
/// # Errors
/// Returns `McpError` with [`ErrorKind::UnsupportedProtocolVersion`] in
/// strict mode when `requested` is not in [`SUPPORTED_VERSIONS`].
pub fn negotiate(requested: Option<&str>, mode: NegotiationMode) -> Result<&'static str, McpError> {
    let newest = SUPPORTED_VERSIONS[0];

    let Some(requested) = requested else {
        return Ok(newest);
    };

    if let Some(&version) = SUPPORTED_VERSIONS.iter().find(|&&v| v == requested) {
        return Ok(version);
    }

    match mode {
        NegotiationMode::Lenient => {
            tracing::warn!(
                client_version = requested,
                negotiated_version = newest,
                supported = ?SUPPORTED_VERSIONS,
                "protocol version fallback: client requested an unsupported version"
            );
            Ok(newest)
        }
        NegotiationMode::Strict => Err(McpError::new(
            ErrorKind::UnsupportedProtocolVersion,
            format!(
                "unsupported protocol version: requested {requested}, supported {SUPPORTED_VERSIONS:?}"
            ),
        )),
    }
}

/// Whether a negotiated version allows `structuredContent` in
/// `CallToolResult`. Only the newest protocol revision defines the field;
/// older peers would reject an unexpected key on strict schema validation.
#[must_use]
pub fn supports_structured_content(version: &str) -> bool {
    version == "2025-06-18"
}

/// Whether a negotiated version supports the `audio` content block variant,
/// added alongside structured content in the same revision.
#[must_use]
pub fn supports_audio_content(version: &str) -> bool {
    version == "2025-06-18"
}

/// Strip fields a negotiated version doesn't define from `InitializeResult`'s
/// `serverInfo`. Only the newest version defines `title`.
#[must_use]
pub fn format_server_info(mut info: Implementation, version: &str) -> Implementation {
    if version != "2025-06-18" {
        info.title = None;
    }
    info
}

/// Reshape the capabilities object for the negotiated version: newer
/// versions permit nested option maps (`tools: {listChanged: true}`),
/// older versions flatten every declared sub-capability to `{}`. A
/// sub-capability that was never declared (`None`) stays absent either way.
#[must_use]
pub fn format_capabilities(mut capabilities: ServerCapabilities, version: &str) -> ServerCapabilities {
    if version == "2025-06-18" {
        return capabilities;
    }
    if capabilities.tools.is_some() {
        capabilities.tools = Some(crate::types::ToolsCapability::default());
    }
    if capabilities.prompts.is_some() {
        capabilities.prompts = Some(crate::types::PromptsCapability::default());
    }
    if let Some(resources) = capabilities.resources {
        // `subscribe` gates a whole method pair, not just a list-changed
        // notification, so it survives flattening; only `listChanged` is
        // the part that's new wire shape, not new behavior.
        capabilities.resources = Some(crate::types::ResourcesCapability {
            subscribe: resources.subscribe,
            list_changed: None,
        });
    }
    capabilities
}

/// Drop parts of a tool result the negotiated version doesn't define:
/// `structuredContent` entirely, and any `audio` content block (replaced
/// with nothing — the remaining content blocks, if any, still convey the
/// result).
#[must_use]
pub fn format_call_tool_result(mut result: CallToolResult, version: &str) -> CallToolResult {
    if !supports_structured_content(version) {
        result.structured_content = None;
    }
    if !supports_audio_content(version) {
        result.content.retain(|block| !matches!(block, Content::Audio { .. }));
    }
    result
}
