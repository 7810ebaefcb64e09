//! MCP application-layer types and rules built on top of the transport-
//! agnostic JSON-RPC envelope in `conduit-core`: capability negotiation,
//! protocol version handling, and the request/result shapes for the
//! tools/prompts/resources/logging method surface.

pub mod capabilities;
pub mod methods;
pub mod types;
pub mod versioning;

pub use capabilities::CapabilitySet;
pub use types::{
    CallToolRequest, CallToolResult, ClientCapabilities, Content, GetPromptRequest,
    GetPromptResult, Implementation, InitializeRequest, InitializeResult, ListPromptsResult,
    ListResourcesRequest, ListResourcesResult, ListToolsResult, LoggingMessageNotification,
    Prompt, PromptArgument, PromptMessage, ReadResourceRequest, ReadResourceResult, Resource,
    ResourceContents, ResourceUpdatedNotification, Role, ServerCapabilities, SetLevelRequest,
    SubscribeRequest, Tool, UnsubscribeRequest,
};
pub use versioning::{
    format_call_tool_result, format_capabilities, format_server_info, negotiate, NegotiationMode,
};
