//! The MCP server runtime: session lifecycle, tool/prompt/resource
//! registries, subscription bookkeeping, and method dispatch for the
//! surface in `conduit_protocol::methods`.
//!
//! One [`McpServer`] can serve many concurrent sessions (one per accepted
//! transport connection); each session's push channel is registered with
//! [`McpServer::register_session`] and torn down with
//! [`McpServer::remove_session`].

pub mod config;
pub mod registry;
pub mod server;
pub mod session;
pub mod subscriptions;

pub use config::{ServerConfig, ServerConfigBuilder};
pub use registry::{PromptRegistry, ResourceRegistry, ToolRegistry};
pub use server::{McpServer, PromptHandler, ResourceReader, ToolHandler};
pub use session::{Session, SessionState};
pub use subscriptions::SubscriptionRegistry;
