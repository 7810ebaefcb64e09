//! MCP client runtime: drives the `initialize` handshake over any
//! [`conduit_transport::Transport`], exposes typed calls for the tools,
//! prompts, resources, and logging method surface, and routes server push
//! notifications to callbacks registered through a subscription registry.
//!
//! A client owns exactly one [`conduit_transport::RpcRuntime`] and one
//! session. Construct with [`McpClient::connect`], then await
//! [`McpClient::wait_for_ready`] before issuing calls.

pub mod client;
pub mod config;
pub mod session;
pub mod subscriptions;

pub use client::{McpClient, Unsubscribe};
pub use config::{ClientConfig, ClientConfigBuilder, DEFAULT_REQUEST_TIMEOUT};
pub use session::{ClientSession, ClientState};
pub use subscriptions::{ChangedCallback, LogCallback, ResourceCallback, SubscriptionId, SubscriptionRegistry};
