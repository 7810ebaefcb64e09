//! The MCP client: drives the handshake over a [`Transport`], exposes
//! typed calls for the method surface in `conduit_protocol`, and routes
//! server push notifications to callbacks registered through
//! [`SubscriptionRegistry`].
//!
//! One [`McpClient`] owns one [`RpcRuntime`]. Two background tasks run for
//! the lifetime of the client: the receive loop (demultiplexes inbound
//! messages, dispatching notifications and failing unexpected inbound
//! requests) and the handshake (runs once, moving the session from
//! `Disconnected` through `Initializing` to `Ready` or `Error`).

use std::sync::Arc;
use std::time::Duration;

use conduit_core::{McpError, Message, ResponsePayload};
use conduit_protocol::{
    methods, CallToolRequest, CallToolResult, GetPromptRequest, GetPromptResult, InitializeRequest,
    InitializeResult, ListPromptsResult, ListResourcesRequest, ListResourcesResult, ListToolsResult,
    LoggingMessageNotification, ResourceUpdatedNotification, SetLevelRequest, SubscribeRequest, Tool,
    UnsubscribeRequest,
};
use conduit_transport::{Demux, RpcRuntime, Transport};
use parking_lot::RwLock;

use crate::config::ClientConfig;
use crate::session::{ClientSession, ClientState};
use crate::subscriptions::{
    ChangedCallback, LogCallback, ResourceCallback, SubscriptionId, SubscriptionRegistry,
};

/// A handle returned by the `subscribe_*` family. Dropping it does **not**
/// unsubscribe — call `unsubscribe()` explicitly, matching the source
/// API's "returns an unsubscribe handle" rather than RAII semantics.
pub struct Unsubscribe<T: Transport> {
    client: Arc<McpClient<T>>,
    id: SubscriptionId,
}

impl<T: Transport> Unsubscribe<T> {
    pub fn unsubscribe(self) {
        self.client.subscriptions.remove(self.id);
    }
}

pub struct McpClient<T: Transport> {
    runtime: Arc<RpcRuntime<T>>,
    config: ClientConfig,
    session: RwLock<ClientSession>,
    subscriptions: SubscriptionRegistry,
    tool_cache: RwLock<Option<Vec<Tool>>>,
}

impl<T: Transport + 'static> McpClient<T> {
    /// Construct the transport wrapper, the session, and start the
    /// handshake asynchronously. Returns immediately in `Disconnected`;
    /// callers await readiness with [`Self::wait_for_ready`].
    #[must_use]
    pub fn connect(transport: T, config: ClientConfig) -> Arc<Self> {
        let client = Arc::new(Self {
            runtime: Arc::new(RpcRuntime::new(transport)),
            config,
            session: RwLock::new(ClientSession::new()),
            subscriptions: SubscriptionRegistry::new(),
            tool_cache: RwLock::new(None),
        });

        let recv_client = client.clone();
        tokio::spawn(async move { recv_client.recv_loop().await });

        let handshake_client = client.clone();
        tokio::spawn(async move { handshake_client.handshake().await });

        client
    }

    #[must_use]
    pub fn state(&self) -> ClientState {
        self.session.read().state()
    }

    #[must_use]
    pub fn server_info(&self) -> Option<conduit_protocol::Implementation> {
        self.session.read().server_info.clone()
    }

    #[must_use]
    pub fn negotiated_version(&self) -> Option<String> {
        self.session.read().negotiated_version.clone()
    }

    /// Poll the session state until it reaches `Ready`, surfaces the stored
    /// handshake error, or `timeout` elapses.
    ///
    /// # Errors
    /// The handshake's own `McpError` if the session moved to `Error`, or
    /// `ErrorKind::Timeout` if `timeout` elapses first.
    pub async fn wait_for_ready(&self, timeout: Duration) -> Result<(), McpError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match self.state() {
                ClientState::Ready => return Ok(()),
                ClientState::Error => {
                    let err = self
                        .session
                        .read()
                        .error_info
                        .clone()
                        .unwrap_or_else(|| McpError::internal("handshake failed"));
                    return Err(err);
                }
                _ => {}
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(McpError::timeout());
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    async fn handshake(self: Arc<Self>) {
        if self.session.write().transition(ClientState::Initializing).is_err() {
            return;
        }

        let requested = self.config.requested_version().to_string();
        let request = InitializeRequest {
            protocol_version: requested.clone(),
            capabilities: self.config.capabilities.clone(),
            client_info: self.config.client_info.clone(),
        };
        let params = match serde_json::to_value(&request) {
            Ok(value) => value,
            Err(err) => {
                self.session.write().fail(McpError::from(err));
                return;
            }
        };

        let result = self
            .runtime
            .call(methods::INITIALIZE, Some(params), self.config.request_timeout)
            .await
            .and_then(|value| serde_json::from_value::<InitializeResult>(value).map_err(McpError::from));

        let result = match result {
            Ok(result) if result.protocol_version != requested => Err(McpError::unsupported_protocol_version(
                &requested,
                &result.protocol_version,
            )),
            other => other,
        };

        match result {
            Ok(result) => {
                {
                    let mut session = self.session.write();
                    session.server_info = Some(result.server_info);
                    session.server_capabilities = Some(result.capabilities);
                    session.negotiated_version = Some(result.protocol_version);
                }
                if let Err(err) = self.runtime.notify(methods::NOTIFICATIONS_INITIALIZED, None).await {
                    self.session.write().fail(err);
                    return;
                }
                let _ = self.session.write().transition(ClientState::Ready);
            }
            Err(err) => self.session.write().fail(err),
        }
    }

    async fn recv_loop(self: Arc<Self>) {
        loop {
            match self.runtime.recv_demux().await {
                Ok(Some(Demux::Inbound(Message::Notification { method, params }))) => {
                    self.dispatch_notification(&method, params.into_value());
                }
                Ok(Some(Demux::Inbound(Message::Request { id, .. }))) => {
                    // This client does not implement any server-initiated
                    // request surface; the notification family above is
                    // the entirety of server push it understands.
                    let err = McpError::method_not_found("client does not accept server-initiated requests");
                    let _ = self.runtime.respond(id, ResponsePayload::Error((&err).into())).await;
                }
                // The runtime never surfaces a Response as Inbound; it consumes
                // those itself and yields Completed. Kept for exhaustiveness.
                Ok(Some(Demux::Inbound(Message::Response { .. }))) => {}
                Ok(Some(Demux::Completed)) => {}
                Ok(None) | Err(_) => break,
            }
        }
        self.runtime.fail_all_pending();
    }

    fn dispatch_notification(&self, method: &str, params: serde_json::Value) {
        match method {
            methods::NOTIFICATIONS_RESOURCES_UPDATED => {
                if let Ok(notification) = serde_json::from_value::<ResourceUpdatedNotification>(params) {
                    self.subscriptions.dispatch_resource_updated(notification);
                }
            }
            methods::NOTIFICATIONS_MESSAGE => {
                if let Ok(notification) = serde_json::from_value::<LoggingMessageNotification>(params) {
                    self.subscriptions.dispatch_log(notification);
                }
            }
            methods::NOTIFICATIONS_TOOLS_LIST_CHANGED => {
                *self.tool_cache.write() = None;
                self.subscriptions.dispatch_tools_changed();
            }
            methods::NOTIFICATIONS_PROMPTS_LIST_CHANGED => {
                self.subscriptions.dispatch_prompts_changed();
            }
            other => tracing::debug!(method = other, "unhandled server notification"),
        }
    }

    async fn call<R: serde::de::DeserializeOwned>(&self, method: &str, params: serde_json::Value) -> Result<R, McpError> {
        let value = self.runtime.call(method, Some(params), self.config.request_timeout).await?;
        serde_json::from_value(value).map_err(McpError::from)
    }

    // -- request API ------------------------------------------------------

    /// # Errors
    /// Transport-closed, timeout, or the server's own RPC error.
    pub async fn call_tool(&self, name: &str, arguments: Option<serde_json::Map<String, serde_json::Value>>) -> Result<CallToolResult, McpError> {
        let request = CallToolRequest { name: name.to_string(), arguments };
        self.call(methods::TOOLS_CALL, serde_json::to_value(request)?).await
    }

    /// # Errors
    /// Transport-closed, timeout, or the server's own RPC error.
    pub async fn list_tools(&self) -> Result<ListToolsResult, McpError> {
        let result: ListToolsResult = self.call(methods::TOOLS_LIST, serde_json::json!({})).await?;
        *self.tool_cache.write() = Some(result.tools.clone());
        Ok(result)
    }

    /// Whether a tool named `name` is available. Uses the cached
    /// `tools/list` result if present; otherwise issues the call and caches
    /// the answer. Returns `false` on a server error rather than
    /// propagating it, per the source's `available-tools?` contract.
    pub async fn available_tool(&self, name: &str) -> bool {
        let cached = self.tool_cache.read().clone();
        let tools = match cached {
            Some(tools) => tools,
            None => match self.list_tools().await {
                Ok(result) => result.tools,
                Err(_) => return false,
            },
        };
        tools.iter().any(|tool| tool.name == name)
    }

    /// # Errors
    /// Transport-closed, timeout, or the server's own RPC error.
    pub async fn list_prompts(&self) -> Result<ListPromptsResult, McpError> {
        self.call(methods::PROMPTS_LIST, serde_json::json!({})).await
    }

    /// # Errors
    /// Transport-closed, timeout, or the server's own RPC error.
    pub async fn get_prompt(&self, name: &str, arguments: Option<std::collections::HashMap<String, String>>) -> Result<GetPromptResult, McpError> {
        let request = GetPromptRequest { name: name.to_string(), arguments };
        self.call(methods::PROMPTS_GET, serde_json::to_value(request)?).await
    }

    /// # Errors
    /// Transport-closed, timeout, or the server's own RPC error.
    pub async fn list_resources(&self, cursor: Option<String>) -> Result<ListResourcesResult, McpError> {
        let request = ListResourcesRequest { cursor };
        self.call(methods::RESOURCES_LIST, serde_json::to_value(request)?).await
    }

    /// # Errors
    /// Transport-closed, timeout, or the server's own RPC error.
    pub async fn read_resource(&self, uri: &str) -> Result<conduit_protocol::ReadResourceResult, McpError> {
        let request = conduit_protocol::ReadResourceRequest { uri: uri.to_string() };
        self.call(methods::RESOURCES_READ, serde_json::to_value(request)?).await
    }

    /// Validates `level` against the 8 RFC-5424 names before sending.
    ///
    /// # Errors
    /// `ErrorKind::InvalidParams` for an unrecognized level name, otherwise
    /// whatever the call itself fails with.
    pub async fn set_log_level(&self, level: &str) -> Result<(), McpError> {
        let level: conduit_core::LogLevel = level.parse()?;
        let request = SetLevelRequest { level };
        let _: serde_json::Value = self.call(methods::LOGGING_SET_LEVEL, serde_json::to_value(request)?).await?;
        Ok(())
    }

    // -- subscriptions ------------------------------------------------------

    /// Registers `callback` locally, then sends `resources/subscribe`. If
    /// the request fails the local registration is rolled back.
    ///
    /// # Errors
    /// Transport-closed, timeout, or the server's own RPC error (including
    /// `-32602` if the server declares no `resources.subscribe` capability).
    pub async fn subscribe_resource(self: &Arc<Self>, uri: &str, callback: ResourceCallback) -> Result<Unsubscribe<T>, McpError> {
        let id = self.subscriptions.add_resource(uri, callback);
        let request = SubscribeRequest { uri: uri.to_string() };
        if let Err(err) = self.call::<serde_json::Value>(methods::RESOURCES_SUBSCRIBE, serde_json::to_value(request)?).await {
            self.subscriptions.remove(id);
            return Err(err);
        }
        Ok(Unsubscribe { client: self.clone(), id })
    }

    /// # Errors
    /// Transport-closed, timeout, or the server's own RPC error.
    pub async fn unsubscribe_resource(&self, uri: &str) -> Result<(), McpError> {
        let request = UnsubscribeRequest { uri: uri.to_string() };
        let _: serde_json::Value = self.call(methods::RESOURCES_UNSUBSCRIBE, serde_json::to_value(request)?).await?;
        Ok(())
    }

    #[must_use]
    pub fn subscribe_log_messages(self: &Arc<Self>, callback: LogCallback) -> Unsubscribe<T> {
        let id = self.subscriptions.add_log(callback);
        Unsubscribe { client: self.clone(), id }
    }

    #[must_use]
    pub fn subscribe_tools_changed(self: &Arc<Self>, callback: ChangedCallback) -> Unsubscribe<T> {
        let id = self.subscriptions.add_tools_changed(callback);
        Unsubscribe { client: self.clone(), id }
    }

    #[must_use]
    pub fn subscribe_prompts_changed(self: &Arc<Self>, callback: ChangedCallback) -> Unsubscribe<T> {
        let id = self.subscriptions.add_prompts_changed(callback);
        Unsubscribe { client: self.clone(), id }
    }

    /// # Errors
    /// Transport-closed, timeout, or the server's own RPC error.
    pub async fn ping(&self) -> Result<(), McpError> {
        let _: serde_json::Value = self.call(methods::PING, serde_json::json!({})).await?;
        Ok(())
    }

    /// Transition to `Disconnected`, fail every outstanding request with a
    /// transport-closed error, drop every subscription, and close the
    /// transport. Safe to call more than once.
    pub async fn close(&self) {
        {
            let mut session = self.session.write();
            let _ = session.transition(ClientState::Disconnected);
        }
        self.runtime.fail_all_pending();
        self.subscriptions.clear();
        let _ = self.runtime.transport().close().await;
    }

}
