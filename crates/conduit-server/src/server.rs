//! Method dispatch: turns one inbound [`Message`] into zero or one
//! responses, plus whatever server-push notifications a handler's side
//! effects provoke (a `tools/call` that adds a tool fires
//! `notifications/tools/list_changed` to every subscribed session, not just
//! the caller).
//!
//! Concurrency: each inbound request first acquires a permit from a bounded
//! `tokio::sync::Semaphore` sized by `ServerConfig::max_concurrent_requests`.
//! A request that can't get a permit immediately is rejected with
//! `-32000 server_overloaded` rather than queued, so load sheds instead of
//! backing up unboundedly.

use std::sync::Arc;

use conduit_core::{Message, McpError, RequestId, ResponsePayload, TransportType};
use conduit_protocol::{
    methods, CallToolRequest, CallToolResult, GetPromptRequest, GetPromptResult, Implementation,
    InitializeRequest, InitializeResult, ListPromptsResult, ListResourcesRequest,
    ListResourcesResult, ListToolsResult, LoggingMessageNotification, Prompt, ReadResourceRequest,
    ReadResourceResult, Resource, ResourceUpdatedNotification, SetLevelRequest, SubscribeRequest,
    Tool, UnsubscribeRequest,
};
use dashmap::DashMap;
use tokio::sync::{mpsc, Semaphore};

use crate::config::ServerConfig;
use crate::registry::{PromptRegistry, ResourceRegistry, ToolRegistry};
use crate::session::{Session, SessionState};
use crate::subscriptions::SubscriptionRegistry;

/// A callback a server asks to actually run a registered tool. Kept
/// trait-object-free (a boxed closure) since tool implementations are
/// supplied by the embedding application, not this crate.
pub type ToolHandler = Arc<dyn Fn(serde_json::Map<String, serde_json::Value>) -> CallToolResult + Send + Sync>;
pub type PromptHandler = Arc<dyn Fn(Option<std::collections::HashMap<String, String>>) -> GetPromptResult + Send + Sync>;
pub type ResourceReader = Arc<dyn Fn(&str) -> Option<ReadResourceResult> + Send + Sync>;

pub struct McpServer {
    config: ServerConfig,
    tools: ToolRegistry,
    tool_handlers: DashMap<String, ToolHandler>,
    prompts: PromptRegistry,
    prompt_handlers: DashMap<String, PromptHandler>,
    resources: ResourceRegistry,
    resource_reader: parking_lot::RwLock<Option<ResourceReader>>,
    subscriptions: SubscriptionRegistry,
    sessions: DashMap<String, Session>,
    outbound: DashMap<String, mpsc::Sender<Message>>,
    permits: Semaphore,
}

impl McpServer {
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        let permits = Semaphore::new(config.max_concurrent_requests);
        Self {
            config,
            tools: ToolRegistry::new(),
            tool_handlers: DashMap::new(),
            prompts: PromptRegistry::new(),
            prompt_handlers: DashMap::new(),
            resources: ResourceRegistry::new(),
            resource_reader: parking_lot::RwLock::new(None),
            subscriptions: SubscriptionRegistry::new(),
            sessions: DashMap::new(),
            outbound: DashMap::new(),
            permits,
        }
    }

    // -- session lifecycle ---------------------------------------------

    pub fn register_session(&self, session_id: impl Into<String>, transport: TransportType, sender: mpsc::Sender<Message>) {
        let session_id = session_id.into();
        self.sessions.insert(session_id.clone(), Session::new(session_id.clone(), transport));
        self.outbound.insert(session_id, sender);
    }

    /// Remove a session's state and scrub it from every subscription
    /// collection. Safe to call more than once for the same id.
    pub fn remove_session(&self, session_id: &str) {
        self.sessions.remove(session_id);
        self.outbound.remove(session_id);
        self.subscriptions.scrub_session(session_id);
    }

    // -- registries ------------------------------------------------------

    /// Register a tool and its handler, firing `notifications/tools/list_changed`
    /// to every subscribed session. Re-registering an existing name replaces
    /// it and still fires exactly one notification.
    pub async fn add_tool(&self, tool: Tool, handler: ToolHandler) {
        self.tool_handlers.insert(tool.name.clone(), handler);
        self.tools.add(tool);
        self.broadcast_list_changed(methods::NOTIFICATIONS_TOOLS_LIST_CHANGED, self.subscriptions.tools_list_changed_subscribers())
            .await;
    }

    pub async fn remove_tool(&self, name: &str) {
        self.tool_handlers.remove(name);
        if self.tools.remove(name) {
            self.broadcast_list_changed(methods::NOTIFICATIONS_TOOLS_LIST_CHANGED, self.subscriptions.tools_list_changed_subscribers())
                .await;
        }
    }

    pub async fn add_prompt(&self, prompt: Prompt, handler: PromptHandler) {
        self.prompt_handlers.insert(prompt.name.clone(), handler);
        self.prompts.add(prompt);
        self.broadcast_list_changed(methods::NOTIFICATIONS_PROMPTS_LIST_CHANGED, self.subscriptions.prompts_list_changed_subscribers())
            .await;
    }

    pub async fn remove_prompt(&self, name: &str) {
        self.prompt_handlers.remove(name);
        if self.prompts.remove(name) {
            self.broadcast_list_changed(methods::NOTIFICATIONS_PROMPTS_LIST_CHANGED, self.subscriptions.prompts_list_changed_subscribers())
                .await;
        }
    }

    pub fn add_resource(&self, resource: Resource) {
        self.resources.add(resource);
    }

    pub fn remove_resource(&self, uri: &str) {
        self.resources.remove(uri);
    }

    pub fn set_resource_reader(&self, reader: ResourceReader) {
        *self.resource_reader.write() = Some(reader);
    }

    /// Notify every subscriber of `uri` that its contents changed.
    pub async fn publish_resource_updated(&self, uri: &str) {
        let notification = Message::notification(
            methods::NOTIFICATIONS_RESOURCES_UPDATED,
            Some(serde_json::to_value(ResourceUpdatedNotification { uri: uri.to_string() }).unwrap()),
        );
        for session_id in self.subscriptions.resource_subscribers(uri) {
            self.send_to(&session_id, notification.clone()).await;
        }
    }

    /// Emit a log message to every connected session whose effective
    /// threshold admits `level`. Sessions that never called
    /// `logging/setLevel` still receive messages at the default threshold
    /// (`error` and more severe).
    pub async fn log_message(&self, level: conduit_core::LogLevel, logger: Option<String>, data: serde_json::Value) {
        let notification = Message::notification(
            methods::NOTIFICATIONS_MESSAGE,
            Some(serde_json::to_value(LoggingMessageNotification { level, data, logger }).unwrap()),
        );
        let session_ids: Vec<String> = self.sessions.iter().map(|entry| entry.key().clone()).collect();
        let targets = self
            .subscriptions
            .log_subscribers_for(level, session_ids.iter().map(String::as_str));
        for session_id in targets {
            self.send_to(&session_id, notification.clone()).await;
        }
    }

    async fn broadcast_list_changed(&self, method: &str, session_ids: Vec<String>) {
        let notification = Message::notification(method, None);
        for session_id in session_ids {
            self.send_to(&session_id, notification.clone()).await;
        }
    }

    /// Non-blocking push: a slow consumer never stalls fan-out to every
    /// other session. A full outbound queue terminates the offending
    /// session rather than backing up the sender.
    async fn send_to(&self, session_id: &str, message: Message) {
        let outcome = self.outbound.get(session_id).map(|sender| sender.try_send(message));
        match outcome {
            None | Some(Ok(())) => {}
            Some(Err(tokio::sync::mpsc::error::TrySendError::Closed(_))) => {
                tracing::debug!(session_id, "dropping push to session with closed outbound channel");
            }
            Some(Err(tokio::sync::mpsc::error::TrySendError::Full(_))) => {
                tracing::warn!(session_id, "outbound queue full, terminating slow session");
                self.remove_session(session_id);
            }
        }
    }

    // -- dispatch ----------------------------------------------------------

    /// Handle one inbound message for `session_id`. Returns the response to
    /// send back for a request, or `None` for a notification (which never
    /// receives a reply per JSON-RPC).
    pub async fn handle_message(&self, session_id: &str, message: Message) -> Option<Message> {
        match message {
            Message::Request { id, method, params } => {
                Some(self.handle_request(session_id, id, &method, params.into_value()).await)
            }
            Message::Notification { method, params } => {
                self.handle_notification(session_id, &method, params.into_value()).await;
                None
            }
            Message::Response { .. } => None,
        }
    }

    async fn handle_request(&self, session_id: &str, id: RequestId, method: &str, params: serde_json::Value) -> Message {
        let Ok(_permit) = self.permits.try_acquire() else {
            return Message::response_err(id, &McpError::server_overloaded());
        };

        if let Some(mut session) = self.sessions.get_mut(session_id) {
            if !session.allows(method) {
                return Message::response_err(id, &McpError::request_before_initialization(method));
            }
            drop(session);
        }

        let result = self.dispatch(session_id, method, params).await;
        match result {
            Ok(value) => Message::response_ok(id, value),
            Err(err) => Message::response_err(id, &err),
        }
    }

    async fn handle_notification(&self, session_id: &str, method: &str, params: serde_json::Value) {
        match method {
            methods::NOTIFICATIONS_INITIALIZED => {
                if let Some(mut session) = self.sessions.get_mut(session_id) {
                    let _ = session.transition(SessionState::Ready);
                }
            }
            methods::NOTIFICATIONS_CANCELLED => {
                tracing::debug!(session_id, ?params, "request cancelled");
            }
            other => tracing::debug!(session_id, method = other, "unhandled notification"),
        }
    }

    async fn dispatch(&self, session_id: &str, method: &str, params: serde_json::Value) -> Result<serde_json::Value, McpError> {
        match method {
            methods::INITIALIZE => self.handle_initialize(session_id, params),
            methods::PING => Ok(serde_json::json!({})),
            methods::TOOLS_LIST => Ok(serde_json::to_value(ListToolsResult {
                tools: self.tools.list(),
                next_cursor: None,
            })?),
            methods::TOOLS_CALL => self.handle_tools_call(session_id, params),
            methods::PROMPTS_LIST => Ok(serde_json::to_value(ListPromptsResult {
                prompts: self.prompts.list(),
                next_cursor: None,
            })?),
            methods::PROMPTS_GET => self.handle_prompts_get(params),
            methods::RESOURCES_LIST => {
                let _req: ListResourcesRequest = from_params(params)?;
                Ok(serde_json::to_value(ListResourcesResult {
                    resources: self.resources.list(),
                    next_cursor: None,
                })?)
            }
            methods::RESOURCES_READ => self.handle_resources_read(params),
            methods::RESOURCES_SUBSCRIBE => {
                self.require_resources_subscribe()?;
                let req: SubscribeRequest = from_params(params)?;
                self.require_known_resource(&req.uri)?;
                self.subscriptions.subscribe_resource(&req.uri, session_id);
                Ok(serde_json::json!({}))
            }
            methods::RESOURCES_UNSUBSCRIBE => {
                self.require_resources_subscribe()?;
                let req: UnsubscribeRequest = from_params(params)?;
                self.require_known_resource(&req.uri)?;
                self.subscriptions.unsubscribe_resource(&req.uri, session_id);
                Ok(serde_json::json!({}))
            }
            methods::LOGGING_SET_LEVEL => {
                if self.config.capabilities.logging.is_none() {
                    return Err(McpError::invalid_params("server does not declare the logging capability"));
                }
                let req: SetLevelRequest = from_params(params)?;
                self.subscriptions.set_log_level(session_id, req.level);
                Ok(serde_json::json!({}))
            }
            other => Err(McpError::method_not_found(other)),
        }
    }

    fn handle_initialize(&self, session_id: &str, params: serde_json::Value) -> Result<serde_json::Value, McpError> {
        let req: InitializeRequest = from_params(params)?;
        let negotiated = conduit_protocol::negotiate(Some(&req.protocol_version), self.config.negotiation_mode)?;

        if let Some(mut session) = self.sessions.get_mut(session_id) {
            session.transition(SessionState::Initializing)?;
            session.protocol_version = Some(negotiated.to_string());
            session.capabilities = Some(self.config.capabilities.clone());
        }

        Ok(serde_json::to_value(InitializeResult {
            protocol_version: negotiated.to_string(),
            capabilities: conduit_protocol::format_capabilities(self.config.capabilities.clone(), negotiated),
            server_info: conduit_protocol::format_server_info(self.config.server_info.clone(), negotiated),
            instructions: None,
        })?)
    }

    /// Resource subscription requires the server to have advertised
    /// `resources.subscribe: true` during `initialize`; nothing in the
    /// client's own declared capabilities gates this feature.
    fn require_resources_subscribe(&self) -> Result<(), McpError> {
        let subscribable = self
            .config
            .capabilities
            .resources
            .as_ref()
            .and_then(|r| r.subscribe)
            .unwrap_or(false);
        if subscribable {
            Ok(())
        } else {
            Err(McpError::invalid_params("server does not declare resources.subscribe"))
        }
    }

    /// Subscribing or unsubscribing on a uri the server never registered
    /// via `add_resource` is an invalid-params error, not a silent no-op.
    fn require_known_resource(&self, uri: &str) -> Result<(), McpError> {
        if self.resources.get(uri).is_some() {
            Ok(())
        } else {
            Err(McpError::invalid_params(format!("unknown resource: {uri}")))
        }
    }

    fn handle_tools_call(&self, session_id: &str, params: serde_json::Value) -> Result<serde_json::Value, McpError> {
        let req: CallToolRequest = from_params(params)?;
        let Some(handler) = self.tool_handlers.get(&req.name) else {
            return Err(McpError::invalid_params(format!("Unknown tool: {}", req.name))
                .with_data(serde_json::json!({"data": {"name": req.name}})));
        };
        let result = handler(req.arguments.unwrap_or_default());
        let version = self.negotiated_version(session_id);
        let result = conduit_protocol::format_call_tool_result(result, &version);
        Ok(serde_json::to_value(result)?)
    }

    /// The version negotiated for `session_id` at `initialize`, or the
    /// newest supported version if none was ever negotiated (defensive:
    /// every session reaches `ready`, which implies `initialize` already ran).
    fn negotiated_version(&self, session_id: &str) -> String {
        self.sessions
            .get(session_id)
            .and_then(|s| s.protocol_version.clone())
            .unwrap_or_else(|| conduit_core::DEFAULT_PROTOCOL_VERSION.to_string())
    }

    fn handle_prompts_get(&self, params: serde_json::Value) -> Result<serde_json::Value, McpError> {
        let req: GetPromptRequest = from_params(params)?;
        let Some(handler) = self.prompt_handlers.get(&req.name) else {
            return Err(McpError::invalid_params(format!("unknown prompt: {}", req.name)));
        };
        let result = handler(req.arguments);
        Ok(serde_json::to_value(result)?)
    }

    fn handle_resources_read(&self, params: serde_json::Value) -> Result<serde_json::Value, McpError> {
        let req: ReadResourceRequest = from_params(params)?;
        if self.resources.get(&req.uri).is_none() {
            return Err(McpError::invalid_params(format!("unknown resource: {}", req.uri)));
        }
        let reader = self.resource_reader.read().clone();
        let Some(reader) = reader else {
            return Err(McpError::internal("no resource reader configured"));
        };
        let Some(result) = reader(&req.uri) else {
            return Err(McpError::invalid_params(format!("resource unavailable: {}", req.uri)));
        };
        Ok(serde_json::to_value(result)?)
    }
}

fn from_params<T: serde::de::DeserializeOwned>(params: serde_json::Value) -> Result<T, McpError> {
    serde_json::from_value(params).map_err(|e| McpError::invalid_params(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_protocol::Content;

    fn test_server() -> McpServer {
        McpServer::new(crate::config::ServerConfig::builder("test", "0.1.0").build())
    }

    fn echo_tool() -> Tool {
        Tool {
            name: "echo".to_string(),
            description: None,
            input_schema: serde_json::json!({"type": "object"}),
            output_schema: None,
        }
    }

    #[tokio::test]
    async fn initialize_transitions_session_to_initializing() {
        let server = test_server();
        let (tx, _rx) = mpsc::channel(8);
        server.register_session("s1", TransportType::InMemory, tx);

        let params = serde_json::json!({
            "protocolVersion": "2025-06-18",
            "capabilities": {},
            "clientInfo": {"name": "test", "version": "0.1.0"},
        });
        let response = server
            .handle_message(
                "s1",
                Message::request(1i64, methods::INITIALIZE, Some(params)),
            )
            .await
            .unwrap();
        match response {
            Message::Response { payload: ResponsePayload::Result(value), .. } => {
                assert_eq!(value.get("protocolVersion").unwrap(), "2025-06-18");
            }
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn ping_before_initialize_is_rejected() {
        let server = test_server();
        let (tx, _rx) = mpsc::channel(8);
        server.register_session("s1", TransportType::InMemory, tx);

        let response = server
            .handle_message("s1", Message::request(1i64, methods::PING, None))
            .await
            .unwrap();
        match response {
            Message::Response { payload: ResponsePayload::Error(err), .. } => {
                assert_eq!(err.code, -32002);
            }
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn requests_before_initialize_are_rejected() {
        let server = test_server();
        let (tx, _rx) = mpsc::channel(8);
        server.register_session("s1", TransportType::InMemory, tx);

        let response = server
            .handle_message("s1", Message::request(1i64, methods::TOOLS_LIST, None))
            .await
            .unwrap();
        match response {
            Message::Response { payload: ResponsePayload::Error(err), .. } => {
                assert_eq!(err.code, -32002);
            }
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn tool_call_failure_is_a_successful_response_with_is_error() {
        let server = test_server();
        let (tx, _rx) = mpsc::channel(8);
        server.register_session("s1", TransportType::InMemory, tx);

        server
            .add_tool(
                echo_tool(),
                Arc::new(|_args| CallToolResult::failure(vec![Content::text("boom")])),
            )
            .await;

        // manually move session to ready, bypassing the handshake for this test
        server.sessions.get_mut("s1").unwrap().transition(SessionState::Initializing).unwrap();
        server.sessions.get_mut("s1").unwrap().transition(SessionState::Ready).unwrap();

        let params = serde_json::json!({"name": "echo", "arguments": {}});
        let response = server
            .handle_message("s1", Message::request(2i64, methods::TOOLS_CALL, Some(params)))
            .await
            .unwrap();
        match response {
            Message::Response { payload: ResponsePayload::Result(value), .. } => {
                assert_eq!(value.get("isError").unwrap(), true);
            }
            other => panic!("expected success envelope, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn tool_call_result_is_stripped_to_the_negotiated_version() {
        let server = test_server();
        let (tx, _rx) = mpsc::channel(8);
        server.register_session("s1", TransportType::InMemory, tx);

        server
            .add_tool(
                echo_tool(),
                Arc::new(|_args| {
                    CallToolResult {
                        content: vec![
                            Content::text("hi"),
                            Content::Audio { data: "AAAA".into(), mime_type: "audio/wav".into(), annotations: None },
                        ],
                        is_error: false,
                        structured_content: Some(serde_json::json!({"ok": true})),
                    }
                }),
            )
            .await;

        server.sessions.get_mut("s1").unwrap().transition(SessionState::Initializing).unwrap();
        server.sessions.get_mut("s1").unwrap().protocol_version = Some("2024-11-05".to_string());
        server.sessions.get_mut("s1").unwrap().transition(SessionState::Ready).unwrap();

        let params = serde_json::json!({"name": "echo", "arguments": {}});
        let response = server
            .handle_message("s1", Message::request(2i64, methods::TOOLS_CALL, Some(params)))
            .await
            .unwrap();
        match response {
            Message::Response { payload: ResponsePayload::Result(value), .. } => {
                assert!(value.get("structuredContent").is_none());
                assert_eq!(value.get("content").unwrap().as_array().unwrap().len(), 1);
            }
            other => panic!("expected success envelope, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn adding_a_tool_notifies_subscribed_sessions() {
        let server = test_server();
        let (tx, mut rx) = mpsc::channel(8);
        server.register_session("s1", TransportType::InMemory, tx);
        server.subscriptions.subscribe_tools_list_changed("s1");

        server.add_tool(echo_tool(), Arc::new(|_| CallToolResult::success(vec![]))).await;

        let notification = rx.recv().await.unwrap();
        assert_eq!(notification.method(), Some(methods::NOTIFICATIONS_TOOLS_LIST_CHANGED));
    }

    #[tokio::test]
    async fn unknown_tool_error_carries_name_in_data() {
        let server = test_server();
        let (tx, _rx) = mpsc::channel(8);
        server.register_session("s1", TransportType::InMemory, tx);
        server.sessions.get_mut("s1").unwrap().transition(SessionState::Initializing).unwrap();
        server.sessions.get_mut("s1").unwrap().transition(SessionState::Ready).unwrap();

        let params = serde_json::json!({"name": "nope", "arguments": {}});
        let response = server
            .handle_message("s1", Message::request(3i64, methods::TOOLS_CALL, Some(params)))
            .await
            .unwrap();
        match response {
            Message::Response { payload: ResponsePayload::Error(err), .. } => {
                assert_eq!(err.code, -32602);
                assert_eq!(err.message, "Unknown tool: nope");
                assert_eq!(err.data, Some(serde_json::json!({"data": {"name": "nope"}})));
            }
            other => panic!("expected error, got {other:?}"),
        }
    }

    fn test_server_with_subscribable_resources() -> McpServer {
        McpServer::new(
            crate::config::ServerConfig::builder("test", "0.1.0")
                .capabilities(conduit_protocol::ServerCapabilities {
                    resources: Some(conduit_protocol::types::ResourcesCapability {
                        subscribe: Some(true),
                        list_changed: None,
                    }),
                    ..Default::default()
                })
                .build(),
        )
    }

    async fn ready_session(server: &McpServer, session_id: &str) {
        let (tx, _rx) = mpsc::channel(8);
        server.register_session(session_id, TransportType::InMemory, tx);
        server.sessions.get_mut(session_id).unwrap().transition(SessionState::Initializing).unwrap();
        server.sessions.get_mut(session_id).unwrap().transition(SessionState::Ready).unwrap();
    }

    #[tokio::test]
    async fn resources_subscribe_rejects_unknown_uri() {
        let server = test_server_with_subscribable_resources();
        ready_session(&server, "s1").await;

        let params = serde_json::json!({"uri": "file:///missing"});
        let response = server
            .handle_message("s1", Message::request(5i64, methods::RESOURCES_SUBSCRIBE, Some(params)))
            .await
            .unwrap();
        match response {
            Message::Response { payload: ResponsePayload::Error(err), .. } => assert_eq!(err.code, -32602),
            other => panic!("expected error, got {other:?}"),
        }
        assert!(server.subscriptions.resource_subscribers("file:///missing").is_empty());
    }

    #[tokio::test]
    async fn resources_subscribe_accepts_known_uri() {
        let server = test_server_with_subscribable_resources();
        ready_session(&server, "s1").await;
        server.add_resource(Resource {
            uri: "file:///a".to_string(),
            name: "a".to_string(),
            description: None,
            mime_type: None,
        });

        let params = serde_json::json!({"uri": "file:///a"});
        let response = server
            .handle_message("s1", Message::request(6i64, methods::RESOURCES_SUBSCRIBE, Some(params)))
            .await
            .unwrap();
        match response {
            Message::Response { payload: ResponsePayload::Result(_), .. } => {}
            other => panic!("expected success, got {other:?}"),
        }
        assert_eq!(server.subscriptions.resource_subscribers("file:///a"), vec!["s1".to_string()]);
    }

    #[tokio::test]
    async fn resources_unsubscribe_rejects_unknown_uri() {
        let server = test_server_with_subscribable_resources();
        ready_session(&server, "s1").await;

        let params = serde_json::json!({"uri": "file:///missing"});
        let response = server
            .handle_message("s1", Message::request(7i64, methods::RESOURCES_UNSUBSCRIBE, Some(params)))
            .await
            .unwrap();
        match response {
            Message::Response { payload: ResponsePayload::Error(err), .. } => assert_eq!(err.code, -32602),
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn resources_subscribe_rejected_without_declared_capability() {
        let server = test_server();
        let (tx, _rx) = mpsc::channel(8);
        server.register_session("s1", TransportType::InMemory, tx);
        server.sessions.get_mut("s1").unwrap().transition(SessionState::Initializing).unwrap();
        server.sessions.get_mut("s1").unwrap().transition(SessionState::Ready).unwrap();

        let params = serde_json::json!({"uri": "file:///a"});
        let response = server
            .handle_message("s1", Message::request(4i64, methods::RESOURCES_SUBSCRIBE, Some(params)))
            .await
            .unwrap();
        match response {
            Message::Response { payload: ResponsePayload::Error(err), .. } => assert_eq!(err.code, -32602),
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn log_message_reaches_sessions_at_default_threshold_without_set_level() {
        let server = test_server();
        let (tx, mut rx) = mpsc::channel(8);
        server.register_session("s1", TransportType::InMemory, tx);

        server.log_message(conduit_core::LogLevel::Error, None, serde_json::json!("boom")).await;
        let notification = rx.recv().await.unwrap();
        assert_eq!(notification.method(), Some(methods::NOTIFICATIONS_MESSAGE));

        server.log_message(conduit_core::LogLevel::Debug, None, serde_json::json!("chatty")).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn removing_session_scrubs_subscriptions() {
        let server = test_server();
        let (tx, _rx) = mpsc::channel(8);
        server.register_session("s1", TransportType::InMemory, tx);
        server.subscriptions.subscribe_resource("file:///a", "s1");

        server.remove_session("s1");

        assert!(server.subscriptions.resource_subscribers("file:///a").is_empty());
    }
}
