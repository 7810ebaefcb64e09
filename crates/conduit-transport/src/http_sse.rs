//! HTTP transport with Server-Sent Events for the server → client direction.
//!
//! Routing:
//! - `GET /` returns a static JSON capability descriptor for clients probing
//!   what this endpoint speaks before opening a stream.
//! - `GET /sse` opens an SSE stream and allocates a new session id; the first
//!   event announces the per-session POST url so the client knows where to
//!   send its half of the conversation.
//! - `POST /` or `POST /messages?session_id=<id>` carries client → server
//!   messages: a single request/notification, or a batch (JSON array).
//!
//! Each accepted SSE connection becomes one [`HttpSseTransport`], handed to
//! the caller through [`HttpSseAcceptor::accept`] the same way a
//! `TcpListener::accept` hands out one stream per connection. A POST with no
//! session id attached is stateless: rather than teach this transport about
//! `McpServer`, it is wrapped in the same [`HttpSseTransport`] shape and
//! pushed through the same `accept()` queue as a one-shot connection, and its
//! replies are collected back into the HTTP response instead of an SSE
//! stream. Origin validation happens at routing time, not inside the
//! transport, since it's a property of the HTTP request, not of the message
//! stream.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use conduit_core::Message;
use dashmap::DashMap;
use futures::stream::Stream;
use serde::Deserialize;
use tokio::sync::{mpsc, Mutex as TokioMutex};
use uuid::Uuid;

use crate::core::{Transport, TransportCapabilities, TransportError, TransportResult, TransportState, TransportType};

/// Outbound (server → client) queue bound per session. Bounded so a slow or
/// disconnected client applies backpressure to its own server-push
/// notifications rather than growing memory without limit.
pub const SSE_QUEUE_CAPACITY: usize = 256;

/// How long a stateless (non-SSE) POST waits for the handler side to produce
/// every expected reply before giving up and answering `503`.
pub const STATELESS_REPLY_TIMEOUT: Duration = Duration::from_secs(30);

const STREAMABLE_HTTP_VERSION: &str = "2025-03-26";

#[derive(Debug, Clone)]
pub struct HttpSseConfig {
    /// Origins allowed to open an SSE connection or post a message. Empty
    /// means any origin is accepted, which is only appropriate for local
    /// development.
    pub allowed_origins: HashSet<String>,
    pub queue_capacity: usize,
}

impl Default for HttpSseConfig {
    fn default() -> Self {
        Self {
            allowed_origins: HashSet::new(),
            queue_capacity: SSE_QUEUE_CAPACITY,
        }
    }
}

/// One accepted connection's [`Transport`] implementation: either a
/// long-lived SSE session, or a one-shot stateless POST wrapped in the same
/// shape so it can flow through the same accept queue and dispatch path.
#[derive(Debug)]
pub struct HttpSseTransport {
    session_id: String,
    capabilities: TransportCapabilities,
    outbound: mpsc::Sender<Message>,
    inbound: TokioMutex<mpsc::Receiver<Message>>,
}

impl HttpSseTransport {
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

#[async_trait]
impl Transport for HttpSseTransport {
    fn transport_type(&self) -> TransportType {
        TransportType::Http
    }

    fn capabilities(&self) -> &TransportCapabilities {
        &self.capabilities
    }

    async fn state(&self) -> TransportState {
        if self.outbound.is_closed() {
            TransportState::Disconnected
        } else {
            TransportState::Connected
        }
    }

    async fn send(&self, message: Message) -> TransportResult<()> {
        self.outbound
            .send(message)
            .await
            .map_err(|_| TransportError::Closed)
    }

    async fn recv(&self) -> TransportResult<Option<Message>> {
        Ok(self.inbound.lock().await.recv().await)
    }

    async fn close(&self) -> TransportResult<()> {
        self.inbound.lock().await.close();
        Ok(())
    }
}

struct PendingSession {
    post_sender: mpsc::Sender<Message>,
    /// Set once this session's `initialize` request negotiates the newest
    /// protocol version, per SPEC_FULL.md's "`MCP-Protocol-Version` HTTP
    /// request header: required on HTTP transport at the newest version".
    /// The `initialize` request itself is exempt; every later POST on this
    /// session must carry the header once this is `true`.
    requires_protocol_header: std::sync::atomic::AtomicBool,
}

/// The client's own requested version, echoed back unless unsupported (the
/// same fallback-to-newest rule `conduit_protocol::negotiate` applies, kept
/// in sync here rather than imported to avoid a `conduit-protocol`
/// dependency in a transport crate that otherwise only depends on
/// `conduit-core`).
fn effective_negotiated_version(requested: Option<&str>) -> &'static str {
    let newest = conduit_core::DEFAULT_PROTOCOL_VERSION;
    let Some(requested) = requested else {
        return newest;
    };
    conduit_core::SUPPORTED_VERSIONS
        .iter()
        .copied()
        .find(|&v| v == requested)
        .unwrap_or(newest)
}

const MCP_PROTOCOL_VERSION_HEADER: &str = "mcp-protocol-version";

#[derive(Clone)]
struct AppState {
    config: Arc<HttpSseConfig>,
    sessions: Arc<DashMap<String, PendingSession>>,
    accepted: mpsc::Sender<HttpSseTransport>,
}

/// Accepts newly-opened SSE connections as they complete their handshake,
/// mirroring `TcpListener::accept` for a connection-oriented transport.
pub struct HttpSseAcceptor {
    router: Router,
    incoming: TokioMutex<mpsc::Receiver<HttpSseTransport>>,
}

impl HttpSseAcceptor {
    #[must_use]
    pub fn new(config: HttpSseConfig) -> Self {
        let (accepted_tx, accepted_rx) = mpsc::channel(64);
        let state = AppState {
            config: Arc::new(config),
            sessions: Arc::new(DashMap::new()),
            accepted: accepted_tx,
        };

        let router = Router::new()
            .route("/", get(capability_handler).post(post_handler))
            .route("/sse", get(sse_handler))
            .route("/messages", post(post_handler))
            .with_state(state);

        Self {
            router,
            incoming: TokioMutex::new(accepted_rx),
        }
    }

    #[must_use]
    pub fn into_router(self) -> Router {
        self.router
    }

    /// Wait for the next fully-established SSE session, or the next
    /// stateless POST wrapped as a one-shot connection.
    pub async fn accept(&self) -> Option<HttpSseTransport> {
        self.incoming.lock().await.recv().await
    }
}

fn origin_allowed(config: &HttpSseConfig, headers: &HeaderMap) -> bool {
    if config.allowed_origins.is_empty() {
        return true;
    }
    match headers.get(axum::http::header::ORIGIN).and_then(|v| v.to_str().ok()) {
        // No Origin header at all (e.g. a non-browser client) is allowed;
        // only a present-but-unlisted origin is rejected.
        None => true,
        Some(origin) => config.allowed_origins.contains(origin),
    }
}

async fn capability_handler(State(state): State<AppState>, headers: HeaderMap) -> axum::response::Response {
    if !origin_allowed(&state.config, &headers) {
        return (StatusCode::BAD_REQUEST, "origin not allowed").into_response();
    }
    Json(serde_json::json!({
        "transport": "streamable-http",
        "version": STREAMABLE_HTTP_VERSION,
        "capabilities": {
            "sse": true,
            "batch": true,
            "resumable": false,
        },
    }))
    .into_response()
}

async fn sse_handler(State(state): State<AppState>, headers: HeaderMap) -> axum::response::Response {
    if !origin_allowed(&state.config, &headers) {
        return (StatusCode::BAD_REQUEST, "origin not allowed").into_response();
    }

    let session_id = Uuid::new_v4().to_string();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Message>(state.config.queue_capacity);
    let (post_tx, post_rx) = mpsc::channel::<Message>(state.config.queue_capacity);

    state.sessions.insert(
        session_id.clone(),
        PendingSession {
            post_sender: post_tx,
            requires_protocol_header: std::sync::atomic::AtomicBool::new(false),
        },
    );

    let transport = HttpSseTransport {
        session_id: session_id.clone(),
        capabilities: TransportCapabilities::http(),
        outbound: outbound_tx,
        inbound: TokioMutex::new(post_rx),
    };

    if state.accepted.send(transport).await.is_err() {
        state.sessions.remove(&session_id);
        return (StatusCode::SERVICE_UNAVAILABLE, "server not accepting connections").into_response();
    }

    let sessions = state.sessions.clone();
    let announced_id = session_id.clone();
    let endpoint_url = format!("/messages?session_id={announced_id}");
    let stream = async_stream::stream! {
        yield Ok::<_, axum::Error>(Event::default().event("endpoint").data(endpoint_url));
        while let Some(message) = outbound_rx.recv().await {
            match conduit_core::encode(&message) {
                Ok(bytes) => {
                    let body = String::from_utf8_lossy(&bytes).into_owned();
                    yield Ok(Event::default().event("message").data(body));
                }
                Err(err) => {
                    tracing::error!(error = %err, "failed to encode outbound SSE message");
                }
            }
        }
        sessions.remove(&announced_id);
    };

    Sse::new(stream)
        .keep_alive(KeepAlive::new().interval(std::time::Duration::from_secs(15)))
        .into_response()
}

#[derive(Debug, Default, Deserialize)]
struct MessagesQuery {
    session_id: Option<String>,
}

/// Pull a session id out of the `X-Session-ID` header or the `session_id`
/// query parameter, header taking precedence when both are present.
fn extract_session_id(headers: &HeaderMap, query: &MessagesQuery) -> Option<String> {
    headers
        .get("x-session-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| query.session_id.clone())
}

/// A request body is either one JSON-RPC object or a batch (array of them).
/// Tracked so the response can mirror the same shape.
enum Body {
    Single(Message),
    Batch(Vec<Message>),
}

fn parse_body(bytes: &[u8]) -> Result<Body, String> {
    let value: serde_json::Value = serde_json::from_slice(bytes).map_err(|e| e.to_string())?;
    match value {
        serde_json::Value::Array(items) => {
            let mut messages = Vec::with_capacity(items.len());
            for item in items {
                let bytes = serde_json::to_vec(&item).map_err(|e| e.to_string())?;
                messages.push(conduit_core::decode(&bytes).map_err(|e| e.message)?);
            }
            Ok(Body::Batch(messages))
        }
        other => {
            let bytes = serde_json::to_vec(&other).map_err(|e| e.to_string())?;
            Ok(Body::Single(conduit_core::decode(&bytes).map_err(|e| e.message)?))
        }
    }
}

async fn post_handler(
    State(state): State<AppState>,
    Query(query): Query<MessagesQuery>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> axum::response::Response {
    if !origin_allowed(&state.config, &headers) {
        return (StatusCode::BAD_REQUEST, "origin not allowed").into_response();
    }

    let parsed = match parse_body(&body) {
        Ok(parsed) => parsed,
        Err(message) => {
            return (StatusCode::BAD_REQUEST, Json(serde_json::json!({ "error": message }))).into_response();
        }
    };

    match extract_session_id(&headers, &query) {
        Some(session_id) => forward_to_session(&state, &session_id, &headers, parsed).await,
        None => dispatch_stateless(&state, parsed).await,
    }
}

/// Deliver to an already-open SSE session: the reply, if any, arrives over
/// that session's stream, so the HTTP response here is just an ack.
///
/// Enforces the `MCP-Protocol-Version` header once this session's
/// `initialize` negotiated the newest protocol version: every POST after
/// that one must carry it.
async fn forward_to_session(state: &AppState, session_id: &str, headers: &HeaderMap, body: Body) -> axum::response::Response {
    let Some(session) = state.sessions.get(session_id) else {
        return (StatusCode::NOT_FOUND, "unknown session_id").into_response();
    };

    let messages = match body {
        Body::Single(message) => vec![message],
        Body::Batch(messages) => messages,
    };

    let header_present = headers.contains_key(MCP_PROTOCOL_VERSION_HEADER);
    if session.requires_protocol_header.load(std::sync::atomic::Ordering::Acquire) && !header_present {
        return (
            StatusCode::BAD_REQUEST,
            "missing required MCP-Protocol-Version header",
        )
            .into_response();
    }

    for message in &messages {
        if let Message::Request { method, params, .. } = message {
            if method == "initialize" {
                let requested = params.as_object().get("protocolVersion").and_then(|v| v.as_str()).map(str::to_string);
                let negotiated = effective_negotiated_version(requested.as_deref());
                if negotiated == conduit_core::DEFAULT_PROTOCOL_VERSION {
                    session.requires_protocol_header.store(true, std::sync::atomic::Ordering::Release);
                }
            }
        }
    }

    for message in messages {
        if session.post_sender.send(message).await.is_err() {
            return (StatusCode::GONE, "session no longer accepting messages").into_response();
        }
    }

    (StatusCode::ACCEPTED, "Accepted").into_response()
}

/// Deliver a session-less POST by wrapping it as a one-shot connection,
/// handing it through the same `accept()` queue the SSE handshake uses, and
/// collecting replies back into the synchronous HTTP response.
async fn dispatch_stateless(state: &AppState, body: Body) -> axum::response::Response {
    let (messages, is_batch) = match body {
        Body::Single(message) => (vec![message], false),
        Body::Batch(messages) => (messages, true),
    };
    let expected_replies = messages.iter().filter(|m| !m.is_notification()).count();

    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Message>(state.config.queue_capacity);
    let (inbound_tx, inbound_rx) = mpsc::channel::<Message>(messages.len().max(1));
    for message in messages {
        if inbound_tx.send(message).await.is_err() {
            return (StatusCode::SERVICE_UNAVAILABLE, "server not accepting connections").into_response();
        }
    }
    // Dropping the sender lets the handler's recv loop see end-of-input once
    // every queued message has been drained, the same way EOF ends a stdio session.
    drop(inbound_tx);

    let transport = HttpSseTransport {
        session_id: Uuid::new_v4().to_string(),
        capabilities: TransportCapabilities::http(),
        outbound: outbound_tx,
        inbound: TokioMutex::new(inbound_rx),
    };

    if state.accepted.send(transport).await.is_err() {
        return (StatusCode::SERVICE_UNAVAILABLE, "server not accepting connections").into_response();
    }

    if expected_replies == 0 {
        return (StatusCode::ACCEPTED, "Accepted").into_response();
    }

    let mut replies = Vec::with_capacity(expected_replies);
    let collected = tokio::time::timeout(STATELESS_REPLY_TIMEOUT, async {
        while replies.len() < expected_replies {
            match outbound_rx.recv().await {
                Some(message) => replies.push(message),
                None => break,
            }
        }
    })
    .await;
    if collected.is_err() {
        return (StatusCode::SERVICE_UNAVAILABLE, "timed out waiting for a response").into_response();
    }

    let mut encoded = Vec::with_capacity(replies.len());
    for reply in &replies {
        let bytes = match conduit_core::encode(reply) {
            Ok(bytes) => bytes,
            Err(_) => return (StatusCode::INTERNAL_SERVER_ERROR, "failed to encode response").into_response(),
        };
        match serde_json::from_slice::<serde_json::Value>(&bytes) {
            Ok(value) => encoded.push(value),
            Err(_) => return (StatusCode::INTERNAL_SERVER_ERROR, "failed to encode response").into_response(),
        }
    }

    if is_batch {
        Json(encoded).into_response()
    } else {
        Json(encoded.into_iter().next()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use tower::ServiceExt;

    use super::*;

    fn test_state() -> AppState {
        let (accepted_tx, _accepted_rx) = mpsc::channel(1);
        AppState {
            config: Arc::new(HttpSseConfig::default()),
            sessions: Arc::new(DashMap::new()),
            accepted: accepted_tx,
        }
    }

    fn insert_pending_session(state: &AppState, session_id: &str) -> mpsc::Receiver<Message> {
        let (post_tx, post_rx) = mpsc::channel(8);
        state.sessions.insert(
            session_id.to_string(),
            PendingSession {
                post_sender: post_tx,
                requires_protocol_header: std::sync::atomic::AtomicBool::new(false),
            },
        );
        post_rx
    }

    #[test]
    fn effective_version_echoes_supported_request_and_falls_back_for_unknown() {
        assert_eq!(effective_negotiated_version(Some("2024-11-05")), "2024-11-05");
        assert_eq!(effective_negotiated_version(Some("nope")), conduit_core::DEFAULT_PROTOCOL_VERSION);
        assert_eq!(effective_negotiated_version(None), conduit_core::DEFAULT_PROTOCOL_VERSION);
    }

    #[tokio::test]
    async fn initialize_at_newest_version_does_not_itself_require_the_header() {
        let state = test_state();
        let mut rx = insert_pending_session(&state, "s1");

        let init = Message::request(
            1i64,
            "initialize",
            Some(serde_json::json!({"protocolVersion": conduit_core::DEFAULT_PROTOCOL_VERSION})),
        );
        let response = forward_to_session(&state, "s1", &HeaderMap::new(), Body::Single(init)).await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert!(rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn later_request_without_header_is_rejected_after_newest_version_initialize() {
        let state = test_state();
        let mut rx = insert_pending_session(&state, "s1");

        let init = Message::request(
            1i64,
            "initialize",
            Some(serde_json::json!({"protocolVersion": conduit_core::DEFAULT_PROTOCOL_VERSION})),
        );
        forward_to_session(&state, "s1", &HeaderMap::new(), Body::Single(init)).await;
        rx.recv().await.unwrap();

        let ping = Message::request(2i64, "ping", None);
        let response = forward_to_session(&state, "s1", &HeaderMap::new(), Body::Single(ping)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn later_request_with_header_is_accepted_after_newest_version_initialize() {
        let state = test_state();
        let mut rx = insert_pending_session(&state, "s1");

        let init = Message::request(
            1i64,
            "initialize",
            Some(serde_json::json!({"protocolVersion": conduit_core::DEFAULT_PROTOCOL_VERSION})),
        );
        forward_to_session(&state, "s1", &HeaderMap::new(), Body::Single(init)).await;
        rx.recv().await.unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(MCP_PROTOCOL_VERSION_HEADER, conduit_core::DEFAULT_PROTOCOL_VERSION.parse().unwrap());
        let ping = Message::request(2i64, "ping", None);
        let response = forward_to_session(&state, "s1", &headers, Body::Single(ping)).await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert!(rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn older_negotiated_version_never_requires_the_header() {
        let state = test_state();
        let mut rx = insert_pending_session(&state, "s1");

        let init = Message::request(1i64, "initialize", Some(serde_json::json!({"protocolVersion": "2024-11-05"})));
        forward_to_session(&state, "s1", &HeaderMap::new(), Body::Single(init)).await;
        rx.recv().await.unwrap();

        let ping = Message::request(2i64, "ping", None);
        let response = forward_to_session(&state, "s1", &HeaderMap::new(), Body::Single(ping)).await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    #[test]
    fn origin_check_is_permissive_when_unconfigured() {
        let config = HttpSseConfig::default();
        assert!(origin_allowed(&config, &HeaderMap::new()));
    }

    #[test]
    fn origin_check_allows_absent_origin_header() {
        let mut config = HttpSseConfig::default();
        config.allowed_origins.insert("https://trusted.example".to_string());
        assert!(origin_allowed(&config, &HeaderMap::new()));
    }

    #[test]
    fn origin_check_rejects_unlisted_origin() {
        let mut config = HttpSseConfig::default();
        config.allowed_origins.insert("https://trusted.example".to_string());
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::ORIGIN, "https://evil.example".parse().unwrap());
        assert!(!origin_allowed(&config, &headers));
    }

    #[test]
    fn origin_check_accepts_listed_origin() {
        let mut config = HttpSseConfig::default();
        config.allowed_origins.insert("https://trusted.example".to_string());
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::ORIGIN, "https://trusted.example".parse().unwrap());
        assert!(origin_allowed(&config, &headers));
    }

    #[tokio::test]
    async fn root_returns_capability_descriptor() {
        let acceptor = HttpSseAcceptor::new(HttpSseConfig::default());
        let router = acceptor.into_router();

        let response = router
            .oneshot(axum::http::Request::builder().uri("/").body(axum::body::Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["transport"], "streamable-http");
        assert_eq!(value["version"], STREAMABLE_HTTP_VERSION);
        assert_eq!(value["capabilities"]["sse"], true);
        assert_eq!(value["capabilities"]["batch"], true);
    }

    #[tokio::test]
    async fn unknown_session_id_on_post_is_not_found() {
        let acceptor = HttpSseAcceptor::new(HttpSseConfig::default());
        let router = acceptor.into_router();

        let body = serde_json::json!({"jsonrpc": "2.0", "id": 1, "method": "ping"}).to_string();
        let response = router
            .oneshot(
                axum::http::Request::builder()
                    .method("POST")
                    .uri("/messages?session_id=nope")
                    .header("content-type", "application/json")
                    .body(axum::body::Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn disallowed_origin_on_post_is_bad_request() {
        let mut config = HttpSseConfig::default();
        config.allowed_origins.insert("https://trusted.example".to_string());
        let acceptor = HttpSseAcceptor::new(config);
        let router = acceptor.into_router();

        let body = serde_json::json!({"jsonrpc": "2.0", "id": 1, "method": "ping"}).to_string();
        let response = router
            .oneshot(
                axum::http::Request::builder()
                    .method("POST")
                    .uri("/messages?session_id=nope")
                    .header("content-type", "application/json")
                    .header("origin", "https://evil.example")
                    .body(axum::body::Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn stateless_batch_post_dispatches_through_accept_and_collects_replies() {
        let acceptor = HttpSseAcceptor::new(HttpSseConfig::default());

        let driver = {
            let incoming = acceptor.incoming;
            tokio::spawn(async move {
                let transport = incoming.lock().await.recv().await.unwrap();
                loop {
                    match transport.recv().await {
                        Ok(Some(message)) => {
                            let reply = match &message {
                                Message::Request { id, .. } => {
                                    Message::response_ok(id.clone(), serde_json::json!({"ok": true}))
                                }
                                _ => continue,
                            };
                            if transport.send(reply).await.is_err() {
                                break;
                            }
                        }
                        _ => break,
                    }
                }
            })
        };
        let router = acceptor.router;

        let body = serde_json::json!([
            {"jsonrpc": "2.0", "id": 1, "method": "ping"},
            {"jsonrpc": "2.0", "id": 2, "method": "ping"},
        ])
        .to_string();
        let response = router
            .oneshot(
                axum::http::Request::builder()
                    .method("POST")
                    .uri("/")
                    .header("content-type", "application/json")
                    .body(axum::body::Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value.as_array().unwrap().len(), 2);

        driver.await.unwrap();
    }
}
