//! The bidirectional RPC runtime: demultiplexes inbound messages into
//! requests/notifications routed to a handler versus responses that
//! complete an outstanding local request, allocates ids for outgoing
//! requests, and enforces per-request deadlines.
//!
//! One `RpcRuntime` wraps one [`Transport`]. A server holds one runtime per
//! session; a client holds exactly one.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use conduit_core::{McpError, Message, RequestId, ResponsePayload};
use dashmap::DashMap;
use tokio::sync::oneshot;
use tokio::time::timeout;

use crate::core::{Transport, TransportError};

type PendingTable = DashMap<RequestId, oneshot::Sender<ResponsePayload>>;

/// What the runtime decided to do with one inbound message.
pub enum Demux {
    /// A request or notification to hand to the method dispatcher.
    Inbound(Message),
    /// A response that completed (or failed to find) a local pending call.
    Completed,
}

/// Wraps a [`Transport`] with request/response correlation.
pub struct RpcRuntime<T: Transport> {
    transport: Arc<T>,
    next_id: AtomicI64,
    pending: Arc<PendingTable>,
}

impl<T: Transport> RpcRuntime<T> {
    #[must_use]
    pub fn new(transport: T) -> Self {
        Self {
            transport: Arc::new(transport),
            next_id: AtomicI64::new(1),
            pending: Arc::new(DashMap::new()),
        }
    }

    #[must_use]
    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    fn allocate_id(&self) -> RequestId {
        RequestId::Number(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Send a request and await its response, failing if `deadline` elapses
    /// first. The id is allocated here so callers never construct one.
    ///
    /// # Errors
    /// `McpError` with `ErrorKind::Timeout` on deadline elapse,
    /// `ErrorKind::TransportClosed` if the transport closes before the
    /// response arrives, or the peer's own RPC error otherwise.
    pub async fn call(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
        deadline: Duration,
    ) -> Result<serde_json::Value, McpError> {
        let id = self.allocate_id();
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id.clone(), tx);

        let request = Message::request(id.clone(), method, params);
        if let Err(err) = self.transport.send(request).await {
            self.pending.remove(&id);
            return Err(transport_err_to_mcp(err));
        }

        match timeout(deadline, rx).await {
            Ok(Ok(ResponsePayload::Result(value))) => Ok(value),
            Ok(Ok(ResponsePayload::Error(err))) => Err(McpError::new(
                conduit_core::ErrorKind::from_code(err.code),
                err.message,
            )
            .with_data(err.data.unwrap_or(serde_json::Value::Null))),
            Ok(Err(_)) => Err(McpError::transport_closed()),
            Err(_) => {
                self.pending.remove(&id);
                Err(McpError::timeout())
            }
        }
    }

    /// Send a fire-and-forget notification.
    ///
    /// # Errors
    /// Returns the underlying transport failure.
    pub async fn notify(&self, method: &str, params: Option<serde_json::Value>) -> Result<(), McpError> {
        self.transport
            .send(Message::notification(method, params))
            .await
            .map_err(transport_err_to_mcp)
    }

    /// Send a response (success or error) for an inbound request.
    ///
    /// # Errors
    /// Returns the underlying transport failure.
    pub async fn respond(&self, id: RequestId, payload: ResponsePayload) -> Result<(), McpError> {
        let message = Message::Response { id, payload };
        self.transport.send(message).await.map_err(transport_err_to_mcp)
    }

    /// Receive the next message, demultiplexing responses to pending local
    /// calls versus requests/notifications that need dispatch. Returns
    /// `Ok(None)` once the transport is exhausted.
    ///
    /// # Errors
    /// Returns the underlying transport failure.
    pub async fn recv_demux(&self) -> Result<Option<Demux>, McpError> {
        match self.transport.recv().await.map_err(transport_err_to_mcp)? {
            None => Ok(None),
            Some(Message::Response { id, payload }) => {
                if let Some((_, tx)) = self.pending.remove(&id) {
                    let _ = tx.send(payload);
                }
                // A response with no matching pending call is dropped: the
                // caller may have already timed out and removed its entry.
                Ok(Some(Demux::Completed))
            }
            Some(other) => Ok(Some(Demux::Inbound(other))),
        }
    }

    /// Fail every outstanding call immediately, e.g. on shutdown. Idempotent:
    /// calling this twice, or after all calls have already completed, is a
    /// no-op.
    pub fn fail_all_pending(&self) {
        let ids: Vec<RequestId> = self.pending.iter().map(|entry| entry.key().clone()).collect();
        for id in ids {
            if let Some((_, tx)) = self.pending.remove(&id) {
                let err = McpError::transport_closed();
                let _ = tx.send(ResponsePayload::Error((&err).into()));
            }
        }
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

fn transport_err_to_mcp(err: TransportError) -> McpError {
    match err {
        TransportError::Closed => McpError::transport_closed(),
        other => McpError::internal(other.to_string()),
    }
}
