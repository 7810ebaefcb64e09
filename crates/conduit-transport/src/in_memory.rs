//! In-memory transport: a pair of bounded channels connecting a client and
//! server within the same process, with no serialization in between. Used
//! as the integration-test fixture for end-to-end scenarios that exercise
//! the full request/response/notification surface without a real socket.

use async_trait::async_trait;
use conduit_core::Message;
use tokio::sync::mpsc;

use crate::core::{Transport, TransportCapabilities, TransportError, TransportResult, TransportState, TransportType};

/// Default bound for each direction's queue. Matches the HTTP+SSE
/// transport's per-session outbound bound so backpressure behaves the same
/// way across transports in tests.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// One end of a paired in-memory transport. Construct with [`pair`].
#[derive(Debug)]
pub struct InMemoryTransport {
    capabilities: TransportCapabilities,
    outbound: mpsc::Sender<Message>,
    inbound: tokio::sync::Mutex<mpsc::Receiver<Message>>,
}

/// Build a connected pair: messages sent on one end arrive on the other's
/// `recv`, and vice versa.
#[must_use]
pub fn pair() -> (InMemoryTransport, InMemoryTransport) {
    pair_with_capacity(DEFAULT_CHANNEL_CAPACITY)
}

#[must_use]
pub fn pair_with_capacity(capacity: usize) -> (InMemoryTransport, InMemoryTransport) {
    let (tx_a, rx_a) = mpsc::channel(capacity);
    let (tx_b, rx_b) = mpsc::channel(capacity);
    let a = InMemoryTransport {
        capabilities: TransportCapabilities::in_memory(),
        outbound: tx_b,
        inbound: tokio::sync::Mutex::new(rx_a),
    };
    let b = InMemoryTransport {
        capabilities: TransportCapabilities::in_memory(),
        outbound: tx_a,
        inbound: tokio::sync::Mutex::new(rx_b),
    };
    (a, b)
}

#[async_trait]
impl Transport for InMemoryTransport {
    fn transport_type(&self) -> TransportType {
        TransportType::InMemory
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

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn messages_flow_in_both_directions() {
        let (a, b) = pair();
        a.send(Message::notification("ping", None)).await.unwrap();
        let received = b.recv().await.unwrap().unwrap();
        assert_eq!(received.method(), Some("ping"));

        b.send(Message::notification("pong", None)).await.unwrap();
        let received = a.recv().await.unwrap().unwrap();
        assert_eq!(received.method(), Some("pong"));
    }

    #[tokio::test]
    async fn closing_one_end_surfaces_as_closed_to_sender() {
        let (a, b) = pair();
        drop(b);
        let err = a.send(Message::notification("x", None)).await.unwrap_err();
        assert!(matches!(err, TransportError::Closed));
    }

    #[tokio::test]
    async fn dropping_sender_ends_recv_with_none() {
        let (a, b) = pair();
        drop(a);
        assert_eq!(b.recv().await.unwrap(), None);
    }
}
