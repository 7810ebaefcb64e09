//! Standard I/O transport: newline-delimited JSON over stdin/stdout.
//!
//! Per the MCP stdio spec, each message is exactly one line; messages
//! **MUST NOT** contain embedded newlines. This transport validates that on
//! send (reject before writing). On receive, a line that fails to decode —
//! whether the codec itself rejects the framing or the JSON-RPC envelope is
//! malformed — is logged and skipped; the next well-formed line is still
//! delivered, matching the external-interface rule that malformed lines
//! never end the stream.
//!
//! Logging goes to `tracing`, which defaults to stderr, never stdout: stdout
//! is the message channel, any program output there would corrupt the
//! stream.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use conduit_core::Message;
use futures::{SinkExt, StreamExt};
use tokio::io::{BufReader, Stdin, Stdout};
use tokio::sync::Mutex as TokioMutex;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};

use crate::core::{Transport, TransportCapabilities, TransportError, TransportResult, TransportState, TransportType};

type StdinReader = FramedRead<BufReader<Stdin>, LinesCodec>;
type StdoutWriter = FramedWrite<Stdout, LinesCodec>;

/// The single stdio session. Only one of these is ever constructed per
/// process: there is exactly one stdin and one stdout.
#[derive(Debug)]
pub struct StdioTransport {
    capabilities: TransportCapabilities,
    closed: AtomicBool,
    state: StdMutex<TransportState>,
    reader: TokioMutex<StdinReader>,
    writer: TokioMutex<StdoutWriter>,
}

impl StdioTransport {
    #[must_use]
    pub fn new() -> Self {
        Self {
            capabilities: TransportCapabilities::stdio(),
            closed: AtomicBool::new(false),
            state: StdMutex::new(TransportState::Connected),
            reader: TokioMutex::new(FramedRead::new(BufReader::new(tokio::io::stdin()), LinesCodec::new())),
            writer: TokioMutex::new(FramedWrite::new(tokio::io::stdout(), LinesCodec::new())),
        }
    }

    /// Fixed, well-known id used wherever a session table needs a key for
    /// the stdio transport (there is only ever one stdio session per process).
    pub const SESSION_ID: &'static str = "stdio";
}

impl Default for StdioTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for StdioTransport {
    fn transport_type(&self) -> TransportType {
        TransportType::Stdio
    }

    fn capabilities(&self) -> &TransportCapabilities {
        &self.capabilities
    }

    async fn state(&self) -> TransportState {
        self.state.lock().unwrap().clone()
    }

    async fn send(&self, message: Message) -> TransportResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        let bytes = conduit_core::encode(&message).map_err(|e| TransportError::SendFailed(e.message))?;
        let line = std::str::from_utf8(&bytes).map_err(|e| TransportError::SendFailed(e.to_string()))?;
        if line.contains('\n') || line.contains('\r') {
            return Err(TransportError::FramingViolation(
                "encoded message contains an embedded newline".to_string(),
            ));
        }
        let mut writer = self.writer.lock().await;
        writer
            .send(line.to_string())
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn recv(&self) -> TransportResult<Option<Message>> {
        if self.closed.load(Ordering::Acquire) {
            return Ok(None);
        }
        let mut reader = self.reader.lock().await;
        loop {
            match reader.next().await {
                None => {
                    *self.state.lock().unwrap() = TransportState::Disconnected;
                    return Ok(None);
                }
                // A single bad line (framing violation at the codec level, e.g.
                // a line exceeding the codec's length limit) is logged and
                // skipped; it does not end the stream.
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "malformed stdio line, skipping");
                    continue;
                }
                Some(Ok(line)) => {
                    // Per spec, blank lines between messages are tolerated, not a message.
                    if line.trim().is_empty() {
                        continue;
                    }
                    match conduit_core::decode(line.as_bytes()) {
                        Ok(message) => return Ok(Some(message)),
                        Err(err) => {
                            tracing::warn!(error = %err.message, line, "malformed stdio line, skipping");
                            continue;
                        }
                    }
                }
            }
        }
    }

    async fn close(&self) -> TransportResult<()> {
        self.closed.store(true, Ordering::Release);
        *self.state.lock().unwrap() = TransportState::Disconnected;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_is_stable() {
        assert_eq!(StdioTransport::SESSION_ID, "stdio");
    }

    #[tokio::test]
    async fn starts_connected() {
        let transport = StdioTransport::new();
        assert_eq!(transport.state().await, TransportState::Connected);
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let transport = StdioTransport::new();
        transport.close().await.unwrap();
        transport.close().await.unwrap();
        assert_eq!(transport.recv().await.unwrap(), None);
    }
}
