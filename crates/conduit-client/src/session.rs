//! Client-side session lifecycle: `disconnected -> initializing -> ready ->
//! error -> disconnected`. Mirrors `conduit_server::session::Session`'s
//! state machine, but a client session also caches what the handshake
//! negotiated (server info, server capabilities, protocol version) and the
//! error that sent it into `Error`, since `wait_for_ready` needs to surface
//! that error to the caller verbatim.

use conduit_core::McpError;
use conduit_protocol::{Implementation, ServerCapabilities};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Disconnected,
    Initializing,
    Ready,
    Error,
}

impl ClientState {
    /// Legal forward transitions for the client side. Same shape as the
    /// server's state machine in `conduit_server::session`: forward-only,
    /// plus the universal escape into `Error` and back to `Disconnected`.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Disconnected, Self::Initializing)
                | (Self::Initializing, Self::Ready)
                | (Self::Initializing, Self::Error)
                | (Self::Ready, Self::Error)
                | (Self::Ready, Self::Disconnected)
                | (Self::Error, Self::Disconnected)
        )
    }
}

/// What the handshake negotiated, plus whatever sent the session into
/// `Error`. Held behind a single lock in `ClientSession` so `wait_for_ready`
/// observes a consistent snapshot.
#[derive(Debug, Clone, Default)]
pub struct ClientSession {
    state_inner: Option<ClientState>,
    pub server_info: Option<Implementation>,
    pub server_capabilities: Option<ServerCapabilities>,
    pub negotiated_version: Option<String>,
    pub error_info: Option<McpError>,
}

impl ClientSession {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state_inner: Some(ClientState::Disconnected),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn state(&self) -> ClientState {
        self.state_inner.unwrap_or(ClientState::Disconnected)
    }

    /// Attempt a transition, raising synchronously (returning an error to
    /// the caller, never reaching the wire) when the move is illegal.
    ///
    /// # Errors
    /// `McpError` with `ErrorKind::InvalidStateTransition` when the current
    /// state does not permit moving to `next`.
    pub fn transition(&mut self, next: ClientState) -> Result<(), McpError> {
        if !self.state().can_transition_to(next) {
            return Err(McpError::invalid_state_transition(
                &format!("{:?}", self.state()),
                &format!("{next:?}"),
            ));
        }
        self.state_inner = Some(next);
        Ok(())
    }

    /// Move straight to `Error`, recording why. Used when the handshake
    /// itself fails rather than a caller-driven transition being rejected.
    pub fn fail(&mut self, error: McpError) {
        self.state_inner = Some(ClientState::Error);
        self.error_info = Some(error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_disconnected() {
        assert_eq!(ClientSession::new().state(), ClientState::Disconnected);
    }

    #[test]
    fn legal_forward_path() {
        let mut session = ClientSession::new();
        session.transition(ClientState::Initializing).unwrap();
        session.transition(ClientState::Ready).unwrap();
        session.transition(ClientState::Disconnected).unwrap();
    }

    #[test]
    fn rejects_illegal_jump() {
        let mut session = ClientSession::new();
        let err = session.transition(ClientState::Ready).unwrap_err();
        assert_eq!(err.kind, conduit_core::ErrorKind::InvalidStateTransition);
    }

    #[test]
    fn fail_moves_to_error_and_records_cause() {
        let mut session = ClientSession::new();
        session.transition(ClientState::Initializing).unwrap();
        session.fail(McpError::internal("boom"));
        assert_eq!(session.state(), ClientState::Error);
        assert_eq!(session.error_info.as_ref().unwrap().message, "boom");
    }
}
