//! Server-side session lifecycle: `disconnected -> initializing -> ready ->
//! error -> disconnected`. Every request other than `initialize`/`ping`
//! checked against the session table before dispatch; a session in any
//! state but `ready` rejects everything else with `-32002`.

use conduit_core::{ErrorKind, McpError, TransportType};
use conduit_protocol::ServerCapabilities;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Initializing,
    Ready,
    Error,
}

impl SessionState {
    /// Whether a transition from `self` to `next` is legal. The state
    /// machine only ever moves forward, plus the universal escape into
    /// `Error` and back to `Disconnected` on close.
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

/// One connected peer's handshake state and negotiated properties.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub transport: TransportType,
    state: SessionState,
    pub protocol_version: Option<String>,
    pub capabilities: Option<ServerCapabilities>,
    pub log_level: conduit_core::LogLevel,
}

impl Session {
    #[must_use]
    pub fn new(id: impl Into<String>, transport: TransportType) -> Self {
        Self {
            id: id.into(),
            transport,
            state: SessionState::Disconnected,
            protocol_version: None,
            capabilities: None,
            log_level: conduit_core::LogLevel::default_threshold(),
        }
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Attempt a transition, returning an error naming both states when the
    /// move isn't legal.
    ///
    /// # Errors
    /// `McpError` with `ErrorKind::InvalidStateTransition` when the move
    /// from the current state to `next` is not one the state machine allows.
    pub fn transition(&mut self, next: SessionState) -> Result<(), McpError> {
        if !self.state.can_transition_to(next) {
            return Err(McpError::new(
                ErrorKind::InvalidStateTransition,
                format!("cannot move session from {:?} to {:?}", self.state, next),
            ));
        }
        self.state = next;
        Ok(())
    }

    /// Whether a request for `method` is allowed given the current state.
    #[must_use]
    pub fn allows(&self, method: &str) -> bool {
        self.state == SessionState::Ready || conduit_protocol::methods::PRE_INIT_ALLOWED.contains(&method)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legal_forward_path() {
        let mut session = Session::new("s1", TransportType::Stdio);
        assert_eq!(session.state(), SessionState::Disconnected);
        session.transition(SessionState::Initializing).unwrap();
        session.transition(SessionState::Ready).unwrap();
        session.transition(SessionState::Disconnected).unwrap();
    }

    #[test]
    fn rejects_illegal_jump() {
        let mut session = Session::new("s1", TransportType::Stdio);
        let err = session.transition(SessionState::Ready).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidStateTransition);
    }

    #[test]
    fn error_can_recover_to_disconnected_only() {
        let mut session = Session::new("s1", TransportType::Stdio);
        session.transition(SessionState::Initializing).unwrap();
        session.transition(SessionState::Error).unwrap();
        assert!(!session.state().can_transition_to(SessionState::Ready));
        session.transition(SessionState::Disconnected).unwrap();
    }

    #[test]
    fn pre_init_methods_allowed_before_ready() {
        let session = Session::new("s1", TransportType::Stdio);
        assert!(session.allows("initialize"));
        assert!(!session.allows("tools/list"));
    }

    #[test]
    fn ping_requires_ready_like_every_other_method() {
        let session = Session::new("s1", TransportType::Stdio);
        assert!(!session.allows("ping"));
    }

    #[test]
    fn ready_session_allows_everything() {
        let mut session = Session::new("s1", TransportType::Stdio);
        session.transition(SessionState::Initializing).unwrap();
        session.transition(SessionState::Ready).unwrap();
        assert!(session.allows("tools/list"));
    }
}
