//! Per-connection state.
//!
//! A [`Session`] is owned by whichever dispatcher accepted the connection.
//! The roster only ever holds [`SessionHandle`] clones, which can queue
//! events for the session but do not keep it alive.

use std::fmt;

use tokio::sync::mpsc;
use tracing::debug;

use crate::{event::ServerEvent, roster::RegisterError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Sending half of a session's outbound queue.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: SessionId,
    outbox: mpsc::UnboundedSender<ServerEvent>,
}

impl SessionHandle {
    pub fn new(id: SessionId, outbox: mpsc::UnboundedSender<ServerEvent>) -> Self {
        Self { id, outbox }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Queues an event for the session. Returns `false` when the session's
    /// receiver is gone; the event is dropped in that case.
    pub fn send(&self, event: ServerEvent) -> bool {
        match self.outbox.send(event) {
            Ok(()) => true,
            Err(_) => {
                debug!(session = %self.id, "dropping event for closed session");
                false
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Unnamed,
    Named { name: String },
    Disconnected,
}

#[derive(Debug)]
pub struct Session {
    handle: SessionHandle,
    state: SessionState,
}

impl Session {
    pub fn new(handle: SessionHandle) -> Self {
        Self {
            handle,
            state: SessionState::Unnamed,
        }
    }

    pub fn id(&self) -> SessionId {
        self.handle.id()
    }

    pub fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn name(&self) -> Option<&str> {
        match &self.state {
            SessionState::Named { name } => Some(name),
            _ => None,
        }
    }

    pub fn is_named(&self) -> bool {
        matches!(self.state, SessionState::Named { .. })
    }

    /// Fails unless the session is still `Unnamed`. A session registers at
    /// most once and never returns to `Unnamed`.
    pub(crate) fn ensure_unnamed(&self) -> Result<(), RegisterError> {
        match self.state {
            SessionState::Unnamed => Ok(()),
            _ => Err(RegisterError::AlreadyRegistered),
        }
    }

    pub(crate) fn assign_name(&mut self, name: String) -> Result<(), RegisterError> {
        self.ensure_unnamed()?;
        self.state = SessionState::Named { name };
        Ok(())
    }

    /// Moves the session to `Disconnected`, returning the name it held.
    /// Closing twice is a no-op.
    pub(crate) fn close(&mut self) -> Option<String> {
        match std::mem::replace(&mut self.state, SessionState::Disconnected) {
            SessionState::Named { name } => Some(name),
            SessionState::Unnamed | SessionState::Disconnected => None,
        }
    }
}

#[cfg(test)]
pub(crate) fn detached(raw: u64) -> (Session, mpsc::UnboundedReceiver<ServerEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = SessionHandle::new(SessionId::new(raw), tx);
    (Session::new(handle), rx)
}
