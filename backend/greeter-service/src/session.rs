//! Per-call message exchange state for the streaming shapes
//!
//! ```text
//! Established -> Exchanging -> Completed
//!      \             \
//!       +-------------+--> Aborted
//! ```
//!
//! A session never re-enters `Exchanging` once terminal.

use grpc_jwt_auth::CallShape;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Established,
    Exchanging,
    Completed,
    Aborted,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Aborted)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("illegal session transition {from:?} -> {to:?}")]
    IllegalTransition {
        from: SessionState,
        to: SessionState,
    },

    #[error("no messages may be exchanged in state {0:?}")]
    NotExchanging(SessionState),
}

/// Message bookkeeping for one streaming call
#[derive(Debug)]
pub struct StreamSession {
    call_id: Uuid,
    shape: CallShape,
    state: SessionState,
    received: u64,
    sent: u64,
    abort_reason: Option<String>,
}

impl StreamSession {
    pub fn new(call_id: Uuid, shape: CallShape) -> Self {
        Self {
            call_id,
            shape,
            state: SessionState::Established,
            received: 0,
            sent: 0,
            abort_reason: None,
        }
    }

    pub fn call_id(&self) -> Uuid {
        self.call_id
    }

    pub fn shape(&self) -> CallShape {
        self.shape
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn received(&self) -> u64 {
        self.received
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }

    pub fn abort_reason(&self) -> Option<&str> {
        self.abort_reason.as_deref()
    }

    pub fn begin(&mut self) -> Result<(), SessionError> {
        self.transition(SessionState::Established, SessionState::Exchanging)
    }

    pub fn complete(&mut self) -> Result<(), SessionError> {
        self.transition(SessionState::Exchanging, SessionState::Completed)
    }

    /// Abort from any non-terminal state; aborting twice keeps the first reason
    pub fn abort(&mut self, reason: impl Into<String>) -> Result<(), SessionError> {
        match self.state {
            SessionState::Aborted => Ok(()),
            SessionState::Completed => Err(SessionError::IllegalTransition {
                from: SessionState::Completed,
                to: SessionState::Aborted,
            }),
            SessionState::Established | SessionState::Exchanging => {
                self.state = SessionState::Aborted;
                self.abort_reason = Some(reason.into());
                Ok(())
            }
        }
    }

    pub fn record_received(&mut self) -> Result<(), SessionError> {
        self.ensure_exchanging()?;
        self.received += 1;
        Ok(())
    }

    pub fn record_sent(&mut self) -> Result<(), SessionError> {
        self.ensure_exchanging()?;
        self.sent += 1;
        Ok(())
    }

    fn ensure_exchanging(&self) -> Result<(), SessionError> {
        if self.state != SessionState::Exchanging {
            return Err(SessionError::NotExchanging(self.state));
        }
        Ok(())
    }

    fn transition(&mut self, from: SessionState, to: SessionState) -> Result<(), SessionError> {
        if self.state != from {
            return Err(SessionError::IllegalTransition {
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }
}

impl Drop for StreamSession {
    // The transport drops the handler future when the peer goes away.
    fn drop(&mut self) {
        if !self.state.is_terminal() {
            self.state = SessionState::Aborted;
            debug!(
                call_id = %self.call_id,
                shape = %self.shape,
                received = self.received,
                sent = self.sent,
                "Stream session dropped before completion"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> StreamSession {
        StreamSession::new(Uuid::new_v4(), CallShape::Bidirectional)
    }

    #[test]
    fn test_happy_path() {
        let mut session = session();
        assert_eq!(session.state(), SessionState::Established);

        session.begin().unwrap();
        session.record_received().unwrap();
        session.record_sent().unwrap();
        session.complete().unwrap();

        assert_eq!(session.state(), SessionState::Completed);
        assert_eq!((session.received(), session.sent()), (1, 1));
    }

    #[test]
    fn test_cannot_exchange_before_begin() {
        let mut session = session();
        assert_eq!(
            session.record_received().unwrap_err(),
            SessionError::NotExchanging(SessionState::Established)
        );
    }

    #[test]
    fn test_no_exchange_after_completion() {
        let mut session = session();
        session.begin().unwrap();
        session.complete().unwrap();

        assert!(session.begin().is_err());
        assert!(session.record_sent().is_err());
        assert!(session.abort("late").is_err());
    }

    #[test]
    fn test_abort_from_established_and_exchanging() {
        let mut early = session();
        early.abort("peer cancelled").unwrap();
        assert_eq!(early.state(), SessionState::Aborted);

        let mut mid = session();
        mid.begin().unwrap();
        mid.abort("transport error").unwrap();
        assert_eq!(mid.abort_reason(), Some("transport error"));
    }

    #[test]
    fn test_abort_is_idempotent() {
        let mut session = session();
        session.begin().unwrap();
        session.abort("first").unwrap();
        session.abort("second").unwrap();

        assert_eq!(session.abort_reason(), Some("first"));
        assert!(session.begin().is_err());
        assert!(session.complete().is_err());
    }
}
