//! Per-call state created by the auth gate and carried in request extensions.

use std::fmt;
use std::time::{Duration, Instant};

use thiserror::Error;
use tonic::metadata::MetadataMap;
use uuid::Uuid;

const GRPC_TIMEOUT_HEADER: &str = "grpc-timeout";

/// The four call shapes the dispatcher serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallShape {
    Unary,
    ServerStreaming,
    ClientStreaming,
    Bidirectional,
}

impl CallShape {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unary => "unary",
            Self::ServerStreaming => "server_streaming",
            Self::ClientStreaming => "client_streaming",
            Self::Bidirectional => "bidirectional",
        }
    }

    pub fn is_streaming(&self) -> bool {
        !matches!(self, Self::Unary)
    }
}

impl fmt::Display for CallShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStatus {
    Pending,
    Accepted,
    Rejected,
    Completed,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("illegal call status transition {from:?} -> {to:?}")]
pub struct StatusTransitionError {
    pub from: CallStatus,
    pub to: CallStatus,
}

/// Call-scoped context
///
/// `identity` is only ever set together with the move to
/// [`CallStatus::Accepted`]; there is no way to attach an identity to a
/// rejected or pending call.
#[derive(Debug, Clone)]
pub struct CallContext {
    call_id: Uuid,
    identity: Option<String>,
    shape: Option<CallShape>,
    method: Option<&'static str>,
    status: CallStatus,
    deadline: Option<Instant>,
}

impl CallContext {
    /// New pending context for a call that just arrived
    pub fn pending(metadata: &MetadataMap) -> Self {
        let deadline = metadata
            .get(GRPC_TIMEOUT_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_grpc_timeout)
            .and_then(|timeout| Instant::now().checked_add(timeout));

        Self {
            call_id: Uuid::new_v4(),
            identity: None,
            shape: None,
            method: None,
            status: CallStatus::Pending,
            deadline,
        }
    }

    pub fn call_id(&self) -> Uuid {
        self.call_id
    }

    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    pub fn shape(&self) -> Option<CallShape> {
        self.shape
    }

    pub fn method(&self) -> Option<&'static str> {
        self.method
    }

    pub fn status(&self) -> CallStatus {
        self.status
    }

    /// Absolute deadline derived from the caller's `grpc-timeout`, if any
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn accept(&mut self, identity: impl Into<String>) -> Result<(), StatusTransitionError> {
        self.transition(CallStatus::Pending, CallStatus::Accepted)?;
        self.identity = Some(identity.into());
        Ok(())
    }

    pub fn reject(&mut self) -> Result<(), StatusTransitionError> {
        self.transition(CallStatus::Pending, CallStatus::Rejected)?;
        self.identity = None;
        Ok(())
    }

    pub fn complete(&mut self) -> Result<(), StatusTransitionError> {
        self.transition(CallStatus::Accepted, CallStatus::Completed)
    }

    /// Record which RPC the accepted call is bound to
    pub fn bind(&mut self, shape: CallShape, method: &'static str) {
        self.shape = Some(shape);
        self.method = Some(method);
    }

    fn transition(&mut self, from: CallStatus, to: CallStatus) -> Result<(), StatusTransitionError> {
        if self.status != from {
            return Err(StatusTransitionError {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }
}

/// Parse a `grpc-timeout` header value (`TimeoutValue TimeoutUnit`)
///
/// The value is at most 8 ASCII digits; the unit is one of `H M S m u n`.
pub fn parse_grpc_timeout(value: &str) -> Option<Duration> {
    let value = value.trim();
    if value.len() < 2 {
        return None;
    }

    let (digits, unit) = value.split_at(value.len() - 1);
    if digits.len() > 8 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let amount: u64 = digits.parse().ok()?;

    let duration = match unit {
        "H" => Duration::from_secs(amount.checked_mul(3600)?),
        "M" => Duration::from_secs(amount.checked_mul(60)?),
        "S" => Duration::from_secs(amount),
        "m" => Duration::from_millis(amount),
        "u" => Duration::from_micros(amount),
        "n" => Duration::from_nanos(amount),
        _ => return None,
    };

    Some(duration)
}
