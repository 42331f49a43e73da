use thiserror::Error;
use tonic::{Code, Status};

use crate::session::SessionError;

pub type Result<T> = std::result::Result<T, GreeterError>;

/// Failures raised after a call has been admitted
///
/// Authentication failures never reach this type; the auth gate ends those
/// calls before dispatch.
#[derive(Debug, Error)]
pub enum GreeterError {
    /// Business rule violated by the request; the message is returned as-is
    #[error("{0}")]
    Validation(String),

    /// Unexpected fault; the detail stays in the local log
    #[error("Internal server error: {0}")]
    Internal(String),

    /// Peer cancelled or the transport failed mid-call
    #[error("Call aborted: {0}")]
    Aborted(String),

    #[error("Deadline exceeded")]
    DeadlineExceeded,
}

impl GreeterError {
    /// Convert to gRPC Status for wire protocol
    pub fn to_status(&self) -> Status {
        match self {
            GreeterError::Validation(msg) => Status::new(Code::InvalidArgument, msg.clone()),
            GreeterError::Internal(detail) => {
                tracing::error!(detail = %detail, "Internal failure while handling call");
                // Don't leak internal details to the caller
                Status::new(Code::Internal, "Internal server error")
            }
            GreeterError::Aborted(reason) => {
                tracing::debug!(reason = %reason, "Call aborted");
                Status::new(Code::Cancelled, "Call aborted")
            }
            GreeterError::DeadlineExceeded => {
                Status::new(Code::DeadlineExceeded, "Deadline exceeded")
            }
        }
    }

    /// Whether the peer is expected to still be listening for a status
    pub fn is_reportable(&self) -> bool {
        !matches!(self, GreeterError::Aborted(_))
    }
}

impl From<SessionError> for GreeterError {
    fn from(err: SessionError) -> Self {
        GreeterError::Internal(err.to_string())
    }
}

impl From<anyhow::Error> for GreeterError {
    fn from(err: anyhow::Error) -> Self {
        GreeterError::Internal(format!("{err:#}"))
    }
}

// gRPC Status conversion
impl From<GreeterError> for Status {
    fn from(err: GreeterError) -> Self {
        err.to_status()
    }
}
