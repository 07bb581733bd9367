//! Error types for gateway RPCs.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes a worker may answer an RPC with.
///
/// These codes are stable and used for automation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Malformed request or invalid field values.
    InvalidRequest,
    /// The worker does not know the referenced slot.
    SlotNotFound,
    /// Worker is at capacity.
    Busy,
    /// The worker is shutting down and accepts no more work.
    ShuttingDown,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidRequest => write!(f, "INVALID_REQUEST"),
            Self::SlotNotFound => write!(f, "SLOT_NOT_FOUND"),
            Self::Busy => write!(f, "BUSY"),
            Self::ShuttingDown => write!(f, "SHUTTING_DOWN"),
        }
    }
}

/// Ways a gateway RPC can fail.
///
/// A worker that cannot find the task it is asked to cancel still
/// acknowledges; "not found" is not an error at this layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GatewayError {
    #[error("RPC timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Reply dropped before the RPC resolved")]
    ReplyDropped,

    #[error("Worker rejected request ({code}): {message}")]
    Rejected { code: ErrorCode, message: String },
}

impl GatewayError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub fn rejected(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Rejected {
            code,
            message: message.into(),
        }
    }

    /// True when the request may or may not have reached the worker.
    ///
    /// A rejection is an explicit answer. Callers that must settle an
    /// attempt either way (cancel fails open on every error) use this only
    /// to report what happened.
    pub fn is_communication_failure(&self) -> bool {
        !matches!(self, GatewayError::Rejected { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_display() {
        assert_eq!(ErrorCode::SlotNotFound.to_string(), "SLOT_NOT_FOUND");
        assert_eq!(ErrorCode::ShuttingDown.to_string(), "SHUTTING_DOWN");
    }

    #[test]
    fn test_communication_failure_classification() {
        assert!(GatewayError::Timeout { timeout_ms: 10 }.is_communication_failure());
        assert!(GatewayError::transport("connection reset").is_communication_failure());
        assert!(GatewayError::ReplyDropped.is_communication_failure());
        assert!(!GatewayError::rejected(ErrorCode::Busy, "full").is_communication_failure());
    }

    #[test]
    fn test_error_serialization() {
        let err = GatewayError::Timeout { timeout_ms: 250 };
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "timeout");
        assert_eq!(json["timeout_ms"], 250);
    }
}
