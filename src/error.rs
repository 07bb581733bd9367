//! Coordinator errors
//!
//! Expected races (cancel after finish, late acks, duplicate reports) are
//! never errors. These cover caller mistakes and bookkeeping surprises.

use attempt_protocol::AttemptId;

use crate::config::ConfigError;
use crate::state::AttemptState;

#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("Unknown attempt {0}")]
    UnknownAttempt(AttemptId),

    #[error("Vertex index {index} out of range (parallelism {len})")]
    VertexOutOfRange { index: usize, len: usize },

    #[error("Current attempt is {state}, only CANCELED or FAILED attempts can be retried")]
    NotResettable { state: AttemptState },

    #[error("Vertex {index} has used all {max} attempts")]
    AttemptsExhausted { index: usize, max: u32 },

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

pub type CoordinatorResult<T> = Result<T, CoordinatorError>;
