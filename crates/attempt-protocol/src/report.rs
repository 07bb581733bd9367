//! Messages flowing between coordinator and worker.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::{AttemptId, SlotId};

/// Why an attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureCause {
    /// Short machine-readable kind, e.g. `USER_CODE`, `DEPLOY`, `LOST`.
    pub kind: String,
    /// Human-readable, single-line message.
    pub message: String,
}

impl FailureCause {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Out-of-band report from a worker about what actually happened to a task.
///
/// Delivered at most once per real remote outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerReport {
    /// The task started executing.
    Running,
    /// The task ran to completion.
    Finished,
    /// The task stopped in response to a cancel request.
    Canceled,
    /// The task failed on the worker.
    Failed { cause: FailureCause },
}

impl WorkerReport {
    pub fn failed(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            cause: FailureCause::new(kind, message),
        }
    }
}

/// Payload of a submit RPC.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDeployment {
    pub attempt_id: AttemptId,
    pub slot_id: SlotId,
    /// Name of the job vertex the subtask belongs to.
    pub task_name: String,
    pub subtask_index: usize,
    pub attempt_number: u32,
}
