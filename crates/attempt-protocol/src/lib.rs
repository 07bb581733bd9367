//! Attempt Protocol Types
//!
//! Defines the values exchanged between the coordinator and remote workers:
//! attempt and slot identifiers, termination reports, and the error kinds a
//! worker gateway may resolve an RPC with.

pub mod error;
pub mod ids;
pub mod report;

pub use error::{ErrorCode, GatewayError};
pub use ids::{AttemptId, SlotId};
pub use report::{FailureCause, TaskDeployment, WorkerReport};

/// Default timeout applied to cancel RPCs, in milliseconds.
pub const DEFAULT_CANCEL_TIMEOUT_MS: u64 = 10_000;

/// Default timeout applied to submit RPCs, in milliseconds.
pub const DEFAULT_SUBMIT_TIMEOUT_MS: u64 = 10_000;
