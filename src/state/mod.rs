//! Attempt state machine
//!
//! Implements the state machine for execution attempts:
//! - Happy path: CREATED → SCHEDULED → DEPLOYING → RUNNING → FINISHED
//! - Cancel: CREATED/SCHEDULED → CANCELED, DEPLOYING/RUNNING → CANCELING → CANCELED
//! - Any live state → FAILED

mod attempt_state;
mod timestamps;

pub use attempt_state::AttemptState;
pub use timestamps::StateTimestamps;

use chrono::Utc;

/// Current wall-clock time in epoch milliseconds
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Check if a state is terminal (no further transitions possible)
pub trait TerminalState {
    fn is_terminal(&self) -> bool;
}
