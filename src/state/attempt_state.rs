//! Attempt state enumeration and transition table
//!
//! CREATED → SCHEDULED → DEPLOYING → RUNNING → FINISHED, with CANCELING as
//! the intermediate state of a cancel that needs the worker's cooperation.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::TerminalState;

/// State of one execution attempt
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttemptState {
    /// Attempt exists but nothing has been requested yet
    Created,
    /// Waiting for a slot
    Scheduled,
    /// Submitted to a worker, not yet confirmed running
    Deploying,
    /// Executing on the worker
    Running,
    /// Completed successfully
    Finished,
    /// Cancel sent to the worker, waiting for it to stop the task
    Canceling,
    /// Cancelled
    Canceled,
    /// Failed locally or remotely
    Failed,
}

impl AttemptState {
    /// Every state, in declaration order
    pub const ALL: [AttemptState; 8] = [
        AttemptState::Created,
        AttemptState::Scheduled,
        AttemptState::Deploying,
        AttemptState::Running,
        AttemptState::Finished,
        AttemptState::Canceling,
        AttemptState::Canceled,
        AttemptState::Failed,
    ];

    /// Position in [`AttemptState::ALL`]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Check if transition from this state to target is legal
    pub fn can_transition_to(&self, target: AttemptState) -> bool {
        use AttemptState::*;

        match (self, target) {
            // Happy path
            (Created, Scheduled) => true,
            (Scheduled, Deploying) => true,
            (Deploying, Running) => true,
            (Running, Finished) => true,

            // Nothing dispatched yet, cancel needs no RPC
            (Created, Canceled) | (Scheduled, Canceled) => true,

            // Dispatched, cancel goes through the worker
            (Deploying, Canceling) | (Running, Canceling) => true,
            (Canceling, Canceled) => true,

            (from, Failed) => !from.is_terminal(),

            _ => false,
        }
    }

    /// True while a worker slot is occupied by this attempt
    pub fn is_dispatched(&self) -> bool {
        matches!(
            self,
            AttemptState::Deploying | AttemptState::Running | AttemptState::Canceling
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptState::Created => "CREATED",
            AttemptState::Scheduled => "SCHEDULED",
            AttemptState::Deploying => "DEPLOYING",
            AttemptState::Running => "RUNNING",
            AttemptState::Finished => "FINISHED",
            AttemptState::Canceling => "CANCELING",
            AttemptState::Canceled => "CANCELED",
            AttemptState::Failed => "FAILED",
        }
    }
}

impl TerminalState for AttemptState {
    fn is_terminal(&self) -> bool {
        matches!(
            self,
            AttemptState::Finished | AttemptState::Canceled | AttemptState::Failed
        )
    }
}

impl fmt::Display for AttemptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_edges() {
        assert!(AttemptState::Created.can_transition_to(AttemptState::Scheduled));
        assert!(AttemptState::Scheduled.can_transition_to(AttemptState::Deploying));
        assert!(AttemptState::Deploying.can_transition_to(AttemptState::Running));
        assert!(AttemptState::Running.can_transition_to(AttemptState::Finished));
    }

    #[test]
    fn test_cancel_edges() {
        assert!(AttemptState::Created.can_transition_to(AttemptState::Canceled));
        assert!(AttemptState::Scheduled.can_transition_to(AttemptState::Canceled));
        assert!(AttemptState::Deploying.can_transition_to(AttemptState::Canceling));
        assert!(AttemptState::Running.can_transition_to(AttemptState::Canceling));
        assert!(AttemptState::Canceling.can_transition_to(AttemptState::Canceled));

        // A dispatched attempt cannot skip the worker
        assert!(!AttemptState::Running.can_transition_to(AttemptState::Canceled));
        assert!(!AttemptState::Created.can_transition_to(AttemptState::Canceling));
    }

    #[test]
    fn test_every_live_state_can_fail() {
        for state in AttemptState::ALL {
            assert_eq!(
                state.can_transition_to(AttemptState::Failed),
                !state.is_terminal(),
                "{state}"
            );
        }
    }

    #[test]
    fn test_terminal_states_have_no_outgoing_edges() {
        for from in AttemptState::ALL.iter().filter(|s| s.is_terminal()) {
            for to in AttemptState::ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn test_no_skipping_forward() {
        assert!(!AttemptState::Created.can_transition_to(AttemptState::Running));
        assert!(!AttemptState::Scheduled.can_transition_to(AttemptState::Finished));
        assert!(!AttemptState::Canceling.can_transition_to(AttemptState::Finished));
    }

    #[test]
    fn test_dispatched_states() {
        let dispatched: Vec<_> = AttemptState::ALL
            .into_iter()
            .filter(|s| s.is_dispatched())
            .collect();
        assert_eq!(
            dispatched,
            vec![
                AttemptState::Deploying,
                AttemptState::Running,
                AttemptState::Canceling
            ]
        );
    }

    #[test]
    fn test_index_matches_all() {
        for (i, state) in AttemptState::ALL.iter().enumerate() {
            assert_eq!(state.index(), i);
        }
    }

    #[test]
    fn test_serialization() {
        let json = serde_json::to_string(&AttemptState::Canceling).unwrap();
        assert_eq!(json, "\"CANCELING\"");
        let parsed: AttemptState = serde_json::from_str("\"FAILED\"").unwrap();
        assert_eq!(parsed, AttemptState::Failed);
        assert_eq!(AttemptState::Deploying.to_string(), "DEPLOYING");
    }
}
