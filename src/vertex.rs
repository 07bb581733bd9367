//! Execution vertex: one parallel subtask and its attempt history
//!
//! The vertex always has exactly one current attempt. A retry supersedes it
//! with a new attempt under a fresh id; superseded attempts are kept for
//! diagnostics and never touched again.

use std::sync::Arc;

use attempt_protocol::{AttemptId, FailureCause};
use tracing::info;

use crate::control::Control;
use crate::error::{CoordinatorError, CoordinatorResult};
use crate::execution::Execution;
use crate::slot::AllocatedSlot;
use crate::state::AttemptState;

#[derive(Debug)]
pub struct ExecutionVertex {
    task_name: String,
    subtask_index: usize,
    max_attempts: u32,
    /// Superseded attempts, oldest first
    prior: Vec<Execution>,
    current: Execution,
}

impl ExecutionVertex {
    pub fn new(task_name: impl Into<String>, subtask_index: usize, max_attempts: u32) -> Self {
        Self {
            task_name: task_name.into(),
            subtask_index,
            max_attempts,
            prior: Vec::new(),
            current: Execution::new(subtask_index, 0),
        }
    }

    pub fn task_name(&self) -> &str {
        &self.task_name
    }

    pub fn subtask_index(&self) -> usize {
        self.subtask_index
    }

    pub fn current_execution(&self) -> &Execution {
        &self.current
    }

    pub(crate) fn current_execution_mut(&mut self) -> &mut Execution {
        &mut self.current
    }

    /// State of the current attempt, which is the vertex's state
    pub fn execution_state(&self) -> AttemptState {
        self.current.state()
    }

    /// Attempt by number, current or superseded
    pub fn attempt(&self, attempt_number: u32) -> Option<&Execution> {
        self.attempts().find(|e| e.attempt_number() == attempt_number)
    }

    /// All attempts, oldest first; the last one is current
    pub fn attempts(&self) -> impl Iterator<Item = &Execution> {
        self.prior.iter().chain(std::iter::once(&self.current))
    }

    pub fn attempt_count(&self) -> usize {
        self.prior.len() + 1
    }

    pub fn schedule(&mut self, control: &mut Control) -> AttemptState {
        self.current.transition_to_scheduled(control)
    }

    pub fn deploy(&mut self, slot: Arc<AllocatedSlot>, control: &mut Control) -> AttemptState {
        self.current.deploy(slot, &self.task_name, control)
    }

    /// Cancel the current attempt; returns its resulting state
    pub fn cancel(&mut self, control: &mut Control) -> AttemptState {
        self.current.cancel(control)
    }

    pub fn mark_failed(&mut self, cause: FailureCause, control: &mut Control) -> AttemptState {
        self.current.mark_failed(cause, control)
    }

    /// Failure cause of the current attempt, if it is FAILED
    pub fn failure_info(&self) -> Option<&FailureCause> {
        self.current.failure_info()
    }

    /// Entry time of `state` for the current attempt, `0` if never entered
    pub fn state_timestamp(&self, state: AttemptState) -> i64 {
        self.current.state_timestamp(state)
    }

    /// Replace a CANCELED or FAILED current attempt with a fresh one
    pub fn reset_for_new_execution(&mut self) -> CoordinatorResult<AttemptId> {
        let state = self.current.state();
        if !matches!(state, AttemptState::Canceled | AttemptState::Failed) {
            return Err(CoordinatorError::NotResettable { state });
        }

        let next_number = self.current.attempt_number() + 1;
        if next_number >= self.max_attempts {
            return Err(CoordinatorError::AttemptsExhausted {
                index: self.subtask_index,
                max: self.max_attempts,
            });
        }

        let next = Execution::new(self.subtask_index, next_number);
        let superseded = std::mem::replace(&mut self.current, next);
        info!(
            task = %self.task_name,
            subtask = self.subtask_index,
            old_attempt = %superseded.attempt_id(),
            new_attempt = %self.current.attempt_id(),
            attempt_number = next_number,
            "new execution attempt"
        );
        self.prior.push(superseded);

        Ok(self.current.attempt_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeout::RpcTimeouts;

    fn control() -> Control {
        Control::new(RpcTimeouts::default())
    }

    #[test]
    fn test_new_vertex_has_one_created_attempt() {
        let vertex = ExecutionVertex::new("map", 3, 3);
        assert_eq!(vertex.execution_state(), AttemptState::Created);
        assert_eq!(vertex.attempt_count(), 1);
        assert_eq!(vertex.current_execution().attempt_number(), 0);
        assert_eq!(vertex.subtask_index(), 3);
        assert_eq!(vertex.task_name(), "map");
    }

    #[test]
    fn test_cancel_forwards_to_current() {
        let mut control = control();
        let mut vertex = ExecutionVertex::new("map", 0, 3);

        assert_eq!(vertex.cancel(&mut control), AttemptState::Canceled);
        assert!(vertex.failure_info().is_none());
        assert!(vertex.state_timestamp(AttemptState::Canceled) > 0);
    }

    #[test]
    fn test_failure_info_only_when_failed() {
        let mut control = control();
        let mut vertex = ExecutionVertex::new("map", 0, 3);
        assert!(vertex.failure_info().is_none());

        vertex.mark_failed(FailureCause::new("USER_CODE", "boom"), &mut control);
        assert_eq!(vertex.failure_info().unwrap().message, "boom");
    }

    #[test]
    fn test_reset_requires_canceled_or_failed() {
        let mut vertex = ExecutionVertex::new("map", 0, 3);
        let err = vertex.reset_for_new_execution().unwrap_err();
        assert!(matches!(
            err,
            CoordinatorError::NotResettable {
                state: AttemptState::Created
            }
        ));
    }

    #[test]
    fn test_reset_creates_fresh_attempt() {
        let mut control = control();
        let mut vertex = ExecutionVertex::new("map", 0, 3);
        let first = vertex.current_execution().attempt_id();
        vertex.mark_failed(FailureCause::new("USER_CODE", "boom"), &mut control);

        let second = vertex.reset_for_new_execution().unwrap();

        assert_ne!(first, second);
        assert_eq!(vertex.execution_state(), AttemptState::Created);
        assert!(vertex.failure_info().is_none());
        assert_eq!(vertex.attempt_count(), 2);
        assert_eq!(vertex.attempt(0).unwrap().state(), AttemptState::Failed);
        assert_eq!(vertex.attempt(1).unwrap().attempt_id(), second);
    }

    #[test]
    fn test_reset_respects_max_attempts() {
        let mut control = control();
        let mut vertex = ExecutionVertex::new("map", 5, 2);

        vertex.cancel(&mut control);
        vertex.reset_for_new_execution().unwrap();
        vertex.cancel(&mut control);

        let err = vertex.reset_for_new_execution().unwrap_err();
        assert!(matches!(
            err,
            CoordinatorError::AttemptsExhausted { index: 5, max: 2 }
        ));
        assert_eq!(vertex.attempt_count(), 2);
    }
}
