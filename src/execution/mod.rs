//! Execution attempts
//!
//! An [`Execution`] is one attempt of running a subtask in one slot. It owns
//! the attempt's state, per-state timestamps, assigned slot and failure
//! cause, and implements the cancellation protocol against the slot's
//! worker gateway.
//!
//! Cancel flows:
//! - CREATED/SCHEDULED: straight to CANCELED, nothing was dispatched
//! - DEPLOYING/RUNNING: CANCELING, then a cancel RPC. An acknowledgement
//!   keeps the attempt in CANCELING until the worker reports the task
//!   stopped; a failed or timed out RPC fails open to CANCELED.
//!
//! Every path into a terminal state deregisters the attempt and releases
//! its slot in the same step. Once terminal, every request is a no-op that
//! reports the unchanged state.

mod event;
mod snapshot;

pub use event::AttemptEvent;
pub use snapshot::AttemptSnapshot;

use std::sync::Arc;

use attempt_protocol::{AttemptId, FailureCause, TaskDeployment, WorkerReport};
use tracing::{debug, warn};

use crate::control::{Control, RpcOp};
use crate::registry::AttemptLocation;
use crate::slot::AllocatedSlot;
use crate::state::{now_millis, AttemptState, StateTimestamps, TerminalState};

/// One attempt of running a subtask
#[derive(Debug)]
pub struct Execution {
    attempt_id: AttemptId,
    vertex_index: usize,
    attempt_number: u32,
    state: AttemptState,
    timestamps: StateTimestamps,
    assigned_slot: Option<Arc<AllocatedSlot>>,
    failure_cause: Option<FailureCause>,
}

impl Execution {
    /// Create a new attempt in CREATED state with a fresh id
    pub fn new(vertex_index: usize, attempt_number: u32) -> Self {
        let mut timestamps = StateTimestamps::new();
        timestamps.record(AttemptState::Created, now_millis());

        Self {
            attempt_id: AttemptId::new(),
            vertex_index,
            attempt_number,
            state: AttemptState::Created,
            timestamps,
            assigned_slot: None,
            failure_cause: None,
        }
    }

    pub fn attempt_id(&self) -> AttemptId {
        self.attempt_id
    }

    pub fn vertex_index(&self) -> usize {
        self.vertex_index
    }

    pub fn attempt_number(&self) -> u32 {
        self.attempt_number
    }

    pub fn location(&self) -> AttemptLocation {
        AttemptLocation {
            vertex_index: self.vertex_index,
            attempt_number: self.attempt_number,
        }
    }

    pub fn state(&self) -> AttemptState {
        self.state
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Entry time of `state` in epoch millis, `0` if never entered
    pub fn state_timestamp(&self, state: AttemptState) -> i64 {
        self.timestamps.get(state)
    }

    /// Failure cause, present only once the attempt is FAILED
    pub fn failure_info(&self) -> Option<&FailureCause> {
        match self.state {
            AttemptState::Failed => self.failure_cause.as_ref(),
            _ => None,
        }
    }

    pub fn assigned_slot(&self) -> Option<&Arc<AllocatedSlot>> {
        self.assigned_slot.as_ref()
    }

    /// CREATED → SCHEDULED
    pub fn transition_to_scheduled(&mut self, control: &mut Control) -> AttemptState {
        self.transition(AttemptState::Scheduled, control);
        self.state
    }

    /// SCHEDULED → DEPLOYING: occupy `slot`, register, submit the task.
    ///
    /// A slot that is already released fails the attempt instead.
    pub fn deploy(
        &mut self,
        slot: Arc<AllocatedSlot>,
        task_name: &str,
        control: &mut Control,
    ) -> AttemptState {
        if self.state != AttemptState::Scheduled {
            debug!(attempt_id = %self.attempt_id, state = %self.state, "deploy ignored");
            return self.state;
        }

        if !slot.is_alive() {
            let cause = FailureCause::new(
                "DEPLOY",
                format!("slot {} was released before deployment", slot.id()),
            );
            return self.mark_failed(cause, control);
        }

        self.assigned_slot = Some(Arc::clone(&slot));
        self.transition(AttemptState::Deploying, control);
        control.registry.insert(self.attempt_id, self.location());

        let deployment = TaskDeployment {
            attempt_id: self.attempt_id,
            slot_id: slot.id().clone(),
            task_name: task_name.to_string(),
            subtask_index: self.vertex_index,
            attempt_number: self.attempt_number,
        };
        let reply = control.reply(self.attempt_id, RpcOp::Submit);
        slot.gateway()
            .submit_task(deployment, control.timeouts().submit, reply);

        self.state
    }

    /// DEPLOYING → RUNNING, on the worker's report
    pub fn switch_to_running(&mut self, control: &mut Control) -> AttemptState {
        match self.state {
            AttemptState::Deploying => {
                self.transition(AttemptState::Running, control);
            }
            // The task started before our cancel reached it
            AttemptState::Canceling => {
                debug!(attempt_id = %self.attempt_id, "running report while canceling ignored");
            }
            state => {
                debug!(attempt_id = %self.attempt_id, %state, "running report ignored");
            }
        }
        self.state
    }

    /// RUNNING → FINISHED
    ///
    /// A task that finishes while we are canceling it has stopped all the
    /// same, so that case completes the cancel.
    pub fn mark_finished(&mut self, control: &mut Control) -> AttemptState {
        match self.state {
            AttemptState::Running => {
                self.transition(AttemptState::Finished, control);
            }
            AttemptState::Canceling => {
                self.complete_cancelling(control);
            }
            state => {
                debug!(attempt_id = %self.attempt_id, %state, "finished report ignored");
            }
        }
        self.state
    }

    /// Request cancellation. Idempotent; returns the resulting state.
    pub fn cancel(&mut self, control: &mut Control) -> AttemptState {
        match self.state {
            AttemptState::Created | AttemptState::Scheduled => {
                // Nothing dispatched: pass through CANCELING without an RPC
                let now = now_millis();
                self.timestamps.record(AttemptState::Canceling, now);
                self.transition_at(AttemptState::Canceled, now, control);
            }
            AttemptState::Deploying | AttemptState::Running => {
                self.transition(AttemptState::Canceling, control);
                self.send_cancel(control);
            }
            AttemptState::Canceling
            | AttemptState::Finished
            | AttemptState::Canceled
            | AttemptState::Failed => {
                debug!(attempt_id = %self.attempt_id, state = %self.state, "cancel is a no-op");
            }
        }
        self.state
    }

    /// The worker reports the task actually stopped: CANCELING → CANCELED
    pub fn complete_cancelling(&mut self, control: &mut Control) -> AttemptState {
        if self.state == AttemptState::Canceling {
            self.transition(AttemptState::Canceled, control);
        } else {
            debug!(
                attempt_id = %self.attempt_id,
                state = %self.state,
                "cancel completion ignored"
            );
        }
        self.state
    }

    /// Any live state → FAILED with `cause`
    ///
    /// Racing an in-flight cancel, whichever terminal transition runs first
    /// wins; the loser is a no-op.
    pub fn mark_failed(&mut self, cause: FailureCause, control: &mut Control) -> AttemptState {
        if self.state.is_terminal() {
            debug!(
                attempt_id = %self.attempt_id,
                state = %self.state,
                %cause,
                "failure after terminal state ignored"
            );
            return self.state;
        }

        warn!(attempt_id = %self.attempt_id, from = %self.state, %cause, "attempt failed");
        self.failure_cause = Some(cause);
        self.transition(AttemptState::Failed, control);
        self.state
    }

    /// Apply an asynchronous result. Single entry point for everything the
    /// mailbox delivers.
    pub fn handle_event(&mut self, event: AttemptEvent, control: &mut Control) -> AttemptState {
        match event {
            AttemptEvent::CancelAcknowledged => {
                control.deadlines.clear(&self.attempt_id);
                debug!(
                    attempt_id = %self.attempt_id,
                    state = %self.state,
                    "cancel acknowledged, awaiting completion report"
                );
                self.state
            }
            AttemptEvent::CancelDeliveryFailed(error) => {
                control.deadlines.clear(&self.attempt_id);
                if self.state == AttemptState::Canceling {
                    if error.is_communication_failure() {
                        warn!(
                            attempt_id = %self.attempt_id,
                            %error,
                            "cancel RPC failed, assuming task is lost"
                        );
                    } else {
                        warn!(
                            attempt_id = %self.attempt_id,
                            %error,
                            "worker rejected cancel, releasing attempt anyway"
                        );
                    }
                    self.transition(AttemptState::Canceled, control);
                } else {
                    debug!(attempt_id = %self.attempt_id, %error, "late cancel failure ignored");
                }
                self.state
            }
            AttemptEvent::SubmitFailed(error) => {
                let cause = FailureCause::new("DEPLOY", format!("cannot deploy task: {error}"));
                self.mark_failed(cause, control)
            }
            AttemptEvent::Reported(report) => match report {
                WorkerReport::Running => self.switch_to_running(control),
                WorkerReport::Finished => self.mark_finished(control),
                WorkerReport::Canceled => self.complete_cancelling(control),
                WorkerReport::Failed { cause } => self.mark_failed(cause, control),
            },
        }
    }

    pub fn snapshot(&self) -> AttemptSnapshot {
        AttemptSnapshot {
            attempt_id: self.attempt_id,
            vertex_index: self.vertex_index,
            attempt_number: self.attempt_number,
            state: self.state,
            state_timestamps: self.timestamps.to_map(),
            slot_id: self.assigned_slot.as_ref().map(|s| s.id().clone()),
            slot_alive: self.assigned_slot.as_ref().is_some_and(|s| s.is_alive()),
            failure: self.failure_info().cloned(),
        }
    }

    fn send_cancel(&mut self, control: &mut Control) {
        let slot = match self.assigned_slot.as_ref().filter(|s| s.is_alive()) {
            Some(slot) => Arc::clone(slot),
            None => {
                // Nobody left to ask
                warn!(attempt_id = %self.attempt_id, "no live slot, canceling locally");
                self.transition(AttemptState::Canceled, control);
                return;
            }
        };

        control.arm_cancel_deadline(self.attempt_id);
        let reply = control.reply(self.attempt_id, RpcOp::Cancel);
        slot.gateway()
            .cancel_task(self.attempt_id, control.timeouts().cancel, reply);
    }

    fn transition(&mut self, target: AttemptState, control: &mut Control) -> bool {
        self.transition_at(target, now_millis(), control)
    }

    fn transition_at(&mut self, target: AttemptState, now: i64, control: &mut Control) -> bool {
        if !self.state.can_transition_to(target) {
            debug!(
                attempt_id = %self.attempt_id,
                from = %self.state,
                to = %target,
                "transition ignored"
            );
            return false;
        }

        let from = self.state;
        self.timestamps.record(target, now);
        self.state = target;
        debug!(attempt_id = %self.attempt_id, %from, to = %target, "attempt transition");

        if target.is_terminal() {
            control.registry.remove(&self.attempt_id);
            control.deadlines.clear(&self.attempt_id);
            self.release_assigned_slot();
        }
        true
    }

    fn release_assigned_slot(&self) {
        if let Some(slot) = &self.assigned_slot {
            if slot.release() {
                debug!(attempt_id = %self.attempt_id, slot_id = %slot.id(), "slot released");
            }
        }
    }
}
