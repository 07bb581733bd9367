//! Execution graph for one job stage
//!
//! Owns the vertices, the registry of dispatched attempts and the control
//! mailbox. Holding `&mut ExecutionGraph` is what it means to be on the
//! control thread: every transition of every attempt happens through it,
//! one at a time, in the order events arrive.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use attempt_protocol::{AttemptId, FailureCause, GatewayError, WorkerReport};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::CoordinatorConfig;
use crate::control::{Control, ControlEvent, Mailbox};
use crate::error::{CoordinatorError, CoordinatorResult};
use crate::execution::{AttemptEvent, AttemptSnapshot, Execution};
use crate::registry::{AttemptLocation, ExecutionRegistry};
use crate::slot::AllocatedSlot;
use crate::state::{AttemptState, TerminalState};
use crate::vertex::ExecutionVertex;

/// Job status aggregated from the current attempt of every vertex
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Created,
    Running,
    Canceling,
    Finished,
    Canceled,
    Failed,
}

/// Result of applying queued events
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainOutcome {
    /// Events applied to a known attempt
    pub applied: usize,
    /// Events addressed to attempts this graph never created
    pub unknown: Vec<AttemptId>,
    /// Whether every dispatched attempt had settled afterwards
    pub settled: bool,
}

#[derive(Debug)]
pub struct ExecutionGraph {
    job_name: String,
    vertices: Vec<ExecutionVertex>,
    /// Every attempt ever created, current or superseded
    attempts: HashMap<AttemptId, AttemptLocation>,
    control: Control,
}

impl ExecutionGraph {
    pub fn new(job_name: impl Into<String>, parallelism: usize, config: &CoordinatorConfig) -> Self {
        let job_name = job_name.into();
        let vertices: Vec<_> = (0..parallelism)
            .map(|i| ExecutionVertex::new(job_name.clone(), i, config.max_attempts))
            .collect();
        let attempts = vertices
            .iter()
            .map(|v| {
                let execution = v.current_execution();
                (execution.attempt_id(), execution.location())
            })
            .collect();

        Self {
            job_name,
            vertices,
            attempts,
            control: Control::new(config.rpc_timeouts()),
        }
    }

    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    pub fn parallelism(&self) -> usize {
        self.vertices.len()
    }

    pub fn vertices(&self) -> &[ExecutionVertex] {
        &self.vertices
    }

    pub fn vertex(&self, index: usize) -> CoordinatorResult<&ExecutionVertex> {
        let len = self.vertices.len();
        self.vertices
            .get(index)
            .ok_or(CoordinatorError::VertexOutOfRange { index, len })
    }

    fn vertex_mut(&mut self, index: usize) -> CoordinatorResult<&mut ExecutionVertex> {
        let len = self.vertices.len();
        self.vertices
            .get_mut(index)
            .ok_or(CoordinatorError::VertexOutOfRange { index, len })
    }

    /// Look up any attempt this graph created
    pub fn execution(&self, attempt_id: &AttemptId) -> Option<&Execution> {
        let location = self.attempts.get(attempt_id)?;
        self.vertices
            .get(location.vertex_index)?
            .attempt(location.attempt_number)
    }

    /// Handle for workers to deliver reports from other threads
    pub fn mailbox(&self) -> Mailbox {
        self.control.mailbox()
    }

    /// Dispatched attempts that have not reached a terminal state
    pub fn registered_executions(&self) -> &ExecutionRegistry {
        self.control.registry()
    }

    /// True once every dispatched attempt has settled
    pub fn is_settled(&self) -> bool {
        self.control.registry().is_empty()
    }

    /// Cancel RPCs still waiting for an answer
    pub fn pending_cancels(&self) -> usize {
        self.control.deadlines().len()
    }

    pub fn schedule_all(&mut self) {
        for vertex in &mut self.vertices {
            vertex.schedule(&mut self.control);
        }
    }

    /// Deploy the current attempt of vertex `index` into `slot`
    pub fn deploy(&mut self, index: usize, slot: Arc<AllocatedSlot>) -> CoordinatorResult<AttemptState> {
        self.vertex(index)?;
        Ok(self.deploy_checked(index, slot))
    }

    pub fn switch_to_running(&mut self, index: usize) -> CoordinatorResult<AttemptState> {
        self.vertex(index)?;
        Ok(self.vertices[index]
            .current_execution_mut()
            .switch_to_running(&mut self.control))
    }

    /// Deploy every vertex into the slot `slot_for` returns and switch it to
    /// RUNNING. Returns the number of vertices that ended up running.
    pub fn switch_all_to_running<F>(&mut self, mut slot_for: F) -> usize
    where
        F: FnMut(usize) -> Arc<AllocatedSlot>,
    {
        for index in 0..self.vertices.len() {
            let slot = slot_for(index);
            self.deploy_checked(index, slot);
            self.vertices[index]
                .current_execution_mut()
                .switch_to_running(&mut self.control);
        }
        self.vertices
            .iter()
            .filter(|v| v.execution_state() == AttemptState::Running)
            .count()
    }

    /// Cancel the current attempt of vertex `index`
    ///
    /// Completions the gateway already posted are applied before returning,
    /// so a gateway that answers synchronously is reflected in the result.
    pub fn cancel_vertex(&mut self, index: usize) -> CoordinatorResult<AttemptState> {
        self.vertex(index)?;
        self.vertices[index].cancel(&mut self.control);
        self.run_pending();
        self.current_state(index)
    }

    /// Cancel every vertex
    pub fn cancel(&mut self) -> JobStatus {
        info!(job = %self.job_name, parallelism = self.vertices.len(), "canceling job");
        for vertex in &mut self.vertices {
            vertex.cancel(&mut self.control);
        }
        self.run_pending();
        self.job_status()
    }

    pub fn fail_vertex(&mut self, index: usize, cause: FailureCause) -> CoordinatorResult<AttemptState> {
        self.vertex(index)?;
        self.vertices[index].mark_failed(cause, &mut self.control);
        self.run_pending();
        self.current_state(index)
    }

    /// Start a new attempt for a CANCELED or FAILED vertex
    pub fn retry_vertex(&mut self, index: usize) -> CoordinatorResult<AttemptId> {
        let vertex = self.vertex_mut(index)?;
        let attempt_id = vertex.reset_for_new_execution()?;
        let location = vertex.current_execution().location();
        self.attempts.insert(attempt_id, location);
        Ok(attempt_id)
    }

    /// Apply an out-of-band report from a worker, returning the attempt's
    /// resulting state
    ///
    /// Reports for attempts that already settled are accepted and ignored.
    /// Reports for ids this graph never created are an error.
    pub fn report(&mut self, attempt_id: AttemptId, report: WorkerReport) -> CoordinatorResult<AttemptState> {
        let state = self.dispatch(ControlEvent {
            attempt_id,
            event: AttemptEvent::Reported(report),
        })?;
        self.run_pending();
        Ok(self
            .execution(&attempt_id)
            .map(Execution::state)
            .unwrap_or(state))
    }

    /// Apply every event already in the mailbox, without blocking
    pub fn run_pending(&mut self) -> DrainOutcome {
        let mut outcome = DrainOutcome::default();
        self.drain_into(&mut outcome);
        outcome.settled = self.is_settled();
        outcome
    }

    /// Apply events as they arrive until every dispatched attempt settled or
    /// `max_wait` elapsed. Cancel RPCs that pass their deadline meanwhile are
    /// treated as failed.
    ///
    /// A `max_wait` too large to represent as an instant waits without limit.
    pub fn run_until_settled(&mut self, max_wait: Duration) -> DrainOutcome {
        let give_up_at = Instant::now().checked_add(max_wait);
        let mut outcome = DrainOutcome::default();
        self.drain_into(&mut outcome);

        loop {
            let now = Instant::now();
            self.expire_overdue_cancels(now);
            self.drain_into(&mut outcome);
            if self.is_settled() || give_up_at.is_some_and(|at| now >= at) {
                break;
            }

            let deadline_wait = self
                .control
                .deadlines()
                .next_deadline()
                .map(|next| next.saturating_duration_since(now));
            let event = match (give_up_at.map(|at| at.saturating_duration_since(now)), deadline_wait) {
                (Some(a), Some(b)) => self.control.next_within(a.min(b)),
                (Some(wait), None) | (None, Some(wait)) => self.control.next_within(wait),
                (None, None) => self.control.next_blocking(),
            };
            if let Some(event) = event {
                self.apply(event, &mut outcome);
            }
        }

        outcome.settled = self.is_settled();
        if outcome.settled {
            info!(job = %self.job_name, "all dispatched attempts settled");
        } else {
            warn!(
                job = %self.job_name,
                outstanding = self.control.registry().len(),
                "attempts still outstanding"
            );
        }
        outcome
    }

    /// Fail every cancel RPC whose deadline is at or before `now`
    pub fn expire_overdue_cancels(&mut self, now: Instant) -> usize {
        let overdue = self.control.deadlines.take_overdue(now);
        let timeout_ms = u64::try_from(self.control.timeouts().cancel.as_millis()).unwrap_or(u64::MAX);

        for attempt_id in &overdue {
            let event = ControlEvent {
                attempt_id: *attempt_id,
                event: AttemptEvent::CancelDeliveryFailed(GatewayError::Timeout { timeout_ms }),
            };
            if let Err(err) = self.dispatch(event) {
                warn!(%attempt_id, error = %err, "expired cancel for unknown attempt");
            }
        }
        overdue.len()
    }

    /// Status aggregated from the current attempt of every vertex:
    ///
    /// - every attempt terminal: `Finished` if all finished, else `Failed`
    ///   if any failed, else `Canceled`
    /// - any attempt CANCELING: `Canceling`
    /// - any attempt dispatched: `Running`
    /// - otherwise nothing is dispatched: `Created`
    pub fn job_status(&self) -> JobStatus {
        let states: Vec<AttemptState> = self.vertices.iter().map(|v| v.execution_state()).collect();

        if !states.is_empty() && states.iter().all(|s| s.is_terminal()) {
            if states.iter().all(|s| *s == AttemptState::Finished) {
                JobStatus::Finished
            } else if states.contains(&AttemptState::Failed) {
                JobStatus::Failed
            } else {
                JobStatus::Canceled
            }
        } else if states.contains(&AttemptState::Canceling) {
            JobStatus::Canceling
        } else if states.iter().any(|s| s.is_dispatched()) {
            JobStatus::Running
        } else {
            JobStatus::Created
        }
    }

    /// Snapshots of every attempt, by vertex then attempt number
    pub fn snapshots(&self) -> Vec<AttemptSnapshot> {
        self.vertices
            .iter()
            .flat_map(|v| v.attempts().map(Execution::snapshot))
            .collect()
    }

    /// Deploy vertex `index`, which the caller has already bounds-checked
    fn deploy_checked(&mut self, index: usize, slot: Arc<AllocatedSlot>) -> AttemptState {
        let vertex = &mut self.vertices[index];
        if vertex.execution_state() == AttemptState::Created {
            vertex.schedule(&mut self.control);
        }
        vertex.deploy(slot, &mut self.control);
        self.run_pending();
        self.vertices[index].execution_state()
    }

    fn current_state(&self, index: usize) -> CoordinatorResult<AttemptState> {
        Ok(self.vertex(index)?.execution_state())
    }

    fn drain_into(&mut self, outcome: &mut DrainOutcome) {
        while let Some(event) = self.control.try_next() {
            self.apply(event, outcome);
        }
    }

    fn apply(&mut self, event: ControlEvent, outcome: &mut DrainOutcome) {
        match self.dispatch(event) {
            Ok(_) => outcome.applied += 1,
            Err(CoordinatorError::UnknownAttempt(attempt_id)) => {
                warn!(%attempt_id, "event for unknown attempt");
                outcome.unknown.push(attempt_id);
            }
            Err(err) => warn!(error = %err, "event could not be applied"),
        }
    }

    /// Route one event to its attempt
    fn dispatch(&mut self, event: ControlEvent) -> CoordinatorResult<AttemptState> {
        let attempt_id = event.attempt_id;
        let location = self
            .attempts
            .get(&attempt_id)
            .copied()
            .ok_or(CoordinatorError::UnknownAttempt(attempt_id))?;
        let vertex = self
            .vertices
            .get_mut(location.vertex_index)
            .ok_or(CoordinatorError::UnknownAttempt(attempt_id))?;

        let current = vertex.current_execution_mut();
        if current.attempt_id() != attempt_id {
            debug!(%attempt_id, event = ?event.event, "event for superseded attempt ignored");
            return vertex
                .attempt(location.attempt_number)
                .map(Execution::state)
                .ok_or(CoordinatorError::UnknownAttempt(attempt_id));
        }

        if current.is_terminal() {
            debug!(
                %attempt_id,
                state = %current.state(),
                event = ?event.event,
                "late event for settled attempt"
            );
        }
        Ok(current.handle_event(event.event, &mut self.control))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::ScriptedGateway;
    use attempt_protocol::SlotId;

    fn graph(parallelism: usize) -> ExecutionGraph {
        ExecutionGraph::new("map", parallelism, &CoordinatorConfig::default())
    }

    fn slot(gateway: &Arc<ScriptedGateway>, index: usize) -> Arc<AllocatedSlot> {
        AllocatedSlot::new(SlotId::new(format!("w/{index}")), gateway.clone())
    }

    #[test]
    fn test_new_graph() {
        let graph = graph(4);
        assert_eq!(graph.parallelism(), 4);
        assert_eq!(graph.job_status(), JobStatus::Created);
        assert!(graph.is_settled());
        assert_eq!(graph.snapshots().len(), 4);
    }

    #[test]
    fn test_status_without_dispatched_attempts() {
        let mut graph = graph(3);
        graph.cancel_vertex(1).unwrap();
        assert_eq!(graph.job_status(), JobStatus::Created);

        graph.schedule_all();
        assert_eq!(graph.job_status(), JobStatus::Created);

        graph.cancel();
        assert_eq!(graph.job_status(), JobStatus::Canceled);
    }

    #[test]
    fn test_switch_all_reports_vertices_left_behind() {
        let gateway = Arc::new(ScriptedGateway::acking());
        let mut graph = graph(3);
        graph.cancel_vertex(1).unwrap();

        assert_eq!(graph.switch_all_to_running(|i| slot(&gateway, i)), 2);
        assert_eq!(graph.vertex(1).unwrap().execution_state(), AttemptState::Canceled);
        assert_eq!(gateway.call_count(crate::gateway::RpcOp::Submit), 2);
        assert_eq!(graph.job_status(), JobStatus::Running);
    }

    #[test]
    fn test_vertex_out_of_range() {
        let mut graph = graph(2);
        assert!(matches!(
            graph.cancel_vertex(7),
            Err(CoordinatorError::VertexOutOfRange { index: 7, len: 2 })
        ));
    }

    #[test]
    fn test_registry_tracks_running_vertices() {
        let gateway = Arc::new(ScriptedGateway::acking());
        let mut graph = graph(3);

        assert_eq!(graph.switch_all_to_running(|i| slot(&gateway, i)), 3);
        assert_eq!(graph.registered_executions().len(), 3);
        assert_eq!(graph.job_status(), JobStatus::Running);
        assert!(!graph.is_settled());
    }

    #[test]
    fn test_report_for_unknown_attempt() {
        let mut graph = graph(1);
        let stranger = AttemptId::new();
        assert!(matches!(
            graph.report(stranger, WorkerReport::Canceled),
            Err(CoordinatorError::UnknownAttempt(id)) if id == stranger
        ));
    }

    #[test]
    fn test_unknown_attempt_in_mailbox_is_surfaced() {
        let mut graph = graph(1);
        let stranger = AttemptId::new();
        graph.mailbox().post_report(stranger, WorkerReport::Finished);

        let outcome = graph.run_pending();
        assert_eq!(outcome.unknown, vec![stranger]);
        assert_eq!(outcome.applied, 0);
    }

    #[test]
    fn test_finished_job() {
        let gateway = Arc::new(ScriptedGateway::acking());
        let mut graph = graph(2);
        graph.switch_all_to_running(|i| slot(&gateway, i));

        let ids: Vec<_> = graph
            .vertices()
            .iter()
            .map(|v| v.current_execution().attempt_id())
            .collect();
        for id in ids {
            assert_eq!(
                graph.report(id, WorkerReport::Finished).unwrap(),
                AttemptState::Finished
            );
        }

        assert_eq!(graph.job_status(), JobStatus::Finished);
        assert!(graph.is_settled());
    }

    #[test]
    fn test_expire_overdue_cancels() {
        let gateway = Arc::new(
            ScriptedGateway::new().with_script(
                crate::gateway::RpcOp::Cancel,
                crate::gateway::OpScript::always(crate::gateway::ScriptedOutcome::Hold),
            ),
        );
        let mut graph = graph(1);
        graph.switch_all_to_running(|i| slot(&gateway, i));

        assert_eq!(graph.cancel_vertex(0).unwrap(), AttemptState::Canceling);
        assert_eq!(graph.pending_cancels(), 1);

        let later = Instant::now() + graph.control.timeouts().cancel + Duration::from_millis(1);
        assert_eq!(graph.expire_overdue_cancels(later), 1);
        assert_eq!(graph.vertex(0).unwrap().execution_state(), AttemptState::Canceled);
        assert!(graph.is_settled());

        // The held reply finally arrives and changes nothing
        gateway.resolve_held(Ok(()));
        graph.run_pending();
        assert_eq!(graph.vertex(0).unwrap().execution_state(), AttemptState::Canceled);
    }

    #[test]
    fn test_retry_indexes_new_attempt() {
        let mut graph = graph(1);
        graph.cancel_vertex(0).unwrap();

        let new_id = graph.retry_vertex(0).unwrap();
        assert_eq!(graph.execution(&new_id).unwrap().attempt_number(), 1);
        assert_eq!(graph.snapshots().len(), 2);
    }

    #[test]
    fn test_event_for_superseded_attempt_is_ignored() {
        let mut graph = graph(1);
        let old_id = graph.vertex(0).unwrap().current_execution().attempt_id();
        graph
            .fail_vertex(0, FailureCause::new("USER_CODE", "boom"))
            .unwrap();
        graph.retry_vertex(0).unwrap();

        assert_eq!(
            graph.report(old_id, WorkerReport::Running).unwrap(),
            AttemptState::Failed
        );
        assert_eq!(graph.vertex(0).unwrap().execution_state(), AttemptState::Created);
    }
}
