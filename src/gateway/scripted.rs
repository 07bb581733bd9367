//! Scripted gateway with failure injection
//!
//! Resolves RPCs in-process according to a per-operation script. Used by the
//! test suite and by the `simulate` command. Optionally emulates the worker
//! side by posting RUNNING after an acknowledged submit and CANCELED after an
//! acknowledged cancel.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use attempt_protocol::{AttemptId, GatewayError, TaskDeployment, WorkerReport};

use super::WorkerGateway;
use crate::control::{Mailbox, RpcOp, RpcReply};

/// What the gateway does with one RPC
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptedOutcome {
    /// Acknowledge immediately
    Ack,
    /// Fail immediately with the given error
    Fail(GatewayError),
    /// Drop the reply without resolving it
    Drop,
    /// Keep the reply until [`ScriptedGateway::resolve_held`]
    Hold,
}

/// Script for one operation
#[derive(Debug, Clone)]
pub struct OpScript {
    first: ScriptedOutcome,
    /// Number of calls answered with `first` (None = all of them)
    first_calls: Option<u32>,
    then: ScriptedOutcome,
}

impl OpScript {
    /// Answer every call the same way
    pub fn always(outcome: ScriptedOutcome) -> Self {
        Self {
            first: outcome.clone(),
            first_calls: None,
            then: outcome,
        }
    }

    /// Answer the first `calls` calls with `first`, every later call with `then`
    pub fn sequence(first: ScriptedOutcome, calls: u32, then: ScriptedOutcome) -> Self {
        Self {
            first,
            first_calls: Some(calls),
            then,
        }
    }

    /// Outcome for the `call`-th call (1-based)
    fn outcome_for(&self, call: u32) -> &ScriptedOutcome {
        match self.first_calls {
            Some(limit) if call > limit => &self.then,
            _ => &self.first,
        }
    }
}

/// One recorded gateway call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayCall {
    pub op: RpcOp,
    pub attempt_id: AttemptId,
    pub timeout: Duration,
}

#[derive(Debug, Default)]
struct Inner {
    scripts: HashMap<RpcOp, OpScript>,
    call_counts: HashMap<RpcOp, u32>,
    calls: Vec<GatewayCall>,
    held: Vec<RpcReply>,
    reporter: Option<Mailbox>,
}

/// In-process [`WorkerGateway`] driven by [`OpScript`]s
#[derive(Debug, Default)]
pub struct ScriptedGateway {
    inner: Mutex<Inner>,
}

impl ScriptedGateway {
    /// Gateway that acknowledges every RPC
    pub fn new() -> Self {
        Self::default()
    }

    /// Gateway that acknowledges every RPC
    pub fn acking() -> Self {
        Self::new()
    }

    /// Gateway whose cancel RPCs always fail with a transport error
    pub fn failing_cancel() -> Self {
        Self::new().with_script(
            RpcOp::Cancel,
            OpScript::always(ScriptedOutcome::Fail(GatewayError::transport(
                "Rpc call fails",
            ))),
        )
    }

    /// Gateway acknowledging the first `successful` cancels and failing the rest
    pub fn cancel_sequence(successful: u32) -> Self {
        Self::new().with_script(
            RpcOp::Cancel,
            OpScript::sequence(
                ScriptedOutcome::Ack,
                successful,
                ScriptedOutcome::Fail(GatewayError::transport("Rpc call fails")),
            ),
        )
    }

    /// Set the script of one operation
    pub fn with_script(self, op: RpcOp, script: OpScript) -> Self {
        self.set_script(op, script);
        self
    }

    pub fn set_script(&self, op: RpcOp, script: OpScript) {
        let mut inner = self.inner();
        inner.scripts.insert(op, script);
        inner.call_counts.insert(op, 0);
    }

    /// Emulate the worker: report RUNNING after an acked submit and
    /// CANCELED after an acked cancel
    pub fn attach_reporter(&self, mailbox: Mailbox) {
        self.inner().reporter = Some(mailbox);
    }

    /// Every call received so far
    pub fn calls(&self) -> Vec<GatewayCall> {
        self.inner().calls.clone()
    }

    pub fn call_count(&self, op: RpcOp) -> usize {
        self.inner().calls.iter().filter(|c| c.op == op).count()
    }

    pub fn held_count(&self) -> usize {
        self.inner().held.len()
    }

    /// Resolve every held reply, acknowledging or failing each
    pub fn resolve_held(&self, outcome: Result<(), GatewayError>) -> usize {
        let held = std::mem::take(&mut self.inner().held);
        let count = held.len();
        for reply in held {
            match &outcome {
                Ok(()) => reply.ack(),
                Err(error) => reply.fail(error.clone()),
            }
        }
        count
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn dispatch(&self, op: RpcOp, attempt_id: AttemptId, timeout: Duration, reply: RpcReply) {
        let (outcome, reporter) = {
            let mut inner = self.inner();
            inner.calls.push(GatewayCall {
                op,
                attempt_id,
                timeout,
            });
            let count = inner.call_counts.entry(op).or_insert(0);
            *count += 1;
            let call = *count;
            let outcome = inner
                .scripts
                .get(&op)
                .map(|script| script.outcome_for(call).clone())
                .unwrap_or(ScriptedOutcome::Ack);
            (outcome, inner.reporter.clone())
        };

        match outcome {
            ScriptedOutcome::Ack => {
                reply.ack();
                if let Some(mailbox) = reporter {
                    let report = match op {
                        RpcOp::Submit => WorkerReport::Running,
                        RpcOp::Cancel => WorkerReport::Canceled,
                    };
                    mailbox.post_report(attempt_id, report);
                }
            }
            ScriptedOutcome::Fail(error) => reply.fail(error),
            ScriptedOutcome::Drop => drop(reply),
            ScriptedOutcome::Hold => self.inner().held.push(reply),
        }
    }
}

impl WorkerGateway for ScriptedGateway {
    fn submit_task(&self, deployment: TaskDeployment, timeout: Duration, reply: RpcReply) {
        self.dispatch(RpcOp::Submit, deployment.attempt_id, timeout, reply);
    }

    fn cancel_task(&self, attempt_id: AttemptId, timeout: Duration, reply: RpcReply) {
        self.dispatch(RpcOp::Cancel, attempt_id, timeout, reply);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::{Control, ControlEvent};
    use crate::execution::AttemptEvent;
    use crate::timeout::RpcTimeouts;

    fn drain(control: &Control) -> Vec<ControlEvent> {
        std::iter::from_fn(|| control.try_next()).collect()
    }

    #[test]
    fn test_acking_gateway() {
        let control = Control::new(RpcTimeouts::default());
        let gateway = ScriptedGateway::acking();
        let id = AttemptId::new();

        gateway.cancel_task(id, Duration::from_secs(1), control.reply(id, RpcOp::Cancel));

        let events = drain(&control);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, AttemptEvent::CancelAcknowledged);
        assert_eq!(gateway.call_count(RpcOp::Cancel), 1);
    }

    #[test]
    fn test_cancel_sequence() {
        let control = Control::new(RpcTimeouts::default());
        let gateway = ScriptedGateway::cancel_sequence(1);
        let id = AttemptId::new();

        for _ in 0..2 {
            gateway.cancel_task(id, Duration::from_secs(1), control.reply(id, RpcOp::Cancel));
        }

        let events = drain(&control);
        assert_eq!(events[0].event, AttemptEvent::CancelAcknowledged);
        assert!(matches!(
            events[1].event,
            AttemptEvent::CancelDeliveryFailed(GatewayError::Transport { .. })
        ));
    }

    #[test]
    fn test_hold_and_resolve() {
        let control = Control::new(RpcTimeouts::default());
        let gateway = ScriptedGateway::new()
            .with_script(RpcOp::Cancel, OpScript::always(ScriptedOutcome::Hold));
        let id = AttemptId::new();

        gateway.cancel_task(id, Duration::from_secs(1), control.reply(id, RpcOp::Cancel));
        assert_eq!(gateway.held_count(), 1);
        assert!(drain(&control).is_empty());

        assert_eq!(gateway.resolve_held(Err(GatewayError::Timeout { timeout_ms: 1 })), 1);
        let events = drain(&control);
        assert_eq!(
            events[0].event,
            AttemptEvent::CancelDeliveryFailed(GatewayError::Timeout { timeout_ms: 1 })
        );
    }

    #[test]
    fn test_drop_outcome_reports_dropped_reply() {
        let control = Control::new(RpcTimeouts::default());
        let gateway = ScriptedGateway::new()
            .with_script(RpcOp::Cancel, OpScript::always(ScriptedOutcome::Drop));
        let id = AttemptId::new();

        gateway.cancel_task(id, Duration::from_secs(1), control.reply(id, RpcOp::Cancel));

        let events = drain(&control);
        assert_eq!(
            events[0].event,
            AttemptEvent::CancelDeliveryFailed(GatewayError::ReplyDropped)
        );
    }

    #[test]
    fn test_reporter_emulates_worker() {
        let control = Control::new(RpcTimeouts::default());
        let gateway = ScriptedGateway::acking();
        gateway.attach_reporter(control.mailbox());
        let id = AttemptId::new();

        gateway.cancel_task(id, Duration::from_secs(1), control.reply(id, RpcOp::Cancel));

        let events = drain(&control);
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].event, AttemptEvent::Reported(WorkerReport::Canceled));
    }

    #[test]
    fn test_calls_record_timeout() {
        let control = Control::new(RpcTimeouts::default());
        let gateway = ScriptedGateway::acking();
        let id = AttemptId::new();

        gateway.cancel_task(id, Duration::from_millis(250), control.reply(id, RpcOp::Cancel));

        let calls = gateway.calls();
        assert_eq!(calls[0].timeout, Duration::from_millis(250));
        assert_eq!(calls[0].attempt_id, id);
    }
}
