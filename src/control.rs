//! Control thread state
//!
//! Every transition of every attempt runs on whoever holds `&mut Control`.
//! Gateways never touch attempts directly: they resolve an [`RpcReply`],
//! which posts a [`ControlEvent`] into the mailbox, and the control thread
//! applies it later in arrival order.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};

use attempt_protocol::{AttemptId, GatewayError, WorkerReport};

use crate::execution::AttemptEvent;
use crate::registry::ExecutionRegistry;
use crate::timeout::{CancelDeadlines, RpcTimeouts};

/// An asynchronous result addressed to one attempt
#[derive(Debug, Clone, PartialEq)]
pub struct ControlEvent {
    pub attempt_id: AttemptId,
    pub event: AttemptEvent,
}

/// Which RPC a reply belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RpcOp {
    Submit,
    Cancel,
}

/// One-shot completion handle for a gateway RPC.
///
/// Resolve it exactly once with [`RpcReply::ack`] or [`RpcReply::fail`],
/// from any thread. Dropping it unresolved counts as a communication failure.
#[derive(Debug)]
pub struct RpcReply {
    attempt_id: AttemptId,
    op: RpcOp,
    sender: Option<Sender<ControlEvent>>,
}

impl RpcReply {
    pub fn attempt_id(&self) -> AttemptId {
        self.attempt_id
    }

    pub fn op(&self) -> RpcOp {
        self.op
    }

    /// The worker received the request
    pub fn ack(mut self) {
        let event = match self.op {
            RpcOp::Cancel => Some(AttemptEvent::CancelAcknowledged),
            // Deployment is confirmed by the RUNNING report, not the ack
            RpcOp::Submit => None,
        };
        let sender = self.sender.take();
        if let (Some(sender), Some(event)) = (sender, event) {
            let _ = sender.send(ControlEvent {
                attempt_id: self.attempt_id,
                event,
            });
        }
    }

    /// The RPC failed; the remote outcome is unknown
    pub fn fail(mut self, error: GatewayError) {
        self.send_failure(error);
    }

    fn send_failure(&mut self, error: GatewayError) {
        if let Some(sender) = self.sender.take() {
            let event = match self.op {
                RpcOp::Cancel => AttemptEvent::CancelDeliveryFailed(error),
                RpcOp::Submit => AttemptEvent::SubmitFailed(error),
            };
            let _ = sender.send(ControlEvent {
                attempt_id: self.attempt_id,
                event,
            });
        }
    }
}

impl Drop for RpcReply {
    fn drop(&mut self) {
        self.send_failure(GatewayError::ReplyDropped);
    }
}

/// Cloneable handle for delivering worker reports from any thread
#[derive(Debug, Clone)]
pub struct Mailbox {
    sender: Sender<ControlEvent>,
}

impl Mailbox {
    /// Post a worker report. Returns false if the control thread is gone.
    pub fn post_report(&self, attempt_id: AttemptId, report: WorkerReport) -> bool {
        self.sender
            .send(ControlEvent {
                attempt_id,
                event: AttemptEvent::Reported(report),
            })
            .is_ok()
    }
}

/// State owned by the control thread besides the attempts themselves
#[derive(Debug)]
pub struct Control {
    pub(crate) registry: ExecutionRegistry,
    pub(crate) deadlines: CancelDeadlines,
    timeouts: RpcTimeouts,
    sender: Sender<ControlEvent>,
    receiver: Receiver<ControlEvent>,
}

impl Control {
    pub fn new(timeouts: RpcTimeouts) -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            registry: ExecutionRegistry::new(),
            deadlines: CancelDeadlines::new(),
            timeouts,
            sender,
            receiver,
        }
    }

    pub fn registry(&self) -> &ExecutionRegistry {
        &self.registry
    }

    pub fn deadlines(&self) -> &CancelDeadlines {
        &self.deadlines
    }

    pub fn timeouts(&self) -> RpcTimeouts {
        self.timeouts
    }

    pub fn mailbox(&self) -> Mailbox {
        Mailbox {
            sender: self.sender.clone(),
        }
    }

    /// Completion handle for an RPC issued on behalf of `attempt_id`
    pub(crate) fn reply(&self, attempt_id: AttemptId, op: RpcOp) -> RpcReply {
        RpcReply {
            attempt_id,
            op,
            sender: Some(self.sender.clone()),
        }
    }

    /// Track the deadline of a cancel RPC about to be sent
    pub(crate) fn arm_cancel_deadline(&mut self, attempt_id: AttemptId) {
        self.deadlines
            .arm(attempt_id, Instant::now(), self.timeouts.cancel);
    }

    /// Next already-posted event, without blocking
    pub(crate) fn try_next(&self) -> Option<ControlEvent> {
        self.receiver.try_recv().ok()
    }

    /// Block until the next event arrives
    pub(crate) fn next_blocking(&self) -> Option<ControlEvent> {
        self.receiver.recv().ok()
    }

    /// Wait up to `timeout` for the next event
    pub(crate) fn next_within(&self, timeout: Duration) -> Option<ControlEvent> {
        match self.receiver.recv_timeout(timeout) {
            Ok(event) => Some(event),
            // Control keeps its own sender, so the channel never disconnects
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }
}
