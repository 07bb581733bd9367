//! Asynchronous results applied to an attempt on the control thread

use attempt_protocol::{GatewayError, WorkerReport};

#[derive(Debug, Clone, PartialEq)]
pub enum AttemptEvent {
    /// The worker received the cancel request. Says nothing about whether
    /// the task stopped.
    CancelAcknowledged,
    /// The cancel RPC failed or timed out; the remote outcome is unknown
    CancelDeliveryFailed(GatewayError),
    /// The submit RPC failed
    SubmitFailed(GatewayError),
    /// Out-of-band report of what the worker actually did
    Reported(WorkerReport),
}
