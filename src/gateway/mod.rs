//! Remote worker gateway
//!
//! The coordinator reaches workers only through [`WorkerGateway`]. Calls
//! return immediately; the outcome arrives later through the [`RpcReply`]
//! handed to the call, on whatever thread the gateway chooses.

mod scripted;

pub use scripted::{GatewayCall, OpScript, ScriptedGateway, ScriptedOutcome};

use std::time::Duration;

use attempt_protocol::{AttemptId, TaskDeployment};

pub use crate::control::{RpcOp, RpcReply};

/// Contract of the RPC channel to one worker
///
/// Implementations must resolve every reply at most once and should fail it
/// with [`attempt_protocol::GatewayError::Timeout`] once `timeout` elapses.
/// An acknowledged cancel only means the worker received the request; the
/// task may still be running, or may already have ended on its own.
pub trait WorkerGateway: Send + Sync {
    /// Deploy a task into the slot named in `deployment`
    fn submit_task(&self, deployment: TaskDeployment, timeout: Duration, reply: RpcReply);

    /// Ask the worker to cancel the task of `attempt_id`
    fn cancel_task(&self, attempt_id: AttemptId, timeout: Duration, reply: RpcReply);
}
