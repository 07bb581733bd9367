//! Attempt coordinator
//!
//! Tracks every attempt of every parallel subtask of a job on a single
//! control thread: per-attempt state machine with timestamps, cancellation
//! against a worker gateway with fail-open on communication failure, slot
//! release on every terminal transition, and a registry of dispatched
//! attempts.

pub mod config;
pub mod control;
pub mod error;
pub mod execution;
pub mod gateway;
pub mod graph;
pub mod logging;
pub mod registry;
pub mod slot;
pub mod state;
pub mod timeout;
pub mod vertex;

pub use config::{CoordinatorConfig, EffectiveConfig};
pub use control::{Control, ControlEvent, Mailbox, RpcOp, RpcReply};
pub use error::{CoordinatorError, CoordinatorResult};
pub use execution::{AttemptEvent, AttemptSnapshot, Execution};
pub use gateway::{ScriptedGateway, WorkerGateway};
pub use graph::{DrainOutcome, ExecutionGraph, JobStatus};
pub use registry::{AttemptLocation, ExecutionRegistry};
pub use slot::AllocatedSlot;
pub use state::{AttemptState, StateTimestamps, TerminalState};
pub use vertex::ExecutionVertex;

pub use attempt_protocol::{AttemptId, ErrorCode, FailureCause, GatewayError, SlotId, WorkerReport};
