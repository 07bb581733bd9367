//! Serializable view of one attempt, for diagnostics

use std::collections::BTreeMap;

use attempt_protocol::{AttemptId, FailureCause, SlotId};
use serde::{Deserialize, Serialize};

use crate::state::AttemptState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptSnapshot {
    pub attempt_id: AttemptId,
    pub vertex_index: usize,
    pub attempt_number: u32,
    pub state: AttemptState,
    /// Entry time (epoch millis) of every state visited
    pub state_timestamps: BTreeMap<AttemptState, i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slot_id: Option<SlotId>,
    pub slot_alive: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureCause>,
}

impl AttemptSnapshot {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
