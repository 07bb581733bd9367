//! Registry of dispatched, unsettled attempts
//!
//! An attempt is inserted when it occupies a worker slot and removed in the
//! same control step that drives it terminal, so `len()` is always the
//! number of attempts still outstanding on workers.

use std::collections::HashMap;

use attempt_protocol::AttemptId;
use serde::Serialize;

/// Where an attempt lives in the graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AttemptLocation {
    pub vertex_index: usize,
    pub attempt_number: u32,
}

#[derive(Debug, Default)]
pub struct ExecutionRegistry {
    entries: HashMap<AttemptId, AttemptLocation>,
}

impl ExecutionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a dispatched attempt. Returns false if it was already present.
    pub(crate) fn insert(&mut self, attempt_id: AttemptId, location: AttemptLocation) -> bool {
        self.entries.insert(attempt_id, location).is_none()
    }

    pub(crate) fn remove(&mut self, attempt_id: &AttemptId) -> Option<AttemptLocation> {
        self.entries.remove(attempt_id)
    }

    pub fn get(&self, attempt_id: &AttemptId) -> Option<AttemptLocation> {
        self.entries.get(attempt_id).copied()
    }

    pub fn contains(&self, attempt_id: &AttemptId) -> bool {
        self.entries.contains_key(attempt_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered ids, sorted for stable output
    pub fn ids(&self) -> Vec<AttemptId> {
        let mut ids: Vec<_> = self.entries.keys().copied().collect();
        ids.sort();
        ids
    }
}
