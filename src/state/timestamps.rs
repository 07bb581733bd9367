//! Per-state entry timestamps

use std::collections::BTreeMap;

use super::AttemptState;

/// First-entry wall-clock time (epoch millis) of every state an attempt visited.
///
/// Each slot is written at most once. Values never go backwards across the
/// sequence of recorded states, even if the wall clock does. `0` means the
/// state was never entered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateTimestamps {
    entered: [i64; 8],
    latest: i64,
}

impl StateTimestamps {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record entry into `state` at `now`, returning the stored value.
    ///
    /// A state that already has a timestamp keeps it.
    pub fn record(&mut self, state: AttemptState, now: i64) -> i64 {
        let slot = &mut self.entered[state.index()];
        if *slot != 0 {
            return *slot;
        }

        let stamp = now.max(self.latest).max(1);
        *slot = stamp;
        self.latest = stamp;
        stamp
    }

    /// Entry timestamp of `state`, or `0` if never entered
    pub fn get(&self, state: AttemptState) -> i64 {
        self.entered[state.index()]
    }

    pub fn has_entered(&self, state: AttemptState) -> bool {
        self.get(state) != 0
    }

    /// All entered states with their timestamps
    pub fn to_map(&self) -> BTreeMap<AttemptState, i64> {
        AttemptState::ALL
            .into_iter()
            .filter(|s| self.has_entered(*s))
            .map(|s| (s, self.get(s)))
            .collect()
    }
}
