//! Coordinator-side deadlines for outstanding cancel RPCs
//!
//! Gateways are expected to resolve a cancel with a timeout error on their
//! own. The coordinator still tracks a deadline per outstanding cancel so a
//! gateway that never answers cannot keep an attempt in CANCELING forever.
//! An expired deadline is handled exactly like a communication failure.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use attempt_protocol::AttemptId;

/// RPC timeouts applied by the control thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RpcTimeouts {
    pub cancel: Duration,
    pub submit: Duration,
}

impl Default for RpcTimeouts {
    fn default() -> Self {
        Self {
            cancel: Duration::from_millis(attempt_protocol::DEFAULT_CANCEL_TIMEOUT_MS),
            submit: Duration::from_millis(attempt_protocol::DEFAULT_SUBMIT_TIMEOUT_MS),
        }
    }
}

/// Deadlines of cancel RPCs that have neither been acknowledged nor failed
#[derive(Debug, Default)]
pub struct CancelDeadlines {
    pending: HashMap<AttemptId, Instant>,
}

impl CancelDeadlines {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a cancel sent at `now`
    ///
    /// A timeout past the representable range of `Instant` never expires.
    pub fn arm(&mut self, attempt_id: AttemptId, now: Instant, timeout: Duration) {
        match now.checked_add(timeout) {
            Some(deadline) => {
                self.pending.insert(attempt_id, deadline);
            }
            None => {
                self.pending.remove(&attempt_id);
            }
        }
    }

    /// Stop tracking; the RPC resolved or the attempt settled
    pub fn clear(&mut self, attempt_id: &AttemptId) -> bool {
        self.pending.remove(attempt_id).is_some()
    }

    pub fn is_pending(&self, attempt_id: &AttemptId) -> bool {
        self.pending.contains_key(attempt_id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Earliest outstanding deadline
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().min().copied()
    }

    /// Remove and return every attempt whose deadline is at or before `now`,
    /// earliest first
    pub fn take_overdue(&mut self, now: Instant) -> Vec<AttemptId> {
        let mut overdue: Vec<(Instant, AttemptId)> = self
            .pending
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(id, deadline)| (*deadline, *id))
            .collect();
        overdue.sort();

        for (_, id) in &overdue {
            self.pending.remove(id);
        }
        overdue.into_iter().map(|(_, id)| id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timeouts() {
        let timeouts = RpcTimeouts::default();
        assert_eq!(timeouts.cancel, Duration::from_secs(10));
        assert_eq!(timeouts.submit, Duration::from_secs(10));
    }

    #[test]
    fn test_nothing_overdue_before_deadline() {
        let mut deadlines = CancelDeadlines::new();
        let now = Instant::now();
        deadlines.arm(AttemptId::new(), now, Duration::from_secs(5));

        assert!(deadlines.take_overdue(now + Duration::from_secs(4)).is_empty());
        assert_eq!(deadlines.len(), 1);
    }

    #[test]
    fn test_overdue_removed_in_deadline_order() {
        let mut deadlines = CancelDeadlines::new();
        let now = Instant::now();
        let late = AttemptId::new();
        let early = AttemptId::new();
        deadlines.arm(late, now, Duration::from_secs(2));
        deadlines.arm(early, now, Duration::from_secs(1));

        let overdue = deadlines.take_overdue(now + Duration::from_secs(3));
        assert_eq!(overdue, vec![early, late]);
        assert!(deadlines.is_empty());
    }

    #[test]
    fn test_clear_and_next_deadline() {
        let mut deadlines = CancelDeadlines::new();
        let now = Instant::now();
        let id = AttemptId::new();
        deadlines.arm(id, now, Duration::from_millis(100));

        assert_eq!(deadlines.next_deadline(), Some(now + Duration::from_millis(100)));
        assert!(deadlines.clear(&id));
        assert!(!deadlines.clear(&id));
        assert_eq!(deadlines.next_deadline(), None);
    }

    #[test]
    fn test_unrepresentable_deadline_never_expires() {
        let mut deadlines = CancelDeadlines::new();
        let now = Instant::now();
        let id = AttemptId::new();
        deadlines.arm(id, now, Duration::MAX);

        assert!(!deadlines.is_pending(&id));
        assert_eq!(deadlines.next_deadline(), None);
    }
}
