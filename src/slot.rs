//! Allocated slot handle
//!
//! The allocator owns the slot; an execution holds it through an `Arc` for
//! as long as it occupies it. The only mutation an execution performs is
//! the final release.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use attempt_protocol::SlotId;

use crate::gateway::WorkerGateway;

/// A slot on a remote worker, with the gateway used to reach that worker
pub struct AllocatedSlot {
    id: SlotId,
    gateway: Arc<dyn WorkerGateway>,
    alive: AtomicBool,
    /// Number of release calls that actually flipped the slot
    releases: AtomicU32,
}

impl AllocatedSlot {
    pub fn new(id: SlotId, gateway: Arc<dyn WorkerGateway>) -> Arc<Self> {
        Arc::new(Self {
            id,
            gateway,
            alive: AtomicBool::new(true),
            releases: AtomicU32::new(0),
        })
    }

    pub fn id(&self) -> &SlotId {
        &self.id
    }

    pub fn gateway(&self) -> &Arc<dyn WorkerGateway> {
        &self.gateway
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Release the slot. Returns true only for the call that released it.
    pub fn release(&self) -> bool {
        let released = self
            .alive
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if released {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
        released
    }

    pub fn release_count(&self) -> u32 {
        self.releases.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for AllocatedSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AllocatedSlot")
            .field("id", &self.id)
            .field("alive", &self.is_alive())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::ScriptedGateway;

    #[test]
    fn test_new_slot_is_alive() {
        let slot = AllocatedSlot::new(SlotId::new("w1/0"), Arc::new(ScriptedGateway::acking()));
        assert!(slot.is_alive());
        assert_eq!(slot.release_count(), 0);
        assert_eq!(slot.id().as_str(), "w1/0");
    }

    #[test]
    fn test_release_only_once() {
        let slot = AllocatedSlot::new(SlotId::new("w1/0"), Arc::new(ScriptedGateway::acking()));
        assert!(slot.release());
        assert!(!slot.release());
        assert!(!slot.is_alive());
        assert_eq!(slot.release_count(), 1);
    }
}
