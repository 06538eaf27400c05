//! ⚠️  MOCK hardware backend for host development
//!
//! Models the hardware semaphore block and the doorbell with atomics so the
//! upper crates can be unit tested on the host, including with two threads
//! standing in for the two cores.
//!
//! ## Current Limitations
//!
//! - No interrupt delivery: [`MockDoorbell`] only counts rings
//! - A lock held by the calling core cannot be re-taken (the hardware
//!   backend may allow it)

use core::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

use crate::layout::HW_LOCK_COUNT;
use crate::{CoreId, Doorbell, HwSemaphore};

/// Atomic stand-in for the hardware semaphore block
///
/// Each lock stores the owning core's tag, 0 when free.
pub struct MockHwSemaphore {
    locks: [AtomicU8; HW_LOCK_COUNT],
}

impl MockHwSemaphore {
    /// Create a block with every lock free
    pub const fn new() -> Self {
        const FREE: AtomicU8 = AtomicU8::new(0);
        Self {
            locks: [FREE; HW_LOCK_COUNT],
        }
    }

    fn slot(&self, lock: u8) -> &AtomicU8 {
        match self.locks.get(lock as usize) {
            Some(slot) => slot,
            None => crate::misuse!("hardware lock {} out of range (block has {})", lock, HW_LOCK_COUNT),
        }
    }
}

impl Default for MockHwSemaphore {
    fn default() -> Self {
        Self::new()
    }
}

impl HwSemaphore for MockHwSemaphore {
    fn lock_count(&self) -> usize {
        HW_LOCK_COUNT
    }

    fn try_take(&self, lock: u8, core: CoreId) -> bool {
        self.slot(lock)
            .compare_exchange(0, core.tag(), Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    fn release(&self, lock: u8, core: CoreId) {
        if let Err(actual) =
            self.slot(lock)
                .compare_exchange(core.tag(), 0, Ordering::Release, Ordering::Relaxed)
        {
            crate::misuse!(
                "hardware lock {} not held by {:?} (owner {:?})",
                lock,
                core,
                CoreId::from_tag(actual)
            );
        }
    }

    fn owner(&self, lock: u8) -> Option<CoreId> {
        CoreId::from_tag(self.slot(lock).load(Ordering::Acquire))
    }
}

/// Doorbell that records rings per target core
pub struct MockDoorbell {
    rings: [AtomicUsize; 2],
}

impl MockDoorbell {
    /// Create a doorbell with no pending rings
    pub const fn new() -> Self {
        Self {
            rings: [AtomicUsize::new(0), AtomicUsize::new(0)],
        }
    }

    /// Rings delivered to `core` and not yet acknowledged
    pub fn pending(&self, core: CoreId) -> usize {
        self.rings[core.index()].load(Ordering::Acquire)
    }

    /// Clear `core`'s pending rings, returning how many there were
    pub fn acknowledge(&self, core: CoreId) -> usize {
        self.rings[core.index()].swap(0, Ordering::AcqRel)
    }
}

impl Default for MockDoorbell {
    fn default() -> Self {
        Self::new()
    }
}

impl Doorbell for MockDoorbell {
    fn ring(&self, target: CoreId) {
        self.rings[target.index()].fetch_add(1, Ordering::AcqRel);
    }
}
