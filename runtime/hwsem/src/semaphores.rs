//! Semaphores - the registry operations as seen from one core
//!
//! Binds a registry table (guarded by the reserved registry lock), a view
//! of the hardware semaphore block, and the calling core's identity.

use duet_platform::{CoreId, HwSemaphore};

use crate::{HwMutex, Result, SemId, SemaphoreTable};

/// Named cross-core locks for one core
pub struct Semaphores<'a, H: HwSemaphore + ?Sized> {
    table: &'a HwMutex<SemaphoreTable>,
    hw: &'a H,
    core: CoreId,
}

impl<'a, H: HwSemaphore + ?Sized> Semaphores<'a, H> {
    /// Bind a registry table to this core
    ///
    /// The table must be guarded by [`SemId::REGISTRY`] and have that slot
    /// claimed (see [`SemaphoreTable::with_registry`]).
    pub fn new(table: &'a HwMutex<SemaphoreTable>, hw: &'a H, core: CoreId) -> Self {
        debug_assert_eq!(table.id(), SemId::REGISTRY);
        Self { table, hw, core }
    }

    /// Core these operations run as
    pub fn core(&self) -> CoreId {
        self.core
    }

    /// Look up or register `name`
    ///
    /// # Errors
    /// See [`SemaphoreTable::acquire_id`]
    pub fn acquire_id(&self, name: &str) -> Result<SemId> {
        self.table.lock(self.hw, self.core).acquire_id(name)
    }

    /// Id registered under `name`, if any
    pub fn lookup(&self, name: &str) -> Option<SemId> {
        self.table.lock(self.hw, self.core).lookup(name)
    }

    /// Unregister `id`
    ///
    /// # Panics
    /// Panics for the registry's own slot, for an unregistered id, or while
    /// any core holds the id's hardware lock
    pub fn release_id(&self, id: SemId) {
        if id == SemId::REGISTRY {
            duet_platform::misuse!("the registry semaphore cannot be released");
        }
        if let Some(owner) = self.hw.owner(id.lock()) {
            duet_platform::misuse!(
                "semaphore id {} released while locked by {:?}",
                id.as_raw(),
                owner
            );
        }
        self.table.lock(self.hw, self.core).release_id(id);
    }

    /// One attempt at the hardware lock
    pub fn lock(&self, id: SemId) -> bool {
        self.hw.try_take(id.lock(), self.core)
    }

    /// Retry the hardware lock until it is granted; no timeout
    pub fn spin_lock(&self, id: SemId) {
        while !self.lock(id) {
            core::hint::spin_loop();
        }
    }

    /// Release the hardware lock held by this core
    ///
    /// # Panics
    /// Panics if this core does not hold it
    pub fn unlock(&self, id: SemId) {
        self.hw.release(id.lock(), self.core);
    }
}
