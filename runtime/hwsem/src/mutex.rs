//! Scoped hardware lock
//!
//! [`HwMutex`] pairs data with a hardware semaphore id. The data is only
//! reachable through an [`HwMutexGuard`], which takes the hardware lock on
//! creation and releases it on drop, so code cannot touch the protected
//! state outside a `spin_lock`/`unlock` pair.
//!
//! The mutex does not hold a reference to the hardware: each core passes
//! its own view of the semaphore block and its own [`CoreId`] when locking.
//! That keeps the mutex plain data, placeable in the shared window.

use core::cell::UnsafeCell;
use core::fmt;
use core::ops::{Deref, DerefMut};

use duet_platform::{CoreId, HwSemaphore};

use crate::SemId;

/// Data guarded by a hardware semaphore
#[repr(C)]
pub struct HwMutex<T> {
    id: SemId,
    data: UnsafeCell<T>,
}

// SAFETY: access to `data` is serialized by the hardware lock `id`; every
// path to it goes through a guard that holds that lock.
unsafe impl<T: Send> Sync for HwMutex<T> {}

impl<T> HwMutex<T> {
    /// Guard `data` with hardware lock `id`
    pub const fn new(id: SemId, data: T) -> Self {
        Self {
            id,
            data: UnsafeCell::new(data),
        }
    }

    /// Semaphore id guarding the data
    pub fn id(&self) -> SemId {
        self.id
    }

    /// Take the lock, spinning until the hardware grants it
    ///
    /// Blocks indefinitely if the other core never releases.
    pub fn lock<'a, H: HwSemaphore + ?Sized>(&'a self, hw: &'a H, core: CoreId) -> HwMutexGuard<'a, T, H> {
        let mut spins: usize = 0;
        while !hw.try_take(self.id.lock(), core) {
            spins = spins.wrapping_add(1);
            core::hint::spin_loop();
        }
        if spins > 0 {
            log::trace!("{:?} took semaphore {} after {} spins", core, self.id.as_raw(), spins);
        }
        HwMutexGuard { mutex: self, hw, core }
    }

    /// Take the lock if it is free right now
    pub fn try_lock<'a, H: HwSemaphore + ?Sized>(&'a self, hw: &'a H, core: CoreId) -> Option<HwMutexGuard<'a, T, H>> {
        if hw.try_take(self.id.lock(), core) {
            Some(HwMutexGuard { mutex: self, hw, core })
        } else {
            None
        }
    }

    /// Direct access through a unique reference (no other core can hold one)
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }
}

impl<T> fmt::Debug for HwMutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HwMutex").field("id", &self.id).finish_non_exhaustive()
    }
}

/// Proof that the calling core holds the hardware lock
pub struct HwMutexGuard<'a, T, H: HwSemaphore + ?Sized> {
    mutex: &'a HwMutex<T>,
    hw: &'a H,
    core: CoreId,
}

impl<T, H: HwSemaphore + ?Sized> HwMutexGuard<'_, T, H> {
    /// Core holding the lock
    pub fn core(&self) -> CoreId {
        self.core
    }

    /// Semaphore id held
    pub fn id(&self) -> SemId {
        self.mutex.id
    }
}

impl<T, H: HwSemaphore + ?Sized> Deref for HwMutexGuard<'_, T, H> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the guard holds the hardware lock
        unsafe { &*self.mutex.data.get() }
    }
}

impl<T, H: HwSemaphore + ?Sized> DerefMut for HwMutexGuard<'_, T, H> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: the guard holds the hardware lock
        unsafe { &mut *self.mutex.data.get() }
    }
}

impl<T, H: HwSemaphore + ?Sized> Drop for HwMutexGuard<'_, T, H> {
    fn drop(&mut self) {
        self.hw.release(self.mutex.id.lock(), self.core);
    }
}
