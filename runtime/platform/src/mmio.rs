//! MMIO hardware backend
//!
//! Drives the SoC's hardware semaphore block and doorbell registers.
//!
//! # Register Map (semaphore block)
//! - `R[n]`   at `base + 4*n`        : write `core` to release, reads owner tag
//! - `RLR[n]` at `base + 0x80 + 4*n` : read-to-lock; returns `LOCK | core`
//!   of whoever holds the lock after the read
//!
//! # Register Map (doorbell block)
//! - `SET[c]` at `base + 4*c` : write 1 to raise the interrupt on core index `c`

use core::ptr::{read_volatile, write_volatile};

use crate::layout::{DOORBELL_MMIO_BASE, HWSEM_MMIO_BASE, HW_LOCK_COUNT};
use crate::{CoreId, Doorbell, HwSemaphore};

const READ_LOCK_OFFSET: usize = 0x80;
const LOCK_BIT: u32 = 1 << 31;
const CORE_MASK: u32 = 0xFF;

/// Hardware semaphore block at a fixed MMIO address
pub struct MmioHwSemaphore {
    base: usize,
}

impl MmioHwSemaphore {
    /// Bind to the block at `base`
    ///
    /// # Safety
    /// `base` must be the mapped, device-memory address of the semaphore block.
    pub const unsafe fn new(base: usize) -> Self {
        Self { base }
    }

    /// Bind to the block at its contract address
    ///
    /// # Safety
    /// The block must be mapped at [`HWSEM_MMIO_BASE`].
    pub const unsafe fn at_default_base() -> Self {
        Self::new(HWSEM_MMIO_BASE)
    }

    fn check(lock: u8) {
        if lock as usize >= HW_LOCK_COUNT {
            crate::misuse!("hardware lock {} out of range (block has {})", lock, HW_LOCK_COUNT);
        }
    }

    fn release_reg(&self, lock: u8) -> *mut u32 {
        (self.base + 4 * lock as usize) as *mut u32
    }

    fn read_lock_reg(&self, lock: u8) -> *const u32 {
        (self.base + READ_LOCK_OFFSET + 4 * lock as usize) as *const u32
    }
}

impl HwSemaphore for MmioHwSemaphore {
    fn lock_count(&self) -> usize {
        HW_LOCK_COUNT
    }

    fn try_take(&self, lock: u8, core: CoreId) -> bool {
        Self::check(lock);
        // SAFETY: register address derived from the block base in `new`
        let value = unsafe { read_volatile(self.read_lock_reg(lock)) };
        value == (LOCK_BIT | core.tag() as u32)
    }

    fn release(&self, lock: u8, core: CoreId) {
        let owner = self.owner(lock);
        if owner != Some(core) {
            crate::misuse!("hardware lock {} not held by {:?} (owner {:?})", lock, core, owner);
        }
        // SAFETY: see `try_take`
        unsafe { write_volatile(self.release_reg(lock), core.tag() as u32) };
    }

    fn owner(&self, lock: u8) -> Option<CoreId> {
        Self::check(lock);
        // SAFETY: see `try_take`
        let value = unsafe { read_volatile(self.release_reg(lock) as *const u32) };
        if value & LOCK_BIT == 0 {
            return None;
        }
        CoreId::from_tag((value & CORE_MASK) as u8)
    }
}

/// Doorbell interrupt block at a fixed MMIO address
pub struct MmioDoorbell {
    base: usize,
}

impl MmioDoorbell {
    /// Bind to the block at `base`
    ///
    /// # Safety
    /// `base` must be the mapped, device-memory address of the doorbell block.
    pub const unsafe fn new(base: usize) -> Self {
        Self { base }
    }

    /// Bind to the block at its contract address
    ///
    /// # Safety
    /// The block must be mapped at [`DOORBELL_MMIO_BASE`].
    pub const unsafe fn at_default_base() -> Self {
        Self::new(DOORBELL_MMIO_BASE)
    }
}

impl Doorbell for MmioDoorbell {
    fn ring(&self, target: CoreId) {
        let reg = (self.base + 4 * target.index()) as *mut u32;
        // SAFETY: register address derived from the block base in `new`
        unsafe { write_volatile(reg, 1) };
    }
}
