//! Shared Layout Contract
//!
//! Constants that both cores must agree on. They are baked into both
//! firmware images, so changing any of them requires rebuilding both.
//!
//! # Memory Map
//! ```text
//! SHARED_REGION_BASE                                  +SHARED_REGION_LEN
//! | region header | shared heap (regular arena ... [tiny arena] ...) |
//! ```

use static_assertions::const_assert;

/// Base address of the memory window mapped by both cores
pub const SHARED_REGION_BASE: usize = 0x3FF0_0000;

/// Length of the shared memory window in bytes
pub const SHARED_REGION_LEN: usize = 64 * 1024;

/// Requests strictly below this size are routed to the tiny arena first
pub const SMALL_OBJECT_THRESHOLD: usize = 128;

/// Bytes carved from the regular arena to back the tiny arena
pub const TINY_ARENA_SIZE: usize = 4096;

/// Number of named semaphore slots (one per hardware lock)
pub const SEMAPHORE_CAPACITY: usize = 32;

/// Longest semaphore name in bytes
pub const SEMAPHORE_NAME_MAX: usize = 15;

/// Number of locks in the hardware semaphore block
pub const HW_LOCK_COUNT: usize = SEMAPHORE_CAPACITY;

/// Allocation granule: every request is rounded up to the native word
pub const HEAP_ALIGN: usize = core::mem::size_of::<usize>();

/// MMIO base of the hardware semaphore block (runtime backend)
pub const HWSEM_MMIO_BASE: usize = 0x4800_0000;

/// MMIO base of the inter-core doorbell block (runtime backend)
pub const DOORBELL_MMIO_BASE: usize = 0x4801_0000;

const_assert!(HEAP_ALIGN.is_power_of_two());
const_assert!(SHARED_REGION_BASE % 4096 == 0);
const_assert!(SMALL_OBJECT_THRESHOLD < TINY_ARENA_SIZE);
const_assert!(TINY_ARENA_SIZE % HEAP_ALIGN == 0);
const_assert!(TINY_ARENA_SIZE < SHARED_REGION_LEN);
const_assert!(HW_LOCK_COUNT <= u8::MAX as usize);
const_assert!(SEMAPHORE_NAME_MAX < 16);

/// Round `value` up to the next multiple of `align` (power of two)
#[inline]
pub const fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

/// Round `value` down to a multiple of `align` (power of two)
#[inline]
pub const fn align_down(value: usize, align: usize) -> usize {
    value & !(align - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 8), 0);
        assert_eq!(align_up(1, 8), 8);
        assert_eq!(align_up(8, 8), 8);
        assert_eq!(align_up(3000, 8), 3000);
        assert_eq!(align_up(3001, 8), 3008);
    }

    #[test]
    fn test_align_down() {
        assert_eq!(align_down(15, 8), 8);
        assert_eq!(align_down(16, 8), 16);
    }
}
