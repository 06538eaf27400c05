//! Hardware semaphore primitive
//!
//! A block of core-aware exclusive-take locks. A lock taken by one core can
//! only be released by that same core.

use crate::CoreId;

/// Core-aware atomic take/release primitive
///
/// # Implementation Notes
/// - `try_take` is a single attempt; spinning is the caller's business
/// - Re-taking a lock already held by the same core is backend specific;
///   callers must not rely on recursion
/// - `release` by a core that does not hold the lock is a programming error
///   and backends panic on it
pub trait HwSemaphore: Sync {
    /// Number of locks in the block
    fn lock_count(&self) -> usize;

    /// Attempt to take `lock` once on behalf of `core`
    fn try_take(&self, lock: u8, core: CoreId) -> bool;

    /// Release `lock`, which must be held by `core`
    fn release(&self, lock: u8, core: CoreId);

    /// Current owner of `lock`, if any
    fn owner(&self, lock: u8) -> Option<CoreId>;

    /// Whether `lock` is currently held by any core
    fn is_taken(&self, lock: u8) -> bool {
        self.owner(lock).is_some()
    }
}
