//! Semaphore registry error types

use thiserror::Error;

/// Registry failures returned to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SemaphoreError {
    #[error("No free semaphore slot (capacity: {capacity})")]
    NoFreeSlot { capacity: usize },

    #[error("Invalid semaphore name length {len} (must be 1..={max})")]
    InvalidName { len: usize, max: usize },
}

pub type Result<T> = core::result::Result<T, SemaphoreError>;
