//! IPC error types

use duet_allocator::HeapError;
use duet_hwsem::SemaphoreError;
use thiserror::Error;

/// Task submission failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("Shared heap exhausted (requested: {requested} bytes)")]
    OutOfMemory { requested: usize },

    #[error("Task argument of {len} bytes exceeds the record length field")]
    ArgumentTooLarge { len: usize },
}

/// Shared region setup failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RegionError {
    #[error("Shared region base {addr:#x} is not aligned to {align} bytes")]
    Misaligned { addr: usize, align: usize },

    #[error("Shared region of {len} bytes is smaller than its {required}-byte header")]
    TooSmall { len: usize, required: usize },

    #[error("No initialized shared region at {addr:#x}")]
    NotInitialized { addr: usize },

    #[error("Shared heap error: {0}")]
    Heap(#[from] HeapError),

    #[error("Semaphore registry error: {0}")]
    Semaphore(#[from] SemaphoreError),
}

pub type Result<T> = core::result::Result<T, DispatchError>;
