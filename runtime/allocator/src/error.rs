//! Allocator error types

use thiserror::Error;

use crate::PoolId;

/// Capacity failure: returned to the caller, never retried internally
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AllocError {
    #[error("Out of heap memory (requested: {requested} bytes)")]
    OutOfMemory { requested: usize },
}

/// Arena construction and integrity errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ArenaError {
    #[error("Arena start {addr:#x} is not aligned to {align} bytes")]
    Misaligned { addr: usize, align: usize },

    #[error("Arena of {len} bytes cannot hold a single chunk")]
    TooSmall { len: usize },

    #[error("Arena of {len} bytes exceeds the 32-bit chunk offset range")]
    TooLarge { len: usize },

    #[error("Arena pool {pool} corrupted at offset {offset:#x}: {reason}")]
    Corrupted {
        pool: PoolId,
        offset: usize,
        reason: &'static str,
    },
}

/// Heap initialization errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HeapError {
    #[error("Arena error: {0}")]
    Arena(#[from] ArenaError),

    #[error("Cannot carve the {requested}-byte tiny arena from the regular arena")]
    TinyArenaUnavailable { requested: usize },

    #[error("Regular and tiny arenas share pool id {0}")]
    DuplicatePool(PoolId),

    #[error("Heap already initialized")]
    AlreadyInitialized,
}

pub type Result<T> = core::result::Result<T, AllocError>;
