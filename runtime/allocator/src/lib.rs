//! Duet heap allocator
//!
//! # Purpose
//! Backs every dynamic allocation in the firmware: boot-time executable
//! descriptors, cached audio waveforms, GUI state, and the cross-core task
//! pool itself.
//!
//! # Integration Points
//! - Depends on: `duet-platform` (layout constants)
//! - Provides to: bootloader, audio cache, GUI (core-local heaps) and
//!   `duet-ipc` (the shared heap)
//!
//! # Architecture
//! A [`Heap`] owns two [`Arena`]s: a regular arena over the whole pool and
//! a tiny arena carved from it at init. Requests below the small-object
//! threshold try the tiny arena first. Each arena is a free list plus a used
//! list of variable-sized chunks with in-band headers.
//!
//! A plain `Heap` is not synchronized: one core, one execution context.
//! [`LockedHeap`] wraps it in a spinlock for use as `#[global_allocator]`.
//!
//! # Testing Strategy
//! - Unit tests: arena split/merge, heap routing, GlobalAlloc adapter
//! - Integration tests: allocation properties over random workloads
//! - Benchmarks: allocate/release throughput (criterion)

#![no_std]

#[cfg(test)]
#[macro_use]
extern crate std;

mod arena;
mod chunk;
mod error;
mod global;
mod heap;

pub use arena::{Allocation, Arena, ArenaStats, PoolId};
pub use chunk::{HEADER_SIZE, MIN_RESIDUAL};
pub use error::{AllocError, ArenaError, HeapError, Result};
pub use global::LockedHeap;
pub use heap::{Heap, HeapConfig, HeapStats};
