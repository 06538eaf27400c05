//! Hardware Semaphore Registry
//!
//! # Purpose
//! Named, cross-core mutual exclusion over the hardware semaphore block.
//!
//! # Integration Points
//! - Depends on: `duet-platform` (hardware semaphore backend, core identity)
//! - Provides to: `duet-ipc` (task queue lock) and any subsystem that needs
//!   a lock shared with the other core
//!
//! # Architecture
//! - [`SemaphoreTable`]: fixed 32-slot name → id table
//! - [`HwMutex`]: data reachable only while holding a hardware lock
//! - [`Semaphores`]: per-core facade (`acquire_id`, `release_id`, `lock`,
//!   `spin_lock`, `unlock`) over a table guarded by the reserved id 0

#![no_std]

#[cfg(test)]
#[macro_use]
extern crate std;

mod error;
mod mutex;
mod semaphores;
mod table;

pub use error::{Result, SemaphoreError};
pub use mutex::{HwMutex, HwMutexGuard};
pub use semaphores::Semaphores;
pub use table::{SemId, SemaphoreTable, REGISTRY_NAME};
