//! Cross-Core Task Dispatch
//!
//! # Purpose
//! Lets either core hand work to the other through a FIFO of task records
//! allocated from a heap inside the shared memory window.
//!
//! # Integration Points
//! - Depends on: `duet-allocator` (shared heap), `duet-hwsem` (registry and
//!   dispatch lock), `duet-platform` (semaphore and doorbell backends)
//! - Provides to: firmware on both cores
//!
//! # Architecture
//! - [`SharedRegion`]: window header (registry, dispatch state) + shared heap
//! - [`Dispatcher`]: `submit` / `next` / `complete` for one core
//! - [`TaskHandle`]: an executing task, consumed by `complete`
//!
//! # Example
//! ```ignore
//! // Primary core
//! let region = unsafe { SharedRegion::init(base, len)? };
//! let dispatcher = region.dispatcher(&hw, &doorbell, CoreId::Primary);
//! dispatcher.submit(play_tone, Some(&440u16.to_le_bytes()))?;
//!
//! // Auxiliary core, on doorbell interrupt or when polling
//! let region = unsafe { SharedRegion::attach(base)? };
//! region.dispatcher(&hw, &doorbell, CoreId::Auxiliary).run_pending();
//! ```

#![no_std]

#[cfg(test)]
#[macro_use]
extern crate std;

mod dispatch;
mod error;
mod queue;
mod shared;
mod task;

pub use dispatch::Dispatcher;
pub use error::{DispatchError, RegionError, Result};
pub use shared::{SharedRegion, REGION_MAGIC, TASK_QUEUE_NAME};
pub use task::{TaskFn, TaskHandle, TaskId};
