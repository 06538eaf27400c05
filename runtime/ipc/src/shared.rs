//! Shared Region
//!
//! # Purpose
//! The memory window both cores map. Its header holds the semaphore
//! registry and the dispatch state; the rest is the shared heap.
//!
//! # Memory Layout
//! ```text
//! base ─► ┌──────────────────────────────┐
//!         │ magic                        │
//!         │ registry  (HwMutex, id 0)    │
//!         │ dispatch  (HwMutex, id 1)    │
//!         ├──────────────────────────────┤ base + header_len()
//!         │ shared heap (regular + tiny) │
//!         └──────────────────────────────┘ base + len
//! ```
//!
//! # Implementation Notes
//! - The primary core calls [`SharedRegion::init`]; the magic is published
//!   last with release ordering
//! - The auxiliary core calls [`SharedRegion::attach`], which never writes
//! - Heap and queue hold absolute addresses, so both cores must map the
//!   window at the same address (`layout::SHARED_REGION_BASE`)

use core::mem::{align_of, size_of};
use core::ptr::{self, NonNull};
use core::sync::atomic::{AtomicU32, Ordering};

use duet_allocator::{Heap, HeapConfig};
use duet_hwsem::{HwMutex, SemId, SemaphoreTable, Semaphores};
use duet_platform::layout::{align_up, HEAP_ALIGN};
use duet_platform::{CoreId, Doorbell, HwSemaphore};

use crate::dispatch::{DispatchState, Dispatcher};
use crate::RegionError;

/// Written last by `init`, checked by `attach`
pub const REGION_MAGIC: u32 = 0xD0E7_5E6D;

/// Registry name of the dispatch lock
pub const TASK_QUEUE_NAME: &str = "task_queue";

/// Header of the shared memory window
#[repr(C)]
pub struct SharedRegion {
    magic: AtomicU32,
    registry: HwMutex<SemaphoreTable>,
    pub(crate) dispatch: HwMutex<DispatchState>,
}

impl SharedRegion {
    /// Bytes taken by the header, rounded to the heap alignment
    pub const fn header_len() -> usize {
        align_up(size_of::<Self>(), HEAP_ALIGN)
    }

    /// Window length needed for a shared heap of `pool_size` bytes
    pub const fn required_len(pool_size: usize) -> usize {
        Self::header_len() + pool_size
    }

    /// Build the region over `[base, base + len)` (primary core)
    ///
    /// # Arguments
    /// * `base` - Start of the window, aligned for the header
    /// * `len` - Window length; everything after the header becomes heap
    ///
    /// # Safety
    /// The window must be valid, writable memory reserved for the region for
    /// the rest of the program, and the other core must not attach until
    /// this returns. Calling it again over a live region discards every
    /// queued task and registered semaphore.
    ///
    /// # Errors
    /// - `RegionError::Misaligned` / `RegionError::TooSmall` for a bad window
    /// - `RegionError::Heap` if the shared heap cannot be built
    pub unsafe fn init(base: NonNull<u8>, len: usize) -> Result<&'static Self, RegionError> {
        let addr = base.as_ptr() as usize;
        check_alignment(addr)?;
        let header = Self::header_len();
        if len < header {
            return Err(RegionError::TooSmall { len, required: header });
        }

        let heap_start = NonNull::new_unchecked(base.as_ptr().add(header));
        let heap = Heap::init(heap_start, len - header, HeapConfig::shared())?;

        let mut registry = SemaphoreTable::with_registry();
        let queue_id = registry.acquire_id(TASK_QUEUE_NAME)?;

        let region = base.as_ptr().cast::<Self>();
        region.write(Self {
            magic: AtomicU32::new(0),
            registry: HwMutex::new(SemId::REGISTRY, registry),
            dispatch: HwMutex::new(queue_id, DispatchState::new(heap)),
        });
        let region = &*region;
        region.magic.store(REGION_MAGIC, Ordering::Release);

        log::info!(
            "shared region at {:#x}: {}-byte header, {}-byte heap, dispatch lock {}",
            addr,
            header,
            len - header,
            queue_id.as_raw()
        );
        Ok(region)
    }

    /// Attach to a region the primary core built (auxiliary core)
    ///
    /// # Safety
    /// `base` must be the start of the mapped window, valid for reads for
    /// the rest of the program.
    ///
    /// # Errors
    /// Returns `RegionError::NotInitialized` if the magic is absent
    pub unsafe fn attach(base: NonNull<u8>) -> Result<&'static Self, RegionError> {
        let addr = base.as_ptr() as usize;
        check_alignment(addr)?;

        let region = base.as_ptr().cast::<Self>();
        let magic = &*ptr::addr_of!((*region).magic);
        if magic.load(Ordering::Acquire) != REGION_MAGIC {
            log::warn!("no shared region at {:#x} yet", addr);
            return Err(RegionError::NotInitialized { addr });
        }

        log::debug!("attached to shared region at {:#x}", addr);
        Ok(&*region)
    }

    /// Id of the lock guarding the queue and shared heap
    pub fn task_queue_id(&self) -> SemId {
        self.dispatch.id()
    }

    /// Semaphore registry operations for `core`
    pub fn semaphores<'a, H: HwSemaphore + ?Sized>(&'a self, hw: &'a H, core: CoreId) -> Semaphores<'a, H> {
        Semaphores::new(&self.registry, hw, core)
    }

    /// Task queue operations for `core`
    pub fn dispatcher<'a, H, D>(&'a self, hw: &'a H, doorbell: &'a D, core: CoreId) -> Dispatcher<'a, H, D>
    where
        H: HwSemaphore + ?Sized,
        D: Doorbell + ?Sized,
    {
        Dispatcher::new(self, hw, doorbell, core)
    }

    /// Run `f` on the shared heap while holding the dispatch lock
    ///
    /// Memory kept past `f` must be released the same way.
    pub fn with_heap<H, R, F>(&self, hw: &H, core: CoreId, f: F) -> R
    where
        H: HwSemaphore + ?Sized,
        F: FnOnce(&mut Heap) -> R,
    {
        let mut state = self.dispatch.lock(hw, core);
        f(&mut state.heap)
    }
}

#[cfg(feature = "runtime")]
impl SharedRegion {
    /// [`SharedRegion::init`] over the fixed window from the layout contract
    ///
    /// # Safety
    /// See [`SharedRegion::init`]
    pub unsafe fn init_default() -> Result<&'static Self, RegionError> {
        use duet_platform::layout::{SHARED_REGION_BASE, SHARED_REGION_LEN};
        Self::init(NonNull::new_unchecked(SHARED_REGION_BASE as *mut u8), SHARED_REGION_LEN)
    }

    /// [`SharedRegion::attach`] to the fixed window from the layout contract
    ///
    /// # Safety
    /// See [`SharedRegion::attach`]
    pub unsafe fn attach_default() -> Result<&'static Self, RegionError> {
        Self::attach(NonNull::new_unchecked(duet_platform::layout::SHARED_REGION_BASE as *mut u8))
    }
}

fn check_alignment(addr: usize) -> Result<(), RegionError> {
    let align = align_of::<SharedRegion>();
    if addr % align != 0 {
        return Err(RegionError::Misaligned { addr, align });
    }
    Ok(())
}
