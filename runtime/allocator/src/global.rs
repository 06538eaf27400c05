//! GlobalAlloc adapter
//!
//! Lets a core install its heap as `#[global_allocator]`:
//!
//! ```ignore
//! #[global_allocator]
//! static HEAP: LockedHeap = LockedHeap::empty();
//!
//! unsafe { HEAP.init(heap_start, HEAP_SIZE, HeapConfig::default()) }?;
//! ```
//!
//! The heap only hands out [`HEAP_ALIGN`]-aligned memory, so layouts asking
//! for more get null.

use core::alloc::{GlobalAlloc, Layout};
use core::ptr::{self, NonNull};

use duet_platform::layout::HEAP_ALIGN;
use spin::Mutex;

use crate::error::HeapError;
use crate::heap::{Heap, HeapConfig, HeapStats};

/// A [`Heap`] behind a spinlock, usable as the global allocator
pub struct LockedHeap {
    inner: Mutex<Option<Heap>>,
}

impl LockedHeap {
    /// An allocator with no backing memory yet; every allocation fails
    pub const fn empty() -> Self {
        Self {
            inner: Mutex::new(None),
        }
    }

    /// Attach backing memory
    ///
    /// # Safety
    /// Same contract as [`Heap::init`]
    ///
    /// # Errors
    /// Returns `HeapError::AlreadyInitialized` on a second call, or the
    /// heap's own init error
    pub unsafe fn init(&self, start: NonNull<u8>, len: usize, config: HeapConfig) -> Result<(), HeapError> {
        let mut guard = self.inner.lock();
        if guard.is_some() {
            return Err(HeapError::AlreadyInitialized);
        }
        *guard = Some(Heap::init(start, len, config)?);
        Ok(())
    }

    /// Whether backing memory has been attached
    pub fn is_initialized(&self) -> bool {
        self.inner.lock().is_some()
    }

    /// Run `f` with exclusive access to the heap
    pub fn with_heap<R>(&self, f: impl FnOnce(&mut Heap) -> R) -> Option<R> {
        self.inner.lock().as_mut().map(f)
    }

    /// Usage snapshot, if initialized
    pub fn stats(&self) -> Option<HeapStats> {
        self.with_heap(|heap| heap.stats())
    }
}

unsafe impl GlobalAlloc for LockedHeap {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if layout.align() > HEAP_ALIGN {
            log::debug!("global heap: alignment {} unsupported", layout.align());
            return ptr::null_mut();
        }

        match self.inner.lock().as_mut() {
            Some(heap) => heap
                .allocate(layout.size())
                .map_or(ptr::null_mut(), |allocation| allocation.into_raw().as_ptr()),
            None => ptr::null_mut(),
        }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        let Some(ptr) = NonNull::new(ptr) else {
            return;
        };
        match self.inner.lock().as_mut() {
            Some(heap) => heap.release_raw(ptr),
            None => duet_platform::misuse!("global heap: dealloc of {:p} before init", ptr),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::boxed::Box;

    fn initialized(len: usize) -> LockedHeap {
        let words: &'static mut [u64] = Box::leak(vec![0u64; len / 8].into_boxed_slice());
        let start = NonNull::new(words.as_mut_ptr() as *mut u8).unwrap();
        let heap = LockedHeap::empty();
        unsafe { heap.init(start, len, HeapConfig::default()).unwrap() };
        heap
    }

    #[test]
    fn test_empty_heap_returns_null() {
        let heap = LockedHeap::empty();
        assert!(!heap.is_initialized());
        let layout = Layout::from_size_align(16, 8).unwrap();
        assert!(unsafe { heap.alloc(layout) }.is_null());
        assert!(heap.stats().is_none());
    }

    #[test]
    fn test_alloc_dealloc_roundtrip() {
        let heap = initialized(8192);
        let layout = Layout::from_size_align(64, 8).unwrap();
        let ptr = unsafe { heap.alloc(layout) };
        assert!(!ptr.is_null());
        assert_eq!(ptr as usize % HEAP_ALIGN, 0);
        unsafe { ptr.write_bytes(0x5A, 64) };
        assert_eq!(heap.stats().unwrap().tiny.used_chunks, 1);

        unsafe { heap.dealloc(ptr, layout) };
        assert_eq!(heap.stats().unwrap().tiny.used_chunks, 0);
        heap.with_heap(|h| h.verify().unwrap());
    }

    #[test]
    fn test_overaligned_layout_is_refused() {
        let heap = initialized(8192);
        let layout = Layout::from_size_align(64, 64).unwrap();
        assert!(unsafe { heap.alloc(layout) }.is_null());
    }

    #[test]
    fn test_double_init_is_rejected() {
        let heap = initialized(8192);
        let words: &'static mut [u64] = Box::leak(vec![0u64; 1024].into_boxed_slice());
        let start = NonNull::new(words.as_mut_ptr() as *mut u8).unwrap();
        assert_eq!(
            unsafe { heap.init(start, 8192, HeapConfig::default()) },
            Err(HeapError::AlreadyInitialized)
        );
    }
}
