//! Heap - size-class routing over a regular and a tiny arena
//!
//! # Design
//! - The regular arena spans the whole pool
//! - At init the heap allocates `tiny_arena_size` bytes from the regular
//!   arena and builds the tiny arena over them; that chunk is never freed
//! - Requests below `small_object_threshold` try tiny first, then regular
//! - Release is routed by the allocation's pool id

use core::ptr::NonNull;

use duet_platform::layout::{SMALL_OBJECT_THRESHOLD, TINY_ARENA_SIZE};

use crate::arena::{Allocation, Arena, ArenaStats, PoolId};
use crate::error::{ArenaError, HeapError};
use crate::Result;

/// Heap tuning; defaults come from the shared layout contract
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapConfig {
    /// Requests strictly below this size try the tiny arena first
    pub small_object_threshold: usize,
    /// Bytes carved from the regular arena for the tiny arena
    pub tiny_arena_size: usize,
    /// Pool id of the regular arena
    pub regular_pool: PoolId,
    /// Pool id of the tiny arena
    pub tiny_pool: PoolId,
}

impl HeapConfig {
    /// Core-local heap configuration
    pub const fn new() -> Self {
        Self {
            small_object_threshold: SMALL_OBJECT_THRESHOLD,
            tiny_arena_size: TINY_ARENA_SIZE,
            regular_pool: PoolId::REGULAR,
            tiny_pool: PoolId::TINY,
        }
    }

    /// Configuration for the heap inside the shared window
    pub const fn shared() -> Self {
        Self {
            regular_pool: PoolId::SHARED_REGULAR,
            tiny_pool: PoolId::SHARED_TINY,
            ..Self::new()
        }
    }
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Usage snapshot of both arenas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeapStats {
    pub regular: ArenaStats,
    pub tiny: ArenaStats,
}

/// Segregated-pool heap
#[derive(Debug)]
pub struct Heap {
    regular: Arena,
    tiny: Arena,
    config: HeapConfig,
    /// Regular-arena chunk backing the tiny arena, held for the heap's lifetime
    tiny_backing: Allocation,
}

impl Heap {
    /// Build a heap over `[start, start + len)`
    ///
    /// # Safety
    /// Same contract as [`Arena::new`]: the range must be valid, writable
    /// memory owned by the heap for its whole lifetime.
    ///
    /// # Errors
    /// - `HeapError::Arena` if the range is unusable
    /// - `HeapError::TinyArenaUnavailable` if the tiny arena cannot be carved;
    ///   callers must treat this as fatal
    pub unsafe fn init(start: NonNull<u8>, len: usize, config: HeapConfig) -> core::result::Result<Self, HeapError> {
        if config.regular_pool == config.tiny_pool {
            return Err(HeapError::DuplicatePool(config.regular_pool));
        }

        let mut regular = Arena::new(start, len, config.regular_pool)?;
        let tiny_backing = match regular.allocate(config.tiny_arena_size) {
            Ok(allocation) => allocation,
            Err(_) => {
                log::error!(
                    "heap: cannot carve {}-byte tiny arena from {}-byte pool",
                    config.tiny_arena_size,
                    regular.len()
                );
                return Err(HeapError::TinyArenaUnavailable {
                    requested: config.tiny_arena_size,
                });
            }
        };

        let tiny = Arena::new(
            NonNull::new_unchecked(tiny_backing.as_ptr()),
            tiny_backing.size(),
            config.tiny_pool,
        )?;

        log::info!(
            "heap: regular pool {} at {:#x} ({} bytes), tiny pool {} at {:#x} ({} bytes)",
            regular.pool(),
            regular.start(),
            regular.len(),
            tiny.pool(),
            tiny.start(),
            tiny.len()
        );

        Ok(Self {
            regular,
            tiny,
            config,
            tiny_backing,
        })
    }

    /// Allocate `size` bytes, routing small requests to the tiny arena first
    ///
    /// # Errors
    /// Returns `AllocError::OutOfMemory` if neither eligible arena has room.
    /// No compaction is attempted before failing.
    pub fn allocate(&mut self, size: usize) -> Result<Allocation> {
        if size < self.config.small_object_threshold {
            match self.tiny.allocate(size) {
                Ok(allocation) => return Ok(allocation),
                Err(_) => log::trace!("heap: tiny pool full, {} bytes go to regular", size),
            }
        }
        self.regular.allocate(size)
    }

    /// Return an allocation to the arena that carved it
    ///
    /// # Panics
    /// Panics if the allocation's pool id belongs to neither arena
    pub fn release(&mut self, allocation: Allocation) {
        let pool = allocation.pool();
        if pool == self.tiny.pool() {
            self.tiny.release(allocation);
        } else if pool == self.regular.pool() {
            self.regular.release(allocation);
        } else {
            duet_platform::misuse!(
                "heap: release of allocation from unknown pool {} (heap owns {} and {})",
                pool,
                self.regular.pool(),
                self.tiny.pool()
            );
        }
    }

    /// Return memory previously handed out via [`Allocation::into_raw`]
    ///
    /// The tiny arena is checked first since it lies inside the regular one.
    ///
    /// # Panics
    /// Panics if `ptr` is not a live allocation of this heap
    pub fn release_raw(&mut self, ptr: NonNull<u8>) {
        let addr = ptr.as_ptr() as usize;
        if self.tiny.contains(addr) {
            self.tiny.release_addr(addr);
        } else if self.regular.contains(addr) {
            self.regular.release_addr(addr);
        } else {
            duet_platform::misuse!("heap: release of {:#x}, outside both arenas", addr);
        }
    }

    /// Whether `addr` lies inside this heap's pool
    pub fn contains(&self, addr: usize) -> bool {
        self.regular.contains(addr)
    }

    /// The regular arena
    pub fn regular(&self) -> &Arena {
        &self.regular
    }

    /// The tiny arena
    pub fn tiny(&self) -> &Arena {
        &self.tiny
    }

    /// Active configuration
    pub fn config(&self) -> &HeapConfig {
        &self.config
    }

    /// Usage snapshot of both arenas
    pub fn stats(&self) -> HeapStats {
        HeapStats {
            regular: self.regular.stats(),
            tiny: self.tiny.stats(),
        }
    }

    /// Check both arenas' invariants and that the tiny arena sits on its backing chunk
    ///
    /// # Errors
    /// Returns the first `ArenaError::Corrupted` found
    pub fn verify(&self) -> core::result::Result<(), ArenaError> {
        self.regular.verify()?;
        self.tiny.verify()?;
        if !self.tiny_backing.covers(self.tiny.start(), self.tiny.len()) {
            return Err(ArenaError::Corrupted {
                pool: self.tiny.pool(),
                offset: 0,
                reason: "tiny arena escaped its backing chunk",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::HEADER_SIZE;
    use crate::AllocError;
    use std::boxed::Box;
    use std::vec::Vec;

    fn heap(len: usize) -> Heap {
        let words: &'static mut [u64] = Box::leak(vec![0u64; len / 8].into_boxed_slice());
        let start = NonNull::new(words.as_mut_ptr() as *mut u8).unwrap();
        unsafe { Heap::init(start, len, HeapConfig::default()).unwrap() }
    }

    #[test]
    fn test_init_carves_tiny_arena() {
        let heap = heap(8192);
        assert_eq!(heap.tiny().len(), TINY_ARENA_SIZE);
        assert!(heap.regular().contains(heap.tiny().start()));

        let stats = heap.stats();
        assert_eq!(stats.regular.used_chunks, 1);
        assert_eq!(stats.regular.used_bytes, TINY_ARENA_SIZE + HEADER_SIZE);
        assert_eq!(stats.regular.free_bytes, 8192 - TINY_ARENA_SIZE - HEADER_SIZE);
        heap.verify().unwrap();
    }

    #[test]
    fn test_init_fails_without_room_for_tiny() {
        let words: &'static mut [u64] = Box::leak(vec![0u64; 512].into_boxed_slice());
        let start = NonNull::new(words.as_mut_ptr() as *mut u8).unwrap();
        let result = unsafe { Heap::init(start, 4096, HeapConfig::default()) };
        assert!(matches!(
            result,
            Err(HeapError::TinyArenaUnavailable { requested: TINY_ARENA_SIZE })
        ));
    }

    #[test]
    fn test_init_rejects_duplicate_pools() {
        let words: &'static mut [u64] = Box::leak(vec![0u64; 1024].into_boxed_slice());
        let start = NonNull::new(words.as_mut_ptr() as *mut u8).unwrap();
        let config = HeapConfig {
            tiny_pool: PoolId::REGULAR,
            ..HeapConfig::default()
        };
        assert!(matches!(
            unsafe { Heap::init(start, 8192, config) },
            Err(HeapError::DuplicatePool(PoolId::REGULAR))
        ));
    }

    #[test]
    fn test_small_requests_go_to_tiny() {
        let mut heap = heap(8192);
        let small = heap.allocate(64).unwrap();
        assert_eq!(small.pool(), PoolId::TINY);
        assert!(heap.tiny().contains(small.addr()));

        let boundary = heap.allocate(SMALL_OBJECT_THRESHOLD).unwrap();
        assert_eq!(boundary.pool(), PoolId::REGULAR);

        heap.release(small);
        heap.release(boundary);
        heap.verify().unwrap();
    }

    #[test]
    fn test_tiny_exhaustion_falls_back_to_regular() {
        let mut heap = heap(16 * 1024);
        let mut live = Vec::new();
        loop {
            let a = heap.allocate(64).unwrap();
            let pool = a.pool();
            live.push(a);
            if pool == PoolId::REGULAR {
                break;
            }
        }
        // Tiny absorbed 50 requests of 64 + 16 bytes before falling back
        assert_eq!(live.len(), 51);
        assert_eq!(heap.stats().tiny.used_chunks, 50);

        for a in live {
            heap.release(a);
        }
        assert_eq!(heap.stats().tiny.free_chunks, 1);
        heap.verify().unwrap();
    }

    #[test]
    fn test_exhaustion_is_reported_not_retried() {
        let mut heap = heap(8192);
        let big = heap.allocate(3000).unwrap();
        assert_eq!(heap.allocate(3000), Err(AllocError::OutOfMemory { requested: 3000 }));
        heap.release(big);
        assert!(heap.allocate(3000).is_ok());
    }

    #[test]
    fn test_release_raw_routes_by_address() {
        let mut heap = heap(8192);
        let small = heap.allocate(8).unwrap().into_raw();
        let large = heap.allocate(512).unwrap().into_raw();
        heap.release_raw(small);
        heap.release_raw(large);
        let stats = heap.stats();
        assert_eq!(stats.tiny.used_chunks, 0);
        assert_eq!(stats.regular.used_chunks, 1);
        heap.verify().unwrap();
    }

    #[test]
    #[should_panic(expected = "unknown pool")]
    fn test_release_from_foreign_heap_panics() {
        let mut local = heap(8192);
        let words: &'static mut [u64] = Box::leak(vec![0u64; 1024].into_boxed_slice());
        let start = NonNull::new(words.as_mut_ptr() as *mut u8).unwrap();
        let mut shared = unsafe { Heap::init(start, 8192, HeapConfig::shared()).unwrap() };
        let a = shared.allocate(16).unwrap();
        local.release(a);
    }

    #[test]
    #[should_panic(expected = "not a payload address")]
    fn test_release_tiny_backing_panics() {
        let mut heap = heap(8192);
        let backing = NonNull::new(heap.tiny().start() as *mut u8).unwrap();
        heap.release_raw(backing);
    }
}
