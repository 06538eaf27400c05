//! Arena - one fixed byte range managed as a free list and a used list
//!
//! # Design
//! - The whole range is tiled by chunks; each chunk is on exactly one list
//! - Free list is kept sorted by address so coalescing is complete
//! - Used list keeps insertion order
//! - Allocation: first fit with minimum residual, carved from the chunk tail
//!
//! # Implementation Notes
//! - O(n) in chunk count for allocate and release
//! - The arena never touches memory outside `[start, start + len)`
//! - Misuse (foreign pointer, double release, trampled header) panics

use core::fmt;
use core::ptr::NonNull;

use duet_platform::layout::{align_down, HEAP_ALIGN};

use crate::chunk::{ChunkHeader, ChunkList, ChunkState, CHUNK_MAGIC, HEADER_SIZE, MIN_RESIDUAL, NIL};
use crate::error::{AllocError, ArenaError};
use crate::Result;

/// Identifies the arena that carved a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PoolId(pub u8);

impl PoolId {
    /// Core-local regular arena
    pub const REGULAR: PoolId = PoolId(0);
    /// Core-local tiny arena
    pub const TINY: PoolId = PoolId(1);
    /// Regular arena of the shared window
    pub const SHARED_REGULAR: PoolId = PoolId(2);
    /// Tiny arena of the shared window
    pub const SHARED_TINY: PoolId = PoolId(3);
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A live allocation
///
/// Move-only: it is consumed by [`Arena::release`] (or the heap's
/// `release`), so the same allocation cannot be released twice through this
/// handle. Use [`Allocation::into_raw`] to hand the memory to an owner that
/// tracks it by address.
#[must_use = "dropping an Allocation leaks its chunk"]
#[derive(Debug, PartialEq, Eq)]
pub struct Allocation {
    addr: usize,
    size: usize,
    pool: PoolId,
}

impl Allocation {
    /// Start of the usable bytes
    pub fn addr(&self) -> usize {
        self.addr
    }

    /// Raw pointer to the usable bytes
    pub fn as_ptr(&self) -> *mut u8 {
        self.addr as *mut u8
    }

    /// Usable size (request rounded up to the heap alignment)
    pub fn size(&self) -> usize {
        self.size
    }

    /// Pool the chunk was carved from
    pub fn pool(&self) -> PoolId {
        self.pool
    }

    /// Whether `[addr, addr + len)` lies inside this allocation
    pub fn covers(&self, addr: usize, len: usize) -> bool {
        addr >= self.addr && addr + len <= self.addr + self.size
    }

    /// The usable bytes
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: the arena contract (`Arena::new`) guarantees the range is
        // valid memory, and this handle is its only owner until released.
        unsafe { core::slice::from_raw_parts_mut(self.as_ptr(), self.size) }
    }

    /// Give up the handle, keeping the chunk allocated
    pub fn into_raw(self) -> NonNull<u8> {
        // SAFETY: arena addresses are never null
        unsafe { NonNull::new_unchecked(self.as_ptr()) }
    }
}

/// Usage snapshot of one arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ArenaStats {
    pub len: usize,
    pub free_bytes: usize,
    pub used_bytes: usize,
    pub free_chunks: usize,
    pub used_chunks: usize,
    pub largest_free: usize,
}

/// Fixed-capacity free-list arena
pub struct Arena {
    start: usize,
    len: u32,
    pool: PoolId,
    free: ChunkList,
    used: ChunkList,
}

impl Arena {
    /// Build an arena over `[start, start + len)` as a single free chunk
    ///
    /// `len` is rounded down to the heap alignment.
    ///
    /// # Safety
    /// The range must be valid, writable memory owned exclusively by this
    /// arena for as long as the arena or any of its allocations live.
    ///
    /// # Errors
    /// Returns error if `start` is misaligned or `len` is out of range
    pub unsafe fn new(start: NonNull<u8>, len: usize, pool: PoolId) -> core::result::Result<Self, ArenaError> {
        let start = start.as_ptr() as usize;
        if start % HEAP_ALIGN != 0 {
            return Err(ArenaError::Misaligned {
                addr: start,
                align: HEAP_ALIGN,
            });
        }

        let len = align_down(len, HEAP_ALIGN);
        if len < HEADER_SIZE + MIN_RESIDUAL {
            return Err(ArenaError::TooSmall { len });
        }
        if len >= NIL as usize {
            return Err(ArenaError::TooLarge { len });
        }

        let mut arena = Self {
            start,
            len: len as u32,
            pool,
            free: ChunkList::new(),
            used: ChunkList::new(),
        };
        arena.write_header(0, ChunkHeader::new(len as u32, pool, ChunkState::Free));
        arena.free = ChunkList {
            head: 0,
            tail: 0,
            total_size: len as u32,
            count: 1,
        };

        log::debug!("arena pool {}: {:#x}..{:#x} ({} bytes)", pool, start, start + len, len);
        Ok(arena)
    }

    /// Pool id stamped on every chunk of this arena
    pub fn pool(&self) -> PoolId {
        self.pool
    }

    /// First byte of the arena
    pub fn start(&self) -> usize {
        self.start
    }

    /// Length in bytes
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// Whether `addr` falls inside the arena's range
    pub fn contains(&self, addr: usize) -> bool {
        addr >= self.start && addr < self.start + self.len as usize
    }

    /// Allocate `size` bytes
    ///
    /// The request is rounded up to the heap alignment (zero becomes one
    /// word). The first free chunk with room for the request, a header and
    /// [`MIN_RESIDUAL`] is split: the allocation is carved from its tail.
    ///
    /// # Errors
    /// Returns `AllocError::OutOfMemory` if no free chunk qualifies
    pub fn allocate(&mut self, size: usize) -> Result<Allocation> {
        let need = match chunk_size_for(size) {
            Some(need) if need <= self.len as usize => need,
            _ => return Err(AllocError::OutOfMemory { requested: size }),
        };
        let threshold = need + MIN_RESIDUAL;

        let mut cursor = self.free.head;
        while cursor != NIL {
            let header = *self.header(cursor);
            if header.size as usize >= threshold {
                return Ok(self.carve(cursor, need as u32));
            }
            cursor = header.next;
        }

        log::debug!(
            "arena pool {}: no chunk for {} bytes ({} free in {} chunks)",
            self.pool,
            size,
            self.free.total_size,
            self.free.count
        );
        Err(AllocError::OutOfMemory { requested: size })
    }

    /// Return an allocation to this arena
    ///
    /// # Panics
    /// Panics if the allocation was carved by another pool
    pub fn release(&mut self, allocation: Allocation) {
        if allocation.pool != self.pool {
            duet_platform::misuse!(
                "allocation from pool {} released into pool {}",
                allocation.pool,
                self.pool
            );
        }
        self.release_addr(allocation.addr);
    }

    /// Return the chunk whose payload starts at `addr`
    ///
    /// # Panics
    /// Panics if `addr` is not the payload of a used chunk of this arena
    pub fn release_addr(&mut self, addr: usize) {
        let offset = self.offset_of(addr);
        let header = *self.header(offset);
        if !header.is(self.pool, ChunkState::Used) {
            duet_platform::misuse!(
                "pool {}: {:#x} is not a live allocation (magic {:#x}, pool {}, state {:#x})",
                self.pool,
                addr,
                header.magic,
                header.pool,
                header.state
            );
        }

        if !self.unlink_used(offset) {
            duet_platform::misuse!("pool {}: chunk at {:#x} missing from the used list", self.pool, addr);
        }

        self.header_mut(offset).state = ChunkState::Free as u8;
        self.insert_free(offset);
        let merges = self.coalesce();
        log::trace!("pool {}: released {:#x}, {} merges", self.pool, addr, merges);
    }

    /// Merge address-adjacent free chunks until a pass merges nothing
    ///
    /// Returns the number of merges performed.
    pub fn coalesce(&mut self) -> usize {
        let mut total = 0;
        loop {
            let merged = self.coalesce_pass();
            if merged == 0 {
                return total;
            }
            total += merged;
        }
    }

    /// Largest request that would currently succeed
    pub fn max_request(&self) -> usize {
        self.largest_free().saturating_sub(HEADER_SIZE + MIN_RESIDUAL)
    }

    /// Usage snapshot
    pub fn stats(&self) -> ArenaStats {
        ArenaStats {
            len: self.len as usize,
            free_bytes: self.free.total_size as usize,
            used_bytes: self.used.total_size as usize,
            free_chunks: self.free.count as usize,
            used_chunks: self.used.count as usize,
            largest_free: self.largest_free(),
        }
    }

    /// Check the arena's structural invariants
    ///
    /// - chunks tile the range exactly, every header intact
    /// - free list sorted by address with no two adjacent entries
    /// - list totals match their entries, and free + used == len
    ///
    /// # Errors
    /// Returns `ArenaError::Corrupted` describing the first violation
    pub fn verify(&self) -> core::result::Result<(), ArenaError> {
        let mut offset = 0u32;
        while offset < self.len {
            let header = self.header(offset);
            if header.magic != CHUNK_MAGIC || header.pool != self.pool.0 {
                return Err(self.corrupted(offset, "bad chunk header"));
            }
            if header.size < HEADER_SIZE as u32 || header.size as usize % HEAP_ALIGN != 0 {
                return Err(self.corrupted(offset, "bad chunk size"));
            }
            offset = match offset.checked_add(header.size) {
                Some(next) => next,
                None => return Err(self.corrupted(offset, "chunk size overflows")),
            };
        }
        if offset != self.len {
            return Err(self.corrupted(offset, "chunks overrun the arena"));
        }

        let (free_size, free_count) = self.walk(&self.free, ChunkState::Free, true)?;
        let (used_size, used_count) = self.walk(&self.used, ChunkState::Used, false)?;
        if free_size != self.free.total_size || free_count != self.free.count {
            return Err(self.corrupted(0, "free list totals out of sync"));
        }
        if used_size != self.used.total_size || used_count != self.used.count {
            return Err(self.corrupted(0, "used list totals out of sync"));
        }
        if free_size + used_size != self.len {
            return Err(self.corrupted(0, "bytes lost or double counted"));
        }
        Ok(())
    }

    fn walk(&self, list: &ChunkList, state: ChunkState, sorted: bool) -> core::result::Result<(u32, u32), ArenaError> {
        let mut size = 0u32;
        let mut count = 0u32;
        let mut prev: Option<(u32, u32)> = None;
        let mut cursor = list.head;
        while cursor != NIL {
            if cursor >= self.len || count > self.len / HEADER_SIZE as u32 {
                return Err(self.corrupted(cursor, "list link out of range"));
            }
            let header = self.header(cursor);
            if !header.is(self.pool, state) {
                return Err(self.corrupted(cursor, "chunk on the wrong list"));
            }
            if sorted {
                if let Some((prev_off, prev_size)) = prev {
                    if prev_off >= cursor {
                        return Err(self.corrupted(cursor, "free list out of address order"));
                    }
                    if prev_off + prev_size == cursor {
                        return Err(self.corrupted(cursor, "adjacent free chunks not merged"));
                    }
                }
            }
            if header.next == NIL && list.tail != cursor {
                return Err(self.corrupted(cursor, "list tail out of sync"));
            }
            prev = Some((cursor, header.size));
            size += header.size;
            count += 1;
            cursor = header.next;
        }
        Ok((size, count))
    }

    fn corrupted(&self, offset: u32, reason: &'static str) -> ArenaError {
        ArenaError::Corrupted {
            pool: self.pool,
            offset: offset as usize,
            reason,
        }
    }

    fn largest_free(&self) -> usize {
        let mut largest = 0;
        let mut cursor = self.free.head;
        while cursor != NIL {
            let header = self.header(cursor);
            largest = largest.max(header.size as usize);
            cursor = header.next;
        }
        largest
    }

    /// Split `need` bytes off the tail of the free chunk at `offset`
    fn carve(&mut self, offset: u32, need: u32) -> Allocation {
        let residual = self.header(offset).size - need;
        self.header_mut(offset).size = residual;
        self.free.total_size -= need;

        let chunk = offset + residual;
        self.write_header(chunk, ChunkHeader::new(need, self.pool, ChunkState::Used));
        self.push_used(chunk);

        Allocation {
            addr: self.start + chunk as usize + HEADER_SIZE,
            size: need as usize - HEADER_SIZE,
            pool: self.pool,
        }
    }

    fn push_used(&mut self, offset: u32) {
        let size = self.header(offset).size;
        self.header_mut(offset).next = NIL;
        if self.used.tail == NIL {
            self.used.head = offset;
        } else {
            let tail = self.used.tail;
            self.header_mut(tail).next = offset;
        }
        self.used.tail = offset;
        self.used.total_size += size;
        self.used.count += 1;
    }

    fn unlink_used(&mut self, offset: u32) -> bool {
        let mut prev = NIL;
        let mut cursor = self.used.head;
        while cursor != NIL && cursor != offset {
            prev = cursor;
            cursor = self.header(cursor).next;
        }
        if cursor == NIL {
            return false;
        }

        let header = *self.header(offset);
        if prev == NIL {
            self.used.head = header.next;
        } else {
            self.header_mut(prev).next = header.next;
        }
        if self.used.tail == offset {
            self.used.tail = prev;
        }
        self.used.total_size -= header.size;
        self.used.count -= 1;
        self.header_mut(offset).next = NIL;
        true
    }

    fn insert_free(&mut self, offset: u32) {
        let size = self.header(offset).size;
        let mut prev = NIL;
        let mut cursor = self.free.head;
        while cursor != NIL && cursor < offset {
            prev = cursor;
            cursor = self.header(cursor).next;
        }

        self.header_mut(offset).next = cursor;
        if prev == NIL {
            self.free.head = offset;
        } else {
            self.header_mut(prev).next = offset;
        }
        if cursor == NIL {
            self.free.tail = offset;
        }
        self.free.total_size += size;
        self.free.count += 1;
    }

    /// One walk over the free list, merging every address-adjacent pair
    fn coalesce_pass(&mut self) -> usize {
        let mut merges = 0;
        let mut cursor = self.free.head;
        while cursor != NIL {
            let header = *self.header(cursor);
            let next = header.next;
            if next != NIL && cursor + header.size == next {
                let absorbed = *self.header(next);
                let merged = self.header_mut(cursor);
                merged.size += absorbed.size;
                merged.next = absorbed.next;
                self.header_mut(next).magic = 0;
                if self.free.tail == next {
                    self.free.tail = cursor;
                }
                self.free.count -= 1;
                merges += 1;
                continue;
            }
            cursor = next;
        }
        merges
    }

    /// Chunk offset for a payload address
    fn offset_of(&self, addr: usize) -> u32 {
        let lowest = self.start + HEADER_SIZE;
        if addr < lowest || !self.contains(addr) || (addr - lowest) % HEAP_ALIGN != 0 {
            duet_platform::misuse!(
                "pool {}: {:#x} is not a payload address inside {:#x}..{:#x}",
                self.pool,
                addr,
                self.start,
                self.start + self.len as usize
            );
        }
        (addr - HEADER_SIZE - self.start) as u32
    }

    fn header(&self, offset: u32) -> &ChunkHeader {
        debug_assert!((offset as usize) + HEADER_SIZE <= self.len as usize);
        // SAFETY: offsets come from this arena's lists or `offset_of`, so the
        // header lies inside the range `new` was given, aligned to HEAP_ALIGN.
        unsafe { &*((self.start + offset as usize) as *const ChunkHeader) }
    }

    fn header_mut(&mut self, offset: u32) -> &mut ChunkHeader {
        debug_assert!((offset as usize) + HEADER_SIZE <= self.len as usize);
        // SAFETY: see `header`; `&mut self` gives exclusive access
        unsafe { &mut *((self.start + offset as usize) as *mut ChunkHeader) }
    }

    fn write_header(&mut self, offset: u32, header: ChunkHeader) {
        debug_assert!((offset as usize) + HEADER_SIZE <= self.len as usize);
        // SAFETY: see `header`
        unsafe { core::ptr::write((self.start + offset as usize) as *mut ChunkHeader, header) }
    }
}

impl fmt::Debug for Arena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arena")
            .field("pool", &self.pool)
            .field("start", &format_args!("{:#x}", self.start))
            .field("len", &self.len)
            .field("free", &self.free)
            .field("used", &self.used)
            .finish()
    }
}

/// Full chunk size (header included) for a request, or `None` on overflow
pub(crate) fn chunk_size_for(size: usize) -> Option<usize> {
    size.max(1)
        .checked_add(HEAP_ALIGN - 1)
        .map(|rounded| rounded & !(HEAP_ALIGN - 1))
        .and_then(|payload| payload.checked_add(HEADER_SIZE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::boxed::Box;
    use std::vec;
    use std::vec::Vec;

    fn backing(len: usize) -> NonNull<u8> {
        let words: &'static mut [u64] = Box::leak(vec![0u64; len / 8].into_boxed_slice());
        NonNull::new(words.as_mut_ptr() as *mut u8).unwrap()
    }

    fn arena(len: usize) -> Arena {
        unsafe { Arena::new(backing(len), len, PoolId::REGULAR).unwrap() }
    }

    #[test]
    fn test_new_arena_is_one_free_chunk() {
        let arena = arena(1024);
        let stats = arena.stats();
        assert_eq!(stats.free_bytes, 1024);
        assert_eq!(stats.free_chunks, 1);
        assert_eq!(stats.used_chunks, 0);
        assert_eq!(arena.max_request(), 1024 - HEADER_SIZE - MIN_RESIDUAL);
        arena.verify().unwrap();
    }

    #[test]
    fn test_new_rejects_bad_ranges() {
        let base = backing(256);
        let misaligned = NonNull::new(unsafe { base.as_ptr().add(1) }).unwrap();
        assert!(matches!(
            unsafe { Arena::new(misaligned, 128, PoolId::TINY) },
            Err(ArenaError::Misaligned { .. })
        ));
        assert!(matches!(
            unsafe { Arena::new(base, HEADER_SIZE, PoolId::TINY) },
            Err(ArenaError::TooSmall { .. })
        ));
    }

    #[test]
    fn test_allocate_carves_from_tail() {
        let mut arena = arena(1024);
        let a = arena.allocate(100).unwrap();
        assert_eq!(a.size(), 104);
        assert_eq!(a.pool(), PoolId::REGULAR);
        assert_eq!(a.addr(), arena.start() + 1024 - 104);

        let stats = arena.stats();
        assert_eq!(stats.used_bytes, 104 + HEADER_SIZE);
        assert_eq!(stats.free_bytes + stats.used_bytes, 1024);
        arena.verify().unwrap();
        arena.release(a);
    }

    #[test]
    fn test_zero_byte_request_rounds_to_word() {
        let mut arena = arena(256);
        let a = arena.allocate(0).unwrap();
        assert_eq!(a.size(), HEAP_ALIGN);
        arena.release(a);
    }

    #[test]
    fn test_allocation_fails_without_residual() {
        let mut arena = arena(256);
        // Exactly the arena minus a header leaves no residual, so it must fail
        assert_eq!(
            arena.allocate(256 - HEADER_SIZE),
            Err(AllocError::OutOfMemory { requested: 256 - HEADER_SIZE })
        );
        let max = arena.max_request();
        let a = arena.allocate(max).unwrap();
        assert!(arena.allocate(1).is_err());
        arena.release(a);
        assert!(arena.allocate(max).is_ok());
    }

    #[test]
    fn test_huge_request_fails() {
        let mut arena = arena(256);
        assert!(arena.allocate(usize::MAX).is_err());
        assert!(arena.allocate(1 << 40).is_err());
    }

    #[test]
    fn test_release_coalesces_neighbours() {
        let mut arena = arena(1024);
        let a = arena.allocate(64).unwrap();
        let b = arena.allocate(64).unwrap();
        let c = arena.allocate(64).unwrap();
        assert_eq!(arena.stats().used_chunks, 3);

        // Free the middle one first: no neighbour is free yet
        arena.release(b);
        assert_eq!(arena.stats().free_chunks, 2);

        // `a` sits above `b`, merging into it
        arena.release(a);
        assert_eq!(arena.stats().free_chunks, 2);

        // `c` bridges the head residual and the a+b chunk
        arena.release(c);
        let stats = arena.stats();
        assert_eq!(stats.free_chunks, 1);
        assert_eq!(stats.largest_free, 1024);
        arena.verify().unwrap();
    }

    #[test]
    fn test_release_out_of_order_fully_merges() {
        let mut arena = arena(2048);
        let allocations: Vec<Allocation> = (0..8).map(|_| arena.allocate(48).unwrap()).collect();
        // Release every other chunk, then the rest, in reverse insertion order
        let (even, odd): (Vec<_>, Vec<_>) = allocations
            .into_iter()
            .enumerate()
            .partition(|(i, _)| i % 2 == 0);
        for (_, a) in even {
            arena.release(a);
            arena.verify().unwrap();
        }
        for (_, a) in odd.into_iter().rev() {
            arena.release(a);
            arena.verify().unwrap();
        }
        assert_eq!(arena.stats().free_chunks, 1);
        assert_eq!(arena.stats().free_bytes, 2048);
    }

    #[test]
    #[should_panic(expected = "released into pool")]
    fn test_release_into_wrong_pool_panics() {
        let mut regular = arena(256);
        let mut tiny = unsafe { Arena::new(backing(256), 256, PoolId::TINY).unwrap() };
        let a = tiny.allocate(8).unwrap();
        regular.release(a);
    }

    #[test]
    #[should_panic(expected = "not a live allocation")]
    fn test_double_release_panics() {
        let mut arena = arena(512);
        let a = arena.allocate(32).unwrap();
        let addr = a.addr();
        let _keep = arena.allocate(32).unwrap();
        arena.release(a);
        arena.release_addr(addr);
    }

    #[test]
    #[should_panic(expected = "not a payload address")]
    fn test_release_foreign_address_panics() {
        let mut arena = arena(256);
        arena.release_addr(arena.start() + 4096);
    }

    #[test]
    fn test_verify_detects_trampled_header() {
        let mut arena = arena(512);
        let a = arena.allocate(32).unwrap();
        unsafe { *(a.as_ptr().sub(4) as *mut u32) = 0xDEAD_BEEF };
        assert!(matches!(arena.verify(), Err(ArenaError::Corrupted { .. })));
        core::mem::forget(a);
    }

    #[test]
    fn test_allocation_bytes_are_writable() {
        let mut arena = arena(512);
        let mut a = arena.allocate(16).unwrap();
        a.as_mut_slice().copy_from_slice(&[0xAB; 16]);
        arena.verify().unwrap();
        assert!(a.covers(a.addr(), 16));
        assert!(!a.covers(a.addr(), 17));
        arena.release(a);
        arena.verify().unwrap();
    }
}
