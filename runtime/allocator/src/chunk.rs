//! Chunk headers and intrusive chunk lists
//!
//! Every chunk starts with a 16-byte [`ChunkHeader`] written in-band. Links
//! are offsets from the owning arena's start, so an arena is position
//! independent and can live in a window mapped by both cores.

use static_assertions::const_assert_eq;

use crate::PoolId;

/// Size of the in-band chunk header
pub const HEADER_SIZE: usize = core::mem::size_of::<ChunkHeader>();

/// Bytes a free chunk must keep after a carve (first fit with minimum residual)
pub const MIN_RESIDUAL: usize = HEADER_SIZE + duet_platform::layout::HEAP_ALIGN;

/// End-of-list marker
pub(crate) const NIL: u32 = u32::MAX;

/// Sentinel stamped into every live header
pub(crate) const CHUNK_MAGIC: u32 = 0xC4C0_A11C;

const_assert_eq!(HEADER_SIZE, 16);

/// Which list a chunk is on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum ChunkState {
    Free = 0xF5,
    Used = 0xA5,
}

/// In-band chunk metadata
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub(crate) struct ChunkHeader {
    /// Chunk size in bytes, header included
    pub size: u32,
    /// Offset of the next chunk on the same list
    pub next: u32,
    /// Pool that carved this chunk
    pub pool: u8,
    /// Raw [`ChunkState`] byte
    pub state: u8,
    _reserved: [u8; 2],
    /// [`CHUNK_MAGIC`] while the header is live
    pub magic: u32,
}

impl ChunkHeader {
    pub fn new(size: u32, pool: PoolId, state: ChunkState) -> Self {
        Self {
            size,
            next: NIL,
            pool: pool.0,
            state: state as u8,
            _reserved: [0; 2],
            magic: CHUNK_MAGIC,
        }
    }

    /// Header is intact and in `state` for `pool`
    pub fn is(&self, pool: PoolId, state: ChunkState) -> bool {
        self.magic == CHUNK_MAGIC && self.pool == pool.0 && self.state == state as u8
    }
}

/// Bookkeeping for one list (free or used)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ChunkList {
    pub head: u32,
    pub tail: u32,
    pub total_size: u32,
    pub count: u32,
}

impl ChunkList {
    pub const fn new() -> Self {
        Self {
            head: NIL,
            tail: NIL,
            total_size: 0,
            count: 0,
        }
    }
}
