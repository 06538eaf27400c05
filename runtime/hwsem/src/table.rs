//! Semaphore Table
//!
//! Maps human-readable names to hardware lock ids. Fixed capacity, one slot
//! per hardware lock, first free index wins. Acquiring a name that is
//! already registered returns the existing id, so independent owners of the
//! same logical resource converge on one lock.
//!
//! The table is plain data (`#[repr(C)]`, no pointers) so it can live in
//! the shared window.

use duet_platform::layout::{SEMAPHORE_CAPACITY, SEMAPHORE_NAME_MAX};
use static_assertions::const_assert;

use crate::{Result, SemaphoreError};

/// Name under which slot 0 guards the table itself
pub const REGISTRY_NAME: &str = "sem_registry";

const_assert!(REGISTRY_NAME.len() <= SEMAPHORE_NAME_MAX);

const FREE: i32 = -1;

/// A registered semaphore id (index into the table and hardware lock number)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct SemId(u8);

impl SemId {
    /// Slot reserved for the registry's own lock
    pub const REGISTRY: SemId = SemId(0);

    /// Checked construction from the raw id form (`-1` and out of range yield `None`)
    pub fn from_raw(raw: i32) -> Option<Self> {
        if raw >= 0 && (raw as usize) < SEMAPHORE_CAPACITY {
            Some(SemId(raw as u8))
        } else {
            None
        }
    }

    /// Raw id form
    pub const fn as_raw(self) -> i32 {
        self.0 as i32
    }

    /// Hardware lock number
    pub const fn lock(self) -> u8 {
        self.0
    }

    /// Table index
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// One registry slot
#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct SemaphoreSlot {
    /// Slot index while registered, -1 when free
    id: i32,
    name: [u8; SEMAPHORE_NAME_MAX + 1],
    name_len: u8,
}

impl SemaphoreSlot {
    const fn new() -> Self {
        Self {
            id: FREE,
            name: [0; SEMAPHORE_NAME_MAX + 1],
            name_len: 0,
        }
    }

    fn is_free(&self) -> bool {
        self.id == FREE
    }

    fn matches(&self, name: &str) -> bool {
        !self.is_free() && &self.name[..self.name_len as usize] == name.as_bytes()
    }

    fn name_str(&self) -> Option<&str> {
        if self.is_free() {
            None
        } else {
            core::str::from_utf8(&self.name[..self.name_len as usize]).ok()
        }
    }
}

/// Fixed-capacity name → id table
#[repr(C)]
#[derive(Debug, Clone)]
pub struct SemaphoreTable {
    slots: [SemaphoreSlot; SEMAPHORE_CAPACITY],
}

impl SemaphoreTable {
    /// An empty table
    pub const fn new() -> Self {
        Self {
            slots: [SemaphoreSlot::new(); SEMAPHORE_CAPACITY],
        }
    }

    /// A table whose slot 0 is held by [`REGISTRY_NAME`]
    pub fn with_registry() -> Self {
        let mut table = Self::new();
        let id = table
            .acquire_id(REGISTRY_NAME)
            .unwrap_or_else(|_| unreachable!("empty table has room for the registry slot"));
        debug_assert_eq!(id, SemId::REGISTRY);
        table
    }

    /// Look up `name`, registering it in the first free slot if absent
    ///
    /// # Errors
    /// - `SemaphoreError::InvalidName` for empty names or names over 15 bytes
    /// - `SemaphoreError::NoFreeSlot` when all slots are taken
    pub fn acquire_id(&mut self, name: &str) -> Result<SemId> {
        if name.is_empty() || name.len() > SEMAPHORE_NAME_MAX {
            return Err(SemaphoreError::InvalidName {
                len: name.len(),
                max: SEMAPHORE_NAME_MAX,
            });
        }

        if let Some(id) = self.lookup(name) {
            return Ok(id);
        }

        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.is_free() {
                slot.name = [0; SEMAPHORE_NAME_MAX + 1];
                slot.name[..name.len()].copy_from_slice(name.as_bytes());
                slot.name_len = name.len() as u8;
                slot.id = index as i32;
                log::debug!("semaphore '{}' registered as id {}", name, index);
                return Ok(SemId(index as u8));
            }
        }

        log::warn!("semaphore '{}' rejected: all {} slots in use", name, SEMAPHORE_CAPACITY);
        Err(SemaphoreError::NoFreeSlot {
            capacity: SEMAPHORE_CAPACITY,
        })
    }

    /// Free the slot of `id`
    ///
    /// # Panics
    /// Panics if the slot is not registered
    pub fn release_id(&mut self, id: SemId) {
        let slot = &mut self.slots[id.index()];
        if slot.is_free() {
            duet_platform::misuse!("semaphore id {} released but not registered", id.as_raw());
        }
        log::debug!("semaphore id {} ('{}') released", id.as_raw(), slot.name_str().unwrap_or("?"));
        *slot = SemaphoreSlot::new();
    }

    /// Id registered under `name`, if any
    pub fn lookup(&self, name: &str) -> Option<SemId> {
        self.slots
            .iter()
            .position(|slot| slot.matches(name))
            .map(|index| SemId(index as u8))
    }

    /// Name registered for `id`, if any
    pub fn name(&self, id: SemId) -> Option<&str> {
        self.slots[id.index()].name_str()
    }

    /// Number of registered ids
    pub fn in_use(&self) -> usize {
        self.slots.iter().filter(|slot| !slot.is_free()).count()
    }

    /// Registered (id, name) pairs in id order
    pub fn iter(&self) -> impl Iterator<Item = (SemId, &str)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.name_str().map(|name| (SemId(index as u8), name)))
    }
}

impl Default for SemaphoreTable {
    fn default() -> Self {
        Self::new()
    }
}
