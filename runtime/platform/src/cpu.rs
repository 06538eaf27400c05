//! Core identity
//!
//! The hardware semaphore block tags every lock with the core that took it,
//! so every lock operation carries a [`CoreId`].

/// One of the two cores sharing the memory window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CoreId {
    /// Boots first, initializes the shared region
    Primary = 1,
    /// Attaches to the region the primary core built
    Auxiliary = 2,
}

impl CoreId {
    /// Tag value written to the hardware semaphore block
    pub const fn tag(self) -> u8 {
        self as u8
    }

    /// Decode a hardware tag (0 means "no owner")
    pub const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(CoreId::Primary),
            2 => Some(CoreId::Auxiliary),
            _ => None,
        }
    }

    /// The other core
    pub const fn peer(self) -> Self {
        match self {
            CoreId::Primary => CoreId::Auxiliary,
            CoreId::Auxiliary => CoreId::Primary,
        }
    }

    /// Zero-based index, handy for per-core arrays
    pub const fn index(self) -> usize {
        self as usize - 1
    }
}
