//! Platform Backend Adapter
//!
//! Re-exports the active backend under stable names so upper crates can
//! write `duet_platform::adapter::PlatformSemaphore` regardless of mode.
//! When both features are enabled (feature unification in a test build),
//! the runtime backend wins.

// ========== Mock Mode ==========
#[cfg(all(feature = "mock", not(feature = "runtime")))]
pub use crate::mock::{MockDoorbell as PlatformDoorbell, MockHwSemaphore as PlatformSemaphore};

// ========== Runtime Mode ==========
#[cfg(feature = "runtime")]
pub use crate::mmio::{MmioDoorbell as PlatformDoorbell, MmioHwSemaphore as PlatformSemaphore};
