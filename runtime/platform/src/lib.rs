//! # Duet Platform Abstraction Layer
//!
//! This crate provides a unified API for the hardware the rest of the Duet
//! runtime leans on:
//! - **Core identity**: which of the two cores is executing ([`CoreId`])
//! - **Hardware semaphores**: the core-aware atomic take/release block ([`HwSemaphore`])
//! - **Doorbells**: inter-core interrupts used to wake the peer ([`Doorbell`])
//! - **Layout**: the constants both cores must agree on ([`layout`])
//!
//! ## Build Modes
//!
//! ```bash
//! # Mock (default - host testing)
//! cargo build
//!
//! # Runtime (real hardware semaphore block)
//! cargo build --no-default-features --features runtime
//! ```

#![no_std]

#[cfg(test)]
extern crate std;

pub mod layout;

mod cpu;
mod doorbell;
mod semaphore;

#[cfg(feature = "mock")]
pub mod mock;

#[cfg(feature = "runtime")]
pub mod mmio;

/// Unified backend adapter - resolves to the active hardware backend
pub mod adapter;

#[doc(hidden)]
pub use log as __log;

/// Report a programming error and abort the operation
///
/// Misuse (double release, foreign pointers, unlocking another core's lock)
/// is never reachable from valid input, so it is logged and then panics
/// rather than corrupting shared structures.
#[macro_export]
macro_rules! misuse {
    ($($arg:tt)*) => {{
        $crate::__log::error!($($arg)*);
        panic!($($arg)*);
    }};
}

pub use cpu::CoreId;
pub use doorbell::{Doorbell, Polling};
pub use semaphore::HwSemaphore;

/// Platform configuration and detection
pub mod config {
    /// Detect which backend is active at compile time
    pub fn platform_mode() -> &'static str {
        #[cfg(feature = "runtime")]
        return "runtime";

        #[cfg(all(feature = "mock", not(feature = "runtime")))]
        return "mock";

        #[cfg(not(any(feature = "mock", feature = "runtime")))]
        return "none";
    }

    /// Check if we're in mock mode (testing)
    pub const fn is_mock() -> bool {
        cfg!(all(feature = "mock", not(feature = "runtime")))
    }

    /// Check if we're in runtime mode (real hardware)
    pub const fn is_runtime() -> bool {
        cfg!(feature = "runtime")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_detection() {
        let mode = config::platform_mode();
        assert!(mode == "mock" || mode == "runtime" || mode == "none");
    }

    #[test]
    #[cfg(all(feature = "mock", not(feature = "runtime")))]
    fn test_mock_mode() {
        assert!(config::is_mock());
        assert!(!config::is_runtime());
        assert_eq!(config::platform_mode(), "mock");
    }

    #[test]
    #[cfg(all(feature = "mock", not(feature = "runtime")))]
    fn test_adapter_resolves_to_mock() {
        let hw = adapter::PlatformSemaphore::new();
        let bell = adapter::PlatformDoorbell::new();
        assert!(hw.try_take(0, CoreId::Primary));
        assert_eq!(hw.owner(0), Some(CoreId::Primary));
        hw.release(0, CoreId::Primary);
        bell.ring(CoreId::Auxiliary);
        assert_eq!(bell.pending(CoreId::Auxiliary), 1);
    }

    #[test]
    fn test_layout_contract() {
        assert_eq!(layout::SMALL_OBJECT_THRESHOLD, 128);
        assert_eq!(layout::TINY_ARENA_SIZE, 4096);
        assert_eq!(layout::SEMAPHORE_CAPACITY, 32);
        assert_eq!(layout::SEMAPHORE_NAME_MAX, 15);
    }
}
