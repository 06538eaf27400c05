//! Inter-core doorbell
//!
//! After linking a task, the submitting core rings the peer so it does not
//! have to poll. Platforms without a doorbell use [`Polling`].

use crate::CoreId;

/// Signal the other core that work is available
pub trait Doorbell: Sync {
    /// Raise the doorbell interrupt on `target`
    fn ring(&self, target: CoreId);
}

/// No doorbell: the consumer discovers work by polling the queue
#[derive(Debug, Clone, Copy, Default)]
pub struct Polling;

impl Doorbell for Polling {
    #[inline]
    fn ring(&self, _target: CoreId) {}
}
