//! System idle-sleep inhibition seam.

/// Keeps the system awake while playback is active.
///
/// The OS-specific mechanism belongs to the host; the player only
/// guarantees `inhibit` on start and `release` on stop.
pub trait IdleInhibitor: Send + Sync {
    /// Playback became active.
    fn inhibit(&self);

    /// Playback stopped.
    fn release(&self);
}

/// Inhibitor that does nothing.
#[derive(Debug, Default)]
pub struct NoopIdleInhibitor;

impl IdleInhibitor for NoopIdleInhibitor {
    fn inhibit(&self) {}
    fn release(&self) {}
}
