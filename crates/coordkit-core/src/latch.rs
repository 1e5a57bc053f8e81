//! One-shot countdown gate.

use std::time::Duration;

use crate::error::SyncResult;
use crate::monitor::{ConditionId, Monitor};
use crate::wait::Wait;

const OPEN: ConditionId = ConditionId::new(0);

/// Gate that opens once `count_down` has been called `count` times.
///
/// The counter only decreases. When it reaches zero every waiter is released
/// in the same critical section that performed the last decrement, and every
/// later `wait` returns immediately. A latch never resets.
pub struct Latch {
    monitor: Monitor<usize>,
}

impl Latch {
    /// Latch that opens after `count` countdowns; `Latch::new(0)` starts open.
    #[must_use]
    pub fn new(count: usize) -> Self {
        Self {
            monitor: Monitor::new(count),
        }
    }

    /// Countdowns still required.
    #[must_use]
    pub fn count(&self) -> usize {
        *self.monitor.lock()
    }

    /// Returns true once the latch has opened.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.count() == 0
    }

    /// Decrement the counter; a no-op once it is zero.
    pub fn count_down(&self) {
        let mut remaining = self.monitor.lock();
        if *remaining == 0 {
            return;
        }
        *remaining -= 1;
        if *remaining == 0 {
            self.monitor.signal_all(OPEN);
        }
    }

    /// Block until the latch opens.
    pub fn wait(&self) {
        let mut remaining = self.monitor.lock();
        self.monitor.wait_for(&mut remaining, OPEN, |r| *r == 0);
    }

    /// [`Latch::wait`] bounded by `timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> SyncResult<()> {
        self.wait_with(&Wait::timeout(timeout))
    }

    /// Wait for the latch to open, or fail on timeout or cancellation.
    pub fn wait_with(&self, wait: &Wait<'_>) -> SyncResult<()> {
        let mut remaining = self.monitor.lock();
        self.monitor
            .wait_until(&mut remaining, OPEN, wait, |r| *r == 0)
    }
}

impl std::fmt::Debug for Latch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Latch").field("count", &self.count()).finish()
    }
}
