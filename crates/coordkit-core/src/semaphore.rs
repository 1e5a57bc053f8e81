//! Counting semaphore.

use std::time::Duration;

use crate::error::SyncResult;
use crate::monitor::{ConditionId, Monitor};
use crate::wait::Wait;

const PERMIT_AVAILABLE: ConditionId = ConditionId::new(0);

/// Counting permits; `acquire` consumes one, `release` restores one.
///
/// Wake order among blocked acquirers is whatever the underlying condition
/// variable chooses; no fairness is promised.
pub struct Semaphore {
    monitor: Monitor<usize>,
}

impl Semaphore {
    /// Semaphore holding `permits` permits.
    #[must_use]
    pub fn new(permits: usize) -> Self {
        Self {
            monitor: Monitor::new(permits),
        }
    }

    /// Permits currently available.
    #[must_use]
    pub fn available_permits(&self) -> usize {
        *self.monitor.lock()
    }

    /// Take a permit if one is available.
    pub fn try_acquire(&self) -> bool {
        let mut permits = self.monitor.lock();
        if *permits == 0 {
            return false;
        }
        *permits -= 1;
        true
    }

    /// Block until a permit is available and take it.
    pub fn acquire(&self) {
        let mut permits = self.monitor.lock();
        self.monitor
            .wait_for(&mut permits, PERMIT_AVAILABLE, |p| *p > 0);
        *permits -= 1;
    }

    /// [`Semaphore::acquire`] bounded by `timeout`.
    pub fn acquire_timeout(&self, timeout: Duration) -> SyncResult<()> {
        self.acquire_with(&Wait::timeout(timeout))
    }

    /// Take a permit once one is available; on timeout or cancellation no
    /// permit is consumed.
    pub fn acquire_with(&self, wait: &Wait<'_>) -> SyncResult<()> {
        let mut permits = self.monitor.lock();
        self.monitor
            .wait_until(&mut permits, PERMIT_AVAILABLE, wait, |p| *p > 0)?;
        *permits -= 1;
        Ok(())
    }

    /// Return one permit and wake one blocked acquirer.
    pub fn release(&self) {
        self.release_many(1);
    }

    /// Return `count` permits.
    pub fn release_many(&self, count: usize) {
        if count == 0 {
            return;
        }
        let mut permits = self.monitor.lock();
        *permits = permits.saturating_add(count);
        if count == 1 {
            self.monitor.signal(PERMIT_AVAILABLE);
        } else {
            self.monitor.signal_all(PERMIT_AVAILABLE);
        }
    }

    /// Take every available permit, returning how many were taken.
    pub fn drain_permits(&self) -> usize {
        std::mem::take(&mut *self.monitor.lock())
    }
}

impl std::fmt::Debug for Semaphore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Semaphore")
            .field("available_permits", &self.available_permits())
            .finish()
    }
}
