//! Cancellation tokens.
//!
//! A [`CancelToken`] is the explicit replacement for thread interruption: a
//! blocking call that observes the token (via [`crate::Wait::cancel_on`])
//! returns [`crate::SyncError::Interrupted`] once the token fires.
//!
//! Waking is push-based. A waiter registers its monitor with the token before
//! suspending; `cancel` sets the flag first and then, for every registered
//! monitor, takes that monitor's lock and notifies all of its conditions. A
//! waiter checks the flag while holding its monitor lock, so the flag store
//! is either seen before the waiter suspends or the notification reaches it
//! after it has suspended.
//!
//! Lock order: a waiter may take the waiter-list lock while holding its
//! monitor lock; `cancel` releases the waiter-list lock before taking any
//! monitor lock.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

/// Something a cancellation can wake: a monitor with suspended waiters.
pub(crate) trait Wake: Send + Sync {
    fn wake(&self);
}

#[derive(Default)]
struct WaiterList {
    next_id: u64,
    entries: Vec<(u64, Arc<dyn Wake>)>,
}

#[derive(Default)]
struct TokenInner {
    cancelled: AtomicBool,
    waiters: Mutex<WaiterList>,
}

/// Shared, cloneable cancellation flag.
///
/// Clones observe the same flag. Cancellation is sticky: once fired, every
/// later wait that observes the token fails immediately unless its predicate
/// already holds.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<TokenInner>,
}

impl CancelToken {
    /// Create a token that has not fired.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the token and wake every wait currently observing it.
    ///
    /// Idempotent. Must not be called while the caller runs inside a
    /// primitive's critical section (for example from a barrier completion
    /// action) whose waiters observe this token; the wake would need the lock
    /// the caller already holds.
    pub fn cancel(&self) {
        if self.inner.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        let targets: Vec<Arc<dyn Wake>> = self
            .inner
            .waiters
            .lock()
            .entries
            .iter()
            .map(|(_, waker)| Arc::clone(waker))
            .collect();
        for target in targets {
            target.wake();
        }
    }

    /// Returns true once [`CancelToken::cancel`] has been called on any clone.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Number of waits currently registered with this token.
    #[must_use]
    pub fn registered_waiters(&self) -> usize {
        self.inner.waiters.lock().entries.len()
    }

    pub(crate) fn register(&self, waker: Arc<dyn Wake>) -> Registration<'_> {
        let mut waiters = self.inner.waiters.lock();
        let id = waiters.next_id;
        waiters.next_id = waiters.next_id.wrapping_add(1);
        waiters.entries.push((id, waker));
        Registration { token: self, id }
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Scoped registration of one suspended wait; removed on drop.
pub(crate) struct Registration<'a> {
    token: &'a CancelToken,
    id: u64,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        let mut waiters = self.token.inner.waiters.lock();
        if let Some(pos) = waiters.entries.iter().position(|(id, _)| *id == self.id) {
            waiters.entries.swap_remove(pos);
        }
    }
}
