//! Mutex + condition monitor.
//!
//! A [`Monitor`] owns a piece of state behind one `parking_lot::Mutex` and one
//! or more `parking_lot::Condvar`s, each identified by a [`ConditionId`].
//! Separate conditions let a primitive signal exactly the waiters whose
//! predicate may now hold (producers vs. consumers) instead of waking
//! everyone.
//!
//! Waiting always loops over an explicit predicate. A wait returns only when
//! the predicate holds, the deadline passes, or the cancellation token fires,
//! and the predicate is checked first on every wakeup.

use std::fmt;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::cancel::Wake;
use crate::error::{SyncError, SyncResult};
use crate::wait::Wait;

/// Index of one condition within a [`Monitor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConditionId(usize);

impl ConditionId {
    /// Condition number `index`; must be below the monitor's condition count.
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// The raw index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

struct MonitorInner<S> {
    state: Mutex<S>,
    conditions: Box<[Condvar]>,
}

impl<S: Send> Wake for MonitorInner<S> {
    fn wake(&self) {
        // Holding the lock orders this notify after any waiter's flag check.
        let _held = self.state.lock();
        for condition in self.conditions.iter() {
            condition.notify_all();
        }
    }
}

/// Mutex-protected state plus its condition variables.
///
/// The guard returned by [`Monitor::lock`] is the critical section; dropping
/// it releases the lock. Waiting releases the lock while suspended and
/// reacquires it before returning.
///
/// # Panics
///
/// Signalling or waiting on a [`ConditionId`] at or above
/// [`Monitor::condition_count`] panics.
pub struct Monitor<S> {
    inner: Arc<MonitorInner<S>>,
}

impl<S> Monitor<S> {
    /// Monitor with a single condition (`ConditionId::new(0)`).
    #[must_use]
    pub fn new(state: S) -> Self {
        Self::with_conditions(state, 1)
    }

    /// Monitor with `count` independent conditions.
    ///
    /// # Panics
    ///
    /// Panics if `count == 0`.
    #[must_use]
    pub fn with_conditions(state: S, count: usize) -> Self {
        assert!(count > 0, "monitor requires at least one condition");
        let conditions: Vec<Condvar> = (0..count).map(|_| Condvar::new()).collect();
        Self {
            inner: Arc::new(MonitorInner {
                state: Mutex::new(state),
                conditions: conditions.into_boxed_slice(),
            }),
        }
    }

    /// Number of conditions.
    #[must_use]
    pub fn condition_count(&self) -> usize {
        self.inner.conditions.len()
    }

    /// Enter the critical section.
    pub fn lock(&self) -> MutexGuard<'_, S> {
        self.inner.state.lock()
    }

    /// Wake one waiter of `condition`. Returns true if a thread was woken.
    pub fn signal(&self, condition: ConditionId) -> bool {
        self.condition(condition).notify_one()
    }

    /// Wake every waiter of `condition`. Returns the number woken.
    pub fn signal_all(&self, condition: ConditionId) -> usize {
        self.condition(condition).notify_all()
    }

    /// Wake every waiter of every condition.
    pub fn broadcast(&self) {
        for condition in self.inner.conditions.iter() {
            condition.notify_all();
        }
    }

    /// Block until `ready` holds. Cannot time out or be cancelled.
    pub fn wait_for<F>(&self, guard: &mut MutexGuard<'_, S>, condition: ConditionId, mut ready: F)
    where
        F: FnMut(&S) -> bool,
    {
        let condvar = self.condition(condition);
        while !ready(&**guard) {
            condvar.wait(guard);
        }
    }

    fn condition(&self, id: ConditionId) -> &Condvar {
        let count = self.inner.conditions.len();
        assert!(
            id.0 < count,
            "condition {} out of range for a monitor with {count} conditions",
            id.0
        );
        &self.inner.conditions[id.0]
    }
}

impl<S: Send + 'static> Monitor<S> {
    /// Block until `ready` holds, the deadline of `wait` passes, or its token
    /// fires.
    ///
    /// On `Ok` the predicate holds and the lock is held. On `Err` the
    /// predicate did not hold at the last check; the state is whatever it was,
    /// this call changed nothing.
    pub fn wait_until<F>(
        &self,
        guard: &mut MutexGuard<'_, S>,
        condition: ConditionId,
        wait: &Wait<'_>,
        mut ready: F,
    ) -> SyncResult<()>
    where
        F: FnMut(&S) -> bool,
    {
        if ready(&**guard) {
            return Ok(());
        }
        let _registration = wait
            .token()
            .map(|token| token.register(Arc::clone(&self.inner) as Arc<dyn Wake>));
        let condvar = self.condition(condition);
        loop {
            if wait.is_cancelled() {
                return Err(SyncError::Interrupted);
            }
            match wait.deadline() {
                Some(deadline) => {
                    if condvar.wait_until(guard, deadline).timed_out() {
                        return if ready(&**guard) {
                            Ok(())
                        } else {
                            Err(SyncError::Timeout)
                        };
                    }
                }
                None => condvar.wait(guard),
            }
            if ready(&**guard) {
                return Ok(());
            }
        }
    }
}

impl<S> fmt::Debug for Monitor<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Monitor")
            .field("conditions", &self.inner.conditions.len())
            .finish_non_exhaustive()
    }
}
