//! Reusable N-party rendezvous with a per-generation completion action.
//!
//! Each generation starts with `remaining = parties`. Every arrival takes the
//! next index counting down from `parties - 1`; the arrival that takes index
//! `0` runs the completion action inside the critical section, starts the next
//! generation, and releases the others with one broadcast.
//!
//! A generation breaks when a waiting party times out or is cancelled, when
//! the action fails, or on [`CyclicBarrier::reset`]. Every party of a broken
//! generation, current or later-arriving, fails with
//! [`SyncError::BrokenBarrier`] until `reset` starts a fresh generation.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::error::{SyncError, SyncResult};
use crate::monitor::{ConditionId, Monitor};
use crate::wait::Wait;

const TRIPPED: ConditionId = ConditionId::new(0);

type Action = Box<dyn FnMut() -> Result<(), String> + Send>;

/// Identity of one generation. Waiters keep a handle to the generation they
/// joined so they can tell a trip from a break after the barrier moved on.
#[derive(Debug)]
struct Generation {
    id: u64,
    // Waiters read it through their own handle after `reset` installed a
    // newer generation. Written only with the monitor lock held.
    broken: AtomicBool,
}

impl Generation {
    fn new(id: u64) -> Arc<Self> {
        Arc::new(Self {
            id,
            broken: AtomicBool::new(false),
        })
    }

    fn is_broken(&self) -> bool {
        self.broken.load(Ordering::Relaxed)
    }
}

struct BarrierState {
    generation: Arc<Generation>,
    remaining: usize,
    action: Option<Action>,
}

/// Cyclic barrier for a fixed number of parties.
pub struct CyclicBarrier {
    parties: usize,
    monitor: Monitor<BarrierState>,
}

impl CyclicBarrier {
    /// Barrier with no completion action.
    ///
    /// # Panics
    ///
    /// Panics if `parties == 0`.
    #[must_use]
    pub fn new(parties: usize) -> Self {
        Self::build(parties, None)
    }

    /// Barrier whose last arriver runs `action` before the others are released.
    ///
    /// A panicking action breaks the generation.
    ///
    /// # Panics
    ///
    /// Panics if `parties == 0`.
    #[must_use]
    pub fn with_action<F>(parties: usize, mut action: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        Self::build(
            parties,
            Some(Box::new(move || {
                action();
                Ok(())
            })),
        )
    }

    /// Barrier with an action that can fail. A failure breaks the generation;
    /// the party that ran it receives [`SyncError::ActionFailed`].
    ///
    /// # Panics
    ///
    /// Panics if `parties == 0`.
    #[must_use]
    pub fn with_fallible_action<F, E>(parties: usize, mut action: F) -> Self
    where
        F: FnMut() -> Result<(), E> + Send + 'static,
        E: std::fmt::Display,
    {
        Self::build(
            parties,
            Some(Box::new(move || action().map_err(|err| err.to_string()))),
        )
    }

    fn build(parties: usize, action: Option<Action>) -> Self {
        assert!(parties > 0, "barrier requires at least 1 party");
        Self {
            parties,
            monitor: Monitor::new(BarrierState {
                generation: Generation::new(0),
                remaining: parties,
                action,
            }),
        }
    }

    /// Number of parties required to trip.
    #[must_use]
    pub fn parties(&self) -> usize {
        self.parties
    }

    /// Parties currently blocked in the active generation.
    #[must_use]
    pub fn number_waiting(&self) -> usize {
        let state = self.monitor.lock();
        if state.generation.is_broken() {
            0
        } else {
            self.parties - state.remaining
        }
    }

    /// Returns true if the active generation is broken.
    #[must_use]
    pub fn is_broken(&self) -> bool {
        self.monitor.lock().generation.is_broken()
    }

    /// Id of the active generation; increments on every trip and reset.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.monitor.lock().generation.id
    }

    /// Break the active generation, failing its waiters with
    /// [`SyncError::BrokenBarrier`], and start a fresh one.
    pub fn reset(&self) {
        let mut state = self.monitor.lock();
        self.break_generation(&mut state);
        self.next_generation(&mut state);
    }

    /// Arrive and block until every party has arrived.
    ///
    /// Returns the arrival index: `parties - 1` for the first arriver down to
    /// `0` for the last, which ran the action.
    pub fn wait(&self) -> SyncResult<usize> {
        self.wait_with(&Wait::forever())
    }

    /// [`CyclicBarrier::wait`] bounded by `timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> SyncResult<usize> {
        self.wait_with(&Wait::timeout(timeout))
    }

    /// Arrive and wait under `wait`. A timeout or cancellation breaks the
    /// generation: this party gets `Timeout`/`Interrupted`, the others get
    /// `BrokenBarrier`.
    pub fn wait_with(&self, wait: &Wait<'_>) -> SyncResult<usize> {
        let mut state = self.monitor.lock();
        let generation = Arc::clone(&state.generation);

        if generation.is_broken() {
            return Err(SyncError::BrokenBarrier);
        }
        if wait.is_cancelled() {
            self.break_generation(&mut state);
            return Err(SyncError::Interrupted);
        }

        state.remaining -= 1;
        let index = state.remaining;

        if index == 0 {
            if let Err(reason) = run_action(&mut state.action) {
                self.break_generation(&mut state);
                return Err(SyncError::ActionFailed(reason));
            }
            self.next_generation(&mut state);
            return Ok(0);
        }

        let outcome = self.monitor.wait_until(&mut state, TRIPPED, wait, |s| {
            generation.is_broken() || !Arc::ptr_eq(&s.generation, &generation)
        });
        match outcome {
            Ok(()) if generation.is_broken() => Err(SyncError::BrokenBarrier),
            Ok(()) => Ok(index),
            Err(err) => {
                self.break_generation(&mut state);
                Err(err)
            }
        }
    }

    fn break_generation(&self, state: &mut BarrierState) {
        state.generation.broken.store(true, Ordering::Relaxed);
        state.remaining = self.parties;
        self.monitor.signal_all(TRIPPED);
    }

    fn next_generation(&self, state: &mut BarrierState) {
        self.monitor.signal_all(TRIPPED);
        state.generation = Generation::new(state.generation.id.wrapping_add(1));
        state.remaining = self.parties;
    }
}

fn run_action(action: &mut Option<Action>) -> Result<(), String> {
    let Some(action) = action.as_mut() else {
        return Ok(());
    };
    match panic::catch_unwind(AssertUnwindSafe(|| action())) {
        Ok(result) => result,
        Err(payload) => Err(panic_message(payload.as_ref())),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "action panicked".to_string()
    }
}

impl std::fmt::Debug for CyclicBarrier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.monitor.lock();
        f.debug_struct("CyclicBarrier")
            .field("parties", &self.parties)
            .field("generation", &state.generation.id)
            .field("remaining", &state.remaining)
            .field("broken", &state.generation.is_broken())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelToken;
    use std::collections::BTreeSet;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    fn run_wave(barrier: &Arc<CyclicBarrier>, parties: usize) -> Vec<SyncResult<usize>> {
        let handles: Vec<_> = (0..parties)
            .map(|_| {
                let barrier = Arc::clone(barrier);
                thread::spawn(move || barrier.wait())
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("party should finish"))
            .collect()
    }

    fn wait_for_waiters(barrier: &CyclicBarrier, n: usize) {
        while barrier.number_waiting() < n {
            thread::yield_now();
        }
    }

    #[test]
    fn single_party_trips_immediately() {
        let barrier = CyclicBarrier::new(1);
        assert_eq!(barrier.wait(), Ok(0));
        assert_eq!(barrier.wait(), Ok(0));
        assert_eq!(barrier.generation(), 2);
    }

    #[test]
    fn two_waves_run_action_once_each() {
        let counter = Arc::new(AtomicUsize::new(0));
        let barrier = {
            let counter = Arc::clone(&counter);
            Arc::new(CyclicBarrier::with_action(5, move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
        };
        for wave in 1..=2 {
            let indices: BTreeSet<usize> = run_wave(&barrier, 5)
                .into_iter()
                .map(|r| r.expect("wave should trip"))
                .collect();
            assert_eq!(indices, (0..5).collect::<BTreeSet<_>>());
            assert_eq!(counter.load(Ordering::SeqCst), wave);
        }
        assert!(!barrier.is_broken());
    }

    #[test]
    fn timeout_breaks_generation_for_everyone() {
        let barrier = Arc::new(CyclicBarrier::new(3));
        let blocked = {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || barrier.wait())
        };
        wait_for_waiters(&barrier, 1);
        assert_eq!(
            barrier.wait_timeout(Duration::from_millis(10)),
            Err(SyncError::Timeout)
        );
        assert_eq!(blocked.join().expect("party"), Err(SyncError::BrokenBarrier));
        assert!(barrier.is_broken());
        assert_eq!(barrier.wait(), Err(SyncError::BrokenBarrier));
    }

    #[test]
    fn reset_restores_a_working_generation() {
        let barrier = Arc::new(CyclicBarrier::new(2));
        let blocked = {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || barrier.wait())
        };
        wait_for_waiters(&barrier, 1);
        barrier.reset();
        assert_eq!(blocked.join().expect("party"), Err(SyncError::BrokenBarrier));
        assert!(!barrier.is_broken());

        let results: BTreeSet<usize> = run_wave(&barrier, 2)
            .into_iter()
            .map(|r| r.expect("fresh generation trips"))
            .collect();
        assert_eq!(results, BTreeSet::from([0, 1]));
    }

    #[test]
    fn failing_action_breaks_generation() {
        let barrier = Arc::new(CyclicBarrier::with_fallible_action(2, || {
            Err::<(), _>("refused")
        }));
        let mut results = run_wave(&barrier, 2);
        results.sort_by_key(|r| matches!(r, Err(SyncError::BrokenBarrier)));
        assert_eq!(
            results,
            vec![
                Err(SyncError::ActionFailed("refused".to_string())),
                Err(SyncError::BrokenBarrier)
            ]
        );
        assert!(barrier.is_broken());
    }

    #[test]
    fn panicking_action_is_contained() {
        let barrier = CyclicBarrier::with_action(1, || panic!("boom"));
        assert_eq!(
            barrier.wait(),
            Err(SyncError::ActionFailed("boom".to_string()))
        );
        assert!(barrier.is_broken());
        barrier.reset();
        assert!(!barrier.is_broken());
    }

    #[test]
    fn pre_cancelled_party_breaks_barrier() {
        let barrier = CyclicBarrier::new(2);
        let token = CancelToken::new();
        token.cancel();
        assert_eq!(
            barrier.wait_with(&Wait::forever().cancel_on(&token)),
            Err(SyncError::Interrupted)
        );
        assert!(barrier.is_broken());
    }

    #[test]
    #[should_panic(expected = "at least 1 party")]
    fn zero_parties_rejected() {
        let _ = CyclicBarrier::new(0);
    }
}
