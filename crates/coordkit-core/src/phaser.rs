//! Generation barrier with a mutable number of parties.
//!
//! A phase completes when every registered party has arrived. Completion
//! bumps the phase, clears the arrival count, admits parties whose
//! registration was deferred, and wakes every waiter in one transition.
//! Unlike [`crate::CyclicBarrier`] a phaser never breaks; a cancelled
//! [`Phaser::await_advance_with`] just stops waiting.
//!
//! Arrivals are anonymous. A party registered while the current phase already
//! has arrivals belongs to the next phase, and it must not arrive before
//! that phase begins: the phaser cannot tell its arrival apart from one owed
//! to the phase in progress. [`Phaser::await_phase`] gives such a party a
//! place to wait.

use std::time::Duration;

use crate::error::{SyncError, SyncResult};
use crate::monitor::{ConditionId, Monitor};
use crate::wait::Wait;

const ADVANCED: ConditionId = ConditionId::new(0);

#[derive(Debug)]
struct PhaserState {
    phase: u64,
    registered: usize,
    arrived: usize,
    // Registered while the current phase had arrivals; counted from the next.
    pending: usize,
}

impl PhaserState {
    fn advance(&mut self) {
        self.phase += 1;
        self.arrived = 0;
        self.registered += self.pending;
        self.pending = 0;
    }
}

/// Reusable barrier whose parties can join and leave between phases.
pub struct Phaser {
    monitor: Monitor<PhaserState>,
}

impl Phaser {
    /// Phaser at phase 0 with `parties` registered parties.
    #[must_use]
    pub fn new(parties: usize) -> Self {
        Self {
            monitor: Monitor::new(PhaserState {
                phase: 0,
                registered: parties,
                arrived: 0,
                pending: 0,
            }),
        }
    }

    /// Add one party. Returns the phase the new party takes part in.
    ///
    /// When the returned phase is later than [`Phaser::phase`], the party
    /// must call [`Phaser::await_phase`] with it before its first arrival.
    pub fn register(&self) -> u64 {
        self.bulk_register(1)
    }

    /// Add `parties` parties at once. If some parties already arrived in the
    /// current phase the new ones join from the next phase, so the phase in
    /// progress is never held back by them.
    pub fn bulk_register(&self, parties: usize) -> u64 {
        let mut state = self.monitor.lock();
        if state.arrived > 0 {
            state.pending += parties;
            state.phase + 1
        } else {
            state.registered += parties;
            state.phase
        }
    }

    /// Arrive without waiting. Returns the phase arrived at.
    pub fn arrive(&self) -> SyncResult<u64> {
        let mut state = self.monitor.lock();
        let phase = self.arrive_locked(&mut state, false)?;
        Ok(phase)
    }

    /// Arrive and leave the phaser for good. Does not wait; returns the
    /// phase current after the arrival, which is one higher when this was the
    /// last outstanding party.
    pub fn arrive_and_deregister(&self) -> SyncResult<u64> {
        let mut state = self.monitor.lock();
        self.arrive_locked(&mut state, true)?;
        Ok(state.phase)
    }

    /// Arrive and block until the phase advances. Returns the new phase.
    pub fn arrive_and_await_advance(&self) -> SyncResult<u64> {
        let mut state = self.monitor.lock();
        let arrived_at = self.arrive_locked(&mut state, false)?;
        self.monitor
            .wait_for(&mut state, ADVANCED, |s| s.phase != arrived_at);
        Ok(arrived_at + 1)
    }

    /// [`Phaser::arrive_and_await_advance`] bounded by `timeout`.
    pub fn arrive_and_await_advance_timeout(&self, timeout: Duration) -> SyncResult<u64> {
        self.arrive_and_await_advance_with(&Wait::timeout(timeout))
    }

    /// Arrive, then wait under `wait` for the phase to advance.
    ///
    /// The arrival stands even when the wait fails: the phase can still
    /// complete without this caller, which should resume with
    /// [`Phaser::await_advance`] rather than arrive again.
    pub fn arrive_and_await_advance_with(&self, wait: &Wait<'_>) -> SyncResult<u64> {
        let mut state = self.monitor.lock();
        let arrived_at = self.arrive_locked(&mut state, false)?;
        self.monitor
            .wait_until(&mut state, ADVANCED, wait, |s| s.phase != arrived_at)?;
        Ok(arrived_at + 1)
    }

    /// Block until the phaser reaches `phase`. Returns the current phase,
    /// which may already be past it.
    pub fn await_phase(&self, phase: u64) -> u64 {
        let mut state = self.monitor.lock();
        self.monitor.wait_for(&mut state, ADVANCED, |s| s.phase >= phase);
        state.phase
    }

    /// [`Phaser::await_phase`] bounded by `timeout`.
    pub fn await_phase_timeout(&self, phase: u64, timeout: Duration) -> SyncResult<u64> {
        self.await_phase_with(phase, &Wait::timeout(timeout))
    }

    /// [`Phaser::await_phase`] under a deadline and/or cancellation token.
    pub fn await_phase_with(&self, phase: u64, wait: &Wait<'_>) -> SyncResult<u64> {
        let mut state = self.monitor.lock();
        self.monitor
            .wait_until(&mut state, ADVANCED, wait, |s| s.phase >= phase)?;
        Ok(state.phase)
    }

    /// Block until the phaser moves past `phase`. Returns immediately if it
    /// already has. Does not count as an arrival.
    pub fn await_advance(&self, phase: u64) -> u64 {
        let mut state = self.monitor.lock();
        self.monitor.wait_for(&mut state, ADVANCED, |s| s.phase != phase);
        state.phase
    }

    /// [`Phaser::await_advance`] bounded by `timeout`.
    pub fn await_advance_timeout(&self, phase: u64, timeout: Duration) -> SyncResult<u64> {
        self.await_advance_with(phase, &Wait::timeout(timeout))
    }

    /// [`Phaser::await_advance`] under a deadline and/or cancellation token.
    pub fn await_advance_with(&self, phase: u64, wait: &Wait<'_>) -> SyncResult<u64> {
        let mut state = self.monitor.lock();
        self.monitor
            .wait_until(&mut state, ADVANCED, wait, |s| s.phase != phase)?;
        Ok(state.phase)
    }

    /// Current phase number.
    #[must_use]
    pub fn phase(&self) -> u64 {
        self.monitor.lock().phase
    }

    /// Parties counted in the current phase. Deferred registrations are
    /// not included until the phase advances.
    #[must_use]
    pub fn registered_parties(&self) -> usize {
        self.monitor.lock().registered
    }

    /// Parties that arrived in the current phase.
    #[must_use]
    pub fn arrived_parties(&self) -> usize {
        self.monitor.lock().arrived
    }

    /// Parties the current phase still waits for.
    #[must_use]
    pub fn unarrived_parties(&self) -> usize {
        let state = self.monitor.lock();
        state.registered - state.arrived
    }

    fn arrive_locked(&self, state: &mut PhaserState, deregister: bool) -> SyncResult<u64> {
        if state.registered == 0 {
            return Err(SyncError::IllegalState("phaser has no registered parties"));
        }
        let phase = state.phase;
        if deregister {
            state.registered -= 1;
        } else {
            state.arrived += 1;
        }
        if state.arrived == state.registered {
            state.advance();
            self.monitor.signal_all(ADVANCED);
        }
        Ok(phase)
    }
}

impl std::fmt::Debug for Phaser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.monitor.lock();
        f.debug_struct("Phaser")
            .field("phase", &state.phase)
            .field("registered", &state.registered)
            .field("arrived", &state.arrived)
            .field("pending", &state.pending)
            .finish()
    }
}
