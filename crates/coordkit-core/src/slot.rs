//! Bounded blocking handoff buffer.
//!
//! With the default capacity of one this is the classic single-slot handoff:
//! `put` blocks while the slot is occupied, `take` blocks while it is empty.
//! Larger capacities keep the same contract over a FIFO ring.

use std::collections::VecDeque;
use std::time::Duration;

use crate::error::{Rejected, SyncResult};
use crate::monitor::{ConditionId, Monitor};
use crate::wait::Wait;

const NOT_FULL: ConditionId = ConditionId::new(0);
const NOT_EMPTY: ConditionId = ConditionId::new(1);

struct SlotState<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> SlotState<T> {
    fn has_room(&self) -> bool {
        self.items.len() < self.capacity
    }

    fn occupied(&self) -> bool {
        !self.items.is_empty()
    }
}

/// Bounded blocking channel; capacity one unless built with
/// [`SlotChannel::with_capacity`].
pub struct SlotChannel<T> {
    monitor: Monitor<SlotState<T>>,
}

impl<T> SlotChannel<T> {
    /// Single-slot channel.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(1)
    }

    /// Channel holding up to `capacity` values.
    ///
    /// # Panics
    ///
    /// Panics if `capacity == 0`.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "slot channel capacity must be at least 1");
        Self {
            monitor: Monitor::with_conditions(
                SlotState {
                    items: VecDeque::with_capacity(capacity),
                    capacity,
                },
                2,
            ),
        }
    }

    /// Maximum number of buffered values.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.monitor.lock().capacity
    }

    /// Number of values currently buffered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.monitor.lock().items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.monitor.lock().occupied()
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        !self.monitor.lock().has_room()
    }

    /// Store `value` if there is room, otherwise hand it back.
    pub fn try_put(&self, value: T) -> Result<(), T> {
        let mut state = self.monitor.lock();
        if !state.has_room() {
            return Err(value);
        }
        state.items.push_back(value);
        self.monitor.signal(NOT_EMPTY);
        Ok(())
    }

    /// Take the oldest value if one is buffered.
    pub fn try_take(&self) -> Option<T> {
        let mut state = self.monitor.lock();
        let value = state.items.pop_front()?;
        self.monitor.signal(NOT_FULL);
        Some(value)
    }
}

impl<T: Send + 'static> SlotChannel<T> {
    /// Block until there is room, then store `value`.
    pub fn put(&self, value: T) {
        let mut state = self.monitor.lock();
        self.monitor.wait_for(&mut state, NOT_FULL, SlotState::has_room);
        state.items.push_back(value);
        self.monitor.signal(NOT_EMPTY);
    }

    /// [`SlotChannel::put`] bounded by `timeout`.
    pub fn put_timeout(&self, value: T, timeout: Duration) -> Result<(), Rejected<T>> {
        self.put_with(value, &Wait::timeout(timeout))
    }

    /// Store `value` once there is room, or hand it back on timeout or
    /// cancellation with the channel unchanged.
    pub fn put_with(&self, value: T, wait: &Wait<'_>) -> Result<(), Rejected<T>> {
        let mut state = self.monitor.lock();
        if let Err(error) = self
            .monitor
            .wait_until(&mut state, NOT_FULL, wait, SlotState::has_room)
        {
            return Err(Rejected::new(value, error));
        }
        state.items.push_back(value);
        self.monitor.signal(NOT_EMPTY);
        Ok(())
    }

    /// Block until a value is available and take it.
    pub fn take(&self) -> T {
        let mut state = self.monitor.lock();
        loop {
            self.monitor.wait_for(&mut state, NOT_EMPTY, SlotState::occupied);
            if let Some(value) = state.items.pop_front() {
                self.monitor.signal(NOT_FULL);
                return value;
            }
        }
    }

    /// [`SlotChannel::take`] bounded by `timeout`.
    pub fn take_timeout(&self, timeout: Duration) -> SyncResult<T> {
        self.take_with(&Wait::timeout(timeout))
    }

    /// Take the oldest value once one is available. Fails on timeout or
    /// cancellation with the channel unchanged.
    pub fn take_with(&self, wait: &Wait<'_>) -> SyncResult<T> {
        let mut state = self.monitor.lock();
        loop {
            self.monitor
                .wait_until(&mut state, NOT_EMPTY, wait, SlotState::occupied)?;
            if let Some(value) = state.items.pop_front() {
                self.monitor.signal(NOT_FULL);
                return Ok(value);
            }
        }
    }
}

impl<T> Default for SlotChannel<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for SlotChannel<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.monitor.lock();
        f.debug_struct("SlotChannel")
            .field("len", &state.items.len())
            .field("capacity", &state.capacity)
            .finish()
    }
}
