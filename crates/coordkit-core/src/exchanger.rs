//! Pairwise value swap.
//!
//! The first thread of a pair parks its value in the pending slot under a
//! fresh ticket and waits. The second takes the parked value, files its own
//! under that ticket as the response and returns at once. Tickets keep pairs
//! apart: a third arrival starts a new pair instead of touching an in-flight
//! one.

use std::time::Duration;

use crate::error::Rejected;
use crate::monitor::{ConditionId, Monitor};
use crate::wait::Wait;

const MATCHED: ConditionId = ConditionId::new(0);

struct ExchangeState<T> {
    next_ticket: u64,
    pending: Option<(u64, T)>,
    responses: Vec<(u64, T)>,
}

impl<T> ExchangeState<T> {
    fn has_response(&self, ticket: u64) -> bool {
        self.responses.iter().any(|(t, _)| *t == ticket)
    }

    fn claim(&mut self, ticket: u64) -> Option<T> {
        let at = self.responses.iter().position(|(t, _)| *t == ticket)?;
        Some(self.responses.swap_remove(at).1)
    }
}

enum Offer<T> {
    /// A partner was parked; this is its value.
    Matched(T),
    /// No partner yet; our value is parked under this ticket.
    Parked(u64),
}

/// Rendezvous where two threads trade values.
pub struct Exchanger<T> {
    monitor: Monitor<ExchangeState<T>>,
}

impl<T> Exchanger<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            monitor: Monitor::new(ExchangeState {
                next_ticket: 0,
                pending: None,
                responses: Vec::new(),
            }),
        }
    }

    /// Returns true while a thread is parked waiting for a partner.
    #[must_use]
    pub fn has_waiter(&self) -> bool {
        self.monitor.lock().pending.is_some()
    }
}

impl<T> Exchanger<T> {
    fn offer(&self, state: &mut ExchangeState<T>, value: T) -> Offer<T> {
        if let Some((ticket, parked)) = state.pending.take() {
            state.responses.push((ticket, value));
            self.monitor.signal_all(MATCHED);
            return Offer::Matched(parked);
        }
        let ticket = state.next_ticket;
        state.next_ticket = state.next_ticket.wrapping_add(1);
        state.pending = Some((ticket, value));
        Offer::Parked(ticket)
    }

    /// Swap `value` with the partner's, waiting as long as it takes.
    pub fn exchange(&self, value: T) -> T {
        let mut state = self.monitor.lock();
        let ticket = match self.offer(&mut state, value) {
            Offer::Matched(received) => return received,
            Offer::Parked(ticket) => ticket,
        };
        loop {
            if let Some(received) = state.claim(ticket) {
                return received;
            }
            self.monitor
                .wait_for(&mut state, MATCHED, |s| s.has_response(ticket));
        }
    }
}

impl<T: Send + 'static> Exchanger<T> {
    /// [`Exchanger::exchange`] bounded by `timeout`.
    pub fn exchange_timeout(&self, value: T, timeout: Duration) -> Result<T, Rejected<T>> {
        self.exchange_with(value, &Wait::timeout(timeout))
    }

    /// Swap under `wait`. On timeout or cancellation the caller's value is
    /// withdrawn from the slot and handed back.
    pub fn exchange_with(&self, value: T, wait: &Wait<'_>) -> Result<T, Rejected<T>> {
        let mut state = self.monitor.lock();
        let ticket = match self.offer(&mut state, value) {
            Offer::Matched(received) => return Ok(received),
            Offer::Parked(ticket) => ticket,
        };
        loop {
            if let Some(received) = state.claim(ticket) {
                return Ok(received);
            }
            let waited = self
                .monitor
                .wait_until(&mut state, MATCHED, wait, |s| s.has_response(ticket));
            if let Err(error) = waited {
                // Still parked means no partner took it; otherwise the
                // response is already filed and the next claim succeeds.
                if let Some((_, own)) = state.pending.take_if(|(t, _)| *t == ticket) {
                    return Err(Rejected::new(own, error));
                }
            }
        }
    }
}

impl<T> Default for Exchanger<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for Exchanger<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.monitor.lock();
        f.debug_struct("Exchanger")
            .field("waiting", &state.pending.is_some())
            .field("undelivered", &state.responses.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelToken;
    use crate::error::SyncError;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn two_threads_swap_values() {
        let exchanger = Arc::new(Exchanger::new());
        let first = {
            let exchanger = Arc::clone(&exchanger);
            thread::spawn(move || exchanger.exchange("a"))
        };
        let second = exchanger.exchange("b");
        assert_eq!(second, "a");
        assert_eq!(first.join().expect("partner"), "b");
        assert!(!exchanger.has_waiter());
    }

    #[test]
    fn timeout_hands_value_back_and_clears_slot() {
        let exchanger = Exchanger::new();
        let rejected = exchanger
            .exchange_timeout(vec![1, 2, 3], Duration::from_millis(10))
            .expect_err("no partner");
        assert_eq!(rejected.error(), &SyncError::Timeout);
        assert_eq!(rejected.into_inner(), vec![1, 2, 3]);
        assert!(!exchanger.has_waiter());
    }

    #[test]
    fn cancelled_exchange_is_recoverable() {
        let exchanger = Arc::new(Exchanger::new());
        let token = CancelToken::new();
        let parked = {
            let exchanger = Arc::clone(&exchanger);
            let token = token.clone();
            thread::spawn(move || exchanger.exchange_with(7, &Wait::forever().cancel_on(&token)))
        };
        while !exchanger.has_waiter() {
            thread::yield_now();
        }
        token.cancel();
        match parked.join().expect("parked thread") {
            Err(rejected) => {
                assert_eq!(rejected.error(), &SyncError::Interrupted);
                assert_eq!(rejected.into_inner(), 7);
            }
            Ok(_) => panic!("no partner arrived"),
        }
        assert!(!exchanger.has_waiter());

        let next = {
            let exchanger = Arc::clone(&exchanger);
            thread::spawn(move || exchanger.exchange(1))
        };
        assert_eq!(exchanger.exchange(2), 1);
        assert_eq!(next.join().expect("partner"), 2);
    }

    #[test]
    fn blocking_exchange_pairs_with_timed_partner() {
        let exchanger = Arc::new(Exchanger::new());
        let parked = {
            let exchanger = Arc::clone(&exchanger);
            thread::spawn(move || exchanger.exchange(String::from("blocking")))
        };
        while !exchanger.has_waiter() {
            thread::yield_now();
        }
        let received = exchanger
            .exchange_timeout(String::from("timed"), Duration::from_secs(5))
            .expect("partner is parked");
        assert_eq!(received, "blocking");
        assert_eq!(parked.join().expect("parked thread"), "timed");
        assert!(!exchanger.has_waiter());
    }

    #[test]
    fn many_pairs_never_mix() {
        let pairs = 8;
        let exchanger = Arc::new(Exchanger::new());
        let handles: Vec<_> = (0..pairs * 2)
            .map(|i| {
                let exchanger = Arc::clone(&exchanger);
                thread::spawn(move || (i, exchanger.exchange(i)))
            })
            .collect();
        let mut got: Vec<(usize, usize)> = handles
            .into_iter()
            .map(|h| h.join().expect("party"))
            .collect();
        got.sort_unstable();
        for &(mine, theirs) in &got {
            assert_ne!(mine, theirs);
            assert_eq!(got[theirs].1, mine, "swap must be symmetric");
        }
    }
}
