//! Fixed-size pool of interchangeable resources.
//!
//! The pool owns `N` resources, a parallel in-use table, and a permit count
//! `available` that always equals the number of resources not on loan. An
//! acquired resource travels inside a [`Token`]; the pool slot stays empty
//! until the token comes back through [`ResourcePool::release`], so a
//! resource can never be handed to two owners at once.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Rejected, SyncError, SyncResult};
use crate::monitor::{ConditionId, Monitor};
use crate::wait::Wait;

const RESOURCE_FREE: ConditionId = ConditionId::new(0);

/// Identity shared by a pool and every token it issues.
type PoolId = Arc<()>;

struct PoolState<T> {
    slots: Vec<Option<T>>,
    in_use: Vec<bool>,
    available: usize,
}

impl<T> PoolState<T> {
    fn has_free(&self) -> bool {
        self.available > 0
    }

    /// Lend the first free resource. Caller has checked `available > 0`.
    fn checkout(&mut self, pool_id: &PoolId) -> Option<Token<T>> {
        let index = self.in_use.iter().position(|used| !used)?;
        let value = self.slots[index].take()?;
        self.in_use[index] = true;
        self.available -= 1;
        Some(Token {
            pool_id: Arc::clone(pool_id),
            index,
            value,
        })
    }
}

/// A resource on loan from a [`ResourcePool`].
///
/// Dereferences to the resource. Return it with [`ResourcePool::release`].
#[derive(Debug)]
pub struct Token<T> {
    pool_id: PoolId,
    index: usize,
    value: T,
}

impl<T> Token<T> {
    /// Position of the resource within its pool.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }
}

impl<T> Deref for Token<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T> DerefMut for Token<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

/// Pool of `N` resources guarded by a permit count.
pub struct ResourcePool<T> {
    id: PoolId,
    size: usize,
    monitor: Monitor<PoolState<T>>,
}

impl<T> ResourcePool<T> {
    /// Pool owning every item of `items`.
    #[must_use]
    pub fn new<I>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
    {
        let slots: Vec<Option<T>> = items.into_iter().map(Some).collect();
        let size = slots.len();
        Self {
            id: PoolId::default(),
            size,
            monitor: Monitor::new(PoolState {
                slots,
                in_use: vec![false; size],
                available: size,
            }),
        }
    }

    /// Total number of resources.
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Resources currently free.
    #[must_use]
    pub fn available(&self) -> usize {
        self.monitor.lock().available
    }

    /// Resources currently on loan.
    #[must_use]
    pub fn in_use(&self) -> usize {
        self.size - self.available()
    }

    /// Borrow a resource if one is free.
    pub fn try_acquire(&self) -> Option<Token<T>> {
        let mut state = self.monitor.lock();
        if !state.has_free() {
            return None;
        }
        state.checkout(&self.id)
    }

    /// Return a borrowed resource and wake one blocked acquirer.
    ///
    /// Fails with [`SyncError::InvalidRelease`], handing the token back, if
    /// the token was issued by a different pool.
    pub fn release(&self, token: Token<T>) -> Result<(), Rejected<Token<T>>> {
        if !self.owns(&token) || token.index >= self.size {
            return Err(Rejected::new(token, SyncError::InvalidRelease));
        }
        let mut state = self.monitor.lock();
        if !state.in_use[token.index] || state.slots[token.index].is_some() {
            return Err(Rejected::new(token, SyncError::InvalidRelease));
        }
        let Token { index, value, .. } = token;
        state.slots[index] = Some(value);
        state.in_use[index] = false;
        state.available += 1;
        self.monitor.signal(RESOURCE_FREE);
        Ok(())
    }

    /// Returns true if `token` was issued by this pool.
    #[must_use]
    pub fn owns(&self, token: &Token<T>) -> bool {
        Arc::ptr_eq(&token.pool_id, &self.id)
    }
}

impl<T: Send + 'static> ResourcePool<T> {
    /// Block until a resource is free and borrow it.
    pub fn acquire(&self) -> Token<T> {
        let mut state = self.monitor.lock();
        loop {
            self.monitor
                .wait_for(&mut state, RESOURCE_FREE, PoolState::has_free);
            if let Some(token) = state.checkout(&self.id) {
                return token;
            }
        }
    }

    /// [`ResourcePool::acquire`] bounded by `timeout`.
    pub fn acquire_timeout(&self, timeout: Duration) -> SyncResult<Token<T>> {
        self.acquire_with(&Wait::timeout(timeout))
    }

    /// Borrow a resource once one is free. On timeout or cancellation the pool
    /// is unchanged.
    pub fn acquire_with(&self, wait: &Wait<'_>) -> SyncResult<Token<T>> {
        let mut state = self.monitor.lock();
        loop {
            self.monitor
                .wait_until(&mut state, RESOURCE_FREE, wait, PoolState::has_free)?;
            if let Some(token) = state.checkout(&self.id) {
                return Ok(token);
            }
        }
    }

    /// Borrow a resource that returns itself to the pool when dropped.
    pub fn lease(&self) -> Lease<'_, T> {
        Lease {
            pool: self,
            token: Some(self.acquire()),
        }
    }

    /// [`ResourcePool::lease`] with a wait policy.
    pub fn lease_with(&self, wait: &Wait<'_>) -> SyncResult<Lease<'_, T>> {
        let token = self.acquire_with(wait)?;
        Ok(Lease {
            pool: self,
            token: Some(token),
        })
    }
}

impl<T> std::fmt::Debug for ResourcePool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourcePool")
            .field("size", &self.size)
            .field("available", &self.available())
            .finish()
    }
}

/// Scoped loan; the resource goes back to its pool on drop.
pub struct Lease<'a, T> {
    pool: &'a ResourcePool<T>,
    token: Option<Token<T>>,
}

impl<T> Lease<'_, T> {
    /// Position of the resource within its pool.
    #[must_use]
    pub fn index(&self) -> usize {
        self.token.as_ref().map_or(0, Token::index)
    }

    /// Detach the token from the lease; the caller becomes responsible for
    /// releasing it.
    #[must_use]
    pub fn into_token(mut self) -> Option<Token<T>> {
        self.token.take()
    }
}

impl<T> Deref for Lease<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        match &self.token {
            Some(token) => &token.value,
            None => unreachable!("lease token is only taken by into_token or drop"),
        }
    }
}

impl<T> DerefMut for Lease<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        match &mut self.token {
            Some(token) => &mut token.value,
            None => unreachable!("lease token is only taken by into_token or drop"),
        }
    }
}

impl<T> Drop for Lease<'_, T> {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            let released = self.pool.release(token);
            debug_assert!(released.is_ok(), "lease held a token its pool refused");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelToken;
    use std::collections::{BTreeSet, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    fn item_pool(n: usize) -> ResourcePool<String> {
        ResourcePool::new((0..n).map(|i| format!("Item{i}")))
    }

    #[test]
    fn acquire_hands_out_distinct_resources() {
        let pool = item_pool(3);
        let a = pool.acquire();
        let b = pool.acquire();
        let c = pool.acquire();
        let indices: HashSet<usize> = [a.index(), b.index(), c.index()].into_iter().collect();
        assert_eq!(indices.len(), 3);
        assert_eq!(pool.available(), 0);
        assert!(pool.try_acquire().is_none());
        for token in [a, b, c] {
            pool.release(token).expect("own token");
        }
        assert_eq!(pool.available(), 3);
    }

    #[test]
    fn token_derefs_to_resource() {
        let pool = item_pool(1);
        let mut token = pool.acquire();
        assert_eq!(token.as_str(), "Item0");
        token.push_str("-used");
        pool.release(token).expect("own token");
        assert_eq!(pool.acquire().as_str(), "Item0-used");
    }

    #[test]
    fn foreign_token_is_rejected_and_returned() {
        let home = item_pool(1);
        let other = item_pool(1);
        let token = home.acquire();
        assert!(!other.owns(&token));
        let rejected = other.release(token).expect_err("foreign token");
        assert_eq!(rejected.error, SyncError::InvalidRelease);
        assert_eq!(other.available(), 1);
        home.release(rejected.into_inner()).expect("token goes home");
        assert_eq!(home.available(), 1);
    }

    #[test]
    fn acquire_timeout_on_exhausted_pool() {
        let pool = item_pool(1);
        let held = pool.acquire();
        assert_eq!(
            pool.acquire_timeout(Duration::from_millis(10)).map(|t| t.index()),
            Err(SyncError::Timeout)
        );
        assert_eq!(pool.in_use(), 1);
        pool.release(held).expect("own token");
    }

    #[test]
    fn cancelled_acquire_leaves_pool_unchanged() {
        let pool = Arc::new(item_pool(1));
        let held = pool.acquire();
        let token = CancelToken::new();
        let waiter = {
            let pool = Arc::clone(&pool);
            let token = token.clone();
            thread::spawn(move || {
                pool.acquire_with(&Wait::forever().cancel_on(&token))
                    .map(|t| t.index())
            })
        };
        while token.registered_waiters() == 0 {
            thread::yield_now();
        }
        token.cancel();
        assert_eq!(waiter.join().expect("waiter"), Err(SyncError::Interrupted));
        assert_eq!(pool.available(), 0);
        pool.release(held).expect("own token");
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn lease_returns_on_drop() {
        let pool = item_pool(2);
        {
            let lease = pool.lease();
            assert_eq!(lease.len(), 5);
            assert_eq!(pool.available(), 1);
        }
        assert_eq!(pool.available(), 2);
        let token = pool.lease().into_token().expect("token present");
        assert_eq!(pool.available(), 1);
        pool.release(token).expect("own token");
    }

    #[test]
    fn leases_from_two_pools_return_home() {
        let left = item_pool(1);
        let right = item_pool(1);
        {
            let a = left.lease();
            let b = right.lease();
            assert_eq!((a.index(), b.index()), (0, 0));
            assert_eq!((left.available(), right.available()), (0, 0));
        }
        assert_eq!((left.available(), right.available()), (1, 1));
        let token = left.acquire();
        assert!(left.owns(&token));
        assert!(!right.owns(&token));
        left.release(token).expect("own token");
    }

    #[test]
    fn ten_workers_share_five_items() {
        let pool = Arc::new(item_pool(5));
        let holders = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let held = Arc::new(parking_lot::Mutex::new(BTreeSet::new()));
        let workers: Vec<_> = (0..10)
            .map(|_| {
                let pool = Arc::clone(&pool);
                let holders = Arc::clone(&holders);
                let peak = Arc::clone(&peak);
                let held = Arc::clone(&held);
                thread::spawn(move || {
                    let token = pool.acquire();
                    assert!(
                        held.lock().insert(token.index()),
                        "index {} lent twice",
                        token.index()
                    );
                    let now = holders.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(5));
                    holders.fetch_sub(1, Ordering::SeqCst);
                    assert!(held.lock().remove(&token.index()));
                    pool.release(token).is_ok()
                })
            })
            .collect();
        let successes = workers
            .into_iter()
            .map(|w| w.join().expect("worker"))
            .filter(|ok| *ok)
            .count();
        assert_eq!(successes, 10);
        assert!(peak.load(Ordering::SeqCst) <= 5);
        assert!(held.lock().is_empty());
        assert_eq!(pool.available(), 5);
    }
}
