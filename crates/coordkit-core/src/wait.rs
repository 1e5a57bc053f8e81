//! Per-call wait policy: optional deadline plus optional cancellation token.

use std::time::{Duration, Instant};

use crate::cancel::CancelToken;

/// How long a blocking call may wait, and what may interrupt it.
///
/// ```
/// use std::time::Duration;
/// use coordkit_core::{CancelToken, Wait};
///
/// let token = CancelToken::new();
/// let wait = Wait::timeout(Duration::from_millis(50)).cancel_on(&token);
/// assert!(wait.deadline().is_some());
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct Wait<'a> {
    deadline: Option<Instant>,
    cancel: Option<&'a CancelToken>,
}

impl<'a> Wait<'a> {
    /// Wait without deadline or cancellation.
    #[must_use]
    pub const fn forever() -> Self {
        Self {
            deadline: None,
            cancel: None,
        }
    }

    /// Wait at most `timeout` from now. A timeout too large to represent is
    /// treated as no deadline.
    #[must_use]
    pub fn timeout(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now().checked_add(timeout),
            cancel: None,
        }
    }

    /// Wait until `deadline`.
    #[must_use]
    pub const fn until(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            cancel: None,
        }
    }

    /// Also stop waiting when `token` fires.
    #[must_use]
    pub const fn cancel_on(self, token: &'a CancelToken) -> Self {
        Self {
            deadline: self.deadline,
            cancel: Some(token),
        }
    }

    /// The absolute deadline, if any.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// The observed cancellation token, if any.
    #[must_use]
    pub const fn token(&self) -> Option<&'a CancelToken> {
        self.cancel
    }

    /// Returns true if the observed token has fired.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_some_and(CancelToken::is_cancelled)
    }

    /// Returns true if the deadline has passed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }
}
