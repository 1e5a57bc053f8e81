//! Error taxonomy shared by every primitive.

use std::fmt;

use thiserror::Error;

/// Failure of a coordination operation.
///
/// All variants except [`SyncError::BrokenBarrier`] leave the primitive in a
/// consistent, reusable state. A broken barrier stays broken until
/// [`crate::CyclicBarrier::reset`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// The deadline elapsed before the awaited condition held.
    #[error("deadline elapsed before the awaited condition held")]
    Timeout,
    /// The caller's cancellation token fired during the wait.
    #[error("wait interrupted by cancellation")]
    Interrupted,
    /// The barrier generation was invalidated by a cancelled party, a failed
    /// completion action, or a reset.
    #[error("barrier generation is broken")]
    BrokenBarrier,
    /// The completion action run by this party failed; the generation is broken.
    #[error("barrier completion action failed: {0}")]
    ActionFailed(String),
    /// A token was returned to a pool it does not belong to, or is not on loan.
    #[error("token does not belong to this pool or is not on loan")]
    InvalidRelease,
    /// The primitive cannot accept the operation in its current state.
    #[error("illegal state: {0}")]
    IllegalState(&'static str),
}

impl SyncError {
    /// Returns true for the two cancellation outcomes (`Timeout`, `Interrupted`).
    #[must_use]
    pub const fn is_cancellation(&self) -> bool {
        matches!(self, Self::Timeout | Self::Interrupted)
    }
}

/// Result alias for coordination operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// A failed operation that hands the caller's value back.
///
/// Returned by operations that take ownership of a value (`put`, `exchange`,
/// `release`) so a timeout or rejection never destroys that value.
pub struct Rejected<T> {
    /// The value the operation did not consume.
    pub value: T,
    /// Why the operation failed.
    pub error: SyncError,
}

impl<T> Rejected<T> {
    #[must_use]
    pub(crate) fn new(value: T, error: SyncError) -> Self {
        Self { value, error }
    }

    /// Recover the value that was not consumed.
    #[must_use]
    pub fn into_inner(self) -> T {
        self.value
    }

    /// The failure reason.
    #[must_use]
    pub fn error(&self) -> &SyncError {
        &self.error
    }
}

impl<T> fmt::Debug for Rejected<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rejected")
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

impl<T> fmt::Display for Rejected<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.error, f)
    }
}

impl<T> std::error::Error for Rejected<T> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl<T> From<Rejected<T>> for SyncError {
    fn from(rejected: Rejected<T>) -> Self {
        rejected.error
    }
}
