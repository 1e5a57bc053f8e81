//! # coordkit-core
//!
//! Blocking coordination primitives built from one mutex plus one or more
//! condition variables per instance.
//!
//! Every primitive owns its state behind a single internal [`Monitor`]. No
//! operation holds that lock across a call into another primitive, and every
//! wait re-checks an explicit predicate in a loop, so spurious wakeups and
//! signals meant for a different predicate are harmless.
//!
//! Blocking operations come in three shapes: a plain form that blocks until it
//! succeeds, a `*_timeout` form, and a `*_with` form taking a [`Wait`] that
//! combines an optional deadline with an optional [`CancelToken`].

#![deny(unsafe_code)]

pub mod barrier;
pub mod cancel;
pub mod error;
pub mod exchanger;
pub mod latch;
pub mod monitor;
pub mod phaser;
pub mod pool;
pub mod semaphore;
pub mod slot;
pub mod wait;

pub use barrier::CyclicBarrier;
pub use cancel::CancelToken;
pub use error::{Rejected, SyncError, SyncResult};
pub use exchanger::Exchanger;
pub use latch::Latch;
pub use monitor::{ConditionId, Monitor};
pub use phaser::Phaser;
pub use pool::{Lease, ResourcePool, Token};
pub use semaphore::Semaphore;
pub use slot::SlotChannel;
pub use wait::Wait;
