//! # Keyed Locks
//!
//! Reader/writer locks allocated per key on demand.
//!
//! - [`LockFactory`]: Owns the key-to-record map and hands out guards
//! - [`KeyWriteGuard`] / [`KeyReadGuard`]: RAII holds on one key
//! - [`KeyLocker`]: Unpaired `lock`/`unlock`/`rlock`/`runlock` for one key
//! - [`ReadLocker`]: Shared-mode view of a [`KeyLocker`]
//!
//! ## Guarantees
//!
//! | Property | Holds |
//! |----------|-------|
//! | At most one writer per key | Always |
//! | Readers and a writer never overlap on a key | Always |
//! | Different keys never block each other | Except read-optimised shortcut reads |
//! | No records left once every lock is released | Always |
//!
//! Acquisition is unconditional: there is no timeout and no cancellation.
//! Callers that need either use [`LockFactory::try_write`] /
//! [`LockFactory::try_read`] in their own retry loop.

mod factory;
mod locker;

pub use factory::{KeyReadGuard, KeyWriteGuard, LockFactory, LockFactoryConfig};
pub use locker::{KeyLocker, Locker, ReadLocker};
