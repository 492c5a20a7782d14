//! Unpaired lock/unlock handles over a [`LockFactory`].
//!
//! Guards are the natural way to hold a keyed lock, but some callers
//! acquire in one place and release in another. A [`KeyLocker`] stores the
//! guards for them: `lock` parks a write guard inside the locker and
//! `unlock` drops it again.

use std::fmt;
use std::hash::Hash;

use parking_lot::Mutex;

use crate::error::LockError;
use crate::lock::factory::{KeyReadGuard, KeyWriteGuard, LockFactory};

/// A lock with unpaired acquire and release calls.
pub trait Locker {
    /// Acquires the lock, blocking until granted.
    fn lock(&self);

    /// Releases the lock.
    ///
    /// # Panics
    ///
    /// Implementations panic if the lock is not held.
    fn unlock(&self);
}

// ---------------------------------------------------------------------------
// KeyLocker
// ---------------------------------------------------------------------------

/// Reader/writer lock for one key of a [`LockFactory`].
///
/// A locker holds at most one write acquisition and any number of read
/// acquisitions. Dropping a locker releases whatever it still holds.
///
/// # Panics
///
/// [`unlock`](Self::unlock) and [`runlock`](Self::runlock) panic when there
/// is nothing to release; use the `try_` variants to get a [`LockError`]
/// instead.
pub struct KeyLocker<K: Eq + Hash + Clone> {
    factory: LockFactory<K>,
    key: K,
    write: Mutex<Option<KeyWriteGuard<K>>>,
    reads: Mutex<Vec<KeyReadGuard<K>>>,
}

impl<K: Eq + Hash + Clone> KeyLocker<K> {
    pub(crate) fn new(factory: LockFactory<K>, key: K) -> Self {
        Self {
            factory,
            key,
            write: Mutex::new(None),
            reads: Mutex::new(Vec::new()),
        }
    }

    /// Returns the key this locker guards.
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Acquires the key exclusively.
    pub fn lock(&self) {
        let guard = self.factory.write(&self.key);
        *self.write.lock() = Some(guard);
    }

    /// Releases the exclusive acquisition.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::NotWriteLocked`] if this locker holds no write.
    pub fn try_unlock(&self) -> Result<(), LockError> {
        let guard = self.write.lock().take().ok_or(LockError::NotWriteLocked)?;
        drop(guard);
        Ok(())
    }

    /// Releases the exclusive acquisition.
    ///
    /// # Panics
    ///
    /// Panics if this locker holds no write.
    pub fn unlock(&self) {
        if let Err(e) = self.try_unlock() {
            panic!("{e}");
        }
    }

    /// Acquires the key shared.
    pub fn rlock(&self) {
        let guard = self.factory.read(&self.key);
        self.reads.lock().push(guard);
    }

    /// Releases the most recent shared acquisition.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::NotReadLocked`] if this locker holds no read.
    pub fn try_runlock(&self) -> Result<(), LockError> {
        let guard = self.reads.lock().pop().ok_or(LockError::NotReadLocked)?;
        drop(guard);
        Ok(())
    }

    /// Releases the most recent shared acquisition.
    ///
    /// # Panics
    ///
    /// Panics if this locker holds no read.
    pub fn runlock(&self) {
        if let Err(e) = self.try_runlock() {
            panic!("{e}");
        }
    }

    /// Returns a view whose `lock`/`unlock` are `rlock`/`runlock`.
    pub fn read_only(&self) -> ReadLocker<'_, K> {
        ReadLocker { locker: self }
    }
}

impl<K: Eq + Hash + Clone> Locker for KeyLocker<K> {
    fn lock(&self) {
        KeyLocker::lock(self);
    }

    fn unlock(&self) {
        KeyLocker::unlock(self);
    }
}

impl<K: Eq + Hash + Clone + fmt::Debug> fmt::Debug for KeyLocker<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyLocker")
            .field("key", &self.key)
            .field("write_locked", &self.write.lock().is_some())
            .field("read_locks", &self.reads.lock().len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// ReadLocker
// ---------------------------------------------------------------------------

/// Shared-mode view of a [`KeyLocker`].
pub struct ReadLocker<'a, K: Eq + Hash + Clone> {
    locker: &'a KeyLocker<K>,
}

impl<K: Eq + Hash + Clone> Locker for ReadLocker<'_, K> {
    fn lock(&self) {
        self.locker.rlock();
    }

    fn unlock(&self) {
        self.locker.runlock();
    }
}

impl<K: Eq + Hash + Clone + fmt::Debug> fmt::Debug for ReadLocker<'_, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ReadLocker").field(&self.locker.key).finish()
    }
}
