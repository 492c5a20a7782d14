//! Keyed reader/writer lock factory.
//!
//! Hands out reader/writer locks per key. Callers locking the same key
//! coordinate through one shared latch; callers on different keys never
//! touch each other's latch.
//!
//! # Lock Records
//!
//! The factory keeps a map from key to a lock record holding the latch
//! and a user count. The user count covers every caller between checkout and
//! release, whether it still waits on the latch or already holds it:
//!
//! ```text
//!  checkout (global read, or global write on miss)
//!     │  users += 1
//!     ▼
//!  latch.read() / latch.write()      ◄── may block, global lock not held
//!     │
//!     ▼
//!  guard dropped: latch released, users -= 1
//!     │  users == 0 ?
//!     ▼
//!  global write: remove record if still the same record and still unused
//! ```
//!
//! A record exists exactly while its user count is non-zero, so a factory
//! whose locks are all released holds no records.
//!
//! # Read-optimised mode
//!
//! With `read_optimised` set in [`LockFactoryConfig`], a read on a key that
//! has no record does not create one. It holds the factory's global lock in
//! shared mode until released instead. Reads get much cheaper, at a price: while
//! such a read is held, any caller that needs to create a record (a writer
//! or non-shortcut reader on a key without one) waits for it, whatever its
//! key. A thread holding a shortcut read must not acquire or release other
//! keys from the same factory, or it may deadlock against a waiting writer.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::lock_api::{ArcRwLockReadGuard, ArcRwLockWriteGuard};
use parking_lot::{RawRwLock, RwLock};

use crate::lock::locker::KeyLocker;

type RecordMap<K> = HashMap<K, Arc<LockRecord>>;
type ReadHoldGuard<T> = ArcRwLockReadGuard<RawRwLock, T>;
type WriteHoldGuard<T> = ArcRwLockWriteGuard<RawRwLock, T>;

// ---------------------------------------------------------------------------
// LockFactoryConfig
// ---------------------------------------------------------------------------

/// Configuration for a [`LockFactory`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LockFactoryConfig {
    /// Serve reads on keys without a record from the global lock.
    ///
    /// Off by default; see the module docs for the trade-off.
    pub read_optimised: bool,
}

impl LockFactoryConfig {
    /// Returns a configuration with the read-optimised shortcut enabled.
    #[must_use]
    pub fn read_optimised() -> Self {
        Self {
            read_optimised: true,
        }
    }
}

// ---------------------------------------------------------------------------
// LockRecord
// ---------------------------------------------------------------------------

/// Per-key latch and the number of callers using it.
struct LockRecord {
    latch: Arc<RwLock<()>>,
    users: AtomicUsize,
}

impl LockRecord {
    fn new() -> Self {
        Self {
            latch: Arc::new(RwLock::new(())),
            users: AtomicUsize::new(0),
        }
    }
}

struct Shared<K> {
    records: Arc<RwLock<RecordMap<K>>>,
    config: LockFactoryConfig,
}

impl<K: Eq + Hash + Clone> Shared<K> {
    /// Finds or creates the record for `key` and registers one more user.
    ///
    /// The increment happens under the global lock, so it cannot interleave
    /// with a removal of the same record.
    fn checkout(self: &Arc<Self>, key: &K) -> Lease<K> {
        {
            let records = self.records.read();
            if let Some(record) = records.get(key) {
                return self.lease_existing(key, record);
            }
        }

        let mut records = self.records.write();
        // Another caller may have created it between the two lock modes.
        let record = records.entry(key.clone()).or_insert_with(|| {
            tracing::trace!("creating lock record");
            Arc::new(LockRecord::new())
        });
        self.lease_existing(key, record)
    }

    fn lease_existing(self: &Arc<Self>, key: &K, record: &Arc<LockRecord>) -> Lease<K> {
        record.users.fetch_add(1, Ordering::AcqRel);
        Lease {
            shared: Arc::clone(self),
            key: key.clone(),
            record: Arc::clone(record),
        }
    }

    /// Returns one user of `record`, reclaiming it when it was the last.
    fn release(&self, key: &K, record: &Arc<LockRecord>) {
        if record.users.fetch_sub(1, Ordering::AcqRel) != 1 {
            return;
        }

        let mut records = self.records.write();
        // A new user may have checked the record out again, or it may have
        // been reclaimed and replaced while we waited for the write lock.
        if record.users.load(Ordering::Acquire) != 0 {
            return;
        }
        if records
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, record))
        {
            records.remove(key);
            tracing::trace!("reclaimed lock record");
        }
    }
}

/// One registered user of a record. Dropping it returns the user.
struct Lease<K: Eq + Hash + Clone> {
    shared: Arc<Shared<K>>,
    key: K,
    record: Arc<LockRecord>,
}

impl<K: Eq + Hash + Clone> Lease<K> {
    fn latch(&self) -> &Arc<RwLock<()>> {
        &self.record.latch
    }
}

impl<K: Eq + Hash + Clone> Drop for Lease<K> {
    fn drop(&mut self) {
        self.shared.release(&self.key, &self.record);
    }
}

// ---------------------------------------------------------------------------
// Guards
// ---------------------------------------------------------------------------

/// Exclusive hold on one key. Released on drop.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct KeyWriteGuard<K: Eq + Hash + Clone> {
    // Declaration order is drop order: the latch goes before the lease.
    _latch: WriteHoldGuard<()>,
    lease: Lease<K>,
}

impl<K: Eq + Hash + Clone> KeyWriteGuard<K> {
    /// Returns the locked key.
    pub fn key(&self) -> &K {
        &self.lease.key
    }
}

impl<K: Eq + Hash + Clone + fmt::Debug> fmt::Debug for KeyWriteGuard<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyWriteGuard")
            .field("key", self.key())
            .finish()
    }
}

/// Shared hold on one key. Released on drop.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct KeyReadGuard<K: Eq + Hash + Clone> {
    inner: ReadHold<K>,
}

enum ReadHold<K: Eq + Hash + Clone> {
    Keyed {
        _latch: ReadHoldGuard<()>,
        lease: Lease<K>,
    },
    /// Read-optimised hold on the whole factory.
    Shortcut {
        _records: ReadHoldGuard<RecordMap<K>>,
        key: K,
    },
}

impl<K: Eq + Hash + Clone> KeyReadGuard<K> {
    /// Returns the locked key.
    pub fn key(&self) -> &K {
        match &self.inner {
            ReadHold::Keyed { lease, .. } => &lease.key,
            ReadHold::Shortcut { key, .. } => key,
        }
    }

    /// Returns true if the read is held through the factory's global lock
    /// rather than a per-key record.
    pub fn is_shortcut(&self) -> bool {
        matches!(self.inner, ReadHold::Shortcut { .. })
    }
}

impl<K: Eq + Hash + Clone + fmt::Debug> fmt::Debug for KeyReadGuard<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyReadGuard")
            .field("key", self.key())
            .field("shortcut", &self.is_shortcut())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// LockFactory
// ---------------------------------------------------------------------------

/// Factory of per-key reader/writer locks.
///
/// Cloning is cheap and clones share the same locks.
///
/// ```rust,ignore
/// let factory = LockFactory::new();
/// {
///     let _guard = factory.write(&"orders");
///     // exclusive on "orders"; "users" is unaffected
///     let _other = factory.read(&"users");
/// }
/// assert_eq!(factory.active_keys(), 0);
/// ```
pub struct LockFactory<K> {
    shared: Arc<Shared<K>>,
}

impl<K: Eq + Hash + Clone> LockFactory<K> {
    /// Creates a factory with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(LockFactoryConfig::default())
    }

    /// Creates a factory with a custom configuration.
    #[must_use]
    pub fn with_config(config: LockFactoryConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                records: Arc::new(RwLock::new(HashMap::new())),
                config,
            }),
        }
    }

    /// Acquires `key` exclusively, blocking until granted.
    pub fn write(&self, key: &K) -> KeyWriteGuard<K> {
        let lease = self.shared.checkout(key);
        let latch = lease.latch().write_arc();
        KeyWriteGuard {
            _latch: latch,
            lease,
        }
    }

    /// Acquires `key` shared, blocking until granted.
    pub fn read(&self, key: &K) -> KeyReadGuard<K> {
        if self.shared.config.read_optimised {
            let records = self.shared.records.read_arc();
            if let Some(record) = records.get(key) {
                let lease = self.shared.lease_existing(key, record);
                drop(records);
                return Self::keyed_read(lease);
            }
            return KeyReadGuard {
                inner: ReadHold::Shortcut {
                    _records: records,
                    key: key.clone(),
                },
            };
        }

        Self::keyed_read(self.shared.checkout(key))
    }

    /// Acquires `key` exclusively if that is possible without blocking on
    /// the key's latch.
    pub fn try_write(&self, key: &K) -> Option<KeyWriteGuard<K>> {
        let lease = self.shared.checkout(key);
        let latch = lease.latch().try_write_arc()?;
        Some(KeyWriteGuard {
            _latch: latch,
            lease,
        })
    }

    /// Acquires `key` shared if that is possible without blocking on the
    /// key's latch or, in read-optimised mode, on the global lock.
    pub fn try_read(&self, key: &K) -> Option<KeyReadGuard<K>> {
        if self.shared.config.read_optimised {
            let records = self.shared.records.try_read_arc()?;
            if let Some(record) = records.get(key) {
                let lease = self.shared.lease_existing(key, record);
                drop(records);
                let latch = lease.latch().try_read_arc()?;
                return Some(KeyReadGuard {
                    inner: ReadHold::Keyed {
                        _latch: latch,
                        lease,
                    },
                });
            }
            return Some(KeyReadGuard {
                inner: ReadHold::Shortcut {
                    _records: records,
                    key: key.clone(),
                },
            });
        }

        let lease = self.shared.checkout(key);
        let latch = lease.latch().try_read_arc()?;
        Some(KeyReadGuard {
            inner: ReadHold::Keyed {
                _latch: latch,
                lease,
            },
        })
    }

    /// Returns a locker for `key` with unpaired lock/unlock calls.
    pub fn locker_for(&self, key: K) -> KeyLocker<K> {
        KeyLocker::new(self.clone(), key)
    }

    /// Returns the number of keys that currently have a lock record.
    pub fn active_keys(&self) -> usize {
        // Recursive so a thread holding a shortcut read can still ask.
        self.shared.records.read_recursive().len()
    }

    /// Returns true if reads on keys without a record take the global lock.
    pub fn is_read_optimised(&self) -> bool {
        self.shared.config.read_optimised
    }

    fn keyed_read(lease: Lease<K>) -> KeyReadGuard<K> {
        let latch = lease.latch().read_arc();
        KeyReadGuard {
            inner: ReadHold::Keyed {
                _latch: latch,
                lease,
            },
        }
    }
}

impl<K: Eq + Hash + Clone> Default for LockFactory<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> Clone for LockFactory<K> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<K: Eq + Hash + Clone> fmt::Debug for LockFactory<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockFactory")
            .field("config", &self.shared.config)
            .field("active_keys", &self.active_keys())
            .finish()
    }
}

// ===========================================================================
// Tests
// ===========================================================================
