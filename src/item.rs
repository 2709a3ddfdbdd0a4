use crate::index::Keyed;
use std::sync::atomic::{AtomicI64, Ordering};

/// Sentinel meaning "never deleted". `dead` transitions from this value to a
/// finite version exactly once.
pub const ALIVE: i64 = i64::MAX;

/// A snapshot of an index entry's version window, returned to callers.
///
/// Unlike [`ItemSlot`], which lives inside a node and carries the live
/// atomic `dead` cell, this is a plain copy taken at read time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Item {
    pub key: i64,
    pub born: i64,
    pub dead: i64,
}

impl Item {
    /// Whether this item is visible to a reader holding a snapshot at `version`.
    pub fn visible_at(&self, version: i64) -> bool {
        self.born <= version && version < self.dead
    }
}

/// The payload stored in an index [`crate::index::Node`].
///
/// `key` and `born` are fixed at construction; `dead` is written exactly
/// once, from [`ALIVE`] to a finite version, by `delete_key`.
#[derive(Debug)]
pub struct ItemSlot {
    pub key: i64,
    pub born: i64,
    dead: AtomicI64,
}

impl ItemSlot {
    pub fn new(key: i64, born: i64) -> Self {
        Self {
            key,
            born,
            dead: AtomicI64::new(ALIVE),
        }
    }

    pub fn dead(&self) -> i64 {
        self.dead.load(Ordering::Acquire)
    }

    /// Sets `dead` to `version`. The same-version-delete case (`version ==
    /// born`) is expected to be followed immediately by an unlink, so the
    /// item never lingers reachable with `dead <= born`.
    pub fn mark_dead(&self, version: i64) {
        self.dead.store(version, Ordering::Release);
    }

    pub fn snapshot(&self) -> Item {
        Item {
            key: self.key,
            born: self.born,
            dead: self.dead(),
        }
    }
}

impl Keyed for ItemSlot {
    fn key(&self) -> i64 {
        self.key
    }
}
