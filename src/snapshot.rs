use crate::index::{Keyed, SkipList};
use std::sync::atomic::{AtomicI64, Ordering};

/// A live entry in the snapshot set: a version stamp plus its refcount.
pub(crate) struct SnapSlot {
    version: i64,
    refcount: AtomicI64,
}

impl SnapSlot {
    fn new(version: i64) -> Self {
        Self {
            version,
            refcount: AtomicI64::new(1),
        }
    }
}

impl Keyed for SnapSlot {
    fn key(&self) -> i64 {
        self.version
    }
}

/// A lightweight, copyable handle to a registered snapshot. The actual
/// refcounted bookkeeping lives in the [`SnapshotSet`] entry keyed by
/// `version`; this handle is what callers hold and pass back to
/// `release_snapshot`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    pub version: i64,
}

/// The second skiplist: live snapshots ordered by version, supporting the
/// range-overlap query GC depends on for safety.
pub struct SnapshotSet {
    list: SkipList<SnapSlot>,
}

impl SnapshotSet {
    pub fn new(max_level: usize, p: f64) -> Self {
        Self {
            list: SkipList::new(max_level, p),
        }
    }

    /// Registers a new snapshot at `version` with refcount 1.
    pub fn register(&self, version: i64) -> Snapshot {
        self.list.insert(SnapSlot::new(version));
        Snapshot { version }
    }

    /// Decrements the refcount for `version`. Returns `true` if it reached
    /// zero and the snapshot was deregistered (the caller must then post
    /// `version` to the GC channel).
    pub fn release(&self, version: i64) -> bool {
        let slot = match self.list.get(version) {
            Some(s) => s,
            None => return false,
        };
        let remaining = slot.refcount.fetch_sub(1, Ordering::AcqRel) - 1;
        if remaining == 0 {
            self.list.delete(version);
            true
        } else {
            false
        }
    }

    /// Looks up a currently-registered snapshot by version, without touching
    /// its refcount.
    pub fn get(&self, version: i64) -> Option<Snapshot> {
        self.list.get(version).map(|_| Snapshot { version })
    }

    /// Every currently-registered snapshot, in version order.
    pub fn visit(&self) -> Vec<Snapshot> {
        let mut it = self.list.mut_iter();
        let mut out = Vec::new();
        while let Some(slot) = it.next() {
            out.push(Snapshot {
                version: slot.version,
            });
        }
        out
    }

    /// `covers(a, b)`: true iff some registered snapshot has `a <= version
    /// < b`. Implemented by seeking the smallest snapshot with version >=
    /// `a` and checking it falls short of `b`.
    pub fn covers(&self, a: i64, b: i64) -> bool {
        let mut it = self.list.mut_iter();
        it.seek(a);
        match it.next() {
            Some(slot) => slot.version < b,
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_release_round_trip() {
        let set = SnapshotSet::new(4, 0.25);
        let s1 = set.register(1);
        let s2 = set.register(2);
        assert_eq!(set.len(), 2);
        assert!(set.release(s1.version));
        assert_eq!(set.len(), 1);
        assert!(set.release(s2.version));
        assert!(set.is_empty());
    }

    #[test]
    fn get_and_visit_reflect_registered_snapshots() {
        let set = SnapshotSet::new(4, 0.25);
        let s1 = set.register(1);
        let s2 = set.register(3);
        assert_eq!(set.get(s1.version), Some(s1));
        assert_eq!(set.get(2), None);

        let mut versions: Vec<i64> = set.visit().into_iter().map(|s| s.version).collect();
        versions.sort();
        assert_eq!(versions, vec![1, 3]);

        set.release(s2.version);
        let versions: Vec<i64> = set.visit().into_iter().map(|s| s.version).collect();
        assert_eq!(versions, vec![1]);
    }

    #[test]
    fn covers_detects_overlap() {
        let set = SnapshotSet::new(4, 0.25);
        set.register(5);
        assert!(set.covers(1, 6));
        assert!(!set.covers(6, 10));
        assert!(set.covers(5, 6));
    }
}
