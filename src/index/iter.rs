use super::{Keyed, Node, SkipList};
use crate::concurrent::epoch::{Epoch, EpochGuard};
use std::sync::atomic::Ordering;

/// Advances by following level-0 forward links, skipping marked-deleted
/// ones. Never helps unlink — safe to run interleaved with writers without
/// perturbing their CAS chains.
pub struct StableIter<'a, T> {
    list: &'a SkipList<T>,
    curr: *mut Node<T>,
    _guard: EpochGuard,
}

impl<'a, T> StableIter<'a, T> {
    pub(super) fn new(list: &'a SkipList<T>) -> Self {
        Self {
            list,
            curr: list.head,
            _guard: Epoch::pin(),
        }
    }

    pub fn next(&mut self) -> Option<&'a T> {
        loop {
            let (n, _) = unsafe { (*self.curr).next[0].get(Ordering::Acquire) };
            self.curr = n;
            if self.curr == self.list.tail {
                return None;
            }
            // A node's deleted bit lives on its own outgoing link, set by
            // the node's own soft-delete — not on the link pointing to it.
            let (_, deleted) = unsafe { (*self.curr).next[0].get(Ordering::Acquire) };
            if deleted {
                continue;
            }
            return unsafe { (*self.curr).value.as_ref() };
        }
    }
}

/// Advances by following level-0 forward links, physically unlinking any
/// marked node it crosses. On a lost unlink race it re-establishes position
/// with a fresh `find_path` from the node it was trying to pass.
pub struct MutIter<'a, T> {
    list: &'a SkipList<T>,
    prev: *mut Node<T>,
    curr: *mut Node<T>,
    _guard: EpochGuard,
}

impl<'a, T: Keyed> MutIter<'a, T> {
    pub(super) fn new(list: &'a SkipList<T>) -> Self {
        Self {
            list,
            prev: list.head,
            curr: list.head,
            _guard: Epoch::pin(),
        }
    }

    pub fn next(&mut self) -> Option<&'a T> {
        loop {
            let (node, _) = unsafe { (*self.curr).next[0].get(Ordering::Acquire) };
            if node == self.list.tail {
                self.prev = self.curr;
                self.curr = node;
                return None;
            }
            // As in `StableIter`, a node's deleted bit lives on its own
            // outgoing link, not on the predecessor's link pointing to it.
            let (succ, deleted) = unsafe { (*node).next[0].get(Ordering::Acquire) };
            if deleted {
                let ok = unsafe { (*self.curr).next[0].cas((node, false), (succ, false)) };
                if ok {
                    unsafe { Epoch::defer(node) };
                    continue;
                }
                let key = unsafe { (*node).key };
                let (preds, _, _) = self.list.find_path(key);
                self.prev = preds[0];
                self.curr = preds[0];
                continue;
            }
            self.prev = self.curr;
            self.curr = node;
            return unsafe { (*self.curr).value.as_ref() };
        }
    }

    /// Positions the iterator so the next call to `next` returns the
    /// smallest live node with key >= `key`.
    pub fn seek(&mut self, key: i64) {
        let (preds, _, _) = self.list.find_path(key);
        self.prev = preds[0];
        self.curr = preds[0];
    }
}
