// The façade tying the index, the snapshot set, the version counter, and
// the background GC task together. This is the crate's single process-wide
// entry point; multiple engines may coexist and are fully independent.

use crate::config::Config;
use crate::index::SkipList;
use crate::item::{Item, ItemSlot, ALIVE};
use crate::snapshot::{Snapshot, SnapshotSet};
use crossbeam::channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

/// `MaxVersion - 1`, posted to the GC channel on shutdown to force a final
/// sweep of every dead-but-uncovered item before the negative sentinel.
const FINAL_SWEEP_STAMP: i64 = i64::MAX - 1;

/// The negative sentinel that tells the GC task to echo back and exit.
const SHUTDOWN_SENTINEL: i64 = -1;

pub struct Engine {
    index: Arc<SkipList<ItemSlot>>,
    snapshots: Arc<SnapshotSet>,
    version: AtomicI64,
    config: Config,
    gc_tx: Sender<i64>,
    gc_ack_rx: Receiver<i64>,
    gc_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Engine {
    /// Builds a new engine and starts its background GC task.
    pub fn initialize(config: Config) -> Self {
        let index = Arc::new(SkipList::new(config.max_level, config.p));
        let snapshots = Arc::new(SnapshotSet::new(config.max_level, config.p));
        let (gc_tx, gc_rx) = bounded::<i64>(config.gc_channel_capacity);
        let (gc_ack_tx, gc_ack_rx) = bounded::<i64>(1);

        let worker_index = Arc::clone(&index);
        let worker_snapshots = Arc::clone(&snapshots);
        let gc_handle = std::thread::spawn(move || {
            gc_worker(worker_index, worker_snapshots, gc_rx, gc_ack_tx);
        });

        Self {
            index,
            snapshots,
            version: AtomicI64::new(1),
            config,
            gc_tx,
            gc_ack_rx,
            gc_handle: Mutex::new(Some(gc_handle)),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn current_version(&self) -> i64 {
        self.version.load(Ordering::Acquire)
    }

    /// Allocates an item with `born = current_version`, `dead = +inf`, and
    /// links it into the index. Never deduplicates: callers must not insert
    /// a key that is currently visible.
    pub fn insert_key(&self, key: i64) {
        let born = self.current_version();
        self.index.insert(ItemSlot::new(key, born));
        tracing::debug!(key, born, "inserted key");
    }

    /// Sets the item's `dead` to the current version. If it was inserted at
    /// this same version (visible to no snapshot), it is unlinked
    /// immediately; otherwise GC removes it once the last covering
    /// snapshot is released.
    pub fn delete_key(&self, key: i64) {
        let version = self.current_version();
        let item = match self.index.get(key) {
            Some(item) => item,
            None => {
                tracing::debug!(key, "delete_key: no such key");
                return;
            }
        };
        let born = item.born;
        item.mark_dead(version);
        if born == version {
            self.index.delete(key);
        }
        tracing::debug!(key, version, "deleted key");
    }

    /// Bumps the version counter and registers a new snapshot at the
    /// pre-increment value.
    pub fn new_snapshot(&self) -> Snapshot {
        let version = self.version.fetch_add(1, Ordering::AcqRel);
        let snap = self.snapshots.register(version);
        tracing::debug!(version, "new snapshot");
        snap
    }

    /// Decrements the snapshot's refcount; at zero, deregisters it and
    /// posts its version to the GC channel.
    pub fn release_snapshot(&self, snapshot: Snapshot) {
        if self.snapshots.release(snapshot.version) {
            tracing::debug!(version = snapshot.version, "snapshot released, triggering gc");
            let _ = self.gc_tx.send(snapshot.version);
        }
    }

    /// Looks up a currently-registered snapshot by version. A miss is not an
    /// error: it is logged and reported as `None`.
    pub fn get_snapshot(&self, version: i64) -> Option<Snapshot> {
        let snap = self.snapshots.get(version);
        if snap.is_none() {
            tracing::warn!(version, "get_snapshot: no such snapshot");
        }
        snap
    }

    /// Diagnostic scan over every currently-registered snapshot, logging
    /// each one. Returns nothing; it exists for observability the way
    /// `visit_keys` does for the item index.
    pub fn visit_snapshots(&self) {
        tracing::debug!("scanning snapshots");
        for snap in self.snapshots.visit() {
            tracing::debug!(version = snap.version, "visited snapshot");
        }
    }

    /// Full index scan: every item, including soft-deleted ones still
    /// awaiting GC. Uses the mutable iterator, so it helps unlink any
    /// already-unreachable tombstones it crosses.
    pub fn visit_keys(&self) -> Vec<Item> {
        let mut it = self.index.mut_iter();
        let mut out = Vec::new();
        while let Some(slot) = it.next() {
            out.push(slot.snapshot());
        }
        out
    }

    /// The keys visible to `snapshot`: `born <= snapshot.version < dead`.
    pub fn visit_snapshot(&self, snapshot: &Snapshot) -> Vec<i64> {
        let mut it = self.index.mut_iter();
        let mut out = Vec::new();
        while let Some(slot) = it.next() {
            let item = slot.snapshot();
            if item.visible_at(snapshot.version) {
                out.push(item.key);
            }
        }
        out
    }

    /// Must precede structural teardown. Forces a final sweep, then posts
    /// the shutdown sentinel and blocks for the GC task's echo before
    /// joining it. Skipping this call leaves the GC task parked on its
    /// channel.
    pub fn shutdown_gc(&self) {
        let _ = self.gc_tx.send(FINAL_SWEEP_STAMP);
        let _ = self.gc_tx.send(SHUTDOWN_SENTINEL);
        let _ = self.gc_ack_rx.recv();
        if let Some(handle) = self.gc_handle.lock().unwrap().take() {
            let _ = handle.join();
        }
    }

    /// Consumes the engine. Call only after `shutdown_gc`.
    pub fn shutdown(self) {}
}

fn gc_worker(
    index: Arc<SkipList<ItemSlot>>,
    snapshots: Arc<SnapshotSet>,
    cmd_rx: Receiver<i64>,
    ack_tx: Sender<i64>,
) {
    loop {
        match cmd_rx.recv() {
            Ok(snap_v) if snap_v < 0 => {
                let _ = ack_tx.send(0);
                return;
            }
            Ok(snap_v) => run_gc(&index, &snapshots, snap_v),
            Err(_) => return,
        }
    }
}

/// Walks the index uniformly, item by item — unlike the draft this was
/// ported from, which examined a one-step-lagged `prev` and silently
/// skipped the first iterated item.
fn run_gc(index: &SkipList<ItemSlot>, snapshots: &SnapshotSet, snap_v: i64) {
    let mut collected = 0usize;
    let mut it = index.mut_iter();
    while let Some(slot) = it.next() {
        let dead = slot.dead();
        if dead == ALIVE {
            continue;
        }
        if dead > snap_v {
            continue;
        }
        if !snapshots.covers(slot.born, dead) {
            index.delete(slot.key);
            collected += 1;
        }
    }
    tracing::debug!(snap_v, collected, "gc sweep complete");
}
