// Copyright (c) 2025 RustyDB Contributors
//
// Epoch-based memory reclamation for lock-free data structures
//
// This module implements an epoch-based garbage collection scheme similar to
// the one described in "Fast and Portable Concurrent FIFO Queues with Timeout"
// by Hoffman et al. It allows safe reclamation of memory in lock-free structures
// by tracking which threads are accessing which epoch.

use std::cell::{Cell, RefCell};
use std::marker::PhantomData;
use std::sync::atomic::{fence, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Number of epochs to track (3 provides enough lag for reclamation)
const EPOCH_COUNT: usize = 3;

/// Batch size for garbage collection
const GC_BATCH_SIZE: usize = 64;

/// Global epoch counter
static GLOBAL_EPOCH: AtomicU64 = AtomicU64::new(0);

/// Thread-local participant in epoch-based reclamation
thread_local! {
    static LOCAL_EPOCH: Cell<u64> = const { Cell::new(0) };
    static GARBAGE_BAGS: RefCell<[Vec<Garbage>; EPOCH_COUNT]> = RefCell::new([
        Vec::new(),
        Vec::new(),
        Vec::new(),
    ]);
    static IS_PINNED: Cell<bool> = const { Cell::new(false) };
    static PARTICIPANT: RefCell<Option<Arc<Participant>>> = const { RefCell::new(None) };
}

/// Global list of all participants
static PARTICIPANTS: Mutex<Vec<Arc<Participant>>> = Mutex::new(Vec::new());

/// Represents a piece of garbage to be reclaimed
struct Garbage {
    ptr: *mut u8,
    deleter: unsafe fn(*mut u8),
}

impl Garbage {
    /// Create new garbage
    fn new<T>(ptr: *mut T) -> Self {
        unsafe fn deleter<T>(ptr: *mut u8) {
            drop(Box::from_raw(ptr as *mut T));
        }

        Self {
            ptr: ptr as *mut u8,
            deleter: deleter::<T>,
        }
    }

    /// Reclaim this garbage
    unsafe fn reclaim(self) {
        (self.deleter)(self.ptr);
    }
}

/// A participant in epoch-based reclamation
#[repr(C, align(64))]
pub struct Participant {
    /// Current epoch this participant is in (0 means not active)
    epoch: AtomicU64,
    /// Number of times this participant has been pinned
    pin_count: AtomicUsize,
    /// Padding to prevent false sharing
    _padding: [u8; 48],
}

impl Participant {
    /// Create a new participant
    fn new() -> Self {
        Self {
            epoch: AtomicU64::new(0),
            pin_count: AtomicUsize::new(0),
            _padding: [0; 48],
        }
    }

    /// Enter an epoch
    fn enter(&self) -> u64 {
        let count = self.pin_count.fetch_add(1, Ordering::Relaxed);
        if count == 0 {
            let global = GLOBAL_EPOCH.load(Ordering::Relaxed);
            self.epoch.store(global, Ordering::Release);
            fence(Ordering::SeqCst);
        }
        self.epoch.load(Ordering::Relaxed)
    }

    /// Leave an epoch
    fn leave(&self) {
        let count = self.pin_count.fetch_sub(1, Ordering::Relaxed);
        if count == 1 {
            self.epoch.store(0, Ordering::Release);
        }
    }

    /// Check if this participant is active
    fn is_active(&self) -> bool {
        self.epoch.load(Ordering::Acquire) != 0
    }

    /// Get current epoch
    fn current_epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }
}

/// The global epoch-based reclamation system
pub struct Epoch;

impl Epoch {
    /// Pin the current thread to the current epoch
    pub fn pin() -> EpochGuard {
        IS_PINNED.with(|is_pinned| {
            if is_pinned.get() {
                // Already pinned, just increment reference count
                PARTICIPANT.with(|p| {
                    if let Some(participant) = p.borrow().as_ref() {
                        participant.enter();
                    }
                });
            } else {
                // First pin - register participant if needed
                PARTICIPANT.with(|p| {
                    let mut p_ref = p.borrow_mut();
                    if p_ref.is_none() {
                        let participant = Arc::new(Participant::new());
                        PARTICIPANTS.lock().unwrap().push(participant.clone());
                        *p_ref = Some(participant);
                    }
                    if let Some(participant) = p_ref.as_ref() {
                        let epoch = participant.enter();
                        LOCAL_EPOCH.with(|e| e.set(epoch));
                        is_pinned.set(true);
                    }
                });
            }
        });

        EpochGuard {
            _marker: PhantomData,
        }
    }

    /// Try to advance the global epoch
    pub fn try_advance() -> bool {
        let global = GLOBAL_EPOCH.load(Ordering::Relaxed);

        // Check if all participants are in the current epoch or inactive
        let participants = PARTICIPANTS.lock().unwrap();
        let min_epoch = participants
            .iter()
            .filter(|p| p.is_active())
            .map(|p| p.current_epoch())
            .min()
            .unwrap_or(global);

        if min_epoch == global {
            // All active participants have caught up, advance the epoch
            GLOBAL_EPOCH.compare_exchange(
                global,
                global + 1,
                Ordering::Release,
                Ordering::Relaxed,
            ).is_ok()
        } else {
            false
        }
    }

    /// Defer garbage collection of a pointer
    pub fn defer<T>(ptr: *mut T) {
        LOCAL_EPOCH.with(|epoch| {
            let epoch_idx = (epoch.get() % EPOCH_COUNT as u64) as usize;
            GARBAGE_BAGS.with(|bags| {
                bags.borrow_mut()[epoch_idx].push(Garbage::new(ptr));
            });
        });

        // Periodically try to collect garbage
        if LOCAL_EPOCH.with(|e| e.get()) % 100 == 0 {
            Self::try_collect();
        }
    }

    /// Try to collect garbage
    pub fn try_collect() {
        let global = GLOBAL_EPOCH.load(Ordering::Acquire);

        // We can safely reclaim garbage from 2 epochs ago
        if global >= 2 {
            let safe_epoch = global - 2;
            let safe_idx = (safe_epoch % EPOCH_COUNT as u64) as usize;

            GARBAGE_BAGS.with(|bags| {
                let mut bags = bags.borrow_mut();
                let bag = &mut bags[safe_idx];

                // Reclaim garbage in batches
                while !bag.is_empty() {
                    let batch_size = bag.len().min(GC_BATCH_SIZE);
                    for garbage in bag.drain(..batch_size) {
                        // Safety: We're at least 2 epochs ahead, so no thread can be
                        // accessing this memory
                        unsafe {
                            garbage.reclaim();
                        }
                    }
                }
            });
        }

        // Try to advance the global epoch
        Self::try_advance();
    }

    /// Force garbage collection (for testing)
    #[cfg(test)]
    pub fn force_collect() {
        for _ in 0..10 {
            Self::try_advance();
            std::thread::yield_now();
        }
        Self::try_collect();
    }
}

/// Guard representing a pinned epoch
pub struct EpochGuard {
    _marker: PhantomData<*mut ()>,
}

impl Drop for EpochGuard {
    fn drop(&mut self) {
        PARTICIPANT.with(|p| {
            if let Some(participant) = p.borrow().as_ref() {
                participant.leave();
                if participant.pin_count.load(Ordering::Relaxed) == 0 {
                    IS_PINNED.with(|is_pinned| is_pinned.set(false));
                }
            }
        });
    }
}

// Prevent Send/Sync - guards are thread-local
// Use PhantomData to make EpochGuard not Send/Sync
// Note: EpochGuard contains a raw pointer which is already !Send + !Sync

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epoch_pin() {
        let guard1 = Epoch::pin();
        let guard2 = Epoch::pin();
        drop(guard1);
        drop(guard2);
    }

    #[test]
    fn test_garbage_collection() {
        static DROP_COUNT: AtomicUsize = AtomicUsize::new(0);

        struct DropCounter;
        impl Drop for DropCounter {
            fn drop(&mut self) {
                DROP_COUNT.fetch_add(1, Ordering::SeqCst);
            }
        }

        let count_before = DROP_COUNT.load(Ordering::SeqCst);

        {
            let guard = Epoch::pin();
            let ptr = Box::into_raw(Box::new(DropCounter));
            Epoch::defer(ptr);
        }

        // Force collection
        Epoch::force_collect();

        let count_after = DROP_COUNT.load(Ordering::SeqCst);
        assert!(count_after > count_before);
    }
}


