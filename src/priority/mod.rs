//! LRU-ordered cache priority engine with eviction-candidate collection
//!
//! This module is the hard core of the filesystem cache: it bounds the disk
//! space consumed by cached remote-object segments and mediates every
//! lifetime transition of segment queue entries through a single priority
//! lock.
//!
//! # Architecture
//!
//! ```text
//! Reservation Flow:
//! reserve(size) → collect_candidates_for_reserve   (priority lock held)
//!                   └─ iterate oldest-first, mark releasable entries
//!                      as evicting, register into EvictionCandidates
//!               → evict()                           (priority lock released,
//!                   └─ delete on-disk files          per-key locks taken)
//!               → finalize()                        (priority lock re-taken)
//!                   └─ invalidate queue entries, run query-layer hook
//! ```
//!
//! # Key Components
//!
//! - **`CachePriorityGuard`**: The coarse cache-wide priority lock. All
//!   mutating operations require a [`PriorityLock`] token obtained from it.
//! - **`QueueState`**: Shared running totals (`current_size`,
//!   `current_elements_num`), optionally shared between two queues when
//!   entries move between them.
//! - **`LruPriorityQueue`**: The LRU-ordered queue itself.
//! - **`LruIterator`**: Stable handle to one queue entry.
//! - **`EvictionCandidates`**: Bag of segments slated for removal,
//!   coordinating the evict/finalize two-phase commit with rollback.
//!
//! # Locking
//!
//! The priority lock is strictly above the per-key metadata locks. It is
//! held for the entire duration of `iterate`, `add`, `remove`,
//! `modify_size_limits`, `can_fit` and the candidate-collection entry
//! points. Callbacks invoked under `iterate` run with the priority lock
//! held; they must not re-acquire it and must not block on I/O.

/// Eviction-candidate accumulation and the evict/finalize two-phase commit
pub mod candidates;
/// Queue entry metadata
pub mod entry;
/// The LRU priority queue and its iterator handle
pub mod lru;

pub use candidates::{EvictionCandidates, FinalizeEvictionFunc, KeyCandidates, QueryEvictionContext};
pub use entry::Entry;
pub use lru::{LruIterator, LruPriorityQueue};

use crate::metrics;
use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// The single coarse mutex guarding a cache instance's priority structures
///
/// Holding the [`PriorityLock`] it hands out is what makes a snapshot of the
/// queue, its counters and every entry's `is_evicting` flag consistent.
#[derive(Debug, Default)]
pub struct CachePriorityGuard {
    mutex: Mutex<()>,
}

impl CachePriorityGuard {
    /// Create a new priority guard
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the priority lock, blocking until it is available
    pub fn lock(&self) -> PriorityLock<'_> {
        PriorityLock {
            _guard: self.mutex.lock(),
        }
    }

    /// Acquire the priority lock without blocking
    pub fn try_lock(&self) -> Option<PriorityLock<'_>> {
        self.mutex.try_lock().map(|guard| PriorityLock { _guard: guard })
    }
}

/// Proof token that the cache-wide priority lock is held
///
/// Every mutating operation on the queue, its entries and the eviction
/// candidates takes a `&PriorityLock` argument. Code running while one is
/// in scope must not block on I/O or attempt to re-acquire the guard.
pub struct PriorityLock<'a> {
    _guard: MutexGuard<'a, ()>,
}

/// Shared running totals of a priority queue
///
/// Updated only under the priority lock but stored as atomics so telemetry
/// readers may observe them racily; such reads are advisory. Two queue
/// instances may reference the same state when entries are moved between
/// them, in which case both update the same counters.
#[derive(Debug, Default)]
pub struct QueueState {
    current_size: AtomicU64,
    current_elements_num: AtomicU64,
}

impl QueueState {
    /// Create a fresh state with zeroed counters
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Current total bytes of all live entries (advisory outside the lock)
    pub fn current_size(&self) -> u64 {
        self.current_size.load(Ordering::Relaxed)
    }

    /// Current number of live entries (advisory outside the lock)
    pub fn current_elements_num(&self) -> u64 {
        self.current_elements_num.load(Ordering::Relaxed)
    }

    pub(crate) fn update_size(&self, delta: i64) {
        debug_assert!(delta != 0);
        if delta >= 0 {
            self.current_size.fetch_add(delta as u64, Ordering::Relaxed);
        } else {
            let dec = delta.unsigned_abs();
            debug_assert!(self.current_size.load(Ordering::Relaxed) >= dec);
            self.current_size.fetch_sub(dec, Ordering::Relaxed);
        }
        metrics::add_cache_size(delta);
    }

    pub(crate) fn update_elements_count(&self, delta: i64) {
        debug_assert!(delta != 0);
        if delta >= 0 {
            self.current_elements_num.fetch_add(delta as u64, Ordering::Relaxed);
        } else {
            let dec = delta.unsigned_abs();
            debug_assert!(self.current_elements_num.load(Ordering::Relaxed) >= dec);
            self.current_elements_num.fetch_sub(dec, Ordering::Relaxed);
        }
        metrics::add_cache_elements(delta);
    }
}

/// Outcome of one `iterate` callback invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationResult {
    /// Stop the sweep immediately
    Break,
    /// Keep the entry and advance to the next one
    Continue,
    /// Unlink the entry, then advance
    RemoveAndContinue,
}

/// Accounting of a candidate-collection walk
///
/// Lets callers distinguish "cache is full but releasable" (evict and retry)
/// from "cache is full of in-use segments" (back off).
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReserveStat {
    /// Total bytes of releasable segments visited
    pub releasable_size: u64,
    /// Number of releasable segments visited
    pub releasable_count: u64,
    /// Total bytes of non-releasable segments visited
    pub non_releasable_size: u64,
    /// Number of non-releasable segments visited
    pub non_releasable_count: u64,
}

impl ReserveStat {
    /// Account one visited segment
    pub fn update(&mut self, size: u64, releasable: bool) {
        if releasable {
            self.releasable_size += size;
            self.releasable_count += 1;
        } else {
            self.non_releasable_size += size;
            self.non_releasable_count += 1;
        }
    }
}

/// Space reserved in a queue without a concrete entry
///
/// Accounts for bytes held during an in-flight download. Created through
/// [`LruPriorityQueue::hold_space`]; returns the reservation on
/// [`release`](HoldSpace::release), or from `Drop` as a fallback, in which
/// case the priority lock is re-acquired. Do not drop one while holding the
/// priority lock.
pub struct HoldSpace {
    guard: Arc<CachePriorityGuard>,
    state: Arc<QueueState>,
    size: u64,
    elements: u64,
    released: bool,
}

impl HoldSpace {
    pub(crate) fn new(
        guard: Arc<CachePriorityGuard>,
        state: Arc<QueueState>,
        size: u64,
        elements: u64,
    ) -> Self {
        Self {
            guard,
            state,
            size,
            elements,
            released: false,
        }
    }

    /// Bytes held by this reservation
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Elements held by this reservation
    pub fn elements(&self) -> u64 {
        self.elements
    }

    /// Return the held space while already inside the priority lock
    pub fn release(&mut self, _lock: &PriorityLock<'_>) {
        self.release_counters();
    }

    fn release_counters(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if self.size > 0 {
            self.state.update_size(-(self.size as i64));
        }
        if self.elements > 0 {
            self.state.update_elements_count(-(self.elements as i64));
        }
    }
}

impl Drop for HoldSpace {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let guard = self.guard.clone();
        let _lock = guard.lock();
        self.release_counters();
    }
}
