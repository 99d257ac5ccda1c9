//! Eviction-candidate accumulation and the evict/finalize two-phase commit
//!
//! An [`EvictionCandidates`] bag collects segments slated for removal,
//! grouped by owning key. The protocol has three steps:
//!
//! 1. **collect** — under the priority lock, releasable segments are
//!    registered and their queue entries marked evicting so no concurrent
//!    reservation double-counts them;
//! 2. **evict** — with the priority lock released, the on-disk files are
//!    deleted through the per-key metadata maps;
//! 3. **finalize** — under the priority lock again, the queue entries are
//!    invalidated and the optional query-layer hook runs.
//!
//! Dropping a populated bag that was never finalized rolls the reservation
//! back: every evicting flag it set is cleared so the entries become
//! evictable again. That teardown re-acquires the priority lock, so a bag
//! must not be dropped while the lock is held.

use crate::error::{CacheError, Result};
use crate::metadata::{FileSegmentMetadata, KeyMetadata, LockedKey};
use crate::metrics;
use crate::priority::lru::LruIterator;
use crate::priority::{CachePriorityGuard, PriorityLock};
use crate::types::CacheKey;
use std::collections::hash_map::Entry as MapEntry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, trace};

/// Query-scoped priority layer notified about finalized evictions
///
/// The engine itself carries no query accounting; callers that maintain a
/// per-query priority queue implement this seam and receive one callback per
/// invalidated entry, under the priority lock.
pub trait QueryEvictionContext {
    /// Remove the given entry from the query-scoped layer
    fn remove(&mut self, key: CacheKey, offset: u64, lock: &PriorityLock<'_>);
}

/// Closure invoked with the priority lock held at the end of `finalize`
pub type FinalizeEvictionFunc = Box<dyn FnOnce(&PriorityLock<'_>) + Send>;

/// All candidates registered for one key
pub struct KeyCandidates {
    /// Metadata record of the key, used to take the per-key lock in `evict`
    pub key_metadata: Arc<KeyMetadata>,
    /// Segments of this key slated for removal
    pub candidates: Vec<Arc<FileSegmentMetadata>>,
}

/// Bag of segments marked for eviction, consumed by evict + finalize
///
/// Constructed empty and grown under the priority lock; consumed exactly
/// once by [`evict`](Self::evict) + [`finalize`](Self::finalize), or rolled
/// back by being dropped.
pub struct EvictionCandidates {
    guard: Arc<CachePriorityGuard>,
    candidates: HashMap<CacheKey, KeyCandidates>,
    candidates_size: usize,
    queue_entries_to_invalidate: Vec<LruIterator>,
    finalize_eviction_func: Option<FinalizeEvictionFunc>,
}

impl EvictionCandidates {
    /// Create an empty bag tied to the cache's priority guard
    ///
    /// The guard reference is what lets the rollback path take the priority
    /// lock from whatever thread runs the destructor.
    pub fn new(guard: Arc<CachePriorityGuard>) -> Self {
        Self {
            guard,
            candidates: HashMap::new(),
            candidates_size: 0,
            queue_entries_to_invalidate: Vec::new(),
            finalize_eviction_func: None,
        }
    }

    /// Number of registered candidate segments across all keys
    pub fn size(&self) -> usize {
        self.candidates_size
    }

    /// Whether no candidate was registered
    pub fn is_empty(&self) -> bool {
        self.candidates_size == 0
    }

    /// Registered candidates grouped by key
    pub fn iter(&self) -> impl Iterator<Item = (&CacheKey, &KeyCandidates)> {
        self.candidates.iter()
    }

    /// Install the closure run under the priority lock at the end of finalize
    pub fn set_finalize_eviction_func(&mut self, func: FinalizeEvictionFunc) {
        self.finalize_eviction_func = Some(func);
    }

    /// Register one segment of `locked_key` for eviction
    ///
    /// Marks the underlying queue entry as evicting so concurrent
    /// reservations skip it. The segment must be linked into a priority
    /// queue; anything else is a collaborator bug.
    pub fn add(
        &mut self,
        candidate: &Arc<FileSegmentMetadata>,
        locked_key: &LockedKey<'_>,
        lock: &PriorityLock<'_>,
    ) -> Result<()> {
        let iterator = candidate
            .queue_iterator()
            .ok_or(CacheError::MissingQueueEntry {
                key: locked_key.key(),
                offset: candidate.offset(),
            })?;

        iterator.entry().set_evicting(true, lock);

        let bucket = match self.candidates.entry(locked_key.key()) {
            MapEntry::Occupied(occupied) => occupied.into_mut(),
            MapEntry::Vacant(vacant) => vacant.insert(KeyCandidates {
                key_metadata: Arc::clone(locked_key.metadata()),
                candidates: Vec::new(),
            }),
        };
        bucket.candidates.push(Arc::clone(candidate));

        self.queue_entries_to_invalidate.push(iterator);
        self.candidates_size += 1;

        trace!(
            key = %locked_key.key(),
            offset = candidate.offset(),
            size = candidate.size(),
            "Registered eviction candidate"
        );
        Ok(())
    }

    /// Union another bag into this one
    ///
    /// The other bag is fully drained, so its teardown has nothing left to
    /// roll back.
    pub fn merge(&mut self, mut other: EvictionCandidates, _lock: &PriorityLock<'_>) {
        for (key, mut bucket) in std::mem::take(&mut other.candidates) {
            match self.candidates.entry(key) {
                MapEntry::Occupied(mut occupied) => {
                    occupied.get_mut().candidates.append(&mut bucket.candidates);
                }
                MapEntry::Vacant(vacant) => {
                    vacant.insert(bucket);
                }
            }
        }
        self.queue_entries_to_invalidate
            .append(&mut other.queue_entries_to_invalidate);
        self.candidates_size += other.candidates_size;
        other.candidates_size = 0;
    }

    /// Delete every candidate's on-disk file through its key metadata map
    ///
    /// Must be called *without* the priority lock held: this performs
    /// synchronous disk deletion and takes the per-key locks blockingly.
    /// The priority queue is untouched — it still holds the now-dead
    /// entries, evicting flag set, until [`finalize`](Self::finalize).
    /// Candidates whose segment already vanished are a no-op.
    pub fn evict(&self) -> Result<()> {
        if self.candidates.is_empty() {
            return Ok(());
        }

        let started = Instant::now();
        let mut removed_segments = 0u64;
        for (key, key_candidates) in &self.candidates {
            let mut locked_key = key_candidates.key_metadata.lock();
            for candidate in &key_candidates.candidates {
                if locked_key.remove_segment(candidate.offset())? > 0 {
                    removed_segments += 1;
                }
            }
            trace!(%key, "Evicted candidate segments for key");
        }

        let elapsed_us = started.elapsed().as_micros() as u64;
        metrics::record_evict_duration(elapsed_us);
        debug!(
            segments = removed_segments,
            elapsed_us, "Deleted eviction candidates from disk"
        );
        Ok(())
    }

    /// Invalidate the queue entries and integrate with the query layer
    ///
    /// Runs under the priority lock: every captured queue entry is
    /// invalidated (size zeroed, counters given back), the optional
    /// query-scoped context is notified per entry, and the installed
    /// finalize hook runs last. Afterwards the bag's teardown is a no-op.
    pub fn finalize(
        &mut self,
        mut query_context: Option<&mut dyn QueryEvictionContext>,
        lock: &PriorityLock<'_>,
    ) -> Result<()> {
        let mut evicted_bytes = 0u64;
        let mut evicted_segments = 0u64;

        for iterator in std::mem::take(&mut self.queue_entries_to_invalidate) {
            let entry = iterator.entry();
            let previous_size = entry.size();
            iterator.invalidate(lock)?;
            if previous_size > 0 {
                evicted_bytes += previous_size;
                evicted_segments += 1;
            }
            if let Some(context) = query_context.as_deref_mut() {
                context.remove(entry.key(), entry.offset(), lock);
            }
        }

        metrics::record_evicted(evicted_bytes, evicted_segments);

        if let Some(func) = self.finalize_eviction_func.take() {
            func(lock);
        }

        self.candidates.clear();
        self.candidates_size = 0;

        debug!(
            bytes = evicted_bytes,
            segments = evicted_segments,
            "Finalized eviction batch"
        );
        Ok(())
    }
}

impl Drop for EvictionCandidates {
    fn drop(&mut self) {
        if self.queue_entries_to_invalidate.is_empty() {
            return;
        }

        // The reservation was abandoned before finalize: restore every
        // entry we marked so the queue becomes evictable again. May run on
        // any thread, hence the unconditional blocking lock.
        let lock = self.guard.lock();
        for iterator in self.queue_entries_to_invalidate.drain(..) {
            iterator.entry().set_evicting(false, &lock);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::FileSegment;
    use crate::priority::{IterationResult, LruPriorityQueue, ReserveStat};
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn add_segment(
        queue: &mut LruPriorityQueue,
        key_metadata: &Arc<KeyMetadata>,
        dir: &TempDir,
        offset: u64,
        size: u64,
        lock: &PriorityLock<'_>,
    ) -> (Arc<FileSegment>, LruIterator) {
        let path: PathBuf = dir
            .path()
            .join(format!("{}-{}.bin", key_metadata.key(), offset));
        fs::write(&path, vec![0u8; size as usize]).unwrap();

        let segment = FileSegment::new(key_metadata.key(), offset, size, path);
        {
            let mut locked = key_metadata.lock();
            locked.add_segment(Arc::clone(&segment)).unwrap();
        }
        let iterator = queue
            .add(Arc::clone(key_metadata), offset, size, lock)
            .unwrap();
        segment.set_queue_entry(iterator.clone());
        (segment, iterator)
    }

    #[test]
    fn test_collect_returns_immediately_when_request_fits() {
        let guard = Arc::new(CachePriorityGuard::new());
        let mut queue = LruPriorityQueue::new(100, 0, None);
        let dir = TempDir::new().unwrap();
        let metadata = KeyMetadata::new(CacheKey::new(1));

        let lock = guard.lock();
        add_segment(&mut queue, &metadata, &dir, 0, 40, &lock);

        let mut stat = ReserveStat::default();
        let mut candidates = EvictionCandidates::new(Arc::clone(&guard));
        let (mut reached_size, mut reached_elements) = (false, false);
        let fits = queue
            .collect_candidates_for_reserve(
                30,
                &mut stat,
                &mut candidates,
                &mut reached_size,
                &mut reached_elements,
                &lock,
            )
            .unwrap();

        assert!(fits);
        assert!(candidates.is_empty());
        assert!(!reached_size);
        assert_eq!(stat, ReserveStat::default());
    }

    #[test]
    fn test_drop_without_finalize_restores_evicting_flags() {
        let guard = Arc::new(CachePriorityGuard::new());
        let mut queue = LruPriorityQueue::new(50, 0, None);
        let dir = TempDir::new().unwrap();
        let metadata = KeyMetadata::new(CacheKey::new(1));

        let lock = guard.lock();
        let (_segment, iterator) = add_segment(&mut queue, &metadata, &dir, 0, 50, &lock);

        let mut stat = ReserveStat::default();
        let mut candidates = EvictionCandidates::new(Arc::clone(&guard));
        let (mut rs, mut re) = (false, false);
        let fits = queue
            .collect_candidates_for_reserve(50, &mut stat, &mut candidates, &mut rs, &mut re, &lock)
            .unwrap();

        assert!(fits);
        assert_eq!(candidates.size(), 1);
        assert!(iterator.entry().is_evicting());

        // Abandon the reservation: flags must revert once the bag drops.
        drop(lock);
        drop(candidates);

        assert!(!iterator.entry().is_evicting());
        let lock = guard.lock();
        assert_eq!(queue.size(&lock), 50);
        assert_eq!(iterator.entry().size(), 50);
    }

    #[test]
    fn test_evict_then_finalize_commits() {
        let guard = Arc::new(CachePriorityGuard::new());
        let mut queue = LruPriorityQueue::new(100, 0, None);
        let dir = TempDir::new().unwrap();
        let metadata = KeyMetadata::new(CacheKey::new(1));

        let lock = guard.lock();
        let (segment_a, _it_a) = add_segment(&mut queue, &metadata, &dir, 0, 40, &lock);
        add_segment(&mut queue, &metadata, &dir, 100, 40, &lock);

        let mut stat = ReserveStat::default();
        let mut candidates = EvictionCandidates::new(Arc::clone(&guard));
        let (mut rs, mut re) = (false, false);
        let fits = queue
            .collect_candidates_for_reserve(30, &mut stat, &mut candidates, &mut rs, &mut re, &lock)
            .unwrap();
        assert!(fits);
        assert_eq!(candidates.size(), 1);
        assert_eq!(stat.releasable_size, 40);

        drop(lock);
        candidates.evict().unwrap();
        assert!(!segment_a.path().exists());

        let lock = guard.lock();
        candidates.finalize(None, &lock).unwrap();
        assert_eq!(queue.size(&lock), 40);
        assert_eq!(queue.elements_count(&lock), 1);

        // The zombie link is reaped by the next sweep.
        let dump = queue.dump(&lock).unwrap();
        assert_eq!(dump.len(), 1);
        assert_eq!(dump[0].offset, 100);

        // Teardown after finalize is a no-op.
        drop(lock);
        drop(candidates);
    }

    #[test]
    fn test_finalize_runs_hook_and_query_context() {
        struct RecordingContext {
            removed: Vec<(CacheKey, u64)>,
        }
        impl QueryEvictionContext for RecordingContext {
            fn remove(&mut self, key: CacheKey, offset: u64, _lock: &PriorityLock<'_>) {
                self.removed.push((key, offset));
            }
        }

        let guard = Arc::new(CachePriorityGuard::new());
        let mut queue = LruPriorityQueue::new(0, 0, None);
        let dir = TempDir::new().unwrap();
        let metadata = KeyMetadata::new(CacheKey::new(9));

        let lock = guard.lock();
        let (_segment, _it) = add_segment(&mut queue, &metadata, &dir, 64, 10, &lock);

        let mut stat = ReserveStat::default();
        let mut candidates = EvictionCandidates::new(Arc::clone(&guard));
        queue
            .collect_candidates_for_trim(0, 0, 10, &mut stat, &mut candidates, &lock)
            .unwrap();
        assert_eq!(candidates.size(), 1);

        let hook_ran = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let hook_flag = Arc::clone(&hook_ran);
        candidates.set_finalize_eviction_func(Box::new(move |_lock| {
            hook_flag.store(true, std::sync::atomic::Ordering::Relaxed);
        }));

        drop(lock);
        candidates.evict().unwrap();

        let lock = guard.lock();
        let mut context = RecordingContext { removed: Vec::new() };
        candidates.finalize(Some(&mut context), &lock).unwrap();

        assert!(hook_ran.load(std::sync::atomic::Ordering::Relaxed));
        assert_eq!(context.removed, vec![(CacheKey::new(9), 64)]);
    }

    #[test]
    fn test_merge_unions_buckets() {
        let guard = Arc::new(CachePriorityGuard::new());
        let mut queue = LruPriorityQueue::new(0, 0, None);
        let dir = TempDir::new().unwrap();
        let key_a = KeyMetadata::new(CacheKey::new(1));
        let key_b = KeyMetadata::new(CacheKey::new(2));

        let lock = guard.lock();
        let (_sa, it_a) = add_segment(&mut queue, &key_a, &dir, 0, 10, &lock);
        let (_sb, it_b) = add_segment(&mut queue, &key_b, &dir, 0, 20, &lock);

        let mut first = EvictionCandidates::new(Arc::clone(&guard));
        let mut second = EvictionCandidates::new(Arc::clone(&guard));

        {
            let locked_a = key_a.lock();
            let segment = locked_a.get_by_offset(0).unwrap();
            first.add(&segment, &locked_a, &lock).unwrap();
        }
        {
            let locked_b = key_b.lock();
            let segment = locked_b.get_by_offset(0).unwrap();
            second.add(&segment, &locked_b, &lock).unwrap();
        }

        first.merge(second, &lock);
        assert_eq!(first.size(), 2);
        assert_eq!(first.iter().count(), 2);
        assert!(it_a.entry().is_evicting());
        assert!(it_b.entry().is_evicting());

        drop(lock);
        drop(first);
        assert!(!it_a.entry().is_evicting());
        assert!(!it_b.entry().is_evicting());
    }

    #[test]
    fn test_add_unlinked_segment_is_logic_error() {
        let guard = Arc::new(CachePriorityGuard::new());
        let dir = TempDir::new().unwrap();
        let metadata = KeyMetadata::new(CacheKey::new(3));

        let path = dir.path().join("loose.bin");
        fs::write(&path, b"12345678").unwrap();
        let segment = FileSegment::new(CacheKey::new(3), 0, 8, path);
        {
            let mut locked = metadata.lock();
            locked.add_segment(Arc::clone(&segment)).unwrap();
        }

        let lock = guard.lock();
        let mut candidates = EvictionCandidates::new(Arc::clone(&guard));
        let locked = metadata.lock();
        let candidate = locked.get_by_offset(0).unwrap();
        let err = candidates.add(&candidate, &locked, &lock).unwrap_err();
        assert!(matches!(err, CacheError::MissingQueueEntry { .. }));
    }

    #[test]
    fn test_evicting_entries_skipped_by_later_sweeps() {
        let guard = Arc::new(CachePriorityGuard::new());
        let mut queue = LruPriorityQueue::new(0, 0, None);
        let dir = TempDir::new().unwrap();
        let metadata = KeyMetadata::new(CacheKey::new(4));

        let lock = guard.lock();
        add_segment(&mut queue, &metadata, &dir, 0, 10, &lock);
        add_segment(&mut queue, &metadata, &dir, 100, 10, &lock);

        let mut stat = ReserveStat::default();
        let mut candidates = EvictionCandidates::new(Arc::clone(&guard));
        queue
            .collect_candidates_for_trim(0, 0, 1, &mut stat, &mut candidates, &lock)
            .unwrap();
        assert_eq!(candidates.size(), 1);

        // The marked entry is invisible to a subsequent sweep.
        let mut visited = Vec::new();
        queue
            .iterate(
                |_, segment| {
                    visited.push(segment.offset());
                    IterationResult::Continue
                },
                &lock,
            )
            .unwrap();
        assert_eq!(visited, vec![100]);

        drop(lock);
        drop(candidates);
    }
}
