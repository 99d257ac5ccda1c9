//! LRU priority queue over cached file segments
//!
//! The queue is a doubly-linked list of entries ordered by recency: head is
//! the least-recently-used end, tail the most-recently-used. Nodes live in
//! an index arena so outstanding [`LruIterator`] handles survive unrelated
//! insertions and removals; a per-slot generation detects stale handles
//! without raw pointers.
//!
//! All operations that touch the queue, its counters or its entries take a
//! [`PriorityLock`] token. The queue itself is owned by the enclosing cache
//! and accessed only while that lock is held.

use crate::error::{CacheError, Result};
use crate::metadata::{FileSegmentMetadata, KeyMetadata, LockedKey};
use crate::metrics;
use crate::priority::candidates::EvictionCandidates;
use crate::priority::entry::Entry;
use crate::priority::{
    CachePriorityGuard, HoldSpace, IterationResult, PriorityLock, QueueState, ReserveStat,
};
use crate::types::{CacheKey, FileSegmentInfo};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Sentinel indices in the `nodes` arena.
const HEAD: usize = 0; // least-recently-used end
const TAIL: usize = 1; // most-recently-used end
const NULL: usize = usize::MAX;

/// Slot index marking a detached iterator.
const DETACHED: usize = usize::MAX;

static NEXT_QUEUE_ID: AtomicU64 = AtomicU64::new(0);

struct Slot {
    /// `None` only for the HEAD and TAIL sentinels and freed slots.
    entry: Option<Arc<Entry>>,
    /// Bumped every time the slot is handed out, invalidating stale handles.
    generation: u64,
    /// Index toward HEAD (less recently used).
    prev: usize,
    /// Index toward TAIL (more recently used).
    next: usize,
}

/// LRU-ordered priority queue with byte and element limits
///
/// Maintains `current_size` and `current_elements_num` in a [`QueueState`]
/// that may be shared with a second queue instance when entries move between
/// them. A limit of 0 means unbounded.
pub struct LruPriorityQueue {
    queue_id: u64,
    /// Index 0 = HEAD sentinel, 1 = TAIL sentinel, 2+ = real slots.
    nodes: Vec<Slot>,
    /// Indices of freed (reusable) slots.
    free_list: Vec<usize>,
    next_generation: u64,
    max_size: u64,
    max_elements: u64,
    state: Arc<QueueState>,
}

impl LruPriorityQueue {
    /// Create a queue with the given limits (0 = unbounded)
    ///
    /// When `state` is passed, this queue shares its running totals with
    /// whichever other queue holds the same state.
    pub fn new(max_size: u64, max_elements: u64, state: Option<Arc<QueueState>>) -> Self {
        let mut nodes = Vec::with_capacity(16);
        nodes.push(Slot {
            entry: None,
            generation: 0,
            prev: NULL,
            next: TAIL,
        });
        nodes.push(Slot {
            entry: None,
            generation: 0,
            prev: HEAD,
            next: NULL,
        });

        Self {
            queue_id: NEXT_QUEUE_ID.fetch_add(1, Ordering::Relaxed),
            nodes,
            free_list: Vec::new(),
            next_generation: 0,
            max_size,
            max_elements,
            state: state.unwrap_or_else(QueueState::new),
        }
    }

    /// Configured size limit in bytes (0 = unbounded)
    pub fn max_size(&self) -> u64 {
        self.max_size
    }

    /// Configured elements limit (0 = unbounded)
    pub fn max_elements(&self) -> u64 {
        self.max_elements
    }

    /// The shared running totals of this queue
    pub fn state(&self) -> &Arc<QueueState> {
        &self.state
    }

    /// Total bytes tracked by the (possibly shared) state
    pub fn size(&self, _lock: &PriorityLock<'_>) -> u64 {
        self.state.current_size()
    }

    /// Total elements tracked by the (possibly shared) state
    pub fn elements_count(&self, _lock: &PriorityLock<'_>) -> u64 {
        self.state.current_elements_num()
    }

    /// Bytes of live entries linked into *this* queue instance
    ///
    /// Differs from [`size`](Self::size) only when the state is shared
    /// between two queues.
    pub fn queue_size(&self, _lock: &PriorityLock<'_>) -> u64 {
        self.linked_slots()
            .into_iter()
            .filter_map(|idx| self.nodes[idx].entry.as_ref())
            .map(|entry| entry.size())
            .sum()
    }

    /// Live entries linked into *this* queue instance
    pub fn queue_elements_count(&self, _lock: &PriorityLock<'_>) -> u64 {
        self.linked_slots()
            .into_iter()
            .filter_map(|idx| self.nodes[idx].entry.as_ref())
            .filter(|entry| entry.size() > 0)
            .count() as u64
    }

    /// Add a new entry for `(key, offset)` at the most-recently-used end
    ///
    /// Fails with a logic error on zero size, a live duplicate, or when the
    /// size limit would be exceeded; those are caller bugs (the caller is
    /// expected to have made room first through candidate collection).
    pub fn add(
        &mut self,
        key_metadata: Arc<KeyMetadata>,
        offset: u64,
        size: u64,
        lock: &PriorityLock<'_>,
    ) -> Result<LruIterator> {
        let key = key_metadata.key();
        let entry = Arc::new(Entry::new(key, offset, size, key_metadata));
        self.add_entry(entry, lock)
    }

    fn add_entry(&mut self, entry: Arc<Entry>, _lock: &PriorityLock<'_>) -> Result<LruIterator> {
        let key = entry.key();
        let offset = entry.offset();
        let size = entry.size();

        if size == 0 {
            return Err(CacheError::ZeroSizeEntry { key, offset });
        }

        if self.contains_live(key, offset) {
            return Err(CacheError::DuplicateEntry { key, offset, size });
        }

        if self.max_size > 0 && self.state.current_size() + size > self.max_size {
            return Err(CacheError::NotEnoughSpace {
                key,
                offset,
                size,
                current_size: self.state.current_size(),
                max_size: self.max_size,
            });
        }

        let slot = self.alloc_slot(Arc::clone(&entry));
        self.link_before_tail(slot);

        self.state.update_size(size as i64);
        self.state.update_elements_count(1);

        trace!(%key, offset, size, "Added entry into LRU queue");

        Ok(LruIterator {
            queue_id: self.queue_id,
            slot,
            generation: self.nodes[slot].generation,
            entry,
            state: Arc::clone(&self.state),
        })
    }

    /// Unlink the entry behind `iterator` and detach the handle
    ///
    /// Counters are only decremented when the entry was still live; a
    /// previously invalidated entry already gave its share back.
    pub fn remove(&mut self, iterator: &mut LruIterator, _lock: &PriorityLock<'_>) -> Result<()> {
        self.check_iterator(iterator)?;
        self.remove_slot(iterator.slot);
        iterator.detach();
        Ok(())
    }

    /// Splice the entry to the most-recently-used end
    ///
    /// Returns the incremented hit counter.
    pub fn increase_priority(&mut self, iterator: &LruIterator, _lock: &PriorityLock<'_>) -> Result<u64> {
        self.check_iterator(iterator)?;
        self.unlink(iterator.slot);
        self.link_before_tail(iterator.slot);
        Ok(iterator.entry.increment_hits())
    }

    /// Splice one entry out of `from` into this queue's tail
    ///
    /// Both queues' counters are adjusted; with a shared state the totals
    /// are unchanged. The old handle is detached and a handle into this
    /// queue returned.
    pub fn move_entry(
        &mut self,
        iterator: &mut LruIterator,
        from: &mut LruPriorityQueue,
        _lock: &PriorityLock<'_>,
    ) -> Result<LruIterator> {
        from.check_iterator(iterator)?;

        let entry = Arc::clone(&iterator.entry);
        let key = entry.key();
        let offset = entry.offset();
        let size = entry.size();

        if size == 0 {
            return Err(CacheError::ZeroSizeEntry { key, offset });
        }
        if self.contains_live(key, offset) {
            return Err(CacheError::DuplicateEntry { key, offset, size });
        }

        from.unlink(iterator.slot);
        from.free_slot(iterator.slot);

        let slot = self.alloc_slot(Arc::clone(&entry));
        self.link_before_tail(slot);

        self.state.update_size(size as i64);
        self.state.update_elements_count(1);
        from.state.update_size(-(size as i64));
        from.state.update_elements_count(-1);

        iterator.detach();

        trace!(%key, offset, size, "Moved entry between LRU queues");

        Ok(LruIterator {
            queue_id: self.queue_id,
            slot,
            generation: self.nodes[slot].generation,
            entry,
            state: Arc::clone(&self.state),
        })
    }

    /// Walk the queue head-to-tail, delivering consistent segment views
    ///
    /// For each visited entry the sweep first reaps invalidated zombies,
    /// skips entries enrolled in an in-flight eviction batch, then acquires
    /// the per-key lock non-blockingly; entries whose key is locked
    /// elsewhere or whose segment vanished are treated as stale and removed.
    /// A size disagreement between queue accounting and segment metadata is
    /// a fatal logic error.
    ///
    /// The callback runs with the priority lock held and the per-key lock of
    /// the delivered segment held; it must not block on I/O or re-acquire
    /// either lock.
    pub fn iterate<F>(&mut self, mut func: F, _lock: &PriorityLock<'_>) -> Result<()>
    where
        F: FnMut(&mut LockedKey<'_>, &Arc<FileSegmentMetadata>) -> IterationResult,
    {
        let mut cursor = self.nodes[HEAD].next;
        while cursor != TAIL {
            let next = self.nodes[cursor].next;
            let entry = Arc::clone(
                self.nodes[cursor]
                    .entry
                    .as_ref()
                    .expect("linked queue slot must hold an entry"),
            );

            // Invalidated entries are reaped before anything else so the
            // accounting check below never sees a zombie.
            if entry.size() == 0 {
                cursor = self.remove_slot(cursor);
                continue;
            }

            if entry.is_evicting() {
                metrics::record_skipped_evicting_segment();
                cursor = next;
                continue;
            }

            let key_metadata = Arc::clone(entry.key_metadata());
            let Some(mut locked_key) = key_metadata.try_lock() else {
                cursor = self.remove_slot(cursor);
                continue;
            };

            if entry.size() == 0 {
                cursor = self.remove_slot(cursor);
                continue;
            }

            let Some(segment) = locked_key.get_by_offset(entry.offset()) else {
                cursor = self.remove_slot(cursor);
                continue;
            };

            if segment.size() != entry.size() {
                return Err(CacheError::SizeMismatch {
                    key: entry.key(),
                    offset: entry.offset(),
                    entry_size: entry.size(),
                    metadata_size: segment.size(),
                });
            }

            match func(&mut locked_key, &segment) {
                IterationResult::Break => return Ok(()),
                IterationResult::Continue => cursor = next,
                IterationResult::RemoveAndContinue => cursor = self.remove_slot(cursor),
            }
        }
        Ok(())
    }

    /// Whether `size` bytes and `elements` entries fit under the limits
    ///
    /// `released_size` / `released_elements` are assumed releasable amounts
    /// subtracted from current usage before the comparison. The optional
    /// out-flags are OR-ed with whichever limit turned out to be binding.
    #[allow(clippy::too_many_arguments)]
    pub fn can_fit(
        &self,
        size: u64,
        elements: u64,
        released_size: u64,
        released_elements: u64,
        reached_size_limit: Option<&mut bool>,
        reached_elements_limit: Option<&mut bool>,
        _lock: &PriorityLock<'_>,
    ) -> bool {
        let size_satisfied = limit_satisfied(
            self.max_size,
            self.state.current_size(),
            size,
            released_size,
        );
        let elements_satisfied = limit_satisfied(
            self.max_elements,
            self.state.current_elements_num(),
            elements,
            released_elements,
        );

        if let Some(flag) = reached_size_limit {
            *flag |= !size_satisfied;
        }
        if let Some(flag) = reached_elements_limit {
            *flag |= !elements_satisfied;
        }

        size_satisfied && elements_satisfied
    }

    /// Collect eviction candidates until `size` bytes and one element fit
    ///
    /// Returns `true` when the request already fits or enough releasable
    /// segments were registered into `candidates` to make it fit after
    /// their eviction. `stat` accounts every visited segment either way.
    pub fn collect_candidates_for_reserve(
        &mut self,
        size: u64,
        stat: &mut ReserveStat,
        candidates: &mut EvictionCandidates,
        reached_size_limit: &mut bool,
        reached_elements_limit: &mut bool,
        lock: &PriorityLock<'_>,
    ) -> Result<bool> {
        metrics::record_eviction_try();

        if self.can_fit(
            size,
            1,
            0,
            0,
            Some(reached_size_limit),
            Some(reached_elements_limit),
            lock,
        ) {
            return Ok(true);
        }

        let state = Arc::clone(&self.state);
        let (max_size, max_elements) = (self.max_size, self.max_elements);
        let request_fits = move |stat: &ReserveStat| {
            limit_satisfied(max_size, state.current_size(), size, stat.releasable_size)
                && limit_satisfied(
                    max_elements,
                    state.current_elements_num(),
                    1,
                    stat.releasable_count,
                )
        };

        self.iterate_for_eviction(candidates, stat, |_, stat| request_fits(stat), lock)?;
        Ok(request_fits(stat))
    }

    /// Collect candidates shrinking the queue toward the desired totals
    ///
    /// Background-trimming variant: registers at most `max_candidates`
    /// releasable segments, stopping early once evicting everything
    /// collected so far would bring usage within `desired_size` and
    /// `desired_elements`.
    pub fn collect_candidates_for_trim(
        &mut self,
        desired_size: u64,
        desired_elements: u64,
        max_candidates: usize,
        stat: &mut ReserveStat,
        candidates: &mut EvictionCandidates,
        lock: &PriorityLock<'_>,
    ) -> Result<()> {
        metrics::record_eviction_try();

        if max_candidates == 0 {
            return Ok(());
        }

        let state = Arc::clone(&self.state);
        let stop_condition = move |candidates: &EvictionCandidates, stat: &ReserveStat| {
            let size_met =
                state.current_size().saturating_sub(stat.releasable_size) <= desired_size;
            let elements_met = state
                .current_elements_num()
                .saturating_sub(stat.releasable_count)
                <= desired_elements;
            (size_met && elements_met) || candidates.size() >= max_candidates
        };

        self.iterate_for_eviction(candidates, stat, stop_condition, lock)
    }

    fn iterate_for_eviction<F>(
        &mut self,
        candidates: &mut EvictionCandidates,
        stat: &mut ReserveStat,
        stop_condition: F,
        lock: &PriorityLock<'_>,
    ) -> Result<()>
    where
        F: Fn(&EvictionCandidates, &ReserveStat) -> bool,
    {
        let mut add_error = None;
        self.iterate(
            |locked_key, segment| {
                if stop_condition(candidates, stat) {
                    return IterationResult::Break;
                }

                if segment.releasable() {
                    if let Err(e) = candidates.add(segment, locked_key, lock) {
                        add_error = Some(e);
                        return IterationResult::Break;
                    }
                    stat.update(segment.size(), true);
                } else {
                    metrics::record_skipped_segment();
                    stat.update(segment.size(), false);
                }
                IterationResult::Continue
            },
            lock,
        )?;

        match add_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Change the queue limits
    ///
    /// No-op when the limits are unchanged. Fails with a logic error when
    /// current usage already exceeds the requested limits; the caller is
    /// responsible for running an eviction pass first.
    pub fn modify_size_limits(
        &mut self,
        new_max_size: u64,
        new_max_elements: u64,
        _lock: &PriorityLock<'_>,
    ) -> Result<()> {
        if self.max_size == new_max_size && self.max_elements == new_max_elements {
            return Ok(());
        }

        let current_size = self.state.current_size();
        let current_elements = self.state.current_elements_num();
        let size_exceeded = new_max_size > 0 && current_size > new_max_size;
        let elements_exceeded = new_max_elements > 0 && current_elements > new_max_elements;
        if size_exceeded || elements_exceeded {
            return Err(CacheError::CannotShrinkLimits {
                new_max_size,
                new_max_elements,
                current_size,
                max_size: self.max_size,
                current_elements,
                max_elements: self.max_elements,
            });
        }

        self.max_size = new_max_size;
        self.max_elements = new_max_elements;
        Ok(())
    }

    /// Reserve `size` bytes and `elements` entries without a concrete entry
    ///
    /// Accounts space held during an in-flight download. Fails when the
    /// reservation does not fit; `release` trusts the caller's bookkeeping.
    pub fn hold(&mut self, size: u64, elements: u64, lock: &PriorityLock<'_>) -> Result<()> {
        if !self.can_fit(size, elements, 0, 0, None, None, lock) {
            return Err(CacheError::CannotHoldSpace {
                size,
                elements,
                current_size: self.state.current_size(),
                max_size: self.max_size,
                current_elements: self.state.current_elements_num(),
                max_elements: self.max_elements,
            });
        }
        if size > 0 {
            self.state.update_size(size as i64);
        }
        if elements > 0 {
            self.state.update_elements_count(elements as i64);
        }
        Ok(())
    }

    /// Return space previously taken with [`hold`](Self::hold)
    pub fn release(&mut self, size: u64, elements: u64, _lock: &PriorityLock<'_>) {
        if size > 0 {
            self.state.update_size(-(size as i64));
        }
        if elements > 0 {
            self.state.update_elements_count(-(elements as i64));
        }
    }

    /// [`hold`](Self::hold) wrapped into a guard that releases on drop
    pub fn hold_space(
        &mut self,
        size: u64,
        elements: u64,
        guard: &Arc<CachePriorityGuard>,
        lock: &PriorityLock<'_>,
    ) -> Result<HoldSpace> {
        self.hold(size, elements, lock)?;
        Ok(HoldSpace::new(
            Arc::clone(guard),
            Arc::clone(&self.state),
            size,
            elements,
        ))
    }

    /// Point-in-time snapshot of the queue, least-recently-used first
    ///
    /// Runs a full sweep, so stale entries are reaped as a side effect.
    pub fn dump(&mut self, lock: &PriorityLock<'_>) -> Result<Vec<FileSegmentInfo>> {
        let mut infos = Vec::new();
        self.iterate(
            |_locked_key, segment| {
                let hits = segment
                    .queue_iterator()
                    .map(|it| it.entry().hits())
                    .unwrap_or(0);
                infos.push(FileSegmentInfo {
                    key: segment.segment().key(),
                    offset: segment.offset(),
                    size: segment.size(),
                    hits,
                });
                IterationResult::Continue
            },
            lock,
        )?;
        Ok(infos)
    }

    /// Deterministically permute the queue order; stress-test helper
    pub fn shuffle(&mut self, seed: u64, _lock: &PriorityLock<'_>) {
        let mut slots = self.linked_slots();
        let mut rng = StdRng::seed_from_u64(seed);
        slots.shuffle(&mut rng);
        for slot in slots {
            self.unlink(slot);
            self.link_before_tail(slot);
        }
    }

    fn linked_slots(&self) -> Vec<usize> {
        let mut slots = Vec::new();
        let mut cursor = self.nodes[HEAD].next;
        while cursor != TAIL {
            slots.push(cursor);
            cursor = self.nodes[cursor].next;
        }
        slots
    }

    fn contains_live(&self, key: CacheKey, offset: u64) -> bool {
        self.linked_slots().into_iter().any(|idx| {
            self.nodes[idx]
                .entry
                .as_ref()
                .is_some_and(|e| e.size() > 0 && e.key() == key && e.offset() == offset)
        })
    }

    fn check_iterator(&self, iterator: &LruIterator) -> Result<()> {
        if iterator.is_detached() {
            return Err(CacheError::InvalidIterator);
        }
        if iterator.queue_id != self.queue_id {
            return Err(CacheError::IteratorQueueMismatch);
        }
        let stale = iterator.slot >= self.nodes.len()
            || self.nodes[iterator.slot].generation != iterator.generation
            || self.nodes[iterator.slot].entry.is_none();
        if stale {
            return Err(CacheError::InvalidIterator);
        }
        Ok(())
    }

    /// Unlink `slot`, update counters for live entries, return the successor.
    fn remove_slot(&mut self, slot: usize) -> usize {
        let next = self.nodes[slot].next;
        let entry = self.nodes[slot]
            .entry
            .as_ref()
            .expect("linked queue slot must hold an entry");
        let (key, offset, size) = (entry.key(), entry.offset(), entry.size());

        // If size is 0 the entry was invalidated and counters were already
        // given back at invalidation time.
        if size > 0 {
            self.state.update_size(-(size as i64));
            self.state.update_elements_count(-1);
        }
        if let Some(entry) = &self.nodes[slot].entry {
            entry.take_size();
        }

        trace!(%key, offset, size, "Removed entry from LRU queue");

        self.unlink(slot);
        self.free_slot(slot);
        next
    }

    fn alloc_slot(&mut self, entry: Arc<Entry>) -> usize {
        self.next_generation += 1;
        let generation = self.next_generation;
        if let Some(idx) = self.free_list.pop() {
            self.nodes[idx].entry = Some(entry);
            self.nodes[idx].generation = generation;
            self.nodes[idx].prev = NULL;
            self.nodes[idx].next = NULL;
            idx
        } else {
            let idx = self.nodes.len();
            self.nodes.push(Slot {
                entry: Some(entry),
                generation,
                prev: NULL,
                next: NULL,
            });
            idx
        }
    }

    fn free_slot(&mut self, idx: usize) {
        self.nodes[idx].entry = None;
        self.free_list.push(idx);
    }

    /// Links `idx` immediately before the TAIL sentinel (most-recently-used).
    fn link_before_tail(&mut self, idx: usize) {
        let old_last = self.nodes[TAIL].prev;
        self.nodes[idx].prev = old_last;
        self.nodes[idx].next = TAIL;
        self.nodes[old_last].next = idx;
        self.nodes[TAIL].prev = idx;
    }

    /// Detaches `idx` from its current position in the list.
    fn unlink(&mut self, idx: usize) {
        let prev = self.nodes[idx].prev;
        let next = self.nodes[idx].next;
        self.nodes[prev].next = next;
        self.nodes[next].prev = prev;
        self.nodes[idx].prev = NULL;
        self.nodes[idx].next = NULL;
    }
}

fn limit_satisfied(limit: u64, current: u64, added: u64, released: u64) -> bool {
    limit == 0 || (current + added).saturating_sub(released) <= limit
}

/// Stable handle to one entry of an [`LruPriorityQueue`]
///
/// Copies alias the same position. The handle stays valid across unrelated
/// insertions and removals; its validity is bounded by `remove` — a detached
/// handle fails every mutating operation with a logic error, and a handle
/// whose slot was reused is detected through the slot generation.
#[derive(Clone)]
pub struct LruIterator {
    queue_id: u64,
    slot: usize,
    generation: u64,
    entry: Arc<Entry>,
    state: Arc<QueueState>,
}

impl LruIterator {
    /// The entry this handle points at
    pub fn entry(&self) -> &Arc<Entry> {
        &self.entry
    }

    /// Whether the handle was detached by `remove` or `move_entry`
    pub fn is_detached(&self) -> bool {
        self.slot == DETACHED
    }

    /// Logically remove the entry, leaving the link for the next sweep
    ///
    /// Zeroes the size and gives both counters back immediately; the node
    /// stays linked until an iteration visit reaps it. Invalidating an
    /// already invalidated entry is a no-op.
    pub fn invalidate(&self, _lock: &PriorityLock<'_>) -> Result<()> {
        if self.is_detached() {
            return Err(CacheError::InvalidIterator);
        }

        let previous_size = self.entry.take_size();
        if previous_size == 0 {
            return Ok(());
        }

        self.state.update_size(-(previous_size as i64));
        self.state.update_elements_count(-1);

        trace!(
            key = %self.entry.key(),
            offset = self.entry.offset(),
            previous_size,
            "Invalidated entry in LRU queue"
        );
        Ok(())
    }

    /// Grow the entry and the queue accounting by `size` bytes
    ///
    /// Used while an in-flight download appends bytes to the segment; the
    /// caller reserved the space beforehand.
    pub fn increment_size(&self, size: u64, _lock: &PriorityLock<'_>) -> Result<()> {
        if self.is_detached() {
            return Err(CacheError::InvalidIterator);
        }
        if size == 0 {
            return Ok(());
        }
        self.state.update_size(size as i64);
        self.entry.add_size(size);
        trace!(
            key = %self.entry.key(),
            offset = self.entry.offset(),
            size,
            "Incremented entry size in LRU queue"
        );
        Ok(())
    }

    /// Shrink the entry and the queue accounting by `size` bytes
    pub fn decrement_size(&self, size: u64, _lock: &PriorityLock<'_>) -> Result<()> {
        if self.is_detached() {
            return Err(CacheError::InvalidIterator);
        }
        if size == 0 {
            return Ok(());
        }
        debug_assert!(self.entry.size() >= size);
        self.state.update_size(-(size as i64));
        self.entry.sub_size(size);
        trace!(
            key = %self.entry.key(),
            offset = self.entry.offset(),
            size,
            "Decremented entry size in LRU queue"
        );
        Ok(())
    }

    fn detach(&mut self) {
        self.slot = DETACHED;
    }
}

impl PartialEq for LruIterator {
    fn eq(&self, other: &Self) -> bool {
        self.queue_id == other.queue_id
            && self.slot == other.slot
            && self.generation == other.generation
    }
}

impl Eq for LruIterator {}

impl std::fmt::Debug for LruIterator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LruIterator")
            .field("queue_id", &self.queue_id)
            .field("slot", &self.slot)
            .field("generation", &self.generation)
            .field("key", &self.entry.key())
            .field("offset", &self.entry.offset())
            .finish()
    }
}
