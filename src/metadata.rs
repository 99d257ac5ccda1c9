//! Per-key segment metadata driven by the priority engine
//!
//! The cache keeps one [`KeyMetadata`] record per cached remote object. The
//! record owns the map from byte offset to [`FileSegmentMetadata`] and the
//! per-key lock guarding it. The priority engine only ever observes segments
//! through these handles:
//!
//! - during iteration it acquires the per-key lock non-blockingly and looks
//!   segments up by offset,
//! - during eviction it acts as the authoritative deleter, removing the
//!   segment from the map and its data file from disk.
//!
//! # Locking
//!
//! The per-key lock sits strictly below the priority lock. Iteration uses
//! `try_lock` so a key transiently locked elsewhere never deadlocks the
//! sweep; such entries look identical to stale ones and are reaped, which is
//! acceptable because a subsequent access re-inserts them.

use crate::error::{CacheError, Result};
use crate::priority::LruIterator;
use crate::types::CacheKey;
use parking_lot::{Mutex, MutexGuard};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::trace;

/// One materialized byte range of a cached remote object
///
/// The segment's bytes live in the file at `path`; the priority queue tracks
/// it through the back-link installed with [`Self::set_queue_entry`].
#[derive(Debug)]
pub struct FileSegment {
    key: CacheKey,
    offset: u64,
    size: AtomicU64,
    path: PathBuf,
    pins: AtomicUsize,
    queue_entry: Mutex<Option<LruIterator>>,
}

impl FileSegment {
    /// Create a segment descriptor for bytes materialized at `path`
    pub fn new(key: CacheKey, offset: u64, size: u64, path: PathBuf) -> Arc<Self> {
        Arc::new(Self {
            key,
            offset,
            size: AtomicU64::new(size),
            path,
            pins: AtomicUsize::new(0),
            queue_entry: Mutex::new(None),
        })
    }

    /// Key of the owning cached object
    pub fn key(&self) -> CacheKey {
        self.key
    }

    /// Byte offset of the segment within the object
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Current on-disk size in bytes
    pub fn size(&self) -> u64 {
        self.size.load(Ordering::Relaxed)
    }

    /// Path of the local data file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Update the recorded size as downloaded bytes land on disk
    ///
    /// The caller must keep the paired queue entry in sync through
    /// [`LruIterator::increment_size`] / [`LruIterator::decrement_size`]
    /// under the priority lock, or the next sweep fails the accounting
    /// check.
    pub fn set_downloaded_size(&self, size: u64) {
        self.size.store(size, Ordering::Relaxed);
    }

    /// Mark the segment as referenced by a consumer
    pub fn pin(&self) {
        self.pins.fetch_add(1, Ordering::Relaxed);
    }

    /// Drop one consumer reference
    pub fn unpin(&self) {
        let previous = self.pins.fetch_sub(1, Ordering::Relaxed);
        debug_assert!(previous > 0);
    }

    /// Number of consumers currently referencing the segment
    pub fn pin_count(&self) -> usize {
        self.pins.load(Ordering::Relaxed)
    }

    /// Install the priority-queue back-link for this segment
    pub fn set_queue_entry(&self, iterator: LruIterator) {
        *self.queue_entry.lock() = Some(iterator);
    }

    /// Clear the priority-queue back-link
    pub fn reset_queue_entry(&self) {
        *self.queue_entry.lock() = None;
    }

    /// Current priority-queue handle, if the segment is linked
    pub fn queue_entry(&self) -> Option<LruIterator> {
        self.queue_entry.lock().clone()
    }
}

/// Metadata wrapper the priority engine observes during iteration
#[derive(Debug, Clone)]
pub struct FileSegmentMetadata {
    file_segment: Arc<FileSegment>,
}

impl FileSegmentMetadata {
    /// Wrap a segment for registration in a key's metadata map
    pub fn new(file_segment: Arc<FileSegment>) -> Arc<Self> {
        Arc::new(Self { file_segment })
    }

    /// The underlying segment
    pub fn segment(&self) -> &Arc<FileSegment> {
        &self.file_segment
    }

    /// Byte offset of the segment within the object
    pub fn offset(&self) -> u64 {
        self.file_segment.offset()
    }

    /// Size in bytes reported by the segment
    pub fn size(&self) -> u64 {
        self.file_segment.size()
    }

    /// Whether no consumer currently references the segment
    ///
    /// Only releasable segments may be enrolled as eviction candidates.
    pub fn releasable(&self) -> bool {
        self.file_segment.pin_count() == 0
    }

    /// Priority-queue handle of the segment, if linked
    pub fn queue_iterator(&self) -> Option<LruIterator> {
        self.file_segment.queue_entry()
    }
}

/// Per-key metadata record: the offset-indexed segment map and its lock
#[derive(Debug)]
pub struct KeyMetadata {
    key: CacheKey,
    segments: Mutex<BTreeMap<u64, Arc<FileSegmentMetadata>>>,
}

impl KeyMetadata {
    /// Create an empty metadata record for `key`
    pub fn new(key: CacheKey) -> Arc<Self> {
        Arc::new(Self {
            key,
            segments: Mutex::new(BTreeMap::new()),
        })
    }

    /// Key this record describes
    pub fn key(&self) -> CacheKey {
        self.key
    }

    /// Acquire the per-key lock without blocking
    ///
    /// Returns `None` when the key is locked elsewhere; iteration treats
    /// such keys as stale.
    pub fn try_lock(self: &Arc<Self>) -> Option<LockedKey<'_>> {
        let guard = self.segments.try_lock()?;
        Some(LockedKey {
            metadata: Arc::clone(self),
            guard,
        })
    }

    /// Acquire the per-key lock, blocking until available
    ///
    /// Only valid while the priority lock is *not* held (lock hierarchy).
    pub fn lock(self: &Arc<Self>) -> LockedKey<'_> {
        LockedKey {
            metadata: Arc::clone(self),
            guard: self.segments.lock(),
        }
    }
}

/// Exclusive view of one key's segment map
pub struct LockedKey<'a> {
    metadata: Arc<KeyMetadata>,
    guard: MutexGuard<'a, BTreeMap<u64, Arc<FileSegmentMetadata>>>,
}

impl LockedKey<'_> {
    /// Key this view belongs to
    pub fn key(&self) -> CacheKey {
        self.metadata.key
    }

    /// The underlying metadata record
    pub fn metadata(&self) -> &Arc<KeyMetadata> {
        &self.metadata
    }

    /// Number of segments registered for the key
    pub fn segment_count(&self) -> usize {
        self.guard.len()
    }

    /// Look up the segment starting at `offset`
    pub fn get_by_offset(&self, offset: u64) -> Option<Arc<FileSegmentMetadata>> {
        self.guard.get(&offset).cloned()
    }

    /// Register a segment in the map
    pub fn add_segment(&mut self, segment: Arc<FileSegment>) -> Result<Arc<FileSegmentMetadata>> {
        let offset = segment.offset();
        if self.guard.contains_key(&offset) {
            return Err(CacheError::SegmentExists {
                key: self.key(),
                offset,
            });
        }
        let metadata = FileSegmentMetadata::new(segment);
        self.guard.insert(offset, Arc::clone(&metadata));
        Ok(metadata)
    }

    /// Remove the segment at `offset` from the map and delete its data file
    ///
    /// Acts as the authoritative deleter: the bytes on disk are released
    /// here. Removing an absent segment is a no-op returning `Ok(0)`.
    pub fn remove_segment(&mut self, offset: u64) -> Result<u64> {
        let Some(metadata) = self.guard.remove(&offset) else {
            return Ok(0);
        };

        let size = metadata.size();
        let path = metadata.segment().path();
        match std::fs::remove_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        metadata.segment().reset_queue_entry();

        trace!(
            key = %self.key(),
            offset,
            size,
            "Removed file segment from key metadata"
        );
        Ok(size)
    }
}
