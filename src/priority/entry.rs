//! Queue entry metadata
//!
//! An [`Entry`] represents one cached byte range inside the priority queue.
//! Identity is the immutable `(key, offset)` pair; size, the hit counter and
//! the evicting flag are mutable under the priority lock. The fields are
//! atomics so telemetry and assertions may read them racily; such reads are
//! advisory.

use crate::metadata::KeyMetadata;
use crate::priority::PriorityLock;
use crate::types::CacheKey;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// One node of the priority queue, describing a cached byte range
///
/// `size == 0` means the entry was invalidated: it is logically removed but
/// stays linked until the next iteration sweep reaps it.
#[derive(Debug)]
pub struct Entry {
    key: CacheKey,
    offset: u64,
    size: AtomicU64,
    hits: AtomicU64,
    is_evicting: AtomicBool,
    key_metadata: Arc<KeyMetadata>,
}

impl Entry {
    pub(crate) fn new(key: CacheKey, offset: u64, size: u64, key_metadata: Arc<KeyMetadata>) -> Self {
        Self {
            key,
            offset,
            size: AtomicU64::new(size),
            hits: AtomicU64::new(0),
            is_evicting: AtomicBool::new(false),
            key_metadata,
        }
    }

    /// Key of the owning cached object
    pub fn key(&self) -> CacheKey {
        self.key
    }

    /// Byte offset of the segment within the object
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Current size in bytes; 0 means the entry was invalidated
    pub fn size(&self) -> u64 {
        self.size.load(Ordering::Relaxed)
    }

    /// Number of priority promotions the entry has received
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Whether the entry is enrolled in an in-flight eviction batch
    pub fn is_evicting(&self) -> bool {
        self.is_evicting.load(Ordering::Relaxed)
    }

    /// Metadata record of the owning key
    pub fn key_metadata(&self) -> &Arc<KeyMetadata> {
        &self.key_metadata
    }

    pub(crate) fn set_evicting(&self, evicting: bool, _lock: &PriorityLock<'_>) {
        self.is_evicting.store(evicting, Ordering::Relaxed);
    }

    /// Zero the size, returning the previous value
    pub(crate) fn take_size(&self) -> u64 {
        self.size.swap(0, Ordering::Relaxed)
    }

    pub(crate) fn add_size(&self, delta: u64) {
        self.size.fetch_add(delta, Ordering::Relaxed);
    }

    pub(crate) fn sub_size(&self, delta: u64) {
        debug_assert!(self.size() >= delta);
        self.size.fetch_sub(delta, Ordering::Relaxed);
    }

    pub(crate) fn increment_hits(&self) -> u64 {
        self.hits.fetch_add(1, Ordering::Relaxed) + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::priority::CachePriorityGuard;

    #[test]
    fn test_entry_identity_and_counters() {
        let metadata = KeyMetadata::new(CacheKey::new(1));
        let entry = Entry::new(CacheKey::new(1), 64, 512, metadata);

        assert_eq!(entry.key(), CacheKey::new(1));
        assert_eq!(entry.offset(), 64);
        assert_eq!(entry.size(), 512);
        assert_eq!(entry.hits(), 0);
        assert!(!entry.is_evicting());

        assert_eq!(entry.increment_hits(), 1);
        assert_eq!(entry.increment_hits(), 2);
    }

    #[test]
    fn test_entry_evicting_flag_roundtrip() {
        let guard = CachePriorityGuard::new();
        let lock = guard.lock();

        let metadata = KeyMetadata::new(CacheKey::new(2));
        let entry = Entry::new(CacheKey::new(2), 0, 10, metadata);

        entry.set_evicting(true, &lock);
        assert!(entry.is_evicting());
        entry.set_evicting(false, &lock);
        assert!(!entry.is_evicting());
    }

    #[test]
    fn test_take_size_invalidates_once() {
        let metadata = KeyMetadata::new(CacheKey::new(3));
        let entry = Entry::new(CacheKey::new(3), 0, 30, metadata);

        assert_eq!(entry.take_size(), 30);
        assert_eq!(entry.size(), 0);
        assert_eq!(entry.take_size(), 0);
    }
}
