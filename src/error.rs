//! Error types for the cache engine

use crate::types::CacheKey;
use thiserror::Error;

/// Main error type for the cache engine
///
/// Logic errors signal a caller or collaborator bug (duplicate insertion,
/// over-commit, accounting mismatch). They are not expected to be recovered
/// from; higher layers log them and fail the enclosing request. Transient
/// per-entry conditions are never surfaced as errors and are only observable
/// through telemetry counters.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Zero-size entries are never admitted into the priority queue
    #[error("Cannot add zero-size entry to LRU queue (key: {key}, offset: {offset})")]
    ZeroSizeEntry {
        /// Key of the rejected entry
        key: CacheKey,
        /// Offset of the rejected entry
        offset: u64,
    },

    /// A live entry with the same (key, offset) pair is already present
    #[error("Attempt to add duplicate queue entry (key: {key}, offset: {offset}, size: {size})")]
    DuplicateEntry {
        /// Key of the rejected entry
        key: CacheKey,
        /// Offset of the rejected entry
        offset: u64,
        /// Size of the rejected entry
        size: u64,
    },

    /// Admitting the entry would push the queue past its size limit
    #[error(
        "Not enough space to add {key}:{offset} with size {size}: \
         current size: {current_size}/{max_size}"
    )]
    NotEnoughSpace {
        /// Key of the rejected entry
        key: CacheKey,
        /// Offset of the rejected entry
        offset: u64,
        /// Size of the rejected entry
        size: u64,
        /// Queue size at the time of the attempt
        current_size: u64,
        /// Configured size limit
        max_size: u64,
    },

    /// Queue accounting and segment metadata disagree about a segment size
    #[error(
        "Mismatch of file segment size in segment metadata and priority queue: \
         {entry_size} != {metadata_size} (key: {key}, offset: {offset})"
    )]
    SizeMismatch {
        /// Key of the inconsistent entry
        key: CacheKey,
        /// Offset of the inconsistent entry
        offset: u64,
        /// Size recorded in the priority queue
        entry_size: u64,
        /// Size reported by the segment metadata
        metadata_size: u64,
    },

    /// The iterator was detached by `remove` or refers to a reused slot
    #[error("Attempt to use an invalid queue iterator")]
    InvalidIterator,

    /// The iterator was created by a different queue instance
    #[error("Queue iterator belongs to a different priority queue")]
    IteratorQueueMismatch,

    /// New limits are below current usage; run an eviction pass first
    #[error(
        "Cannot modify size limits to {new_max_size} in size and to {new_max_elements} \
         in elements: not enough space released. Current size: {current_size}/{max_size}, \
         current elements: {current_elements}/{max_elements}"
    )]
    CannotShrinkLimits {
        /// Requested size limit
        new_max_size: u64,
        /// Requested elements limit
        new_max_elements: u64,
        /// Queue size at the time of the attempt
        current_size: u64,
        /// Size limit at the time of the attempt
        max_size: u64,
        /// Element count at the time of the attempt
        current_elements: u64,
        /// Elements limit at the time of the attempt
        max_elements: u64,
    },

    /// A hold request does not fit within the queue limits
    #[error(
        "Cannot take space of {size} in size and {elements} in elements: \
         current state {current_size}/{max_size} in size, \
         {current_elements}/{max_elements} in elements"
    )]
    CannotHoldSpace {
        /// Requested bytes
        size: u64,
        /// Requested elements
        elements: u64,
        /// Queue size at the time of the attempt
        current_size: u64,
        /// Configured size limit
        max_size: u64,
        /// Element count at the time of the attempt
        current_elements: u64,
        /// Configured elements limit
        max_elements: u64,
    },

    /// A segment offered for eviction is not linked into any priority queue
    #[error("File segment has no queue entry (key: {key}, offset: {offset})")]
    MissingQueueEntry {
        /// Key of the segment
        key: CacheKey,
        /// Offset of the segment
        offset: u64,
    },

    /// A segment already exists at the given offset of the key
    #[error("Segment already registered at offset {offset} (key: {key})")]
    SegmentExists {
        /// Key of the segment
        key: CacheKey,
        /// Offset of the segment
        offset: u64,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, CacheError>;
