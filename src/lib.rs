//! filecache - Filesystem cache priority and eviction engine
//!
//! This library bounds the disk space consumed by locally cached fragments
//! of remote objects (S3, HDFS-like stores). It provides:
//! - A strict LRU priority queue with recency promotion on every access
//! - Global invariants: total bytes and total elements never exceed limits
//! - A multi-phase eviction protocol safe under concurrent reservations,
//!   in-flight downloads and dynamic limit changes
//! - Automatic rollback of abandoned reservations
//!
//! All lifetime transitions of segment queue entries are mediated through a
//! single priority lock; see the [`priority`] module for the protocol.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod metadata;
pub mod metrics;
pub mod priority;
pub mod types;

// Re-export main types
pub use config::CacheConfig;
pub use error::{CacheError, Result};
pub use priority::{
    CachePriorityGuard, EvictionCandidates, IterationResult, LruIterator, LruPriorityQueue,
    PriorityLock, QueueState, ReserveStat,
};
pub use types::{CacheKey, FileSegmentInfo};
