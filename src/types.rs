//! Core data types used throughout the cache engine
//!
//! This module defines the fundamental data structures shared across the
//! crate:
//!
//! # Key Types
//!
//! - **`CacheKey`**: Opaque fixed-width identifier for a cached remote object
//! - **`FileSegmentInfo`**: Point-in-time snapshot of one queue entry, used
//!   by the priority-dump interface
//!
//! # Example
//!
//! ```rust
//! use filecache::types::CacheKey;
//!
//! let key = CacheKey::new(0xabc123);
//! assert_eq!(format!("{}", key), "abc123");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque fixed-width cache key identifying one cached remote object
///
/// A 128-bit value, typically a hash of the remote object path. The engine
/// never interprets the key; it only uses it for identity and bucketing.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey(u128);

impl CacheKey {
    /// Create a cache key from a raw 128-bit value
    pub fn new(raw: u128) -> Self {
        Self(raw)
    }

    /// Raw 128-bit value of the key
    pub fn raw(&self) -> u128 {
        self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

impl fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CacheKey({:x})", self.0)
    }
}

impl From<u128> for CacheKey {
    fn from(raw: u128) -> Self {
        Self(raw)
    }
}

/// Snapshot of a single priority-queue entry
///
/// Returned by the priority-dump interface as an ordered sequence
/// (least-recently-used first) for introspection and diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileSegmentInfo {
    /// Key of the owning cached object
    pub key: CacheKey,

    /// Byte offset of the segment within the object
    pub offset: u64,

    /// Current on-disk size of the segment in bytes
    pub size: u64,

    /// Number of priority promotions the entry has received
    pub hits: u64,
}
