//! Metrics and telemetry for the cache engine
//!
//! This module provides Prometheus metrics for monitoring eviction pressure,
//! reservation outcomes, and the bytes/elements accounted by the priority
//! queues. The gauges mirror the shared queue counters; their values are
//! advisory outside the priority lock.

use lazy_static::lazy_static;
use prometheus::{register_int_counter, register_int_gauge, Encoder, IntCounter, IntGauge, TextEncoder};

lazy_static! {
    // === Eviction Counters ===

    /// Candidate-collection attempts
    pub static ref EVICTION_TRIES: IntCounter = register_int_counter!(
        "filecache_eviction_tries_total",
        "Total eviction candidate-collection attempts"
    ).unwrap();

    /// Non-releasable segments passed over during candidate collection
    pub static ref SKIPPED_FILE_SEGMENTS: IntCounter = register_int_counter!(
        "filecache_eviction_skipped_segments_total",
        "Segments visited but not releasable during candidate collection"
    ).unwrap();

    /// Entries skipped because an in-flight eviction batch claimed them
    pub static ref SKIPPED_EVICTING_FILE_SEGMENTS: IntCounter = register_int_counter!(
        "filecache_eviction_skipped_evicting_segments_total",
        "Queue entries skipped because they are already marked evicting"
    ).unwrap();

    /// Bytes released by finalized evictions
    pub static ref EVICTED_BYTES: IntCounter = register_int_counter!(
        "filecache_evicted_bytes_total",
        "Total bytes released by finalized evictions"
    ).unwrap();

    /// Segments released by finalized evictions
    pub static ref EVICTED_FILE_SEGMENTS: IntCounter = register_int_counter!(
        "filecache_evicted_segments_total",
        "Total file segments released by finalized evictions"
    ).unwrap();

    /// Wall-clock spent deleting candidate files from disk
    pub static ref EVICT_MICROSECONDS: IntCounter = register_int_counter!(
        "filecache_evict_duration_microseconds_total",
        "Total wall-clock microseconds spent in the evict phase"
    ).unwrap();

    // === Resource Gauges ===

    /// Bytes currently accounted by the priority queues
    pub static ref CACHE_SIZE_BYTES: IntGauge = register_int_gauge!(
        "filecache_size_bytes",
        "Bytes currently accounted by the cache priority queues"
    ).unwrap();

    /// Entries currently accounted by the priority queues
    pub static ref CACHE_ELEMENTS: IntGauge = register_int_gauge!(
        "filecache_elements",
        "Entries currently accounted by the cache priority queues"
    ).unwrap();
}

/// Get metrics in Prometheus text format
///
/// # Returns
///
/// Result containing the formatted metrics string, or an error if encoding
/// fails
pub fn gather_metrics() -> Result<String, String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = vec![];

    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| format!("Failed to encode metrics: {}", e))?;

    String::from_utf8(buffer).map_err(|e| format!("Metrics contain invalid UTF-8: {}", e))
}

/// Record one candidate-collection attempt
#[inline]
pub fn record_eviction_try() {
    EVICTION_TRIES.inc();
}

/// Record one non-releasable segment passed over
#[inline]
pub fn record_skipped_segment() {
    SKIPPED_FILE_SEGMENTS.inc();
}

/// Record one entry skipped because it is already marked evicting
#[inline]
pub fn record_skipped_evicting_segment() {
    SKIPPED_EVICTING_FILE_SEGMENTS.inc();
}

/// Record a finalized eviction batch
#[inline]
pub fn record_evicted(bytes: u64, segments: u64) {
    EVICTED_BYTES.inc_by(bytes);
    EVICTED_FILE_SEGMENTS.inc_by(segments);
}

/// Record wall-clock spent in the evict phase
#[inline]
pub fn record_evict_duration(micros: u64) {
    EVICT_MICROSECONDS.inc_by(micros);
}

/// Track a change of the accounted cache size
#[inline]
pub fn add_cache_size(delta: i64) {
    CACHE_SIZE_BYTES.add(delta);
}

/// Track a change of the accounted element count
#[inline]
pub fn add_cache_elements(delta: i64) {
    CACHE_ELEMENTS.add(delta);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_eviction_counters() {
        record_eviction_try();
        record_skipped_segment();
        record_skipped_evicting_segment();
        record_evicted(128, 2);
        record_evict_duration(50);

        let metrics = gather_metrics().expect("Failed to gather metrics");
        assert!(metrics.contains("filecache_eviction_tries_total"));
        assert!(metrics.contains("filecache_evicted_bytes_total"));
        assert!(metrics.contains("filecache_evict_duration_microseconds_total"));
    }

    #[test]
    fn test_gauges_track_deltas() {
        add_cache_size(512);
        add_cache_elements(3);
        add_cache_size(-512);
        add_cache_elements(-3);

        let metrics = gather_metrics().expect("Failed to gather metrics");
        assert!(metrics.contains("filecache_size_bytes"));
        assert!(metrics.contains("filecache_elements"));
    }
}
