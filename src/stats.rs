//! Stream statistics for the current session.
//!
//! Counters reset with the process; nothing is persisted. The rates are
//! computed over the session lifetime, which is what the periodic display
//! shows alongside the device count.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Session counters for the dynamb stream and twin resolution.
#[derive(Debug)]
pub struct StreamStats {
    /// Number of dynamb events processed
    dynamb_events: AtomicU64,
    /// Number of distinct devices seen
    devices_seen: AtomicU64,
    /// Number of digital twins successfully resolved
    twins_resolved: AtomicU64,
    /// Number of samples evicted as stale
    samples_evicted: AtomicU64,
    /// Session start time
    session_start: DateTime<Utc>,
}

impl StreamStats {
    /// Create a new stats tracker.
    pub fn new() -> Self {
        Self {
            dynamb_events: AtomicU64::new(0),
            devices_seen: AtomicU64::new(0),
            twins_resolved: AtomicU64::new(0),
            samples_evicted: AtomicU64::new(0),
            session_start: Utc::now(),
        }
    }

    /// Record a processed dynamb event.
    pub fn record_dynamb_event(&self) {
        self.dynamb_events.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a newly seen device.
    pub fn record_device_seen(&self) {
        self.devices_seen.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successfully resolved digital twin.
    pub fn record_twin_resolved(&self) {
        self.twins_resolved.fetch_add(1, Ordering::Relaxed);
    }

    /// Record samples evicted as stale.
    pub fn record_samples_evicted(&self, count: u64) {
        self.samples_evicted.fetch_add(count, Ordering::Relaxed);
    }

    /// Get the current statistics.
    pub fn stats(&self) -> StreamStatsSnapshot {
        let elapsed_secs = (Utc::now() - self.session_start).num_seconds().max(0) as u64;
        let dynamb_events = self.dynamb_events.load(Ordering::Relaxed);
        let events_per_second = if elapsed_secs == 0 {
            dynamb_events as f64
        } else {
            dynamb_events as f64 / elapsed_secs as f64
        };

        StreamStatsSnapshot {
            dynamb_events,
            devices_seen: self.devices_seen.load(Ordering::Relaxed),
            twins_resolved: self.twins_resolved.load(Ordering::Relaxed),
            samples_evicted: self.samples_evicted.load(Ordering::Relaxed),
            session_start: self.session_start,
            session_duration_secs: elapsed_secs,
            events_per_second,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Session Statistics:\n\
             - Dynamb events processed: {}\n\
             - Devices seen: {}\n\
             - Digital twins resolved: {}\n\
             - Samples evicted: {}\n\
             - Session duration: {} seconds",
            stats.dynamb_events,
            stats.devices_seen,
            stats.twins_resolved,
            stats.samples_evicted,
            stats.session_duration_secs
        )
    }

    /// Reset all counters.
    pub fn reset(&self) {
        self.dynamb_events.store(0, Ordering::Relaxed);
        self.devices_seen.store(0, Ordering::Relaxed);
        self.twins_resolved.store(0, Ordering::Relaxed);
        self.samples_evicted.store(0, Ordering::Relaxed);
    }
}

impl Default for StreamStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of stream statistics.
#[derive(Debug, Clone, Serialize)]
pub struct StreamStatsSnapshot {
    pub dynamb_events: u64,
    pub devices_seen: u64,
    pub twins_resolved: u64,
    pub samples_evicted: u64,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
    pub events_per_second: f64,
}

/// Thread-safe shared stats tracker.
pub type SharedStreamStats = Arc<StreamStats>;

/// Create a new shared stats tracker.
pub fn create_shared_stats() -> SharedStreamStats {
    Arc::new(StreamStats::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_counting() {
        let stats = StreamStats::new();

        stats.record_dynamb_event();
        stats.record_dynamb_event();
        stats.record_device_seen();
        stats.record_samples_evicted(7);

        let snapshot = stats.stats();
        assert_eq!(snapshot.dynamb_events, 2);
        assert_eq!(snapshot.devices_seen, 1);
        assert_eq!(snapshot.twins_resolved, 0);
        assert_eq!(snapshot.samples_evicted, 7);
    }

    #[test]
    fn test_stats_reset() {
        let stats = StreamStats::new();
        stats.record_dynamb_event();
        stats.record_twin_resolved();
        stats.reset();

        let snapshot = stats.stats();
        assert_eq!(snapshot.dynamb_events, 0);
        assert_eq!(snapshot.twins_resolved, 0);
    }

    #[test]
    fn test_summary_format() {
        let stats = StreamStats::new();
        stats.record_device_seen();
        let summary = stats.summary();

        assert!(summary.contains("Dynamb events processed"));
        assert!(summary.contains("Devices seen: 1"));
        assert!(summary.contains("Session duration"));
    }
}
