//! Counters for payloads kept in memory versus spooled to disk

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Stream caching statistics, updated as writers are closed
#[derive(Debug, Default)]
pub struct StreamCachingStatistics {
    enabled: AtomicBool,
    memory_counter: AtomicU64,
    memory_size: AtomicU64,
    spool_counter: AtomicU64,
    spool_size: AtomicU64,
    advisory_counter: AtomicU64,
}

impl StreamCachingStatistics {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            ..Self::default()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_memory(&self, bytes: u64) {
        if self.is_enabled() {
            self.memory_counter.fetch_add(1, Ordering::Relaxed);
            self.memory_size.fetch_add(bytes, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_spool(&self, bytes: u64) {
        if self.is_enabled() {
            self.spool_counter.fetch_add(1, Ordering::Relaxed);
            self.spool_size.fetch_add(bytes, Ordering::Relaxed);
        }
    }

    /// Count an in-memory buffer that outgrew its advisory ceiling
    pub fn record_advisory(&self) {
        if self.is_enabled() {
            self.advisory_counter.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Get current statistics as a snapshot
    pub fn snapshot(&self) -> StatisticsSnapshot {
        StatisticsSnapshot {
            memory_counter: self.memory_counter.load(Ordering::Relaxed),
            memory_size: self.memory_size.load(Ordering::Relaxed),
            spool_counter: self.spool_counter.load(Ordering::Relaxed),
            spool_size: self.spool_size.load(Ordering::Relaxed),
            advisory_counter: self.advisory_counter.load(Ordering::Relaxed),
        }
    }

    /// Reset all counters to zero
    pub fn reset(&self) {
        self.memory_counter.store(0, Ordering::Relaxed);
        self.memory_size.store(0, Ordering::Relaxed);
        self.spool_counter.store(0, Ordering::Relaxed);
        self.spool_size.store(0, Ordering::Relaxed);
        self.advisory_counter.store(0, Ordering::Relaxed);
    }
}

/// A snapshot of statistics at a point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatisticsSnapshot {
    pub memory_counter: u64,
    pub memory_size: u64,
    pub spool_counter: u64,
    pub spool_size: u64,
    pub advisory_counter: u64,
}

impl StatisticsSnapshot {
    /// Average size of payloads kept in memory
    pub fn memory_average_size(&self) -> u64 {
        self.memory_size.checked_div(self.memory_counter).unwrap_or(0)
    }

    /// Average size of payloads spooled to disk
    pub fn spool_average_size(&self) -> u64 {
        self.spool_size.checked_div(self.spool_counter).unwrap_or(0)
    }
}

impl fmt::Display for StatisticsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "memory: {} payloads, {} bytes (avg {}); spooled: {} payloads, {} bytes (avg {}); {} over ceiling",
            self.memory_counter,
            self.memory_size,
            self.memory_average_size(),
            self.spool_counter,
            self.spool_size,
            self.spool_average_size(),
            self.advisory_counter
        )
    }
}
