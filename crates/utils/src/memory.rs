//! System memory snapshots backed by `sysinfo`

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::time::{Duration, Instant};
use sysinfo::System;

static SAMPLER: Lazy<Mutex<Sampler>> = Lazy::new(|| Mutex::new(Sampler::new()));

struct Sampler {
    system: System,
    last: Option<(Instant, MemorySnapshot)>,
}

impl Sampler {
    fn new() -> Self {
        Self {
            system: System::new(),
            last: None,
        }
    }

    fn refresh(&mut self) -> MemorySnapshot {
        self.system.refresh_memory();
        let snapshot = MemorySnapshot {
            total_bytes: self.system.total_memory(),
            used_bytes: self.system.used_memory(),
        };
        self.last = Some((Instant::now(), snapshot));
        snapshot
    }

    fn recent(&self, max_age: Duration) -> Option<MemorySnapshot> {
        self.last
            .filter(|(taken, _)| taken.elapsed() <= max_age)
            .map(|(_, snapshot)| snapshot)
    }
}

/// Point-in-time view of system memory usage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemorySnapshot {
    pub total_bytes: u64,
    pub used_bytes: u64,
}

impl MemorySnapshot {
    /// Refresh memory figures and take a sample
    pub fn sample() -> Self {
        SAMPLER.lock().refresh()
    }

    /// Reuse the last sample if it is at most `max_age` old, else refresh
    ///
    /// Refreshing reads the platform memory tables, so hot paths that poll
    /// memory usage per write should go through this.
    pub fn sample_within(max_age: Duration) -> Self {
        let mut sampler = SAMPLER.lock();
        match sampler.recent(max_age) {
            Some(snapshot) => snapshot,
            None => sampler.refresh(),
        }
    }

    /// Used memory as a whole percentage of total memory
    ///
    /// Returns 0 when the platform reports no total memory.
    pub fn used_percent(&self) -> u8 {
        if self.total_bytes == 0 {
            return 0;
        }
        let percent = (self.used_bytes as f64 / self.total_bytes as f64) * 100.0;
        percent.clamp(0.0, 100.0) as u8
    }
}
