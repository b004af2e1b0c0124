//! Rules deciding when an in-memory buffer migrates to disk

use rewind_utils::MemorySnapshot;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// How long a system memory sample stays valid for [`UsedMemoryRule`]
pub const MEMORY_SAMPLE_MAX_AGE: Duration = Duration::from_millis(250);

/// A single spooling criterion, evaluated against the bytes written so far
pub trait SpoolRule: Send + Sync + fmt::Debug {
    fn should_spool(&self, length: u64) -> bool;
}

/// Spool once more than `threshold` bytes were written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedThresholdRule {
    threshold: u64,
}

impl FixedThresholdRule {
    /// Returns `None` for non-positive thresholds, which disable the rule
    pub fn new(threshold: i64) -> Option<Self> {
        (threshold > 0).then_some(Self {
            threshold: threshold as u64,
        })
    }

    pub fn threshold(&self) -> u64 {
        self.threshold
    }
}

impl SpoolRule for FixedThresholdRule {
    fn should_spool(&self, length: u64) -> bool {
        length > self.threshold
    }
}

/// Spool while system memory usage is above a percentage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsedMemoryRule {
    percent: u8,
}

impl UsedMemoryRule {
    /// Returns `None` when `percent` is 0 (disabled)
    pub fn new(percent: u8) -> Option<Self> {
        (percent > 0).then_some(Self {
            percent: percent.min(99),
        })
    }
}

impl SpoolRule for UsedMemoryRule {
    fn should_spool(&self, _length: u64) -> bool {
        let used = MemorySnapshot::sample_within(MEMORY_SAMPLE_MAX_AGE).used_percent();
        let spool = used > self.percent;
        if spool {
            tracing::trace!(used, limit = self.percent, "used memory above spool limit");
        }
        spool
    }
}

/// A set of spool rules combined with "all" or "any" semantics
#[derive(Debug, Clone, Default)]
pub struct SpoolRules {
    rules: Vec<Arc<dyn SpoolRule>>,
    any: bool,
}

impl SpoolRules {
    /// No rules: nothing ever spools
    pub fn never() -> Self {
        Self::default()
    }

    /// A single fixed threshold rule (or no rule when `threshold <= 0`)
    pub fn threshold(threshold: i64) -> Self {
        let mut rules = Self::default();
        if let Some(rule) = FixedThresholdRule::new(threshold) {
            rules.push(Arc::new(rule));
        }
        rules
    }

    /// Require any rule (`true`) or all rules (`false`) to match
    pub fn with_any(mut self, any: bool) -> Self {
        self.any = any;
        self
    }

    pub fn push(&mut self, rule: Arc<dyn SpoolRule>) {
        self.rules.push(rule);
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Evaluate the rules for `length` bytes written so far
    pub fn should_spool(&self, length: u64) -> bool {
        if self.rules.is_empty() {
            return false;
        }

        if self.any {
            self.rules.iter().any(|rule| rule.should_spool(length))
        } else {
            self.rules.iter().all(|rule| rule.should_spool(length))
        }
    }
}
