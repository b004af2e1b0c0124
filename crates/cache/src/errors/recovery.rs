//! Recovery utilities for cache errors

use super::types::{CacheError, RecoveryHint};

impl CacheError {
    /// Get the recovery hint for this error
    #[must_use]
    pub const fn recovery_hint(&self) -> &RecoveryHint {
        match self {
            Self::Io { recovery_hint, .. }
            | Self::CacheExpired { recovery_hint, .. }
            | Self::UnboundedGrowth { recovery_hint, .. }
            | Self::Configuration { recovery_hint, .. }
            | Self::Serialization { recovery_hint, .. } => recovery_hint,
        }
    }

    /// Check if this error is transient and can be retried
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self.recovery_hint(), RecoveryHint::Retry { .. })
    }

    /// Check if this error signals a cache used past the end of its lifecycle
    #[must_use]
    pub const fn is_lifecycle_violation(&self) -> bool {
        matches!(self, Self::CacheExpired { .. })
    }

    /// Check if this error is advisory and does not stop the operation
    #[must_use]
    pub const fn is_advisory(&self) -> bool {
        matches!(self, Self::UnboundedGrowth { .. })
    }
}
