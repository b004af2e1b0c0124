//! Core error types for the stream cache

use std::path::PathBuf;
use std::time::Duration;

/// Result type for stream cache operations
pub type Result<T> = std::result::Result<T, CacheError>;

/// Re-export CacheError as Error for convenience
pub use CacheError as Error;

/// Error type for stream cache operations
#[derive(Debug)]
pub enum CacheError {
    /// I/O failure while creating, writing, reading or opening spool data
    Io {
        path: PathBuf,
        operation: &'static str,
        source: std::io::Error,
        recovery_hint: RecoveryHint,
    },

    /// The backing file of a cache disappeared while the cache was still in use
    CacheExpired {
        path: PathBuf,
        operation: &'static str,
        recovery_hint: RecoveryHint,
    },

    /// An in-memory buffer grew past its sanity ceiling without spooling
    UnboundedGrowth {
        in_memory_bytes: u64,
        ceiling: u64,
        recovery_hint: RecoveryHint,
    },

    /// Configuration error
    Configuration {
        message: String,
        recovery_hint: RecoveryHint,
    },

    /// Serialization/deserialization errors (configuration files)
    Serialization {
        key: String,
        operation: SerializationOp,
        source: Box<dyn std::error::Error + Send + Sync>,
        recovery_hint: RecoveryHint,
    },
}

/// Recovery hints for error handling
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryHint {
    /// Retry the operation
    Retry { after: Duration },

    /// Check file permissions
    CheckPermissions { path: PathBuf },

    /// Check disk space and clean up if needed
    CheckDiskSpace,

    /// Recreate cache file/directory
    Recreate,

    /// Update stream caching configuration
    UpdateConfiguration,

    /// A cache was used after its lifecycle ended; this is a caller bug
    ReportBug,

    /// No automated recovery possible
    Manual { instructions: String },

    /// Operation can be safely ignored
    Ignore,
}

/// Serialization operation types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SerializationOp {
    Encode,
    Decode,
}

impl CacheError {
    /// Build an I/O error, deriving the recovery hint from the error kind
    pub fn io(path: impl Into<PathBuf>, operation: &'static str, source: std::io::Error) -> Self {
        use std::io::ErrorKind;

        let path = path.into();
        let recovery_hint = match source.kind() {
            ErrorKind::PermissionDenied => RecoveryHint::CheckPermissions { path: path.clone() },
            ErrorKind::NotFound => RecoveryHint::Recreate,
            ErrorKind::WriteZero | ErrorKind::OutOfMemory => RecoveryHint::CheckDiskSpace,
            ErrorKind::Interrupted | ErrorKind::WouldBlock | ErrorKind::TimedOut => {
                RecoveryHint::Retry {
                    after: Duration::from_millis(100),
                }
            }
            _ if is_storage_full(&source) => RecoveryHint::CheckDiskSpace,
            _ => RecoveryHint::Manual {
                instructions: format!("Inspect '{}' and the spool directory", path.display()),
            },
        };

        Self::Io {
            path,
            operation,
            source,
            recovery_hint,
        }
    }

    /// Build a cache-expired error for a vanished backing file
    pub fn expired(path: impl Into<PathBuf>, operation: &'static str) -> Self {
        Self::CacheExpired {
            path: path.into(),
            operation,
            recovery_hint: RecoveryHint::ReportBug,
        }
    }

    /// Build a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            recovery_hint: RecoveryHint::UpdateConfiguration,
        }
    }
}

// ENOSPC and EDQUOT are reported as uncategorized kinds on stable Rust
fn is_storage_full(error: &std::io::Error) -> bool {
    matches!(error.raw_os_error(), Some(28) | Some(122))
}
