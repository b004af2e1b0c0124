//! Display implementations for cache errors

use super::types::CacheError;
use std::fmt;

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io {
                path,
                operation,
                source,
                ..
            } => write!(
                f,
                "I/O error during {} on '{}': {}",
                operation,
                path.display(),
                source
            ),
            Self::CacheExpired {
                path, operation, ..
            } => write!(
                f,
                "Stream cache expired during {}: backing file '{}' no longer exists",
                operation,
                path.display()
            ),
            Self::UnboundedGrowth {
                in_memory_bytes,
                ceiling,
                ..
            } => write!(
                f,
                "In-memory stream cache holds {in_memory_bytes} bytes, above the {ceiling} byte ceiling"
            ),
            Self::Configuration { message, .. } => {
                write!(f, "Stream caching configuration error: {message}")
            }
            Self::Serialization {
                key,
                operation,
                source,
                ..
            } => write!(f, "Failed to {operation:?} '{key}': {source}"),
        }
    }
}

impl std::error::Error for CacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Serialization { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}
