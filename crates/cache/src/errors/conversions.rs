//! Error conversion utilities

use super::types::{CacheError, SerializationOp};
use super::RecoveryHint;
use std::path::PathBuf;

impl From<std::io::Error> for CacheError {
    fn from(error: std::io::Error) -> Self {
        CacheError::io(PathBuf::from("."), "unknown", error)
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization {
            key: String::new(),
            operation: SerializationOp::Decode,
            source: Box::new(error),
            recovery_hint: RecoveryHint::Manual {
                instructions: "Check JSON format and data types".to_string(),
            },
        }
    }
}

/// Surface cache errors through `std::io` sinks and readers
impl From<CacheError> for std::io::Error {
    fn from(error: CacheError) -> Self {
        match error {
            CacheError::Io { source, .. } => source,
            CacheError::CacheExpired { .. } => {
                std::io::Error::new(std::io::ErrorKind::NotFound, error)
            }
            other => std::io::Error::other(other),
        }
    }
}
