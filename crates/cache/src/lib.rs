//! Stream caching for rewind
//!
//! Payloads that must be read more than once are written through a
//! [`SpoolingWriter`]. Small payloads stay in memory; once the spool rules
//! fire the writer migrates to a temporary file, which is reference counted
//! and deleted when the last cache over it is closed and the owning unit of
//! work, if any, has completed.
//!
//! ```no_run
//! use rewind_cache::{StreamCache, StreamCachingConfig, StreamCachingStrategy};
//!
//! # fn main() -> rewind_cache::Result<()> {
//! let mut strategy = StreamCachingStrategy::new("orders", StreamCachingConfig::default())?;
//! strategy.start()?;
//!
//! let mut cache = strategy.cache(&mut std::io::stdin())?;
//! cache.write_to(&mut std::io::stdout())?;
//! cache.write_to(&mut std::io::stderr())?;
//!
//! strategy.stop();
//! # Ok(())
//! # }
//! ```

pub mod cleanup;
pub mod config;
pub mod errors;
pub mod rules;
pub mod statistics;
pub mod strategy;
pub mod streaming;
pub mod traits;
pub mod unit_of_work;

pub use cleanup::{ReaderLease, TempFileManager};
pub use config::{
    ConfigSource, LoadedConfig, SpoolConfig, SpoolFailurePolicy, StreamCachingConfig,
    StreamCachingConfigBuilder, StreamCachingConfigLoader,
};
pub use errors::{CacheError, Error, RecoveryHint, Result};
pub use rules::{FixedThresholdRule, SpoolRule, SpoolRules, UsedMemoryRule};
pub use statistics::{StatisticsSnapshot, StreamCachingStatistics};
pub use strategy::StreamCachingStrategy;
pub use streaming::{
    ByteArrayCache, FileStreamCache, ReaderCache, Source, SourceCache, SourcePayload,
    SpoolingWriter,
};
pub use traits::StreamCache;
pub use unit_of_work::{CompletionCallback, UnitOfWork, UnitOfWorkHandle};
