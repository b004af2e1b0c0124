//! Stream caching strategy
//!
//! Owns the effective configuration, the resolved spool directory, the spool
//! rules and the statistics shared by every writer it creates.

mod directory;

pub use directory::resolve_spool_directory;

use crate::cleanup::remove_dir_best_effort;
use crate::config::{
    LoadedConfig, SpoolConfig, StreamCachingConfig, StreamCachingConfigLoader,
};
use crate::errors::{CacheError, Result};
use crate::rules::{FixedThresholdRule, SpoolRule, SpoolRules, UsedMemoryRule};
use crate::statistics::StreamCachingStatistics;
use crate::streaming::{SourceCache, SourcePayload, SpoolingWriter};
use crate::traits::StreamCache;
use crate::unit_of_work::UnitOfWork;
use rewind_utils::logging::payload_span;
use rewind_utils::RewindPaths;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Creates spooling writers and caches from one shared configuration
#[derive(Debug)]
pub struct StreamCachingStrategy {
    name: String,
    config: StreamCachingConfig,
    rules: Arc<SpoolRules>,
    statistics: Arc<StreamCachingStatistics>,
    spool_directory: Option<PathBuf>,
    created_spool_directory: bool,
}

impl StreamCachingStrategy {
    /// Create a strategy from a validated configuration
    pub fn new(name: impl Into<String>, config: StreamCachingConfig) -> Result<Self> {
        config.validate()?;

        let rules = Arc::new(Self::rules_from_config(&config));
        let statistics = Arc::new(StreamCachingStatistics::new(config.statistics_enabled));

        Ok(Self {
            name: name.into(),
            config,
            rules,
            statistics,
            spool_directory: None,
            created_spool_directory: false,
        })
    }

    /// Create a strategy from the config file and environment
    pub fn from_environment(name: impl Into<String>) -> Result<Self> {
        let LoadedConfig { config, source } = StreamCachingConfigLoader::load()?;
        tracing::debug!(?source, "stream caching configuration source");
        Self::new(name, config)
    }

    fn rules_from_config(config: &StreamCachingConfig) -> SpoolRules {
        let mut rules = SpoolRules::never().with_any(config.any_spool_rules);
        if let Some(rule) = FixedThresholdRule::new(config.spool_threshold) {
            rules.push(Arc::new(rule));
        }
        if let Some(rule) = UsedMemoryRule::new(config.spool_used_memory_threshold) {
            rules.push(Arc::new(rule));
        }
        rules
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &StreamCachingConfig {
        &self.config
    }

    pub fn statistics(&self) -> &Arc<StreamCachingStatistics> {
        &self.statistics
    }

    /// The resolved spool directory, once started
    pub fn spool_directory(&self) -> Option<&Path> {
        self.spool_directory.as_deref()
    }

    pub fn is_started(&self) -> bool {
        self.spool_directory.is_some()
    }

    /// Resolve and create the spool directory
    pub fn start(&mut self) -> Result<()> {
        if self.is_started() {
            return Ok(());
        }

        let directory = resolve_spool_directory(self.config.spool_directory_pattern(), &self.name);
        if self.config.enabled {
            self.created_spool_directory = !directory.exists();
            std::fs::create_dir_all(&directory)
                .map_err(|e| CacheError::io(&directory, "create spool directory", e))?;
            tracing::info!(
                name = %self.name,
                directory = %directory.display(),
                threshold = self.config.spool_threshold,
                used_memory_threshold = self.config.spool_used_memory_threshold,
                any_spool_rules = self.config.any_spool_rules,
                buffer_size = self.config.buffer_size,
                "stream caching enabled"
            );
        } else {
            tracing::info!(name = %self.name, "stream caching disabled, payloads stay in memory");
        }

        self.spool_directory = Some(directory);
        Ok(())
    }

    /// Log statistics and remove the spool directory if configured to
    ///
    /// Only a directory created by [`Self::start`] is removed; one that
    /// already existed is left in place.
    pub fn stop(&mut self) {
        let Some(directory) = self.spool_directory.take() else {
            return;
        };

        if self.statistics.is_enabled() {
            tracing::info!(name = %self.name, "stream caching statistics: {}", self.statistics.snapshot());
        }

        let created = std::mem::take(&mut self.created_spool_directory);
        if !self.config.enabled || !self.config.remove_spool_directory_when_stopping {
            return;
        }
        if created {
            remove_dir_best_effort(&directory);
        } else {
            tracing::debug!(
                directory = %directory.display(),
                "keeping spool directory that existed before start"
            );
        }
    }

    /// Whether a payload of `length` bytes would be spooled
    pub fn should_spool_cache(&self, length: u64) -> bool {
        self.config.enabled && self.rules.should_spool(length)
    }

    /// Add a custom rule for writers created from now on
    pub fn add_spool_rule(&mut self, rule: Arc<dyn SpoolRule>) {
        Arc::make_mut(&mut self.rules).push(rule);
    }

    fn spool_config(&self) -> Result<SpoolConfig> {
        let (directory, rules) = if self.config.enabled {
            let directory = self.spool_directory.clone().ok_or_else(|| {
                CacheError::configuration(format!(
                    "stream caching strategy '{}' has not been started",
                    self.name
                ))
            })?;
            (directory, self.rules.clone())
        } else {
            (RewindPaths::temp_dir(), Arc::new(SpoolRules::never()))
        };

        let mut config = SpoolConfig::new(directory)
            .with_rules(rules)
            .with_buffer_size(self.config.buffer_size)
            .with_failure_policy(self.config.spool_failure_policy);
        if let Some(ceiling) = self.config.max_in_memory_bytes {
            config = config.with_max_in_memory_bytes(ceiling);
        }
        Ok(config)
    }

    /// A new writer with its own temp file lifecycle
    pub fn writer(&self) -> Result<SpoolingWriter> {
        Ok(SpoolingWriter::new(self.spool_config()?).with_statistics(self.statistics.clone()))
    }

    /// A new writer whose spool file outlives its caches until `unit_of_work` completes
    pub fn writer_for(&self, unit_of_work: &dyn UnitOfWork) -> Result<SpoolingWriter> {
        Ok(
            SpoolingWriter::for_unit_of_work(self.spool_config()?, unit_of_work)
                .with_statistics(self.statistics.clone()),
        )
    }

    fn threshold_for_span(&self) -> u64 {
        self.config.spool_threshold.max(0) as u64
    }

    /// Drain `reader` into a rewindable cache
    pub fn cache(&self, reader: &mut dyn Read) -> Result<Box<dyn StreamCache>> {
        self.drain(self.writer()?, reader)
    }

    /// Drain `reader` into a cache whose spool file lives until `unit_of_work` completes
    pub fn cache_for(
        &self,
        reader: &mut dyn Read,
        unit_of_work: &dyn UnitOfWork,
    ) -> Result<Box<dyn StreamCache>> {
        self.drain(self.writer_for(unit_of_work)?, reader)
    }

    fn drain(&self, mut writer: SpoolingWriter, reader: &mut dyn Read) -> Result<Box<dyn StreamCache>> {
        let span = payload_span("bytes", self.threshold_for_span());
        let _guard = span.enter();

        let length = writer.drain_from(reader)?;
        if let Some(advisory) = writer.take_advisory() {
            tracing::debug!(error = %advisory, "payload cached past its memory ceiling");
        }
        tracing::debug!(length, in_memory = writer.in_memory(), "cached payload");
        writer.into_cache()
    }

    /// Cache a structured payload, keeping its system identifier
    pub fn cache_source(&self, payload: SourcePayload) -> Result<SourceCache> {
        let span = payload_span("source", self.threshold_for_span());
        let _guard = span.enter();

        SourceCache::from_payload(payload, || self.writer())
    }

    /// Drain an async reader into a cache
    ///
    /// Reads happen on the runtime; every write into the spooling writer,
    /// including the migration to disk, runs on the blocking pool.
    pub async fn cache_async<R>(&self, mut reader: R) -> Result<Box<dyn StreamCache>>
    where
        R: AsyncRead + Unpin,
    {
        let mut writer = self.writer()?;
        let mut chunk = vec![0u8; self.config.buffer_size];

        loop {
            let n = reader
                .read(&mut chunk)
                .await
                .map_err(|e| CacheError::io(PathBuf::from("<source>"), "read payload", e))?;
            if n == 0 {
                break;
            }

            let data = chunk[..n].to_vec();
            writer = tokio::task::spawn_blocking(move || {
                writer.write_chunk(&data)?;
                Ok::<_, CacheError>(writer)
            })
            .await
            .map_err(join_error)??;
        }

        tokio::task::spawn_blocking(move || writer.into_cache())
            .await
            .map_err(join_error)?
    }
}

fn join_error(e: tokio::task::JoinError) -> CacheError {
    CacheError::io(
        PathBuf::from("<blocking task>"),
        "spool write task",
        io::Error::other(e),
    )
}
