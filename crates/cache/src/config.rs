//! Stream caching configuration with precedence and validation
use crate::errors::{Error, RecoveryHint, Result, SerializationOp};
use crate::rules::SpoolRules;
use rewind_utils::RewindPaths;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

/// Default spool threshold (128 KiB)
pub const DEFAULT_SPOOL_THRESHOLD: i64 = 128 * 1024;

/// Default in-memory buffer and copy chunk size
pub const DEFAULT_BUFFER_SIZE: usize = 4096;

/// Default spool directory pattern
pub const DEFAULT_SPOOL_DIRECTORY: &str = "${tmpdir}/rewind-#uuid#";

/// Prefix shared by all stream caching environment variables
pub const ENV_PREFIX: &str = "REWIND_STREAM_CACHING";

/// What a writer does when spooling to disk fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpoolFailurePolicy {
    /// Return the I/O error to the producer; later writes retry spooling
    #[default]
    Propagate,
    /// Log the failure, stop spooling and keep buffering in memory
    StayInMemory,
}

impl FromStr for SpoolFailurePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "propagate" => Ok(Self::Propagate),
            "stay_in_memory" | "memory" => Ok(Self::StayInMemory),
            other => Err(Error::configuration(format!(
                "unknown spool failure policy '{other}'"
            ))),
        }
    }
}

/// Stream caching configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamCachingConfig {
    /// Whether payloads may be spooled to disk at all
    pub enabled: bool,
    /// Spool directory pattern (`#uuid#`, `#name#` and `${tmpdir}` are expanded)
    pub spool_directory: Option<String>,
    /// Spool once more than this many bytes were written; `<= 0` disables the rule
    pub spool_threshold: i64,
    /// Spool when system memory usage exceeds this percentage; 0 disables the rule
    pub spool_used_memory_threshold: u8,
    /// Initial capacity of in-memory buffers and chunk size for copies
    pub buffer_size: usize,
    /// Spool when any rule matches instead of requiring all of them
    pub any_spool_rules: bool,
    /// Delete the spool directory when the strategy stops, if the strategy created it
    pub remove_spool_directory_when_stopping: bool,
    /// Record memory/spool statistics
    pub statistics_enabled: bool,
    /// Advisory ceiling for buffers that could not spool
    pub max_in_memory_bytes: Option<u64>,
    /// Behavior when creating the spool file fails
    pub spool_failure_policy: SpoolFailurePolicy,
}

impl Default for StreamCachingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            spool_directory: None,
            spool_threshold: DEFAULT_SPOOL_THRESHOLD,
            spool_used_memory_threshold: 0,
            buffer_size: DEFAULT_BUFFER_SIZE,
            any_spool_rules: false,
            remove_spool_directory_when_stopping: true,
            statistics_enabled: false,
            max_in_memory_bytes: None,
            spool_failure_policy: SpoolFailurePolicy::Propagate,
        }
    }
}

impl StreamCachingConfig {
    /// Validate option ranges
    pub fn validate(&self) -> Result<()> {
        if self.buffer_size == 0 {
            return Err(Error::configuration("buffer_size must be greater than zero"));
        }

        if self.spool_used_memory_threshold > 99 {
            return Err(Error::configuration(format!(
                "spool_used_memory_threshold must be between 0 and 99, got {}",
                self.spool_used_memory_threshold
            )));
        }

        if let Some(dir) = &self.spool_directory {
            if dir.trim().is_empty() {
                return Err(Error::configuration("spool_directory must not be empty"));
            }
        }

        Ok(())
    }

    /// The spool directory pattern in effect
    pub fn spool_directory_pattern(&self) -> &str {
        self.spool_directory
            .as_deref()
            .unwrap_or(DEFAULT_SPOOL_DIRECTORY)
    }
}

/// Per-writer spooling settings derived from a [`StreamCachingConfig`]
#[derive(Debug, Clone)]
pub struct SpoolConfig {
    /// Directory where spool files are created
    pub directory: PathBuf,
    /// Rules deciding when a buffer migrates to disk
    pub rules: Arc<SpoolRules>,
    /// Initial in-memory capacity
    pub buffer_size: usize,
    /// Behavior when spooling fails
    pub failure_policy: SpoolFailurePolicy,
    /// Advisory in-memory ceiling
    pub max_in_memory_bytes: Option<u64>,
}

impl SpoolConfig {
    /// Spool into `directory` once more than [`DEFAULT_SPOOL_THRESHOLD`] bytes were written
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            rules: Arc::new(SpoolRules::threshold(DEFAULT_SPOOL_THRESHOLD)),
            buffer_size: DEFAULT_BUFFER_SIZE,
            failure_policy: SpoolFailurePolicy::Propagate,
            max_in_memory_bytes: None,
        }
    }

    /// Replace the rules with a single fixed threshold
    pub fn with_threshold(mut self, threshold: i64) -> Self {
        self.rules = Arc::new(SpoolRules::threshold(threshold));
        self
    }

    pub fn with_rules(mut self, rules: Arc<SpoolRules>) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size.max(1);
        self
    }

    pub fn with_failure_policy(mut self, policy: SpoolFailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn with_max_in_memory_bytes(mut self, ceiling: u64) -> Self {
        self.max_in_memory_bytes = Some(ceiling);
        self
    }
}

/// Source of configuration for debugging and precedence tracking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Default configuration
    Default,
    /// Configuration file
    ConfigFile(PathBuf),
    /// Environment variable
    EnvironmentVariable(String),
    /// Set programmatically through the builder
    Explicit,
}

/// Configuration together with where its last layer came from
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: StreamCachingConfig,
    pub source: ConfigSource,
}

/// Optional overrides applied on top of a base configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamCachingOverrides {
    pub enabled: Option<bool>,
    pub spool_directory: Option<String>,
    pub spool_threshold: Option<i64>,
    pub spool_used_memory_threshold: Option<u8>,
    pub buffer_size: Option<usize>,
    pub any_spool_rules: Option<bool>,
    pub remove_spool_directory_when_stopping: Option<bool>,
    pub statistics_enabled: Option<bool>,
    pub max_in_memory_bytes: Option<u64>,
    pub spool_failure_policy: Option<SpoolFailurePolicy>,
}

impl StreamCachingOverrides {
    /// Whether no option is set
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply every set option onto `config`
    pub fn apply(self, config: &mut StreamCachingConfig) {
        if let Some(enabled) = self.enabled {
            config.enabled = enabled;
        }
        if self.spool_directory.is_some() {
            config.spool_directory = self.spool_directory;
        }
        if let Some(threshold) = self.spool_threshold {
            config.spool_threshold = threshold;
        }
        if let Some(percent) = self.spool_used_memory_threshold {
            config.spool_used_memory_threshold = percent;
        }
        if let Some(size) = self.buffer_size {
            config.buffer_size = size;
        }
        if let Some(any) = self.any_spool_rules {
            config.any_spool_rules = any;
        }
        if let Some(remove) = self.remove_spool_directory_when_stopping {
            config.remove_spool_directory_when_stopping = remove;
        }
        if let Some(stats) = self.statistics_enabled {
            config.statistics_enabled = stats;
        }
        if self.max_in_memory_bytes.is_some() {
            config.max_in_memory_bytes = self.max_in_memory_bytes;
        }
        if let Some(policy) = self.spool_failure_policy {
            config.spool_failure_policy = policy;
        }
    }
}

/// Builder for creating stream caching configurations
pub struct StreamCachingConfigBuilder {
    config: StreamCachingConfig,
}

impl StreamCachingConfigBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: StreamCachingConfig::default(),
        }
    }

    /// Start from an already loaded configuration
    pub fn from_config(config: StreamCachingConfig) -> Self {
        Self { config }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.config.enabled = enabled;
        self
    }

    pub fn with_spool_directory(mut self, pattern: impl Into<String>) -> Self {
        self.config.spool_directory = Some(pattern.into());
        self
    }

    pub fn with_spool_threshold(mut self, threshold: i64) -> Self {
        self.config.spool_threshold = threshold;
        self
    }

    pub fn with_spool_used_memory_threshold(mut self, percent: u8) -> Self {
        self.config.spool_used_memory_threshold = percent;
        self
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.config.buffer_size = buffer_size;
        self
    }

    pub fn with_any_spool_rules(mut self, any: bool) -> Self {
        self.config.any_spool_rules = any;
        self
    }

    pub fn with_remove_spool_directory_when_stopping(mut self, remove: bool) -> Self {
        self.config.remove_spool_directory_when_stopping = remove;
        self
    }

    pub fn with_statistics(mut self, enabled: bool) -> Self {
        self.config.statistics_enabled = enabled;
        self
    }

    pub fn with_max_in_memory_bytes(mut self, ceiling: u64) -> Self {
        self.config.max_in_memory_bytes = Some(ceiling);
        self
    }

    pub fn with_spool_failure_policy(mut self, policy: SpoolFailurePolicy) -> Self {
        self.config.spool_failure_policy = policy;
        self
    }

    /// Validate and build the configuration
    pub fn build(self) -> Result<StreamCachingConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for StreamCachingConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration loader that handles precedence
///
/// Defaults are overridden by the `stream_caching` object of the config file,
/// which is overridden by `REWIND_STREAM_CACHING_*` environment variables.
pub struct StreamCachingConfigLoader;

impl StreamCachingConfigLoader {
    /// Load configuration with full precedence handling
    pub fn load() -> Result<LoadedConfig> {
        Self::load_with_file(&RewindPaths::config_file())
    }

    /// Load configuration using an explicit config file path
    pub fn load_with_file(config_path: &Path) -> Result<LoadedConfig> {
        let mut config = StreamCachingConfig::default();
        let mut source = ConfigSource::Default;

        if let Some(file_overrides) = Self::load_from_config_file(config_path)? {
            file_overrides.apply(&mut config);
            source = ConfigSource::ConfigFile(config_path.to_path_buf());
        }

        let env_overrides = Self::load_from_env()?;
        if !env_overrides.is_empty() {
            env_overrides.apply(&mut config);
            source = ConfigSource::EnvironmentVariable(format!("{ENV_PREFIX}_*"));
        }

        config.validate()?;
        tracing::debug!(?source, "loaded stream caching configuration");

        Ok(LoadedConfig { config, source })
    }

    /// Read the `stream_caching` object from a JSON config file
    fn load_from_config_file(config_path: &Path) -> Result<Option<StreamCachingOverrides>> {
        if !config_path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(config_path).map_err(|e| Error::Io {
            path: config_path.to_path_buf(),
            operation: "read config file",
            source: e,
            recovery_hint: RecoveryHint::CheckPermissions {
                path: config_path.to_path_buf(),
            },
        })?;

        Self::parse_config(&content, config_path)
    }

    fn parse_config(content: &str, config_path: &Path) -> Result<Option<StreamCachingOverrides>> {
        let decode_error = |e: serde_json::Error| Error::Serialization {
            key: config_path.display().to_string(),
            operation: SerializationOp::Decode,
            source: Box::new(e),
            recovery_hint: RecoveryHint::Manual {
                instructions: "Check config file syntax".to_string(),
            },
        };

        let file_config: serde_json::Value = serde_json::from_str(content).map_err(decode_error)?;

        match file_config.get("stream_caching") {
            Some(section) => {
                let overrides: StreamCachingOverrides =
                    serde_json::from_value(section.clone()).map_err(decode_error)?;
                Ok(Some(overrides))
            }
            None => Ok(None),
        }
    }

    /// Load overrides from `REWIND_STREAM_CACHING_*` environment variables
    fn load_from_env() -> Result<StreamCachingOverrides> {
        let mut overrides = StreamCachingOverrides::default();

        if let Some(value) = env_var("ENABLED") {
            overrides.enabled = Some(parse_bool(&value));
        }
        if let Some(value) = env_var("SPOOL_DIRECTORY") {
            overrides.spool_directory = Some(value);
        }
        if let Some(value) = env_var("SPOOL_THRESHOLD") {
            overrides.spool_threshold = Some(parse_number("SPOOL_THRESHOLD", &value)?);
        }
        if let Some(value) = env_var("SPOOL_USED_MEMORY_THRESHOLD") {
            overrides.spool_used_memory_threshold =
                Some(parse_number("SPOOL_USED_MEMORY_THRESHOLD", &value)?);
        }
        if let Some(value) = env_var("BUFFER_SIZE") {
            overrides.buffer_size = Some(parse_number("BUFFER_SIZE", &value)?);
        }
        if let Some(value) = env_var("ANY_SPOOL_RULES") {
            overrides.any_spool_rules = Some(parse_bool(&value));
        }
        if let Some(value) = env_var("REMOVE_SPOOL_DIRECTORY") {
            overrides.remove_spool_directory_when_stopping = Some(parse_bool(&value));
        }
        if let Some(value) = env_var("STATISTICS") {
            overrides.statistics_enabled = Some(parse_bool(&value));
        }
        if let Some(value) = env_var("MAX_IN_MEMORY_BYTES") {
            overrides.max_in_memory_bytes = Some(parse_number("MAX_IN_MEMORY_BYTES", &value)?);
        }
        if let Some(value) = env_var("SPOOL_FAILURE_POLICY") {
            overrides.spool_failure_policy = Some(value.parse()?);
        }

        Ok(overrides)
    }
}

fn env_var(suffix: &str) -> Option<String> {
    std::env::var(format!("{ENV_PREFIX}_{suffix}")).ok()
}

fn parse_bool(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "true" | "1" | "yes" | "on")
}

fn parse_number<T: FromStr>(name: &str, value: &str) -> Result<T> {
    value.trim().parse::<T>().map_err(|_| {
        Error::configuration(format!(
            "{ENV_PREFIX}_{name} must be a number, got '{value}'"
        ))
    })
}
