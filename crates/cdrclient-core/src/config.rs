//! Configuration module for cdrclient.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::connector::{Connector, ProcessingMode};
use crate::domain::errors::DomainError;
use crate::domain::retry::RetryPolicy;
use crate::router::ConnectorRouter;

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for cdrclient.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub endpoint: EndpointConfig,
    pub auth: AuthConfig,
    /// Root for in-flight downloads and the fallback error folders.
    pub local_temp_dir: PathBuf,
    pub upload: UploadConfig,
    pub pull: PullConfig,
    pub logging: LoggingConfig,
    /// How long the daemon waits for running uploads after a shutdown signal.
    pub shutdown_grace_secs: u64,
    pub connectors: Vec<Connector>,
}

/// Remote document platform endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Base URL for upload (POST), download (GET) and acknowledge (DELETE).
    pub documents_url: String,
    /// Base URL for credential renewal (PATCH `<base>/<client-id>`).
    pub credentials_url: String,
}

/// OAuth2 client-credentials settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub scope: String,
    /// Attempts per token or credential request, including the first one.
    pub max_attempts: u32,
    /// Base of the exponential backoff between those attempts.
    pub base_delay_ms: u64,
}

/// Upload pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub enabled: bool,
    pub watcher_enabled: bool,
    /// Maximum number of concurrent upload requests.
    pub parallelism: usize,
    pub poll_interval_secs: u64,
    /// Delay before a failed producer (watcher or poller) is restarted.
    pub restart_delay_secs: u64,
    /// Capacity of the in-flight deduplication cache.
    pub in_flight_capacity: usize,
    /// Backoff schedule for retryable upload failures; the last entry repeats.
    pub retry_delays_ms: Vec<u64>,
    pub busy_file: BusyFileConfig,
}

/// Which busy-file detection strategy to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusyFileStrategyKind {
    NeverBusy,
    AlwaysBusy,
    SizeChanged,
}

/// Busy-file detection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusyFileConfig {
    pub strategy: BusyFileStrategyKind,
    /// Time between the two size samples of `size_changed`.
    pub interval_ms: u64,
    /// Give up on a busy file for this cycle after this long.
    pub timeout_secs: u64,
}

/// Pull loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PullConfig {
    pub enabled: bool,
    /// Maximum number of connectors downloading at the same time.
    pub parallelism: usize,
    pub interval_secs: u64,
}

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Text,
    Json,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum log level (trace, debug, info, warn, error).
    pub level: String,
    pub format: LogFormat,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        tracing::debug!(
            path = %path.display(),
            connectors = config.connectors.len(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/cdrclient/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("cdrclient")
            .join("config.yaml")
    }

    /// Builds the connector router for this snapshot.
    pub fn router(&self) -> ConnectorRouter {
        ConnectorRouter::new(self.connectors.clone(), self.local_temp_dir.clone())
    }

    /// Upload retry schedule.
    pub fn retry_policy(&self) -> Result<RetryPolicy, DomainError> {
        RetryPolicy::from_millis(&self.upload.retry_delays_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

impl AuthConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}

impl UploadConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn restart_delay(&self) -> Duration {
        Duration::from_secs(self.restart_delay_secs)
    }
}

impl BusyFileConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl PullConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

// ---------------------------------------------------------------------------
// Config::default()
// ---------------------------------------------------------------------------

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: EndpointConfig::default(),
            auth: AuthConfig::default(),
            local_temp_dir: std::env::temp_dir().join("cdrclient"),
            upload: UploadConfig::default(),
            pull: PullConfig::default(),
            logging: LoggingConfig::default(),
            shutdown_grace_secs: 5,
            connectors: Vec::new(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_url: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            scope: String::new(),
            max_attempts: 3,
            base_delay_ms: 1000,
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            watcher_enabled: true,
            parallelism: 4,
            poll_interval_secs: 60,
            restart_delay_secs: 10,
            in_flight_capacity: 1000,
            retry_delays_ms: vec![1_000, 2_000, 8_000, 30_000, 60_000],
            busy_file: BusyFileConfig::default(),
        }
    }
}

impl Default for BusyFileConfig {
    fn default() -> Self {
        Self {
            strategy: BusyFileStrategyKind::SizeChanged,
            interval_ms: 250,
            timeout_secs: 30,
        }
    }
}

impl Default for PullConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            parallelism: 2,
            interval_secs: 60,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"upload.parallelism"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- endpoint ---
        if !is_http_url(&self.endpoint.documents_url) {
            errors.push(ValidationError::new(
                "endpoint.documents_url",
                "must be an http(s) URL",
            ));
        }
        if !is_http_url(&self.endpoint.credentials_url) {
            errors.push(ValidationError::new(
                "endpoint.credentials_url",
                "must be an http(s) URL",
            ));
        }

        // --- auth ---
        if !is_http_url(&self.auth.token_url) {
            errors.push(ValidationError::new("auth.token_url", "must be an http(s) URL"));
        }
        if self.auth.client_id.trim().is_empty() {
            errors.push(ValidationError::new("auth.client_id", "must not be empty"));
        }
        if self.auth.client_secret.is_empty() {
            errors.push(ValidationError::new("auth.client_secret", "must not be empty"));
        }
        if self.auth.max_attempts == 0 {
            errors.push(ValidationError::new(
                "auth.max_attempts",
                "must be greater than 0",
            ));
        }

        // --- local_temp_dir ---
        if !self.local_temp_dir.is_absolute() {
            errors.push(ValidationError::new(
                "local_temp_dir",
                format!("must be absolute: {}", self.local_temp_dir.display()),
            ));
        }

        // --- upload ---
        if self.upload.parallelism == 0 {
            errors.push(ValidationError::new(
                "upload.parallelism",
                "must be greater than 0",
            ));
        }
        if self.upload.poll_interval_secs == 0 {
            errors.push(ValidationError::new(
                "upload.poll_interval_secs",
                "must be greater than 0",
            ));
        }
        if self.upload.in_flight_capacity == 0 {
            errors.push(ValidationError::new(
                "upload.in_flight_capacity",
                "must be greater than 0",
            ));
        }
        if self.upload.retry_delays_ms.is_empty() {
            errors.push(ValidationError::new(
                "upload.retry_delays_ms",
                "must contain at least one delay",
            ));
        }
        if self.upload.busy_file.strategy == BusyFileStrategyKind::SizeChanged
            && self.upload.busy_file.interval_ms == 0
        {
            errors.push(ValidationError::new(
                "upload.busy_file.interval_ms",
                "must be greater than 0 for size_changed",
            ));
        }
        if self.upload.busy_file.strategy == BusyFileStrategyKind::SizeChanged
            && self.upload.busy_file.timeout_secs > 0
            && self.upload.busy_file.interval() >= self.upload.busy_file.timeout()
        {
            errors.push(ValidationError::new(
                "upload.busy_file.interval_ms",
                format!(
                    "must be shorter than timeout_secs ({}s) for size_changed",
                    self.upload.busy_file.timeout_secs
                ),
            ));
        }
        if self.upload.busy_file.timeout_secs == 0 {
            errors.push(ValidationError::new(
                "upload.busy_file.timeout_secs",
                "must be greater than 0",
            ));
        }

        // --- pull ---
        if self.pull.parallelism == 0 {
            errors.push(ValidationError::new("pull.parallelism", "must be greater than 0"));
        }
        if self.pull.interval_secs == 0 {
            errors.push(ValidationError::new(
                "pull.interval_secs",
                "must be greater than 0",
            ));
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError::new(
                "logging.level",
                format!(
                    "invalid level '{}'; expected one of: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            ));
        }

        // --- connectors ---
        if self.connectors.is_empty() {
            errors.push(ValidationError::new(
                "connectors",
                "at least one connector must be configured",
            ));
        }
        self.validate_connectors(&mut errors);

        errors
    }

    /// Checks per-connector fields, (id, mode) uniqueness and the folder
    /// invariants across the whole connector set.
    fn validate_connectors(&self, errors: &mut Vec<ValidationError>) {
        let mut keys: HashSet<(&str, ProcessingMode)> = HashSet::new();
        let mut sources: HashSet<&Path> = HashSet::new();
        let mut sinks: HashSet<&Path> = HashSet::new();

        for (i, c) in self.connectors.iter().enumerate() {
            let field = |name: &str| format!("connectors[{i}].{name}");

            if !keys.insert((c.id.as_str(), c.mode)) {
                errors.push(ValidationError::new(
                    field("id"),
                    format!("connector {} is defined twice for mode {}", c.id, c.mode),
                ));
            }
            if c.content_type.trim().is_empty() {
                errors.push(ValidationError::new(field("content_type"), "must not be empty"));
            }
            if c.archive_enabled && c.archive_folder.is_none() {
                errors.push(ValidationError::new(
                    field("archive_folder"),
                    "is required when archive_enabled is true",
                ));
            }

            for folder in c.source_folders() {
                if !folder.is_absolute() {
                    errors.push(ValidationError::new(
                        field("source_folder"),
                        format!("must be absolute: {}", folder.display()),
                    ));
                }
                if !sources.insert(folder) {
                    errors.push(ValidationError::new(
                        field("source_folder"),
                        format!("source folder is used more than once: {}", folder.display()),
                    ));
                }
            }

            let mut own_sinks = c.target_folders();
            own_sinks.extend(c.archive_root());
            own_sinks.extend(c.error_folder.as_deref());
            for folder in own_sinks {
                if !folder.is_absolute() {
                    errors.push(ValidationError::new(
                        field("target_folder"),
                        format!("must be absolute: {}", folder.display()),
                    ));
                }
                sinks.insert(folder);
            }
        }

        let mut overlaps: Vec<&&Path> = sources.intersection(&sinks).collect();
        overlaps.sort();
        for folder in overlaps {
            errors.push(ValidationError::new(
                "connectors",
                format!(
                    "folder is both a source and a target, archive or error folder: {}",
                    folder.display()
                ),
            ));
        }
    }

    /// Validates and folds every problem into a single fatal error.
    pub fn ensure_valid(&self) -> Result<(), DomainError> {
        let errors = self.validate();
        if errors.is_empty() {
            return Ok(());
        }
        let joined = errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        Err(DomainError::ConfigInvalid(joined))
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use cdrclient_core::config::ConfigBuilder;
///
/// let config = ConfigBuilder::new()
///     .documents_url("https://cdr.example/documents")
///     .client_id("client")
///     .client_secret("secret")
///     .upload_parallelism(2)
///     .logging_level("debug")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with default values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- endpoint / auth ---

    pub fn documents_url(mut self, url: impl Into<String>) -> Self {
        self.config.endpoint.documents_url = url.into();
        self
    }

    pub fn credentials_url(mut self, url: impl Into<String>) -> Self {
        self.config.endpoint.credentials_url = url.into();
        self
    }

    pub fn token_url(mut self, url: impl Into<String>) -> Self {
        self.config.auth.token_url = url.into();
        self
    }

    pub fn client_id(mut self, id: impl Into<String>) -> Self {
        self.config.auth.client_id = id.into();
        self
    }

    pub fn client_secret(mut self, secret: impl Into<String>) -> Self {
        self.config.auth.client_secret = secret.into();
        self
    }

    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.config.auth.scope = scope.into();
        self
    }

    pub fn auth_retry(mut self, max_attempts: u32, base_delay_ms: u64) -> Self {
        self.config.auth.max_attempts = max_attempts;
        self.config.auth.base_delay_ms = base_delay_ms;
        self
    }

    pub fn local_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.local_temp_dir = dir.into();
        self
    }

    // --- upload ---

    pub fn upload_enabled(mut self, enabled: bool) -> Self {
        self.config.upload.enabled = enabled;
        self
    }

    pub fn watcher_enabled(mut self, enabled: bool) -> Self {
        self.config.upload.watcher_enabled = enabled;
        self
    }

    pub fn upload_parallelism(mut self, n: usize) -> Self {
        self.config.upload.parallelism = n;
        self
    }

    pub fn upload_poll_interval_secs(mut self, seconds: u64) -> Self {
        self.config.upload.poll_interval_secs = seconds;
        self
    }

    pub fn in_flight_capacity(mut self, n: usize) -> Self {
        self.config.upload.in_flight_capacity = n;
        self
    }

    pub fn retry_delays_ms(mut self, delays: Vec<u64>) -> Self {
        self.config.upload.retry_delays_ms = delays;
        self
    }

    pub fn busy_file_strategy(mut self, strategy: BusyFileStrategyKind) -> Self {
        self.config.upload.busy_file.strategy = strategy;
        self
    }

    pub fn busy_file_timing(mut self, interval_ms: u64, timeout_secs: u64) -> Self {
        self.config.upload.busy_file.interval_ms = interval_ms;
        self.config.upload.busy_file.timeout_secs = timeout_secs;
        self
    }

    // --- pull ---

    pub fn pull_enabled(mut self, enabled: bool) -> Self {
        self.config.pull.enabled = enabled;
        self
    }

    pub fn pull_parallelism(mut self, n: usize) -> Self {
        self.config.pull.parallelism = n;
        self
    }

    pub fn pull_interval_secs(mut self, seconds: u64) -> Self {
        self.config.pull.interval_secs = seconds;
        self
    }

    // --- logging / lifecycle ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn logging_format(mut self, format: LogFormat) -> Self {
        self.config.logging.format = format;
        self
    }

    pub fn shutdown_grace_secs(mut self, seconds: u64) -> Self {
        self.config.shutdown_grace_secs = seconds;
        self
    }

    // --- connectors ---

    pub fn connector(mut self, connector: Connector) -> Self {
        self.config.connectors.push(connector);
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
