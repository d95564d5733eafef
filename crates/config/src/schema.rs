//! Sync configuration schema, defaults, validation, and normalization.
//!
//! - Deserialization uses `serde` (JSON or TOML).
//! - Validation is manual and returns typed errors mapped to `ErrorEnvelope`.
//! - Secrets (database connections, notifier token) are never read from or
//!   written to config files; only the env layer can set them.

use catalog_sync_domain::{PartitionId, SqlIdentifier};
use catalog_sync_shared::{
    BoundedU32, BoundedU64, ErrorCode, ErrorEnvelope, RetryPolicy, SecretString,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use url::Url;

/// Strip credentials from a URL before it lands in error metadata.
fn sanitize_url_for_error(url: &str) -> String {
    match Url::parse(url) {
        Ok(mut parsed) => {
            if parsed.password().is_some() || !parsed.username().is_empty() {
                if parsed.set_username("").is_err() || parsed.set_password(None).is_err() {
                    return "[invalid url: credentials]".to_string();
                }
            }
            parsed.to_string()
        },
        Err(error) => format!("[invalid url: {error}]"),
    }
}

/// Current supported configuration schema version.
pub const CURRENT_CONFIG_VERSION: u32 = 1;

const CORE_TIMEOUT_MIN_MS: u64 = 100;
const CORE_TIMEOUT_MAX_MS: u64 = 600_000;

const RETRY_MAX_ATTEMPTS_MIN: u32 = 1;
const RETRY_MAX_ATTEMPTS_MAX: u32 = 10;
const RETRY_BASE_DELAY_MIN_MS: u64 = 1;
const RETRY_BASE_DELAY_MAX_MS: u64 = 60_000;
const RETRY_MAX_DELAY_MIN_MS: u64 = 1;
const RETRY_MAX_DELAY_MAX_MS: u64 = 600_000;
const RETRY_JITTER_RATIO_PCT_MAX: u32 = 100;

const NOTIFIER_TIMEOUT_MIN_MS: u64 = 100;
const NOTIFIER_TIMEOUT_MAX_MS: u64 = 300_000;

const SCHEDULER_INTERVAL_MIN_MS: u64 = 1_000;
const SCHEDULER_INTERVAL_MAX_MS: u64 = 86_400_000;

/// Upper bound on configured partitions.
pub const PARTITIONS_MAX: usize = 1_024;

const LOG_LEVELS: [&str; 4] = ["debug", "info", "warn", "error"];

/// Top-level sync configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct SyncConfig {
    /// Schema version for forward-compatible migrations.
    pub version: u32,
    /// Core runtime settings.
    pub core: CoreConfig,
    /// Change feed settings.
    pub changelog: ChangelogConfig,
    /// Watermark store settings.
    pub watermarks: WatermarkStoreConfig,
    /// Webhook notifier settings.
    pub notifier: NotifierConfig,
    /// Partitions to sync, in processing order.
    pub partitions: Vec<PartitionConfig>,
    /// Scheduler settings.
    pub scheduler: SchedulerConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            version: CURRENT_CONFIG_VERSION,
            core: CoreConfig::default(),
            changelog: ChangelogConfig::default(),
            watermarks: WatermarkStoreConfig::default(),
            notifier: NotifierConfig::default(),
            partitions: Vec::new(),
            scheduler: SchedulerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl SyncConfig {
    /// Validate and normalize the config.
    pub fn validate_and_normalize(mut self) -> Result<ValidatedSyncConfig, ConfigSchemaError> {
        if self.version != CURRENT_CONFIG_VERSION {
            return Err(ConfigSchemaError::UnsupportedVersion {
                found: self.version,
                supported: CURRENT_CONFIG_VERSION,
            });
        }

        self.core.retry.validate()?;
        self.changelog.normalize();
        self.changelog.validate()?;
        self.watermarks.normalize();
        self.watermarks.validate()?;
        self.notifier.normalize();
        self.notifier.validate()?;
        validate_partitions(&mut self.partitions)?;
        self.logging.normalize_and_validate()?;

        let limits = ConfigLimits::new(&self)?;
        Ok(ValidatedSyncConfig { raw: self, limits })
    }

    /// Configuration entry for `partition`, if configured.
    #[must_use]
    pub fn partition(&self, partition: &PartitionId) -> Option<&PartitionConfig> {
        self.partitions.iter().find(|entry| &entry.id == partition)
    }
}

/// Validated config wrapper carrying bounded numeric values.
#[derive(Debug, Clone)]
pub struct ValidatedSyncConfig {
    raw: SyncConfig,
    limits: ConfigLimits,
}

impl ValidatedSyncConfig {
    /// Access validated numeric bounds.
    #[must_use]
    pub const fn limits(&self) -> &ConfigLimits {
        &self.limits
    }

    /// Borrow the raw config.
    #[must_use]
    pub const fn as_ref(&self) -> &SyncConfig {
        &self.raw
    }

    /// Consume the wrapper and return the raw config.
    #[must_use]
    pub fn into_inner(self) -> SyncConfig {
        self.raw
    }
}

impl std::ops::Deref for ValidatedSyncConfig {
    type Target = SyncConfig;

    fn deref(&self) -> &Self::Target {
        &self.raw
    }
}

/// Validated numeric limits derived from the config.
#[derive(Debug, Clone, Copy)]
pub struct ConfigLimits {
    /// Timeout for a single feed or store operation (ms).
    pub core_timeout_ms: BoundedU64<CORE_TIMEOUT_MIN_MS, CORE_TIMEOUT_MAX_MS>,
    /// Retry attempts for transient notifier failures.
    pub retry_max_attempts: BoundedU32<RETRY_MAX_ATTEMPTS_MIN, RETRY_MAX_ATTEMPTS_MAX>,
    /// Timeout for one notifier HTTP request (ms).
    pub notifier_timeout_ms: BoundedU64<NOTIFIER_TIMEOUT_MIN_MS, NOTIFIER_TIMEOUT_MAX_MS>,
    /// Scheduler tick interval (ms).
    pub scheduler_interval_ms: BoundedU64<SCHEDULER_INTERVAL_MIN_MS, SCHEDULER_INTERVAL_MAX_MS>,
}

impl ConfigLimits {
    fn new(config: &SyncConfig) -> Result<Self, ConfigSchemaError> {
        Ok(Self {
            core_timeout_ms: bounded_timeout(
                "core",
                "timeoutMs",
                config.core.timeout_ms,
                CORE_TIMEOUT_MIN_MS,
                CORE_TIMEOUT_MAX_MS,
            )?,
            retry_max_attempts: bounded_u32(
                "core.retry",
                "maxAttempts",
                config.core.retry.max_attempts,
                RETRY_MAX_ATTEMPTS_MIN,
                RETRY_MAX_ATTEMPTS_MAX,
            )?,
            notifier_timeout_ms: bounded_timeout(
                "notifier",
                "timeoutMs",
                config.notifier.timeout_ms,
                NOTIFIER_TIMEOUT_MIN_MS,
                NOTIFIER_TIMEOUT_MAX_MS,
            )?,
            scheduler_interval_ms: bounded_timeout(
                "scheduler",
                "intervalMs",
                config.scheduler.interval_ms,
                SCHEDULER_INTERVAL_MIN_MS,
                SCHEDULER_INTERVAL_MAX_MS,
            )?,
        })
    }

    /// Retry policy for transient delivery failures.
    #[must_use]
    pub const fn retry_policy(&self, retry: &RetryConfig) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_max_attempts.get(),
            base_delay_ms: retry.base_delay_ms,
            max_delay_ms: retry.max_delay_ms,
            jitter_ratio_pct: retry.jitter_ratio_pct,
        }
    }
}

/// Parse a sync config from a JSON string, applying validation and normalization.
pub fn parse_sync_config_json(input: &str) -> Result<ValidatedSyncConfig, ErrorEnvelope> {
    let config: SyncConfig = serde_json::from_str(input).map_err(|error| {
        ErrorEnvelope::expected(
            ErrorCode::new("config", "invalid_json"),
            format!("invalid config JSON: {error}"),
        )
    })?;

    config.validate_and_normalize().map_err(Into::into)
}

/// Parse a sync config from a TOML string, applying validation and normalization.
pub fn parse_sync_config_toml(input: &str) -> Result<ValidatedSyncConfig, ErrorEnvelope> {
    let config: SyncConfig = toml::from_str(input).map_err(|error| {
        ErrorEnvelope::expected(
            ErrorCode::new("config", "invalid_toml"),
            format!("invalid config TOML: {error}"),
        )
    })?;

    config.validate_and_normalize().map_err(Into::into)
}

/// Core runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct CoreConfig {
    /// Timeout for a single feed or store operation (ms).
    pub timeout_ms: u64,
    /// Retry policy for transient notifier failures.
    pub retry: RetryConfig,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            retry: RetryConfig::default(),
        }
    }
}

/// Retry policy configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct RetryConfig {
    /// Maximum attempts (including the first attempt).
    pub max_attempts: u32,
    /// Base delay for exponential backoff (ms).
    pub base_delay_ms: u64,
    /// Maximum delay cap for backoff (ms).
    pub max_delay_ms: u64,
    /// Jitter ratio as a percentage (0..=100).
    pub jitter_ratio_pct: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            base_delay_ms: policy.base_delay_ms,
            max_delay_ms: policy.max_delay_ms,
            jitter_ratio_pct: policy.jitter_ratio_pct,
        }
    }
}

impl RetryConfig {
    fn validate(&self) -> Result<(), ConfigSchemaError> {
        validate_limit_u64(
            "core.retry",
            "baseDelayMs",
            self.base_delay_ms,
            RETRY_BASE_DELAY_MIN_MS,
            RETRY_BASE_DELAY_MAX_MS,
        )?;
        validate_limit_u64(
            "core.retry",
            "maxDelayMs",
            self.max_delay_ms,
            RETRY_MAX_DELAY_MIN_MS,
            RETRY_MAX_DELAY_MAX_MS,
        )?;
        if self.jitter_ratio_pct > RETRY_JITTER_RATIO_PCT_MAX {
            return Err(ConfigSchemaError::LimitOutOfRange {
                section: "core.retry",
                field: "jitterRatioPct",
                value: u64::from(self.jitter_ratio_pct),
                min: 0,
                max: u64::from(RETRY_JITTER_RATIO_PCT_MAX),
            });
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(ConfigSchemaError::LimitOutOfRange {
                section: "core.retry",
                field: "maxDelayMs",
                value: self.max_delay_ms,
                min: self.base_delay_ms,
                max: RETRY_MAX_DELAY_MAX_MS,
            });
        }
        Ok(())
    }
}

/// SQL storage backends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StorageProvider {
    /// `SQLite` database file.
    #[default]
    Sqlite,
    /// Postgres database (requires the `postgres` feature).
    Postgres,
}

impl StorageProvider {
    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Postgres => "postgres",
        }
    }

    /// Parse a provider name.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Some(Self::Sqlite),
            "postgres" | "postgresql" => Some(Self::Postgres),
            _ => None,
        }
    }
}

impl fmt::Display for StorageProvider {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Change feed configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct ChangelogConfig {
    /// Storage backend holding the change table.
    pub provider: StorageProvider,
    /// `SQLite` database path (sqlite provider).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Postgres connection URL (env only).
    #[serde(skip)]
    pub connection: Option<SecretString>,
    /// Change table name.
    pub table: Box<str>,
    /// Column holding the changed entity id.
    pub entity_column: Box<str>,
    /// Column holding the feed version.
    pub version_column: Box<str>,
}

impl Default for ChangelogConfig {
    fn default() -> Self {
        Self {
            provider: StorageProvider::Sqlite,
            path: None,
            connection: None,
            table: "catalog_product_cl".into(),
            entity_column: "entity_id".into(),
            version_column: "version_id".into(),
        }
    }
}

impl ChangelogConfig {
    fn normalize(&mut self) {
        trim_box(&mut self.table);
        trim_box(&mut self.entity_column);
        trim_box(&mut self.version_column);
    }

    fn validate(&self) -> Result<(), ConfigSchemaError> {
        validate_identifier("changelog", "table", &self.table)?;
        validate_identifier("changelog", "entityColumn", &self.entity_column)?;
        validate_identifier("changelog", "versionColumn", &self.version_column)?;
        validate_storage_location(
            "changelog",
            self.provider,
            self.path.as_ref(),
            self.connection.as_ref(),
        )
    }
}

/// Watermark store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct WatermarkStoreConfig {
    /// Storage backend holding the watermark table.
    pub provider: StorageProvider,
    /// `SQLite` database path (sqlite provider).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Postgres connection URL (env only).
    #[serde(skip)]
    pub connection: Option<SecretString>,
    /// Watermark table name.
    pub table: Box<str>,
}

impl Default for WatermarkStoreConfig {
    fn default() -> Self {
        Self {
            provider: StorageProvider::Sqlite,
            path: Some(PathBuf::from("catalog-sync.db")),
            connection: None,
            table: "catalog_sync_watermark".into(),
        }
    }
}

impl WatermarkStoreConfig {
    fn normalize(&mut self) {
        trim_box(&mut self.table);
    }

    fn validate(&self) -> Result<(), ConfigSchemaError> {
        validate_identifier("watermarks", "table", &self.table)?;
        validate_storage_location(
            "watermarks",
            self.provider,
            self.path.as_ref(),
            self.connection.as_ref(),
        )
    }
}

/// Webhook notifier configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct NotifierConfig {
    /// Base URL of the receiving backend. Without it (and without a
    /// per-partition endpoint) deliveries fail and watermarks hold.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<Box<str>>,
    /// Path appended to `baseUrl`.
    pub path: Box<str>,
    /// Timeout for one HTTP request (ms).
    pub timeout_ms: u64,
    /// Bearer token (env only).
    #[serde(skip)]
    pub token: Option<SecretString>,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            path: "/catalog/changes".into(),
            timeout_ms: 10_000,
            token: None,
        }
    }
}

impl NotifierConfig {
    fn normalize(&mut self) {
        normalize_optional_trimmed(&mut self.base_url);
        trim_box(&mut self.path);
        if !self.path.starts_with('/') {
            self.path = format!("/{}", self.path).into_boxed_str();
        }
    }

    fn validate(&self) -> Result<(), ConfigSchemaError> {
        if let Some(base_url) = self.base_url.as_deref() {
            validate_http_url("notifier", "baseUrl", base_url)?;
        }
        Ok(())
    }

    /// Endpoint used for `partition`: its override, else `baseUrl` + `path`.
    #[must_use]
    pub fn endpoint_for(&self, partition: Option<&PartitionConfig>) -> Option<String> {
        if let Some(endpoint) = partition.and_then(|entry| entry.endpoint_url.as_deref()) {
            return Some(endpoint.to_string());
        }
        self.base_url
            .as_deref()
            .map(|base| format!("{}{}", base.trim_end_matches('/'), self.path))
    }
}

/// One configured partition (store).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PartitionConfig {
    /// Partition identifier.
    pub id: PartitionId,
    /// Whether sync is turned on for this partition.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Endpoint override for this partition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_url: Option<Box<str>>,
}

impl PartitionConfig {
    /// Enabled partition with no endpoint override.
    #[must_use]
    pub const fn enabled(id: PartitionId) -> Self {
        Self {
            id,
            enabled: true,
            endpoint_url: None,
        }
    }
}

const fn default_true() -> bool {
    true
}

fn validate_partitions(partitions: &mut [PartitionConfig]) -> Result<(), ConfigSchemaError> {
    if partitions.len() > PARTITIONS_MAX {
        return Err(ConfigSchemaError::ListTooLarge {
            section: "partitions",
            field: "id",
            len: partitions.len(),
            max: PARTITIONS_MAX,
        });
    }

    let mut seen = BTreeSet::new();
    for partition in partitions.iter_mut() {
        if !seen.insert(partition.id.clone()) {
            return Err(ConfigSchemaError::DuplicatePartition {
                id: partition.id.to_string(),
            });
        }
        normalize_optional_trimmed(&mut partition.endpoint_url);
        if let Some(endpoint) = partition.endpoint_url.as_deref() {
            validate_http_url("partitions", "endpointUrl", endpoint)?;
        }
    }
    Ok(())
}

/// Scheduler configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct SchedulerConfig {
    /// Tick interval (ms).
    pub interval_ms: u64,
    /// Lock file serializing ticks across processes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock_path: Option<PathBuf>,
    /// Run the first tick immediately instead of after one interval.
    pub run_on_start: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_ms: 60_000,
            lock_path: None,
            run_on_start: true,
        }
    }
}

/// Log output backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    /// JSON lines on stderr.
    #[default]
    Json,
    /// Forward events to `tracing`.
    Tracing,
}

impl LogFormat {
    /// Parse a format name.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "tracing" => Some(Self::Tracing),
            _ => None,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct LoggingConfig {
    /// Minimum level (`debug`, `info`, `warn`, `error`).
    pub level: Box<str>,
    /// Output backend.
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: LogFormat::Json,
        }
    }
}

impl LoggingConfig {
    fn normalize_and_validate(&mut self) -> Result<(), ConfigSchemaError> {
        let normalized = self.level.trim().to_ascii_lowercase();
        let normalized = if normalized == "warning" {
            "warn".to_string()
        } else {
            normalized
        };
        if !LOG_LEVELS.contains(&normalized.as_str()) {
            return Err(ConfigSchemaError::InvalidLogLevel {
                value: self.level.to_string(),
            });
        }
        self.level = normalized.into_boxed_str();
        Ok(())
    }
}

/// Config validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSchemaError {
    /// The config version is not supported by this binary.
    UnsupportedVersion {
        /// Version found in the config.
        found: u32,
        /// Version supported by this crate.
        supported: u32,
    },
    /// A timeout/interval value is out of bounds.
    TimeoutOutOfRange {
        /// Schema section (e.g. `core`).
        section: &'static str,
        /// Field name in the config file (e.g. `timeoutMs`).
        field: &'static str,
        /// Value provided (ms).
        value_ms: u64,
        /// Minimum allowed value (ms).
        min_ms: u64,
        /// Maximum allowed value (ms).
        max_ms: u64,
    },
    /// A numeric limit is out of bounds.
    LimitOutOfRange {
        /// Schema section.
        section: &'static str,
        /// Field name in the config file.
        field: &'static str,
        /// Value provided.
        value: u64,
        /// Minimum allowed value.
        min: u64,
        /// Maximum allowed value.
        max: u64,
    },
    /// A list field exceeds the maximum allowed size.
    ListTooLarge {
        /// Schema section.
        section: &'static str,
        /// Field name in the config file.
        field: &'static str,
        /// Number of entries.
        len: usize,
        /// Maximum allowed number of entries.
        max: usize,
    },
    /// A URL entry is invalid.
    InvalidUrl {
        /// Schema section.
        section: &'static str,
        /// Field name in the config file.
        field: &'static str,
        /// Invalid URL value.
        url: String,
    },
    /// A table or column name is not a plain SQL identifier.
    InvalidIdentifier {
        /// Schema section.
        section: &'static str,
        /// Field name in the config file.
        field: &'static str,
        /// Invalid value.
        value: String,
    },
    /// A storage provider is missing its path or connection.
    MissingStorageSetting {
        /// Schema section.
        section: &'static str,
        /// Missing field (`path` or `connection`).
        field: &'static str,
        /// Provider that needs the field.
        provider: StorageProvider,
    },
    /// The same partition id is configured twice.
    DuplicatePartition {
        /// Duplicated id.
        id: String,
    },
    /// Unknown log level.
    InvalidLogLevel {
        /// Value provided.
        value: String,
    },
}

impl ConfigSchemaError {
    fn error_code(&self) -> ErrorCode {
        match self {
            Self::UnsupportedVersion { .. } => ErrorCode::new("config", "unsupported_version"),
            Self::TimeoutOutOfRange { .. } => ErrorCode::new("config", "invalid_timeout"),
            Self::LimitOutOfRange { .. } => ErrorCode::new("config", "invalid_limit"),
            Self::ListTooLarge { .. } => ErrorCode::new("config", "list_too_large"),
            Self::InvalidUrl { .. } => ErrorCode::new("config", "invalid_url"),
            Self::InvalidIdentifier { .. } => ErrorCode::new("config", "invalid_identifier"),
            Self::MissingStorageSetting { .. } => ErrorCode::new("config", "missing_storage"),
            Self::DuplicatePartition { .. } => ErrorCode::new("config", "duplicate_partition"),
            Self::InvalidLogLevel { .. } => ErrorCode::new("config", "invalid_log_level"),
        }
    }
}

impl fmt::Display for ConfigSchemaError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedVersion { found, supported } => write!(
                formatter,
                "unsupported config version: {found} (supported: {supported})"
            ),
            Self::TimeoutOutOfRange {
                section,
                field,
                value_ms,
                min_ms,
                max_ms,
            } => write!(
                formatter,
                "{section}.{field} must be within [{min_ms}, {max_ms}] ms (got {value_ms})"
            ),
            Self::LimitOutOfRange {
                section,
                field,
                value,
                min,
                max,
            } => write!(
                formatter,
                "{section}.{field} must be within [{min}, {max}] (got {value})"
            ),
            Self::ListTooLarge {
                section,
                field,
                len,
                max,
            } => write!(
                formatter,
                "{section}.{field} must have at most {max} entries (got {len})"
            ),
            Self::InvalidUrl { section, field, .. } => {
                write!(formatter, "invalid URL for {section}.{field}")
            },
            Self::InvalidIdentifier { section, field, .. } => write!(
                formatter,
                "{section}.{field} must be a plain SQL identifier"
            ),
            Self::MissingStorageSetting {
                section,
                field,
                provider,
            } => write!(
                formatter,
                "{section}.{field} is required for the {provider} provider"
            ),
            Self::DuplicatePartition { id } => {
                write!(formatter, "partition {id} is configured more than once")
            },
            Self::InvalidLogLevel { value } => write!(
                formatter,
                "logging.level must be one of debug, info, warn, error (got {value})"
            ),
        }
    }
}

impl std::error::Error for ConfigSchemaError {}

impl From<ConfigSchemaError> for ErrorEnvelope {
    fn from(error: ConfigSchemaError) -> Self {
        let envelope = Self::expected(error.error_code(), error.to_string());

        match error {
            ConfigSchemaError::UnsupportedVersion { found, supported } => envelope
                .with_metadata("found", found.to_string())
                .with_metadata("supported", supported.to_string()),
            ConfigSchemaError::TimeoutOutOfRange {
                section,
                field,
                value_ms,
                min_ms,
                max_ms,
            } => envelope
                .with_metadata("section", section)
                .with_metadata("field", field)
                .with_metadata("value_ms", value_ms.to_string())
                .with_metadata("min_ms", min_ms.to_string())
                .with_metadata("max_ms", max_ms.to_string()),
            ConfigSchemaError::LimitOutOfRange {
                section,
                field,
                value,
                min,
                max,
            } => envelope
                .with_metadata("section", section)
                .with_metadata("field", field)
                .with_metadata("value", value.to_string())
                .with_metadata("min", min.to_string())
                .with_metadata("max", max.to_string()),
            ConfigSchemaError::ListTooLarge {
                section,
                field,
                len,
                max,
            } => envelope
                .with_metadata("section", section)
                .with_metadata("field", field)
                .with_metadata("len", len.to_string())
                .with_metadata("max", max.to_string()),
            ConfigSchemaError::InvalidUrl {
                section,
                field,
                url,
            } => envelope
                .with_metadata("section", section)
                .with_metadata("field", field)
                .with_metadata("url", sanitize_url_for_error(&url)),
            ConfigSchemaError::InvalidIdentifier {
                section,
                field,
                value,
            } => envelope
                .with_metadata("section", section)
                .with_metadata("field", field)
                .with_metadata("value", value),
            ConfigSchemaError::MissingStorageSetting {
                section,
                field,
                provider,
            } => envelope
                .with_metadata("section", section)
                .with_metadata("field", field)
                .with_metadata("provider", provider.as_str()),
            ConfigSchemaError::DuplicatePartition { id } => envelope.with_metadata("partition", id),
            ConfigSchemaError::InvalidLogLevel { value } => envelope.with_metadata("value", value),
        }
    }
}

fn validate_storage_location(
    section: &'static str,
    provider: StorageProvider,
    path: Option<&PathBuf>,
    connection: Option<&SecretString>,
) -> Result<(), ConfigSchemaError> {
    let present = match provider {
        StorageProvider::Sqlite => path.is_some_and(|path| !path.as_os_str().is_empty()),
        StorageProvider::Postgres => connection.is_some_and(|value| !value.expose().is_empty()),
    };
    if present {
        return Ok(());
    }
    Err(ConfigSchemaError::MissingStorageSetting {
        section,
        field: match provider {
            StorageProvider::Sqlite => "path",
            StorageProvider::Postgres => "connection",
        },
        provider,
    })
}

fn validate_identifier(
    section: &'static str,
    field: &'static str,
    value: &str,
) -> Result<(), ConfigSchemaError> {
    SqlIdentifier::parse(value)
        .map(|_| ())
        .map_err(|_| ConfigSchemaError::InvalidIdentifier {
            section,
            field,
            value: value.to_owned(),
        })
}

fn validate_http_url(
    section: &'static str,
    field: &'static str,
    value: &str,
) -> Result<(), ConfigSchemaError> {
    let invalid = || ConfigSchemaError::InvalidUrl {
        section,
        field,
        url: value.to_owned(),
    };
    let parsed = Url::parse(value).map_err(|_| invalid())?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(invalid());
    }
    Ok(())
}

const fn validate_limit_u64(
    section: &'static str,
    field: &'static str,
    value: u64,
    min: u64,
    max: u64,
) -> Result<(), ConfigSchemaError> {
    if value < min || value > max {
        return Err(ConfigSchemaError::LimitOutOfRange {
            section,
            field,
            value,
            min,
            max,
        });
    }
    Ok(())
}

fn bounded_u32<const MIN: u32, const MAX: u32>(
    section: &'static str,
    field: &'static str,
    value: u32,
    min: u32,
    max: u32,
) -> Result<BoundedU32<MIN, MAX>, ConfigSchemaError> {
    BoundedU32::try_new(value).map_err(|_| ConfigSchemaError::LimitOutOfRange {
        section,
        field,
        value: u64::from(value),
        min: u64::from(min),
        max: u64::from(max),
    })
}

fn bounded_timeout<const MIN: u64, const MAX: u64>(
    section: &'static str,
    field: &'static str,
    value_ms: u64,
    min_ms: u64,
    max_ms: u64,
) -> Result<BoundedU64<MIN, MAX>, ConfigSchemaError> {
    BoundedU64::try_new(value_ms).map_err(|_| ConfigSchemaError::TimeoutOutOfRange {
        section,
        field,
        value_ms,
        min_ms,
        max_ms,
    })
}

fn normalize_optional_trimmed(value: &mut Option<Box<str>>) {
    let Some(raw) = value.take() else {
        return;
    };
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
        *value = Some(trimmed.into());
    }
}

fn trim_box(value: &mut Box<str>) {
    let trimmed = value.trim();
    if trimmed.len() != value.len() {
        *value = trimmed.into();
    }
}
