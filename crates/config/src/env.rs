//! Environment variable parsing and env-to-config merging.
//!
//! This module keeps env parsing:
//! - strict (invalid values fail fast)
//! - deterministic (partition lists keep their order, duplicates collapse)
//! - safe (secret values are redacted in error metadata)

use crate::schema::{
    LogFormat, PartitionConfig, StorageProvider, SyncConfig, ValidatedSyncConfig,
};
use catalog_sync_domain::PartitionId;
use catalog_sync_shared::{ErrorCode, ErrorEnvelope, SecretString, redact_if_secret};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use url::Url;

/// Env var: core timeout in milliseconds.
pub const ENV_CORE_TIMEOUT_MS: &str = "CSY_CORE_TIMEOUT_MS";
/// Env var: retry max attempts.
pub const ENV_CORE_RETRY_MAX_ATTEMPTS: &str = "CSY_CORE_RETRY_MAX_ATTEMPTS";
/// Env var: retry base delay in ms.
pub const ENV_CORE_RETRY_BASE_DELAY_MS: &str = "CSY_CORE_RETRY_BASE_DELAY_MS";
/// Env var: retry max delay in ms.
pub const ENV_CORE_RETRY_MAX_DELAY_MS: &str = "CSY_CORE_RETRY_MAX_DELAY_MS";

/// Env var: change feed provider (`sqlite` | `postgres`).
pub const ENV_CHANGELOG_PROVIDER: &str = "CSY_CHANGELOG_PROVIDER";
/// Env var: change feed `SQLite` path.
pub const ENV_CHANGELOG_PATH: &str = "CSY_CHANGELOG_PATH";
/// Env var: change feed connection URL (secret).
pub const ENV_CHANGELOG_CONNECTION: &str = "CSY_CHANGELOG_CONNECTION";
/// Env var: change table name.
pub const ENV_CHANGELOG_TABLE: &str = "CSY_CHANGELOG_TABLE";

/// Env var: watermark store provider (`sqlite` | `postgres`).
pub const ENV_WATERMARKS_PROVIDER: &str = "CSY_WATERMARKS_PROVIDER";
/// Env var: watermark store `SQLite` path.
pub const ENV_WATERMARKS_PATH: &str = "CSY_WATERMARKS_PATH";
/// Env var: watermark store connection URL (secret).
pub const ENV_WATERMARKS_CONNECTION: &str = "CSY_WATERMARKS_CONNECTION";

/// Env var: notifier base URL.
pub const ENV_NOTIFIER_BASE_URL: &str = "CSY_NOTIFIER_BASE_URL";
/// Env var: notifier request timeout in milliseconds.
pub const ENV_NOTIFIER_TIMEOUT_MS: &str = "CSY_NOTIFIER_TIMEOUT_MS";
/// Env var: notifier bearer token (secret).
// gitleaks:allow
pub const ENV_NOTIFIER_TOKEN: &str = "CSY_NOTIFIER_TOKEN";

/// Env var: partitions to sync as CSV (replaces the configured list).
pub const ENV_PARTITIONS: &str = "CSY_PARTITIONS";
/// Env var: partitions to disable as CSV.
pub const ENV_PARTITIONS_DISABLED: &str = "CSY_PARTITIONS_DISABLED";

/// Env var: scheduler interval in milliseconds.
pub const ENV_SCHEDULER_INTERVAL_MS: &str = "CSY_SCHEDULER_INTERVAL_MS";
/// Env var: scheduler lock file path.
pub const ENV_SCHEDULER_LOCK_PATH: &str = "CSY_SCHEDULER_LOCK_PATH";

/// Env var: minimum log level.
pub const ENV_LOG_LEVEL: &str = "CSY_LOG_LEVEL";
/// Env var: log output backend (`json` | `tracing`).
pub const ENV_LOG_FORMAT: &str = "CSY_LOG_FORMAT";

const ALL_ENV_VARS: [&str; 20] = [
    ENV_CORE_TIMEOUT_MS,
    ENV_CORE_RETRY_MAX_ATTEMPTS,
    ENV_CORE_RETRY_BASE_DELAY_MS,
    ENV_CORE_RETRY_MAX_DELAY_MS,
    ENV_CHANGELOG_PROVIDER,
    ENV_CHANGELOG_PATH,
    ENV_CHANGELOG_CONNECTION,
    ENV_CHANGELOG_TABLE,
    ENV_WATERMARKS_PROVIDER,
    ENV_WATERMARKS_PATH,
    ENV_WATERMARKS_CONNECTION,
    ENV_NOTIFIER_BASE_URL,
    ENV_NOTIFIER_TIMEOUT_MS,
    ENV_NOTIFIER_TOKEN,
    ENV_PARTITIONS,
    ENV_PARTITIONS_DISABLED,
    ENV_SCHEDULER_INTERVAL_MS,
    ENV_SCHEDULER_LOCK_PATH,
    ENV_LOG_LEVEL,
    ENV_LOG_FORMAT,
];

const MAX_CSV_ITEMS: usize = 1_024;

/// Parsed env overrides. Every field is optional; `None` leaves the
/// file/default value untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncEnv {
    /// Core timeout override.
    pub core_timeout_ms: Option<u64>,
    /// Retry attempts override.
    pub core_retry_max_attempts: Option<u32>,
    /// Retry base delay override.
    pub core_retry_base_delay_ms: Option<u64>,
    /// Retry max delay override.
    pub core_retry_max_delay_ms: Option<u64>,
    /// Change feed provider override.
    pub changelog_provider: Option<StorageProvider>,
    /// Change feed path override.
    pub changelog_path: Option<PathBuf>,
    /// Change feed connection URL.
    pub changelog_connection: Option<SecretString>,
    /// Change table override.
    pub changelog_table: Option<Box<str>>,
    /// Watermark store provider override.
    pub watermarks_provider: Option<StorageProvider>,
    /// Watermark store path override.
    pub watermarks_path: Option<PathBuf>,
    /// Watermark store connection URL.
    pub watermarks_connection: Option<SecretString>,
    /// Notifier base URL override.
    pub notifier_base_url: Option<Box<str>>,
    /// Notifier timeout override.
    pub notifier_timeout_ms: Option<u64>,
    /// Notifier bearer token.
    pub notifier_token: Option<SecretString>,
    /// Partition list replacement.
    pub partitions: Option<Vec<PartitionId>>,
    /// Partitions to disable.
    pub partitions_disabled: Option<Vec<PartitionId>>,
    /// Scheduler interval override.
    pub scheduler_interval_ms: Option<u64>,
    /// Scheduler lock path override.
    pub scheduler_lock_path: Option<PathBuf>,
    /// Log level override (validated with the rest of the config).
    pub log_level: Option<Box<str>>,
    /// Log format override.
    pub log_format: Option<LogFormat>,
}

impl SyncEnv {
    /// Parse env overrides from a key/value map (useful for tests and fixtures).
    pub fn from_map(map: &BTreeMap<String, String>) -> Result<Self, EnvParseError> {
        Ok(Self {
            core_timeout_ms: parse_optional_u64(map, ENV_CORE_TIMEOUT_MS)?,
            core_retry_max_attempts: parse_optional_u32(map, ENV_CORE_RETRY_MAX_ATTEMPTS)?,
            core_retry_base_delay_ms: parse_optional_u64(map, ENV_CORE_RETRY_BASE_DELAY_MS)?,
            core_retry_max_delay_ms: parse_optional_u64(map, ENV_CORE_RETRY_MAX_DELAY_MS)?,
            changelog_provider: parse_optional_provider(map, ENV_CHANGELOG_PROVIDER)?,
            changelog_path: parse_optional_path(map, ENV_CHANGELOG_PATH)?,
            changelog_connection: parse_optional_secret(map, ENV_CHANGELOG_CONNECTION)?,
            changelog_table: parse_optional_trimmed_string(map, ENV_CHANGELOG_TABLE)?,
            watermarks_provider: parse_optional_provider(map, ENV_WATERMARKS_PROVIDER)?,
            watermarks_path: parse_optional_path(map, ENV_WATERMARKS_PATH)?,
            watermarks_connection: parse_optional_secret(map, ENV_WATERMARKS_CONNECTION)?,
            notifier_base_url: parse_optional_url_string(map, ENV_NOTIFIER_BASE_URL)?,
            notifier_timeout_ms: parse_optional_u64(map, ENV_NOTIFIER_TIMEOUT_MS)?,
            notifier_token: parse_optional_secret(map, ENV_NOTIFIER_TOKEN)?,
            partitions: parse_optional_csv_partitions(map, ENV_PARTITIONS)?,
            partitions_disabled: parse_optional_csv_partitions(map, ENV_PARTITIONS_DISABLED)?,
            scheduler_interval_ms: parse_optional_u64(map, ENV_SCHEDULER_INTERVAL_MS)?,
            scheduler_lock_path: parse_optional_path(map, ENV_SCHEDULER_LOCK_PATH)?,
            log_level: parse_optional_trimmed_string(map, ENV_LOG_LEVEL)?,
            log_format: parse_optional_log_format(map, ENV_LOG_FORMAT)?,
        })
    }

    /// Parse env overrides from the current process environment.
    pub fn from_std_env() -> Result<Self, EnvParseError> {
        let mut map = BTreeMap::new();
        for name in ALL_ENV_VARS {
            if let Ok(value) = std::env::var(name) {
                map.insert(name.to_string(), value);
            }
        }

        Self::from_map(&map)
    }
}

/// Apply env overrides to a base config (env wins over file/default values).
pub fn apply_env_overrides(
    base: SyncConfig,
    env: &SyncEnv,
) -> Result<ValidatedSyncConfig, ErrorEnvelope> {
    let mut config = base;
    apply_core_env_overrides(&mut config, env);
    apply_storage_env_overrides(&mut config, env);
    apply_notifier_env_overrides(&mut config, env);
    apply_partition_env_overrides(&mut config, env);
    apply_runtime_env_overrides(&mut config, env);

    config.validate_and_normalize().map_err(Into::into)
}

const fn apply_core_env_overrides(config: &mut SyncConfig, env: &SyncEnv) {
    let mapper = EnvConfigMapper::new(config);
    EnvConfigMapper::set_u64(&mut mapper.config.core.timeout_ms, env.core_timeout_ms);
    EnvConfigMapper::set_u32(
        &mut mapper.config.core.retry.max_attempts,
        env.core_retry_max_attempts,
    );
    EnvConfigMapper::set_u64(
        &mut mapper.config.core.retry.base_delay_ms,
        env.core_retry_base_delay_ms,
    );
    EnvConfigMapper::set_u64(
        &mut mapper.config.core.retry.max_delay_ms,
        env.core_retry_max_delay_ms,
    );
}

fn apply_storage_env_overrides(config: &mut SyncConfig, env: &SyncEnv) {
    let mapper = EnvConfigMapper::new(config);
    EnvConfigMapper::set_clone(
        &mut mapper.config.changelog.provider,
        env.changelog_provider.as_ref(),
    );
    EnvConfigMapper::set_opt_clone(
        &mut mapper.config.changelog.path,
        env.changelog_path.as_ref(),
    );
    EnvConfigMapper::set_opt_clone(
        &mut mapper.config.changelog.connection,
        env.changelog_connection.as_ref(),
    );
    EnvConfigMapper::set_clone(
        &mut mapper.config.changelog.table,
        env.changelog_table.as_ref(),
    );
    EnvConfigMapper::set_clone(
        &mut mapper.config.watermarks.provider,
        env.watermarks_provider.as_ref(),
    );
    EnvConfigMapper::set_opt_clone(
        &mut mapper.config.watermarks.path,
        env.watermarks_path.as_ref(),
    );
    EnvConfigMapper::set_opt_clone(
        &mut mapper.config.watermarks.connection,
        env.watermarks_connection.as_ref(),
    );
}

fn apply_notifier_env_overrides(config: &mut SyncConfig, env: &SyncEnv) {
    let mapper = EnvConfigMapper::new(config);
    EnvConfigMapper::set_opt_box_str(
        &mut mapper.config.notifier.base_url,
        env.notifier_base_url.as_deref(),
    );
    EnvConfigMapper::set_u64(
        &mut mapper.config.notifier.timeout_ms,
        env.notifier_timeout_ms,
    );
    EnvConfigMapper::set_opt_clone(
        &mut mapper.config.notifier.token,
        env.notifier_token.as_ref(),
    );
}

fn apply_partition_env_overrides(config: &mut SyncConfig, env: &SyncEnv) {
    if let Some(ids) = env.partitions.as_ref() {
        let previous = std::mem::take(&mut config.partitions);
        config.partitions = ids
            .iter()
            .map(|id| PartitionConfig {
                endpoint_url: previous
                    .iter()
                    .find(|entry| &entry.id == id)
                    .and_then(|entry| entry.endpoint_url.clone()),
                ..PartitionConfig::enabled(id.clone())
            })
            .collect();
    }

    if let Some(disabled) = env.partitions_disabled.as_ref() {
        for partition in &mut config.partitions {
            if disabled.contains(&partition.id) {
                partition.enabled = false;
            }
        }
    }
}

fn apply_runtime_env_overrides(config: &mut SyncConfig, env: &SyncEnv) {
    let mapper = EnvConfigMapper::new(config);
    EnvConfigMapper::set_u64(
        &mut mapper.config.scheduler.interval_ms,
        env.scheduler_interval_ms,
    );
    EnvConfigMapper::set_opt_clone(
        &mut mapper.config.scheduler.lock_path,
        env.scheduler_lock_path.as_ref(),
    );
    EnvConfigMapper::set_clone(&mut mapper.config.logging.level, env.log_level.as_ref());
    EnvConfigMapper::set_clone(&mut mapper.config.logging.format, env.log_format.as_ref());
}

struct EnvConfigMapper<'a> {
    config: &'a mut SyncConfig,
}

impl<'a> EnvConfigMapper<'a> {
    const fn new(config: &'a mut SyncConfig) -> Self {
        Self { config }
    }

    const fn set_u64(field: &mut u64, value: Option<u64>) {
        if let Some(value) = value {
            *field = value;
        }
    }

    const fn set_u32(field: &mut u32, value: Option<u32>) {
        if let Some(value) = value {
            *field = value;
        }
    }

    fn set_opt_box_str(field: &mut Option<Box<str>>, value: Option<&str>) {
        if let Some(value) = value {
            *field = Some(value.to_owned().into_boxed_str());
        }
    }

    fn set_clone<T: Clone>(field: &mut T, value: Option<&T>) {
        if let Some(value) = value {
            *field = value.clone();
        }
    }

    fn set_opt_clone<T: Clone>(field: &mut Option<T>, value: Option<&T>) {
        if let Some(value) = value {
            *field = Some(value.clone());
        }
    }
}

/// Validation failures when parsing env variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvParseError {
    /// An env var was present but empty after trimming.
    EmptyValue {
        /// Env var name.
        var: &'static str,
    },
    /// A secret env var was present but empty after trimming.
    EmptySecret {
        /// Env var name.
        var: &'static str,
    },
    /// Integer env var had an invalid value.
    InvalidInt {
        /// Env var name.
        var: &'static str,
        /// Raw input value.
        value: String,
    },
    /// URL env var had an invalid value.
    InvalidUrl {
        /// Env var name.
        var: &'static str,
        /// Raw input value.
        value: String,
    },
    /// Enum env var had an invalid value.
    InvalidEnum {
        /// Env var name.
        var: &'static str,
        /// Raw input value.
        value: String,
    },
    /// CSV list exceeds a safety limit.
    CsvTooLarge {
        /// Env var name.
        var: &'static str,
        /// Number of parsed items.
        len: usize,
        /// Maximum allowed.
        max: usize,
    },
    /// CSV contained an invalid partition id.
    InvalidPartitionEntry {
        /// Env var name.
        var: &'static str,
        /// Invalid entry.
        entry: String,
    },
}

impl EnvParseError {
    fn error_code(&self) -> ErrorCode {
        match self {
            Self::EmptyValue { .. } | Self::EmptySecret { .. } => {
                ErrorCode::new("config", "empty_env_var")
            },
            Self::InvalidInt { .. } => ErrorCode::new("config", "invalid_env_int"),
            Self::InvalidUrl { .. } => ErrorCode::new("config", "invalid_env_url"),
            Self::InvalidEnum { .. } => ErrorCode::new("config", "invalid_env_enum"),
            Self::CsvTooLarge { .. } | Self::InvalidPartitionEntry { .. } => {
                ErrorCode::new("config", "invalid_env_csv")
            },
        }
    }
}

impl fmt::Display for EnvParseError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyValue { var } | Self::EmptySecret { var } => {
                write!(formatter, "{var} must be non-empty")
            },
            Self::InvalidInt { var, .. } => write!(formatter, "{var} must be an integer"),
            Self::InvalidUrl { var, .. } => write!(formatter, "{var} must be a valid URL"),
            Self::InvalidEnum { var, .. } => write!(formatter, "{var} has an unsupported value"),
            Self::CsvTooLarge { var, len, max } => {
                write!(formatter, "{var} is too large ({len} items, max {max})")
            },
            Self::InvalidPartitionEntry { var, entry } => {
                write!(formatter, "{var} contains invalid partition id: {entry}")
            },
        }
    }
}

impl std::error::Error for EnvParseError {}

impl From<EnvParseError> for ErrorEnvelope {
    fn from(error: EnvParseError) -> Self {
        let code = error.error_code();
        let message = error.to_string();
        let mut envelope = Self::expected(code, message);

        match error {
            EnvParseError::EmptyValue { var } | EnvParseError::EmptySecret { var } => {
                envelope = envelope.with_metadata("env_var", var);
            },
            EnvParseError::InvalidInt { var, value }
            | EnvParseError::InvalidUrl { var, value }
            | EnvParseError::InvalidEnum { var, value } => {
                envelope = envelope
                    .with_metadata("env_var", var)
                    .with_metadata("value", redact_if_secret(var, &value));
            },
            EnvParseError::CsvTooLarge { var, len, max } => {
                envelope = envelope
                    .with_metadata("env_var", var)
                    .with_metadata("len", len.to_string())
                    .with_metadata("max", max.to_string());
            },
            EnvParseError::InvalidPartitionEntry { var, entry } => {
                envelope = envelope
                    .with_metadata("env_var", var)
                    .with_metadata("entry", entry);
            },
        }

        envelope
    }
}

fn required_trimmed<'a>(
    map: &'a BTreeMap<String, String>,
    var: &'static str,
) -> Result<Option<&'a str>, EnvParseError> {
    let Some(raw) = map.get(var) else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(EnvParseError::EmptyValue { var });
    }
    Ok(Some(trimmed))
}

fn parse_optional_trimmed_string(
    map: &BTreeMap<String, String>,
    var: &'static str,
) -> Result<Option<Box<str>>, EnvParseError> {
    Ok(required_trimmed(map, var)?.map(|value| value.to_owned().into_boxed_str()))
}

fn parse_optional_path(
    map: &BTreeMap<String, String>,
    var: &'static str,
) -> Result<Option<PathBuf>, EnvParseError> {
    Ok(required_trimmed(map, var)?.map(PathBuf::from))
}

fn parse_optional_secret(
    map: &BTreeMap<String, String>,
    var: &'static str,
) -> Result<Option<SecretString>, EnvParseError> {
    let Some(raw) = map.get(var) else {
        return Ok(None);
    };

    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(EnvParseError::EmptySecret { var });
    }

    Ok(Some(SecretString::new(trimmed.to_owned())))
}

fn parse_optional_u64(
    map: &BTreeMap<String, String>,
    var: &'static str,
) -> Result<Option<u64>, EnvParseError> {
    let Some(trimmed) = required_trimmed(map, var)? else {
        return Ok(None);
    };

    trimmed
        .parse::<u64>()
        .map(Some)
        .map_err(|_| EnvParseError::InvalidInt {
            var,
            value: trimmed.to_owned(),
        })
}

fn parse_optional_u32(
    map: &BTreeMap<String, String>,
    var: &'static str,
) -> Result<Option<u32>, EnvParseError> {
    let Some(trimmed) = required_trimmed(map, var)? else {
        return Ok(None);
    };

    trimmed
        .parse::<u32>()
        .map(Some)
        .map_err(|_| EnvParseError::InvalidInt {
            var,
            value: trimmed.to_owned(),
        })
}

fn parse_optional_provider(
    map: &BTreeMap<String, String>,
    var: &'static str,
) -> Result<Option<StorageProvider>, EnvParseError> {
    let Some(trimmed) = required_trimmed(map, var)? else {
        return Ok(None);
    };
    StorageProvider::parse(trimmed)
        .map(Some)
        .ok_or_else(|| EnvParseError::InvalidEnum {
            var,
            value: trimmed.to_owned(),
        })
}

fn parse_optional_log_format(
    map: &BTreeMap<String, String>,
    var: &'static str,
) -> Result<Option<LogFormat>, EnvParseError> {
    let Some(trimmed) = required_trimmed(map, var)? else {
        return Ok(None);
    };
    LogFormat::parse(trimmed)
        .map(Some)
        .ok_or_else(|| EnvParseError::InvalidEnum {
            var,
            value: trimmed.to_owned(),
        })
}

fn parse_optional_url_string(
    map: &BTreeMap<String, String>,
    var: &'static str,
) -> Result<Option<Box<str>>, EnvParseError> {
    let Some(trimmed) = required_trimmed(map, var)? else {
        return Ok(None);
    };

    let invalid = || EnvParseError::InvalidUrl {
        var,
        value: trimmed.to_owned(),
    };
    let parsed = Url::parse(trimmed).map_err(|_| invalid())?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(invalid());
    }

    Ok(Some(trimmed.to_owned().into_boxed_str()))
}

fn parse_optional_csv_partitions(
    map: &BTreeMap<String, String>,
    var: &'static str,
) -> Result<Option<Vec<PartitionId>>, EnvParseError> {
    let Some(raw) = map.get(var) else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Some(Vec::new()));
    }

    let items = parse_csv(trimmed);
    if items.len() > MAX_CSV_ITEMS {
        return Err(EnvParseError::CsvTooLarge {
            var,
            len: items.len(),
            max: MAX_CSV_ITEMS,
        });
    }

    let mut partitions: Vec<PartitionId> = Vec::with_capacity(items.len());
    for item in items {
        let id = PartitionId::parse(&item)
            .map_err(|_| EnvParseError::InvalidPartitionEntry { var, entry: item })?;
        if !partitions.contains(&id) {
            partitions.push(id);
        }
    }
    Ok(Some(partitions))
}

fn parse_csv(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    fn env_map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect()
    }

    fn base_config() -> SyncConfig {
        let mut config = SyncConfig::default();
        config.changelog.path = Some(PathBuf::from("catalog.db"));
        config
    }

    #[test]
    fn int_parsing_with_missing_defaults_to_none() -> Result<(), Box<dyn Error>> {
        let map = BTreeMap::new();
        assert_eq!(parse_optional_u32(&map, "MISSING")?, None);
        assert_eq!(parse_optional_u64(&map, "MISSING")?, None);
        Ok(())
    }

    #[test]
    fn partition_csv_keeps_order_and_dedups() -> Result<(), Box<dyn Error>> {
        let env = SyncEnv::from_map(&env_map(&[(ENV_PARTITIONS, " 2, 0 ,2,1,")]))?;
        let ids: Vec<&str> = env
            .partitions
            .as_ref()
            .ok_or_else(|| std::io::Error::other("missing partitions"))?
            .iter()
            .map(PartitionId::as_str)
            .collect();
        assert_eq!(ids, vec!["2", "0", "1"]);
        Ok(())
    }

    #[test]
    fn invalid_partition_entry_is_rejected() {
        let error = SyncEnv::from_map(&env_map(&[(ENV_PARTITIONS, "1,store one")])).err();
        assert!(matches!(
            error,
            Some(EnvParseError::InvalidPartitionEntry { .. })
        ));
    }

    #[test]
    fn partitions_env_replaces_list_and_keeps_endpoint_overrides() -> Result<(), Box<dyn Error>> {
        let mut base = base_config();
        base.partitions = vec![
            PartitionConfig {
                endpoint_url: Some("https://one.example/hook".into()),
                ..PartitionConfig::enabled(PartitionId::parse("1")?)
            },
            PartitionConfig::enabled(PartitionId::parse("9")?),
        ];
        let env = SyncEnv::from_map(&env_map(&[
            (ENV_PARTITIONS, "0,1"),
            (ENV_PARTITIONS_DISABLED, "0"),
        ]))?;

        let config = apply_env_overrides(base, &env)?;
        assert_eq!(config.partitions.len(), 2);
        assert_eq!(config.partitions[0].id.as_str(), "0");
        assert!(!config.partitions[0].enabled);
        assert!(config.partitions[1].enabled);
        assert_eq!(
            config.partitions[1].endpoint_url.as_deref(),
            Some("https://one.example/hook")
        );
        Ok(())
    }

    #[test]
    fn url_validation_accepts_http_and_https() -> Result<(), Box<dyn Error>> {
        let env = SyncEnv::from_map(&env_map(&[(ENV_NOTIFIER_BASE_URL, "https://backend.example")]))?;
        assert_eq!(
            env.notifier_base_url.as_deref(),
            Some("https://backend.example")
        );

        let error = SyncEnv::from_map(&env_map(&[(ENV_NOTIFIER_BASE_URL, "ftp://x")])).err();
        assert!(matches!(error, Some(EnvParseError::InvalidUrl { .. })));
        Ok(())
    }

    #[test]
    fn secrets_flow_into_config_without_serialization() -> Result<(), Box<dyn Error>> {
        let env = SyncEnv::from_map(&env_map(&[
            (ENV_CHANGELOG_PROVIDER, "postgres"),
            (ENV_CHANGELOG_CONNECTION, "postgres://sync:pw@db/catalog"),
            (ENV_NOTIFIER_TOKEN, "tok"),
        ]))?;
        let config = apply_env_overrides(SyncConfig::default(), &env)?;

        assert_eq!(config.changelog.provider, StorageProvider::Postgres);
        assert_eq!(
            config.changelog.connection.as_ref().map(SecretString::expose),
            Some("postgres://sync:pw@db/catalog")
        );
        let json = serde_json::to_string(config.as_ref())?;
        assert!(!json.contains("pw@db"));
        assert!(!json.contains("tok"));
        Ok(())
    }

    #[test]
    fn secret_values_are_redacted_in_error_metadata() -> Result<(), Box<dyn Error>> {
        let error = SyncEnv::from_map(&env_map(&[(ENV_NOTIFIER_TOKEN, "   ")])).err();
        let envelope: ErrorEnvelope = error
            .ok_or_else(|| std::io::Error::other("expected secret error"))?
            .into();

        assert_eq!(envelope.code, ErrorCode::new("config", "empty_env_var"));
        assert_eq!(
            envelope.metadata.get("env_var").map(String::as_str),
            Some(ENV_NOTIFIER_TOKEN)
        );
        assert!(
            !envelope.metadata.contains_key("value"),
            "empty secrets should not echo value"
        );
        Ok(())
    }

    #[test]
    fn invalid_log_level_fails_validation() -> Result<(), Box<dyn Error>> {
        let env = SyncEnv::from_map(&env_map(&[(ENV_LOG_LEVEL, "chatty")]))?;
        let error = apply_env_overrides(base_config(), &env)
            .err()
            .ok_or_else(|| std::io::Error::other("expected invalid log level"))?;
        assert_eq!(error.code, ErrorCode::new("config", "invalid_log_level"));
        Ok(())
    }

    #[test]
    fn every_declared_var_is_read_from_std_env() {
        let unique: std::collections::BTreeSet<&str> = ALL_ENV_VARS.into_iter().collect();
        assert_eq!(unique.len(), ALL_ENV_VARS.len());
        assert!(ALL_ENV_VARS.iter().all(|name| name.starts_with("CSY_")));
    }
}
