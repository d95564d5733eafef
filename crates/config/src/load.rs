//! Config loading helpers (env + file + overrides).
//!
//! The loader is responsible for deterministic merge order and surfacing
//! user-facing errors as typed `ErrorEnvelope`s.

use crate::{
    LogFormat, PartitionConfig, StorageProvider, SyncConfig, SyncEnv, ValidatedSyncConfig,
    apply_env_overrides,
};
use catalog_sync_shared::{ErrorClass, ErrorCode, ErrorEnvelope};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigFormat {
    Json,
    Toml,
}

/// Load the sync config from sources using a deterministic precedence order.
///
/// Precedence (highest wins):
/// - env overrides (`SyncEnv`)
/// - overrides JSON (partial config)
/// - config JSON (file content)
/// - defaults (`SyncConfig::default()`)
pub fn load_sync_config_from_sources(
    config_json: Option<&str>,
    overrides_json: Option<&str>,
    env: &SyncEnv,
) -> Result<ValidatedSyncConfig, ErrorEnvelope> {
    let config = match config_json {
        None => SyncConfig::default(),
        Some(input) => parse_config_unvalidated(input, ConfigFormat::Json)?,
    };
    merge_and_validate(config, overrides_json, env)
}

/// Load the sync config from an optional file path (`.json` or `.toml`).
pub fn load_sync_config_from_path(
    config_path: Option<&Path>,
    overrides_json: Option<&str>,
    env: &SyncEnv,
) -> Result<ValidatedSyncConfig, ErrorEnvelope> {
    let config = match config_path {
        None => SyncConfig::default(),
        Some(path) => {
            let format = detect_config_format(path)?;
            let config_text = read_config_file(path)?;
            parse_config_unvalidated(&config_text, format)?
        },
    };
    merge_and_validate(config, overrides_json, env)
}

/// Load the sync config from std env and an optional file path.
pub fn load_sync_config_std_env(
    config_path: Option<&Path>,
    overrides_json: Option<&str>,
) -> Result<ValidatedSyncConfig, ErrorEnvelope> {
    let env = SyncEnv::from_std_env().map_err(ErrorEnvelope::from)?;
    load_sync_config_from_path(config_path, overrides_json, &env)
}

fn merge_and_validate(
    mut config: SyncConfig,
    overrides_json: Option<&str>,
    env: &SyncEnv,
) -> Result<ValidatedSyncConfig, ErrorEnvelope> {
    if let Some(input) = overrides_json {
        let overrides = parse_overrides_json(input)?;
        apply_overrides(&mut config, overrides);
    }

    // env is applied last and also validates/normalizes the resulting config.
    apply_env_overrides(config, env)
}

/// Serialize the config as deterministic pretty JSON (with trailing newline).
pub fn to_pretty_json(config: &SyncConfig) -> Result<String, ErrorEnvelope> {
    let mut output = serde_json::to_string_pretty(config).map_err(|error| {
        ErrorEnvelope::unexpected(
            ErrorCode::internal(),
            format!("failed to serialize config: {error}"),
            ErrorClass::NonRetriable,
        )
    })?;
    output.push('\n');
    Ok(output)
}

/// Serialize the config as deterministic pretty TOML (with trailing newline).
pub fn to_pretty_toml(config: &SyncConfig) -> Result<String, ErrorEnvelope> {
    let mut output = toml::to_string_pretty(config).map_err(|error| {
        ErrorEnvelope::unexpected(
            ErrorCode::new("config", "serialize_toml"),
            format!("failed to serialize config TOML: {error}"),
            ErrorClass::NonRetriable,
        )
    })?;
    output.push('\n');
    Ok(output)
}

fn parse_config_unvalidated(input: &str, format: ConfigFormat) -> Result<SyncConfig, ErrorEnvelope> {
    match format {
        ConfigFormat::Json => serde_json::from_str(input).map_err(|error| {
            ErrorEnvelope::expected(
                ErrorCode::new("config", "invalid_json"),
                format!("invalid config JSON: {error}"),
            )
            .with_metadata("source", "config")
        }),
        ConfigFormat::Toml => toml::from_str(input).map_err(|error| {
            ErrorEnvelope::expected(
                ErrorCode::new("config", "invalid_toml"),
                format!("invalid config TOML: {error}"),
            )
            .with_metadata("source", "config")
        }),
    }
}

fn parse_overrides_json(input: &str) -> Result<SyncConfigOverrides, ErrorEnvelope> {
    serde_json::from_str(input).map_err(|error| {
        ErrorEnvelope::expected(
            ErrorCode::new("config", "invalid_json"),
            format!("invalid overrides JSON: {error}"),
        )
        .with_metadata("source", "overrides")
    })
}

fn read_config_file(path: &Path) -> Result<String, ErrorEnvelope> {
    std::fs::read_to_string(path).map_err(|error| {
        let code = match error.kind() {
            std::io::ErrorKind::NotFound => ErrorCode::new("config", "config_file_not_found"),
            std::io::ErrorKind::PermissionDenied => {
                ErrorCode::new("config", "config_file_permission_denied")
            },
            _ => ErrorCode::new("config", "config_file_io"),
        };

        ErrorEnvelope::expected(code, format!("failed to read config file: {error}"))
            .with_metadata("path", path.to_string_lossy().to_string())
    })
}

fn detect_config_format(path: &Path) -> Result<ConfigFormat, ErrorEnvelope> {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        None | Some("json") => Ok(ConfigFormat::Json),
        Some("toml") => Ok(ConfigFormat::Toml),
        Some(other) => Err(ErrorEnvelope::expected(
            ErrorCode::new("config", "unsupported_format"),
            "unsupported config format; use .json or .toml",
        )
        .with_metadata("extension", other.to_string())),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
struct SyncConfigOverrides {
    version: Option<u32>,
    core: CoreConfigOverrides,
    changelog: ChangelogOverrides,
    watermarks: WatermarkStoreOverrides,
    notifier: NotifierOverrides,
    partitions: Option<Vec<PartitionConfig>>,
    scheduler: SchedulerOverrides,
    logging: LoggingOverrides,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
struct CoreConfigOverrides {
    timeout_ms: Option<u64>,
    retry: RetryConfigOverrides,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
struct RetryConfigOverrides {
    max_attempts: Option<u32>,
    base_delay_ms: Option<u64>,
    max_delay_ms: Option<u64>,
    jitter_ratio_pct: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
struct ChangelogOverrides {
    provider: Option<StorageProvider>,
    path: Option<PathBuf>,
    table: Option<Box<str>>,
    entity_column: Option<Box<str>>,
    version_column: Option<Box<str>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
struct WatermarkStoreOverrides {
    provider: Option<StorageProvider>,
    path: Option<PathBuf>,
    table: Option<Box<str>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
struct NotifierOverrides {
    base_url: Option<Box<str>>,
    path: Option<Box<str>>,
    timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
struct SchedulerOverrides {
    interval_ms: Option<u64>,
    lock_path: Option<PathBuf>,
    run_on_start: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
struct LoggingOverrides {
    level: Option<Box<str>>,
    format: Option<LogFormat>,
}

fn apply_overrides(config: &mut SyncConfig, overrides: SyncConfigOverrides) {
    OverrideMapper::set(&mut config.version, overrides.version);

    let core = overrides.core;
    OverrideMapper::set(&mut config.core.timeout_ms, core.timeout_ms);
    OverrideMapper::set(&mut config.core.retry.max_attempts, core.retry.max_attempts);
    OverrideMapper::set(&mut config.core.retry.base_delay_ms, core.retry.base_delay_ms);
    OverrideMapper::set(&mut config.core.retry.max_delay_ms, core.retry.max_delay_ms);
    OverrideMapper::set(
        &mut config.core.retry.jitter_ratio_pct,
        core.retry.jitter_ratio_pct,
    );

    let changelog = overrides.changelog;
    OverrideMapper::set(&mut config.changelog.provider, changelog.provider);
    OverrideMapper::set_opt(&mut config.changelog.path, changelog.path);
    OverrideMapper::set(&mut config.changelog.table, changelog.table);
    OverrideMapper::set(&mut config.changelog.entity_column, changelog.entity_column);
    OverrideMapper::set(
        &mut config.changelog.version_column,
        changelog.version_column,
    );

    let watermarks = overrides.watermarks;
    OverrideMapper::set(&mut config.watermarks.provider, watermarks.provider);
    OverrideMapper::set_opt(&mut config.watermarks.path, watermarks.path);
    OverrideMapper::set(&mut config.watermarks.table, watermarks.table);

    let notifier = overrides.notifier;
    OverrideMapper::set_opt(&mut config.notifier.base_url, notifier.base_url);
    OverrideMapper::set(&mut config.notifier.path, notifier.path);
    OverrideMapper::set(&mut config.notifier.timeout_ms, notifier.timeout_ms);

    OverrideMapper::set(&mut config.partitions, overrides.partitions);

    let scheduler = overrides.scheduler;
    OverrideMapper::set(&mut config.scheduler.interval_ms, scheduler.interval_ms);
    OverrideMapper::set_opt(&mut config.scheduler.lock_path, scheduler.lock_path);
    OverrideMapper::set(&mut config.scheduler.run_on_start, scheduler.run_on_start);

    let logging = overrides.logging;
    OverrideMapper::set(&mut config.logging.level, logging.level);
    OverrideMapper::set(&mut config.logging.format, logging.format);
}

struct OverrideMapper;

impl OverrideMapper {
    fn set<T>(field: &mut T, value: Option<T>) {
        if let Some(value) = value {
            *field = value;
        }
    }

    fn set_opt<T>(field: &mut Option<T>, value: Option<T>) {
        if value.is_some() {
            *field = value;
        }
    }
}
