//! # catalog-sync-config
//!
//! Configuration schema, validation, and normalization for the sync service.
//! This crate depends on `domain` and `shared` only.

/// Environment variable parsing and merging.
pub mod env;
/// Config loading helpers (env + file + overrides).
pub mod load;
/// Configuration schema types and helpers.
pub mod schema;

pub use schema::{
    CURRENT_CONFIG_VERSION, ChangelogConfig, ConfigLimits, ConfigSchemaError, CoreConfig,
    LogFormat, LoggingConfig, NotifierConfig, PARTITIONS_MAX, PartitionConfig, RetryConfig,
    SchedulerConfig, StorageProvider, SyncConfig, ValidatedSyncConfig, WatermarkStoreConfig,
    parse_sync_config_json, parse_sync_config_toml,
};

pub use env::{EnvParseError, SyncEnv, apply_env_overrides};
pub use load::{
    load_sync_config_from_path, load_sync_config_from_sources, load_sync_config_std_env,
    to_pretty_json, to_pretty_toml,
};

/// Returns the config crate version.
#[must_use]
pub const fn config_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_sync_domain::domain_crate_version;
    use catalog_sync_shared::shared_crate_version;

    #[test]
    fn config_crate_compiles() {
        let version = config_crate_version();
        assert!(!version.is_empty());
    }

    #[test]
    fn config_can_use_domain_and_shared() {
        assert!(!domain_crate_version().is_empty());
        assert!(!shared_crate_version().is_empty());
    }
}
