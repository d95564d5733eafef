//! Adapter selection from the validated config.

use crate::{InfraResult, Observability};
use catalog_sync_adapters::changelog::SqliteChangeLogSource;
use catalog_sync_adapters::notifier::{HttpChangeNotifier, HttpNotifierConfig};
use catalog_sync_adapters::partitions::ConfiguredPartitions;
use catalog_sync_adapters::watermark::SqliteWatermarkStore;
use catalog_sync_app::{SyncChangelogDeps, SyncStatusDeps};
use catalog_sync_config::{StorageProvider, ValidatedSyncConfig};
use catalog_sync_ports::{
    ChangeLogSourcePort, ChangeNotifierPort, LoggerPort, PartitionSourcePort, WatermarkStorePort,
};
use std::sync::Arc;

#[cfg(feature = "postgres")]
use catalog_sync_adapters::changelog::PostgresChangeLogSource;
#[cfg(feature = "postgres")]
use catalog_sync_adapters::watermark::PostgresWatermarkStore;
#[cfg(not(feature = "postgres"))]
use catalog_sync_shared::{ErrorCode, ErrorEnvelope};

/// Build the change feed named by `changelog.provider`.
pub fn build_changelog_source(
    config: &ValidatedSyncConfig,
) -> InfraResult<Arc<dyn ChangeLogSourcePort>> {
    match config.changelog.provider {
        StorageProvider::Sqlite => Ok(Arc::new(SqliteChangeLogSource::from_config(config)?)),
        StorageProvider::Postgres => build_postgres_changelog(config),
    }
}

/// Build the watermark store named by `watermarks.provider`.
pub fn build_watermark_store(
    config: &ValidatedSyncConfig,
) -> InfraResult<Arc<dyn WatermarkStorePort>> {
    match config.watermarks.provider {
        StorageProvider::Sqlite => Ok(Arc::new(SqliteWatermarkStore::from_config(config)?)),
        StorageProvider::Postgres => build_postgres_watermarks(config),
    }
}

/// Build the webhook notifier; final delivery failures go to `logger`.
pub fn build_notifier(
    config: &ValidatedSyncConfig,
    logger: Option<Arc<dyn LoggerPort>>,
) -> InfraResult<Arc<dyn ChangeNotifierPort>> {
    let notifier = HttpChangeNotifier::new(&HttpNotifierConfig::from_sync_config(config))?;
    let notifier = match logger {
        Some(logger) => notifier.with_logger(logger),
        None => notifier,
    };
    Ok(Arc::new(notifier))
}

/// Partitions come from the `partitions` section, in file order.
#[must_use]
pub fn build_partition_source(config: &ValidatedSyncConfig) -> Arc<dyn PartitionSourcePort> {
    Arc::new(ConfiguredPartitions::from_config(config))
}

/// Every collaborator of the sync tick.
pub fn build_sync_deps(
    config: &ValidatedSyncConfig,
    observability: &Observability,
) -> InfraResult<SyncChangelogDeps> {
    Ok(SyncChangelogDeps {
        changelog: build_changelog_source(config)?,
        watermarks: build_watermark_store(config)?,
        notifier: build_notifier(config, observability.logger.clone())?,
        partitions: build_partition_source(config),
        logger: observability.logger.clone(),
        telemetry: observability.telemetry.clone(),
    })
}

/// Collaborators of the status read.
pub fn build_status_deps(config: &ValidatedSyncConfig) -> InfraResult<SyncStatusDeps> {
    Ok(SyncStatusDeps {
        changelog: build_changelog_source(config)?,
        watermarks: build_watermark_store(config)?,
        notifier: build_notifier(config, None)?,
        partitions: build_partition_source(config),
    })
}

#[cfg(feature = "postgres")]
fn build_postgres_changelog(
    config: &ValidatedSyncConfig,
) -> InfraResult<Arc<dyn ChangeLogSourcePort>> {
    Ok(Arc::new(PostgresChangeLogSource::from_config(config)?))
}

#[cfg(not(feature = "postgres"))]
fn build_postgres_changelog(
    _config: &ValidatedSyncConfig,
) -> InfraResult<Arc<dyn ChangeLogSourcePort>> {
    Err(postgres_disabled("changelog"))
}

#[cfg(feature = "postgres")]
fn build_postgres_watermarks(
    config: &ValidatedSyncConfig,
) -> InfraResult<Arc<dyn WatermarkStorePort>> {
    Ok(Arc::new(PostgresWatermarkStore::from_config(config)?))
}

#[cfg(not(feature = "postgres"))]
fn build_postgres_watermarks(
    _config: &ValidatedSyncConfig,
) -> InfraResult<Arc<dyn WatermarkStorePort>> {
    Err(postgres_disabled("watermarks"))
}

#[cfg(not(feature = "postgres"))]
fn postgres_disabled(section: &str) -> ErrorEnvelope {
    ErrorEnvelope::expected(
        ErrorCode::invalid_input(),
        "postgres storage is not enabled in this build",
    )
    .with_metadata("section", section)
}

/// Build-time check used by `csync info`.
#[must_use]
pub const fn postgres_enabled() -> bool {
    cfg!(feature = "postgres")
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_sync_config::parse_sync_config_json;
    use catalog_sync_domain::PartitionId;

    #[test]
    fn sqlite_is_the_default_selection() -> InfraResult<()> {
        let config = parse_sync_config_json(
            r#"{"version":1,"changelog":{"path":"catalog.db"},"partitions":[{"id":"7","enabled":false}]}"#,
        )?;
        let notifier = build_notifier(&config, None)?;
        assert!(!notifier.is_enabled_for(&PartitionId::parse("7")?));
        assert!(build_sync_deps(&config, &Observability::disabled()).is_ok());
        Ok(())
    }

    #[cfg(not(feature = "postgres"))]
    #[test]
    fn postgres_requires_the_feature() -> InfraResult<()> {
        let mut config = parse_sync_config_json(
            r#"{"version":1,"changelog":{"path":"catalog.db"}}"#,
        )?
        .into_inner();
        config.watermarks.provider = StorageProvider::Postgres;
        config.watermarks.connection = Some("postgres://localhost/catalog".into());
        let config = config
            .validate_and_normalize()
            .map_err(ErrorEnvelope::from)?;

        let error = build_watermark_store(&config).err();
        assert!(error.is_some_and(|error| error.code == ErrorCode::invalid_input()));
        Ok(())
    }
}
