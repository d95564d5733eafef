//! Helpers shared by the SQL-backed adapters.

use crate::errors::StoreError;
use catalog_sync_config::{ChangelogConfig, WatermarkStoreConfig};
use catalog_sync_domain::{ChangeVersion, PrimitiveError, SqlIdentifier};
use catalog_sync_shared::{ErrorCode, ErrorEnvelope, RequestContext, Result, timeout_with_context};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::task::spawn_blocking;

/// Table and column names of the change feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangelogTable {
    /// Feed table.
    pub table: SqlIdentifier,
    /// Column holding the changed entity id.
    pub entity_column: SqlIdentifier,
    /// Column holding the version assigned to the change.
    pub version_column: SqlIdentifier,
}

impl ChangelogTable {
    /// Validate the names configured for the feed.
    pub fn from_config(config: &ChangelogConfig) -> Result<Self> {
        Ok(Self {
            table: identifier("changelog", "table", &config.table)?,
            entity_column: identifier("changelog", "entityColumn", &config.entity_column)?,
            version_column: identifier("changelog", "versionColumn", &config.version_column)?,
        })
    }

    pub(crate) fn max_version_sql(&self) -> String {
        format!(
            "SELECT COALESCE(MAX({version}), 0) FROM {table}",
            version = self.version_column,
            table = self.table,
        )
    }
}

/// Validated name of the watermark table.
pub fn watermark_table(config: &WatermarkStoreConfig) -> Result<SqlIdentifier> {
    identifier("watermarks", "table", &config.table)
}

fn identifier(section: &'static str, field: &'static str, raw: &str) -> Result<SqlIdentifier> {
    SqlIdentifier::parse(raw).map_err(|error: PrimitiveError| {
        ErrorEnvelope::from(error)
            .with_metadata("section", section)
            .with_metadata("field", field)
    })
}

pub(crate) fn version_to_sql(
    backend: &'static str,
    version: ChangeVersion,
) -> std::result::Result<i64, StoreError> {
    i64::try_from(version.get()).map_err(|_| StoreError::Decode {
        backend,
        column: "version".into(),
        message: format!("{version} exceeds the signed 64-bit range"),
    })
}

pub(crate) fn version_from_sql(
    backend: &'static str,
    column: &str,
    raw: i64,
) -> std::result::Result<ChangeVersion, StoreError> {
    u64::try_from(raw)
        .map(ChangeVersion::new)
        .map_err(|_| StoreError::Decode {
            backend,
            column: column.into(),
            message: format!("negative value {raw}"),
        })
}

pub(crate) fn millis_from_sql(
    backend: &'static str,
    raw: i64,
) -> std::result::Result<u64, StoreError> {
    u64::try_from(raw).map_err(|_| StoreError::Decode {
        backend,
        column: "last_sync_at_ms".into(),
        message: format!("negative value {raw}"),
    })
}

pub(crate) fn now_epoch_ms() -> std::result::Result<i64, StoreError> {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|_| StoreError::Clock)?;
    i64::try_from(elapsed.as_millis()).map_err(|_| StoreError::Clock)
}

/// Run a blocking storage job on the blocking pool, bounded by `timeout`.
///
/// `classify` converts storage errors into the caller's error taxonomy.
pub(crate) async fn run_blocking<T, F>(
    ctx: &RequestContext,
    timeout: Duration,
    operation: &'static str,
    classify: fn(StoreError) -> ErrorEnvelope,
    job: F,
) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> std::result::Result<T, StoreError> + Send + 'static,
{
    let task = async move {
        spawn_blocking(job)
            .await
            .map_err(|error| StoreError::Worker(error.to_string()))
            .and_then(|outcome| outcome)
            .map_err(classify)
    };
    timeout_with_context(ctx, timeout, operation, task).await
}

/// True for the `core:timeout` envelopes produced by [`timeout_with_context`].
pub(crate) fn is_timeout(error: &ErrorEnvelope) -> bool {
    error.code == ErrorCode::timeout()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_changelog_names_are_valid() -> Result<()> {
        let table = ChangelogTable::from_config(&ChangelogConfig::default())?;
        assert_eq!(table.table.as_str(), "catalog_product_cl");
        assert_eq!(
            table.max_version_sql(),
            "SELECT COALESCE(MAX(version_id), 0) FROM catalog_product_cl"
        );
        Ok(())
    }

    #[test]
    fn hostile_table_name_is_rejected() {
        let config = ChangelogConfig {
            table: "products; DROP TABLE x".into(),
            ..ChangelogConfig::default()
        };
        let error = ChangelogTable::from_config(&config).err();
        assert_eq!(
            error
                .as_ref()
                .and_then(|error| error.metadata.get("field"))
                .map(String::as_str),
            Some("table")
        );
    }

    #[test]
    fn versions_outside_sql_range_are_rejected() {
        assert!(version_to_sql("sqlite", ChangeVersion::new(u64::MAX)).is_err());
        assert!(version_from_sql("sqlite", "version_id", -1).is_err());
        assert_eq!(
            version_from_sql("sqlite", "version_id", 42).ok(),
            Some(ChangeVersion::new(42))
        );
    }
}
