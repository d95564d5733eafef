use super::escalate_timeout;
use crate::errors::StoreError;
use crate::sql::{ChangelogTable, run_blocking, version_from_sql, version_to_sql};
use catalog_sync_config::ValidatedSyncConfig;
use catalog_sync_domain::{ChangeVersion, ChangedEntities, EntityId, VersionWindow};
use catalog_sync_ports::{BoxFuture, ChangeLogSourcePort};
use catalog_sync_shared::{ErrorCode, ErrorEnvelope, RequestContext, Result};
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use std::path::{Path, PathBuf};
use std::time::Duration;

const BACKEND: &str = "sqlite";

/// Change feed read from a SQLite table populated by triggers.
///
/// The database is opened read-only for every call; the adapter never
/// creates the file or the table.
#[derive(Debug, Clone)]
pub struct SqliteChangeLogSource {
    path: PathBuf,
    table: ChangelogTable,
    timeout: Duration,
}

impl SqliteChangeLogSource {
    /// Build a source over the database at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, table: ChangelogTable, timeout: Duration) -> Self {
        Self {
            path: path.into(),
            table,
            timeout,
        }
    }

    /// Build a source from the `changelog` config section.
    pub fn from_config(config: &ValidatedSyncConfig) -> Result<Self> {
        let path = config.changelog.path.clone().ok_or_else(|| {
            ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                "changelog.path is required for the sqlite provider",
            )
        })?;
        let table = ChangelogTable::from_config(&config.changelog)?;
        Ok(Self::new(
            path,
            table,
            Duration::from_millis(config.limits().core_timeout_ms.get()),
        ))
    }

    async fn probe(&self, ctx: &RequestContext) -> Result<bool> {
        let path = self.path.clone();
        let table = self.table.table.as_str().to_owned();
        run_blocking(
            ctx,
            self.timeout,
            "changelog.is_available",
            StoreError::into_feed_error,
            move || {
                let conn = open_read_only(&path)?;
                let found: Option<i64> = conn
                    .query_row(
                        "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1 COLLATE NOCASE",
                        [&table],
                        |row| row.get(0),
                    )
                    .optional()
                    .map_err(|error| StoreError::query(BACKEND, &error))?;
                Ok(found.is_some())
            },
        )
        .await
    }

    async fn max_version(&self, ctx: &RequestContext) -> Result<ChangeVersion> {
        let path = self.path.clone();
        let sql = self.table.max_version_sql();
        let column = self.table.version_column.as_str().to_owned();
        run_blocking(
            ctx,
            self.timeout,
            "changelog.current_version",
            StoreError::into_feed_error,
            move || {
                let conn = open_read_only(&path)?;
                let raw: i64 = conn
                    .query_row(&sql, [], |row| row.get(0))
                    .map_err(|error| StoreError::query(BACKEND, &error))?;
                version_from_sql(BACKEND, &column, raw)
            },
        )
        .await
    }

    async fn select_changed(
        &self,
        ctx: &RequestContext,
        window: VersionWindow,
    ) -> Result<ChangedEntities> {
        let path = self.path.clone();
        let entity_column = self.table.entity_column.as_str().to_owned();
        let sql = format!(
            "SELECT DISTINCT {entity} FROM {table} WHERE {version} > ?1 AND {version} <= ?2",
            entity = self.table.entity_column,
            table = self.table.table,
            version = self.table.version_column,
        );
        run_blocking(
            ctx,
            self.timeout,
            "changelog.changed_entity_ids",
            StoreError::into_feed_error,
            move || {
                let after = version_to_sql(BACKEND, window.after)?;
                let up_to = version_to_sql(BACKEND, window.up_to)?;
                let conn = open_read_only(&path)?;
                let mut statement = conn
                    .prepare(&sql)
                    .map_err(|error| StoreError::query(BACKEND, &error))?;
                let rows = statement
                    .query_map((after, up_to), |row| row.get::<_, i64>(0))
                    .map_err(|error| StoreError::query(BACKEND, &error))?;

                let mut changed = ChangedEntities::new();
                for row in rows {
                    let raw = row.map_err(|error| StoreError::query(BACKEND, &error))?;
                    let id = u64::try_from(raw).map_err(|_| StoreError::Decode {
                        backend: BACKEND,
                        column: entity_column.as_str().into(),
                        message: format!("negative value {raw}"),
                    })?;
                    changed.extend([EntityId::new(id)]);
                }
                Ok(changed)
            },
        )
        .await
        .map_err(|error| escalate_timeout(error, window))
    }
}

impl ChangeLogSourcePort for SqliteChangeLogSource {
    fn is_available(&self, ctx: &RequestContext) -> BoxFuture<'_, bool> {
        let ctx = ctx.clone();
        Box::pin(async move {
            match self.probe(&ctx).await {
                Ok(found) => found,
                Err(error) => {
                    tracing::debug!(path = %self.path.display(), %error, "change feed probe failed");
                    false
                },
            }
        })
    }

    fn current_version(&self, ctx: &RequestContext) -> BoxFuture<'_, ChangeVersion> {
        let ctx = ctx.clone();
        Box::pin(async move {
            match self.max_version(&ctx).await {
                Ok(version) => version,
                Err(error) => {
                    tracing::warn!(path = %self.path.display(), %error, "change feed version read failed");
                    ChangeVersion::ZERO
                },
            }
        })
    }

    fn changed_entity_ids(
        &self,
        ctx: &RequestContext,
        window: VersionWindow,
    ) -> BoxFuture<'_, Result<ChangedEntities>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            if window.is_empty() {
                return Ok(ChangedEntities::new());
            }
            self.select_changed(&ctx, window).await
        })
    }
}

fn open_read_only(path: &Path) -> std::result::Result<Connection, StoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX;
    let conn = Connection::open_with_flags(path, flags)
        .map_err(|error| StoreError::connect(BACKEND, &error))?;
    conn.busy_timeout(Duration::from_secs(5))
        .map_err(|error| StoreError::connect(BACKEND, &error))?;
    Ok(conn)
}
