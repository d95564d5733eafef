use super::ensure_forward;
use crate::errors::StoreError;
use crate::sql::{
    millis_from_sql, now_epoch_ms, run_blocking, version_from_sql, version_to_sql, watermark_table,
};
use catalog_sync_config::ValidatedSyncConfig;
use catalog_sync_domain::{ChangeVersion, PartitionId, SqlIdentifier, Watermark};
use catalog_sync_ports::{BoxFuture, LoadedWatermark, WatermarkStorePort};
use catalog_sync_shared::{ErrorCode, ErrorEnvelope, RequestContext, Result};
use rusqlite::{Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::time::Duration;

const BACKEND: &str = "sqlite";

/// Watermark store in a local SQLite database.
///
/// The parent directory, the file and the table are created on first use.
#[derive(Debug, Clone)]
pub struct SqliteWatermarkStore {
    path: PathBuf,
    table: SqlIdentifier,
    timeout: Duration,
}

impl SqliteWatermarkStore {
    /// Build a store over the database at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, table: SqlIdentifier, timeout: Duration) -> Self {
        Self {
            path: path.into(),
            table,
            timeout,
        }
    }

    /// Build a store from the `watermarks` config section.
    pub fn from_config(config: &ValidatedSyncConfig) -> Result<Self> {
        let path = config.watermarks.path.clone().ok_or_else(|| {
            ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                "watermarks.path is required for the sqlite provider",
            )
        })?;
        Ok(Self::new(
            path,
            watermark_table(&config.watermarks)?,
            Duration::from_millis(config.limits().core_timeout_ms.get()),
        ))
    }

    /// Database file backing this store.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn get_or_init_inner(
        &self,
        ctx: &RequestContext,
        partition: PartitionId,
        init_version: ChangeVersion,
    ) -> Result<LoadedWatermark> {
        let path = self.path.clone();
        let table = self.table.clone();
        run_blocking(
            ctx,
            self.timeout,
            "watermarks.get_or_init",
            StoreError::into_watermark_error,
            move || {
                let conn = open_connection(&path, &table)?;
                let now = now_epoch_ms()?;
                let sql = format!(
                    "INSERT INTO {table} (partition_id, last_version, last_sync_at_ms)
                     VALUES (?1, ?2, ?3)
                     ON CONFLICT(partition_id) DO NOTHING"
                );
                let inserted = conn
                    .execute(
                        &sql,
                        (
                            partition.as_str(),
                            version_to_sql(BACKEND, init_version)?,
                            now,
                        ),
                    )
                    .map_err(|error| StoreError::write(BACKEND, &error))?;
                let watermark = select_one(&conn, &table, &partition)?.ok_or_else(|| {
                    StoreError::query(BACKEND, &format!("watermark for {partition} vanished after insert"))
                })?;
                Ok(LoadedWatermark {
                    watermark,
                    created: inserted == 1,
                })
            },
        )
        .await
    }

    async fn advance_inner(
        &self,
        ctx: &RequestContext,
        watermark: Watermark,
        new_version: ChangeVersion,
    ) -> Result<Watermark> {
        ensure_forward(&watermark, new_version)?;
        let path = self.path.clone();
        let table = self.table.clone();
        run_blocking(
            ctx,
            self.timeout,
            "watermarks.advance",
            StoreError::into_watermark_error,
            move || {
                let conn = open_connection(&path, &table)?;
                let now = now_epoch_ms()?;
                let sql = format!(
                    "UPDATE {table} SET last_version = ?1, last_sync_at_ms = ?2
                     WHERE partition_id = ?3 AND last_version = ?4"
                );
                let updated = conn
                    .execute(
                        &sql,
                        (
                            version_to_sql(BACKEND, new_version)?,
                            now,
                            watermark.partition_id.as_str(),
                            version_to_sql(BACKEND, watermark.last_version)?,
                        ),
                    )
                    .map_err(|error| StoreError::write(BACKEND, &error))?;
                if updated == 0 {
                    return Err(StoreError::Conflict {
                        partition: watermark.partition_id,
                        expected: watermark.last_version.get(),
                    });
                }
                Ok(watermark.advanced_to(new_version, millis_from_sql(BACKEND, now)?))
            },
        )
        .await
    }

    async fn load_inner(
        &self,
        ctx: &RequestContext,
        partition: PartitionId,
    ) -> Result<Option<Watermark>> {
        let path = self.path.clone();
        let table = self.table.clone();
        run_blocking(
            ctx,
            self.timeout,
            "watermarks.load",
            StoreError::into_watermark_error,
            move || {
                let conn = open_connection(&path, &table)?;
                select_one(&conn, &table, &partition)
            },
        )
        .await
    }

    async fn list_inner(&self, ctx: &RequestContext) -> Result<Vec<Watermark>> {
        let path = self.path.clone();
        let table = self.table.clone();
        run_blocking(
            ctx,
            self.timeout,
            "watermarks.list",
            StoreError::into_watermark_error,
            move || {
                let conn = open_connection(&path, &table)?;
                let sql = format!(
                    "SELECT partition_id, last_version, last_sync_at_ms FROM {table}
                     ORDER BY partition_id"
                );
                let mut statement = conn
                    .prepare(&sql)
                    .map_err(|error| StoreError::query(BACKEND, &error))?;
                let rows = statement
                    .query_map([], raw_row)
                    .map_err(|error| StoreError::query(BACKEND, &error))?;
                let mut watermarks = Vec::new();
                for row in rows {
                    let raw = row.map_err(|error| StoreError::query(BACKEND, &error))?;
                    watermarks.push(decode(raw)?);
                }
                Ok(watermarks)
            },
        )
        .await
    }
}

impl WatermarkStorePort for SqliteWatermarkStore {
    fn get_or_init(
        &self,
        ctx: &RequestContext,
        partition: &PartitionId,
        init_version: ChangeVersion,
    ) -> BoxFuture<'_, Result<LoadedWatermark>> {
        let ctx = ctx.clone();
        let partition = partition.clone();
        Box::pin(async move { self.get_or_init_inner(&ctx, partition, init_version).await })
    }

    fn advance(
        &self,
        ctx: &RequestContext,
        watermark: &Watermark,
        new_version: ChangeVersion,
    ) -> BoxFuture<'_, Result<Watermark>> {
        let ctx = ctx.clone();
        let watermark = watermark.clone();
        Box::pin(async move { self.advance_inner(&ctx, watermark, new_version).await })
    }

    fn load(
        &self,
        ctx: &RequestContext,
        partition: &PartitionId,
    ) -> BoxFuture<'_, Result<Option<Watermark>>> {
        let ctx = ctx.clone();
        let partition = partition.clone();
        Box::pin(async move { self.load_inner(&ctx, partition).await })
    }

    fn list(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<Vec<Watermark>>> {
        let ctx = ctx.clone();
        Box::pin(async move { self.list_inner(&ctx).await })
    }
}

type RawRow = (String, i64, i64);

fn raw_row(row: &Row<'_>) -> rusqlite::Result<RawRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
}

fn decode((partition, last_version, last_sync_at_ms): RawRow) -> std::result::Result<Watermark, StoreError> {
    let partition_id = PartitionId::parse(&partition).map_err(|error| StoreError::Decode {
        backend: BACKEND,
        column: "partition_id".into(),
        message: error.to_string(),
    })?;
    Ok(Watermark {
        partition_id,
        last_version: version_from_sql(BACKEND, "last_version", last_version)?,
        last_sync_at_ms: millis_from_sql(BACKEND, last_sync_at_ms)?,
    })
}

fn select_one(
    conn: &Connection,
    table: &SqlIdentifier,
    partition: &PartitionId,
) -> std::result::Result<Option<Watermark>, StoreError> {
    let sql = format!(
        "SELECT partition_id, last_version, last_sync_at_ms FROM {table} WHERE partition_id = ?1"
    );
    conn.query_row(&sql, [partition.as_str()], raw_row)
        .optional()
        .map_err(|error| StoreError::query(BACKEND, &error))?
        .map(decode)
        .transpose()
}

fn open_connection(path: &Path, table: &SqlIdentifier) -> std::result::Result<Connection, StoreError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|error| StoreError::connect(BACKEND, &error))?;
    }
    let conn = Connection::open(path).map_err(|error| StoreError::connect(BACKEND, &error))?;
    conn.busy_timeout(Duration::from_secs(5))
        .map_err(|error| StoreError::connect(BACKEND, &error))?;
    conn.execute_batch(&format!(
        "PRAGMA journal_mode = WAL;
         CREATE TABLE IF NOT EXISTS {table} (
            partition_id TEXT PRIMARY KEY,
            last_version INTEGER NOT NULL,
            last_sync_at_ms INTEGER NOT NULL
         );"
    ))
    .map_err(|error| StoreError::write(BACKEND, &error))?;
    Ok(conn)
}
