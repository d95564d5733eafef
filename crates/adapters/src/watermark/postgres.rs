use super::ensure_forward;
use crate::errors::StoreError;
use crate::sql::{millis_from_sql, now_epoch_ms, version_from_sql, version_to_sql, watermark_table};
use catalog_sync_config::ValidatedSyncConfig;
use catalog_sync_domain::{ChangeVersion, PartitionId, SqlIdentifier, Watermark};
use catalog_sync_ports::{BoxFuture, LoadedWatermark, WatermarkStorePort};
use catalog_sync_shared::{
    ErrorCode, ErrorEnvelope, RequestContext, Result, SecretString, timeout_with_context,
};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tokio::sync::OnceCell;

const BACKEND: &str = "postgres";
const MAX_CONNECTIONS: u32 = 2;

type RawRow = (String, i64, i64);

/// Watermark store in a Postgres table.
#[derive(Debug)]
pub struct PostgresWatermarkStore {
    pool: PgPool,
    table: SqlIdentifier,
    timeout: Duration,
    schema_ready: OnceCell<()>,
}

impl PostgresWatermarkStore {
    /// Build a store with a lazily connecting pool.
    pub fn new(connection: &SecretString, table: SqlIdentifier, timeout: Duration) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(timeout)
            .connect_lazy(connection.expose())
            .map_err(|error| StoreError::connect(BACKEND, &error).into_watermark_error())?;
        Ok(Self {
            pool,
            table,
            timeout,
            schema_ready: OnceCell::new(),
        })
    }

    /// Build a store from the `watermarks` config section.
    pub fn from_config(config: &ValidatedSyncConfig) -> Result<Self> {
        let connection = config.watermarks.connection.as_ref().ok_or_else(|| {
            ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                "CSY_WATERMARKS_CONNECTION is required for the postgres provider",
            )
        })?;
        Self::new(
            connection,
            watermark_table(&config.watermarks)?,
            Duration::from_millis(config.limits().core_timeout_ms.get()),
        )
    }

    async fn ensure_schema(&self) -> std::result::Result<(), StoreError> {
        self.schema_ready
            .get_or_try_init(|| async {
                let sql = format!(
                    "CREATE TABLE IF NOT EXISTS {table} (
                        partition_id TEXT PRIMARY KEY,
                        last_version BIGINT NOT NULL,
                        last_sync_at_ms BIGINT NOT NULL
                     )",
                    table = self.table,
                );
                sqlx::query(&sql)
                    .execute(&self.pool)
                    .await
                    .map(|_| ())
                    .map_err(|error| StoreError::write(BACKEND, &error))
            })
            .await?;
        Ok(())
    }

    async fn select_one(
        &self,
        partition: &PartitionId,
    ) -> std::result::Result<Option<Watermark>, StoreError> {
        let sql = format!(
            "SELECT partition_id, last_version, last_sync_at_ms FROM {table} WHERE partition_id = $1",
            table = self.table,
        );
        sqlx::query_as::<_, RawRow>(&sql)
            .bind(partition.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| StoreError::query(BACKEND, &error))?
            .map(decode)
            .transpose()
    }

    async fn get_or_init_inner(
        &self,
        partition: &PartitionId,
        init_version: ChangeVersion,
    ) -> std::result::Result<LoadedWatermark, StoreError> {
        self.ensure_schema().await?;
        let sql = format!(
            "INSERT INTO {table} (partition_id, last_version, last_sync_at_ms)
             VALUES ($1, $2, $3)
             ON CONFLICT (partition_id) DO NOTHING",
            table = self.table,
        );
        let inserted = sqlx::query(&sql)
            .bind(partition.as_str())
            .bind(version_to_sql(BACKEND, init_version)?)
            .bind(now_epoch_ms()?)
            .execute(&self.pool)
            .await
            .map_err(|error| StoreError::write(BACKEND, &error))?
            .rows_affected();
        let watermark = self.select_one(partition).await?.ok_or_else(|| {
            StoreError::query(
                BACKEND,
                &format!("watermark for {partition} vanished after insert"),
            )
        })?;
        Ok(LoadedWatermark {
            watermark,
            created: inserted == 1,
        })
    }

    async fn advance_inner(
        &self,
        watermark: &Watermark,
        new_version: ChangeVersion,
    ) -> std::result::Result<Watermark, StoreError> {
        self.ensure_schema().await?;
        let now = now_epoch_ms()?;
        let sql = format!(
            "UPDATE {table} SET last_version = $1, last_sync_at_ms = $2
             WHERE partition_id = $3 AND last_version = $4",
            table = self.table,
        );
        let updated = sqlx::query(&sql)
            .bind(version_to_sql(BACKEND, new_version)?)
            .bind(now)
            .bind(watermark.partition_id.as_str())
            .bind(version_to_sql(BACKEND, watermark.last_version)?)
            .execute(&self.pool)
            .await
            .map_err(|error| StoreError::write(BACKEND, &error))?
            .rows_affected();
        if updated == 0 {
            return Err(StoreError::Conflict {
                partition: watermark.partition_id.clone(),
                expected: watermark.last_version.get(),
            });
        }
        Ok(watermark.advanced_to(new_version, millis_from_sql(BACKEND, now)?))
    }

    async fn list_inner(&self) -> std::result::Result<Vec<Watermark>, StoreError> {
        self.ensure_schema().await?;
        let sql = format!(
            "SELECT partition_id, last_version, last_sync_at_ms FROM {table} ORDER BY partition_id",
            table = self.table,
        );
        sqlx::query_as::<_, RawRow>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|error| StoreError::query(BACKEND, &error))?
            .into_iter()
            .map(decode)
            .collect()
    }
}

impl WatermarkStorePort for PostgresWatermarkStore {
    fn get_or_init(
        &self,
        ctx: &RequestContext,
        partition: &PartitionId,
        init_version: ChangeVersion,
    ) -> BoxFuture<'_, Result<LoadedWatermark>> {
        let ctx = ctx.clone();
        let partition = partition.clone();
        Box::pin(async move {
            let work = async {
                self.get_or_init_inner(&partition, init_version)
                    .await
                    .map_err(StoreError::into_watermark_error)
            };
            timeout_with_context(&ctx, self.timeout, "watermarks.get_or_init", work).await
        })
    }

    fn advance(
        &self,
        ctx: &RequestContext,
        watermark: &Watermark,
        new_version: ChangeVersion,
    ) -> BoxFuture<'_, Result<Watermark>> {
        let ctx = ctx.clone();
        let watermark = watermark.clone();
        Box::pin(async move {
            ensure_forward(&watermark, new_version)?;
            let work = async {
                self.advance_inner(&watermark, new_version)
                    .await
                    .map_err(StoreError::into_watermark_error)
            };
            timeout_with_context(&ctx, self.timeout, "watermarks.advance", work).await
        })
    }

    fn load(
        &self,
        ctx: &RequestContext,
        partition: &PartitionId,
    ) -> BoxFuture<'_, Result<Option<Watermark>>> {
        let ctx = ctx.clone();
        let partition = partition.clone();
        Box::pin(async move {
            let work = async {
                self.ensure_schema()
                    .await
                    .map_err(StoreError::into_watermark_error)?;
                self.select_one(&partition)
                    .await
                    .map_err(StoreError::into_watermark_error)
            };
            timeout_with_context(&ctx, self.timeout, "watermarks.load", work).await
        })
    }

    fn list(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<Vec<Watermark>>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            let work = async { self.list_inner().await.map_err(StoreError::into_watermark_error) };
            timeout_with_context(&ctx, self.timeout, "watermarks.list", work).await
        })
    }
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
