use super::escalate_timeout;
use crate::errors::StoreError;
use crate::sql::{ChangelogTable, version_from_sql, version_to_sql};
use catalog_sync_config::ValidatedSyncConfig;
use catalog_sync_domain::{ChangeVersion, ChangedEntities, EntityId, VersionWindow};
use catalog_sync_ports::{BoxFuture, ChangeLogSourcePort};
use catalog_sync_shared::{
    ErrorCode, ErrorEnvelope, RequestContext, Result, SecretString, timeout_with_context,
};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

const BACKEND: &str = "postgres";
const MAX_CONNECTIONS: u32 = 2;

/// Change feed read from a Postgres table populated by triggers.
#[derive(Debug, Clone)]
pub struct PostgresChangeLogSource {
    pool: PgPool,
    table: ChangelogTable,
    timeout: Duration,
}

impl PostgresChangeLogSource {
    /// Build a source with a lazily connecting pool.
    pub fn new(connection: &SecretString, table: ChangelogTable, timeout: Duration) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(timeout)
            .connect_lazy(connection.expose())
            .map_err(|error| StoreError::connect(BACKEND, &error).into_feed_error())?;
        Ok(Self {
            pool,
            table,
            timeout,
        })
    }

    /// Build a source from the `changelog` config section.
    pub fn from_config(config: &ValidatedSyncConfig) -> Result<Self> {
        let connection = config.changelog.connection.as_ref().ok_or_else(|| {
            ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                "CSY_CHANGELOG_CONNECTION is required for the postgres provider",
            )
        })?;
        let table = ChangelogTable::from_config(&config.changelog)?;
        Self::new(
            connection,
            table,
            Duration::from_millis(config.limits().core_timeout_ms.get()),
        )
    }

    async fn probe(&self, ctx: &RequestContext) -> Result<bool> {
        let table = self.table.table.as_str().to_owned();
        let query = async {
            sqlx::query_scalar::<_, bool>("SELECT to_regclass($1) IS NOT NULL")
                .bind(table)
                .fetch_one(&self.pool)
                .await
                .map_err(|error| classify(&error).into_feed_error())
        };
        timeout_with_context(ctx, self.timeout, "changelog.is_available", query).await
    }

    async fn max_version(&self, ctx: &RequestContext) -> Result<ChangeVersion> {
        let sql = format!(
            "SELECT COALESCE(MAX({version}), 0)::BIGINT FROM {table}",
            version = self.table.version_column,
            table = self.table.table,
        );
        let query = async {
            let raw = sqlx::query_scalar::<_, i64>(&sql)
                .fetch_one(&self.pool)
                .await
                .map_err(|error| classify(&error).into_feed_error())?;
            version_from_sql(BACKEND, self.table.version_column.as_str(), raw)
                .map_err(StoreError::into_feed_error)
        };
        timeout_with_context(ctx, self.timeout, "changelog.current_version", query).await
    }

    async fn select_changed(
        &self,
        ctx: &RequestContext,
        window: VersionWindow,
    ) -> Result<ChangedEntities> {
        let sql = format!(
            "SELECT DISTINCT {entity}::BIGINT FROM {table} WHERE {version} > $1 AND {version} <= $2",
            entity = self.table.entity_column,
            table = self.table.table,
            version = self.table.version_column,
        );
        let query = async {
            let after = version_to_sql(BACKEND, window.after).map_err(StoreError::into_feed_error)?;
            let up_to = version_to_sql(BACKEND, window.up_to).map_err(StoreError::into_feed_error)?;
            let rows = sqlx::query_scalar::<_, i64>(&sql)
                .bind(after)
                .bind(up_to)
                .fetch_all(&self.pool)
                .await
                .map_err(|error| classify(&error).into_feed_error())?;
            rows.into_iter()
                .map(|raw| {
                    u64::try_from(raw).map(EntityId::new).map_err(|_| {
                        StoreError::Decode {
                            backend: BACKEND,
                            column: self.table.entity_column.as_str().into(),
                            message: format!("negative value {raw}"),
                        }
                        .into_feed_error()
                    })
                })
                .collect::<Result<ChangedEntities>>()
        };
        timeout_with_context(ctx, self.timeout, "changelog.changed_entity_ids", query)
            .await
            .map_err(|error| escalate_timeout(error, window))
    }
}

impl ChangeLogSourcePort for PostgresChangeLogSource {
    fn is_available(&self, ctx: &RequestContext) -> BoxFuture<'_, bool> {
        let ctx = ctx.clone();
        Box::pin(async move {
            self.probe(&ctx).await.unwrap_or_else(|error| {
                tracing::debug!(%error, "change feed probe failed");
                false
            })
        })
    }

    fn current_version(&self, ctx: &RequestContext) -> BoxFuture<'_, ChangeVersion> {
        let ctx = ctx.clone();
        Box::pin(async move {
            self.max_version(&ctx).await.unwrap_or_else(|error| {
                tracing::warn!(%error, "change feed version read failed");
                ChangeVersion::ZERO
            })
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

/// Pool and I/O failures mean the server is unreachable; the rest are statement errors.
fn classify(error: &sqlx::Error) -> StoreError {
    match error {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => StoreError::connect(BACKEND, error),
        _ => StoreError::query(BACKEND, error),
    }
}
