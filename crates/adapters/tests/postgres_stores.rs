// Postgres adapters against a live server; run with
// `CSY_TEST_POSTGRES_URL=postgres://... cargo test --features postgres -- --ignored`.
#![allow(missing_docs)]
#![cfg(feature = "postgres")]

use catalog_sync_adapters::ChangelogTable;
use catalog_sync_adapters::changelog::PostgresChangeLogSource;
use catalog_sync_adapters::watermark::PostgresWatermarkStore;
use catalog_sync_config::ChangelogConfig;
use catalog_sync_domain::{ChangeVersion, PartitionId, SqlIdentifier, SyncErrorCode, VersionWindow};
use catalog_sync_ports::{ChangeLogSourcePort, WatermarkStorePort};
use catalog_sync_shared::{RequestContext, SecretString};
use sqlx::postgres::PgPoolOptions;
use std::error::Error;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

type TestResult = Result<(), Box<dyn Error>>;

const URL_VAR: &str = "CSY_TEST_POSTGRES_URL";

fn connection() -> Result<SecretString, Box<dyn Error>> {
    let url = std::env::var(URL_VAR).map_err(|_| format!("{URL_VAR} is not set"))?;
    Ok(SecretString::new(url))
}

fn unique_table(prefix: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    format!("{prefix}_{nanos}")
}

#[tokio::test]
#[ignore = "requires CSY_TEST_POSTGRES_URL"]
async fn feed_window_excludes_after_and_includes_up_to() -> TestResult {
    let connection = connection()?;
    let table = unique_table("csync_cl");
    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect(connection.expose())
        .await?;
    sqlx::query(&format!(
        "CREATE TABLE {table} (version_id BIGINT PRIMARY KEY, entity_id BIGINT NOT NULL)"
    ))
    .execute(&pool)
    .await?;
    sqlx::query(&format!(
        "INSERT INTO {table} (version_id, entity_id) VALUES (1, 10), (2, 11), (3, 10), (4, 12), (5, 13)"
    ))
    .execute(&pool)
    .await?;

    let config = ChangelogConfig {
        table: table.as_str().into(),
        ..ChangelogConfig::default()
    };
    let source = PostgresChangeLogSource::new(
        &connection,
        ChangelogTable::from_config(&config)?,
        Duration::from_secs(5),
    )?;
    let ctx = RequestContext::new_request();

    assert!(source.is_available(&ctx).await);
    assert_eq!(source.current_version(&ctx).await, ChangeVersion::new(5));
    let window = VersionWindow::new(ChangeVersion::new(1), ChangeVersion::new(4));
    let changed = source.changed_entity_ids(&ctx, window).await?;
    assert_eq!(changed.to_raw_ids(), vec![10, 11, 12]);

    sqlx::query(&format!("DROP TABLE {table}")).execute(&pool).await?;
    Ok(())
}

#[tokio::test]
#[ignore = "requires CSY_TEST_POSTGRES_URL"]
async fn stale_advance_conflicts_and_keeps_newer_progress() -> TestResult {
    let connection = connection()?;
    let table = unique_table("csync_wm");
    let store = PostgresWatermarkStore::new(
        &connection,
        SqlIdentifier::parse(&table)?,
        Duration::from_secs(5),
    )?;
    let ctx = RequestContext::new_request();
    let partition = PartitionId::parse("1")?;

    let created = store.get_or_init(&ctx, &partition, ChangeVersion::new(10)).await?;
    assert!(created.created);
    let reloaded = store.get_or_init(&ctx, &partition, ChangeVersion::new(99)).await?;
    assert!(!reloaded.created);
    assert_eq!(reloaded.watermark.last_version, ChangeVersion::new(10));

    store.advance(&ctx, &created.watermark, ChangeVersion::new(12)).await?;
    let Err(error) = store
        .advance(&ctx, &created.watermark, ChangeVersion::new(11))
        .await
    else {
        return Err("stale advance must fail".into());
    };
    assert!(SyncErrorCode::WatermarkConflict.matches(&error));
    assert_eq!(
        store.load(&ctx, &partition).await?.map(|mark| mark.last_version),
        Some(ChangeVersion::new(12))
    );

    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect(connection.expose())
        .await?;
    sqlx::query(&format!("DROP TABLE {table}")).execute(&pool).await?;
    Ok(())
}
