//! Watermark store adapters.
//!
//! Both backends share one table layout:
//! `(partition_id TEXT PRIMARY KEY, last_version BIGINT, last_sync_at_ms BIGINT)`.
//! Creation is `INSERT ... ON CONFLICT DO NOTHING` followed by a reload, and
//! advancing is a compare-and-set on the previously observed `last_version`.

#[cfg(feature = "postgres")]
mod postgres;
mod sqlite;

#[cfg(feature = "postgres")]
pub use postgres::PostgresWatermarkStore;
pub use sqlite::SqliteWatermarkStore;

use catalog_sync_domain::{ChangeVersion, SyncErrorCode, Watermark};
use catalog_sync_shared::Result;

/// Reject a backwards move before anything is written.
fn ensure_forward(watermark: &Watermark, new_version: ChangeVersion) -> Result<()> {
    if new_version < watermark.last_version {
        let message = format!(
            "refusing to move watermark of partition {} from {} back to {}",
            watermark.partition_id, watermark.last_version, new_version
        );
        return Err(SyncErrorCode::WatermarkRegression
            .envelope(message)
            .with_metadata("partition", watermark.partition_id.to_string())
            .with_metadata("lastVersion", watermark.last_version.to_string())
            .with_metadata("newVersion", new_version.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_sync_domain::PartitionId;

    #[test]
    fn regression_is_rejected_and_equal_is_allowed() -> Result<()> {
        let watermark = Watermark {
            partition_id: PartitionId::parse("1")?,
            last_version: ChangeVersion::new(10),
            last_sync_at_ms: 0,
        };
        let error = ensure_forward(&watermark, ChangeVersion::new(9)).err();
        assert!(error.is_some_and(|error| SyncErrorCode::WatermarkRegression.matches(&error)));
        assert!(ensure_forward(&watermark, ChangeVersion::new(10)).is_ok());
        assert!(ensure_forward(&watermark, ChangeVersion::new(11)).is_ok());
        Ok(())
    }
}
