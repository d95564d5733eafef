//! Watermark persistence boundary contract.

use crate::BoxFuture;
use catalog_sync_domain::{ChangeVersion, PartitionId, Watermark};
use catalog_sync_shared::{RequestContext, Result};

/// Result of `get_or_init`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedWatermark {
    /// Persisted watermark.
    pub watermark: Watermark,
    /// True when this call created the record.
    pub created: bool,
}

/// Durable per-partition watermark state.
pub trait WatermarkStorePort: Send + Sync {
    /// Load the watermark, creating it at `init_version` when absent.
    ///
    /// A created record is durable before this returns. If another writer
    /// creates the record concurrently, the stored record wins.
    fn get_or_init(
        &self,
        ctx: &RequestContext,
        partition: &PartitionId,
        init_version: ChangeVersion,
    ) -> BoxFuture<'_, Result<LoadedWatermark>>;

    /// Move `watermark` to `new_version` and stamp the sync time.
    ///
    /// Fails with `sync:watermark_regression` when `new_version` is lower
    /// than `watermark.last_version`, and with `sync:watermark_conflict` when
    /// the stored version no longer matches `watermark.last_version`.
    fn advance(
        &self,
        ctx: &RequestContext,
        watermark: &Watermark,
        new_version: ChangeVersion,
    ) -> BoxFuture<'_, Result<Watermark>>;

    /// Read a watermark without creating it.
    fn load(
        &self,
        ctx: &RequestContext,
        partition: &PartitionId,
    ) -> BoxFuture<'_, Result<Option<Watermark>>>;

    /// All stored watermarks, ordered by partition id.
    fn list(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<Vec<Watermark>>>;
}
