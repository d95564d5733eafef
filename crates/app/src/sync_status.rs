//! Read-only sync status.
//!
//! Reports where each partition's watermark sits relative to the feed, plus
//! any stored watermarks whose partition is no longer configured.
//! Nothing is created or written: uninitialized partitions stay that way.

use catalog_sync_domain::{ChangeVersion, PartitionId, Watermark};
use catalog_sync_ports::{
    ChangeLogSourcePort, ChangeNotifierPort, PartitionSourcePort, WatermarkStorePort,
};
use catalog_sync_shared::{RequestContext, Result};
use serde::Serialize;
use std::sync::Arc;

/// Dependencies required by the status read.
#[derive(Clone)]
pub struct SyncStatusDeps {
    /// Change feed.
    pub changelog: Arc<dyn ChangeLogSourcePort>,
    /// Watermark store.
    pub watermarks: Arc<dyn WatermarkStorePort>,
    /// Notifier, consulted for the enabled flag only.
    pub notifier: Arc<dyn ChangeNotifierPort>,
    /// Partitions to report.
    pub partitions: Arc<dyn PartitionSourcePort>,
}

/// Status of one partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionStatus {
    /// Partition id.
    pub partition_id: PartitionId,
    /// Whether sync is enabled for the partition.
    pub enabled: bool,
    /// Stored watermark; `None` until the first tick visits the partition.
    pub watermark: Option<Watermark>,
    /// Versions between the watermark and the feed head.
    pub lag: Option<u64>,
}

/// Feed head plus per-partition status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatusReport {
    /// Whether the feed answered.
    pub feed_available: bool,
    /// Feed head; `None` when the feed is unavailable.
    pub current_version: Option<ChangeVersion>,
    /// One entry per partition, in enumeration order.
    pub partitions: Vec<PartitionStatus>,
    /// Stored watermarks for partitions that are not listed any more.
    pub unconfigured: Vec<Watermark>,
}

impl SyncStatusReport {
    /// Status for `partition`, if listed.
    #[must_use]
    pub fn partition(&self, partition: &PartitionId) -> Option<&PartitionStatus> {
        self.partitions
            .iter()
            .find(|status| &status.partition_id == partition)
    }
}

/// Read the feed head and every partition's watermark.
pub async fn sync_status(ctx: &RequestContext, deps: &SyncStatusDeps) -> Result<SyncStatusReport> {
    let feed_available = deps.changelog.is_available(ctx).await;
    let current_version = if feed_available {
        Some(deps.changelog.current_version(ctx).await)
    } else {
        None
    };

    let listed = deps.partitions.list_partitions(ctx).await?;
    let mut partitions = Vec::with_capacity(listed.len());
    for partition_id in listed.iter().cloned() {
        ctx.ensure_not_cancelled("sync_status.partition")?;
        let watermark = deps.watermarks.load(ctx, &partition_id).await?;
        let lag = match (current_version, watermark.as_ref()) {
            (Some(current), Some(watermark)) => Some(current.lag_since(watermark.last_version)),
            _ => None,
        };
        partitions.push(PartitionStatus {
            enabled: deps.notifier.is_enabled_for(&partition_id),
            partition_id,
            watermark,
            lag,
        });
    }

    let unconfigured = deps
        .watermarks
        .list(ctx)
        .await?
        .into_iter()
        .filter(|watermark| !listed.contains(&watermark.partition_id))
        .collect();

    Ok(SyncStatusReport {
        feed_available,
        current_version,
        partitions,
        unconfigured,
    })
}
