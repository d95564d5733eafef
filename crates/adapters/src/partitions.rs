//! Partition source backed by configuration.

use catalog_sync_config::ValidatedSyncConfig;
use catalog_sync_domain::PartitionId;
use catalog_sync_ports::{BoxFuture, PartitionSourcePort};
use catalog_sync_shared::{RequestContext, Result};

/// Lists the configured partitions in file order, disabled ones included.
///
/// Whether a partition is actually synced is the notifier's call.
#[derive(Debug, Clone, Default)]
pub struct ConfiguredPartitions {
    partitions: Vec<PartitionId>,
}

impl ConfiguredPartitions {
    /// Wrap an explicit list.
    #[must_use]
    pub const fn new(partitions: Vec<PartitionId>) -> Self {
        Self { partitions }
    }

    /// Take the list from the `partitions` section.
    #[must_use]
    pub fn from_config(config: &ValidatedSyncConfig) -> Self {
        Self::new(config.partitions.iter().map(|entry| entry.id.clone()).collect())
    }
}

impl PartitionSourcePort for ConfiguredPartitions {
    fn list_partitions(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<Vec<PartitionId>>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("partitions.list")?;
            Ok(self.partitions.clone())
        })
    }
}
