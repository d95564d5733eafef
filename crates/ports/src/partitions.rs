//! Partition enumeration boundary contract.

use crate::BoxFuture;
use catalog_sync_domain::PartitionId;
use catalog_sync_shared::{RequestContext, Result};

/// Lists the partitions a tick should consider.
///
/// Partitions are defined outside the sync core; enumeration happens once
/// per tick so newly added stores are picked up without a restart.
pub trait PartitionSourcePort: Send + Sync {
    /// Partitions in processing order.
    fn list_partitions(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<Vec<PartitionId>>>;
}
