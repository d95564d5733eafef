//! Change notification boundary contract.

use crate::BoxFuture;
use catalog_sync_domain::{ChangeVersion, ChangedEntities, PartitionId};
use catalog_sync_shared::RequestContext;

/// One delivery to the external system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyBatch {
    /// Partition the changes belong to.
    pub partition: PartitionId,
    /// Distinct changed entities.
    pub entity_ids: ChangedEntities,
    /// Feed version the batch covers up to (inclusive).
    pub up_to_version: ChangeVersion,
}

/// Delivers changed entity ids to an external system.
pub trait ChangeNotifierPort: Send + Sync {
    /// Whether sync is turned on for `partition`.
    fn is_enabled_for(&self, partition: &PartitionId) -> bool;

    /// Deliver `batch`; `true` only on confirmed acceptance.
    ///
    /// Transport errors, rejected responses and missing destinations all
    /// yield `false`. An empty batch is accepted without any delivery.
    fn notify(&self, ctx: &RequestContext, batch: NotifyBatch) -> BoxFuture<'_, bool>;
}
