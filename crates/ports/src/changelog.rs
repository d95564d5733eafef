//! Change feed boundary contract.

use crate::BoxFuture;
use catalog_sync_domain::{ChangeVersion, ChangedEntities, VersionWindow};
use catalog_sync_shared::{RequestContext, Result};

/// Read-only access to an append-only, versioned change feed.
///
/// Versions come from one global counter shared by all partitions, so the
/// feed itself is not partition-aware.
pub trait ChangeLogSourcePort: Send + Sync {
    /// True if the feed can be queried. Failures collapse to `false`.
    fn is_available(&self, ctx: &RequestContext) -> BoxFuture<'_, bool>;

    /// Highest version ever assigned; `0` when the feed is empty or unavailable.
    fn current_version(&self, ctx: &RequestContext) -> BoxFuture<'_, ChangeVersion>;

    /// Distinct entity ids with `window.after < version <= window.up_to`.
    ///
    /// Empty windows return an empty set without touching the store. A store
    /// that becomes unreachable yields `sync:feed_unavailable`; this error must
    /// reach the caller so the watermark is not advanced past unseen changes.
    fn changed_entity_ids(
        &self,
        ctx: &RequestContext,
        window: VersionWindow,
    ) -> BoxFuture<'_, Result<ChangedEntities>>;
}
