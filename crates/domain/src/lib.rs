//! # catalog-sync-domain
//!
//! Domain model for changelog-based incremental sync:
//!
//! - **Primitives** - `PartitionId`, `EntityId`, `ChangeVersion`, `SqlIdentifier`
//! - **Watermarks** - `Watermark`, `VersionWindow`, `ChangeRecord`, `ChangedEntities`
//! - **Outcomes** - per-partition and per-tick results of a sync run
//! - **Errors** - stable `sync:*` error codes
//!
//! ## Dependency Rules
//!
//! - Depends only on `shared`
//! - No I/O

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub use catalog_sync_shared::shared_crate_version;

pub mod errors;
pub mod outcome;
pub mod primitives;
pub mod watermark;

pub use errors::SyncErrorCode;
pub use outcome::{
    AbortReason, FailureStage, PartitionOutcome, PartitionReport, SyncTickReport, TickOutcome,
};
pub use primitives::{ChangeVersion, EntityId, PartitionId, PrimitiveError, SqlIdentifier};
pub use watermark::{ChangeRecord, ChangedEntities, VersionWindow, Watermark};

/// Returns the domain crate version.
#[must_use]
pub const fn domain_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_crate_compiles() {
        assert!(!domain_crate_version().is_empty());
    }

    #[test]
    fn domain_depends_on_shared() {
        assert!(!shared_crate_version().is_empty());
    }
}
