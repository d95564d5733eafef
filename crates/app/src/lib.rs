//! # catalog-sync-app
//!
//! Application use cases: the changelog sync tick and the status read.
//! This crate depends on `ports`, `domain`, and `shared`.

pub mod sync_changelog;
pub mod sync_status;

/// Returns the app crate version.
#[must_use]
pub const fn app_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub use sync_changelog::{SyncChangelogDeps, SyncOrchestrator, sync_changelog};
pub use sync_status::{PartitionStatus, SyncStatusDeps, SyncStatusReport, sync_status};

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_sync_domain::domain_crate_version;
    use catalog_sync_ports::ports_crate_version;
    use catalog_sync_shared::shared_crate_version;

    #[test]
    fn app_can_use_ports_domain_shared() {
        assert!(!app_crate_version().is_empty());
        assert!(!ports_crate_version().is_empty());
        assert!(!domain_crate_version().is_empty());
        assert!(!shared_crate_version().is_empty());
    }
}
