//! # catalog-sync-ports
//!
//! Port traits for the catalog-sync hexagonal architecture.
//!
//! The sync use-case talks to four collaborators (change feed, watermark
//! store, notifier, partition source) plus logging and telemetry, all
//! through the traits below. This crate depends only on `domain` and `shared`.

use std::future::Future;
use std::pin::Pin;

/// Boxed future used by port traits.
///
/// Boundary calls are I/O bound, so the allocation per call is irrelevant
/// next to a database round-trip or an HTTP request.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Returns the ports crate version.
#[must_use]
pub const fn ports_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub mod changelog;
pub mod logger;
pub mod notifier;
pub mod partitions;
pub mod telemetry;
pub mod watermark;

pub use changelog::*;
pub use logger::*;
pub use notifier::*;
pub use partitions::*;
pub use telemetry::*;
pub use watermark::*;

// Re-export the domain types used in port signatures, so adapter crates can
// implement ports without depending on `catalog-sync-domain` directly.
pub use catalog_sync_domain::{
    ChangeVersion, ChangedEntities, EntityId, PartitionId, VersionWindow, Watermark,
};

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_sync_domain::domain_crate_version;
    use catalog_sync_shared::shared_crate_version;

    fn workspace_deps() -> Vec<String> {
        let cargo_toml = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/Cargo.toml"));
        let mut deps = Vec::new();
        let mut in_deps = false;

        for raw_line in cargo_toml.lines() {
            let line = raw_line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            if line.starts_with('[') {
                in_deps = line == "[dependencies]" || line == "[dev-dependencies]";
                continue;
            }
            if in_deps && line.starts_with("catalog-sync-") {
                let key = line.split('=').next().unwrap_or("").trim();
                deps.push(key.split('.').next().unwrap_or("").trim().to_string());
            }
        }

        deps
    }

    #[test]
    fn ports_depends_only_on_domain_and_shared() {
        let deps = workspace_deps();
        let allowed = ["catalog-sync-domain", "catalog-sync-shared"];

        for dep in &deps {
            assert!(
                allowed.contains(&dep.as_str()),
                "unexpected dependency found: {dep}"
            );
        }
        for expected in allowed {
            assert!(
                deps.iter().any(|dep| dep == expected),
                "missing dependency: {expected}"
            );
        }
    }

    #[test]
    fn ports_can_use_domain_and_shared() {
        assert!(!ports_crate_version().is_empty());
        assert!(!domain_crate_version().is_empty());
        assert!(!shared_crate_version().is_empty());
    }
}
