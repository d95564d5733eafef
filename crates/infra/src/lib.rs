//! # catalog-sync-infra
//!
//! Composition root: turns a validated config into adapters and runs the
//! sync use cases on a runtime.
//! This crate depends on `app`, `adapters`, `config`, and `shared`.

/// Config loading helpers used by CLI surfaces.
pub mod config_check;
/// Scheduler loop.
pub mod daemon;
/// Environment validation helpers used by CLI surfaces.
pub mod env_check;
/// Adapter selection from config.
pub mod factory;
/// Logger and telemetry selection.
pub mod observability;
/// One-shot tick and status entry points.
pub mod sync_local;
/// Cross-process tick lock.
pub mod tick_lock;

pub use config_check::{
    ConfigFormat, load_effective_config, load_effective_config_json, render_config,
};
pub use daemon::{DaemonOptions, DaemonSummary, run_daemon, scheduler_loop};
pub use env_check::{InfraError, InfraResult, validate_env_parsing};
pub use factory::{build_status_deps, build_sync_deps, postgres_enabled};
pub use observability::Observability;
pub use sync_local::{read_status, run_sync_once};
pub use tick_lock::{TickLock, tick_lock_path, tick_locked_error};

// Re-export redaction utilities for CLI boundary sanitization
pub use catalog_sync_shared::{is_secret_key, redact_if_secret};

/// Crate version of the infra layer.
#[must_use]
pub const fn infra_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Versions of every layer linked into this build, for `csync info`.
#[must_use]
pub fn crate_versions() -> Vec<(&'static str, &'static str)> {
    vec![
        ("shared", catalog_sync_shared::shared_crate_version()),
        ("domain", catalog_sync_domain::domain_crate_version()),
        ("ports", catalog_sync_ports::ports_crate_version()),
        ("config", catalog_sync_config::config_crate_version()),
        ("adapters", catalog_sync_adapters::adapters_crate_version()),
        ("app", catalog_sync_app::app_crate_version()),
        ("infra", infra_crate_version()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

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
                in_deps = line == "[dependencies]";
                continue;
            }
            if in_deps && line.starts_with("catalog-sync-") {
                let key = line.split('=').next().unwrap_or("").trim();
                let name = key.split('.').next().unwrap_or("").trim();
                deps.push(name.to_string());
            }
        }

        deps
    }

    #[test]
    fn infra_depends_on_app_adapters_config() {
        let deps = workspace_deps();
        for expected in [
            "catalog-sync-app",
            "catalog-sync-adapters",
            "catalog-sync-config",
        ] {
            assert!(
                deps.iter().any(|dep| dep == expected),
                "missing dependency: {expected}"
            );
        }
        assert!(!deps.iter().any(|dep| dep == "catalog-sync-testkit"));
    }

    #[test]
    fn every_layer_reports_the_same_version() {
        let versions = crate_versions();
        assert_eq!(versions.len(), 7);
        assert!(
            versions
                .iter()
                .all(|(_, version)| *version == infra_crate_version())
        );
    }
}
