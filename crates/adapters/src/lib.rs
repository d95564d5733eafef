//! # catalog-sync-adapters
//!
//! Port implementations: SQL change feeds and watermark stores (SQLite by
//! default, Postgres behind the `postgres` feature), the HTTP webhook
//! notifier, the configured partition list, and the logging/telemetry sinks.
//! This crate depends on `ports`, `shared`, `domain` and `config`.

pub mod changelog;
pub mod errors;
pub mod log_sink;
pub mod logger;
#[cfg(feature = "http-notifier")]
pub mod notifier;
pub mod partitions;
pub mod sql;
pub mod telemetry;
pub mod tracing_logger;
pub mod watermark;

pub use errors::StoreError;
pub use sql::ChangelogTable;

/// Returns the adapters crate version.
#[must_use]
pub const fn adapters_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
