//! Change feed adapters.

#[cfg(feature = "postgres")]
mod postgres;
mod sqlite;

#[cfg(feature = "postgres")]
pub use postgres::PostgresChangeLogSource;
pub use sqlite::SqliteChangeLogSource;

use crate::sql::is_timeout;
use catalog_sync_domain::{SyncErrorCode, VersionWindow};
use catalog_sync_shared::ErrorEnvelope;

/// A feed query that ran out of time is treated as an unreachable feed.
fn escalate_timeout(error: ErrorEnvelope, window: VersionWindow) -> ErrorEnvelope {
    let error = if is_timeout(&error) {
        let mut escalated = SyncErrorCode::FeedUnavailable.envelope(error.message);
        escalated.metadata = error.metadata;
        escalated
    } else {
        error
    };
    error
        .with_metadata("after", window.after.to_string())
        .with_metadata("upTo", window.up_to.to_string())
}
