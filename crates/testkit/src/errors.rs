//! Test fixtures for shared and sync error envelopes.

use catalog_sync_domain::SyncErrorCode;
use catalog_sync_shared::{ErrorClass, ErrorCode, ErrorEnvelope};

/// Return a list of common error codes used in tests.
pub fn common_error_codes() -> Vec<ErrorCode> {
    vec![
        ErrorCode::cancelled(),
        ErrorCode::invalid_input(),
        ErrorCode::timeout(),
        ErrorCode::io(),
        ErrorCode::internal(),
        SyncErrorCode::FeedUnavailable.code(),
        SyncErrorCode::FeedQueryFailed.code(),
        SyncErrorCode::PersistFailed.code(),
    ]
}

/// A cancellation error fixture.
pub fn cancelled_error() -> ErrorEnvelope {
    ErrorEnvelope::cancelled("cancelled")
}

/// A retriable timeout error fixture.
pub fn timeout_error() -> ErrorEnvelope {
    ErrorEnvelope::unexpected(ErrorCode::timeout(), "timeout", ErrorClass::Retriable)
}

/// The feed went away in the middle of a query.
pub fn feed_unavailable_error() -> ErrorEnvelope {
    SyncErrorCode::FeedUnavailable.envelope("change feed connection lost")
}

/// A single window query failed.
pub fn feed_query_error() -> ErrorEnvelope {
    SyncErrorCode::FeedQueryFailed.envelope("change feed query failed")
}

/// The watermark store rejected a write.
pub fn persist_error() -> ErrorEnvelope {
    SyncErrorCode::PersistFailed.envelope("watermark write failed")
}
