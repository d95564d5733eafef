//! Stable `sync:*` error codes.

use catalog_sync_shared::{ErrorClass, ErrorCode, ErrorEnvelope};

/// Failure categories of the sync core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncErrorCode {
    /// The change feed cannot be reached at all.
    FeedUnavailable,
    /// A range query against the feed failed.
    FeedQueryFailed,
    /// The notifier did not confirm delivery.
    NotifyFailed,
    /// A watermark write failed or its outcome is unknown.
    PersistFailed,
    /// A caller tried to move a watermark backwards.
    WatermarkRegression,
    /// Another writer moved the watermark first.
    WatermarkConflict,
    /// The partition list could not be enumerated.
    PartitionsUnavailable,
}

impl SyncErrorCode {
    /// The code identifier within the `sync` namespace.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FeedUnavailable => "feed_unavailable",
            Self::FeedQueryFailed => "feed_query_failed",
            Self::NotifyFailed => "notify_failed",
            Self::PersistFailed => "persist_failed",
            Self::WatermarkRegression => "watermark_regression",
            Self::WatermarkConflict => "watermark_conflict",
            Self::PartitionsUnavailable => "partitions_unavailable",
        }
    }

    /// Build the `ErrorCode`.
    #[must_use]
    pub fn code(self) -> ErrorCode {
        ErrorCode::new("sync", self.as_str())
    }

    /// Build the canonical envelope for this category.
    pub fn envelope(self, message: impl Into<String>) -> ErrorEnvelope {
        match self {
            Self::WatermarkRegression => ErrorEnvelope::invariant(self.code(), message),
            Self::WatermarkConflict => {
                ErrorEnvelope::expected_with_class(self.code(), message, ErrorClass::Retriable)
            },
            Self::NotifyFailed => {
                ErrorEnvelope::unexpected(self.code(), message, ErrorClass::NonRetriable)
            },
            Self::FeedUnavailable
            | Self::FeedQueryFailed
            | Self::PersistFailed
            | Self::PartitionsUnavailable => {
                ErrorEnvelope::unexpected(self.code(), message, ErrorClass::Retriable)
            },
        }
    }

    /// True when `error` carries this code.
    #[must_use]
    pub fn matches(self, error: &ErrorEnvelope) -> bool {
        error.code.namespace() == "sync" && error.code.code() == self.as_str()
    }
}
