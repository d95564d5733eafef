//! Storage errors raised inside SQL adapters.
//!
//! Adapters work with [`StoreError`] while they hold a connection and convert
//! to an [`ErrorEnvelope`] at the port boundary. The same failure maps to a
//! different `sync:*` code depending on which port observed it.

use catalog_sync_domain::{PartitionId, SyncErrorCode};
use catalog_sync_shared::ErrorEnvelope;
use std::fmt;

/// Failure of a SQL-backed adapter.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The database could not be opened or connected to.
    #[error("{backend} connection failed: {message}")]
    Connect {
        /// Backend label (`sqlite`, `postgres`).
        backend: &'static str,
        /// Driver message.
        message: String,
    },
    /// A read statement failed.
    #[error("{backend} query failed: {message}")]
    Query {
        /// Backend label.
        backend: &'static str,
        /// Driver message.
        message: String,
    },
    /// A write statement failed; the row may or may not be written.
    #[error("{backend} write failed: {message}")]
    Write {
        /// Backend label.
        backend: &'static str,
        /// Driver message.
        message: String,
    },
    /// A stored value does not fit the domain type.
    #[error("{backend} returned an invalid {column}: {message}")]
    Decode {
        /// Backend label.
        backend: &'static str,
        /// Column that held the value.
        column: Box<str>,
        /// What was wrong with it.
        message: String,
    },
    /// The compare-and-set update matched no row.
    #[error("watermark for partition {partition} is no longer at version {expected}")]
    Conflict {
        /// Partition being advanced.
        partition: PartitionId,
        /// Version the caller observed.
        expected: u64,
    },
    /// The blocking worker thread died.
    #[error("storage worker failed: {0}")]
    Worker(String),
    /// The system clock reads before the unix epoch.
    #[error("system clock is before the unix epoch")]
    Clock,
}

impl StoreError {
    pub(crate) fn connect(backend: &'static str, error: &dyn fmt::Display) -> Self {
        Self::Connect {
            backend,
            message: error.to_string(),
        }
    }

    pub(crate) fn query(backend: &'static str, error: &dyn fmt::Display) -> Self {
        Self::Query {
            backend,
            message: error.to_string(),
        }
    }

    pub(crate) fn write(backend: &'static str, error: &dyn fmt::Display) -> Self {
        Self::Write {
            backend,
            message: error.to_string(),
        }
    }

    const fn backend(&self) -> Option<&'static str> {
        match self {
            Self::Connect { backend, .. }
            | Self::Query { backend, .. }
            | Self::Write { backend, .. }
            | Self::Decode { backend, .. } => Some(*backend),
            Self::Conflict { .. } | Self::Worker(_) | Self::Clock => None,
        }
    }

    /// Envelope as seen by a change feed caller.
    ///
    /// Losing the connection is `sync:feed_unavailable`; anything that went
    /// wrong with a statement on a live connection is `sync:feed_query_failed`.
    #[must_use]
    pub fn into_feed_error(self) -> ErrorEnvelope {
        let code = match self {
            Self::Connect { .. } | Self::Worker(_) => SyncErrorCode::FeedUnavailable,
            _ => SyncErrorCode::FeedQueryFailed,
        };
        self.into_envelope(code)
    }

    /// Envelope as seen by a watermark store caller.
    #[must_use]
    pub fn into_watermark_error(self) -> ErrorEnvelope {
        let code = match self {
            Self::Conflict { .. } => SyncErrorCode::WatermarkConflict,
            _ => SyncErrorCode::PersistFailed,
        };
        self.into_envelope(code)
    }

    fn into_envelope(self, code: SyncErrorCode) -> ErrorEnvelope {
        let backend = self.backend();
        let conflict = match &self {
            Self::Conflict {
                partition,
                expected,
            } => Some((partition.to_string(), expected.to_string())),
            _ => None,
        };
        let mut envelope = code.envelope(self.to_string());
        if let Some(backend) = backend {
            envelope = envelope.with_metadata("backend", backend);
        }
        if let Some((partition, expected)) = conflict {
            envelope = envelope
                .with_metadata("partition", partition)
                .with_metadata("expectedVersion", expected);
        }
        envelope
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_sync_shared::ErrorKind;

    #[test]
    fn connection_loss_is_feed_unavailable() {
        let error = StoreError::connect("sqlite", &"unable to open database file").into_feed_error();
        assert!(SyncErrorCode::FeedUnavailable.matches(&error));
        assert!(error.is_retriable());
        assert_eq!(
            error.metadata.get("backend").map(String::as_str),
            Some("sqlite")
        );
    }

    #[test]
    fn statement_failure_is_feed_query_failed() {
        let error = StoreError::query("postgres", &"relation does not exist").into_feed_error();
        assert!(SyncErrorCode::FeedQueryFailed.matches(&error));
    }

    #[test]
    fn conflict_keeps_its_own_code() -> Result<(), Box<dyn std::error::Error>> {
        let partition = PartitionId::parse("1")?;
        let error = StoreError::Conflict {
            partition,
            expected: 7,
        }
        .into_watermark_error();
        assert!(SyncErrorCode::WatermarkConflict.matches(&error));
        assert_eq!(error.kind, ErrorKind::Expected);
        assert_eq!(
            error.metadata.get("expectedVersion").map(String::as_str),
            Some("7")
        );
        Ok(())
    }

    #[test]
    fn write_failure_is_persist_failed() {
        let error = StoreError::write("sqlite", &"disk I/O error").into_watermark_error();
        assert!(SyncErrorCode::PersistFailed.matches(&error));
        assert!(error.message.contains("disk I/O error"));
    }
}
