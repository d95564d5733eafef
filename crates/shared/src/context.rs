//! Request and tick scoped context.
//!
//! A `RequestContext` travels through every port call. It carries the
//! correlation id stamped on logs and metrics, and the cancellation token
//! honoured by retry/timeout helpers.

use crate::{ErrorCode, ErrorEnvelope, Result};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Correlation identifier used for logging/telemetry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationId(Arc<str>);

impl CorrelationId {
    /// Parse a correlation identifier; the value is trimmed and must be non-empty.
    pub fn parse(value: impl AsRef<str>) -> Result<Self> {
        let trimmed = value.as_ref().trim();
        if trimmed.is_empty() {
            return Err(ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                "correlationId must be non-empty",
            ));
        }
        Ok(Self(Arc::from(trimmed)))
    }

    /// New `req_*` id, unique within this process.
    #[must_use]
    pub fn new_request_id() -> Self {
        next_scoped_id(&REQUEST_ID_COUNTER, "req_")
    }

    /// New `tick_*` id for one scheduler tick, unique within this process.
    #[must_use]
    pub fn new_tick_id() -> Self {
        next_scoped_id(&TICK_ID_COUNTER, "tick_")
    }

    /// Borrow the identifier as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

static REQUEST_ID_COUNTER: AtomicU64 = AtomicU64::new(1);
static TICK_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

fn next_scoped_id(counter: &AtomicU64, prefix: &'static str) -> CorrelationId {
    let n = counter.fetch_add(1, Ordering::Relaxed);
    CorrelationId(Arc::from(format!("{prefix}{n}")))
}

/// Clonable cancellation token.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: tokio_util::sync::CancellationToken,
}

impl CancellationToken {
    /// New token in the non-cancelled state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the token and wake all waiters.
    pub fn cancel(&self) {
        self.inner.cancel();
    }

    /// Returns true if the token has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }

    /// Child token: cancelled with its parent, cancellable on its own.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            inner: self.inner.child_token(),
        }
    }

    /// Wait until the token is cancelled.
    pub async fn cancelled(&self) {
        self.inner.cancelled().await;
    }
}

/// Context passed to every port call.
#[derive(Debug, Clone)]
pub struct RequestContext {
    correlation_id: CorrelationId,
    cancellation: CancellationToken,
}

impl RequestContext {
    /// Context with a fresh cancellation token.
    #[must_use]
    pub fn new(correlation_id: CorrelationId) -> Self {
        Self {
            correlation_id,
            cancellation: CancellationToken::new(),
        }
    }

    /// Context with an auto-generated `req_*` id.
    #[must_use]
    pub fn new_request() -> Self {
        Self::new(CorrelationId::new_request_id())
    }

    /// Context for one scheduler tick, cancelled together with `parent`.
    #[must_use]
    pub fn new_tick(parent: &CancellationToken) -> Self {
        Self::with_cancellation(CorrelationId::new_tick_id(), parent.child())
    }

    /// Context with an explicit cancellation token.
    #[must_use]
    pub const fn with_cancellation(
        correlation_id: CorrelationId,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            correlation_id,
            cancellation,
        }
    }

    /// Return the correlation id.
    #[must_use]
    pub const fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    /// Return a clone of the cancellation token.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Returns true if the request was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Cancel this request.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// Await cancellation.
    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await;
    }

    /// Return a cancellation error tagged with `operation` when cancelled.
    pub fn ensure_not_cancelled(&self, operation: &'static str) -> Result<()> {
        if self.is_cancelled() {
            return Err(ErrorEnvelope::cancelled("operation cancelled")
                .with_metadata("operation", operation));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correlation_ids_are_prefixed() {
        assert!(CorrelationId::new_request_id().as_str().starts_with("req_"));
        assert!(CorrelationId::new_tick_id().as_str().starts_with("tick_"));
    }

    #[test]
    fn empty_correlation_id_is_rejected() {
        assert!(CorrelationId::parse("  ").is_err());
        assert!(matches!(CorrelationId::parse(" abc "), Ok(id) if id.as_str() == "abc"));
    }

    #[test]
    fn tick_context_follows_parent_cancellation() {
        let parent = CancellationToken::new();
        let ctx = RequestContext::new_tick(&parent);
        assert!(ctx.ensure_not_cancelled("tick").is_ok());

        parent.cancel();
        let error = ctx.ensure_not_cancelled("tick").err();
        assert!(error.is_some_and(|error| error.is_cancelled()));
    }

    #[test]
    fn cancelling_tick_does_not_cancel_parent() {
        let parent = CancellationToken::new();
        let ctx = RequestContext::new_tick(&parent);
        ctx.cancel();
        assert!(ctx.is_cancelled());
        assert!(!parent.is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_future_resolves_after_cancel() {
        let ctx = RequestContext::new_request();
        let waiter = ctx.clone();
        let task = tokio::spawn(async move { waiter.cancelled().await });
        ctx.cancel();
        assert!(task.await.is_ok());
    }
}
