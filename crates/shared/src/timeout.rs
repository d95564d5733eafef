//! Timeout helper that also honours request cancellation.

use crate::{ErrorClass, ErrorCode, ErrorEnvelope, RequestContext, Result};
use std::future::Future;
use std::time::Duration;

/// Run `fut` with a deadline; cancellation of `ctx` wins over both.
///
/// Elapsed deadlines become retriable `core:timeout` errors tagged with
/// `operation` and the timeout in milliseconds.
pub async fn timeout_with_context<T, F>(
    ctx: &RequestContext,
    timeout: Duration,
    operation: &'static str,
    fut: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    ctx.ensure_not_cancelled(operation)?;

    tokio::select! {
        () = ctx.cancelled() => Err(
            ErrorEnvelope::cancelled("operation cancelled").with_metadata("operation", operation),
        ),
        res = tokio::time::timeout(timeout, fut) => {
            res.unwrap_or_else(|_| {
                Err(ErrorEnvelope::unexpected(
                    ErrorCode::timeout(),
                    format!("operation timed out: {operation}"),
                    ErrorClass::Retriable,
                )
                .with_metadata("operation", operation)
                .with_metadata("timeout_ms", timeout.as_millis().to_string()))
            })
        }
    }
}
