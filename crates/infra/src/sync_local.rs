//! One-shot sync and status entry points for the CLI.

use crate::factory::{build_status_deps, build_sync_deps};
use crate::tick_lock::{TickLock, tick_lock_path, tick_locked_error};
use crate::{InfraError, InfraResult, Observability};
use catalog_sync_app::{SyncOrchestrator, SyncStatusReport, sync_status};
use catalog_sync_config::ValidatedSyncConfig;
use catalog_sync_domain::SyncTickReport;
use catalog_sync_shared::{CancellationToken, RequestContext};
use std::future::Future;

/// Run a single tick under the tick lock.
///
/// Fails with `sync:tick_locked` when another process is mid-tick, and with
/// a config error when an adapter cannot be built. Feed outages and partition
/// failures are described in the returned report instead.
pub fn run_sync_once(
    config: &ValidatedSyncConfig,
    observability: &Observability,
) -> InfraResult<SyncTickReport> {
    let lock_path = tick_lock_path(config);
    let Some(_lock) = TickLock::try_acquire(&lock_path)? else {
        return Err(tick_locked_error(&lock_path));
    };

    let ctx = RequestContext::new_tick(&CancellationToken::new());
    let observability = observability.for_tick(&ctx);
    run_async(async move {
        let orchestrator = SyncOrchestrator::new(build_sync_deps(config, &observability)?);
        Ok(orchestrator.run(&ctx).await)
    })
}

/// Read each partition's watermark and lag without writing anything.
pub fn read_status(config: &ValidatedSyncConfig) -> InfraResult<SyncStatusReport> {
    let ctx = RequestContext::new_request();
    run_async(async move {
        let deps = build_status_deps(config)?;
        sync_status(&ctx, &deps).await
    })
}

pub(crate) fn run_async<F, T>(future: F) -> InfraResult<T>
where
    F: Future<Output = InfraResult<T>>,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(InfraError::from)?;
    runtime.block_on(future)
}
