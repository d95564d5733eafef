//! Scheduler loop for `csync daemon`.
//!
//! Ticks run on a fixed interval. A tick whose slot is missed (because the
//! previous one overran) is skipped rather than queued, and a tick whose
//! lock is held by another process (or cannot be opened) is skipped as well.
//! Shutdown is checked between ticks only: a running tick finishes its
//! partitions before the loop exits.

use crate::factory::build_sync_deps;
use crate::sync_local::run_async;
use crate::tick_lock::{TickLock, tick_lock_path};
use crate::{InfraResult, Observability};
use catalog_sync_app::{SyncChangelogDeps, sync_changelog};
use catalog_sync_config::ValidatedSyncConfig;
use catalog_sync_domain::SyncTickReport;
use catalog_sync_ports::{LogFields, LoggerPort};
use catalog_sync_shared::{CancellationToken, ErrorEnvelope, RequestContext};
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

/// Knobs for the scheduler loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DaemonOptions {
    /// Stop after this many scheduled slots (run or skipped).
    pub max_ticks: Option<u64>,
    /// Cancel on Ctrl-C.
    pub handle_ctrl_c: bool,
}

/// Totals over the daemon's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DaemonSummary {
    /// Ticks that ran.
    pub ticks: u64,
    /// Ticks that stopped at their preconditions.
    pub aborted_ticks: u64,
    /// Slots skipped because the lock was held elsewhere.
    pub skipped_locked: u64,
    /// Partition passes that advanced a watermark.
    pub partitions_advanced: u64,
    /// Partition passes that held a watermark after an unconfirmed notify.
    pub partitions_pending: u64,
    /// Partition passes that failed.
    pub partitions_failed: u64,
}

impl DaemonSummary {
    fn record(&mut self, report: &SyncTickReport) {
        self.ticks += 1;
        if report.is_aborted() {
            self.aborted_ticks += 1;
        }
        self.partitions_advanced += count_u64(report.count("advanced"));
        self.partitions_pending += count_u64(report.count("notify_pending"));
        self.partitions_failed += count_u64(report.count("failed"));
    }

    const fn slots(&self) -> u64 {
        self.ticks + self.skipped_locked
    }
}

/// Run ticks until `shutdown` is cancelled (or `max_ticks` slots passed).
pub fn run_daemon(
    config: &ValidatedSyncConfig,
    observability: &Observability,
    shutdown: CancellationToken,
    options: DaemonOptions,
) -> InfraResult<DaemonSummary> {
    run_async(async move {
        let deps = build_sync_deps(config, observability)?;
        let ctrl_c = options.handle_ctrl_c.then(|| spawn_ctrl_c_watcher(&shutdown));
        let result = scheduler_loop(config, observability, &deps, &shutdown, options).await;
        if let Some(handle) = ctrl_c {
            handle.abort();
        }
        result
    })
}

/// The loop itself, for callers that already own a runtime.
pub async fn scheduler_loop(
    config: &ValidatedSyncConfig,
    observability: &Observability,
    deps: &SyncChangelogDeps,
    shutdown: &CancellationToken,
    options: DaemonOptions,
) -> InfraResult<DaemonSummary> {
    let interval_ms = config.limits().scheduler_interval_ms.get();
    let lock_path = tick_lock_path(config);
    let logger = observability.logger.as_deref();
    let mut summary = DaemonSummary::default();

    if let Some(logger) = logger {
        let mut fields = LogFields::new();
        fields.insert("intervalMs".into(), Value::from(interval_ms));
        fields.insert("lockPath".into(), Value::from(lock_path.display().to_string()));
        fields.insert("runOnStart".into(), Value::from(config.scheduler.run_on_start));
        logger.info("sync.daemon.started", "Sync daemon started", Some(fields));
    }

    let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick of a tokio interval completes immediately.
    if !config.scheduler.run_on_start {
        ticker.tick().await;
    }

    loop {
        if options.max_ticks.is_some_and(|max| summary.slots() >= max) {
            break;
        }
        tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            _ = ticker.tick() => {},
        }

        match TickLock::try_acquire(&lock_path) {
            Ok(Some(_lock)) => {
                // Shutdown is only observed between ticks.
                let ctx = RequestContext::new_tick(&CancellationToken::new());
                let mut tick_deps = deps.clone();
                tick_deps.telemetry = observability.for_tick(&ctx).telemetry;
                let report = sync_changelog(&ctx, &tick_deps).await;
                summary.record(&report);
            },
            Ok(None) => {
                summary.skipped_locked += 1;
                log_skipped(logger, &lock_path, None);
            },
            Err(error) => {
                summary.skipped_locked += 1;
                log_skipped(logger, &lock_path, Some(&error));
            },
        }
    }

    if let Some(logger) = logger {
        let fields = serde_json::to_value(summary)
            .ok()
            .and_then(|value| match value {
                Value::Object(map) => Some(map.into_iter().map(|(k, v)| (k.into(), v)).collect()),
                _ => None,
            });
        logger.info("sync.daemon.stopped", "Sync daemon stopped", fields);
    }
    Ok(summary)
}

fn log_skipped(
    logger: Option<&dyn LoggerPort>,
    lock_path: &Path,
    error: Option<&ErrorEnvelope>,
) {
    let Some(logger) = logger else {
        return;
    };
    let mut fields = LogFields::new();
    fields.insert("lockPath".into(), Value::from(lock_path.display().to_string()));
    match error {
        None => logger.warn(
            "sync.tick.skipped",
            "Another process holds the tick lock; tick skipped",
            Some(fields),
        ),
        Some(error) => {
            fields.insert("errorCode".into(), Value::from(error.code.to_string()));
            fields.insert("error".into(), Value::from(error.message.clone()));
            logger.error(
                "sync.tick.skipped",
                "Tick lock could not be opened; tick skipped",
                Some(fields),
            );
        },
    }
}

fn spawn_ctrl_c_watcher(shutdown: &CancellationToken) -> tokio::task::JoinHandle<()> {
    let shutdown = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            shutdown.cancel();
        }
    })
}

fn count_u64(count: usize) -> u64 {
    u64::try_from(count).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_sync_config::parse_sync_config_json;
    use catalog_sync_domain::{ChangeVersion, PartitionId};
    use catalog_sync_ports::{BoxFuture, ChangeNotifierPort, NotifyBatch};
    use catalog_sync_testkit::in_memory::{InMemoryPorts, ScriptedNotifier, partition};
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(label: &str) -> std::io::Result<PathBuf> {
        let unique = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("csync-daemon-{label}-{unique}"));
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Requests shutdown while a delivery is in flight.
    struct ShutdownDuringNotify {
        inner: Arc<ScriptedNotifier>,
        shutdown: CancellationToken,
    }

    impl ChangeNotifierPort for ShutdownDuringNotify {
        fn is_enabled_for(&self, partition: &PartitionId) -> bool {
            self.inner.is_enabled_for(partition)
        }

        fn notify(&self, ctx: &RequestContext, batch: NotifyBatch) -> BoxFuture<'_, bool> {
            let ctx = ctx.clone();
            Box::pin(async move {
                self.shutdown.cancel();
                tokio::time::sleep(Duration::from_millis(250)).await;
                if ctx.is_cancelled() {
                    return false;
                }
                self.inner.notify(&ctx, batch).await
            })
        }
    }

    fn config(dir: &Path, run_on_start: bool) -> InfraResult<ValidatedSyncConfig> {
        config_with_lock(dir, run_on_start, &dir.join("tick.lock"))
    }

    fn config_with_lock(
        dir: &Path,
        run_on_start: bool,
        lock_path: &Path,
    ) -> InfraResult<ValidatedSyncConfig> {
        let raw = serde_json::json!({
            "version": 1,
            "changelog": { "path": dir.join("catalog.db") },
            "scheduler": {
                "intervalMs": 1000,
                "runOnStart": run_on_start,
                "lockPath": lock_path
            }
        });
        parse_sync_config_json(&raw.to_string())
    }

    fn deps_for(ports: &InMemoryPorts) -> SyncChangelogDeps {
        SyncChangelogDeps {
            changelog: ports.feed.clone(),
            watermarks: ports.watermarks.clone(),
            notifier: ports.notifier.clone(),
            partitions: ports.partitions.clone(),
            logger: Some(ports.logger.clone()),
            telemetry: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn runs_the_requested_number_of_ticks() -> InfraResult<()> {
        let dir = temp_dir("ticks")?;
        let config = config(&dir, true)?;
        let ports = InMemoryPorts::new().with_partitions(&["1"]);
        ports.feed.append(5);
        let observability = Observability {
            logger: Some(ports.logger.clone()),
            telemetry: None,
        };

        let summary = scheduler_loop(
            &config,
            &observability,
            &deps_for(&ports),
            &CancellationToken::new(),
            DaemonOptions {
                max_ticks: Some(3),
                handle_ctrl_c: false,
            },
        )
        .await?;

        assert_eq!(summary.ticks, 3);
        assert_eq!(summary.skipped_locked, 0);
        assert_eq!(
            ports.watermarks.version_of(&partition("1")),
            Some(ChangeVersion::new(1))
        );
        let events = ports.logger.events();
        assert_eq!(events.first().map(String::as_str), Some("sync.daemon.started"));
        assert_eq!(events.last().map(String::as_str), Some("sync.daemon.stopped"));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn held_lock_skips_the_slot() -> InfraResult<()> {
        let dir = temp_dir("locked")?;
        let config = config(&dir, true)?;
        let ports = InMemoryPorts::new().with_partitions(&["1"]);
        ports.feed.append(5);
        let _held = TickLock::try_acquire(&dir.join("tick.lock"))?;

        let summary = scheduler_loop(
            &config,
            &Observability::disabled(),
            &deps_for(&ports),
            &CancellationToken::new(),
            DaemonOptions {
                max_ticks: Some(2),
                handle_ctrl_c: false,
            },
        )
        .await?;

        assert_eq!(summary.ticks, 0);
        assert_eq!(summary.skipped_locked, 2);
        assert!(ports.watermarks.calls().is_empty());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_shutdown_stops_before_the_next_tick() -> InfraResult<()> {
        let dir = temp_dir("shutdown")?;
        let config = config(&dir, false)?;
        let ports = InMemoryPorts::new().with_partitions(&["1"]);
        ports.feed.append(5);
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let summary = scheduler_loop(
            &config,
            &Observability::disabled(),
            &deps_for(&ports),
            &shutdown,
            DaemonOptions::default(),
        )
        .await?;

        assert_eq!(summary, DaemonSummary::default());
        assert!(ports.feed.calls().is_empty());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_lets_the_running_tick_finish() -> InfraResult<()> {
        let dir = temp_dir("drain")?;
        let config = config(&dir, true)?;
        let ports = InMemoryPorts::new().with_partitions(&["1", "2"]);
        let one = partition("1");
        let two = partition("2");
        ports.watermarks.seed(&one, 1);
        ports.watermarks.seed(&two, 1);
        ports.feed.append_all([10, 11, 12]);
        let shutdown = CancellationToken::new();
        let mut deps = deps_for(&ports);
        deps.notifier = Arc::new(ShutdownDuringNotify {
            inner: ports.notifier.clone(),
            shutdown: shutdown.clone(),
        });

        let summary = scheduler_loop(
            &config,
            &Observability::disabled(),
            &deps,
            &shutdown,
            DaemonOptions::default(),
        )
        .await?;

        assert!(shutdown.is_cancelled());
        assert_eq!(summary.ticks, 1);
        assert_eq!(summary.partitions_advanced, 2);
        assert_eq!(summary.partitions_pending, 0);
        assert_eq!(summary.partitions_failed, 0);
        assert_eq!(ports.watermarks.version_of(&one), Some(ChangeVersion::new(3)));
        assert_eq!(ports.watermarks.version_of(&two), Some(ChangeVersion::new(3)));
        assert_eq!(ports.notifier.delivered().len(), 2);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn unopenable_lock_skips_the_slot_and_keeps_running() -> InfraResult<()> {
        let dir = temp_dir("badlock")?;
        // A directory cannot be opened as the lock file.
        let config = config_with_lock(&dir, true, &dir)?;
        let ports = InMemoryPorts::new().with_partitions(&["1"]);
        ports.feed.append(5);
        let observability = Observability {
            logger: Some(ports.logger.clone()),
            telemetry: None,
        };

        let summary = scheduler_loop(
            &config,
            &observability,
            &deps_for(&ports),
            &CancellationToken::new(),
            DaemonOptions {
                max_ticks: Some(2),
                handle_ctrl_c: false,
            },
        )
        .await?;

        assert_eq!(summary.ticks, 0);
        assert_eq!(summary.skipped_locked, 2);
        assert!(ports.feed.calls().is_empty());
        assert_eq!(ports.logger.named("sync.tick.skipped").len(), 2);
        Ok(())
    }
}
