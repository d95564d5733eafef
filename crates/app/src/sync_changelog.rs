//! Changelog-driven sync tick.
//!
//! A tick reads the feed version once and walks the partitions in order.
//! A partition's watermark only moves after the notifier confirmed the
//! batch, or when the window held no entity at all. Every other path leaves
//! the watermark where it was, so the same window is retried next tick.

use catalog_sync_domain::{
    AbortReason, ChangeVersion, FailureStage, PartitionId, PartitionOutcome, PartitionReport,
    SyncTickReport, TickOutcome, Watermark,
};
use catalog_sync_ports::{
    ChangeLogSourcePort, ChangeNotifierPort, LogEvent, LogFields, LogLevel, LoggerPort,
    NotifyBatch, PartitionSourcePort, TelemetryPort, WatermarkStorePort, telemetry_tags,
};
use catalog_sync_shared::{ErrorEnvelope, ErrorKind, RequestContext};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

/// Dependencies required by the sync tick.
#[derive(Clone)]
pub struct SyncChangelogDeps {
    /// Change feed.
    pub changelog: Arc<dyn ChangeLogSourcePort>,
    /// Watermark store.
    pub watermarks: Arc<dyn WatermarkStorePort>,
    /// Change notifier (also decides which partitions are enabled).
    pub notifier: Arc<dyn ChangeNotifierPort>,
    /// Partitions to visit.
    pub partitions: Arc<dyn PartitionSourcePort>,
    /// Optional logger.
    pub logger: Option<Arc<dyn LoggerPort>>,
    /// Optional telemetry sink.
    pub telemetry: Option<Arc<dyn TelemetryPort>>,
}

/// Runs sync ticks against one set of collaborators.
///
/// The orchestrator does not serialize ticks itself; the caller (the
/// scheduler in `infra`) guarantees at most one tick at a time.
#[derive(Clone)]
pub struct SyncOrchestrator {
    deps: SyncChangelogDeps,
}

impl SyncOrchestrator {
    /// Wrap the collaborators.
    #[must_use]
    pub const fn new(deps: SyncChangelogDeps) -> Self {
        Self { deps }
    }

    /// Collaborators used by every tick.
    #[must_use]
    pub const fn deps(&self) -> &SyncChangelogDeps {
        &self.deps
    }

    /// Run one tick.
    pub async fn run(&self, ctx: &RequestContext) -> SyncTickReport {
        sync_changelog(ctx, &self.deps).await
    }
}

/// Run one sync tick.
///
/// Never fails: aborts and per-partition failures are logged and described
/// in the returned report.
#[tracing::instrument(name = "sync_changelog", skip_all, fields(correlation_id = %ctx.correlation_id()))]
pub async fn sync_changelog(ctx: &RequestContext, deps: &SyncChangelogDeps) -> SyncTickReport {
    let started_at = Instant::now();
    let logger = deps
        .logger
        .as_ref()
        .map(|logger| logger.child(log_fields_scope(ctx)));

    if let Some(logger) = logger.as_deref() {
        logger.info("sync.tick.started", "Sync tick started", None);
    }

    let report = run_tick(ctx, deps, logger.as_deref()).await;
    let duration_ms = duration_ms(started_at);

    if let Some(telemetry) = deps.telemetry.as_ref() {
        let outcome = match &report.outcome {
            TickOutcome::Aborted { .. } => "aborted",
            TickOutcome::Completed { .. } => "completed",
        };
        telemetry.record_timer_ms(
            "sync.tick.duration_ms",
            duration_ms,
            Some(&telemetry_tags([("outcome", outcome)])),
        );
    }

    if let Some(logger) = logger.as_deref() {
        match &report.outcome {
            TickOutcome::Aborted { reason } => logger.log(abort_event(reason, duration_ms)),
            TickOutcome::Completed { current_version } => logger.info(
                "sync.tick.completed",
                "Sync tick completed",
                Some(log_fields_completed(&report, *current_version, duration_ms)),
            ),
        }
    }

    report
}

async fn run_tick(
    ctx: &RequestContext,
    deps: &SyncChangelogDeps,
    logger: Option<&dyn LoggerPort>,
) -> SyncTickReport {
    let tick_id = ctx.correlation_id().as_str();

    if !deps.changelog.is_available(ctx).await {
        return SyncTickReport::aborted(tick_id, AbortReason::FeedUnavailable);
    }
    // One global counter: the same version bounds every partition's window.
    let current = deps.changelog.current_version(ctx).await;
    if current.is_zero() {
        return SyncTickReport::aborted(tick_id, AbortReason::EmptyFeed);
    }
    let partitions = match deps.partitions.list_partitions(ctx).await {
        Ok(partitions) => partitions,
        Err(error) => {
            return SyncTickReport::aborted(tick_id, AbortReason::PartitionsUnavailable { error });
        },
    };

    let mut reports = Vec::with_capacity(partitions.len());
    for partition in partitions {
        let outcome = PartitionPass::new(ctx, deps, &partition, current)
            .run()
            .await;
        record_partition(deps, logger, &partition, &outcome);
        reports.push(PartitionReport {
            partition_id: partition,
            outcome,
        });
    }

    SyncTickReport {
        correlation_id: tick_id.into(),
        outcome: TickOutcome::Completed {
            current_version: current,
        },
        partitions: reports,
    }
}

/// One partition's read-modify-write for the tick.
struct PartitionPass<'a> {
    ctx: &'a RequestContext,
    deps: &'a SyncChangelogDeps,
    partition: &'a PartitionId,
    current: ChangeVersion,
}

impl<'a> PartitionPass<'a> {
    const fn new(
        ctx: &'a RequestContext,
        deps: &'a SyncChangelogDeps,
        partition: &'a PartitionId,
        current: ChangeVersion,
    ) -> Self {
        Self {
            ctx,
            deps,
            partition,
            current,
        }
    }

    async fn run(self) -> PartitionOutcome {
        if !self.deps.notifier.is_enabled_for(self.partition) {
            return PartitionOutcome::Disabled;
        }

        let loaded = match self
            .deps
            .watermarks
            .get_or_init(self.ctx, self.partition, self.current)
            .await
        {
            Ok(loaded) => loaded,
            Err(error) => return failed(FailureStage::WatermarkInit, error),
        };
        let watermark = loaded.watermark;
        if loaded.created {
            return PartitionOutcome::Initialized {
                version: watermark.last_version,
            };
        }
        if watermark.is_caught_up(self.current) {
            return PartitionOutcome::UpToDate {
                version: watermark.last_version,
            };
        }

        let window = watermark.pending_window(self.current);
        let changed = match self
            .deps
            .changelog
            .changed_entity_ids(self.ctx, window)
            .await
        {
            Ok(changed) => changed,
            Err(error) => return failed(FailureStage::FeedQuery, error),
        };
        if changed.is_empty() {
            return self.advance(&watermark, 0).await;
        }

        let entities = changed.len();
        let batch = NotifyBatch {
            partition: self.partition.clone(),
            entity_ids: changed,
            up_to_version: self.current,
        };
        if self.deps.notifier.notify(self.ctx, batch).await {
            self.advance(&watermark, entities).await
        } else {
            PartitionOutcome::NotifyPending {
                held_at: watermark.last_version,
                target: self.current,
                entities,
            }
        }
    }

    async fn advance(&self, watermark: &Watermark, notified: usize) -> PartitionOutcome {
        match self
            .deps
            .watermarks
            .advance(self.ctx, watermark, self.current)
            .await
        {
            Ok(advanced) => PartitionOutcome::Advanced {
                from: watermark.last_version,
                to: advanced.last_version,
                notified,
            },
            Err(error) => failed(FailureStage::WatermarkAdvance, error),
        }
    }
}

const fn failed(stage: FailureStage, error: ErrorEnvelope) -> PartitionOutcome {
    PartitionOutcome::Failed { stage, error }
}

fn record_partition(
    deps: &SyncChangelogDeps,
    logger: Option<&dyn LoggerPort>,
    partition: &PartitionId,
    outcome: &PartitionOutcome,
) {
    if let Some(telemetry) = deps.telemetry.as_ref() {
        record_partition_metrics(telemetry.as_ref(), partition, outcome);
    }
    if let Some(logger) = logger {
        logger.log(partition_event(partition, outcome));
    }
}

fn record_partition_metrics(
    telemetry: &dyn TelemetryPort,
    partition: &PartitionId,
    outcome: &PartitionOutcome,
) {
    let mut tags = telemetry_tags([("partition", partition.as_str())]);
    match outcome {
        PartitionOutcome::Advanced { notified, .. } => {
            telemetry.increment_counter("sync.partition.advanced", 1, Some(&tags));
            if *notified > 0 {
                telemetry.increment_counter(
                    "sync.entities.notified",
                    count_u64(*notified),
                    Some(&tags),
                );
            }
        },
        PartitionOutcome::NotifyPending { .. } => {
            telemetry.increment_counter("sync.partition.notify_pending", 1, Some(&tags));
        },
        PartitionOutcome::Failed { stage, .. } => {
            tags.insert("stage".into(), stage.as_str().into());
            telemetry.increment_counter("sync.partition.failed", 1, Some(&tags));
        },
        PartitionOutcome::Disabled
        | PartitionOutcome::Initialized { .. }
        | PartitionOutcome::UpToDate { .. } => {},
    }
}

fn partition_event(partition: &PartitionId, outcome: &PartitionOutcome) -> LogEvent {
    let mut fields = LogFields::new();
    fields.insert("partition".into(), Value::from(partition.as_str()));

    let (level, message) = match outcome {
        PartitionOutcome::Disabled => (LogLevel::Debug, "Partition sync disabled; skipped"),
        PartitionOutcome::Initialized { version } => {
            fields.insert("version".into(), Value::from(version.get()));
            (
                LogLevel::Info,
                "Watermark initialized at the current feed version; history skipped",
            )
        },
        PartitionOutcome::UpToDate { version } => {
            fields.insert("version".into(), Value::from(version.get()));
            (LogLevel::Debug, "No changes since the last sync")
        },
        PartitionOutcome::Advanced { from, to, notified } => {
            fields.insert("fromVersion".into(), Value::from(from.get()));
            fields.insert("toVersion".into(), Value::from(to.get()));
            fields.insert("entities".into(), Value::from(*notified));
            (LogLevel::Info, "Watermark advanced")
        },
        PartitionOutcome::NotifyPending {
            held_at,
            target,
            entities,
        } => {
            fields.insert("heldAt".into(), Value::from(held_at.get()));
            fields.insert("targetVersion".into(), Value::from(target.get()));
            fields.insert("entities".into(), Value::from(*entities));
            (
                LogLevel::Warn,
                "Notification not confirmed; watermark held for retry on the next tick",
            )
        },
        PartitionOutcome::Failed { stage, error } => {
            fields.insert("stage".into(), Value::from(stage.as_str()));
            fields.insert("code".into(), Value::from(error.code.to_string()));
            let level = if error.kind == ErrorKind::Expected {
                LogLevel::Warn
            } else {
                LogLevel::Error
            };
            (level, "Partition sync failed; watermark left unchanged")
        },
    };

    let name = format!("sync.partition.{}", outcome.label());
    let mut event = LogEvent::new(level, &name, message, Some(fields));
    if let PartitionOutcome::Failed { error, .. } = outcome {
        event.error = serde_json::to_value(error).ok();
    }
    event
}

fn abort_event(reason: &AbortReason, duration_ms: u64) -> LogEvent {
    let mut fields = LogFields::new();
    fields.insert("reason".into(), Value::from(reason.as_str()));
    fields.insert("durationMs".into(), Value::from(duration_ms));

    let (level, message) = match reason {
        AbortReason::FeedUnavailable => {
            (LogLevel::Warn, "Change feed unavailable; tick aborted")
        },
        AbortReason::EmptyFeed => (LogLevel::Info, "Change feed has no history yet; tick aborted"),
        AbortReason::PartitionsUnavailable { .. } => {
            (LogLevel::Error, "Partitions could not be listed; tick aborted")
        },
    };
    let mut event = LogEvent::new(level, "sync.tick.aborted", message, Some(fields));
    if let AbortReason::PartitionsUnavailable { error } = reason {
        event.error = serde_json::to_value(error).ok();
    }
    event
}

fn log_fields_scope(ctx: &RequestContext) -> LogFields {
    let mut fields = LogFields::new();
    fields.insert(
        "correlationId".into(),
        Value::from(ctx.correlation_id().as_str()),
    );
    fields
}

fn log_fields_completed(
    report: &SyncTickReport,
    current: ChangeVersion,
    duration_ms: u64,
) -> LogFields {
    let mut fields = LogFields::new();
    fields.insert("currentVersion".into(), Value::from(current.get()));
    fields.insert("durationMs".into(), Value::from(duration_ms));
    fields.insert("partitions".into(), Value::from(report.partitions.len()));
    for label in ["advanced", "notify_pending", "failed"] {
        fields.insert(label.into(), Value::from(report.count(label)));
    }
    fields
}

fn duration_ms(started_at: Instant) -> u64 {
    u64::try_from(started_at.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn count_u64(count: usize) -> u64 {
    u64::try_from(count).unwrap_or(u64::MAX)
}
