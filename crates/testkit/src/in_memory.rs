//! In-memory adapter implementations for port contracts.
//!
//! Every adapter keeps a journal of the calls it received, so tests can
//! assert that a collaborator was never read or written. Failures are
//! injected per adapter and stay in place until cleared.

use catalog_sync_domain::{
    ChangeRecord, ChangeVersion, ChangedEntities, EntityId, PartitionId, SyncErrorCode,
    VersionWindow, Watermark,
};
use catalog_sync_ports::{
    BoxFuture, ChangeLogSourcePort, ChangeNotifierPort, LoadedWatermark, LogEvent, LogFields,
    LogLevel, LoggerPort, NotifyBatch, PartitionSourcePort, TelemetryPort, TelemetryTags,
    TelemetryTimer, WatermarkStorePort,
};
use catalog_sync_shared::{ErrorEnvelope, RequestContext, Result};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A no-op logger implementation.
#[derive(Debug, Default)]
pub struct NoopLogger;

impl LoggerPort for NoopLogger {
    fn log(&self, _event: LogEvent) {}

    fn child(&self, _fields: LogFields) -> Box<dyn LoggerPort> {
        Box::new(Self)
    }
}

/// A no-op telemetry timer.
#[derive(Debug, Default)]
pub struct NoopTimer;

impl TelemetryTimer for NoopTimer {
    fn stop(&self) {}
}

/// A no-op telemetry implementation.
#[derive(Debug, Default)]
pub struct NoopTelemetry;

impl TelemetryPort for NoopTelemetry {
    fn increment_counter(&self, _name: &str, _value: u64, _tags: Option<&TelemetryTags>) {}

    fn record_timer_ms(&self, _name: &str, _duration_ms: u64, _tags: Option<&TelemetryTags>) {}

    fn start_timer(&self, _name: &str, _tags: Option<&TelemetryTags>) -> Box<dyn TelemetryTimer> {
        Box::new(NoopTimer)
    }
}

/// One captured log event, with scope fields merged in.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedLog {
    /// Severity.
    pub level: LogLevel,
    /// Event name.
    pub event: Box<str>,
    /// Message text.
    pub message: Box<str>,
    /// Merged fields.
    pub fields: LogFields,
    /// Error payload, if any.
    pub error: Option<Value>,
}

impl RecordedLog {
    /// Field value as a string, for string fields.
    pub fn field_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }
}

/// Logger capturing every event; children share the same journal.
#[derive(Debug, Clone, Default)]
pub struct RecordingLogger {
    entries: Arc<Mutex<Vec<RecordedLog>>>,
    base_fields: LogFields,
}

impl RecordingLogger {
    /// Empty journal.
    pub fn new() -> Self {
        Self::default()
    }

    /// All events captured so far, in order.
    pub fn entries(&self) -> Vec<RecordedLog> {
        lock(&self.entries).clone()
    }

    /// Event names captured so far, in order.
    pub fn events(&self) -> Vec<String> {
        lock(&self.entries)
            .iter()
            .map(|entry| entry.event.to_string())
            .collect()
    }

    /// Captured events named `event`.
    pub fn named(&self, event: &str) -> Vec<RecordedLog> {
        lock(&self.entries)
            .iter()
            .filter(|entry| entry.event.as_ref() == event)
            .cloned()
            .collect()
    }
}

impl LoggerPort for RecordingLogger {
    fn log(&self, event: LogEvent) {
        let mut fields = self.base_fields.clone();
        fields.extend(event.fields.unwrap_or_default());
        lock(&self.entries).push(RecordedLog {
            level: event.level,
            event: event.event,
            message: event.message,
            fields,
            error: event.error,
        });
    }

    fn child(&self, fields: LogFields) -> Box<dyn LoggerPort> {
        let mut base_fields = self.base_fields.clone();
        base_fields.extend(fields);
        Box::new(Self {
            entries: Arc::clone(&self.entries),
            base_fields,
        })
    }
}

/// Telemetry that sums counters and collects timer samples.
#[derive(Debug, Clone, Default)]
pub struct RecordingTelemetry {
    counters: Arc<Mutex<BTreeMap<String, u64>>>,
    timers: Arc<Mutex<Vec<(String, TelemetryTags)>>>,
}

impl RecordingTelemetry {
    /// Empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sum of all increments of `name`.
    pub fn counter(&self, name: &str) -> u64 {
        lock(&self.counters).get(name).copied().unwrap_or_default()
    }

    /// Number of samples recorded for timer `name`.
    pub fn timer_samples(&self, name: &str) -> usize {
        lock(&self.timers)
            .iter()
            .filter(|(timer, _)| timer == name)
            .count()
    }

    /// Tags of every sample recorded for timer `name`.
    pub fn timer_tags(&self, name: &str) -> Vec<TelemetryTags> {
        lock(&self.timers)
            .iter()
            .filter(|(timer, _)| timer == name)
            .map(|(_, tags)| tags.clone())
            .collect()
    }
}

impl TelemetryPort for RecordingTelemetry {
    fn increment_counter(&self, name: &str, value: u64, _tags: Option<&TelemetryTags>) {
        let mut counters = lock(&self.counters);
        let entry = counters.entry(name.to_owned()).or_default();
        *entry = entry.saturating_add(value);
    }

    fn record_timer_ms(&self, name: &str, _duration_ms: u64, tags: Option<&TelemetryTags>) {
        lock(&self.timers).push((name.to_owned(), tags.cloned().unwrap_or_default()));
    }

    fn start_timer(&self, name: &str, tags: Option<&TelemetryTags>) -> Box<dyn TelemetryTimer> {
        Box::new(RecordingTimer {
            timers: Arc::clone(&self.timers),
            name: name.to_owned(),
            tags: tags.cloned().unwrap_or_default(),
            stopped: AtomicBool::new(false),
        })
    }
}

struct RecordingTimer {
    timers: Arc<Mutex<Vec<(String, TelemetryTags)>>>,
    name: String,
    tags: TelemetryTags,
    stopped: AtomicBool,
}

impl TelemetryTimer for RecordingTimer {
    fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            lock(&self.timers).push((self.name.clone(), self.tags.clone()));
        }
    }
}

/// Calls received by [`InMemoryChangeLog`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedCall {
    /// `is_available`.
    IsAvailable,
    /// `current_version`.
    CurrentVersion,
    /// `changed_entity_ids` for the window.
    ChangedEntityIds(VersionWindow),
}

#[derive(Debug, Default)]
struct FeedState {
    records: Vec<ChangeRecord>,
    head: ChangeVersion,
    unavailable: bool,
    query_failure: Option<ErrorEnvelope>,
    calls: Vec<FeedCall>,
}

/// Change feed held in memory.
///
/// Versions come from one counter shared by every partition, like the SQL
/// feeds populated by triggers.
#[derive(Debug, Default)]
pub struct InMemoryChangeLog {
    state: Mutex<FeedState>,
}

impl InMemoryChangeLog {
    /// Empty, available feed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a change for `entity` at the next version and return it.
    pub fn append(&self, entity: u64) -> ChangeVersion {
        let next = self.max_version().get().saturating_add(1);
        let version = ChangeVersion::new(next);
        lock(&self.state).records.push(ChangeRecord {
            entity_id: EntityId::new(entity),
            version,
        });
        version
    }

    /// Append one change per entity, in order; returns the last version.
    pub fn append_all(&self, entities: impl IntoIterator<Item = u64>) -> ChangeVersion {
        entities
            .into_iter()
            .map(|entity| self.append(entity))
            .last()
            .unwrap_or_else(|| self.max_version())
    }

    /// Record a change at an explicit version.
    pub fn insert(&self, version: u64, entity: u64) {
        lock(&self.state).records.push(ChangeRecord {
            entity_id: EntityId::new(entity),
            version: ChangeVersion::new(version),
        });
    }

    /// Move the head to `version` without recording a row, like versions
    /// consumed by rolled-back writes.
    pub fn bump_head(&self, version: u64) {
        let mut state = lock(&self.state);
        state.head = state.head.max(ChangeVersion::new(version));
    }

    /// Make the feed reachable or not.
    pub fn set_available(&self, available: bool) {
        lock(&self.state).unavailable = !available;
    }

    /// Fail every `changed_entity_ids` call with `error` until cleared.
    pub fn fail_queries(&self, error: Option<ErrorEnvelope>) {
        lock(&self.state).query_failure = error;
    }

    /// Calls received so far.
    pub fn calls(&self) -> Vec<FeedCall> {
        lock(&self.state).calls.clone()
    }

    /// Windows passed to `changed_entity_ids`, in order.
    pub fn queried_windows(&self) -> Vec<VersionWindow> {
        lock(&self.state)
            .calls
            .iter()
            .filter_map(|call| match call {
                FeedCall::ChangedEntityIds(window) => Some(*window),
                _ => None,
            })
            .collect()
    }

    /// Forget recorded calls.
    pub fn clear_calls(&self) {
        lock(&self.state).calls.clear();
    }

    /// Every entity changed inside `window`, read without journaling.
    pub fn entities_in(&self, window: VersionWindow) -> ChangedEntities {
        ChangedEntities::from_records(window, lock(&self.state).records.iter())
    }

    fn max_version(&self) -> ChangeVersion {
        let state = lock(&self.state);
        state
            .records
            .iter()
            .map(|record| record.version)
            .max()
            .unwrap_or(ChangeVersion::ZERO)
            .max(state.head)
    }
}

impl ChangeLogSourcePort for InMemoryChangeLog {
    fn is_available(&self, _ctx: &RequestContext) -> BoxFuture<'_, bool> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            state.calls.push(FeedCall::IsAvailable);
            !state.unavailable
        })
    }

    fn current_version(&self, _ctx: &RequestContext) -> BoxFuture<'_, ChangeVersion> {
        Box::pin(async move {
            let unavailable = {
                let mut state = lock(&self.state);
                state.calls.push(FeedCall::CurrentVersion);
                state.unavailable
            };
            if unavailable {
                ChangeVersion::ZERO
            } else {
                self.max_version()
            }
        })
    }

    fn changed_entity_ids(
        &self,
        ctx: &RequestContext,
        window: VersionWindow,
    ) -> BoxFuture<'_, Result<ChangedEntities>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("in_memory_changelog.changed_entity_ids")?;
            let state = {
                let mut state = lock(&self.state);
                state.calls.push(FeedCall::ChangedEntityIds(window));
                (state.unavailable, state.query_failure.clone())
            };
            if window.is_empty() {
                return Ok(ChangedEntities::new());
            }
            match state {
                (true, _) => Err(SyncErrorCode::FeedUnavailable.envelope("in-memory feed is offline")),
                (false, Some(error)) => Err(error),
                (false, None) => Ok(self.entities_in(window)),
            }
        })
    }
}

/// Calls received by [`InMemoryWatermarkStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    /// `get_or_init`.
    GetOrInit(PartitionId),
    /// `advance` to the version.
    Advance(PartitionId, ChangeVersion),
    /// `load`.
    Load(PartitionId),
    /// `list`.
    List,
}

impl StoreCall {
    /// Partition the call targeted, if any.
    pub fn partition(&self) -> Option<&PartitionId> {
        match self {
            Self::GetOrInit(partition) | Self::Advance(partition, _) | Self::Load(partition) => {
                Some(partition)
            },
            Self::List => None,
        }
    }
}

#[derive(Debug, Default)]
struct StoreState {
    records: BTreeMap<PartitionId, Watermark>,
    calls: Vec<StoreCall>,
    init_failure: Option<ErrorEnvelope>,
    advance_failure: Option<ErrorEnvelope>,
    clock_ms: u64,
}

impl StoreState {
    fn tick(&mut self) -> u64 {
        self.clock_ms = self.clock_ms.saturating_add(1);
        self.clock_ms
    }
}

/// Watermark store held in memory.
///
/// Sync timestamps come from a logical clock that moves by one per write.
#[derive(Debug, Default)]
pub struct InMemoryWatermarkStore {
    state: Mutex<StoreState>,
}

impl InMemoryWatermarkStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an existing watermark without journaling the write.
    pub fn seed(&self, partition: &PartitionId, version: u64) {
        let mut state = lock(&self.state);
        let now = state.tick();
        state.records.insert(
            partition.clone(),
            Watermark {
                partition_id: partition.clone(),
                last_version: ChangeVersion::new(version),
                last_sync_at_ms: now,
            },
        );
    }

    /// Current record for `partition`, read without journaling.
    pub fn watermark(&self, partition: &PartitionId) -> Option<Watermark> {
        lock(&self.state).records.get(partition).cloned()
    }

    /// Current version for `partition`, read without journaling.
    pub fn version_of(&self, partition: &PartitionId) -> Option<ChangeVersion> {
        self.watermark(partition).map(|watermark| watermark.last_version)
    }

    /// Fail `get_or_init` with `error` until cleared.
    pub fn fail_init(&self, error: Option<ErrorEnvelope>) {
        lock(&self.state).init_failure = error;
    }

    /// Fail `advance` with `error` until cleared.
    pub fn fail_advance(&self, error: Option<ErrorEnvelope>) {
        lock(&self.state).advance_failure = error;
    }

    /// Calls received so far.
    pub fn calls(&self) -> Vec<StoreCall> {
        lock(&self.state).calls.clone()
    }

    /// Calls that targeted `partition`.
    pub fn calls_for(&self, partition: &PartitionId) -> Vec<StoreCall> {
        lock(&self.state)
            .calls
            .iter()
            .filter(|call| call.partition() == Some(partition))
            .cloned()
            .collect()
    }

    /// Forget recorded calls.
    pub fn clear_calls(&self) {
        lock(&self.state).calls.clear();
    }
}

impl WatermarkStorePort for InMemoryWatermarkStore {
    fn get_or_init(
        &self,
        ctx: &RequestContext,
        partition: &PartitionId,
        init_version: ChangeVersion,
    ) -> BoxFuture<'_, Result<LoadedWatermark>> {
        let ctx = ctx.clone();
        let partition = partition.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("in_memory_watermarks.get_or_init")?;
            let mut state = lock(&self.state);
            state.calls.push(StoreCall::GetOrInit(partition.clone()));
            if let Some(error) = state.init_failure.clone() {
                return Err(error);
            }
            if let Some(existing) = state.records.get(&partition) {
                return Ok(LoadedWatermark {
                    watermark: existing.clone(),
                    created: false,
                });
            }
            let now = state.tick();
            let watermark = Watermark {
                partition_id: partition.clone(),
                last_version: init_version,
                last_sync_at_ms: now,
            };
            state.records.insert(partition, watermark.clone());
            Ok(LoadedWatermark {
                watermark,
                created: true,
            })
        })
    }

    fn advance(
        &self,
        ctx: &RequestContext,
        watermark: &Watermark,
        new_version: ChangeVersion,
    ) -> BoxFuture<'_, Result<Watermark>> {
        let ctx = ctx.clone();
        let observed = watermark.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("in_memory_watermarks.advance")?;
            let mut state = lock(&self.state);
            state
                .calls
                .push(StoreCall::Advance(observed.partition_id.clone(), new_version));
            if let Some(error) = state.advance_failure.clone() {
                return Err(error);
            }
            if new_version < observed.last_version {
                return Err(SyncErrorCode::WatermarkRegression
                    .envelope("watermark cannot move backwards")
                    .with_metadata("partition", observed.partition_id.as_str())
                    .with_metadata("lastVersion", observed.last_version.to_string())
                    .with_metadata("newVersion", new_version.to_string()));
            }
            let stored = state
                .records
                .get(&observed.partition_id)
                .map(|current| current.last_version);
            if stored != Some(observed.last_version) {
                return Err(SyncErrorCode::WatermarkConflict
                    .envelope("watermark moved since it was loaded")
                    .with_metadata("partition", observed.partition_id.as_str()));
            }
            let now = state.tick();
            let advanced = observed.advanced_to(new_version, now);
            state
                .records
                .insert(observed.partition_id.clone(), advanced.clone());
            Ok(advanced)
        })
    }

    fn load(
        &self,
        ctx: &RequestContext,
        partition: &PartitionId,
    ) -> BoxFuture<'_, Result<Option<Watermark>>> {
        let ctx = ctx.clone();
        let partition = partition.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("in_memory_watermarks.load")?;
            let mut state = lock(&self.state);
            state.calls.push(StoreCall::Load(partition.clone()));
            Ok(state.records.get(&partition).cloned())
        })
    }

    fn list(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<Vec<Watermark>>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("in_memory_watermarks.list")?;
            let mut state = lock(&self.state);
            state.calls.push(StoreCall::List);
            Ok(state.records.values().cloned().collect())
        })
    }
}

#[derive(Debug)]
struct NotifierState {
    disabled: BTreeSet<PartitionId>,
    script: VecDeque<bool>,
    fallback: bool,
    delivered: Vec<NotifyBatch>,
    attempts: Vec<NotifyBatch>,
}

/// Notifier answering from a script of results.
///
/// Queued results are consumed one per non-empty batch; once the queue is
/// empty every batch gets the fallback answer.
#[derive(Debug)]
pub struct ScriptedNotifier {
    state: Mutex<NotifierState>,
}

impl Default for ScriptedNotifier {
    fn default() -> Self {
        Self::accepting()
    }
}

impl ScriptedNotifier {
    /// Notifier accepting every batch, enabled for every partition.
    pub fn accepting() -> Self {
        Self::with_fallback(true)
    }

    /// Notifier rejecting every batch, enabled for every partition.
    pub fn rejecting() -> Self {
        Self::with_fallback(false)
    }

    fn with_fallback(fallback: bool) -> Self {
        Self {
            state: Mutex::new(NotifierState {
                disabled: BTreeSet::new(),
                script: VecDeque::new(),
                fallback,
                delivered: Vec::new(),
                attempts: Vec::new(),
            }),
        }
    }

    /// Turn sync off for `partition`.
    pub fn disable(&self, partition: &PartitionId) {
        lock(&self.state).disabled.insert(partition.clone());
    }

    /// Turn sync back on for `partition`.
    pub fn enable(&self, partition: &PartitionId) {
        lock(&self.state).disabled.remove(partition);
    }

    /// Queue answers for the next batches.
    pub fn push_results(&self, results: impl IntoIterator<Item = bool>) {
        lock(&self.state).script.extend(results);
    }

    /// Answer used once the script runs out.
    pub fn set_fallback(&self, accept: bool) {
        lock(&self.state).fallback = accept;
    }

    /// Every non-empty batch received, accepted or not.
    pub fn attempts(&self) -> Vec<NotifyBatch> {
        lock(&self.state).attempts.clone()
    }

    /// Batches that were answered `true`.
    pub fn delivered(&self) -> Vec<NotifyBatch> {
        lock(&self.state).delivered.clone()
    }

    /// Attempts for `partition`.
    pub fn attempts_for(&self, partition: &PartitionId) -> Vec<NotifyBatch> {
        lock(&self.state)
            .attempts
            .iter()
            .filter(|batch| &batch.partition == partition)
            .cloned()
            .collect()
    }
}

impl ChangeNotifierPort for ScriptedNotifier {
    fn is_enabled_for(&self, partition: &PartitionId) -> bool {
        !lock(&self.state).disabled.contains(partition)
    }

    fn notify(&self, _ctx: &RequestContext, batch: NotifyBatch) -> BoxFuture<'_, bool> {
        Box::pin(async move {
            if batch.entity_ids.is_empty() {
                return true;
            }
            let mut state = lock(&self.state);
            let accepted = state.script.pop_front().unwrap_or(state.fallback);
            state.attempts.push(batch.clone());
            if accepted {
                state.delivered.push(batch);
            }
            accepted
        })
    }
}

/// Fixed list of partitions.
#[derive(Debug, Default)]
pub struct StaticPartitions {
    partitions: Mutex<Vec<PartitionId>>,
    failure: Mutex<Option<ErrorEnvelope>>,
}

impl StaticPartitions {
    /// Partitions listed in `partitions`, in order.
    pub fn new(partitions: Vec<PartitionId>) -> Self {
        Self {
            partitions: Mutex::new(partitions),
            failure: Mutex::new(None),
        }
    }

    /// Parse every id; panics on invalid ids.
    pub fn of(ids: &[&str]) -> Self {
        Self::new(ids.iter().map(|id| partition(id)).collect())
    }

    /// Replace the listed partitions.
    pub fn set(&self, partitions: Vec<PartitionId>) {
        *lock(&self.partitions) = partitions;
    }

    /// Fail enumeration with `error` until cleared.
    pub fn fail_with(&self, error: Option<ErrorEnvelope>) {
        *lock(&self.failure) = error;
    }
}

impl PartitionSourcePort for StaticPartitions {
    fn list_partitions(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<Vec<PartitionId>>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("static_partitions.list")?;
            if let Some(error) = lock(&self.failure).clone() {
                return Err(error);
            }
            Ok(lock(&self.partitions).clone())
        })
    }
}

/// Every in-memory collaborator of the sync use case, shared through `Arc`s.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPorts {
    /// Change feed.
    pub feed: Arc<InMemoryChangeLog>,
    /// Watermark store.
    pub watermarks: Arc<InMemoryWatermarkStore>,
    /// Notifier.
    pub notifier: Arc<ScriptedNotifier>,
    /// Partition source.
    pub partitions: Arc<StaticPartitions>,
    /// Logger.
    pub logger: Arc<RecordingLogger>,
    /// Telemetry.
    pub telemetry: Arc<RecordingTelemetry>,
}

impl InMemoryPorts {
    /// Empty feed, empty store, accepting notifier, no partitions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Same collaborators with `ids` as the partition list.
    pub fn with_partitions(self, ids: &[&str]) -> Self {
        self.partitions.set(ids.iter().map(|id| partition(id)).collect());
        self
    }
}

/// Parse a partition id; panics on invalid input.
pub fn partition(id: &str) -> PartitionId {
    PartitionId::parse(id).expect("valid partition id")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn feed_windows_are_half_open_and_distinct() -> Result<()> {
        let feed = InMemoryChangeLog::new();
        feed.append_all([7, 9, 7, 3]);
        let ctx = RequestContext::new_request();

        assert_eq!(feed.current_version(&ctx).await, ChangeVersion::new(4));
        let window = VersionWindow::new(ChangeVersion::new(1), ChangeVersion::new(3));
        let ids = feed.changed_entity_ids(&ctx, window).await?;
        assert_eq!(ids.to_raw_ids(), vec![7, 9]);
        assert_eq!(feed.queried_windows(), vec![window]);
        Ok(())
    }

    #[tokio::test]
    async fn offline_feed_reports_zero_and_fails_queries() {
        let feed = InMemoryChangeLog::new();
        feed.append(1);
        feed.set_available(false);
        let ctx = RequestContext::new_request();

        assert!(!feed.is_available(&ctx).await);
        assert_eq!(feed.current_version(&ctx).await, ChangeVersion::ZERO);
        let window = VersionWindow::new(ChangeVersion::ZERO, ChangeVersion::new(1));
        let result = feed.changed_entity_ids(&ctx, window).await;
        assert!(result.is_err_and(|error| SyncErrorCode::FeedUnavailable.matches(&error)));
    }

    #[tokio::test]
    async fn store_rejects_regression_and_stale_writes() -> Result<()> {
        let store = InMemoryWatermarkStore::new();
        let ctx = RequestContext::new_request();
        let id = partition("1");

        let loaded = store.get_or_init(&ctx, &id, ChangeVersion::new(10)).await?;
        assert!(loaded.created);
        let regression = store
            .advance(&ctx, &loaded.watermark, ChangeVersion::new(9))
            .await;
        assert!(regression.is_err_and(|error| SyncErrorCode::WatermarkRegression.matches(&error)));

        store
            .advance(&ctx, &loaded.watermark, ChangeVersion::new(12))
            .await?;
        let stale = store
            .advance(&ctx, &loaded.watermark, ChangeVersion::new(13))
            .await;
        assert!(stale.is_err_and(|error| SyncErrorCode::WatermarkConflict.matches(&error)));
        assert_eq!(store.version_of(&id), Some(ChangeVersion::new(12)));
        Ok(())
    }

    #[tokio::test]
    async fn scripted_notifier_consumes_results_then_falls_back() -> Result<()> {
        let notifier = ScriptedNotifier::accepting();
        notifier.push_results([false]);
        let ctx = RequestContext::new_request();
        let batch = NotifyBatch {
            partition: partition("1"),
            entity_ids: [EntityId::new(1)].into_iter().collect(),
            up_to_version: ChangeVersion::new(2),
        };

        assert!(!notifier.notify(&ctx, batch.clone()).await);
        assert!(notifier.notify(&ctx, batch).await);
        assert_eq!(notifier.attempts().len(), 2);
        assert_eq!(notifier.delivered().len(), 1);
        Ok(())
    }

    #[test]
    fn recording_logger_children_share_the_journal() {
        let logger = RecordingLogger::new();
        let mut scope = LogFields::new();
        scope.insert("partition".into(), Value::from("4"));
        logger.child(scope).warn("sync.partition.failed", "boom", None);

        let failed = logger.named("sync.partition.failed");
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].field_str("partition"), Some("4"));
    }
}
