//! JSON telemetry adapter (counters and timers).

use crate::log_sink::LogSink;
use catalog_sync_ports::{TelemetryPort, TelemetryTags, TelemetryTimer};
use catalog_sync_shared::{REDACTED, is_secret_key};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Emits one JSON metric line per counter increment or timer sample.
#[derive(Clone)]
pub struct JsonTelemetry {
    sink: Arc<dyn LogSink>,
    base_tags: TelemetryTags,
}

impl JsonTelemetry {
    /// Create a telemetry adapter writing to `sink`.
    #[must_use]
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self {
            sink,
            base_tags: TelemetryTags::new(),
        }
    }

    /// Tags added to every metric.
    #[must_use]
    pub fn with_base_tags(mut self, tags: TelemetryTags) -> Self {
        self.base_tags = tags;
        self
    }

    fn emit(&self, kind: MetricKind, name: &str, value: u64, tags: &TelemetryTags) {
        write_metric(self.sink.as_ref(), kind, name, value, tags);
    }
}

impl TelemetryPort for JsonTelemetry {
    fn increment_counter(&self, name: &str, value: u64, tags: Option<&TelemetryTags>) {
        let tags = merge_tags(&self.base_tags, tags);
        self.emit(MetricKind::Counter, name, value, &tags);
    }

    fn record_timer_ms(&self, name: &str, duration_ms: u64, tags: Option<&TelemetryTags>) {
        let tags = merge_tags(&self.base_tags, tags);
        self.emit(MetricKind::Timer, name, duration_ms, &tags);
    }

    fn start_timer(&self, name: &str, tags: Option<&TelemetryTags>) -> Box<dyn TelemetryTimer> {
        Box::new(JsonTimer {
            sink: Arc::clone(&self.sink),
            name: name.into(),
            tags: merge_tags(&self.base_tags, tags),
            started_at: Instant::now(),
            stopped: AtomicBool::new(false),
        })
    }
}

/// Adds fixed tags (e.g. the tick correlation id) in front of another adapter.
#[derive(Clone)]
pub struct TaggedTelemetry {
    inner: Arc<dyn TelemetryPort>,
    tags: TelemetryTags,
}

impl TaggedTelemetry {
    /// Wrap `inner`, adding `tags` to every metric.
    #[must_use]
    pub fn new(inner: Arc<dyn TelemetryPort>, tags: TelemetryTags) -> Self {
        Self { inner, tags }
    }
}

impl TelemetryPort for TaggedTelemetry {
    fn increment_counter(&self, name: &str, value: u64, tags: Option<&TelemetryTags>) {
        self.inner
            .increment_counter(name, value, Some(&merge_tags(&self.tags, tags)));
    }

    fn record_timer_ms(&self, name: &str, duration_ms: u64, tags: Option<&TelemetryTags>) {
        self.inner
            .record_timer_ms(name, duration_ms, Some(&merge_tags(&self.tags, tags)));
    }

    fn start_timer(&self, name: &str, tags: Option<&TelemetryTags>) -> Box<dyn TelemetryTimer> {
        self.inner
            .start_timer(name, Some(&merge_tags(&self.tags, tags)))
    }
}

struct JsonTimer {
    sink: Arc<dyn LogSink>,
    name: Box<str>,
    tags: TelemetryTags,
    started_at: Instant,
    stopped: AtomicBool,
}

impl TelemetryTimer for JsonTimer {
    fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        let elapsed_ms = u64::try_from(self.started_at.elapsed().as_millis()).unwrap_or(u64::MAX);
        write_metric(
            self.sink.as_ref(),
            MetricKind::Timer,
            &self.name,
            elapsed_ms,
            &self.tags,
        );
    }
}

#[derive(Clone, Copy, Serialize)]
#[serde(rename_all = "lowercase")]
enum MetricKind {
    Counter,
    Timer,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MetricLine<'a> {
    #[serde(rename = "type")]
    line_type: &'static str,
    timestamp_ms: u64,
    metric_type: MetricKind,
    name: &'a str,
    value: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    unit: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tags: Option<&'a TelemetryTags>,
}

fn write_metric(sink: &dyn LogSink, kind: MetricKind, name: &str, value: u64, tags: &TelemetryTags) {
    let line = MetricLine {
        line_type: "metric",
        timestamp_ms: now_epoch_ms(),
        metric_type: kind,
        name,
        value,
        unit: matches!(kind, MetricKind::Timer).then_some("ms"),
        tags: (!tags.is_empty()).then_some(tags),
    };
    if let Ok(mut encoded) = serde_json::to_string(&line) {
        encoded.push('\n');
        sink.write_line(&encoded);
    }
}

fn merge_tags(base: &TelemetryTags, extra: Option<&TelemetryTags>) -> TelemetryTags {
    let mut merged = base.clone();
    if let Some(extra) = extra {
        merged.extend(extra.iter().map(|(key, value)| (key.clone(), value.clone())));
    }
    for (key, value) in &mut merged {
        if is_secret_key(key) {
            *value = REDACTED.into();
        }
    }
    merged
}

fn now_epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()
        .and_then(|elapsed| u64::try_from(elapsed.as_millis()).ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log_sink::MemoryLogSink;
    use catalog_sync_ports::telemetry_tags;
    use serde_json::{Value, json};
    use std::sync::{Mutex, PoisonError};

    fn parse_lines(sink: &MemoryLogSink) -> Result<Vec<Value>, serde_json::Error> {
        sink.take()
            .iter()
            .map(|line| serde_json::from_str(line.trim()))
            .collect()
    }

    #[test]
    fn counters_and_timers_are_emitted() -> Result<(), Box<dyn std::error::Error>> {
        let sink = Arc::new(MemoryLogSink::default());
        let telemetry = JsonTelemetry::new(sink.clone());

        telemetry.increment_counter("sync.partition.advanced", 2, None);
        let timer = telemetry.start_timer("sync.tick.duration_ms", None);
        timer.stop();
        timer.stop();

        let lines = parse_lines(&sink)?;
        assert_eq!(lines.len(), 2);
        let counter = lines.first().ok_or("missing counter")?;
        assert_eq!(counter["metricType"], json!("counter"));
        assert_eq!(counter["value"], json!(2));
        assert!(counter.get("unit").is_none());
        let timer = lines.get(1).ok_or("missing timer")?;
        assert_eq!(timer["metricType"], json!("timer"));
        assert_eq!(timer["unit"], json!("ms"));
        Ok(())
    }

    #[test]
    fn secret_tags_are_redacted() -> Result<(), Box<dyn std::error::Error>> {
        let sink = Arc::new(MemoryLogSink::default());
        let telemetry = JsonTelemetry::new(sink.clone())
            .with_base_tags(telemetry_tags([("apiToken", "abc"), ("service", "csync")]));

        telemetry.record_timer_ms("sync.tick.duration_ms", 12, None);

        let lines = parse_lines(&sink)?;
        let line = lines.first().ok_or("missing line")?;
        assert_eq!(line["tags"]["apiToken"], json!(REDACTED));
        assert_eq!(line["tags"]["service"], json!("csync"));
        Ok(())
    }

    #[derive(Default)]
    struct CaptureTelemetry {
        tags: Mutex<Vec<TelemetryTags>>,
    }

    struct NoopTimer;

    impl TelemetryTimer for NoopTimer {
        fn stop(&self) {}
    }

    impl TelemetryPort for CaptureTelemetry {
        fn increment_counter(&self, _name: &str, _value: u64, tags: Option<&TelemetryTags>) {
            self.tags
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(tags.cloned().unwrap_or_default());
        }

        fn record_timer_ms(&self, name: &str, duration_ms: u64, tags: Option<&TelemetryTags>) {
            self.increment_counter(name, duration_ms, tags);
        }

        fn start_timer(&self, _name: &str, _tags: Option<&TelemetryTags>) -> Box<dyn TelemetryTimer> {
            Box::new(NoopTimer)
        }
    }

    #[test]
    fn tagged_telemetry_adds_scope_tags() {
        let inner = Arc::new(CaptureTelemetry::default());
        let tagged = TaggedTelemetry::new(inner.clone(), telemetry_tags([("correlationId", "tick_3")]));

        tagged.increment_counter(
            "sync.partition.failed",
            1,
            Some(&telemetry_tags([("partition", "4")])),
        );

        let captured = inner.tags.lock().unwrap_or_else(PoisonError::into_inner).clone();
        let tags = captured.first().cloned().unwrap_or_default();
        assert_eq!(tags.get("correlationId").map(AsRef::as_ref), Some("tick_3"));
        assert_eq!(tags.get("partition").map(AsRef::as_ref), Some("4"));
    }
}
