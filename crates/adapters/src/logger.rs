//! Structured JSON logger adapter.

use crate::log_sink::LogSink;
use catalog_sync_ports::{LogEvent, LogFields, LogLevel, LoggerPort};
use catalog_sync_shared::{REDACTED, is_secret_key};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

const SERIALIZE_FAILED_LINE: &str = "{\"timestampMs\":0,\"level\":\"error\",\"event\":\"logger.serialize_failed\",\"message\":\"log serialization failed\"}\n";

/// JSON logger emitting one object per line.
///
/// Fields whose name looks like a secret (`token`, `password`, ...) are
/// replaced by `[REDACTED]`, also inside nested objects and the error payload.
#[derive(Clone)]
pub struct JsonLogger {
    sink: Arc<dyn LogSink>,
    base_fields: LogFields,
    min_level: LogLevel,
}

impl JsonLogger {
    /// Create a logger writing to `sink` at `info` and above.
    #[must_use]
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self {
            sink,
            base_fields: LogFields::new(),
            min_level: LogLevel::Info,
        }
    }

    /// Drop events below `level`.
    #[must_use]
    pub const fn with_min_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    /// Fields added to every event.
    #[must_use]
    pub fn with_base_fields(mut self, fields: LogFields) -> Self {
        self.base_fields = fields;
        self
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LogLine<'a> {
    timestamp_ms: u64,
    level: &'static str,
    event: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "LogFields::is_empty")]
    fields: LogFields,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<Value>,
}

impl LoggerPort for JsonLogger {
    fn log(&self, event: LogEvent) {
        if event.level < self.min_level {
            return;
        }

        let mut fields = self.base_fields.clone();
        fields.extend(event.fields.unwrap_or_default());
        for (key, value) in &mut fields {
            redact_entry(key, value);
        }
        let error = event.error.map(|mut value| {
            redact_value(&mut value);
            value
        });

        let line = LogLine {
            timestamp_ms: now_epoch_ms(),
            level: event.level.as_str(),
            event: &event.event,
            message: &event.message,
            fields,
            error,
        };
        match serde_json::to_string(&line) {
            Ok(mut encoded) => {
                encoded.push('\n');
                self.sink.write_line(&encoded);
            },
            Err(_) => self.sink.write_line(SERIALIZE_FAILED_LINE),
        }
    }

    fn child(&self, fields: LogFields) -> Box<dyn LoggerPort> {
        let mut merged = self.base_fields.clone();
        merged.extend(fields);
        Box::new(Self {
            sink: Arc::clone(&self.sink),
            base_fields: merged,
            min_level: self.min_level,
        })
    }
}

fn redact_entry(key: &str, value: &mut Value) {
    if is_secret_key(key) {
        *value = Value::String(REDACTED.to_owned());
    } else {
        redact_value(value);
    }
}

fn redact_value(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, nested) in map.iter_mut() {
                redact_entry(key, nested);
            }
        },
        Value::Array(items) => items.iter_mut().for_each(redact_value),
        _ => {},
    }
}

fn now_epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()
        .and_then(|elapsed| u64::try_from(elapsed.as_millis()).ok())
        .unwrap_or_default()
}
