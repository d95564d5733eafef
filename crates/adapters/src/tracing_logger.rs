//! Logger adapter forwarding to `tracing`.
//!
//! Used when `logging.format = "tracing"`; the subscriber (fmt, json,
//! env-filter) is installed by the binary.

use catalog_sync_ports::{LogEvent, LogFields, LogLevel, LoggerPort};
use catalog_sync_shared::{REDACTED, is_secret_key};
use serde_json::Value;

/// Emits every event as a `tracing` event with target `catalog_sync`.
#[derive(Debug, Clone, Default)]
pub struct TracingLogger {
    base_fields: LogFields,
}

impl TracingLogger {
    /// Logger without base fields.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoggerPort for TracingLogger {
    fn log(&self, event: LogEvent) {
        let mut fields = self.base_fields.clone();
        fields.extend(event.fields.unwrap_or_default());
        let fields = render_fields(&fields);
        let error = event.error.map(|value| value.to_string()).unwrap_or_default();
        let name = event.event.as_ref();
        let message = event.message.as_ref();

        match event.level {
            LogLevel::Debug => {
                tracing::debug!(target: "catalog_sync", event = name, fields = %fields, error = %error, "{message}");
            },
            LogLevel::Info => {
                tracing::info!(target: "catalog_sync", event = name, fields = %fields, error = %error, "{message}");
            },
            LogLevel::Warn => {
                tracing::warn!(target: "catalog_sync", event = name, fields = %fields, error = %error, "{message}");
            },
            LogLevel::Error => {
                tracing::error!(target: "catalog_sync", event = name, fields = %fields, error = %error, "{message}");
            },
        }
    }

    fn child(&self, fields: LogFields) -> Box<dyn LoggerPort> {
        let mut base_fields = self.base_fields.clone();
        base_fields.extend(fields);
        Box::new(Self { base_fields })
    }
}

/// Flatten fields to `key=value` pairs with secrets masked.
fn render_fields(fields: &LogFields) -> String {
    fields
        .iter()
        .map(|(key, value)| {
            if is_secret_key(key) {
                format!("{key}={REDACTED}")
            } else {
                match value {
                    Value::String(text) => format!("{key}={text}"),
                    other => format!("{key}={other}"),
                }
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fields_render_sorted_and_masked() {
        let mut fields = LogFields::new();
        fields.insert("partition".into(), json!("3"));
        fields.insert("entities".into(), json!(12));
        fields.insert("token".into(), json!("abc"));
        assert_eq!(
            render_fields(&fields),
            format!("entities=12 partition=3 token={REDACTED}")
        );
    }

    #[test]
    fn child_accumulates_fields_without_a_subscriber() {
        let mut scope = LogFields::new();
        scope.insert("correlationId".into(), json!("tick_1"));
        let child = TracingLogger::new().child(scope);
        child.info("sync.tick.started", "tick started", None);
        child.warn("sync.partition.notify_pending", "held", None);
    }
}
