//! Logger and telemetry selection.

use crate::InfraResult;
use catalog_sync_adapters::log_sink::{LogSink, StderrLogSink};
use catalog_sync_adapters::logger::JsonLogger;
use catalog_sync_adapters::telemetry::{JsonTelemetry, TaggedTelemetry};
use catalog_sync_adapters::tracing_logger::TracingLogger;
use catalog_sync_config::{LogFormat, ValidatedSyncConfig};
use catalog_sync_ports::{LogFields, LogLevel, LoggerPort, TelemetryPort, TelemetryTags};
use catalog_sync_shared::{ErrorCode, ErrorEnvelope, RequestContext};
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

const SERVICE_NAME: &str = "catalog-sync";

/// Logger and telemetry handed to the use cases.
#[derive(Clone, Default)]
pub struct Observability {
    /// Structured logger, if any.
    pub logger: Option<Arc<dyn LoggerPort>>,
    /// Metrics sink, if any.
    pub telemetry: Option<Arc<dyn TelemetryPort>>,
}

impl Observability {
    /// No logging and no metrics.
    #[must_use]
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Adapters selected by the `logging` section, writing to stderr.
    pub fn from_config(config: &ValidatedSyncConfig) -> InfraResult<Self> {
        Self::with_sink(config, Arc::new(StderrLogSink))
    }

    /// Adapters selected by the `logging` section, writing to `sink`.
    ///
    /// With the `tracing` format, events go to the installed subscriber and
    /// only metrics use `sink`.
    pub fn with_sink(config: &ValidatedSyncConfig, sink: Arc<dyn LogSink>) -> InfraResult<Self> {
        let level = LogLevel::parse(&config.logging.level).ok_or_else(|| {
            ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                format!("unsupported log level: {}", config.logging.level),
            )
        })?;
        let instance_id = Uuid::new_v4().to_string();

        let mut fields = LogFields::new();
        fields.insert("service".into(), Value::from(SERVICE_NAME));
        fields.insert("instanceId".into(), Value::from(instance_id.as_str()));

        let logger: Arc<dyn LoggerPort> = match config.logging.format {
            LogFormat::Json => Arc::new(
                JsonLogger::new(Arc::clone(&sink))
                    .with_min_level(level)
                    .with_base_fields(fields),
            ),
            LogFormat::Tracing => Arc::from(TracingLogger::new().child(fields)),
        };

        let mut tags = TelemetryTags::new();
        tags.insert("service".into(), SERVICE_NAME.into());
        let telemetry: Arc<dyn TelemetryPort> =
            Arc::new(JsonTelemetry::new(sink).with_base_tags(tags));

        Ok(Self {
            logger: Some(logger),
            telemetry: Some(telemetry),
        })
    }

    /// Same adapters, with metrics tagged by the tick's correlation id.
    ///
    /// The orchestrator scopes the logger itself.
    #[must_use]
    pub fn for_tick(&self, ctx: &RequestContext) -> Self {
        let telemetry = self.telemetry.as_ref().map(|telemetry| {
            let mut tags = TelemetryTags::new();
            tags.insert(
                "correlationId".into(),
                ctx.correlation_id().as_str().into(),
            );
            let tagged: Arc<dyn TelemetryPort> =
                Arc::new(TaggedTelemetry::new(Arc::clone(telemetry), tags));
            tagged
        });
        Self {
            logger: self.logger.clone(),
            telemetry,
        }
    }
}
