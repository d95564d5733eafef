//! HTTP webhook change notifier.

use catalog_sync_config::ValidatedSyncConfig;
use catalog_sync_domain::{PartitionId, SyncErrorCode};
use catalog_sync_ports::{BoxFuture, ChangeNotifierPort, LogFields, LoggerPort, NotifyBatch};
use catalog_sync_shared::{
    ErrorClass, ErrorCode, ErrorEnvelope, RequestContext, Result, RetryPolicy, SecretString,
    retry_async,
};
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Header carrying the partition id of a batch.
pub const PARTITION_HEADER: &str = "X-Catalog-Partition";
/// Header carrying the feed version a batch covers up to.
pub const VERSION_HEADER: &str = "X-Catalog-Version";

/// Where, and whether, a partition's changes are delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifierRoute {
    /// Sync is turned on for the partition.
    pub enabled: bool,
    /// Fully resolved endpoint; `None` when nothing is configured.
    pub endpoint: Option<Box<str>>,
}

/// Settings for [`HttpChangeNotifier`].
#[derive(Debug, Clone)]
pub struct HttpNotifierConfig {
    /// Routes keyed by partition. Unknown partitions are disabled.
    pub routes: BTreeMap<PartitionId, NotifierRoute>,
    /// Bearer token sent with every request.
    pub token: Option<SecretString>,
    /// Per-request timeout.
    pub timeout_ms: u64,
    /// Retry policy for transient failures.
    pub retry: RetryPolicy,
}

impl HttpNotifierConfig {
    /// Resolve routes for every configured partition.
    #[must_use]
    pub fn from_sync_config(config: &ValidatedSyncConfig) -> Self {
        let routes = config
            .partitions
            .iter()
            .map(|partition| {
                let route = NotifierRoute {
                    enabled: partition.enabled,
                    endpoint: config
                        .notifier
                        .endpoint_for(Some(partition))
                        .map(String::into_boxed_str),
                };
                (partition.id.clone(), route)
            })
            .collect();
        Self {
            routes,
            token: config.notifier.token.clone(),
            timeout_ms: config.limits().notifier_timeout_ms.get(),
            retry: config.limits().retry_policy(&config.core.retry),
        }
    }
}

#[derive(Serialize)]
struct NotifyPayload {
    product_ids: Vec<u64>,
}

/// Posts `{"product_ids":[...]}` to the partition's endpoint.
pub struct HttpChangeNotifier {
    client: reqwest::Client,
    routes: BTreeMap<PartitionId, NotifierRoute>,
    token: Option<SecretString>,
    retry: RetryPolicy,
    logger: Option<Arc<dyn LoggerPort>>,
}

impl HttpChangeNotifier {
    /// Build the notifier and its HTTP client.
    pub fn new(config: &HttpNotifierConfig) -> Result<Self> {
        if config.timeout_ms == 0 {
            return Err(ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                "notifier timeout must be greater than zero",
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|error| {
                ErrorEnvelope::unexpected(
                    ErrorCode::new("notifier", "client_init_failed"),
                    format!("failed to build notifier client: {error}"),
                    ErrorClass::NonRetriable,
                )
            })?;
        Ok(Self {
            client,
            routes: config.routes.clone(),
            token: config.token.clone(),
            retry: config.retry,
            logger: None,
        })
    }

    /// Report final delivery failures through `logger`.
    #[must_use]
    pub fn with_logger(mut self, logger: Arc<dyn LoggerPort>) -> Self {
        self.logger = Some(logger);
        self
    }

    fn endpoint_for(&self, partition: &PartitionId) -> Option<&str> {
        self.routes
            .get(partition)
            .and_then(|route| route.endpoint.as_deref())
    }

    async fn deliver(&self, ctx: &RequestContext, endpoint: &str, batch: &NotifyBatch) -> Result<()> {
        let payload = NotifyPayload {
            product_ids: batch.entity_ids.to_raw_ids(),
        };
        retry_async(ctx, self.retry, "notifier.notify", || {
            self.post_once(ctx, endpoint, batch, &payload)
        })
        .await
    }

    async fn post_once(
        &self,
        ctx: &RequestContext,
        endpoint: &str,
        batch: &NotifyBatch,
        payload: &NotifyPayload,
    ) -> Result<()> {
        let mut request = self
            .client
            .post(endpoint)
            .header(PARTITION_HEADER, batch.partition.as_str())
            .header(VERSION_HEADER, batch.up_to_version.to_string())
            .json(payload);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token.expose());
        }

        let response = tokio::select! {
            () = ctx.cancelled() => {
                return Err(ErrorEnvelope::cancelled("operation cancelled")
                    .with_metadata("operation", "notifier.notify"));
            },
            result = request.send() => result.map_err(|error| map_reqwest_error(&error))?,
        };

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        Err(map_http_status(status))
    }

    fn report_failure(&self, batch: &NotifyBatch, error: &ErrorEnvelope) {
        let Some(logger) = &self.logger else {
            return;
        };
        let mut fields = LogFields::new();
        fields.insert("partition".into(), Value::from(batch.partition.as_str()));
        fields.insert("upToVersion".into(), Value::from(batch.up_to_version.get()));
        fields.insert("entities".into(), Value::from(batch.entity_ids.len()));
        fields.insert("code".into(), Value::from(error.code.to_string()));
        if let Some(attempts) = error.metadata.get("attempts") {
            fields.insert("attempts".into(), Value::from(attempts.as_str()));
        }
        logger.warn("notifier.delivery_failed", &error.message, Some(fields));
    }
}

impl ChangeNotifierPort for HttpChangeNotifier {
    fn is_enabled_for(&self, partition: &PartitionId) -> bool {
        self.routes.get(partition).is_some_and(|route| route.enabled)
    }

    fn notify(&self, ctx: &RequestContext, batch: NotifyBatch) -> BoxFuture<'_, bool> {
        let ctx = ctx.clone();
        Box::pin(async move {
            if batch.entity_ids.is_empty() {
                return true;
            }
            let Some(endpoint) = self.endpoint_for(&batch.partition) else {
                let error = SyncErrorCode::NotifyFailed
                    .envelope(format!("no endpoint configured for partition {}", batch.partition));
                self.report_failure(&batch, &error);
                return false;
            };
            match self.deliver(&ctx, endpoint, &batch).await {
                Ok(()) => true,
                Err(error) => {
                    self.report_failure(&batch, &error);
                    false
                },
            }
        })
    }
}

fn map_reqwest_error(error: &reqwest::Error) -> ErrorEnvelope {
    if error.is_timeout() {
        return ErrorEnvelope::unexpected(
            ErrorCode::timeout(),
            "notifier request timed out",
            ErrorClass::Retriable,
        );
    }
    if error.is_connect() {
        return ErrorEnvelope::unexpected(
            ErrorCode::io(),
            format!("notifier connection failed: {error}"),
            ErrorClass::Retriable,
        );
    }
    SyncErrorCode::NotifyFailed.envelope(format!("notifier request failed: {error}"))
}

fn map_http_status(status: StatusCode) -> ErrorEnvelope {
    let message = format!("notifier endpoint answered {status}");
    let envelope = if status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
    {
        SyncErrorCode::NotifyFailed
            .envelope(message)
            .with_class(ErrorClass::Retriable)
    } else {
        SyncErrorCode::NotifyFailed.envelope(message)
    };
    envelope.with_metadata("status", status.as_u16().to_string())
}
