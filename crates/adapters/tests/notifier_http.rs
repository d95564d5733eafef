// HTTP notifier integration tests (feature-gated).
#![allow(missing_docs)]

#[cfg(feature = "http-notifier")]
mod webhook {
    use catalog_sync_adapters::log_sink::MemoryLogSink;
    use catalog_sync_adapters::logger::JsonLogger;
    use catalog_sync_adapters::notifier::{HttpChangeNotifier, HttpNotifierConfig, NotifierRoute};
    use catalog_sync_domain::{ChangeVersion, EntityId, PartitionId};
    use catalog_sync_ports::{ChangeNotifierPort, NotifyBatch};
    use catalog_sync_shared::{RequestContext, Result, RetryPolicy, SecretString};
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_retry(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay_ms: 1,
            max_delay_ms: 5,
            jitter_ratio_pct: 0,
        }
    }

    fn notifier_for(
        endpoint: String,
        token: Option<&str>,
        retry: RetryPolicy,
    ) -> Result<HttpChangeNotifier> {
        let mut routes = BTreeMap::new();
        routes.insert(
            PartitionId::parse("1")?,
            NotifierRoute {
                enabled: true,
                endpoint: Some(endpoint.into_boxed_str()),
            },
        );
        HttpChangeNotifier::new(&HttpNotifierConfig {
            routes,
            token: token.map(SecretString::from),
            timeout_ms: 2_000,
            retry,
        })
    }

    fn batch(ids: &[u64], version: u64) -> Result<NotifyBatch> {
        Ok(NotifyBatch {
            partition: PartitionId::parse("1")?,
            entity_ids: ids.iter().copied().map(EntityId::new).collect(),
            up_to_version: ChangeVersion::new(version),
        })
    }

    #[tokio::test]
    async fn posts_sorted_ids_with_headers() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/catalog/changes"))
            .and(header("authorization", "Bearer example"))
            .and(header("x-catalog-partition", "1"))
            .and(header("x-catalog-version", "42"))
            .and(body_json(json!({ "product_ids": [3, 7, 12] })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = notifier_for(
            format!("{}/catalog/changes", server.uri()),
            Some("example"),
            fast_retry(1),
        )?;
        let delivered = notifier
            .notify(&RequestContext::new_request(), batch(&[12, 3, 7, 3], 42)?)
            .await;
        assert!(delivered);
        Ok(())
    }

    #[tokio::test]
    async fn server_errors_are_retried_then_accepted() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = notifier_for(server.uri(), None, fast_retry(3))?;
        let delivered = notifier
            .notify(&RequestContext::new_request(), batch(&[1], 5)?)
            .await;
        assert!(delivered);
        Ok(())
    }

    #[tokio::test]
    async fn rejected_batch_is_not_retried_and_logged() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400))
            .expect(1)
            .mount(&server)
            .await;

        let sink = Arc::new(MemoryLogSink::default());
        let logger = Arc::new(JsonLogger::new(sink.clone()));
        let notifier = notifier_for(server.uri(), None, fast_retry(3))?.with_logger(logger);
        let delivered = notifier
            .notify(&RequestContext::new_request(), batch(&[9], 6)?)
            .await;

        assert!(!delivered);
        let lines = sink.take();
        assert_eq!(lines.len(), 1);
        assert!(
            lines
                .iter()
                .all(|line| line.contains("notifier.delivery_failed") && line.contains("\"attempts\":\"1\""))
        );
        Ok(())
    }

    #[tokio::test]
    async fn exhausted_retries_yield_false() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .expect(2)
            .mount(&server)
            .await;

        let notifier = notifier_for(server.uri(), None, fast_retry(2))?;
        let delivered = notifier
            .notify(&RequestContext::new_request(), batch(&[1, 2], 8)?)
            .await;
        assert!(!delivered);
        Ok(())
    }

    #[tokio::test]
    async fn unreachable_endpoint_yields_false() -> Result<()> {
        let notifier = notifier_for("http://127.0.0.1:9/changes".to_string(), None, fast_retry(1))?;
        let delivered = notifier
            .notify(&RequestContext::new_request(), batch(&[1], 1)?)
            .await;
        assert!(!delivered);
        Ok(())
    }
}
