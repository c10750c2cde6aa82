//! Integration tests for observability
//!
//! These tests register `Metrics` on a real router and check that request
//! outcomes and breaker transitions show up in the exported metrics.

use std::sync::Arc;
use switchyard_core::normalized::{CompletionRequest, CompletionResponse, Message, Usage};
use switchyard_core::provider::{ProviderCapabilities, ProviderKind, ProviderProfile};
use switchyard_core::{Provider, ProviderError, StaticRegistry, TenantId};
use switchyard_observability::Metrics;
use switchyard_routing::{FailoverConfig, FailoverRouter, RoutingContext};

struct FixedProvider {
    id: String,
    should_fail: bool,
}

impl FixedProvider {
    fn new(id: &str, should_fail: bool) -> Self {
        Self {
            id: id.to_string(),
            should_fail,
        }
    }
}

#[async_trait::async_trait]
impl Provider for FixedProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn execute(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError> {
        if self.should_fail {
            return Err(ProviderError::Authentication("invalid api key".to_string()));
        }
        Ok(CompletionResponse {
            id: format!("{}-response", self.id),
            model: request.model,
            content: "ok".to_string(),
            finish_reason: Some("stop".to_string()),
            usage: Usage {
                prompt_tokens: 5,
                completion_tokens: 5,
                total_tokens: 10,
            },
            metadata: Default::default(),
        })
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities::default()
    }

    fn profile(&self) -> ProviderProfile {
        ProviderProfile::new(ProviderKind::OpenAI)
    }
}

fn request(id: &str) -> CompletionRequest {
    CompletionRequest::new("gpt-4", vec![Message::user("hello")]).with_request_id(id)
}

#[tokio::test(start_paused = true)]
async fn test_metrics_observe_router_outcomes() {
    let broken: Arc<dyn Provider> = Arc::new(FixedProvider::new("broken", true));
    let healthy: Arc<dyn Provider> = Arc::new(FixedProvider::new("healthy", false));
    let registry = Arc::new(StaticRegistry::new(vec![broken, healthy]));

    let mut config = FailoverConfig::default();
    config.circuit_breaker.failure_threshold = 1;

    let metrics = Arc::new(Metrics::new().unwrap());
    let router = FailoverRouter::builder(registry)
        .config(config)
        .observer(metrics.clone())
        .seed(42)
        .build()
        .unwrap();

    let context = RoutingContext::new(TenantId::default()).with_quality_threshold(0.0);
    let response = router.execute(request("req-1"), context).await.unwrap();
    assert_eq!(response.id, "healthy-response");

    let tenant = TenantId::default();
    assert_eq!(
        metrics
            .requests_success
            .with_label_values(&[tenant.as_str(), "healthy"])
            .get(),
        1.0
    );
    assert_eq!(
        metrics
            .failover_triggered
            .with_label_values(&["broken", "healthy", "authentication"])
            .get(),
        1.0
    );
    assert_eq!(
        metrics
            .circuit_breaker_transitions
            .with_label_values(&["broken", tenant.as_str(), "closed", "open"])
            .get(),
        1.0
    );
    assert_eq!(
        metrics
            .circuit_breaker_state
            .with_label_values(&["broken", tenant.as_str()])
            .get(),
        1.0
    );

    let text = metrics.encode_text().unwrap();
    assert!(text.contains("switchyard_failover_triggered_total"));
    assert!(text.contains("switchyard_breaker_engaged_total"));
}

#[tokio::test(start_paused = true)]
async fn test_metrics_count_failed_requests() {
    let broken: Arc<dyn Provider> = Arc::new(FixedProvider::new("broken", true));
    let registry = Arc::new(StaticRegistry::new(vec![broken]));

    let metrics = Arc::new(Metrics::new().unwrap());
    let router = FailoverRouter::builder(registry)
        .observer(metrics.clone())
        .seed(7)
        .build()
        .unwrap();

    let context = RoutingContext::new(TenantId::default()).with_quality_threshold(0.0);
    assert!(router.execute(request("req-2"), context).await.is_err());

    let tenant = TenantId::default();
    assert_eq!(
        metrics
            .requests_total
            .with_label_values(&[tenant.as_str(), "default"])
            .get(),
        1.0
    );
    assert_eq!(
        metrics
            .provider_failures
            .with_label_values(&["broken", "authentication"])
            .get(),
        1.0
    );
    assert_eq!(
        metrics
            .requests_failure
            .with_label_values(&[tenant.as_str(), "broken", "authentication"])
            .get(),
        1.0
    );
    assert_eq!(metrics.attempts_per_request.get_sample_sum(), 1.0);
}
