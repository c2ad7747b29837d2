//! HTTP client for the generation service.

use crate::http::JsonEndpoint;
use async_trait::async_trait;
use inkweave_core::error::ServiceError;
use inkweave_core::service::{
    DEFAULT_GENERATION_TIMEOUT_MS, GenerationRequest, GenerationResponse, GenerationService,
};
use std::time::Duration;
use tracing::debug;

/// Posts `{task, context, maxAgents?, timeout?}` and validates the
/// `{content, agentsUsed, confidence, metadata}` reply.
#[derive(Debug, Clone)]
pub struct HttpGenerationService {
    endpoint: JsonEndpoint,
    default_timeout: Duration,
}

impl HttpGenerationService {
    pub fn new(url: impl Into<String>, api_key: Option<String>) -> Result<Self, ServiceError> {
        Ok(Self {
            endpoint: JsonEndpoint::new(url, api_key)?,
            default_timeout: Duration::from_millis(DEFAULT_GENERATION_TIMEOUT_MS),
        })
    }

    /// Timeout used when a request carries none.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.endpoint.url
    }
}

#[async_trait]
impl GenerationService for HttpGenerationService {
    fn name(&self) -> &str {
        "http_generation"
    }

    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, ServiceError> {
        let timeout = request
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(self.default_timeout);
        let body = serde_json::to_value(&request)
            .map_err(|e| ServiceError::MalformedResponse(format!("request not serializable: {e}")))?;

        let raw = self.endpoint.post(&body, timeout).await?;
        let response = GenerationResponse::from_json(raw)?;
        debug!(
            words = response.content.split_whitespace().count(),
            agents = response.agents_used.len(),
            confidence = response.confidence,
            "Generation response received"
        );
        Ok(response)
    }
}
