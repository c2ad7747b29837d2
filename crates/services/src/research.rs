//! HTTP client for the research / fact-lookup service.

use crate::http::JsonEndpoint;
use async_trait::async_trait;
use inkweave_core::error::ServiceError;
use inkweave_core::service::{ResearchRequest, ResearchResponse, ResearchService};
use std::time::Duration;

const RESEARCH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct HttpResearchService {
    endpoint: JsonEndpoint,
    timeout: Duration,
}

impl HttpResearchService {
    pub fn new(url: impl Into<String>, api_key: Option<String>) -> Result<Self, ServiceError> {
        Ok(Self {
            endpoint: JsonEndpoint::new(url, api_key)?,
            timeout: RESEARCH_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl ResearchService for HttpResearchService {
    fn name(&self) -> &str {
        "http_research"
    }

    async fn research(&self, request: ResearchRequest) -> Result<ResearchResponse, ServiceError> {
        let body = serde_json::to_value(&request)
            .map_err(|e| ServiceError::MalformedResponse(format!("request not serializable: {e}")))?;
        let raw = self.endpoint.post(&body, self.timeout).await?;
        ResearchResponse::from_json(raw)
    }
}
