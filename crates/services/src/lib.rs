//! HTTP clients for the external services Inkweave depends on.
//!
//! Both clients parse replies into the typed responses from
//! `inkweave_core::service` and reject anything malformed at the boundary.

mod http;

pub mod generation;
pub mod research;

pub use generation::HttpGenerationService;
pub use research::HttpResearchService;

use inkweave_config::ServicesConfig;
use inkweave_core::error::ServiceError;
use std::sync::Arc;

/// Build the generation client from configuration.
pub fn generation_from_config(
    config: &ServicesConfig,
) -> Result<Arc<HttpGenerationService>, ServiceError> {
    let url = config
        .generation_url
        .as_deref()
        .ok_or_else(|| ServiceError::NotConfigured("services.generation_url is not set".into()))?;
    Ok(Arc::new(HttpGenerationService::new(url, config.api_key.clone())?))
}

/// Build the research client, if one is configured.
pub fn research_from_config(
    config: &ServicesConfig,
) -> Result<Option<Arc<HttpResearchService>>, ServiceError> {
    config
        .research_url
        .as_deref()
        .map(|url| HttpResearchService::new(url, config.api_key.clone()).map(Arc::new))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_requires_url() {
        let config = ServicesConfig::default();
        assert!(matches!(
            generation_from_config(&config),
            Err(ServiceError::NotConfigured(_))
        ));
        assert!(research_from_config(&config).unwrap().is_none());
    }

    #[test]
    fn builds_clients_from_config() {
        let config = ServicesConfig {
            generation_url: Some("http://localhost:9000/generate".into()),
            research_url: Some("http://localhost:9001/research".into()),
            api_key: None,
        };
        let generation = generation_from_config(&config).unwrap();
        assert_eq!(generation.url(), "http://localhost:9000/generate");
        assert!(research_from_config(&config).unwrap().is_some());
    }
}
