//! Shared HTTP plumbing: client construction, status mapping, JSON posting.

use inkweave_core::error::ServiceError;
use reqwest::StatusCode;
use std::time::Duration;
use tracing::{debug, warn};

/// Seconds to wait after a 429 that carries no usable `Retry-After`.
const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

/// A JSON-over-HTTP endpoint with optional bearer auth.
#[derive(Clone)]
pub(crate) struct JsonEndpoint {
    pub(crate) url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl std::fmt::Debug for JsonEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonEndpoint")
            .field("url", &self.url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl JsonEndpoint {
    pub(crate) fn new(url: impl Into<String>, api_key: Option<String>) -> Result<Self, ServiceError> {
        let url = url.into();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ServiceError::NotConfigured(format!("invalid service URL '{url}'")));
        }
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ServiceError::NotConfigured(format!("HTTP client: {e}")))?;
        Ok(Self {
            url,
            api_key,
            client,
        })
    }

    /// POST `body`, map non-success statuses, and return the parsed JSON.
    pub(crate) async fn post(
        &self,
        body: &serde_json::Value,
        timeout: Duration,
    ) -> Result<serde_json::Value, ServiceError> {
        let mut request = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .timeout(timeout)
            .json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        debug!(url = %self.url, timeout_ms = timeout.as_millis() as u64, "Sending service request");

        let response = request.send().await.map_err(classify)?;
        let status = response.status();

        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, retry_after, body));
        }

        response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| if e.is_timeout() {
                ServiceError::Timeout(e.to_string())
            } else {
                ServiceError::MalformedResponse(format!("body is not JSON: {e}"))
            })
    }
}

fn classify(err: reqwest::Error) -> ServiceError {
    if err.is_timeout() {
        ServiceError::Timeout(err.to_string())
    } else {
        ServiceError::Network(err.to_string())
    }
}

/// Map a non-success HTTP status to a service error.
pub(crate) fn status_error(status: StatusCode, retry_after: Option<u64>, body: String) -> ServiceError {
    match status.as_u16() {
        429 => ServiceError::RateLimited {
            retry_after_secs: retry_after.unwrap_or(DEFAULT_RETRY_AFTER_SECS),
        },
        401 | 403 => ServiceError::AuthenticationFailed(
            "Invalid API key or insufficient permissions".into(),
        ),
        408 | 504 => ServiceError::Timeout(format!("service answered {status}")),
        code => {
            warn!(status = code, body = %body, "Service returned error");
            ServiceError::ApiError {
                status_code: code,
                message: body,
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_statuses() {
        assert!(matches!(
            status_error(StatusCode::TOO_MANY_REQUESTS, Some(12), String::new()),
            ServiceError::RateLimited { retry_after_secs: 12 }
        ));
        assert!(matches!(
            status_error(StatusCode::TOO_MANY_REQUESTS, None, String::new()),
            ServiceError::RateLimited { retry_after_secs: 5 }
        ));
        assert!(matches!(
            status_error(StatusCode::FORBIDDEN, None, String::new()),
            ServiceError::AuthenticationFailed(_)
        ));
        assert!(matches!(
            status_error(StatusCode::GATEWAY_TIMEOUT, None, String::new()),
            ServiceError::Timeout(_)
        ));
        assert!(matches!(
            status_error(StatusCode::INTERNAL_SERVER_ERROR, None, "boom".into()),
            ServiceError::ApiError { status_code: 500, .. }
        ));
    }

    #[test]
    fn rejects_non_http_url() {
        assert!(matches!(
            JsonEndpoint::new("localhost:9000", None),
            Err(ServiceError::NotConfigured(_))
        ));
    }

    #[test]
    fn debug_redacts_key() {
        let endpoint = JsonEndpoint::new("http://localhost:9000", Some("sk-secret".into())).unwrap();
        assert!(!format!("{endpoint:?}").contains("sk-secret"));
    }
}
