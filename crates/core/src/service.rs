//! External service traits: the generation model, research lookup, and
//! post-processing.
//!
//! Responses cross the boundary as raw JSON and are parsed into the typed
//! results below; anything malformed is rejected with
//! [`ServiceError::MalformedResponse`] rather than trusted.

use crate::error::ServiceError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Default timeout for a generation call.
pub const DEFAULT_GENERATION_TIMEOUT_MS: u64 = 60_000;

/// A request to the generation service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    /// Natural-language task description.
    pub task: String,
    /// Structured context: assembled context, blueprint, directives.
    pub context: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_agents: Option<u32>,
    #[serde(default, rename = "timeout", skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

/// A validated generation response.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResponse {
    pub content: String,
    pub agents_used: Vec<String>,
    /// 0.0–1.0.
    pub confidence: f64,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawGenerationResponse {
    content: Option<serde_json::Value>,
    #[serde(default)]
    agents_used: Option<serde_json::Value>,
    #[serde(default)]
    confidence: Option<serde_json::Value>,
    #[serde(default)]
    metadata: Option<serde_json::Value>,
}

impl GenerationResponse {
    /// A plain text response with full confidence.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            agents_used: Vec::new(),
            confidence: 1.0,
            metadata: serde_json::Map::new(),
        }
    }

    /// Parse and validate a raw response body.
    pub fn from_json(value: serde_json::Value) -> Result<Self, ServiceError> {
        let raw: RawGenerationResponse = serde_json::from_value(value)
            .map_err(|e| ServiceError::MalformedResponse(format!("generation response: {e}")))?;

        let content = match raw.content {
            Some(serde_json::Value::String(s)) if !s.trim().is_empty() => s,
            Some(serde_json::Value::String(_)) => {
                return Err(ServiceError::MalformedResponse("content is empty".into()));
            }
            Some(other) => {
                return Err(ServiceError::MalformedResponse(format!(
                    "content must be a string, got {}",
                    json_kind(&other)
                )));
            }
            None => return Err(ServiceError::MalformedResponse("missing content".into())),
        };

        let agents_used = match raw.agents_used {
            None | Some(serde_json::Value::Null) => Vec::new(),
            Some(v) => string_array(v, "agentsUsed")?,
        };

        let confidence = match raw.confidence {
            None | Some(serde_json::Value::Null) => 1.0,
            Some(serde_json::Value::Number(n)) => {
                let c = n.as_f64().unwrap_or(f64::NAN);
                if !(0.0..=1.0).contains(&c) {
                    return Err(ServiceError::MalformedResponse(format!(
                        "confidence {c} outside 0..=1"
                    )));
                }
                c
            }
            Some(other) => {
                return Err(ServiceError::MalformedResponse(format!(
                    "confidence must be a number, got {}",
                    json_kind(&other)
                )));
            }
        };

        let metadata = match raw.metadata {
            None | Some(serde_json::Value::Null) => serde_json::Map::new(),
            Some(serde_json::Value::Object(map)) => map,
            Some(other) => {
                return Err(ServiceError::MalformedResponse(format!(
                    "metadata must be an object, got {}",
                    json_kind(&other)
                )));
            }
        };

        Ok(Self {
            content,
            agents_used,
            confidence,
            metadata,
        })
    }
}

/// How deep a research lookup should go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResearchDepth {
    Overview,
    #[default]
    Standard,
    Expert,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchRequest {
    pub topic: String,
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub depth: ResearchDepth,
    #[serde(default)]
    pub focus_areas: Vec<String>,
}

/// A validated research response.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchResponse {
    pub job_id: String,
    pub key_facts: Vec<String>,
    pub references: Vec<String>,
    pub insights: Vec<String>,
    pub tips: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawResearchResponse {
    job_id: Option<serde_json::Value>,
    #[serde(default)]
    key_facts: Option<serde_json::Value>,
    #[serde(default)]
    references: Option<serde_json::Value>,
    #[serde(default)]
    insights: Option<serde_json::Value>,
    #[serde(default)]
    tips: Option<serde_json::Value>,
}

impl ResearchResponse {
    /// Parse and validate a raw response body.
    pub fn from_json(value: serde_json::Value) -> Result<Self, ServiceError> {
        let raw: RawResearchResponse = serde_json::from_value(value)
            .map_err(|e| ServiceError::MalformedResponse(format!("research response: {e}")))?;

        let job_id = match raw.job_id {
            Some(serde_json::Value::String(s)) if !s.is_empty() => s,
            Some(serde_json::Value::Number(n)) => n.to_string(),
            _ => return Err(ServiceError::MalformedResponse("missing jobId".into())),
        };

        let list = |v: Option<serde_json::Value>, field: &str| match v {
            None | Some(serde_json::Value::Null) => Ok(Vec::new()),
            Some(v) => string_array(v, field),
        };

        Ok(Self {
            job_id,
            key_facts: list(raw.key_facts, "keyFacts")?,
            references: list(raw.references, "references")?,
            insights: list(raw.insights, "insights")?,
            tips: list(raw.tips, "tips")?,
        })
    }
}

fn string_array(value: serde_json::Value, field: &str) -> Result<Vec<String>, ServiceError> {
    let serde_json::Value::Array(items) = value else {
        return Err(ServiceError::MalformedResponse(format!(
            "{field} must be an array, got {}",
            json_kind(&value)
        )));
    };
    items
        .into_iter()
        .map(|item| match item {
            serde_json::Value::String(s) => Ok(s),
            other => Err(ServiceError::MalformedResponse(format!(
                "{field} entries must be strings, got {}",
                json_kind(&other)
            ))),
        })
        .collect()
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// The generative text model, invoked as an opaque request/response service.
#[async_trait]
pub trait GenerationService: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, ServiceError>;
}

/// The research / fact-lookup service.
#[async_trait]
pub trait ResearchService: Send + Sync {
    fn name(&self) -> &str;

    async fn research(&self, request: ResearchRequest) -> Result<ResearchResponse, ServiceError>;
}

/// Cleans raw generated text before evaluation.
#[async_trait]
pub trait PostProcessor: Send + Sync {
    fn name(&self) -> &str;

    async fn process(&self, text: String) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn generation_response_parses_full_payload() {
        let resp = GenerationResponse::from_json(json!({
            "content": "The tide came in.",
            "agentsUsed": ["writer", "editor"],
            "confidence": 0.82,
            "metadata": {"model": "m1"}
        }))
        .unwrap();
        assert_eq!(resp.content, "The tide came in.");
        assert_eq!(resp.agents_used.len(), 2);
        assert!((resp.confidence - 0.82).abs() < f64::EPSILON);
        assert_eq!(resp.metadata["model"], "m1");
    }

    #[test]
    fn generation_response_defaults_optional_fields() {
        let resp = GenerationResponse::from_json(json!({"content": "Text."})).unwrap();
        assert!(resp.agents_used.is_empty());
        assert_eq!(resp.confidence, 1.0);
    }

    #[test]
    fn generation_response_rejects_malformed() {
        let cases = [
            json!({}),
            json!({"content": ""}),
            json!({"content": 42}),
            json!({"content": "x", "confidence": 3.5}),
            json!({"content": "x", "agentsUsed": "writer"}),
            json!({"content": "x", "agentsUsed": [1, 2]}),
            json!({"content": "x", "metadata": []}),
            json!("just a string"),
        ];
        for case in cases {
            let err = GenerationResponse::from_json(case.clone()).unwrap_err();
            assert!(
                matches!(err, ServiceError::MalformedResponse(_)),
                "expected rejection for {case}"
            );
        }
    }

    #[test]
    fn research_response_requires_job_id() {
        assert!(ResearchResponse::from_json(json!({"keyFacts": ["a"]})).is_err());
        let resp = ResearchResponse::from_json(json!({
            "jobId": "job-7",
            "keyFacts": ["Tides follow the moon"],
            "tips": []
        }))
        .unwrap();
        assert_eq!(resp.job_id, "job-7");
        assert_eq!(resp.key_facts, vec!["Tides follow the moon"]);
        assert!(resp.references.is_empty());
    }

    #[test]
    fn generation_request_uses_wire_names() {
        let req = GenerationRequest {
            task: "write".into(),
            context: json!({}),
            max_agents: Some(2),
            timeout_ms: Some(1000),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["maxAgents"], 2);
        assert_eq!(json["timeout"], 1000);
    }
}
