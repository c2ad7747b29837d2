//! Storage backend traits: graph relationships, vector similarity, and
//! documents.
//!
//! Implementations: in-memory (for tests and ephemeral runs), no-op, and
//! whatever external databases the deployment wires in. The memory
//! coordinator is the only component that talks to these directly.

use crate::error::StoreError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ── Graph ────────────────────────────────────────────────────────────────

/// A labelled node with free-form properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub label: String,
    pub id: String,
    pub properties: serde_json::Value,
}

impl GraphNode {
    pub fn new(label: impl Into<String>, id: impl Into<String>, properties: serde_json::Value) -> Self {
        Self {
            label: label.into(),
            id: id.into(),
            properties,
        }
    }
}

/// A typed, directed edge between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphRelationship {
    pub from_label: String,
    pub from_id: String,
    pub to_label: String,
    pub to_id: String,
    pub kind: String,
    #[serde(default)]
    pub properties: serde_json::Value,
}

/// Equality filter over top-level node properties.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeFilter {
    pub equals: BTreeMap<String, serde_json::Value>,
}

impl NodeFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.equals.insert(key.into(), value.into());
        self
    }

    pub fn matches(&self, properties: &serde_json::Value) -> bool {
        self.equals
            .iter()
            .all(|(k, v)| properties.get(k).is_some_and(|p| p == v))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Outgoing,
    Incoming,
    Both,
}

/// One-hop traversal from a start node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraversalQuery {
    pub start_label: String,
    pub start_id: String,
    /// Restrict to this relationship kind.
    #[serde(default)]
    pub relationship: Option<String>,
    #[serde(default)]
    pub direction: Direction,
    /// Restrict to neighbours with this label.
    #[serde(default)]
    pub target_label: Option<String>,
    pub limit: usize,
}

#[async_trait]
pub trait GraphStore: Send + Sync {
    fn name(&self) -> &str;

    /// Create or replace a node.
    async fn upsert_node(&self, node: GraphNode) -> Result<(), StoreError>;

    async fn get_node(&self, label: &str, id: &str) -> Result<Option<GraphNode>, StoreError>;

    /// Delete a node and its relationships.
    async fn delete_node(&self, label: &str, id: &str) -> Result<bool, StoreError>;

    async fn find_nodes(&self, label: &str, filter: &NodeFilter) -> Result<Vec<GraphNode>, StoreError>;

    /// Create a relationship; creating the same (from, to, kind) twice is a no-op.
    async fn relate(&self, relationship: GraphRelationship) -> Result<(), StoreError>;

    async fn traverse(&self, query: &TraversalQuery) -> Result<Vec<GraphNode>, StoreError>;
}

// ── Vector ───────────────────────────────────────────────────────────────

/// The logical vector collections, each with a fixed dimensionality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    /// Unit content embeddings.
    Content,
    /// Entity voice fingerprints.
    VoiceFingerprints,
    /// Project-level metadata embeddings.
    Metadata,
}

impl Collection {
    pub const fn dimension(self) -> usize {
        match self {
            Self::Content => 256,
            Self::VoiceFingerprints => crate::entity::VOICE_FINGERPRINT_DIM,
            Self::Metadata => 32,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Content => "content",
            Self::VoiceFingerprints => "voice_fingerprints",
            Self::Metadata => "metadata",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchOptions {
    pub limit: usize,
    #[serde(default)]
    pub score_threshold: Option<f32>,
    /// Equality filters over top-level payload fields.
    #[serde(default)]
    pub filters: BTreeMap<String, serde_json::Value>,
}

impl SearchOptions {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            score_threshold: None,
            filters: BTreeMap::new(),
        }
    }

    pub fn threshold(mut self, score: f32) -> Self {
        self.score_threshold = Some(score);
        self
    }

    pub fn filter(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.filters.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredPoint {
    pub id: String,
    pub score: f32,
    pub payload: serde_json::Value,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    fn name(&self) -> &str;

    /// Insert or replace a point. Vectors must match the collection dimension.
    async fn upsert(&self, collection: Collection, point: VectorPoint) -> Result<(), StoreError>;

    /// Nearest neighbours, best first.
    async fn search(
        &self,
        collection: Collection,
        vector: &[f32],
        options: &SearchOptions,
    ) -> Result<Vec<ScoredPoint>, StoreError>;

    async fn delete(&self, collection: Collection, id: &str) -> Result<bool, StoreError>;
}

// ── Documents ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub content: String,
    pub title: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredDocument {
    pub document_id: String,
    pub chunks: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalStrategy {
    Semantic,
    Graph,
    #[default]
    Hybrid,
    Adaptive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalQuery {
    pub query: String,
    #[serde(default)]
    pub strategy: RetrievalStrategy,
    pub limit: usize,
    #[serde(default)]
    pub rerank: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievedDocument {
    pub document_id: String,
    pub title: String,
    pub content: String,
    pub score: f32,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    fn name(&self) -> &str;

    async fn store_document(&self, document: Document) -> Result<StoredDocument, StoreError>;

    async fn retrieve(&self, query: &RetrievalQuery) -> Result<Vec<RetrievedDocument>, StoreError>;
}

// ── Embedding ────────────────────────────────────────────────────────────

/// Turns text into a vector for the content collection.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn dimension(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn node_filter_matches_all_fields() {
        let filter = NodeFilter::new().eq("project", "saga").eq("chapter", 2);
        assert!(filter.matches(&json!({"project": "saga", "chapter": 2, "unit": 5})));
        assert!(!filter.matches(&json!({"project": "saga", "chapter": 3})));
        assert!(!filter.matches(&json!({"chapter": 2})));
    }

    #[test]
    fn collection_dimensions_are_fixed() {
        assert_eq!(Collection::Content.dimension(), 256);
        assert_eq!(Collection::VoiceFingerprints.dimension(), 8);
        assert_eq!(Collection::Metadata.as_str(), "metadata");
    }

    #[test]
    fn search_options_builder() {
        let opts = SearchOptions::new(5).threshold(0.3).filter("project", "saga");
        assert_eq!(opts.limit, 5);
        assert_eq!(opts.score_threshold, Some(0.3));
        assert_eq!(opts.filters["project"], "saga");
    }
}
