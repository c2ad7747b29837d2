//! In-memory store backends: useful for testing and ephemeral runs.

use crate::vector::{HashingEmbedder, rank_points, reciprocal_rank_fusion, tokenize};
use async_trait::async_trait;
use inkweave_core::error::StoreError;
use inkweave_core::store::{
    Collection, Direction, Document, DocumentStore, GraphNode, GraphRelationship, GraphStore,
    NodeFilter, RetrievalQuery, RetrievalStrategy, RetrievedDocument, ScoredPoint,
    SearchOptions, StoredDocument, TraversalQuery, VectorPoint, VectorStore,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

// ── Graph ────────────────────────────────────────────────────────────────

type NodeKey = (String, String);

/// Graph store over an ordered node map and an edge list.
#[derive(Default)]
pub struct InMemoryGraphStore {
    nodes: Arc<RwLock<BTreeMap<NodeKey, GraphNode>>>,
    relationships: Arc<RwLock<Vec<GraphRelationship>>>,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn node_count(&self) -> usize {
        self.nodes.read().await.len()
    }

    pub async fn relationship_count(&self) -> usize {
        self.relationships.read().await.len()
    }
}

fn key(label: &str, id: &str) -> NodeKey {
    (label.to_string(), id.to_string())
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    fn name(&self) -> &str {
        "in_memory_graph"
    }

    async fn upsert_node(&self, node: GraphNode) -> Result<(), StoreError> {
        if node.label.is_empty() || node.id.is_empty() {
            return Err(StoreError::InvalidRecord("node label and id are required".into()));
        }
        self.nodes
            .write()
            .await
            .insert(key(&node.label, &node.id), node);
        Ok(())
    }

    async fn get_node(&self, label: &str, id: &str) -> Result<Option<GraphNode>, StoreError> {
        Ok(self.nodes.read().await.get(&key(label, id)).cloned())
    }

    async fn delete_node(&self, label: &str, id: &str) -> Result<bool, StoreError> {
        let removed = self.nodes.write().await.remove(&key(label, id)).is_some();
        if removed {
            self.relationships.write().await.retain(|r| {
                !((r.from_label == label && r.from_id == id) || (r.to_label == label && r.to_id == id))
            });
        }
        Ok(removed)
    }

    async fn find_nodes(&self, label: &str, filter: &NodeFilter) -> Result<Vec<GraphNode>, StoreError> {
        Ok(self
            .nodes
            .read()
            .await
            .values()
            .filter(|n| n.label == label && filter.matches(&n.properties))
            .cloned()
            .collect())
    }

    async fn relate(&self, relationship: GraphRelationship) -> Result<(), StoreError> {
        {
            let nodes = self.nodes.read().await;
            for (label, id) in [
                (&relationship.from_label, &relationship.from_id),
                (&relationship.to_label, &relationship.to_id),
            ] {
                if !nodes.contains_key(&key(label, id)) {
                    return Err(StoreError::InvalidRecord(format!(
                        "relationship endpoint {label}:{id} does not exist"
                    )));
                }
            }
        }

        let mut rels = self.relationships.write().await;
        let exists = rels.iter().any(|r| {
            r.from_label == relationship.from_label
                && r.from_id == relationship.from_id
                && r.to_label == relationship.to_label
                && r.to_id == relationship.to_id
                && r.kind == relationship.kind
        });
        if !exists {
            rels.push(relationship);
        }
        Ok(())
    }

    async fn traverse(&self, query: &TraversalQuery) -> Result<Vec<GraphNode>, StoreError> {
        let rels = self.relationships.read().await;
        let nodes = self.nodes.read().await;

        let mut seen = BTreeSet::new();
        let mut out = Vec::new();
        for r in rels.iter() {
            if query.relationship.as_ref().is_some_and(|k| k != &r.kind) {
                continue;
            }
            let outgoing = r.from_label == query.start_label && r.from_id == query.start_id;
            let incoming = r.to_label == query.start_label && r.to_id == query.start_id;
            let neighbour = match query.direction {
                Direction::Outgoing if outgoing => key(&r.to_label, &r.to_id),
                Direction::Incoming if incoming => key(&r.from_label, &r.from_id),
                Direction::Both if outgoing => key(&r.to_label, &r.to_id),
                Direction::Both if incoming => key(&r.from_label, &r.from_id),
                _ => continue,
            };
            if query.target_label.as_ref().is_some_and(|l| l != &neighbour.0) {
                continue;
            }
            if !seen.insert(neighbour.clone()) {
                continue;
            }
            if let Some(node) = nodes.get(&neighbour) {
                out.push(node.clone());
                if out.len() >= query.limit {
                    break;
                }
            }
        }
        Ok(out)
    }
}

// ── Vector ───────────────────────────────────────────────────────────────

/// Brute-force vector store with per-collection dimension checks.
#[derive(Default)]
pub struct InMemoryVectorStore {
    collections: Arc<RwLock<HashMap<Collection, Vec<VectorPoint>>>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self, collection: Collection) -> usize {
        self.collections
            .read()
            .await
            .get(&collection)
            .map_or(0, Vec::len)
    }
}

fn check_dimension(collection: Collection, actual: usize) -> Result<(), StoreError> {
    let expected = collection.dimension();
    if actual != expected {
        return Err(StoreError::DimensionMismatch {
            collection: collection.as_str().to_string(),
            expected,
            actual,
        });
    }
    Ok(())
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    fn name(&self) -> &str {
        "in_memory_vector"
    }

    async fn upsert(&self, collection: Collection, point: VectorPoint) -> Result<(), StoreError> {
        check_dimension(collection, point.vector.len())?;
        let mut map = self.collections.write().await;
        let points = map.entry(collection).or_default();
        match points.iter_mut().find(|p| p.id == point.id) {
            Some(existing) => *existing = point,
            None => points.push(point),
        }
        Ok(())
    }

    async fn search(
        &self,
        collection: Collection,
        vector: &[f32],
        options: &SearchOptions,
    ) -> Result<Vec<ScoredPoint>, StoreError> {
        check_dimension(collection, vector.len())?;
        let map = self.collections.read().await;
        Ok(map
            .get(&collection)
            .map(|points| rank_points(points, vector, options))
            .unwrap_or_default())
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<bool, StoreError> {
        let mut map = self.collections.write().await;
        let Some(points) = map.get_mut(&collection) else {
            return Ok(false);
        };
        let before = points.len();
        points.retain(|p| p.id != id);
        Ok(points.len() < before)
    }
}

// ── Documents ────────────────────────────────────────────────────────────

/// Characters per stored chunk.
const CHUNK_CHARS: usize = 1000;

/// Rank fusion constant for hybrid retrieval.
const RRF_K: u32 = 60;

struct StoredDoc {
    id: String,
    document: Document,
    embedding: Vec<f32>,
    terms: BTreeSet<String>,
}

/// Document store with semantic (hashing embedder), keyword, and hybrid
/// retrieval.
pub struct InMemoryDocumentStore {
    docs: Arc<RwLock<Vec<StoredDoc>>>,
    embedder: HashingEmbedder,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self {
            docs: Arc::new(RwLock::new(Vec::new())),
            embedder: HashingEmbedder::default(),
        }
    }

    pub async fn len(&self) -> usize {
        self.docs.read().await.len()
    }

    fn to_result(doc: &StoredDoc, score: f32) -> RetrievedDocument {
        RetrievedDocument {
            document_id: doc.id.clone(),
            title: doc.document.title.clone(),
            content: doc.document.content.clone(),
            score,
            metadata: doc.document.metadata.clone(),
        }
    }

    fn semantic(&self, docs: &[StoredDoc], query: &str) -> Vec<RetrievedDocument> {
        let q = self.embedder.embed_text(query);
        let mut scored: Vec<RetrievedDocument> = docs
            .iter()
            .map(|d| Self::to_result(d, crate::vector::cosine_similarity(&d.embedding, &q)))
            .filter(|d| d.score > 0.0)
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored
    }

    /// Term-overlap ranking: the fraction of query terms found in the
    /// document's title or content.
    fn keyword(docs: &[StoredDoc], query: &str) -> Vec<RetrievedDocument> {
        let terms: BTreeSet<String> = tokenize(query).collect();
        if terms.is_empty() {
            return Vec::new();
        }
        let mut scored: Vec<RetrievedDocument> = docs
            .iter()
            .filter_map(|d| {
                let hits = terms.intersection(&d.terms).count();
                (hits > 0).then(|| Self::to_result(d, hits as f32 / terms.len() as f32))
            })
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored
    }
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    fn name(&self) -> &str {
        "in_memory_documents"
    }

    async fn store_document(&self, document: Document) -> Result<StoredDocument, StoreError> {
        if document.content.trim().is_empty() {
            return Err(StoreError::InvalidRecord("document content is empty".into()));
        }
        let id = Uuid::new_v4().to_string();
        let chunks = document.content.chars().count().div_ceil(CHUNK_CHARS).max(1);
        let text = format!("{} {}", document.title, document.content);
        let stored = StoredDoc {
            id: id.clone(),
            embedding: self.embedder.embed_text(&text),
            terms: tokenize(&text).collect(),
            document,
        };
        self.docs.write().await.push(stored);
        Ok(StoredDocument {
            document_id: id,
            chunks,
        })
    }

    async fn retrieve(&self, query: &RetrievalQuery) -> Result<Vec<RetrievedDocument>, StoreError> {
        let docs = self.docs.read().await;
        let strategy = match query.strategy {
            // Short queries carry too little signal for embeddings alone.
            RetrievalStrategy::Adaptive if tokenize(&query.query).count() <= 2 => {
                RetrievalStrategy::Graph
            }
            RetrievalStrategy::Adaptive => RetrievalStrategy::Hybrid,
            other => other,
        };

        let mut results = match strategy {
            RetrievalStrategy::Semantic => self.semantic(&docs, &query.query),
            RetrievalStrategy::Graph => Self::keyword(&docs, &query.query),
            _ => reciprocal_rank_fusion(
                &self.semantic(&docs, &query.query),
                &Self::keyword(&docs, &query.query),
                RRF_K,
                usize::MAX,
            ),
        };

        if query.rerank {
            let keyword: HashMap<String, f32> = Self::keyword(&docs, &query.query)
                .into_iter()
                .map(|d| (d.document_id, d.score))
                .collect();
            results.sort_by(|a, b| {
                let ka = keyword.get(&a.document_id).copied().unwrap_or(0.0);
                let kb = keyword.get(&b.document_id).copied().unwrap_or(0.0);
                kb.partial_cmp(&ka)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal))
            });
        }

        results.truncate(query.limit);
        Ok(results)
    }
}
