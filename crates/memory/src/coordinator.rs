//! The Memory Coordinator: read-through cache plus fan-out writer over the
//! graph, vector, and document stores.
//!
//! Reads are served from the cache when possible. Backend read failures
//! degrade to empty results (logged at warn), except the continuity window,
//! which propagates. Writes go to every backend concurrently, fail fast, and
//! invalidate the affected cache keys.

use crate::cache::TtlCache;
use crate::in_memory::{InMemoryDocumentStore, InMemoryGraphStore, InMemoryVectorStore};
use crate::vector::HashingEmbedder;
use inkweave_config::CacheConfig;
use inkweave_core::entity::EntityProfile;
use inkweave_core::error::{Error, Result, StoreError};
use inkweave_core::narrative::{NarrativeUnit, UnitId};
use inkweave_core::store::{
    Collection, Document, DocumentStore, Embedder, GraphNode, GraphRelationship, GraphStore,
    NodeFilter, RetrievalQuery, RetrievedDocument, SearchOptions, VectorPoint, VectorStore,
};
use inkweave_core::thread::PlotThread;
use inkweave_core::world::{LocationRecord, WorldRule};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

const UNIT: &str = "Unit";
const ENTITY: &str = "Entity";
const THREAD: &str = "Thread";
const LOCATION: &str = "Location";
const WORLD_RULE: &str = "WorldRule";

/// Every entity and location name known to a project.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Roster {
    pub entities: Vec<String>,
    pub locations: Vec<String>,
    /// Names and aliases of entities whose lifecycle is deceased.
    #[serde(default)]
    pub deceased: Vec<String>,
}

pub struct MemoryCoordinator {
    graph: Arc<dyn GraphStore>,
    vectors: Arc<dyn VectorStore>,
    documents: Arc<dyn DocumentStore>,
    embedder: Arc<dyn Embedder>,
    cache: Arc<TtlCache>,
}

impl MemoryCoordinator {
    pub fn new(
        graph: Arc<dyn GraphStore>,
        vectors: Arc<dyn VectorStore>,
        documents: Arc<dyn DocumentStore>,
        cache: Arc<TtlCache>,
    ) -> Self {
        Self {
            graph,
            vectors,
            documents,
            embedder: Arc::new(HashingEmbedder::default()),
            cache,
        }
    }

    /// All three stores in memory.
    pub fn in_memory(config: &CacheConfig) -> Self {
        Self::new(
            Arc::new(InMemoryGraphStore::new()),
            Arc::new(InMemoryVectorStore::new()),
            Arc::new(InMemoryDocumentStore::new()),
            Arc::new(TtlCache::from_config(config)),
        )
    }

    /// Replace the content embedder.
    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = embedder;
        self
    }

    /// Shared handle for the background sweeper.
    pub fn cache(&self) -> Arc<TtlCache> {
        self.cache.clone()
    }

    // ── Raw cache access ─────────────────────────────────────────────────

    /// Cached value for `key`, or `None` on miss.
    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.cache.get(key)
    }

    /// Drop every cache key containing `pattern`.
    pub fn invalidate(&self, pattern: &str) -> usize {
        let removed = self.cache.invalidate(pattern);
        debug!(pattern, removed, "Cache invalidated");
        removed
    }

    async fn cached<T, F, Fut>(&self, key: String, fetch: F) -> std::result::Result<T, StoreError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, StoreError>>,
    {
        if let Some(hit) = self.cache.get(&key) {
            match serde_json::from_value(hit) {
                Ok(value) => return Ok(value),
                Err(e) => {
                    warn!(key = %key, error = %e, "Dropping undecodable cache entry");
                    self.cache.invalidate(&key);
                }
            }
        }

        let value = fetch().await?;
        match serde_json::to_value(&value) {
            // Misses are not cached.
            Ok(serde_json::Value::Null) => {}
            Ok(json) => self.cache.put(key, json),
            Err(e) => warn!(key = %key, error = %e, "Value not cacheable"),
        }
        Ok(value)
    }

    fn degrade<T: Default>(op: &str, result: std::result::Result<T, StoreError>) -> T {
        result.unwrap_or_else(|e| {
            warn!(op, error = %e, "Memory read failed, continuing without it");
            T::default()
        })
    }

    // ── Typed reads ──────────────────────────────────────────────────────

    /// Up to `limit` units of the project preceding `before`, oldest first.
    ///
    /// The only read that propagates backend failures.
    pub async fn recent_units(
        &self,
        before: &UnitId,
        limit: usize,
    ) -> std::result::Result<Vec<NarrativeUnit>, StoreError> {
        let key = format!(
            "units:{}:{}:{}:{}",
            before.project_id, before.chapter, before.unit, limit
        );
        self.cached(key, || async {
            let filter = NodeFilter::new().eq("project", before.project_id.as_str());
            let nodes = self.graph.find_nodes(UNIT, &filter).await?;
            let mut units: Vec<NarrativeUnit> = nodes
                .iter()
                .map(decode_record)
                .collect::<std::result::Result<_, _>>()?;
            units.retain(|u| (u.id.chapter, u.id.unit) < (before.chapter, before.unit));
            units.sort_by(|a, b| a.id.cmp(&b.id));
            let skip = units.len().saturating_sub(limit);
            Ok::<_, StoreError>(units.split_off(skip))
        })
        .await
    }

    pub async fn unit(&self, id: &UnitId) -> Option<NarrativeUnit> {
        let result = self
            .cached(format!("unit:{}", id.key()), || async {
                self.graph
                    .get_node(UNIT, &id.key())
                    .await?
                    .as_ref()
                    .map(decode_record)
                    .transpose()
            })
            .await;
        Self::degrade("unit", result)
    }

    /// Look up an entity by name, falling back to a case-insensitive
    /// name/alias match across the project.
    pub async fn entity_profile(&self, project: &str, name: &str) -> Option<EntityProfile> {
        let result = self
            .cached(format!("entity:{project}:{name}"), || async {
                if let Some(node) = self.graph.get_node(ENTITY, &scoped(project, name)).await? {
                    return decode_record(&node).map(Some);
                }
                let filter = NodeFilter::new().eq("project", project);
                for node in self.graph.find_nodes(ENTITY, &filter).await? {
                    let profile: EntityProfile = decode_record(&node)?;
                    if profile.names().any(|n| n.eq_ignore_ascii_case(name)) {
                        return Ok(Some(profile));
                    }
                }
                Ok(None)
            })
            .await;
        Self::degrade("entity_profile", result)
    }

    pub async fn plot_thread(&self, project: &str, id: &str) -> Option<PlotThread> {
        let result = self.fetch_thread(project, id).await;
        Self::degrade("plot_thread", result)
    }

    async fn fetch_thread(
        &self,
        project: &str,
        id: &str,
    ) -> std::result::Result<Option<PlotThread>, StoreError> {
        self.cached(format!("thread:{project}:{id}"), || async {
            self.graph
                .get_node(THREAD, &scoped(project, id))
                .await?
                .as_ref()
                .map(decode_record)
                .transpose()
        })
        .await
    }

    pub async fn location(&self, project: &str, name: &str) -> Option<LocationRecord> {
        let result = self
            .cached(format!("location:{project}:{name}"), || async {
                self.graph
                    .get_node(LOCATION, &scoped(project, name))
                    .await?
                    .as_ref()
                    .map(decode_record)
                    .transpose()
            })
            .await;
        Self::degrade("location", result)
    }

    pub async fn world_rules(&self, project: &str) -> Vec<WorldRule> {
        let result = self
            .cached(format!("rules:{project}"), || async {
                let filter = NodeFilter::new().eq("project", project);
                self.graph
                    .find_nodes(WORLD_RULE, &filter)
                    .await?
                    .iter()
                    .map(decode_record)
                    .collect::<std::result::Result<Vec<WorldRule>, StoreError>>()
            })
            .await;
        Self::degrade("world_rules", result)
    }

    pub async fn roster(&self, project: &str) -> Roster {
        let result = self
            .cached(format!("roster:{project}"), || async {
                let filter = NodeFilter::new().eq("project", project);
                let (entities, locations) = futures::try_join!(
                    self.graph.find_nodes(ENTITY, &filter),
                    self.graph.find_nodes(LOCATION, &filter),
                )?;
                let names = |nodes: &[GraphNode]| {
                    nodes
                        .iter()
                        .filter_map(|n| n.properties.get("name")?.as_str().map(String::from))
                        .collect::<Vec<_>>()
                };
                let mut deceased = Vec::new();
                for node in &entities {
                    let profile: EntityProfile = decode_record(node)?;
                    if profile.is_deceased() {
                        deceased.extend(profile.names().map(String::from));
                    }
                }
                Ok::<_, StoreError>(Roster {
                    entities: names(&entities),
                    locations: names(&locations),
                    deceased,
                })
            })
            .await;
        Self::degrade("roster", result)
    }

    /// Past units of the project most similar to `text`, best first,
    /// skipping anything in `exclude`.
    pub async fn similar_units(
        &self,
        project: &str,
        text: &str,
        exclude: &[UnitId],
        limit: usize,
        min_score: f32,
    ) -> Vec<NarrativeUnit> {
        let result = async {
            if limit == 0 || text.trim().is_empty() {
                return Ok(Vec::new());
            }
            let vector = self.embedder.embed(text).await?;
            let options = SearchOptions::new(limit + exclude.len())
                .threshold(min_score)
                .filter("project", project);
            let hits = self.vectors.search(Collection::Content, &vector, &options).await?;

            let mut units = Vec::with_capacity(limit);
            for hit in hits {
                if exclude.iter().any(|id| id.key() == hit.id) {
                    continue;
                }
                if let Some(node) = self.graph.get_node(UNIT, &hit.id).await? {
                    units.push(decode_record(&node)?);
                }
                if units.len() >= limit {
                    break;
                }
            }
            Ok::<_, StoreError>(units)
        }
        .await;
        Self::degrade("similar_units", result)
    }

    pub async fn search_documents(&self, query: &RetrievalQuery) -> Vec<RetrievedDocument> {
        Self::degrade("search_documents", self.documents.retrieve(query).await)
    }

    // ── Writes ───────────────────────────────────────────────────────────

    /// Persist an accepted unit to all three stores.
    pub async fn put_unit(&self, unit: &NarrativeUnit) -> Result<()> {
        let key = unit.id.key();
        let project = unit.id.project_id.as_str();
        let record = serde_json::to_value(unit)?;

        let graph_write = async {
            self.graph
                .upsert_node(GraphNode::new(
                    UNIT,
                    key.clone(),
                    json!({
                        "project": project,
                        "chapter": unit.id.chapter,
                        "unit_index": unit.id.unit,
                        "record": record,
                    }),
                ))
                .await?;
            for name in &unit.entities {
                let target = scoped(project, name);
                if self.graph.get_node(ENTITY, &target).await?.is_some() {
                    self.graph
                        .relate(edge(UNIT, &key, ENTITY, &target, "MENTIONS"))
                        .await?;
                }
            }
            for thread in &unit.threads {
                let target = scoped(project, thread);
                if self.graph.get_node(THREAD, &target).await?.is_some() {
                    self.graph
                        .relate(edge(UNIT, &key, THREAD, &target, "ADVANCES"))
                        .await?;
                }
            }
            Ok::<_, StoreError>(())
        };

        let vector_write = async {
            let vector = self.embedder.embed(&unit.content).await?;
            self.vectors
                .upsert(
                    Collection::Content,
                    VectorPoint {
                        id: key.clone(),
                        vector,
                        payload: json!({
                            "project": project,
                            "chapter": unit.id.chapter,
                            "unit": unit.id.unit,
                        }),
                    },
                )
                .await
        };

        let document_write = async {
            self.documents
                .store_document(Document {
                    content: unit.content.clone(),
                    title: unit.id.to_string(),
                    metadata: json!({
                        "project": project,
                        "chapter": unit.id.chapter,
                        "unit": unit.id.unit,
                        "kind": "narrative_unit",
                    }),
                })
                .await
        };

        futures::try_join!(graph_write, vector_write, document_write)
            .map_err(Error::StorageWriteFailure)?;

        self.invalidate(&format!("units:{project}:"));
        self.invalidate(&format!("unit:{key}"));
        debug!(unit = %unit.id, words = unit.word_count, "Unit persisted");
        Ok(())
    }

    /// Persist an entity profile and its voice fingerprint.
    ///
    /// Relationship edges are created for targets already in the graph.
    pub async fn put_entity(&self, project: &str, profile: &EntityProfile) -> Result<()> {
        let id = scoped(project, &profile.name);
        let record = serde_json::to_value(profile)?;

        let graph_write = async {
            self.graph
                .upsert_node(GraphNode::new(
                    ENTITY,
                    id.clone(),
                    json!({"project": project, "name": profile.name, "record": record}),
                ))
                .await?;
            for rel in &profile.relationships {
                let target = scoped(project, &rel.target);
                if self.graph.get_node(ENTITY, &target).await?.is_some() {
                    self.graph
                        .relate(edge(ENTITY, &id, ENTITY, &target, &rel.kind))
                        .await?;
                }
            }
            Ok::<_, StoreError>(())
        };

        let vector_write = self.vectors.upsert(
            Collection::VoiceFingerprints,
            VectorPoint {
                id: id.clone(),
                vector: profile.voice.fingerprint(),
                payload: json!({"project": project, "name": profile.name}),
            },
        );

        futures::try_join!(graph_write, vector_write).map_err(Error::StorageWriteFailure)?;

        self.invalidate(&format!("entity:{project}:"));
        self.invalidate(&format!("roster:{project}"));
        Ok(())
    }

    pub async fn put_thread(&self, project: &str, thread: &PlotThread) -> Result<()> {
        self.write_node(project, THREAD, &thread.id, json!({}), thread)
            .await?;
        self.invalidate(&format!("thread:{project}:{}", thread.id));
        Ok(())
    }

    /// Replace a stored thread, rejecting illegal status moves and progress
    /// regression against the stored state.
    pub async fn update_thread(&self, project: &str, next: &PlotThread) -> Result<PlotThread> {
        self.invalidate(&format!("thread:{project}:{}", next.id));
        let stored = self
            .fetch_thread(project, &next.id)
            .await
            .map_err(Error::StorageWriteFailure)?;
        if let Some(current) = &stored {
            current.validate_update(next)?;
        }

        let mut updated = next.clone();
        updated.progress = updated.progress.min(100);
        self.put_thread(project, &updated).await?;
        Ok(updated)
    }

    pub async fn put_location(&self, project: &str, location: &LocationRecord) -> Result<()> {
        self.write_node(
            project,
            LOCATION,
            &location.name,
            json!({"name": location.name}),
            location,
        )
        .await?;
        self.invalidate(&format!("location:{project}:{}", location.name));
        self.invalidate(&format!("roster:{project}"));
        Ok(())
    }

    pub async fn put_world_rule(&self, project: &str, rule: &WorldRule) -> Result<()> {
        self.write_node(project, WORLD_RULE, &rule.id, json!({}), rule)
            .await?;
        self.invalidate(&format!("rules:{project}"));
        Ok(())
    }

    /// Store a research or reference document.
    pub async fn put_document(&self, document: Document) -> Result<String> {
        let stored = self
            .documents
            .store_document(document)
            .await
            .map_err(Error::StorageWriteFailure)?;
        Ok(stored.document_id)
    }

    async fn write_node<T: Serialize>(
        &self,
        project: &str,
        label: &str,
        id: &str,
        mut properties: serde_json::Value,
        record: &T,
    ) -> Result<()> {
        properties["project"] = json!(project);
        properties["record"] = serde_json::to_value(record)?;
        self.graph
            .upsert_node(GraphNode::new(label, scoped(project, id), properties))
            .await
            .map_err(Error::StorageWriteFailure)
    }
}

fn scoped(project: &str, id: &str) -> String {
    format!("{project}:{id}")
}

fn edge(from_label: &str, from_id: &str, to_label: &str, to_id: &str, kind: &str) -> GraphRelationship {
    GraphRelationship {
        from_label: from_label.into(),
        from_id: from_id.into(),
        to_label: to_label.into(),
        to_id: to_id.into(),
        kind: kind.into(),
        properties: json!({}),
    }
}

fn decode_record<T: DeserializeOwned>(node: &GraphNode) -> std::result::Result<T, StoreError> {
    let record = node.properties.get("record").cloned().ok_or_else(|| {
        StoreError::InvalidRecord(format!("{}:{} has no record", node.label, node.id))
    })?;
    serde_json::from_value(record)
        .map_err(|e| StoreError::InvalidRecord(format!("{}:{}: {e}", node.label, node.id)))
}
