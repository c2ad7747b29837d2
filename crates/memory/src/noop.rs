//! No-op store backend: disables persistence entirely.

use async_trait::async_trait;
use inkweave_core::error::StoreError;
use inkweave_core::store::{
    Collection, Document, DocumentStore, GraphNode, GraphRelationship, GraphStore, NodeFilter,
    RetrievalQuery, RetrievedDocument, ScoredPoint, SearchOptions, StoredDocument,
    TraversalQuery, VectorPoint, VectorStore,
};

/// Accepts every write and finds nothing.
pub struct NoopStore;

#[async_trait]
impl GraphStore for NoopStore {
    fn name(&self) -> &str {
        "none"
    }

    async fn upsert_node(&self, _node: GraphNode) -> Result<(), StoreError> {
        Ok(())
    }

    async fn get_node(&self, _label: &str, _id: &str) -> Result<Option<GraphNode>, StoreError> {
        Ok(None)
    }

    async fn delete_node(&self, _label: &str, _id: &str) -> Result<bool, StoreError> {
        Ok(false)
    }

    async fn find_nodes(&self, _label: &str, _filter: &NodeFilter) -> Result<Vec<GraphNode>, StoreError> {
        Ok(Vec::new())
    }

    async fn relate(&self, _relationship: GraphRelationship) -> Result<(), StoreError> {
        Ok(())
    }

    async fn traverse(&self, _query: &TraversalQuery) -> Result<Vec<GraphNode>, StoreError> {
        Ok(Vec::new())
    }
}

#[async_trait]
impl VectorStore for NoopStore {
    fn name(&self) -> &str {
        "none"
    }

    async fn upsert(&self, _collection: Collection, _point: VectorPoint) -> Result<(), StoreError> {
        Ok(())
    }

    async fn search(
        &self,
        _collection: Collection,
        _vector: &[f32],
        _options: &SearchOptions,
    ) -> Result<Vec<ScoredPoint>, StoreError> {
        Ok(Vec::new())
    }

    async fn delete(&self, _collection: Collection, _id: &str) -> Result<bool, StoreError> {
        Ok(false)
    }
}

#[async_trait]
impl DocumentStore for NoopStore {
    fn name(&self) -> &str {
        "none"
    }

    async fn store_document(&self, _document: Document) -> Result<StoredDocument, StoreError> {
        Ok(StoredDocument {
            document_id: String::new(),
            chunks: 0,
        })
    }

    async fn retrieve(&self, _query: &RetrievalQuery) -> Result<Vec<RetrievedDocument>, StoreError> {
        Ok(Vec::new())
    }
}
