//! Vector storage backend interface
//!
//! Stores [`VectorPoint`]s in named collections and answers dense and
//! sparse similarity queries restricted by the vendor-neutral filter DSL.
//! Each backend owns the pure translation from the DSL to its native
//! filter language; unsupported constructs fail at translation time.

use async_trait::async_trait;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::domain::error::Result;
use crate::domain::filter::Filter;
use crate::domain::types::{CollectionMetadata, SparseVector, VectorPoint};

/// Declared capabilities of a vector store backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VectorStoreCapabilities {
    /// Whether sparse vectors are stored and searchable
    pub supports_sparse: bool,
    /// Whether vectors can be added to existing points without re-upserting
    /// the payload
    pub supports_update_vectors: bool,
}

/// One similarity search hit
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPoint {
    pub id: Uuid,
    pub score: f32,
    pub payload: Map<String, Value>,
}

/// Vector storage backend
#[async_trait]
pub trait VectorStoreProvider: Send + Sync {
    /// Open or create a collection, writing `metadata` on creation.
    ///
    /// On reopen the stored metadata is compared against `metadata`:
    /// a different `provider_name` fails with `ProviderSwitch`, a different
    /// `dense_dim` fails with `DimensionMismatch`.
    async fn ensure_collection(&self, name: &str, metadata: &CollectionMetadata) -> Result<()>;

    /// Names of all existing collections
    async fn list_collections(&self) -> Result<Vec<String>>;

    /// Stored metadata for a collection, if the collection exists
    async fn collection_metadata(&self, name: &str) -> Result<Option<CollectionMetadata>>;

    /// Insert or replace points by id
    async fn upsert(&self, collection: &str, points: Vec<VectorPoint>) -> Result<()>;

    /// Add or replace vectors on an existing point, leaving the payload
    /// untouched except for the `embedding_complete` flag
    async fn update_vectors(
        &self,
        collection: &str,
        id: Uuid,
        dense: Option<Vec<f32>>,
        sparse: Option<SparseVector>,
    ) -> Result<()>;

    /// Dense top-k by cosine similarity, restricted by `filter`
    async fn search_dense(
        &self,
        collection: &str,
        vector: &[f32],
        filter: Option<&Filter>,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>>;

    /// Sparse top-k by dot product, restricted by `filter`
    async fn search_sparse(
        &self,
        collection: &str,
        vector: &SparseVector,
        filter: Option<&Filter>,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>>;

    /// Fetch points by id; missing ids are simply absent from the result
    async fn get_points(&self, collection: &str, ids: &[Uuid]) -> Result<Vec<VectorPoint>>;

    /// Delete points by id
    async fn delete_by_id(&self, collection: &str, ids: &[Uuid]) -> Result<()>;

    /// Delete every point whose payload `file_path` equals `path`;
    /// returns the number of deleted points
    async fn delete_by_file(&self, collection: &str, path: &str) -> Result<usize>;

    /// Delete every point whose payload `chunk_name` is in `names`;
    /// returns the number of deleted points
    async fn delete_by_chunk_name(&self, collection: &str, names: &[String]) -> Result<usize>;

    /// Rewrite the payload `file_path` of every point under `from` to `to`.
    /// Used by the watcher's move detection; vectors are untouched.
    async fn rename_file(&self, collection: &str, from: &str, to: &str) -> Result<usize>;

    /// Number of points in the collection, excluding the metadata record
    async fn count(&self, collection: &str) -> Result<usize>;

    fn capabilities(&self) -> VectorStoreCapabilities;

    fn provider_name(&self) -> &str;

    /// Connectivity probe run at container startup
    async fn ensure_client(&self) -> Result<()>;

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
