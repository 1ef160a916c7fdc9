//! In-memory vector store
//!
//! Ephemeral backend for tests and development. Holds collections behind a
//! read-write lock; search is brute-force over the collection.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::adapters::providers::vector_store::{check_compatible, CollectionData};
use crate::domain::error::{Error, Result};
use crate::domain::filter::Filter;
use crate::domain::ports::{ScoredPoint, VectorStoreCapabilities, VectorStoreProvider};
use crate::domain::types::{CollectionMetadata, SparseVector, VectorPoint};

#[derive(Default)]
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, CollectionData>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Map a missing collection to the dedicated error kind
macro_rules! collection {
    ($guard:expr, $name:expr) => {
        $guard
            .get($name)
            .ok_or_else(|| Error::CollectionNotFound {
                collection: $name.to_string(),
            })?
    };
}

macro_rules! collection_mut {
    ($guard:expr, $name:expr) => {
        $guard
            .get_mut($name)
            .ok_or_else(|| Error::CollectionNotFound {
                collection: $name.to_string(),
            })?
    };
}

#[async_trait]
impl VectorStoreProvider for InMemoryVectorStore {
    async fn ensure_collection(&self, name: &str, metadata: &CollectionMetadata) -> Result<()> {
        let mut collections = self.collections.write().await;
        match collections.get_mut(name) {
            Some(existing) => {
                check_compatible(&existing.metadata, metadata)?;
                // A model switch with identical dimensions re-embeds in
                // place; record the new model
                existing.metadata.model_name = metadata.model_name.clone();
                existing.metadata.sparse_present = metadata.sparse_present;
                Ok(())
            }
            None => {
                collections.insert(name.to_string(), CollectionData::new(metadata.clone()));
                Ok(())
            }
        }
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        let collections = self.collections.read().await;
        let mut names: Vec<String> = collections.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn collection_metadata(&self, name: &str) -> Result<Option<CollectionMetadata>> {
        let collections = self.collections.read().await;
        Ok(collections.get(name).map(|c| c.metadata.clone()))
    }

    async fn upsert(&self, collection: &str, points: Vec<VectorPoint>) -> Result<()> {
        let mut collections = self.collections.write().await;
        collection_mut!(collections, collection).upsert(points)
    }

    async fn update_vectors(
        &self,
        collection: &str,
        id: Uuid,
        dense: Option<Vec<f32>>,
        sparse: Option<SparseVector>,
    ) -> Result<()> {
        let mut collections = self.collections.write().await;
        collection_mut!(collections, collection).update_vectors(id, dense, sparse)
    }

    async fn search_dense(
        &self,
        collection: &str,
        vector: &[f32],
        filter: Option<&Filter>,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>> {
        let collections = self.collections.read().await;
        collection!(collections, collection).search_dense(vector, filter, limit)
    }

    async fn search_sparse(
        &self,
        collection: &str,
        vector: &SparseVector,
        filter: Option<&Filter>,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>> {
        let collections = self.collections.read().await;
        collection!(collections, collection).search_sparse(vector, filter, limit)
    }

    async fn get_points(&self, collection: &str, ids: &[Uuid]) -> Result<Vec<VectorPoint>> {
        let collections = self.collections.read().await;
        Ok(collection!(collections, collection).get_points(ids))
    }

    async fn delete_by_id(&self, collection: &str, ids: &[Uuid]) -> Result<()> {
        let mut collections = self.collections.write().await;
        collection_mut!(collections, collection).delete_by_ids(ids);
        Ok(())
    }

    async fn delete_by_file(&self, collection: &str, path: &str) -> Result<usize> {
        let mut collections = self.collections.write().await;
        Ok(collection_mut!(collections, collection).delete_by_file(path))
    }

    async fn delete_by_chunk_name(&self, collection: &str, names: &[String]) -> Result<usize> {
        let mut collections = self.collections.write().await;
        Ok(collection_mut!(collections, collection).delete_by_chunk_name(names))
    }

    async fn rename_file(&self, collection: &str, from: &str, to: &str) -> Result<usize> {
        let mut collections = self.collections.write().await;
        Ok(collection_mut!(collections, collection).rename_file(from, to))
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let collections = self.collections.read().await;
        Ok(collection!(collections, collection).len())
    }

    fn capabilities(&self) -> VectorStoreCapabilities {
        VectorStoreCapabilities {
            supports_sparse: true,
            supports_update_vectors: true,
        }
    }

    fn provider_name(&self) -> &str {
        "in-memory"
    }

    async fn ensure_client(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn metadata() -> CollectionMetadata {
        CollectionMetadata {
            provider_name: "null".to_string(),
            model_name: "model-a".to_string(),
            schema_version: 1,
            created_at: Utc::now(),
            dense_dim: 4,
            sparse_present: true,
            project_name: "test".to_string(),
        }
    }

    fn point(id: u8, dense: Vec<f32>, file: &str) -> VectorPoint {
        let mut payload = serde_json::Map::new();
        payload.insert("file_path".to_string(), json!(file));
        payload.insert("language".to_string(), json!("rust"));
        VectorPoint {
            id: Uuid::new_v8([id; 16]),
            dense: Some(dense),
            sparse: Some(SparseVector::new(vec![1, 2], vec![0.5, 0.5])),
            payload,
        }
    }

    #[tokio::test]
    async fn upsert_search_and_delete_by_file() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("c", &metadata()).await.unwrap();
        store
            .upsert(
                "c",
                vec![
                    point(1, vec![1.0, 0.0, 0.0, 0.0], "a.rs"),
                    point(2, vec![0.0, 1.0, 0.0, 0.0], "b.rs"),
                ],
            )
            .await
            .unwrap();
        assert_eq!(store.count("c").await.unwrap(), 2);

        let hits = store
            .search_dense("c", &[1.0, 0.0, 0.0, 0.0], None, 10)
            .await
            .unwrap();
        assert_eq!(hits[0].id, Uuid::new_v8([1; 16]));
        assert!(hits[0].score > hits[1].score);

        let filtered = store
            .search_dense(
                "c",
                &[1.0, 0.0, 0.0, 0.0],
                Some(&Filter::eq("file_path", "b.rs")),
                10,
            )
            .await
            .unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].id, Uuid::new_v8([2; 16]));

        assert_eq!(store.delete_by_file("c", "a.rs").await.unwrap(), 1);
        assert_eq!(store.count("c").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn missing_collection_is_a_distinct_error() {
        let store = InMemoryVectorStore::new();
        let err = store.count("nope").await.unwrap_err();
        assert!(matches!(err, Error::CollectionNotFound { .. }));
    }

    #[tokio::test]
    async fn dense_search_rejects_wrong_query_dimension() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("c", &metadata()).await.unwrap();
        let err = store
            .search_dense("c", &[1.0, 0.0], None, 10)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { .. }));
    }

    #[tokio::test]
    async fn unknown_filter_field_fails_validation() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("c", &metadata()).await.unwrap();
        let err = store
            .search_dense(
                "c",
                &[0.0; 4],
                Some(&Filter::eq("bogus_field", 1)),
                10,
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "validation");
    }

    #[tokio::test]
    async fn rename_rewrites_payload_paths() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("c", &metadata()).await.unwrap();
        let mut p = point(1, vec![1.0, 0.0, 0.0, 0.0], "src/util.py");
        p.payload
            .insert("chunk_name".to_string(), json!("src/util.py:10"));
        store.upsert("c", vec![p]).await.unwrap();

        assert_eq!(
            store
                .rename_file("c", "src/util.py", "src/helpers.py")
                .await
                .unwrap(),
            1
        );
        let points = store
            .get_points("c", &[Uuid::new_v8([1; 16])])
            .await
            .unwrap();
        assert_eq!(points[0].file_path(), Some("src/helpers.py"));
        assert_eq!(
            points[0].payload.get("chunk_name").unwrap(),
            &json!("src/helpers.py:10")
        );
    }

    #[tokio::test]
    async fn reopening_with_a_different_provider_fails() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("c", &metadata()).await.unwrap();
        let mut other = metadata();
        other.provider_name = "different".to_string();
        let err = store.ensure_collection("c", &other).await.unwrap_err();
        assert!(matches!(err, Error::ProviderSwitch { .. }));
    }
}
