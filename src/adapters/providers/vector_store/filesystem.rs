//! Filesystem vector store
//!
//! Single-node persistent backend: each collection is one JSON document
//! under the storage directory, loaded into memory on first access and
//! rewritten atomically after every mutation. Search runs over the
//! in-memory image, so reads never touch disk after warm-up.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::adapters::providers::vector_store::{check_compatible, CollectionData};
use crate::domain::error::{Error, Result};
use crate::domain::filter::Filter;
use crate::domain::ports::{ScoredPoint, VectorStoreCapabilities, VectorStoreProvider};
use crate::domain::types::{CollectionMetadata, SparseVector, VectorPoint};
use crate::infrastructure::manifest::atomic_write_json;

pub struct FilesystemVectorStore {
    root: PathBuf,
    collections: RwLock<HashMap<String, CollectionData>>,
}

impl FilesystemVectorStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            collections: RwLock::new(HashMap::new()),
        }
    }

    fn collection_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.collection.json"))
    }

    /// Load a collection from disk into the cache if present there
    async fn hydrate(&self, name: &str) -> Result<()> {
        {
            let collections = self.collections.read().await;
            if collections.contains_key(name) {
                return Ok(());
            }
        }
        let path = self.collection_path(name);
        if !path.exists() {
            return Ok(());
        }
        let bytes = std::fs::read(&path)?;
        let data: CollectionData = serde_json::from_slice(&bytes).map_err(|err| {
            Error::persistence(format!(
                "collection file {} is unreadable: {err}",
                path.display()
            ))
        })?;
        let mut collections = self.collections.write().await;
        collections.entry(name.to_string()).or_insert(data);
        Ok(())
    }

    /// Persist one collection after a mutation
    fn persist(&self, name: &str, data: &CollectionData) -> Result<()> {
        atomic_write_json(&self.collection_path(name), data)
    }
}

#[async_trait]
impl VectorStoreProvider for FilesystemVectorStore {
    async fn ensure_collection(&self, name: &str, metadata: &CollectionMetadata) -> Result<()> {
        self.hydrate(name).await?;
        let mut collections = self.collections.write().await;
        match collections.get_mut(name) {
            Some(existing) => {
                check_compatible(&existing.metadata, metadata)?;
                existing.metadata.model_name = metadata.model_name.clone();
                existing.metadata.sparse_present = metadata.sparse_present;
                let snapshot = existing.clone();
                drop(collections);
                self.persist(name, &snapshot)
            }
            None => {
                let data = CollectionData::new(metadata.clone());
                collections.insert(name.to_string(), data.clone());
                drop(collections);
                self.persist(name, &data)
            }
        }
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = Vec::new();
        if self.root.exists() {
            for entry in std::fs::read_dir(&self.root)? {
                let entry = entry?;
                let file_name = entry.file_name().to_string_lossy().to_string();
                if let Some(name) = file_name.strip_suffix(".collection.json") {
                    names.push(name.to_string());
                }
            }
        }
        let collections = self.collections.read().await;
        for name in collections.keys() {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        names.sort();
        Ok(names)
    }

    async fn collection_metadata(&self, name: &str) -> Result<Option<CollectionMetadata>> {
        self.hydrate(name).await?;
        let collections = self.collections.read().await;
        Ok(collections.get(name).map(|c| c.metadata.clone()))
    }

    async fn upsert(&self, collection: &str, points: Vec<VectorPoint>) -> Result<()> {
        self.hydrate(collection).await?;
        let mut collections = self.collections.write().await;
        let data = collections
            .get_mut(collection)
            .ok_or_else(|| Error::CollectionNotFound {
                collection: collection.to_string(),
            })?;
        data.upsert(points)?;
        let snapshot = data.clone();
        drop(collections);
        self.persist(collection, &snapshot)
    }

    async fn update_vectors(
        &self,
        collection: &str,
        id: Uuid,
        dense: Option<Vec<f32>>,
        sparse: Option<SparseVector>,
    ) -> Result<()> {
        self.hydrate(collection).await?;
        let mut collections = self.collections.write().await;
        let data = collections
            .get_mut(collection)
            .ok_or_else(|| Error::CollectionNotFound {
                collection: collection.to_string(),
            })?;
        data.update_vectors(id, dense, sparse)?;
        let snapshot = data.clone();
        drop(collections);
        self.persist(collection, &snapshot)
    }

    async fn search_dense(
        &self,
        collection: &str,
        vector: &[f32],
        filter: Option<&Filter>,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>> {
        self.hydrate(collection).await?;
        let collections = self.collections.read().await;
        collections
            .get(collection)
            .ok_or_else(|| Error::CollectionNotFound {
                collection: collection.to_string(),
            })?
            .search_dense(vector, filter, limit)
    }

    async fn search_sparse(
        &self,
        collection: &str,
        vector: &SparseVector,
        filter: Option<&Filter>,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>> {
        self.hydrate(collection).await?;
        let collections = self.collections.read().await;
        collections
            .get(collection)
            .ok_or_else(|| Error::CollectionNotFound {
                collection: collection.to_string(),
            })?
            .search_sparse(vector, filter, limit)
    }

    async fn get_points(&self, collection: &str, ids: &[Uuid]) -> Result<Vec<VectorPoint>> {
        self.hydrate(collection).await?;
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .ok_or_else(|| Error::CollectionNotFound {
                collection: collection.to_string(),
            })?
            .get_points(ids))
    }

    async fn delete_by_id(&self, collection: &str, ids: &[Uuid]) -> Result<()> {
        self.hydrate(collection).await?;
        let mut collections = self.collections.write().await;
        let data = collections
            .get_mut(collection)
            .ok_or_else(|| Error::CollectionNotFound {
                collection: collection.to_string(),
            })?;
        data.delete_by_ids(ids);
        let snapshot = data.clone();
        drop(collections);
        self.persist(collection, &snapshot)
    }

    async fn delete_by_file(&self, collection: &str, path: &str) -> Result<usize> {
        self.hydrate(collection).await?;
        let mut collections = self.collections.write().await;
        let data = collections
            .get_mut(collection)
            .ok_or_else(|| Error::CollectionNotFound {
                collection: collection.to_string(),
            })?;
        let deleted = data.delete_by_file(path);
        let snapshot = data.clone();
        drop(collections);
        self.persist(collection, &snapshot)?;
        Ok(deleted)
    }

    async fn delete_by_chunk_name(&self, collection: &str, names: &[String]) -> Result<usize> {
        self.hydrate(collection).await?;
        let mut collections = self.collections.write().await;
        let data = collections
            .get_mut(collection)
            .ok_or_else(|| Error::CollectionNotFound {
                collection: collection.to_string(),
            })?;
        let deleted = data.delete_by_chunk_name(names);
        let snapshot = data.clone();
        drop(collections);
        self.persist(collection, &snapshot)?;
        Ok(deleted)
    }

    async fn rename_file(&self, collection: &str, from: &str, to: &str) -> Result<usize> {
        self.hydrate(collection).await?;
        let mut collections = self.collections.write().await;
        let data = collections
            .get_mut(collection)
            .ok_or_else(|| Error::CollectionNotFound {
                collection: collection.to_string(),
            })?;
        let touched = data.rename_file(from, to);
        let snapshot = data.clone();
        drop(collections);
        self.persist(collection, &snapshot)?;
        Ok(touched)
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        self.hydrate(collection).await?;
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .ok_or_else(|| Error::CollectionNotFound {
                collection: collection.to_string(),
            })?
            .len())
    }

    fn capabilities(&self) -> VectorStoreCapabilities {
        VectorStoreCapabilities {
            supports_sparse: true,
            supports_update_vectors: true,
        }
    }

    fn provider_name(&self) -> &str {
        "filesystem"
    }

    async fn ensure_client(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root)?;
        Ok(())
    }
}
