//! Vector store backends
//!
//! Both in-process backends share one collection representation with
//! brute-force cosine and sparse dot-product search; the filesystem backend
//! adds JSON persistence. Filter translation for these backends compiles
//! the vendor-neutral DSL down to the reference predicate after field
//! validation.

pub mod filesystem;
pub mod in_memory;

pub use filesystem::FilesystemVectorStore;
pub use in_memory::InMemoryVectorStore;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::error::{Error, Result};
use crate::domain::filter::Filter;
use crate::domain::ports::ScoredPoint;
use crate::domain::types::{payload, CollectionMetadata, SparseVector, VectorPoint};

/// Cosine similarity; zero when either vector has zero norm
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Compare stored collection metadata against the configuration in use.
///
/// A provider change is fatal without an explicit override; a dimension
/// change is fatal until the collection is reconciled. A model change with
/// identical dimensions passes, so a model switch can re-embed in place.
pub(crate) fn check_compatible(
    existing: &CollectionMetadata,
    requested: &CollectionMetadata,
) -> Result<()> {
    if existing.provider_name != requested.provider_name {
        return Err(Error::ProviderSwitch {
            recorded: existing.provider_name.clone(),
            configured: requested.provider_name.clone(),
        });
    }
    if existing.dense_dim != requested.dense_dim {
        return Err(Error::DimensionMismatch {
            expected: existing.dense_dim,
            actual: requested.dense_dim,
        });
    }
    Ok(())
}

/// One collection held in memory: metadata plus points keyed by id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct CollectionData {
    pub metadata: CollectionMetadata,
    pub points: BTreeMap<Uuid, VectorPoint>,
}

impl CollectionData {
    pub fn new(metadata: CollectionMetadata) -> Self {
        Self {
            metadata,
            points: BTreeMap::new(),
        }
    }

    /// Validate the filter once; search loops then apply the reference
    /// predicate. This is this backend family's DSL translation.
    fn compile_filter<'f>(filter: Option<&'f Filter>) -> Result<Option<&'f Filter>> {
        if let Some(filter) = filter {
            filter.validate_fields()?;
        }
        Ok(filter)
    }

    pub fn upsert(&mut self, points: Vec<VectorPoint>) -> Result<()> {
        for point in points {
            point.validate()?;
            if let Some(dense) = &point.dense {
                if dense.len() != self.metadata.dense_dim {
                    return Err(Error::DimensionMismatch {
                        expected: self.metadata.dense_dim,
                        actual: dense.len(),
                    });
                }
            }
            self.points.insert(point.id, point);
        }
        Ok(())
    }

    pub fn update_vectors(
        &mut self,
        id: Uuid,
        dense: Option<Vec<f32>>,
        sparse: Option<SparseVector>,
    ) -> Result<()> {
        if let Some(dense) = &dense {
            if dense.len() != self.metadata.dense_dim {
                return Err(Error::DimensionMismatch {
                    expected: self.metadata.dense_dim,
                    actual: dense.len(),
                });
            }
        }
        let sparse_expected = self.metadata.sparse_present;
        let point = self.points.get_mut(&id).ok_or_else(|| Error::validation(
            format!("point {id} does not exist; update_vectors cannot create points"),
        ))?;
        if dense.is_some() {
            point.dense = dense;
        }
        if sparse.is_some() {
            point.sparse = sparse;
        }
        let complete = point.dense.is_some() && (!sparse_expected || point.sparse.is_some());
        point.payload.insert(
            payload::EMBEDDING_COMPLETE.to_string(),
            serde_json::Value::Bool(complete),
        );
        Ok(())
    }

    pub fn search_dense(
        &self,
        vector: &[f32],
        filter: Option<&Filter>,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>> {
        if vector.len() != self.metadata.dense_dim {
            return Err(Error::DimensionMismatch {
                expected: self.metadata.dense_dim,
                actual: vector.len(),
            });
        }
        let filter = Self::compile_filter(filter)?;
        let mut hits: Vec<ScoredPoint> = self
            .points
            .values()
            .filter(|point| filter.is_none_or(|f| f.matches(&point.payload)))
            .filter_map(|point| {
                point.dense.as_ref().map(|dense| ScoredPoint {
                    id: point.id,
                    score: cosine_similarity(vector, dense),
                    payload: point.payload.clone(),
                })
            })
            .collect();
        sort_hits(&mut hits, limit);
        Ok(hits)
    }

    pub fn search_sparse(
        &self,
        vector: &SparseVector,
        filter: Option<&Filter>,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>> {
        let filter = Self::compile_filter(filter)?;
        let mut hits: Vec<ScoredPoint> = self
            .points
            .values()
            .filter(|point| filter.is_none_or(|f| f.matches(&point.payload)))
            .filter_map(|point| {
                point.sparse.as_ref().and_then(|sparse| {
                    let score = vector.dot(sparse);
                    (score > 0.0).then(|| ScoredPoint {
                        id: point.id,
                        score,
                        payload: point.payload.clone(),
                    })
                })
            })
            .collect();
        sort_hits(&mut hits, limit);
        Ok(hits)
    }

    pub fn delete_by_ids(&mut self, ids: &[Uuid]) {
        for id in ids {
            self.points.remove(id);
        }
    }

    pub fn delete_by_file(&mut self, path: &str) -> usize {
        let before = self.points.len();
        self.points.retain(|_, point| point.file_path() != Some(path));
        before - self.points.len()
    }

    pub fn delete_by_chunk_name(&mut self, names: &[String]) -> usize {
        let before = self.points.len();
        self.points.retain(|_, point| {
            point
                .payload
                .get(payload::CHUNK_NAME)
                .and_then(serde_json::Value::as_str)
                .is_none_or(|name| !names.iter().any(|n| n == name))
        });
        before - self.points.len()
    }

    /// Rewrite `file_path` payloads for a content-preserving rename
    pub fn rename_file(&mut self, from: &str, to: &str) -> usize {
        let mut touched = 0usize;
        for point in self.points.values_mut() {
            if point.file_path() == Some(from) {
                point.payload.insert(
                    payload::FILE_PATH.to_string(),
                    serde_json::Value::String(to.to_string()),
                );
                if let Some(serde_json::Value::String(name)) =
                    point.payload.get(payload::CHUNK_NAME).cloned()
                {
                    if let Some(suffix) = name.rsplit(':').next() {
                        point.payload.insert(
                            payload::CHUNK_NAME.to_string(),
                            serde_json::Value::String(format!("{to}:{suffix}")),
                        );
                    }
                }
                touched += 1;
            }
        }
        touched
    }

    pub fn get_points(&self, ids: &[Uuid]) -> Vec<VectorPoint> {
        ids.iter()
            .filter_map(|id| self.points.get(id).cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }
}

fn sort_hits(hits: &mut Vec<ScoredPoint>, limit: usize) {
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    hits.truncate(limit);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn metadata(dim: usize) -> CollectionMetadata {
        CollectionMetadata {
            provider_name: "null".to_string(),
            model_name: "model-a".to_string(),
            schema_version: 1,
            created_at: Utc::now(),
            dense_dim: dim,
            sparse_present: true,
            project_name: "test".to_string(),
        }
    }

    #[test]
    fn provider_switch_and_dimension_mismatch_are_detected() {
        let existing = metadata(384);
        let mut same = metadata(384);
        same.model_name = "model-b".to_string();
        assert!(check_compatible(&existing, &same).is_ok());

        let mut switched = metadata(384);
        switched.provider_name = "other".to_string();
        assert!(matches!(
            check_compatible(&existing, &switched),
            Err(Error::ProviderSwitch { .. })
        ));

        let resized = metadata(1536);
        assert!(matches!(
            check_compatible(&existing, &resized),
            Err(Error::DimensionMismatch {
                expected: 384,
                actual: 1536
            })
        ));
    }

    #[test]
    fn upsert_rejects_wrong_dimensions() {
        let mut collection = CollectionData::new(metadata(4));
        let point = VectorPoint {
            id: Uuid::new_v8([1; 16]),
            dense: Some(vec![0.0; 8]),
            sparse: None,
            payload: serde_json::Map::new(),
        };
        assert!(matches!(
            collection.upsert(vec![point]),
            Err(Error::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn cosine_similarity_basics() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }
}
