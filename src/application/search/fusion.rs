//! Hybrid score fusion
//!
//! Merges dense and sparse result sets into one candidate list:
//! `combined = α · normalize(dense) + (1 − α) · normalize(sparse)`, with
//! min-max normalization inside each result set. A chunk present in only
//! one set contributes only that component; the other term is zero.

use std::collections::BTreeMap;

use itertools::{Itertools, MinMaxResult};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::domain::ports::ScoredPoint;

/// A merged candidate carrying both raw component scores
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub id: Uuid,
    pub dense: Option<f32>,
    pub sparse: Option<f32>,
    pub combined: f32,
    pub payload: Map<String, Value>,
}

/// Min-max normalize a score set into `[0, 1]`.
///
/// A single-element or constant set maps to 1.0; relative order is all
/// that matters downstream.
fn normalize(hits: &[ScoredPoint]) -> BTreeMap<Uuid, f32> {
    let (min, max) = match hits.iter().map(|h| h.score).minmax_by(|a, b| {
        a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal)
    }) {
        MinMaxResult::NoElements => return BTreeMap::new(),
        MinMaxResult::OneElement(only) => (only, only),
        MinMaxResult::MinMax(min, max) => (min, max),
    };
    let range = max - min;
    hits.iter()
        .map(|hit| {
            let normalized = if range <= f32::EPSILON {
                1.0
            } else {
                (hit.score - min) / range
            };
            (hit.id, normalized)
        })
        .collect()
}

/// Merge the two result sets, best combined score first
pub fn merge(dense_hits: Vec<ScoredPoint>, sparse_hits: Vec<ScoredPoint>, alpha: f32) -> Vec<Candidate> {
    let alpha = alpha.clamp(0.0, 1.0);
    let dense_normalized = normalize(&dense_hits);
    let sparse_normalized = normalize(&sparse_hits);

    let mut raw_dense: BTreeMap<Uuid, f32> = BTreeMap::new();
    let mut raw_sparse: BTreeMap<Uuid, f32> = BTreeMap::new();
    let mut payloads: BTreeMap<Uuid, Map<String, Value>> = BTreeMap::new();
    for hit in dense_hits {
        raw_dense.insert(hit.id, hit.score);
        payloads.entry(hit.id).or_insert(hit.payload);
    }
    for hit in sparse_hits {
        raw_sparse.insert(hit.id, hit.score);
        payloads.entry(hit.id).or_insert(hit.payload);
    }

    let mut candidates: Vec<Candidate> = payloads
        .into_iter()
        .map(|(id, payload)| {
            let dense_component = dense_normalized.get(&id).copied();
            let sparse_component = sparse_normalized.get(&id).copied();
            let combined = alpha * dense_component.unwrap_or(0.0)
                + (1.0 - alpha) * sparse_component.unwrap_or(0.0);
            Candidate {
                id,
                dense: raw_dense.get(&id).copied(),
                sparse: raw_sparse.get(&id).copied(),
                combined,
                payload,
            }
        })
        .collect();

    candidates.sort_by(|a, b| {
        b.combined
            .partial_cmp(&a.combined)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(id: u8, score: f32) -> ScoredPoint {
        ScoredPoint {
            id: Uuid::new_v8([id; 16]),
            score,
            payload: Map::new(),
        }
    }

    #[test]
    fn combined_weights_both_components() {
        let dense = vec![hit(1, 0.9), hit(2, 0.1)];
        let sparse = vec![hit(2, 5.0), hit(3, 1.0)];
        let merged = merge(dense, sparse, 0.5);
        assert_eq!(merged.len(), 3);

        let by_id = |n: u8| {
            merged
                .iter()
                .find(|c| c.id == Uuid::new_v8([n; 16]))
                .unwrap()
        };
        // id 1: dense-only, normalized 1.0 → 0.5 combined
        assert!((by_id(1).combined - 0.5).abs() < 1e-6);
        assert_eq!(by_id(1).sparse, None);
        // id 2: dense min (0.0) + sparse max (1.0) → 0.5
        assert!((by_id(2).combined - 0.5).abs() < 1e-6);
        assert_eq!(by_id(2).dense, Some(0.1));
        assert_eq!(by_id(2).sparse, Some(5.0));
        // id 3: sparse min → 0.0
        assert!(by_id(3).combined.abs() < 1e-6);
    }

    #[test]
    fn alpha_one_ignores_sparse() {
        let dense = vec![hit(1, 0.2)];
        let sparse = vec![hit(2, 9.0)];
        let merged = merge(dense, sparse, 1.0);
        assert_eq!(merged[0].id, Uuid::new_v8([1; 16]));
        assert!((merged[0].combined - 1.0).abs() < 1e-6);
        assert!(merged[1].combined.abs() < 1e-6);
    }

    #[test]
    fn single_element_sets_normalize_to_one() {
        let merged = merge(vec![hit(1, 0.42)], Vec::new(), 0.5);
        assert!((merged[0].combined - 0.5).abs() < 1e-6);
    }

    #[test]
    fn results_are_sorted_descending() {
        let dense = vec![hit(1, 0.1), hit(2, 0.9), hit(3, 0.5)];
        let merged = merge(dense, Vec::new(), 1.0);
        assert!(merged
            .windows(2)
            .all(|pair| pair[0].combined >= pair[1].combined));
    }

    #[test]
    fn sparse_only_merge_equals_sparse_score() {
        let sparse = vec![hit(1, 4.0), hit(2, 2.0)];
        let merged = merge(Vec::new(), sparse, 0.5);
        // With no dense set, combined is (1-α)·normalized sparse
        assert!((merged[0].combined - 0.5).abs() < 1e-6);
        assert_eq!(merged[0].dense, None);
    }
}
