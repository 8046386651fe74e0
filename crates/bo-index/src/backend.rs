//! Search backends: the "given a validated query, find the k nearest rows"
//! primitive behind [`crate::BoundedIndex`].

use std::cmp::Ordering;
use std::fmt::Debug;

use serde::{Deserialize, Serialize};

use bo_types::{BoResult, IndexError, Matrix, NearestNeighbors};

use crate::distance::Distance;
use crate::kdtree::KdTreeBackend;

/// Nearest-neighbour primitive implemented once per search structure.
///
/// Callers guarantee that `query` has the index dimensionality, lies inside
/// the index bounds, and that `1 <= k <= embeddings.rows()`. Implementations
/// return exactly `k` rows, ascending by distance, ties by ascending row.
pub trait SearchBackend: Send + Sync + Debug {
    fn nearest(&self, embeddings: &Matrix, query: &[f64], k: usize) -> BoResult<NearestNeighbors>;

    /// Human-readable backend name.
    fn name(&self) -> &str;
}

/// Order candidates by distance, then by row index.
#[inline]
pub(crate) fn candidate_order(a: &(usize, f64), b: &(usize, f64)) -> Ordering {
    a.1.total_cmp(&b.1).then(a.0.cmp(&b.0))
}

/// Keep the `k` best `(row, distance)` pairs, sorted.
pub(crate) fn top_k(mut scored: Vec<(usize, f64)>, k: usize) -> NearestNeighbors {
    if k < scored.len() {
        scored.select_nth_unstable_by(k, candidate_order);
        scored.truncate(k);
    }
    scored.sort_unstable_by(candidate_order);

    let (indices, distances) = scored.into_iter().unzip();
    NearestNeighbors { indices, distances }
}

// ---- Flat scan ----

/// Exhaustive scan. Works with every [`Distance`].
#[derive(Debug, Clone)]
pub struct FlatBackend {
    distance: Distance,
}

impl FlatBackend {
    pub fn new(distance: Distance) -> Self {
        Self { distance }
    }
}

impl SearchBackend for FlatBackend {
    fn nearest(&self, embeddings: &Matrix, query: &[f64], k: usize) -> BoResult<NearestNeighbors> {
        let scored = self
            .distance
            .to_rows(query, embeddings)
            .into_iter()
            .enumerate()
            .collect();
        Ok(top_k(scored, k))
    }

    fn name(&self) -> &str {
        "flat"
    }
}

// ---- Factory ----

fn default_leaf_size() -> usize {
    16
}

/// Which search structure to build over the embeddings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    Flat,
    /// Exact k-d tree. Euclidean distance only.
    KdTree {
        #[serde(default = "default_leaf_size")]
        leaf_size: usize,
    },
}

impl BackendKind {
    pub fn kd_tree() -> Self {
        Self::KdTree {
            leaf_size: default_leaf_size(),
        }
    }

    pub fn build(
        &self,
        embeddings: &Matrix,
        distance: Distance,
    ) -> Result<Box<dyn SearchBackend>, IndexError> {
        match self {
            Self::Flat => Ok(Box::new(FlatBackend::new(distance))),
            Self::KdTree { leaf_size } => {
                if distance != Distance::Euclidean {
                    return Err(IndexError::UnsupportedDistance {
                        backend: "kd_tree".to_string(),
                        distance: distance.to_string(),
                    });
                }
                Ok(Box::new(KdTreeBackend::build(embeddings, *leaf_size)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn top_k_breaks_ties_by_row() {
        let nn = top_k(vec![(3, 1.0), (1, 1.0), (2, 0.5), (0, 1.0)], 3);
        assert_eq!(nn.indices, vec![2, 0, 1]);
        assert_eq!(nn.distances, vec![0.5, 1.0, 1.0]);
    }

    #[test]
    fn top_k_with_k_at_len() {
        let nn = top_k(vec![(0, 2.0), (1, 1.0)], 2);
        assert_eq!(nn.indices, vec![1, 0]);
    }

    #[test]
    fn flat_scan_orders_by_distance() {
        let m = Matrix::from_rows(vec![vec![5.0], vec![1.0], vec![2.0]]).unwrap();
        let backend = FlatBackend::new(Distance::Euclidean);
        let nn = backend.nearest(&m, &[1.8], 2).unwrap();
        assert_eq!(nn.indices, vec![2, 1]);
        assert_eq!(backend.name(), "flat");
    }

    #[test]
    fn kd_tree_rejects_non_euclidean() {
        let m = Matrix::from_rows(vec![vec![1.0]]).unwrap();
        let err = BackendKind::kd_tree()
            .build(&m, Distance::Cosine)
            .unwrap_err();
        assert!(matches!(err, IndexError::UnsupportedDistance { .. }));
    }

    #[test]
    fn backend_kind_from_json() {
        let kind: BackendKind = serde_json::from_str(r#"{"kind": "kd_tree"}"#).unwrap();
        assert_eq!(kind, BackendKind::KdTree { leaf_size: 16 });

        let kind: BackendKind = serde_json::from_str(r#"{"kind": "flat"}"#).unwrap();
        assert_eq!(kind, BackendKind::Flat);
    }
}
