use serde::{Deserialize, Serialize};

use crate::array::Matrix;

/// What a search backend hands back: row indices and their distances,
/// ascending by distance, ties by ascending row index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearestNeighbors {
    pub indices: Vec<usize>,
    pub distances: Vec<f64>,
}

impl NearestNeighbors {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Result of a validated index search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub query: Vec<f64>,
    /// Matched rows of the embedding matrix, `[k, dims]`.
    pub vectors: Matrix,
    pub distances: Vec<f64>,
    pub indices: Vec<usize>,
}

impl SearchResult {
    /// Index and distance of the closest match.
    pub fn nearest(&self) -> Option<(usize, f64)> {
        self.indices.first().copied().zip(self.distances.first().copied())
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}
