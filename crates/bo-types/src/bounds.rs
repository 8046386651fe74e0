//! Per-dimension inclusive ranges for query vectors.

use serde::{Deserialize, Serialize};

use crate::array::Matrix;
use crate::errors::IndexError;

/// Inclusive `[lower, upper]` range for each query dimension.
///
/// Serialized as a `[dims, 2]` list of pairs so configs read the same way the
/// bounds are usually printed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<[f64; 2]>", into = "Vec<[f64; 2]>")]
pub struct Bounds {
    lower: Vec<f64>,
    upper: Vec<f64>,
}

impl Bounds {
    pub fn new(lower: Vec<f64>, upper: Vec<f64>) -> Result<Self, IndexError> {
        if lower.len() != upper.len() {
            return Err(IndexError::DimensionMismatch {
                expected: lower.len(),
                actual: upper.len(),
            });
        }

        for (dim, (&lo, &hi)) in lower.iter().zip(&upper).enumerate() {
            if lo.is_nan() || hi.is_nan() || lo > hi {
                return Err(IndexError::InvalidBounds {
                    dim,
                    lower: lo,
                    upper: hi,
                });
            }
        }

        Ok(Self { lower, upper })
    }

    pub fn from_pairs(pairs: &[[f64; 2]]) -> Result<Self, IndexError> {
        let (lower, upper) = pairs.iter().map(|p| (p[0], p[1])).unzip();
        Self::new(lower, upper)
    }

    /// Tightest bounds containing every row of `embeddings`.
    pub fn from_matrix(embeddings: &Matrix) -> Result<Self, IndexError> {
        if embeddings.is_empty() {
            return Err(IndexError::Empty);
        }
        let (lower, upper) = embeddings.column_min_max().into_iter().unzip();
        Self::new(lower, upper)
    }

    pub fn dims(&self) -> usize {
        self.lower.len()
    }

    pub fn lower(&self) -> &[f64] {
        &self.lower
    }

    pub fn upper(&self) -> &[f64] {
        &self.upper
    }

    pub fn pairs(&self) -> Vec<[f64; 2]> {
        self.lower
            .iter()
            .zip(&self.upper)
            .map(|(&lo, &hi)| [lo, hi])
            .collect()
    }

    /// True when every coordinate lies in its range. Length is not checked.
    pub fn contains(&self, query: &[f64]) -> bool {
        query
            .iter()
            .zip(self.lower.iter().zip(&self.upper))
            .all(|(q, (lo, hi))| q >= lo && q <= hi)
    }
}

impl TryFrom<Vec<[f64; 2]>> for Bounds {
    type Error = IndexError;

    fn try_from(pairs: Vec<[f64; 2]>) -> Result<Self, Self::Error> {
        Self::from_pairs(&pairs)
    }
}

impl From<Bounds> for Vec<[f64; 2]> {
    fn from(bounds: Bounds) -> Self {
        bounds.pairs()
    }
}
