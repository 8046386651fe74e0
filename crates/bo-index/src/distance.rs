//! Distance functions between a query and indexed vectors.

use serde::{Deserialize, Serialize};

use bo_types::{IndexError, Matrix};

/// Distance used to rank indexed rows against a query. Lower is nearer for
/// every variant.
///
/// - `Euclidean`: L2 distance, a true metric.
/// - `InnerProduct`: `-(a . b)`. A pseudo-distance: it can be negative and
///   `d(x, x)` is not zero, but ordering by it ranks the largest inner product
///   first. Use with normalized embeddings.
/// - `Cosine`: `1 - cos(a, b)`, range `[0, 2]`. A zero vector is treated as
///   orthogonal to everything (distance 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Distance {
    #[default]
    Euclidean,
    InnerProduct,
    Cosine,
}

impl Distance {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Euclidean => "euclidean",
            Self::InnerProduct => "inner_product",
            Self::Cosine => "cosine",
        }
    }

    /// Whether this is a metric in the strict sense (non-negative, zero on
    /// the diagonal, symmetric, triangle inequality).
    pub fn is_metric(self) -> bool {
        matches!(self, Self::Euclidean)
    }

    /// Distance between two equal-length vectors.
    #[inline]
    pub fn between(self, a: &[f64], b: &[f64]) -> f64 {
        debug_assert_eq!(a.len(), b.len());
        match self {
            Self::Euclidean => a
                .iter()
                .zip(b)
                .map(|(x, y)| {
                    let diff = x - y;
                    diff * diff
                })
                .sum::<f64>()
                .sqrt(),
            Self::InnerProduct => -dot(a, b),
            Self::Cosine => {
                let (dot, norm_a, norm_b) = a.iter().zip(b).fold(
                    (0.0_f64, 0.0_f64, 0.0_f64),
                    |(dot_acc, na, nb), (x, y)| (dot_acc + x * y, na + x * x, nb + y * y),
                );
                if norm_a == 0.0 || norm_b == 0.0 {
                    return 1.0;
                }
                // Rounding can push the ratio just past +-1.
                (1.0 - dot / (norm_a * norm_b).sqrt()).clamp(0.0, 2.0)
            }
        }
    }

    /// Distance from `query` to every row of `rows`, in row order.
    pub fn to_rows(self, query: &[f64], rows: &Matrix) -> Vec<f64> {
        rows.rows_iter().map(|row| self.between(query, row)).collect()
    }
}

#[inline]
fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

impl std::fmt::Display for Distance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Distance {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "euclidean" | "l2" => Ok(Self::Euclidean),
            "inner_product" | "innerproduct" | "ip" | "dot" => Ok(Self::InnerProduct),
            "cosine" | "cos" => Ok(Self::Cosine),
            _ => Err(IndexError::UnknownDistance {
                name: s.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for Distance {
    type Error = IndexError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Distance> for String {
    fn from(distance: Distance) -> Self {
        distance.as_str().to_string()
    }
}

impl TryFrom<&str> for Distance {
    type Error = IndexError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        s.parse()
    }
}
