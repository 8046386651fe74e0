//! PCA whitening applied to embeddings before they are indexed.
//!
//! Fitting centers the embeddings, computes their covariance, and keeps the
//! top `reduced` eigen-directions scaled by `1 / sqrt(eigenvalue)`, so the
//! whitened embeddings have (approximately) identity covariance.

use nalgebra::{DMatrix, SymmetricEigen};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use bo_types::{IndexError, Matrix};

/// Components whose eigenvalue falls below this fraction of the largest are
/// treated as zero variance.
const EIGEN_FLOOR: f64 = 1e-10;

/// A fitted whitening transform `x -> (x - mean) W`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Whitening {
    mean: Vec<f64>,
    /// `[input dims, reduced dims]`.
    projection: Matrix,
    eigenvalues: Vec<f64>,
}

impl Whitening {
    pub fn fit(embeddings: &Matrix, reduced: usize) -> Result<Self, IndexError> {
        let (n, d) = (embeddings.rows(), embeddings.cols());
        if n == 0 || d == 0 {
            return Err(IndexError::Empty);
        }
        if reduced == 0 || reduced > d {
            return Err(IndexError::Whitening {
                message: format!("reduced dims must be in 1..={d}, got {reduced}"),
            });
        }

        let mean = column_means(embeddings);
        let eigen = SymmetricEigen::new(covariance(embeddings, &mean));
        let eigenvalues = eigen.eigenvalues;
        let eigenvectors = eigen.eigenvectors;

        let mut order: Vec<usize> = (0..d).collect();
        order.sort_by(|&a, &b| eigenvalues[b].total_cmp(&eigenvalues[a]));

        let floor = EIGEN_FLOOR * eigenvalues[order[0]].max(f64::MIN_POSITIVE);
        let mut kept = Vec::with_capacity(reduced);
        for &component in order.iter().take(reduced) {
            if eigenvalues[component] > floor {
                kept.push(component);
            } else {
                warn!(
                    "Dropping whitening component {} with eigenvalue {:e}",
                    component, eigenvalues[component]
                );
            }
        }
        if kept.is_empty() {
            return Err(IndexError::Whitening {
                message: "embeddings have no variance".to_string(),
            });
        }

        let r = kept.len();
        let mut projection = vec![0.0; d * r];
        for (col, &component) in kept.iter().enumerate() {
            let scale = eigenvalues[component].sqrt().recip();
            for row in 0..d {
                projection[row * r + col] = eigenvectors[(row, component)] * scale;
            }
        }

        debug!("Fitted whitening {} -> {} dims", d, r);

        Ok(Self {
            mean,
            projection: Matrix::from_flat(d, r, projection).map_err(|e| IndexError::Whitening {
                message: e.to_string(),
            })?,
            eigenvalues: kept.iter().map(|&c| eigenvalues[c]).collect(),
        })
    }

    pub fn input_dims(&self) -> usize {
        self.mean.len()
    }

    pub fn reduced_dims(&self) -> usize {
        self.projection.cols()
    }

    /// Eigenvalues of the kept components, descending.
    pub fn eigenvalues(&self) -> &[f64] {
        &self.eigenvalues
    }

    pub fn transform(&self, vector: &[f64]) -> Result<Vec<f64>, IndexError> {
        if vector.len() != self.input_dims() {
            return Err(IndexError::DimensionMismatch {
                expected: self.input_dims(),
                actual: vector.len(),
            });
        }

        let mut out = vec![0.0; self.reduced_dims()];
        for (i, (x, m)) in vector.iter().zip(&self.mean).enumerate() {
            let centered = x - m;
            for (slot, w) in out.iter_mut().zip(self.projection.row(i)) {
                *slot += centered * w;
            }
        }
        Ok(out)
    }

    pub fn transform_matrix(&self, embeddings: &Matrix) -> Result<Matrix, IndexError> {
        let rows = embeddings
            .rows_iter()
            .map(|row| self.transform(row))
            .collect::<Result<Vec<_>, _>>()?;
        if rows.is_empty() {
            return Ok(Matrix::empty(self.reduced_dims()));
        }
        Matrix::from_rows(rows)
    }
}

fn column_means(m: &Matrix) -> Vec<f64> {
    let mut mean = vec![0.0; m.cols()];
    for row in m.rows_iter() {
        for (acc, v) in mean.iter_mut().zip(row) {
            *acc += v;
        }
    }
    let n = m.rows() as f64;
    mean.iter_mut().for_each(|v| *v /= n);
    mean
}

/// Sample covariance, `(X - mean)^T (X - mean) / (n - 1)`.
fn covariance(m: &Matrix, mean: &[f64]) -> DMatrix<f64> {
    let d = m.cols();
    let centered: Vec<f64> = m
        .rows_iter()
        .flat_map(|row| row.iter().zip(mean).map(|(x, mu)| x - mu))
        .collect();
    let x = DMatrix::from_row_slice(m.rows(), d, &centered);
    let denom = (m.rows().saturating_sub(1)).max(1) as f64;
    (x.transpose() * x) / denom
}
